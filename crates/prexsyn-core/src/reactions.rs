//! Ordered reaction-template collections.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use prexsyn_chem::ReactionTemplate;
use prexsyn_pack::{PackKind, Packable};

use crate::building_blocks::read_text;
use crate::error::{Result, SpaceError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub template: Arc<ReactionTemplate>,
    /// Position of the template among the reactions of its source file.
    pub original_index: usize,
}

/// Where a reaction came from and where it sits in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionProvenance {
    pub original_index: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReactionList {
    reactions: Vec<ReactionEntry>,
}

impl ReactionList {
    /// Load one reaction SMARTS per non-empty line.
    ///
    /// Lines starting with `#` are comments. The first unparsable line
    /// fails the load with its line number.
    pub fn from_txt(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = read_text(path)?;

        let mut reactions = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let template = ReactionTemplate::from_smarts(line)
                .map_err(|e| SpaceError::load(path, Some(i + 1), e.to_string()))?;
            reactions.push(ReactionEntry {
                template: Arc::new(template),
                original_index: reactions.len(),
            });
        }
        info!(path = %path.display(), count = reactions.len(), "loaded reactions");
        Ok(Self { reactions })
    }

    pub fn from_templates(templates: impl IntoIterator<Item = ReactionTemplate>) -> Self {
        let reactions = templates
            .into_iter()
            .enumerate()
            .map(|(original_index, template)| ReactionEntry {
                template: Arc::new(template),
                original_index,
            })
            .collect();
        Self { reactions }
    }

    pub fn len(&self) -> usize {
        self.reactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<ReactionTemplate>> {
        self.reactions.get(index).map(|e| &e.template)
    }

    pub fn entry(&self, index: usize) -> Option<&ReactionEntry> {
        self.reactions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReactionEntry> {
        self.reactions.iter()
    }

    pub fn provenance(&self) -> Vec<ReactionProvenance> {
        self.reactions
            .iter()
            .enumerate()
            .map(|(index, e)| ReactionProvenance {
                original_index: e.original_index,
                index,
            })
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        prexsyn_pack::save(path, self).map_err(|e| SpaceError::cache(path, e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prexsyn_pack::load(path).map_err(|e| SpaceError::cache(path, e))
    }

    pub fn peek_size(path: impl AsRef<Path>) -> Result<usize> {
        crate::peek_item_count::<Self>(path.as_ref())
    }
}

impl Packable for ReactionList {
    const KIND: PackKind = PackKind::Reactions;

    fn item_count(&self) -> u64 {
        self.reactions.len() as u64
    }
}
