//! Step-by-step construction of a [`ChemicalSpaceDefinition`].
//!
//! The builder is a state machine checked at every call. A typical fresh
//! build attaches both sources, selects a secondary policy and builds both
//! indexes:
//!
//! ```no_run
//! use std::sync::Arc;
//! use prexsyn_chem::TableEngine;
//! use prexsyn_core::{ChemicalSpaceDefinitionBuilder, LoadOptions, SingleReactionOptions};
//!
//! # fn main() -> prexsyn_core::Result<()> {
//! let space = ChemicalSpaceDefinitionBuilder::new(Arc::new(TableEngine::new()))
//!     .building_blocks_from_sdf("building_blocks.sdf", &LoadOptions::default())?
//!     .reactions_from_txt("reactions.txt")?
//!     .build_primary_index()?
//!     .secondary_building_blocks_from_single_reaction(SingleReactionOptions::default())?
//!     .build_secondary_index()?
//!     .build()?;
//! space.save("space.pxs")?;
//! # Ok(())
//! # }
//! ```
//!
//! A space saved this way is restored in one step with
//! [`ChemicalSpaceDefinitionBuilder::all_from_cache`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use prexsyn_chem::ChemistryEngine;

use crate::building_blocks::{BuildingBlockList, LoadOptions};
use crate::error::{Result, SpaceError};
use crate::index::CompatibilityIndex;
use crate::reactions::ReactionList;
use crate::secondary::{self, SecondaryPolicy, SingleReactionOptions};
use crate::space::ChemicalSpaceDefinition;
use crate::synthesis::{Synthesis, SynthesisVector};

/// Where a builder is in its construction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuilderStage {
    /// At least one of the two sources is missing.
    AwaitingSources,
    SourcesAttached,
    PrimaryIndexed,
    SecondaryIndexed,
}

impl fmt::Display for BuilderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuilderStage::AwaitingSources => "awaiting sources",
            BuilderStage::SourcesAttached => "sources attached",
            BuilderStage::PrimaryIndexed => "primary index built",
            BuilderStage::SecondaryIndexed => "secondary index built",
        };
        f.write_str(name)
    }
}

/// Assembles a [`ChemicalSpaceDefinition`] from its sources.
///
/// Every step consumes the builder and returns it, or a
/// [`SpaceError::Configuration`] when called out of order.
pub struct ChemicalSpaceDefinitionBuilder {
    engine: Arc<dyn ChemistryEngine>,
    building_blocks: Option<BuildingBlockList>,
    reactions: Option<ReactionList>,
    secondary: Option<SynthesisVector>,
    primary_index: Option<CompatibilityIndex>,
    secondary_index: Option<CompatibilityIndex>,
}

impl ChemicalSpaceDefinitionBuilder {
    /// An empty builder. `engine` parses sources and runs the index scans.
    pub fn new(engine: Arc<dyn ChemistryEngine>) -> Self {
        Self {
            engine,
            building_blocks: None,
            reactions: None,
            secondary: None,
            primary_index: None,
            secondary_index: None,
        }
    }

    /// The furthest stage reached, derived from the attached parts.
    pub fn stage(&self) -> BuilderStage {
        if self.secondary_index.is_some() {
            BuilderStage::SecondaryIndexed
        } else if self.primary_index.is_some() {
            BuilderStage::PrimaryIndexed
        } else if self.building_blocks.is_some() && self.reactions.is_some() {
            BuilderStage::SourcesAttached
        } else {
            BuilderStage::AwaitingSources
        }
    }

    // Sources

    /// Parse building blocks from a structure-data file.
    ///
    /// Malformed records follow `options.on_malformed`.
    pub fn building_blocks_from_sdf(
        self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<Self> {
        self.ensure_no_building_blocks()?;
        let list = BuildingBlockList::from_sdf(path, self.engine.as_ref(), options)?;
        self.attach_building_blocks(list)
    }

    /// Parse building blocks from a SMILES file, one molecule per line.
    pub fn building_blocks_from_smiles(
        self,
        path: impl AsRef<Path>,
        options: &LoadOptions,
    ) -> Result<Self> {
        self.ensure_no_building_blocks()?;
        let list = BuildingBlockList::from_smiles_file(path, self.engine.as_ref(), options)?;
        self.attach_building_blocks(list)
    }

    /// Restore building blocks saved with [`BuildingBlockList::save`].
    pub fn building_blocks_from_cache(self, path: impl AsRef<Path>) -> Result<Self> {
        self.ensure_no_building_blocks()?;
        let list = BuildingBlockList::load(path)?;
        self.attach_building_blocks(list)
    }

    pub fn building_blocks(self, list: BuildingBlockList) -> Result<Self> {
        self.ensure_no_building_blocks()?;
        self.attach_building_blocks(list)
    }

    /// Parse reaction templates, one SMARTS per line.
    pub fn reactions_from_txt(self, path: impl AsRef<Path>) -> Result<Self> {
        self.ensure_no_reactions()?;
        let list = ReactionList::from_txt(path)?;
        self.attach_reactions(list)
    }

    pub fn reactions_from_cache(self, path: impl AsRef<Path>) -> Result<Self> {
        self.ensure_no_reactions()?;
        let list = ReactionList::load(path)?;
        self.attach_reactions(list)
    }

    pub fn reactions(self, list: ReactionList) -> Result<Self> {
        self.ensure_no_reactions()?;
        self.attach_reactions(list)
    }

    fn ensure_no_building_blocks(&self) -> Result<()> {
        if self.building_blocks.is_some() {
            return Err(SpaceError::Configuration(
                "building blocks are already attached".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_no_reactions(&self) -> Result<()> {
        if self.reactions.is_some() {
            return Err(SpaceError::Configuration(
                "reactions are already attached".to_string(),
            ));
        }
        Ok(())
    }

    fn attach_building_blocks(mut self, list: BuildingBlockList) -> Result<Self> {
        debug!(count = list.len(), "attached building blocks");
        self.building_blocks = Some(list);
        Ok(self)
    }

    fn attach_reactions(mut self, list: ReactionList) -> Result<Self> {
        debug!(count = list.len(), "attached reactions");
        self.reactions = Some(list);
        Ok(self)
    }

    // Secondary building-block policy

    /// Select a secondary policy by value.
    pub fn secondary_policy(self, policy: SecondaryPolicy) -> Result<Self> {
        match policy {
            SecondaryPolicy::None => self.no_secondary_building_blocks(),
            SecondaryPolicy::SingleReaction(options) => {
                self.secondary_building_blocks_from_single_reaction(options)
            }
            SecondaryPolicy::Chained => self.secondary_building_blocks_chained(),
        }
    }

    /// Use building blocks only. The secondary index is then empty.
    pub fn no_secondary_building_blocks(mut self) -> Result<Self> {
        self.ensure_policy_selectable()?;
        self.secondary = Some(SynthesisVector::new());
        Ok(self)
    }

    /// Generate intermediates by applying each reaction once.
    ///
    /// Needs the primary index; it is built here if that has not happened
    /// yet.
    pub fn secondary_building_blocks_from_single_reaction(
        mut self,
        options: SingleReactionOptions,
    ) -> Result<Self> {
        self.ensure_policy_selectable()?;
        if self.primary_index.is_none() {
            self = self.build_primary_index()?;
        }
        let (Some(blocks), Some(reactions), Some(primary)) = (
            self.building_blocks.as_ref(),
            self.reactions.as_ref(),
            self.primary_index.as_ref(),
        ) else {
            return Err(SpaceError::Configuration(
                "primary index is unavailable".to_string(),
            ));
        };
        let generated = secondary::from_single_reaction(
            self.engine.as_ref(),
            blocks,
            reactions,
            primary,
            &options,
        );
        self.secondary = Some(generated);
        Ok(self)
    }

    /// Restore secondary building blocks saved with [`SynthesisVector::save`].
    ///
    /// Every restored route must be complete; a route that leaves more than
    /// one candidate-set on the stack fails with [`SpaceError::Load`].
    pub fn secondary_building_blocks_from_cache(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.ensure_policy_selectable()?;
        let path = path.as_ref();
        let routes = SynthesisVector::load(path)?;
        if let Some((position, stack_size)) = first_incomplete(&routes) {
            return Err(SpaceError::load(
                path,
                None,
                incomplete_detail(position, stack_size),
            ));
        }
        info!(count = routes.len(), "restored secondary building blocks");
        self.secondary = Some(routes);
        Ok(self)
    }

    /// Always fails with [`SpaceError::Configuration`] once the sources are
    /// attached.
    pub fn secondary_building_blocks_chained(self) -> Result<Self> {
        self.ensure_policy_selectable()?;
        Err(SpaceError::Configuration(
            "chained secondary building blocks are not supported".to_string(),
        ))
    }

    fn ensure_policy_selectable(&self) -> Result<()> {
        if self.building_blocks.is_none() || self.reactions.is_none() {
            return Err(SpaceError::Configuration(
                "attach building blocks and reactions before selecting a secondary policy"
                    .to_string(),
            ));
        }
        if self.secondary.is_some() {
            return Err(SpaceError::Configuration(
                "a secondary building-block policy is already selected".to_string(),
            ));
        }
        Ok(())
    }

    pub fn count_secondary_building_blocks(&self) -> usize {
        self.secondary.as_ref().map_or(0, SynthesisVector::len)
    }

    /// The secondary route at `index`, if a policy has produced one.
    pub fn secondary_building_block(&self, index: usize) -> Option<&Synthesis> {
        self.secondary.as_ref().and_then(|s| s.get(index))
    }

    // Indexes

    /// Scan every building block against every reaction slot.
    ///
    /// Idempotent once built. Fails with [`SpaceError::Definition`] when a
    /// slot pattern cannot be evaluated.
    pub fn build_primary_index(mut self) -> Result<Self> {
        if self.primary_index.is_some() {
            debug!("primary index already built");
            return Ok(self);
        }
        let (Some(blocks), Some(reactions)) = (&self.building_blocks, &self.reactions) else {
            return Err(SpaceError::Configuration(
                "attach building blocks and reactions before building the primary index"
                    .to_string(),
            ));
        };
        let index = CompatibilityIndex::build_primary(self.engine.as_ref(), blocks, reactions)?;
        self.primary_index = Some(index);
        Ok(self)
    }

    /// Scan the secondary routes against every reaction slot.
    ///
    /// Needs the primary index and a secondary policy. Every secondary route
    /// must be complete.
    pub fn build_secondary_index(mut self) -> Result<Self> {
        if self.primary_index.is_none() {
            return Err(SpaceError::Configuration(
                "build the primary index before the secondary index".to_string(),
            ));
        }
        let (Some(reactions), Some(secondary)) = (&self.reactions, &self.secondary) else {
            return Err(SpaceError::Configuration(
                "select a secondary building-block policy before building the secondary index"
                    .to_string(),
            ));
        };
        if let Some((position, stack_size)) = first_incomplete(secondary) {
            return Err(SpaceError::Configuration(incomplete_detail(position, stack_size)));
        }
        let index = CompatibilityIndex::build_secondary(
            self.engine.as_ref(),
            secondary.as_slice(),
            reactions,
        );
        self.secondary_index = Some(index);
        Ok(self)
    }

    /// Restore every part from one saved space, replacing anything attached.
    pub fn all_from_cache(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let space = ChemicalSpaceDefinition::load(path)?;
        let (blocks, reactions, secondary, primary, secondary_index) = space.into_parts();
        if let Some((position, stack_size)) = first_incomplete(&secondary) {
            return Err(SpaceError::load(
                path,
                None,
                incomplete_detail(position, stack_size),
            ));
        }
        info!(
            building_blocks = blocks.len(),
            reactions = reactions.len(),
            secondary_building_blocks = secondary.len(),
            "restored chemical space from cache"
        );
        self.building_blocks = Some(blocks);
        self.reactions = Some(reactions);
        self.secondary = Some(secondary);
        self.primary_index = Some(primary);
        self.secondary_index = Some(secondary_index);
        Ok(self)
    }

    /// Finish. Every part must be present: both sources, a secondary policy
    /// and both indexes.
    pub fn build(self) -> Result<ChemicalSpaceDefinition> {
        let missing = |what: &str| SpaceError::Configuration(format!("cannot build: {what}"));
        let blocks = self.building_blocks.ok_or_else(|| missing("no building blocks"))?;
        let reactions = self.reactions.ok_or_else(|| missing("no reactions"))?;
        let primary = self
            .primary_index
            .ok_or_else(|| missing("primary index not built"))?;
        let secondary = self
            .secondary
            .ok_or_else(|| missing("no secondary building-block policy selected"))?;
        let secondary_index = self
            .secondary_index
            .ok_or_else(|| missing("secondary index not built"))?;
        Ok(ChemicalSpaceDefinition::from_parts(
            blocks,
            reactions,
            secondary,
            primary,
            secondary_index,
        ))
    }
}

/// Position and stack size of the first route that does not reduce to a
/// single candidate-set.
fn first_incomplete(routes: &SynthesisVector) -> Option<(usize, usize)> {
    routes
        .iter()
        .enumerate()
        .find(|(_, route)| !route.is_complete())
        .map(|(position, route)| (position, route.stack_size()))
}

fn incomplete_detail(position: usize, stack_size: usize) -> String {
    format!(
        "secondary building block {position} is incomplete: \
         {stack_size} candidate-sets left on its stack"
    )
}

impl fmt::Debug for ChemicalSpaceDefinitionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChemicalSpaceDefinitionBuilder")
            .field("engine", &self.engine.name())
            .field("stage", &self.stage())
            .field("building_blocks", &self.building_blocks.as_ref().map(BuildingBlockList::len))
            .field("reactions", &self.reactions.as_ref().map(ReactionList::len))
            .field("secondary", &self.secondary.as_ref().map(SynthesisVector::len))
            .finish()
    }
}
