//! The chemical space definition: the immutable, shareable unit that route
//! generators read from.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use prexsyn_chem::{ChemistryEngine, Molecule, ReactionTemplate};
use prexsyn_pack::{PackFlags, PackKind, Packable};

use crate::building_blocks::BuildingBlockList;
use crate::error::{Result, SpaceError};
use crate::index::{matching_slots, CompatibilityIndex};
use crate::reactions::{ReactionList, ReactionProvenance};
use crate::synthesis::{Synthesis, SynthesisVector};

/// Building blocks, reactions, secondary building blocks and both indexes.
///
/// Built once by [`ChemicalSpaceDefinitionBuilder`] and shared read-only
/// (usually behind an `Arc`) by every generator.
///
/// [`ChemicalSpaceDefinitionBuilder`]: crate::ChemicalSpaceDefinitionBuilder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChemicalSpaceDefinition {
    building_blocks: BuildingBlockList,
    reactions: ReactionList,
    secondary_building_blocks: SynthesisVector,
    primary_index: CompatibilityIndex,
    secondary_index: CompatibilityIndex,
}

impl ChemicalSpaceDefinition {
    pub(crate) fn from_parts(
        building_blocks: BuildingBlockList,
        reactions: ReactionList,
        secondary_building_blocks: SynthesisVector,
        primary_index: CompatibilityIndex,
        secondary_index: CompatibilityIndex,
    ) -> Self {
        Self {
            building_blocks,
            reactions,
            secondary_building_blocks,
            primary_index,
            secondary_index,
        }
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BuildingBlockList,
        ReactionList,
        SynthesisVector,
        CompatibilityIndex,
        CompatibilityIndex,
    ) {
        (
            self.building_blocks,
            self.reactions,
            self.secondary_building_blocks,
            self.primary_index,
            self.secondary_index,
        )
    }

    pub fn building_blocks(&self) -> &BuildingBlockList {
        &self.building_blocks
    }

    pub fn reactions(&self) -> &ReactionList {
        &self.reactions
    }

    pub fn secondary_building_blocks(&self) -> &SynthesisVector {
        &self.secondary_building_blocks
    }

    pub fn primary_index(&self) -> &CompatibilityIndex {
        &self.primary_index
    }

    pub fn secondary_index(&self) -> &CompatibilityIndex {
        &self.secondary_index
    }

    pub fn num_reactions(&self) -> usize {
        self.reactions.len()
    }

    pub fn num_building_blocks(&self) -> usize {
        self.building_blocks.len()
    }

    pub fn num_secondary_building_blocks(&self) -> usize {
        self.secondary_building_blocks.len()
    }

    pub fn reaction(&self, index: usize) -> Option<&Arc<ReactionTemplate>> {
        self.reactions.get(index)
    }

    pub fn building_block(&self, index: usize) -> Option<&Molecule> {
        self.building_blocks.get(index)
    }

    pub fn secondary_building_block(&self, index: usize) -> Option<&Synthesis> {
        self.secondary_building_blocks.get(index)
    }

    pub fn reaction_provenance(&self) -> Vec<ReactionProvenance> {
        self.reactions.provenance()
    }

    /// Uniformly pick a building block accepted by `(reaction, slot)`.
    pub fn random_building_block<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        reaction: usize,
        slot: usize,
    ) -> Option<usize> {
        pick(rng, self.primary_index.candidates(reaction, slot))
    }

    /// Uniformly pick a secondary building block accepted by `(reaction, slot)`.
    pub fn random_secondary_building_block<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        reaction: usize,
        slot: usize,
    ) -> Option<usize> {
        pick(rng, self.secondary_index.candidates(reaction, slot))
    }

    /// Every `(reaction, slot)` that accepts `molecule`, ordered by reaction
    /// then slot.
    pub fn available_reactions(
        &self,
        engine: &dyn ChemistryEngine,
        molecule: &Molecule,
    ) -> Vec<(usize, usize)> {
        matching_slots(engine, &self.reactions, molecule)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        prexsyn_pack::save(path, self).map_err(|e| SpaceError::cache(path, e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prexsyn_pack::load(path).map_err(|e| SpaceError::cache(path, e))
    }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, candidates: &[usize]) -> Option<usize> {
    if candidates.is_empty() {
        None
    } else {
        Some(candidates[rng.gen_range(0..candidates.len())])
    }
}

impl Packable for ChemicalSpaceDefinition {
    const KIND: PackKind = PackKind::ChemicalSpace;

    fn item_count(&self) -> u64 {
        self.reactions.len() as u64
    }

    fn flags(&self) -> PackFlags {
        let mut flags = PackFlags::NONE;
        flags.set(PackFlags::HAS_INDEX);
        if !self.secondary_building_blocks.is_empty() {
            flags.set(PackFlags::HAS_SECONDARY);
        }
        flags
    }
}
