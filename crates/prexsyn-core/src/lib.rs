//! Core of the PrexSyn engine.
//!
//! - [`BuildingBlockList`] and [`ReactionList`]: ordered, index-addressable
//!   sources loaded from domain files or restored from `.pxs` caches.
//! - [`CompatibilityIndex`]: which items fit which reactant slot.
//! - [`Synthesis`]: the postfix stack machine that executes routes.
//! - [`ChemicalSpaceDefinition`] and its [`ChemicalSpaceDefinitionBuilder`].
//! - [`SynthesisGenerator`]: samples random valid multi-step routes.

pub mod builder;
pub mod building_blocks;
pub mod error;
pub mod generator;
pub mod index;
pub mod reactions;
pub mod secondary;
pub mod space;
pub mod synthesis;

use std::path::Path;

use prexsyn_pack::{PackError, Packable};

pub use builder::{BuilderStage, ChemicalSpaceDefinitionBuilder};
pub use building_blocks::{BuildingBlock, BuildingBlockList, LoadOptions, MalformedRecordPolicy};
pub use error::{GenerationError, Result, SpaceError, SynthesisError};
pub use generator::{SourceMix, SynthesisGenerator, SynthesisGeneratorOption};
pub use index::CompatibilityIndex;
pub use reactions::{ReactionEntry, ReactionList, ReactionProvenance};
pub use secondary::{SecondaryPolicy, SingleReactionOptions};
pub use space::ChemicalSpaceDefinition;
pub use synthesis::{ApplyOptions, CandidateSet, Synthesis, SynthesisVector, Token};

/// Item count recorded in a cache header, checked against the expected kind.
pub(crate) fn peek_item_count<T: Packable>(path: &Path) -> Result<usize> {
    let header = prexsyn_pack::peek_header(path).map_err(|e| SpaceError::cache(path, e))?;
    if header.kind != T::KIND {
        return Err(SpaceError::cache(
            path,
            PackError::KindMismatch {
                expected: T::KIND,
                found: header.kind,
            },
        ));
    }
    Ok(header.item_count as usize)
}
