//! Chemistry boundary for the PrexSyn engine.
//!
//! Molecules and reaction templates are immutable values. Everything that
//! needs real chemistry (canonicalization, substructure matching, running a
//! reaction template, fingerprints) goes through the [`ChemistryEngine`]
//! trait so that the indexing, synthesis and pipeline layers stay agnostic of
//! the toolkit behind it.
//!
//! [`TableEngine`] is a deterministic engine driven by lookup tables and
//! closures. It backs fixtures and small hand-curated spaces.

pub mod engine;
pub mod error;
pub mod molecule;
pub mod pharmacophore;
pub mod reaction;
pub mod table;

pub use engine::{ChemistryEngine, FingerprintKind, PreprocessOption};
pub use error::ChemError;
pub use molecule::Molecule;
pub use pharmacophore::{PharmacophoreGraph, PharmacophoreNode, BASE_FAMILIES};
pub use reaction::ReactionTemplate;
pub use table::TableEngine;
