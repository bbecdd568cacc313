//! Featurizers for PrexSyn synthesis routes.
//!
//! A [`FeaturizerSet`] runs named [`Featurizer`]s over a [`Synthesis`] and
//! collects their fields into a [`Sample`] keyed `"<featurizer>.<field>"`.
//!
//! [`Synthesis`]: prexsyn_core::Synthesis

pub mod config;
pub mod detokenize;
pub mod error;
pub mod fragments;
pub mod pharmacophore;
pub mod postfix;
pub mod product;
pub mod set;
pub mod value;

pub use config::FeaturizerConfig;
pub use detokenize::{Detokenizer, TokenKind};
pub use error::{FeaturizeError, Result};
pub use fragments::BricsFragmentsFeaturizer;
pub use pharmacophore::ProductPharmacophoreFeaturizer;
pub use postfix::{PostfixNotationFeaturizer, TokenTypes};
pub use product::{
    property_id, FingerprintFeaturizer, MurckoScaffoldFeaturizer, ProductPropertyFeaturizer,
    ProductSmilesFeaturizer, PROPERTY_ID_OFFSET, SUPPORTED_DESCRIPTORS,
};
pub use set::{Featurizer, FeaturizerSet};
pub use value::{FeatureValue, Sample};
