//! Declarative featurizer configuration.

use serde::{Deserialize, Serialize};

use prexsyn_chem::FingerprintKind;

use crate::error::Result;
use crate::fragments::BricsFragmentsFeaturizer;
use crate::pharmacophore::{ProductPharmacophoreFeaturizer, DEFAULT_MAX_EDGES, DEFAULT_MAX_NODES};
use crate::postfix::{PostfixNotationFeaturizer, TokenTypes};
use crate::product::{
    FingerprintFeaturizer, MurckoScaffoldFeaturizer, ProductPropertyFeaturizer,
    ProductSmilesFeaturizer,
};
use crate::set::{Featurizer, FeaturizerSet};

fn default_fingerprint() -> FingerprintKind {
    FingerprintKind::Ecfp4
}

fn default_max_length() -> usize {
    PostfixNotationFeaturizer::DEFAULT_MAX_LENGTH
}

fn default_max_fragments() -> usize {
    BricsFragmentsFeaturizer::DEFAULT_MAX_FRAGMENTS
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

fn default_max_edges() -> usize {
    DEFAULT_MAX_EDGES
}

/// One built-in featurizer, as written in a config file:
///
/// ```toml
/// [[featurizers]]
/// kind = "fingerprint"
/// name = "product"
/// fingerprint = "ecfp4"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeaturizerConfig {
    Postfix {
        name: String,
        #[serde(default = "default_max_length")]
        max_length: usize,
        #[serde(default)]
        token_types: TokenTypes,
    },
    Fingerprint {
        name: String,
        #[serde(default = "default_fingerprint")]
        fingerprint: FingerprintKind,
    },
    Scaffold {
        name: String,
        #[serde(default = "default_fingerprint")]
        fingerprint: FingerprintKind,
    },
    Brics {
        name: String,
        #[serde(default = "default_fingerprint")]
        fingerprint: FingerprintKind,
        #[serde(default = "default_max_fragments")]
        max_fragments: usize,
    },
    Property {
        name: String,
        properties: Vec<String>,
    },
    Smiles {
        name: String,
    },
    Pharmacophore {
        name: String,
        /// Family vocabulary; the base families when absent.
        #[serde(default)]
        families: Option<Vec<String>>,
        #[serde(default = "default_max_nodes")]
        max_nodes: usize,
        #[serde(default = "default_max_edges")]
        max_edges: usize,
    },
}

impl FeaturizerConfig {
    pub fn name(&self) -> &str {
        match self {
            FeaturizerConfig::Postfix { name, .. }
            | FeaturizerConfig::Fingerprint { name, .. }
            | FeaturizerConfig::Scaffold { name, .. }
            | FeaturizerConfig::Brics { name, .. }
            | FeaturizerConfig::Property { name, .. }
            | FeaturizerConfig::Smiles { name }
            | FeaturizerConfig::Pharmacophore { name, .. } => name,
        }
    }

    pub fn build(&self) -> Result<Box<dyn Featurizer>> {
        let featurizer: Box<dyn Featurizer> = match self {
            FeaturizerConfig::Postfix {
                name,
                max_length,
                token_types,
            } => Box::new(
                PostfixNotationFeaturizer::new(name.as_str())
                    .with_max_length(*max_length)?
                    .with_token_types(*token_types),
            ),
            FeaturizerConfig::Fingerprint { name, fingerprint } => {
                Box::new(FingerprintFeaturizer::new(name.as_str(), *fingerprint))
            }
            FeaturizerConfig::Scaffold { name, fingerprint } => {
                Box::new(MurckoScaffoldFeaturizer::new(name.as_str(), *fingerprint))
            }
            FeaturizerConfig::Brics {
                name,
                fingerprint,
                max_fragments,
            } => Box::new(
                BricsFragmentsFeaturizer::new(name.as_str(), *fingerprint)
                    .with_max_fragments(*max_fragments)?,
            ),
            FeaturizerConfig::Property { name, properties } => Box::new(
                ProductPropertyFeaturizer::new(name.as_str(), properties.iter().cloned())?,
            ),
            FeaturizerConfig::Smiles { name } => {
                Box::new(ProductSmilesFeaturizer::new(name.as_str()))
            }
            FeaturizerConfig::Pharmacophore {
                name,
                families,
                max_nodes,
                max_edges,
            } => {
                let mut featurizer = ProductPharmacophoreFeaturizer::new(name.as_str())
                    .with_max_nodes(*max_nodes)?
                    .with_max_edges(*max_edges)?;
                if let Some(families) = families {
                    featurizer = featurizer.with_families(families.iter().cloned())?;
                }
                Box::new(featurizer)
            }
        };
        Ok(featurizer)
    }
}

impl FeaturizerSet {
    /// Build a set from configs, in order.
    pub fn from_configs(configs: &[FeaturizerConfig]) -> Result<Self> {
        let mut set = FeaturizerSet::new();
        for config in configs {
            set.add_boxed(config.build()?)?;
        }
        Ok(set)
    }
}
