//! Featurization errors.

use prexsyn_chem::ChemError;

use crate::detokenize::TokenKind;

/// Errors raised while registering or running featurizers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeaturizeError {
    /// A featurizer with this name is already registered.
    #[error("featurizer '{0}' is already registered")]
    DuplicateName(String),

    /// The chemistry engine failed on the product.
    #[error("featurizer '{featurizer}': {source}")]
    Chemistry {
        featurizer: String,
        #[source]
        source: ChemError,
    },

    /// Rejected featurizer option.
    #[error("invalid option for featurizer '{featurizer}': {detail}")]
    InvalidOption { featurizer: String, detail: String },

    /// The synthesis has no product to describe.
    #[error("featurizer '{0}': synthesis has no product")]
    NoProduct(String),

    /// A postfix token carries no list position.
    #[error("featurizer '{featurizer}': token {position} has no list index")]
    UnindexedToken { featurizer: String, position: usize },

    /// The engine reported a pharmacophore family outside the vocabulary.
    #[error("featurizer '{featurizer}': unknown pharmacophore family '{family}'")]
    UnknownFamily { featurizer: String, family: String },

    /// A token sequence points outside the building-block or reaction list.
    #[error("token {position}: {kind} index {index} is out of range")]
    TokenIndex {
        position: usize,
        kind: TokenKind,
        index: i64,
    },

    #[error("token {position}: unknown token type {token_type}")]
    UnknownTokenType { position: usize, token_type: i64 },

    /// Token sequences that should line up do not.
    #[error("misaligned token sequences: {0}")]
    Misaligned(String),
}

impl FeaturizeError {
    pub(crate) fn chemistry(featurizer: &str, source: ChemError) -> Self {
        FeaturizeError::Chemistry {
            featurizer: featurizer.to_string(),
            source,
        }
    }

    pub(crate) fn invalid_option(featurizer: &str, detail: impl Into<String>) -> Self {
        FeaturizeError::InvalidOption {
            featurizer: featurizer.to_string(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeaturizeError>;
