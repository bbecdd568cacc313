//! Chemistry boundary errors.

use thiserror::Error;

/// Errors reported by molecule/reaction parsing and by chemistry engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChemError {
    #[error("invalid SMILES '{smiles}': {reason}")]
    InvalidSmiles { smiles: String, reason: String },

    #[error("invalid molecule block: {reason}")]
    InvalidMolBlock { reason: String },

    #[error("invalid reaction SMARTS '{smarts}': {reason}")]
    InvalidReaction { smarts: String, reason: String },

    #[error("invalid reactant pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("reaction expects {expected} reactants, got {actual}")]
    ReactantCount { expected: usize, actual: usize },

    #[error("unknown fingerprint kind '{0}'")]
    UnknownFingerprint(String),

    #[error("{operation} is not supported by the {engine} engine")]
    Unsupported { engine: String, operation: String },
}

impl ChemError {
    pub(crate) fn unsupported(engine: &str, operation: &str) -> Self {
        ChemError::Unsupported {
            engine: engine.to_string(),
            operation: operation.to_string(),
        }
    }
}
