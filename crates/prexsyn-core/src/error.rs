//! Error types for chemical-space construction, synthesis and generation.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use prexsyn_pack::PackError;

/// Errors raised while loading sources or assembling a chemical space.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// A builder step was called out of order, or an option is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A source file could not be parsed.
    #[error("failed to load {}: {detail}", location(.path, .line))]
    Load {
        path: PathBuf,
        line: Option<usize>,
        detail: String,
    },

    /// A reaction template is unusable for indexing.
    #[error("reaction {reaction} is invalid: {detail}")]
    Definition { reaction: usize, detail: String },

    /// A saved file could not be read back.
    #[error("cache error at {}: {source}", .path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: PackError,
    },

    /// The file system refused a read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SpaceError {
    pub(crate) fn cache(path: &Path, source: PackError) -> Self {
        SpaceError::Cache {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn load(path: &Path, line: Option<usize>, detail: impl Into<String>) -> Self {
        SpaceError::Load {
            path: path.to_path_buf(),
            line,
            detail: detail.into(),
        }
    }
}

fn location(path: &Path, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("{}:{line}", path.display()),
        None => path.display().to_string(),
    }
}

/// Result type alias for chemical-space operations.
pub type Result<T> = std::result::Result<T, SpaceError>;

/// Errors raised by the synthesis stack machine.
///
/// A failed push leaves the synthesis untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    /// The stack holds fewer candidate-sets than the reaction's arity.
    #[error("reaction '{reaction}' needs {required} operands but the stack holds {available}")]
    Arity {
        reaction: String,
        required: usize,
        available: usize,
    },

    /// No reactant combination produced anything.
    #[error("reaction '{reaction}' yielded no product: {detail}")]
    ReactionApplication { reaction: String, detail: String },

    #[error("slot binding {binding:?} is not a permutation of 0..{arity}")]
    InvalidBinding { binding: Vec<usize>, arity: usize },
}

/// Errors raised by the route generator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Every attempt failed; `last_cause` describes the final one.
    #[error("route generation exhausted after {attempts} attempts: {last_cause}")]
    Exhausted { attempts: usize, last_cause: String },

    /// Rejected by [`SynthesisGeneratorOption::validate`].
    ///
    /// [`SynthesisGeneratorOption::validate`]: crate::SynthesisGeneratorOption::validate
    #[error("invalid generator option: {0}")]
    Configuration(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}
