//! Pipeline errors.

use std::path::PathBuf;
use std::time::Duration;

use prexsyn_featurize::FeaturizeError;

use crate::pipeline::PipelineState;

/// Errors returned by [`DataPipeline`](crate::DataPipeline) and its config.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Rejected pipeline or worker configuration.
    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),

    /// Nothing arrived before the deadline.
    #[error("no sample arrived within {0:?}")]
    Timeout(Duration),

    /// The pipeline is stopped and its queue is drained.
    #[error("pipeline is closed")]
    Closed,

    /// The call is not allowed in the current lifecycle state.
    #[error("cannot {operation} a pipeline that is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    /// Config file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`PipelineConfig`](crate::PipelineConfig).
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A configured featurizer could not be built.
    #[error(transparent)]
    Featurize(#[from] FeaturizeError),

    /// A worker thread could not be spawned.
    #[error("cannot spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
