//! Concurrent route generation for PrexSyn.
//!
//! A [`DataPipeline`] runs a fixed pool of workers. Each one loops
//! generate, featurize, publish into a single [`BoundedQueue`]; consumers pull
//! [`PipelineItem`]s with a timeout.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use prexsyn_chem::{ChemistryEngine, TableEngine};
//! use prexsyn_core::ChemicalSpaceDefinition;
//! use prexsyn_pipeline::{DataPipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine: Arc<dyn ChemistryEngine> = Arc::new(TableEngine::new());
//! let space = Arc::new(ChemicalSpaceDefinition::load("space.pxs")?);
//! let config = PipelineConfig::load("pipeline.toml")?;
//! let featurizers = Arc::new(config.featurizer_set()?);
//!
//! let mut pipeline = DataPipeline::new(config, space, featurizers, engine)?;
//! pipeline.start()?;
//! let item = pipeline.get(Duration::from_secs(5))?;
//! println!("{}", item.sample.len());
//! pipeline.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod queue;

pub use config::{PipelineConfig, WorkerOverride};
pub use error::{PipelineError, Result};
pub use pipeline::{DataPipeline, PipelineItem, PipelineState, PipelineStats};
pub use queue::{BoundedQueue, OverflowPolicy, PopError, PushOutcome};
