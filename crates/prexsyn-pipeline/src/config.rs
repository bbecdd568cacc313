//! Pipeline configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use prexsyn_core::SynthesisGeneratorOption;
use prexsyn_featurize::{FeaturizerConfig, FeaturizerSet};

use crate::error::{PipelineError, Result};
use crate::queue::OverflowPolicy;

/// Generator option used by one worker instead of the shared one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOverride {
    pub worker: usize,
    #[serde(default)]
    pub generator: SynthesisGeneratorOption,
}

/// ```toml
/// num_workers = 4
/// capacity = 256
/// overflow = "drop_oldest"
/// base_seed = 42
///
/// [generator]
/// max_reactions = 4
///
/// [[worker_overrides]]
/// worker = 0
/// generator = { max_attempts = 64 }
///
/// [[featurizers]]
/// kind = "postfix"
/// name = "synthesis"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub num_workers: usize,
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Worker `i` seeds its generator with `base_seed + i`.
    pub base_seed: u64,
    pub generator: SynthesisGeneratorOption,
    pub worker_overrides: Vec<WorkerOverride>,
    pub featurizers: Vec<FeaturizerConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            capacity: 256,
            overflow: OverflowPolicy::Block,
            base_seed: 0,
            generator: SynthesisGeneratorOption::default(),
            worker_overrides: Vec::new(),
            featurizers: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(PipelineError::Configuration(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.capacity == 0 {
            return Err(PipelineError::Configuration(
                "capacity must be at least 1".to_string(),
            ));
        }
        let mut seen = vec![false; self.num_workers];
        for o in &self.worker_overrides {
            match seen.get_mut(o.worker) {
                None => {
                    return Err(PipelineError::Configuration(format!(
                        "override for worker {} but only {} workers",
                        o.worker, self.num_workers
                    )))
                }
                Some(true) => {
                    return Err(PipelineError::Configuration(format!(
                        "worker {} is overridden twice",
                        o.worker
                    )))
                }
                Some(slot) => *slot = true,
            }
        }
        Ok(())
    }

    /// The generator option worker `worker` runs with, seed included.
    pub fn worker_option(&self, worker: usize) -> SynthesisGeneratorOption {
        let mut option = self
            .worker_overrides
            .iter()
            .find(|o| o.worker == worker)
            .map_or_else(|| self.generator.clone(), |o| o.generator.clone());
        option.seed = self.base_seed.wrapping_add(worker as u64);
        option
    }

    /// Build the featurizers listed under `[[featurizers]]`.
    pub fn featurizer_set(&self) -> Result<FeaturizerSet> {
        Ok(FeaturizerSet::from_configs(&self.featurizers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prexsyn_core::SourceMix;

    const EXAMPLE: &str = r#"
        num_workers = 3
        capacity = 8
        overflow = "drop_oldest"
        base_seed = 100

        [generator]
        max_reactions = 4
        source_mix = "primary_only"

        [[worker_overrides]]
        worker = 2
        generator = { max_attempts = 0 }

        [[featurizers]]
        kind = "postfix"
        name = "synthesis"

        [[featurizers]]
        kind = "smiles"
        name = "product"
    "#;

    #[test]
    fn parses_full_config() {
        let config = PipelineConfig::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.capacity, 8);
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.generator.max_reactions, 4);
        assert_eq!(config.generator.source_mix, SourceMix::PrimaryOnly);
        assert_eq!(config.featurizer_set().unwrap().len(), 2);
    }

    #[test]
    fn worker_options_are_seeded_and_overridden() {
        let config = PipelineConfig::from_toml_str(EXAMPLE).unwrap();
        let w0 = config.worker_option(0);
        let w2 = config.worker_option(2);
        assert_eq!(w0.seed, 100);
        assert_eq!(w0.max_reactions, 4);
        assert_eq!(w0.max_attempts, 16);
        assert_eq!(w2.seed, 102);
        assert_eq!(w2.max_attempts, 0);
        assert_eq!(w2.max_reactions, 3);
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        for source in [
            "num_workers = 0",
            "capacity = 0",
            "num_workers = 1\n[[worker_overrides]]\nworker = 1",
            "[[worker_overrides]]\nworker = 0\n[[worker_overrides]]\nworker = 0",
        ] {
            assert!(
                matches!(
                    PipelineConfig::from_toml_str(source),
                    Err(PipelineError::Configuration(_))
                ),
                "accepted: {source}"
            );
        }
        assert!(matches!(
            PipelineConfig::from_toml_str("capacity = \"big\""),
            Err(PipelineError::Toml(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, EXAMPLE).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap().num_workers, 3);
        assert!(matches!(
            PipelineConfig::load(dir.path().join("missing.toml")),
            Err(PipelineError::ConfigRead { .. })
        ));
    }
}
