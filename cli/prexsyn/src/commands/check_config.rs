//! `prexsyn check-config`: parse and validate a pipeline config.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};
use prexsyn_pipeline::PipelineConfig;

pub fn run(path: &Path) -> Result<String> {
    let config =
        PipelineConfig::load(path).with_context(|| format!("checking {}", path.display()))?;
    let featurizers = config
        .featurizer_set()
        .with_context(|| format!("building featurizers from {}", path.display()))?;

    let mut out = String::new();
    writeln!(out, "{}: ok", path.display())?;
    writeln!(out, "  Workers:     {}", config.num_workers)?;
    writeln!(out, "  Capacity:    {} ({:?})", config.capacity, config.overflow)?;
    writeln!(out, "  Base seed:   {}", config.base_seed)?;
    writeln!(
        out,
        "  Reactions:   {}..={} per route, {} attempts",
        config.generator.min_reactions, config.generator.max_reactions, config.generator.max_attempts
    )?;
    for o in &config.worker_overrides {
        writeln!(
            out,
            "  Worker {}:    {}..={} reactions, {} attempts",
            o.worker, o.generator.min_reactions, o.generator.max_reactions, o.generator.max_attempts
        )?;
    }
    let names: Vec<&str> = featurizers.names().collect();
    writeln!(
        out,
        "  Featurizers: {}",
        if names.is_empty() { "none".to_string() } else { names.join(", ") }
    )?;
    Ok(out)
}
