//! `prexsyn verify`: integrity check of a cache file.

use std::path::Path;

use anyhow::{Context, Result};

pub fn run(path: &Path) -> Result<String> {
    let header = prexsyn_pack::verify_file(path)
        .with_context(|| format!("verifying {}", path.display()))?;
    Ok(format!(
        "{}: ok ({} v{}, {} items, {} payload bytes)\n",
        path.display(),
        header.kind,
        header.version,
        header.item_count,
        header.payload_len
    ))
}
