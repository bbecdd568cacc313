//! Ordered building-block collections.
//!
//! Positions in a [`BuildingBlockList`] are the stable building-block ids used
//! by the compatibility index and by route tokens.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use prexsyn_chem::{ChemError, ChemistryEngine, Molecule, PreprocessOption};
use prexsyn_pack::{PackKind, Packable};

use crate::error::{Result, SpaceError};

/// What to do with a record the engine cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRecordPolicy {
    /// Log a warning and continue with the next record.
    #[default]
    Skip,
    /// Fail the whole load with [`SpaceError::Load`].
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub preprocess: PreprocessOption,
    pub on_malformed: MalformedRecordPolicy,
}

/// One building block and the position of its record in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingBlock {
    pub molecule: Molecule,
    pub original_index: usize,
}

/// Read a source file as UTF-8 text. Bytes that are not UTF-8 fail as a
/// load error on the line where they start.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| {
        let valid = e.utf8_error().valid_up_to();
        let line = e.as_bytes()[..valid].iter().filter(|&&b| b == b'\n').count() + 1;
        SpaceError::load(path, Some(line), format!("invalid UTF-8: {}", e.utf8_error()))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildingBlockList {
    blocks: Vec<BuildingBlock>,
    preprocess: Option<PreprocessOption>,
}

impl BuildingBlockList {
    /// Load a structure-data file: records separated by `$$$$` lines.
    pub fn from_sdf(
        path: impl AsRef<Path>,
        engine: &dyn ChemistryEngine,
        options: &LoadOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = read_text(path)?;

        let mut records = Vec::new();
        let mut current = String::new();
        let mut start_line = 1;
        for (i, line) in text.lines().enumerate() {
            if line.trim_end() == "$$$$" {
                records.push((start_line, std::mem::take(&mut current)));
                start_line = i + 2;
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        if !current.trim().is_empty() {
            records.push((start_line, current));
        }

        let parsed = records
            .into_iter()
            .filter(|(_, block)| !block.trim().is_empty())
            .map(|(line, block)| (line, engine.parse_mol_block(&block)));
        Self::collect(path, engine, options, parsed)
    }

    /// Load one SMILES per line. A second whitespace-separated column is
    /// treated as a name and ignored; lines starting with `#` are comments.
    pub fn from_smiles_file(
        path: impl AsRef<Path>,
        engine: &dyn ChemistryEngine,
        options: &LoadOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        let text = read_text(path)?;

        let parsed = text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                let smiles = line.split_whitespace().next()?;
                if smiles.eq_ignore_ascii_case("smiles") {
                    return None;
                }
                Some((i + 1, engine.molecule(smiles)))
            });
        Self::collect(path, engine, options, parsed)
    }

    /// Wrap molecules that are already canonical and preprocessed.
    pub fn from_molecules(molecules: impl IntoIterator<Item = Molecule>) -> Self {
        let blocks = molecules
            .into_iter()
            .enumerate()
            .map(|(original_index, molecule)| BuildingBlock {
                molecule,
                original_index,
            })
            .collect();
        Self {
            blocks,
            preprocess: None,
        }
    }

    fn collect(
        path: &Path,
        engine: &dyn ChemistryEngine,
        options: &LoadOptions,
        records: impl Iterator<Item = (usize, std::result::Result<Molecule, ChemError>)>,
    ) -> Result<Self> {
        let mut blocks = Vec::new();
        let mut skipped = 0usize;
        for (original_index, (line, parsed)) in records.enumerate() {
            let molecule = parsed.and_then(|m| engine.preprocess(m, &options.preprocess));
            match molecule {
                Ok(molecule) => blocks.push(BuildingBlock {
                    molecule,
                    original_index,
                }),
                Err(e) => match options.on_malformed {
                    MalformedRecordPolicy::Skip => {
                        warn!(path = %path.display(), line, error = %e, "skipping malformed record");
                        skipped += 1;
                    }
                    MalformedRecordPolicy::Abort => {
                        return Err(SpaceError::load(path, Some(line), e.to_string()));
                    }
                },
            }
        }
        info!(
            path = %path.display(),
            count = blocks.len(),
            skipped,
            "loaded building blocks"
        );
        Ok(Self {
            blocks,
            preprocess: Some(options.preprocess),
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Molecule> {
        self.blocks.get(index).map(|b| &b.molecule)
    }

    pub fn block(&self, index: usize) -> Option<&BuildingBlock> {
        self.blocks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildingBlock> {
        self.blocks.iter()
    }

    pub fn blocks(&self) -> &[BuildingBlock] {
        &self.blocks
    }

    /// Preprocessing applied at load time; `None` for in-memory lists.
    pub fn preprocess(&self) -> Option<&PreprocessOption> {
        self.preprocess.as_ref()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        prexsyn_pack::save(path, self).map_err(|e| SpaceError::cache(path, e))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prexsyn_pack::load(path).map_err(|e| SpaceError::cache(path, e))
    }

    /// Number of building blocks in a cache file, read from its header.
    pub fn peek_size(path: impl AsRef<Path>) -> Result<usize> {
        crate::peek_item_count::<Self>(path.as_ref())
    }
}

impl Packable for BuildingBlockList {
    const KIND: PackKind = PackKind::BuildingBlocks;

    fn item_count(&self) -> u64 {
        self.blocks.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prexsyn_chem::TableEngine;

    const SDF: &str = "\
glycine
  fixture

  0  0  0  0  0  0  0  0  0  0999 V2000
M  END
> <SMILES>
NCC(=O)O

$$$$
broken
M  END
$$$$
sodium butanoate
M  END
> <SMILES>
CCCC(=O)[O-].[Na+]

$$$$
";

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn sdf_skips_malformed_records_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bb.sdf", SDF);
        let list = BuildingBlockList::from_sdf(&path, &TableEngine::new(), &LoadOptions::default())
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().smiles(), "NCC(=O)O");
        assert_eq!(list.get(1).unwrap().smiles(), "CCCC(=O)[O-]");
        assert_eq!(list.block(1).unwrap().original_index, 2);
        assert_eq!(list.preprocess(), Some(&PreprocessOption::default()));
    }

    #[test]
    fn sdf_abort_reports_record_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bb.sdf", SDF);
        let options = LoadOptions {
            on_malformed: MalformedRecordPolicy::Abort,
            ..LoadOptions::default()
        };
        let err = BuildingBlockList::from_sdf(&path, &TableEngine::new(), &options).unwrap_err();
        match err {
            SpaceError::Load { line, .. } => assert_eq!(line, Some(10)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn smiles_file_ignores_names_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "bb.smi",
            "SMILES ID\n# vendor batch 7\nCCO ethanol\n\nC#N hcn\nC[NH bad\n",
        );
        let list =
            BuildingBlockList::from_smiles_file(&path, &TableEngine::new(), &LoadOptions::default())
                .unwrap();
        let smiles: Vec<&str> = list.iter().map(|b| b.molecule.smiles()).collect();
        assert_eq!(smiles, vec!["CCO", "C#N"]);
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let list = BuildingBlockList::from_molecules(
            ["CCO", "CN", "c1ccccc1"].map(|s| Molecule::from_canonical(s)),
        );
        let path = dir.path().join("bb.pxs");
        list.save(&path).unwrap();
        assert_eq!(BuildingBlockList::peek_size(&path).unwrap(), 3);
        assert_eq!(BuildingBlockList::load(&path).unwrap(), list);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = BuildingBlockList::from_sdf(
            "/nonexistent/blocks.sdf",
            &TableEngine::new(),
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SpaceError::Io(_)));
    }

    #[test]
    fn invalid_utf8_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bb.smi");
        fs::write(&path, b"CCO ethanol\nC\xff\xfeN broken\n").unwrap();
        let err =
            BuildingBlockList::from_smiles_file(&path, &TableEngine::new(), &LoadOptions::default())
                .unwrap_err();
        match err {
            SpaceError::Load {
                path: at,
                line,
                detail,
            } => {
                assert_eq!(at, path);
                assert_eq!(line, Some(2));
                assert!(detail.contains("UTF-8"), "{detail}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
