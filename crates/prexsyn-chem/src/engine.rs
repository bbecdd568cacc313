//! The chemistry engine boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChemError;
use crate::molecule::Molecule;
use crate::pharmacophore::PharmacophoreGraph;
use crate::reaction::ReactionTemplate;

/// Fingerprint flavours understood by the featurizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    /// Extended-connectivity fingerprint, radius 2.
    Ecfp4,
    /// Functional-class fingerprint, radius 2.
    Fcfp4,
    /// Path-based topological fingerprint.
    Rdkit,
}

impl FingerprintKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FingerprintKind::Ecfp4 => "ecfp4",
            FingerprintKind::Fcfp4 => "fcfp4",
            FingerprintKind::Rdkit => "rdkit",
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FingerprintKind {
    type Err = ChemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecfp4" => Ok(FingerprintKind::Ecfp4),
            "fcfp4" => Ok(FingerprintKind::Fcfp4),
            "rdkit" => Ok(FingerprintKind::Rdkit),
            _ => Err(ChemError::UnknownFingerprint(s.to_string())),
        }
    }
}

/// Clean-up applied to every building block at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessOption {
    /// Strip explicit hydrogens.
    pub remove_hs: bool,
    /// Keep only the largest disconnected component (drops salts/solvents).
    pub largest_fragment_only: bool,
}

impl Default for PreprocessOption {
    fn default() -> Self {
        Self {
            remove_hs: true,
            largest_fragment_only: true,
        }
    }
}

/// Operations the engine delegates to a cheminformatics toolkit.
///
/// Implementations must be thread-safe: one engine instance is shared by
/// every pipeline worker. All methods take `&self`; an engine that caches
/// parsed molecules internally is responsible for its own synchronization.
///
/// The featurization hooks (`fingerprint`, `murcko_scaffold`,
/// `brics_fragments`, `descriptor`, `pharmacophore`) default to [`ChemError::Unsupported`].
pub trait ChemistryEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Canonical SMILES for the input, or an error when it does not parse.
    fn canonicalize(&self, smiles: &str) -> Result<String, ChemError>;

    /// Parse and canonicalize a SMILES string into a [`Molecule`].
    fn molecule(&self, smiles: &str) -> Result<Molecule, ChemError> {
        Ok(Molecule::from_canonical(self.canonicalize(smiles)?))
    }

    /// Parse one record of a structure-data (SDF) file.
    fn parse_mol_block(&self, _block: &str) -> Result<Molecule, ChemError> {
        Err(ChemError::unsupported(self.name(), "molecule block parsing"))
    }

    /// Check that every slot pattern of the template is usable.
    fn check_reaction(&self, reaction: &ReactionTemplate) -> Result<(), ChemError>;

    /// Whether `molecule` matches the pattern of reactant slot `slot`.
    fn matches_slot(&self, molecule: &Molecule, reaction: &ReactionTemplate, slot: usize) -> bool;

    /// Run the template on one ordered reactant tuple (one molecule per slot).
    ///
    /// Returns the main product of every successful application, possibly
    /// empty. Products need not be deduplicated.
    fn run_reactants(
        &self,
        reaction: &ReactionTemplate,
        reactants: &[&Molecule],
    ) -> Result<Vec<Molecule>, ChemError>;

    /// Number of non-hydrogen atoms.
    fn heavy_atom_count(&self, molecule: &Molecule) -> usize;

    /// Apply load-time clean-up to a building block.
    ///
    /// The default keeps the largest component by heavy-atom count and
    /// leaves hydrogen handling to engines that model explicit hydrogens.
    fn preprocess(&self, molecule: Molecule, option: &PreprocessOption) -> Result<Molecule, ChemError> {
        if !option.largest_fragment_only {
            return Ok(molecule);
        }
        let components = molecule.components();
        if components.len() < 2 {
            return Ok(molecule);
        }
        let mut best: Option<(usize, Molecule)> = None;
        for component in components {
            let candidate = self.molecule(component)?;
            let atoms = self.heavy_atom_count(&candidate);
            if best.as_ref().map_or(true, |(n, _)| atoms > *n) {
                best = Some((atoms, candidate));
            }
        }
        Ok(best.map(|(_, m)| m).unwrap_or(molecule))
    }

    /// Length of the fingerprint vectors produced for `kind`.
    fn fingerprint_len(&self, _kind: FingerprintKind) -> usize {
        2048
    }

    /// Dense 0/1 fingerprint of length [`fingerprint_len`](Self::fingerprint_len).
    fn fingerprint(&self, _molecule: &Molecule, kind: FingerprintKind) -> Result<Vec<f32>, ChemError> {
        Err(ChemError::unsupported(self.name(), &format!("{kind} fingerprint")))
    }

    /// Bemis-Murcko scaffold; `None` for acyclic molecules.
    fn murcko_scaffold(&self, _molecule: &Molecule) -> Result<Option<Molecule>, ChemError> {
        Err(ChemError::unsupported(self.name(), "Murcko scaffold"))
    }

    /// BRICS decomposition of the molecule.
    fn brics_fragments(&self, _molecule: &Molecule) -> Result<Vec<Molecule>, ChemError> {
        Err(ChemError::unsupported(self.name(), "BRICS fragmentation"))
    }

    /// Chemical features of the molecule, connected by their weighted
    /// topological distances.
    fn pharmacophore(&self, _molecule: &Molecule) -> Result<PharmacophoreGraph, ChemError> {
        Err(ChemError::unsupported(self.name(), "pharmacophore perception"))
    }

    /// Value of a named molecular descriptor.
    fn descriptor(&self, molecule: &Molecule, name: &str) -> Result<f64, ChemError> {
        match name {
            "NumHeavyAtoms" => Ok(self.heavy_atom_count(molecule) as f64),
            _ => Err(ChemError::unsupported(self.name(), &format!("descriptor {name}"))),
        }
    }
}
