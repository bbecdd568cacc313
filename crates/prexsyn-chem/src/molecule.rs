//! Molecule values.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::reaction::split_top_level;

/// An immutable molecule identified by its canonical SMILES.
///
/// Two molecules are equal exactly when their canonical forms are equal.
/// Cloning is cheap (the string is shared).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Molecule {
    smiles: Arc<str>,
}

impl Molecule {
    /// Wrap a SMILES string that is already canonical.
    ///
    /// Raw user input should go through [`ChemistryEngine::molecule`] instead.
    ///
    /// [`ChemistryEngine::molecule`]: crate::ChemistryEngine::molecule
    pub fn from_canonical(smiles: impl Into<Arc<str>>) -> Self {
        Self {
            smiles: smiles.into(),
        }
    }

    /// The canonical SMILES.
    pub fn smiles(&self) -> &str {
        &self.smiles
    }

    /// Disconnected components of the molecule, in SMILES order.
    pub fn components(&self) -> Vec<&str> {
        split_top_level(&self.smiles).unwrap_or_else(|| vec![&*self.smiles])
    }
}

impl fmt::Debug for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Molecule({:?})", &*self.smiles)
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.smiles)
    }
}

impl Serialize for Molecule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.smiles)
    }
}

impl<'de> Deserialize<'de> for Molecule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let smiles = String::deserialize(deserializer)?;
        Ok(Molecule::from_canonical(smiles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_canonical_form() {
        let a = Molecule::from_canonical("CCO");
        let b = Molecule::from_canonical(String::from("CCO"));
        assert_eq!(a, b);
        assert_ne!(a, Molecule::from_canonical("OCC"));
    }

    #[test]
    fn components_split_outside_brackets() {
        let mol = Molecule::from_canonical("CC(=O)[O-].[Na+]");
        assert_eq!(mol.components(), vec!["CC(=O)[O-]", "[Na+]"]);
    }

    #[test]
    fn serializes_as_plain_string() {
        let mol = Molecule::from_canonical("c1ccccc1");
        let json = serde_json::to_string(&mol).unwrap();
        assert_eq!(json, "\"c1ccccc1\"");
        let back: Molecule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mol);
    }
}
