//! A deterministic chemistry engine driven by lookup tables.
//!
//! `TableEngine` knows only what it is told: which molecules satisfy which
//! slot patterns, and what each reaction produces for a given reactant tuple.
//! Patterns and reactions can be described by explicit tables or by
//! closures over SMILES strings. Canonicalization is the identity unless an
//! alias is registered.
//!
//! Molecule blocks are read through their `> <SMILES>` data field.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::engine::{ChemistryEngine, FingerprintKind};
use crate::error::ChemError;
use crate::molecule::Molecule;
use crate::pharmacophore::PharmacophoreGraph;
use crate::reaction::{split_top_level, ReactionTemplate};

type PatternFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type ReactionFn = Arc<dyn Fn(&[&str]) -> Vec<String> + Send + Sync>;

#[derive(Clone)]
enum PatternRule {
    Members(HashSet<String>),
    Predicate(PatternFn),
}

#[derive(Clone)]
enum ReactionRule {
    Outcomes(HashMap<Vec<String>, Vec<String>>),
    Function(ReactionFn),
}

/// Lookup-table chemistry engine.
#[derive(Clone)]
pub struct TableEngine {
    aliases: HashMap<String, String>,
    patterns: HashMap<String, PatternRule>,
    malformed_patterns: HashSet<String>,
    reactions: HashMap<String, ReactionRule>,
    scaffolds: HashMap<String, Option<String>>,
    fragments: HashMap<String, Vec<String>>,
    descriptors: HashMap<(String, String), f64>,
    pharmacophores: HashMap<String, PharmacophoreGraph>,
    fingerprint_bits: usize,
}

impl Default for TableEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TableEngine {
    pub fn new() -> Self {
        Self {
            aliases: HashMap::new(),
            patterns: HashMap::new(),
            malformed_patterns: HashSet::new(),
            reactions: HashMap::new(),
            scaffolds: HashMap::new(),
            fragments: HashMap::new(),
            descriptors: HashMap::new(),
            pharmacophores: HashMap::new(),
            fingerprint_bits: 2048,
        }
    }

    /// Canonicalize `input` to `canonical`.
    pub fn with_alias(mut self, input: &str, canonical: &str) -> Self {
        self.aliases.insert(input.to_string(), canonical.to_string());
        self
    }

    /// Declare the molecules (by SMILES) that satisfy a slot pattern.
    pub fn with_pattern_members<'a>(
        mut self,
        pattern: &str,
        members: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let set = members.into_iter().map(str::to_string).collect();
        self.patterns.insert(pattern.to_string(), PatternRule::Members(set));
        self
    }

    /// Decide pattern membership with a predicate over SMILES.
    pub fn with_pattern_fn<F>(mut self, pattern: &str, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.patterns
            .insert(pattern.to_string(), PatternRule::Predicate(Arc::new(predicate)));
        self
    }

    /// Make `check_reaction` reject any template using this slot pattern.
    pub fn with_malformed_pattern(mut self, pattern: &str) -> Self {
        self.malformed_patterns.insert(pattern.to_string());
        self
    }

    /// Record the products of one ordered reactant tuple.
    pub fn with_outcome(mut self, smarts: &str, reactants: &[&str], products: &[&str]) -> Self {
        let key: Vec<String> = reactants.iter().map(|s| s.to_string()).collect();
        let value: Vec<String> = products.iter().map(|s| s.to_string()).collect();
        let rule = self
            .reactions
            .entry(smarts.trim().to_string())
            .or_insert_with(|| ReactionRule::Outcomes(HashMap::new()));
        match rule {
            ReactionRule::Outcomes(table) => {
                table.insert(key, value);
            }
            ReactionRule::Function(_) => {
                let mut table = HashMap::new();
                table.insert(key, value);
                *rule = ReactionRule::Outcomes(table);
            }
        }
        self
    }

    /// Compute products of a reaction with a closure over reactant SMILES.
    pub fn with_reaction_fn<F>(mut self, smarts: &str, rule: F) -> Self
    where
        F: Fn(&[&str]) -> Vec<String> + Send + Sync + 'static,
    {
        self.reactions
            .insert(smarts.trim().to_string(), ReactionRule::Function(Arc::new(rule)));
        self
    }

    pub fn with_scaffold(mut self, smiles: &str, scaffold: Option<&str>) -> Self {
        self.scaffolds
            .insert(smiles.to_string(), scaffold.map(str::to_string));
        self
    }

    pub fn with_fragments(mut self, smiles: &str, fragments: &[&str]) -> Self {
        self.fragments.insert(
            smiles.to_string(),
            fragments.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn with_descriptor(mut self, smiles: &str, name: &str, value: f64) -> Self {
        self.descriptors
            .insert((smiles.to_string(), name.to_string()), value);
        self
    }

    pub fn with_pharmacophore(mut self, smiles: &str, graph: PharmacophoreGraph) -> Self {
        self.pharmacophores.insert(smiles.to_string(), graph);
        self
    }

    pub fn with_fingerprint_bits(mut self, bits: usize) -> Self {
        self.fingerprint_bits = bits.max(1);
        self
    }

    fn hashed_bit(&self, salt: &str, window: &[u8]) -> usize {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(window);
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(head) % self.fingerprint_bits as u64) as usize
    }
}

impl fmt::Debug for TableEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableEngine")
            .field("aliases", &self.aliases.len())
            .field("patterns", &self.patterns.len())
            .field("reactions", &self.reactions.len())
            .field("fingerprint_bits", &self.fingerprint_bits)
            .finish()
    }
}

impl ChemistryEngine for TableEngine {
    fn name(&self) -> &str {
        "table"
    }

    fn canonicalize(&self, smiles: &str) -> Result<String, ChemError> {
        let trimmed = smiles.trim();
        let invalid = |reason: &str| ChemError::InvalidSmiles {
            smiles: smiles.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.is_empty() {
            return Err(invalid("empty input"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("embedded whitespace"));
        }
        if split_top_level(trimmed).is_none() {
            return Err(invalid("unbalanced brackets"));
        }
        Ok(self
            .aliases
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string()))
    }

    fn parse_mol_block(&self, block: &str) -> Result<Molecule, ChemError> {
        let mut lines = block.lines();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.starts_with('>') && line.contains("<SMILES>") {
                let value = lines.next().map(str::trim).unwrap_or_default();
                return self.molecule(value).map_err(|e| ChemError::InvalidMolBlock {
                    reason: e.to_string(),
                });
            }
        }
        Err(ChemError::InvalidMolBlock {
            reason: "record has no <SMILES> data field".to_string(),
        })
    }

    fn check_reaction(&self, reaction: &ReactionTemplate) -> Result<(), ChemError> {
        for pattern in reaction.reactant_patterns() {
            if self.malformed_patterns.contains(pattern) {
                return Err(ChemError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: "pattern rejected by engine".to_string(),
                });
            }
        }
        Ok(())
    }

    fn matches_slot(&self, molecule: &Molecule, reaction: &ReactionTemplate, slot: usize) -> bool {
        let Some(pattern) = reaction.reactant_pattern(slot) else {
            return false;
        };
        match self.patterns.get(pattern) {
            Some(PatternRule::Members(set)) => set.contains(molecule.smiles()),
            Some(PatternRule::Predicate(f)) => f(molecule.smiles()),
            None => false,
        }
    }

    fn run_reactants(
        &self,
        reaction: &ReactionTemplate,
        reactants: &[&Molecule],
    ) -> Result<Vec<Molecule>, ChemError> {
        if reactants.len() != reaction.arity() {
            return Err(ChemError::ReactantCount {
                expected: reaction.arity(),
                actual: reactants.len(),
            });
        }
        let smiles: Vec<&str> = reactants.iter().map(|m| m.smiles()).collect();
        let raw = match self.reactions.get(reaction.smarts()) {
            Some(ReactionRule::Outcomes(table)) => {
                let key: Vec<String> = smiles.iter().map(|s| s.to_string()).collect();
                table.get(&key).cloned().unwrap_or_default()
            }
            Some(ReactionRule::Function(f)) => f(&smiles),
            None => Vec::new(),
        };
        raw.iter().map(|s| self.molecule(s)).collect()
    }

    fn heavy_atom_count(&self, molecule: &Molecule) -> usize {
        count_heavy_atoms(molecule.smiles())
    }

    fn fingerprint_len(&self, _kind: FingerprintKind) -> usize {
        self.fingerprint_bits
    }

    fn fingerprint(&self, molecule: &Molecule, kind: FingerprintKind) -> Result<Vec<f32>, ChemError> {
        let mut bits = vec![0.0f32; self.fingerprint_bits];
        let bytes = molecule.smiles().as_bytes();
        let radius = match kind {
            FingerprintKind::Rdkit => 4,
            FingerprintKind::Ecfp4 | FingerprintKind::Fcfp4 => 3,
        };
        for width in 1..=radius {
            for window in bytes.windows(width) {
                bits[self.hashed_bit(kind.as_str(), window)] = 1.0;
            }
        }
        Ok(bits)
    }

    fn murcko_scaffold(&self, molecule: &Molecule) -> Result<Option<Molecule>, ChemError> {
        match self.scaffolds.get(molecule.smiles()) {
            Some(Some(scaffold)) => self.molecule(scaffold).map(Some),
            _ => Ok(None),
        }
    }

    fn brics_fragments(&self, molecule: &Molecule) -> Result<Vec<Molecule>, ChemError> {
        match self.fragments.get(molecule.smiles()) {
            Some(fragments) => fragments.iter().map(|s| self.molecule(s)).collect(),
            None => Ok(Vec::new()),
        }
    }

    fn pharmacophore(&self, molecule: &Molecule) -> Result<PharmacophoreGraph, ChemError> {
        Ok(self
            .pharmacophores
            .get(molecule.smiles())
            .cloned()
            .unwrap_or_default())
    }

    fn descriptor(&self, molecule: &Molecule, name: &str) -> Result<f64, ChemError> {
        let key = (molecule.smiles().to_string(), name.to_string());
        if let Some(value) = self.descriptors.get(&key) {
            return Ok(*value);
        }
        match name {
            "NumHeavyAtoms" => Ok(self.heavy_atom_count(molecule) as f64),
            _ => Err(ChemError::Unsupported {
                engine: self.name().to_string(),
                operation: format!("descriptor {name}"),
            }),
        }
    }
}

/// Count heavy atoms by scanning SMILES atom symbols.
fn count_heavy_atoms(smiles: &str) -> usize {
    let chars: Vec<char> = smiles.chars().collect();
    let mut count = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '[' => {
                let start = i + 1;
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                let inner: String = chars[start..i.min(chars.len())].iter().collect();
                let symbol: String = inner
                    .trim_start_matches(|c: char| c.is_ascii_digit())
                    .chars()
                    .take_while(|c| c.is_ascii_alphabetic())
                    .collect();
                if !symbol.is_empty() && symbol != "H" {
                    count += 1;
                }
            }
            'C' if chars.get(i + 1) == Some(&'l') => {
                count += 1;
                i += 1;
            }
            'B' if chars.get(i + 1) == Some(&'r') => {
                count += 1;
                i += 1;
            }
            'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' | 'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                count += 1
            }
            _ => {}
        }
        i += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rxn(smarts: &str) -> ReactionTemplate {
        ReactionTemplate::from_smarts(smarts).unwrap()
    }

    #[test]
    fn canonicalize_applies_aliases() {
        let engine = TableEngine::new().with_alias("OCC", "CCO");
        assert_eq!(engine.canonicalize("OCC").unwrap(), "CCO");
        assert_eq!(engine.canonicalize(" CCN ").unwrap(), "CCN");
        assert!(engine.canonicalize("").is_err());
        assert!(engine.canonicalize("C[NH").is_err());
    }

    #[test]
    fn pattern_members_and_predicates() {
        let r = rxn("[C:1][OH:2].[N:3]>>[C:1][N:3]");
        let engine = TableEngine::new()
            .with_pattern_members("[C:1][OH:2]", ["CCO"])
            .with_pattern_fn("[N:3]", |s| s.contains('N'));
        let ethanol = Molecule::from_canonical("CCO");
        let amine = Molecule::from_canonical("CCN");
        assert!(engine.matches_slot(&ethanol, &r, 0));
        assert!(!engine.matches_slot(&amine, &r, 0));
        assert!(engine.matches_slot(&amine, &r, 1));
        assert!(!engine.matches_slot(&amine, &r, 2));
    }

    #[test]
    fn outcomes_are_keyed_by_ordered_reactants() {
        let smarts = "[C:1]Br.[N:2]>>[C:1][N:2]";
        let engine = TableEngine::new().with_outcome(smarts, &["CBr", "CN"], &["CNC"]);
        let r = rxn(smarts);
        let a = Molecule::from_canonical("CBr");
        let b = Molecule::from_canonical("CN");
        assert_eq!(
            engine.run_reactants(&r, &[&a, &b]).unwrap(),
            vec![Molecule::from_canonical("CNC")]
        );
        assert!(engine.run_reactants(&r, &[&b, &a]).unwrap().is_empty());
        assert!(matches!(
            engine.run_reactants(&r, &[&a]),
            Err(ChemError::ReactantCount { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn malformed_pattern_fails_check() {
        let engine = TableEngine::new().with_malformed_pattern("[X:1]");
        assert!(engine.check_reaction(&rxn("[C:1].[N:2]>>[C:1][N:2]")).is_ok());
        assert!(matches!(
            engine.check_reaction(&rxn("[X:1]>>[X:1]O")),
            Err(ChemError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn heavy_atoms_from_smiles() {
        assert_eq!(count_heavy_atoms("CCO"), 3);
        assert_eq!(count_heavy_atoms("ClCBr"), 3);
        assert_eq!(count_heavy_atoms("c1ccccc1"), 6);
        assert_eq!(count_heavy_atoms("[NH4+]"), 1);
        assert_eq!(count_heavy_atoms("[2H]C([2H])([2H])[2H]"), 1);
        assert_eq!(count_heavy_atoms("CN(C)CCCn1c(=O)[nH]c2csnc2c1=O"), 17);
    }

    #[test]
    fn largest_fragment_preprocessing() {
        let engine = TableEngine::new();
        let salt = engine.molecule("CCCC(=O)[O-].[Na+]").unwrap();
        let cleaned = engine
            .preprocess(salt, &crate::PreprocessOption::default())
            .unwrap();
        assert_eq!(cleaned.smiles(), "CCCC(=O)[O-]");
    }

    #[test]
    fn fingerprints_are_deterministic() {
        let engine = TableEngine::new().with_fingerprint_bits(64);
        let mol = Molecule::from_canonical("CCO");
        let a = engine.fingerprint(&mol, FingerprintKind::Ecfp4).unwrap();
        let b = engine.fingerprint(&mol, FingerprintKind::Ecfp4).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v == 1.0));
    }

    #[test]
    fn pharmacophores_come_from_the_table() {
        use crate::pharmacophore::PharmacophoreNode;
        let graph = PharmacophoreGraph::new(vec![
            PharmacophoreNode::new("Donor", "SingleAtomDonor"),
            PharmacophoreNode::new("Acceptor", "SingleAtomAcceptor"),
        ])
        .with_edge(0, 1, 2.0);
        let engine = TableEngine::new().with_pharmacophore("NCCO", graph.clone());
        assert_eq!(
            engine.pharmacophore(&Molecule::from_canonical("NCCO")).unwrap(),
            graph
        );
        let empty = engine.pharmacophore(&Molecule::from_canonical("CC")).unwrap();
        assert!(empty.nodes().is_empty());
    }

    #[test]
    fn mol_block_reads_smiles_field() {
        let engine = TableEngine::new();
        let block = "aspirin\n  table\n\n  0  0  0  0  0  0  0  0  0  0999 V2000\nM  END\n> <SMILES>\nCC(=O)Oc1ccccc1C(=O)O\n";
        assert_eq!(
            engine.parse_mol_block(block).unwrap().smiles(),
            "CC(=O)Oc1ccccc1C(=O)O"
        );
        assert!(engine.parse_mol_block("no data\nM  END\n").is_err());
    }
}
