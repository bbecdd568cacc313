//! The synthesis stack machine.
//!
//! A [`Synthesis`] is a postfix expression over molecules (operands) and
//! reaction templates (operators), together with the stack it evaluates to.
//! Every stack slot holds a candidate-set: the distinct molecules that the
//! sub-expression can yield. Pushing a reaction pops one candidate-set per
//! reactant slot, runs the template over every combination and pushes the
//! union of the products.
//!
//! The postfix sequence only grows, and a failed push leaves both the tokens
//! and the stack untouched, so a synthesis is a valid postfix expression at
//! every point of its life.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use prexsyn_chem::{ChemistryEngine, Molecule, ReactionTemplate};
use prexsyn_pack::{PackKind, Packable};

use crate::error::{Result, SpaceError, SynthesisError};

/// Distinct molecules, ordered by canonical SMILES.
pub type CandidateSet = BTreeSet<Molecule>;

/// One postfix token.
///
/// A reaction token carries everything needed to re-run it: the operand
/// binding it was applied with and, when the route continued from a single
/// member of its products, that member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// An operand: one molecule.
    Molecule {
        molecule: Molecule,
        /// Position in the building-block list, when it came from one.
        building_block: Option<usize>,
    },
    /// An operator: one reaction applied to the operands below it.
    Reaction {
        template: Arc<ReactionTemplate>,
        /// Position in the reaction list, when it came from one.
        index: Option<usize>,
        /// Operand binding, as in [`ApplyOptions::binding`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        binding: Option<Vec<usize>>,
        /// Product the candidate-set was narrowed to by
        /// [`Synthesis::select_product`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        product: Option<Molecule>,
    },
}

impl Token {
    /// Whether this is an operator token.
    pub fn is_reaction(&self) -> bool {
        matches!(self, Token::Reaction { .. })
    }
}

/// Knobs for [`Synthesis::push_reaction_with`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    /// Keep at most this many products, in canonical order. Zero keeps all.
    pub max_products: usize,
    /// `binding[slot]` is the popped operand bound to `slot`, counted from
    /// the deepest one. `None` binds operands to slots in stack order.
    pub binding: Option<Vec<usize>>,
    /// Reaction-list position recorded in the operator token.
    pub reaction_index: Option<usize>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            max_products: 8,
            binding: None,
            reaction_index: None,
        }
    }
}

impl ApplyOptions {
    /// Cap the product candidate-set; zero keeps every product.
    pub fn with_max_products(mut self, max_products: usize) -> Self {
        self.max_products = max_products;
        self
    }

    /// Bind popped operands to reactant slots in this order.
    pub fn with_binding(mut self, binding: Vec<usize>) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Record the reaction-list position in the operator token.
    pub fn with_reaction_index(mut self, index: usize) -> Self {
        self.reaction_index = Some(index);
        self
    }
}

/// A route: postfix tokens plus the candidate-set stack they evaluate to.
///
/// The top of the stack always belongs to the last token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synthesis {
    postfix: Vec<Token>,
    stack: Vec<CandidateSet>,
}

impl Synthesis {
    /// An empty route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a molecule that is not in the building-block list, such as an
    /// intermediate.
    pub fn push_mol(&mut self, molecule: Molecule) {
        self.push_operand(molecule, None);
    }

    /// Push the building block found at `position` in the building-block
    /// list.
    pub fn push_building_block(&mut self, position: usize, molecule: Molecule) {
        self.push_operand(molecule, Some(position));
    }

    fn push_operand(&mut self, molecule: Molecule, building_block: Option<usize>) {
        self.stack.push(CandidateSet::from([molecule.clone()]));
        self.postfix.push(Token::Molecule {
            molecule,
            building_block,
        });
    }

    /// Apply `reaction` to the top candidate-sets with default options.
    pub fn push_reaction(
        &mut self,
        engine: &dyn ChemistryEngine,
        reaction: &Arc<ReactionTemplate>,
    ) -> std::result::Result<(), SynthesisError> {
        self.push_reaction_with(engine, reaction, &ApplyOptions::default())
    }

    /// Apply `reaction` to the top `arity` candidate-sets.
    ///
    /// Fails with [`SynthesisError::Arity`] when the stack is too shallow,
    /// [`SynthesisError::InvalidBinding`] when the binding is not a
    /// permutation of the slots and [`SynthesisError::ReactionApplication`]
    /// when no reactant combination yields a product. A failed call changes
    /// nothing.
    pub fn push_reaction_with(
        &mut self,
        engine: &dyn ChemistryEngine,
        reaction: &Arc<ReactionTemplate>,
        options: &ApplyOptions,
    ) -> std::result::Result<(), SynthesisError> {
        let arity = reaction.arity();
        if self.stack.len() < arity {
            return Err(SynthesisError::Arity {
                reaction: reaction.smarts().to_string(),
                required: arity,
                available: self.stack.len(),
            });
        }
        let window = &self.stack[self.stack.len() - arity..];
        let slots: Vec<&CandidateSet> = match &options.binding {
            None => window.iter().collect(),
            Some(binding) => {
                if !is_permutation(binding, arity) {
                    return Err(SynthesisError::InvalidBinding {
                        binding: binding.clone(),
                        arity,
                    });
                }
                binding.iter().map(|&operand| &window[operand]).collect()
            }
        };

        let products = apply_all(engine, reaction, &slots)?;
        let mut products: CandidateSet = products.into_iter().collect();
        if products.is_empty() {
            return Err(SynthesisError::ReactionApplication {
                reaction: reaction.smarts().to_string(),
                detail: "no combination of reactants matched the template".to_string(),
            });
        }
        if options.max_products > 0 && products.len() > options.max_products {
            products = products.into_iter().take(options.max_products).collect();
        }

        self.stack.truncate(self.stack.len() - arity);
        self.stack.push(products);
        self.postfix.push(Token::Reaction {
            template: Arc::clone(reaction),
            index: options.reaction_index,
            binding: options.binding.clone(),
            product: None,
        });
        Ok(())
    }

    /// Splice a sub-route: its tokens are appended and its stack is pushed.
    pub fn push_synthesis(&mut self, other: &Synthesis) {
        self.postfix.extend(other.postfix.iter().cloned());
        self.stack.extend(other.stack.iter().cloned());
    }

    /// Narrow the top candidate-set to one of its members and record the
    /// choice in the reaction token that produced it, so that
    /// [`replay`](Self::replay) reaches the same top.
    ///
    /// Returns `false` (and changes nothing) when `molecule` is not in the
    /// top set.
    pub fn select_product(&mut self, molecule: &Molecule) -> bool {
        let Some(top) = self.stack.last_mut() else {
            return false;
        };
        if !top.contains(molecule) {
            return false;
        }
        *top = CandidateSet::from([molecule.clone()]);
        if let Some(Token::Reaction { product, .. }) = self.postfix.last_mut() {
            *product = Some(molecule.clone());
        }
        true
    }

    /// Rebuild a route from its tokens.
    ///
    /// Reactions are re-run with their recorded binding and narrowed to
    /// their recorded product. The stack matches the original route's when
    /// `max_products` is the cap that route was built with.
    pub fn replay(
        engine: &dyn ChemistryEngine,
        tokens: &[Token],
        max_products: usize,
    ) -> std::result::Result<Self, SynthesisError> {
        let mut synthesis = Synthesis::new();
        for token in tokens {
            match token {
                Token::Molecule {
                    molecule,
                    building_block,
                } => synthesis.push_operand(molecule.clone(), *building_block),
                Token::Reaction {
                    template,
                    index,
                    binding,
                    product,
                } => {
                    let options = ApplyOptions {
                        max_products,
                        binding: binding.clone(),
                        reaction_index: *index,
                    };
                    synthesis.push_reaction_with(engine, template, &options)?;
                    if let Some(product) = product {
                        if !synthesis.select_product(product) {
                            return Err(SynthesisError::ReactionApplication {
                                reaction: template.smarts().to_string(),
                                detail: format!("recorded product {product} was not produced"),
                            });
                        }
                    }
                }
            }
        }
        Ok(synthesis)
    }

    /// Candidate-set on top of the stack.
    pub fn top(&self) -> Option<&CandidateSet> {
        self.stack.last()
    }

    /// Candidate-set `depth` slots below the top.
    pub fn top_at(&self, depth: usize) -> Option<&CandidateSet> {
        self.stack.len().checked_sub(depth + 1).map(|i| &self.stack[i])
    }

    /// Number of candidate-sets on the stack.
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Whether no token was pushed yet.
    pub fn is_empty(&self) -> bool {
        self.postfix.is_empty()
    }

    /// A complete route reduces to a single candidate-set.
    pub fn is_complete(&self) -> bool {
        self.stack.len() == 1
    }

    /// Every token pushed so far, operands and operators interleaved in
    /// application order.
    pub fn postfix_notation(&self) -> &[Token] {
        &self.postfix
    }

    /// Number of operator tokens.
    pub fn count_reactions(&self) -> usize {
        self.postfix.iter().filter(|t| t.is_reaction()).count()
    }

    /// Number of operand tokens, building blocks and other molecules alike.
    pub fn count_building_blocks(&self) -> usize {
        self.postfix.len() - self.count_reactions()
    }

    /// The top-set member with the most heavy atoms; ties go to the first in
    /// canonical order.
    pub fn main_product(&self, engine: &dyn ChemistryEngine) -> Option<&Molecule> {
        let mut best: Option<(usize, &Molecule)> = None;
        for molecule in self.top()? {
            let atoms = engine.heavy_atom_count(molecule);
            if best.map_or(true, |(n, _)| atoms > n) {
                best = Some((atoms, molecule));
            }
        }
        best.map(|(_, m)| m)
    }

    /// Write the route, tokens and stack, to a `.pxs` file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        prexsyn_pack::save(path, self).map_err(|e| SpaceError::cache(path, e))
    }

    /// Read a route written by [`save`](Self::save). Fails with
    /// [`SpaceError::Cache`] on a damaged or foreign file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prexsyn_pack::load(path).map_err(|e| SpaceError::cache(path, e))
    }
}

fn is_permutation(binding: &[usize], arity: usize) -> bool {
    if binding.len() != arity {
        return false;
    }
    let mut seen = vec![false; arity];
    for &operand in binding {
        if operand >= arity || seen[operand] {
            return false;
        }
        seen[operand] = true;
    }
    true
}

/// Run the template over the cartesian product of the slot candidate-sets.
fn apply_all(
    engine: &dyn ChemistryEngine,
    reaction: &ReactionTemplate,
    slots: &[&CandidateSet],
) -> std::result::Result<Vec<Molecule>, SynthesisError> {
    let pools: Vec<Vec<&Molecule>> = slots.iter().map(|s| s.iter().collect()).collect();
    if pools.iter().any(Vec::is_empty) {
        return Ok(Vec::new());
    }

    let mut products = Vec::new();
    let mut cursor = vec![0usize; pools.len()];
    loop {
        let reactants: Vec<&Molecule> = cursor
            .iter()
            .zip(&pools)
            .map(|(&i, pool)| pool[i])
            .collect();
        if let Ok(mut out) = engine.run_reactants(reaction, &reactants) {
            products.append(&mut out);
        }

        // Odometer increment over the pools, last slot fastest.
        let mut slot = pools.len();
        loop {
            if slot == 0 {
                return Ok(products);
            }
            slot -= 1;
            cursor[slot] += 1;
            if cursor[slot] < pools[slot].len() {
                break;
            }
            cursor[slot] = 0;
        }
    }
}

/// Many routes persisted together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SynthesisVector {
    routes: Vec<Synthesis>,
}

impl SynthesisVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, synthesis: Synthesis) {
        self.routes.push(synthesis);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Synthesis> {
        self.routes.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Synthesis> {
        self.routes.iter()
    }

    pub fn as_slice(&self) -> &[Synthesis] {
        &self.routes
    }

    /// Write every route to one `.pxs` file, in order.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        prexsyn_pack::save(path, self).map_err(|e| SpaceError::cache(path, e))
    }

    /// Routes come back as saved, incomplete ones included.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        prexsyn_pack::load(path).map_err(|e| SpaceError::cache(path, e))
    }
}

impl From<Vec<Synthesis>> for SynthesisVector {
    fn from(routes: Vec<Synthesis>) -> Self {
        Self { routes }
    }
}

impl FromIterator<Synthesis> for SynthesisVector {
    fn from_iter<I: IntoIterator<Item = Synthesis>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SynthesisVector {
    type Item = &'a Synthesis;
    type IntoIter = std::slice::Iter<'a, Synthesis>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}

impl Packable for Synthesis {
    const KIND: PackKind = PackKind::Synthesis;

    fn item_count(&self) -> u64 {
        self.postfix.len() as u64
    }
}

impl Packable for SynthesisVector {
    const KIND: PackKind = PackKind::SynthesisVector;

    fn item_count(&self) -> u64 {
        self.routes.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prexsyn_chem::TableEngine;

    const COUPLING: &str = "[C:1]Br.[N:2]>>[C:1][N:2]";

    fn engine() -> TableEngine {
        TableEngine::new()
            .with_outcome(COUPLING, &["CBr", "CN"], &["CNC"])
            .with_outcome(COUPLING, &["CCBr", "CN"], &["CCNC"])
            .with_outcome(COUPLING, &["CBr", "CCN"], &["CNCC", "CNCC"])
    }

    fn coupling() -> Arc<ReactionTemplate> {
        Arc::new(ReactionTemplate::from_smarts(COUPLING).unwrap())
    }

    fn mol(s: &str) -> Molecule {
        Molecule::from_canonical(s)
    }

    #[test]
    fn push_reaction_replaces_operands_with_products() {
        let mut syn = Synthesis::new();
        syn.push_building_block(4, mol("CBr"));
        syn.push_mol(mol("CN"));
        syn.push_reaction(&engine(), &coupling()).unwrap();

        assert_eq!(syn.stack_size(), 1);
        assert!(syn.is_complete());
        assert_eq!(syn.top(), Some(&CandidateSet::from([mol("CNC")])));
        assert_eq!(syn.postfix_notation().len(), 3);
        assert_eq!(syn.count_reactions(), 1);
        assert_eq!(syn.count_building_blocks(), 2);
        assert!(matches!(
            syn.postfix_notation()[0],
            Token::Molecule { building_block: Some(4), .. }
        ));
    }

    #[test]
    fn candidate_sets_combine_every_pairing() {
        let mut first = Synthesis::new();
        first.push_mol(mol("CBr"));
        let mut syn = Synthesis::new();
        syn.push_synthesis(&first);
        syn.push_mol(mol("CN"));
        syn.stack[1].insert(mol("CCN"));
        syn.push_reaction(&engine(), &coupling()).unwrap();
        assert_eq!(
            syn.top(),
            Some(&CandidateSet::from([mol("CNC"), mol("CNCC")]))
        );
    }

    #[test]
    fn arity_error_leaves_state_unchanged() {
        let mut syn = Synthesis::new();
        syn.push_mol(mol("CBr"));
        let before = syn.clone();
        let err = syn.push_reaction(&engine(), &coupling()).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::Arity { required: 2, available: 1, .. }
        ));
        assert_eq!(syn, before);
    }

    #[test]
    fn failed_application_leaves_state_unchanged() {
        let mut syn = Synthesis::new();
        syn.push_mol(mol("CN"));
        syn.push_mol(mol("CBr"));
        let before = syn.clone();
        let err = syn.push_reaction(&engine(), &coupling()).unwrap_err();
        assert!(matches!(err, SynthesisError::ReactionApplication { .. }));
        assert_eq!(syn, before);
    }

    #[test]
    fn binding_swaps_operands() {
        let mut syn = Synthesis::new();
        syn.push_mol(mol("CN"));
        syn.push_mol(mol("CBr"));
        let options = ApplyOptions::default()
            .with_binding(vec![1, 0])
            .with_reaction_index(3);
        syn.push_reaction_with(&engine(), &coupling(), &options).unwrap();
        assert_eq!(syn.top(), Some(&CandidateSet::from([mol("CNC")])));
        assert!(matches!(
            syn.postfix_notation()[2],
            Token::Reaction { index: Some(3), .. }
        ));

        let mut bad = Synthesis::new();
        bad.push_mol(mol("CN"));
        bad.push_mol(mol("CBr"));
        let options = ApplyOptions::default().with_binding(vec![1, 1]);
        assert!(matches!(
            bad.push_reaction_with(&engine(), &coupling(), &options),
            Err(SynthesisError::InvalidBinding { .. })
        ));
    }

    #[test]
    fn max_products_keeps_canonical_prefix() {
        let engine = TableEngine::new().with_reaction_fn("[C:1]>>[C:1]O", |r| {
            vec![format!("{}O", r[0]), format!("{}N", r[0]), format!("{}S", r[0])]
        });
        let rxn = Arc::new(ReactionTemplate::from_smarts("[C:1]>>[C:1]O").unwrap());
        let mut syn = Synthesis::new();
        syn.push_mol(mol("C"));
        syn.push_reaction_with(&engine, &rxn, &ApplyOptions::default().with_max_products(2))
            .unwrap();
        assert_eq!(syn.top(), Some(&CandidateSet::from([mol("CN"), mol("CO")])));
    }

    #[test]
    fn main_product_prefers_heavier_then_canonical_order() {
        let engine = TableEngine::new();
        let mut syn = Synthesis::new();
        syn.push_mol(mol("CO"));
        syn.stack[0].insert(mol("CCO"));
        syn.stack[0].insert(mol("CCN"));
        assert_eq!(syn.main_product(&engine), Some(&mol("CCN")));
        assert_eq!(Synthesis::new().main_product(&engine), None);
    }

    const OXIDATION: &str = "[C:1]O>>[C:1]=O";

    fn oxidized(engine: &TableEngine) -> Synthesis {
        let rxn = Arc::new(ReactionTemplate::from_smarts(OXIDATION).unwrap());
        let mut syn = Synthesis::new();
        syn.push_building_block(0, mol("OCCO"));
        let options = ApplyOptions::default().with_reaction_index(1);
        syn.push_reaction_with(engine, &rxn, &options).unwrap();
        syn
    }

    #[test]
    fn select_product_narrows_top_and_records_it() {
        let engine = TableEngine::new().with_outcome(OXIDATION, &["OCCO"], &["O=CCO", "OCC=O"]);
        let mut syn = oxidized(&engine);
        assert_eq!(syn.top().map(|t| t.len()), Some(2));

        assert!(!syn.select_product(&mol("N")));
        assert!(syn.select_product(&mol("OCC=O")));
        assert_eq!(syn.top(), Some(&CandidateSet::from([mol("OCC=O")])));
        assert!(matches!(
            &syn.postfix_notation()[1],
            Token::Reaction { product: Some(p), .. } if *p == mol("OCC=O")
        ));
    }

    #[test]
    fn replay_reaches_the_stored_top() {
        let engine = TableEngine::new().with_outcome(OXIDATION, &["OCCO"], &["O=CCO", "OCC=O"]);
        let mut syn = oxidized(&engine);
        syn.select_product(&mol("OCC=O"));
        let replayed = Synthesis::replay(&engine, syn.postfix_notation(), 8).unwrap();
        assert_eq!(replayed, syn);

        let mut swapped = Synthesis::new();
        swapped.push_mol(mol("CN"));
        swapped.push_mol(mol("CBr"));
        let options = ApplyOptions::default().with_binding(vec![1, 0]);
        swapped.push_reaction_with(&self::engine(), &coupling(), &options).unwrap();
        let replayed = Synthesis::replay(&self::engine(), swapped.postfix_notation(), 8).unwrap();
        assert_eq!(replayed, swapped);
    }

    #[test]
    fn replay_fails_when_recorded_product_is_missing() {
        let engine = TableEngine::new().with_outcome(OXIDATION, &["OCCO"], &["O=CCO", "OCC=O"]);
        let mut syn = oxidized(&engine);
        syn.select_product(&mol("OCC=O"));

        let other = TableEngine::new().with_outcome(OXIDATION, &["OCCO"], &["O=CCO"]);
        assert!(matches!(
            Synthesis::replay(&other, syn.postfix_notation(), 8),
            Err(SynthesisError::ReactionApplication { .. })
        ));
    }

    #[test]
    fn top_at_counts_from_top() {
        let mut syn = Synthesis::new();
        syn.push_mol(mol("A"));
        syn.push_mol(mol("B"));
        assert_eq!(syn.top_at(0), Some(&CandidateSet::from([mol("B")])));
        assert_eq!(syn.top_at(1), Some(&CandidateSet::from([mol("A")])));
        assert_eq!(syn.top_at(2), None);
    }

    #[test]
    fn serde_round_trip_is_exact() {
        let mut syn = Synthesis::new();
        syn.push_building_block(0, mol("CBr"));
        syn.push_building_block(1, mol("CN"));
        let options = ApplyOptions::default().with_reaction_index(0);
        syn.push_reaction_with(&engine(), &coupling(), &options).unwrap();

        let json = serde_json::to_string(&syn).unwrap();
        let back: Synthesis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, syn);
    }

    #[test]
    fn vector_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.pxs");
        let mut a = Synthesis::new();
        a.push_mol(mol("CBr"));
        let mut b = a.clone();
        b.push_mol(mol("CN"));
        b.push_reaction(&engine(), &coupling()).unwrap();
        let routes: SynthesisVector = vec![a, b].into();

        routes.save(&path).unwrap();
        assert_eq!(SynthesisVector::load(&path).unwrap(), routes);
        routes.get(1).unwrap().save(&path).unwrap();
        assert_eq!(&Synthesis::load(&path).unwrap(), routes.get(1).unwrap());
    }
}
