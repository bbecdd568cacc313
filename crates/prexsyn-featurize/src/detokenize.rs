//! Rebuilding routes from postfix token sequences.
//!
//! The inverse of [`PostfixNotationFeaturizer`](crate::PostfixNotationFeaturizer):
//! the three aligned sequences it emits (token types, building-block
//! positions, reaction positions) are replayed against a chemical space.
//! The encoding keeps neither slot bindings nor product choices, so each
//! reaction token is tried in stack order first and then under every other
//! operand order; the first that yields products wins.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use prexsyn_chem::ChemistryEngine;
use prexsyn_core::{ApplyOptions, ChemicalSpaceDefinition, Synthesis, SynthesisVector};

use crate::error::{FeaturizeError, Result};
use crate::postfix::TokenTypes;

pub struct Detokenizer {
    space: Arc<ChemicalSpaceDefinition>,
    engine: Arc<dyn ChemistryEngine>,
    types: TokenTypes,
    max_products: usize,
}

impl Detokenizer {
    pub fn new(space: Arc<ChemicalSpaceDefinition>, engine: Arc<dyn ChemistryEngine>) -> Self {
        Self {
            space,
            engine,
            types: TokenTypes::default(),
            max_products: ApplyOptions::default().max_products,
        }
    }

    /// Must match the ids the sequences were encoded with.
    pub fn with_token_types(mut self, types: TokenTypes) -> Self {
        self.types = types;
        self
    }

    /// Product cap per reaction token. Zero keeps all.
    pub fn with_max_products(mut self, max_products: usize) -> Self {
        self.max_products = max_products;
        self
    }

    /// Rebuild one route.
    ///
    /// Reading stops at the first END; START and PAD are skipped. A reaction
    /// token that applies under no operand order is skipped as well, so the
    /// result may be incomplete: check [`Synthesis::is_complete`].
    ///
    /// Fails when the sequences differ in length, when a position points
    /// outside the building-block or reaction list, or on a token type the
    /// configured ids do not name.
    pub fn detokenize_one(
        &self,
        token_types: &[i64],
        bb_indices: &[i64],
        rxn_indices: &[i64],
    ) -> Result<Synthesis> {
        check_aligned(token_types, bb_indices, rxn_indices)?;

        let mut synthesis = Synthesis::new();
        for (position, &token_type) in token_types.iter().enumerate() {
            if token_type == self.types.end {
                break;
            } else if token_type == self.types.start || token_type == self.types.pad {
                continue;
            } else if token_type == self.types.building_block {
                let index = bb_indices[position];
                let (block, molecule) = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.space.building_block(i).map(|m| (i, m)))
                    .ok_or(FeaturizeError::TokenIndex {
                        position,
                        kind: TokenKind::BuildingBlock,
                        index,
                    })?;
                synthesis.push_building_block(block, molecule.clone());
            } else if token_type == self.types.reaction {
                let index = rxn_indices[position];
                let reaction = usize::try_from(index)
                    .ok()
                    .filter(|&i| i < self.space.num_reactions())
                    .ok_or(FeaturizeError::TokenIndex {
                        position,
                        kind: TokenKind::Reaction,
                        index,
                    })?;
                self.apply(&mut synthesis, position, reaction);
            } else {
                return Err(FeaturizeError::UnknownTokenType {
                    position,
                    token_type,
                });
            }
        }
        Ok(synthesis)
    }

    /// Rebuild a batch of routes laid out row-major, `stride` tokens per
    /// row. Rows are decoded in parallel; the output keeps row order.
    pub fn detokenize_many(
        &self,
        token_types: &[i64],
        bb_indices: &[i64],
        rxn_indices: &[i64],
        stride: usize,
    ) -> Result<SynthesisVector> {
        check_aligned(token_types, bb_indices, rxn_indices)?;
        if stride == 0 || token_types.len() % stride != 0 {
            return Err(FeaturizeError::Misaligned(format!(
                "{} tokens do not split into rows of {stride}",
                token_types.len()
            )));
        }
        let routes = token_types
            .par_chunks(stride)
            .zip(bb_indices.par_chunks(stride))
            .zip(rxn_indices.par_chunks(stride))
            .map(|((types, bb), rxn)| self.detokenize_one(types, bb, rxn))
            .collect::<Result<Vec<Synthesis>>>()?;
        Ok(SynthesisVector::from(routes))
    }

    fn apply(&self, synthesis: &mut Synthesis, position: usize, reaction: usize) {
        let Some(template) = self.space.reaction(reaction) else {
            return;
        };
        let base = ApplyOptions::default()
            .with_max_products(self.max_products)
            .with_reaction_index(reaction);

        let mut last_error = match synthesis.push_reaction_with(self.engine.as_ref(), template, &base)
        {
            Ok(()) => return,
            Err(e) => e,
        };
        let arity = template.arity();
        if synthesis.stack_size() >= arity {
            for binding in operand_orders(arity).skip(1) {
                let options = base.clone().with_binding(binding);
                match synthesis.push_reaction_with(self.engine.as_ref(), template, &options) {
                    Ok(()) => return,
                    Err(e) => last_error = e,
                }
            }
        }
        debug!(position, reaction, error = %last_error, "skipping reaction token");
    }
}

impl fmt::Debug for Detokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detokenizer")
            .field("engine", &self.engine.name())
            .field("types", &self.types)
            .field("max_products", &self.max_products)
            .finish()
    }
}

/// Which list a token position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    BuildingBlock,
    Reaction,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::BuildingBlock => f.write_str("building-block"),
            TokenKind::Reaction => f.write_str("reaction"),
        }
    }
}

fn check_aligned(token_types: &[i64], bb_indices: &[i64], rxn_indices: &[i64]) -> Result<()> {
    if token_types.len() != bb_indices.len() || token_types.len() != rxn_indices.len() {
        return Err(FeaturizeError::Misaligned(format!(
            "{} token types, {} building-block indices, {} reaction indices",
            token_types.len(),
            bb_indices.len(),
            rxn_indices.len()
        )));
    }
    Ok(())
}

/// Every permutation of `0..n` in lexicographic order, identity first.
fn operand_orders(n: usize) -> impl Iterator<Item = Vec<usize>> {
    let mut next = Some((0..n).collect::<Vec<usize>>());
    std::iter::from_fn(move || {
        let current = next.take()?;
        let mut following = current.clone();
        // Standard next-permutation step.
        if let Some(i) = (1..following.len()).rev().find(|&i| following[i - 1] < following[i]) {
            let pivot = i - 1;
            if let Some(j) = (i..following.len()).rev().find(|&j| following[j] > following[pivot]) {
                following.swap(pivot, j);
                following[i..].reverse();
                next = Some(following);
            }
        }
        Some(current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::Featurizer;
    use crate::{FeatureValue, PostfixNotationFeaturizer};
    use prexsyn_chem::{Molecule, ReactionTemplate, TableEngine};
    use prexsyn_core::{
        BuildingBlockList, ChemicalSpaceDefinitionBuilder, ReactionList, SynthesisGenerator,
        SynthesisGeneratorOption, Token,
    };

    const COUPLING: &str = "[C:1]Br.[N:2]>>[C:1][N:2]";
    const AMIDATION: &str = "[C:1]O.[N:2]>>[C:1][N:2]";

    fn engine() -> Arc<dyn ChemistryEngine> {
        Arc::new(
            TableEngine::new()
                .with_pattern_fn("[C:1]Br", |s| s.ends_with("Br"))
                .with_pattern_fn("[N:2]", |s| s.starts_with('N'))
                .with_pattern_fn("[C:1]O", |s| s == "CCO")
                .with_reaction_fn(COUPLING, |r| {
                    vec![format!("{}{}", r[0].trim_end_matches("Br"), r[1])]
                })
                .with_outcome(AMIDATION, &["CCO", "NC"], &["CCNC"]),
        )
    }

    fn space(engine: &Arc<dyn ChemistryEngine>) -> Arc<ChemicalSpaceDefinition> {
        space_with(engine, &[COUPLING, AMIDATION])
    }

    fn space_with(
        engine: &Arc<dyn ChemistryEngine>,
        templates: &[&str],
    ) -> Arc<ChemicalSpaceDefinition> {
        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CCBr", "N", "NC", "NCCBr", "CCO"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions = ReactionList::from_templates(
            templates
                .iter()
                .map(|s| ReactionTemplate::from_smarts(s).unwrap()),
        );
        let space = ChemicalSpaceDefinitionBuilder::new(Arc::clone(engine))
            .building_blocks(blocks)
            .unwrap()
            .reactions(reactions)
            .unwrap()
            .build_primary_index()
            .unwrap()
            .no_secondary_building_blocks()
            .unwrap()
            .build_secondary_index()
            .unwrap()
            .build()
            .unwrap();
        Arc::new(space)
    }

    fn rows(fields: &[(String, FeatureValue)]) -> (Vec<i64>, Vec<i64>, Vec<i64>) {
        let get = |key: &str| match &fields.iter().find(|(k, _)| k == key).unwrap().1 {
            FeatureValue::LongVec(v) => v.clone(),
            other => panic!("{key} is not a long vector: {other:?}"),
        };
        (get("token_types"), get("bb_indices"), get("rxn_indices"))
    }

    #[test]
    fn generated_routes_survive_a_round_trip() {
        let engine = engine();
        let space = space_with(&engine, &[COUPLING]);
        let option = SynthesisGeneratorOption {
            max_reactions: 3,
            seed: 3,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator =
            SynthesisGenerator::new(Arc::clone(&space), Arc::clone(&engine), option).unwrap();
        let postfix = PostfixNotationFeaturizer::new("syn");
        let detokenizer = Detokenizer::new(space, Arc::clone(&engine));

        for _ in 0..20 {
            let route = generator.next().unwrap();
            let encoded = postfix.featurize(&route, engine.as_ref()).unwrap();
            let (types, bb, rxn) = rows(&encoded);

            let rebuilt = detokenizer.detokenize_one(&types, &bb, &rxn).unwrap();
            assert!(rebuilt.is_complete());
            assert_eq!(rebuilt.count_reactions(), route.count_reactions());
            assert_eq!(postfix.featurize(&rebuilt, engine.as_ref()).unwrap(), encoded);
        }
    }

    #[test]
    fn batch_keeps_row_order() {
        let engine = engine();
        let detokenizer = Detokenizer::new(space(&engine), Arc::clone(&engine));
        let types = [2, 3, 3, 4, 1, 0, 2, 3, 1, 0, 0, 0];
        let bb = [0, 0, 2, 0, 0, 0, 0, 4, 0, 0, 0, 0];
        let rxn = [0; 12];

        let routes = detokenizer.detokenize_many(&types, &bb, &rxn, 6).unwrap();
        assert_eq!(routes.len(), 2);
        let first = routes.get(0).unwrap();
        assert!(first.is_complete());
        assert!(first.top().unwrap().contains(&Molecule::from_canonical("CN")));
        let second = routes.get(1).unwrap();
        assert_eq!(second.count_building_blocks(), 1);
        assert!(second.top().unwrap().contains(&Molecule::from_canonical("NCCBr")));
    }

    #[test]
    fn reaction_falls_back_to_swapped_operands() {
        let engine = engine();
        let detokenizer = Detokenizer::new(space(&engine), Arc::clone(&engine));
        // NC is pushed first, so stack order binds it to the alcohol slot.
        let route = detokenizer
            .detokenize_one(&[2, 3, 3, 4, 1], &[0, 3, 5, 0, 0], &[0, 0, 0, 1, 0])
            .unwrap();
        assert!(route.is_complete());
        assert!(route.top().unwrap().contains(&Molecule::from_canonical("CCNC")));
        assert!(matches!(
            route.postfix_notation().last(),
            Some(Token::Reaction { index: Some(1), binding: Some(b), .. }) if b == &vec![1, 0]
        ));
    }

    #[test]
    fn inapplicable_reaction_is_skipped() {
        let engine = engine();
        let detokenizer = Detokenizer::new(space(&engine), Arc::clone(&engine));
        // CBr and N never amidate, and the leading reaction has no operands.
        let route = detokenizer
            .detokenize_one(&[2, 4, 3, 3, 4, 1], &[0, 0, 0, 2, 0, 0], &[0, 0, 0, 0, 1, 0])
            .unwrap();
        assert_eq!(route.count_reactions(), 0);
        assert_eq!(route.stack_size(), 2);
        assert!(!route.is_complete());
    }

    #[test]
    fn reading_stops_at_end() {
        let engine = engine();
        let detokenizer = Detokenizer::new(space(&engine), Arc::clone(&engine));
        let route = detokenizer
            .detokenize_one(&[2, 3, 1, 3, 9], &[0, 1, 0, 99, 0], &[0; 5])
            .unwrap();
        assert_eq!(route.count_building_blocks(), 1);
        assert!(route.is_complete());
    }

    #[test]
    fn bad_tokens_are_errors() {
        let engine = engine();
        let detokenizer = Detokenizer::new(space(&engine), Arc::clone(&engine));

        assert_eq!(
            detokenizer.detokenize_one(&[2, 3, 1], &[0, 6, 0], &[0; 3]).unwrap_err(),
            FeaturizeError::TokenIndex {
                position: 1,
                kind: TokenKind::BuildingBlock,
                index: 6,
            }
        );
        assert_eq!(
            detokenizer.detokenize_one(&[3, 4], &[-1, 0], &[0, 0]).unwrap_err(),
            FeaturizeError::TokenIndex {
                position: 0,
                kind: TokenKind::BuildingBlock,
                index: -1,
            }
        );
        assert_eq!(
            detokenizer.detokenize_one(&[3, 4], &[0, 0], &[0, 2]).unwrap_err(),
            FeaturizeError::TokenIndex {
                position: 1,
                kind: TokenKind::Reaction,
                index: 2,
            }
        );
        assert_eq!(
            detokenizer.detokenize_one(&[2, 7, 1], &[0; 3], &[0; 3]).unwrap_err(),
            FeaturizeError::UnknownTokenType {
                position: 1,
                token_type: 7,
            }
        );
        assert!(matches!(
            detokenizer.detokenize_one(&[2, 1], &[0], &[0, 0]),
            Err(FeaturizeError::Misaligned(_))
        ));
        assert!(matches!(
            detokenizer.detokenize_many(&[2, 1, 0], &[0; 3], &[0; 3], 2),
            Err(FeaturizeError::Misaligned(_))
        ));
        assert!(matches!(
            detokenizer.detokenize_many(&[], &[], &[], 0),
            Err(FeaturizeError::Misaligned(_))
        ));
    }

    #[test]
    fn custom_token_types_are_honoured() {
        let engine = engine();
        let types = TokenTypes {
            pad: -1,
            end: 10,
            start: 11,
            building_block: 12,
            reaction: 13,
        };
        let detokenizer =
            Detokenizer::new(space(&engine), Arc::clone(&engine)).with_token_types(types);
        let route = detokenizer
            .detokenize_one(&[11, 12, 12, 13, 10, -1], &[0, 0, 2, 0, 0, 0], &[0; 6])
            .unwrap();
        assert!(route.is_complete());
        assert_eq!(route.count_reactions(), 1);
    }

    #[test]
    fn operand_orders_are_lexicographic() {
        let orders: Vec<Vec<usize>> = operand_orders(3).collect();
        assert_eq!(
            orders,
            vec![
                vec![0, 1, 2],
                vec![0, 2, 1],
                vec![1, 0, 2],
                vec![1, 2, 0],
                vec![2, 0, 1],
                vec![2, 1, 0],
            ]
        );
        assert_eq!(operand_orders(1).collect::<Vec<_>>(), vec![vec![0]]);
        assert_eq!(operand_orders(0).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
    }
}
