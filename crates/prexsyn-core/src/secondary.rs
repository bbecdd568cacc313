//! Secondary building blocks: intermediates produced by one prior reaction.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use prexsyn_chem::{ChemistryEngine, Molecule};

use crate::building_blocks::BuildingBlockList;
use crate::index::CompatibilityIndex;
use crate::reactions::ReactionList;
use crate::synthesis::{ApplyOptions, Synthesis, SynthesisVector};

/// Upper bound on up-front allocation for sampled combinations.
const SAMPLE_PREALLOC: usize = 4096;

/// How secondary building blocks are produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SecondaryPolicy {
    None,
    SingleReaction(SingleReactionOptions),
    /// Multi-step intermediates. Not available yet: selecting it is a
    /// configuration error.
    Chained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleReactionOptions {
    /// Above this many reactant combinations, a reaction is sampled instead
    /// of enumerated.
    pub max_combinations_per_reaction: usize,
    pub seed: u64,
    pub max_products: usize,
}

impl Default for SingleReactionOptions {
    fn default() -> Self {
        Self {
            max_combinations_per_reaction: 10_000,
            seed: 0,
            max_products: 8,
        }
    }
}

/// Apply every reaction once to primary-compatible building blocks.
///
/// Each distinct product becomes one entry: a complete route narrowed to
/// that product with [`Synthesis::select_product`], so the choice is part of
/// its tokens. Entries are ordered by reaction, then combination, then
/// canonical product order.
pub fn from_single_reaction(
    engine: &dyn ChemistryEngine,
    building_blocks: &BuildingBlockList,
    reactions: &ReactionList,
    primary: &CompatibilityIndex,
    options: &SingleReactionOptions,
) -> SynthesisVector {
    info!(
        reactions = reactions.len(),
        cap = options.max_combinations_per_reaction,
        "generating secondary building blocks from single reactions"
    );

    let per_reaction: Vec<Vec<Synthesis>> = (0..reactions.len())
        .into_par_iter()
        .map(|r| routes_for_reaction(engine, building_blocks, reactions, primary, options, r))
        .collect();

    let mut seen: HashSet<Molecule> = HashSet::new();
    let mut out = SynthesisVector::new();
    for route in per_reaction.into_iter().flatten() {
        let Some(top) = route.top() else { continue };
        let products: Vec<Molecule> = top.iter().cloned().collect();
        for product in products {
            if !seen.insert(product.clone()) {
                continue;
            }
            let mut entry = route.clone();
            entry.select_product(&product);
            out.push(entry);
        }
    }
    info!(count = out.len(), "generated secondary building blocks");
    out
}

fn routes_for_reaction(
    engine: &dyn ChemistryEngine,
    building_blocks: &BuildingBlockList,
    reactions: &ReactionList,
    primary: &CompatibilityIndex,
    options: &SingleReactionOptions,
    reaction: usize,
) -> Vec<Synthesis> {
    let Some(template) = reactions.get(reaction) else {
        return Vec::new();
    };
    let pools: Vec<&[usize]> = (0..template.arity())
        .map(|slot| primary.candidates(reaction, slot))
        .collect();
    let apply = ApplyOptions::default()
        .with_max_products(options.max_products)
        .with_reaction_index(reaction);

    combinations(&pools, options, reaction)
        .into_iter()
        .filter_map(|combo| {
            let mut route = Synthesis::new();
            for &position in &combo {
                let molecule = building_blocks.get(position)?.clone();
                route.push_building_block(position, molecule);
            }
            route.push_reaction_with(engine, template, &apply).ok()?;
            Some(route)
        })
        .collect()
}

/// All reactant combinations in odometer order, or a seeded sample of
/// `max_combinations_per_reaction` of them when there are more.
fn combinations(
    pools: &[&[usize]],
    options: &SingleReactionOptions,
    reaction: usize,
) -> Vec<Vec<usize>> {
    if pools.is_empty() || pools.iter().any(|p| p.is_empty()) {
        return Vec::new();
    }
    let total = pools
        .iter()
        .try_fold(1usize, |acc, p| acc.checked_mul(p.len()));
    let cap = options.max_combinations_per_reaction;

    match total {
        Some(total) if total <= cap => {
            let mut out = Vec::with_capacity(total);
            let mut cursor = vec![0usize; pools.len()];
            'outer: loop {
                out.push(cursor.iter().zip(pools).map(|(&i, p)| p[i]).collect());
                let mut slot = pools.len();
                loop {
                    if slot == 0 {
                        break 'outer;
                    }
                    slot -= 1;
                    cursor[slot] += 1;
                    if cursor[slot] < pools[slot].len() {
                        break;
                    }
                    cursor[slot] = 0;
                }
            }
            out
        }
        _ => {
            let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(reaction as u64));
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(cap.min(SAMPLE_PREALLOC));
            for _ in 0..cap.saturating_mul(2) {
                if out.len() == cap {
                    break;
                }
                let combo: Vec<usize> = pools.iter().map(|p| p[rng.gen_range(0..p.len())]).collect();
                if seen.insert(combo.clone()) {
                    out.push(combo);
                }
            }
            out
        }
    }
}
