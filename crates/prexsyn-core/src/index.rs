//! Reaction/slot compatibility index.
//!
//! For every reaction and reactant slot the index lists, in ascending order,
//! the positions of the items accepted by the slot pattern. The primary
//! index covers the building-block list; the secondary index covers the
//! secondary building blocks.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use prexsyn_chem::{ChemistryEngine, Molecule, ReactionTemplate};

use crate::building_blocks::BuildingBlockList;
use crate::error::{Result, SpaceError};
use crate::reactions::ReactionList;
use crate::synthesis::Synthesis;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompatibilityIndex {
    /// `links[reaction][slot]` holds sorted item positions.
    links: Vec<Vec<Vec<usize>>>,
}

impl CompatibilityIndex {
    /// Index building blocks against every reaction slot.
    ///
    /// Every template is first checked by the engine; an unusable one fails
    /// the build with [`SpaceError::Definition`].
    pub fn build_primary(
        engine: &dyn ChemistryEngine,
        building_blocks: &BuildingBlockList,
        reactions: &ReactionList,
    ) -> Result<Self> {
        check_reactions(engine, reactions)?;
        info!(
            reactions = reactions.len(),
            building_blocks = building_blocks.len(),
            "building primary index"
        );
        let blocks = building_blocks.blocks();
        let index = Self::scan(reactions, blocks.len(), |template, slot, i| {
            engine.matches_slot(&blocks[i].molecule, template, slot)
        });
        info!(links = index.total_links(), "primary index built");
        Ok(index)
    }

    /// Index secondary building blocks: an entry fits a slot when any
    /// molecule of its top candidate-set does. Incomplete entries fit no
    /// slot.
    pub fn build_secondary(
        engine: &dyn ChemistryEngine,
        secondary: &[Synthesis],
        reactions: &ReactionList,
    ) -> Self {
        info!(
            reactions = reactions.len(),
            secondary_building_blocks = secondary.len(),
            "building secondary index"
        );
        let index = Self::scan(reactions, secondary.len(), |template, slot, i| {
            let entry = &secondary[i];
            entry.is_complete()
                && entry
                    .top()
                    .is_some_and(|top| top.iter().any(|m| engine.matches_slot(m, template, slot)))
        });
        info!(links = index.total_links(), "secondary index built");
        index
    }

    #[cfg(test)]
    pub(crate) fn from_links(links: Vec<Vec<Vec<usize>>>) -> Self {
        Self { links }
    }

    fn scan<F>(reactions: &ReactionList, items: usize, accepts: F) -> Self
    where
        F: Fn(&ReactionTemplate, usize, usize) -> bool + Sync,
    {
        let links: Vec<Vec<Vec<usize>>> = reactions
            .iter()
            .map(|entry| {
                let template = entry.template.as_ref();
                (0..template.arity())
                    .map(|slot| {
                        (0..items)
                            .into_par_iter()
                            .filter(|&i| accepts(template, slot, i))
                            .collect::<Vec<usize>>()
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { links }
    }

    /// Item positions accepted by `(reaction, slot)`; empty when out of range.
    pub fn candidates(&self, reaction: usize, slot: usize) -> &[usize] {
        self.links
            .get(reaction)
            .and_then(|slots| slots.get(slot))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn num_reactions(&self) -> usize {
        self.links.len()
    }

    pub fn num_slots(&self, reaction: usize) -> usize {
        self.links.get(reaction).map_or(0, Vec::len)
    }

    pub fn total_links(&self) -> usize {
        self.links.iter().flatten().map(Vec::len).sum()
    }

    /// Whether every slot of `reaction` has at least one candidate.
    pub fn is_satisfiable(&self, reaction: usize) -> bool {
        self.links
            .get(reaction)
            .is_some_and(|slots| slots.iter().all(|s| !s.is_empty()))
    }
}

fn check_reactions(engine: &dyn ChemistryEngine, reactions: &ReactionList) -> Result<()> {
    for (i, entry) in reactions.iter().enumerate() {
        engine
            .check_reaction(&entry.template)
            .map_err(|e| SpaceError::Definition {
                reaction: i,
                detail: e.to_string(),
            })?;
    }
    Ok(())
}

/// Every `(reaction, slot)` whose pattern accepts `molecule`, in order.
pub fn matching_slots(
    engine: &dyn ChemistryEngine,
    reactions: &ReactionList,
    molecule: &Molecule,
) -> Vec<(usize, usize)> {
    reactions
        .iter()
        .enumerate()
        .flat_map(|(r, entry)| {
            (0..entry.template.arity())
                .filter(move |&slot| engine.matches_slot(molecule, &entry.template, slot))
                .map(move |slot| (r, slot))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prexsyn_chem::TableEngine;

    fn fixture() -> (TableEngine, BuildingBlockList, ReactionList) {
        let engine = TableEngine::new()
            .with_pattern_fn("[C:1]Br", |s| s.ends_with("Br"))
            .with_pattern_fn("[N:2]", |s| s.contains('N'))
            .with_pattern_fn("[C:1]O", |s| s.ends_with('O'));
        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CN", "CCO", "NCCBr"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions = ReactionList::from_templates(
            ["[C:1]Br.[N:2]>>[C:1][N:2]", "[C:1]O>>[C:1]Cl"]
                .iter()
                .map(|s| ReactionTemplate::from_smarts(s).unwrap()),
        );
        (engine, blocks, reactions)
    }

    #[test]
    fn primary_index_is_sound_and_sorted() {
        let (engine, blocks, reactions) = fixture();
        let index = CompatibilityIndex::build_primary(&engine, &blocks, &reactions).unwrap();

        assert_eq!(index.num_reactions(), 2);
        assert_eq!(index.num_slots(0), 2);
        assert_eq!(index.candidates(0, 0), &[0, 3]);
        assert_eq!(index.candidates(0, 1), &[1, 3]);
        assert_eq!(index.candidates(1, 0), &[2]);
        assert!(index.candidates(1, 1).is_empty());
        assert!(index.candidates(9, 0).is_empty());
        assert_eq!(index.total_links(), 5);

        for r in 0..reactions.len() {
            let template = reactions.get(r).unwrap();
            for slot in 0..template.arity() {
                for &i in index.candidates(r, slot) {
                    assert!(engine.matches_slot(blocks.get(i).unwrap(), template, slot));
                }
            }
        }
    }

    #[test]
    fn malformed_pattern_is_definition_error() {
        let (engine, blocks, reactions) = fixture();
        let engine = engine.with_malformed_pattern("[C:1]O");
        let err = CompatibilityIndex::build_primary(&engine, &blocks, &reactions).unwrap_err();
        assert!(matches!(err, SpaceError::Definition { reaction: 1, .. }));
    }

    #[test]
    fn secondary_entries_match_through_their_top_set() {
        let (engine, _, reactions) = fixture();
        let mut entry = Synthesis::new();
        entry.push_mol(Molecule::from_canonical("CCO"));
        let index = CompatibilityIndex::build_secondary(&engine, &[entry], &reactions);
        assert_eq!(index.candidates(1, 0), &[0]);
        assert!(index.candidates(0, 0).is_empty());
        assert!(index.is_satisfiable(1));
        assert!(!index.is_satisfiable(0));
    }

    #[test]
    fn incomplete_secondary_entries_fit_no_slot() {
        let (engine, _, reactions) = fixture();
        let mut entry = Synthesis::new();
        entry.push_mol(Molecule::from_canonical("CN"));
        entry.push_mol(Molecule::from_canonical("CCO"));
        let index = CompatibilityIndex::build_secondary(&engine, &[entry], &reactions);
        assert_eq!(index.total_links(), 0);
    }

    #[test]
    fn matching_slots_lists_every_pair() {
        let (engine, _, reactions) = fixture();
        let pairs = matching_slots(&engine, &reactions, &Molecule::from_canonical("NCCBr"));
        assert_eq!(pairs, vec![(0, 0), (0, 1)]);
    }
}
