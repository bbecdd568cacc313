//! Random multi-step route sampling.

use std::fmt;
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use prexsyn_chem::{ChemistryEngine, Molecule};

use crate::error::{GenerationError, SynthesisError};
use crate::space::ChemicalSpaceDefinition;
use crate::synthesis::{ApplyOptions, Synthesis};

/// Where slot fillers are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMix {
    /// Building blocks only.
    PrimaryOnly,
    /// Uniform over building blocks and secondary building blocks together.
    #[default]
    Union,
    /// Use a secondary building block with this probability.
    Secondary(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisGeneratorOption {
    pub min_reactions: usize,
    pub max_reactions: usize,
    /// Stop extending a route once its product reaches this many heavy atoms.
    pub max_product_atoms: usize,
    pub source_mix: SourceMix,
    /// Relative weight per reaction; uniform when absent.
    pub reaction_weights: Option<Vec<f64>>,
    pub max_attempts: usize,
    pub max_products: usize,
    pub seed: u64,
}

impl Default for SynthesisGeneratorOption {
    fn default() -> Self {
        Self {
            min_reactions: 1,
            max_reactions: 3,
            max_product_atoms: 50,
            source_mix: SourceMix::default(),
            reaction_weights: None,
            max_attempts: 16,
            max_products: 8,
            seed: 0,
        }
    }
}

impl SynthesisGeneratorOption {
    pub fn validate(&self, num_reactions: usize) -> Result<(), GenerationError> {
        let invalid = |msg: String| Err(GenerationError::Configuration(msg));
        if self.min_reactions == 0 {
            return invalid("min_reactions must be at least 1".to_string());
        }
        if self.min_reactions > self.max_reactions {
            return invalid(format!(
                "min_reactions ({}) exceeds max_reactions ({})",
                self.min_reactions, self.max_reactions
            ));
        }
        if let SourceMix::Secondary(p) = self.source_mix {
            if !(0.0..=1.0).contains(&p) {
                return invalid(format!("secondary probability {p} is outside [0, 1]"));
            }
        }
        if let Some(weights) = &self.reaction_weights {
            if weights.len() != num_reactions {
                return invalid(format!(
                    "{} reaction weights for {num_reactions} reactions",
                    weights.len()
                ));
            }
        }
        Ok(())
    }
}

/// Why one sampling attempt was discarded.
#[derive(Debug)]
enum AttemptFailure {
    EmptySlot { reaction: usize, slot: usize },
    Application(SynthesisError),
    /// The finished route left more than one candidate-set on its stack.
    Incomplete { stack_size: usize },
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::EmptySlot { reaction, slot } => {
                write!(f, "no building block fits reaction {reaction} slot {slot}")
            }
            AttemptFailure::Application(e) => write!(f, "{e}"),
            AttemptFailure::Incomplete { stack_size } => {
                write!(f, "route is incomplete with {stack_size} candidate-sets on its stack")
            }
        }
    }
}

/// Samples random valid routes from a shared chemical space.
///
/// Each call to [`next`](Self::next) is independent. Failed partial routes
/// are discarded and resampled from scratch, up to `max_attempts` times.
/// Only complete routes are returned; a route that ends with more than one
/// candidate-set on its stack counts as a failed attempt.
pub struct SynthesisGenerator {
    space: Arc<ChemicalSpaceDefinition>,
    engine: Arc<dyn ChemistryEngine>,
    option: SynthesisGeneratorOption,
    rng: StdRng,
    weights: Option<WeightedIndex<f64>>,
}

impl SynthesisGenerator {
    pub fn new(
        space: Arc<ChemicalSpaceDefinition>,
        engine: Arc<dyn ChemistryEngine>,
        option: SynthesisGeneratorOption,
    ) -> Result<Self, GenerationError> {
        option.validate(space.num_reactions())?;
        let weights = match &option.reaction_weights {
            Some(w) => Some(
                WeightedIndex::new(w)
                    .map_err(|e| GenerationError::Configuration(format!("reaction weights: {e}")))?,
            ),
            None => None,
        };
        let rng = StdRng::seed_from_u64(option.seed);
        Ok(Self {
            space,
            engine,
            option,
            rng,
            weights,
        })
    }

    pub fn option(&self) -> &SynthesisGeneratorOption {
        &self.option
    }

    pub fn space(&self) -> &Arc<ChemicalSpaceDefinition> {
        &self.space
    }

    /// Sample one complete route.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Synthesis, GenerationError> {
        let mut last_cause = String::from("no attempts allowed");
        for attempt in 1..=self.option.max_attempts {
            match self.attempt() {
                Ok(synthesis) => return Ok(synthesis),
                Err(AttemptFailure::Application(e @ SynthesisError::Arity { .. })) => {
                    return Err(e.into());
                }
                Err(cause) => {
                    debug!(attempt, cause = %cause, "discarding partial route");
                    last_cause = cause.to_string();
                }
            }
        }
        Err(GenerationError::Exhausted {
            attempts: self.option.max_attempts,
            last_cause,
        })
    }

    fn attempt(&mut self) -> Result<Synthesis, AttemptFailure> {
        if self.space.num_reactions() == 0 {
            return Err(AttemptFailure::EmptySlot {
                reaction: 0,
                slot: 0,
            });
        }
        let target = self
            .rng
            .gen_range(self.option.min_reactions..=self.option.max_reactions);

        let mut synthesis = Synthesis::new();
        let reaction = self.choose_reaction();
        let arity = self.arity(reaction);
        for slot in 0..arity {
            self.fill_slot(&mut synthesis, reaction, slot)?;
        }
        self.apply(&mut synthesis, reaction, None)?;

        let mut steps = 1;
        while steps < target {
            let Some(product) = self.choose_product(&synthesis) else {
                break;
            };
            if self.engine.heavy_atom_count(&product) >= self.option.max_product_atoms {
                break;
            }
            let choices = self.space.available_reactions(self.engine.as_ref(), &product);
            if choices.is_empty() {
                break;
            }
            let (reaction, bound_slot) = choices[self.rng.gen_range(0..choices.len())];
            synthesis.select_product(&product);

            let arity = self.arity(reaction);
            let mut binding = vec![0usize; arity];
            let mut operand = 1;
            for slot in 0..arity {
                if slot == bound_slot {
                    continue;
                }
                self.fill_slot(&mut synthesis, reaction, slot)?;
                binding[slot] = operand;
                operand += 1;
            }
            self.apply(&mut synthesis, reaction, Some(binding))?;
            steps += 1;
        }
        if !synthesis.is_complete() {
            return Err(AttemptFailure::Incomplete {
                stack_size: synthesis.stack_size(),
            });
        }
        Ok(synthesis)
    }

    fn choose_reaction(&mut self) -> usize {
        match &self.weights {
            Some(weights) => weights.sample(&mut self.rng),
            None => self.rng.gen_range(0..self.space.num_reactions()),
        }
    }

    fn arity(&self, reaction: usize) -> usize {
        self.space.reaction(reaction).map_or(0, |r| r.arity())
    }

    fn choose_product(&mut self, synthesis: &Synthesis) -> Option<Molecule> {
        let top = synthesis.top()?;
        if top.is_empty() {
            return None;
        }
        top.iter().nth(self.rng.gen_range(0..top.len())).cloned()
    }

    /// Push one filler for `(reaction, slot)`: a building block or a
    /// secondary sub-route, depending on the source mix.
    fn fill_slot(
        &mut self,
        synthesis: &mut Synthesis,
        reaction: usize,
        slot: usize,
    ) -> Result<(), AttemptFailure> {
        let primary = self.space.primary_index().candidates(reaction, slot).len();
        let secondary = self.space.secondary_index().candidates(reaction, slot).len();
        let use_secondary = match self.option.source_mix {
            _ if secondary == 0 => false,
            _ if primary == 0 => true,
            SourceMix::PrimaryOnly => false,
            SourceMix::Union => self.rng.gen_range(0..primary + secondary) >= primary,
            SourceMix::Secondary(p) => self.rng.gen_bool(p),
        };

        let space = Arc::clone(&self.space);
        if use_secondary {
            let route = space
                .random_secondary_building_block(&mut self.rng, reaction, slot)
                .and_then(|i| space.secondary_building_block(i));
            match route {
                Some(route) => {
                    synthesis.push_synthesis(route);
                    Ok(())
                }
                None => Err(AttemptFailure::EmptySlot { reaction, slot }),
            }
        } else {
            let block = space
                .random_building_block(&mut self.rng, reaction, slot)
                .and_then(|i| space.building_block(i).map(|m| (i, m)));
            match block {
                Some((position, molecule)) => {
                    synthesis.push_building_block(position, molecule.clone());
                    Ok(())
                }
                None => Err(AttemptFailure::EmptySlot { reaction, slot }),
            }
        }
    }

    fn apply(
        &self,
        synthesis: &mut Synthesis,
        reaction: usize,
        binding: Option<Vec<usize>>,
    ) -> Result<(), AttemptFailure> {
        let Some(template) = self.space.reaction(reaction) else {
            return Err(AttemptFailure::EmptySlot { reaction, slot: 0 });
        };
        let options = ApplyOptions {
            max_products: self.option.max_products,
            binding,
            reaction_index: Some(reaction),
        };
        synthesis
            .push_reaction_with(self.engine.as_ref(), template, &options)
            .map_err(AttemptFailure::Application)
    }
}

impl fmt::Debug for SynthesisGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisGenerator")
            .field("engine", &self.engine.name())
            .field("option", &self.option)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CompatibilityIndex;
    use crate::synthesis::SynthesisVector;
    use crate::{BuildingBlockList, ChemicalSpaceDefinitionBuilder, ReactionList};
    use prexsyn_chem::{ReactionTemplate, TableEngine};

    const COUPLING: &str = "[C:1]Br.[N:2]>>[C:1][N:2]";
    const BROMINATION: &str = "[C:1][N:2]>>[C:1][N:2]Br";

    fn engine() -> Arc<dyn ChemistryEngine> {
        Arc::new(
            TableEngine::new()
                .with_pattern_fn("[C:1]Br", |s| s.ends_with("Br"))
                .with_pattern_fn("[N:2]", |s| s.starts_with('N'))
                .with_pattern_fn("[C:1][N:2]", |s| s.starts_with('C') && s.ends_with('N'))
                .with_reaction_fn(COUPLING, |r| {
                    vec![format!("{}{}", r[0].trim_end_matches("Br"), r[1])]
                })
                .with_reaction_fn(BROMINATION, |r| vec![format!("{}Br", r[0])]),
        )
    }

    fn space(engine: &Arc<dyn ChemistryEngine>) -> Arc<ChemicalSpaceDefinition> {
        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CCBr", "N", "NC"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions = ReactionList::from_templates(
            [COUPLING, BROMINATION]
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

    #[test]
    fn generated_routes_are_complete() {
        let engine = engine();
        let option = SynthesisGeneratorOption {
            reaction_weights: Some(vec![1.0, 0.0]),
            max_reactions: 4,
            seed: 11,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator = SynthesisGenerator::new(space(&engine), engine, option).unwrap();
        for _ in 0..20 {
            let route = generator.next().unwrap();
            assert!(route.is_complete());
            assert!(!route.top().unwrap().is_empty());
            assert!(route.count_reactions() >= 1);
            assert!(route.count_reactions() <= 4);
            assert!(matches!(
                route.postfix_notation()[0],
                crate::Token::Molecule { building_block: Some(_), .. }
            ));
        }
    }

    /// A coupling-only space whose secondary building blocks are the
    /// single-reaction products, so slot fillers come from both pools.
    fn space_with_secondary(engine: &Arc<dyn ChemistryEngine>) -> Arc<ChemicalSpaceDefinition> {
        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CCBr", "N", "NC", "NCCBr"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions = ReactionList::from_templates([ReactionTemplate::from_smarts(COUPLING).unwrap()]);
        let space = ChemicalSpaceDefinitionBuilder::new(Arc::clone(engine))
            .building_blocks(blocks)
            .unwrap()
            .reactions(reactions)
            .unwrap()
            .secondary_building_blocks_from_single_reaction(Default::default())
            .unwrap()
            .build_secondary_index()
            .unwrap()
            .build()
            .unwrap();
        assert!(space.num_secondary_building_blocks() > 0);
        assert!(space.secondary_index().total_links() > 0);
        Arc::new(space)
    }

    #[test]
    fn routes_over_secondary_building_blocks_are_complete() {
        let engine = engine();
        let space = space_with_secondary(&engine);
        for source_mix in [SourceMix::Union, SourceMix::Secondary(1.0), SourceMix::Secondary(0.5)] {
            let option = SynthesisGeneratorOption {
                source_mix,
                max_reactions: 3,
                seed: 7,
                ..SynthesisGeneratorOption::default()
            };
            let mut generator =
                SynthesisGenerator::new(Arc::clone(&space), Arc::clone(&engine), option).unwrap();
            for _ in 0..20 {
                let route = generator.next().unwrap();
                assert!(route.is_complete(), "{source_mix:?}: {:?}", route.postfix_notation());
                assert!(!route.top().unwrap().is_empty());
            }
        }
    }

    #[test]
    fn incomplete_secondary_route_is_never_returned() {
        let engine = engine();
        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CCBr", "N", "NC"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions = ReactionList::from_templates([ReactionTemplate::from_smarts(COUPLING).unwrap()]);
        let primary = CompatibilityIndex::build_primary(engine.as_ref(), &blocks, &reactions).unwrap();

        let mut leftover = Synthesis::new();
        leftover.push_mol(Molecule::from_canonical("NCC"));
        leftover.push_mol(Molecule::from_canonical("NC"));
        assert_eq!(leftover.stack_size(), 2);
        let space = ChemicalSpaceDefinition::from_parts(
            blocks,
            reactions,
            SynthesisVector::from(vec![leftover]),
            primary,
            CompatibilityIndex::from_links(vec![vec![vec![], vec![0]]]),
        );

        let option = SynthesisGeneratorOption {
            source_mix: SourceMix::Secondary(1.0),
            min_reactions: 1,
            max_reactions: 1,
            max_attempts: 4,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator = SynthesisGenerator::new(Arc::new(space), engine, option).unwrap();
        match generator.next() {
            Err(GenerationError::Exhausted {
                attempts,
                last_cause,
            }) => {
                assert_eq!(attempts, 4);
                assert!(last_cause.contains("incomplete"), "{last_cause}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn same_seed_same_routes() {
        let engine = engine();
        let space = space(&engine);
        let option = SynthesisGeneratorOption {
            seed: 5,
            ..SynthesisGeneratorOption::default()
        };
        let mut a =
            SynthesisGenerator::new(Arc::clone(&space), Arc::clone(&engine), option.clone()).unwrap();
        let mut b = SynthesisGenerator::new(space, engine, option).unwrap();
        for _ in 0..10 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn unfillable_reaction_exhausts() {
        let engine = engine();
        let option = SynthesisGeneratorOption {
            reaction_weights: Some(vec![0.0, 1.0]),
            max_attempts: 3,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator = SynthesisGenerator::new(space(&engine), engine, option).unwrap();
        match generator.next() {
            Err(GenerationError::Exhausted {
                attempts,
                last_cause,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_cause.contains("reaction 1"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_attempts_exhausts_immediately() {
        let engine = engine();
        let option = SynthesisGeneratorOption {
            max_attempts: 0,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator = SynthesisGenerator::new(space(&engine), engine, option).unwrap();
        assert!(matches!(
            generator.next(),
            Err(GenerationError::Exhausted { attempts: 0, .. })
        ));
    }

    #[test]
    fn invalid_options_are_rejected() {
        let engine = engine();
        let space = space(&engine);
        for option in [
            SynthesisGeneratorOption {
                min_reactions: 0,
                ..SynthesisGeneratorOption::default()
            },
            SynthesisGeneratorOption {
                min_reactions: 4,
                max_reactions: 2,
                ..SynthesisGeneratorOption::default()
            },
            SynthesisGeneratorOption {
                reaction_weights: Some(vec![1.0]),
                ..SynthesisGeneratorOption::default()
            },
            SynthesisGeneratorOption {
                reaction_weights: Some(vec![0.0, 0.0]),
                ..SynthesisGeneratorOption::default()
            },
            SynthesisGeneratorOption {
                source_mix: SourceMix::Secondary(1.5),
                ..SynthesisGeneratorOption::default()
            },
        ] {
            assert!(matches!(
                SynthesisGenerator::new(Arc::clone(&space), Arc::clone(&engine), option),
                Err(GenerationError::Configuration(_))
            ));
        }
    }

    #[test]
    fn option_reads_from_toml() {
        let option: SynthesisGeneratorOption = toml::from_str(
            r#"
            max_reactions = 2
            source_mix = { secondary = 0.25 }
            "#,
        )
        .unwrap();
        assert_eq!(option.max_reactions, 2);
        assert_eq!(option.source_mix, SourceMix::Secondary(0.25));
        assert_eq!(option.max_product_atoms, 50);
    }
}
