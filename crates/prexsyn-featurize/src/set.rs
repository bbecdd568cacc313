//! The featurizer trait and the ordered set that runs them.

use std::collections::HashSet;
use std::fmt;

use rayon::prelude::*;
use tracing::warn;

use prexsyn_chem::ChemistryEngine;
use prexsyn_core::Synthesis;

use crate::error::{FeaturizeError, Result};
use crate::value::{FeatureValue, Sample};

/// Turns a synthesis into named fields.
///
/// Implementations must be deterministic: the same synthesis always yields
/// the same fields.
pub trait Featurizer: Send + Sync {
    /// Registration name and key prefix.
    fn name(&self) -> &str;

    /// Fields without the name prefix, in output order.
    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>>;
}

/// Featurizers applied in registration order.
#[derive(Default)]
pub struct FeaturizerSet {
    featurizers: Vec<Box<dyn Featurizer>>,
    names: HashSet<String>,
}

impl FeaturizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `featurizer` under its declared name.
    pub fn add(&mut self, featurizer: impl Featurizer + 'static) -> Result<&mut Self> {
        self.add_boxed(Box::new(featurizer))
    }

    pub fn add_boxed(&mut self, featurizer: Box<dyn Featurizer>) -> Result<&mut Self> {
        let name = featurizer.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(FeaturizeError::DuplicateName(name));
        }
        self.featurizers.push(featurizer);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.featurizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.featurizers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.featurizers.iter().map(|f| f.name())
    }

    /// Run every featurizer. A failure only removes that featurizer's keys.
    pub fn compute(&self, synthesis: &Synthesis, engine: &dyn ChemistryEngine) -> Sample {
        let results = self
            .featurizers
            .iter()
            .map(|f| f.featurize(synthesis, engine))
            .collect();
        self.assemble(results)
    }

    /// [`compute`](Self::compute) with featurizers spread over the rayon pool.
    pub fn par_compute(&self, synthesis: &Synthesis, engine: &dyn ChemistryEngine) -> Sample {
        let results = self
            .featurizers
            .par_iter()
            .map(|f| f.featurize(synthesis, engine))
            .collect();
        self.assemble(results)
    }

    fn assemble(&self, results: Vec<Result<Vec<(String, FeatureValue)>>>) -> Sample {
        let mut sample = Sample::new();
        for (featurizer, result) in self.featurizers.iter().zip(results) {
            let name = featurizer.name();
            match result {
                Ok(fields) => {
                    for (field, value) in fields {
                        sample.insert(format!("{name}.{field}"), value);
                    }
                }
                Err(e) => {
                    warn!(featurizer = name, error = %e, "featurizer failed");
                    sample.fail(name, e);
                }
            }
        }
        sample
    }
}

impl fmt::Debug for FeaturizerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prexsyn_chem::{Molecule, TableEngine};
    use std::sync::Arc;

    struct Constant(&'static str, i64);

    impl Featurizer for Constant {
        fn name(&self) -> &str {
            self.0
        }

        fn featurize(
            &self,
            _: &Synthesis,
            _: &dyn ChemistryEngine,
        ) -> Result<Vec<(String, FeatureValue)>> {
            Ok(vec![("value".into(), FeatureValue::Long(self.1))])
        }
    }

    struct Failing;

    impl Featurizer for Failing {
        fn name(&self) -> &str {
            "broken"
        }

        fn featurize(
            &self,
            _: &Synthesis,
            _: &dyn ChemistryEngine,
        ) -> Result<Vec<(String, FeatureValue)>> {
            Err(FeaturizeError::NoProduct("broken".into()))
        }
    }

    fn synthesis() -> Synthesis {
        let mut s = Synthesis::new();
        s.push_mol(Molecule::from_canonical("CCO"));
        s
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut set = FeaturizerSet::new();
        set.add(Constant("a", 1)).unwrap();
        let err = set.add(Constant("a", 2)).unwrap_err();
        assert_eq!(err, FeaturizeError::DuplicateName("a".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn failures_are_isolated() {
        let mut set = FeaturizerSet::new();
        set.add(Constant("first", 1)).unwrap();
        set.add(Failing).unwrap();
        set.add(Constant("last", 3)).unwrap();

        let sample = set.compute(&synthesis(), &TableEngine::new());
        assert_eq!(
            sample.keys().collect::<Vec<_>>(),
            vec!["first.value", "last.value"]
        );
        assert_eq!(sample.get("last.value"), Some(&FeatureValue::Long(3)));
        assert!(sample.failures().contains_key("broken"));
    }

    #[test]
    fn parallel_compute_matches_sequential() {
        let mut set = FeaturizerSet::new();
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            set.add(Constant(name, i as i64)).unwrap();
        }
        let engine = TableEngine::new();
        let s = synthesis();
        assert_eq!(set.compute(&s, &engine), set.par_compute(&s, &engine));
    }

    const COUPLING: &str = "[C:1]Br.[N:2]>>[C:1][N:2]";

    fn generated_routes(engine: &Arc<dyn ChemistryEngine>, count: usize) -> Vec<Synthesis> {
        use prexsyn_chem::ReactionTemplate;
        use prexsyn_core::{
            BuildingBlockList, ChemicalSpaceDefinitionBuilder, ReactionList, SynthesisGenerator,
            SynthesisGeneratorOption,
        };

        let blocks = BuildingBlockList::from_molecules(
            ["CBr", "CCBr", "N", "NC", "NCC"].map(|s| Molecule::from_canonical(s)),
        );
        let reactions =
            ReactionList::from_templates([ReactionTemplate::from_smarts(COUPLING).unwrap()]);
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
        let option = SynthesisGeneratorOption {
            min_reactions: 1,
            max_reactions: 1,
            seed: 11,
            ..SynthesisGeneratorOption::default()
        };
        let mut generator =
            SynthesisGenerator::new(Arc::new(space), Arc::clone(engine), option).unwrap();
        (0..count).map(|_| generator.next().unwrap()).collect()
    }

    #[test]
    fn compute_is_idempotent_over_generated_routes() {
        use crate::{
            FingerprintFeaturizer, PostfixNotationFeaturizer, ProductPropertyFeaturizer,
            ProductSmilesFeaturizer,
        };
        use prexsyn_chem::FingerprintKind;

        let engine: Arc<dyn ChemistryEngine> = Arc::new(
            TableEngine::new()
                .with_fingerprint_bits(64)
                .with_pattern_fn("[C:1]Br", |s| s.ends_with("Br"))
                .with_pattern_fn("[N:2]", |s| s.starts_with('N'))
                .with_reaction_fn(COUPLING, |r| {
                    vec![format!("{}{}", r[0].trim_end_matches("Br"), r[1])]
                }),
        );
        let mut set = FeaturizerSet::new();
        set.add(PostfixNotationFeaturizer::new("syn")).unwrap();
        set.add(FingerprintFeaturizer::new("product", FingerprintKind::Ecfp4))
            .unwrap();
        set.add(ProductPropertyFeaturizer::new("props", ["NumHeavyAtoms"]).unwrap())
            .unwrap();
        set.add(ProductSmilesFeaturizer::new("smiles")).unwrap();

        for route in generated_routes(&engine, 10) {
            let first = set.compute(&route, engine.as_ref());
            assert_eq!(first, set.compute(&route, engine.as_ref()));
            assert_eq!(first, set.par_compute(&route, engine.as_ref()));
            assert!(first.is_complete());

            assert_eq!(
                first.keys().collect::<Vec<_>>(),
                vec![
                    "syn.token_types",
                    "syn.bb_indices",
                    "syn.rxn_indices",
                    "product.fingerprint",
                    "props.types",
                    "props.values",
                    "smiles.smiles",
                ]
            );
            assert_eq!(
                first.get("syn.token_types"),
                Some(&FeatureValue::LongVec(
                    [2, 3, 3, 4, 1].into_iter().chain([0; 11]).collect()
                ))
            );
            assert_eq!(first.get("product.fingerprint").unwrap().shape(), vec![64]);
        }
    }
}
