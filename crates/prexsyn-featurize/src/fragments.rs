//! BRICS fragment fingerprints.

use prexsyn_chem::{ChemistryEngine, FingerprintKind};
use prexsyn_core::Synthesis;

use crate::error::{FeaturizeError, Result};
use crate::product::main_product;
use crate::set::Featurizer;
use crate::value::FeatureValue;

/// `fingerprints` is a `max_fragments x fingerprint_len` matrix holding one
/// row per BRICS fragment of the main product, zero rows after the last
/// fragment. `exists` flags the filled rows. Fragments past
/// `max_fragments` are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BricsFragmentsFeaturizer {
    name: String,
    kind: FingerprintKind,
    max_fragments: usize,
}

impl BricsFragmentsFeaturizer {
    pub const DEFAULT_MAX_FRAGMENTS: usize = 8;

    pub fn new(name: impl Into<String>, kind: FingerprintKind) -> Self {
        Self {
            name: name.into(),
            kind,
            max_fragments: Self::DEFAULT_MAX_FRAGMENTS,
        }
    }

    pub fn with_max_fragments(mut self, max_fragments: usize) -> Result<Self> {
        if max_fragments == 0 {
            return Err(FeaturizeError::invalid_option(
                &self.name,
                "max_fragments must be at least 1",
            ));
        }
        self.max_fragments = max_fragments;
        Ok(self)
    }
}

impl Featurizer for BricsFragmentsFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        let fragments = engine
            .brics_fragments(product)
            .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;

        let width = engine.fingerprint_len(self.kind);
        let mut rows = vec![vec![0.0f32; width]; self.max_fragments];
        let mut exists = vec![false; self.max_fragments];
        for (i, fragment) in fragments.iter().take(self.max_fragments).enumerate() {
            rows[i] = engine
                .fingerprint(fragment, self.kind)
                .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;
            exists[i] = true;
        }

        Ok(vec![
            ("fingerprints".into(), FeatureValue::FloatMatrix(rows)),
            ("exists".into(), FeatureValue::BoolVec(exists)),
        ])
    }
}
