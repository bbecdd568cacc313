//! Featurizers describing the main product of a route.

use prexsyn_chem::{ChemistryEngine, FingerprintKind, Molecule};
use prexsyn_core::Synthesis;

use crate::error::{FeaturizeError, Result};
use crate::set::Featurizer;
use crate::value::FeatureValue;

/// Descriptors a [`ProductPropertyFeaturizer`] may request. A descriptor's
/// property id is its position here plus [`PROPERTY_ID_OFFSET`].
pub const SUPPORTED_DESCRIPTORS: &[&str] = &[
    "MolWt",
    "NumHeavyAtoms",
    "MolLogP",
    "TPSA",
    "NumHDonors",
    "NumHAcceptors",
    "NumRotatableBonds",
    "RingCount",
    "NumAromaticRings",
    "FractionCSP3",
    "qed",
];

/// Id 0 is left free for padding.
pub const PROPERTY_ID_OFFSET: i64 = 1;

pub(crate) fn main_product<'a>(
    featurizer: &str,
    synthesis: &'a Synthesis,
    engine: &dyn ChemistryEngine,
) -> Result<&'a Molecule> {
    synthesis
        .main_product(engine)
        .ok_or_else(|| FeaturizeError::NoProduct(featurizer.to_string()))
}

/// `fingerprint`: the main product's fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintFeaturizer {
    name: String,
    kind: FingerprintKind,
}

impl FingerprintFeaturizer {
    pub fn new(name: impl Into<String>, kind: FingerprintKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl Featurizer for FingerprintFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        let fp = engine
            .fingerprint(product, self.kind)
            .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;
        Ok(vec![("fingerprint".into(), FeatureValue::FloatVec(fp))])
    }
}

/// `fingerprint`: fingerprint of the main product's Murcko scaffold, or of
/// the product itself when it has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MurckoScaffoldFeaturizer {
    name: String,
    kind: FingerprintKind,
}

impl MurckoScaffoldFeaturizer {
    pub fn new(name: impl Into<String>, kind: FingerprintKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

impl Featurizer for MurckoScaffoldFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        let scaffold = engine
            .murcko_scaffold(product)
            .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;
        let target = scaffold.as_ref().unwrap_or(product);
        let fp = engine
            .fingerprint(target, self.kind)
            .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;
        Ok(vec![("fingerprint".into(), FeatureValue::FloatVec(fp))])
    }
}

/// `types` and `values`: property ids and descriptor values of the main
/// product, in the order the descriptors were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPropertyFeaturizer {
    name: String,
    properties: Vec<(i64, String)>,
}

impl ProductPropertyFeaturizer {
    /// Fails with [`FeaturizeError::InvalidOption`] on a descriptor missing
    /// from [`SUPPORTED_DESCRIPTORS`].
    pub fn new<I, S>(name: impl Into<String>, properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let properties = properties
            .into_iter()
            .map(|p| {
                let p = p.into();
                match property_id(&p) {
                    Some(id) => Ok((id, p)),
                    None => Err(FeaturizeError::invalid_option(
                        &name,
                        format!("unsupported descriptor '{p}'"),
                    )),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        if properties.is_empty() {
            return Err(FeaturizeError::invalid_option(&name, "no descriptors selected"));
        }
        Ok(Self { name, properties })
    }

    /// Largest property id plus one.
    pub fn max_property_id() -> i64 {
        PROPERTY_ID_OFFSET + SUPPORTED_DESCRIPTORS.len() as i64
    }
}

/// Property id of a supported descriptor.
pub fn property_id(descriptor: &str) -> Option<i64> {
    SUPPORTED_DESCRIPTORS
        .iter()
        .position(|d| *d == descriptor)
        .map(|i| i as i64 + PROPERTY_ID_OFFSET)
}

impl Featurizer for ProductPropertyFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        let mut types = Vec::with_capacity(self.properties.len());
        let mut values = Vec::with_capacity(self.properties.len());
        for (id, descriptor) in &self.properties {
            let value = engine
                .descriptor(product, descriptor)
                .map_err(|e| FeaturizeError::chemistry(&self.name, e))?;
            types.push(*id);
            values.push(value as f32);
        }
        Ok(vec![
            ("types".into(), FeatureValue::LongVec(types)),
            ("values".into(), FeatureValue::FloatVec(values)),
        ])
    }
}

/// `smiles`: canonical SMILES of the main product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSmilesFeaturizer {
    name: String,
}

impl ProductSmilesFeaturizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Featurizer for ProductSmilesFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        Ok(vec![(
            "smiles".into(),
            FeatureValue::Text(product.smiles().to_string()),
        )])
    }
}
