//! Feature values and samples.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::FeaturizeError;

/// One named feature, shaped like the tensor a training loop will build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "data", rename_all = "snake_case")]
pub enum FeatureValue {
    Long(i64),
    Float(f32),
    Bool(bool),
    LongVec(Vec<i64>),
    FloatVec(Vec<f32>),
    BoolVec(Vec<bool>),
    /// Row-major rows of equal length.
    FloatMatrix(Vec<Vec<f32>>),
    Text(String),
}

impl FeatureValue {
    /// Tensor shape: empty for scalars and text.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            FeatureValue::Long(_)
            | FeatureValue::Float(_)
            | FeatureValue::Bool(_)
            | FeatureValue::Text(_) => Vec::new(),
            FeatureValue::LongVec(v) => vec![v.len()],
            FeatureValue::FloatVec(v) => vec![v.len()],
            FeatureValue::BoolVec(v) => vec![v.len()],
            FeatureValue::FloatMatrix(rows) => {
                vec![rows.len(), rows.first().map_or(0, Vec::len)]
            }
        }
    }

    pub fn dtype(&self) -> &'static str {
        match self {
            FeatureValue::Long(_) | FeatureValue::LongVec(_) => "long",
            FeatureValue::Float(_) | FeatureValue::FloatVec(_) | FeatureValue::FloatMatrix(_) => {
                "float"
            }
            FeatureValue::Bool(_) | FeatureValue::BoolVec(_) => "bool",
            FeatureValue::Text(_) => "text",
        }
    }

    pub fn as_long_vec(&self) -> Option<&[i64]> {
        match self {
            FeatureValue::LongVec(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_vec(&self) -> Option<&[f32]> {
        match self {
            FeatureValue::FloatVec(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The features computed for one synthesis, in registration order.
///
/// Keys are `"<featurizer>.<field>"`. A featurizer that fails contributes no
/// keys; its error is kept under its name in [`Sample::failures`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    features: IndexMap<String, FeatureValue>,
    #[serde(skip)]
    failures: IndexMap<String, FeaturizeError>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, key: String, value: FeatureValue) {
        self.features.insert(key, value);
    }

    pub(crate) fn fail(&mut self, featurizer: &str, error: FeaturizeError) {
        self.failures.insert(featurizer.to_string(), error);
    }

    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.features.get(key)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, FeatureValue> {
        self.features.iter()
    }

    pub fn failures(&self) -> &IndexMap<String, FeaturizeError> {
        &self.failures
    }

    /// Whether every featurizer succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_features(self) -> IndexMap<String, FeatureValue> {
        self.features
    }
}
