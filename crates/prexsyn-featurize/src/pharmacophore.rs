//! Pharmacophore graph of the main product as fixed-size node and edge
//! tensors.

use std::collections::HashMap;

use prexsyn_chem::{ChemistryEngine, BASE_FAMILIES};
use prexsyn_core::Synthesis;

use crate::error::{FeaturizeError, Result};
use crate::product::main_product;
use crate::set::Featurizer;
use crate::value::FeatureValue;

pub const DEFAULT_MAX_NODES: usize = 8;
pub const DEFAULT_MAX_EDGES: usize = 16;

/// Family id 0 is left free for padding.
pub const FAMILY_ID_OFFSET: i64 = 1;

/// Emits six fields:
///
/// - `node_features`: family id per node, `max_nodes` long;
/// - `node_exists`: which node slots are filled;
/// - `edge_u`, `edge_v`, `edge_features`: endpoints and weight per edge,
///   `max_edges` long;
/// - `edge_exists`: which edge slots are filled.
///
/// The first `max_nodes` features are kept. Edges of the minimum spanning
/// tree come first, so the kept graph stays connected whenever it fits;
/// the remaining edges follow in `(u, v)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPharmacophoreFeaturizer {
    name: String,
    families: HashMap<String, i64>,
    max_nodes: usize,
    max_edges: usize,
}

impl ProductPharmacophoreFeaturizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            families: family_ids(BASE_FAMILIES),
            max_nodes: DEFAULT_MAX_NODES,
            max_edges: DEFAULT_MAX_EDGES,
        }
    }

    /// Replace the family vocabulary. Ids follow the given order.
    pub fn with_families<I, S>(mut self, families: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let families: Vec<String> = families.into_iter().map(Into::into).collect();
        if families.is_empty() {
            return Err(FeaturizeError::invalid_option(&self.name, "no families given"));
        }
        self.families = family_ids(families);
        Ok(self)
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Result<Self> {
        if max_nodes == 0 {
            return Err(FeaturizeError::invalid_option(&self.name, "max_nodes must be positive"));
        }
        self.max_nodes = max_nodes;
        Ok(self)
    }

    pub fn with_max_edges(mut self, max_edges: usize) -> Result<Self> {
        if max_edges == 0 {
            return Err(FeaturizeError::invalid_option(&self.name, "max_edges must be positive"));
        }
        self.max_edges = max_edges;
        Ok(self)
    }

    pub fn family_id(&self, family: &str) -> Option<i64> {
        self.families.get(family).copied()
    }
}

fn family_ids<I, S>(families: I) -> HashMap<String, i64>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut ids = HashMap::new();
    for family in families {
        let next = ids.len() as i64 + FAMILY_ID_OFFSET;
        ids.entry(family.into()).or_insert(next);
    }
    ids
}

impl Featurizer for ProductPharmacophoreFeaturizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn featurize(
        &self,
        synthesis: &Synthesis,
        engine: &dyn ChemistryEngine,
    ) -> Result<Vec<(String, FeatureValue)>> {
        let product = main_product(&self.name, synthesis, engine)?;
        let graph = engine
            .pharmacophore(product)
            .map_err(|e| FeaturizeError::chemistry(&self.name, e))?
            .truncated(self.max_nodes);

        let mut node_features = vec![0i64; self.max_nodes];
        let mut node_exists = vec![false; self.max_nodes];
        for (i, node) in graph.nodes().iter().enumerate() {
            let id = self
                .family_id(&node.family)
                .ok_or_else(|| FeaturizeError::UnknownFamily {
                    featurizer: self.name.clone(),
                    family: node.family.clone(),
                })?;
            node_features[i] = id;
            node_exists[i] = true;
        }

        let tree = graph.min_spanning_tree();
        let (mut selected, rest): (Vec<_>, Vec<_>) =
            graph.edges().partition(|((u, v), _)| tree.has_edge(*u, *v));
        selected.extend(rest);

        let mut edge_u = vec![0i64; self.max_edges];
        let mut edge_v = vec![0i64; self.max_edges];
        let mut edge_features = vec![0f32; self.max_edges];
        let mut edge_exists = vec![false; self.max_edges];
        for (i, ((u, v), weight)) in selected.into_iter().take(self.max_edges).enumerate() {
            edge_u[i] = u as i64;
            edge_v[i] = v as i64;
            edge_features[i] = weight;
            edge_exists[i] = true;
        }

        Ok(vec![
            ("node_features".into(), FeatureValue::LongVec(node_features)),
            ("node_exists".into(), FeatureValue::BoolVec(node_exists)),
            ("edge_features".into(), FeatureValue::FloatVec(edge_features)),
            ("edge_u".into(), FeatureValue::LongVec(edge_u)),
            ("edge_v".into(), FeatureValue::LongVec(edge_v)),
            ("edge_exists".into(), FeatureValue::BoolVec(edge_exists)),
        ])
    }
}
