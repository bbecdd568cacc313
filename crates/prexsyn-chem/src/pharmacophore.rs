//! Pharmacophore graphs: chemical features as nodes, weighted topological
//! distances between them as edges.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Feature families of the toolkit's base feature definitions, in the order
/// they are declared there.
pub const BASE_FAMILIES: [&str; 8] = [
    "Donor",
    "Acceptor",
    "NegIonizable",
    "PosIonizable",
    "ZnBinder",
    "Aromatic",
    "Hydrophobe",
    "LumpedHydrophobe",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharmacophoreNode {
    pub family: String,
    /// Feature type within the family, e.g. `SingleAtomDonor`.
    pub kind: String,
}

impl PharmacophoreNode {
    pub fn new(family: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            kind: kind.into(),
        }
    }
}

/// Undirected weighted graph over pharmacophore nodes.
///
/// Edges are stored once, keyed `(u, v)` with `u < v`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PharmacophoreGraph {
    nodes: Vec<PharmacophoreNode>,
    edges: BTreeMap<(usize, usize), f32>,
}

impl PharmacophoreGraph {
    pub fn new(nodes: Vec<PharmacophoreNode>) -> Self {
        Self {
            nodes,
            edges: BTreeMap::new(),
        }
    }

    /// Set the weight of edge `u`-`v`. Self-loops and edges to unknown nodes
    /// are ignored.
    pub fn set_edge(&mut self, u: usize, v: usize, weight: f32) {
        if u == v || u >= self.nodes.len() || v >= self.nodes.len() {
            return;
        }
        self.edges.insert((u.min(v), u.max(v)), weight);
    }

    pub fn with_edge(mut self, u: usize, v: usize, weight: f32) -> Self {
        self.set_edge(u, v, weight);
        self
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.edges.contains_key(&(u.min(v), u.max(v)))
    }

    pub fn edge_weight(&self, u: usize, v: usize) -> Option<f32> {
        self.edges.get(&(u.min(v), u.max(v))).copied()
    }

    pub fn nodes(&self) -> &[PharmacophoreNode] {
        &self.nodes
    }

    /// Edges in `(u, v)` order.
    pub fn edges(&self) -> impl Iterator<Item = ((usize, usize), f32)> + '_ {
        self.edges.iter().map(|(&k, &w)| (k, w))
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Keep the first `n` nodes and the edges between them.
    pub fn truncated(&self, n: usize) -> Self {
        let n = n.min(self.nodes.len());
        Self {
            nodes: self.nodes[..n].to_vec(),
            edges: self
                .edges
                .iter()
                .filter(|((u, v), _)| *u < n && *v < n)
                .map(|(&k, &w)| (k, w))
                .collect(),
        }
    }

    /// Kruskal spanning forest; ties between equal weights go to the
    /// smaller `(u, v)`.
    pub fn min_spanning_tree(&self) -> Self {
        let mut ordered: Vec<((usize, usize), f32)> = self.edges().collect();
        ordered.sort_by(|(ka, wa), (kb, wb)| wa.total_cmp(wb).then(ka.cmp(kb)));

        let mut parent: Vec<usize> = (0..self.nodes.len()).collect();
        fn root(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        let mut tree = Self::new(self.nodes.clone());
        for ((u, v), w) in ordered {
            let (ru, rv) = (root(&mut parent, u), root(&mut parent, v));
            if ru != rv {
                parent[rv] = ru;
                tree.set_edge(u, v, w);
            }
        }
        tree
    }
}
