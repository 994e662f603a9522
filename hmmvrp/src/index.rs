//! Flat positions of the master variables.
//!
//! The layout is `CMax` at 0, then one X block of `N` entries per vehicle, then one
//! Y block per vehicle. The Y block holds all ordered pairs `j != k` in the
//! asymmetric variant and the unordered pairs `j < k` in the symmetric one.

use crate::problem::{NodeId, VehicleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MasterKind {
    /// One directed edge variable per ordered pair
    #[serde(rename = "ATSP")]
    Atsp,
    /// One undirected edge variable per unordered pair
    #[default]
    #[serde(rename = "TSP")]
    Tsp,
}

impl FromStr for MasterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ATSP" => Ok(MasterKind::Atsp),
            "TSP" => Ok(MasterKind::Tsp),
            _ => Err(format!("unknown master model {s}, expected TSP|ATSP")),
        }
    }
}

impl fmt::Display for MasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterKind::Atsp => f.write_str("ATSP"),
            MasterKind::Tsp => f.write_str("TSP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexScheme {
    pub kind: MasterKind,
    pub num_nodes: usize,
    pub num_vehicles: usize,
    pub x_start: usize,
    pub y_start: usize,
}

impl IndexScheme {
    pub const CMAX: usize = 0;

    pub fn new(kind: MasterKind, num_nodes: usize, num_vehicles: usize) -> IndexScheme {
        let x_start = IndexScheme::CMAX + 1;
        IndexScheme {
            kind,
            num_nodes,
            num_vehicles,
            x_start,
            y_start: x_start + num_vehicles * num_nodes,
        }
    }

    /// Number of edge variables of a single vehicle
    pub fn edges_per_vehicle(&self) -> usize {
        let n = self.num_nodes;
        match self.kind {
            MasterKind::Atsp => n * (n - 1),
            MasterKind::Tsp => n * (n - 1) / 2,
        }
    }

    pub fn node_count(&self) -> usize {
        self.num_vehicles * self.num_nodes
    }

    pub fn edge_count(&self) -> usize {
        self.num_vehicles * self.edges_per_vehicle()
    }

    /// First position after the X and Y blocks
    pub fn end(&self) -> usize {
        self.y_start + self.edge_count()
    }

    /// Position of X[v][j]
    pub fn node_index(&self, v: VehicleId, j: NodeId) -> usize {
        debug_assert!(v < self.num_vehicles);
        debug_assert!(j < self.num_nodes);
        self.x_start + v * self.num_nodes + j
    }

    /// Position of Y[v][j][k]; in the symmetric variant Y[v][j][k] and Y[v][k][j] coincide
    pub fn edge_index(&self, v: VehicleId, j: NodeId, k: NodeId) -> usize {
        debug_assert!(v < self.num_vehicles);
        debug_assert!(j < self.num_nodes);
        debug_assert!(k < self.num_nodes);
        debug_assert!(j != k);
        let n = self.num_nodes;
        match self.kind {
            MasterKind::Atsp => {
                let offset = j * (n - 1) + k - usize::from(k > j);
                self.y_start + v * self.edges_per_vehicle() + offset
            }
            MasterKind::Tsp => {
                let (j, k) = if k < j { (k, j) } else { (j, k) };
                // rows of the upper triangle before j, then the position within row j
                let offset = j * (2 * n - j - 1) / 2 + (k - j - 1);
                self.y_start + v * self.edges_per_vehicle() + offset
            }
        }
    }

    /// All edge pairs of one vehicle in index order
    pub fn edge_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        let n = self.num_nodes;
        let kind = self.kind;
        (0..n).flat_map(move |j| {
            let start = match kind {
                MasterKind::Atsp => 0,
                MasterKind::Tsp => j + 1,
            };
            (start..n).filter(move |&k| k != j).map(move |k| (j, k))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn places_cmax_before_blocks() {
        let index = IndexScheme::new(MasterKind::Tsp, 4, 2);
        assert_eq!(index.x_start, 1);
        assert_eq!(index.y_start, 9);
        assert_eq!(index.node_index(1, 3), 8);
        assert_eq!(index.edge_index(0, 0, 1), 9);
        assert_eq!(index.end(), 9 + 2 * 6);
    }

    #[test]
    fn symmetric_swap_is_equal() {
        let index = IndexScheme::new(MasterKind::Tsp, 6, 3);
        for v in 0..3 {
            for j in 0..6 {
                for k in 0..6 {
                    if j != k {
                        assert_eq!(index.edge_index(v, j, k), index.edge_index(v, k, j));
                    }
                }
            }
        }
    }

    #[test]
    fn matches_counting_definition() {
        // sum over l < j of (N - 1 - l), plus k - j - 1
        let n = 7;
        let index = IndexScheme::new(MasterKind::Tsp, n, 2);
        for j in 0..n {
            for k in j + 1..n {
                let count: usize = (0..j).map(|l| n - 1 - l).sum::<usize>() + k - j - 1;
                assert_eq!(index.edge_index(1, j, k), index.y_start + n * (n - 1) / 2 + count);
            }
        }
    }

    fn assert_unique_and_dense(kind: MasterKind) {
        for n in 2..8 {
            for m in 1..4 {
                let index = IndexScheme::new(kind, n, m);
                let mut seen = HashSet::new();
                for v in 0..m {
                    for j in 0..n {
                        assert!(seen.insert(index.node_index(v, j)));
                    }
                    for (j, k) in index.edge_pairs() {
                        let position = index.edge_index(v, j, k);
                        assert!(position >= index.y_start && position < index.end());
                        assert!(seen.insert(position), "duplicate position for ({v}, {j}, {k})");
                    }
                }
                assert_eq!(seen.len(), index.node_count() + index.edge_count());
            }
        }
    }

    #[test]
    fn asymmetric_positions_are_unique() {
        assert_unique_and_dense(MasterKind::Atsp);
    }

    #[test]
    fn symmetric_positions_are_unique() {
        assert_unique_and_dense(MasterKind::Tsp);
    }

    #[test]
    fn parses_model_names() {
        assert_eq!("ATSP".parse::<MasterKind>(), Ok(MasterKind::Atsp));
        assert_eq!("TSP".parse::<MasterKind>(), Ok(MasterKind::Tsp));
        assert!("VRP".parse::<MasterKind>().is_err());
    }
}
