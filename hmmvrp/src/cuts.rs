use crate::index::{IndexScheme, MasterKind};
use crate::model::MasterModel;
use crate::problem::{Cost, NodeId, VehicleId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sense::Le => f.write_str("<="),
            Sense::Eq => f.write_str("=="),
            Sense::Ge => f.write_str(">="),
        }
    }
}

/// A linear row `sum(coeff * var) <sense> rhs` over flat variable positions
#[derive(Debug, Clone, PartialEq)]
pub struct CutRow {
    pub terms: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

impl CutRow {
    pub fn new(sense: Sense, rhs: f64) -> CutRow {
        CutRow {
            terms: Vec::new(),
            sense,
            rhs,
        }
    }

    pub fn add_term(&mut self, coeff: f64, var: usize) {
        self.terms.push((var, coeff));
    }

    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms.iter().map(|&(var, coeff)| coeff * values[var]).sum()
    }

    pub fn is_violated(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.activity(values);
        match self.sense {
            Sense::Le => lhs > self.rhs + tolerance,
            Sense::Eq => (lhs - self.rhs).abs() > tolerance,
            Sense::Ge => lhs < self.rhs - tolerance,
        }
    }

    /// Human readable form using the variable names of `model`
    pub fn describe(&self, model: &MasterModel) -> String {
        let lhs = self
            .terms
            .iter()
            .map(|&(var, coeff)| format!("{coeff}*{}", model.variable_name(var)))
            .collect::<Vec<_>>()
            .join(" + ");
        format!("{lhs} {} {}", self.sense, self.rhs)
    }
}

/// The lazy cut families available to the decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CutKind {
    /// Subtour elimination
    #[serde(rename = "SEC")]
    Sec,
    #[serde(rename = "BEND_V1")]
    BendersV1,
    #[serde(rename = "BEND_V2")]
    BendersV2,
    #[serde(rename = "BEND_V3")]
    BendersV3,
    #[serde(rename = "BEND_V4")]
    BendersV4,
    #[serde(rename = "BEND_V5")]
    BendersV5,
    #[serde(rename = "BEND_V6")]
    BendersV6,
}

impl CutKind {
    pub const ALL: [CutKind; 7] = [
        CutKind::Sec,
        CutKind::BendersV1,
        CutKind::BendersV2,
        CutKind::BendersV3,
        CutKind::BendersV4,
        CutKind::BendersV5,
        CutKind::BendersV6,
    ];

    /// Whether the cut can never remove an optimal solution
    pub const fn is_sound(self) -> bool {
        !matches!(self, CutKind::BendersV4 | CutKind::BendersV5 | CutKind::BendersV6)
    }

    pub const fn is_benders(self) -> bool {
        !matches!(self, CutKind::Sec)
    }

    /// Builds the row of this family. For SEC, `nodes` is the subtour and `vehicle`
    /// and `length` are unused. For the Benders variants, `nodes` is the tour of
    /// `vehicle` starting at the depot and `length` its weighted length.
    pub fn generate(self, model: &MasterModel, vehicle: VehicleId, nodes: &[NodeId], length: Cost) -> CutRow {
        match self {
            CutKind::Sec => subtour_elimination_row(model, nodes),
            _ => self.benders_row(model, vehicle, nodes, length),
        }
    }

    fn benders_row(self, model: &MasterModel, vehicle: VehicleId, tour: &[NodeId], length: Cost) -> CutRow {
        let index = model.index();
        let mut row = CutRow::new(Sense::Ge, 0.0);
        row.add_term(1.0, IndexScheme::CMAX);

        let mut theta_sum = 0;
        for position in 1..tour.len() {
            let theta = self.theta(model, vehicle, tour, position);
            theta_sum += theta;
            row.add_term(-(theta as f64), index.node_index(vehicle, tour[position]));
        }
        row.rhs = (length - theta_sum) as f64;
        row
    }

    /// Coefficient of the node at `position` of `tour`
    fn theta(self, model: &MasterModel, vehicle: VehicleId, tour: &[NodeId], position: usize) -> Cost {
        let instance = model.instance();
        let j = tour[position];
        let weighted = |k: NodeId| instance.weighted_distance(vehicle, j, k);
        let others = || tour.iter().copied().filter(move |&k| k != j);
        let max_edge = || others().map(weighted).max().unwrap_or(0);
        let min_edge = || others().map(weighted).min().unwrap_or(0);

        match self {
            CutKind::Sec => 0,
            CutKind::BendersV1 => 2 * max_edge(),
            CutKind::BendersV2 => max_edge() + weighted(tour[0]),
            CutKind::BendersV3 => min_edge() + max_edge(),
            CutKind::BendersV4 => {
                let max_setup = others()
                    .map(|k| model.pseudo_setup_time(k, j) * instance.speed(vehicle))
                    .max()
                    .unwrap_or(0);
                min_edge() + max_setup
            }
            CutKind::BendersV5 => max_edge(),
            CutKind::BendersV6 => {
                let previous = tour[position - 1];
                let next = tour[(position + 1) % tour.len()];
                instance.distance(previous, j) + instance.distance(j, next) + instance.distance(previous, next)
            }
        }
    }
}

impl FromStr for CutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CutKind::ALL
            .iter()
            .copied()
            .find(|cut| cut.to_string() == s)
            .ok_or_else(|| format!("unknown cut {s}, expected one of SEC, BEND_V1 .. BEND_V6"))
    }
}

impl fmt::Display for CutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CutKind::Sec => "SEC",
            CutKind::BendersV1 => "BEND_V1",
            CutKind::BendersV2 => "BEND_V2",
            CutKind::BendersV3 => "BEND_V3",
            CutKind::BendersV4 => "BEND_V4",
            CutKind::BendersV5 => "BEND_V5",
            CutKind::BendersV6 => "BEND_V6",
        };
        f.write_str(name)
    }
}

/// One row for `subtour` summing the block of every vehicle:
/// `sum_v (sum of internal edges of v - sum of X[v][j] over the subtour) <= -1`.
/// A route of any vehicle that visits part of the subtour without closing it satisfies it.
pub fn subtour_elimination_row(model: &MasterModel, subtour: &[NodeId]) -> CutRow {
    let index = model.index();
    let mut row = CutRow::new(Sense::Le, -1.0);
    for v in model.instance().all_vehicles() {
        for (position, &j) in subtour.iter().enumerate() {
            let start = match index.kind {
                MasterKind::Atsp => 0,
                MasterKind::Tsp => position + 1,
            };
            for (offset, &k) in subtour[start..].iter().enumerate() {
                if start + offset != position {
                    row.add_term(1.0, index.edge_index(v, j, k));
                }
            }
            row.add_term(-1.0, index.node_index(v, j));
        }
    }
    row
}
