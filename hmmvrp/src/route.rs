use crate::problem::{Cost, Instance, NodeId, VehicleId};
use log::{debug, warn};

/// A closed tour given as visiting order starting at its first node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TspTour {
    pub order: Vec<NodeId>,
    pub length: Cost,
    pub optimal: bool,
    /// Subtours found by the solver while building the tour, in the same indexing
    pub subtours: Vec<Vec<NodeId>>,
}

pub trait TspSolver: Sync {
    /// Tour over all nodes of `distances` starting at node 0, `None` if none was found
    fn solve(&self, distances: &[Vec<Cost>]) -> Option<TspTour>;
}

/// Held-Karp for small matrices, nearest neighbour with 2-opt above
pub struct Solver {}

impl TspSolver for Solver {
    fn solve(&self, distances: &[Vec<Cost>]) -> Option<TspTour> {
        let tour = tsp::run(distances)?;
        Some(TspTour {
            order: tour.order,
            length: tour.length,
            optimal: tour.optimal,
            subtours: Vec::new(),
        })
    }
}

/// Shortest tour of `vehicle` through the depot and `customers`, in instance indices and
/// starting at the depot. The length is weighted by the speed of `vehicle`.
pub fn solve_subproblem(
    solver: &dyn TspSolver,
    instance: &Instance,
    vehicle: VehicleId,
    nodes: &[NodeId],
) -> Option<TspTour> {
    if nodes.first() != Some(&0) {
        warn!("Subproblem of vehicle {vehicle} does not contain the depot: {nodes:?}");
        return None;
    }

    let distances: Vec<Vec<Cost>> = nodes
        .iter()
        .map(|&j| nodes.iter().map(|&k| instance.weighted_distance(vehicle, j, k)).collect())
        .collect();

    let local = match nodes.len() {
        1 => TspTour {
            order: vec![0],
            length: 0,
            optimal: true,
            subtours: Vec::new(),
        },
        2 => TspTour {
            order: vec![0, 1],
            length: distances[0][1] + distances[1][0],
            optimal: true,
            subtours: Vec::new(),
        },
        _ => match solver.solve(&distances) {
            Some(tour) => tour,
            None => {
                warn!("The tsp for the subproblem of vehicle {vehicle} was empty");
                debug!("Distance matrix of the failed subproblem: {distances:?}");
                return None;
            }
        },
    };

    let translate = |order: &[NodeId]| order.iter().map(|&i| nodes[i]).collect::<Vec<_>>();
    let mut order = translate(&local.order);
    if let Some(depot) = order.iter().position(|&j| j == 0) {
        order.rotate_left(depot);
    }

    Some(TspTour {
        order,
        length: local.length,
        optimal: local.optimal,
        subtours: local.subtours.iter().map(|s| translate(s)).collect(),
    })
}

/// Visits the nodes in index order and never claims optimality
#[cfg(test)]
pub(crate) struct InOrder;

#[cfg(test)]
impl TspSolver for InOrder {
    fn solve(&self, distances: &[Vec<Cost>]) -> Option<TspTour> {
        let order: Vec<NodeId> = (0..distances.len()).collect();
        Some(TspTour {
            length: tsp::length(distances, &order),
            order,
            optimal: false,
            subtours: Vec::new(),
        })
    }
}
