//! Callback protocol between the MIP engine and the per-vehicle subproblems.
//!
//! On every integer candidate the decomposition separates subtours, checks each
//! vehicle's assignment with a TSP subproblem and submits Benders cuts where the
//! master underestimates a tour. The best routing seen so far is staged and offered
//! back to the engine as a heuristic incumbent on the next node event.

use crate::config::{SolverConfig, Strategy};
use crate::cuts::{CutKind, CutRow};
use crate::error::{Error, Result};
use crate::index::{IndexScheme, MasterKind};
use crate::model::MasterModel;
use crate::problem::{Cost, NodeId, VehicleId};
use crate::route::{self, TspSolver, TspTour};
use crate::subtour::{self, Detection};
use log::{debug, error, info, trace, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const NODE_THRESHOLD: f64 = 0.5;
const EDGE_THRESHOLD: f64 = 0.95;

/// Engine side of an integer-feasible candidate
pub trait CandidateContext {
    /// Values of all master variables
    fn values(&self) -> Result<Vec<f64>>;

    fn objective(&self) -> Result<f64>;

    fn add_lazy(&mut self, row: &CutRow) -> Result<()>;
}

/// Engine side of a node event, where heuristic solutions may be injected
pub trait IncumbentContext {
    /// Objective of the engine's incumbent, infinite if there is none
    fn best_objective(&self) -> Result<f64>;

    /// Offers a complete assignment; returns its objective if the engine accepted it
    fn set_solution(&mut self, values: &[f64]) -> Result<Option<f64>>;
}

/// Best routing found by the subproblems
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicSolution {
    /// Open routes starting at the depot, one per vehicle
    pub routes: Vec<Vec<NodeId>>,
    pub objective: Cost,
    /// Not yet offered to the engine
    pub dirty: bool,
}

impl HeuristicSolution {
    pub fn empty() -> HeuristicSolution {
        HeuristicSolution {
            routes: Vec::new(),
            objective: Cost::MAX,
            dirty: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Rows submitted for one candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateReport {
    pub subtour_rows: usize,
    pub benders_rows: usize,
    /// Makespan of the subproblem tours, if every subproblem was solved
    pub heuristic_objective: Option<Cost>,
}

pub struct Decomposition<'a> {
    model: &'a MasterModel<'a>,
    strategy: Strategy,
    separate_subtours: bool,
    benders: Vec<CutKind>,
    tsp: &'a dyn TspSolver,
    pool: Option<rayon::ThreadPool>,
    best: Mutex<HeuristicSolution>,
    subtour_count: AtomicUsize,
    benders_count: AtomicUsize,
    candidate_count: AtomicUsize,
    /// Underestimated tours whose length is not proven optimal
    inexact_count: AtomicUsize,
}

impl<'a> Decomposition<'a> {
    pub fn new(model: &'a MasterModel<'a>, config: &SolverConfig, tsp: &'a dyn TspSolver) -> Result<Self> {
        let pool = if config.threads > 0 {
            let threads = config.threads.min(model.instance().num_vehicles);
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::InvalidConfig(format!("cannot start {threads} subproblem threads: {e}")))?;
            Some(pool)
        } else {
            None
        };

        Ok(Decomposition {
            model,
            strategy: config.strategy,
            separate_subtours: config.separates_subtours(),
            benders: config.benders_cuts(),
            tsp,
            pool,
            best: Mutex::new(HeuristicSolution::empty()),
            subtour_count: AtomicUsize::new(0),
            benders_count: AtomicUsize::new(0),
            candidate_count: AtomicUsize::new(0),
            inexact_count: AtomicUsize::new(0),
        })
    }

    pub fn model(&self) -> &MasterModel<'a> {
        self.model
    }

    pub fn best_solution(&self) -> HeuristicSolution {
        self.lock().clone()
    }

    pub fn subtour_cuts(&self) -> usize {
        self.subtour_count.load(Ordering::Relaxed)
    }

    pub fn benders_cuts(&self) -> usize {
        self.benders_count.load(Ordering::Relaxed)
    }

    /// Number of tours that exceeded the master objective without a proven optimal length.
    /// No Benders cut is derived from those, so the master objective is then only a bound.
    pub fn inexact_subproblems(&self) -> usize {
        self.inexact_count.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HeuristicSolution> {
        self.best.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles an integer-feasible candidate. Failures are logged and never reach the engine.
    pub fn on_candidate(&self, ctx: &mut dyn CandidateContext) -> CandidateReport {
        let call = self.candidate_count.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Candidate event nr.{call}");
        let mut report = CandidateReport::default();

        let values = match ctx.values() {
            Ok(values) => values,
            Err(e) => {
                error!("Error retrieving the candidate solution: {e}");
                return report;
            }
        };

        if self.separate_subtours {
            report.subtour_rows = self.eliminate_subtours(&values, ctx);
        }

        if self.strategy == Strategy::BranchAndCheck {
            let objective = match ctx.objective() {
                Ok(objective) => objective,
                Err(e) => {
                    error!("Error retrieving the candidate objective: {e}");
                    return report;
                }
            };
            let (rows, heuristic) = self.check_assignment(&values, objective, ctx);
            report.benders_rows = rows;
            report.heuristic_objective = heuristic;
        }

        report
    }

    fn eliminate_subtours(&self, values: &[f64], ctx: &mut dyn CandidateContext) -> usize {
        let mut submitted = 0;
        for (v, edges) in edge_matrices(values, self.model.index()).iter().enumerate() {
            let subtour = match subtour::find_subtour(edges) {
                Detection::Subtour(nodes) => nodes,
                Detection::DepotTour(_) => continue,
            };
            let row = CutKind::Sec.generate(self.model, v, &subtour, 0);
            let nr = self.subtour_count.fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Adding SEC nr.{nr} for subtour {subtour:?} of vehicle {v}");
            trace!("{}", row.describe(self.model));
            if submit(ctx, &row) {
                submitted += 1;
            }
        }
        submitted
    }

    fn check_assignment(
        &self,
        values: &[f64],
        objective: f64,
        ctx: &mut dyn CandidateContext,
    ) -> (usize, Option<Cost>) {
        let instance = self.model.instance();
        let master = (objective + 0.5).floor() as Cost;
        let assignment = node_matrix(values, self.model.index());

        let solve = |v: VehicleId| -> Option<TspTour> {
            let nodes: Vec<NodeId> = (0..instance.num_nodes).filter(|&j| assignment[v][j]).collect();
            route::solve_subproblem(self.tsp, instance, v, &nodes)
        };
        let tours: Vec<Option<TspTour>> = match &self.pool {
            Some(pool) => pool.install(|| (0..instance.num_vehicles).into_par_iter().map(solve).collect()),
            None => (0..instance.num_vehicles).into_par_iter().map(solve).collect(),
        };

        let mut submitted = 0;
        let mut makespan = 0;
        let mut routes = Vec::with_capacity(tours.len());
        let mut complete = true;
        for (v, tour) in tours.into_iter().enumerate() {
            let tour = match tour {
                Some(tour) => tour,
                None => {
                    warn!("{}", Error::SubproblemSolve { vehicle: v });
                    complete = false;
                    continue;
                }
            };
            debug!(
                "Solution of the subproblem of vehicle {v} yielded the tour {:?} with length {}",
                tour.order, tour.length
            );
            makespan = makespan.max(tour.length);

            if tour.length > master && !tour.optimal {
                self.inexact_count.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "The tour of vehicle {v} with length {} exceeds {master} but is not proven optimal, no Benders cut added",
                    tour.length
                );
            } else if tour.length > master {
                for &cut in &self.benders {
                    for s in instance.same_speed_vehicles(v) {
                        let row = cut.generate(self.model, s, &tour.order, tour.length);
                        let nr = self.benders_count.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!("Adding {cut} nr.{nr} for vehicle {s}: {}", row.describe(self.model));
                        if submit(ctx, &row) {
                            submitted += 1;
                        }
                    }
                }
            } else {
                trace!("The integer solution seems to be valid for vehicle {v}");
            }
            routes.push(tour.order);
        }

        if !complete {
            return (submitted, None);
        }
        self.stage(routes, makespan, master);
        (submitted, Some(makespan))
    }

    /// Keeps `routes` if they improve on the staged routing
    fn stage(&self, routes: Vec<Vec<NodeId>>, objective: Cost, master: Cost) {
        let mut best = self.lock();
        if objective >= best.objective {
            return;
        }
        if best.is_empty() {
            info!("Found the first heuristic solution with value {objective}");
        } else {
            info!("Current best objective was {}, setting it to {objective} now", best.objective);
        }
        best.objective = objective;
        best.routes = routes;
        best.dirty = master != objective;
        if best.dirty && master < objective {
            debug!("The master solution with value {master} was invalid, staging the repaired routing");
        }
    }

    /// Offers the staged routing to the engine. Returns whether it was accepted.
    pub fn on_node(&self, ctx: &mut dyn IncumbentContext) -> bool {
        let mut best = self.lock();
        if !best.dirty {
            return false;
        }

        let bound = match ctx.best_objective() {
            Ok(bound) => bound,
            Err(e) => {
                error!("Couldn't retrieve the best objective in the callback: {e}");
                return false;
            }
        };
        let incumbent = (bound + 0.5).floor();
        if incumbent > 0.0 && incumbent <= best.objective as f64 {
            debug!(
                "Current objective {incumbent} is already at least as good as the heuristic solution {}",
                best.objective
            );
            best.dirty = false;
            return false;
        }

        debug!("Setting the heuristic solution with value {}", best.objective);
        let values = self.assignment(&best);
        match ctx.set_solution(&values) {
            Ok(Some(objective)) => {
                best.dirty = false;
                info!("New best solution with value {objective} set");
                true
            }
            Ok(None) => {
                best.dirty = false;
                error!("The engine rejected the heuristic solution with routes {:?}", best.routes);
                false
            }
            Err(e) => {
                error!("Couldn't set the heuristic solution: {e}");
                false
            }
        }
    }

    /// Complete master assignment of a routing
    fn assignment(&self, solution: &HeuristicSolution) -> Vec<f64> {
        let index = self.model.index();
        let instance = self.model.instance();
        let mut values = vec![0.0; self.model.variables().len()];
        values[IndexScheme::CMAX] = solution.objective as f64;

        for (v, route) in solution.routes.iter().enumerate() {
            let mut previous = 0;
            let mut arrival = 0;
            for &node in route {
                values[index.node_index(v, node)] = 1.0;
                if node != previous {
                    values[index.edge_index(v, previous, node)] = 1.0;
                    arrival += instance.weighted_distance(v, previous, node);
                    if let Some(c) = self.model.arrival_index(node) {
                        values[c] = arrival as f64;
                    }
                }
                previous = node;
            }
            if previous != 0 {
                let closing = if index.kind == MasterKind::Tsp && route.len() == 2 {
                    2.0
                } else {
                    1.0
                };
                values[index.edge_index(v, previous, 0)] = closing;
            }
        }
        values
    }
}

fn submit(ctx: &mut dyn CandidateContext, row: &CutRow) -> bool {
    match ctx.add_lazy(row) {
        Ok(()) => true,
        Err(e) => {
            error!("{e}");
            false
        }
    }
}

/// X[v][j] > 0.5 per vehicle
pub fn node_matrix(values: &[f64], index: &IndexScheme) -> Vec<Vec<bool>> {
    (0..index.num_vehicles)
        .map(|v| {
            (0..index.num_nodes)
                .map(|j| values[index.node_index(v, j)] > NODE_THRESHOLD)
                .collect()
        })
        .collect()
}

/// Y[v][j][k] > 0.95 per vehicle; the symmetric model fills both directions
pub fn edge_matrices(values: &[f64], index: &IndexScheme) -> Vec<Vec<Vec<bool>>> {
    let n = index.num_nodes;
    (0..index.num_vehicles)
        .map(|v| {
            let mut edges = vec![vec![false; n]; n];
            for j in 0..n {
                for k in 0..n {
                    if j != k {
                        edges[j][k] = values[index.edge_index(v, j, k)] > EDGE_THRESHOLD;
                    }
                }
            }
            edges
        })
        .collect()
}
