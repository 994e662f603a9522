//! Solve session: builds the master model, runs the engine with the decomposition
//! callbacks and turns the engine state into a [`Solution`].

use crate::config::{LowerBound, SolverConfig};
use crate::cuts::{CutRow, Sense};
use crate::decomposition::{self, Decomposition};
use crate::engine::{self, Engine, Status};
use crate::error::Result;
use crate::index::IndexScheme;
use crate::model::MasterModel;
use crate::problem::{Cost, Instance, NodeId};
use crate::route::{self, TspSolver};
use crate::solution::Solution;
use crate::subtour;
use log::{debug, error, info, warn};
use std::time::Instant;

/// Solves `instance` with the settings of `config`
pub fn solve(instance: &Instance, config: &SolverConfig) -> Result<Solution> {
    solve_with(instance, config, &route::Solver {})
}

/// Solves `instance` with `tsp` for the lower bound and the vehicle subproblems
pub fn solve_with(instance: &Instance, config: &SolverConfig, tsp: &dyn TspSolver) -> Result<Solution> {
    config.validate()?;
    info!("{}", config.summary());

    let model = MasterModel::build(instance, config);
    let mut engine = engine::load(&model, config)?;

    let mut solution = Solution {
        comment: config.summary(),
        ..Default::default()
    };

    if config.lower_bound == LowerBound::Tsp {
        if let Some((row, length)) = tsp_lower_bound(instance, tsp) {
            info!("Set the TSP lower bound: CMax >= {:.2}", row.rhs);
            engine.add_constraint("tspLBound", &row)?;
            solution.tsp_length = Some(length);
        }
    }

    let decomposition = Decomposition::new(&model, config, tsp)?;
    let start = Instant::now();
    engine.optimize(&decomposition)?;
    solution.time = format!("{:?}", start.elapsed());
    info!("---OPTIMIZATION DONE---");

    capture_solution(engine.as_ref(), &decomposition, &mut solution)?;

    let problems = solution.validate(instance);
    if problems.is_empty() {
        info!("The computed solution is valid");
    } else {
        for problem in &problems {
            error!("{problem}");
        }
    }
    match solution.obj {
        Some(obj) => info!("Found a hmmVRP solution with objective {obj}"),
        None => warn!("No hmmVRP solution found for {}", instance.name),
    }
    Ok(solution)
}

/// Row `CMax >= (tsp - (M-1)*maxTourEdge + M*minEdge) / sum_v(1/S[v])` and the TSP length,
/// if the tour over all nodes is proven optimal
fn tsp_lower_bound(instance: &Instance, tsp: &dyn TspSolver) -> Option<(CutRow, Cost)> {
    let distances = instance.distances();
    let tour = match tsp.solve(distances) {
        Some(tour) => tour,
        None => {
            warn!("No TSP tour found, the lower bound is not added");
            return None;
        }
    };
    info!("TSP length for this graph is {}", tour.length);
    if !tour.optimal {
        warn!("The TSP tour is not proven optimal, the lower bound is not added");
        return None;
    }

    let min_edge = instance
        .all_nodes()
        .flat_map(|j| instance.all_nodes_after(j).map(move |k| (j, k)))
        .map(|(j, k)| instance.distance(j, k))
        .min()
        .unwrap_or(0);
    let max_tour_edge = tour
        .order
        .iter()
        .zip(tour.order.iter().cycle().skip(1))
        .map(|(&j, &k)| instance.distance(j, k))
        .max()
        .unwrap_or(0);

    let m = instance.num_vehicles as Cost;
    let numerator = tour.length - (m - 1) * max_tour_edge + m * min_edge;
    let inverse_speeds: f64 = instance.speeds().iter().map(|&s| 1.0 / s as f64).sum();

    let mut row = CutRow::new(Sense::Ge, numerator as f64 / inverse_speeds);
    row.add_term(1.0, IndexScheme::CMAX);
    Some((row, tour.length))
}

fn round(value: f64) -> Option<Cost> {
    (value.is_finite() && value >= 0.0).then(|| (value + 0.5).floor() as Cost)
}

/// Closes every route at the depot
fn closed(routes: &[Vec<NodeId>]) -> Vec<Vec<NodeId>> {
    routes
        .iter()
        .map(|route| {
            let mut closed = route.clone();
            closed.push(0);
            closed
        })
        .collect()
}

/// Closed depot walks of the selected edges, one per vehicle
fn edge_routes(values: &[f64], model: &MasterModel) -> Vec<Vec<NodeId>> {
    decomposition::edge_matrices(values, model.index())
        .iter()
        .enumerate()
        .map(|(v, edges)| {
            let detection = subtour::find_subtour(edges);
            if detection.is_invalid() {
                error!("Tour {v} is invalid (contains no depot): {:?}", detection.nodes());
            }
            let mut closed = detection.into_nodes();
            closed.push(0);
            closed
        })
        .collect()
}

fn covers_customers(instance: &Instance, routes: &[Vec<NodeId>]) -> bool {
    let check = Solution {
        routes: routes.to_vec(),
        ..Default::default()
    };
    check.validate(instance).is_empty()
}

fn makespan(instance: &Instance, routes: &[Vec<NodeId>]) -> Cost {
    routes
        .iter()
        .enumerate()
        .map(|(v, route)| instance.route_cost(v, route))
        .max()
        .unwrap_or(0)
}

/// Fills objective, bounds and routes of `solution` from the engine and the staged heuristic
fn capture_solution(engine: &dyn Engine, decomposition: &Decomposition, solution: &mut Solution) -> Result<()> {
    let model = decomposition.model();
    let instance = model.instance();

    match engine.status()? {
        Status::Optimal => solution.optimal = true,
        Status::InfeasibleOrUnbounded => {
            error!("Model for {} is infeasible or unbounded", instance.name);
            solution.note("The model is infeasible or unbounded.");
        }
        Status::TimeLimit => solution.note("Time limit reached."),
        Status::Other => {
            solution.note("The optimization stopped before the time limit without an optimal solution.")
        }
    }

    let best = decomposition.best_solution();
    let heuristic = (!best.is_empty()).then(|| (best.objective, closed(&best.routes)));
    let master = match engine.objective() {
        Ok(objective) => round(objective),
        Err(e) => {
            debug!("No objective value available: {e}");
            None
        }
    };
    let master_routes = engine.values()?.map(|values| edge_routes(&values, model));

    let inexact = decomposition.inexact_subproblems() > 0;
    let (obj, routes) = if inexact {
        warn!(
            "{} subproblem tours were not proven optimal, the master objective only bounds the makespan",
            decomposition.inexact_subproblems()
        );
        solution.note("Some subproblems were solved heuristically.");
        // only routings with recomputed costs qualify
        let read = master_routes
            .filter(|routes| covers_customers(instance, routes))
            .map(|routes| (makespan(instance, &routes), routes));
        let chosen = match (heuristic, read) {
            (Some(staged), Some(read)) => Some(if read.0 < staged.0 { read } else { staged }),
            (staged, read) => staged.or(read),
        };
        match chosen {
            Some((obj, routes)) => (Some(obj), routes),
            None => (None, Vec::new()),
        }
    } else {
        let obj = match (master, heuristic.as_ref().map(|(objective, _)| *objective)) {
            (Some(master), Some(heuristic)) => Some(master.min(heuristic)),
            (master, heuristic) => master.or(heuristic),
        };
        let routes = heuristic
            .map(|(_, routes)| routes)
            .or(master_routes)
            .unwrap_or_default();
        (obj, routes)
    };
    solution.obj = obj;
    solution.ubound = obj;
    solution.routes = routes;

    solution.lbound = match engine.bound() {
        Ok(bound) => match (round(bound), solution.obj) {
            (Some(bound), Some(obj)) => bound.min(obj),
            (Some(bound), None) => bound,
            (None, _) => 0,
        },
        Err(e) => {
            solution.note(&format!("Couldn't retrieve the lower bound: {e}."));
            0
        }
    };
    // the bound is still valid, the incumbent may not be
    if inexact && solution.obj != Some(solution.lbound) {
        solution.optimal = false;
    }

    solution.route_costs = solution
        .routes
        .iter()
        .enumerate()
        .map(|(v, route)| instance.route_cost(v, route))
        .collect();

    info!(
        "Added {} SECs and {} Benders cuts",
        decomposition.subtour_cuts(),
        decomposition.benders_cuts()
    );
    info!("Found tours with CMax {:?}: {:?}", solution.obj, solution.routes);
    Ok(())
}
