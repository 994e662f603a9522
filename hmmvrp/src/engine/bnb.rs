//! Depth-first LP-based branch-and-bound with lazy constraints and heuristic injection.
//!
//! Every node solves the LP relaxation with `minilp`. Integral solutions are handed to
//! the decomposition as candidates; lazy rows it returns join the relaxation of every
//! later node, and a candidate that violates them is re-solved at the same node.

use crate::config::{BranchingOptions, SolverConfig};
use crate::cuts::{CutRow, Sense};
use crate::decomposition::{CandidateContext, Decomposition, IncumbentContext};
use crate::engine::{Engine, Status};
use crate::error::{Error, Result};
use crate::model::{MasterModel, VarSpec};
use log::{debug, info, trace};
use std::time::{Duration, Instant};

struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
    /// Relaxation value of the parent
    bound: f64,
}

struct Incumbent {
    objective: f64,
    values: Vec<f64>,
}

pub struct BranchAndBound {
    variables: Vec<VarSpec>,
    rows: Vec<CutRow>,
    static_rows: usize,
    options: BranchingOptions,
    time_limit: Option<Duration>,
    integral_objective: bool,
    incumbent: Option<Incumbent>,
    bound: f64,
    status: Option<Status>,
    explored: usize,
}

impl BranchAndBound {
    pub fn load(model: &MasterModel, config: &SolverConfig) -> Result<Self> {
        let mut engine = BranchAndBound::new(
            model.variables().to_vec(),
            config.branching.clone(),
            config.time_limit.and_then(|limit| Duration::try_from_secs_f64(limit).ok()),
        )?;
        for (name, row) in model.constraints() {
            engine.add_constraint(name, row)?;
        }
        Ok(engine)
    }

    fn new(variables: Vec<VarSpec>, options: BranchingOptions, time_limit: Option<Duration>) -> Result<Self> {
        for spec in &variables {
            if spec.lower.is_nan() || spec.upper.is_nan() || spec.lower > spec.upper {
                return Err(Error::ModelConstruction(format!(
                    "variable {} has bounds [{}, {}]",
                    spec.name, spec.lower, spec.upper
                )));
            }
        }
        let integral_objective = variables
            .iter()
            .filter(|spec| spec.objective != 0.0)
            .all(|spec| spec.kind.is_integral() && spec.objective.fract() == 0.0);

        Ok(BranchAndBound {
            variables,
            rows: Vec::new(),
            static_rows: 0,
            options,
            time_limit,
            integral_objective,
            incumbent: None,
            bound: f64::NEG_INFINITY,
            status: None,
            explored: 0,
        })
    }

    fn optimize_with(&mut self, decomposition: Option<&Decomposition>) -> Result<()> {
        let start = Instant::now();
        self.static_rows = self.rows.len();
        let mut open = vec![Node {
            lower: self.variables.iter().map(|spec| spec.lower).collect(),
            upper: self.variables.iter().map(|spec| spec.upper).collect(),
            bound: f64::NEG_INFINITY,
        }];
        let mut stopped = None;

        while let Some(node) = open.pop() {
            if self.prunable(node.bound) {
                continue;
            }
            if self.explored >= self.options.max_nodes {
                stopped = Some(Status::Other);
                open.push(node);
                break;
            }
            if self.time_limit.map_or(false, |limit| start.elapsed() >= limit) {
                stopped = Some(Status::TimeLimit);
                open.push(node);
                break;
            }
            self.explored += 1;
            self.process(node, decomposition, &mut open)?;
        }

        let best = self.incumbent.as_ref().map_or(f64::INFINITY, |i| i.objective);
        self.bound = match stopped {
            Some(_) => open.iter().map(|node| node.bound).fold(best, f64::min),
            None => best,
        };
        self.status = Some(match (stopped, &self.incumbent) {
            (Some(status), _) => status,
            (None, Some(_)) => Status::Optimal,
            (None, None) => Status::InfeasibleOrUnbounded,
        });

        info!(
            "Explored {} nodes in {:?}, added {} lazy constraints, best objective {best}, bound {}",
            self.explored,
            start.elapsed(),
            self.rows.len() - self.static_rows,
            self.bound
        );
        Ok(())
    }

    fn process(&mut self, node: Node, decomposition: Option<&Decomposition>, open: &mut Vec<Node>) -> Result<()> {
        loop {
            let (objective, values) = match self.relax(&node.lower, &node.upper)? {
                Some(relaxation) => relaxation,
                None => {
                    trace!("Node {} is infeasible", self.explored);
                    return Ok(());
                }
            };
            if self.prunable(objective) {
                return Ok(());
            }

            if let Some(decomposition) = decomposition {
                self.offer_heuristic(decomposition);
                if self.prunable(objective) {
                    return Ok(());
                }
            }

            match self.branching_variable(&values) {
                Some(var) => {
                    self.branch(var, values[var], &node, objective, open);
                    return Ok(());
                }
                None => {
                    if let Some(decomposition) = decomposition {
                        if self.check_candidate(objective, &values, decomposition) {
                            continue;
                        }
                    }
                    self.accept(objective, values);
                    return Ok(());
                }
            }
        }
    }

    fn relax(&self, lower: &[f64], upper: &[f64]) -> Result<Option<(f64, Vec<f64>)>> {
        let mut problem = minilp::Problem::new(minilp::OptimizationDirection::Minimize);
        let vars: Vec<minilp::Variable> = self
            .variables
            .iter()
            .zip(lower.iter().zip(upper))
            .map(|(spec, (&lo, &hi))| problem.add_var(spec.objective, (lo, hi)))
            .collect();

        for row in &self.rows {
            let mut expr = minilp::LinearExpr::empty();
            for &(var, coeff) in &row.terms {
                expr.add(vars[var], coeff);
            }
            let op = match row.sense {
                Sense::Le => minilp::ComparisonOp::Le,
                Sense::Eq => minilp::ComparisonOp::Eq,
                Sense::Ge => minilp::ComparisonOp::Ge,
            };
            problem.add_constraint(expr, op, row.rhs);
        }

        match problem.solve() {
            Ok(solution) => {
                let values = vars.iter().map(|&var| solution[var]).collect();
                Ok(Some((solution.objective(), values)))
            }
            Err(minilp::Error::Infeasible) => Ok(None),
            Err(e) => Err(Error::Engine(format!("LP relaxation failed: {e}"))),
        }
    }

    fn prunable(&self, bound: f64) -> bool {
        let incumbent = match &self.incumbent {
            Some(incumbent) => incumbent,
            None => return false,
        };
        let tolerance = self.options.feasibility_tolerance;
        if self.integral_objective {
            (bound - tolerance).ceil() >= incumbent.objective - tolerance
        } else {
            bound >= incumbent.objective - tolerance
        }
    }

    /// Most fractional integer variable
    fn branching_variable(&self, values: &[f64]) -> Option<usize> {
        let tolerance = self.options.integrality_tolerance;
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.kind.is_integral())
            .map(|(i, _)| (i, values[i] - values[i].floor()))
            .filter(|&(_, fraction)| fraction > tolerance && fraction < 1.0 - tolerance)
            .max_by(|a, b| {
                let a = 0.5 - (a.1 - 0.5).abs();
                let b = 0.5 - (b.1 - 0.5).abs();
                a.total_cmp(&b)
            })
            .map(|(i, _)| i)
    }

    fn branch(&self, var: usize, value: f64, node: &Node, bound: f64, open: &mut Vec<Node>) {
        let floor = value.floor();
        trace!("Branching on {} = {value}", self.variables[var].name);
        let mut down = Node {
            lower: node.lower.clone(),
            upper: node.upper.clone(),
            bound,
        };
        down.upper[var] = floor;
        let mut up = Node {
            lower: node.lower.clone(),
            upper: node.upper.clone(),
            bound,
        };
        up.lower[var] = floor + 1.0;

        // the nearer rounding is explored first
        if value - floor >= 0.5 {
            open.push(down);
            open.push(up);
        } else {
            open.push(up);
            open.push(down);
        }
    }

    /// Runs the candidate callback; returns whether a new lazy row cuts off `values`
    fn check_candidate(&mut self, objective: f64, values: &[f64], decomposition: &Decomposition) -> bool {
        let mut ctx = Candidate {
            values,
            objective,
            lazy: Vec::new(),
        };
        decomposition.on_candidate(&mut ctx);
        let tolerance = self.options.feasibility_tolerance;
        let cut_off = ctx.lazy.iter().any(|row| row.is_violated(values, tolerance));
        if !ctx.lazy.is_empty() {
            trace!("Candidate with objective {objective} received {} lazy constraints", ctx.lazy.len());
        }
        self.rows.extend(ctx.lazy);
        cut_off
    }

    fn offer_heuristic(&mut self, decomposition: &Decomposition) {
        let injected = {
            let mut ctx = Injection {
                engine: self,
                accepted: None,
            };
            decomposition.on_node(&mut ctx);
            ctx.accepted
        };
        if let Some((objective, values)) = injected {
            if !self.check_candidate(objective, &values, decomposition) {
                self.accept(objective, values);
            }
        }
    }

    fn accept(&mut self, objective: f64, mut values: Vec<f64>) {
        let tolerance = self.options.feasibility_tolerance;
        if self
            .incumbent
            .as_ref()
            .map_or(false, |incumbent| objective >= incumbent.objective - tolerance)
        {
            return;
        }
        for (value, spec) in values.iter_mut().zip(&self.variables) {
            if spec.kind.is_integral() {
                *value = value.round();
            }
        }
        let objective = if self.integral_objective { objective.round() } else { objective };
        debug!("New incumbent with objective {objective} at node {}", self.explored);
        self.incumbent = Some(Incumbent { objective, values });
    }

    fn is_feasible(&self, values: &[f64]) -> bool {
        let tolerance = self.options.feasibility_tolerance;
        let within_bounds = self.variables.iter().zip(values).all(|(spec, &value)| {
            value >= spec.lower - tolerance
                && value <= spec.upper + tolerance
                && (!spec.kind.is_integral() || (value - value.round()).abs() <= self.options.integrality_tolerance)
        });
        within_bounds && self.rows.iter().all(|row| !row.is_violated(values, tolerance))
    }

    fn objective_value(&self, values: &[f64]) -> f64 {
        self.variables
            .iter()
            .zip(values)
            .map(|(spec, value)| spec.objective * value)
            .sum()
    }
}

impl Engine for BranchAndBound {
    fn add_constraint(&mut self, name: &str, row: &CutRow) -> Result<()> {
        if let Some(&(var, _)) = row.terms.iter().find(|&&(var, _)| var >= self.variables.len()) {
            return Err(Error::ModelConstruction(format!(
                "constraint {name} references variable {var}, the model has {}",
                self.variables.len()
            )));
        }
        if row.terms.iter().any(|&(_, coeff)| !coeff.is_finite()) || !row.rhs.is_finite() {
            return Err(Error::ModelConstruction(format!("constraint {name} is not finite")));
        }
        self.rows.push(row.clone());
        Ok(())
    }

    fn optimize(&mut self, decomposition: &Decomposition) -> Result<()> {
        self.optimize_with(Some(decomposition))
    }

    fn status(&self) -> Result<Status> {
        self.status
            .ok_or_else(|| Error::Engine("the model has not been optimized".to_string()))
    }

    fn objective(&self) -> Result<f64> {
        self.incumbent
            .as_ref()
            .map(|incumbent| incumbent.objective)
            .ok_or_else(|| Error::Engine("no solution available".to_string()))
    }

    fn bound(&self) -> Result<f64> {
        match self.status {
            Some(_) => Ok(self.bound),
            None => Err(Error::Engine("the model has not been optimized".to_string())),
        }
    }

    fn values(&self) -> Result<Option<Vec<f64>>> {
        Ok(self.incumbent.as_ref().map(|incumbent| incumbent.values.clone()))
    }
}

struct Candidate<'v> {
    values: &'v [f64],
    objective: f64,
    lazy: Vec<CutRow>,
}

impl CandidateContext for Candidate<'_> {
    fn values(&self) -> Result<Vec<f64>> {
        Ok(self.values.to_vec())
    }

    fn objective(&self) -> Result<f64> {
        Ok(self.objective)
    }

    fn add_lazy(&mut self, row: &CutRow) -> Result<()> {
        self.lazy.push(row.clone());
        Ok(())
    }
}

struct Injection<'e> {
    engine: &'e BranchAndBound,
    accepted: Option<(f64, Vec<f64>)>,
}

impl IncumbentContext for Injection<'_> {
    fn best_objective(&self) -> Result<f64> {
        Ok(self
            .engine
            .incumbent
            .as_ref()
            .map_or(f64::INFINITY, |incumbent| incumbent.objective))
    }

    fn set_solution(&mut self, values: &[f64]) -> Result<Option<f64>> {
        if values.len() != self.engine.variables.len() {
            return Err(Error::CallbackSubmission(format!(
                "expected {} values, got {}",
                self.engine.variables.len(),
                values.len()
            )));
        }
        if !self.engine.is_feasible(values) {
            return Ok(None);
        }
        let objective = self.engine.objective_value(values);
        self.accepted = Some((objective, values.to_vec()));
        Ok(Some(objective))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VarKind;

    fn integer(name: &str, objective: f64, upper: f64) -> VarSpec {
        VarSpec {
            name: name.to_string(),
            kind: VarKind::Integer,
            lower: 0.0,
            upper,
            objective,
        }
    }

    fn row(terms: &[(usize, f64)], sense: Sense, rhs: f64) -> CutRow {
        CutRow {
            terms: terms.to_vec(),
            sense,
            rhs,
        }
    }

    /// max 5x + 4y s.t. 6x + 4y <= 24, x + 2y <= 6, with the LP optimum at (3, 1.5)
    fn knapsack(options: BranchingOptions) -> BranchAndBound {
        let mut engine = BranchAndBound::new(
            vec![integer("x", -5.0, f64::INFINITY), integer("y", -4.0, f64::INFINITY)],
            options,
            None,
        )
        .unwrap();
        engine.add_constraint("a", &row(&[(0, 6.0), (1, 4.0)], Sense::Le, 24.0)).unwrap();
        engine.add_constraint("b", &row(&[(0, 1.0), (1, 2.0)], Sense::Le, 6.0)).unwrap();
        engine
    }

    #[test]
    fn solves_a_small_integer_program() {
        let mut engine = knapsack(BranchingOptions::default());
        engine.optimize_with(None).unwrap();
        assert_eq!(engine.status().unwrap(), Status::Optimal);
        assert_eq!(engine.objective().unwrap(), -20.0);
        assert_eq!(engine.values().unwrap(), Some(vec![4.0, 0.0]));
        assert_eq!(engine.bound().unwrap(), -20.0);
    }

    #[test]
    fn stops_at_the_node_limit() {
        let mut engine = knapsack(BranchingOptions {
            max_nodes: 1,
            ..Default::default()
        });
        engine.optimize_with(None).unwrap();
        assert_eq!(engine.status().unwrap(), Status::Other);
        assert!(engine.values().unwrap().is_none());
        assert!(engine.bound().unwrap() <= -20.0);
    }

    #[test]
    fn detects_infeasibility() {
        let mut engine = BranchAndBound::new(
            vec![VarSpec {
                kind: VarKind::Binary,
                ..integer("x", 1.0, 1.0)
            }],
            BranchingOptions::default(),
            None,
        )
        .unwrap();
        engine.add_constraint("x_large", &row(&[(0, 1.0)], Sense::Ge, 2.0)).unwrap();
        engine.optimize_with(None).unwrap();
        assert_eq!(engine.status().unwrap(), Status::InfeasibleOrUnbounded);
        assert!(engine.objective().is_err());
    }

    #[test]
    fn rejects_unknown_variables() {
        let mut engine = knapsack(BranchingOptions::default());
        let result = engine.add_constraint("bad", &row(&[(2, 1.0)], Sense::Le, 1.0));
        assert!(matches!(result, Err(Error::ModelConstruction(_))));
        assert!(engine.status().is_err());
    }

    #[test]
    fn checks_injected_solutions() {
        let engine = knapsack(BranchingOptions::default());
        let mut injection = Injection {
            engine: &engine,
            accepted: None,
        };
        assert_eq!(injection.best_objective().unwrap(), f64::INFINITY);
        assert_eq!(injection.set_solution(&[5.0, 0.0]).unwrap(), None);
        assert_eq!(injection.set_solution(&[2.5, 0.0]).unwrap(), None);
        assert_eq!(injection.set_solution(&[2.0, 2.0]).unwrap(), Some(-18.0));
        assert!(injection.set_solution(&[2.0]).is_err());
        assert_eq!(injection.accepted, Some((-18.0, vec![2.0, 2.0])));
    }
}
