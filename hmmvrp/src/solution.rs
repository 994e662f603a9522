use crate::problem::{Cost, Instance, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result record of a solve, stored under `Solution` in the instance file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Makespan of the best routing, `None` if no routing was found
    pub obj: Option<Cost>,
    pub lbound: Cost,
    pub ubound: Option<Cost>,
    pub optimal: bool,
    pub route_costs: Vec<Cost>,
    /// Closed routes, one per vehicle, e.g. `[0, 2, 1, 0]`
    pub routes: Vec<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tsp_length: Option<Cost>,
    pub time: String,
    pub comment: String,
}

impl Solution {
    /// Appends `message` to the comment, separated by a space
    pub fn note(&mut self, message: &str) {
        if !self.comment.is_empty() {
            self.comment.push(' ');
        }
        self.comment.push_str(message);
    }

    pub fn makespan(&self) -> Option<Cost> {
        self.route_costs.iter().copied().max()
    }

    /// Problems of the routing with respect to `instance`; empty if the routing is valid
    pub fn validate(&self, instance: &Instance) -> Vec<String> {
        let mut problems = Vec::new();
        if self.routes.len() != instance.num_vehicles {
            problems.push(format!(
                "Expected {} routes but found {}",
                instance.num_vehicles,
                self.routes.len()
            ));
        }

        let mut visits = vec![0; instance.num_nodes];
        for (v, route) in self.routes.iter().enumerate() {
            if route.first() != Some(&0) || route.last() != Some(&0) {
                problems.push(format!("Route {v} does not start and end at the depot: {route:?}"));
            }
            if let Some(&node) = route.iter().find(|&&node| node >= instance.num_nodes) {
                problems.push(format!("Route {v} visits the unknown node {node}"));
                continue;
            }
            for &node in route.iter().filter(|&&node| node != 0) {
                visits[node] += 1;
            }
            if v >= instance.num_vehicles {
                continue;
            }
            let length = instance.route_cost(v, route);
            match self.obj {
                Some(obj) if length > obj => problems.push(format!(
                    "The computed solution is too long! Route {v} is {length} but can only be {obj}!"
                )),
                _ => (),
            }
        }

        for j in instance.all_customers() {
            if visits[j] != 1 {
                problems.push(format!("Customer {j} is visited {} times", visits[j]));
            }
        }
        problems
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (v, route) in self.routes.iter().enumerate() {
            write!(f, "Route {}: ", v + 1)?;
            let stops: Vec<String> = route.iter().map(|node| node.to_string()).collect();
            write!(f, "{}", stops.join(" - "))?;
            match self.route_costs.get(v) {
                Some(cost) => writeln!(f, " ( {cost} )")?,
                None => writeln!(f)?,
            }
        }
        match self.obj {
            Some(obj) => writeln!(f, "Objective {obj} (lower bound {})", self.lbound)?,
            None => writeln!(f, "No solution (lower bound {})", self.lbound)?,
        }
        writeln!(f, "Optimal {}", self.optimal)?;
        if let Some(length) = self.tsp_length {
            writeln!(f, "TSP length {length}")?;
        }
        writeln!(f, "Time {}", self.time)?;
        if !self.comment.is_empty() {
            writeln!(f, "{}", self.comment)?;
        }
        Ok(())
    }
}
