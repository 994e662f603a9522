//! MIP engines able to run the master problem with the decomposition callbacks.

pub mod bnb;
#[cfg(feature = "gurobi")]
pub mod gurobi;

use crate::config::SolverConfig;
use crate::cuts::CutRow;
use crate::decomposition::Decomposition;
use crate::error::Result;
use crate::model::MasterModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Termination state of an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Optimal,
    InfeasibleOrUnbounded,
    TimeLimit,
    /// Stopped early for any other reason, such as a node limit
    Other,
}

pub trait Engine {
    /// Adds a constraint to the model before optimization
    fn add_constraint(&mut self, name: &str, row: &CutRow) -> Result<()>;

    /// Runs the optimization, calling `decomposition` on candidates and nodes
    fn optimize(&mut self, decomposition: &Decomposition) -> Result<()>;

    fn status(&self) -> Result<Status>;

    /// Objective of the best solution found
    fn objective(&self) -> Result<f64>;

    /// Best proven lower bound
    fn bound(&self) -> Result<f64>;

    /// Values of the best solution, `None` if none was found
    fn values(&self) -> Result<Option<Vec<f64>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineKind {
    /// LP-based branch-and-bound on top of `minilp`
    #[default]
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "gurobi")]
    Gurobi,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "native" => Ok(EngineKind::Native),
            "gurobi" => Ok(EngineKind::Gurobi),
            _ => Err(format!("unknown engine {s}, expected native|gurobi")),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Native => f.write_str("native"),
            EngineKind::Gurobi => f.write_str("gurobi"),
        }
    }
}

/// Loads `model` into the engine selected by `config`
pub fn load(model: &MasterModel, config: &SolverConfig) -> Result<Box<dyn Engine>> {
    match config.engine {
        EngineKind::Native => Ok(Box::new(bnb::BranchAndBound::load(model, config)?)),
        #[cfg(feature = "gurobi")]
        EngineKind::Gurobi => Ok(Box::new(gurobi::GurobiEngine::load(model, config)?)),
        #[cfg(not(feature = "gurobi"))]
        EngineKind::Gurobi => Err(crate::error::Error::InvalidConfig(
            "the gurobi engine requires building with the gurobi feature".to_string(),
        )),
    }
}
