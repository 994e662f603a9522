use crate::problem::VehicleId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The engine rejected a variable or a constraint before solving started
    #[error("model construction failed: {0}")]
    ModelConstruction(String),

    /// A lazy constraint or a heuristic solution was rejected inside a callback
    #[error("callback submission rejected: {0}")]
    CallbackSubmission(String),

    #[error("no tour found for the subproblem of vehicle {vehicle}")]
    SubproblemSolve { vehicle: VehicleId },

    #[error("engine failure: {0}")]
    Engine(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gurobi")]
    #[error(transparent)]
    Gurobi(#[from] grb::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
