use crate::cuts::CutKind;
use crate::engine::EngineKind;
use crate::error::{Error, Result};
use crate::index::MasterKind;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Subtour elimination only, routes are read from the edge variables.
    /// Those are only trustworthy for binary edges: with continuous edges a fractional
    /// incumbent can pass separation and its rounded routing may be invalid.
    #[serde(rename = "LP")]
    Sec,
    /// Subtour elimination and Benders cuts from per-vehicle TSP subproblems
    #[default]
    #[serde(rename = "BCH")]
    BranchAndCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeDomain {
    #[default]
    #[serde(rename = "CONT")]
    Continuous,
    #[serde(rename = "BIN")]
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LowerBound {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "TSP")]
    Tsp,
}

/// Options of the built-in branch-and-bound engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchingOptions {
    pub max_nodes: usize,
    pub integrality_tolerance: f64,
    pub feasibility_tolerance: f64,
}

impl Default for BranchingOptions {
    fn default() -> Self {
        BranchingOptions {
            max_nodes: 100_000,
            integrality_tolerance: 1e-6,
            feasibility_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub master: MasterKind,
    pub strategy: Strategy,
    pub edge_domain: EdgeDomain,
    pub cuts: Vec<CutKind>,
    /// Miller-Tucker-Zemlin ordering constraints, only honoured by the ATSP model
    pub mtz: bool,
    pub lower_bound: LowerBound,
    pub allow_unsound_cuts: bool,
    pub engine: EngineKind,
    /// Seconds
    pub time_limit: Option<f64>,
    /// 0 lets the engine and the subproblem pool decide
    pub threads: usize,
    pub branching: BranchingOptions,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            master: MasterKind::Tsp,
            strategy: Strategy::BranchAndCheck,
            edge_domain: EdgeDomain::Continuous,
            cuts: vec![CutKind::Sec, CutKind::BendersV1],
            mtz: false,
            lower_bound: LowerBound::None,
            allow_unsound_cuts: false,
            engine: EngineKind::Native,
            time_limit: None,
            threads: 0,
            branching: BranchingOptions::default(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.allow_unsound_cuts {
            if let Some(cut) = self.cuts.iter().find(|c| !c.is_sound()) {
                return Err(Error::InvalidConfig(format!(
                    "{cut} may cut off optimal solutions, enable allow_unsound_cuts to use it"
                )));
            }
        }
        if let Some(limit) = self.time_limit {
            if !(limit > 0.0) {
                return Err(Error::InvalidConfig(format!("time limit must be positive, got {limit}")));
            }
        }
        let tolerance = self.branching.integrality_tolerance;
        if !(tolerance > 0.0 && tolerance < 0.5) {
            return Err(Error::InvalidConfig(format!(
                "integrality tolerance must lie in (0, 0.5), got {tolerance}"
            )));
        }
        if self.mtz && self.master == MasterKind::Tsp {
            warn!("MTZ constraints are only available for the ATSP model, ignoring them");
        }
        if self.strategy == Strategy::Sec && self.cuts.iter().any(|c| c.is_benders()) {
            warn!("Benders cuts are only generated by the BCH strategy, ignoring them");
        }
        if self.trusts_fractional_edges() {
            warn!("The LP strategy reads routes from continuous edge variables, use BIN edges for a valid routing");
        }
        Ok(())
    }

    /// Routes come straight from edge values that may be fractional
    pub fn trusts_fractional_edges(&self) -> bool {
        self.strategy == Strategy::Sec && self.edge_domain == EdgeDomain::Continuous
    }

    pub fn uses_mtz(&self) -> bool {
        self.mtz && self.master == MasterKind::Atsp
    }

    /// Whether candidates are scanned for subtours
    pub fn separates_subtours(&self) -> bool {
        self.strategy == Strategy::Sec || self.cuts.contains(&CutKind::Sec)
    }

    pub fn benders_cuts(&self) -> Vec<CutKind> {
        self.cuts.iter().copied().filter(|c| c.is_benders()).collect()
    }

    pub fn summary(&self) -> String {
        let cuts: Vec<String> = self.cuts.iter().map(|c| c.to_string()).collect();
        format!(
            "Solver-Settings: Threads={}, Strat={}, Model={}, yBounds={}, Cuts=[{}]",
            self.threads,
            self.strategy,
            self.master,
            self.edge_domain,
            cuts.join(" ")
        )
    }
}

macro_rules! named_options {
    ($type:ty, $($variant:path => $name:literal),+ $(,)?) => {
        impl FromStr for $type {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok($variant),)+
                    _ => Err(format!(
                        "unknown value {s}, expected one of {}",
                        [$($name),+].join("|")
                    )),
                }
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($variant => f.write_str($name),)+
                }
            }
        }
    };
}

named_options!(Strategy, Strategy::Sec => "LP", Strategy::BranchAndCheck => "BCH");
named_options!(EdgeDomain, EdgeDomain::Continuous => "CONT", EdgeDomain::Binary => "BIN");
named_options!(LowerBound, LowerBound::None => "none", LowerBound::Tsp => "TSP");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtour_elimination_wants_binary_edges() {
        let mut config = SolverConfig {
            strategy: Strategy::Sec,
            edge_domain: EdgeDomain::Continuous,
            ..Default::default()
        };
        assert!(config.trusts_fractional_edges());
        assert!(config.validate().is_ok());

        config.edge_domain = EdgeDomain::Binary;
        assert!(!config.trusts_fractional_edges());
        assert!(!SolverConfig::default().trusts_fractional_edges());
    }

    #[test]
    fn default_is_sound_branch_and_check() {
        let config = SolverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.strategy, Strategy::BranchAndCheck);
        assert_eq!(config.benders_cuts(), vec![CutKind::BendersV1]);
        assert!(config.separates_subtours());
        assert!(!config.uses_mtz());
    }

    #[test]
    fn rejects_unsound_cuts_without_opt_in() {
        let mut config = SolverConfig {
            cuts: vec![CutKind::Sec, CutKind::BendersV5],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.allow_unsound_cuts = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn mtz_requires_asymmetric_model() {
        let mut config = SolverConfig {
            mtz: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.uses_mtz());
        config.master = MasterKind::Atsp;
        assert!(config.uses_mtz());
    }

    #[test]
    fn rejects_non_positive_time_limit() {
        let config = SolverConfig {
            time_limit: Some(0.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_partial_json() {
        let config: SolverConfig =
            serde_json::from_str(r#"{"master": "ATSP", "strategy": "LP", "cuts": ["SEC"]}"#).unwrap();
        assert_eq!(config.master, MasterKind::Atsp);
        assert_eq!(config.strategy, Strategy::Sec);
        assert_eq!(config.cuts, vec![CutKind::Sec]);
        assert_eq!(config.edge_domain, EdgeDomain::Continuous);
    }

    #[test]
    fn parses_flag_values() {
        assert_eq!("BCH".parse::<Strategy>(), Ok(Strategy::BranchAndCheck));
        assert_eq!("BIN".parse::<EdgeDomain>(), Ok(EdgeDomain::Binary));
        assert_eq!(LowerBound::Tsp.to_string(), "TSP");
        assert!("MIP".parse::<Strategy>().is_err());
    }
}
