//! Branch-and-check solver for the heterogeneous min-max multi-vehicle routing problem.

pub mod config;
pub mod cuts;
pub mod decomposition;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod problem;
pub mod route;
pub mod solution;
pub mod solver;
pub mod subtour;

pub use config::SolverConfig;
pub use error::{Error, Result};
pub use problem::{GeneratorConfig, Instance, InstanceFile, SpeedStrategy};
pub use solution::Solution;

use log::{info, warn};
use rand::Rng;
use std::path::{Path, PathBuf};

/// Solves the instance stored at `input` and writes it, with its solution record, to `output`
pub fn solve_file(input: &Path, output: &Path, config: &SolverConfig) -> Result<Solution> {
    info!("Reading instance from {input:?}");
    let mut file = InstanceFile::read_from_file(input)?;
    let instance = file.to_instance()?;
    info!("{instance}");

    let solution = solver::solve(&instance, config)?;
    println!("{solution}");

    file.solution = Some(solution.clone());
    file.write_to_file(output)?;
    info!("Wrote the solution to {output:?}");
    Ok(solution)
}

/// Writes `count` random instances for every combination of node count, vehicle count and
/// speed strategy to `output_dir`. Returns the written paths.
pub fn generate_files<R: Rng>(
    base: &GeneratorConfig,
    nodes: &[usize],
    vehicles: &[usize],
    speeds: &[SpeedStrategy],
    count: usize,
    output_dir: &Path,
    rng: &mut R,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for index in 0..count {
        for &n in nodes {
            for &m in vehicles {
                if n < m + 1 {
                    warn!("Skipping {n} nodes with {m} vehicles, every vehicle needs a customer");
                    continue;
                }
                for &strategy in speeds {
                    let config = GeneratorConfig {
                        nodes: n,
                        vehicles: m,
                        speeds: strategy,
                        ..base.clone()
                    };
                    let file = InstanceFile::generate(&config, index, rng);
                    let path = output_dir.join(format!("{}.json", file.name));
                    file.write_to_file(&path)?;
                    info!("Wrote {path:?}");
                    written.push(path);
                }
            }
        }
    }
    Ok(written)
}
