use clap::{ArgAction, Parser, Subcommand};
use hmmvrp::config::{BranchingOptions, EdgeDomain, LowerBound, Strategy};
use hmmvrp::cuts::CutKind;
use hmmvrp::engine::EngineKind;
use hmmvrp::index::MasterKind;
use hmmvrp::problem::EdgeWeightType;
use hmmvrp::{GeneratorConfig, SolverConfig, SpeedStrategy};
use log::LevelFilter;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro128StarStar;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "hmmvrp")]
#[command(about = "Branch-and-check solver for the heterogeneous min-max vehicle routing problem")]
struct Cli {
    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve an instance file and store the solution in it
    Solve {
        #[arg(short, long, default_value = "input.json")]
        input: PathBuf,

        /// Where to write the solved instance, defaults to the input file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Solving strategy (LP|BCH)
        #[arg(long, default_value = "BCH")]
        strat: Strategy,

        /// Master model (ATSP|TSP)
        #[arg(long, default_value = "TSP")]
        model: MasterKind,

        /// Comma separated cuts (SEC, BEND_V1 .. BEND_V6)
        #[arg(long, value_delimiter = ',', default_value = "SEC,BEND_V1")]
        cuts: Vec<CutKind>,

        /// Add MTZ arrival time constraints to the ATSP model
        #[arg(long)]
        mtz: bool,

        /// Lower bound strategy (none|TSP)
        #[arg(long, default_value = "none")]
        lbstrat: LowerBound,

        /// Domain of the edge variables (CONT|BIN)
        #[arg(long, default_value = "CONT")]
        y_bounds: EdgeDomain,

        /// Allow Benders cuts that may cut off optimal solutions
        #[arg(long)]
        allow_unsound_cuts: bool,

        /// MIP engine (native|gurobi)
        #[arg(long, default_value = "native")]
        engine: EngineKind,

        /// Time limit in seconds
        #[arg(long)]
        time_limit: Option<f64>,

        /// Threads for the subproblems, 0 uses the global pool
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Node limit of the native engine
        #[arg(long, default_value = "100000")]
        max_nodes: usize,
    },

    /// Generate random instance files
    Generate {
        /// Comma separated node counts, depot included
        #[arg(short, long, value_delimiter = ',', default_value = "10")]
        nodes: Vec<usize>,

        /// Comma separated vehicle counts
        #[arg(short = 'm', long, value_delimiter = ',', default_value = "2")]
        vehicles: Vec<usize>,

        /// Comma separated speed strategies (ONE|RNG|RNG-GROUP)
        #[arg(short, long, value_delimiter = ',', default_value = "ONE")]
        speeds: Vec<SpeedStrategy>,

        #[arg(long, default_value = "hmmvrp")]
        name: String,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Instances per combination
        #[arg(long, default_value = "1")]
        count: usize,

        /// Lowest speed factor
        #[arg(long, default_value = "1")]
        rng_start: i64,

        /// Width of the speed factor range
        #[arg(long, default_value = "10")]
        rng_end: i64,

        /// Vehicles sharing one speed with RNG-GROUP
        #[arg(long, default_value = "3")]
        veh_group_size: usize,

        #[arg(short, default_value = "10000")]
        x: u32,

        #[arg(short, default_value = "10000")]
        y: u32,

        /// Edge weight type (EUC_2D|CEIL_2D)
        #[arg(short, default_value = "EUC_2D")]
        w: EdgeWeightType,

        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn run(command: Command) -> hmmvrp::Result<()> {
    match command {
        Command::Solve {
            input,
            output,
            strat,
            model,
            cuts,
            mtz,
            lbstrat,
            y_bounds,
            allow_unsound_cuts,
            engine,
            time_limit,
            threads,
            max_nodes,
        } => {
            let config = SolverConfig {
                master: model,
                strategy: strat,
                edge_domain: y_bounds,
                cuts,
                mtz,
                lower_bound: lbstrat,
                allow_unsound_cuts,
                engine,
                time_limit,
                threads,
                branching: BranchingOptions {
                    max_nodes,
                    ..Default::default()
                },
            };
            let output = output.unwrap_or_else(|| input.clone());
            hmmvrp::solve_file(&input, &output, &config)?;
        }
        Command::Generate {
            nodes,
            vehicles,
            speeds,
            name,
            output_dir,
            count,
            rng_start,
            rng_end,
            veh_group_size,
            x,
            y,
            w,
            seed,
        } => {
            let base = GeneratorConfig {
                name,
                x_max: x,
                y_max: y,
                rng_start,
                rng_end,
                group_size: veh_group_size,
                weight_type: w,
                ..Default::default()
            };
            let mut rng = Xoshiro128StarStar::seed_from_u64(seed);
            let written = hmmvrp::generate_files(&base, &nodes, &vehicles, &speeds, count, &output_dir, &mut rng)?;
            println!("Generated {} instances in {output_dir:?}", written.len());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("Application error: {e}");
        process::exit(1);
    }
}
