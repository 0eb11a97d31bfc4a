use std::{
    error::Error,
    path::{Path, PathBuf},
    time::Instant,
};

use bp_rust::{
    alg::{options::SolverOptions, propagation::PropagationEngine, strategy::PropagationKind},
    energy::{
        cost_cache::CostCache, edge_collapser::EdgeCollapser, energy_function::EnergyFunction,
        uai::read_uai,
    },
};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};

/// Computes approximate marginals of MARKOV models in UAI format by belief propagation
#[derive(Parser, Debug)]
#[command(name = "bp-rust", version, about, long_about = None)]
struct Cli {
    /// UAI file or directory of UAI files
    #[arg(default_value = "test_instances/")]
    instances: PathBuf,

    /// Iteration budget
    #[arg(long, default_value_t = 20)]
    max_iterations: usize,

    /// Convergence threshold on the largest message change
    #[arg(long, default_value_t = 0.001)]
    eps: f64,

    /// Number of worker threads
    #[arg(long, short = 'j', default_value_t = 4)]
    workers: usize,

    /// Send messages only from the lower- to the higher-indexed variable of every pairwise function
    #[arg(long)]
    directed: bool,

    /// Table entries are logarithms of potentials
    #[arg(long)]
    lg: bool,
}

fn instance_files(path: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        if file.is_file() {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn process_instance(
    input_file: &Path,
    kind: PropagationKind,
    options: &SolverOptions,
    lg: bool,
) -> Result<(), Box<dyn Error>> {
    let time_start = Instant::now();
    let model = read_uai(input_file, lg)?;
    info!(
        "UAI import complete. Elapsed time {:?}.",
        time_start.elapsed()
    );

    let model = CostCache::new(EdgeCollapser::new(model)?)?;
    let mut engine = PropagationEngine::new(kind, options.clone())?;
    engine.init(&model)?;

    engine.solve(&model)?;
    if !engine.converged() {
        warn!(
            "No convergence within {} iterations, max delta {:.3e}.",
            engine.iterations(),
            engine.last_delta()
        );
    }

    for node in 0..model.node_count() {
        debug!("Beliefs of variable {}: {}", node, engine.beliefs(node)?);
    }
    let labels = engine.max_belief_labels()?;
    info!("Most likely labels: {:?}", labels);
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut options = SolverOptions::default();
    options
        .set_max_iterations(cli.max_iterations)
        .set_eps(cli.eps)
        .set_worker_count(cli.workers);
    options.validate()?;
    let kind = match cli.directed {
        true => PropagationKind::Directed,
        false => PropagationKind::Undirected,
    };

    for input_file in instance_files(&cli.instances)? {
        info!("Processing instance {:?}.", input_file);
        if let Err(error) = process_instance(&input_file, kind, &options, cli.lg) {
            warn!("Failed to process instance {:?}: {}", input_file, error);
            continue;
        }
        info!("Finished processing instance {:?}.", input_file);
    }
    Ok(())
}
