use clap::Parser;
use log::error;

use hematite::{
    config::{self, ModelKind, SurrogateSection},
    datatypes::{Geometry, LoadCase, DOF},
    error::TrussError,
    optimizer::{optimize, OptimizationOutcome, OptimizationSettings},
    solver::ExactSolver,
    surrogate::{
        train_surrogate, MlpRegressor, RbfRegressor, Regressor, SurrogateConfig, SurrogateReport,
        SurrogateSolver,
    },
};

#[derive(Parser, Debug)]
#[command(name = "hematite")]
#[command(version)]
#[command(about = "Volume-constrained compliance optimization of grid trusses")]
struct Args {
    /// Path to the input json
    input_json: String,

    /// Also train a surrogate and optimize against it
    #[arg(long)]
    surrogate: bool,

    /// Only log warnings and hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Overrides the surrogate sampling seed
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    let level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(&args) {
        error!("{err}");
        std::process::exit(1)
    }
}

fn run(args: &Args) -> Result<(), TrussError> {
    let input_json = config::load_input_file(&args.input_json)?;
    let problem = config::parse_problem(&input_json)?;
    let (geometry, load_case) = problem.build()?;
    let settings = problem.settings(geometry.bar_count(), !args.quiet)?;

    let exact = optimize(&geometry, &load_case, ExactSolver, &settings)?;
    print_outcome("exact", &geometry, &load_case, &exact);

    if !args.surrogate {
        return Ok(());
    }

    let section = problem.surrogate.clone().unwrap_or(SurrogateSection {
        model: ModelKind::default(),
        config: SurrogateConfig::default(),
    });
    let mut surrogate_config = section.config;
    surrogate_config.seed = args.seed.unwrap_or(surrogate_config.seed);
    surrogate_config.show_progress = !args.quiet;

    match section.model {
        ModelKind::Rbf => run_surrogate(
            &geometry,
            &load_case,
            &settings,
            &surrogate_config,
            &RbfRegressor::default(),
        ),
        ModelKind::Mlp => run_surrogate(
            &geometry,
            &load_case,
            &settings,
            &surrogate_config,
            &MlpRegressor {
                seed: surrogate_config.seed,
                ..MlpRegressor::default()
            },
        ),
    }
}

fn run_surrogate<R: Regressor>(
    geometry: &Geometry,
    load_case: &LoadCase,
    settings: &OptimizationSettings,
    surrogate_config: &SurrogateConfig,
    regressor: &R,
) -> Result<(), TrussError> {
    let trained = train_surrogate(
        geometry,
        load_case,
        &settings.bounds,
        surrogate_config,
        regressor,
    )?;
    print_report(&trained.report);

    let outcome = optimize(geometry, load_case, SurrogateSolver(trained.model), settings)?;
    print_outcome("surrogate", geometry, load_case, &outcome);
    Ok(())
}

fn print_report(report: &SurrogateReport) {
    let metric = |value: Option<f64>| value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.4e}"));
    println!("\nSurrogate trained on {} samples ({} held out)", report.train_samples, report.test_samples);
    println!("  train mse:      {:.4e}", report.train_mse);
    println!("  validation mse: {}", metric(report.validation_mse));
    println!("  test mse:       {}", metric(report.test_mse));
    println!("  test mae:       {}", metric(report.test_mae));
}

fn print_outcome(
    label: &str,
    geometry: &Geometry,
    load_case: &LoadCase,
    outcome: &OptimizationOutcome,
) {
    println!("\n{label} optimization");
    println!(
        "  compliance:      {:.6e} (optimizer objective {:.6e})",
        outcome.evaluation.compliance, outcome.objective
    );
    println!("  volume fraction: {:.4}", outcome.volume_fraction);
    println!(
        "  iterations:      {} (converged: {}, feasible: {})",
        outcome.iterations, outcome.converged, outcome.feasible
    );
    println!("\n  {:>5} {:>5} {:>5} {:>12} {:>12}", "bar", "from", "to", "area", "stress");
    for (i, bar) in geometry.bars().iter().enumerate() {
        println!(
            "  {:>5} {:>5} {:>5} {:>12.4e} {:>12.4e}",
            i, bar.nodes[0], bar.nodes[1], outcome.design[i], outcome.evaluation.stress[i]
        );
    }

    println!("\n  {:>5} {:>12} {:>12}", "node", "rx", "ry");
    for (node, mask) in load_case.free_mask().iter().enumerate() {
        if mask.iter().all(|free| *free) {
            continue;
        }
        println!(
            "  {:>5} {:>12.4e} {:>12.4e}",
            node,
            outcome.reactions[node * DOF],
            outcome.reactions[node * DOF + 1]
        );
    }
}
