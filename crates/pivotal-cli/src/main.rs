use clap::{Parser, Subcommand, ValueEnum};
use pivotal_solver::{
    LpProblem, PivotRule, QpProblem, Solution, SolutionStatus, SolveOptions, SolverError,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pivotal")]
#[command(about = "Solve linear, mixed-integer and quadratic programs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a model file and print the solution
    Solve {
        /// JSON model file
        file: PathBuf,
        /// Show shadow prices, reduced costs and binding constraints
        #[arg(short, long)]
        analysis: bool,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
        /// Pivot cap for LP/QP, node cap for MIP
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Tolerance for floating point comparisons
        #[arg(long, default_value_t = 1e-9)]
        tolerance: f64,
        /// Use Bland's rule for every simplex pivot
        #[arg(long)]
        bland: bool,
    },
    /// Check a model file for errors
    Check {
        /// JSON model file
        file: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

/// On-disk model: `{"kind": "lp", ...}` or `{"kind": "qp", ...}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ModelFile {
    Lp(LpProblem),
    Qp(QpProblem),
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Error reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}

impl ModelFile {
    fn load(path: &Path) -> Result<Self, CliError> {
        let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&source)?)
    }

    fn validate(&self) -> Result<(), SolverError> {
        match self {
            ModelFile::Lp(problem) => problem.validate(),
            ModelFile::Qp(problem) => problem.validate(),
        }
    }

    fn solve(&self, options: &SolveOptions) -> Result<Solution, SolverError> {
        match self {
            ModelFile::Lp(problem) if problem.has_integer_variables() => {
                pivotal_solver::solve_mip(problem, options)
            }
            ModelFile::Lp(problem) => pivotal_solver::solve_lp(problem, options),
            ModelFile::Qp(problem) => pivotal_solver::solve_qp(problem, options),
        }
    }

    fn variable_names(&self) -> Vec<String> {
        match self {
            ModelFile::Lp(problem) => problem.variables.iter().map(|v| v.name.clone()).collect(),
            ModelFile::Qp(problem) => (0..problem.num_variables()).map(|i| format!("x{}", i)).collect(),
        }
    }

    fn describe(&self) -> String {
        match self {
            ModelFile::Lp(problem) => {
                let integers = problem.variables.iter().filter(|v| v.is_integral()).count();
                format!(
                    "{}: {} variables ({} integer), {} constraints",
                    if integers > 0 { "MIP" } else { "LP" },
                    problem.num_variables(),
                    integers,
                    problem.num_constraints()
                )
            }
            ModelFile::Qp(problem) => format!(
                "QP: {} variables, {} equalities, {} inequalities",
                problem.num_variables(),
                problem.meq(),
                problem.num_constraints() - problem.meq()
            ),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_pretty(model: &ModelFile, solution: &Solution, analysis: bool) {
    println!("Status: {}", status_label(solution.status));
    if solution.values.is_empty() {
        match solution.status {
            SolutionStatus::Infeasible => println!("No solution exists that satisfies all constraints."),
            SolutionStatus::Unbounded => println!("The problem has no finite optimal solution."),
            _ => println!("No solution was found before the iteration limit."),
        }
        return;
    }

    println!("Objective: {:.6}", solution.objective_value);
    println!("Iterations: {}", solution.iterations);
    if solution.nodes > 0 {
        println!("Nodes: {}", solution.nodes);
    }
    println!();
    println!("Variables:");
    for (name, value) in model.variable_names().iter().zip(&solution.values) {
        println!("  {:20} {:14.6}", name, value);
    }

    if analysis && solution.status == SolutionStatus::Optimal {
        println!();
        println!("Analysis:");
        println!();

        if !solution.analysis.binding_constraints.is_empty() {
            println!("Binding constraints:");
            for name in &solution.analysis.binding_constraints {
                println!("  - {}", name);
            }
            println!();
        }

        if !solution.analysis.shadow_prices.is_empty() {
            println!("Shadow prices:");
            for sp in &solution.analysis.shadow_prices {
                println!("  {:30} {:14.6}", sp.constraint, sp.value);
            }
            println!();
        }

        let nonbasic: Vec<_> = solution
            .analysis
            .reduced_costs
            .iter()
            .filter(|rc| !rc.is_basic && rc.reduced_cost.abs() > 1e-9)
            .collect();
        if !nonbasic.is_empty() {
            println!("Reduced costs (variables at a bound):");
            for rc in nonbasic {
                println!("  {:20} {:14.6}", rc.variable, rc.reduced_cost);
            }
        }
    }
}

fn status_label(status: SolutionStatus) -> &'static str {
    match status {
        SolutionStatus::Optimal => "OPTIMAL",
        SolutionStatus::Infeasible => "INFEASIBLE",
        SolutionStatus::Unbounded => "UNBOUNDED",
        SolutionStatus::IterationLimitExceeded => "ITERATION LIMIT",
    }
}

fn run(cli: Cli) -> Result<bool, CliError> {
    match cli.command {
        Commands::Solve {
            file,
            analysis,
            format,
            max_iterations,
            tolerance,
            bland,
        } => {
            let model = ModelFile::load(&file)?;
            info!(file = %file.display(), model = %model.describe(), "Loaded model");

            let mut options = SolveOptions::new().with_tolerance(tolerance);
            if let Some(limit) = max_iterations {
                options = options.with_iteration_limit(limit);
            }
            if bland {
                options = options.with_pivot_rule(PivotRule::Bland);
            }
            debug!(?options, "Solve options");

            let mut solution = model.solve(&options)?;
            if !analysis {
                solution.analysis = Default::default();
            }

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&solution)?),
                Format::Pretty => print_pretty(&model, &solution, analysis),
            }
            Ok(solution.is_optimal())
        }
        Commands::Check { file } => {
            let model = ModelFile::load(&file)?;
            model.validate()?;
            println!("✓ {} is valid", file.display());
            println!("  {}", model.describe());
            Ok(true)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
