//! Fault tree analysis command line interface
//!
//! Reads a model in the text format, runs the selected analysis, and
//! prints products, the total probability, and importance factors.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use cutset_logic::{Algorithm, Approximation, FaultTreeAnalysis, Model, Settings};

#[derive(Debug, Clone, ValueEnum)]
enum AlgorithmArg {
    /// Binary decision diagram pipeline (exact, supports prime implicants)
    Bdd,
    /// Direct zero-suppressed decision diagram construction
    Zbdd,
    /// MOCUS-style gate expansion for very large trees
    Mocus,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Bdd => Algorithm::Bdd,
            AlgorithmArg::Zbdd => Algorithm::Zbdd,
            AlgorithmArg::Mocus => Algorithm::Mocus,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum ApproximationArg {
    /// Exact probability by BDD traversal
    None,
    /// Sum of product probabilities
    RareEvent,
    /// Min-cut upper bound
    Mcub,
}

impl From<ApproximationArg> for Approximation {
    fn from(value: ApproximationArg) -> Self {
        match value {
            ApproximationArg::None => Approximation::None,
            ApproximationArg::RareEvent => Approximation::RareEvent,
            ApproximationArg::Mcub => Approximation::Mcub,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cutset")]
#[command(about = "Fault tree analysis: minimal cut sets, probability, importance")]
#[command(version)]
struct Args {
    /// Input model file in the cutset text format
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Top event gate (defaults to the first gate in the file)
    #[arg(short, long)]
    top: Option<String>,

    /// Product generation backend
    #[arg(short, long, value_enum, default_value = "bdd")]
    algorithm: AlgorithmArg,

    /// Probability approximation
    #[arg(long, value_enum, default_value = "none")]
    approximation: ApproximationArg,

    /// Compute prime implicants instead of minimal cut sets
    #[arg(long)]
    prime_implicants: bool,

    /// Upper bound on the product size
    #[arg(short = 'l', long, default_value_t = 20)]
    limit_order: i32,

    /// Drop products with probability below this value
    #[arg(long, default_value_t = 0.0)]
    cut_off: f64,

    /// System mission time in hours
    #[arg(long, default_value_t = 8760.0)]
    mission_time: f64,

    /// Print the importance factor table
    #[arg(short, long)]
    importance: bool,

    /// Suppress the product listing
    #[arg(long)]
    no_products: bool,

    /// Enable debug logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Err(error) = run(&args) {
        eprintln!("error: {}", error);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(&args.input)?;
    let model = Model::parse(&text)?;
    let top = match &args.top {
        Some(top) => top.clone(),
        None => model
            .first_gate()
            .ok_or("the model defines no gates")?
            .to_string(),
    };

    let mut settings = Settings::default();
    settings.algorithm(args.algorithm.clone().into())?;
    settings.approximation(args.approximation.clone().into())?;
    settings.prime_implicants(args.prime_implicants)?;
    settings.limit_order(args.limit_order)?;
    settings.cut_off(args.cut_off)?;
    settings.mission_time(args.mission_time)?;

    let mut analysis = FaultTreeAnalysis::new(&model, &top, settings)?;
    analysis.analyze()?;

    for warning in analysis.warnings() {
        eprintln!("warning: {}", warning);
    }

    let kind = if args.prime_implicants {
        "prime implicants"
    } else {
        "minimal cut sets"
    };
    println!(
        "{}: {} (max order {})",
        kind,
        analysis.products().len(),
        analysis.max_order()
    );
    if !args.no_products {
        for product in analysis.products() {
            let literals: Vec<String> = product
                .iter()
                .map(|&literal| {
                    let id = analysis.basic_event_id(literal);
                    if literal < 0 {
                        format!("~{}", id)
                    } else {
                        id.to_string()
                    }
                })
                .collect();
            println!("  {{{}}}", literals.join(", "));
        }
    }
    if let Some(probability) = analysis.total_probability() {
        println!("total probability: {:.6e}", probability);
    }
    if args.importance {
        println!(
            "{:<24} {:>4} {:>12} {:>12} {:>12} {:>12} {:>12}",
            "event", "occ", "MIF", "CIF", "DIF", "RAW", "RRW"
        );
        for record in analysis.importance() {
            let f = &record.factors;
            println!(
                "{:<24} {:>4} {:>12.4e} {:>12.4e} {:>12.4e} {:>12.4e} {:>12.4e}",
                record.event_id, f.occurrence, f.mif, f.cif, f.dif, f.raw, f.rrw
            );
        }
    }
    Ok(())
}
