//! DTA CLI - distance-to-target analyzer.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dta::{AnalyzerOptions, PROJECT_ROOT_ENV};

#[derive(Parser)]
#[command(name = "dta")]
#[command(about = "Distance-to-target analyzer for directed fuzzing")]
#[command(version)]
struct Cli {
    /// Processed ICFG dot file from the pointer-analysis step
    #[arg(short, long, value_name = "DOT")]
    graph: PathBuf,

    /// Target location file (JSON array or one path:line per line)
    #[arg(short, long, value_name = "FILE")]
    targets: Option<PathBuf>,

    /// Output directory for all artifacts
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Project root directory (default: from DTA_PROJECT_ROOT)
    #[arg(short, long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Dump the simplified call graph
    #[arg(long)]
    cg: bool,

    /// Dump the distances for function calls
    #[arg(long)]
    calldist: bool,

    /// Dump the pre-completion block distances
    #[arg(long)]
    blockpredist: bool,

    /// Never dump the basic-block distances and target info
    #[arg(long)]
    no_bbdist: bool,

    /// Summarize target distances with a fitted gamma distribution
    #[arg(long)]
    distrib: bool,

    /// Fit the gamma distribution by the method of moments
    #[arg(long, requires = "distrib")]
    moment: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["dta", "dta_icfg", "dta_analysis", "dta_stats", "dta_pool"] {
        filter = filter.add_directive(format!("{target}={level}").parse().unwrap());
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let options = AnalyzerOptions {
        graph: cli.graph,
        targets: cli.targets,
        output_dir: cli.output,
        project_root: cli.root,
        dump_callgraph: cli.cg,
        dump_call_distances: cli.calldist,
        dump_pre_distances: cli.blockpredist,
        dump_bb_distances: !cli.no_bbdist,
        use_distribution: cli.distrib,
        use_moments: cli.moment,
    };
    if options.project_root.is_none() {
        info!("project root not given, falling back to {PROJECT_ROOT_ENV}");
    }

    if let Err(err) = dta::run(&options) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
