//! perception-eval CLI - image recognition test suite driver

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

/// Run image recognition test suites against COCO-style ground truth.
#[derive(Parser)]
#[command(name = "perception-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a test suite over a directory of images
    Run(RunArgs),

    /// Inspect and validate testset descriptions
    Dataset {
        #[command(subcommand)]
        action: DatasetAction,
    },

    /// Summarize a previously written suite report
    Summary {
        /// suite.json file, or the report directory containing it
        input: PathBuf,
    },
}

/// Arguments for the `run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Directory with test images
    pub dir: PathBuf,

    /// Testset description (defaults to <dir>/testset.json)
    #[arg(long)]
    pub testset: Option<PathBuf>,

    /// Reply budget per case, in milliseconds
    #[arg(long, default_value_t = 15_000)]
    pub timeout_ms: u64,

    /// Directory for report output (suite.json, cases.csv)
    #[arg(short, long)]
    pub report_dir: Option<PathBuf>,

    /// Answer transmissions from a scripted reply file instead of a live system
    #[arg(long, conflicts_with = "silent_sut")]
    pub replay: Option<PathBuf>,

    /// Delay scripted replies, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub reply_delay_ms: u64,

    /// Never reply, driving every case into the timeout path
    #[arg(long)]
    pub silent_sut: bool,

    /// Do not attach image artifacts to reports
    #[arg(long)]
    pub no_artifacts: bool,
}

#[derive(Subcommand)]
pub enum DatasetAction {
    /// Show testset contents and counts
    Info {
        /// Testset JSON file
        path: PathBuf,
    },

    /// Check referential integrity and report problems
    Validate {
        /// Testset JSON file
        path: PathBuf,

        /// Image directory to cross-check against the testset
        #[arg(long)]
        images: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.verbose),
        Commands::Dataset { action } => commands::dataset::run(action, cli.verbose),
        Commands::Summary { input } => commands::summary::run(input, cli.verbose),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
