use crate::config::Variant;
use crate::predict::writer::OutputFormat;
use crate::predict::OutputShape;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// outbreak: gradient-boosted disease outbreak classifier
#[derive(Parser, Debug)]
#[command(name = "outbreak")]
#[command(about = "Train and apply a gradient-boosted disease outbreak classifier")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on a CSV, then print aggregated predictions for it as JSON
    Run(RunArgs),

    /// Train a new model and save its artifacts
    Train(TrainArgs),

    /// Make predictions using saved artifacts
    Predict(PredictArgs),

    /// Evaluate saved artifacts on labelled data
    Evaluate(EvaluateArgs),
}

/// Selects the pipeline configuration: a JSON file, or a variant preset
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Pipeline configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Variant preset used when no configuration file is given
    #[arg(long, value_enum)]
    pub variant: Option<Variant>,
}

/// Arguments of the one-shot entrypoint
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Labelled input data (CSV)
    pub input: PathBuf,

    /// Directory for the trained artifacts
    #[arg(long, default_value = "artifacts")]
    pub artifacts: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Input data file (CSV or TSV)
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Output directory for artifacts
    #[arg(short, long, default_value = "artifacts")]
    pub output: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Random seed for split, balancing and subsampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Disable oversampling of the training partition
    #[arg(long)]
    pub no_balance: bool,

    /// Rows per class after oversampling
    #[arg(long, conflicts_with = "no_balance")]
    pub target_count: Option<usize>,

    /// Write the classification report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

/// Prediction arguments
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Input data file (CSV or TSV)
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Artifact directory
    #[arg(short, long, required = true)]
    pub model: PathBuf,

    /// Output file; predictions go to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format, guessed from the output extension when omitted
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output shape
    #[arg(long, value_enum)]
    pub shape: Option<OutputShape>,

    /// Minimum probability for a class in ranked output
    #[arg(long)]
    pub threshold: Option<f32>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Evaluation arguments
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Input data file with ground truth labels
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Artifact directory
    #[arg(short, long, required = true)]
    pub model: PathBuf,

    /// Output file for the evaluation report (JSON)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity.
///
/// Logs are written to stderr; stdout carries prediction output only.
/// `RUST_LOG` takes precedence over the verbosity flag.
pub fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["outbreak", "train", "-i", "data.csv"]);

        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.input, PathBuf::from("data.csv"));
                assert_eq!(args.output, PathBuf::from("artifacts"));
                assert!(args.config.config.is_none());
                assert!(!args.no_balance);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from(["outbreak", "-v", "run", "outbreaks.csv"]);
        assert!(cli.verbose);

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, PathBuf::from("outbreaks.csv"));
                assert_eq!(args.artifacts, PathBuf::from("artifacts"));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_predict_args() {
        let cli = Cli::parse_from([
            "outbreak", "predict",
            "-i", "input.csv",
            "-m", "artifacts",
            "-o", "output.csv",
            "--shape", "aggregated",
            "--variant", "disease",
        ]);

        match cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.input, PathBuf::from("input.csv"));
                assert_eq!(args.model, PathBuf::from("artifacts"));
                assert_eq!(args.output, Some(PathBuf::from("output.csv")));
                assert_eq!(args.shape, Some(OutputShape::Aggregated));
                assert_eq!(args.config.variant, Some(Variant::Disease));
                assert!(args.format.is_none());
            }
            _ => panic!("Expected Predict command"),
        }
    }

    #[test]
    fn test_target_count_conflicts_with_no_balance() {
        let result = Cli::try_parse_from([
            "outbreak", "train", "-i", "data.csv", "--no-balance", "--target-count", "100",
        ]);
        assert!(result.is_err());
    }
}
