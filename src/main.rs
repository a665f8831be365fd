use anyhow::{Context, Result};
use clap::ValueEnum;
use outbreak::cli::{parse_args, setup_logging, Commands, ConfigArgs, EvaluateArgs, PredictArgs, RunArgs, TrainArgs};
use outbreak::config::{PipelineConfig, Variant};
use outbreak::data::balance::BalanceConfig;
use outbreak::evaluate::ClassificationReport;
use outbreak::model::checkpoint::ArtifactStore;
use outbreak::pipeline;
use outbreak::predict::predictor::Predictor;
use outbreak::predict::writer::{OutputFormat, ResultWriter};
use std::path::Path;
use tracing::{debug, error, info};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", outbreak::info());

    let result = match cli.command {
        Commands::Run(args) => run_run(args),
        Commands::Train(args) => run_train(args),
        Commands::Predict(args) => run_predict(args),
        Commands::Evaluate(args) => run_evaluate(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Configuration file if given, otherwise the preset of `default_variant`
fn resolve_config(args: &ConfigArgs, default_variant: Variant) -> Result<PipelineConfig> {
    match &args.config {
        Some(path) => {
            let config = PipelineConfig::from_file(path)?;
            if let Some(variant) = args.variant {
                if variant != config.variant {
                    anyhow::bail!(
                        "--variant {} conflicts with variant {} in {:?}",
                        variant,
                        config.variant,
                        path
                    );
                }
            }
            Ok(config)
        }
        None => Ok(PipelineConfig::for_variant(args.variant.unwrap_or(default_variant))),
    }
}

/// Variant recorded in the artifact metadata, falling back to outbreak
fn stored_variant(dir: &Path) -> Variant {
    match ArtifactStore::new(dir).load_metadata() {
        Ok(metadata) => Variant::from_str(&metadata.variant, true).unwrap_or_default(),
        Err(e) => {
            debug!("No usable metadata in {:?}: {:#}", dir, e);
            Variant::default()
        }
    }
}

fn write_report(report: &ClassificationReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
    info!("Report saved to: {:?}", path);
    Ok(())
}

fn run_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args.config, Variant::Outbreak)?;
    let output = pipeline::run(&args.input, &args.artifacts, &config)
        .with_context(|| format!("Pipeline run on {:?} failed", args.input))?;
    ResultWriter::stdout().write_json(&output)
}

fn run_train(args: TrainArgs) -> Result<()> {
    info!("Starting training...");
    info!("Input file: {:?}", args.input);
    info!("Output directory: {:?}", args.output);

    let mut config = resolve_config(&args.config, Variant::Outbreak)?;
    if let Some(seed) = args.seed {
        config.split.seed = seed;
        config.booster.seed = seed;
        if let Some(balance) = config.balance.as_mut() {
            balance.seed = seed;
        }
    }
    if args.no_balance {
        config.balance = None;
    }
    if let Some(target_count) = args.target_count {
        let balance = config.balance.get_or_insert_with(BalanceConfig::default);
        balance.target_count = target_count;
        if let Some(seed) = args.seed {
            balance.seed = seed;
        }
    }
    config.validate()?;

    let outcome = pipeline::train_and_save(&args.input, &args.output, &config, !args.quiet)
        .with_context(|| format!("Training on {:?} failed", args.input))?;

    info!("=== Training Results ===");
    info!("Rounds: {}", outcome.metadata.rounds_trained);
    info!("Accuracy: {:.4}", outcome.report.accuracy);
    info!("Fingerprint: {}", outcome.metadata.fingerprint);
    info!("Artifacts saved to: {:?}", args.output);

    if let Some(path) = &args.report {
        write_report(&outcome.report, path)?;
    }
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    info!("Starting prediction...");
    info!("Input file: {:?}", args.input);
    info!("Model: {:?}", args.model);

    let config = resolve_config(&args.config, stored_variant(&args.model))?;
    let mut prediction = config.prediction;
    if let Some(shape) = args.shape {
        prediction.shape = shape;
    }
    if let Some(threshold) = args.threshold {
        outbreak::utils::validation::in_range(threshold, 0.0, 1.0, "threshold")?;
        prediction.threshold = threshold;
    }

    let predictor = Predictor::from_dir(&args.model, config.schema.clone(), prediction)
        .with_context(|| format!("Failed to load artifacts from {:?}", args.model))?;
    let output = predictor.predict_file(&args.input).context("Prediction failed")?;

    match &args.output {
        Some(path) => {
            let format = args.format.unwrap_or_else(|| OutputFormat::from_path(path));
            ResultWriter::create(path)?.write(&output, format)?;
            info!("Predictions saved to: {:?}", path);
        }
        None => ResultWriter::stdout().write(&output, args.format.unwrap_or(OutputFormat::Json))?,
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    info!("Starting evaluation...");
    info!("Input file: {:?}", args.input);
    info!("Model: {:?}", args.model);

    let config = resolve_config(&args.config, stored_variant(&args.model))?;
    let predictor = Predictor::from_dir(&args.model, config.schema.clone(), config.prediction)
        .with_context(|| format!("Failed to load artifacts from {:?}", args.model))?;
    let report = pipeline::evaluate_file(&predictor, &args.input).context("Evaluation failed")?;

    if let Some(path) = &args.output {
        write_report(&report, path)?;
    }
    Ok(())
}
