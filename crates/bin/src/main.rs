//! Outbreak CLI binary.
//!
//! Prepares feature tables, trains and evaluates the outbreak classifier and
//! scores windows with a trained checkpoint.

mod input;

use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use outbreak::data::TimeBoundary;
use outbreak::features::{
    StageCategory, count_by_category, get_stage_info, list_stage_names, stages_by_category,
};
use outbreak::model::{Checkpoint, Evaluation, LstmClassifier};
use outbreak::output::{EpochMetrics, ExportFormat, Exporter};
use outbreak::{Pipeline, PipelineConfig, PredictionService, SourceConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "outbreak")]
#[command(about = "Outbreak: sequence classification of county-level outbreak risk", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Input and configuration shared by the data-driven commands.
#[derive(Args)]
struct RunArgs {
    /// Feature table (CSV)
    #[arg(long)]
    input: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Last time key of the training pool (integer period or YYYY-MM-DD)
    #[arg(long)]
    split_boundary: Option<TimeBoundary>,

    /// Last time key of the validation pool; later rows form the test pool
    #[arg(long)]
    test_boundary: Option<TimeBoundary>,

    /// Recompute labels even if the input has a label column
    #[arg(long)]
    relabel: bool,

    /// Covariate CSV joined on (entity, time); repeatable
    #[arg(long = "source", value_name = "NAME=PATH")]
    sources: Vec<SourceConfig>,
}

#[derive(Subcommand)]
enum Commands {
    /// Label and lag a feature table
    Prepare {
        #[command(flatten)]
        run: RunArgs,

        /// Output CSV
        #[arg(long)]
        output: PathBuf,
    },

    /// Train the classifier and evaluate it on the holdout pool
    Train {
        #[command(flatten)]
        run: RunArgs,

        /// Maximum number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Checkpoint path
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Continue from the checkpoint if it exists
        #[arg(long)]
        resume: bool,

        /// Directory for the report, metrics, history and ROC files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Evaluate a checkpoint on the holdout pool of a feature table
    Evaluate {
        #[command(flatten)]
        run: RunArgs,

        /// Checkpoint path
        #[arg(long)]
        model: PathBuf,

        /// Directory for the metrics and ROC files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Score windows from a JSON file with a checkpoint
    Predict {
        /// Checkpoint path
        #[arg(long)]
        model: PathBuf,

        /// JSON array of windows
        #[arg(long)]
        input: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List the feature pipeline stages, or describe one
    Stages {
        /// Stage name
        name: Option<String>,
    },

    /// Print the default configuration as JSON
    Config,
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("outbreak=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare { run, output } => {
            let pipeline = Pipeline::new(load_config(&run)?)?;
            let summary = pipeline.prepare_file(&run.input, &output)?;
            println!("Prepared {} -> {}", run.input.display(), output.display());
            println!("  {}", summary);
        }
        Commands::Train {
            run,
            epochs,
            checkpoint,
            resume,
            output_dir,
            format,
        } => {
            let mut config = load_config(&run)?;
            if let Some(epochs) = epochs {
                config.max_epochs = epochs;
            }
            if let Some(checkpoint) = checkpoint {
                config.checkpoint_path = checkpoint;
            }
            config.resume |= resume;
            train(config, &run.input, output_dir.as_deref(), format)?;
        }
        Commands::Evaluate {
            run,
            model,
            output_dir,
            format,
        } => {
            let pipeline = Pipeline::new(load_config(&run)?)?;
            let checkpoint = Checkpoint::<LstmClassifier>::load(&model)?;
            let frame = pipeline.load_frame(&run.input)?;
            let evaluation = pipeline.evaluate(&checkpoint, &frame)?;
            if let Some(dir) = output_dir.as_deref() {
                write_evaluation(&evaluation, dir)?;
            }
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&evaluation.report)?);
            } else {
                banner(&format!("EVALUATION: {}", checkpoint.model_version()));
                println!("{}", evaluation.report.to_ascii_table());
            }
        }
        Commands::Predict {
            model,
            input,
            format,
        } => {
            let service = PredictionService::load(&model)?;
            let windows = input::read_windows(&input)?;
            let predictions = input::predict_all(&service, &windows)?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&predictions)?);
            } else {
                println!("{:>6}  {:>11}  {:>10}  {:<8}", "Window", "Probability", "Risk", "Level");
                for (i, p) in predictions.iter().enumerate() {
                    println!(
                        "{:>6}  {:>11.4}  {:>10.1}  {:<8}",
                        i,
                        p.probability,
                        p.risk_score,
                        p.risk_level.to_string()
                    );
                }
            }
        }
        Commands::Stages { name } => match name {
            Some(name) => describe_stage(&name)?,
            None => list_stages(),
        },
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
        }
    }

    Ok(())
}

fn load_config(run: &RunArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &run.config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(boundary) = run.split_boundary {
        config.split_boundary = Some(boundary);
    }
    if let Some(boundary) = run.test_boundary {
        config.test_boundary = Some(boundary);
    }
    config.relabel |= run.relabel;
    config.sources.extend(run.sources.iter().cloned());
    Ok(config)
}

fn train(
    config: PipelineConfig,
    input: &Path,
    output_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(config)?;
    let frame = pipeline.load_frame(input)?;

    let pb = ProgressBar::new(pipeline.config().max_epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("█▓░"),
    );
    pb.set_message("Training...");

    let mut observer = |m: &EpochMetrics| {
        pb.set_position(m.epoch as u64);
        pb.set_message(format!(
            "loss {:.4} | val loss {:.4} | val AUC {:.3}{}",
            m.train_loss,
            m.val_loss,
            m.val_auc,
            if m.improved { " *" } else { "" }
        ));
    };
    let outcome = match pipeline.train(&frame, &mut observer) {
        Ok(outcome) => {
            let reason = outcome
                .training
                .history
                .stop_reason
                .map_or_else(|| "done".to_string(), |r| r.to_string());
            pb.finish_with_message(format!("Finished ({})", reason));
            outcome
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            return Err(e.into());
        }
    };

    let artifacts = match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            outcome.write_artifacts(dir)?
        }
        None => Vec::new(),
    };

    if format == OutputFormat::Json {
        let output = json!({
            "checkpoint": outcome.training.checkpoint_path,
            "model_version": outcome.training.best.model_version(),
            "pools": outcome.summaries,
            "history": outcome.training.history,
            "metrics": outcome.evaluation.report,
            "artifacts": artifacts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    banner(&format!("TRAINING: {}", outcome.training.best.model_version()));
    println!("Pools:");
    println!("  train:      {}", outcome.summaries.train);
    println!("  validation: {}", outcome.summaries.validation);
    if let Some(test) = &outcome.summaries.test {
        println!("  test:       {}", test);
    }
    println!();
    println!("{}", outcome.training.history.to_ascii_table());
    println!("{}", outcome.evaluation.report.to_ascii_table());
    println!("Checkpoint: {}", outcome.training.checkpoint_path.display());
    for path in artifacts {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn write_evaluation(evaluation: &Evaluation, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    evaluation
        .report
        .export_to_file(&dir.join("metrics.csv"), ExportFormat::Csv)?;
    evaluation
        .roc
        .export_to_file(&dir.join("roc.csv"), ExportFormat::Csv)?;
    Ok(())
}

fn banner(title: &str) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}

fn list_stages() {
    println!("Feature pipeline stages (execution order):");
    let counts = count_by_category();
    for category in StageCategory::ALL {
        let count = counts.get(&category).copied().unwrap_or(0);
        println!("\n{} ({})", category.name(), count);
        for stage in stages_by_category(category) {
            println!("  {:<18} {}", stage.name, stage.description);
        }
    }
}

fn describe_stage(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let stage = get_stage_info(name).ok_or_else(|| {
        format!(
            "unknown stage '{}' (known: {})",
            name,
            list_stage_names().join(", ")
        )
    })?;
    println!("{} [{}]", stage.name, stage.category.name());
    println!("  {}", stage.description);
    if !stage.reads.is_empty() {
        println!("  reads:  {}", stage.reads.join(", "));
    }
    if !stage.writes.is_empty() {
        println!("  writes: {}", stage.writes.join(", "));
    }
    Ok(())
}
