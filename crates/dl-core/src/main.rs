//! DetectLab Core - Classifier Evaluation and Calibration
//!
//! The main entry point for dl-core, handling:
//! - Full evaluation runs over labels × models × splits
//! - One-off threshold calibration for a single score/label set
//! - Configuration inspection and validation
//! - JSON Schema export for input and output documents

use clap::{Args, Parser, Subcommand};
use dl_common::{Error, ErrorCategory, OutputFormat, RunId, StructuredError, SCHEMA_VERSION};
use dl_core::config::{load_config, ConfigSnapshot, ConfigSource};
use dl_core::eval::{
    calibrate, compute_rank_metrics, CalibrationOptions, EvaluationInput, EvaluationRun,
    RankSummary, ScoreSet, ScoredRecord,
};
use dl_core::exit_codes::ExitCode;
use dl_core::log_event;
use dl_core::logging::{
    event_names, init_logging, LogConfig, LogContext, LogLevel, Stage,
};
use dl_core::schema::{available_schemas, generate_all_schemas, generate_schema};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// DetectLab Core - evaluate fraud classifiers under a fixed FPR budget
#[derive(Parser)]
#[command(name = "dl-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to config.json (otherwise DL_CONFIG, DL_CONFIG_DIR, XDG, defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every (label, model) in a scores document
    Evaluate(EvaluateArgs),

    /// Calibrate a threshold for a single score/label set
    Calibrate(CalibrateArgs),

    /// Inspect or validate the run configuration
    Config(ConfigArgs),

    /// Print JSON Schema for input/output types
    Schema(SchemaArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Scores document (labels → models → splits)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Worker threads (overrides config)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// JSON array of {score, label} records
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// False-positive-rate budget
    #[arg(long)]
    target_fpr: f64,

    /// Rows in the audit table
    #[arg(long, default_value_t = 3)]
    table_size: usize,

    /// Slack added to target_fpr
    #[arg(long, default_value_t = 1e-12)]
    tolerance: f64,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Validate a configuration file
    Validate {
        /// Config file (defaults to the resolved one)
        path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Type name (see --list)
    type_name: Option<String>,

    /// List available types
    #[arg(long)]
    list: bool,

    /// Print every schema
    #[arg(long)]
    all: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = e.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        None,
    );
    init_logging(&log_config);

    let outcome = match &cli.command {
        Commands::Evaluate(args) => run_evaluate(&cli.global, args),
        Commands::Calibrate(args) => run_calibrate(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Schema(args) => run_schema(args),
        Commands::Version => print_version(&cli.global),
    };

    let exit_code = match outcome {
        Ok(code) => code,
        Err(err) => output_error(&cli.global, &err),
    };
    std::process::exit(exit_code.as_i32());
}

fn run_evaluate(global: &GlobalOpts, args: &EvaluateArgs) -> Result<ExitCode, Error> {
    let resolved = load_config(global.config.as_deref())?;
    let mut config = resolved.config;
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    let snapshot = ConfigSnapshot::new(&config, resolved.path.as_deref(), &resolved.source);

    let run = EvaluationRun::new(config)?.with_snapshot(snapshot);
    let ctx = LogContext::for_run(run.run_id());
    if resolved.source == ConfigSource::BuiltinDefault {
        log_event!(
            ctx,
            INFO,
            event_names::CONFIG_DEFAULT_USED,
            Stage::Init,
            "No config file found; using built-in defaults"
        );
    } else {
        log_event!(
            ctx,
            INFO,
            event_names::CONFIG_LOADED,
            Stage::Init,
            "Configuration loaded",
            source = resolved.source.to_string().as_str()
        );
    }

    let input = EvaluationInput::from_path(&args.input)?;
    log_event!(
        ctx,
        INFO,
        event_names::INPUT_LOADED,
        Stage::Load,
        "Scores document loaded",
        n_labels = input.labels.len(),
        n_models = input.n_models()
    );

    let result = run.execute(&input)?;

    match global.format {
        OutputFormat::Summary => println!("{}", result.summary.one_line(&result.run_id)),
        _ => emit(global.format, &result)?,
    }

    Ok(if result.is_partial() {
        ExitCode::PartialFail
    } else {
        ExitCode::Clean
    })
}

#[derive(Serialize)]
struct CalibrateOutput {
    schema_version: &'static str,
    rows: usize,
    positives: usize,
    negatives: usize,
    rank: RankSummary,
    calibration: dl_core::eval::Calibration,
}

fn run_calibrate(global: &GlobalOpts, args: &CalibrateArgs) -> Result<ExitCode, Error> {
    let records = read_records(&args.input)?;
    let set = ScoreSet::new(records)?;
    let options = CalibrationOptions::new(args.target_fpr)
        .with_tolerance(args.tolerance)
        .with_table_size(args.table_size);
    let calibration = calibrate(&set, &options)?;

    let output = CalibrateOutput {
        schema_version: SCHEMA_VERSION,
        rows: set.len(),
        positives: set.positives(),
        negatives: set.negatives(),
        rank: RankSummary::from(compute_rank_metrics(&set)),
        calibration,
    };

    match global.format {
        OutputFormat::Summary => println!(
            "threshold {} (fpr {:.4}, recall {:.4}, precision {:.4}{})",
            output.calibration.threshold,
            output.calibration.fpr,
            output.calibration.recall,
            output.calibration.precision,
            if output.calibration.best_effort {
                ", best effort"
            } else {
                ""
            }
        ),
        _ => emit(global.format, &output)?,
    }
    Ok(ExitCode::Clean)
}

fn read_records(path: &Path) -> Result<Vec<ScoredRecord>, Error> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::Input(format!("malformed records: {}", e)))
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> Result<ExitCode, Error> {
    match &args.command {
        ConfigCommands::Show => {
            let resolved = load_config(global.config.as_deref())?;
            let snapshot = resolved.snapshot();
            match global.format {
                OutputFormat::Summary => println!(
                    "config from {} ({} labels, calibration split '{}')",
                    snapshot.source,
                    resolved.config.labels.len(),
                    resolved.config.calibration_split
                ),
                _ => emit(
                    global.format,
                    &serde_json::json!({
                        "schema_version": SCHEMA_VERSION,
                        "source": snapshot,
                        "config": resolved.config,
                    }),
                )?,
            }
            Ok(ExitCode::Clean)
        }
        ConfigCommands::Validate { path } => {
            let target = path.as_deref().or(global.config.as_deref());
            let resolved = load_config(target)?;
            match global.format {
                OutputFormat::Summary => println!("config valid ({})", resolved.source),
                _ => emit(
                    global.format,
                    &serde_json::json!({
                        "schema_version": SCHEMA_VERSION,
                        "valid": true,
                        "path": resolved.path.as_ref().map(|p| p.display().to_string()),
                        "content_hash": resolved.snapshot().content_hash,
                    }),
                )?,
            }
            Ok(ExitCode::Clean)
        }
    }
}

fn run_schema(args: &SchemaArgs) -> Result<ExitCode, Error> {
    if args.list {
        for (name, desc) in available_schemas() {
            println!("{:<20} {}", name, desc);
        }
        return Ok(ExitCode::Clean);
    }
    if args.all {
        println!("{}", serde_json::to_string_pretty(&generate_all_schemas())?);
        return Ok(ExitCode::Clean);
    }
    match args.type_name.as_deref().and_then(generate_schema) {
        Some(schema) => {
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::Clean)
        }
        None => {
            eprintln!(
                "unknown schema type '{}'; see 'dl-core schema --list'",
                args.type_name.as_deref().unwrap_or("")
            );
            Ok(ExitCode::ArgsError)
        }
    }
}

fn print_version(global: &GlobalOpts) -> Result<ExitCode, Error> {
    match global.format {
        OutputFormat::Summary => {
            println!("dl-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
        _ => emit(
            global.format,
            &serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "dl_core_version": env!("CARGO_PKG_VERSION"),
                "rust_version": env!("CARGO_PKG_RUST_VERSION"),
            }),
        )?,
    }
    Ok(ExitCode::Clean)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T) -> Result<(), Error> {
    let text = match format {
        OutputFormat::Jsonl => serde_json::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    };
    println!("{}", text);
    Ok(())
}

fn output_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    let code = ExitCode::for_error(err);
    let ctx = LogContext::for_run(&RunId::new());
    let reason = err.to_string();
    if err.category() == ErrorCategory::Config {
        log_event!(
            ctx,
            ERROR,
            event_names::CONFIG_ERROR,
            Stage::Init,
            "Configuration rejected",
            code = err.code(),
            error = reason.as_str()
        );
    } else {
        log_event!(
            ctx,
            ERROR,
            event_names::INTERNAL_ERROR,
            Stage::Output,
            "Command failed",
            code = err.code(),
            error = reason.as_str()
        );
    }

    match global.format {
        OutputFormat::Summary => eprintln!("{}", err.human()),
        _ => println!("{}", StructuredError::from(err).to_json()),
    }
    code
}
