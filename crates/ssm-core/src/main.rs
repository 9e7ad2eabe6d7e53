//! State-space inference toolkit CLI.
//!
//! Every command reads JSON files and writes one JSON document to stdout.
//! Logs go to stderr.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use ssm_config::{load_fit_config, validate_fit_config, CONFIG_SCHEMA_VERSION};
use ssm_core::error::InferenceError;
use ssm_core::exit_codes::ExitCode;
use ssm_core::lgssm::{info_filter, kalman_filter};
use ssm_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use ssm_core::schema::{
    matrix_from_rows, matrix_to_rows, FilterInput, FilterReport, FitReport, HmmSpec, LgssmSpec,
    SampleOutput, SequenceBatch, SmoothReport, SCHEMA_VERSION,
};
use tracing::{debug, info};

/// Fit and query HMMs, filter linear-Gaussian state-space models
#[derive(Parser)]
#[command(name = "ssm-core")]
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
    /// Fit configuration file (otherwise SSM_CONFIG, SSM_CONFIG_DIR, XDG, defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all logging
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit an HMM to a batch of sequences with EM
    Fit(FitArgs),

    /// Smoothed posteriors, Viterbi paths and expected transitions
    Smooth(SmoothArgs),

    /// Draw synthetic sequences from an HMM
    Sample(SampleArgs),

    /// Run the information-form Kalman filter
    Filter(FilterArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct FitArgs {
    /// Initial model (JSON HmmSpec)
    #[arg(long)]
    model: PathBuf,

    /// Emission sequences (JSON with a `sequences` array)
    #[arg(long)]
    data: PathBuf,

    /// Override the configured number of EM iterations
    #[arg(long)]
    max_iters: Option<usize>,

    /// Run the E-step sequentially
    #[arg(long)]
    sequential: bool,
}

#[derive(Args, Debug)]
struct SmoothArgs {
    #[arg(long)]
    model: PathBuf,

    #[arg(long)]
    data: PathBuf,
}

#[derive(Args, Debug)]
struct SampleArgs {
    #[arg(long)]
    model: PathBuf,

    /// Length of each sequence
    #[arg(long, default_value_t = 100)]
    num_timesteps: usize,

    #[arg(long, default_value_t = 1)]
    num_sequences: usize,

    /// RNG seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Filter input (JSON with `params`, `emissions` and optional `inputs`)
    #[arg(long)]
    input: PathBuf,
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
        /// File to validate (defaults to the resolved config)
        path: Option<PathBuf>,
    },
}

/// Why a command failed.
#[derive(Debug)]
enum Failure {
    Args(String),
    Inference(InferenceError),
}

impl From<InferenceError> for Failure {
    fn from(err: InferenceError) -> Self {
        Failure::Inference(err)
    }
}

impl From<ssm_config::ValidationError> for Failure {
    fn from(err: ssm_config::ValidationError) -> Self {
        Failure::Inference(err.into())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::Inference(err.into())
    }
}

type CommandResult = Result<(), Failure>;

fn main() {
    let cli = Cli::parse();

    let level = if cli.global.quiet {
        Some(LogLevel::Off)
    } else {
        LogLevel::from_verbosity(cli.global.verbose)
    };
    init_logging(&LogConfig::from_env(level, cli.global.log_format));

    let result = match &cli.command {
        Commands::Fit(args) => run_fit(&cli.global, args),
        Commands::Smooth(args) => run_smooth(args),
        Commands::Sample(args) => run_sample(args),
        Commands::Filter(args) => run_filter(args),
        Commands::Config(args) => match &args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Validate { path } => {
                run_config_validate(path.as_deref().or(cli.global.config.as_deref()))
            }
        },
        Commands::Version => emit(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "config_schema_version": CONFIG_SCHEMA_VERSION,
            "ssm_core_version": env!("CARGO_PKG_VERSION"),
            "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        })),
    };

    let exit_code = match result {
        Ok(()) => ExitCode::Clean,
        Err(failure) => output_error(&failure),
    };
    std::process::exit(exit_code.as_i32());
}

/// Pretty-print a payload on stdout.
fn emit<T: Serialize>(value: &T) -> CommandResult {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Report a failure as JSON on stderr and pick the exit code.
fn output_error(failure: &Failure) -> ExitCode {
    let (exit_code, message) = match failure {
        Failure::Args(message) => (ExitCode::ArgsError, message.clone()),
        Failure::Inference(err) => (ExitCode::from(err), err.to_string()),
    };
    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "status": "error",
        "error": {
            "code": exit_code.code_name(),
            "exit_code": exit_code.as_i32(),
            "message": message,
        }
    });
    eprintln!("{}", response);
    exit_code
}

fn load_model(path: &Path) -> Result<ssm_core::schema::AnyHmm, Failure> {
    let model = HmmSpec::from_file(path)?.into_model()?;
    debug!(
        family = %model.family(),
        num_states = model.num_states(),
        emission_dim = model.emission_dim(),
        "loaded model"
    );
    Ok(model)
}

fn load_batch(path: &Path) -> Result<Vec<DMatrix<f64>>, Failure> {
    let batch = SequenceBatch::from_file(path)?.to_matrices()?;
    debug!(sequences = batch.len(), "loaded emissions");
    Ok(batch)
}

fn run_fit(global: &GlobalOpts, args: &FitArgs) -> CommandResult {
    let resolved = load_fit_config(global.config.as_deref())?;
    let mut config = resolved.config.clone();
    if let Some(n) = args.max_iters {
        config.em = config.em.with_num_iterations(n);
    }
    if args.sequential {
        config.em = config.em.with_parallel(false);
    }
    validate_fit_config(&config)?;

    let model = load_model(&args.model)?;
    let batch = load_batch(&args.data)?;
    let run_id = generate_run_id();
    info!(run_id = %run_id, family = %model.family(), "starting fit");

    let outcome = model.fit(&batch, &config)?;
    emit(&FitReport::new(outcome, run_id, resolved.snapshot()))
}

fn run_smooth(args: &SmoothArgs) -> CommandResult {
    let model = load_model(&args.model)?;
    let batch = load_batch(&args.data)?;
    emit(&SmoothReport::build(&model, &batch)?)
}

fn run_sample(args: &SampleArgs) -> CommandResult {
    if args.num_timesteps == 0 {
        return Err(Failure::Args("--num-timesteps must be at least 1".to_string()));
    }
    let model = load_model(&args.model)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut states = Vec::with_capacity(args.num_sequences);
    let mut sequences = Vec::with_capacity(args.num_sequences);
    for _ in 0..args.num_sequences {
        let (path, emissions) = model.sample(&mut rng, args.num_timesteps);
        states.push(path);
        sequences.push(matrix_to_rows(&emissions));
    }

    emit(&SampleOutput {
        schema_version: SCHEMA_VERSION.to_string(),
        family: model.family(),
        seed,
        states,
        sequences,
    })
}

fn run_filter(args: &FilterArgs) -> CommandResult {
    let input = FilterInput::from_file(&args.input)?;
    let emissions = matrix_from_rows("emissions", &input.emissions)?;
    let inputs = input
        .inputs
        .as_ref()
        .map(|rows| matrix_from_rows("inputs", rows))
        .transpose()?;
    let input_dim = inputs.as_ref().map(|u| u.ncols()).unwrap_or(0);

    let params = input.params.to_info_params(input_dim)?;
    let posterior = info_filter(&params, &emissions, inputs.as_ref())?;

    let marginal_loglik = match &input.params {
        LgssmSpec::Moment { .. } => {
            let moment = input.params.to_moment_params(input_dim)?;
            Some(kalman_filter(&moment, &emissions, inputs.as_ref())?.marginal_loglik)
        }
        LgssmSpec::Info { .. } => None,
    };

    emit(&FilterReport {
        schema_version: SCHEMA_VERSION.to_string(),
        form: input.params.form().to_string(),
        marginal_loglik,
        filtered_means: posterior
            .filtered_means()?
            .iter()
            .map(|m| m.iter().copied().collect())
            .collect(),
        filtered_covariances: posterior
            .filtered_covariances()?
            .iter()
            .map(matrix_to_rows)
            .collect(),
    })
}

fn run_config_show(global: &GlobalOpts) -> CommandResult {
    let resolved = load_fit_config(global.config.as_deref())?;
    emit(&serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "snapshot": resolved.snapshot(),
        "config": resolved.config,
    }))
}

fn run_config_validate(path: Option<&Path>) -> CommandResult {
    let resolved = load_fit_config(path)?;
    emit(&serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "status": "valid",
        "snapshot": resolved.snapshot(),
    }))
}
