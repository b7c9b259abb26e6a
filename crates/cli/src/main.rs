//! autochain CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments**: global options plus one subcommand.
//! 2. **Wire observability**: `tracing-subscriber` with a text or JSON layer
//!    and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Load configuration**: the pipeline file and the credential document,
//!    with the environment overlay (process variables, then `.env` files)
//!    applied.
//! 4. **Construct infrastructure**: the OpenAI and Telegram connectors, handed
//!    to the built-in node registry.
//! 5. **Run**: build the pipeline and execute it under the run deadline.
//!
//! Any failure is logged and turned into exit code 1.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod telemetry;

use telemetry::LogFormat;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Run linear content pipelines: generate text with a language model and publish it.
#[derive(Debug, Parser)]
#[command(name = "autochain")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding `credentials.json` and `pipelines/`
    #[arg(long, global = true, env = "AUTOCHAIN_CONFIG_DIR", default_value = config::DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Credential document (default: <config-dir>/credentials.json)
    #[arg(long, global = true, env = "AUTOCHAIN_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Console log format
    #[arg(long, global = true, env = "AUTOCHAIN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Export spans to this OTLP gRPC endpoint
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build and execute a pipeline
    Run(commands::RunArgs),

    /// Build a pipeline without executing it
    Check(commands::CheckArgs),

    /// List chats a Telegram bot has seen, to find a channel id
    Channels(commands::ChannelsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match telemetry::init(cli.log_format, cli.otlp_endpoint.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("autochain: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = commands::Context {
        credentials_path: cli
            .credentials
            .clone()
            .unwrap_or_else(|| config::default_credentials_path(&cli.config_dir)),
        config_dir: cli.config_dir,
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run(args, &ctx).await,
        Commands::Check(args) => commands::check(args, &ctx),
        Commands::Channels(args) => commands::channels(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "autochain failed");
            ExitCode::FAILURE
        }
    }
}
