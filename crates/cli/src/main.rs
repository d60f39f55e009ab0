// Baysync CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Run every command against an in-memory store so scenarios are
// reproducible without a deployment.

mod commands;
mod output;

use baysync_core::telemetry::{init_tracing, TelemetryConfig};
use baysync_core::EngineConfig;
use clap::{Parser, Subcommand};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "baysync")]
#[command(about = "Baysync CLI - Simulate slot calls, delays and alert clearing")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    /// Log filter (e.g. "debug", "baysync_core=debug"); defaults to RUST_LOG, then "warn"
    #[arg(long)]
    pub log: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a call / delay / re-call / finalize scenario across two contexts
    Simulate {
        /// Slot to run the scenario on
        #[arg(long, default_value = "D-04")]
        slot: String,

        /// Driver tag to call
        #[arg(long, default_value = "TRK-7")]
        driver: String,

        /// Let the driver decline entry instead of confirming
        #[arg(long)]
        decline: bool,
    },

    /// Render an elapsed time the way slot timers do
    Elapsed {
        /// Seconds since the milestone (negative means it lies in the future)
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let telemetry = TelemetryConfig::from_env();
    let filter = cli
        .log
        .clone()
        .or_else(|| telemetry.log_filter.clone())
        .unwrap_or_else(|| "warn".to_string());
    init_tracing(telemetry.with_log_filter(filter));

    let config = EngineConfig::from_env();
    tracing::debug!(?config, "Engine configuration loaded");

    match cli.command {
        Commands::Simulate {
            slot,
            driver,
            decline,
        } => commands::simulate::run(config, cli.output, cli.quiet, &slot, &driver, decline),
        Commands::Elapsed { seconds } => commands::elapsed::run(config, cli.output, seconds),
    }
}
