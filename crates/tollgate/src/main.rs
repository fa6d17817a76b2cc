//! Tollgate - OAuth client-credentials access to OpenAI-compatible gateways
//!
//! Main entry point for the Tollgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{providers, request, serve, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tollgate - OAuth client-credentials access to OpenAI-compatible gateways
#[derive(Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovery
    #[arg(long, global = true, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured OAuth providers
    Providers(providers::ProvidersArgs),

    /// Acquire a token for a provider
    Token(token::TokenArgs),

    /// Send one request through the OAuth interceptor
    Request(request::RequestArgs),

    /// Run the local OAuth proxy
    Serve(serve::ServeArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "tollgate=debug,tollgate_oauth=debug,tollgate_config=debug,info"
    } else {
        "tollgate=info,tollgate_oauth=info,warn"
    };

    let log_dir = tollgate_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tollgate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "tollgate=trace,tollgate_oauth=trace,tollgate_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Providers(args) => providers::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx).await,
        Commands::Request(args) => request::run(args, &ctx).await,
        Commands::Serve(args) => serve::run(args, &ctx).await,
    }
}
