//! CLI entry point for aiwrap.
//!
//! This binary provides the `aiwrap` command with subcommands for the
//! interactive chat, the API demo, model listing and a health check.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

mod demo;
mod helpers;
mod settings;

use helpers::{build_service, init_tracing};
use settings::AppConfig;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// aiwrap -- chat with OpenAI-compatible models from the terminal.
#[derive(Parser)]
#[command(
    name = "aiwrap",
    version,
    about = "Chat with OpenAI-compatible models from the terminal"
)]
struct Cli {
    /// Path to a TOML config file (default: config/aiwrap.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    Chat {
        /// Model to use instead of the configured one.
        #[arg(long)]
        model: Option<String>,
    },

    /// Run the API walkthrough against the configured provider.
    Demo,

    /// List the models the provider offers.
    Models,

    /// Check that the provider answers a minimal request.
    Health,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Log lines would tear through the chat screen, so keep it quiet there.
    let default_level = match cli.command {
        Commands::Chat { .. } => "warn",
        _ => "info",
    };
    init_tracing(cli.log_level.as_deref().unwrap_or(default_level));

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Chat { model } => cmd_chat(&config, model).await,
        Commands::Demo => cmd_demo(&config).await,
        Commands::Models => cmd_models(&config).await,
        Commands::Health => cmd_health(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_chat(config: &AppConfig, model: Option<String>) -> Result<()> {
    let service = build_service(config)?;
    aiwrap_tui::run_tui(service, config.chat_settings(model))
        .await
        .context("chat session failed")
}

async fn cmd_demo(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    info!(provider = %config.chat.provider_name, "running demo");
    demo::run(&service, &config.chat.provider_name).await;
    Ok(())
}

async fn cmd_models(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    let models = service
        .provider_models(&config.chat.provider_name)
        .await
        .context("failed to list models")?;

    for model in models {
        println!("{model}");
    }
    Ok(())
}

async fn cmd_health(config: &AppConfig) -> Result<()> {
    let service = build_service(config)?;
    service
        .health_check(&config.chat.provider_name)
        .await
        .with_context(|| format!("{} provider is unhealthy", config.chat.provider_name))?;

    println!("{} provider is healthy", config.chat.provider_name);
    Ok(())
}
