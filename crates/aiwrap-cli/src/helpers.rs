//! Shared helper functions used across CLI subcommands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use aiwrap_ai::{AiService, OpenAiProvider};

use crate::settings::AppConfig;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Build a service with the configured provider registered.
pub fn build_service(config: &AppConfig) -> Result<AiService> {
    config.require_api_key()?;

    let provider = OpenAiProvider::new(config.provider.clone())
        .context("failed to configure the openai provider")?;

    let service = AiService::new();
    service.register(config.chat.provider_name.clone(), Arc::new(provider));
    Ok(service)
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Read an environment variable, treating an empty value as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
