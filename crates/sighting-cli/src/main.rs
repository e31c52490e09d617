//! # sighting-normalize
//!
//! Reads newline-delimited JSON sightings from stdin, normalizes and filters
//! them, and writes the newest observation per device to stdout as wire JSON.
//!
//! ## Running
//!
//! ```bash
//! # Raw scan reports, default settings
//! sighting-normalize < scans.jsonl
//!
//! # Re-validate captured wire traffic
//! SIGHTING_INPUT=wire SIGHTING_CONFIG=./sighting.toml sighting-normalize < traffic.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `SIGHTING_CONFIG`: Optional. Settings file; must exist when given
//! - `SIGHTING_INPUT`: Optional. "scan" or "wire" (default: scan)
//! - `SIGHTING_PRODUCTION`: Optional. "1" or "true" for file + JSON logging
//! - `SIGHTING_LOG_LEVEL` / `RUST_LOG`: Optional. Logging level (default: info)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use anyhow::{Context, Result};
use sighting_cli::logging;
use sighting_cli::pipeline::{run, InputMode, Pipeline};
use sighting_core::{default_config_path, Settings};
use tokio::io::BufReader;
use tracing::info;

/// Environment variable names
mod env_vars {
    pub const CONFIG: &str = "SIGHTING_CONFIG";
    pub const INPUT: &str = "SIGHTING_INPUT";
    pub const PRODUCTION: &str = "SIGHTING_PRODUCTION";
}

/// Fallback settings file when no platform config directory exists.
const LOCAL_CONFIG: &str = "sighting.toml";

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(is_production())?;

    let settings = load_settings()?;
    let mode = match std::env::var(env_vars::INPUT) {
        Ok(value) => value.parse::<InputMode>()?,
        Err(_) => InputMode::default(),
    };

    info!(?mode, timestamp_format = ?settings.wire.timestamp_format, "Starting sighting-normalize");

    let pipeline = Pipeline::new(&settings, mode);
    let summary = run(
        &pipeline,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!(
        lines = summary.lines,
        recorded = summary.recorded,
        stale = summary.stale,
        filtered = summary.filtered,
        rejected = summary.rejected,
        emitted = summary.emitted,
        "Finished"
    );

    Ok(())
}

fn is_production() -> bool {
    std::env::var(env_vars::PRODUCTION)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn load_settings() -> Result<Settings> {
    if let Ok(path) = std::env::var(env_vars::CONFIG) {
        return Settings::load_required(&path)
            .with_context(|| format!("loading settings from {path}"));
    }

    let path = default_config_path().unwrap_or_else(|| LOCAL_CONFIG.into());
    Settings::load(&path).with_context(|| format!("loading settings from {}", path.display()))
}
