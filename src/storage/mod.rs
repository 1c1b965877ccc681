//! Persistence layer.
//!
//! Saves and loads the monitor's price history to/from a JSON file so a
//! restarted monitor compares against the last sample taken before the
//! restart.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::monitor::history::PriceSample;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "kale_monitor_state.json";

/// What the monitor persists between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub asset: String,
    pub decimals: u32,
    pub samples: Vec<PriceSample>,
    #[serde(default)]
    pub missions_created: u32,
    #[serde(default)]
    pub last_mission_id: Option<u64>,
    pub saved_at: DateTime<Utc>,
}

/// Save monitor state to a JSON file.
pub fn save_state(state: &MonitorState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise monitor state")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write state to {path}"))?;

    debug!(path, samples = state.samples.len(), "State saved");
    Ok(())
}

/// Load monitor state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<MonitorState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: MonitorState = serde_json::from_str(&json)
        .context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        asset = %state.asset,
        samples = state.samples.len(),
        missions_created = state.missions_created,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
