//! Price-drop monitor.
//!
//! Polls an oracle at a fixed interval, keeps a bounded history of samples
//! and launches an emergency mission on the mission controller when the
//! price falls by at least the configured percentage between two
//! consecutive samples.

pub mod adapters;
pub mod history;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, EmergencyMissionConfig};
use crate::storage::{self, MonitorState};
use crate::types::{ChainPrice, Mission, MissionParams, MAX_DECIMALS, STROOP_DECIMALS};
use history::{PriceChange, PriceHistory, PriceSample};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Where prices come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn latest_price(&self) -> Result<ChainPrice>;

    /// Decimals of the prices `latest_price` returns. `0` means unknown.
    async fn decimals(&self) -> Result<u32>;

    fn label(&self) -> String;
}

/// Where emergency missions go.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MissionLauncher: Send + Sync {
    /// Submit `create_mission` and return the new mission id.
    async fn launch(&self, params: MissionParams) -> Result<u64>;

    async fn latest_mission(&self) -> Result<Option<Mission>>;

    /// Public key of the signing admin.
    fn admin(&self) -> String;
}

// ---------------------------------------------------------------------------
// Settings and status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub network: String,
    pub asset: String,
    pub interval: Duration,
    pub error_backoff: Duration,
    pub threshold_pct: u32,
    pub history_capacity: usize,
    pub default_decimals: u32,
    pub emergency: EmergencyMissionConfig,
    pub state_file: Option<String>,
}

impl MonitorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            network: cfg.network.name.clone(),
            asset: cfg.monitor.asset.clone(),
            interval: Duration::from_secs(cfg.monitor.interval_secs),
            error_backoff: Duration::from_secs(cfg.monitor.error_backoff_secs),
            threshold_pct: cfg.monitor.drop_threshold_pct,
            history_capacity: cfg.monitor.history_capacity,
            default_decimals: cfg.monitor.price_decimals,
            emergency: cfg.monitor.emergency_mission.clone(),
            state_file: cfg.monitor.state_file.clone(),
        }
    }
}

/// Snapshot of the monitor, shared with the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub network: String,
    pub source: String,
    pub asset: String,
    pub admin: Option<String>,
    pub latest_price: Option<f64>,
    pub latest_sample_at: Option<DateTime<Utc>>,
    pub last_change_pct: Option<f64>,
    pub history_len: usize,
    pub threshold_pct: u32,
    pub interval_secs: u64,
    pub decimals: u32,
    pub missions_created: u32,
    pub last_mission_id: Option<u64>,
    pub last_error: Option<String>,
}

/// Result of one poll.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub sample: PriceSample,
    pub change: Option<PriceChange>,
    pub mission_id: Option<u64>,
    pub launch_error: Option<String>,
}

impl TickOutcome {
    pub fn triggered(&self) -> bool {
        self.mission_id.is_some() || self.launch_error.is_some()
    }
}

/// Stops a running monitor loop.
#[derive(Debug, Clone)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.0.send(true);
    }
}

/// A stop handle and the receiver `PriceMonitor::run` waits on.
pub fn stop_channel() -> (StopHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), rx)
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct PriceMonitor {
    source: Box<dyn PriceSource>,
    launcher: Box<dyn MissionLauncher>,
    settings: MonitorSettings,
    history: PriceHistory,
    decimals: u32,
    missions_created: u32,
    last_mission_id: Option<u64>,
    status: Arc<RwLock<MonitorStatus>>,
}

impl PriceMonitor {
    pub fn new(
        source: Box<dyn PriceSource>,
        launcher: Box<dyn MissionLauncher>,
        settings: MonitorSettings,
    ) -> Self {
        let status = MonitorStatus {
            network: settings.network.clone(),
            source: source.label(),
            asset: settings.asset.clone(),
            threshold_pct: settings.threshold_pct,
            interval_secs: settings.interval.as_secs(),
            decimals: settings.default_decimals,
            ..MonitorStatus::default()
        };
        Self {
            history: PriceHistory::new(settings.history_capacity),
            decimals: settings.default_decimals,
            source,
            launcher,
            settings,
            missions_created: 0,
            last_mission_id: None,
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// Handle for readers of the live status (the dashboard).
    pub fn status_handle(&self) -> Arc<RwLock<MonitorStatus>> {
        self.status.clone()
    }

    pub fn history(&self) -> &PriceHistory {
        &self.history
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Restore history, learn the price scale and take the first sample.
    pub async fn initialize(&mut self) -> Result<PriceSample> {
        let admin = self.launcher.admin();
        info!(admin = %admin, network = %self.settings.network, "Admin account loaded");
        self.status.write().await.admin = Some(admin);

        self.restore();
        {
            let mut status = self.status.write().await;
            status.missions_created = self.missions_created;
            status.last_mission_id = self.last_mission_id;
            status.history_len = self.history.len();
        }

        match self.source.decimals().await {
            Ok(0) => debug!(default = self.settings.default_decimals, "Oracle reported no decimals"),
            Ok(d) if d > MAX_DECIMALS => warn!(
                reported = d,
                default = self.settings.default_decimals,
                "Oracle decimals out of range, using default"
            ),
            Ok(d) => self.decimals = d,
            Err(e) => warn!(error = %e, "Failed to read oracle decimals, using default"),
        }
        self.status.write().await.decimals = self.decimals;

        let sample = self.update_price_history().await?;
        info!(
            source = %self.source.label(),
            asset = %self.settings.asset,
            price = sample.as_f64(),
            decimals = self.decimals,
            "Price monitor initialised"
        );
        Ok(sample)
    }

    fn restore(&mut self) {
        let Some(path) = self.settings.state_file.as_deref() else {
            return;
        };
        match storage::load_state(Some(path)) {
            Ok(Some(state)) if state.asset == self.settings.asset => {
                self.history = PriceHistory::from_samples(self.settings.history_capacity, state.samples);
                self.missions_created = state.missions_created;
                self.last_mission_id = state.last_mission_id;
                info!(samples = self.history.len(), "Restored price history");
            }
            Ok(Some(state)) => {
                warn!(saved = %state.asset, asset = %self.settings.asset, "Saved history is for another asset, ignoring");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to restore price history"),
        }
    }

    fn persist(&self) {
        let Some(path) = self.settings.state_file.as_deref() else {
            return;
        };
        let state = MonitorState {
            asset: self.settings.asset.clone(),
            decimals: self.decimals,
            samples: self.history.to_vec(),
            missions_created: self.missions_created,
            last_mission_id: self.last_mission_id,
            saved_at: Utc::now(),
        };
        if let Err(e) = storage::save_state(&state, Some(path)) {
            warn!(error = %e, "Failed to save monitor state");
        }
    }

    /// Fetch one sample and append it to the history.
    pub async fn update_price_history(&mut self) -> Result<PriceSample> {
        let price = self.source.latest_price().await?;
        if price.is_missing() {
            bail!("{} returned no price for {}", self.source.label(), self.settings.asset);
        }
        let sample = PriceSample {
            price: price.price,
            decimals: self.decimals,
            timestamp: price.timestamp,
            observed_at: Utc::now(),
        };
        self.history.push(sample.clone());

        let mut status = self.status.write().await;
        status.latest_price = Some(sample.as_f64());
        status.latest_sample_at = Some(sample.observed_at);
        status.history_len = self.history.len();
        debug!(price = sample.as_f64(), history = self.history.len(), "Price sample recorded");
        Ok(sample)
    }

    /// Compare `current` with the sample taken before it.
    pub fn check_price_drop(&self, current: &PriceSample) -> Option<PriceChange> {
        let change = self.history.latest_change()?;
        if &change.current != current {
            return None;
        }
        Some(change)
    }

    /// Launch an emergency mission with `trigger` as its trigger price.
    pub async fn create_emergency_mission(&mut self, trigger: &PriceSample) -> Result<u64> {
        let trigger_price = trigger.scaled_to(STROOP_DECIMALS);
        let params = self.settings.emergency.params(trigger_price);
        info!(
            trigger_price,
            target_liquidity = %params.target_liquidity,
            reward_pool = %params.reward_pool,
            duration_hours = params.duration_hours,
            "Creating emergency mission"
        );

        let id = self.launcher.launch(params).await?;
        self.missions_created += 1;
        self.last_mission_id = Some(id);

        let mut status = self.status.write().await;
        status.missions_created = self.missions_created;
        status.last_mission_id = Some(id);
        info!(mission_id = id, "Emergency mission created");
        Ok(id)
    }

    /// One poll: sample, compare, launch if the drop crosses the threshold.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let sample = self.update_price_history().await?;
        let change = self.check_price_drop(&sample);

        let mut outcome = TickOutcome {
            sample: sample.clone(),
            change: change.clone(),
            mission_id: None,
            launch_error: None,
        };

        if let Some(change) = &change {
            self.status.write().await.last_change_pct = change.drop_pct.to_f64().map(|d| -d);
            if change.exceeds(self.settings.threshold_pct) {
                warn!(
                    drop_pct = %change.drop_pct.round_dp(2),
                    previous = change.previous.as_f64(),
                    current = change.current.as_f64(),
                    "Price drop detected"
                );
                match self.create_emergency_mission(&sample).await {
                    Ok(id) => outcome.mission_id = Some(id),
                    Err(e) => {
                        error!(error = %e, "Failed to create emergency mission");
                        outcome.launch_error = Some(e.to_string());
                    }
                }
            }
        }

        self.persist();
        Ok(outcome)
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.status.write().await.running = true;
        info!(
            interval_secs = self.settings.interval.as_secs(),
            threshold_pct = self.settings.threshold_pct,
            "Price monitor running"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = match self.tick().await {
                Ok(_) => {
                    self.status.write().await.last_error = None;
                    self.settings.interval
                }
                Err(e) => {
                    error!(error = %e, "Monitor tick failed");
                    self.status.write().await.last_error = Some(e.to_string());
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.persist();
        self.status.write().await.running = false;
        info!("Price monitor stopped");
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }

    /// The most recent mission on the controller.
    pub async fn current_mission(&self) -> Result<Option<Mission>> {
        self.launcher.latest_mission().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
