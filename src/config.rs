//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (signing keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. A handful of deployment values
//! (network, contract ids) can be overridden from the environment so the
//! same file serves testnet and mainnet runs.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::types::MissionParams;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub admin: AdminConfig,
    pub monitor: MonitorConfig,
    pub price_feed: PriceFeedConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// "testnet" | "mainnet"
    pub name: String,
    pub rpc_url: String,
    pub horizon_url: String,
    pub passphrase: String,
}

impl NetworkConfig {
    pub const TESTNET_PASSPHRASE: &'static str = "Test SDF Network ; September 2015";
    pub const MAINNET_PASSPHRASE: &'static str =
        "Public Global Stellar Network ; September 2015";

    /// Well-known endpoints for a named network.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "testnet" => Some(Self {
                name: "testnet".into(),
                rpc_url: "https://soroban-testnet.stellar.org".into(),
                horizon_url: "https://horizon-testnet.stellar.org".into(),
                passphrase: Self::TESTNET_PASSPHRASE.into(),
            }),
            "mainnet" => Some(Self {
                name: "mainnet".into(),
                rpc_url: "https://soroban-rpc.mainnet.stellar.org".into(),
                horizon_url: "https://horizon.stellar.org".into(),
                passphrase: Self::MAINNET_PASSPHRASE.into(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractsConfig {
    pub mission_controller: String,
    pub mock_oracle: String,
    pub reflector_reader: String,
    /// Upstream Reflector feed the reader was initialised with.
    #[serde(default)]
    pub reflector_oracle: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub secret_key_env: String,
    /// Second identity used by the deployment smoke test.
    #[serde(default)]
    pub user_secret_key_env: Option<String>,
}

/// Which contract the monitor polls for prices.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    Reflector,
    MockOracle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub source: PriceSourceKind,
    pub asset: String,
    pub interval_secs: u64,
    pub error_backoff_secs: u64,
    /// Relative drop between consecutive samples that launches a mission.
    pub drop_threshold_pct: u32,
    pub history_capacity: usize,
    /// Fallback when the oracle does not report its own decimals.
    pub price_decimals: u32,
    #[serde(default)]
    pub state_file: Option<String>,
    pub emergency_mission: EmergencyMissionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmergencyMissionConfig {
    pub target_liquidity: i64,
    pub reward_pool: i64,
    pub duration_hours: u64,
}

impl EmergencyMissionConfig {
    /// Mission parameters for a given trigger price (already in stroops).
    pub fn params(&self, trigger_price: i128) -> MissionParams {
        MissionParams {
            target_liquidity: self.target_liquidity as i128,
            reward_pool: self.reward_pool as i128,
            duration_hours: self.duration_hours,
            trigger_price,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceFeedConfig {
    /// Start in live mode (oracle + CoinGecko) rather than demo mode.
    pub live: bool,
    pub update_interval_secs: u64,
    pub coingecko_base_url: String,
    pub mock_base_price: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
    /// Run the demo price/progress simulation while in demo mode.
    pub demo_updates: bool,
    /// Upper bound on mission ids scanned when loading live missions.
    pub max_missions: u64,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply `KALE_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("KALE_NETWORK") {
            match NetworkConfig::preset(&name) {
                Some(preset) => self.network = preset,
                None => tracing::warn!(network = %name, "Unknown KALE_NETWORK, keeping config value"),
            }
        }
        if let Some(id) = lookup("KALE_MISSION_CONTROLLER_ID") {
            self.contracts.mission_controller = id;
        }
        if let Some(id) = lookup("KALE_REFLECTOR_READER_ID") {
            self.contracts.reflector_reader = id;
        }
        if let Some(id) = lookup("KALE_MOCK_ORACLE_ID") {
            self.contracts.mock_oracle = id;
        }
        if let Some(id) = lookup("KALE_REFLECTOR_CONTRACT_ID") {
            self.contracts.reflector_oracle = Some(id);
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The admin signing secret, kept out of logs.
    pub fn admin_secret(&self) -> Result<SecretString> {
        Self::resolve_env(&self.admin.secret_key_env).map(SecretString::new)
    }

    /// The secondary (user) signing secret, if configured.
    pub fn user_secret(&self) -> Result<SecretString> {
        let env = self
            .admin
            .user_secret_key_env
            .as_deref()
            .context("admin.user_secret_key_env is not configured")?;
        Self::resolve_env(env).map(SecretString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../config.toml");

    #[test]
    fn test_parse_bundled_config() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.network.name, "testnet");
        assert_eq!(cfg.network.passphrase, NetworkConfig::TESTNET_PASSPHRASE);
        assert_eq!(cfg.monitor.source, PriceSourceKind::Reflector);
        assert_eq!(cfg.monitor.interval_secs, 30);
        assert_eq!(cfg.monitor.drop_threshold_pct, 15);
        assert_eq!(cfg.monitor.history_capacity, 100);
        assert_eq!(cfg.monitor.emergency_mission.duration_hours, 24);
        assert!(cfg.contracts.mission_controller.starts_with('C'));
    }

    #[test]
    fn test_emergency_params() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        let params = cfg.monitor.emergency_mission.params(1_000_000);
        assert_eq!(params.target_liquidity, 100_000_000_000);
        assert_eq!(params.reward_pool, 50_000_000_000);
        assert_eq!(params.trigger_price, 1_000_000);
    }

    #[test]
    fn test_network_override_switches_preset() {
        let mut cfg = AppConfig::parse(SAMPLE).unwrap();
        cfg.apply_overrides(|key| match key {
            "KALE_NETWORK" => Some("mainnet".to_string()),
            "KALE_MISSION_CONTROLLER_ID" => Some("CNEWCONTROLLER".to_string()),
            _ => None,
        });
        assert_eq!(cfg.network.name, "mainnet");
        assert_eq!(cfg.network.passphrase, NetworkConfig::MAINNET_PASSPHRASE);
        assert_eq!(cfg.contracts.mission_controller, "CNEWCONTROLLER");
    }

    #[test]
    fn test_unknown_network_override_ignored() {
        let mut cfg = AppConfig::parse(SAMPLE).unwrap();
        cfg.apply_overrides(|key| (key == "KALE_NETWORK").then(|| "devnet".to_string()));
        assert_eq!(cfg.network.name, "testnet");
    }

    #[test]
    fn test_source_kind_parses_snake_case() {
        let text = SAMPLE.replace("source = \"reflector\"", "source = \"mock_oracle\"");
        let cfg = AppConfig::parse(&text).unwrap();
        assert_eq!(cfg.monitor.source, PriceSourceKind::MockOracle);
    }

    #[test]
    fn test_resolve_env_missing() {
        assert!(AppConfig::resolve_env("KALE_TEST_DEFINITELY_UNSET_VAR").is_err());
    }
}
