//! Shared types for KALE Missions.
//!
//! These mirror the records the on-chain contracts return, plus the
//! fixed-point helpers and error types used across the monitor, the
//! contract bindings and the dashboard.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Fixed-point amounts
// ---------------------------------------------------------------------------

/// Token amounts and service-submitted trigger prices use 7 decimals.
pub const STROOP_DECIMALS: u32 = 7;

/// The mock oracle quotes prices in micro units ($0.12 = 120_000).
pub const MICRO_DECIMALS: u32 = 6;

/// Largest decimal count whose scale factor fits in an `i128`.
pub const MAX_DECIMALS: u32 = 38;

/// Re-express a fixed-point value with a different number of decimals.
/// Scaling down truncates toward zero; scaling up saturates.
pub fn rescale(value: i128, from_decimals: u32, to_decimals: u32) -> i128 {
    if from_decimals >= to_decimals {
        match 10i128.checked_pow(from_decimals - to_decimals) {
            Some(factor) => value / factor,
            None => 0,
        }
    } else {
        match 10i128.checked_pow(to_decimals - from_decimals) {
            Some(factor) => value.saturating_mul(factor),
            None if value == 0 => 0,
            None if value > 0 => i128::MAX,
            None => i128::MIN,
        }
    }
}

/// Fixed-point value as a floating display amount.
pub fn to_units(value: i128, decimals: u32) -> f64 {
    value as f64 / 10f64.powi(decimals as i32)
}

/// Floating amount to fixed-point, floored like the wallet-side conversion.
pub fn from_units(amount: f64, decimals: u32) -> i128 {
    (amount * 10f64.powi(decimals as i32)).floor() as i128
}

/// Ledger timestamp (seconds) to `DateTime<Utc>`.
pub fn ledger_time(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0).single().unwrap_or_else(Utc::now)
}

// ---------------------------------------------------------------------------
// On-chain records
// ---------------------------------------------------------------------------

/// A mission as stored by the mission controller contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: u64,
    pub target_liquidity: i128,
    pub current_progress: i128,
    pub reward_pool: i128,
    /// Ledger timestamp (seconds).
    pub deadline: u64,
    pub active: bool,
    pub trigger_price: i128,
    pub participants_count: u32,
}

impl Mission {
    /// Progress toward the liquidity target (0.0 = none, 1.0 = met).
    pub fn progress_ratio(&self) -> f64 {
        if self.target_liquidity <= 0 {
            0.0
        } else {
            self.current_progress as f64 / self.target_liquidity as f64
        }
    }

    /// Whether the deadline has passed at ledger time `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.deadline
    }

    pub fn deadline_at(&self) -> DateTime<Utc> {
        ledger_time(self.deadline)
    }
}

impl fmt::Display for Mission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Mission #{} [{}] {:.0}% of {} | reward {} | {} participants | trigger {}",
            self.id,
            if self.active { "ACTIVE" } else { "CLOSED" },
            self.progress_ratio() * 100.0,
            to_units(self.target_liquidity, STROOP_DECIMALS),
            to_units(self.reward_pool, STROOP_DECIMALS),
            self.participants_count,
            to_units(self.trigger_price, STROOP_DECIMALS),
        )
    }
}

/// A user's stake in one mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStake {
    /// Account strkey (`G…`).
    pub user: String,
    pub mission_id: u64,
    pub kale_staked: i128,
    pub contribution: i128,
    pub enlisted_at: u64,
}

/// A price point as reported by the reflector reader / mission controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPrice {
    pub price: i128,
    pub timestamp: u64,
}

impl ChainPrice {
    /// The reader reports a zero price when its upstream feed has no data.
    pub fn is_missing(&self) -> bool {
        self.price == 0
    }
}

/// A price point as stored by the mock oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePrice {
    pub asset: String,
    /// Micro units.
    pub price: i128,
    pub timestamp: u64,
}

impl From<OraclePrice> for ChainPrice {
    fn from(p: OraclePrice) -> Self {
        ChainPrice {
            price: p.price,
            timestamp: p.timestamp,
        }
    }
}

/// Arguments of `create_mission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionParams {
    pub target_liquidity: i128,
    pub reward_pool: i128,
    pub duration_hours: u64,
    pub trigger_price: i128,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a contract invocation was rejected by the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractFailure {
    #[error("caller is not authorized")]
    Unauthorized,

    #[error("mission inactive")]
    MissionInactive,

    #[error("mission expired")]
    MissionExpired,

    #[error("user already enlisted")]
    AlreadyEnlisted,

    #[error("record not found")]
    NotFound,

    #[error("host error: {0}")]
    Host(String),
}

impl ContractFailure {
    /// Classify the diagnostic text returned by a failed simulation.
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("unauthorized")
            || m.contains("only admin")
            || m.contains("auth, invalidaction")
        {
            ContractFailure::Unauthorized
        } else if m.contains("mission inactive") {
            ContractFailure::MissionInactive
        } else if m.contains("mission expired") {
            ContractFailure::MissionExpired
        } else if m.contains("already enlisted") {
            ContractFailure::AlreadyEnlisted
        } else if m.contains("missingvalue") || m.contains("unreachablecodereached") {
            ContractFailure::NotFound
        } else {
            ContractFailure::Host(message.trim().to_string())
        }
    }
}

/// Domain-specific error types for KALE Missions.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("Contract call {function} failed: {failure}")]
    Contract {
        function: String,
        failure: ContractFailure,
    },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transaction {hash} ended with status {status}")]
    Transaction { hash: String, status: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("XDR error: {0}")]
    Xdr(String),

    #[error("Unexpected contract value: {0}")]
    Decode(String),

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Mission not found: {0}")]
    MissionNotFound(String),

    #[error("Already enlisted in mission {0}")]
    AlreadyEnlisted(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MissionError {
    /// The contract failure behind this error, if it is one.
    pub fn contract_failure(&self) -> Option<&ContractFailure> {
        match self {
            MissionError::Contract { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

impl From<stellar_xdr::curr::Error> for MissionError {
    fn from(e: stellar_xdr::curr::Error) -> Self {
        MissionError::Xdr(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
