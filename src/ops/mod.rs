//! Operational tools run from the CLI against a deployment.

pub mod integration;
pub mod smoke;

use crate::config::EmergencyMissionConfig;
use crate::types::{from_units, MissionParams, STROOP_DECIMALS};

/// Trigger price of manually created test missions, in USD.
pub const TEST_TRIGGER_PRICE_USD: f64 = 0.10;

/// Emergency mission parameters with the test trigger price.
pub fn test_mission_params(emergency: &EmergencyMissionConfig) -> MissionParams {
    emergency.params(from_units(TEST_TRIGGER_PRICE_USD, STROOP_DECIMALS))
}
