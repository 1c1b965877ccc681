//! Operational tools against the mock chain.

use kale_missions::config::EmergencyMissionConfig;
use kale_missions::ops::integration::{CheckStatus, IntegrationCheck};
use kale_missions::ops::smoke::{run_smoke, SMOKE_STAKE};
use kale_missions::ops::test_mission_params;
use kale_missions::soroban::keys::Keypair;

use crate::mock_chain::{reflector_units, Deployment};

fn emergency() -> EmergencyMissionConfig {
    EmergencyMissionConfig {
        target_liquidity: 100_000_000_000,
        reward_pool: 50_000_000_000,
        duration_hours: 24,
    }
}

#[tokio::test]
async fn test_integration_checks_pass_on_healthy_deployment() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let (reader, controller) = (d.reader(), d.controller());

    let report = IntegrationCheck {
        reader: &reader,
        controller: &controller,
        network: "testnet",
        reflector_oracle: None,
        drop_threshold_pct: 15,
        fallback_decimals: 7,
    }
    .run()
    .await;

    assert!(report.passed(), "{:?}", report.checks);
    assert_eq!(report.tests["adminRestriction"], CheckStatus::Passed);
    assert_eq!(report.tests["priceMonitoring"], CheckStatus::Passed);
    assert!((report.current_price.unwrap() - 0.12).abs() < 1e-9);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["tests"]["reflectorReader"], "PASSED");
    assert!(json["contracts"]["missionController"].is_string());
    // The admin check only simulates.
    assert_eq!(d.chain.mission_count(), 0);
}

#[tokio::test]
async fn test_integration_checks_fail_without_feed() {
    let d = Deployment::new();
    let (reader, controller) = (d.reader(), d.controller());
    let report = IntegrationCheck {
        reader: &reader,
        controller: &controller,
        network: "testnet",
        reflector_oracle: None,
        drop_threshold_pct: 15,
        fallback_decimals: 7,
    }
    .run()
    .await;

    assert!(!report.passed());
    assert_eq!(report.tests["reflectorReader"], CheckStatus::Failed);
    assert_eq!(report.tests["priceMonitoring"], CheckStatus::Skipped);
}

#[tokio::test]
async fn test_smoke_creates_and_enlists() {
    let d = Deployment::new();
    let user = Keypair::random();
    let params = test_mission_params(&emergency());

    let outcome = run_smoke(&d.controller(), &d.admin, &user, &params, SMOKE_STAKE)
        .await
        .unwrap();
    assert_eq!(outcome.mission.id, 1);
    assert_eq!(outcome.mission.participants_count, 1);
    assert_eq!(outcome.mission.trigger_price, 1_000_000);
    assert_eq!(outcome.stake.user, user.public_key());
    assert_eq!(outcome.stake.kale_staked, SMOKE_STAKE);
}

#[tokio::test]
async fn test_smoke_fails_for_non_admin() {
    let d = Deployment::new();
    let params = test_mission_params(&emergency());
    let err = run_smoke(&d.controller(), &Keypair::random(), &Keypair::random(), &params, SMOKE_STAKE)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("create_mission as admin"));
    assert_eq!(d.chain.mission_count(), 0);
}

#[tokio::test]
async fn test_oracle_admin_commands() {
    let d = Deployment::new();
    let oracle = d.oracle();
    oracle.update_price(&d.admin, "XLM", 150_000).await.unwrap();
    assert_eq!(oracle.get_price("XLM").await.unwrap().price, 150_000);

    // Clamped at 100 %.
    assert_eq!(oracle.simulate_price_drop(&d.admin, "XLM", 250).await.unwrap(), 0);

    let stranger = Keypair::random();
    assert!(oracle.update_price(&stranger, "XLM", 1).await.is_err());
}
