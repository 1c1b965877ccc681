//! End-to-end monitor tests: oracle price moves on the mock chain, the
//! monitor samples it and launches missions through the controller.

use std::time::Duration;

use kale_missions::config::EmergencyMissionConfig;
use kale_missions::monitor::adapters::{
    ControllerLauncher, MockOraclePriceSource, ReflectorPriceSource,
};
use kale_missions::monitor::{stop_channel, MonitorSettings, PriceMonitor};
use kale_missions::soroban::keys::Keypair;
use kale_missions::storage;

use crate::mock_chain::{reflector_units, Deployment};

fn settings(state_file: Option<String>) -> MonitorSettings {
    MonitorSettings {
        network: "testnet".into(),
        asset: "XLM".into(),
        interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        threshold_pct: 10,
        history_capacity: 10,
        default_decimals: 14,
        emergency: EmergencyMissionConfig {
            target_liquidity: 100_000_000_000,
            reward_pool: 50_000_000_000,
            duration_hours: 24,
        },
        state_file,
    }
}

fn reflector_monitor(d: &Deployment, state_file: Option<String>) -> PriceMonitor {
    PriceMonitor::new(
        Box::new(ReflectorPriceSource::new(d.reader(), "XLM")),
        Box::new(ControllerLauncher::new(d.controller(), d.admin.clone(), 50)),
        settings(state_file),
    )
}

#[tokio::test]
async fn test_drop_over_threshold_creates_mission() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));

    let mut monitor = reflector_monitor(&d, None);
    let first = monitor.initialize().await.unwrap();
    assert!((first.as_f64() - 0.12).abs() < 1e-9);
    assert_eq!(monitor.decimals(), 14);

    // Flat price: nothing happens.
    let flat = monitor.tick().await.unwrap();
    assert!(!flat.triggered());

    // 0.12 -> 0.10 is a 16.7 % drop.
    d.chain.set_reflector_price("XLM", reflector_units(0.10));
    let outcome = monitor.tick().await.unwrap();
    assert_eq!(outcome.mission_id, Some(1));

    let mission = d.chain.mission(1).unwrap();
    assert_eq!(mission.trigger_price, 1_000_000);
    assert_eq!(mission.target_liquidity, 100_000_000_000);
    assert!(mission.active);

    let current = monitor.current_mission().await.unwrap().unwrap();
    assert_eq!(current.id, 1);

    let status = monitor.status().await;
    assert_eq!(status.missions_created, 1);
    assert_eq!(status.last_mission_id, Some(1));
    assert_eq!(status.history_len, 3);
}

#[tokio::test]
async fn test_small_drop_is_ignored() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let mut monitor = reflector_monitor(&d, None);
    monitor.initialize().await.unwrap();

    d.chain.set_reflector_price("XLM", reflector_units(0.114));
    let outcome = monitor.tick().await.unwrap();
    assert!(outcome.change.is_some());
    assert!(!outcome.triggered());
    assert_eq!(d.chain.mission_count(), 0);
}

#[tokio::test]
async fn test_missing_feed_fails_initialization() {
    let d = Deployment::new();
    let mut monitor = reflector_monitor(&d, None);
    assert!(monitor.initialize().await.is_err());
}

#[tokio::test]
async fn test_mock_oracle_drop_creates_mission() {
    let d = Deployment::new();
    d.oracle().update_price(&d.admin, "XLM", 120_000).await.unwrap();

    let mut monitor = PriceMonitor::new(
        Box::new(MockOraclePriceSource::new(d.oracle(), "XLM")),
        Box::new(ControllerLauncher::new(d.controller(), d.admin.clone(), 50)),
        settings(None),
    );
    monitor.initialize().await.unwrap();
    assert_eq!(monitor.decimals(), 6);

    let new_price = d.oracle().simulate_price_drop(&d.admin, "XLM", 20).await.unwrap();
    assert_eq!(new_price, 96_000);

    let outcome = monitor.tick().await.unwrap();
    assert_eq!(outcome.mission_id, Some(1));
    assert_eq!(d.chain.mission(1).unwrap().trigger_price, 960_000);
}

#[tokio::test]
async fn test_non_admin_launcher_reports_failure() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let mut monitor = PriceMonitor::new(
        Box::new(ReflectorPriceSource::new(d.reader(), "XLM")),
        Box::new(ControllerLauncher::new(d.controller(), Keypair::random(), 50)),
        settings(None),
    );
    monitor.initialize().await.unwrap();

    d.chain.set_reflector_price("XLM", reflector_units(0.06));
    let outcome = monitor.tick().await.unwrap();
    assert!(outcome.triggered());
    assert!(outcome.mission_id.is_none());
    assert!(outcome.launch_error.unwrap().contains("not authorized"));
    assert_eq!(d.chain.mission_count(), 0);
}

#[tokio::test]
async fn test_run_loop_stops_on_signal() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let mut monitor = reflector_monitor(&d, None);
    monitor.initialize().await.unwrap();
    let status = monitor.status_handle();

    let (stop, rx) = stop_channel();
    let handle = tokio::spawn(async move {
        monitor.run(rx).await;
        monitor
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(status.read().await.running);
    stop.stop();

    let monitor = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    let final_status = monitor.status().await;
    assert!(!final_status.running);
    assert!(final_status.history_len > 1);
}

#[tokio::test]
async fn test_outage_is_recorded_then_cleared() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let mut monitor = reflector_monitor(&d, None);
    monitor.initialize().await.unwrap();
    let status = monitor.status_handle();

    d.chain.set_offline(true);
    let (stop, rx) = stop_channel();
    let handle = tokio::spawn(async move {
        monitor.run(rx).await;
    });

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(status.read().await.last_error.is_some());

    d.chain.set_offline(false);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(status.read().await.last_error.is_none());

    stop.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_history_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("kale-monitor-{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.12));
    let mut monitor = reflector_monitor(&d, Some(path.clone()));
    monitor.initialize().await.unwrap();
    d.chain.set_reflector_price("XLM", reflector_units(0.09));
    monitor.tick().await.unwrap();

    let saved = storage::load_state(Some(&path)).unwrap().unwrap();
    assert_eq!(saved.asset, "XLM");
    assert_eq!(saved.samples.len(), 2);
    assert_eq!(saved.missions_created, 1);
    assert_eq!(saved.last_mission_id, Some(1));

    let mut restarted = reflector_monitor(&d, Some(path.clone()));
    restarted.initialize().await.unwrap();
    let status = restarted.status().await;
    assert_eq!(status.history_len, 3);
    assert_eq!(status.missions_created, 1);

    storage::delete_state(Some(&path)).unwrap();
}
