//! Dashboard API against the mock chain: switching data sources, the
//! wallet transaction round trip and error mapping.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

use kale_missions::board::chain::{ChainMissions, MissionFetcher};
use kale_missions::board::{seed, DataMode, MissionBoard, SharedBoard};
use kale_missions::dashboard::{build_router, AppState, ChainAccess, DashboardState};
use kale_missions::price::{OracleFeed, PriceService, ReflectorFeed};
use kale_missions::soroban::keys::Keypair;
use kale_missions::types::MissionParams;

use crate::mock_chain::{reflector_units, Deployment, REFLECTOR_DECIMALS};

fn params(trigger_price: i128) -> MissionParams {
    MissionParams {
        target_liquidity: 100_000_000_000,
        reward_pool: 50_000_000_000,
        duration_hours: 24,
        trigger_price,
    }
}

fn app_state(d: &Deployment) -> (AppState, SharedBoard) {
    let board: SharedBoard = Arc::new(RwLock::new(MissionBoard::demo(Utc::now())));
    let oracle: Arc<dyn OracleFeed> = Arc::new(ReflectorFeed::new(d.reader(), REFLECTOR_DECIMALS));
    let prices = Arc::new(PriceService::new(Some(oracle), None, 0.12));
    let fetcher: Arc<dyn MissionFetcher> = Arc::new(ChainMissions::new(d.controller(), 50));
    let state = DashboardState::new(board.clone(), prices, "testnet").with_chain(ChainAccess {
        invoker: d.shared_invoker(),
        controller: d.controller(),
        fetcher,
    });
    (Arc::new(state), board)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_live_mode_shows_chain_missions() {
    let d = Deployment::new();
    d.chain.set_reflector_price("XLM", reflector_units(0.1));
    d.controller().create_mission(&d.admin, &params(1_000_000)).await.unwrap();
    d.controller().create_mission(&d.admin, &params(900_000)).await.unwrap();

    let (state, board) = app_state(&d);
    let app = build_router(state);

    let (status, body) = call(&app, "POST", "/api/mode", Some(json!({ "mode": "live" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "live");
    assert_eq!(body["missions"], 2);
    assert!(board.read().await.participations.is_empty());

    let (_, missions) = call(&app, "GET", "/api/missions", None).await;
    let missions = missions.as_array().unwrap();
    assert_eq!(missions[0]["id"], "1");
    assert_eq!(missions[0]["mission_type"], "emergency");
    assert_eq!(missions[1]["trigger_price"], 0.09);

    let (_, price) = call(&app, "GET", "/api/price", None).await;
    assert!((price["current_price"].as_f64().unwrap() - 0.1).abs() < 1e-9);

    let (_, health) = call(&app, "GET", "/health", None).await;
    assert_eq!(health["mode"], "live");
}

#[tokio::test]
async fn test_live_mode_refuses_local_writes() {
    let d = Deployment::new();
    d.controller().create_mission(&d.admin, &params(1_000_000)).await.unwrap();
    let (state, _) = app_state(&d);
    let app = build_router(state);

    call(&app, "POST", "/api/mode", Some(json!({ "mode": "live" }))).await;
    let (status, body) = call(&app, "POST", "/api/missions/1/enlist", Some(json!({ "amount": 100.0 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_failed_live_switch_keeps_demo_data() {
    let d = Deployment::new();
    let (state, board) = app_state(&d);
    let app = build_router(state);

    d.chain.set_offline(true);
    let (status, _) = call(&app, "POST", "/api/mode", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let board = board.read().await;
    assert_eq!(board.mode, DataMode::Demo);
    assert!(!board.loading);
    assert_eq!(board.missions.len(), seed::missions(Utc::now()).len());
}

#[tokio::test]
async fn test_back_to_demo_restores_seed() {
    let d = Deployment::new();
    d.controller().create_mission(&d.admin, &params(1_000_000)).await.unwrap();
    let (state, board) = app_state(&d);
    let app = build_router(state);

    call(&app, "POST", "/api/mode", Some(json!({ "mode": "live" }))).await;
    let (status, body) = call(&app, "POST", "/api/mode", Some(json!({ "mode": "demo" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
    assert_eq!(board.read().await.participations.len(), seed::participations(Utc::now()).len());
}

#[tokio::test]
async fn test_wallet_transaction_round_trip() {
    let d = Deployment::new();
    d.controller().create_mission(&d.admin, &params(1_000_000)).await.unwrap();
    let (state, _) = app_state(&d);
    let app = build_router(state);
    call(&app, "POST", "/api/mode", Some(json!({ "mode": "live" }))).await;

    let user = Keypair::random();
    let (status, prepared) = call(
        &app,
        "POST",
        "/api/tx/build",
        Some(json!({
            "action": "enlist",
            "source": user.public_key(),
            "mission_id": 1,
            "amount": 100.0
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(prepared["xdr"].as_str().unwrap().contains("enlist"));

    // The wallet signs and the chain records the stake.
    d.controller().enlist(&user, 1, 1_000_000_000).await.unwrap();
    let (status, receipt) = call(
        &app,
        "POST",
        "/api/tx/submit",
        Some(json!({ "signed_xdr": "AAAAAgAAAA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["hash"].as_str().unwrap().len(), 64);

    let (_, detail) = call(&app, "GET", "/api/missions/1", None).await;
    assert_eq!(detail["mission"]["participants_count"], 1);
}

#[tokio::test]
async fn test_build_maps_contract_failures() {
    let d = Deployment::new();
    d.controller().create_mission(&d.admin, &params(1_000_000)).await.unwrap();
    let (state, _) = app_state(&d);
    let app = build_router(state);
    let user = Keypair::random();

    // Non-admin create is rejected by the contract.
    let (status, _) = call(
        &app,
        "POST",
        "/api/tx/build",
        Some(json!({
            "action": "create_mission",
            "source": user.public_key(),
            "target_liquidity": 10000.0,
            "reward_pool": 5000.0,
            "duration_hours": 24,
            "trigger_price": 0.1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown mission.
    let (status, _) = call(
        &app,
        "POST",
        "/api/tx/build",
        Some(json!({ "action": "enlist", "source": user.public_key(), "mission_id": 99, "amount": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Second enlistment.
    d.controller().enlist(&user, 1, 1).await.unwrap();
    let (status, _) = call(
        &app,
        "POST",
        "/api/tx/build",
        Some(json!({ "action": "enlist", "source": user.public_key(), "mission_id": 1, "amount": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bad source address.
    let (status, _) = call(
        &app,
        "POST",
        "/api/tx/build",
        Some(json!({ "action": "enlist", "source": "GNOPE", "mission_id": 1, "amount": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
