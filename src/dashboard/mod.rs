//! Dashboard: Axum web server for the mission board.
//!
//! Serves a REST API and a self-contained HTML status page.
//! CORS is open so a separately hosted frontend can call it.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, ChainAccess, DashboardState};

/// The embedded status page (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/missions", get(routes::list_missions).post(routes::create_mission))
        .route("/api/missions/:id", get(routes::get_mission))
        .route("/api/missions/:id/enlist", post(routes::enlist))
        .route("/api/missions/:id/contribute", post(routes::contribute))
        .route("/api/me/missions", get(routes::my_missions))
        .route("/api/summary", get(routes::summary))
        .route("/api/price", get(routes::get_price))
        .route("/api/price/stats", get(routes::price_stats))
        .route("/api/price/feed", get(routes::price_feed))
        .route("/api/price/mock", post(routes::set_mock_price))
        .route("/api/mode", post(routes::set_mode))
        .route("/api/monitor", get(routes::monitor_status))
        .route("/api/wallet/:address", get(routes::wallet))
        .route("/api/tx/build", post(routes::build_transaction))
        .route("/api/tx/submit", post(routes::submit_transaction))
        .route("/health", get(routes::health))
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded status page.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// Serve until `shutdown` flips to true.
pub async fn serve(state: AppState, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server starting on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .context("Dashboard server error")
}

/// Start the dashboard in a background task.
pub fn spawn_dashboard(state: AppState, port: u16, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(state, port, shutdown).await {
            error!(error = %e, "Dashboard stopped");
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
