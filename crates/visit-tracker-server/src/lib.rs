//! HTTP surface for the hospital visit tracker.
//!
//! ```text
//! client ──► axum Router ──► handler ──► spawn_blocking ──► VisitTracker ──► SQLite
//!                 │
//!                 ├─ TraceLayer   (request spans)
//!                 ├─ CorsLayer
//!                 └─ DefaultBodyLimit (upload cap)
//! ```
//!
//! All responses are JSON envelopes with a `success` flag, except the CSV
//! export. Errors use the same envelope with `success: false`.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;

/// Build the application router over the given state.
pub fn build_router(state: AppState) -> Router {
    let patient_route = if state.config.enable_admin {
        get(routes::get_patient).delete(routes::delete_patient)
    } else {
        get(routes::get_patient)
    };

    let api = Router::new()
        .route("/uploadFile", post(routes::upload_file))
        .route("/addVisit", post(routes::add_visit))
        .route("/addBulkVisits", post(routes::add_bulk_visits))
        .route("/patient/:identifier", patient_route)
        .route("/allPatients", get(routes::all_patients))
        .route("/stats", get(routes::stats))
        .route("/patients/sort/by-visits", get(routes::patients_by_visits))
        .route("/patients/today", get(routes::todays_patients))
        .route("/patients/date-range", get(routes::patients_by_date_range))
        .route("/patients/export", get(routes::export_patients));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .nest("/api", api)
        .route("/health", get(routes::health))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the store, bind, and serve until Ctrl+C or SIGTERM.
pub async fn start_server(config: Config) -> Result<()> {
    info!("Opening database at {}", config.db_path);
    let address = config.bind_address();
    let state = AppState::open(config)?;

    if state.config.enable_admin {
        info!("Admin routes enabled");
    }

    let app = build_router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
