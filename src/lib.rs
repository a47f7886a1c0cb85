//! Bookstore backend.
//!
//! REST service for a small online bookstore: user accounts with JWT auth,
//! a per-user cart and wishlist, and orders with a forward-only shipment
//! lifecycle, confirmation emails, and post-delivery feedback.
//!
//! # Infrastructure
//! - One axum server, one Redis instance holding every entity as a JSON
//!   document under typed keys (see [`database`])
//! - Transactional email goes out over SMTP through an injected [`mailer::Mailer`]
//! - Each request maps to one or more sequential Redis operations; order
//!   status and feedback writes use a compare-and-swap so concurrent
//!   updates of the same order cannot interleave
//!
//! # Setup
//!
//! Configuration comes from the environment (`RUST_PORT`, `REDIS_URL`,
//! `SMTP_RELAY`, `FRONTEND_URL`) and Docker secrets or env vars for
//! `JWT_SECRET`, `SMTP_USERNAME`, and `SMTP_PASSWORD`.
//!
//! ```sh
//! RUST_LOG=info cargo run
//! ```
use std::time::Duration;

use axum::http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod cart;
pub mod config;
pub mod database;
pub mod error;
pub mod mailer;
pub mod models;
pub mod orders;
pub mod routes;
pub mod state;
pub mod users;
pub mod wishlist;

use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_origin(Any)
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::api_router().layer(cors).with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
