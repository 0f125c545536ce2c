//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Useful for development and debugging when you only want the REST server with its
//! OpenAPI/Swagger UI. The workspace's `atn-run` binary serves the same router.

use api_rest::{router, AppState};
use atn_core::constants::{BACKEND_TIMEOUT_ENV, THRESHOLDS_FILE_ENV};
use atn_core::CoreConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the ATN REST API server
///
/// # Environment Variables
/// - `ATN_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `ATN_BACKEND_TIMEOUT_MS`: Upper bound on backend calls
/// - `ATN_THRESHOLDS_FILE`: YAML threshold table replacing the built-in rows
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_env_values(
        std::env::var(BACKEND_TIMEOUT_ENV).ok(),
        std::env::var(THRESHOLDS_FILE_ENV).ok(),
    )?;

    let addr = std::env::var("ATN_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("-- Starting ATN REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(AppState::new(&cfg))).await?;

    Ok(())
}
