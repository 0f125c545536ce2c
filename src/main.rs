use anyhow::Context;
use api_rest::{router, AppState};
use atn_core::constants::{
    BACKEND_TIMEOUT_ENV, DEFAULT_SESSION_IDLE_SECS, SESSION_IDLE_ENV, THRESHOLDS_FILE_ENV,
};
use atn_core::CoreConfig;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the ATN application
///
/// Resolves the configuration once, then serves the REST API (with Swagger UI) over the
/// in-memory backend until Ctrl+C or SIGTERM.
///
/// # Environment Variables
/// - `ATN_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `ATN_BACKEND_TIMEOUT_MS`: Upper bound on backend calls (default: 30000)
/// - `ATN_THRESHOLDS_FILE`: YAML threshold table replacing the built-in rows
/// - `ATN_SESSION_IDLE_SECS`: Idle time before an open session is evicted (default: 3600)
///
/// # Returns
/// * `Ok(())` - If the server starts and shuts down cleanly
/// * `Err(anyhow::Error)` - If configuration, startup or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("atn=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = CoreConfig::from_env_values(
        std::env::var(BACKEND_TIMEOUT_ENV).ok(),
        std::env::var(THRESHOLDS_FILE_ENV).ok(),
    )
    .context("Invalid configuration")?;

    let session_idle = session_idle(std::env::var(SESSION_IDLE_ENV).ok())?;

    let rest_addr = std::env::var("ATN_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!(
        timeout = ?cfg.backend_timeout(),
        idle = ?session_idle,
        "++ Starting ATN REST on {}",
        rest_addr
    );

    let state = AppState::new(&cfg);
    let backend = state.backend().clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_period(session_idle));
        loop {
            ticker.tick().await;
            backend.evict_idle(session_idle).await;
        }
    });

    let listener = tokio::net::TcpListener::bind(&rest_addr)
        .await
        .context("Failed to bind REST address")?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("REST server error")?;

    sweeper.abort();
    tracing::info!("-- ATN REST stopped");
    Ok(())
}

/// Parses the idle eviction window, falling back to [`DEFAULT_SESSION_IDLE_SECS`].
fn session_idle(raw: Option<String>) -> anyhow::Result<Duration> {
    let secs = match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{SESSION_IDLE_ENV} must be a whole number of seconds"))?,
        None => DEFAULT_SESSION_IDLE_SECS,
    };
    anyhow::ensure!(secs > 0, "{SESSION_IDLE_ENV} must be positive");
    Ok(Duration::from_secs(secs))
}

/// Sweeps a few times per idle window, at most once a minute.
fn sweep_period(idle: Duration) -> Duration {
    (idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
