//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the workflow and the
//! backend. Nothing in this crate reads process environment variables while handling a
//! request; the helpers below take the raw `Option<String>` values so binaries can pass
//! `std::env::var(..).ok()` and tests can pass literals.

use crate::constants::DEFAULT_BACKEND_TIMEOUT_MS;
use crate::{CoreError, CoreResult};
use atn_engine::ThresholdTable;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend_timeout: Duration,
    thresholds: Arc<ThresholdTable>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            thresholds: Arc::new(ThresholdTable::default()),
        }
    }
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(backend_timeout: Duration, thresholds: ThresholdTable) -> CoreResult<Self> {
        if backend_timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "backend timeout must be greater than zero".into(),
            ));
        }
        if thresholds.is_empty() {
            return Err(CoreError::InvalidConfig(
                "threshold table must contain at least one row".into(),
            ));
        }

        Ok(Self {
            backend_timeout,
            thresholds: Arc::new(thresholds),
        })
    }

    /// Builds a configuration from raw environment values.
    ///
    /// `timeout_ms` is `ATN_BACKEND_TIMEOUT_MS`; `thresholds_file` is `ATN_THRESHOLDS_FILE`.
    pub fn from_env_values(
        timeout_ms: Option<String>,
        thresholds_file: Option<String>,
    ) -> CoreResult<Self> {
        let timeout = backend_timeout_from_env_value(timeout_ms)?;
        let thresholds = thresholds_from_env_value(thresholds_file)?;
        Self::new(timeout, thresholds)
    }

    pub fn backend_timeout(&self) -> Duration {
        self.backend_timeout
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    /// Shared handle to the threshold table.
    pub fn thresholds_arc(&self) -> Arc<ThresholdTable> {
        Arc::clone(&self.thresholds)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the backend timeout from an optional millisecond value.
///
/// If `value` is `None` or empty/whitespace, returns the 30 second default.
pub fn backend_timeout_from_env_value(value: Option<String>) -> CoreResult<Duration> {
    let Some(raw) = non_blank(value) else {
        return Ok(Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS));
    };
    let ms = raw.parse::<u64>().map_err(|e| {
        CoreError::InvalidConfig(format!("backend timeout {raw:?} is not a millisecond count: {e}"))
    })?;
    if ms == 0 {
        return Err(CoreError::InvalidConfig(
            "backend timeout must be greater than zero".into(),
        ));
    }
    Ok(Duration::from_millis(ms))
}

/// Load the threshold table named by an optional path value.
///
/// If `value` is `None` or empty/whitespace, returns the built-in table.
pub fn thresholds_from_env_value(value: Option<String>) -> CoreResult<ThresholdTable> {
    match non_blank(value) {
        Some(path) => load_thresholds_file(Path::new(&path)),
        None => Ok(ThresholdTable::default()),
    }
}

/// Read and parse a YAML threshold table.
pub fn load_thresholds_file(path: &Path) -> CoreResult<ThresholdTable> {
    let text = std::fs::read_to_string(path).map_err(|source| CoreError::ThresholdFileRead {
        path: PathBuf::from(path),
        source,
    })?;
    let table = ThresholdTable::from_yaml(&text)?;
    tracing::info!(path = %path.display(), rows = table.len(), "loaded threshold table");
    Ok(table)
}
