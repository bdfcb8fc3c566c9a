//! Application-level configuration: match timings and the external reporting endpoint.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TAP_BATTLE_BACK_CONFIG_PATH";
/// Environment variable that overrides the configured report endpoint.
const REPORT_ENDPOINT_ENV: &str = "REPORT_ENDPOINT";

/// Countdown before the tapping window opens. Clients animate against this
/// exact value, so it must not drift from their expectation.
const DEFAULT_COUNTDOWN_MS: u64 = 3_000;
/// Scoring window for a ranked 1v1 match.
const DEFAULT_ACTIVE_WINDOW_MS: u64 = 10_000;
/// How long a finished session lingers so late or duplicate final-state
/// deliveries can still be answered.
const DEFAULT_FINISHED_GRACE_MS: u64 = 30_000;
/// Accelerated cleanup delay once a session has zero live connections.
const DEFAULT_IDLE_GRACE_MS: u64 = 5_000;
/// How long a fresh socket may take to send its identifying join message.
const DEFAULT_IDENT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Delay between the second join and the start of the tapping window.
    pub countdown: Duration,
    /// Duration of the tapping window itself.
    pub active_window: Duration,
    /// Grace period before a finished session is evicted.
    pub finished_grace: Duration,
    /// Eviction delay once all connections of a session have dropped.
    pub idle_grace: Duration,
    /// Deadline for a new socket to identify itself with a join message.
    pub ident_timeout: Duration,
    /// Base URL of the external match record service, if any.
    pub report_endpoint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            countdown: Duration::from_millis(DEFAULT_COUNTDOWN_MS),
            active_window: Duration::from_millis(DEFAULT_ACTIVE_WINDOW_MS),
            finished_grace: Duration::from_millis(DEFAULT_FINISHED_GRACE_MS),
            idle_grace: Duration::from_millis(DEFAULT_IDLE_GRACE_MS),
            ident_timeout: Duration::from_millis(DEFAULT_IDENT_TIMEOUT_MS),
            report_endpoint: None,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration from file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Ok(endpoint) = env::var(REPORT_ENDPOINT_ENV) {
            if !endpoint.is_empty() {
                config.report_endpoint = Some(endpoint);
            }
        }

        config
    }
}

/// Resolve the config path from the environment, defaulting to [`DEFAULT_CONFIG_PATH`].
fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// On-disk configuration shape; absent fields keep their defaults.
struct RawConfig {
    countdown_ms: Option<u64>,
    active_window_ms: Option<u64>,
    finished_grace_ms: Option<u64>,
    idle_grace_ms: Option<u64>,
    ident_timeout_ms: Option<u64>,
    report_endpoint: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            countdown: raw
                .countdown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown),
            active_window: raw
                .active_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.active_window),
            finished_grace: raw
                .finished_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.finished_grace),
            idle_grace: raw
                .idle_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_grace),
            ident_timeout: raw
                .ident_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ident_timeout),
            report_endpoint: raw.report_endpoint,
        }
    }
}
