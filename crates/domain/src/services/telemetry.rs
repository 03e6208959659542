use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

use super::abuse::AbuseTracker;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_ABUSE_THRESHOLD: u16 = 5;

/// Logging, metrics and abuse-tracking knobs for one binary, read from
/// `<PREFIX>_LOG_FILTER`, `<PREFIX>_METRICS_ADDRESS`,
/// `<PREFIX>_ABUSE_THRESHOLD` and `<PREFIX>_ABUSE_WINDOW_SECS`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<String>,
    abuse_threshold: u16,
    abuse_window: Duration,
}

impl TelemetryConfig {
    /// Unset or unparsable entries fall back to defaults; telemetry never
    /// blocks a binary from booting.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let prefix = prefix.trim().to_ascii_uppercase();
        let read = |suffix: &str| {
            env::var(format!("{prefix}_{suffix}"))
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            log_filter: read("LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
            metrics_address: read("METRICS_ADDRESS"),
            abuse_threshold: read("ABUSE_THRESHOLD")
                .and_then(|value| value.parse::<u16>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_ABUSE_THRESHOLD),
            abuse_window: read("ABUSE_WINDOW_SECS")
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(AbuseTracker::DEFAULT_WINDOW),
        }
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }

    pub fn abuse_threshold(&self) -> u16 {
        self.abuse_threshold
    }

    pub fn abuse_window(&self) -> Duration {
        self.abuse_window
    }
}

/// Handle kept by binaries once telemetry is installed.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
    abuse_threshold: u16,
    abuse_window: Duration,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn abuse_threshold(&self) -> u16 {
        self.abuse_threshold
    }

    /// Tracker configured with this binary's threshold and window.
    pub fn abuse_tracker(&self) -> AbuseTracker {
        AbuseTracker::with_window(self.abuse_threshold, self.abuse_window)
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Safe to call
/// more than once per process; later calls reuse what the first installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config.log_filter())?;
    let metrics = install_metrics(config.metrics_address())?;

    Ok(TelemetryGuard {
        metrics,
        abuse_threshold: config.abuse_threshold(),
        abuse_window: config.abuse_window(),
    })
}

fn install_tracing(filter: &str) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }
    let env_filter =
        EnvFilter::try_new(filter).map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }
    Ok(())
}

fn install_metrics(listen: Option<&str>) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let builder = match listen {
                Some(addr) => {
                    let socket: SocketAddr = addr.parse().map_err(|err: std::net::AddrParseError| {
                        TelemetryError::InvalidMetricsAddress(addr.to_owned(), err.to_string())
                    })?;
                    PrometheusBuilder::new().with_http_listener(socket)
                }
                None => PrometheusBuilder::new(),
            };
            builder
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })
        .cloned()
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
