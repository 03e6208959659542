//! Environment-driven configuration structures shared by all binaries.

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

/// Public site origin used to build payer links when `SITE_URL` is unset.
pub const DEFAULT_SITE_URL: &str = "https://nanopay.me";

const DEFAULT_INVOICE_EXPIRATION_SECS: u64 = 600;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_RECEIVABLE_COUNT: u64 = 100;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// API-specific configuration (HTTP bind, shared database, identity provider
/// and node wallet) so the HTTP surface does not depend on watcher-only
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    api_unix_socket: Option<String>,
    internal_bind_address: Option<String>,
    internal_unix_socket: Option<String>,
    site_url: String,
    auth: AuthProviderConfig,
    nano_rpc_url: String,
    nano_wallet_id: String,
    invoice_expiration: Duration,
    webhook_timeout: Duration,
    trust_forwarded_headers: bool,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            api_unix_socket: get_optional_var("API_UNIX_SOCKET"),
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            internal_unix_socket: get_optional_var("API_INTERNAL_UNIX_SOCKET"),
            site_url: load_site_url(),
            auth: AuthProviderConfig::load_from_env()?,
            nano_rpc_url: get_required_var("NANO_RPC_URL")?,
            nano_wallet_id: get_required_var("NANO_WALLET_ID")?,
            invoice_expiration: Duration::from_secs(get_number_or(
                "INVOICE_EXPIRATION_SECS",
                DEFAULT_INVOICE_EXPIRATION_SECS,
            )?),
            webhook_timeout: load_webhook_timeout()?,
            trust_forwarded_headers: get_flag("API_TRUST_FORWARDED_HEADERS")?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_unix_socket(&self) -> Option<&str> {
        self.api_unix_socket.as_deref()
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn internal_unix_socket(&self) -> Option<&str> {
        self.internal_unix_socket.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some() || self.internal_unix_socket.is_some()
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn auth(&self) -> &AuthProviderConfig {
        &self.auth
    }

    pub fn nano_rpc_url(&self) -> &str {
        &self.nano_rpc_url
    }

    pub fn nano_wallet_id(&self) -> &str {
        &self.nano_wallet_id
    }

    pub fn invoice_expiration(&self) -> Duration {
        self.invoice_expiration
    }

    /// Per-hook delivery timeout for events the API raises itself.
    pub fn webhook_timeout(&self) -> Duration {
        self.webhook_timeout
    }

    /// Whether a reverse proxy in front of the API owns `Forwarded` and
    /// `X-Forwarded-For`.
    pub fn trust_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }
}

/// Connection details for the hosted identity provider (GoTrue-compatible).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthProviderConfig {
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl AuthProviderConfig {
    fn load_from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: get_required_var("AUTH_URL")?
                .trim_end_matches('/')
                .to_string(),
            anon_key: get_required_var("AUTH_ANON_KEY")?,
            service_role_key: get_required_var("AUTH_SERVICE_ROLE_KEY")?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn service_role_key(&self) -> &str {
        &self.service_role_key
    }
}

/// Configuration for the payment watcher binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    database_url: String,
    nano_rpc_url: String,
    site_url: String,
    poll_interval: Duration,
    receivable_count: u64,
    webhook_timeout: Duration,
}

impl WatcherConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// required process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let nano_rpc_url = get_required_var("NANO_RPC_URL")?;
        let poll_interval = Duration::from_secs(
            get_number_or("WATCHER_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?.max(1),
        );
        let receivable_count =
            get_number_or("WATCHER_RECEIVABLE_COUNT", DEFAULT_RECEIVABLE_COUNT)?.max(1);
        let webhook_timeout = load_webhook_timeout()?;

        Ok(Self {
            database_url,
            nano_rpc_url,
            site_url: load_site_url(),
            poll_interval,
            receivable_count,
            webhook_timeout,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn nano_rpc_url(&self) -> &str {
        &self.nano_rpc_url
    }

    /// Origin used for `pay_url` links in webhook payloads.
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn receivable_count(&self) -> u64 {
        self.receivable_count
    }

    pub fn webhook_timeout(&self) -> Duration {
        self.webhook_timeout
    }
}

fn load_site_url() -> String {
    get_optional_var("SITE_URL")
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string())
}

fn load_webhook_timeout() -> Result<Duration, ConfigError> {
    let secs = get_number_or("WEBHOOK_TIMEOUT_SECS", DEFAULT_WEBHOOK_TIMEOUT_SECS)?;
    Ok(Duration::from_secs(secs.max(1)))
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_flag(key: &'static str) -> Result<bool, ConfigError> {
    match get_optional_var(key).map(|value| value.to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value }),
        },
    }
}

fn get_number_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    match get_optional_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("NANOPAY_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean in `{key}`: `{value}`")]
    InvalidFlag { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
