use std::{sync::Arc, time::Duration};

use chrono::Duration as ChronoDuration;
use nanopay_domain::config::DEFAULT_SITE_URL;
use nanopay_domain::services::{
    abuse::AbuseTracker,
    cache::{ApiKeyCache, TaggedCache},
    events::{InvoiceEventSink, PayAddressSource},
    telemetry::TelemetryGuard,
};
use nanopay_storage::SeaOrmStorage;

use crate::auth::IdentityProvider;

const DEFAULT_INVOICE_EXPIRATION: Duration = Duration::from_secs(600);
const MAX_INVOICE_EXPIRATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Outbound collaborators the handlers talk to.
#[derive(Clone)]
pub struct Upstreams {
    pub identity: Arc<dyn IdentityProvider>,
    pub pay_addresses: Arc<dyn PayAddressSource>,
    pub events: Arc<dyn InvoiceEventSink>,
}

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    api_keys: ApiKeyCache,
    services: TaggedCache,
    telemetry: TelemetryGuard,
    abuse_tracker: AbuseTracker,
    trust_forwarded_headers: bool,
    upstreams: Upstreams,
    site_url: String,
    invoice_expiration: ChronoDuration,
}

impl AppState {
    pub fn new(storage: SeaOrmStorage, telemetry: TelemetryGuard, upstreams: Upstreams) -> Self {
        let abuse_tracker = telemetry.abuse_tracker();
        Self {
            storage,
            api_keys: ApiKeyCache::default(),
            services: TaggedCache::default(),
            telemetry,
            abuse_tracker,
            trust_forwarded_headers: false,
            upstreams,
            site_url: DEFAULT_SITE_URL.to_owned(),
            invoice_expiration: to_chrono(DEFAULT_INVOICE_EXPIRATION),
        }
    }

    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    pub fn with_invoice_expiration(mut self, expiration: Duration) -> Self {
        self.invoice_expiration = to_chrono(expiration);
        self
    }

    /// Identify callers by `Forwarded`/`X-Forwarded-For` instead of the
    /// socket peer. Only for deployments behind a proxy that rewrites them.
    pub fn with_trusted_proxy(mut self, trusted: bool) -> Self {
        self.trust_forwarded_headers = trusted;
        self
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn api_keys(&self) -> &ApiKeyCache {
        &self.api_keys
    }

    pub fn services(&self) -> &TaggedCache {
        &self.services
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn abuse_tracker(&self) -> &AbuseTracker {
        &self.abuse_tracker
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.upstreams.identity.as_ref()
    }

    pub fn pay_addresses(&self) -> &dyn PayAddressSource {
        self.upstreams.pay_addresses.as_ref()
    }

    pub fn events(&self) -> &dyn InvoiceEventSink {
        self.upstreams.events.as_ref()
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    pub fn invoice_expiration(&self) -> ChronoDuration {
        self.invoice_expiration
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    let secs = duration.as_secs().clamp(1, MAX_INVOICE_EXPIRATION_SECS);
    ChronoDuration::seconds(secs as i64)
}
