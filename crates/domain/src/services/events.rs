//! Seams between the HTTP API, the watcher and the outside world.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::InvoiceEvent;

/// Receives invoice lifecycle events. Implementations must not fail the
/// caller: delivery problems are logged and counted, never propagated.
#[async_trait]
pub trait InvoiceEventSink: Send + Sync {
    async fn publish(&self, event: InvoiceEvent);
}

/// Sink that drops every event, for deployments without webhooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl InvoiceEventSink for NoopEventSink {
    async fn publish(&self, _event: InvoiceEvent) {}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("pay address allocation failed: {0}")]
pub struct PayAddressError(pub String);

/// Hands out a fresh Nano account for each invoice to receive funds on.
#[async_trait]
pub trait PayAddressSource: Send + Sync {
    async fn allocate_pay_address(&self) -> Result<String, PayAddressError>;
}
