use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use nanopay_domain::{
    config::{ConfigError, WatcherConfig},
    services::{events::InvoiceEventSink, telemetry::TelemetryError},
    storage::{InvoiceStore, StorageError},
};

use crate::{
    pipeline::reconcile_invoice,
    rpc::{LedgerSource, RpcError},
};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("http client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for WatcherError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

/// Outcome of one pass over the watchable invoices.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub invoices: usize,
    pub events: usize,
    pub failures: usize,
}

/// Polls forever. A failing invoice or RPC call is logged and retried on the
/// next tick; only the caller can stop the loop.
pub async fn run_watcher<S, L, E>(
    config: &WatcherConfig,
    store: S,
    ledger: L,
    sink: E,
) -> Result<(), WatcherError>
where
    S: InvoiceStore,
    L: LedgerSource,
    E: InvoiceEventSink,
{
    info!(
        interval_secs = config.poll_interval().as_secs(),
        receivable_count = config.receivable_count(),
        "payment watcher started"
    );
    loop {
        match poll_once(&store, &ledger, &sink, config.receivable_count()).await {
            Ok(summary) => {
                counter!("watcher_polls_total", "result" => "ok").increment(1);
                gauge!("watcher_watchable_invoices").set(summary.invoices as f64);
            }
            Err(err) => {
                counter!("watcher_polls_total", "result" => "error").increment(1);
                warn!(?err, "failed to load watchable invoices");
            }
        }
        sleep(config.poll_interval()).await;
    }
}

/// Reconciles every watchable invoice once and publishes the resulting
/// events. Fails only when the invoice list itself cannot be loaded.
pub async fn poll_once<S, L, E>(
    store: &S,
    ledger: &L,
    sink: &E,
    receivable_count: u64,
) -> Result<PollSummary, WatcherError>
where
    S: InvoiceStore,
    L: LedgerSource,
    E: InvoiceEventSink,
{
    let started = Instant::now();
    let invoices = store.list_watchable_invoices().await?;
    let mut summary = PollSummary {
        invoices: invoices.len(),
        ..PollSummary::default()
    };

    for invoice in &invoices {
        match reconcile_invoice(store, ledger, invoice, receivable_count, Utc::now()).await {
            Ok(events) => {
                summary.events += events.len();
                for event in events {
                    sink.publish(event).await;
                }
            }
            Err(err) => {
                summary.failures += 1;
                counter!("watcher_invoices_total", "result" => "failed").increment(1);
                warn!(invoice = %invoice.id, ?err, "reconcile failed");
            }
        }
    }

    histogram!("watcher_poll_duration_seconds").record(started.elapsed().as_secs_f64());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use nanopay_domain::model::{
        InvoiceEvent, InvoiceId, InvoiceStatus, NewInvoice, Raw, ServiceId, WebhookEventType,
    };
    use nanopay_storage::SeaOrmStorage;
    use std::sync::Mutex;

    use crate::rpc::ReceivableBlock;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<InvoiceEvent>>,
    }

    #[async_trait]
    impl InvoiceEventSink for RecordingSink {
        async fn publish(&self, event: InvoiceEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Pays the full price to one account and fails for another.
    struct ScriptedLedger {
        paid_account: String,
        broken_account: String,
    }

    #[async_trait]
    impl LedgerSource for ScriptedLedger {
        async fn receivable(
            &self,
            account: &str,
            _count: u64,
        ) -> Result<Vec<ReceivableBlock>, RpcError> {
            if account == self.broken_account {
                return Err(RpcError::Transport("timeout".into()));
            }
            if account == self.paid_account {
                return Ok(vec![ReceivableBlock {
                    hash: "F00D".into(),
                    amount: "1000".into(),
                    source: "nano_sender".into(),
                }]);
            }
            Ok(Vec::new())
        }

        async fn received(
            &self,
            account: &str,
            _count: u64,
        ) -> Result<Vec<ReceivableBlock>, RpcError> {
            if account == self.broken_account {
                return Err(RpcError::Transport("timeout".into()));
            }
            Ok(Vec::new())
        }
    }

    fn new_invoice(pay_address: &str) -> NewInvoice {
        let now = Utc::now();
        NewInvoice {
            id: InvoiceId::new_v4(),
            service_id: ServiceId::new_v4(),
            title: "Coffee".into(),
            description: None,
            price: Raw::new(1000),
            recipient_address: "nano_recipient".into(),
            metadata: None,
            redirect_url: None,
            pay_address: pay_address.into(),
            expires_at: now + ChronoDuration::minutes(10),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn poll_settles_invoices_and_isolates_failures() {
        let storage = SeaOrmStorage::connect("sqlite::memory:").await.unwrap();
        let paid = storage.insert_invoice(new_invoice("nano_paid")).await.unwrap();
        let broken = storage
            .insert_invoice(new_invoice("nano_broken"))
            .await
            .unwrap();
        let idle = storage.insert_invoice(new_invoice("nano_idle")).await.unwrap();
        let ledger = ScriptedLedger {
            paid_account: "nano_paid".into(),
            broken_account: "nano_broken".into(),
        };
        let sink = RecordingSink::default();

        let summary = poll_once(&storage, &ledger, &sink, 10).await.unwrap();
        assert_eq!(
            summary,
            PollSummary {
                invoices: 3,
                events: 1,
                failures: 1,
            }
        );

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, WebhookEventType::InvoicePaid);
        assert_eq!(events[0].invoice.id, paid.id);
        drop(events);

        for (id, expected) in [
            (paid.id, InvoiceStatus::Paid),
            (broken.id, InvoiceStatus::Pending),
            (idle.id, InvoiceStatus::Pending),
        ] {
            let stored = storage.find_invoice(&id).await.unwrap().unwrap();
            assert_eq!(stored.status, expected);
        }

        // A second pass finds nothing new for the paid invoice.
        let summary = poll_once(&storage, &ledger, &sink, 10).await.unwrap();
        assert_eq!(summary.invoices, 2);
        assert_eq!(summary.events, 0);
    }
}
