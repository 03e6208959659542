use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use nanopay_domain::model::{InvoiceEvent, InvoiceView, WebhookEventType, WebhookRecord};
use nanopay_domain::services::events::InvoiceEventSink;
use nanopay_domain::storage::WebhookStore;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

/// Body posted to subscriber URLs.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    pub created_at: DateTime<Utc>,
    pub data: InvoiceView,
}

impl WebhookPayload {
    pub fn new(event: &InvoiceEvent, site_url: Option<&str>) -> Self {
        let view = InvoiceView::new(&event.invoice);
        let data = match site_url {
            Some(site_url) => view.with_pay_url(site_url),
            None => view,
        };
        Self {
            id: Uuid::new_v4(),
            event_type: event.event_type,
            created_at: event.occurred_at,
            data,
        }
    }
}

/// Delivers invoice events to the service's active, subscribed webhooks.
/// One attempt per hook; failures are logged and counted.
#[derive(Clone)]
pub struct WebhookDispatcher<S> {
    store: S,
    http: reqwest::Client,
    site_url: Option<String>,
}

impl<S> WebhookDispatcher<S>
where
    S: WebhookStore,
{
    pub fn new(store: S, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            store,
            http,
            site_url: None,
        })
    }

    /// Includes `pay_url` links under `site_url` in payloads.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// Hooks of the invoice's service that want this event.
    pub async fn subscribers(&self, event: &InvoiceEvent) -> Vec<WebhookRecord> {
        match self.store.list_webhooks(&event.invoice.service_id).await {
            Ok(hooks) => hooks
                .into_iter()
                .filter(|hook| hook.wants(event.event_type))
                .collect(),
            Err(err) => {
                warn!(?err, service = %event.invoice.service_id, "failed to load webhooks");
                counter!("webhook_deliveries_total", "result" => "lookup_error").increment(1);
                Vec::new()
            }
        }
    }

    async fn deliver(&self, hook: &WebhookRecord, payload: &WebhookPayload) {
        let result = self
            .http
            .post(&hook.url)
            .header("X-NanoPay-Event", payload.event_type.as_ref())
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(response) => {
                counter!("webhook_deliveries_total", "result" => "delivered").increment(1);
                debug!(
                    webhook = %hook.id,
                    status = response.status().as_u16(),
                    event = %payload.event_type,
                    "webhook delivered"
                );
            }
            Err(err) => {
                counter!("webhook_deliveries_total", "result" => "failed").increment(1);
                warn!(
                    webhook = %hook.id,
                    url = hook.url,
                    event = %payload.event_type,
                    error = %err,
                    "webhook delivery failed"
                );
            }
        }
    }
}

#[async_trait]
impl<S> InvoiceEventSink for WebhookDispatcher<S>
where
    S: WebhookStore,
{
    async fn publish(&self, event: InvoiceEvent) {
        let hooks = self.subscribers(&event).await;
        if hooks.is_empty() {
            return;
        }
        let payload = WebhookPayload::new(&event, self.site_url.as_deref());
        for hook in &hooks {
            self.deliver(hook, &payload).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanopay_domain::model::{
        InvoiceId, InvoiceRecord, InvoiceStatus, NewWebhook, Raw, ServiceId, WebhookId, CURRENCY,
    };
    use nanopay_domain::storage::StorageResult;

    struct StaticHooks(Vec<WebhookRecord>);

    #[async_trait]
    impl WebhookStore for StaticHooks {
        async fn insert_webhook(&self, _webhook: NewWebhook) -> StorageResult<WebhookRecord> {
            unimplemented!("read-only fixture")
        }

        async fn list_webhooks(&self, service_id: &ServiceId) -> StorageResult<Vec<WebhookRecord>> {
            Ok(self
                .0
                .iter()
                .filter(|hook| hook.service_id == *service_id)
                .cloned()
                .collect())
        }

        async fn delete_webhook(
            &self,
            _id: &WebhookId,
            _service_id: &ServiceId,
        ) -> StorageResult<Option<WebhookRecord>> {
            Ok(None)
        }
    }

    fn hook(service_id: ServiceId, name: &str, active: bool, events: &[WebhookEventType]) -> WebhookRecord {
        WebhookRecord {
            id: WebhookId::new_v4(),
            service_id,
            name: name.into(),
            url: format!("https://hooks.example.com/{name}"),
            active,
            event_types: events.to_vec(),
            created_at: Utc::now(),
        }
    }

    fn paid_event(service_id: ServiceId) -> InvoiceEvent {
        let now = Utc::now();
        InvoiceEvent::for_current_status(InvoiceRecord {
            id: InvoiceId::new_v4(),
            service_id,
            title: "Coffee".into(),
            description: None,
            price: Raw::new(100),
            recipient_address: "nano_recipient".into(),
            metadata: None,
            redirect_url: None,
            currency: CURRENCY.into(),
            status: InvoiceStatus::Paid,
            pay_address: "nano_pay".into(),
            received_amount: Raw::new(100),
            refunded_amount: Raw::ZERO,
            expires_at: now,
            created_at: now,
            payments: Vec::new(),
        })
        .expect("paid is announced")
    }

    #[tokio::test]
    async fn only_active_subscribed_hooks_receive_events() {
        let service = ServiceId::new_v4();
        let store = StaticHooks(vec![
            hook(service, "paid", true, &[WebhookEventType::InvoicePaid]),
            hook(service, "inactive", false, &[WebhookEventType::InvoicePaid]),
            hook(service, "expired", true, &[WebhookEventType::InvoiceExpired]),
            hook(ServiceId::new_v4(), "other", true, &[WebhookEventType::InvoicePaid]),
        ]);
        let dispatcher = WebhookDispatcher::new(store, Duration::from_secs(1)).unwrap();

        let names: Vec<_> = dispatcher
            .subscribers(&paid_event(service))
            .await
            .into_iter()
            .map(|hook| hook.name)
            .collect();
        assert_eq!(names, vec!["paid"]);
    }

    #[test]
    fn payload_carries_type_and_invoice() {
        let event = paid_event(ServiceId::new_v4());
        let payload = WebhookPayload::new(&event, Some("https://nanopay.me"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "invoice.paid");
        assert_eq!(json["data"]["status"], "paid");
        assert_eq!(json["data"]["id"], event.invoice.id.to_string());
        assert_eq!(
            json["data"]["pay_url"],
            format!("https://nanopay.me/invoices/{}", event.invoice.id)
        );
    }
}
