use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use super::{char_len, is_web_url, InvoiceRecord, InvoiceStatus, ServiceId, WebhookId};

const WEBHOOK_NAME_MIN: usize = 2;
const WEBHOOK_NAME_MAX: usize = 40;
const WEBHOOK_URL_MAX: usize = 512;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
pub enum WebhookEventType {
    #[serde(rename = "invoice.created")]
    #[strum(serialize = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.processing")]
    #[strum(serialize = "invoice.processing")]
    InvoiceProcessing,
    #[serde(rename = "invoice.paid")]
    #[strum(serialize = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.paid_partial")]
    #[strum(serialize = "invoice.paid_partial")]
    InvoicePaidPartial,
    #[serde(rename = "invoice.expired")]
    #[strum(serialize = "invoice.expired")]
    InvoiceExpired,
    #[serde(rename = "invoice.canceled")]
    #[strum(serialize = "invoice.canceled")]
    InvoiceCanceled,
    #[serde(rename = "invoice.refunded")]
    #[strum(serialize = "invoice.refunded")]
    InvoiceRefunded,
    #[serde(rename = "invoice.refunded_partial")]
    #[strum(serialize = "invoice.refunded_partial")]
    InvoiceRefundedPartial,
    #[serde(rename = "invoice.error")]
    #[strum(serialize = "invoice.error")]
    InvoiceError,
}

impl WebhookEventType {
    /// Event announcing that an invoice entered `status`. `pending` has no
    /// event of its own; creation is announced by `invoice.created`.
    pub fn for_status(status: InvoiceStatus) -> Option<Self> {
        match status {
            InvoiceStatus::Pending => None,
            InvoiceStatus::Processing => Some(Self::InvoiceProcessing),
            InvoiceStatus::Paid => Some(Self::InvoicePaid),
            InvoiceStatus::PaidPartial => Some(Self::InvoicePaidPartial),
            InvoiceStatus::Expired => Some(Self::InvoiceExpired),
            InvoiceStatus::Canceled => Some(Self::InvoiceCanceled),
            InvoiceStatus::Refunded => Some(Self::InvoiceRefunded),
            InvoiceStatus::RefundedPartial => Some(Self::InvoiceRefundedPartial),
            InvoiceStatus::Error => Some(Self::InvoiceError),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookCreate {
    pub name: String,
    pub url: String,
    pub event_types: Vec<WebhookEventType>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookValidationError {
    #[error("name must be between {WEBHOOK_NAME_MIN} and {WEBHOOK_NAME_MAX} characters")]
    NameLength,
    #[error("url must be an http(s) URL of at most {WEBHOOK_URL_MAX} characters")]
    Url,
    #[error("at least one event type is required")]
    NoEventTypes,
}

impl WebhookCreate {
    pub fn validate(&self) -> Result<(), WebhookValidationError> {
        if !(WEBHOOK_NAME_MIN..=WEBHOOK_NAME_MAX).contains(&char_len(&self.name)) {
            return Err(WebhookValidationError::NameLength);
        }
        if !is_web_url(&self.url, WEBHOOK_URL_MAX) {
            return Err(WebhookValidationError::Url);
        }
        if self.event_types.is_empty() {
            return Err(WebhookValidationError::NoEventTypes);
        }
        Ok(())
    }

    /// Event types without duplicates, in first-seen order.
    pub fn distinct_event_types(&self) -> Vec<WebhookEventType> {
        let mut seen = Vec::with_capacity(self.event_types.len());
        for event in &self.event_types {
            if !seen.contains(event) {
                seen.push(*event);
            }
        }
        seen
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhook {
    pub id: WebhookId,
    pub service_id: ServiceId,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub event_types: Vec<WebhookEventType>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookRecord {
    pub id: WebhookId,
    #[serde(skip)]
    pub service_id: ServiceId,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub event_types: Vec<WebhookEventType>,
    pub created_at: DateTime<Utc>,
}

impl WebhookRecord {
    pub fn wants(&self, event: WebhookEventType) -> bool {
        self.active && self.event_types.contains(&event)
    }
}

/// Something happened to an invoice that subscribers may care about.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceEvent {
    pub event_type: WebhookEventType,
    pub invoice: InvoiceRecord,
    pub occurred_at: DateTime<Utc>,
}

impl InvoiceEvent {
    pub fn created(invoice: InvoiceRecord) -> Self {
        Self {
            event_type: WebhookEventType::InvoiceCreated,
            invoice,
            occurred_at: Utc::now(),
        }
    }

    /// Event for the status the invoice currently holds, if that status is
    /// announced at all.
    pub fn for_current_status(invoice: InvoiceRecord) -> Option<Self> {
        WebhookEventType::for_status(invoice.status).map(|event_type| Self {
            event_type,
            invoice,
            occurred_at: Utc::now(),
        })
    }
}
