//! JSON projections of invoices as merchants, payers and webhooks see them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::{InvoiceId, InvoiceRecord, InvoiceStatus, PaymentId, PaymentRecord, ServiceId, ServiceRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub from: String,
    pub to: String,
    pub hash: String,
    /// XNO.
    pub amount: f64,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl From<&PaymentRecord> for PaymentView {
    fn from(payment: &PaymentRecord) -> Self {
        Self {
            id: payment.id,
            from: payment.from.clone(),
            to: payment.to.clone(),
            hash: payment.hash.clone(),
            amount: payment.amount.to_xno(),
            timestamp: payment.timestamp.timestamp_millis(),
        }
    }
}

/// Merchant-facing invoice, returned by the API-key endpoints and carried in
/// webhook payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceView {
    pub id: InvoiceId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub currency: String,
    pub pay_address: String,
    pub price: f64,
    pub status: InvoiceStatus,
    pub received_amount: f64,
    pub refunded_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
    pub redirect_url: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    pub recipient_address: String,
    pub payments: Vec<PaymentView>,
}

impl InvoiceView {
    pub fn new(invoice: &InvoiceRecord) -> Self {
        Self {
            id: invoice.id,
            created_at: invoice.created_at,
            expires_at: invoice.expires_at,
            title: invoice.title.clone(),
            description: invoice.description.clone(),
            currency: invoice.currency.clone(),
            pay_address: invoice.pay_address.clone(),
            price: invoice.price.to_xno(),
            status: invoice.status,
            received_amount: invoice.received_amount.to_xno(),
            refunded_amount: invoice.refunded_amount.to_xno(),
            pay_url: None,
            redirect_url: invoice.redirect_url.clone(),
            metadata: invoice.metadata.clone(),
            recipient_address: invoice.recipient_address.clone(),
            payments: invoice.payments.iter().map(PaymentView::from).collect(),
        }
    }

    /// Adds the hosted payment page link under `site_url`.
    pub fn with_pay_url(mut self, site_url: &str) -> Self {
        self.pay_url = Some(invoice_pay_url(site_url, &self.id));
        self
    }
}

pub fn invoice_pay_url(site_url: &str, id: &InvoiceId) -> String {
    format!("{}/invoices/{id}", site_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicServiceView {
    pub id: ServiceId,
    pub name: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_email: Option<String>,
}

impl From<&ServiceRecord> for PublicServiceView {
    fn from(service: &ServiceRecord) -> Self {
        Self {
            id: service.id,
            name: service.name.clone(),
            display_name: service.display_name.clone(),
            avatar_url: service.avatar_url.clone(),
            description: service.description.clone(),
            website: service.website.clone(),
            contact_email: service.contact_email.clone(),
        }
    }
}

/// Payer-facing invoice: no metadata, recipient or redirect target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicInvoiceView {
    pub id: InvoiceId,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub pay_address: String,
    pub received_amount: f64,
    pub refunded_amount: f64,
    pub payments: Vec<PaymentView>,
    pub has_redirect_url: bool,
    pub service: PublicServiceView,
}

impl PublicInvoiceView {
    pub fn new(invoice: &InvoiceRecord, service: &ServiceRecord) -> Self {
        Self {
            id: invoice.id,
            title: invoice.title.clone(),
            description: invoice.description.clone(),
            price: invoice.price.to_xno(),
            currency: invoice.currency.clone(),
            status: invoice.status,
            expires_at: invoice.expires_at,
            created_at: invoice.created_at,
            pay_address: invoice.pay_address.clone(),
            received_amount: invoice.received_amount.to_xno(),
            refunded_amount: invoice.refunded_amount.to_xno(),
            payments: invoice.payments.iter().map(PaymentView::from).collect(),
            has_redirect_url: invoice.redirect_url.is_some(),
            service: PublicServiceView::from(service),
        }
    }
}
