use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    ApiKeyHash, ApiKeyId, ApiKeyRecord, InvoiceId, InvoicePage, InvoiceRecord, InvoiceStatus,
    NewApiKey, NewInvoice, NewPayment, NewService, NewWebhook, ProfileRecord, Raw, RefundOutcome,
    ServiceId, ServiceRecord, ServiceRef, StatusChange, UserId, WebhookId, WebhookRecord,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Fails with `StorageError::Duplicate("service")` when the name is taken.
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceRecord>;
    async fn find_service(&self, service: &ServiceRef) -> StorageResult<Option<ServiceRecord>>;
    async fn list_services_for_user(&self, user_id: &UserId) -> StorageResult<Vec<ServiceRecord>>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert_invoice(&self, invoice: NewInvoice) -> StorageResult<InvoiceRecord>;
    async fn find_invoice(&self, id: &InvoiceId) -> StorageResult<Option<InvoiceRecord>>;
    async fn find_invoice_for_service(
        &self,
        id: &InvoiceId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<InvoiceRecord>>;
    /// Returns the requested page and the total number of invoices owned by
    /// the service.
    async fn list_invoices(
        &self,
        service_id: &ServiceId,
        page: InvoicePage,
    ) -> StorageResult<(Vec<InvoiceRecord>, u64)>;
    /// Invoices still accepting payments, oldest first.
    async fn list_watchable_invoices(&self) -> StorageResult<Vec<InvoiceRecord>>;
    /// Appends a payment and folds it into `received_amount` and status in
    /// one transaction. `Ok(None)` when the hash was already recorded or the
    /// invoice no longer accepts payments.
    async fn record_payment(&self, payment: NewPayment) -> StorageResult<Option<StatusChange>>;
    /// Compare-and-set status transition; `Ok(None)` when the invoice is
    /// missing or no longer in one of `from`.
    async fn transition_status(
        &self,
        id: &InvoiceId,
        from: &[InvoiceStatus],
        to: InvoiceStatus,
    ) -> StorageResult<Option<StatusChange>>;
    async fn record_refund(&self, id: &InvoiceId, amount: Raw) -> StorageResult<RefundOutcome>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert_api_key(&self, key: NewApiKey) -> StorageResult<ApiKeyRecord>;
    async fn find_api_key_by_hash(&self, hash: &ApiKeyHash) -> StorageResult<Option<ApiKeyRecord>>;
    async fn list_api_keys(&self, service_id: &ServiceId) -> StorageResult<Vec<ApiKeyRecord>>;
    /// Deletes the key when it belongs to `service_id` and returns it.
    async fn delete_api_key(
        &self,
        id: &ApiKeyId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<ApiKeyRecord>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_webhook(&self, webhook: NewWebhook) -> StorageResult<WebhookRecord>;
    async fn list_webhooks(&self, service_id: &ServiceId) -> StorageResult<Vec<WebhookRecord>>;
    async fn delete_webhook(
        &self,
        id: &WebhookId,
        service_id: &ServiceId,
    ) -> StorageResult<Option<WebhookRecord>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fails with `StorageError::Duplicate("profile")` when the user already
    /// has one.
    async fn insert_profile(&self, profile: ProfileRecord) -> StorageResult<ProfileRecord>;
    async fn find_profile(&self, user_id: &UserId) -> StorageResult<Option<ProfileRecord>>;
}
