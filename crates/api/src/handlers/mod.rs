pub mod api_keys;
pub mod callback;
pub mod internal;
pub mod invoices;
pub mod metrics;
pub mod payer;
pub mod register;
pub mod service_invoices;
pub mod services;
pub mod session;
pub mod webhooks;

pub use api_keys::{create_api_key_handler, delete_api_key_handler, list_api_keys_handler};
pub use callback::{auth_callback_handler, sign_in_handler};
pub use internal::refund_invoice_handler;
pub use invoices::{create_invoice_handler, get_invoice_handler};
pub use metrics::metrics_handler;
pub use payer::public_invoice_handler;
pub use register::register_user_handler;
pub use service_invoices::{
    cancel_invoice_action, create_invoice_action, list_invoices_action,
};
pub use services::{create_service_action, list_services_action};
pub use webhooks::{create_webhook_handler, delete_webhook_handler, list_webhooks_handler};

use actix_web::{
    error::{JsonPayloadError, QueryPayloadError},
    http::StatusCode,
    HttpRequest, HttpResponse, ResponseError,
};
use ::metrics::counter;
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::error;

use nanopay_domain::model::{
    ApiKeyValidationError, InvoiceValidationError, ProfileValidationError,
    ServiceValidationError, WebhookValidationError,
};
use nanopay_domain::services::events::PayAddressError;
use nanopay_domain::storage::StorageError;

use crate::auth::AuthError;

#[derive(Debug, Error, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn validation(err: impl std::fmt::Display) -> Self {
        Self::Validation(err.to_string())
    }
}

macro_rules! validation_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for ApiError {
                fn from(value: $ty) -> Self {
                    ApiError::validation(value)
                }
            }
        )+
    };
}

validation_from!(
    InvoiceValidationError,
    ServiceValidationError,
    ApiKeyValidationError,
    WebhookValidationError,
    ProfileValidationError,
);

impl From<PayAddressError> for ApiError {
    fn from(value: PayAddressError) -> Self {
        ApiError::Upstream(value.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Rejected(message) => ApiError::Unauthorized(message),
            AuthError::Upstream(message) => ApiError::Upstream(message),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Storage(_) | ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        counter!("api_errors_total", "kind" => self.as_ref().to_owned()).increment(1);
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        HttpResponse::build(status).json(ErrorBody {
            message: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Routes malformed JSON bodies (including unknown fields) through `ApiError`.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::validation(err).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::validation(err).into()
}
