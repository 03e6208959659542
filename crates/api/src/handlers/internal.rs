//! Operator endpoints served only on the internal listener.

use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use nanopay_domain::model::{InvoiceEvent, InvoiceId, InvoiceView, Raw, RefundOutcome};
use nanopay_domain::storage::InvoiceStore;

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefundRequest {
    /// XNO.
    pub amount: f64,
}

/// Records a refund against the invoice's received funds. Sending the funds
/// back happens outside this service.
pub async fn refund_invoice_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<RefundRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = InvoiceId::parse(&path.into_inner())
        .map_err(|_| ApiError::NotFound("invoice not found"))?;
    let amount = Raw::from_xno(payload.amount).map_err(ApiError::validation)?;
    if amount.is_zero() {
        return Err(ApiError::Validation("amount must be greater than zero".into()));
    }

    let change = match state.storage().record_refund(&id, amount).await? {
        RefundOutcome::Applied(change) => change,
        RefundOutcome::NotFound => return Err(ApiError::NotFound("invoice not found")),
        RefundOutcome::NotRefundable(status) => {
            counter!("api_refunds_total", "result" => "not_refundable").increment(1);
            return Err(ApiError::Conflict(format!(
                "invoices with status {status} cannot be refunded"
            )));
        }
        RefundOutcome::ExceedsAvailable { available } => {
            counter!("api_refunds_total", "result" => "exceeds_available").increment(1);
            return Err(ApiError::Conflict(format!(
                "refund exceeds the {} XNO still available",
                available.to_xno()
            )));
        }
    };
    counter!("api_refunds_total", "result" => "applied").increment(1);
    info!(
        invoice = %id,
        amount = %amount,
        status = %change.invoice.status,
        "refund recorded"
    );

    let view = InvoiceView::new(&change.invoice).with_pay_url(state.site_url());
    if change.changed() {
        if let Some(event) = InvoiceEvent::for_current_status(change.invoice) {
            state.events().publish(event).await;
        }
    }
    Ok(HttpResponse::Ok().json(view))
}
