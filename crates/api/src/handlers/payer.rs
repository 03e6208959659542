use actix_web::{web, HttpResponse};

use nanopay_domain::model::{InvoiceId, PublicInvoiceView, ServiceRef};
use nanopay_domain::storage::{InvoiceStore, ServiceStore};

use crate::state::AppState;

use super::ApiError;

/// Hosted payment page data; no credentials required.
pub async fn public_invoice_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = InvoiceId::parse(&path.into_inner())
        .map_err(|_| ApiError::NotFound("invoice not found"))?;
    let invoice = state
        .storage()
        .find_invoice(&id)
        .await?
        .ok_or(ApiError::NotFound("invoice not found"))?;
    let service = state
        .storage()
        .find_service(&ServiceRef::Id(invoice.service_id))
        .await?
        .ok_or(ApiError::NotFound("invoice not found"))?;
    Ok(HttpResponse::Ok().json(PublicInvoiceView::new(&invoice, &service)))
}
