//! Dashboard invoice actions scoped to one of the user's services.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::Serialize;
use tracing::info;

use nanopay_domain::model::{
    InvoiceCreate, InvoiceEvent, InvoiceId, InvoicePagination, InvoiceStatus, InvoiceView,
};
use nanopay_domain::storage::InvoiceStore;

use crate::state::AppState;

use super::{
    invoices::create_invoice,
    session::{owned_service, require_user},
    ApiError,
};

const NOT_CANCELABLE: &str = "only pending invoices can be canceled";

#[derive(Debug, Serialize)]
pub struct InvoiceListResponse {
    pub invoices: Vec<InvoiceView>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

pub async fn create_invoice_action(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<InvoiceCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service_ref = path.into_inner();
    let service = owned_service(&state, &user, &service_ref).await?;
    let invoice = create_invoice(&state, service.id, payload.into_inner()).await?;
    Ok(HttpResponse::SeeOther()
        .insert_header((
            header::LOCATION,
            format!("/{service_ref}/invoices/{}", invoice.id),
        ))
        .finish())
}

pub async fn list_invoices_action(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<InvoicePagination>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service = owned_service(&state, &user, &path.into_inner()).await?;
    let page = query.validate()?;
    let (invoices, total) = state.storage().list_invoices(&service.id, page).await?;
    Ok(HttpResponse::Ok().json(InvoiceListResponse {
        invoices: invoices
            .iter()
            .map(|invoice| InvoiceView::new(invoice).with_pay_url(state.site_url()))
            .collect(),
        total,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn cancel_invoice_action(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let (service_ref, invoice_ref) = path.into_inner();
    let service = owned_service(&state, &user, &service_ref).await?;
    let id = InvoiceId::parse(&invoice_ref).map_err(|_| ApiError::NotFound("invoice not found"))?;
    let invoice = state
        .storage()
        .find_invoice_for_service(&id, &service.id)
        .await?
        .ok_or(ApiError::NotFound("invoice not found"))?;
    if !invoice.status.is_cancelable() {
        return Err(ApiError::Conflict(NOT_CANCELABLE.into()));
    }

    // The watcher may have moved the invoice since it was loaded.
    let change = state
        .storage()
        .transition_status(&id, &[InvoiceStatus::Pending], InvoiceStatus::Canceled)
        .await?
        .ok_or_else(|| ApiError::Conflict(NOT_CANCELABLE.into()))?;
    counter!("api_invoices_canceled_total").increment(1);
    info!(invoice = %id, service = %service.id, "invoice canceled");

    let view = InvoiceView::new(&change.invoice).with_pay_url(state.site_url());
    if let Some(event) = InvoiceEvent::for_current_status(change.invoice) {
        state.events().publish(event).await;
    }
    Ok(HttpResponse::Ok().json(view))
}
