//! Merchant API authenticated with `Authorization: Bearer <api key>`.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use metrics::counter;
use tracing::{debug, info};

use nanopay_domain::model::{
    ApiKeySecret, InvoiceCreate, InvoiceEvent, InvoiceId, InvoiceRecord, InvoiceView, NewInvoice,
    ServiceId,
};
use nanopay_domain::services::abuse::AbuseSignal;
use nanopay_domain::storage::{ApiKeyStore, InvoiceStore};

use crate::state::AppState;

use super::ApiError;

pub const AUTHORIZATION_REQUIRED: &str = "Authorization header is required";
const INVALID_API_KEY: &str = "Invalid API key";

pub async fn get_invoice_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let service_id = authenticate_api_key(&req, &state).await?;
    let id = InvoiceId::parse(&path.into_inner())
        .map_err(|_| ApiError::NotFound("invoice not found"))?;
    let invoice = state
        .storage()
        .find_invoice_for_service(&id, &service_id)
        .await?
        .ok_or(ApiError::NotFound("invoice not found"))?;
    Ok(HttpResponse::Ok().json(InvoiceView::new(&invoice).with_pay_url(state.site_url())))
}

pub async fn create_invoice_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<InvoiceCreate>,
) -> Result<HttpResponse, ApiError> {
    let service_id = authenticate_api_key(&req, &state).await?;
    let invoice = create_invoice(&state, service_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(InvoiceView::new(&invoice).with_pay_url(state.site_url())))
}

/// Validates, allocates a pay address, persists and announces a new invoice.
pub async fn create_invoice(
    state: &AppState,
    service_id: ServiceId,
    request: InvoiceCreate,
) -> Result<InvoiceRecord, ApiError> {
    let valid = request.validate().inspect_err(|_| {
        counter!("api_invoices_created_total", "result" => "invalid").increment(1);
    })?;
    let pay_address = state.pay_addresses().allocate_pay_address().await?;
    let now = Utc::now();
    let invoice = state
        .storage()
        .insert_invoice(NewInvoice {
            id: InvoiceId::new_v4(),
            service_id,
            title: valid.title,
            description: valid.description,
            price: valid.price,
            recipient_address: valid.recipient_address.into_inner(),
            metadata: valid.metadata,
            redirect_url: valid.redirect_url,
            pay_address,
            expires_at: now + state.invoice_expiration(),
            created_at: now,
        })
        .await?;
    counter!("api_invoices_created_total", "result" => "created").increment(1);
    info!(invoice = %invoice.id, service = %service_id, "invoice created");
    state.events().publish(InvoiceEvent::created(invoice.clone())).await;
    Ok(invoice)
}

/// Resolves the bearer API key to its service, through the key cache.
pub async fn authenticate_api_key(
    req: &HttpRequest,
    state: &AppState,
) -> Result<ServiceId, ApiError> {
    let secret = bearer_token(req)
        .map(ApiKeySecret::from_bearer)
        .ok_or_else(|| ApiError::Unauthorized(AUTHORIZATION_REQUIRED.into()))?;
    let hash = secret.hash();
    if let Some(service_id) = state.api_keys().get(&hash) {
        return Ok(service_id);
    }

    let client = client_identifier(req, state.trusts_forwarded_headers());
    match state.storage().find_api_key_by_hash(&hash).await? {
        Some(key) => {
            state.api_keys().insert(&hash, key.service_id);
            state.abuse_tracker().reset(&client);
            Ok(key.service_id)
        }
        None => {
            if let AbuseSignal::Escalated { attempts } = state.abuse_tracker().record(&client) {
                counter!("api_auth_rejections_total", "reason" => "escalated").increment(1);
                debug!(client = %client, attempts, "rejecting repeated unknown api key");
            }
            Err(ApiError::Unauthorized(INVALID_API_KEY.into()))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// Socket peer IP, or the proxy-reported client when forwarded headers are
/// trusted. Untrusted headers are caller-controlled and never used as keys.
fn client_identifier(req: &HttpRequest, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(addr) = req.connection_info().realip_remote_addr() {
            return addr.to_owned();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}
