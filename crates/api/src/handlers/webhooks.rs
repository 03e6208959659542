use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use metrics::counter;
use tracing::info;

use nanopay_domain::model::{NewWebhook, WebhookCreate, WebhookId};
use nanopay_domain::storage::WebhookStore;

use crate::state::AppState;

use super::{
    session::{owned_service, require_user},
    ApiError,
};

pub async fn list_webhooks_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service = owned_service(&state, &user, &path.into_inner()).await?;
    let hooks = state.storage().list_webhooks(&service.id).await?;
    Ok(HttpResponse::Ok().json(hooks))
}

pub async fn create_webhook_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<WebhookCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service = owned_service(&state, &user, &path.into_inner()).await?;
    let request = payload.into_inner();
    request.validate()?;

    let event_types = request.distinct_event_types();
    let hook = state
        .storage()
        .insert_webhook(NewWebhook {
            id: WebhookId::new_v4(),
            service_id: service.id,
            name: request.name,
            url: request.url,
            active: request.active,
            event_types,
            created_at: Utc::now(),
        })
        .await?;
    counter!("api_webhooks_total", "action" => "created").increment(1);
    info!(webhook = %hook.id, service = %service.id, "webhook created");
    Ok(HttpResponse::Created().json(hook))
}

pub async fn delete_webhook_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let (service_ref, hook_ref) = path.into_inner();
    let service = owned_service(&state, &user, &service_ref).await?;
    let id = WebhookId::parse(&hook_ref).map_err(|_| ApiError::NotFound("webhook not found"))?;
    state
        .storage()
        .delete_webhook(&id, &service.id)
        .await?
        .ok_or(ApiError::NotFound("webhook not found"))?;
    counter!("api_webhooks_total", "action" => "deleted").increment(1);
    Ok(HttpResponse::NoContent().finish())
}
