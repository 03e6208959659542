use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use nanopay_domain::model::{ApiKeyCreate, ApiKeyId, ApiKeyRecord, ApiKeySecret, NewApiKey};
use nanopay_domain::storage::ApiKeyStore;

use crate::state::AppState;

use super::{
    session::{owned_service, require_user},
    ApiError,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeySummary {
    pub id: ApiKeyId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyRecord> for ApiKeySummary {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            created_at: record.created_at,
        }
    }
}

/// Returned once at creation; the plaintext `key` is never stored.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub summary: ApiKeySummary,
    pub key: String,
}

pub async fn list_api_keys_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service = owned_service(&state, &user, &path.into_inner()).await?;
    let keys: Vec<ApiKeySummary> = state
        .storage()
        .list_api_keys(&service.id)
        .await?
        .into_iter()
        .map(ApiKeySummary::from)
        .collect();
    Ok(HttpResponse::Ok().json(keys))
}

pub async fn create_api_key_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<ApiKeyCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let service = owned_service(&state, &user, &path.into_inner()).await?;
    let request = payload.into_inner();
    request.validate()?;

    let secret = ApiKeySecret::generate()
        .map_err(|err| ApiError::Upstream(format!("failed to generate api key: {err}")))?;
    let record = state
        .storage()
        .insert_api_key(NewApiKey {
            id: ApiKeyId::new_v4(),
            service_id: service.id,
            name: request.name,
            description: request.description.unwrap_or_default(),
            key_hash: secret.hash(),
            created_at: Utc::now(),
        })
        .await?;
    counter!("api_keys_total", "action" => "created").increment(1);
    info!(key = %record.id, service = %service.id, "api key created");

    Ok(HttpResponse::Created().json(CreatedApiKey {
        summary: record.into(),
        key: secret.into_inner(),
    }))
}

pub async fn delete_api_key_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let (service_ref, key_ref) = path.into_inner();
    let service = owned_service(&state, &user, &service_ref).await?;
    let id = ApiKeyId::parse(&key_ref).map_err(|_| ApiError::NotFound("api key not found"))?;
    let removed = state
        .storage()
        .delete_api_key(&id, &service.id)
        .await?
        .ok_or(ApiError::NotFound("api key not found"))?;
    state.api_keys().invalidate(&removed.key_hash);
    counter!("api_keys_total", "action" => "deleted").increment(1);
    info!(key = %removed.id, service = %service.id, "api key deleted");
    Ok(HttpResponse::NoContent().finish())
}
