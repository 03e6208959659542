//! Dashboard service actions (session-authenticated).

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::Utc;
use metrics::counter;
use tracing::info;

use nanopay_domain::model::{user_services_tag, NewService, ServiceCreate, ServiceId};
use nanopay_domain::storage::{ServiceStore, StorageError};

use crate::state::AppState;

use super::{session::require_user, ApiError};

pub async fn create_service_action(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<ServiceCreate>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let request = payload.into_inner();
    request.validate()?;

    let service = state
        .storage()
        .insert_service(NewService {
            id: ServiceId::new_v4(),
            user_id: user.id,
            name: request.name.clone(),
            display_name: request.name,
            avatar_url: request.avatar_url,
            created_at: Utc::now(),
        })
        .await
        .map_err(|err| match err {
            StorageError::Duplicate(_) => ApiError::Conflict("service name already taken".into()),
            other => other.into(),
        })?;

    state.services().revalidate(&user_services_tag(&user.id));
    counter!("api_services_created_total").increment(1);
    info!(service = %service.id, user = %user.id, "service created");

    Ok(HttpResponse::SeeOther()
        .insert_header((header::LOCATION, format!("/{}?new=true", service.name)))
        .finish())
}

pub async fn list_services_action(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let user = require_user(&req, &state).await?;
    let tag = user_services_tag(&user.id);
    let services = match state.services().get(&tag) {
        Some(services) => services,
        None => {
            let services = state.storage().list_services_for_user(&user.id).await?;
            state.services().insert(tag, services)
        }
    };
    Ok(HttpResponse::Ok().json(services.as_ref()))
}
