use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use nanopay_domain::model::{ProfileCreate, ProfileRecord};
use nanopay_domain::storage::ProfileStore;

use crate::auth::CONFIRMED_REGISTRATION;
use crate::state::AppState;

use super::{
    session::{require_user, session_cookies, REFRESH_TOKEN_COOKIE},
    ApiError,
};

const ALREADY_CONFIRMED: &str = "User already confirmed registration";

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
}

/// Completes sign-up: stores the profile and marks the identity as
/// registered so the dashboard stops sending the user to onboarding.
pub async fn register_user_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<ProfileCreate>,
) -> Result<HttpResponse, ApiError> {
    let profile = payload.into_inner();
    profile.validate()?;

    let user = require_user(&req, &state).await?;
    if user.confirmed_registration() {
        counter!("api_registrations_total", "result" => "already_confirmed").increment(1);
        return Err(ApiError::Validation(ALREADY_CONFIRMED.into()));
    }

    state
        .storage()
        .insert_profile(ProfileRecord {
            user_id: user.id,
            name: profile.name,
            email: profile.email,
            avatar_url: profile.avatar_url,
            created_at: Utc::now(),
        })
        .await?;

    let mut metadata = user.user_metadata.clone();
    metadata.insert(CONFIRMED_REGISTRATION.into(), Value::Bool(true));
    state
        .identity()
        .update_user_metadata(&user.id, metadata)
        .await?;
    counter!("api_registrations_total", "result" => "confirmed").increment(1);
    info!(user = %user.id, "registration confirmed");

    let mut response = HttpResponse::Ok();
    // Reissue the session so its claims carry the new metadata.
    if let Some(refresh_token) = req.cookie(REFRESH_TOKEN_COOKIE) {
        match state.identity().refresh_session(refresh_token.value()).await {
            Ok(session) => {
                for cookie in session_cookies(&session) {
                    response.cookie(cookie);
                }
            }
            Err(err) => warn!(user = %user.id, error = %err, "session refresh failed"),
        }
    }
    Ok(response.json(RegisterResponse { success: true }))
}
