//! Cookie-backed dashboard sessions.

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    HttpRequest,
};
use nanopay_domain::model::{ServiceRecord, ServiceRef};
use nanopay_domain::storage::ServiceStore;

use crate::auth::{AuthUser, Session};
use crate::state::AppState;

use super::ApiError;

pub const ACCESS_TOKEN_COOKIE: &str = "nanopay-access-token";
pub const REFRESH_TOKEN_COOKIE: &str = "nanopay-refresh-token";
pub const CODE_VERIFIER_COOKIE: &str = "nanopay-code-verifier";

const REFRESH_TOKEN_MAX_AGE_DAYS: i64 = 30;
const CODE_VERIFIER_MAX_AGE_MINUTES: i64 = 10;

/// Resolves the signed-in user from the access token cookie.
pub async fn require_user(req: &HttpRequest, state: &AppState) -> Result<AuthUser, ApiError> {
    let token = req
        .cookie(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".into()))?;
    Ok(state.identity().get_user(&token).await?)
}

/// Loads a service by name or id, hiding services the user does not own.
pub async fn owned_service(
    state: &AppState,
    user: &AuthUser,
    service: &str,
) -> Result<ServiceRecord, ApiError> {
    state
        .storage()
        .find_service(&ServiceRef::parse(service))
        .await?
        .filter(|record| record.user_id == user.id)
        .ok_or(ApiError::NotFound("service not found"))
}

pub fn session_cookies(session: &Session) -> [Cookie<'static>; 2] {
    let mut access = auth_cookie(ACCESS_TOKEN_COOKIE, session.access_token.clone());
    if let Some(expires_in) = session.expires_in {
        access.set_max_age(CookieDuration::seconds(expires_in as i64));
    }
    let mut refresh = auth_cookie(REFRESH_TOKEN_COOKIE, session.refresh_token.clone());
    refresh.set_max_age(CookieDuration::days(REFRESH_TOKEN_MAX_AGE_DAYS));
    [access, refresh]
}

/// Holds the PKCE verifier between `/auth/login` and `/auth/callback`.
pub fn code_verifier_cookie(verifier: String) -> Cookie<'static> {
    let mut cookie = auth_cookie(CODE_VERIFIER_COOKIE, verifier);
    cookie.set_max_age(CookieDuration::minutes(CODE_VERIFIER_MAX_AGE_MINUTES));
    cookie
}

/// Expired cookie that makes the browser drop `name`.
pub fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = auth_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

fn auth_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .finish()
}
