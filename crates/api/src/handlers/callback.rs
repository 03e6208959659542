use actix_web::{http::header, web, HttpRequest, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::{Position, Url};

use crate::auth::PkcePair;
use crate::state::AppState;

use super::{
    session::{code_verifier_cookie, removal_cookie, session_cookies, CODE_VERIFIER_COOKIE},
    ApiError,
};

const CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SignInQuery {
    pub provider: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackError {
    pub error: String,
}

/// Starts an OAuth sign-in: remembers a fresh PKCE verifier in a cookie and
/// sends the browser to the provider, which returns to `/auth/callback`.
pub async fn sign_in_handler(
    state: web::Data<AppState>,
    query: web::Query<SignInQuery>,
) -> Result<HttpResponse, ApiError> {
    let provider = match query.provider.as_deref() {
        None | Some("") => return Ok(sign_in_error("provider is missing")),
        Some(provider) if !is_provider_name(provider) => {
            return Ok(sign_in_error("provider is invalid"))
        }
        Some(provider) => provider,
    };

    let pkce = PkcePair::generate().map_err(|err| ApiError::Upstream(err.to_string()))?;
    let redirect_to = callback_url(state.site_url(), query.next.as_deref());
    let location = state
        .identity()
        .authorize_url(provider, &redirect_to, &pkce.challenge);
    counter!("api_auth_sign_ins_total", "result" => "redirected").increment(1);

    Ok(HttpResponse::TemporaryRedirect()
        .insert_header((header::LOCATION, location))
        .cookie(code_verifier_cookie(pkce.verifier))
        .finish())
}

pub async fn auth_callback_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, ApiError> {
    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        counter!("api_auth_callbacks_total", "result" => "missing_code").increment(1);
        return Ok(HttpResponse::BadRequest().json(CallbackError {
            error: "code is missing".into(),
        }));
    };

    let verifier = req
        .cookie(CODE_VERIFIER_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let session = state
        .identity()
        .exchange_code(code, verifier.as_deref())
        .await?;
    counter!("api_auth_callbacks_total", "result" => "exchanged").increment(1);
    info!(user = %session.user.id, "session established");

    let location = redirect_target(state.site_url(), query.next.as_deref());
    let mut response = HttpResponse::TemporaryRedirect();
    response.insert_header((header::LOCATION, location));
    for cookie in session_cookies(&session) {
        response.cookie(cookie);
    }
    if verifier.is_some() {
        response.cookie(removal_cookie(CODE_VERIFIER_COOKIE));
    }
    Ok(response.finish())
}

fn sign_in_error(message: &str) -> HttpResponse {
    counter!("api_auth_sign_ins_total", "result" => "rejected").increment(1);
    HttpResponse::BadRequest().json(CallbackError {
        error: message.to_owned(),
    })
}

fn is_provider_name(provider: &str) -> bool {
    provider.len() <= 32
        && provider
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Absolute callback URL carrying the on-site `next` target, if any.
pub fn callback_url(site_url: &str, next: Option<&str>) -> String {
    let target = redirect_target(site_url, next);
    let Ok(mut url) = Url::parse(site_url).and_then(|base| base.join(CALLBACK_PATH)) else {
        return format!("{site_url}{CALLBACK_PATH}");
    };
    if target != "/" {
        url.query_pairs_mut().append_pair("next", &target);
    }
    url.into()
}

/// Path (and query) to land on after sign-in. Anything that would leave the
/// site's origin falls back to `/`.
pub fn redirect_target(site_url: &str, next: Option<&str>) -> String {
    let fallback = || "/".to_owned();
    let Some(next) = next.filter(|next| !next.is_empty()) else {
        return fallback();
    };
    let Ok(base) = Url::parse(site_url) else {
        return fallback();
    };
    match base.join(next) {
        Ok(target) if target.origin() == base.origin() => target[Position::BeforePath..].to_owned(),
        _ => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::{callback_url, is_provider_name, redirect_target};

    #[test]
    fn callback_url_keeps_only_on_site_next() {
        assert_eq!(
            callback_url("https://pay.example.com", Some("/coffee/invoices")),
            "https://pay.example.com/auth/callback?next=%2Fcoffee%2Finvoices"
        );
        assert_eq!(
            callback_url("https://pay.example.com", Some("https://evil.example.com")),
            "https://pay.example.com/auth/callback"
        );
        assert_eq!(
            callback_url("https://pay.example.com", None),
            "https://pay.example.com/auth/callback"
        );
    }

    #[test]
    fn provider_names_are_slugs() {
        assert!(is_provider_name("github"));
        assert!(is_provider_name("azure-ad"));
        assert!(!is_provider_name("github&redirect_to=x"));
        assert!(!is_provider_name("GitHub"));
    }

    #[test]
    fn keeps_redirects_on_site() {
        let site = "https://nanopay.me";
        assert_eq!(redirect_target(site, None), "/");
        assert_eq!(redirect_target(site, Some("")), "/");
        assert_eq!(redirect_target(site, Some("/coffee?new=true")), "/coffee?new=true");
        assert_eq!(redirect_target(site, Some("services/new")), "/services/new");
        assert_eq!(redirect_target(site, Some("//evil.example.com/x")), "/");
        assert_eq!(redirect_target(site, Some("https://evil.example.com")), "/");
    }
}
