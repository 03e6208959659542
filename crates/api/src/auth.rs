//! Identity provider seam. Sessions are issued by a GoTrue-compatible auth
//! server; the API only exchanges codes, resolves users from access tokens
//! and flips registration metadata with the service role key.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use nanopay_domain::config::AuthProviderConfig;
use nanopay_domain::model::UserId;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata flag set once the user finished registration.
pub const CONFIRMED_REGISTRATION: &str = "confirmed_registration";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The provider refused the credential (expired token, bad code).
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Upstream(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Upstream(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl AuthUser {
    pub fn confirmed_registration(&self) -> bool {
        self.user_metadata
            .get(CONFIRMED_REGISTRATION)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Proof key for one sign-in: the verifier stays in a cookie, the S256
/// challenge goes to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Result<Self, getrandom::Error> {
        let mut bytes = [0u8; 32];
        getrandom::fill(&mut bytes)?;
        Ok(Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to sign in with `provider`; the provider
    /// comes back to `redirect_to` with a `code`.
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String;
    /// Trades an OAuth/magic-link `code` for a session.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError>;
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;
    /// Replaces the user's metadata; requires elevated credentials.
    async fn update_user_metadata(
        &self,
        user_id: &UserId,
        metadata: Map<String, Value>,
    ) -> Result<AuthUser, AuthError>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError>;
}

/// Client for a GoTrue-style REST API rooted at `AUTH_URL` (for example
/// `https://project.supabase.co/auth/v1`).
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl GoTrueClient {
    pub fn new(config: &AuthProviderConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(AUTH_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: config.base_url().to_owned(),
            anon_key: config.anon_key().to_owned(),
            service_role_key: config.service_role_key().to_owned(),
        })
    }

    fn request(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    async fn send<T>(&self, request: RequestBuilder) -> Result<T, AuthError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = error_message(&body).unwrap_or_else(|| status.to_string());
        if is_rejection(status) {
            Err(AuthError::Rejected(message))
        } else {
            Err(AuthError::Upstream(message))
        }
    }
}

#[derive(Serialize)]
struct PkceGrant<'a> {
    auth_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let base = format!("{}/authorize", self.base_url);
        match Url::parse_with_params(
            &base,
            [
                ("provider", provider),
                ("redirect_to", redirect_to),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "s256"),
            ],
        ) {
            Ok(url) => url.into(),
            Err(_) => base,
        }
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        let request = self
            .request(Method::POST, "/token?grant_type=pkce", &self.anon_key)
            .json(&PkceGrant {
                auth_code: code,
                code_verifier,
            });
        self.send(request).await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        self.send(self.request(Method::GET, "/user", access_token))
            .await
    }

    async fn update_user_metadata(
        &self,
        user_id: &UserId,
        metadata: Map<String, Value>,
    ) -> Result<AuthUser, AuthError> {
        let request = self
            .request(
                Method::PUT,
                &format!("/admin/users/{user_id}"),
                &self.service_role_key,
            )
            .json(&json!({ "user_metadata": metadata }));
        self.send(request).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let request = self
            .request(Method::POST, "/token?grant_type=refresh_token", &self.anon_key)
            .json(&json!({ "refresh_token": refresh_token }));
        self.send(request).await
    }
}

fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    )
}

/// GoTrue has used `msg`, `error_description` and `message` over time.
fn error_message(body: &Value) -> Option<String> {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}
