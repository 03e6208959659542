use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use actix_web::{
    cookie::Cookie,
    http::{header, StatusCode},
    test, web, App,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Map, Value};

use nanopay_domain::model::{
    ApiKeyId, ApiKeySecret, InvoiceEvent, InvoiceId, InvoiceRecord, InvoiceStatus, NewApiKey,
    NewInvoice, NewPayment, NewService, Raw, ServiceId, ServiceRecord, UserId, WebhookEventType,
};
use nanopay_domain::services::{
    events::{InvoiceEventSink, PayAddressError, PayAddressSource},
    telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard},
};
use nanopay_domain::{ApiKeyStore, InvoiceStore, ProfileStore, ServiceStore};
use nanopay_storage::SeaOrmStorage;

use crate::application::{configure_internal, configure_public};
use crate::auth::{AuthError, AuthUser, IdentityProvider, PkcePair, Session};
use crate::handlers::session::{ACCESS_TOKEN_COOKIE, CODE_VERIFIER_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::state::{AppState, Upstreams};

const RECIPIENT: &str = "nano_3t6k35gi95xu6tergt6p69ck76ogmitsa8mnijtpxm9fkcm736xtoncuohr3";
const PAY_ADDRESS: &str = "nano_1pay11111111111111111111111111111111111111111111111111111111";
const VALID_CODE: &str = "valid-code";

/// Identity provider keyed by access token. Refresh tokens equal access
/// tokens so a refreshed session resolves to the same user.
#[derive(Default)]
struct FakeIdentity {
    users: Mutex<HashMap<String, AuthUser>>,
    challenges: Mutex<Vec<String>>,
}

impl FakeIdentity {
    fn sign_in(&self, token: &str) -> AuthUser {
        let user = AuthUser {
            id: UserId::new_v4(),
            email: Some("merchant@example.com".into()),
            user_metadata: Map::new(),
        };
        self.users
            .lock()
            .unwrap()
            .insert(token.to_owned(), user.clone());
        user
    }

    fn session_for(&self, token: &str) -> Option<Session> {
        let user = self.users.lock().unwrap().get(token).cloned()?;
        Some(Session {
            access_token: token.to_owned(),
            refresh_token: token.to_owned(),
            expires_in: Some(3600),
            user,
        })
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorize_url(&self, provider: &str, _redirect_to: &str, code_challenge: &str) -> String {
        self.challenges
            .lock()
            .unwrap()
            .push(code_challenge.to_owned());
        format!("https://auth.test/authorize?provider={provider}&code_challenge={code_challenge}")
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        if code != VALID_CODE {
            return Err(AuthError::Rejected("invalid flow state".into()));
        }
        if let Some(verifier) = code_verifier {
            let challenge = PkcePair::from_verifier(verifier.to_owned()).challenge;
            if !self.challenges.lock().unwrap().contains(&challenge) {
                return Err(AuthError::Rejected("code challenge does not match".into()));
            }
        }
        self.sign_in("access-from-code");
        self.session_for("access-from-code")
            .ok_or_else(|| AuthError::Upstream("session vanished".into()))
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        self.users
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| AuthError::Rejected("invalid JWT".into()))
    }

    async fn update_user_metadata(
        &self,
        user_id: &UserId,
        metadata: Map<String, Value>,
    ) -> Result<AuthUser, AuthError> {
        let mut users = self.users.lock().unwrap();
        let mut updated = None;
        for user in users.values_mut().filter(|user| user.id == *user_id) {
            user.user_metadata = metadata.clone();
            updated = Some(user.clone());
        }
        updated.ok_or_else(|| AuthError::Upstream("user not found".into()))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        self.session_for(refresh_token)
            .ok_or_else(|| AuthError::Rejected("invalid refresh token".into()))
    }
}

struct FixedPayAddress;

#[async_trait]
impl PayAddressSource for FixedPayAddress {
    async fn allocate_pay_address(&self) -> Result<String, PayAddressError> {
        Ok(PAY_ADDRESS.into())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<InvoiceEvent>>,
}

impl RecordingSink {
    fn types(&self) -> Vec<WebhookEventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.event_type)
            .collect()
    }
}

#[async_trait]
impl InvoiceEventSink for RecordingSink {
    async fn publish(&self, event: InvoiceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct Harness {
    state: AppState,
    storage: SeaOrmStorage,
    identity: Arc<FakeIdentity>,
    events: Arc<RecordingSink>,
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

async fn harness() -> Harness {
    let storage = SeaOrmStorage::connect("sqlite::memory:")
        .await
        .expect("storage inits");
    let identity = Arc::new(FakeIdentity::default());
    let events = Arc::new(RecordingSink::default());
    let upstreams = Upstreams {
        identity: identity.clone(),
        pay_addresses: Arc::new(FixedPayAddress),
        events: events.clone(),
    };
    let state = AppState::new(storage.clone(), telemetry(), upstreams)
        .with_site_url("https://pay.example.com");
    Harness {
        state,
        storage,
        identity,
        events,
    }
}

macro_rules! public_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_public),
        )
        .await
    };
}

macro_rules! internal_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_internal),
        )
        .await
    };
}

async fn insert_service(storage: &SeaOrmStorage, user_id: UserId, name: &str) -> ServiceRecord {
    storage
        .insert_service(NewService {
            id: ServiceId::new_v4(),
            user_id,
            name: name.into(),
            display_name: name.into(),
            avatar_url: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
}

async fn insert_api_key(storage: &SeaOrmStorage, service_id: ServiceId) -> String {
    let secret = ApiKeySecret::generate().unwrap();
    storage
        .insert_api_key(NewApiKey {
            id: ApiKeyId::new_v4(),
            service_id,
            name: "ci".into(),
            description: String::new(),
            key_hash: secret.hash(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    secret.into_inner()
}

async fn insert_invoice(storage: &SeaOrmStorage, service_id: ServiceId, price: Raw) -> InvoiceRecord {
    let now = Utc::now();
    storage
        .insert_invoice(NewInvoice {
            id: InvoiceId::new_v4(),
            service_id,
            title: "Coffee".into(),
            description: None,
            price,
            recipient_address: RECIPIENT.into(),
            metadata: Some(Map::from_iter([("order".to_owned(), json!(42))])),
            redirect_url: Some("https://shop.example.com/thanks".into()),
            pay_address: PAY_ADDRESS.into(),
            expires_at: now + ChronoDuration::minutes(10),
            created_at: now,
        })
        .await
        .unwrap()
}

fn invoice_body() -> Value {
    json!({
        "title": "Coffee",
        "price": 1.5,
        "recipient_address": RECIPIENT,
    })
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::new(ACCESS_TOKEN_COOKIE, token.to_owned())
}

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_owned()
}

#[actix_web::test]
async fn invoice_lookup_requires_authorization_header() {
    let h = harness().await;
    let app = public_app!(h.state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/invoices/x").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "message": "Authorization header is required" }));
}

#[actix_web::test]
async fn unknown_api_key_is_unauthorized() {
    let h = harness().await;
    let app = public_app!(h.state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/invoices/{}", InvoiceId::new_v4()))
            .insert_header((header::AUTHORIZATION, "Bearer npk_unknown"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn rotating_forwarded_for_does_not_add_tracked_peers() {
    let h = harness().await;
    let app = public_app!(h.state);

    for attempt in 0..20 {
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/api/invoices/{}", InvoiceId::new_v4()))
                .peer_addr("10.9.8.7:40000".parse().unwrap())
                .insert_header(("x-forwarded-for", format!("198.51.100.{attempt}")))
                .insert_header((header::AUTHORIZATION, "Bearer npk_unknown"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    assert_eq!(h.state.abuse_tracker().tracked(), 1);
}

#[actix_web::test]
async fn invoice_lookup_is_scoped_to_the_key_service() {
    let h = harness().await;
    let owner = UserId::new_v4();
    let mine = insert_service(&h.storage, owner, "mine").await;
    let theirs = insert_service(&h.storage, owner, "theirs").await;
    let key = insert_api_key(&h.storage, mine.id).await;
    let foreign = insert_invoice(&h.storage, theirs.id, Raw::from_xno(1.0).unwrap()).await;
    let own = insert_invoice(&h.storage, mine.id, Raw::from_xno(1.0).unwrap()).await;
    let app = public_app!(h.state);

    for uri in [
        format!("/api/invoices/{}", foreign.id),
        format!("/api/invoices/{}", InvoiceId::new_v4()),
        "/api/invoices/not-a-uuid".to_owned(),
    ] {
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&uri)
                .insert_header((header::AUTHORIZATION, format!("Bearer {key}")))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "invoice not found");
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/invoices/{}", own.id))
            .insert_header((header::AUTHORIZATION, format!("Bearer {key}")))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["currency"], "XNO");
    assert_eq!(body["price"], 1.0);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["metadata"]["order"], 42);
    assert_eq!(
        body["pay_url"],
        format!("https://pay.example.com/invoices/{}", own.id)
    );
}

#[actix_web::test]
async fn api_creates_invoices_and_announces_them() {
    let h = harness().await;
    let service = insert_service(&h.storage, UserId::new_v4(), "coffee").await;
    let key = insert_api_key(&h.storage, service.id).await;
    let app = public_app!(h.state);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/invoices")
            .insert_header((header::AUTHORIZATION, format!("Bearer {key}")))
            .set_json(invoice_body())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["pay_address"], PAY_ADDRESS);
    assert_eq!(body["status"], "pending");
    assert_eq!(h.events.types(), vec![WebhookEventType::InvoiceCreated]);

    let id = InvoiceId::parse(body["id"].as_str().unwrap()).unwrap();
    let stored = h.storage.find_invoice(&id).await.unwrap().unwrap();
    assert_eq!(stored.service_id, service.id);
    assert_eq!(stored.price, Raw::from_xno(1.5).unwrap());
    assert!(stored.expires_at > stored.created_at);
}

#[actix_web::test]
async fn invoice_create_rejects_invalid_payloads() {
    let h = harness().await;
    let service = insert_service(&h.storage, UserId::new_v4(), "coffee").await;
    let key = insert_api_key(&h.storage, service.id).await;
    let app = public_app!(h.state);

    let mut below_minimum = invoice_body();
    below_minimum["price"] = json!(0.000001);
    let mut bad_recipient = invoice_body();
    bad_recipient["recipient_address"] = json!("nano_123");
    let mut unknown_field = invoice_body();
    unknown_field["tip"] = json!(1);

    for payload in [below_minimum, bad_recipient, unknown_field] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/invoices")
                .insert_header((header::AUTHORIZATION, format!("Bearer {key}")))
                .set_json(&payload)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{payload}");
        let body: Value = test::read_body_json(resp).await;
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
    assert!(h.events.types().is_empty());
}

#[actix_web::test]
async fn callback_requires_code() {
    let h = harness().await;
    let app = public_app!(h.state);
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/auth/callback").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "code is missing" }));
}

#[actix_web::test]
async fn callback_sets_session_and_redirects_on_site() {
    let h = harness().await;
    let app = public_app!(h.state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=valid-code&next=/coffee")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&resp), "/coffee");
    let access = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == ACCESS_TOKEN_COOKIE)
        .expect("access cookie");
    assert_eq!(access.value(), "access-from-code");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=valid-code&next=https://evil.example.com")
            .to_request(),
    )
    .await;
    assert_eq!(location(&resp), "/");

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=stale")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn sign_in_round_trips_the_code_verifier() {
    let h = harness().await;
    let app = public_app!(h.state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/auth/login").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "provider is missing" }));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/login?provider=github&next=/coffee")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let verifier = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == CODE_VERIFIER_COOKIE)
        .expect("verifier cookie")
        .value()
        .to_owned();
    let challenge = PkcePair::from_verifier(verifier.clone()).challenge;
    assert_eq!(
        location(&resp),
        format!("https://auth.test/authorize?provider=github&code_challenge={challenge}")
    );

    let forged = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=valid-code")
            .cookie(Cookie::new(CODE_VERIFIER_COOKIE, "forged"))
            .to_request(),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/callback?code=valid-code&next=/coffee")
            .cookie(Cookie::new(CODE_VERIFIER_COOKIE, verifier))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let cleared = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == CODE_VERIFIER_COOKIE)
        .expect("verifier removal");
    assert_eq!(cleared.value(), "");
}

#[actix_web::test]
async fn registration_confirms_once() {
    let h = harness().await;
    let user = h.identity.sign_in("token-a");
    let app = public_app!(h.state);
    let profile = json!({
        "email": "merchant@example.com",
        "name": "Merchant",
        "avatar_url": "https://example.com/avatar.png",
    });

    let anonymous = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users/register")
            .set_json(&profile)
            .to_request(),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let invalid = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users/register")
            .cookie(session_cookie("token-a"))
            .set_json(json!({ "email": "nope", "name": "M", "avatar_url": "x" }))
            .to_request(),
    )
    .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let first = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users/register")
            .cookie(session_cookie("token-a"))
            .cookie(Cookie::new(REFRESH_TOKEN_COOKIE, "token-a"))
            .set_json(&profile)
            .to_request(),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first
        .response()
        .cookies()
        .any(|cookie| cookie.name() == ACCESS_TOKEN_COOKIE));
    let body: Value = test::read_body_json(first).await;
    assert_eq!(body, json!({ "success": true }));

    let stored = h.storage.find_profile(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Merchant");

    let second = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/users/register")
            .cookie(session_cookie("token-a"))
            .set_json(&profile)
            .to_request(),
    )
    .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(second).await;
    assert_eq!(body["message"], "User already confirmed registration");
}

#[actix_web::test]
async fn service_actions_create_and_list() {
    let h = harness().await;
    h.identity.sign_in("token-a");
    let app = public_app!(h.state);

    let empty = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/actions/services")
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    let listed: Value = test::read_body_json(empty).await;
    assert_eq!(listed, json!([]));

    let created = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/actions/services")
            .cookie(session_cookie("token-a"))
            .set_json(json!({ "name": "coffee" }))
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&created), "/coffee?new=true");

    // The create revalidated the cached (empty) list.
    let listed = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/actions/services")
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    let listed: Value = test::read_body_json(listed).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "coffee");
    assert_eq!(listed[0]["display_name"], "coffee");

    for (payload, status) in [
        (json!({ "name": "coffee" }), StatusCode::CONFLICT),
        (json!({ "name": "api" }), StatusCode::BAD_REQUEST),
        (json!({ "name": "Coffee Shop" }), StatusCode::BAD_REQUEST),
    ] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/actions/services")
                .cookie(session_cookie("token-a"))
                .set_json(&payload)
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), status, "{payload}");
    }

    let anonymous = test::call_service(
        &app,
        test::TestRequest::get().uri("/actions/services").to_request(),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn dashboard_invoice_actions() {
    let h = harness().await;
    let user = h.identity.sign_in("token-a");
    h.identity.sign_in("token-b");
    let service = insert_service(&h.storage, user.id, "coffee").await;
    let app = public_app!(h.state);

    let created = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/actions/services/coffee/invoices")
            .cookie(session_cookie("token-a"))
            .set_json(invoice_body())
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    let target = location(&created);
    let id = target
        .strip_prefix("/coffee/invoices/")
        .and_then(|id| InvoiceId::parse(id).ok())
        .expect("redirect names the invoice");
    insert_invoice(&h.storage, service.id, Raw::from_xno(2.0).unwrap()).await;

    let listed = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/actions/services/{}/invoices?limit=1&order=asc", service.id))
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    let page: Value = test::read_body_json(listed).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["invoices"].as_array().unwrap().len(), 1);
    assert_eq!(page["invoices"][0]["id"], id.to_string());

    for uri in [
        "/actions/services/coffee/invoices?limit=21",
        "/actions/services/coffee/invoices?order=sideways",
    ] {
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(uri)
                .cookie(session_cookie("token-a"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    let foreign = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/actions/services/coffee/invoices")
            .cookie(session_cookie("token-b"))
            .to_request(),
    )
    .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let cancel_uri = format!("/actions/services/coffee/invoices/{id}/cancel");
    let canceled = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&cancel_uri)
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(canceled.status(), StatusCode::OK);
    let body: Value = test::read_body_json(canceled).await;
    assert_eq!(body["status"], "canceled");

    let again = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&cancel_uri)
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(
        h.events.types(),
        vec![
            WebhookEventType::InvoiceCreated,
            WebhookEventType::InvoiceCanceled
        ]
    );
}

#[actix_web::test]
async fn deleted_api_keys_stop_working() {
    let h = harness().await;
    let user = h.identity.sign_in("token-a");
    let service = insert_service(&h.storage, user.id, "coffee").await;
    let invoice = insert_invoice(&h.storage, service.id, Raw::from_xno(1.0).unwrap()).await;
    let app = public_app!(h.state);

    let created = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/actions/services/coffee/api-keys")
            .cookie(session_cookie("token-a"))
            .set_json(json!({ "name": "backend" }))
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(created).await;
    let key = created["key"].as_str().unwrap().to_owned();
    let key_id = created["id"].as_str().unwrap().to_owned();

    let lookup = || {
        test::TestRequest::get()
            .uri(&format!("/api/invoices/{}", invoice.id))
            .insert_header((header::AUTHORIZATION, format!("Bearer {key}")))
            .to_request()
    };
    assert_eq!(test::call_service(&app, lookup()).await.status(), StatusCode::OK);

    let listed = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/actions/services/coffee/api-keys")
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    let listed: Value = test::read_body_json(listed).await;
    assert_eq!(listed[0]["name"], "backend");
    assert!(listed[0].get("key").is_none());

    let deleted = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&format!("/actions/services/coffee/api-keys/{key_id}"))
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        test::call_service(&app, lookup()).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn webhook_actions_round_trip() {
    let h = harness().await;
    let user = h.identity.sign_in("token-a");
    insert_service(&h.storage, user.id, "coffee").await;
    let app = public_app!(h.state);

    let created = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/actions/services/coffee/webhooks")
            .cookie(session_cookie("token-a"))
            .set_json(json!({
                "name": "orders",
                "url": "https://shop.example.com/hooks",
                "event_types": ["invoice.paid", "invoice.paid", "invoice.expired"],
            }))
            .to_request(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let hook: Value = test::read_body_json(created).await;
    assert_eq!(hook["event_types"], json!(["invoice.paid", "invoice.expired"]));
    assert_eq!(hook["active"], true);

    let rejected = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/actions/services/coffee/webhooks")
            .cookie(session_cookie("token-a"))
            .set_json(json!({ "name": "orders", "url": "ftp://x", "event_types": ["invoice.paid"] }))
            .to_request(),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let uri = format!(
        "/actions/services/coffee/webhooks/{}",
        hook["id"].as_str().unwrap()
    );
    let deleted = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&uri)
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri(&uri)
            .cookie(session_cookie("token-a"))
            .to_request(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn payer_view_hides_merchant_fields() {
    let h = harness().await;
    let service = insert_service(&h.storage, UserId::new_v4(), "coffee").await;
    let invoice = insert_invoice(&h.storage, service.id, Raw::from_xno(1.0).unwrap()).await;
    let app = public_app!(h.state);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/invoices/{}", invoice.id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body.get("metadata").is_none());
    assert!(body.get("recipient_address").is_none());
    assert_eq!(body["has_redirect_url"], true);
    assert_eq!(body["service"]["name"], "coffee");

    let missing = test::call_service(
        &app,
        test::TestRequest::get().uri("/invoices/nope").to_request(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn refunds_are_internal_and_bounded() {
    let h = harness().await;
    let service = insert_service(&h.storage, UserId::new_v4(), "coffee").await;
    let price = Raw::from_xno(1.0).unwrap();
    let invoice = insert_invoice(&h.storage, service.id, price).await;
    h.storage
        .record_payment(NewPayment {
            invoice_id: invoice.id,
            from: RECIPIENT.into(),
            to: PAY_ADDRESS.into(),
            hash: "HASH1".into(),
            amount: price,
            timestamp: Utc::now(),
        })
        .await
        .unwrap()
        .expect("payment recorded");

    let uri = format!("/internal/invoices/{}/refunds", invoice.id);
    let public = public_app!(h.state);
    let resp = test::call_service(
        &public,
        test::TestRequest::post()
            .uri(&uri)
            .set_json(json!({ "amount": 0.4 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let internal = internal_app!(h.state);
    let partial = test::call_service(
        &internal,
        test::TestRequest::post()
            .uri(&uri)
            .set_json(json!({ "amount": 0.4 }))
            .to_request(),
    )
    .await;
    assert_eq!(partial.status(), StatusCode::OK);
    let body: Value = test::read_body_json(partial).await;
    assert_eq!(body["status"], "refunded_partial");
    let refunded = body["refunded_amount"].as_f64().unwrap();
    assert!((refunded - 0.4).abs() < 1e-9);

    let excessive = test::call_service(
        &internal,
        test::TestRequest::post()
            .uri(&uri)
            .set_json(json!({ "amount": 0.7 }))
            .to_request(),
    )
    .await;
    assert_eq!(excessive.status(), StatusCode::CONFLICT);

    let rest = test::call_service(
        &internal,
        test::TestRequest::post()
            .uri(&uri)
            .set_json(json!({ "amount": 0.6 }))
            .to_request(),
    )
    .await;
    assert_eq!(rest.status(), StatusCode::OK);
    let stored = h.storage.find_invoice(&invoice.id).await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Refunded);
    assert_eq!(stored.refunded_amount, stored.received_amount);
    assert_eq!(
        h.events.types(),
        vec![
            WebhookEventType::InvoiceRefundedPartial,
            WebhookEventType::InvoiceRefunded
        ]
    );
}

#[actix_web::test]
async fn metrics_are_served_as_prometheus_text() {
    let h = harness().await;
    let app = internal_app!(h.state);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap(),
        "text/plain; version=0.0.4"
    );
}
