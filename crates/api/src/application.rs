use std::sync::Arc;

#[cfg(unix)]
use std::{fs, path::Path};

use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::info;

use nanopay_domain::config::{ApiConfig, ConfigError};
use nanopay_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use nanopay_storage::SeaOrmStorage;
use nanopay_watcher::{NodeRpcClient, RpcError, WebhookDispatcher};
use thiserror::Error;

use crate::{
    auth::{AuthError, GoTrueClient},
    handlers::{
        auth_callback_handler, cancel_invoice_action, create_api_key_handler,
        create_invoice_action, create_invoice_handler, create_service_action,
        create_webhook_handler, delete_api_key_handler, delete_webhook_handler,
        get_invoice_handler, json_error_handler, list_api_keys_handler, list_invoices_action,
        list_services_action, list_webhooks_handler, metrics_handler, public_invoice_handler,
        query_error_handler, refund_invoice_handler, register_user_handler, sign_in_handler,
    },
    state::{AppState, Upstreams},
};

pub async fn run() -> Result<(), BootstrapError> {
    // 1. Configuration
    let config = ApiConfig::load_from_env()?;

    // 2. Telemetry
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    // 3. Storage
    let storage = SeaOrmStorage::connect(config.database_url()).await?;

    // 4. Upstreams: node wallet, webhook delivery, identity provider
    let node = NodeRpcClient::new(config.nano_rpc_url())?.with_wallet(config.nano_wallet_id());
    let dispatcher = WebhookDispatcher::new(storage.clone(), config.webhook_timeout())
        .map_err(|err| BootstrapError::Http(err.to_string()))?
        .with_site_url(config.site_url());
    let identity = GoTrueClient::new(config.auth())?;
    let upstreams = Upstreams {
        identity: Arc::new(identity),
        pay_addresses: Arc::new(node),
        events: Arc::new(dispatcher),
    };

    // 5. Shared state
    let state = AppState::new(storage, telemetry, upstreams)
        .with_site_url(config.site_url())
        .with_invoice_expiration(config.invoice_expiration())
        .with_trusted_proxy(config.trust_forwarded_headers());

    let include_metrics_on_public = !config.has_internal_listener();
    let public_state = state.clone();

    // 6. Public server
    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(configure_public);

        if include_metrics_on_public {
            app = app.route("/metrics", web::get().to(metrics_handler));
        }

        app
    });

    #[cfg(unix)]
    {
        if let Some(socket) = config.api_unix_socket() {
            cleanup_socket(socket)?;
            public_server = public_server.bind_uds(socket)?;
        } else {
            public_server = public_server.bind(config.api_bind_address())?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(socket) = config.api_unix_socket() {
            return Err(unsupported_socket(socket));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    info!(
        address = config.api_unix_socket().unwrap_or(config.api_bind_address()),
        "public listener bound"
    );
    let public_server = public_server.run();

    // 7. Internal server (optional)
    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .configure(configure_internal)
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(missing_internal_target());
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(unsupported_socket(socket));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(missing_internal_target());
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    // 8. Serve
    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

/// Routes reachable from the internet.
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .route("/auth/login", web::get().to(sign_in_handler))
        .route("/auth/callback", web::get().to(auth_callback_handler))
        .route("/api/invoices", web::post().to(create_invoice_handler))
        .route("/api/invoices/{invoice_id}", web::get().to(get_invoice_handler))
        .route("/api/users/register", web::post().to(register_user_handler))
        .route("/invoices/{invoice_id}", web::get().to(public_invoice_handler))
        .service(
            web::scope("/actions/services")
                .route("", web::get().to(list_services_action))
                .route("", web::post().to(create_service_action))
                .route("/{service}/invoices", web::get().to(list_invoices_action))
                .route("/{service}/invoices", web::post().to(create_invoice_action))
                .route(
                    "/{service}/invoices/{invoice_id}/cancel",
                    web::post().to(cancel_invoice_action),
                )
                .route("/{service}/api-keys", web::get().to(list_api_keys_handler))
                .route("/{service}/api-keys", web::post().to(create_api_key_handler))
                .route(
                    "/{service}/api-keys/{key_id}",
                    web::delete().to(delete_api_key_handler),
                )
                .route("/{service}/webhooks", web::get().to(list_webhooks_handler))
                .route("/{service}/webhooks", web::post().to(create_webhook_handler))
                .route(
                    "/{service}/webhooks/{webhook_id}",
                    web::delete().to(delete_webhook_handler),
                ),
        );
}

/// Operator routes; never bound on the public listener.
pub fn configure_internal(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route(
            "/internal/invoices/{invoice_id}/refunds",
            web::post().to(refund_invoice_handler),
        );
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] nanopay_domain::storage::StorageError),
    #[error("node rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("identity provider error: {0}")]
    Auth(#[from] AuthError),
    #[error("http client error: {0}")]
    Http(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn missing_internal_target() -> BootstrapError {
    BootstrapError::Io(std::io::Error::other(
        "internal listener configured but no bind target provided",
    ))
}

#[cfg(not(unix))]
fn unsupported_socket(socket: &str) -> BootstrapError {
    BootstrapError::Io(std::io::Error::other(format!(
        "unix socket '{socket}' requested but this platform does not support it"
    )))
}

/// Removes a socket file left behind by an unclean shutdown so `bind_uds`
/// can succeed.
#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}
