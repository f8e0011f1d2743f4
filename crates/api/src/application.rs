use std::{path::Path, sync::Arc};

#[cfg(unix)]
use std::fs;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;

use imeicheck_domain::config::{ApiConfig, ConfigError, MailerConfig, StripeConfig, VerifierConfig};
use imeicheck_domain::services::{init_telemetry, ResultCache, TelemetryConfig, TelemetryError};
use imeicheck_gateway::{
    HttpVerificationClient, Notifier, NoopNotifier, SmtpNotifier, StripeClient,
};
use imeicheck_storage::SeaOrmStorage;

use crate::handlers::{
    dashboard, metrics_handler, orders, payments, services, users, webhook,
};
use crate::state::AppState;

/// Route table shared by the production listeners and the test harness.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/auth/register", web::post().to(users::register_handler))
            .route("/auth/login", web::post().to(users::login_handler))
            .route(
                "/auth/verify-email",
                web::post().to(users::verify_email_handler),
            )
            .route(
                "/auth/resend-verification",
                web::post().to(users::resend_verification_handler),
            )
            .route(
                "/auth/request-password-reset",
                web::post().to(users::request_password_reset_handler),
            )
            .route(
                "/auth/reset-password",
                web::post().to(users::reset_password_handler),
            )
            .route(
                "/auth/change-password",
                web::post().to(users::change_password_handler),
            )
            .route("/me", web::get().to(users::me_handler))
            .route("/me", web::patch().to(users::update_me_handler))
            .route("/services", web::get().to(services::list_services_handler))
            .route(
                "/services/{service_id}",
                web::get().to(services::get_service_handler),
            )
            .route("/orders", web::post().to(orders::create_order_handler))
            .route("/orders", web::get().to(orders::list_my_orders_handler))
            .route(
                "/orders/session/{session_id}",
                web::get().to(orders::order_by_session_handler),
            )
            .route(
                "/payments/topup-session",
                web::post().to(payments::create_topup_session_handler),
            )
            .route(
                "/payments/imei-session",
                web::post().to(payments::create_imei_session_handler),
            )
            .route(
                "/payments/session/{session_id}",
                web::get().to(payments::payment_by_session_handler),
            )
            .route(
                "/payments",
                web::get().to(payments::list_my_payments_handler),
            )
            .route(
                "/payments/webhook",
                web::post().to(webhook::webhook_handler),
            )
            .service(
                web::scope("/admin")
                    .route("/users", web::get().to(users::admin_list_users_handler))
                    .route(
                        "/users/{user_id}",
                        web::get().to(users::admin_get_user_handler),
                    )
                    .route(
                        "/users/{user_id}",
                        web::patch().to(users::admin_update_user_handler),
                    )
                    .route(
                        "/users/{user_id}",
                        web::delete().to(users::admin_delete_user_handler),
                    )
                    .route(
                        "/users/{user_id}/tier",
                        web::patch().to(users::admin_set_tier_handler),
                    )
                    .route(
                        "/services",
                        web::get().to(services::admin_list_services_handler),
                    )
                    .route(
                        "/services",
                        web::post().to(services::admin_create_service_handler),
                    )
                    .route(
                        "/services/{service_id}",
                        web::patch().to(services::admin_update_service_handler),
                    )
                    .route(
                        "/services/{service_id}",
                        web::delete().to(services::admin_delete_service_handler),
                    )
                    .route("/orders", web::get().to(orders::admin_list_orders_handler))
                    .route(
                        "/orders/{order_id}",
                        web::get().to(orders::admin_get_order_handler),
                    )
                    .route(
                        "/orders/{order_id}/status",
                        web::patch().to(orders::admin_set_order_status_handler),
                    )
                    .route(
                        "/payments",
                        web::get().to(payments::admin_list_payments_handler),
                    )
                    .route(
                        "/payments/credit",
                        web::post().to(payments::admin_manual_credit_handler),
                    )
                    .route(
                        "/payments/{payment_id}",
                        web::get().to(payments::admin_get_payment_handler),
                    )
                    .route(
                        "/payments/{payment_id}/status",
                        web::patch().to(payments::admin_set_payment_status_handler),
                    )
                    .route(
                        "/payments/{payment_id}",
                        web::delete().to(payments::admin_delete_payment_handler),
                    )
                    .route("/dashboard", web::get().to(dashboard::dashboard_handler)),
            ),
    );
}

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let stripe_config = StripeConfig::load_from_env()?;
    let verifier_config = VerifierConfig::load_from_env()?;

    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::connect(config.database_url()).await?;

    let verifier = HttpVerificationClient::new(verifier_config)
        .map_err(|err| BootstrapError::Verifier(err.to_string()))?;
    let checkout = StripeClient::new(stripe_config.clone(), config.frontend_url().to_owned());
    let notifier: Arc<dyn Notifier> = match MailerConfig::load_from_env()? {
        Some(mailer_config) => Arc::new(
            SmtpNotifier::new(&mailer_config)
                .map_err(|err| BootstrapError::Mailer(err.to_string()))?,
        ),
        None => Arc::new(NoopNotifier),
    };

    let state = AppState::new(
        storage,
        Arc::new(verifier),
        Arc::new(checkout),
        notifier,
        Arc::new(ResultCache::default()),
        telemetry,
        config.jwt_secret().to_owned(),
        stripe_config.webhook_secret().to_owned(),
        config.balance_policy(),
    );

    // Metrics stay off the public listener when an internal one exists.
    let include_metrics_on_public = !config.has_internal_listener();
    let public_state = state.clone();

    let mut public_server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(configure_routes);

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
            return Err(BootstrapError::Io(std::io::Error::other(format!(
                "unix socket '{socket}' requested but this platform does not support it"
            ))));
        }
        public_server = public_server.bind(config.api_bind_address())?;
    }

    let public_server = public_server.run();

    let internal_server = if config.has_internal_listener() {
        let internal_state = state.clone();
        let mut internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .route("/metrics", web::get().to(metrics_handler))
        });

        #[cfg(unix)]
        {
            if let Some(socket) = config.internal_unix_socket() {
                cleanup_socket(socket)?;
                internal_server = internal_server.bind_uds(socket)?;
            } else if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(socket) = config.internal_unix_socket() {
                return Err(BootstrapError::Io(std::io::Error::other(format!(
                    "internal unix socket '{socket}' requested but this platform does not support it"
                ))));
            }
            if let Some(addr) = config.internal_bind_address() {
                internal_server = internal_server.bind(addr)?;
            } else {
                return Err(BootstrapError::Io(std::io::Error::other(
                    "internal listener configured but no bind target provided",
                )));
            }
        }

        Some(internal_server.run())
    } else {
        None
    };

    if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] imeicheck_domain::storage::StorageError),
    #[error("verification client error: {0}")]
    Verifier(String),
    #[error("mailer error: {0}")]
    Mailer(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(unix)]
fn cleanup_socket(path: &str) -> std::io::Result<()> {
    let socket_path = Path::new(path);
    if socket_path.exists() {
        fs::remove_file(socket_path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn cleanup_socket(_path: &str) -> std::io::Result<()> {
    Ok(())
}
