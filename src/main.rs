// Gender healthcare booking API: server bootstrap and route table
use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpServer, Result,
};
use actix_web_httpauth::middleware::HttpAuthentication;
use actix_web::http::header;
use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use rand::{seq::SliceRandom, thread_rng, Rng};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Builds a test service over the full API route table.
#[cfg(test)]
macro_rules! test_app {
    ($state:expr, $auth:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .app_data(actix_web::web::Data::new($auth.clone()))
                .configure(crate::configure_api),
        )
        .await
    };
}

// Module declarations
mod auth;
mod audit;
mod auth_handlers;
mod booking_handlers;
mod config;
mod consultation_handlers;
mod content_handlers;
mod db;
mod error;
mod handlers;
mod models;
mod monitoring;
mod payment_handlers;
pub mod repositories;
mod service_handlers;
pub mod services;
mod slot_handlers;
pub mod validator;
mod vnpay;

use auth::{jwt_middleware, AuthService};
use config::{load_config, Config};
use models::Role;
use monitoring::{health_check, metrics_endpoint, start_maintenance_tasks, Metrics, RequestLogger};
use repositories::{AccountRepository, NewAccount};
use services::{BookingService, PaymentService};
use vnpay::VnPayClient;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
}

impl AppState {
    pub fn booking_service(&self) -> BookingService {
        BookingService::new(self.db_pool.clone(), self.config.slots.default_max_quantity)
    }

    pub fn payment_service(&self) -> PaymentService {
        PaymentService::new(self.db_pool.clone(), VnPayClient::new(&self.config.vnpay))
    }
}

// ==================== ROUTES ====================

/// Every `/api` route. Shared by the server and the handler tests.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    // Auth: credentials in, tokens out. Session routes need a bearer token.
    cfg.service(
        web::scope("/api/auth")
            .route("/register", web::post().to(auth_handlers::register))
            .route("/login", web::post().to(auth_handlers::login))
            .route("/refresh", web::post().to(auth_handlers::refresh))
            .service(
                web::resource("/logout")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route(web::post().to(auth_handlers::logout)),
            )
            .service(
                web::resource("/profile")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route(web::get().to(auth_handlers::get_profile)),
            )
            .service(
                web::resource("/change-password")
                    .wrap(HttpAuthentication::bearer(jwt_middleware))
                    .route(web::post().to(auth_handlers::change_password)),
            ),
    );

    // Anonymous browsing and guest consultation requests
    cfg.service(
        web::scope("/api/public")
            .route("/services", web::get().to(service_handlers::get_services))
            .route("/services/{id}", web::get().to(service_handlers::get_service))
            .route("/services/{id}/slots", web::get().to(slot_handlers::get_service_slots))
            .route("/services/{id}/feedback", web::get().to(content_handlers::get_service_feedback))
            .route("/consultants", web::get().to(auth_handlers::get_consultants))
            .route(
                "/consultants/{id}/availability",
                web::get().to(consultation_handlers::check_consultant_availability),
            )
            .route("/blogs", web::get().to(content_handlers::get_published_blogs))
            .route("/blogs/{id}", web::get().to(content_handlers::get_published_blog))
            .route("/consultations", web::post().to(consultation_handlers::create_consultation)),
    );

    // Gateway callbacks carry a signature instead of a bearer token
    cfg.service(
        web::resource("/api/payments/vnpay-return").route(web::get().to(payment_handlers::vnpay_return)),
    );
    cfg.service(
        web::resource("/api/payments/vnpay-ipn").route(web::get().to(payment_handlers::vnpay_ipn)),
    );

    cfg.service(
        web::scope("/api")
            .wrap(HttpAuthentication::bearer(jwt_middleware))
            .route("/dashboard/stats", web::get().to(handlers::get_dashboard_stats))

            // Accounts
            .service(
                web::scope("/accounts")
                    .route("", web::get().to(auth_handlers::get_accounts))
                    .route("", web::post().to(auth_handlers::create_account))
                    .route("/roles", web::get().to(auth_handlers::get_roles))
                    .route("/{id}", web::get().to(auth_handlers::get_account))
                    .route("/{id}", web::put().to(auth_handlers::update_account))
                    .route("/{id}/staff-info", web::get().to(auth_handlers::get_staff_info))
                    .route("/{id}/staff-info", web::put().to(auth_handlers::update_staff_info)),
            )

            // Services and slots
            .service(
                web::scope("/services")
                    .route("", web::post().to(service_handlers::create_service))
                    .route("/{id}", web::put().to(service_handlers::update_service))
                    .route("/{id}", web::delete().to(service_handlers::delete_service))
                    .route("/{id}/slots/generate", web::post().to(slot_handlers::generate_service_slots)),
            )
            .route("/slots/{id}", web::put().to(slot_handlers::update_slot_capacity))

            // Bookings
            .service(
                web::scope("/bookings")
                    .route("", web::get().to(booking_handlers::get_all_bookings))
                    .route("/details", web::post().to(booking_handlers::create_booking_detail))
                    .route("/details/{id}", web::delete().to(booking_handlers::delete_booking_detail))
                    .route("/details/{id}/status", web::put().to(booking_handlers::update_detail_status))
                    .route("/cart", web::get().to(booking_handlers::get_cart))
                    .route("/mine", web::get().to(booking_handlers::get_my_bookings))
                    .route("/worklist", web::get().to(booking_handlers::get_worklist))
                    .route("/{id}", web::get().to(booking_handlers::get_booking))
                    .route("/{id}/status", web::put().to(booking_handlers::update_booking_status)),
            )

            // Payments
            .service(
                web::scope("/payments")
                    .route("", web::get().to(payment_handlers::get_payments))
                    .route("/vnpay-url", web::post().to(payment_handlers::create_payment_url))
                    .route("/booking/{id}", web::get().to(payment_handlers::get_booking_payment)),
            )

            // Consultations
            .service(
                web::scope("/consultations")
                    .route("", web::get().to(consultation_handlers::get_all_consultations))
                    .route("/mine", web::get().to(consultation_handlers::get_my_consultations))
                    .route("/assigned", web::get().to(consultation_handlers::get_assigned_consultations))
                    .route("/{id}/confirm", web::put().to(consultation_handlers::confirm_consultation))
                    .route("/{id}/cancel", web::put().to(consultation_handlers::cancel_consultation)),
            )

            // Content
            .service(
                web::scope("/blogs")
                    .route("", web::get().to(content_handlers::get_all_blogs))
                    .route("", web::post().to(content_handlers::create_blog))
                    .route("/{id}", web::put().to(content_handlers::update_blog))
                    .route("/{id}", web::delete().to(content_handlers::delete_blog)),
            )
            .service(
                web::scope("/feedback")
                    .route("", web::post().to(content_handlers::create_feedback))
                    .route("/{id}", web::delete().to(content_handlers::delete_feedback)),
            )

            // Notifications
            .service(
                web::scope("/notifications")
                    .route("", web::get().to(handlers::get_notifications))
                    .route("/read-all", web::put().to(handlers::mark_all_notifications_read))
                    .route("/{id}/read", web::put().to(handlers::mark_notification_read)),
            ),
    );
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    setup_logging(&config)?;

    if config.is_production() {
        config.validate_production()?;
    }
    config.print_startup_info();

    setup_database(&config.database.url).await?;
    let pool = create_database_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(&config.auth));
    create_default_admin_if_needed(&pool, &auth_service).await?;

    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
    });

    // Token cleanup, audit pruning and rolling slot generation
    let maintenance_pool = pool.clone();
    let slot_config = config.slots.clone();
    tokio::spawn(async move {
        start_maintenance_tasks(maintenance_pool, slot_config).await;
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting server at http://{}", bind_address);

    let metrics_arc = Arc::new(Metrics::new());
    let server_config = config.clone();

    let mut server = HttpServer::new(move || {
        let config = &server_config;
        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(metrics_arc.clone()))
            .app_data(web::JsonConfig::default().limit(config.security.max_request_size))
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .wrap(Compress::default())
            .wrap(Logger::new(r#"%a "%r" %s %b %T"#))
            .wrap(setup_security_headers(&config.security))
            .wrap(setup_cors(&config.security.allowed_origins, config.is_production()))
            .service(
                web::scope("/health")
                    .route("", web::get().to(health_check))
                    .route("/metrics", web::get().to(metrics_endpoint)),
            )
            .configure(configure_api);

        match frontend_build_dir() {
            Some(build_dir) if config.is_production() => app
                .service(Files::new("/static", build_dir.join("static")))
                .service(Files::new("/assets", build_dir.join("assets")))
                .default_service(web::route().to(serve_index)),
            _ => app,
        }
    })
        .keep_alive(Duration::from_secs(config.server.keep_alive))
        .client_request_timeout(Duration::from_secs(config.server.client_timeout));

    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

fn setup_cors(allowed_origins: &[String], is_production: bool) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .supports_credentials()
        .max_age(3600);

    if allowed_origins.iter().any(|o| o == "*") && !is_production {
        log::warn!("Using wildcard CORS (*) in development mode");
        // Credentialed requests cannot use a literal wildcard, so echo the origin
        return cors.allowed_origin_fn(|_, _| true);
    }

    for origin in allowed_origins.iter().filter(|o| !o.is_empty() && o.as_str() != "*") {
        log::debug!("Adding CORS origin: {}", origin);
        cors = cors.allowed_origin(origin);
    }
    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.connect_timeout))
        .connect(&db_config.url)
        .await
        .with_context(|| format!("Failed to connect to {}", db_config.url))?;
    Ok(pool)
}

fn setup_security_headers(config: &config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload"
        ));
    }

    headers
}

/// Password with at least one digit, special, upper and lower case character.
fn generate_admin_password() -> String {
    const DIGITS: &[u8] = b"0123456789";
    const SPECIALS: &[u8] = b"!@#$%^&*()_+-=";
    const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

    let mut rng = thread_rng();
    let mut pick = |set: &[u8]| set[rng.gen_range(0..set.len())] as char;

    let mut chars = vec![pick(DIGITS), pick(SPECIALS), pick(UPPER), pick(LOWER)];
    for i in 0..12 {
        let set = match i % 4 {
            0 => DIGITS,
            1 => UPPER,
            2 => LOWER,
            _ => SPECIALS,
        };
        chars.push(pick(set));
    }
    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    if AccountRepository::count(pool).await? > 0 {
        return Ok(());
    }

    let (password, generated) = match env::var("DEFAULT_ADMIN_PASSWORD") {
        Ok(password) => (password, false),
        Err(_) => (generate_admin_password(), true),
    };
    let email = env::var("DEFAULT_ADMIN_EMAIL").unwrap_or_else(|_| "admin@healthcare.local".to_string());

    let password_hash = auth_service.hash_password(&password)?;
    AccountRepository::create(pool, NewAccount {
        full_name: "Administrator",
        email: &email,
        phone: None,
        password_hash: &password_hash,
        role: Role::Admin,
    })
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create default admin account: {}", e))?;

    log::warn!("Default admin account created:");
    log::warn!("  Email: {}", email);
    if generated {
        log::warn!("  Password: {} (generated - CHANGE IMMEDIATELY!)", password);
    }

    Ok(())
}

fn frontend_build_dir() -> Option<PathBuf> {
    env::var("FRONTEND_BUILD_DIR").ok().map(PathBuf::from)
}

async fn serve_index() -> Result<NamedFile> {
    let build_dir = frontend_build_dir()
        .ok_or_else(|| actix_web::error::ErrorNotFound("Frontend build not configured"))?;
    Ok(NamedFile::open(build_dir.join("index.html"))?)
}


#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use crate::db::test_support::test_pool;
    use crate::test_support::{test_auth_service, test_state};

    #[actix_rt::test]
    async fn test_protected_scope_requires_token() {
        let pool = test_pool().await;
        let state = test_state(pool);
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let req = test::TestRequest::get().uri("/api/bookings/cart").to_request();
        let resp = test::try_call_service(&app, req).await;
        let status = match resp {
            Ok(resp) => resp.status(),
            Err(err) => err.as_response_error().status_code(),
        };
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_health_reports_database() {
        let pool = test_pool().await;
        let state = test_state(pool);
        let metrics = Arc::new(Metrics::new());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .app_data(web::Data::new(metrics.clone()))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // `actix_web::test` is imported above and shadows the builtin attribute
    #[::core::prelude::v1::test]
    fn test_generated_admin_password_is_strong() {
        let password = generate_admin_password();
        assert_eq!(password.len(), 16);
        assert!(crate::auth::validate_password_strength(&password).is_ok());
    }

    #[actix_rt::test]
    async fn test_default_admin_created_once() {
        let pool = test_pool().await;
        let auth = test_auth_service();

        create_default_admin_if_needed(&pool, &auth).await.unwrap();
        create_default_admin_if_needed(&pool, &auth).await.unwrap();

        assert_eq!(AccountRepository::count(&pool).await.unwrap(), 1);
        let role: String = sqlx::query_scalar("SELECT role FROM accounts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(role, "admin");
    }
}
