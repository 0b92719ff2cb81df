// src/monitoring.rs
use actix_web::{HttpResponse, web};
use serde::Serialize;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use std::time::Instant;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::time::{interval, Duration};
use crate::audit::prune_audit_logs;
use crate::config::SlotConfig;
use crate::error::ApiResult;
use crate::repositories::{ServiceRepository, SlotRepository, TokenRepository};
use crate::AppState;

const AUDIT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone)]
pub struct Metrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub response_times: Arc<std::sync::Mutex<Vec<u64>>>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            response_times: Arc::new(std::sync::Mutex::new(Vec::new())),
            started_at: Instant::now(),
        }
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_errors(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_time(&self, time_ms: u64) {
        if let Ok(mut times) = self.response_times.lock() {
            times.push(time_ms);
            if times.len() > 1000 {
                times.remove(0);
            }
        }
    }

    pub fn average_response_time(&self) -> f64 {
        match self.response_times.lock() {
            Ok(times) if !times.is_empty() => times.iter().sum::<u64>() as f64 / times.len() as f64,
            _ => 0.0,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: String,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub requests_total: u64,
    pub errors_total: u64,
    pub avg_response_time_ms: f64,
    pub database_connections: u32,
    pub idle_connections: usize,
}

pub async fn health_check(
    app_state: web::Data<Arc<AppState>>,
    metrics: web::Data<Arc<Metrics>>,
) -> HttpResponse {
    let database_ok = sqlx::query("SELECT 1").execute(&app_state.db_pool).await.is_ok();

    let response = HealthResponse {
        status: if database_ok { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: metrics.uptime_seconds(),
        database: if database_ok { "connected" } else { "disconnected" }.to_string(),
    };

    if database_ok {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn metrics_endpoint(
    app_state: web::Data<Arc<AppState>>,
    metrics: web::Data<Arc<Metrics>>,
) -> HttpResponse {
    let response = MetricsResponse {
        requests_total: metrics.request_count.load(Ordering::Relaxed),
        errors_total: metrics.error_count.load(Ordering::Relaxed),
        avg_response_time_ms: metrics.average_response_time(),
        database_connections: app_state.db_pool.size(),
        idle_connections: app_state.db_pool.num_idle(),
    };

    HttpResponse::Ok().json(response)
}

pub struct RequestLogger {
    metrics: Arc<Metrics>,
}

impl RequestLogger {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl<S, B> actix_web::dev::Transform<S, actix_web::dev::ServiceRequest> for RequestLogger
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = RequestLoggerMiddleware<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerMiddleware {
            service,
            metrics: self.metrics.clone(),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: S,
    metrics: Arc<Metrics>,
}

impl<S, B> actix_web::dev::Service<actix_web::dev::ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: actix_web::dev::ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let metrics = self.metrics.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            metrics.increment_requests();
            let res = fut.await;
            let elapsed = start_time.elapsed().as_millis() as u64;
            metrics.record_response_time(elapsed);

            match res {
                Ok(ref response) if response.status().is_client_error() || response.status().is_server_error() => {
                    metrics.increment_errors();
                }
                Err(_) => metrics.increment_errors(),
                _ => {}
            }
            res
        })
    }
}

// ==================== BACKGROUND JOBS ====================

/// Pre-creates the upcoming weeks of slots for every bookable service.
pub async fn generate_slots_for_all_services(pool: &SqlitePool, slots: &SlotConfig) -> ApiResult<usize> {
    let service_ids = ServiceRepository::list_active_ids(pool).await?;
    let mut conn = pool.acquire().await?;

    let mut created = 0;
    for service_id in &service_ids {
        created += SlotRepository::generate_slots_for_upcoming_weeks(
            &mut *conn,
            service_id,
            slots.weeks_ahead,
            slots.default_max_quantity,
        )
        .await?;
    }

    log::info!("Slot generation: {} new slots across {} services", created, service_ids.len());
    Ok(created)
}

pub async fn start_maintenance_tasks(pool: SqlitePool, slots: SlotConfig) {
    let cleanup_pool = pool.clone();

    tokio::spawn(async move {
        cleanup_expired_records(cleanup_pool).await;
    });

    tokio::spawn(async move {
        regenerate_slots(pool, slots).await;
    });
}

async fn cleanup_expired_records(pool: SqlitePool) {
    let mut interval = interval(Duration::from_secs(24 * 3600));

    loop {
        interval.tick().await;
        log::info!("Starting daily cleanup of tokens and audit logs...");

        match TokenRepository::cleanup_expired(&pool).await {
            Ok((refresh, blacklist)) if refresh + blacklist > 0 => {
                log::info!("Removed {} expired refresh tokens and {} blacklist entries", refresh, blacklist);
            }
            Ok(_) => {}
            Err(e) => log::error!("Failed to clean up expired tokens: {}", e),
        }

        match prune_audit_logs(&pool, AUDIT_RETENTION_DAYS).await {
            Ok(0) => {}
            Ok(count) => log::info!("Cleaned up {} old audit log entries", count),
            Err(e) => log::error!("Failed to clean up audit logs: {}", e),
        }
    }
}

async fn regenerate_slots(pool: SqlitePool, slots: SlotConfig) {
    let mut interval = interval(Duration::from_secs(slots.generation_interval_hours.max(1) * 3600));

    loop {
        // The first tick completes immediately, covering startup
        interval.tick().await;
        if let Err(e) = generate_slots_for_all_services(&pool, &slots).await {
            log::error!("Slot generation failed: {}", e);
        }
    }
}
