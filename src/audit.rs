// src/audit.rs - Audit trail helpers

use sqlx::SqlitePool;
use uuid::Uuid;
use chrono::{Duration, Utc};
use actix_web::HttpRequest;

/// Write an event to audit_logs
pub async fn log_activity(
    pool: &SqlitePool,
    account_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    description: Option<&str>,
    request: Option<&HttpRequest>,
) -> Result<(), sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let ip_address = request.and_then(|req| {
        req.connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string())
    });

    let user_agent = request.and_then(|req| {
        req.headers()
            .get("User-Agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    });

    sqlx::query(
        r#"INSERT INTO audit_logs
           (id, account_id, action, entity_type, entity_id, description, ip_address, user_agent, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    )
    .bind(&id)
    .bind(account_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(&ip_address)
    .bind(&user_agent)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Short form for handlers; failures are logged, never surfaced.
pub async fn audit(
    pool: &SqlitePool,
    account_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    description: &str,
    request: Option<&HttpRequest>,
) {
    if let Err(e) = log_activity(
        pool,
        account_id,
        action,
        entity_type,
        Some(entity_id),
        Some(description),
        request,
    ).await {
        log::error!("Failed to write audit log: {}", e);
    }
}

/// Deletes audit rows older than `retention_days`.
pub async fn prune_audit_logs(pool: &SqlitePool, retention_days: i64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
