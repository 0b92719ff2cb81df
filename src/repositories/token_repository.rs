// src/repositories/token_repository.rs
//! Refresh-token store and access-token blacklist.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use crate::auth::IssuedRefreshToken;
use crate::error::ApiResult;

pub struct TokenRepository;

impl TokenRepository {
    pub async fn store_refresh_token(
        pool: &SqlitePool,
        account_id: &str,
        issued: &IssuedRefreshToken,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, account_id, expires_at, created_at) VALUES (?, ?, ?, ?)"
        )
            .bind(&issued.token_hash)
            .bind(account_id)
            .bind(issued.expires_at)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Account owning an unexpired refresh token with this hash.
    pub async fn find_account_for_refresh_token(
        pool: &SqlitePool,
        token_hash: &str,
    ) -> ApiResult<Option<String>> {
        let account_id: Option<String> = sqlx::query_scalar(
            "SELECT account_id FROM refresh_tokens WHERE token_hash = ? AND expires_at > ?"
        )
            .bind(token_hash)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await?;
        Ok(account_id)
    }

    /// Consumes a refresh token; `false` if it was already gone.
    pub async fn delete_refresh_token(pool: &SqlitePool, token_hash: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_refresh_tokens_for_account(pool: &SqlitePool, account_id: &str) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE account_id = ?")
            .bind(account_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Revokes an access token until its natural expiry.
    pub async fn blacklist(
        pool: &SqlitePool,
        jti: &str,
        account_id: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO token_blacklist (jti, account_id, expires_at, revoked_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(jti) DO NOTHING
            "#
        )
            .bind(jti)
            .bind(account_id)
            .bind(expires_at)
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn is_blacklisted(pool: &SqlitePool, jti: &str) -> ApiResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM token_blacklist WHERE jti = ?")
            .bind(jti)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    /// Removes expired refresh tokens and blacklist entries whose tokens
    /// could no longer be presented anyway.
    pub async fn cleanup_expired(pool: &SqlitePool) -> ApiResult<(u64, u64)> {
        let now = Utc::now();
        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(pool)
            .await?;
        let blacklist = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= ?")
            .bind(now)
            .execute(pool)
            .await?;
        Ok((refresh.rows_affected(), blacklist.rows_affected()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_refresh_token, AuthService};
    use crate::config::AuthConfig;
    use crate::db::test_support::*;
    use chrono::Duration;

    #[actix_rt::test]
    async fn test_refresh_token_lifecycle() {
        let pool = test_pool().await;
        let account_id = insert_account(&pool, "token@example.com", "customer").await;
        let auth = AuthService::new(&AuthConfig::default());

        let issued = auth.generate_refresh_token();
        TokenRepository::store_refresh_token(&pool, &account_id, &issued).await.unwrap();

        let found = TokenRepository::find_account_for_refresh_token(&pool, &hash_refresh_token(&issued.token))
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some(account_id.as_str()));

        assert!(TokenRepository::delete_refresh_token(&pool, &issued.token_hash).await.unwrap());
        assert!(!TokenRepository::delete_refresh_token(&pool, &issued.token_hash).await.unwrap());
        assert!(TokenRepository::find_account_for_refresh_token(&pool, &issued.token_hash).await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_expired_refresh_token_is_not_found() {
        let pool = test_pool().await;
        let account_id = insert_account(&pool, "stale@example.com", "customer").await;
        let issued = IssuedRefreshToken {
            token: "stale".to_string(),
            token_hash: hash_refresh_token("stale"),
            expires_at: Utc::now() - Duration::minutes(1),
        };
        TokenRepository::store_refresh_token(&pool, &account_id, &issued).await.unwrap();

        assert!(TokenRepository::find_account_for_refresh_token(&pool, &issued.token_hash).await.unwrap().is_none());
        assert_eq!(TokenRepository::delete_refresh_tokens_for_account(&pool, &account_id).await.unwrap(), 1);
    }

    #[actix_rt::test]
    async fn test_blacklist_and_cleanup() {
        let pool = test_pool().await;

        TokenRepository::blacklist(&pool, "live-jti", "acc", Utc::now() + Duration::minutes(10)).await.unwrap();
        TokenRepository::blacklist(&pool, "dead-jti", "acc", Utc::now() - Duration::minutes(10)).await.unwrap();
        // Blacklisting twice is harmless
        TokenRepository::blacklist(&pool, "live-jti", "acc", Utc::now() + Duration::minutes(10)).await.unwrap();

        assert!(TokenRepository::is_blacklisted(&pool, "live-jti").await.unwrap());
        assert!(!TokenRepository::is_blacklisted(&pool, "unknown").await.unwrap());

        let (_, removed) = TokenRepository::cleanup_expired(&pool).await.unwrap();
        assert_eq!(removed, 1);
        assert!(TokenRepository::is_blacklisted(&pool, "live-jti").await.unwrap());
        assert!(!TokenRepository::is_blacklisted(&pool, "dead-jti").await.unwrap());
    }
}
