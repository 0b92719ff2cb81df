// src/repositories/content_repository.rs
//! Blogs, feedback and in-app notifications.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;
use super::CrudRepository;
use crate::error::{ApiError, ApiResult};
use crate::models::{Blog, CreateBlogRequest, CreateFeedbackRequest, Feedback, Notification, UpdateBlogRequest};

// ==================== BLOGS ====================

pub struct BlogRepository {
    published_only: bool,
}

impl BlogRepository {
    /// Repository over every blog post, drafts included.
    pub fn all() -> Self {
        Self { published_only: false }
    }

    /// Repository restricted to what anonymous readers may see.
    pub fn published() -> Self {
        Self { published_only: true }
    }
}

#[async_trait]
impl CrudRepository<Blog, CreateBlogRequest, UpdateBlogRequest> for BlogRepository {
    fn table_name(&self) -> &'static str {
        "blogs"
    }

    fn entity_name(&self) -> &'static str {
        "Blog"
    }

    fn search_fields(&self) -> Vec<&'static str> {
        vec!["title", "content"]
    }

    fn base_condition(&self) -> Option<&'static str> {
        if self.published_only {
            Some("is_published = 1")
        } else {
            None
        }
    }

    async fn create(&self, pool: &SqlitePool, data: CreateBlogRequest, account_id: &str) -> ApiResult<Blog> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO blogs (id, author_id, title, content, is_published, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
            .bind(&id)
            .bind(account_id)
            .bind(data.title.trim())
            .bind(&data.content)
            .bind(data.is_published.unwrap_or(false))
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        self.get_required(pool, &id).await
    }

    async fn update(&self, pool: &SqlitePool, id: &str, data: UpdateBlogRequest) -> ApiResult<Blog> {
        let result = sqlx::query(
            r#"
            UPDATE blogs SET
                title = COALESCE(?, title),
                content = COALESCE(?, content),
                is_published = COALESCE(?, is_published),
                updated_at = ?
            WHERE id = ?
            "#
        )
            .bind(data.title.as_deref().map(str::trim))
            .bind(&data.content)
            .bind(data.is_published)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Blog"));
        }

        self.get_required(pool, id).await
    }
}

// ==================== FEEDBACK ====================

pub struct FeedbackRepository;

impl FeedbackRepository {
    pub async fn create(pool: &SqlitePool, account_id: &str, request: &CreateFeedbackRequest) -> ApiResult<Feedback> {
        let feedback = Feedback {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            service_id: request.service_id.clone(),
            rating: request.rating,
            comment: request.comment.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO feedbacks (id, account_id, service_id, rating, comment, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
            .bind(&feedback.id)
            .bind(&feedback.account_id)
            .bind(&feedback.service_id)
            .bind(feedback.rating)
            .bind(&feedback.comment)
            .bind(feedback.created_at)
            .execute(pool)
            .await?;

        Ok(feedback)
    }

    pub async fn get_required(pool: &SqlitePool, id: &str) -> ApiResult<Feedback> {
        sqlx::query_as::<_, Feedback>("SELECT * FROM feedbacks WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Feedback"))
    }

    pub async fn list_for_service(pool: &SqlitePool, service_id: &str) -> ApiResult<Vec<Feedback>> {
        let feedbacks = sqlx::query_as::<_, Feedback>(
            "SELECT * FROM feedbacks WHERE service_id = ? ORDER BY created_at DESC"
        )
            .bind(service_id)
            .fetch_all(pool)
            .await?;
        Ok(feedbacks)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM feedbacks WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Feedback"));
        }
        Ok(())
    }
}

// ==================== NOTIFICATIONS ====================

pub struct NotificationRepository;

impl NotificationRepository {
    /// Queues a message for the account; joins the caller's transaction.
    pub async fn create(
        conn: &mut SqliteConnection,
        account_id: &str,
        title: &str,
        message: &str,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO notifications (id, account_id, title, message, is_read, created_at) VALUES (?, ?, ?, ?, 0, ?)"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(account_id)
            .bind(title)
            .bind(message)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn list_for_account(pool: &SqlitePool, account_id: &str, unread_only: bool) -> ApiResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE account_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC
            LIMIT 100
            "#
        )
            .bind(account_id)
            .bind(unread_only)
            .fetch_all(pool)
            .await?;
        Ok(notifications)
    }

    pub async fn mark_read(pool: &SqlitePool, account_id: &str, id: &str) -> ApiResult<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND account_id = ?")
            .bind(id)
            .bind(account_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Notification"));
        }
        Ok(())
    }

    pub async fn mark_all_read(pool: &SqlitePool, account_id: &str) -> ApiResult<u64> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE account_id = ? AND is_read = 0")
            .bind(account_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::handlers::PaginationQuery;

    #[actix_rt::test]
    async fn test_drafts_hidden_from_public_listing() {
        let pool = test_pool().await;
        let author = insert_account(&pool, "writer@example.com", "consultant").await;

        let draft = CreateBlogRequest {
            title: "Draft".to_string(),
            content: "Not yet".to_string(),
            is_published: None,
        };
        let live = CreateBlogRequest {
            title: "PrEP basics".to_string(),
            content: "What to know".to_string(),
            is_published: Some(true),
        };
        BlogRepository::all().create(&pool, draft, &author).await.unwrap();
        BlogRepository::all().create(&pool, live, &author).await.unwrap();

        let query = PaginationQuery::default();
        assert_eq!(BlogRepository::published().get_paginated(&pool, &query).await.unwrap().total, 1);
        assert_eq!(BlogRepository::all().get_paginated(&pool, &query).await.unwrap().total, 2);
    }

    #[actix_rt::test]
    async fn test_notifications_read_flow() {
        let pool = test_pool().await;
        let account = insert_account(&pool, "notify@example.com", "customer").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            NotificationRepository::create(&mut *conn, &account, "Result ready", "Your HIV result is available").await.unwrap();
            NotificationRepository::create(&mut *conn, &account, "Payment received", "Thanks").await.unwrap();
        }

        let unread = NotificationRepository::list_for_account(&pool, &account, true).await.unwrap();
        assert_eq!(unread.len(), 2);

        NotificationRepository::mark_read(&pool, &account, &unread[0].id).await.unwrap();
        assert_eq!(NotificationRepository::list_for_account(&pool, &account, true).await.unwrap().len(), 1);
        assert_eq!(NotificationRepository::mark_all_read(&pool, &account).await.unwrap(), 1);
        assert_eq!(NotificationRepository::list_for_account(&pool, &account, false).await.unwrap().len(), 2);

        let err = NotificationRepository::mark_read(&pool, "someone-else", &unread[0].id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
