// src/repositories/mod.rs
//! Database repositories.
//!
//! Repositories whose writes must compose inside one transaction (slots,
//! bookings, booking details, payments, notifications) take
//! `&mut SqliteConnection`, so callers pass either `&mut *tx` or a pooled
//! connection. Standalone catalog and account repositories take the pool.

pub mod account_repository;
pub mod booking_detail_repository;
pub mod booking_repository;
pub mod consultation_repository;
pub mod content_repository;
pub mod payment_repository;
pub mod service_repository;
pub mod slot_repository;
pub mod token_repository;

pub use account_repository::{AccountRepository, NewAccount};
pub use booking_detail_repository::BookingDetailRepository;
pub use booking_repository::BookingRepository;
pub use consultation_repository::ConsultationRepository;
pub use content_repository::{BlogRepository, FeedbackRepository, NotificationRepository};
pub use payment_repository::PaymentRepository;
pub use service_repository::ServiceRepository;
pub use slot_repository::SlotRepository;
pub use token_repository::TokenRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use serde::{Serialize, de::DeserializeOwned};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{PaginatedResponse, PaginationQuery};

/// Base trait for CRUD operations on a single table
#[async_trait]
pub trait CrudRepository<T, CreateDto, UpdateDto>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Unpin + for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow>,
    CreateDto: Send,
    UpdateDto: Send,
{
    fn table_name(&self) -> &'static str;

    fn entity_name(&self) -> &'static str;

    fn id_field(&self) -> &'static str {
        "id"
    }

    /// Columns matched with LIKE when a search term is given
    fn search_fields(&self) -> Vec<&'static str> {
        vec![]
    }

    /// Condition every listed row must satisfy (e.g. soft-delete flag)
    fn base_condition(&self) -> Option<&'static str> {
        None
    }

    fn default_sort_field(&self) -> &'static str {
        "created_at"
    }

    async fn create(&self, pool: &SqlitePool, data: CreateDto, account_id: &str) -> ApiResult<T>;

    async fn update(&self, pool: &SqlitePool, id: &str, data: UpdateDto) -> ApiResult<T>;

    async fn get_by_id(&self, pool: &SqlitePool, id: &str) -> ApiResult<Option<T>> {
        let query = format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.table_name(),
            self.id_field()
        );

        let result = sqlx::query_as::<_, T>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(result)
    }

    async fn get_required(&self, pool: &SqlitePool, id: &str) -> ApiResult<T> {
        self.get_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::not_found(self.entity_name()))
    }

    async fn delete(&self, pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let query = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.table_name(),
            self.id_field()
        );

        let result = sqlx::query(&query)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(self.entity_name()));
        }

        Ok(())
    }

    async fn get_paginated(
        &self,
        pool: &SqlitePool,
        query: &PaginationQuery,
    ) -> ApiResult<PaginatedResponse<T>> {
        let (page, per_page, offset) = query.normalize();

        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(base) = self.base_condition() {
            conditions.push(base.to_string());
        }

        let search_fields = self.search_fields();
        if let Some(ref search) = query.search {
            if !search.trim().is_empty() && !search_fields.is_empty() {
                let like_conditions: Vec<String> = search_fields
                    .iter()
                    .map(|f| format!("{} LIKE ?", f))
                    .collect();
                conditions.push(format!("({})", like_conditions.join(" OR ")));
                let pattern = format!("%{}%", search.trim());
                params.extend(search_fields.iter().map(|_| pattern.clone()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM {}{}", self.table_name(), where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let total: i64 = count_query.fetch_one(pool).await?;

        let select_sql = format!(
            "SELECT * FROM {}{} ORDER BY {} {} LIMIT ? OFFSET ?",
            self.table_name(),
            where_clause,
            self.default_sort_field(),
            query.sort_direction(),
        );
        let mut select_query = sqlx::query_as::<_, T>(&select_sql);
        for param in &params {
            select_query = select_query.bind(param);
        }
        let data: Vec<T> = select_query
            .bind(per_page)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(PaginatedResponse::new(data, total, page, per_page))
    }
}
