// src/repositories/service_repository.rs
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use super::CrudRepository;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateServiceRequest, TestService, UpdateServiceRequest};

pub struct ServiceRepository;

impl ServiceRepository {
    pub fn new() -> Self {
        Self
    }

    /// Service that can still be booked.
    pub async fn get_active(pool: &SqlitePool, id: &str) -> ApiResult<TestService> {
        sqlx::query_as::<_, TestService>("SELECT * FROM services WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Service"))
    }

    pub async fn list_active_ids(pool: &SqlitePool) -> ApiResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM services WHERE is_deleted = 0")
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }

    pub async fn count_active(pool: &SqlitePool) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE is_deleted = 0")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Hides the service from the catalog; existing bookings keep referencing it.
    pub async fn soft_delete(pool: &SqlitePool, id: &str) -> ApiResult<()> {
        let result = sqlx::query("UPDATE services SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Service"));
        }
        Ok(())
    }
}

impl Default for ServiceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrudRepository<TestService, CreateServiceRequest, UpdateServiceRequest> for ServiceRepository {
    fn table_name(&self) -> &'static str {
        "services"
    }

    fn entity_name(&self) -> &'static str {
        "Service"
    }

    fn search_fields(&self) -> Vec<&'static str> {
        vec!["name", "description", "category"]
    }

    fn base_condition(&self) -> Option<&'static str> {
        Some("is_deleted = 0")
    }

    fn default_sort_field(&self) -> &'static str {
        "name"
    }

    async fn create(&self, pool: &SqlitePool, data: CreateServiceRequest, _account_id: &str) -> ApiResult<TestService> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, price, category, is_deleted, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#
        )
            .bind(&id)
            .bind(data.name.trim())
            .bind(&data.description)
            .bind(data.price)
            .bind(&data.category)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        self.get_required(pool, &id).await
    }

    async fn update(&self, pool: &SqlitePool, id: &str, data: UpdateServiceRequest) -> ApiResult<TestService> {
        let result = sqlx::query(
            r#"
            UPDATE services SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                price = COALESCE(?, price),
                category = COALESCE(?, category),
                updated_at = ?
            WHERE id = ? AND is_deleted = 0
            "#
        )
            .bind(data.name.as_deref().map(str::trim))
            .bind(&data.description)
            .bind(data.price)
            .bind(&data.category)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Service"));
        }

        self.get_required(pool, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::handlers::PaginationQuery;

    fn create_request(name: &str, price: i64) -> CreateServiceRequest {
        CreateServiceRequest {
            name: name.to_string(),
            description: Some("Blood sample".to_string()),
            price,
            category: Some("STI".to_string()),
        }
    }

    #[actix_rt::test]
    async fn test_soft_deleted_service_is_hidden() {
        let pool = test_pool().await;
        let repo = ServiceRepository::new();
        let service = repo.create(&pool, create_request("HIV Combo", 350_000), "admin").await.unwrap();

        assert!(ServiceRepository::get_active(&pool, &service.id).await.is_ok());
        ServiceRepository::soft_delete(&pool, &service.id).await.unwrap();

        assert!(matches!(
            ServiceRepository::get_active(&pool, &service.id).await,
            Err(ApiError::NotFound(_))
        ));
        // Still reachable by id for historical bookings
        let stored = repo.get_required(&pool, &service.id).await.unwrap();
        assert!(stored.is_deleted);

        let page = repo.get_paginated(&pool, &PaginationQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(ServiceRepository::soft_delete(&pool, &service.id).await.is_err());
    }

    #[actix_rt::test]
    async fn test_search_and_update() {
        let pool = test_pool().await;
        let repo = ServiceRepository::new();
        let hiv = repo.create(&pool, create_request("HIV Combo", 350_000), "admin").await.unwrap();
        repo.create(&pool, create_request("Pap smear", 400_000), "admin").await.unwrap();

        let query = PaginationQuery {
            search: Some("hiv".to_string()),
            ..PaginationQuery::default()
        };
        let page = repo.get_paginated(&pool, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].id, hiv.id);

        let update = UpdateServiceRequest {
            name: None,
            description: None,
            price: Some(390_000),
            category: None,
        };
        let updated = repo.update(&pool, &hiv.id, update).await.unwrap();
        assert_eq!(updated.price, 390_000);
        assert_eq!(updated.name, "HIV Combo");
    }
}
