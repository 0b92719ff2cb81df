// src/models/service.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

/// Catalog entry for a bookable lab-test service. Prices are whole VND.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct TestService {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub category: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Price must be between 0 and 1,000,000,000"))]
    pub price: i64,
    #[validate(length(max = 100, message = "Category cannot exceed 100 characters"))]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = 1_000_000_000, message = "Price must be between 0 and 1,000,000,000"))]
    pub price: Option<i64>,
    #[validate(length(max = 100, message = "Category cannot exceed 100 characters"))]
    pub category: Option<String>,
}
