// src/service_handlers.rs - Test-service catalog
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use validator::Validate;
use crate::audit::audit;
use crate::auth::require_permission;
use crate::error::ApiResult;
use crate::handlers::{ApiResponse, PaginationQuery};
use crate::models::{CreateServiceRequest, Role, UpdateServiceRequest};
use crate::repositories::{CrudRepository, ServiceRepository};
use crate::AppState;

pub async fn get_services(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let repo = ServiceRepository::new();
    let services = repo.get_paginated(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(services)))
}

pub async fn get_service(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let service = ServiceRepository::get_active(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(service)))
}

pub async fn create_service(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateServiceRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_services)?;
    request.validate()?;

    let repo = ServiceRepository::new();
    let service = repo.create(&app_state.db_pool, request.into_inner(), &claims.sub).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "create", "service", &service.id,
          &format!("Created service '{}' ({} VND)", service.name, service.price), Some(&http_request)).await;
    log::info!("Service '{}' created by {}", service.name, claims.sub);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        service,
        "Service created successfully".to_string(),
    )))
}

pub async fn update_service(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateServiceRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_services)?;
    request.validate()?;

    let repo = ServiceRepository::new();
    let service = repo.update(&app_state.db_pool, &path.into_inner(), request.into_inner()).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "update", "service", &service.id,
          &format!("Updated service '{}'", service.name), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        service,
        "Service updated successfully".to_string(),
    )))
}

/// Soft delete: the service leaves the catalog, booked details keep it.
pub async fn delete_service(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_services)?;
    let service_id = path.into_inner();

    ServiceRepository::soft_delete(&app_state.db_pool, &service_id).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "delete", "service", &service_id,
          "Service removed from catalog", Some(&http_request)).await;
    log::info!("Service {} soft-deleted by {}", service_id, claims.sub);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Service deleted successfully".to_string(),
    )))
}
