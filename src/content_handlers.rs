// src/content_handlers.rs - Blog posts and service feedback
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use validator::Validate;
use crate::audit::audit;
use crate::auth::{get_current_user, require_permission, Claims};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginationQuery};
use crate::models::{Blog, CreateBlogRequest, CreateFeedbackRequest, Role, UpdateBlogRequest};
use crate::repositories::{BlogRepository, BookingDetailRepository, CrudRepository, FeedbackRepository, ServiceRepository};
use crate::AppState;

// ==================== BLOGS ====================

pub async fn get_published_blogs(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
) -> ApiResult<HttpResponse> {
    let blogs = BlogRepository::published().get_paginated(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(blogs)))
}

pub async fn get_published_blog(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let blog = BlogRepository::published()
        .get_by_id(&app_state.db_pool, &path.into_inner())
        .await?
        .filter(|blog| blog.is_published)
        .ok_or_else(|| ApiError::not_found("Blog"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(blog)))
}

/// Editor view including drafts.
pub async fn get_all_blogs(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_write_blogs)?;
    let blogs = BlogRepository::all().get_paginated(&app_state.db_pool, &query).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(blogs)))
}

pub async fn create_blog(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBlogRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_write_blogs)?;
    request.validate()?;

    let blog = BlogRepository::all().create(&app_state.db_pool, request.into_inner(), &claims.sub).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "create", "blog", &blog.id,
          &format!("Blog '{}'", blog.title), Some(&http_request)).await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        blog,
        "Blog created successfully".to_string(),
    )))
}

/// Authors edit their own posts; moderators edit any.
async fn editable_blog(app_state: &AppState, claims: &Claims, blog_id: &str) -> ApiResult<Blog> {
    let blog = BlogRepository::all().get_required(&app_state.db_pool, blog_id).await?;
    if blog.author_id != claims.sub && !claims.role.can_moderate_content() {
        return Err(ApiError::forbidden());
    }
    Ok(blog)
}

pub async fn update_blog(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateBlogRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_write_blogs)?;
    request.validate()?;

    let blog = editable_blog(&app_state, &claims, &path.into_inner()).await?;
    let blog = BlogRepository::all().update(&app_state.db_pool, &blog.id, request.into_inner()).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "update", "blog", &blog.id,
          &format!("Blog '{}' (published: {})", blog.title, blog.is_published), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        blog,
        "Blog updated successfully".to_string(),
    )))
}

pub async fn delete_blog(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_write_blogs)?;

    let blog = editable_blog(&app_state, &claims, &path.into_inner()).await?;
    BlogRepository::all().delete(&app_state.db_pool, &blog.id).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "delete", "blog", &blog.id,
          &format!("Blog '{}'", blog.title), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Blog deleted successfully".to_string(),
    )))
}

// ==================== FEEDBACK ====================

pub async fn get_service_feedback(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let feedback = FeedbackRepository::list_for_service(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(feedback)))
}

/// Only customers who received a result for the service may rate it.
pub async fn create_feedback(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateFeedbackRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let service = ServiceRepository::get_active(&app_state.db_pool, &request.service_id).await?;

    let mut conn = app_state.db_pool.acquire().await?;
    let eligible = BookingDetailRepository::has_result_for_service(&mut *conn, &claims.sub, &service.id).await?;
    drop(conn);
    if !eligible {
        return Err(ApiError::Forbidden(
            "Feedback requires a completed test of this service".to_string(),
        ));
    }

    let feedback = FeedbackRepository::create(&app_state.db_pool, &claims.sub, &request).await?;
    log::info!("Feedback {} ({} stars) left for service {}", feedback.id, feedback.rating, service.id);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        feedback,
        "Thank you for your feedback".to_string(),
    )))
}

pub async fn delete_feedback(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let feedback = FeedbackRepository::get_required(&app_state.db_pool, &path.into_inner()).await?;
    if feedback.account_id != claims.sub && !claims.role.can_moderate_content() {
        return Err(ApiError::forbidden());
    }
    FeedbackRepository::delete(&app_state.db_pool, &feedback.id).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "delete", "feedback", &feedback.id,
          "Feedback removed", Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Feedback deleted".to_string(),
    )))
}
