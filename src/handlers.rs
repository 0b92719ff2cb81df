// src/handlers.rs
use actix_web::{web, HttpResponse, HttpRequest};
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use crate::AppState;
use crate::models::{BookingDetailStatus, BookingStatus, DashboardStats, Role};
use crate::error::ApiResult;
use crate::auth::{get_current_user, require_permission};
use crate::repositories::{
    AccountRepository, BookingDetailRepository, BookingRepository, ConsultationRepository,
    NotificationRepository, PaymentRepository, ServiceRepository,
};

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 { (total + per_page - 1) / per_page } else { 0 };
        Self { data, total, page, per_page, total_pages }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub sort_order: Option<String>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1).saturating_mul(per_page);
        (page, per_page, offset)
    }

    /// Only ever yields a literal keyword, safe to splice into SQL.
    pub fn sort_direction(&self) -> &'static str {
        match self.sort_order.as_deref() {
            Some(order) if order.eq_ignore_ascii_case("asc") => "ASC",
            _ => "DESC",
        }
    }
}

// ==================== DASHBOARD STATISTICS ====================

pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_accounts)?;

    let pool = &app_state.db_pool;
    let mut stats = DashboardStats {
        total_accounts: AccountRepository::count(pool).await?,
        total_services: ServiceRepository::count_active(pool).await?,
        revenue_total: PaymentRepository::revenue_total(pool).await?,
        upcoming_consultations: ConsultationRepository::count_upcoming(pool).await?,
        ..DashboardStats::default()
    };

    let mut conn = pool.acquire().await?;
    stats.pending_bookings = BookingRepository::count_by_status(&mut *conn, BookingStatus::Pending).await?;
    stats.paid_bookings = BookingRepository::count_by_status(&mut *conn, BookingStatus::Paid).await?;
    stats.completed_bookings = BookingRepository::count_by_status(&mut *conn, BookingStatus::Completed).await?;
    stats.tests_awaiting_result =
        BookingDetailRepository::count_by_status(&mut *conn, BookingDetailStatus::Tested).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

// ==================== NOTIFICATIONS ====================

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn get_notifications(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<NotificationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let notifications =
        NotificationRepository::list_for_account(&app_state.db_pool, &claims.sub, query.unread_only).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(notifications)))
}

pub async fn mark_notification_read(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    NotificationRepository::mark_read(&app_state.db_pool, &claims.sub, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message((), "Notification marked as read".to_string())))
}

pub async fn mark_all_notifications_read(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let updated = NotificationRepository::mark_all_read(&app_state.db_pool, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "updated": updated }))))
}
