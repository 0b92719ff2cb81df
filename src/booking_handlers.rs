// src/booking_handlers.rs - Cart, booking queries and lab status updates
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use serde::Deserialize;
use validator::Validate;
use crate::audit::audit;
use crate::auth::{get_current_user, require_permission};
use crate::error::ApiResult;
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{
    BookingDetailStatus, BookingStatus, CascadeStatusRequest, CreateBookingDetailRequest, Role,
    UpdateDetailStatusRequest,
};
use crate::AppState;

// ==================== CART ====================

pub async fn create_booking_detail(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateBookingDetailRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let detail = app_state.booking_service().create_booking_detail(&claims.sub, &request).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "create", "booking_detail", &detail.id,
          &format!("Booked {} {} for {}", detail.slot_date, detail.shift, detail.full_name),
          Some(&http_request)).await;

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        detail,
        "Test added to booking".to_string(),
    )))
}

pub async fn delete_booking_detail(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    let removal = app_state.booking_service().delete_booking_detail(&claims, &path.into_inner()).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "delete", "booking_detail", &removal.detail_id,
          &format!("Removed from booking {}", removal.booking_id), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        removal,
        "Test removed from booking".to_string(),
    )))
}

pub async fn get_cart(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let cart = app_state.booking_service().current_cart(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(cart)))
}

// ==================== QUERIES ====================

pub async fn get_my_bookings(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let bookings = app_state.booking_service().list_for_account(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(bookings)))
}

pub async fn get_booking(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let booking = app_state.booking_service().get_booking(&claims, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub status: Option<BookingStatus>,
}

pub async fn get_all_bookings(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BookingListQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_all_bookings)?;

    let pagination = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
        ..PaginationQuery::default()
    };
    let (page, per_page, offset) = pagination.normalize();

    let (bookings, total) = app_state.booking_service().list_all(query.status, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(bookings, total, page, per_page))))
}

#[derive(Debug, Deserialize)]
pub struct WorklistQuery {
    pub status: Option<BookingDetailStatus>,
}

/// Details waiting for lab action; pending by default.
pub async fn get_worklist(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<WorklistQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_update_test_status)?;

    let status = query.status.unwrap_or(BookingDetailStatus::Pending);
    let details = app_state.booking_service().worklist(status).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(details)))
}

// ==================== STATUS ====================

pub async fn update_detail_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateDetailStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_update_test_status)?;
    request.validate()?;

    let detail = app_state
        .booking_service()
        .update_detail_status(&path.into_inner(), request.status, request.result.as_deref())
        .await?;

    audit(&app_state.db_pool, Some(&claims.sub), "update_status", "booking_detail", &detail.id,
          &format!("Status set to {}", detail.status), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        detail,
        "Status updated".to_string(),
    )))
}

/// Moves every detail of a booking that can legally take the new status.
pub async fn update_booking_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<CascadeStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_update_test_status)?;
    let booking_id = path.into_inner();

    let updated = app_state
        .booking_service()
        .update_status_by_booking_id(&booking_id, request.status)
        .await?;

    audit(&app_state.db_pool, Some(&claims.sub), "update_status", "booking", &booking_id,
          &format!("{} details set to {}", updated, request.status), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "booking_id": booking_id,
        "updated": updated,
    }))))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::{header, StatusCode}, test};
    use chrono::{Duration, Local};
    use serde_json::{json, Value};
    use crate::db::test_support::*;
    use crate::services::BookingService;
    use crate::test_support::{bearer_for, test_auth_service, test_state};

    fn detail_payload(service_id: &str) -> Value {
        let tomorrow = Local::now().date_naive() + Duration::days(1);
        json!({
            "service_id": service_id,
            "full_name": "Tran Thi Lan",
            "date_of_birth": "1995-04-12",
            "gender": "female",
            "phone": "0912345678",
            "slot_date": tomorrow.to_string(),
            "shift": "AM",
        })
    }

    #[actix_rt::test]
    async fn test_booking_lifecycle_over_http() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let service_id = insert_service(&pool, "Gonorrhea", 150_000).await;
        let customer = insert_account(&pool, "lan@example.com", "customer").await;
        let staff = insert_account(&pool, "lab@example.com", "staff").await;
        let customer_token = bearer_for(&pool, &auth, &customer).await;
        let staff_token = bearer_for(&pool, &auth, &staff).await;

        let req = test::TestRequest::post()
            .uri("/api/bookings/details")
            .insert_header((header::AUTHORIZATION, customer_token.clone()))
            .set_json(detail_payload(&service_id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        let detail_id = body["data"]["id"].as_str().unwrap().to_string();
        let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/bookings/cart")
            .insert_header((header::AUTHORIZATION, customer_token.clone()))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["total_amount"], 150_000);

        // Unpaid bookings cannot enter the lab workflow
        let req = test::TestRequest::put()
            .uri(&format!("/api/bookings/details/{}/status", detail_id))
            .insert_header((header::AUTHORIZATION, staff_token.clone()))
            .set_json(json!({ "status": "tested" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);

        let mut conn = pool.acquire().await.unwrap();
        BookingService::mark_booking_paid(&mut *conn, &booking_id).await.unwrap();
        drop(conn);

        // Customers cannot drive the lab workflow
        let req = test::TestRequest::put()
            .uri(&format!("/api/bookings/details/{}/status", detail_id))
            .insert_header((header::AUTHORIZATION, customer_token.clone()))
            .set_json(json!({ "status": "tested" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::put()
            .uri(&format!("/api/bookings/{}/status", booking_id))
            .insert_header((header::AUTHORIZATION, staff_token.clone()))
            .set_json(json!({ "status": "tested" }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["updated"], 1);

        let req = test::TestRequest::put()
            .uri(&format!("/api/bookings/details/{}/status", detail_id))
            .insert_header((header::AUTHORIZATION, staff_token.clone()))
            .set_json(json!({ "status": "result_ready", "result": "Negative" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/api/bookings/{}", booking_id))
            .insert_header((header::AUTHORIZATION, customer_token.clone()))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["details"][0]["result"], "Negative");

        // Paid bookings are no longer editable
        let req = test::TestRequest::delete()
            .uri(&format!("/api/bookings/details/{}", detail_id))
            .insert_header((header::AUTHORIZATION, customer_token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
    }

    #[actix_rt::test]
    async fn test_other_customers_cannot_read_booking() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let service_id = insert_service(&pool, "Syphilis", 120_000).await;
        let owner = insert_account(&pool, "owner@example.com", "customer").await;
        let other = insert_account(&pool, "other@example.com", "customer").await;

        let req = test::TestRequest::post()
            .uri("/api/bookings/details")
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &owner).await))
            .set_json(detail_payload(&service_id))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/api/bookings/{}", booking_id))
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &other).await))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/bookings")
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &other).await))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }
}
