// src/slot_handlers.rs - Slot availability and capacity management
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Local};
use std::sync::Arc;
use serde::Serialize;
use validator::Validate;
use crate::audit::audit;
use crate::auth::require_permission;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::models::{GenerateSlotsRequest, Role, SlotAvailability, SlotQuery, UpdateSlotCapacityRequest};
use crate::repositories::{ServiceRepository, SlotRepository};
use crate::AppState;

/// Slots of one service in a date window, defaulting to the generation horizon.
pub async fn get_service_slots(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<SlotQuery>,
) -> ApiResult<HttpResponse> {
    let service = ServiceRepository::get_active(&app_state.db_pool, &path.into_inner()).await?;

    let today = Local::now().date_naive();
    let from = query.from.unwrap_or(today);
    let to = query
        .to
        .unwrap_or_else(|| from + Duration::days(app_state.config.slots.weeks_ahead as i64 * 7));
    if to < from {
        return Err(ApiError::bad_request("'to' must not be before 'from'"));
    }

    let mut conn = app_state.db_pool.acquire().await?;
    let slots: Vec<SlotAvailability> = SlotRepository::list_for_service(&mut *conn, &service.id, from, to)
        .await?
        .into_iter()
        .map(SlotAvailability::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(slots)))
}

#[derive(Serialize)]
struct GenerateSlotsResponse {
    service_id: String,
    created: usize,
}

pub async fn generate_service_slots(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<GenerateSlotsRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_slots)?;
    request.validate()?;

    let service = ServiceRepository::get_active(&app_state.db_pool, &path.into_inner()).await?;
    let max_quantity = request
        .max_quantity
        .unwrap_or(app_state.config.slots.default_max_quantity);

    let mut conn = app_state.db_pool.acquire().await?;
    let created =
        SlotRepository::generate_slots_for_upcoming_weeks(&mut *conn, &service.id, request.weeks, max_quantity)
            .await?;
    drop(conn);

    audit(&app_state.db_pool, Some(&claims.sub), "generate_slots", "service", &service.id,
          &format!("Generated {} slots for {} weeks", created, request.weeks), Some(&http_request)).await;
    log::info!("Generated {} slots for service {}", created, service.id);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        GenerateSlotsResponse { service_id: service.id, created },
        format!("{} slots created", created),
    )))
}

pub async fn update_slot_capacity(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateSlotCapacityRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_slots)?;
    request.validate()?;

    let mut conn = app_state.db_pool.acquire().await?;
    let slot = SlotRepository::update_max_quantity(&mut *conn, &path.into_inner(), request.max_quantity).await?;
    drop(conn);

    audit(&app_state.db_pool, Some(&claims.sub), "update_capacity", "slot", &slot.id,
          &format!("Capacity set to {}", slot.max_quantity), Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(SlotAvailability::from(slot))))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::{header, StatusCode}, test};
    use serde_json::{json, Value};
    use crate::db::test_support::*;
    use crate::test_support::{bearer_for, test_auth_service, test_state};

    #[actix_rt::test]
    async fn test_generate_list_and_resize() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let service_id = insert_service(&pool, "Chlamydia", 200_000).await;
        let manager = insert_account(&pool, "m@example.com", "manager").await;
        let token = bearer_for(&pool, &auth, &manager).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/services/{}/slots/generate", service_id))
            .insert_header((header::AUTHORIZATION, token.clone()))
            .set_json(json!({ "weeks": 1, "max_quantity": 3 }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["created"], 14);

        let req = test::TestRequest::get()
            .uri(&format!("/api/public/services/{}/slots", service_id))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let slots = body["data"].as_array().unwrap();
        assert_eq!(slots.len(), 14);
        assert_eq!(slots[0]["available_quantity"], 3);
        let slot_id = slots[0]["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/api/slots/{}", slot_id))
            .insert_header((header::AUTHORIZATION, token))
            .set_json(json!({ "max_quantity": 5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["max_quantity"], 5);
    }

    #[actix_rt::test]
    async fn test_inverted_range_rejected() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let service_id = insert_service(&pool, "HPV", 200_000).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/public/services/{}/slots?from=2030-05-10&to=2030-05-01", service_id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
