// src/consultation_handlers.rs - Consultation appointments
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use serde::Deserialize;
use validator::Validate;
use crate::audit::audit;
use crate::auth::{get_current_user, get_optional_user, require_permission, Claims};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{ConsultationBooking, ConsultationStatus, CreateConsultationRequest, Role};
use crate::repositories::{AccountRepository, ConsultationRepository, NotificationRepository, TokenRepository};
use crate::validator::{FieldValidator, ValidationResult};
use crate::AppState;

/// Guests must leave a name and at least one way to reach them.
fn validate_guest_contact(request: &CreateConsultationRequest) -> ApiResult<()> {
    let mut result = ValidationResult::new();

    match request.guest_name.as_deref() {
        Some(name) => result.check("guest_name", FieldValidator::not_empty(name, "Name")),
        None => result.add_error("guest_name", "Name is required for guest bookings"),
    }
    if request.guest_email.is_none() && request.guest_phone.is_none() {
        result.add_error("guest_contact", "Email or phone is required for guest bookings");
    }
    if let Some(phone) = request.guest_phone.as_deref() {
        result.check("guest_phone", FieldValidator::phone(phone));
    }
    if let Some(email) = request.guest_email.as_deref() {
        result.check("guest_email", FieldValidator::email(email));
    }

    result.into_result()
}

async fn notify(app_state: &AppState, account_id: &str, title: &str, message: &str) -> ApiResult<()> {
    let mut conn = app_state.db_pool.acquire().await?;
    NotificationRepository::create(&mut *conn, account_id, title, message).await?;
    Ok(())
}

/// Open to guests and signed-in customers alike.
pub async fn create_consultation(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreateConsultationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let claims = match get_optional_user(&http_request) {
        Some(claims) if TokenRepository::is_blacklisted(&app_state.db_pool, &claims.jti).await? => {
            return Err(ApiError::Unauthorized("Token has been revoked".to_string()));
        }
        other => other,
    };
    if claims.is_none() {
        validate_guest_contact(&request)?;
    }

    if request.scheduled_at <= Utc::now() {
        return Err(ApiError::bad_request("Appointment time must be in the future"));
    }

    let consultant = AccountRepository::find_by_id(&app_state.db_pool, &request.consultant_id)
        .await?
        .filter(|account| account.role == Role::Consultant && account.is_active)
        .ok_or_else(|| ApiError::not_found("Consultant"))?;

    if ConsultationRepository::has_conflict(&app_state.db_pool, &consultant.id, request.scheduled_at).await? {
        return Err(ApiError::conflict("The consultant is already booked at this time"));
    }

    let customer_id = claims.as_ref().map(|c| c.sub.as_str());
    let booking = ConsultationRepository::create(&app_state.db_pool, customer_id, &request).await?;

    notify(
        &app_state,
        &consultant.id,
        "New consultation request",
        &format!("A consultation was requested for {}.", booking.scheduled_at.format("%Y-%m-%d %H:%M UTC")),
    ).await?;

    audit(&app_state.db_pool, customer_id, "create", "consultation", &booking.id,
          &format!("Consultation with {} at {}", consultant.full_name, booking.scheduled_at),
          Some(&http_request)).await;
    log::info!("Consultation {} booked with consultant {}", booking.id, consultant.id);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        booking,
        "Consultation booked".to_string(),
    )))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub at: DateTime<Utc>,
}

pub async fn check_consultant_availability(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    query: web::Query<AvailabilityQuery>,
) -> ApiResult<HttpResponse> {
    let consultant_id = path.into_inner();
    let busy = ConsultationRepository::has_conflict(&app_state.db_pool, &consultant_id, query.at).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
        "consultant_id": consultant_id,
        "at": query.at,
        "available": !busy,
    }))))
}

pub async fn get_my_consultations(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let bookings = ConsultationRepository::list_for_customer(&app_state.db_pool, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(bookings)))
}

pub async fn get_assigned_consultations(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    if claims.role != Role::Consultant {
        return Err(ApiError::forbidden());
    }
    let bookings = ConsultationRepository::list_for_consultant(&app_state.db_pool, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(bookings)))
}

pub async fn get_all_consultations(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_manage_consultations)?;

    let (page, per_page, offset) = query.normalize();
    let (bookings, total) = ConsultationRepository::list_all(&app_state.db_pool, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(bookings, total, page, per_page))))
}

fn is_assigned_or_manager(claims: &Claims, booking: &ConsultationBooking) -> bool {
    booking.consultant_id == claims.sub || claims.role.can_manage_consultations()
}

pub async fn confirm_consultation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let booking = ConsultationRepository::get_required(&app_state.db_pool, &path.into_inner()).await?;
    if !is_assigned_or_manager(&claims, &booking) {
        return Err(ApiError::forbidden());
    }

    let booking =
        ConsultationRepository::update_status(&app_state.db_pool, &booking.id, ConsultationStatus::Confirmed).await?;

    if let Some(customer_id) = booking.customer_id.as_deref() {
        notify(
            &app_state,
            customer_id,
            "Consultation confirmed",
            &format!("Your consultation on {} is confirmed.", booking.scheduled_at.format("%Y-%m-%d %H:%M UTC")),
        ).await?;
    }

    audit(&app_state.db_pool, Some(&claims.sub), "confirm", "consultation", &booking.id,
          "Consultation confirmed", Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        booking,
        "Consultation confirmed".to_string(),
    )))
}

pub async fn cancel_consultation(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let booking = ConsultationRepository::get_required(&app_state.db_pool, &path.into_inner()).await?;

    let is_owner = booking.customer_id.as_deref() == Some(claims.sub.as_str());
    if !is_owner && !is_assigned_or_manager(&claims, &booking) {
        return Err(ApiError::forbidden());
    }

    let booking =
        ConsultationRepository::update_status(&app_state.db_pool, &booking.id, ConsultationStatus::Cancelled).await?;

    let counterpart = if is_owner { Some(booking.consultant_id.as_str()) } else { booking.customer_id.as_deref() };
    if let Some(account_id) = counterpart {
        notify(
            &app_state,
            account_id,
            "Consultation cancelled",
            &format!("The consultation on {} was cancelled.", booking.scheduled_at.format("%Y-%m-%d %H:%M UTC")),
        ).await?;
    }

    audit(&app_state.db_pool, Some(&claims.sub), "cancel", "consultation", &booking.id,
          "Consultation cancelled", Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        booking,
        "Consultation cancelled".to_string(),
    )))
}
