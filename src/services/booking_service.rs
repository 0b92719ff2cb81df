// src/services/booking_service.rs
use chrono::{Local, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;
use crate::auth::Claims;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Booking, BookingDetail, BookingDetailStatus, BookingDetailView, BookingStatus,
    BookingWithDetails, CreateBookingDetailRequest,
};
use crate::repositories::{
    BookingDetailRepository, BookingRepository, NotificationRepository, ServiceRepository, SlotRepository,
};
use crate::validator::validate_booking_detail;

/// Result of removing a line item from a cart.
#[derive(Debug, Serialize)]
pub struct DetailRemoval {
    pub detail_id: String,
    pub booking_id: String,
    pub booking_deleted: bool,
}

/// The one place detail status changes are decided.
///
/// Details only move forward (`pending -> tested -> result_ready`,
/// `pending|tested -> missed`) and nothing moves while the booking is
/// still an unpaid cart.
pub fn check_detail_transition(
    booking_status: BookingStatus,
    from: BookingDetailStatus,
    to: BookingDetailStatus,
) -> ApiResult<()> {
    if !from.can_transition_to(to) {
        return Err(ApiError::invalid_transition(from.as_ref(), to.as_ref()));
    }
    if booking_status == BookingStatus::Pending {
        return Err(ApiError::conflict("Booking has not been paid yet"));
    }
    Ok(())
}

fn ensure_booking_access(claims: &Claims, booking: &Booking) -> ApiResult<()> {
    if booking.account_id == claims.sub || claims.role.can_view_all_bookings() {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

#[derive(Clone)]
pub struct BookingService {
    pool: SqlitePool,
    default_max_quantity: i64,
}

impl BookingService {
    pub fn new(pool: SqlitePool, default_max_quantity: i64) -> Self {
        Self { pool, default_max_quantity }
    }

    // ==================== CART ====================

    /// Reserves a place in the (service, date, shift) slot and adds the
    /// line item to the account's pending booking, creating either as needed.
    pub async fn create_booking_detail(
        &self,
        account_id: &str,
        request: &CreateBookingDetailRequest,
    ) -> ApiResult<BookingDetail> {
        validate_booking_detail(request, Local::now().date_naive()).into_result()?;
        let service = ServiceRepository::get_active(&self.pool, &request.service_id).await?;

        let mut tx = self.pool.begin().await?;

        let booking = match &request.booking_id {
            Some(booking_id) => {
                let booking = BookingRepository::get_by_id(&mut *tx, booking_id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("Booking"))?;
                if booking.account_id != account_id {
                    return Err(ApiError::forbidden());
                }
                if !booking.status.is_editable() {
                    return Err(ApiError::conflict("Booking can no longer be changed"));
                }
                booking
            }
            None => match BookingRepository::find_pending_for_account(&mut *tx, account_id).await? {
                Some(booking) => booking,
                None => BookingRepository::create(&mut *tx, account_id).await?,
            },
        };

        let slot = SlotRepository::find_or_create_slot(
            &mut *tx,
            &service.id,
            request.slot_date,
            request.shift,
            self.default_max_quantity,
        )
        .await?;

        if !SlotRepository::increment_current_quantity(&mut *tx, &slot.id).await? {
            log::warn!(
                "Slot {} ({} {} {}) is full, rejecting booking detail",
                slot.id, service.name, request.slot_date, request.shift
            );
            return Err(ApiError::slot_full(&request.slot_date, request.shift.as_ref()));
        }

        let now = Utc::now();
        let detail = BookingDetail {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            service_id: service.id.clone(),
            slot_id: slot.id.clone(),
            price: service.price,
            full_name: request.full_name.trim().to_string(),
            date_of_birth: request.date_of_birth,
            gender: request.gender,
            phone: request.phone.trim().to_string(),
            slot_date: request.slot_date,
            shift: request.shift,
            status: BookingDetailStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        };
        BookingDetailRepository::insert(&mut *tx, &detail).await?;

        tx.commit().await?;

        log::info!(
            "Booking detail {} added to booking {} ({} on {} {})",
            detail.id, booking.id, service.name, detail.slot_date, detail.shift
        );
        Ok(detail)
    }

    /// Releases the slot place and removes the line item; a booking left
    /// without details is deleted with it.
    pub async fn delete_booking_detail(&self, claims: &Claims, detail_id: &str) -> ApiResult<DetailRemoval> {
        let mut tx = self.pool.begin().await?;

        let detail = BookingDetailRepository::get_by_id(&mut *tx, detail_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking detail"))?;
        let booking = BookingRepository::get_by_id(&mut *tx, &detail.booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;

        ensure_booking_access(claims, &booking)?;
        if !booking.status.is_editable() {
            return Err(ApiError::conflict("Only details of unpaid bookings can be removed"));
        }

        if !SlotRepository::decrement_current_quantity(&mut *tx, &detail.slot_id).await? {
            log::warn!("Slot {} was already empty when releasing detail {}", detail.slot_id, detail.id);
        }
        BookingDetailRepository::delete(&mut *tx, &detail.id).await?;

        let remaining = BookingDetailRepository::count_for_booking(&mut *tx, &booking.id).await?;
        let booking_deleted = remaining == 0;
        if booking_deleted {
            BookingRepository::delete(&mut *tx, &booking.id).await?;
        }

        tx.commit().await?;

        log::info!(
            "Booking detail {} removed from booking {}{}",
            detail.id,
            booking.id,
            if booking_deleted { " (booking deleted)" } else { "" }
        );

        Ok(DetailRemoval {
            detail_id: detail.id,
            booking_id: booking.id,
            booking_deleted,
        })
    }

    // ==================== STATUS MACHINE ====================

    pub async fn update_detail_status(
        &self,
        detail_id: &str,
        next: BookingDetailStatus,
        result: Option<&str>,
    ) -> ApiResult<BookingDetail> {
        let mut tx = self.pool.begin().await?;

        let detail = BookingDetailRepository::get_by_id(&mut *tx, detail_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking detail"))?;
        let booking = BookingRepository::get_by_id(&mut *tx, &detail.booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;

        check_detail_transition(booking.status, detail.status, next)?;
        if !BookingDetailRepository::update_status(&mut *tx, &detail.id, detail.status, next, result).await? {
            return Err(ApiError::conflict("Booking detail was modified concurrently"));
        }
        if next == BookingDetailStatus::ResultReady {
            NotificationRepository::create(
                &mut *tx,
                &booking.account_id,
                "Test result ready",
                &format!("The result for {} ({}) is available.", detail.full_name, detail.slot_date),
            )
            .await?;
        }
        Self::complete_if_finished(&mut *tx, &booking.id).await?;

        let updated = BookingDetailRepository::get_by_id(&mut *tx, &detail.id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking detail"))?;
        tx.commit().await?;

        log::info!("Booking detail {} moved {} -> {}", detail.id, detail.status, next);
        Ok(updated)
    }

    /// Applies `next` to every detail of the booking for which the
    /// transition is legal; the others keep their status. Returns how many
    /// details changed.
    pub async fn update_status_by_booking_id(&self, booking_id: &str, next: BookingDetailStatus) -> ApiResult<u64> {
        let mut tx = self.pool.begin().await?;

        let booking = BookingRepository::get_by_id(&mut *tx, booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;
        if booking.status == BookingStatus::Pending {
            return Err(ApiError::conflict("Booking has not been paid yet"));
        }

        let details = BookingDetailRepository::list_for_booking(&mut *tx, &booking.id).await?;
        let mut updated = 0;
        for detail in &details {
            if check_detail_transition(booking.status, detail.status, next).is_err() {
                continue;
            }
            if BookingDetailRepository::update_status(&mut *tx, &detail.id, detail.status, next, None).await? {
                updated += 1;
            }
        }

        if updated > 0 && next == BookingDetailStatus::ResultReady {
            NotificationRepository::create(
                &mut *tx,
                &booking.account_id,
                "Test results ready",
                "Results for your booking are available.",
            )
            .await?;
        }
        Self::complete_if_finished(&mut *tx, &booking.id).await?;

        tx.commit().await?;

        log::info!("Booking {}: {} of {} details moved to {}", booking.id, updated, details.len(), next);
        Ok(updated)
    }

    /// `pending -> paid`; joins the caller's transaction.
    pub async fn mark_booking_paid(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<()> {
        if BookingRepository::update_status(conn, booking_id, BookingStatus::Pending, BookingStatus::Paid).await? {
            return Ok(());
        }

        match BookingRepository::get_by_id(conn, booking_id).await? {
            None => Err(ApiError::not_found("Booking")),
            Some(booking) => Err(ApiError::invalid_transition(
                booking.status.as_ref(),
                BookingStatus::Paid.as_ref(),
            )),
        }
    }

    /// `paid -> completed` once every detail is result_ready or missed.
    async fn complete_if_finished(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<bool> {
        let total = BookingDetailRepository::count_for_booking(conn, booking_id).await?;
        let open = BookingDetailRepository::count_open_for_booking(conn, booking_id).await?;
        if total == 0 || open > 0 {
            return Ok(false);
        }

        let completed =
            BookingRepository::update_status(conn, booking_id, BookingStatus::Paid, BookingStatus::Completed).await?;
        if completed {
            log::info!("Booking {} completed", booking_id);
        }
        Ok(completed)
    }

    // ==================== QUERIES ====================

    async fn with_details(conn: &mut SqliteConnection, booking: Booking) -> ApiResult<BookingWithDetails> {
        let details = BookingDetailRepository::list_views_for_booking(conn, &booking.id).await?;
        Ok(BookingWithDetails::new(booking, details))
    }

    pub async fn get_booking(&self, claims: &Claims, booking_id: &str) -> ApiResult<BookingWithDetails> {
        let mut conn = self.pool.acquire().await?;
        let booking = BookingRepository::get_by_id(&mut *conn, booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;
        ensure_booking_access(claims, &booking)?;
        Self::with_details(&mut *conn, booking).await
    }

    /// The account's open cart, if it has one.
    pub async fn current_cart(&self, account_id: &str) -> ApiResult<Option<BookingWithDetails>> {
        let mut conn = self.pool.acquire().await?;
        match BookingRepository::find_pending_for_account(&mut *conn, account_id).await? {
            Some(booking) => Ok(Some(Self::with_details(&mut *conn, booking).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_account(&self, account_id: &str) -> ApiResult<Vec<BookingWithDetails>> {
        let mut conn = self.pool.acquire().await?;
        let bookings = BookingRepository::list_for_account(&mut *conn, account_id).await?;
        let mut result = Vec::with_capacity(bookings.len());
        for booking in bookings {
            result.push(Self::with_details(&mut *conn, booking).await?);
        }
        Ok(result)
    }

    pub async fn list_all(
        &self,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<BookingWithDetails>, i64)> {
        let mut conn = self.pool.acquire().await?;
        let (bookings, total) = BookingRepository::list_all(&mut *conn, status, limit, offset).await?;
        let mut result = Vec::with_capacity(bookings.len());
        for booking in bookings {
            result.push(Self::with_details(&mut *conn, booking).await?);
        }
        Ok((result, total))
    }

    /// Lab worklist of details in the given status.
    pub async fn worklist(&self, status: BookingDetailStatus) -> ApiResult<Vec<BookingDetailView>> {
        let mut conn = self.pool.acquire().await?;
        BookingDetailRepository::list_views_by_status(&mut *conn, status).await
    }
}
