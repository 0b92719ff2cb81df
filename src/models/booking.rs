// src/models/booking.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumString};
use super::slot::Shift;

// === STATUSES ===

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Paid,
    Completed,
}

impl BookingStatus {
    /// Booking-level transitions: pending -> paid -> completed.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Paid)
                | (BookingStatus::Paid, BookingStatus::Completed)
        )
    }

    pub fn is_editable(self) -> bool {
        self == BookingStatus::Pending
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingDetailStatus {
    Pending,
    Tested,
    ResultReady,
    Missed,
}

impl BookingDetailStatus {
    /// Strictly forward: pending -> tested -> result_ready, pending|tested -> missed.
    pub fn can_transition_to(self, next: BookingDetailStatus) -> bool {
        use BookingDetailStatus::*;
        matches!(
            (self, next),
            (Pending, Tested) | (Tested, ResultReady) | (Pending, Missed) | (Tested, Missed)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, BookingDetailStatus::ResultReady | BookingDetailStatus::Missed)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

// === ENTITIES ===

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Booking {
    pub id: String,
    pub account_id: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BookingDetail {
    pub id: String,
    pub booking_id: String,
    pub service_id: String,
    pub slot_id: String,
    /// Service price when the detail was booked
    pub price: i64,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: String,
    pub slot_date: NaiveDate,
    pub shift: Shift,
    pub status: BookingDetailStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Detail row joined with the service it was booked for.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct BookingDetailView {
    pub id: String,
    pub booking_id: String,
    pub service_id: String,
    pub service_name: String,
    pub price: i64,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: String,
    pub slot_date: NaiveDate,
    pub shift: Shift,
    pub status: BookingDetailStatus,
    pub result: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingWithDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub details: Vec<BookingDetailView>,
    pub total_amount: i64,
}

impl BookingWithDetails {
    pub fn new(booking: Booking, details: Vec<BookingDetailView>) -> Self {
        let total_amount = details.iter().map(|d| d.price).sum();
        Self { booking, details, total_amount }
    }
}

// === REQUESTS ===

/// Person and schedule for one test line item.
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateBookingDetailRequest {
    pub booking_id: Option<String>,
    #[validate(length(min = 1, message = "Service is required"))]
    pub service_id: String,
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[validate(length(min = 9, max = 15, message = "Phone must be 9-15 characters"))]
    pub phone: String,
    pub slot_date: NaiveDate,
    pub shift: Shift,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDetailStatusRequest {
    pub status: BookingDetailStatus,
    #[validate(length(max = 5000, message = "Result cannot exceed 5000 characters"))]
    pub result: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CascadeStatusRequest {
    pub status: BookingDetailStatus,
}
