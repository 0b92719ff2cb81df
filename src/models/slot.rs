// src/models/slot.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, NaiveDate, Utc};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Shift {
    Am,
    Pm,
}

impl Shift {
    pub fn all() -> [Shift; 2] {
        [Shift::Am, Shift::Pm]
    }
}

/// A (service, date, shift) capacity bucket.
///
/// `0 <= current_quantity <= max_quantity` is enforced both by the
/// conditional updates in `SlotRepository` and by a CHECK constraint.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct TestServiceSlot {
    pub id: String,
    pub service_id: String,
    pub slot_date: NaiveDate,
    pub shift: Shift,
    pub max_quantity: i64,
    pub current_quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl TestServiceSlot {
    pub fn available_quantity(&self) -> i64 {
        (self.max_quantity - self.current_quantity).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.current_quantity >= self.max_quantity
    }
}

#[derive(Debug, Serialize)]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: TestServiceSlot,
    pub available_quantity: i64,
}

impl From<TestServiceSlot> for SlotAvailability {
    fn from(slot: TestServiceSlot) -> Self {
        let available_quantity = slot.available_quantity();
        Self { slot, available_quantity }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateSlotsRequest {
    #[validate(range(min = 1, max = 12, message = "Weeks must be between 1 and 12"))]
    pub weeks: u32,
    #[validate(range(min = 1, max = 1000, message = "Max quantity must be between 1 and 1000"))]
    pub max_quantity: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSlotCapacityRequest {
    #[validate(range(min = 1, max = 1000, message = "Max quantity must be between 1 and 1000"))]
    pub max_quantity: i64,
}
