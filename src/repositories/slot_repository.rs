// src/repositories/slot_repository.rs
//! Capacity counters for (service, date, shift) slots.

use chrono::{Duration, Local, NaiveDate, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;
use crate::error::{ApiError, ApiResult};
use crate::models::{Shift, TestServiceSlot};

pub struct SlotRepository;

impl SlotRepository {
    pub async fn get_by_id(conn: &mut SqliteConnection, slot_id: &str) -> ApiResult<Option<TestServiceSlot>> {
        let slot = sqlx::query_as::<_, TestServiceSlot>("SELECT * FROM test_service_slots WHERE id = ?")
            .bind(slot_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(slot)
    }

    pub async fn find_slot(
        conn: &mut SqliteConnection,
        service_id: &str,
        date: NaiveDate,
        shift: Shift,
    ) -> ApiResult<Option<TestServiceSlot>> {
        let slot = sqlx::query_as::<_, TestServiceSlot>(
            "SELECT * FROM test_service_slots WHERE service_id = ? AND slot_date = ? AND shift = ?"
        )
            .bind(service_id)
            .bind(date)
            .bind(shift)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(slot)
    }

    /// Returns the slot for (service, date, shift), creating it empty with
    /// `max_quantity` capacity when absent. Concurrent callers converge on
    /// the same row through the UNIQUE constraint.
    pub async fn find_or_create_slot(
        conn: &mut SqliteConnection,
        service_id: &str,
        date: NaiveDate,
        shift: Shift,
        max_quantity: i64,
    ) -> ApiResult<TestServiceSlot> {
        Self::insert_if_absent(conn, service_id, date, shift, max_quantity).await?;

        Self::find_slot(conn, service_id, date, shift)
            .await?
            .ok_or_else(|| ApiError::InternalServerError("Slot vanished after creation".to_string()))
    }

    async fn insert_if_absent(
        conn: &mut SqliteConnection,
        service_id: &str,
        date: NaiveDate,
        shift: Shift,
        max_quantity: i64,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO test_service_slots (id, service_id, slot_date, shift, max_quantity, current_quantity, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(service_id, slot_date, shift) DO NOTHING
            "#
        )
            .bind(Uuid::new_v4().to_string())
            .bind(service_id)
            .bind(date)
            .bind(shift)
            .bind(max_quantity)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Check-and-increment in a single statement; `false` when the slot is
    /// full (or missing), leaving the counter unchanged.
    pub async fn increment_current_quantity(conn: &mut SqliteConnection, slot_id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE test_service_slots SET current_quantity = current_quantity + 1 \
             WHERE id = ? AND current_quantity < max_quantity"
        )
            .bind(slot_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Floors at zero; `false` when there was nothing to release.
    pub async fn decrement_current_quantity(conn: &mut SqliteConnection, slot_id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE test_service_slots SET current_quantity = current_quantity - 1 \
             WHERE id = ? AND current_quantity > 0"
        )
            .bind(slot_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pre-creates AM and PM slots for every date of the next `weeks` weeks,
    /// starting today. Existing slots are left untouched.
    pub async fn generate_slots_for_upcoming_weeks(
        conn: &mut SqliteConnection,
        service_id: &str,
        weeks: u32,
        max_quantity: i64,
    ) -> ApiResult<usize> {
        let today = Local::now().date_naive();
        Self::generate_slots_from(conn, service_id, today, weeks, max_quantity).await
    }

    pub async fn generate_slots_from(
        conn: &mut SqliteConnection,
        service_id: &str,
        start: NaiveDate,
        weeks: u32,
        max_quantity: i64,
    ) -> ApiResult<usize> {
        if max_quantity < 1 {
            return Err(ApiError::ValidationError("Max quantity must be at least 1".to_string()));
        }

        let mut created = 0;
        for offset in 0..(weeks as i64 * 7) {
            let date = start + Duration::days(offset);
            for shift in Shift::all() {
                if Self::insert_if_absent(conn, service_id, date, shift, max_quantity).await? {
                    created += 1;
                }
            }
        }

        Ok(created)
    }

    pub async fn list_for_service(
        conn: &mut SqliteConnection,
        service_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> ApiResult<Vec<TestServiceSlot>> {
        let slots = sqlx::query_as::<_, TestServiceSlot>(
            r#"
            SELECT * FROM test_service_slots
            WHERE service_id = ? AND slot_date >= ? AND slot_date <= ?
            ORDER BY slot_date ASC, shift ASC
            "#
        )
            .bind(service_id)
            .bind(from)
            .bind(to)
            .fetch_all(&mut *conn)
            .await?;
        Ok(slots)
    }

    /// Changes a slot's capacity; it can never drop below what is already booked.
    pub async fn update_max_quantity(
        conn: &mut SqliteConnection,
        slot_id: &str,
        max_quantity: i64,
    ) -> ApiResult<TestServiceSlot> {
        let result = sqlx::query(
            "UPDATE test_service_slots SET max_quantity = ? WHERE id = ? AND current_quantity <= ?"
        )
            .bind(max_quantity)
            .bind(slot_id)
            .bind(max_quantity)
            .execute(&mut *conn)
            .await?;

        let slot = Self::get_by_id(conn, slot_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Slot"))?;

        if result.rows_affected() == 0 {
            return Err(ApiError::Conflict(format!(
                "Cannot set capacity to {}: {} places already booked",
                max_quantity, slot.current_quantity
            )));
        }

        Ok(slot)
    }
}
