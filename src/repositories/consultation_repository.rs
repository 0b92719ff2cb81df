// src/repositories/consultation_repository.rs
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use crate::error::{ApiError, ApiResult};
use crate::models::{ConsultationBooking, ConsultationStatus, CreateConsultationRequest};

/// Length of one consultation appointment.
pub const CONSULTATION_MINUTES: i64 = 60;

pub struct ConsultationRepository;

impl ConsultationRepository {
    pub async fn create(
        pool: &SqlitePool,
        customer_id: Option<&str>,
        request: &CreateConsultationRequest,
    ) -> ApiResult<ConsultationBooking> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO consultation_bookings (
                id, customer_id, guest_name, guest_email, guest_phone, consultant_id,
                scheduled_at, note, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
            .bind(&id)
            .bind(customer_id)
            .bind(&request.guest_name)
            .bind(&request.guest_email)
            .bind(&request.guest_phone)
            .bind(&request.consultant_id)
            .bind(request.scheduled_at)
            .bind(&request.note)
            .bind(ConsultationStatus::Pending)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        Self::get_required(pool, &id).await
    }

    pub async fn get_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Option<ConsultationBooking>> {
        let booking = sqlx::query_as::<_, ConsultationBooking>("SELECT * FROM consultation_bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(booking)
    }

    pub async fn get_required(pool: &SqlitePool, id: &str) -> ApiResult<ConsultationBooking> {
        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::not_found("Consultation"))
    }

    /// Whether the consultant already has a live appointment overlapping
    /// the hour starting at `scheduled_at`.
    pub async fn has_conflict(
        pool: &SqlitePool,
        consultant_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> ApiResult<bool> {
        let window = Duration::minutes(CONSULTATION_MINUTES);
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM consultation_bookings
            WHERE consultant_id = ? AND status != ?
              AND scheduled_at > ? AND scheduled_at < ?
            "#
        )
            .bind(consultant_id)
            .bind(ConsultationStatus::Cancelled)
            .bind(scheduled_at - window)
            .bind(scheduled_at + window)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn list_for_customer(pool: &SqlitePool, customer_id: &str) -> ApiResult<Vec<ConsultationBooking>> {
        let bookings = sqlx::query_as::<_, ConsultationBooking>(
            "SELECT * FROM consultation_bookings WHERE customer_id = ? ORDER BY scheduled_at DESC"
        )
            .bind(customer_id)
            .fetch_all(pool)
            .await?;
        Ok(bookings)
    }

    pub async fn list_for_consultant(pool: &SqlitePool, consultant_id: &str) -> ApiResult<Vec<ConsultationBooking>> {
        let bookings = sqlx::query_as::<_, ConsultationBooking>(
            "SELECT * FROM consultation_bookings WHERE consultant_id = ? ORDER BY scheduled_at ASC"
        )
            .bind(consultant_id)
            .fetch_all(pool)
            .await?;
        Ok(bookings)
    }

    pub async fn list_all(pool: &SqlitePool, limit: i64, offset: i64) -> ApiResult<(Vec<ConsultationBooking>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consultation_bookings")
            .fetch_one(pool)
            .await?;
        let bookings = sqlx::query_as::<_, ConsultationBooking>(
            "SELECT * FROM consultation_bookings ORDER BY scheduled_at DESC LIMIT ? OFFSET ?"
        )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok((bookings, total))
    }

    pub async fn count_upcoming(pool: &SqlitePool) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM consultation_bookings WHERE status != ? AND scheduled_at >= ?"
        )
            .bind(ConsultationStatus::Cancelled)
            .bind(Utc::now())
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    /// Applies a status change if it is legal from the stored status.
    pub async fn update_status(
        pool: &SqlitePool,
        id: &str,
        next: ConsultationStatus,
    ) -> ApiResult<ConsultationBooking> {
        let current = Self::get_required(pool, id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ApiError::invalid_transition(current.status.as_ref(), next.as_ref()));
        }

        let result = sqlx::query(
            "UPDATE consultation_bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
            .bind(next)
            .bind(Utc::now())
            .bind(id)
            .bind(current.status)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::conflict("Consultation was modified concurrently"));
        }

        Self::get_required(pool, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn request(consultant_id: &str, scheduled_at: DateTime<Utc>) -> CreateConsultationRequest {
        CreateConsultationRequest {
            consultant_id: consultant_id.to_string(),
            scheduled_at,
            guest_name: Some("Pham Thi D".to_string()),
            guest_email: Some("d@example.com".to_string()),
            guest_phone: Some("0912345678".to_string()),
            note: None,
        }
    }

    #[actix_rt::test]
    async fn test_overlapping_appointments_conflict() {
        let pool = test_pool().await;
        let consultant = insert_account(&pool, "consultant@example.com", "consultant").await;
        let at = Utc::now() + Duration::days(3);

        let booked = ConsultationRepository::create(&pool, None, &request(&consultant, at)).await.unwrap();
        assert_eq!(booked.status, ConsultationStatus::Pending);

        assert!(ConsultationRepository::has_conflict(&pool, &consultant, at + Duration::minutes(30)).await.unwrap());
        assert!(!ConsultationRepository::has_conflict(&pool, &consultant, at + Duration::minutes(60)).await.unwrap());

        // Cancelled appointments free the time
        ConsultationRepository::update_status(&pool, &booked.id, ConsultationStatus::Cancelled).await.unwrap();
        assert!(!ConsultationRepository::has_conflict(&pool, &consultant, at).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_illegal_transition_is_rejected() {
        let pool = test_pool().await;
        let consultant = insert_account(&pool, "c2@example.com", "consultant").await;
        let booked = ConsultationRepository::create(&pool, None, &request(&consultant, Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        ConsultationRepository::update_status(&pool, &booked.id, ConsultationStatus::Cancelled).await.unwrap();
        let err = ConsultationRepository::update_status(&pool, &booked.id, ConsultationStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
