// src/repositories/booking_detail_repository.rs
use chrono::Utc;
use sqlx::SqliteConnection;
use crate::error::ApiResult;
use crate::models::{BookingDetail, BookingDetailStatus, BookingDetailView};

const VIEW_SELECT: &str = r#"
    SELECT d.id, d.booking_id, d.service_id, s.name AS service_name, d.price,
           d.full_name, d.date_of_birth, d.gender, d.phone, d.slot_date, d.shift,
           d.status, d.result
    FROM booking_details d
    JOIN services s ON s.id = d.service_id
"#;

pub struct BookingDetailRepository;

impl BookingDetailRepository {
    pub async fn insert(conn: &mut SqliteConnection, detail: &BookingDetail) -> ApiResult<()> {
        sqlx::query(
            r#"
            INSERT INTO booking_details (
                id, booking_id, service_id, slot_id, price, full_name, date_of_birth, gender, phone,
                slot_date, shift, status, result, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
            .bind(&detail.id)
            .bind(&detail.booking_id)
            .bind(&detail.service_id)
            .bind(&detail.slot_id)
            .bind(detail.price)
            .bind(&detail.full_name)
            .bind(detail.date_of_birth)
            .bind(detail.gender)
            .bind(&detail.phone)
            .bind(detail.slot_date)
            .bind(detail.shift)
            .bind(detail.status)
            .bind(&detail.result)
            .bind(detail.created_at)
            .bind(detail.updated_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> ApiResult<Option<BookingDetail>> {
        let detail = sqlx::query_as::<_, BookingDetail>("SELECT * FROM booking_details WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(detail)
    }

    pub async fn list_for_booking(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<Vec<BookingDetail>> {
        let details = sqlx::query_as::<_, BookingDetail>(
            "SELECT * FROM booking_details WHERE booking_id = ? ORDER BY created_at ASC"
        )
            .bind(booking_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(details)
    }

    pub async fn list_views_for_booking(
        conn: &mut SqliteConnection,
        booking_id: &str,
    ) -> ApiResult<Vec<BookingDetailView>> {
        let sql = format!("{} WHERE d.booking_id = ? ORDER BY d.created_at ASC", VIEW_SELECT);
        let details = sqlx::query_as::<_, BookingDetailView>(&sql)
            .bind(booking_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(details)
    }

    /// Lab worklist: every detail currently in `status`, earliest slot first.
    pub async fn list_views_by_status(
        conn: &mut SqliteConnection,
        status: BookingDetailStatus,
    ) -> ApiResult<Vec<BookingDetailView>> {
        let sql = format!("{} WHERE d.status = ? ORDER BY d.slot_date ASC, d.shift ASC", VIEW_SELECT);
        let details = sqlx::query_as::<_, BookingDetailView>(&sql)
            .bind(status)
            .fetch_all(&mut *conn)
            .await?;
        Ok(details)
    }

    pub async fn count_for_booking(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM booking_details WHERE booking_id = ?")
            .bind(booking_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Details of the booking that have not reached a final status.
    pub async fn count_open_for_booking(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM booking_details WHERE booking_id = ? AND status NOT IN (?, ?)"
        )
            .bind(booking_id)
            .bind(BookingDetailStatus::ResultReady)
            .bind(BookingDetailStatus::Missed)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    pub async fn count_by_status(conn: &mut SqliteConnection, status: BookingDetailStatus) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM booking_details WHERE status = ?")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    /// Moves one detail from `from` to `to`; `false` when it was no longer in `from`.
    /// The result text is only overwritten when one is given.
    pub async fn update_status(
        conn: &mut SqliteConnection,
        id: &str,
        from: BookingDetailStatus,
        to: BookingDetailStatus,
        result: Option<&str>,
    ) -> ApiResult<bool> {
        let outcome = sqlx::query(
            r#"
            UPDATE booking_details
            SET status = ?, result = COALESCE(?, result), updated_at = ?
            WHERE id = ? AND status = ?
            "#
        )
            .bind(to)
            .bind(result)
            .bind(Utc::now())
            .bind(id)
            .bind(from)
            .execute(&mut *conn)
            .await?;
        Ok(outcome.rows_affected() == 1)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM booking_details WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Whether the account has a finished test of this service (feedback eligibility).
    pub async fn has_result_for_service(
        conn: &mut SqliteConnection,
        account_id: &str,
        service_id: &str,
    ) -> ApiResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM booking_details d
            JOIN bookings b ON b.id = d.booking_id
            WHERE b.account_id = ? AND d.service_id = ? AND d.status = ?
            "#
        )
            .bind(account_id)
            .bind(service_id)
            .bind(BookingDetailStatus::ResultReady)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }
}
