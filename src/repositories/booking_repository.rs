// src/repositories/booking_repository.rs
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;
use crate::error::ApiResult;
use crate::models::{Booking, BookingStatus};

pub struct BookingRepository;

impl BookingRepository {
    pub async fn create(conn: &mut SqliteConnection, account_id: &str) -> ApiResult<Booking> {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO bookings (id, account_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?)"
        )
            .bind(&booking.id)
            .bind(&booking.account_id)
            .bind(booking.status)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *conn)
            .await?;

        Ok(booking)
    }

    pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> ApiResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(booking)
    }

    /// The customer's open cart, if any.
    pub async fn find_pending_for_account(
        conn: &mut SqliteConnection,
        account_id: &str,
    ) -> ApiResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE account_id = ? AND status = ? ORDER BY created_at DESC LIMIT 1"
        )
            .bind(account_id)
            .bind(BookingStatus::Pending)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(booking)
    }

    pub async fn list_for_account(conn: &mut SqliteConnection, account_id: &str) -> ApiResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE account_id = ? ORDER BY created_at DESC"
        )
            .bind(account_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(bookings)
    }

    /// Page of bookings across all accounts, optionally filtered by status.
    pub async fn list_all(
        conn: &mut SqliteConnection,
        status: Option<BookingStatus>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<Booking>, i64)> {
        let (bookings, total) = match status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE status = ?")
                    .bind(status)
                    .fetch_one(&mut *conn)
                    .await?;
                let rows = sqlx::query_as::<_, Booking>(
                    "SELECT * FROM bookings WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?"
                )
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await?;
                (rows, total)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
                    .fetch_one(&mut *conn)
                    .await?;
                let rows = sqlx::query_as::<_, Booking>(
                    "SELECT * FROM bookings ORDER BY created_at DESC LIMIT ? OFFSET ?"
                )
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await?;
                (rows, total)
            }
        };
        Ok((bookings, total))
    }

    /// Moves a booking from `from` to `to`; `false` when it was not in `from`.
    pub async fn update_status(
        conn: &mut SqliteConnection,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
            .bind(to)
            .bind(Utc::now())
            .bind(id)
            .bind(from)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Sum of the prices captured on the booking's details.
    pub async fn total_amount(conn: &mut SqliteConnection, booking_id: &str) -> ApiResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(price), 0) FROM booking_details WHERE booking_id = ?"
        )
            .bind(booking_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(total)
    }

    pub async fn count_by_status(conn: &mut SqliteConnection, status: BookingStatus) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE status = ?")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    #[actix_rt::test]
    async fn test_create_and_find_pending() {
        let pool = test_pool().await;
        let account_id = insert_account(&pool, "cart@example.com", "customer").await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(BookingRepository::find_pending_for_account(&mut *conn, &account_id).await.unwrap().is_none());

        let booking = BookingRepository::create(&mut *conn, &account_id).await.unwrap();
        let found = BookingRepository::find_pending_for_account(&mut *conn, &account_id).await.unwrap().unwrap();
        assert_eq!(found.id, booking.id);
        assert_eq!(found.status, BookingStatus::Pending);
    }

    #[actix_rt::test]
    async fn test_conditional_status_update() {
        let pool = test_pool().await;
        let account_id = insert_account(&pool, "pay@example.com", "customer").await;
        let mut conn = pool.acquire().await.unwrap();
        let booking = BookingRepository::create(&mut *conn, &account_id).await.unwrap();

        assert!(BookingRepository::update_status(&mut *conn, &booking.id, BookingStatus::Pending, BookingStatus::Paid).await.unwrap());
        // Second attempt sees the row already moved
        assert!(!BookingRepository::update_status(&mut *conn, &booking.id, BookingStatus::Pending, BookingStatus::Paid).await.unwrap());

        assert!(BookingRepository::find_pending_for_account(&mut *conn, &account_id).await.unwrap().is_none());
        assert_eq!(BookingRepository::count_by_status(&mut *conn, BookingStatus::Paid).await.unwrap(), 1);
    }

    #[actix_rt::test]
    async fn test_total_amount_of_empty_booking_is_zero() {
        let pool = test_pool().await;
        let account_id = insert_account(&pool, "empty@example.com", "customer").await;
        let mut conn = pool.acquire().await.unwrap();
        let booking = BookingRepository::create(&mut *conn, &account_id).await.unwrap();
        assert_eq!(BookingRepository::total_amount(&mut *conn, &booking.id).await.unwrap(), 0);
    }
}
