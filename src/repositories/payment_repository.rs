// src/repositories/payment_repository.rs
use sqlx::{SqliteConnection, SqlitePool};
use crate::error::ApiResult;
use crate::models::Payment;

pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn find_by_transaction_id(
        conn: &mut SqliteConnection,
        transaction_id: &str,
    ) -> ApiResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE transaction_id = ?")
            .bind(transaction_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(payment)
    }

    pub async fn find_by_booking_id(
        conn: &mut SqliteConnection,
        booking_id: &str,
    ) -> ApiResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE booking_id = ?")
            .bind(booking_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(payment)
    }

    /// Inserts unless the gateway transaction id is already recorded.
    /// Returns `false` for a replayed transaction.
    pub async fn insert_if_absent(conn: &mut SqliteConnection, payment: &Payment) -> ApiResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, transaction_id, amount, method, bank_code, response_code, paid_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_id) DO NOTHING
            "#
        )
            .bind(&payment.id)
            .bind(&payment.booking_id)
            .bind(&payment.transaction_id)
            .bind(payment.amount)
            .bind(&payment.method)
            .bind(&payment.bank_code)
            .bind(&payment.response_code)
            .bind(payment.paid_at)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> ApiResult<(Vec<Payment>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(pool)
            .await?;
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments ORDER BY paid_at DESC LIMIT ? OFFSET ?"
        )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok((payments, total))
    }

    pub async fn revenue_total(pool: &SqlitePool) -> ApiResult<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payments")
            .fetch_one(pool)
            .await?;
        Ok(total)
    }
}
