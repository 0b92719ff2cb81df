// src/services/payment_service.rs
use std::collections::HashMap;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use crate::audit::audit;
use crate::error::{ApiError, ApiResult};
use crate::models::{BookingStatus, CallbackOutcome, Payment};
use crate::repositories::{BookingRepository, NotificationRepository, PaymentRepository};
use crate::services::BookingService;
use crate::vnpay::{PaymentUrlParams, VnPayCallback, VnPayClient};

const PAYMENT_METHOD: &str = "VNPAY";

pub struct PaymentService {
    pool: SqlitePool,
    vnpay: VnPayClient,
}

impl PaymentService {
    pub fn new(pool: SqlitePool, vnpay: VnPayClient) -> Self {
        Self { pool, vnpay }
    }

    /// Signed redirect URL for paying a pending booking in full.
    /// Nothing is persisted until the gateway calls back.
    pub async fn create_vnpay_url(
        &self,
        account_id: &str,
        booking_id: &str,
        amount: i64,
        description: Option<&str>,
        client_ip: &str,
    ) -> ApiResult<String> {
        let mut conn = self.pool.acquire().await?;

        let booking = BookingRepository::get_by_id(&mut *conn, booking_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;
        if booking.account_id != account_id {
            return Err(ApiError::forbidden());
        }
        if booking.status != BookingStatus::Pending {
            return Err(ApiError::conflict("Booking has already been paid"));
        }

        let total = BookingRepository::total_amount(&mut *conn, &booking.id).await?;
        if total <= 0 {
            return Err(ApiError::bad_request("Booking has no items to pay for"));
        }
        if amount != total {
            return Err(ApiError::BadRequest(format!(
                "Amount {} does not match booking total {}",
                amount, total
            )));
        }

        let order_info = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Thanh toan don hang {}", booking.id));

        let url = self.vnpay.build_payment_url(&PaymentUrlParams {
            txn_ref: &booking.id,
            amount,
            order_info: &order_info,
            ip_addr: client_ip,
            created_at: Utc::now(),
        })?;

        log::info!("VNPay URL issued for booking {} ({} VND)", booking.id, amount);
        Ok(url)
    }

    /// Processes one gateway callback (browser return or IPN).
    ///
    /// A successful callback records the payment and marks the booking
    /// paid in one transaction; a replay of an already recorded
    /// transaction returns that payment with `duplicate = true`. Failed
    /// payments persist nothing.
    pub async fn handle_callback(&self, params: &HashMap<String, String>) -> ApiResult<CallbackOutcome> {
        if !self.vnpay.verify(params) {
            log::warn!("Rejected VNPay callback with invalid signature");
            return Err(ApiError::Unauthorized("Invalid payment signature".to_string()));
        }
        let callback = VnPayCallback::from_params(params)?;

        if !callback.is_success() {
            log::info!(
                "VNPay reported failure {} for booking {}; nothing recorded",
                callback.response_code, callback.txn_ref
            );
            return Ok(CallbackOutcome {
                success: false,
                response_code: callback.response_code,
                booking_id: callback.txn_ref,
                payment: None,
                duplicate: false,
            });
        }

        let transaction_id = callback
            .transaction_no
            .clone()
            .ok_or_else(|| ApiError::bad_request("Missing callback parameter vnp_TransactionNo"))?;

        let mut tx = self.pool.begin().await?;

        if let Some(existing) = PaymentRepository::find_by_transaction_id(&mut *tx, &transaction_id).await? {
            tx.commit().await?;
            log::warn!("Duplicate VNPay callback for transaction {}", transaction_id);
            return Ok(CallbackOutcome {
                success: true,
                response_code: callback.response_code,
                booking_id: existing.booking_id.clone(),
                payment: Some(existing),
                duplicate: true,
            });
        }

        let booking = BookingRepository::get_by_id(&mut *tx, &callback.txn_ref)
            .await?
            .ok_or_else(|| ApiError::not_found("Booking"))?;

        if PaymentRepository::find_by_booking_id(&mut *tx, &booking.id).await?.is_some() {
            return Err(ApiError::duplicate_transaction(&transaction_id));
        }

        let total = BookingRepository::total_amount(&mut *tx, &booking.id).await?;
        if callback.amount != total {
            log::warn!(
                "VNPay amount {} does not match booking {} total {}",
                callback.amount, booking.id, total
            );
            return Err(ApiError::BadRequest(format!(
                "Paid amount {} does not match booking total {}",
                callback.amount, total
            )));
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            booking_id: booking.id.clone(),
            transaction_id: transaction_id.clone(),
            amount: callback.amount,
            method: PAYMENT_METHOD.to_string(),
            bank_code: callback.bank_code.clone(),
            response_code: callback.response_code.clone(),
            paid_at: Utc::now(),
        };

        if !PaymentRepository::insert_if_absent(&mut *tx, &payment).await? {
            return Err(ApiError::duplicate_transaction(&transaction_id));
        }
        BookingService::mark_booking_paid(&mut *tx, &booking.id).await?;
        NotificationRepository::create(
            &mut *tx,
            &booking.account_id,
            "Payment received",
            &format!("We received {} VND for your booking. See you at your appointment.", payment.amount),
        )
        .await?;

        tx.commit().await?;

        audit(
            &self.pool,
            Some(&booking.account_id),
            "payment_recorded",
            "booking",
            &booking.id,
            &format!("VNPay transaction {} for {} VND", transaction_id, payment.amount),
            None,
        )
        .await;
        log::info!("Payment {} recorded for booking {}", transaction_id, booking.id);

        Ok(CallbackOutcome {
            success: true,
            response_code: callback.response_code,
            booking_id: booking.id,
            payment: Some(payment),
            duplicate: false,
        })
    }

    pub async fn get_for_booking(&self, booking_id: &str) -> ApiResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        PaymentRepository::find_by_booking_id(&mut *conn, booking_id).await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> ApiResult<(Vec<Payment>, i64)> {
        PaymentRepository::list(&self.pool, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use chrono::{Duration, Local, NaiveDate};
    use crate::config::VnPayConfig;
    use crate::db::test_support::*;
    use crate::models::{CreateBookingDetailRequest, Gender, Shift};

    fn vnpay() -> VnPayClient {
        VnPayClient::new(&VnPayConfig {
            tmn_code: "DEMO0001".to_string(),
            hash_secret: "PAYMENTTESTSECRET".to_string(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost/api/payments/vnpay-return".to_string(),
            expire_minutes: 15,
        })
    }

    async fn pending_booking(pool: &SqlitePool, price: i64) -> (String, String) {
        let account = insert_account(pool, &format!("{}@example.com", Uuid::new_v4()), "customer").await;
        let service = insert_service(pool, "HIV Combo", price).await;
        let request = CreateBookingDetailRequest {
            booking_id: None,
            service_id: service,
            full_name: "Vo Van F".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Gender::Male,
            phone: "0901111222".to_string(),
            slot_date: Local::now().date_naive() + Duration::days(2),
            shift: Shift::Am,
        };
        let detail = BookingService::new(pool.clone(), 10)
            .create_booking_detail(&account, &request)
            .await
            .unwrap();
        (account, detail.booking_id)
    }

    fn callback(client: &VnPayClient, booking_id: &str, amount: i64, code: &str, txn: &str) -> HashMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_Amount".to_string(), (amount * 100).to_string());
        params.insert("vnp_BankCode".to_string(), "NCB".to_string());
        params.insert("vnp_ResponseCode".to_string(), code.to_string());
        params.insert("vnp_TransactionNo".to_string(), txn.to_string());
        params.insert("vnp_TransactionStatus".to_string(), code.to_string());
        params.insert("vnp_TxnRef".to_string(), booking_id.to_string());
        let hash = client.sign(&params).unwrap();
        let mut query: HashMap<String, String> = params.into_iter().collect();
        query.insert("vnp_SecureHash".to_string(), hash);
        query
    }

    async fn payment_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM payments").fetch_one(pool).await.unwrap()
    }

    async fn booking_status(pool: &SqlitePool, booking_id: &str) -> BookingStatus {
        let mut conn = pool.acquire().await.unwrap();
        BookingRepository::get_by_id(&mut *conn, booking_id).await.unwrap().unwrap().status
    }

    #[actix_rt::test]
    async fn test_successful_callback_is_recorded_once() {
        let pool = test_pool().await;
        let (_, booking_id) = pending_booking(&pool, 350_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());
        let params = callback(&vnpay(), &booking_id, 350_000, "00", "TX1");

        let first = payments.handle_callback(&params).await.unwrap();
        assert!(first.success);
        assert!(!first.duplicate);
        assert_eq!(first.payment.as_ref().unwrap().transaction_id, "TX1");
        assert_eq!(booking_status(&pool, &booking_id).await, BookingStatus::Paid);

        // Gateway re-delivers the same callback
        let replay = payments.handle_callback(&params).await.unwrap();
        assert!(replay.success);
        assert!(replay.duplicate);
        assert_eq!(payment_count(&pool).await, 1);
    }

    #[actix_rt::test]
    async fn test_price_change_after_checkout_keeps_booked_total() {
        let pool = test_pool().await;
        let (account, booking_id) = pending_booking(&pool, 300_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());

        payments
            .create_vnpay_url(&account, &booking_id, 300_000, None, "127.0.0.1")
            .await
            .unwrap();
        sqlx::query("UPDATE services SET price = 350000")
            .execute(&pool)
            .await
            .unwrap();

        let outcome = payments
            .handle_callback(&callback(&vnpay(), &booking_id, 300_000, "00", "TX-PRICE"))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.payment.unwrap().amount, 300_000);
        assert_eq!(payment_count(&pool).await, 1);
        assert_eq!(booking_status(&pool, &booking_id).await, BookingStatus::Paid);
    }

    #[actix_rt::test]
    async fn test_failed_callback_persists_nothing() {
        let pool = test_pool().await;
        let (_, booking_id) = pending_booking(&pool, 200_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());

        let outcome = payments
            .handle_callback(&callback(&vnpay(), &booking_id, 200_000, "24", "0"))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.payment.is_none());
        assert_eq!(payment_count(&pool).await, 0);
        assert_eq!(booking_status(&pool, &booking_id).await, BookingStatus::Pending);
    }

    #[actix_rt::test]
    async fn test_bad_signature_and_wrong_amount_are_rejected() {
        let pool = test_pool().await;
        let (_, booking_id) = pending_booking(&pool, 200_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());

        let mut forged = callback(&vnpay(), &booking_id, 200_000, "00", "TX2");
        forged.insert("vnp_Amount".to_string(), "100".to_string());
        assert!(matches!(payments.handle_callback(&forged).await, Err(ApiError::Unauthorized(_))));

        let short = callback(&vnpay(), &booking_id, 100_000, "00", "TX3");
        assert!(matches!(payments.handle_callback(&short).await, Err(ApiError::BadRequest(_))));

        assert_eq!(payment_count(&pool).await, 0);
        assert_eq!(booking_status(&pool, &booking_id).await, BookingStatus::Pending);
    }

    #[actix_rt::test]
    async fn test_second_transaction_for_paid_booking_conflicts() {
        let pool = test_pool().await;
        let (_, booking_id) = pending_booking(&pool, 150_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());

        payments.handle_callback(&callback(&vnpay(), &booking_id, 150_000, "00", "TX4")).await.unwrap();
        let err = payments
            .handle_callback(&callback(&vnpay(), &booking_id, 150_000, "00", "TX5"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(payment_count(&pool).await, 1);
    }

    #[actix_rt::test]
    async fn test_payment_url_requires_exact_total() {
        let pool = test_pool().await;
        let (account, booking_id) = pending_booking(&pool, 300_000).await;
        let payments = PaymentService::new(pool.clone(), vnpay());

        let err = payments
            .create_vnpay_url(&account, &booking_id, 1_000, None, "127.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = payments
            .create_vnpay_url("someone-else", &booking_id, 300_000, None, "127.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let url = payments
            .create_vnpay_url(&account, &booking_id, 300_000, None, "127.0.0.1")
            .await
            .unwrap();
        assert!(url.contains("vnp_Amount=30000000"));
        assert!(url.contains(&format!("vnp_TxnRef={}", booking_id)));
        assert_eq!(payment_count(&pool).await, 0);
    }
}
