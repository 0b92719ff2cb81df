// src/models/payment.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Payment {
    pub id: String,
    pub booking_id: String,
    pub transaction_id: String,
    pub amount: i64,
    pub method: String,
    pub bank_code: Option<String>,
    pub response_code: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentUrlRequest {
    #[validate(length(min = 1, message = "Booking is required"))]
    pub booking_id: String,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    #[validate(length(max = 255, message = "Description cannot exceed 255 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentUrlResponse {
    pub payment_url: String,
}

/// Outcome of processing one gateway callback.
#[derive(Debug, Serialize)]
pub struct CallbackOutcome {
    pub success: bool,
    pub response_code: String,
    pub booking_id: String,
    pub payment: Option<Payment>,
    /// True when the transaction had already been recorded by an earlier delivery.
    pub duplicate: bool,
}

/// Acknowledgement body expected by the gateway's IPN caller.
#[derive(Debug, Serialize)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            rsp_code: code.to_string(),
            message: message.to_string(),
        }
    }
}
