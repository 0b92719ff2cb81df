// src/vnpay.rs - VNPay redirect signing and callback verification
//!
//! Parameters are sorted by key, form-encoded and signed with
//! HMAC-SHA512 using the merchant hash secret. The hex digest travels as
//! `vnp_SecureHash`.

use std::collections::{BTreeMap, HashMap};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use crate::config::VnPayConfig;
use crate::error::{ApiError, ApiResult};

type HmacSha512 = Hmac<Sha512>;

pub const VNPAY_VERSION: &str = "2.1.0";
pub const SUCCESS_CODE: &str = "00";
const SECURE_HASH: &str = "vnp_SecureHash";
const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

/// What goes into one redirect URL.
#[derive(Debug)]
pub struct PaymentUrlParams<'a> {
    pub txn_ref: &'a str,
    /// Whole VND; multiplied by 100 on the wire
    pub amount: i64,
    pub order_info: &'a str,
    pub ip_addr: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Fields of a gateway callback the payment flow acts on.
#[derive(Debug, Clone)]
pub struct VnPayCallback {
    pub txn_ref: String,
    pub amount: i64,
    pub response_code: String,
    pub transaction_status: Option<String>,
    pub transaction_no: Option<String>,
    pub bank_code: Option<String>,
}

impl VnPayCallback {
    pub fn from_params(params: &HashMap<String, String>) -> ApiResult<Self> {
        let required = |key: &str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ApiError::BadRequest(format!("Missing callback parameter {}", key)))
        };
        let optional = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        // The gateway reports amounts in hundredths of a dong
        let raw_amount = required("vnp_Amount")?;
        let amount = raw_amount
            .parse::<i64>()
            .ok()
            .filter(|minor| *minor >= 0 && minor % 100 == 0)
            .map(|minor| minor / 100)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid vnp_Amount '{}'", raw_amount)))?;

        Ok(Self {
            txn_ref: required("vnp_TxnRef")?,
            amount,
            response_code: required("vnp_ResponseCode")?,
            transaction_status: optional("vnp_TransactionStatus"),
            // The gateway sends "0" when no transaction was created
            transaction_no: optional("vnp_TransactionNo").filter(|v| v != "0"),
            bank_code: optional("vnp_BankCode"),
        })
    }

    pub fn is_success(&self) -> bool {
        self.response_code == SUCCESS_CODE
            && self
                .transaction_status
                .as_deref()
                .map_or(true, |status| status == SUCCESS_CODE)
    }
}

pub struct VnPayClient {
    tmn_code: String,
    hash_secret: String,
    pay_url: String,
    return_url: String,
    expire_minutes: i64,
}

impl VnPayClient {
    pub fn new(config: &VnPayConfig) -> Self {
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
            pay_url: config.pay_url.clone(),
            return_url: config.return_url.clone(),
            expire_minutes: config.expire_minutes,
        }
    }

    fn mac(&self) -> ApiResult<HmacSha512> {
        HmacSha512::new_from_slice(self.hash_secret.as_bytes())
            .map_err(|_| ApiError::InternalServerError("Invalid VNPay hash secret".to_string()))
    }

    fn encode(params: &BTreeMap<String, String>) -> ApiResult<String> {
        serde_urlencoded::to_string(params)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to encode VNPay parameters: {}", e)))
    }

    /// Hex HMAC-SHA512 of the sorted, form-encoded parameters.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> ApiResult<String> {
        let mut mac = self.mac()?;
        mac.update(Self::encode(params)?.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn build_payment_url(&self, request: &PaymentUrlParams<'_>) -> ApiResult<String> {
        let expire_at = request.created_at + Duration::minutes(self.expire_minutes);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VNPAY_VERSION.to_string());
        params.insert("vnp_Command".to_string(), "pay".to_string());
        params.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        params.insert("vnp_Amount".to_string(), (request.amount * 100).to_string());
        params.insert("vnp_CurrCode".to_string(), "VND".to_string());
        params.insert("vnp_TxnRef".to_string(), request.txn_ref.to_string());
        params.insert("vnp_OrderInfo".to_string(), request.order_info.to_string());
        params.insert("vnp_OrderType".to_string(), "other".to_string());
        params.insert("vnp_Locale".to_string(), "vn".to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), request.ip_addr.to_string());
        params.insert("vnp_CreateDate".to_string(), format_vnpay_date(request.created_at));
        params.insert("vnp_ExpireDate".to_string(), format_vnpay_date(expire_at));

        let query = Self::encode(&params)?;
        let secure_hash = self.sign(&params)?;

        Ok(format!("{}?{}&{}={}", self.pay_url, query, SECURE_HASH, secure_hash))
    }

    /// Checks `vnp_SecureHash` against every other `vnp_*` parameter.
    pub fn verify(&self, params: &HashMap<String, String>) -> bool {
        let Some(provided) = params.get(SECURE_HASH) else {
            return false;
        };
        let Ok(expected) = hex::decode(provided.to_ascii_lowercase()) else {
            return false;
        };

        let signed: BTreeMap<String, String> = params
            .iter()
            .filter(|(key, _)| key.starts_with("vnp_") && *key != SECURE_HASH && *key != SECURE_HASH_TYPE)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let (Ok(mut mac), Ok(encoded)) = (self.mac(), Self::encode(&signed)) else {
            return false;
        };
        mac.update(encoded.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// `yyyyMMddHHmmss` in Vietnam time (GMT+7).
pub fn format_vnpay_date(at: DateTime<Utc>) -> String {
    (at.naive_utc() + Duration::hours(7))
        .format("%Y%m%d%H%M%S")
        .to_string()
}
