// src/payment_handlers.rs - VNPay checkout, callbacks and payment records
use actix_web::{web, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;
use crate::auth::{get_current_user, require_permission};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{CreatePaymentUrlRequest, IpnResponse, PaymentUrlResponse, Role};
use crate::AppState;

fn client_ip(http_request: &HttpRequest) -> String {
    http_request
        .connection_info()
        .realip_remote_addr()
        .map(|addr| {
            addr.parse::<std::net::SocketAddr>()
                .map(|socket| socket.ip().to_string())
                .unwrap_or_else(|_| addr.to_string())
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

pub async fn create_payment_url(
    app_state: web::Data<Arc<AppState>>,
    request: web::Json<CreatePaymentUrlRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;

    let payment_url = app_state
        .payment_service()
        .create_vnpay_url(
            &claims.sub,
            &request.booking_id,
            request.amount,
            request.description.as_deref(),
            &client_ip(&http_request),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaymentUrlResponse { payment_url })))
}

/// Browser redirect back from the gateway.
pub async fn vnpay_return(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<HashMap<String, String>>,
) -> ApiResult<HttpResponse> {
    let outcome = app_state.payment_service().handle_callback(&query).await?;

    let message = if outcome.success {
        "Payment successful"
    } else {
        "Payment was not completed"
    };
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(outcome, message.to_string())))
}

fn ipn_code(error: &ApiError) -> (&'static str, &'static str) {
    match error {
        ApiError::Unauthorized(_) => ("97", "Invalid signature"),
        ApiError::NotFound(_) => ("01", "Order not found"),
        ApiError::BadRequest(_) => ("04", "Invalid amount"),
        ApiError::Conflict(_) => ("02", "Order already confirmed"),
        _ => ("99", "Unknown error"),
    }
}

/// Server-to-server notification. The gateway expects HTTP 200 with an
/// `RspCode` body whatever the outcome.
pub async fn vnpay_ipn(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    let response = match app_state.payment_service().handle_callback(&query).await {
        // Replays of a recorded transaction are acknowledged like the first delivery
        Ok(_) => IpnResponse::new("00", "Confirm Success"),
        Err(e) => {
            log::warn!("VNPay IPN rejected: {}", e);
            let (code, message) = ipn_code(&e);
            IpnResponse::new(code, message)
        }
    };
    HttpResponse::Ok().json(response)
}

pub async fn get_booking_payment(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let booking_id = path.into_inner();

    // Ownership is checked through the booking itself
    app_state.booking_service().get_booking(&claims, &booking_id).await?;

    let payment = app_state
        .payment_service()
        .get_for_booking(&booking_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(payment)))
}

pub async fn get_payments(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<PaginationQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_payments)?;

    let (page, per_page, offset) = query.normalize();
    let (payments, total) = app_state.payment_service().list(per_page, offset).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(payments, total, page, per_page))))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::{header, StatusCode}, test};
    use chrono::{Duration, Local};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use crate::db::test_support::*;
    use crate::test_support::{bearer_for, test_auth_service, test_state};
    use crate::vnpay::VnPayClient;

    fn signed_query(client: &VnPayClient, params: &[(&str, &str)]) -> String {
        let map: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let signature = client.sign(&map).unwrap();
        let mut pairs: Vec<(String, String)> = map.into_iter().collect();
        pairs.push(("vnp_SecureHash".to_string(), signature));
        serde_urlencoded::to_string(&pairs).unwrap()
    }

    #[actix_rt::test]
    async fn test_checkout_and_ipn() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);
        let client = VnPayClient::new(&state.config.vnpay);

        let service_id = insert_service(&pool, "HIV", 200_000).await;
        let customer = insert_account(&pool, "pay@example.com", "customer").await;
        let token = bearer_for(&pool, &auth, &customer).await;
        let tomorrow = Local::now().date_naive() + Duration::days(1);

        let req = test::TestRequest::post()
            .uri("/api/bookings/details")
            .insert_header((header::AUTHORIZATION, token.clone()))
            .set_json(json!({
                "service_id": service_id,
                "full_name": "Vo Minh",
                "date_of_birth": "1990-01-01",
                "gender": "male",
                "phone": "0987654321",
                "slot_date": tomorrow.to_string(),
                "shift": "PM",
            }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let booking_id = body["data"]["booking_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/payments/vnpay-url")
            .insert_header((header::AUTHORIZATION, token.clone()))
            .set_json(json!({ "booking_id": booking_id, "amount": 150000 }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/payments/vnpay-url")
            .insert_header((header::AUTHORIZATION, token.clone()))
            .set_json(json!({ "booking_id": booking_id, "amount": 200000 }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert!(body["data"]["payment_url"].as_str().unwrap().contains("vnp_SecureHash="));

        let query = signed_query(&client, &[
            ("vnp_Amount", "20000000"),
            ("vnp_ResponseCode", "00"),
            ("vnp_TransactionStatus", "00"),
            ("vnp_TransactionNo", "14000001"),
            ("vnp_TxnRef", &booking_id),
        ]);

        for _ in 0..2 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/payments/vnpay-ipn?{}", query))
                .to_request();
            let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
            assert_eq!(body["RspCode"], "00");
        }

        let req = test::TestRequest::get()
            .uri(&format!("/api/payments/booking/{}", booking_id))
            .insert_header((header::AUTHORIZATION, token))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["transaction_id"], "14000001");
        assert_eq!(body["data"]["amount"], 200_000);

        let tampered = query.replace("vnp_Amount=20000000", "vnp_Amount=10000000");
        let req = test::TestRequest::get()
            .uri(&format!("/api/payments/vnpay-ipn?{}", tampered))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["RspCode"], "97");
    }

    #[actix_rt::test]
    async fn test_payment_list_requires_manager() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let customer = insert_account(&pool, "c@example.com", "customer").await;
        let manager = insert_account(&pool, "m@example.com", "manager").await;

        let req = test::TestRequest::get()
            .uri("/api/payments")
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &customer).await))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/payments")
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &manager).await))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["data"]["total"], 0);
    }
}
