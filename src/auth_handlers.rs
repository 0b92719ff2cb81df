// src/auth_handlers.rs - Authentication and account route handlers

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use validator::Validate;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::handlers::{ApiResponse, PaginatedResponse, PaginationQuery};
use crate::auth::{hash_refresh_token, get_current_user, check_permission, require_permission, AuthService, Claims};
use crate::audit::audit;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Account, AccountInfo, ChangePasswordRequest, CreateAccountRequest, LoginRequest, LoginResponse,
    RefreshRequest, RegisterRequest, Role, StaffInfo, UpdateAccountRequest, UpdateStaffInfoRequest,
};
use crate::repositories::{AccountRepository, NewAccount, TokenRepository};
use crate::validator::{FieldValidator, ValidationResult};
use crate::AppState;

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/api/auth";

// ======== HELPERS ========

fn refresh_cookie(token: &str, max_age_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token.to_string())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

fn expired_refresh_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(REFRESH_COOKIE, "")
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

fn validate_phone(phone: Option<&str>) -> ApiResult<()> {
    let mut result = ValidationResult::new();
    if let Some(phone) = phone {
        result.check("phone", FieldValidator::phone(phone));
    }
    result.into_result()
}

/// Mints an access token plus a persisted refresh token for `account`.
async fn issue_tokens(
    app_state: &AppState,
    auth_service: &AuthService,
    account: Account,
) -> ApiResult<(LoginResponse, Cookie<'static>)> {
    let access_token = auth_service.generate_jwt(&account)?;
    let refresh = auth_service.generate_refresh_token();
    TokenRepository::store_refresh_token(&app_state.db_pool, &account.id, &refresh).await?;

    let cookie = refresh_cookie(
        &refresh.token,
        auth_service.refresh_token_ttl().num_seconds(),
        app_state.config.auth.secure_cookies,
    );

    let response = LoginResponse {
        access_token,
        refresh_token: refresh.token,
        expires_in: auth_service.access_token_seconds(),
        account: account.into(),
    };
    Ok((response, cookie))
}

fn ensure_self_or(claims: &Claims, account_id: &str, permission: fn(&Role) -> bool) -> ApiResult<()> {
    if claims.sub == account_id {
        Ok(())
    } else {
        check_permission(claims, permission)
    }
}

// ======== AUTH HANDLERS ========

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    validate_phone(request.phone.as_deref())?;

    let password_hash = auth_service.hash_password(&request.password)?;
    let account = AccountRepository::create(&app_state.db_pool, NewAccount {
        full_name: &request.full_name,
        email: &request.email,
        phone: request.phone.as_deref(),
        password_hash: &password_hash,
        role: Role::Customer,
    }).await?;

    audit(&app_state.db_pool, Some(&account.id), "register", "account", &account.id,
          "Customer account registered", Some(&http_request)).await;
    log::info!("New account registered: {}", account.email);

    let (response, cookie) = issue_tokens(&app_state, &auth_service, account).await?;

    Ok(HttpResponse::Created().cookie(cookie).json(ApiResponse::success_with_message(
        response,
        "Account registered successfully".to_string(),
    )))
}

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let account = AccountRepository::find_by_email(&app_state.db_pool, &request.email)
        .await?
        .ok_or_else(|| ApiError::AuthError("Invalid email or password".to_string()))?;

    if !auth_service.verify_password(&request.password, &account.password_hash)? {
        log::warn!("Failed login attempt for {}", account.email);
        return Err(ApiError::AuthError("Invalid email or password".to_string()));
    }

    if !account.is_active {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    // A new login supersedes every earlier session's refresh token
    let removed = TokenRepository::delete_refresh_tokens_for_account(&app_state.db_pool, &account.id).await?;
    if removed > 0 {
        log::debug!("Revoked {} earlier refresh tokens for {}", removed, account.id);
    }

    audit(&app_state.db_pool, Some(&account.id), "login", "account", &account.id,
          "Logged in", Some(&http_request)).await;
    log::info!("Account {} logged in", account.email);

    let (response, cookie) = issue_tokens(&app_state, &auth_service, account).await?;

    Ok(HttpResponse::Ok().cookie(cookie).json(ApiResponse::success_with_message(
        response,
        "Login successful".to_string(),
    )))
}

/// Exchanges a refresh token (cookie or body) for a new token pair.
/// The presented refresh token is consumed.
pub async fn refresh(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    body: Option<web::Json<RefreshRequest>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let presented = http_request
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .ok_or_else(|| ApiError::Unauthorized("Refresh token is missing".to_string()))?;

    let token_hash = hash_refresh_token(&presented);
    let account_id = TokenRepository::find_account_for_refresh_token(&app_state.db_pool, &token_hash)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired refresh token".to_string()))?;

    // Another request may have rotated the same token in the meantime
    if !TokenRepository::delete_refresh_token(&app_state.db_pool, &token_hash).await? {
        return Err(ApiError::Unauthorized("Invalid or expired refresh token".to_string()));
    }

    let account = AccountRepository::get_required(&app_state.db_pool, &account_id).await?;
    if !account.is_active {
        return Err(ApiError::Forbidden("Account is disabled".to_string()));
    }

    log::info!("Refresh token rotated for account {}", account.id);
    let (response, cookie) = issue_tokens(&app_state, &auth_service, account).await?;

    Ok(HttpResponse::Ok().cookie(cookie).json(ApiResponse::success(response)))
}

/// Revokes the presented access token and every refresh token of the account.
pub async fn logout(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;

    TokenRepository::blacklist(&app_state.db_pool, &claims.jti, &claims.sub, claims.expires_at()).await?;
    let revoked = TokenRepository::delete_refresh_tokens_for_account(&app_state.db_pool, &claims.sub).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "logout", "account", &claims.sub,
          "Logged out", Some(&http_request)).await;
    log::info!("Account {} logged out ({} refresh tokens revoked)", claims.sub, revoked);

    Ok(HttpResponse::Ok()
        .cookie(expired_refresh_cookie())
        .json(ApiResponse::success_with_message((), "Logged out".to_string())))
}

#[derive(Serialize)]
struct ProfileResponse {
    #[serde(flatten)]
    account: AccountInfo,
    staff_info: Option<StaffInfo>,
}

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let account = AccountRepository::get_required(&app_state.db_pool, &claims.sub).await?;

    let staff_info = if account.role.is_staff_member() {
        AccountRepository::get_staff_info(&app_state.db_pool, &account.id).await?
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(ProfileResponse {
        account: account.into(),
        staff_info,
    })))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;

    let account = AccountRepository::get_required(&app_state.db_pool, &claims.sub).await?;
    if !auth_service.verify_password(&request.current_password, &account.password_hash)? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = auth_service.hash_password(&request.new_password)?;
    AccountRepository::update_password(&app_state.db_pool, &account.id, &password_hash).await?;
    TokenRepository::delete_refresh_tokens_for_account(&app_state.db_pool, &account.id).await?;

    audit(&app_state.db_pool, Some(&account.id), "change_password", "account", &account.id,
          "Password changed", Some(&http_request)).await;
    log::info!("Account {} changed password", account.email);

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

// ======== ACCOUNT MANAGEMENT (ADMIN) ========

#[derive(Debug, Deserialize)]
pub struct AccountListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub role: Option<Role>,
}

pub async fn get_accounts(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<AccountListQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_accounts)?;

    let pagination = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
        ..PaginationQuery::default()
    };
    let (page, per_page, offset) = pagination.normalize();

    let (accounts, total) = AccountRepository::list(&app_state.db_pool, query.role, per_page, offset).await?;
    let infos: Vec<AccountInfo> = accounts.into_iter().map(AccountInfo::from).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(infos, total, page, per_page))))
}

pub async fn get_account(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_accounts)?;

    let account = AccountRepository::get_required(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(AccountInfo::from(account))))
}

/// Admin-created accounts may carry any role.
pub async fn create_account(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<CreateAccountRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_accounts)?;
    request.validate()?;
    validate_phone(request.phone.as_deref())?;

    let password_hash = auth_service.hash_password(&request.password)?;
    let account = AccountRepository::create(&app_state.db_pool, NewAccount {
        full_name: &request.full_name,
        email: &request.email,
        phone: request.phone.as_deref(),
        password_hash: &password_hash,
        role: request.role,
    }).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "create", "account", &account.id,
          &format!("Created {} account {}", account.role, account.email), Some(&http_request)).await;
    log::info!("Account {} created with role {}", account.email, account.role);

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        AccountInfo::from(account),
        "Account created successfully".to_string(),
    )))
}

pub async fn update_account(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateAccountRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_permission(&http_request, Role::can_manage_accounts)?;
    request.validate()?;
    validate_phone(request.phone.as_deref())?;

    let account_id = path.into_inner();
    if account_id == claims.sub {
        if request.is_active == Some(false) {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
        if request.role.is_some_and(|role| role != claims.role) {
            return Err(ApiError::bad_request("You cannot change your own role"));
        }
    }

    let account = AccountRepository::update(&app_state.db_pool, &account_id, &request).await?;

    // A deactivated account must not be able to mint new access tokens
    if !account.is_active {
        TokenRepository::delete_refresh_tokens_for_account(&app_state.db_pool, &account.id).await?;
    }

    audit(&app_state.db_pool, Some(&claims.sub), "update", "account", &account.id,
          &format!("Updated account {} (role {}, active {})", account.email, account.role, account.is_active),
          Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        AccountInfo::from(account),
        "Account updated successfully".to_string(),
    )))
}

// ======== STAFF INFO ========

pub async fn get_staff_info(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let account_id = path.into_inner();
    ensure_self_or(&claims, &account_id, Role::can_manage_staff_info)?;

    let info = AccountRepository::get_staff_info(&app_state.db_pool, &account_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Staff info"))?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(info)))
}

pub async fn update_staff_info(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateStaffInfoRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    request.validate()?;
    let account_id = path.into_inner();
    ensure_self_or(&claims, &account_id, Role::can_manage_staff_info)?;

    let account = AccountRepository::get_required(&app_state.db_pool, &account_id).await?;
    if !account.role.is_staff_member() {
        return Err(ApiError::bad_request("Only staff accounts have staff info"));
    }

    let info = AccountRepository::upsert_staff_info(&app_state.db_pool, &account.id, &request).await?;

    audit(&app_state.db_pool, Some(&claims.sub), "update", "staff_info", &account.id,
          "Staff info updated", Some(&http_request)).await;

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        info,
        "Staff info updated successfully".to_string(),
    )))
}

/// Public directory of consultants for the booking form.
pub async fn get_consultants(app_state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let consultants = AccountRepository::list_consultants(&app_state.db_pool).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(consultants)))
}

pub async fn get_roles(http_request: HttpRequest) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Role::can_view_accounts)?;

    #[derive(Serialize)]
    struct RoleInfo {
        id: Role,
        name: &'static str,
        is_staff: bool,
    }

    let roles: Vec<RoleInfo> = Role::all_roles()
        .into_iter()
        .map(|role| RoleInfo {
            id: role,
            name: role.display_name(),
            is_staff: role.is_staff_member(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::{header, StatusCode}, test};
    use serde_json::{json, Value};
    use crate::db::test_support::*;
    use crate::test_support::{bearer_for, test_auth_service, test_state};

    const PASSWORD: &str = "Secret123";

    #[actix_rt::test]
    async fn test_register_login_and_profile() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "full_name": "Nguyen Van A",
                "email": "A@Example.com",
                "phone": "0912345678",
                "password": PASSWORD,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert!(resp.response().cookies().any(|c| c.name() == super::REFRESH_COOKIE && c.http_only() == Some(true)));
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["account"]["email"], "a@example.com");
        assert_eq!(body["data"]["account"]["role"], "customer");

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "a@example.com", "password": "WrongPass1" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "a@example.com", "password": PASSWORD }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let access = body["data"]["access_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/auth/profile")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", access)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["full_name"], "Nguyen Van A");
    }

    #[actix_rt::test]
    async fn test_register_rejects_bad_phone() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "full_name": "Nguyen Van A",
                "email": "a@example.com",
                "phone": "12345",
                "password": PASSWORD,
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_rt::test]
    async fn test_refresh_rotates_and_consumes_token() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "full_name": "Le Thi C",
                "email": "c@example.com",
                "password": PASSWORD,
            }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let first = body["data"]["refresh_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh_token": first }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_ne!(body["data"]["refresh_token"].as_str().unwrap(), first);

        // The consumed token cannot be replayed
        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh_token": first }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post().uri("/api/auth/refresh").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_login_revokes_earlier_refresh_tokens() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({
                "full_name": "Pham Thi E",
                "email": "e@example.com",
                "password": PASSWORD,
            }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let before_login = body["data"]["refresh_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "email": "e@example.com", "password": PASSWORD }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let after_login = body["data"]["refresh_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh_token": before_login }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/refresh")
            .set_json(json!({ "refresh_token": after_login }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn test_logout_revokes_access_token() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let account_id = insert_account(&pool, "d@example.com", "customer").await;
        let token = bearer_for(&pool, &auth, &account_id).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/logout")
            .insert_header((header::AUTHORIZATION, token.clone()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/auth/profile")
            .insert_header((header::AUTHORIZATION, token))
            .to_request();
        // Middleware rejections surface as service errors
        let status = match test::try_call_service(&app, req).await {
            Ok(resp) => resp.status(),
            Err(err) => err.as_response_error().status_code(),
        };
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_account_admin_requires_admin() {
        let pool = test_pool().await;
        let state = test_state(pool.clone());
        let auth = test_auth_service();
        let app = test_app!(state, auth);

        let customer = insert_account(&pool, "e@example.com", "customer").await;
        let admin = insert_account(&pool, "admin@example.com", "admin").await;

        let new_staff = json!({
            "full_name": "Pham Van Staff",
            "email": "staff@example.com",
            "password": PASSWORD,
            "role": "staff",
        });

        let req = test::TestRequest::post()
            .uri("/api/accounts")
            .insert_header((header::AUTHORIZATION, bearer_for(&pool, &auth, &customer).await))
            .set_json(&new_staff)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let admin_token = bearer_for(&pool, &auth, &admin).await;
        let req = test::TestRequest::post()
            .uri("/api/accounts")
            .insert_header((header::AUTHORIZATION, admin_token.clone()))
            .set_json(&new_staff)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["role"], "staff");

        let req = test::TestRequest::put()
            .uri(&format!("/api/accounts/{}", admin))
            .insert_header((header::AUTHORIZATION, admin_token))
            .set_json(json!({ "is_active": false }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
