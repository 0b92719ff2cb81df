use bcrypt::{hash, verify};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use actix_web::web;
use actix_web::HttpMessage;
use actix_web::{HttpRequest, dev::ServiceRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use crate::config::AuthConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{Account, Role};
use crate::repositories::TokenRepository;
use crate::AppState;

const REFRESH_TOKEN_BYTES: usize = 48;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account_id
    pub email: String,
    pub role: Role,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// A freshly minted opaque refresh token and the hash that gets persisted.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// ======== AUTH SERVICE ========

pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_token_ttl: Duration::minutes(config.access_token_minutes),
            refresh_token_ttl: Duration::days(config.refresh_token_days),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub fn access_token_seconds(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    pub fn hash_password(&self, password: &str) -> ApiResult<String> {
        validate_password_strength(password)?;
        hash(password, self.bcrypt_cost)
            .map_err(|_| ApiError::InternalServerError("Failed to hash password".to_string()))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> ApiResult<bool> {
        verify(password, hash)
            .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))
    }

    /// Short-lived access token embedding account id and role.
    pub fn generate_jwt(&self, account: &Account) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + self.access_token_ttl;

        let claims = Claims {
            sub: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| ApiError::AuthError("Failed to generate token".to_string()))
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let validation = Validation::default();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                match err.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature =>
                        ApiError::AuthError("Token expired".to_string()),
                    jsonwebtoken::errors::ErrorKind::InvalidToken =>
                        ApiError::AuthError("Invalid token".to_string()),
                    _ =>
                        ApiError::AuthError("Token verification failed".to_string()),
                }
            })
    }

    pub fn generate_refresh_token(&self) -> IssuedRefreshToken {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        IssuedRefreshToken {
            token_hash: hash_refresh_token(&token),
            token,
            expires_at: Utc::now() + self.refresh_token_ttl,
        }
    }
}

pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// ======== PASSWORD VALIDATION ========

pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::ValidationError("Password must be at least 8 characters".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::ValidationError("Password must contain at least one uppercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::ValidationError("Password must contain at least one lowercase letter".to_string()));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::ValidationError("Password must contain at least one digit".to_string()));
    }
    Ok(())
}

// ======== HELPER FUNCTIONS ========

pub fn get_current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>().cloned()
        .ok_or_else(|| ApiError::Unauthorized("No user information found".to_string()))
}

/// Claims when the request carried a valid bearer token, `None` for anonymous callers.
pub fn get_optional_user(req: &HttpRequest) -> Option<Claims> {
    let auth_service = req.app_data::<web::Data<Arc<AuthService>>>()?;
    let header = req.headers().get(actix_web::http::header::AUTHORIZATION)?;
    let token = header.to_str().ok()?.strip_prefix("Bearer ")?;
    auth_service.verify_token(token).ok()
}

pub fn check_permission<F>(claims: &Claims, check: F) -> ApiResult<()>
where
    F: Fn(&Role) -> bool,
{
    if check(&claims.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// Check if the current user has a specific permission
pub fn require_permission(req: &HttpRequest, permission_check: fn(&Role) -> bool) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    check_permission(&claims, permission_check)?;
    Ok(claims)
}

// ======== JWT MIDDLEWARE ========

pub async fn jwt_middleware(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let token = credentials.token();

    let auth_service = match req.app_data::<web::Data<Arc<AuthService>>>() {
        Some(svc) => svc.clone(),
        None => {
            log::error!("AuthService not found in app data");
            return Err((
                ApiError::InternalServerError("Auth service not available".to_string()).into(),
                req,
            ));
        }
    };

    let claims = match auth_service.verify_token(token) {
        Ok(claims) => claims,
        Err(err) => {
            log::warn!("JWT verification failed: {}", err);
            return Err((err.into(), req));
        }
    };

    // Revoked (logged-out) tokens are rejected even before they expire
    let pool = match req.app_data::<web::Data<Arc<AppState>>>() {
        Some(state) => state.db_pool.clone(),
        None => {
            log::error!("AppState not found in app data");
            return Err((
                ApiError::InternalServerError("Token revocation list not available".to_string()).into(),
                req,
            ));
        }
    };
    match TokenRepository::is_blacklisted(&pool, &claims.jti).await {
        Ok(false) => {}
        Ok(true) => {
            log::warn!("Rejected revoked token for account {}", claims.sub);
            return Err((
                ApiError::Unauthorized("Token has been revoked".to_string()).into(),
                req,
            ));
        }
        Err(e) => return Err((e.into(), req)),
    }

    req.extensions_mut().insert(claims);
    Ok(req)
}
