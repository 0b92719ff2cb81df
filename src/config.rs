// src/config.rs - Configuration management
use serde::Deserialize;
use std::env;
use anyhow::{Context, Result};
use rand::{thread_rng, Rng, distributions::Alphanumeric};
use std::path::Path;
use std::fs;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub slots: SlotConfig,
    pub vnpay: VnPayConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// Capacity defaults for test-service slots and the pre-generation window.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SlotConfig {
    pub default_max_quantity: i64,
    pub weeks_ahead: u32,
    pub generation_interval_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VnPayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub pay_url: String,
    pub return_url: String,
    pub expire_minutes: i64,
}

// Dummy defaults for tests (no ENV read here)
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dummy_32_chars_for_tests_only!!!".to_string(),
            access_token_minutes: 30,
            refresh_token_days: 7,
            bcrypt_cost: 10,
            secure_cookies: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:gender_healthcare.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            max_request_size: 1024 * 1024,
            require_https: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            default_max_quantity: 10,
            weeks_ahead: 2,
            generation_interval_hours: 24,
        }
    }
}

impl Default for VnPayConfig {
    fn default() -> Self {
        Self {
            tmn_code: "DEMOTMN1".to_string(),
            hash_secret: "DEMOSECRETDEMOSECRETDEMOSECRET00".to_string(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "http://localhost:3000/payment-result".to_string(),
            expire_minutes: 15,
        }
    }
}

// Secure JWT secret generation
pub fn generate_jwt_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

impl Config {
    pub fn load() -> Result<Self> {
        load_config()
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        let path = Path::new(&config_file);
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", config_file))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file))?
    } else {
        Config::default()
    };

    override_with_env(&mut config)?;

    config.validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn override_with_env(config: &mut Config) -> Result<()> {
    if let Ok(host) = env::var("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Some(port) = parse_env::<u16>("APP_PORT") {
        config.server.port = port;
    }
    if let Some(workers) = parse_env::<usize>("APP_WORKERS") {
        config.server.workers = Some(workers);
    }
    if let Ok(jwt_secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = jwt_secret;
    }
    if let Some(minutes) = parse_env::<i64>("AUTH_ACCESS_TOKEN_MINUTES") {
        config.auth.access_token_minutes = minutes;
    }
    if let Some(days) = parse_env::<i64>("AUTH_REFRESH_TOKEN_DAYS") {
        config.auth.refresh_token_days = days;
    }
    if let Some(cost) = parse_env::<u32>("AUTH_BCRYPT_COST") {
        config.auth.bcrypt_cost = cost;
    }
    if let Ok(url) = env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(max_conn) = parse_env::<u32>("DATABASE_MAX_CONNECTIONS") {
        config.database.max_connections = max_conn;
    }
    if let Some(min_conn) = parse_env::<u32>("DATABASE_MIN_CONNECTIONS") {
        config.database.min_connections = min_conn;
    }
    if let Ok(origins_str) = env::var("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(level) = env::var("RUST_LOG") {
        config.logging.level = level;
    }
    if let Some(max) = parse_env::<i64>("SLOT_DEFAULT_MAX_QUANTITY") {
        config.slots.default_max_quantity = max;
    }
    if let Some(weeks) = parse_env::<u32>("SLOT_WEEKS_AHEAD") {
        config.slots.weeks_ahead = weeks;
    }
    if let Ok(code) = env::var("VNPAY_TMN_CODE") {
        config.vnpay.tmn_code = code;
    }
    if let Ok(secret) = env::var("VNPAY_HASH_SECRET") {
        config.vnpay.hash_secret = secret;
    }
    if let Ok(url) = env::var("VNPAY_PAY_URL") {
        config.vnpay.pay_url = url;
    }
    if let Ok(url) = env::var("VNPAY_RETURN_URL") {
        config.vnpay.return_url = url;
    }

    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            ));
        }

        if self.auth.access_token_minutes <= 0 || self.auth.refresh_token_days <= 0 {
            return Err(anyhow::anyhow!("Token lifetimes must be positive"));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(anyhow::anyhow!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            ));
        }

        if self.slots.default_max_quantity < 1 {
            return Err(anyhow::anyhow!("slots.default_max_quantity must be at least 1"));
        }

        if !(1..=12).contains(&self.slots.weeks_ahead) {
            return Err(anyhow::anyhow!(
                "slots.weeks_ahead must be between 1 and 12 (current: {})",
                self.slots.weeks_ahead
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
    }

    /// Checks applied only when `APP_ENV=production`.
    pub fn validate_production(&self) -> Result<()> {
        if self.security.allowed_origins.iter().any(|o| o == "*") {
            anyhow::bail!("Wildcard CORS origins not allowed in production!");
        }
        if self.vnpay.hash_secret == VnPayConfig::default().hash_secret {
            anyhow::bail!("VNPAY_HASH_SECRET must be set in production");
        }
        Ok(())
    }

    pub fn print_startup_info(&self) {
        log::info!("Gender healthcare booking API starting up");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!("Database: {}", self.database.url);
        log::info!(
            "Auth: JWT ({} min access, {} day refresh)",
            self.auth.access_token_minutes, self.auth.refresh_token_days
        );
        log::info!(
            "Slots: max {} per shift, generating {} weeks ahead",
            self.slots.default_max_quantity, self.slots.weeks_ahead
        );

        if !self.is_production() {
            log::warn!("Running in development mode");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}
