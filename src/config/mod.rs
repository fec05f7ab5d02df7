//! Configuration module for the NeoLearn backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Secret used when `NEOLEARN_JWT_SECRET` is unset. Refused in production.
pub const DEV_JWT_SECRET: &str = "dev_secret_change_me";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("NEOLEARN_JWT_SECRET must be set in production")]
    MissingJwtSecret,
}

/// Runtime mode. Production hides internal error details from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Settings for the Gemini generation gateway.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key; `None` leaves the gateway unavailable
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory where uploaded attachments are written
    pub upload_dir: PathBuf,
    /// HMAC secret for session tokens
    pub jwt_secret: String,
    pub environment: Environment,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Allowed CORS origin; `None` allows any
    pub frontend_origin: Option<String>,
    pub min_password_len: usize,
    /// Upper bound on messages held by one conversation
    pub max_messages_per_conversation: usize,
    /// Requests allowed per client on `/chat` within one window
    pub chat_rate_limit: usize,
    pub chat_rate_window: Duration,
    pub gemini: GeminiConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = match env::var("NEOLEARN_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let jwt_secret = match env::var("NEOLEARN_JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => DEV_JWT_SECRET.to_string(),
        };
        if environment.is_production() && jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::MissingJwtSecret);
        }

        let bind_addr = parse_var("NEOLEARN_BIND_ADDR", "127.0.0.1:5000")?;

        let db_path = env::var("NEOLEARN_DB_PATH")
            .unwrap_or_else(|_| "./data/neolearn.sqlite".to_string())
            .into();

        let upload_dir = env::var("NEOLEARN_UPLOAD_DIR")
            .unwrap_or_else(|_| "./data/uploads".to_string())
            .into();

        let log_level = env::var("NEOLEARN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("NEOLEARN_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let frontend_origin = env::var("NEOLEARN_FRONTEND_ORIGIN")
            .ok()
            .filter(|origin| !origin.trim().is_empty() && origin != "*");

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string()),
            base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            timeout: Duration::from_secs(parse_var("GEMINI_TIMEOUT_SECS", "30")?),
        };

        Ok(Self {
            bind_addr,
            db_path,
            upload_dir,
            jwt_secret,
            environment,
            log_level,
            log_format,
            frontend_origin,
            min_password_len: parse_var("NEOLEARN_MIN_PASSWORD_LEN", "6")?,
            max_messages_per_conversation: parse_var("NEOLEARN_MAX_MESSAGES", "1000")?,
            chat_rate_limit: parse_var("NEOLEARN_CHAT_RATE_LIMIT", "60")?,
            chat_rate_window: Duration::from_secs(60),
            gemini,
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(var).unwrap_or_else(|_| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}
