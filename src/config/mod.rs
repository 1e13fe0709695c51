use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::admission::RateLimitConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is missing or empty")]
    Missing(String),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: String, value: String },
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPresets {
    pub strict: RateLimitConfig,
    pub standard: RateLimitConfig,
    pub loose: RateLimitConfig,
}

impl Default for RateLimitPresets {
    fn default() -> Self {
        Self {
            strict: RateLimitConfig::strict(),
            standard: RateLimitConfig::standard(),
            loose: RateLimitConfig::loose(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub public_base_url: String,
    pub action_token_secret: String,
    pub admin_jwt_secret: String,
    pub admin_username: String,
    pub admin_password_hash: String,
    pub admin_session_hours: u64,
    pub admin_email: String,
    pub payment_api_base: String,
    pub payment_secret_key: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub rate_limits: RateLimitPresets,
}

// Secrets stay out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("api_base_uri", &self.api_base_uri)
            .field("public_base_url", &self.public_base_url)
            .field("admin_username", &self.admin_username)
            .field("payment_api_base", &self.payment_api_base)
            .field("email_api_url", &self.email_api_url)
            .field("rate_limits", &self.rate_limits)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = RateLimitPresets::default();
        Ok(Config {
            database_url: required("DATABASE_URL")?,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "::".into()),
            server_port: parsed("SERVER_PORT", 3000)?,
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            public_base_url: required("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            action_token_secret: required("ACTION_TOKEN_SECRET")?,
            admin_jwt_secret: required("ADMIN_JWT_SECRET")?,
            admin_username: required("ADMIN_USERNAME")?,
            admin_password_hash: required("ADMIN_PASSWORD_HASH")?,
            admin_session_hours: parsed("ADMIN_SESSION_HOURS", 12)?,
            admin_email: required("ADMIN_EMAIL")?,
            payment_api_base: optional("PAYMENT_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".into()),
            payment_secret_key: required("PAYMENT_SECRET_KEY")?,
            email_api_url: optional("EMAIL_API_URL")
                .unwrap_or_else(|| "https://api.resend.com/emails".into()),
            email_api_key: required("EMAIL_API_KEY")?,
            email_from: required("EMAIL_FROM")?,
            rate_limits: RateLimitPresets {
                strict: preset("STRICT", defaults.strict)?,
                standard: preset("STANDARD", defaults.standard)?,
                loose: preset("LOOSE", defaults.loose)?,
            },
        })
    }

    pub fn admin_session_ttl(&self) -> Duration {
        Duration::from_secs(self.admin_session_hours * 3600)
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn preset(tier: &str, default: RateLimitConfig) -> Result<RateLimitConfig, ConfigError> {
    let requests_var = format!("RATE_LIMIT_{tier}_REQUESTS");
    let window_var = format!("RATE_LIMIT_{tier}_WINDOW_SECS");

    let max_requests: u32 = parsed(&requests_var, default.max_requests)?;
    let window_secs: u64 = parsed(&window_var, default.window.as_secs())?;
    for (name, value) in [(requests_var, max_requests as u64), (window_var, window_secs)] {
        if value == 0 {
            return Err(ConfigError::Invalid {
                name,
                value: "0".into(),
            });
        }
    }
    Ok(RateLimitConfig::new(
        Duration::from_secs(window_secs),
        max_requests,
    ))
}
