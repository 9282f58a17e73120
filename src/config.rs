// config.rs
use std::env;
use std::fmt;
use std::time::Duration;

use crate::errors::{AppError, Result};

const MIN_SECRET_LEN: usize = 16;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_expire: Duration,
    pub jwt_refresh_secret: String,
    pub jwt_refresh_expire: Duration,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub client_url: Option<String>,
    pub trusted_proxies: Vec<String>,
    pub port: u16,
    pub host: String,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_name", &self.database_name)
            .field("jwt_expire", &self.jwt_expire)
            .field("jwt_refresh_expire", &self.jwt_refresh_expire)
            .field("stripe_api_base", &self.stripe_api_base)
            .field("client_url", &self.client_url)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("port", &self.port)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Loads `.env` (if present) and reads the process environment.
    ///
    /// Every secret the donation flow depends on is mandatory; a missing or
    /// short secret stops start-up instead of falling back to a default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };
        let secret = |key: &str| -> Result<String> {
            let value = required(key)?;
            if value.len() < MIN_SECRET_LEN {
                return Err(AppError::configuration(format!(
                    "{} must be at least {} characters",
                    key, MIN_SECRET_LEN
                )));
            }
            Ok(value)
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let jwt_secret = secret("JWT_SECRET")?;
        let jwt_refresh_secret = secret("JWT_REFRESH_SECRET")?;
        if jwt_secret == jwt_refresh_secret {
            return Err(AppError::configuration(
                "JWT_REFRESH_SECRET must differ from JWT_SECRET",
            ));
        }

        let port = optional("PORT", "5000")
            .parse::<u16>()
            .map_err(|_| AppError::configuration("PORT must be a number"))?;

        let trusted_proxies = lookup("TRUSTED_PROXIES")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            database_name: optional("DATABASE_NAME", "impacthub"),
            jwt_secret,
            jwt_expire: parse_duration(&optional("JWT_EXPIRE", "7d"))?,
            jwt_refresh_secret,
            jwt_refresh_expire: parse_duration(&optional("JWT_REFRESH_EXPIRE", "30d"))?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_api_base: optional("STRIPE_API_BASE", "https://api.stripe.com")
                .trim_end_matches('/')
                .to_string(),
            client_url: lookup("CLIENT_URL").filter(|v| !v.trim().is_empty()),
            trusted_proxies,
            port,
            host: optional("HOST", "0.0.0.0"),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses `"<n>s"`, `"<n>m"`, `"<n>h"` or `"<n>d"`; a bare number is seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || AppError::configuration(format!("invalid duration: {:?}", raw));

    let (digits, unit_secs) = match raw.chars().last() {
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('h') => (&raw[..raw.len() - 1], 3_600),
        Some('d') => (&raw[..raw.len() - 1], 86_400),
        Some(c) if c.is_ascii_digit() => (raw, 1),
        _ => return Err(invalid()),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    if value == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(value * unit_secs))
}
