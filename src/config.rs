use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => anyhow::bail!("unknown APP_ENV: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
    /// Key on `X-Forwarded-For`/`X-Real-IP` instead of the socket peer.
    /// Only set behind a proxy that overwrites those headers.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub email: EmailConfig,
    pub rate_limit: RateLimitConfig,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}: {e}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = parsed("APP_ENV", Environment::Development)?;
        let jwt = JwtConfig {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "natours".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "natours-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 60 * 24 * 90)?,
            cookie_ttl_days: parsed("JWT_COOKIE_TTL_DAYS", 90)?,
        };
        let email = EmailConfig {
            host: var("EMAIL_HOST"),
            port: parsed("EMAIL_PORT", 587)?,
            username: var("EMAIL_USERNAME"),
            password: var("EMAIL_PASSWORD"),
            tls: parsed("EMAIL_TLS", false)?,
            from: var("EMAIL_FROM").unwrap_or_else(|| "Natours <hello@natours.io>".into()),
        };
        let rate_limit = RateLimitConfig {
            max_requests: parsed("RATE_LIMIT_MAX", 100)?,
            window_seconds: parsed("RATE_LIMIT_WINDOW_SECONDS", 60 * 60)?,
            trust_proxy: parsed("RATE_LIMIT_TRUST_PROXY", false)?,
        };
        Ok(Self {
            environment,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("APP_PORT", 8080)?,
            database_url: var("DATABASE_URL"),
            jwt,
            email,
            rate_limit,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}
