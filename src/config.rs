use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub host: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub user_count_interval: Duration,
    pub storage_timeout: Duration,
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userhub".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userhub-clients".into()),
            ttl_minutes: parsed_or("JWT_TTL_MINUTES", 60),
        };
        Ok(Self {
            database_url,
            jwt,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            http_port: parsed_or("APP_PORT", 8080),
            grpc_port: parsed_or("GRPC_PORT", 50051),
            user_count_interval: Duration::from_secs(parsed_or("USER_COUNT_INTERVAL_SECS", 10)),
            storage_timeout: Duration::from_secs(parsed_or("STORAGE_TIMEOUT_SECS", 5)),
            request_timeout: Duration::from_secs(parsed_or("REQUEST_TIMEOUT_SECS", 30)),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} must be set"))?;
    anyhow::ensure!(!value.trim().is_empty(), "{key} must not be empty");
    Ok(value)
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_on_garbage() {
        std::env::set_var("USERHUB_TEST_PORT", "not-a-number");
        assert_eq!(parsed_or::<u16>("USERHUB_TEST_PORT", 8080), 8080);
        std::env::set_var("USERHUB_TEST_PORT", "9090");
        assert_eq!(parsed_or::<u16>("USERHUB_TEST_PORT", 8080), 9090);
        std::env::remove_var("USERHUB_TEST_PORT");
    }

    #[test]
    fn required_rejects_blank_values() {
        std::env::set_var("USERHUB_TEST_SECRET", "   ");
        assert!(required("USERHUB_TEST_SECRET").is_err());
        std::env::remove_var("USERHUB_TEST_SECRET");
        let err = required("USERHUB_TEST_SECRET").unwrap_err();
        assert!(err.to_string().contains("USERHUB_TEST_SECRET must be set"));
    }
}
