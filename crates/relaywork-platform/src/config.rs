use anyhow::{Context, Result};
use rust_decimal::Decimal;

/// Fallback commission rate (percent) when no override is configured or
/// provided at contract creation. Single source of truth for the default.
const DEFAULT_COMMISSION_RATE: &str = "10.00";

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub http_addr: String,
    pub jwt_secret: String,
    pub public_base_url: String,
    pub storage_url: String,
    pub storage_api_key: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub email_from: String,
    pub default_commission_rate: Decimal,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        let storage_url = std::env::var("STORAGE_URL").context("STORAGE_URL is required")?;
        let storage_api_key =
            std::env::var("STORAGE_API_KEY").context("STORAGE_API_KEY is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "https://app.relaywork.app".to_string());

        Ok(Self {
            database_url,
            redis_url,
            http_addr,
            jwt_secret,
            public_base_url,
            storage_url,
            storage_api_key,
            email_api_url: std::env::var("EMAIL_API_URL").unwrap_or_default(),
            email_api_key: std::env::var("EMAIL_API_KEY").unwrap_or_default(),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "contracts@relaywork.app".to_string()),
            default_commission_rate: commission_rate_from_env()?,
        })
    }

    /// Worker processes need the store, the bus, and the email provider;
    /// they never listen on HTTP or mint tokens.
    pub fn worker_from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let redis_url = std::env::var("REDIS_URL").context("REDIS_URL is required")?;
        let email_api_url = std::env::var("EMAIL_API_URL").context("EMAIL_API_URL is required")?;
        let email_api_key = std::env::var("EMAIL_API_KEY").context("EMAIL_API_KEY is required")?;

        Ok(Self {
            database_url,
            redis_url,
            http_addr: String::new(),
            jwt_secret: String::new(),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "https://app.relaywork.app".to_string()),
            storage_url: String::new(),
            storage_api_key: String::new(),
            email_api_url,
            email_api_key,
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "contracts@relaywork.app".to_string()),
            default_commission_rate: commission_rate_from_env()?,
        })
    }
}

fn commission_rate_from_env() -> Result<Decimal> {
    std::env::var("DEFAULT_COMMISSION_RATE")
        .unwrap_or_else(|_| DEFAULT_COMMISSION_RATE.to_string())
        .parse::<Decimal>()
        .context("DEFAULT_COMMISSION_RATE must be a decimal percentage")
}
