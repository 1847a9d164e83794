//! Shared configuration logic
//!
//! Handles loading of the upstream connection settings from environment
//! variables. Values are read once at construction and passed explicitly to
//! the components that need them.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::env;

use crate::timezone::parse_timezone;

/// Default IANA zone the upstream encodes occurrence times in.
pub const DEFAULT_UPSTREAM_TIMEZONE: &str = "Europe/Berlin";

/// Upstream API connection configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// OAuth2 client credentials
    pub client_id: String,
    pub client_secret: String,

    /// Password-grant credentials
    pub license: String,
    pub username: String,
    pub password: String,

    /// API base URL, e.g. "https://api.example.com/v1"
    pub base_url: String,

    /// Per-call deadline in seconds
    pub timeout_secs: u64,

    /// Zone the upstream's occurrenceStartTime/occurrenceEndTime are
    /// expressed in (seconds from local midnight)
    pub server_timezone: Tz,

    /// Upstream principal whose calendar is served
    pub owner_key: String,
}

impl UpstreamConfig {
    /// Load upstream configuration from environment variables
    ///
    /// This will also initialize dotenv if it hasn't been done yet.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let username = env::var("UPSTREAM_USER").context("UPSTREAM_USER must be set")?;
        let tz_name =
            env::var("UPSTREAM_TIMEZONE").unwrap_or_else(|_| DEFAULT_UPSTREAM_TIMEZONE.into());
        let server_timezone = parse_timezone(&tz_name)
            .with_context(|| format!("UPSTREAM_TIMEZONE is not a valid IANA zone: {tz_name}"))?;
        let owner_key = env::var("OWNER_KEY").unwrap_or_else(|_| username.clone());

        Ok(Self {
            client_id: env::var("UPSTREAM_CLIENT_ID").context("UPSTREAM_CLIENT_ID must be set")?,
            client_secret: env::var("UPSTREAM_CLIENT_SECRET")
                .context("UPSTREAM_CLIENT_SECRET must be set")?,
            license: env::var("UPSTREAM_LICENSE").context("UPSTREAM_LICENSE must be set")?,
            username,
            password: env::var("UPSTREAM_PASSWORD").context("UPSTREAM_PASSWORD must be set")?,
            base_url: env::var("UPSTREAM_BASE_URL").context("UPSTREAM_BASE_URL must be set")?,
            timeout_secs: 30,
            server_timezone,
            owner_key,
        })
    }
}
