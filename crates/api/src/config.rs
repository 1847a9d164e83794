//! Server configuration from environment variables

use anyhow::{Context, Result};
use std::env;

/// Default listing window half-width in weeks
const DEFAULT_SYNC_WEEKS: i64 = 2;

/// How a Depth:1 listing of the calendar presents series events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingMode {
    /// One object per series, deduplicated by event key, with a synthesized
    /// RRULE
    #[default]
    Series,
    /// One standalone object per occurrence, no RRULE
    Occurrence,
}

impl ListingMode {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "series" => Ok(ListingMode::Series),
            "occurrence" => Ok(ListingMode::Occurrence),
            other => anyhow::bail!("GATEWAY_LISTING_MODE must be 'series' or 'occurrence', got '{other}'"),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_caldav: bool,
    pub enable_carddav: bool,
    pub debug: bool,
    pub sync_weeks: i64,
    pub listing_mode: ListingMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_caldav: true,
            enable_carddav: true,
            debug: false,
            sync_weeks: DEFAULT_SYNC_WEEKS,
            listing_mode: ListingMode::Series,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        Ok(Self {
            host: env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: env::var("GATEWAY_PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .context("Failed to parse GATEWAY_PORT as u16")?,
            enable_caldav: parse_flag("GATEWAY_ENABLE_CALDAV", defaults.enable_caldav)?,
            enable_carddav: parse_flag("GATEWAY_ENABLE_CARDDAV", defaults.enable_carddav)?,
            debug: parse_flag("GATEWAY_DEBUG", defaults.debug)?,
            sync_weeks: env::var("GATEWAY_SYNC_WEEKS")
                .unwrap_or_else(|_| defaults.sync_weeks.to_string())
                .parse()
                .context("Failed to parse GATEWAY_SYNC_WEEKS")?,
            listing_mode: match env::var("GATEWAY_LISTING_MODE") {
                Ok(value) => ListingMode::parse(&value)?,
                Err(_) => defaults.listing_mode,
            },
        })
    }
}

fn parse_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => anyhow::bail!("{name} must be a boolean flag, got '{other}'"),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_vars() {
        for name in [
            "GATEWAY_HOST",
            "GATEWAY_PORT",
            "GATEWAY_ENABLE_CALDAV",
            "GATEWAY_ENABLE_CARDDAV",
            "GATEWAY_DEBUG",
            "GATEWAY_SYNC_WEEKS",
            "GATEWAY_LISTING_MODE",
        ] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_vars();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.enable_caldav);
        assert!(config.enable_carddav);
        assert!(!config.debug);
        assert_eq!(config.sync_weeks, 2);
        assert_eq!(config.listing_mode, ListingMode::Series);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_vars();
        unsafe {
            env::set_var("GATEWAY_PORT", "9090");
            env::set_var("GATEWAY_ENABLE_CARDDAV", "false");
            env::set_var("GATEWAY_LISTING_MODE", "occurrence");
            env::set_var("GATEWAY_SYNC_WEEKS", "4");
        }
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 9090);
        assert!(!config.enable_carddav);
        assert_eq!(config.listing_mode, ListingMode::Occurrence);
        assert_eq!(config.sync_weeks, 4);
        clear_vars();
    }

    #[test]
    #[serial]
    fn test_rejects_bad_listing_mode() {
        clear_vars();
        unsafe { env::set_var("GATEWAY_LISTING_MODE", "both") };
        assert!(ServerConfig::from_env().is_err());
        clear_vars();
    }
}
