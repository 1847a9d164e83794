//! Davgate upstream client
//!
//! Typed REST client for the proprietary calendar/address upstream: OAuth2
//! password/refresh token lifecycle with single-flight refresh, plus the
//! endpoints the gateway consumes.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::TokenSet;
pub use client::UpstreamClient;
pub use error::UpstreamError;
