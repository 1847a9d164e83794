//! OAuth2 token lifecycle types
//!
//! The upstream issues short-lived access tokens via password or refresh
//! grants. A token counts as stale 60 seconds before its actual expiry so
//! in-flight requests never race the deadline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the upstream says so
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Lifetime assumed when the token response omits expiresIn
pub const DEFAULT_EXPIRES_IN_SECONDS: i64 = 1800;

/// An issued OAuth2 token pair
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now + Duration::seconds(expires_in),
        }
    }

    /// Whether the access token is expired or about to expire
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::seconds(EXPIRY_SKEW_SECONDS)
    }
}

/// Wire shape of a token grant response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Password grant request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordGrant<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub license: &'a str,
    pub user: &'a str,
    #[serde(rename = "pass")]
    pub password: &'a str,
}

impl<'a> PasswordGrant<'a> {
    pub fn new(
        client_id: &'a str,
        client_secret: &'a str,
        license: &'a str,
        user: &'a str,
        password: &'a str,
    ) -> Self {
        PasswordGrant {
            grant_type: "password",
            client_id,
            client_secret,
            license,
            user,
            password,
        }
    }
}

/// Refresh grant request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant<'a> {
    pub grant_type: &'static str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
}

impl<'a> RefreshGrant<'a> {
    pub fn new(client_id: &'a str, client_secret: &'a str, refresh_token: &'a str) -> Self {
        RefreshGrant {
            grant_type: "refreshToken",
            client_id,
            client_secret,
            refresh_token,
        }
    }
}
