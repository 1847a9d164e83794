//! Upstream REST client
//!
//! One client instance is shared by all request handlers. The reqwest pool is
//! internally thread-safe; the only locking here is around the token state:
//! a plain mutex guards the swap itself and is never held across an await,
//! while a separate async gate single-flights refreshes so N concurrent
//! callers produce exactly one grant request.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use davgate_core::UpstreamConfig;
use davgate_core::model::{
    AddressPage, AddressRecord, CompanyPage, OccurrencePage, UpstreamEvent,
    format_upstream_datetime,
};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use crate::auth::{PasswordGrant, RefreshGrant, TokenResponse, TokenSet};
use crate::error::UpstreamError;

/// Maximum page size the upstream accepts
const MAX_PAGE_SIZE: u32 = 1000;

/// Client for the upstream API with automatic token refresh
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
    base_url: String,
    tokens: Mutex<Option<TokenSet>>,
    refresh_gate: AsyncMutex<()>,
    company_name: OnceCell<String>,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(UpstreamError::from)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(UpstreamClient {
            http,
            config,
            base_url,
            tokens: Mutex::new(None),
            refresh_gate: AsyncMutex::new(()),
            company_name: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // --- token lifecycle ---

    async fn request_token(&self, payload: impl serde::Serialize) -> Result<TokenSet, UpstreamError> {
        let response = self
            .http
            .post(self.url("/token"))
            .json(&payload)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let body: TokenResponse = response.json().await?;
        Ok(TokenSet::from_response(body, Utc::now()))
    }

    async fn password_grant(&self) -> Result<TokenSet, UpstreamError> {
        tracing::debug!("requesting upstream token via password grant");
        self.request_token(PasswordGrant::new(
            &self.config.client_id,
            &self.config.client_secret,
            &self.config.license,
            &self.config.username,
            &self.config.password,
        ))
        .await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenSet, UpstreamError> {
        tracing::debug!("refreshing upstream token");
        self.request_token(RefreshGrant::new(
            &self.config.client_id,
            &self.config.client_secret,
            refresh_token,
        ))
        .await
    }

    /// Return a valid access token, refreshing or re-acquiring as needed
    ///
    /// The fast path takes the token mutex only long enough to clone the
    /// current token. When a grant is needed, the refresh gate serializes it;
    /// waiters re-check after acquiring the gate and observe the fresh token
    /// without issuing a second grant.
    async fn ensure_valid_token(&self) -> Result<String, UpstreamError> {
        let now = Utc::now();
        if let Some(token) = self.fresh_access_token(now) {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;

        let now = Utc::now();
        if let Some(token) = self.fresh_access_token(now) {
            return Ok(token);
        }

        let stale_refresh_token = {
            let guard = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().map(|t| t.refresh_token.clone())
        };

        let new_tokens = match stale_refresh_token {
            None => self.password_grant().await?,
            Some(refresh_token) => match self.refresh_grant(&refresh_token).await {
                Ok(tokens) => tokens,
                Err(err) if err.is_grant_rejection() => {
                    tracing::warn!("token refresh rejected, falling back to password grant: {err}");
                    self.password_grant().await?
                }
                Err(err) => return Err(err),
            },
        };

        let access_token = new_tokens.access_token.clone();
        let mut guard = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(new_tokens);
        Ok(access_token)
    }

    fn fresh_access_token(&self, now: DateTime<Utc>) -> Option<String> {
        let guard = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|t| !t.is_stale(now))
            .map(|t| t.access_token.clone())
    }

    // --- request plumbing ---

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, UpstreamError> {
        let token = self.ensure_valid_token().await?;
        let response = request.bearer_auth(token).send().await?;
        Self::check_status(response).await
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::from_status(status.as_u16(), &body))
    }

    // --- companies & addresses ---

    /// List available company names
    pub async fn get_companies(&self) -> Result<Vec<String>, UpstreamError> {
        let response = self.execute(self.http.get(self.url("/companies"))).await?;
        let page: CompanyPage = response.json().await?;
        Ok(page
            .companies
            .into_iter()
            .filter_map(|c| c.company_name)
            .collect())
    }

    /// First company name, resolved once per process
    ///
    /// Address endpoints are scoped by company; the gateway serves the first
    /// one the upstream reports. The memo is single-assignment and safe under
    /// concurrent first reads.
    pub async fn company_name(&self) -> Result<&str, UpstreamError> {
        self.company_name
            .get_or_try_init(|| async {
                let companies = self.get_companies().await?;
                companies.into_iter().next().ok_or(UpstreamError::Server {
                    status: 503,
                    detail: "upstream reports no companies".into(),
                })
            })
            .await
            .map(String::as_str)
    }

    /// List addresses, optionally filtered by type or search phrase
    pub async fn get_addresses(
        &self,
        company: &str,
        address_type: Option<&str>,
        phrase: Option<&str>,
        offset: u32,
        limit: u32,
    ) -> Result<AddressPage, UpstreamError> {
        let mut query: Vec<(&str, String)> = vec![
            ("offset", offset.to_string()),
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(address_type) = address_type {
            query.push(("addressType", address_type.to_string()));
        }
        if let Some(phrase) = phrase {
            query.push(("phrase", phrase.to_string()));
        }

        let request = self
            .http
            .get(self.url(&format!("/companies/{company}/addresses")))
            .query(&query);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Fetch a single address by key
    pub async fn get_address(
        &self,
        company: &str,
        address_key: &str,
    ) -> Result<AddressRecord, UpstreamError> {
        let request = self
            .http
            .get(self.url(&format!("/companies/{company}/addresses/{address_key}")));
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    // --- calendar events ---

    /// List event occurrences overlapping [start, end]
    ///
    /// Returns one record per instance in the window; series records repeat
    /// their event key and carry no seriesSchema.
    pub async fn get_event_occurrences(
        &self,
        owner_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<OccurrencePage, UpstreamError> {
        let query: Vec<(&str, String)> = vec![
            ("ownerKey", owner_key.to_string()),
            ("endDateTime.gte", format_upstream_datetime(start)),
            ("startDateTime.lte", format_upstream_datetime(end)),
            ("offset", offset.to_string()),
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
        ];

        let request = self
            .http
            .get(self.url("/calendarEventsOccurrences"))
            .query(&query);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Fetch a full event record (including seriesSchema) by key
    pub async fn get_event(&self, event_key: &str) -> Result<UpstreamEvent, UpstreamError> {
        let request = self
            .http
            .get(self.url(&format!("/calendarEvents/{event_key}")))
            .query(&[("fields", "all")]);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Create an event; the upstream assigns and returns the key
    pub async fn create_event(
        &self,
        event: &UpstreamEvent,
    ) -> Result<UpstreamEvent, UpstreamError> {
        let request = self.http.post(self.url("/calendarEvents")).json(event);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Patch an existing event
    pub async fn update_event(
        &self,
        event_key: &str,
        event: &UpstreamEvent,
    ) -> Result<UpstreamEvent, UpstreamError> {
        let request = self
            .http
            .patch(self.url(&format!("/calendarEvents/{event_key}")))
            .json(event);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Delete an event (whole series for serial events)
    pub async fn delete_event(&self, event_key: &str) -> Result<(), UpstreamError> {
        let request = self
            .http
            .delete(self.url(&format!("/calendarEvents/{event_key}")));
        self.execute(request).await?;
        Ok(())
    }

    // Per-occurrence endpoints. Not reachable from the DAV surface (the
    // dispatcher rejects per-occurrence writes), kept callable for future
    // use.

    /// Fetch one occurrence of a serial event
    pub async fn get_event_occurrence(
        &self,
        event_key: &str,
        occurrence_id: &str,
    ) -> Result<UpstreamEvent, UpstreamError> {
        let request = self.http.get(self.url(&format!(
            "/calendarEvents/{event_key}/occurrences/{occurrence_id}"
        )));
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Patch one occurrence of a serial event
    pub async fn update_event_occurrence(
        &self,
        event_key: &str,
        occurrence_id: &str,
        event: &UpstreamEvent,
    ) -> Result<UpstreamEvent, UpstreamError> {
        let request = self
            .http
            .patch(self.url(&format!(
                "/calendarEvents/{event_key}/occurrences/{occurrence_id}"
            )))
            .json(event);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    /// Delete one occurrence of a serial event
    pub async fn delete_event_occurrence(
        &self,
        event_key: &str,
        occurrence_id: &str,
    ) -> Result<(), UpstreamError> {
        let request = self.http.delete(self.url(&format!(
            "/calendarEvents/{event_key}/occurrences/{occurrence_id}"
        )));
        self.execute(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use davgate_core::timezone::parse_timezone;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            license: "LIC".into(),
            username: "alice".into(),
            password: "pw".into(),
            base_url: "https://upstream.test/v1/".into(),
            timeout_secs: 30,
            server_timezone: parse_timezone("Europe/Berlin").unwrap(),
            owner_key: "alice".into(),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = UpstreamClient::new(test_config()).unwrap();
        assert_eq!(client.url("/token"), "https://upstream.test/v1/token");
        assert_eq!(
            client.url("/calendarEvents/K1"),
            "https://upstream.test/v1/calendarEvents/K1"
        );
    }

    #[test]
    fn test_fresh_access_token_respects_staleness() {
        let client = UpstreamClient::new(test_config()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 13, 12, 0, 0).unwrap();

        assert!(client.fresh_access_token(now).is_none());

        {
            let mut guard = client.tokens.lock().unwrap();
            *guard = Some(TokenSet {
                access_token: "at-1".into(),
                refresh_token: "rt-1".into(),
                expires_at: now + chrono::Duration::seconds(300),
            });
        }

        assert_eq!(client.fresh_access_token(now).as_deref(), Some("at-1"));
        // within the 60s skew window the token no longer counts as fresh
        assert!(
            client
                .fresh_access_token(now + chrono::Duration::seconds(250))
                .is_none()
        );
    }
}
