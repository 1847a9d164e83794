#![allow(dead_code)]

//! Mock upstream API server for integration tests
//!
//! A small axum app that impersonates the upstream: token grants with
//! scripted lifetimes, an in-memory event store with server-assigned keys,
//! a static occurrence listing, and the companies/addresses endpoints.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use serde_json::{Value, json};

#[derive(Default)]
pub struct MockState {
    pub password_grants: usize,
    pub refresh_grants: usize,
    pub fail_refresh: bool,
    /// Scripted expiresIn values for successive token grants; empty means
    /// long-lived tokens
    pub token_lifetimes: VecDeque<i64>,
    /// Total requests seen, token grants included
    pub requests: usize,
    pub events: HashMap<String, Value>,
    pub occurrences: Vec<Value>,
    pub addresses: HashMap<String, Value>,
    next_key: usize,
}

impl MockState {
    pub fn insert_event(&mut self, key: &str, event: Value) {
        let mut event = event;
        event["key"] = json!(key);
        self.events.insert(key.to_string(), event);
    }
}

pub type SharedState = Arc<Mutex<MockState>>;

pub struct MockUpstream {
    pub state: SharedState,
    pub base_url: String,
}

/// Counts every request the mock sees, so tests can assert that a rejected
/// operation made no upstream call at all
async fn count_requests(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    state.lock().unwrap().requests += 1;
    next.run(req).await
}

pub async fn spawn_mock_upstream(state: MockState) -> MockUpstream {
    let shared: SharedState = Arc::new(Mutex::new(state));

    let app = Router::new()
        .route("/token", post(token))
        .route("/companies", get(companies))
        .route("/companies/{company}/addresses", get(addresses))
        .route("/companies/{company}/addresses/{key}", get(address))
        .route("/calendarEventsOccurrences", get(occurrences))
        .route("/calendarEvents", post(create_event))
        .route("/calendarEvents/{key}", any(event_by_key))
        .layer(axum::middleware::from_fn_with_state(
            shared.clone(),
            count_requests,
        ))
        .with_state(shared.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock upstream");
    });

    MockUpstream {
        state: shared,
        base_url: format!("http://{addr}"),
    }
}

async fn token(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut guard = state.lock().unwrap();
    let grant_type = body["grantType"].as_str().unwrap_or_default().to_string();

    match grant_type.as_str() {
        "password" => guard.password_grants += 1,
        "refreshToken" => {
            guard.refresh_grants += 1;
            if guard.fail_refresh {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid refresh token"})),
                )
                    .into_response();
            }
        }
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("unknown grantType {other}")})),
            )
                .into_response();
        }
    }

    let serial = guard.password_grants + guard.refresh_grants;
    let expires_in = guard.token_lifetimes.pop_front().unwrap_or(3600);
    Json(json!({
        "accessToken": format!("at-{serial}"),
        "refreshToken": format!("rt-{serial}"),
        "expiresIn": expires_in,
        "tokenType": "bearer",
    }))
    .into_response()
}

async fn companies() -> Response {
    Json(json!({"companies": [{"companyName": "TestCo"}]})).into_response()
}

async fn addresses(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let guard = state.lock().unwrap();
    let wanted_type = params.get("addressType").cloned();
    let matching: Vec<Value> = guard
        .addresses
        .values()
        .filter(|a| match &wanted_type {
            Some(t) => a["addressType"].as_str() == Some(t.as_str()),
            None => true,
        })
        .cloned()
        .collect();
    let count = matching.len();
    Json(json!({"addresses": matching, "count": count, "totalCount": count})).into_response()
}

async fn address(
    State(state): State<SharedState>,
    Path((_company, key)): Path<(String, String)>,
) -> Response {
    let guard = state.lock().unwrap();
    match guard.addresses.get(&key) {
        Some(record) => Json(record.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "address not found").into_response(),
    }
}

async fn occurrences(State(state): State<SharedState>) -> Response {
    let guard = state.lock().unwrap();
    let count = guard.occurrences.len();
    Json(json!({
        "calendarEvents": guard.occurrences,
        "count": count,
        "totalCount": count,
    }))
    .into_response()
}

async fn create_event(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut guard = state.lock().unwrap();
    guard.next_key += 1;
    let key = format!("A{}", guard.next_key);
    let mut event = body;
    event["key"] = json!(key);
    guard.events.insert(key.clone(), event.clone());
    Json(event).into_response()
}

async fn event_by_key(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    method: axum::http::Method,
    body: axum::body::Body,
) -> Response {
    match method.as_str() {
        "GET" => {
            let guard = state.lock().unwrap();
            match guard.events.get(&key) {
                Some(event) => Json(event.clone()).into_response(),
                None => (StatusCode::NOT_FOUND, "event not found").into_response(),
            }
        }
        "PATCH" => {
            let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let patch: Value = serde_json::from_slice(&bytes).unwrap_or(json!({}));
            let mut guard = state.lock().unwrap();
            if !guard.events.contains_key(&key) {
                return (StatusCode::NOT_FOUND, "event not found").into_response();
            }
            let mut updated = patch;
            updated["key"] = json!(key);
            guard.events.insert(key.clone(), updated.clone());
            Json(updated).into_response()
        }
        "DELETE" => {
            let mut guard = state.lock().unwrap();
            if guard.events.remove(&key).is_some() {
                StatusCode::NO_CONTENT.into_response()
            } else {
                (StatusCode::NOT_FOUND, "event not found").into_response()
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

// --- gateway construction over the mock ---

use api::config::{ListingMode, ServerConfig};
use api::AppState;
use davgate_core::UpstreamConfig;
use davgate_core::timezone::parse_timezone;
use davgate_upstream::UpstreamClient;

pub fn upstream_config(base_url: &str) -> UpstreamConfig {
    UpstreamConfig {
        client_id: "test-client".into(),
        client_secret: "test-secret".into(),
        license: "LIC".into(),
        username: "alice".into(),
        password: "pw".into(),
        base_url: base_url.to_string(),
        timeout_secs: 5,
        server_timezone: parse_timezone("Europe/Berlin").expect("tz"),
        owner_key: "INFO".into(),
    }
}

pub fn server_config(listing_mode: ListingMode) -> ServerConfig {
    ServerConfig {
        listing_mode,
        ..ServerConfig::default()
    }
}

pub fn gateway(mock: &MockUpstream, config: ServerConfig) -> Router {
    let client = UpstreamClient::new(upstream_config(&mock.base_url)).expect("client");
    api::create_router(AppState::new(Arc::new(client), config))
}

// --- fixtures ---

/// A serial business-days event with ten listed occurrences
pub fn seed_series(state: &mut MockState) {
    state.insert_event(
        "SER1",
        json!({
            "eventMode": "serial",
            "subject": "Daily standup",
            "seriesStartDate": "2026-01-10",
            "occurrenceStartTime": 50400,
            "occurrenceEndTime": 54000,
            "wholeDayEvent": false,
            "seriesSchema": {
                "schemaType": "daily",
                "dailySchemaData": {"regularity": "allBusinessDays"}
            }
        }),
    );
    for i in 1..=10 {
        state.occurrences.push(json!({
            "key": "SER1",
            "occurrenceId": format!("O{i}"),
            "eventMode": "serial",
            "subject": "Daily standup",
            "startDateTime": format!("2026-01-{:02}T13:00:00Z", 11 + i),
            "endDateTime": format!("2026-01-{:02}T14:00:00Z", 11 + i),
        }));
    }
}

/// A lone single event in the listing
pub fn seed_single(state: &mut MockState) {
    state.insert_event(
        "SNG1",
        json!({
            "eventMode": "single",
            "subject": "Dentist",
            "startDateTime": "2026-01-14T09:00:00Z",
            "endDateTime": "2026-01-14T10:00:00Z",
        }),
    );
    state.occurrences.push(json!({
        "key": "SNG1",
        "eventMode": "single",
        "subject": "Dentist",
        "startDateTime": "2026-01-14T09:00:00Z",
        "endDateTime": "2026-01-14T10:00:00Z",
    }));
}

pub fn seed_addresses(state: &mut MockState) {
    state.addresses.insert(
        "BACHE".into(),
        json!({
            "key": "BACHE",
            "addressType": "customer",
            "postAddresses": [{
                "postAddress": {
                    "line1": "Bach Elektro GmbH",
                    "street": "Hauptstr. 1",
                    "zipCodeAndCity": "10115 Berlin",
                    "phone": "+49 30 1234",
                    "email": "info@bach.example"
                }
            }]
        }),
    );
    state.addresses.insert(
        "MEIER".into(),
        json!({
            "key": "MEIER",
            "addressType": "supplier",
            "postAddresses": []
        }),
    );
}
