//! ICS subscription feed
//!
//! `GET /feed.ics?calendar=OWNER_KEY` returns one combined VCALENDAR with
//! every event in the sync window, for clients that subscribe to a URL
//! instead of speaking CalDAV. Series are deduplicated by event key exactly
//! like the CalDAV listing.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::config::ListingMode;
use crate::error::ApiError;
use crate::store::CalendarStore;
use crate::AppState;

pub async fn handler(
    State(state): State<AppState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::MethodNotAllowed(format!(
            "{method} is not supported on the feed"
        )));
    }

    let Some(owner_key) = params.get("calendar").filter(|v| !v.is_empty()) else {
        return Err(ApiError::BadRequest(
            "Missing required 'calendar' parameter. Usage: /feed.ics?calendar=OWNER_KEY".into(),
        ));
    };

    // The feed always presents series once with their RRULE, regardless of
    // the CalDAV listing mode
    let store = CalendarStore::new(
        state.upstream.clone(),
        ListingMode::Series,
        state.config.sync_weeks,
    );
    let objects = store.list_objects_for_owner(owner_key, None).await?;

    let mut feed = String::new();
    feed.push_str("BEGIN:VCALENDAR\r\n");
    feed.push_str("VERSION:2.0\r\n");
    feed.push_str("PRODID:-//davgate//calendar feed//EN\r\n");
    feed.push_str("CALSCALE:GREGORIAN\r\n");
    for object in &objects {
        feed.push_str(&extract_vevent(&object.data));
    }
    feed.push_str("END:VCALENDAR\r\n");

    let body = if method == Method::HEAD {
        String::new()
    } else {
        feed
    };

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "text/calendar; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                "inline; filename=\"calendar.ics\"".to_string(),
            ),
        ],
        body,
    )
        .into_response())
}

/// The VEVENT block (including any VALARM) of a single-event VCALENDAR
fn extract_vevent(ics: &str) -> String {
    let mut out = String::new();
    let mut in_event = false;
    for line in ics.lines() {
        if line.starts_with("BEGIN:VEVENT") {
            in_event = true;
        }
        if in_event {
            out.push_str(line.trim_end_matches('\r'));
            out.push_str("\r\n");
        }
        if line.starts_with("END:VEVENT") {
            in_event = false;
        }
    }
    out
}
