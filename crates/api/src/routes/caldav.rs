//! CalDAV resource handlers
//!
//! Resource typing follows path depth under the calendar home: the home set,
//! the single calendar, and calendar objects. The calendar itself is
//! structurally immutable from the client side; objects are read-write.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use chrono::Utc;
use davgate_core::ObjectName;
use davgate_core::identity::object_stem;

use super::{
    dav_options_response, method_not_allowed, multistatus_response, object_props,
    read_body_string, select_props,
};
use crate::dav::multistatus::{MultistatusWriter, Prop, PropValue, ResourceKind};
use crate::dav::propfind::{PropFindRequest, PropName, parse_propfind, parse_proppatch};
use crate::dav::report::{ReportProps, ReportRequest, parse_report};
use crate::dav::{Depth, Preconditions, quote_etag};
use crate::error::ApiError;
use crate::store::CalendarStore;
use crate::{AppState, CALENDAR_HOME, CALENDAR_NAME, CALENDAR_PATH, PRINCIPAL_PATH};

const CONTENT_TYPE_ICS: &str = "text/calendar; charset=utf-8";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/calendars", any(home_handler))
        .route("/calendars/", any(home_handler))
        .route("/calendars/{calendar}", any(calendar_handler))
        .route("/calendars/{calendar}/", any(calendar_handler))
        .route("/calendars/{calendar}/{object}", any(object_handler))
}

// --- home set ---

async fn home_handler(
    State(_state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    match method.as_str() {
        "OPTIONS" => Ok(dav_options_response()),
        "PROPFIND" => home_propfind(&headers, body).await,
        "PROPPATCH" => forbidden_proppatch(CALENDAR_HOME, body).await,
        "MKCOL" => Err(ApiError::MethodNotAllowed(
            "the calendar home already exists".into(),
        )),
        "PUT" | "DELETE" | "COPY" | "MOVE" => Err(ApiError::Forbidden(
            "the calendar home cannot be modified".into(),
        )),
        _ => Err(method_not_allowed(&method, "the calendar home")),
    }
}

async fn home_propfind(headers: &HeaderMap, body: Body) -> Result<Response, ApiError> {
    let depth = Depth::from_headers(headers, Depth::Zero)?;
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let mut writer = MultistatusWriter::new()?;
    let (found, not_found) = select_props(&request, home_props());
    writer.write_response(CALENDAR_HOME, &found, &not_found)?;

    if depth != Depth::Zero {
        let (found, not_found) = select_props(&request, calendar_props());
        writer.write_response(CALENDAR_PATH, &found, &not_found)?;
    }

    Ok(multistatus_response(writer.finish()?))
}

fn home_props() -> Vec<Prop> {
    vec![
        (
            PropName::dav("resourcetype"),
            PropValue::ResourceType(vec![ResourceKind::Collection]),
        ),
        (
            PropName::dav("displayname"),
            PropValue::Text("Calendars".to_string()),
        ),
        (
            PropName::dav("current-user-principal"),
            PropValue::Href(PRINCIPAL_PATH.to_string()),
        ),
        (
            PropName::caldav("calendar-home-set"),
            PropValue::Href(CALENDAR_HOME.to_string()),
        ),
    ]
}

// --- the calendar collection ---

async fn calendar_handler(
    State(state): State<AppState>,
    Path(calendar): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if calendar != CALENDAR_NAME {
        return match method.as_str() {
            // Exactly one calendar exists per principal; the client cannot
            // provision more
            "MKCOL" => mkcol_rejected(&headers, body).await,
            _ => Err(ApiError::NotFound(format!("no calendar named {calendar}"))),
        };
    }

    match method.as_str() {
        "OPTIONS" => Ok(dav_options_response()),
        "PROPFIND" => calendar_propfind(&state, &headers, body).await,
        "REPORT" => calendar_report(&state, body).await,
        "PROPPATCH" => forbidden_proppatch(CALENDAR_PATH, body).await,
        "MKCOL" => Err(ApiError::MethodNotAllowed(
            "the calendar already exists".into(),
        )),
        "PUT" | "DELETE" | "COPY" | "MOVE" => Err(ApiError::Forbidden(
            "the calendar collection cannot be modified".into(),
        )),
        _ => Err(method_not_allowed(&method, "the calendar")),
    }
}

/// MKCOL of a new calendar: a body is unsupported media, and provisioning
/// is forbidden either way
async fn mkcol_rejected(_headers: &HeaderMap, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    if !body.trim().is_empty() {
        return Err(ApiError::UnsupportedMediaType(
            "MKCOL with a request body is not supported".into(),
        ));
    }
    Err(ApiError::Forbidden(
        "creating calendars is not supported".into(),
    ))
}

fn calendar_props() -> Vec<Prop> {
    vec![
        (
            PropName::dav("resourcetype"),
            PropValue::ResourceType(vec![ResourceKind::Collection, ResourceKind::Calendar]),
        ),
        (
            PropName::dav("displayname"),
            PropValue::Text("Work Calendar".to_string()),
        ),
        (
            PropName::caldav("calendar-description"),
            PropValue::Text("Synced company calendar".to_string()),
        ),
        (
            PropName::caldav("supported-calendar-component-set"),
            PropValue::Components(vec!["VEVENT".to_string()]),
        ),
        (
            PropName::dav("current-user-principal"),
            PropValue::Href(PRINCIPAL_PATH.to_string()),
        ),
        (
            PropName::caldav("calendar-home-set"),
            PropValue::Href(CALENDAR_HOME.to_string()),
        ),
        (
            PropName::dav("supported-report-set"),
            PropValue::SupportedReports(vec![
                "cal:calendar-query".to_string(),
                "cal:calendar-multiget".to_string(),
            ]),
        ),
    ]
}

async fn calendar_propfind(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let depth = Depth::from_headers(headers, Depth::Zero)?;
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let mut writer = MultistatusWriter::new()?;
    let (found, not_found) = select_props(&request, calendar_props());
    writer.write_response(CALENDAR_PATH, &found, &not_found)?;

    if depth != Depth::Zero {
        let now = Utc::now();
        let objects = state.calendar_store().list_objects(None).await?;
        for object in &objects {
            let available = object_props(
                &object.etag,
                CONTENT_TYPE_ICS,
                object.content_length(),
                now,
            );
            let (found, not_found) = select_props(&request, available);
            writer.write_response(&object.path, &found, &not_found)?;
        }
    }

    Ok(multistatus_response(writer.finish()?))
}

async fn calendar_report(state: &AppState, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let store = state.calendar_store();

    match parse_report(&body)? {
        ReportRequest::CalendarQuery { start, end, props } => {
            // Only the time-range filter is evaluated; other filter types
            // degrade to return-all over the default window
            let window = match (start, end) {
                (None, None) => None,
                (start, end) => {
                    let default = store.sync_window();
                    Some((start.unwrap_or(default.0), end.unwrap_or(default.1)))
                }
            };
            let objects = store.list_objects(window).await?;

            let mut writer = MultistatusWriter::new()?;
            let now = Utc::now();
            for object in &objects {
                write_object_report_response(&mut writer, &props, object, now)?;
            }
            Ok(multistatus_response(writer.finish()?))
        }
        ReportRequest::CalendarMultiget { hrefs, props } => {
            let mut writer = MultistatusWriter::new()?;
            let now = Utc::now();

            for href in &hrefs {
                let decoded = urlencoding::decode(href)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| href.clone());
                let name = match ObjectName::from_ics_path(&decoded) {
                    Ok(name) => name,
                    Err(_) => continue,
                };

                match store.get_object(&name).await {
                    Ok(object) => {
                        write_object_report_response(&mut writer, &props, &object, now)?;
                    }
                    // Missing members are omitted from the multistatus
                    Err(ApiError::NotFound(_)) => {}
                    Err(ApiError::BadGateway(_)) | Err(ApiError::GatewayTimeout) => {
                        writer.write_status_response(&decoded, "HTTP/1.1 502 Bad Gateway")?;
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(multistatus_response(writer.finish()?))
        }
        ReportRequest::AddressbookQuery { .. } | ReportRequest::AddressbookMultiget { .. } => {
            Err(ApiError::BadRequest(
                "addressbook reports are not valid on a calendar".into(),
            ))
        }
    }
}

fn write_object_report_response(
    writer: &mut MultistatusWriter,
    props: &ReportProps,
    object: &crate::store::CalendarObject,
    now: chrono::DateTime<Utc>,
) -> Result<(), ApiError> {
    let mut available = object_props(&object.etag, CONTENT_TYPE_ICS, object.content_length(), now);
    if props.include_data {
        available.push((
            PropName::caldav("calendar-data"),
            PropValue::CalendarData(object.data.clone()),
        ));
    }

    let request = if props.names.is_empty() {
        PropFindRequest::AllProp
    } else {
        PropFindRequest::Prop(props.names.clone())
    };
    let (found, not_found) = select_props(&request, available);
    writer.write_response(&object.path, &found, &not_found)
}

// --- calendar objects ---

async fn object_handler(
    State(state): State<AppState>,
    Path((calendar, object)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if calendar != CALENDAR_NAME {
        return match method.as_str() {
            // MKCOL below a calendar that does not exist
            "MKCOL" => Err(ApiError::Conflict(format!(
                "parent collection /calendars/{calendar}/ does not exist"
            ))),
            _ => Err(ApiError::NotFound(format!("no calendar named {calendar}"))),
        };
    }

    let stem = object_stem(&object, ".ics")?;
    let name = ObjectName::parse_stem(&stem);
    let store = state.calendar_store();

    match method.as_str() {
        "OPTIONS" => Ok(dav_options_response()),
        "GET" | "HEAD" => {
            let found = store.get_object(&name).await?;
            let mut response = (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, CONTENT_TYPE_ICS.to_string()),
                    (header::ETAG, quote_etag(&found.etag)),
                ],
                if method == Method::HEAD {
                    String::new()
                } else {
                    found.data.clone()
                },
            )
                .into_response();
            if method == Method::HEAD {
                response.headers_mut().insert(
                    header::CONTENT_LENGTH,
                    header::HeaderValue::from(found.content_length()),
                );
            }
            Ok(response)
        }
        "PUT" => {
            let preconditions = Preconditions::from_headers(&headers)?;
            let body = read_body_string(body).await?;
            let outcome = store.put_object(&name, &body, &preconditions).await?;

            if outcome.created {
                Ok((
                    StatusCode::CREATED,
                    [
                        (header::ETAG, quote_etag(&outcome.object.etag)),
                        (header::LOCATION, outcome.object.path.clone()),
                    ],
                )
                    .into_response())
            } else {
                Ok((
                    StatusCode::NO_CONTENT,
                    [(header::ETAG, quote_etag(&outcome.object.etag))],
                )
                    .into_response())
            }
        }
        "DELETE" => {
            store.delete_object(&name).await?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        "PROPFIND" => object_propfind(&store, &name, body).await,
        "PROPPATCH" => {
            let path = format!("{CALENDAR_PATH}{stem}.ics");
            forbidden_proppatch_owned(path, body).await
        }
        "MKCOL" => Err(ApiError::Forbidden(
            "collections cannot be created inside the calendar".into(),
        )),
        "COPY" | "MOVE" => Err(ApiError::Forbidden(
            "calendar objects cannot be copied or moved".into(),
        )),
        _ => Err(method_not_allowed(&method, "a calendar object")),
    }
}

async fn object_propfind(
    store: &CalendarStore,
    name: &ObjectName,
    body: Body,
) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let object = store.get_object(name).await?;
    let available = object_props(
        &object.etag,
        CONTENT_TYPE_ICS,
        object.content_length(),
        Utc::now(),
    );
    let (found, not_found) = select_props(&request, available);

    let mut writer = MultistatusWriter::new()?;
    writer.write_response(&object.path, &found, &not_found)?;
    Ok(multistatus_response(writer.finish()?))
}

async fn forbidden_proppatch(href: &str, body: Body) -> Result<Response, ApiError> {
    forbidden_proppatch_owned(href.to_string(), body).await
}

async fn forbidden_proppatch_owned(href: String, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let names = parse_proppatch(&body)?;

    let mut writer = MultistatusWriter::new()?;
    writer.write_forbidden_response(&href, &names)?;
    Ok(multistatus_response(writer.finish()?))
}
