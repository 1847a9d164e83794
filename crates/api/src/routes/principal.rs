//! Principal discovery (current-user-principal resource)
//!
//! One synthetic principal exists. Its PROPFIND answers carry the home-set
//! properties clients use to find the calendar and address book trees.

use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

use super::{multistatus_response, read_body_string, select_props};
use crate::dav::multistatus::{MultistatusWriter, PropValue, ResourceKind};
use crate::dav::propfind::{PropName, parse_propfind, parse_proppatch};
use crate::error::ApiError;
use crate::{ADDRESSBOOK_HOME, AppState, CALENDAR_HOME, PRINCIPAL_PATH};

pub async fn handler(
    state: axum::extract::State<AppState>,
    method: Method,
    _headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    match method.as_str() {
        "OPTIONS" => Ok(principal_options()),
        "PROPFIND" => propfind(&state, body).await,
        "PROPPATCH" => proppatch(body).await,
        "REPORT" => Err(ApiError::BadRequest(
            "no REPORT types are defined on the principal".into(),
        )),
        _ => Err(ApiError::MethodNotAllowed(format!(
            "{method} is not supported on the principal"
        ))),
    }
}

/// OPTIONS advertises discovery-only methods on the principal
fn principal_options() -> Response {
    (
        StatusCode::OK,
        [
            ("dav", "1, 3, calendar-access, addressbook"),
            ("allow", "OPTIONS, PROPFIND, REPORT"),
        ],
    )
        .into_response()
}

async fn propfind(state: &AppState, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let mut available = vec![
        (
            PropName::dav("resourcetype"),
            PropValue::ResourceType(vec![ResourceKind::Collection, ResourceKind::Principal]),
        ),
        (
            PropName::dav("current-user-principal"),
            PropValue::Href(PRINCIPAL_PATH.to_string()),
        ),
        (
            PropName::dav("displayname"),
            PropValue::Text("Current user".to_string()),
        ),
    ];
    if state.config.enable_caldav {
        available.push((
            PropName::caldav("calendar-home-set"),
            PropValue::Href(CALENDAR_HOME.to_string()),
        ));
    }
    if state.config.enable_carddav {
        available.push((
            PropName::carddav("addressbook-home-set"),
            PropValue::Href(ADDRESSBOOK_HOME.to_string()),
        ));
    }

    let (found, not_found) = select_props(&request, available);

    let mut writer = MultistatusWriter::new()?;
    writer.write_response(PRINCIPAL_PATH, &found, &not_found)?;
    Ok(multistatus_response(writer.finish()?))
}

async fn proppatch(body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let names = parse_proppatch(&body)?;

    let mut writer = MultistatusWriter::new()?;
    writer.write_forbidden_response(PRINCIPAL_PATH, &names)?;
    Ok(multistatus_response(writer.finish()?))
}
