//! Route handlers for the DAV surfaces
//!
//! Dispatch is (path prefix, method): axum routes carve up the resource
//! tree, and each handler matches on the method to cover the WebDAV verbs
//! axum has no shorthand for.

pub mod caldav;
pub mod carddav;
pub mod feed;
pub mod principal;
pub mod wellknown;

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::dav::multistatus::{Prop, PropValue};
use crate::dav::propfind::{PropFindRequest, PropName};
use crate::error::ApiError;

/// Maximum allowed body size for DAV requests (1 MB)
pub const MAX_DAV_BODY_SIZE: usize = 1024 * 1024;

/// Methods the gateway accepts anywhere on the DAV trees
pub const ALLOWED_METHODS: &str =
    "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE, PROPFIND, PROPPATCH, REPORT";

/// Read a request body as UTF-8 with a size limit
pub async fn read_body_string(body: Body) -> Result<String, ApiError> {
    let bytes = axum::body::to_bytes(body, MAX_DAV_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ApiError::BadRequest(format!("body is not valid UTF-8: {e}")))
}

/// OPTIONS response advertising the DAV compliance classes
pub fn dav_options_response() -> Response {
    (
        StatusCode::OK,
        [
            ("dav", "1, 3, calendar-access, addressbook"),
            ("allow", ALLOWED_METHODS),
        ],
    )
        .into_response()
}

/// Wrap a multistatus document as a 207 response
pub fn multistatus_response(xml: String) -> Response {
    (
        StatusCode::MULTI_STATUS,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        xml,
    )
        .into_response()
}

/// 405 with the Allow header set
pub fn method_not_allowed(method: &axum::http::Method, resource: &str) -> ApiError {
    ApiError::MethodNotAllowed(format!("{method} is not supported on {resource}"))
}

/// RFC 9110 HTTP-date for getlastmodified / Last-Modified
pub fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Partition the properties a resource can serve against a PROPFIND request
///
/// Returns the (found, not-found) pair the multistatus propstats are built
/// from. `propname` requests get the names back with empty values.
pub fn select_props(
    request: &PropFindRequest,
    available: Vec<Prop>,
) -> (Vec<Prop>, Vec<PropName>) {
    match request {
        PropFindRequest::AllProp => (available, Vec::new()),
        PropFindRequest::PropName => (
            available
                .into_iter()
                .map(|(name, _)| (name, PropValue::Empty))
                .collect(),
            Vec::new(),
        ),
        PropFindRequest::Prop(requested) => {
            let mut found = Vec::new();
            let mut not_found = Vec::new();
            for name in requested {
                match available.iter().find(|(have, _)| have == name) {
                    Some((have, value)) => found.push((have.clone(), value.clone())),
                    None => not_found.push(name.clone()),
                }
            }
            (found, not_found)
        }
    }
}

/// Standard properties of a leaf object (event or address)
pub fn object_props(
    etag: &str,
    content_type: &str,
    content_length: usize,
    last_modified: DateTime<Utc>,
) -> Vec<Prop> {
    vec![
        (
            PropName::dav("resourcetype"),
            PropValue::ResourceType(Vec::new()),
        ),
        (
            PropName::dav("getetag"),
            PropValue::Text(crate::dav::quote_etag(etag)),
        ),
        (
            PropName::dav("getcontenttype"),
            PropValue::Text(content_type.to_string()),
        ),
        (
            PropName::dav("getcontentlength"),
            PropValue::Text(content_length.to_string()),
        ),
        (
            PropName::dav("getlastmodified"),
            PropValue::Text(http_date(last_modified)),
        ),
    ]
}

/// Fallback for paths outside the DAV trees
///
/// Those belong to the local-filesystem WebDAV backend, an external
/// collaborator this crate does not ship; without one configured every such
/// path is absent.
pub async fn filesystem_fallback() -> ApiError {
    ApiError::NotFound("no filesystem backend configured for this path".into())
}
