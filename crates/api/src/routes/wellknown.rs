//! Well-known URI redirects (RFC 6764)

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::PRINCIPAL_PATH;

/// `/.well-known/caldav` and `/.well-known/carddav` both point clients at
/// the principal, which carries the home-set properties for discovery
pub async fn redirect_to_principal() -> Response {
    (
        StatusCode::PERMANENT_REDIRECT,
        [(header::LOCATION, PRINCIPAL_PATH)],
    )
        .into_response()
}
