//! Error handling for the DAV surface
//!
//! Every error kind maps to exactly one HTTP status. Bodies are short
//! text/plain diagnostics; 412 carries no body at all. 401 is never produced
//! here: authentication belongs to the reverse proxy in front of the
//! gateway.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use davgate_core::GatewayError;
use davgate_upstream::UpstreamError;

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    MethodNotAllowed(String),
    Conflict(String),
    PreconditionFailed,
    UnsupportedMediaType(String),
    /// Upstream rejected the translated payload; its message is relayed
    Unprocessable(String),
    BadGateway(String),
    GatewayTimeout,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::MethodNotAllowed(msg) => {
                return (
                    StatusCode::METHOD_NOT_ALLOWED,
                    [
                        (header::ALLOW, crate::routes::ALLOWED_METHODS),
                        (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    ],
                    msg,
                )
                    .into_response();
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PreconditionFailed => {
                return StatusCode::PRECONDITION_FAILED.into_response();
            }
            ApiError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::GatewayTimeout => (StatusCode::GATEWAY_TIMEOUT, "upstream deadline exceeded".into()),
            ApiError::Internal(msg) => {
                tracing::error!("internal server error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into())
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            detail,
        )
            .into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidCalendarData(msg) => ApiError::BadRequest(msg),
            GatewayError::InvalidRecurrenceRule(msg) => {
                ApiError::BadRequest(format!("invalid recurrence rule: {msg}"))
            }
            GatewayError::InvalidDateTime(msg) => {
                ApiError::BadRequest(format!("invalid datetime: {msg}"))
            }
            GatewayError::InvalidObjectPath(path) => {
                ApiError::NotFound(format!("no resource at {path}"))
            }
            GatewayError::InvalidTimezone(tz) => {
                ApiError::Internal(format!("misconfigured timezone: {tz}"))
            }
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            // A broken token is the operator's problem, not the client's;
            // never leak grant details
            UpstreamError::Auth { status, detail } => {
                tracing::error!("upstream auth failure ({status}): {detail}");
                ApiError::Internal("upstream authentication failure".into())
            }
            UpstreamError::NotFound { detail } => ApiError::NotFound(detail),
            UpstreamError::BadRequest { detail, .. } => ApiError::Unprocessable(detail),
            UpstreamError::Server { status, detail } => {
                ApiError::BadGateway(format!("upstream error {status}: {detail}"))
            }
            UpstreamError::Timeout => ApiError::GatewayTimeout,
            UpstreamError::Network(msg) => ApiError::BadGateway(msg),
            UpstreamError::Decode(msg) => {
                ApiError::BadGateway(format!("malformed upstream payload: {msg}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (
                ApiError::MethodNotAllowed("x".into()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (ApiError::PreconditionFailed, StatusCode::PRECONDITION_FAILED),
            (ApiError::Unprocessable("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ApiError::BadGateway("x".into()), StatusCode::BAD_GATEWAY),
            (ApiError::GatewayTimeout, StatusCode::GATEWAY_TIMEOUT),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_precondition_failed_has_no_body() {
        let response = ApiError::PreconditionFailed.into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_upstream_auth_is_masked() {
        let err = UpstreamError::Auth {
            status: 401,
            detail: "invalid client secret".into(),
        };
        match ApiError::from(err) {
            ApiError::Internal(msg) => assert!(!msg.contains("secret")),
            other => panic!("expected Internal, got {other:?}"),
        }
    }

    #[test]
    fn test_upstream_bad_request_relays_message() {
        let err = UpstreamError::BadRequest {
            status: 400,
            detail: "seriesStartDate is malformed".into(),
        };
        match ApiError::from(err) {
            ApiError::Unprocessable(msg) => assert!(msg.contains("seriesStartDate")),
            other => panic!("expected Unprocessable, got {other:?}"),
        }
    }

    #[test]
    fn test_upstream_timeout_maps_to_504() {
        assert_eq!(
            ApiError::from(UpstreamError::Timeout).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
