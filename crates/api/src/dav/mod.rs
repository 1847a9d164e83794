//! WebDAV request machinery shared by the CalDAV and CardDAV surfaces
//!
//! Header normalization (Depth, conditional headers), PROPFIND/REPORT body
//! parsing, and 207 multistatus construction.

pub mod multistatus;
pub mod propfind;
pub mod report;

use axum::http::{HeaderMap, header};

use crate::error::ApiError;

/// DAV XML namespaces
pub const NS_DAV: &str = "DAV:";
pub const NS_CALDAV: &str = "urn:ietf:params:xml:ns:caldav";
pub const NS_CARDDAV: &str = "urn:ietf:params:xml:ns:carddav";

/// Normalized Depth header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// Parse the Depth header; `default` applies when it is absent
    pub fn from_headers(headers: &HeaderMap, default: Depth) -> Result<Depth, ApiError> {
        let Some(value) = headers.get("depth") else {
            return Ok(default);
        };
        let value = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("unreadable Depth header".into()))?;
        match value.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            v if v.eq_ignore_ascii_case("infinity") => Ok(Depth::Infinity),
            other => Err(ApiError::BadRequest(format!("invalid Depth: {other}"))),
        }
    }
}

/// A conditional header value: `*` or a quoted entity tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EtagMatch {
    Any,
    Tag(String),
}

impl EtagMatch {
    fn parse(value: &str) -> EtagMatch {
        let value = value.trim();
        if value == "*" {
            EtagMatch::Any
        } else {
            // strong comparison, byte-exact after quote stripping
            EtagMatch::Tag(value.trim_matches('"').to_string())
        }
    }
}

/// Parsed If-Match / If-None-Match headers
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub if_match: Option<EtagMatch>,
    pub if_none_match: Option<EtagMatch>,
}

impl Preconditions {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let read = |name: header::HeaderName| -> Result<Option<EtagMatch>, ApiError> {
            match headers.get(&name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(|v| Some(EtagMatch::parse(v)))
                    .map_err(|_| ApiError::BadRequest(format!("unreadable {name} header"))),
            }
        };
        Ok(Preconditions {
            if_match: read(header::IF_MATCH)?,
            if_none_match: read(header::IF_NONE_MATCH)?,
        })
    }

    /// Evaluate against the current state of the target resource
    ///
    /// `current_etag` is None when the resource does not exist. Errors with
    /// 412 exactly per RFC 9110: If-None-Match fails on a match (or `*` on
    /// any existing resource); If-Match fails on a missing resource or a
    /// differing tag.
    pub fn evaluate(&self, current_etag: Option<&str>) -> Result<(), ApiError> {
        match (&self.if_none_match, current_etag) {
            (Some(EtagMatch::Any), Some(_)) => return Err(ApiError::PreconditionFailed),
            (Some(EtagMatch::Tag(tag)), Some(current)) if tag == current => {
                return Err(ApiError::PreconditionFailed);
            }
            _ => {}
        }
        match (&self.if_match, current_etag) {
            (Some(_), None) => return Err(ApiError::PreconditionFailed),
            (Some(EtagMatch::Tag(tag)), Some(current)) if tag != current => {
                return Err(ApiError::PreconditionFailed);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Quote an ETag for the wire
pub fn quote_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}
