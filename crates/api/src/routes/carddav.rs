//! CardDAV resource handlers
//!
//! The address books are read-only projections of the upstream's address
//! records, one book per address type. Write methods are refused with 403.

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use chrono::Utc;

use super::{
    dav_options_response, method_not_allowed, multistatus_response, object_props,
    read_body_string, select_props,
};
use crate::dav::multistatus::{MultistatusWriter, Prop, PropValue, ResourceKind};
use crate::dav::propfind::{PropFindRequest, PropName, parse_propfind, parse_proppatch};
use crate::dav::report::{ReportProps, ReportRequest, parse_report};
use crate::dav::{Depth, quote_etag};
use crate::error::ApiError;
use crate::store::AddressObject;
use crate::store::address::{ADDRESS_BOOKS, book_info};
use crate::{ADDRESSBOOK_HOME, AppState, PRINCIPAL_PATH};

const CONTENT_TYPE_VCF: &str = "text/vcard; charset=utf-8";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/addressbooks", any(home_handler))
        .route("/addressbooks/", any(home_handler))
        .route("/addressbooks/{book}", any(book_handler))
        .route("/addressbooks/{book}/", any(book_handler))
        .route("/addressbooks/{book}/{object}", any(object_handler))
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
        "PROPPATCH" => forbidden_proppatch(ADDRESSBOOK_HOME.to_string(), body).await,
        "MKCOL" | "PUT" | "DELETE" | "COPY" | "MOVE" => Err(read_only()),
        _ => Err(method_not_allowed(&method, "the addressbook home")),
    }
}

fn read_only() -> ApiError {
    ApiError::Forbidden("the address books are read-only".into())
}

async fn home_propfind(headers: &HeaderMap, body: Body) -> Result<Response, ApiError> {
    let depth = Depth::from_headers(headers, Depth::Zero)?;
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let mut writer = MultistatusWriter::new()?;
    let (found, not_found) = select_props(&request, home_props());
    writer.write_response(ADDRESSBOOK_HOME, &found, &not_found)?;

    if depth != Depth::Zero {
        for (segment, name, description) in ADDRESS_BOOKS {
            let (found, not_found) = select_props(&request, book_props(name, description));
            writer.write_response(&format!("{ADDRESSBOOK_HOME}{segment}/"), &found, &not_found)?;
        }
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
            PropValue::Text("Address Books".to_string()),
        ),
        (
            PropName::dav("current-user-principal"),
            PropValue::Href(PRINCIPAL_PATH.to_string()),
        ),
        (
            PropName::carddav("addressbook-home-set"),
            PropValue::Href(ADDRESSBOOK_HOME.to_string()),
        ),
    ]
}

fn book_props(name: &str, description: &str) -> Vec<Prop> {
    vec![
        (
            PropName::dav("resourcetype"),
            PropValue::ResourceType(vec![ResourceKind::Collection, ResourceKind::AddressBook]),
        ),
        (
            PropName::dav("displayname"),
            PropValue::Text(name.to_string()),
        ),
        (
            PropName::carddav("addressbook-description"),
            PropValue::Text(description.to_string()),
        ),
        (
            PropName::dav("current-user-principal"),
            PropValue::Href(PRINCIPAL_PATH.to_string()),
        ),
        (
            PropName::carddav("addressbook-home-set"),
            PropValue::Href(ADDRESSBOOK_HOME.to_string()),
        ),
        (
            PropName::dav("supported-report-set"),
            PropValue::SupportedReports(vec![
                "card:addressbook-query".to_string(),
                "card:addressbook-multiget".to_string(),
            ]),
        ),
    ]
}

// --- individual address books ---

async fn book_handler(
    State(state): State<AppState>,
    Path(book): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let Some((name, description)) = book_info(&book) else {
        return Err(ApiError::NotFound(format!("no address book named {book}")));
    };

    match method.as_str() {
        "OPTIONS" => Ok(dav_options_response()),
        "PROPFIND" => book_propfind(&state, &book, name, description, &headers, body).await,
        "REPORT" => book_report(&state, &book, body).await,
        "PROPPATCH" => {
            forbidden_proppatch(format!("{ADDRESSBOOK_HOME}{book}/"), body).await
        }
        "MKCOL" | "PUT" | "DELETE" | "COPY" | "MOVE" => Err(read_only()),
        _ => Err(method_not_allowed(&method, "an address book")),
    }
}

async fn book_propfind(
    state: &AppState,
    book: &str,
    name: &str,
    description: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let depth = Depth::from_headers(headers, Depth::Zero)?;
    let body = read_body_string(body).await?;
    let request = parse_propfind(&body)?;

    let mut writer = MultistatusWriter::new()?;
    let (found, not_found) = select_props(&request, book_props(name, description));
    writer.write_response(&format!("{ADDRESSBOOK_HOME}{book}/"), &found, &not_found)?;

    if depth != Depth::Zero {
        let now = Utc::now();
        let objects = state.address_store().list_objects(book).await?;
        for object in &objects {
            let available = object_props(
                &object.etag,
                CONTENT_TYPE_VCF,
                object.content_length(),
                now,
            );
            let (found, not_found) = select_props(&request, available);
            writer.write_response(&object.path, &found, &not_found)?;
        }
    }

    Ok(multistatus_response(writer.finish()?))
}

async fn book_report(state: &AppState, book: &str, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let store = state.address_store();
    let now = Utc::now();

    match parse_report(&body)? {
        // Property/text filters degrade to return-all
        ReportRequest::AddressbookQuery { props } => {
            let objects = store.list_objects(book).await?;
            let mut writer = MultistatusWriter::new()?;
            for object in &objects {
                write_object_report_response(&mut writer, &props, object, now)?;
            }
            Ok(multistatus_response(writer.finish()?))
        }
        ReportRequest::AddressbookMultiget { hrefs, props } => {
            let mut writer = MultistatusWriter::new()?;
            for href in &hrefs {
                let decoded = urlencoding::decode(href)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| href.clone());
                let Some((book_segment, key)) = parse_object_href(&decoded) else {
                    continue;
                };
                match store.get_object(&book_segment, &key).await {
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
        ReportRequest::CalendarQuery { .. } | ReportRequest::CalendarMultiget { .. } => {
            Err(ApiError::BadRequest(
                "calendar reports are not valid on an address book".into(),
            ))
        }
    }
}

/// Split an addressbook object href into (book, key)
fn parse_object_href(href: &str) -> Option<(String, String)> {
    let mut segments = href.trim_end_matches('/').rsplit('/');
    let object = segments.next()?;
    let book = segments.next()?;
    let key = object.strip_suffix(".vcf").unwrap_or(object);
    if key.is_empty() || book.is_empty() {
        return None;
    }
    Some((book.to_string(), key.to_string()))
}

fn write_object_report_response(
    writer: &mut MultistatusWriter,
    props: &ReportProps,
    object: &AddressObject,
    now: chrono::DateTime<Utc>,
) -> Result<(), ApiError> {
    let mut available = object_props(&object.etag, CONTENT_TYPE_VCF, object.content_length(), now);
    if props.include_data {
        available.push((
            PropName::carddav("address-data"),
            PropValue::AddressData(object.data.clone()),
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

// --- address objects ---

async fn object_handler(
    State(state): State<AppState>,
    Path((book, object)): Path<(String, String)>,
    method: Method,
    _headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    if book_info(&book).is_none() {
        return Err(ApiError::NotFound(format!("no address book named {book}")));
    }
    let key = object.strip_suffix(".vcf").unwrap_or(&object).to_string();
    if key.is_empty() {
        return Err(ApiError::NotFound(format!("invalid object path: {object}")));
    }

    match method.as_str() {
        "OPTIONS" => Ok(dav_options_response()),
        "GET" | "HEAD" => {
            let found = state.address_store().get_object(&book, &key).await?;
            let body_out = if method == Method::HEAD {
                String::new()
            } else {
                found.data.clone()
            };
            let mut response = (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, CONTENT_TYPE_VCF.to_string()),
                    (header::ETAG, quote_etag(&found.etag)),
                ],
                body_out,
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
        "PROPFIND" => {
            let body = read_body_string(body).await?;
            let request = parse_propfind(&body)?;
            let found = state.address_store().get_object(&book, &key).await?;
            let available = object_props(
                &found.etag,
                CONTENT_TYPE_VCF,
                found.content_length(),
                Utc::now(),
            );
            let (props, not_found) = select_props(&request, available);

            let mut writer = MultistatusWriter::new()?;
            writer.write_response(&found.path, &props, &not_found)?;
            Ok(multistatus_response(writer.finish()?))
        }
        "PROPPATCH" => {
            forbidden_proppatch(format!("{ADDRESSBOOK_HOME}{book}/{key}.vcf"), body).await
        }
        "PUT" | "DELETE" | "MKCOL" | "COPY" | "MOVE" => Err(read_only()),
        _ => Err(method_not_allowed(&method, "an address object")),
    }
}

async fn forbidden_proppatch(href: String, body: Body) -> Result<Response, ApiError> {
    let body = read_body_string(body).await?;
    let names = parse_proppatch(&body)?;

    let mut writer = MultistatusWriter::new()?;
    writer.write_forbidden_response(&href, &names)?;
    Ok(multistatus_response(writer.finish()?))
}
