//! Davgate API server library
//!
//! Axum-based WebDAV/CalDAV/CardDAV surface for the upstream-backed
//! gateway: discovery, the single calendar, the read-only address books,
//! and the ICS subscription feed.

pub mod config;
pub mod dav;
pub mod error;
mod middleware;
pub mod routes;
pub mod store;
pub mod vcard;

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::any};
use davgate_upstream::UpstreamClient;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::store::{AddressStore, CalendarStore};

/// Synthetic principal resource
pub const PRINCIPAL_PATH: &str = "/principals/current/";
/// Calendar home set
pub const CALENDAR_HOME: &str = "/calendars/";
/// Name segment of the single calendar
pub const CALENDAR_NAME: &str = "default";
/// The single calendar collection
pub const CALENDAR_PATH: &str = "/calendars/default/";
/// Addressbook home set
pub const ADDRESSBOOK_HOME: &str = "/addressbooks/";

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<UpstreamClient>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(upstream: Arc<UpstreamClient>, config: ServerConfig) -> Self {
        AppState {
            upstream,
            config: Arc::new(config),
        }
    }

    pub fn calendar_store(&self) -> CalendarStore {
        CalendarStore::new(
            self.upstream.clone(),
            self.config.listing_mode,
            self.config.sync_weeks,
        )
    }

    pub fn address_store(&self) -> AddressStore {
        AddressStore::new(self.upstream.clone())
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route(
            "/.well-known/caldav",
            any(routes::wellknown::redirect_to_principal),
        )
        .route(
            "/.well-known/carddav",
            any(routes::wellknown::redirect_to_principal),
        )
        .route("/principals/current", any(routes::principal::handler))
        .route("/principals/current/", any(routes::principal::handler));

    if state.config.enable_caldav {
        router = router
            .merge(routes::caldav::routes())
            .route("/feed.ics", any(routes::feed::handler));
    }
    if state.config.enable_carddav {
        router = router.merge(routes::carddav::routes());
    }

    router
        // Everything else belongs to the (external) filesystem backend
        .fallback(routes::filesystem_fallback)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::dav_logging::dav_logger,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %response.status(),
                            "finished processing request"
                        );
                    },
                ),
        )
        .with_state(state)
}

/// Run the gateway server
///
/// Binds and blocks until the server exits.
pub async fn run(state: AppState) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);

    tracing::info!("gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
