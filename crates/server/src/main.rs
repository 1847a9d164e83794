//! Davgate server
//!
//! Protocol-translating calendar and contact gateway: speaks CalDAV/CardDAV
//! to clients and fronts the proprietary upstream REST API. Stateless; all
//! durability lives upstream.

use std::sync::Arc;

use anyhow::Result;
use api::config::ServerConfig;
use api::AppState;
use davgate_core::UpstreamConfig;
use davgate_upstream::UpstreamClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting davgate gateway");

    let upstream_config = UpstreamConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    tracing::info!(
        "serving owner {} against {} ({}:{})",
        upstream_config.owner_key,
        upstream_config.base_url,
        server_config.host,
        server_config.port
    );

    let upstream = Arc::new(UpstreamClient::new(upstream_config)?);
    let state = AppState::new(upstream, server_config);

    api::run(state).await?;

    Ok(())
}
