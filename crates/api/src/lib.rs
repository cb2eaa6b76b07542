//! # Open House API
//!
//! The web server for the open-house appointment service. It exposes the
//! slot calendar to the public registration form and the application
//! listing, editing and deletion endpoints used by the admin panel.
//!
//! ## Architecture
//!
//! - **Routes**: Define API endpoints and URL structure
//! - **Handlers**: Translate HTTP requests into allocator calls
//! - **Middleware**: Error-to-response mapping
//! - **Config**: Environment configuration, including the booking policy
//!
//! Booking rules live in `openhouse-core`; this crate only carries them over
//! HTTP. Admin access control is expected to sit in front of this service.

/// Configuration module for API settings
pub mod config;
/// Request handlers
pub mod handlers;
/// Middleware for error handling
pub mod middleware;
/// Route definitions and API endpoint structure
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use eyre::{Result, WrapErr};
use openhouse_core::allocator::SlotAllocator;
use openhouse_core::store::KvStore;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Shared application state that is accessible to all request handlers
pub struct ApiState {
    /// Slot allocator over the configured store
    pub allocator: SlotAllocator,
}

impl ApiState {
    pub fn new(store: Arc<dyn KvStore>, config: &config::ApiConfig) -> Self {
        let allocator =
            SlotAllocator::new(store, config.slot_policy.clone()).with_retry(config.retry);
        Self { allocator }
    }
}

/// Installs the global tracing subscriber at `level`.
pub fn init_tracing(level: Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Builds the router with every endpoint and request tracing attached.
pub fn app(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health check endpoints
        .merge(routes::health::routes())
        // Slot calendar endpoints
        .merge(routes::slots::routes())
        // Application management endpoints
        .merge(routes::applications::routes())
        .layer(TraceLayer::new_for_http())
        // Attach shared state to all routes
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .wrap_err_with(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_origin(origins)
        .allow_credentials(true))
}

/// Starts the API server
///
/// Tracing must already be initialised (see [`init_tracing`]) so start-up
/// work done by the caller is logged too.
///
/// # Arguments
///
/// * `config` - API configuration including host, port and booking policy
/// * `store` - Key-value store holding applications and slot claims
pub async fn start_server(config: config::ApiConfig, store: Arc<dyn KvStore>) -> Result<()> {
    let state = Arc::new(ApiState::new(store, &config));

    let report = state.allocator.rebuild_index().await?;
    if !report.duplicates.is_empty() {
        tracing::warn!(
            "{} stored applications share a slot with another application",
            report.duplicates.len()
        );
    }

    let app = app(state);

    // Apply CORS configuration if origins are specified
    let app = match &config.cors_origins {
        Some(origins) => app.layer(cors_layer(origins)?),
        None => app,
    };

    // Add request timeout middleware
    let app = app.layer(
        ServiceBuilder::new()
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout)))
            .into_inner(),
    );

    // Start the HTTP server
    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
