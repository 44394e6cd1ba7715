pub mod config;
pub mod error;
pub mod forwarding;
pub mod identity;
pub mod logging;
pub mod management;
pub mod models;

use crate::config::Config;
use crate::forwarding::CatchAllForwarder;
use crate::identity::IdentityResolver;
use crate::management::ManagementForwarder;
use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Json},
    routing::{any, get, put},
    Router,
};
use reqwest::{redirect, Client, ClientBuilder};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared, read-only state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    pub identity: IdentityResolver,
    pub catch_all: CatchAllForwarder,
    pub management: ManagementForwarder,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http_client = http_client_builder(config).build()?;
        Ok(Self::with_client(config, http_client))
    }

    pub fn with_client(config: &Config, http_client: Client) -> Self {
        let identity = IdentityResolver::new(config.tenant_cookie.clone());
        Self {
            catch_all: CatchAllForwarder::new(http_client.clone(), config.serving_url.clone()),
            management: ManagementForwarder::new(
                http_client,
                &config.backend_url,
                &config.management_path,
                identity.clone(),
            ),
            identity,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Outbound client settings: every backend call is bounded by the configured
/// timeout, and redirects are relayed to the caller instead of followed.
pub fn http_client_builder(config: &Config) -> ClientBuilder {
    Client::builder()
        .timeout(config.backend_timeout)
        .redirect(redirect::Policy::none())
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.max_body_bytes;

    Router::new()
        .route("/healthz", get(health_check_handler))
        .route(
            "/api/mocks",
            get(management::list_mocks).post(management::create_mock),
        )
        .route(
            "/api/mocks/:id",
            put(management::update_mock).delete(management::delete_mock),
        )
        .route("/api/*mock_path", any(forwarding::forward_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
