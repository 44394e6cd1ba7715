use crate::error::ProxyError;
use crate::models::{InboundRequest, TenantId};
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request, State};
use axum::http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

/// Public prefix of the catch-all mount. Everything after it is forwarded.
pub const CATCH_ALL_MOUNT: &str = "/api";

/// Sub-path owned by the management routes; never forwarded by the catch-all.
pub const RESERVED_PATH: &str = "/mocks";

#[derive(Debug)]
pub enum Forwarded {
    Relayed(Response),
    /// The path belongs to the management routes.
    Declined,
}

/// Forwards arbitrary requests to the tenant's namespace on the mock-serving
/// engine and relays the answer untouched.
#[derive(Debug, Clone)]
pub struct CatchAllForwarder {
    http_client: Client,
    serving_url: Url,
}

impl CatchAllForwarder {
    pub fn new(http_client: Client, serving_url: Url) -> Self {
        Self {
            http_client,
            serving_url,
        }
    }

    /// `{scheme}://{tenant}.{host}:{port}{path_and_query}`, or the bare host
    /// when no tenant is known. The path is appended as received.
    pub fn target_url(
        &self,
        tenant: Option<&TenantId>,
        path_and_query: &str,
    ) -> Result<String, ProxyError> {
        let mut target = self.serving_url.clone();
        if let Some(tenant) = tenant {
            let host = self
                .serving_url
                .host_str()
                .ok_or(url::ParseError::EmptyHost)?;
            target.set_host(Some(&format!("{}.{}", tenant, host)))?;
        }
        Ok(format!(
            "{}{}",
            target.origin().ascii_serialization(),
            path_and_query
        ))
    }

    pub async fn forward(&self, inbound: InboundRequest, tenant: Option<&TenantId>) -> Forwarded {
        if inbound.path == RESERVED_PATH {
            return Forwarded::Declined;
        }

        let request_id = Uuid::new_v4();
        match self.relay(request_id, inbound, tenant).await {
            Ok(response) => Forwarded::Relayed(response),
            Err(e) => {
                error!("Error serving mock (ID {}): {}", request_id, e);
                Forwarded::Relayed(e.into_response())
            }
        }
    }

    async fn relay(
        &self,
        request_id: Uuid,
        inbound: InboundRequest,
        tenant: Option<&TenantId>,
    ) -> Result<Response, ProxyError> {
        let target = self.target_url(tenant, &inbound.path_and_query())?;
        match tenant {
            Some(tenant) => info!(
                "Forwarding request (ID: {}) for tenant {}: {} {}",
                request_id, tenant, inbound.method, target
            ),
            None => {
                info!(
                    "Forwarding request (ID: {}): {} {}",
                    request_id, inbound.method, target
                );
                debug!(
                    "No tenant cookie on request {}, using the unscoped serving host",
                    request_id
                );
            }
        }

        let headers = forwardable_headers(&inbound.headers, inbound.body.is_some());
        let mut request_builder = self
            .http_client
            .request(inbound.method, &target)
            .headers(headers);
        if let Some(body) = inbound.body {
            request_builder = request_builder.body(body);
        }

        let upstream = request_builder.send().await?;
        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await?;
        info!(
            "Received response from serving engine for ID {}. Status: {}, length {}",
            request_id,
            status,
            body.len()
        );

        Ok(relay_response(status, headers, body))
    }
}

/// Inbound headers minus the ones the transport owns: `Host` comes from the
/// target URL, and framing headers must match the body actually sent.
pub fn forwardable_headers(inbound: &HeaderMap, has_body: bool) -> HeaderMap {
    inbound
        .iter()
        .filter(|(name, _)| **name != HOST && **name != TRANSFER_ENCODING)
        .filter(|(name, _)| has_body || **name != CONTENT_LENGTH)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Builds the caller's response from a fully received backend answer.
/// Status and headers are copied as-is, except `Transfer-Encoding`: the body
/// is complete, so its length is known.
fn relay_response(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Response {
    headers.remove(TRANSFER_ENCODING);

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Splits the catch-all request. The body goes through the `Bytes`
/// extractor so the router's `DefaultBodyLimit` applies.
async fn read_inbound(request: Request) -> Result<InboundRequest, ProxyError> {
    let method = request.method().clone();
    let path = request
        .uri()
        .path()
        .strip_prefix(CATCH_ALL_MOUNT)
        .unwrap_or_else(|| request.uri().path())
        .to_string();
    let query = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();

    let body = if InboundRequest::carries_body(&method) {
        Some(Bytes::from_request(request, &()).await?)
    } else {
        None
    };

    Ok(InboundRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

pub async fn forward_handler(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
) -> Response {
    let tenant = app_state.identity.resolve(&jar);

    let inbound = match read_inbound(request).await {
        Ok(inbound) => inbound,
        Err(e) => {
            error!("Failed to read inbound request: {}", e);
            return e.into_response();
        }
    };

    match app_state.catch_all.forward(inbound, tenant.as_ref()).await {
        Forwarded::Relayed(response) => response,
        Forwarded::Declined => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
