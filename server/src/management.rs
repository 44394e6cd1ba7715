use crate::error::ProxyError;
use crate::identity::IdentityResolver;
use crate::models::TenantId;
use crate::AppState;
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use reqwest::Client;
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

const LOG_PREVIEW_CHARS: usize = 200;
const ERROR_PREVIEW_CHARS: usize = 500;

/// JSON answer of the management engine, tagged by outcome. The payload is
/// kept as raw JSON so it is relayed exactly as the backend wrote it.
#[derive(Debug)]
pub enum BackendJson {
    Success(StatusCode, Box<RawValue>),
    /// Non-2xx answer; the backend's error payload is authoritative.
    Failure(StatusCode, Box<RawValue>),
}

impl BackendJson {
    pub fn status(&self) -> StatusCode {
        match self {
            BackendJson::Success(status, _) | BackendJson::Failure(status, _) => *status,
        }
    }

    pub fn payload(&self) -> &RawValue {
        match self {
            BackendJson::Success(_, payload) | BackendJson::Failure(_, payload) => &**payload,
        }
    }
}

#[derive(Debug)]
pub struct ManagementReply {
    pub body: BackendJson,
    /// `Set-Cookie` values to hand to the caller. Only `create` fills this.
    pub session_cookies: Vec<HeaderValue>,
}

impl IntoResponse for ManagementReply {
    fn into_response(self) -> Response {
        let (status, payload) = match self.body {
            BackendJson::Success(status, payload) | BackendJson::Failure(status, payload) => {
                (status, payload)
            }
        };
        let payload: Box<str> = payload.into();

        let mut response = Response::new(Body::from(String::from(payload)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for cookie in self.session_cookies {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

/// Forwards CRUD calls on mock definitions to the management engine.
///
/// Unlike the catch-all path, the tenant travels as a cookie and the host is
/// never rewritten.
#[derive(Debug, Clone)]
pub struct ManagementForwarder {
    http_client: Client,
    collection_url: Url,
    identity: IdentityResolver,
}

impl ManagementForwarder {
    pub fn new(
        http_client: Client,
        backend_url: &Url,
        management_path: &str,
        identity: IdentityResolver,
    ) -> Self {
        let mut collection_url = backend_url.clone();
        let prefix = backend_url.path().trim_end_matches('/');
        collection_url.set_path(&format!("{}{}", prefix, management_path));
        collection_url.set_query(None);
        Self {
            http_client,
            collection_url,
            identity,
        }
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    fn item_url(&self, id: &str) -> Result<Url, ProxyError> {
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    pub async fn list(&self, tenant: Option<&TenantId>) -> Result<ManagementReply, ProxyError> {
        self.send(Method::GET, self.collection_url.clone(), tenant, None, false)
            .await
    }

    pub async fn create<D>(
        &self,
        tenant: Option<&TenantId>,
        definition: &D,
    ) -> Result<ManagementReply, ProxyError>
    where
        D: Serialize + ?Sized,
    {
        let body = encode(Method::POST, &self.collection_url, definition)?;
        self.send(Method::POST, self.collection_url.clone(), tenant, Some(body), true)
            .await
    }

    pub async fn update<D>(
        &self,
        tenant: Option<&TenantId>,
        id: &str,
        definition: &D,
    ) -> Result<ManagementReply, ProxyError>
    where
        D: Serialize + ?Sized,
    {
        let url = self.item_url(id)?;
        let body = encode(Method::PUT, &url, definition)?;
        self.send(Method::PUT, url, tenant, Some(body), false).await
    }

    pub async fn delete(
        &self,
        tenant: Option<&TenantId>,
        id: &str,
    ) -> Result<ManagementReply, ProxyError> {
        let url = self.item_url(id)?;
        self.send(Method::DELETE, url, tenant, None, false).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        tenant: Option<&TenantId>,
        body: Option<Vec<u8>>,
        keep_session_cookies: bool,
    ) -> Result<ManagementReply, ProxyError> {
        let has_body = body.is_some();
        info!(
            "Making request to backend: {} {} (has body: {})",
            method, url, has_body
        );

        let mut request_builder = self.http_client.request(method.clone(), url.clone());
        if let Some(tenant) = tenant {
            request_builder = request_builder.header(COOKIE, self.identity.cookie_for(tenant));
        }
        if let Some(body) = body {
            request_builder = request_builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    "Backend request {} {} failed (has body: {}): {:?}",
                    method, url, has_body, e
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let session_cookies = if keep_session_cookies {
            response.headers().get_all(SET_COOKIE).iter().cloned().collect()
        } else {
            Vec::new()
        };

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    "Failed to read backend response for {} {}: {:?}",
                    method, url, e
                );
                return Err(e.into());
            }
        };

        info!(
            "Backend response for {} {}: status {}, content type {}, length {}, preview: {}",
            method,
            url,
            status,
            content_type.as_deref().unwrap_or("unknown"),
            text.len(),
            preview(&text, LOG_PREVIEW_CHARS)
        );

        let body = interpret(status, content_type.as_deref(), &text).map_err(|e| {
            error!(
                "Backend {} {} violated the JSON contract: {} (status {}, preview: {})",
                method,
                url,
                e,
                status,
                preview(&text, ERROR_PREVIEW_CHARS)
            );
            e
        })?;

        Ok(ManagementReply {
            body,
            session_cookies,
        })
    }
}

fn encode<D>(method: Method, url: &Url, definition: &D) -> Result<Vec<u8>, ProxyError>
where
    D: Serialize + ?Sized,
{
    serde_json::to_vec(definition).map_err(|e| {
        error!("Failed to encode body for {} {}: {}", method, url, e);
        ProxyError::Encode(e)
    })
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// Checks the content type before parsing, then tags the payload by status.
fn interpret(
    status: StatusCode,
    content_type: Option<&str>,
    text: &str,
) -> Result<BackendJson, ProxyError> {
    if !is_json(content_type) {
        return Err(ProxyError::UnexpectedContentType {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            content_type: content_type.unwrap_or("unknown").to_string(),
        });
    }

    let payload: Box<RawValue> =
        serde_json::from_str(text).map_err(|_| ProxyError::InvalidJson)?;

    if status.is_success() {
        Ok(BackendJson::Success(status, payload))
    } else {
        Ok(BackendJson::Failure(status, payload))
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The definition is only checked for being JSON; its shape is the backend's
/// concern.
fn parse_definition(body: &Bytes) -> Result<Box<RawValue>, ProxyError> {
    serde_json::from_slice(body).map_err(|_| ProxyError::InvalidRequestJson)
}

pub async fn list_mocks(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<ManagementReply, ProxyError> {
    let tenant = app_state.identity.resolve(&jar);
    app_state.management.list(tenant.as_ref()).await
}

pub async fn create_mock(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Result<Bytes, BytesRejection>,
) -> Result<ManagementReply, ProxyError> {
    let tenant = app_state.identity.resolve(&jar);
    let definition = parse_definition(&body?)?;
    app_state
        .management
        .create(tenant.as_ref(), &*definition)
        .await
}

pub async fn update_mock(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    jar: CookieJar,
    body: Result<Bytes, BytesRejection>,
) -> Result<ManagementReply, ProxyError> {
    let tenant = app_state.identity.resolve(&jar);
    let definition = parse_definition(&body?)?;
    app_state
        .management
        .update(tenant.as_ref(), &id, &*definition)
        .await
}

pub async fn delete_mock(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<ManagementReply, ProxyError> {
    let tenant = app_state.identity.resolve(&jar);
    app_state.management.delete(tenant.as_ref(), &id).await
}
