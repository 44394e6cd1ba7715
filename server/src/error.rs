use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("backend request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("backend request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("failed to read request body: {0}")]
    RequestBody(#[from] BytesRejection),

    #[error("failed to build backend URL: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("failed to encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid JSON in request body")]
    InvalidRequestJson,

    #[error("Backend returned {status}: {status_text}. Expected JSON but got {content_type}")]
    UnexpectedContentType {
        status: u16,
        status_text: String,
        content_type: String,
    },

    #[error("Backend returned invalid JSON")]
    InvalidJson,
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout(e)
        } else {
            ProxyError::Transport(e)
        }
    }
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UnexpectedContentType { .. } | ProxyError::InvalidJson => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::InvalidRequestJson => StatusCode::BAD_REQUEST,
            // 413 when the body exceeds the limit, 400 for a broken body.
            ProxyError::RequestBody(rejection) => rejection.status(),
            ProxyError::Transport(_)
            | ProxyError::InvalidTarget(_)
            | ProxyError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal causes stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ProxyError::Timeout(_) => "Gateway Timeout".to_string(),
            ProxyError::InvalidRequestJson => "Invalid JSON body".to_string(),
            ProxyError::RequestBody(_) => self
                .status()
                .canonical_reason()
                .unwrap_or("Bad Request")
                .to_string(),
            ProxyError::UnexpectedContentType { .. } | ProxyError::InvalidJson => self.to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}
