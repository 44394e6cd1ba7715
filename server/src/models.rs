use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque tenant identifier carried in the identity cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request as received on the catch-all mount, before it is rewritten for
/// the backend.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path relative to the catch-all mount, with a leading slash.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl InboundRequest {
    /// GET and HEAD never forward a body, whatever the caller sent.
    pub fn carries_body(method: &Method) -> bool {
        !matches!(*method, Method::GET | Method::HEAD)
    }

    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Body of a create or update call on the management engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MockDefinition {
    pub path: String,
    pub method: String,
    pub status: u16,
    /// JSON document served by the mock, encoded as a string.
    pub response_body: String,
}

/// One entry of the management listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MockApi {
    pub id: String,
    pub user_id: String,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curl_command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_get_and_head_drop_the_body() {
        assert!(!InboundRequest::carries_body(&Method::GET));
        assert!(!InboundRequest::carries_body(&Method::HEAD));
        for method in [
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ] {
            assert!(InboundRequest::carries_body(&method), "{}", method);
        }
    }

    #[test]
    fn path_and_query_keeps_the_query_verbatim() {
        let request = InboundRequest {
            method: Method::GET,
            path: "/users/1/".to_string(),
            query: Some("page=2&sort=desc".to_string()),
            headers: HeaderMap::new(),
            body: None,
        };
        assert_eq!(request.path_and_query(), "/users/1/?page=2&sort=desc");
    }

    #[test]
    fn listing_entry_parses_backend_payload() {
        let raw = r#"{
            "id": "m1",
            "user_id": "abc123",
            "path": "/users",
            "method": "GET",
            "status": 200,
            "response_body": "{\"ok\":true}",
            "created_at": "2026-10-17T10:00:00Z",
            "expires_at": "2026-10-17T11:00:00+00:00",
            "hit_count": 3
        }"#;
        let mock: MockApi = serde_json::from_str(raw).unwrap();
        assert_eq!(mock.user_id, "abc123");
        assert_eq!(mock.hit_count, 3);
        assert!(mock.expires_at > mock.created_at);
        assert!(mock.curl_command.is_none());
    }
}
