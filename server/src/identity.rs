use crate::models::TenantId;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};

/// Reads the tenant identity from the request cookies.
///
/// There is no validation beyond presence: whatever value the cookie holds
/// is the tenant.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    cookie_name: String,
}

impl IdentityResolver {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn resolve(&self, jar: &CookieJar) -> Option<TenantId> {
        jar.get(&self.cookie_name)
            .map(|cookie| cookie.value())
            .filter(|value| !value.is_empty())
            .map(TenantId::new)
    }

    pub fn resolve_headers(&self, headers: &HeaderMap) -> Option<TenantId> {
        self.resolve(&CookieJar::from_headers(headers))
    }

    /// `Cookie` header value that carries `tenant` to the management engine.
    pub fn cookie_for(&self, tenant: &TenantId) -> String {
        Cookie::new(self.cookie_name.clone(), tenant.as_str().to_string()).to_string()
    }
}
