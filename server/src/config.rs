use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SERVING_URL: &str = "http://localhost:8000";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
const DEFAULT_MANAGEMENT_PATH: &str = "/api/mocks";
const DEFAULT_TENANT_COOKIE: &str = "user_id";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{key} must use http or https, got '{scheme}'")]
    UnsupportedScheme { key: &'static str, scheme: String },

    #[error("{key} has an invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Shape of log lines on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Process configuration, read once at start-up and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Mock-serving engine; tenants are addressed as subdomains of its host.
    pub serving_url: Url,
    /// Management engine, always addressed on its bare host.
    pub backend_url: Url,
    pub management_path: String,
    pub tenant_cookie: String,
    pub backend_timeout: Duration,
    pub max_body_bytes: usize,
    pub is_production: bool,
    /// `LOG_FORMAT` if set, otherwise JSON in production.
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let listen_addr = parse_value(
            "LISTEN_ADDR",
            get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        )?;
        let serving_url = parse_url(
            "SERVING_URL",
            &get("SERVING_URL").unwrap_or_else(|| DEFAULT_SERVING_URL.to_string()),
        )?;
        let backend_url = parse_url(
            "BACKEND_URL",
            &get("BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
        )?;

        let management_path =
            get("MANAGEMENT_PATH").unwrap_or_else(|| DEFAULT_MANAGEMENT_PATH.to_string());
        if !management_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "MANAGEMENT_PATH",
                value: management_path,
            });
        }

        let tenant_cookie =
            get("TENANT_COOKIE").unwrap_or_else(|| DEFAULT_TENANT_COOKIE.to_string());

        let backend_timeout = match get("BACKEND_TIMEOUT_SECS") {
            Some(raw) => parse_value::<u64>("BACKEND_TIMEOUT_SECS", raw)?,
            None => DEFAULT_BACKEND_TIMEOUT_SECS,
        };
        if backend_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BACKEND_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(raw) => parse_value("MAX_BODY_BYTES", raw)?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let is_production = get("APP_ENV").as_deref() == Some("production");
        let log_format = match get("LOG_FORMAT") {
            Some(raw) => parse_value("LOG_FORMAT", raw)?,
            None if is_production => LogFormat::Json,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            serving_url,
            backend_url,
            management_path: management_path.trim_end_matches('/').to_string(),
            tenant_cookie,
            backend_timeout: Duration::from_secs(backend_timeout),
            max_body_bytes,
            is_production,
            log_format,
        })
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { key, source })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::UnsupportedScheme {
            key,
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        });
    }
    Ok(url)
}

fn parse_value<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value: raw })
}
