#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use ephemock_server::config::Config;
use ephemock_server::{build_router, http_client_builder, AppState};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

/// Host name the serving engine is reached under in tests; tenant subdomains
/// of it are pinned to the loopback backend.
pub const SERVING_HOST: &str = "serving.test";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct CannedReply {
    status: StatusCode,
    headers: Vec<(&'static str, &'static str)>,
    body: Bytes,
    delay: Option<Duration>,
}

impl CannedReply {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            body: body.into(),
            delay: None,
        }
    }

    pub fn json(status: u16, body: &'static str) -> Self {
        Self::new(status, body).header("content-type", "application/json")
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

struct BackendState {
    reply: CannedReply,
    recorded: Mutex<Vec<Recorded>>,
}

/// In-process HTTP backend that records every request and answers with a
/// canned reply.
pub struct Backend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl Backend {
    pub async fn start(reply: CannedReply) -> Self {
        let state = Arc::new(BackendState {
            reply,
            recorded: Mutex::new(Vec::new()),
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(canned_reply).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.recorded.lock().unwrap().clone()
    }

    pub fn only_request(&self) -> Recorded {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one backend request");
        requests.into_iter().next().unwrap()
    }
}

async fn canned_reply(State(state): State<Arc<BackendState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    state.recorded.lock().unwrap().push(Recorded {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    });

    if let Some(delay) = state.reply.delay {
        tokio::time::sleep(delay).await;
    }

    let mut response = Response::new(Body::from(state.reply.body.clone()));
    *response.status_mut() = state.reply.status;
    for (name, value) in &state.reply.headers {
        response
            .headers_mut()
            .append(*name, HeaderValue::from_static(value));
    }
    response
}

/// Raw TCP backend that announces `content-length: 10`, sends three bytes of
/// the body and then goes quiet.
pub async fn stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut chunk = [0u8; 1024];
                while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received.extend_from_slice(&chunk[..n]),
                    }
                }
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 10\r\n\r\nabc";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

/// Address nothing listens on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub struct ProxyBuilder {
    serving: SocketAddr,
    management: SocketAddr,
    tenants: Vec<String>,
    timeout: Option<Duration>,
    max_body_bytes: Option<usize>,
}

impl ProxyBuilder {
    pub fn new(serving: SocketAddr, management: SocketAddr) -> Self {
        Self {
            serving,
            management,
            tenants: Vec::new(),
            timeout: None,
            max_body_bytes: None,
        }
    }

    pub fn tenant(mut self, tenant: &str) -> Self {
        self.tenants.push(tenant.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    pub fn build(self) -> Router {
        build_router(Arc::new(self.state()))
    }

    pub fn state(self) -> AppState {
        let serving_url = format!("http://{}:{}", SERVING_HOST, self.serving.port());
        let backend_url = format!("http://{}", self.management);
        let max_body_bytes = self.max_body_bytes.map(|limit| limit.to_string());
        let config = Config::from_lookup(|key| match key {
            "SERVING_URL" => Some(serving_url.clone()),
            "BACKEND_URL" => Some(backend_url.clone()),
            "MAX_BODY_BYTES" => max_body_bytes.clone(),
            _ => None,
        })
        .unwrap();

        let mut builder = http_client_builder(&config)
            .no_proxy()
            .resolve(SERVING_HOST, self.serving);
        for tenant in &self.tenants {
            builder = builder.resolve(&format!("{}.{}", tenant, SERVING_HOST), self.serving);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        AppState::with_client(&config, builder.build().unwrap())
    }
}

pub async fn send(app: &Router, request: axum::http::Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
