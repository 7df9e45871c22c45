//! Pass-through proxy adapter.
//!
//! Forwards every request to the configured model host verbatim: method,
//! path, query, and body are copied; hop-by-hop headers are stripped in
//! both directions; any forwarding failure yields a 502 carrying the
//! error text.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use tracing::{error, info, warn};

use crate::config::ProxySettings;
use crate::error::{Error, Result};

/// Headers that never cross the proxy.
const HOP_BY_HOP: &[&str] = &["host", "connection", "transfer-encoding"];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str())
}

struct ProxyState {
    http: reqwest::Client,
    target_base: String,
}

fn target_url(base: &str, path_and_query: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
}

async fn forward(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = target_url(&state.target_base, path_and_query);

    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return plain_response(StatusCode::BAD_GATEWAY, format!("bad request body: {e}"))
        }
    };

    let method = match reqwest::Method::from_bytes(parts.method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(e) => return plain_response(StatusCode::BAD_GATEWAY, format!("bad method: {e}")),
    };

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in parts.headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(n), Ok(v)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.insert(n, v);
        }
    }

    let upstream = match state
        .http
        .request(method, &url)
        .headers(headers)
        .body(body_bytes.to_vec())
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!(%url, error = %e, "proxy forwarding failed");
            return plain_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };

    let status = upstream.status().as_u16();
    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return plain_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    builder
        .body(Body::from(bytes))
        .unwrap_or_else(|e| plain_response(StatusCode::BAD_GATEWAY, e.to_string()))
}

fn plain_response(status: StatusCode, text: String) -> Response {
    Response::builder()
        .status(status)
        .body(Body::from(text))
        .expect("static response")
}

/// Build the proxy router for the given settings.
pub fn router(settings: &ProxySettings) -> Router {
    let state = Arc::new(ProxyState {
        http: reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new()),
        target_base: settings.target_base.clone(),
    });
    Router::new().fallback(forward).with_state(state)
}

/// Best-effort eviction of whatever currently holds the port.
fn release_port(port: u16) {
    #[cfg(unix)]
    {
        match std::process::Command::new("fuser")
            .arg("-k")
            .arg(format!("{port}/tcp"))
            .output()
        {
            Ok(output) if output.status.success() => {
                warn!(port, "killed existing holder of proxy port")
            }
            Ok(_) => {}
            Err(e) => warn!(port, error = %e, "could not evict port holder"),
        }
    }
    #[cfg(not(unix))]
    {
        warn!(port, "port already bound and eviction is unsupported here");
    }
}

/// Bind and serve the proxy until the task is cancelled.
///
/// If the listen port is held by another process it is terminated
/// best-effort before one bind retry; a final bind failure is returned so
/// the binary can exit non-zero.
pub async fn serve(settings: ProxySettings) -> Result<()> {
    let app = router(&settings);

    let listener = match tokio::net::TcpListener::bind(&settings.listen_addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            let port = settings
                .listen_addr
                .rsplit(':')
                .next()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            release_port(port);
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            tokio::net::TcpListener::bind(&settings.listen_addr)
                .await
                .map_err(|e| Error::Config(format!("proxy bind failed: {e}")))?
        }
        Err(e) => return Err(Error::Config(format!("proxy bind failed: {e}"))),
    };

    info!(
        listen = %settings.listen_addr,
        target = %settings.target_base,
        "proxy adapter running"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("proxy server error: {e}")))
}
