/**
 * Local Proxy Front
 *
 * Serves the worker over HTTP so an ordinary browser can use it as its
 * origin. Every incoming request becomes a fetch event; requests the
 * worker passes through are forwarded to the real origin unchanged.
 *
 * Responses carry `x-shell-worker: network|cache|offline` (or
 * `passthrough`) so callers can tell where they came from.
 */

use crate::shared::WorkerError;
use crate::worker::cache::CachedResponse;
use crate::worker::interceptor::{Intercepted, InterceptedRequest, RequestMode};
use crate::worker::upstream::Upstream;
use crate::worker::WorkerHandle;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const SOURCE_HEADER: &str = "x-shell-worker";

/// Proxy state
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub worker: WorkerHandle,
    pub upstream: Upstream,
}

/// Router with the interceptor as fallback for every path
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .fallback(intercept)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkerError::Unavailable(_) | WorkerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            WorkerError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

fn request_mode(request: &Request) -> RequestMode {
    match request
        .headers()
        .get("sec-fetch-mode")
        .and_then(|value| value.to_str().ok())
    {
        Some("navigate") => RequestMode::Navigate,
        Some("same-origin") => RequestMode::SameOrigin,
        Some("cors") => RequestMode::Cors,
        _ => RequestMode::NoCors,
    }
}

async fn intercept(State(state): State<ProxyState>, request: Request) -> Response {
    match proxy_request(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Proxy request failed: {}", e);
            e.into_response()
        }
    }
}

async fn proxy_request(state: &ProxyState, request: Request) -> Result<Response, WorkerError> {
    let mode = request_mode(&request);
    let (parts, body) = request.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state
        .upstream
        .origin()
        .join(path)
        .map_err(|e| WorkerError::InvalidUrl(e.to_string()))?;

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| WorkerError::InvalidUrl(format!("unreadable body: {}", e)))?;

    let mut intercepted = InterceptedRequest::new(parts.method, url, mode);
    intercepted.headers = parts.headers;
    intercepted.body = body;

    match state.worker.fetch(intercepted).await? {
        Intercepted::Response(response, source) => Ok(to_response(response, source.as_str())),
        Intercepted::Passthrough(request) => {
            let response = state.upstream.forward(request).await?;
            Ok(to_response(response, "passthrough"))
        }
    }
}

fn to_response(cached: CachedResponse, source: &'static str) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);
    for (name, value) in &cached.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .header(SOURCE_HEADER, source)
        .body(Body::from(cached.body))
        .unwrap_or_else(|e| {
            tracing::warn!("Dropping malformed upstream response: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        })
}
