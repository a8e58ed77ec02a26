//! HTTP surface for the director: content routes, admin routes, liveness.
//!
//! This layer stays thin: it extracts client identity and the referrer,
//! asks the director for a decision and maps that decision onto HTTP
//! responses. Admin endpoints are gated by the `X-Admin-Key` header.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use hyper::Request;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::{
    core::{
        DirectorService,
        director::{ContentKind, RouteDecision},
    },
    metrics,
    ports::http_client::HttpClient,
};

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub director: Arc<DirectorService>,
    pub http_client: Arc<dyn HttpClient>,
    pub admin_key: Arc<str>,
}

/// Build the director's router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/dl/{hash}", get(download_root))
        .route("/dl/{hash}/{*path}", get(download))
        .route("/watch/{hash}", get(watch_root))
        .route("/watch/{hash}/{*path}", get(watch))
        .route("/add_cdn", post(add_cdn))
        .route("/add_special", post(add_special))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn download_root(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_content(state, ContentKind::Download, hash, String::new(), addr, headers).await
}

async fn download(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((hash, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    serve_content(state, ContentKind::Download, hash, path, addr, headers).await
}

async fn watch_root(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> Response {
    serve_content(state, ContentKind::Watch, hash, String::new(), addr, headers).await
}

async fn watch(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((hash, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    serve_content(state, ContentKind::Watch, hash, path, addr, headers).await
}

async fn serve_content(
    state: AppState,
    kind: ContentKind,
    hash: String,
    path: String,
    addr: SocketAddr,
    headers: HeaderMap,
) -> Response {
    let client_ip = client_ip(&headers, addr);
    let referrer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());

    let decision = match state
        .director
        .route(kind, &hash, &path, &client_ip, referrer)
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!("Routing failed for {} {}: {}", kind.segment(), hash, e);
            metrics::increment_request_total(kind.segment(), "store_error");
            return no_backend_response();
        }
    };

    match decision {
        RouteDecision::Override { location } => {
            metrics::increment_request_total(kind.segment(), "override");
            redirect_response(&location, StatusCode::FOUND)
        }
        RouteDecision::RateLimited {
            allowed,
            observed,
            window_seconds,
        } => {
            metrics::increment_rate_limited();
            metrics::increment_request_total(kind.segment(), "rate_limited");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "IP limit exceeded",
                    "allowed": allowed,
                    "your_requests": observed,
                    "window_seconds": window_seconds,
                    "hash": hash,
                    "ip": client_ip,
                })),
            )
                .into_response()
        }
        RouteDecision::Unavailable => {
            metrics::increment_request_total(kind.segment(), "unavailable");
            no_backend_response()
        }
        RouteDecision::Redirect { location, status } => {
            metrics::increment_request_total(kind.segment(), "redirect");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
            redirect_response(&location, status)
        }
        RouteDecision::Proxy { target } => {
            metrics::increment_request_total(kind.segment(), "proxy");
            proxy_to(&state, &target, &headers).await
        }
    }
}

/// Stream the backend's response through this process.
async fn proxy_to(state: &AppState, target: &str, headers: &HeaderMap) -> Response {
    let mut req = match Request::builder()
        .method(Method::GET)
        .uri(target)
        .body(AxumBody::empty())
    {
        Ok(req) => req,
        Err(e) => {
            tracing::error!("Failed to build proxy request to {}: {}", target, e);
            return no_backend_response();
        }
    };

    // Forward the client's headers; Host is rewritten by the client adapter.
    let mut forwarded = headers.clone();
    forwarded.remove(header::HOST);
    forwarded.remove(header::CONTENT_LENGTH);
    *req.headers_mut() = forwarded;

    match state.http_client.send_request(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Proxy request to {} failed: {}", target, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "Backend request failed"})),
            )
                .into_response()
        }
    }
}

async fn add_cdn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    // Envelope shape is validated as a whole; individual URLs are then
    // applied independently.
    let Value::Object(map) = &body else {
        return envelope_error("Request body must be a JSON object");
    };

    let mut raw_urls: Vec<String> = Vec::new();
    let mut malformed_items = 0usize;
    let mut saw_field = false;

    if let Some(single) = map.get("url") {
        saw_field = true;
        match single {
            Value::String(s) => raw_urls.push(s.clone()),
            _ => malformed_items += 1,
        }
    }

    if let Some(batch) = map.get("urls") {
        saw_field = true;
        let Value::Array(items) = batch else {
            return envelope_error("'urls' must be an array");
        };
        for item in items {
            match item {
                Value::String(s) => raw_urls.push(s.clone()),
                _ => malformed_items += 1,
            }
        }
    }

    if !saw_field {
        return envelope_error("Expected a 'urls' array or a 'url' string");
    }

    match state.director.register_backends(&raw_urls).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "added": report.added,
                "skipped": report.skipped.len() + malformed_items,
                "total_instances": report.total,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Backend registration failed: {}", e);
            store_unavailable_response()
        }
    }
}

async fn add_special(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    let Value::Object(map) = &body else {
        return envelope_error("Request body must be a JSON object");
    };
    let Some(Value::Array(items)) = map.get("hashes") else {
        return envelope_error("Expected a 'hashes' array");
    };

    let hashes: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();

    match state.director.special().add(&hashes).await {
        Ok(total) => (
            StatusCode::OK,
            Json(json!({
                "added": hashes.len(),
                "total_special": total,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Special-hash registration failed: {}", e);
            store_unavailable_response()
        }
    }
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_admin(&state, &headers) {
        return denied;
    }

    match state.director.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            tracing::error!("Stats collection failed: {}", e);
            store_unavailable_response()
        }
    }
}

/// Liveness: answers 200 whenever the process is serving.
async fn health(State(state): State<AppState>) -> Response {
    let backends = match state.director.registry().list().await {
        Ok(snapshot) => {
            let healthy = snapshot.iter().filter(|(_, e)| e.healthy).count();
            json!({"healthy": healthy, "total": snapshot.len()})
        }
        Err(_) => Value::Null,
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "backends": backends,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // An unset key never authorizes; admin routes stay closed until one is
    // configured.
    if !state.admin_key.is_empty() && provided == state.admin_key.as_ref() {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Unauthorized"})),
        )
            .into_response())
    }
}

/// First X-Forwarded-For element when present, else the peer address.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded_for.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    addr.ip().to_string()
}

fn redirect_response(location: &str, status: StatusCode) -> Response {
    match Response::builder()
        .status(status)
        .header(header::LOCATION, location)
        .body(AxumBody::empty())
    {
        Ok(response) => response,
        // Location headers come from validated URLs; a build failure here
        // means the override destination is unusable.
        Err(e) => {
            tracing::error!("Failed to build redirect to {}: {}", location, e);
            no_backend_response()
        }
    }
}

fn no_backend_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "No CDN instance online"})),
    )
        .into_response()
}

fn store_unavailable_response() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "Registry store unavailable"})),
    )
        .into_response()
}

fn envelope_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}
