//! Upload admission and upstream forwarding.
//!
//! The admission middleware wraps the upload routes: it runs the full
//! pipeline, holds the concurrency permit across the inner handler, and
//! maps rejections to HTTP responses. The handler itself is a
//! single-upstream forwarder; uploads are not idempotent, so there is no
//! retry loop.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header,
        uri::{Authority, Scheme},
        HeaderMap, Request, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::str::FromStr;

use crate::auth::token::extract_token;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Resolve the client address: first `X-Forwarded-For` hop, else peer IP.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.ip().to_string()
}

/// Admission middleware for upload routes.
pub async fn admission_middleware(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), peer);
    let token = extract_token(request.headers()).map(str::to_string);

    let admission = match state.admission.admit(&ip, token.as_deref()) {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    // Cheap size pre-check; the body limit layer backstops chunked bodies.
    if let (Some(cap), Some(length)) = (admission.max_file_size, content_length(request.headers()))
    {
        if length > cap {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                "upload exceeds the size limit",
            )
                .into_response();
        }
    }

    tracing::debug!(
        client = %admission.identity.scope_key(),
        mode = admission.identity.mode().as_str(),
        "Upload admitted"
    );

    // The permit is held until the response is ready. Dropping it on any
    // path, including a cancelled request future, releases the slot.
    let mut response = next.run(request).await;
    if let Some(remaining) = admission.remaining {
        if let Ok(value) = header::HeaderValue::from_str(&remaining.to_string()) {
            response.headers_mut().insert("x-ratelimit-remaining", value);
        }
    }
    drop(admission);
    response
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Forward an admitted upload to the configured upstream.
pub async fn upload_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let config = state.config.load_full();
    let (parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    match Authority::from_str(&config.upstream.address) {
        Ok(authority) => uri_parts.authority = Some(authority),
        Err(e) => {
            tracing::error!(
                upstream = %config.upstream.address,
                error = %e,
                "Invalid upstream address"
            );
            return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
        }
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(_) => parts.uri.clone(),
    };

    let mut forward = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .version(parts.version);
    if let Some(headers) = forward.headers_mut() {
        for (name, value) in parts.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        if let Ok(value) = header::HeaderValue::from_str(&peer.ip().to_string()) {
            headers.append("x-forwarded-for", value);
        }
    }
    let forward = match forward.body(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build upstream request",
            )
                .into_response();
        }
    };

    match state.client.request(forward).await {
        Ok(response) => {
            metrics::record_upstream(response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Upstream request failed");
            metrics::record_upstream(502);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
