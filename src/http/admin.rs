//! Credential-guarded admin API.
//!
//! Administrative callers manage the blacklist and the per-mode policies
//! here. Every route requires a valid credential.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::admission::{
    BlacklistPage, PrivatePolicy, PublicPolicy, PRIVATE_POLICY_KEY, PUBLIC_POLICY_KEY,
};
use crate::auth::token::extract_token;
use crate::auth::Claims;
use crate::error::GateError;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/auth/verify", get(verify_credential))
        .route("/api/blacklist", get(list_blacklist).post(add_blacklist))
        .route("/api/blacklist/{id}", delete(remove_blacklist))
        .route("/api/config/{mode}", get(get_policy).put(put_policy))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}

async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    let claims = extract_token(request.headers())
        .and_then(|token| state.admission.verify_credential(token))
        .ok_or(GateError::Unauthenticated)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

#[derive(Serialize)]
struct SystemStatus {
    version: &'static str,
    status: &'static str,
}

async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

async fn verify_credential(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

async fn list_blacklist(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Json<BlacklistPage> {
    Json(state.admission.blacklist().list(query.page, query.limit))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBlacklistRequest {
    ip: String,
    #[serde(default)]
    reason: String,
}

async fn add_blacklist(
    State(state): State<AppState>,
    Json(body): Json<AddBlacklistRequest>,
) -> Result<impl IntoResponse, GateError> {
    let entry = state.admission.blacklist().add(&body.ip, &body.reason)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_blacklist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, GateError> {
    let ip = state.admission.blacklist().remove_by_id(&id)?;
    Ok(Json(json!({ "removed": ip })))
}

async fn get_policy(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<serde_json::Value>, GateError> {
    let settings = state.admission.settings();
    let value = match mode.as_str() {
        "public" => serde_json::to_value(
            settings
                .get::<PublicPolicy>(PUBLIC_POLICY_KEY)
                .unwrap_or_default(),
        ),
        "private" => serde_json::to_value(
            settings
                .get::<PrivatePolicy>(PRIVATE_POLICY_KEY)
                .unwrap_or_default(),
        ),
        _ => return Err(GateError::NotFound),
    }
    .map_err(|e| GateError::Store(e.into()))?;
    Ok(Json(value))
}

async fn put_policy(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let settings = state.admission.settings();
    let result = match mode.as_str() {
        "public" => serde_json::from_value::<PublicPolicy>(body)
            .map(|policy| settings.put(PUBLIC_POLICY_KEY, &policy)),
        "private" => serde_json::from_value::<PrivatePolicy>(body)
            .map(|policy| settings.put(PRIVATE_POLICY_KEY, &policy)),
        _ => return GateError::NotFound.into_response(),
    };

    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => GateError::Store(e).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, format!("invalid policy: {}", e)).into_response(),
    }
}
