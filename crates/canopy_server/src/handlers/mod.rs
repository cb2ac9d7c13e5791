//! HTTP and WebSocket handlers.
//!
//! Thin layer over `canopy_core`: parse the request, resolve the caller,
//! call the repository, translate the outcome, and hand the accepted
//! mutation to the hub for room broadcast.

pub mod blocks;
pub mod pages;
pub mod ws;

pub use blocks::blocks_routes;
pub use pages::pages_routes;
pub use ws::ws_handler;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use canopy_core::blocks::BlockRepo;
use canopy_core::pages::PageRepo;
use canopy_core::CanopyError;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::collab::CollabHub;

/// The caller identity used when no `x-user-id` header is present.
pub const DEFAULT_USER_ID: &str = "default-user-id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Page repository
    pub pages: PageRepo,
    /// Block repository
    pub blocks: BlockRepo,
    /// Collaboration hub
    pub hub: Arc<CollabHub>,
}

/// Response envelope for successful calls.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`
    pub success: bool,
    /// The operation result
    pub data: T,
}

/// Wrap a payload in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Handler-level error: a store failure or a request-shape problem.
#[derive(Debug)]
pub enum ApiError {
    /// A typed failure from the store layer
    Store(CanopyError),
    /// The request body failed validation
    BadRequest(String),
}

impl From<CanopyError> for ApiError {
    fn from(err: CanopyError) -> Self {
        ApiError::Store(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Store(CanopyError::Properties(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Store(err) => match err {
                CanopyError::PageNotFound => {
                    (StatusCode::NOT_FOUND, "page_not_found", err.to_string())
                }
                CanopyError::BlockNotFound => {
                    (StatusCode::NOT_FOUND, "block_not_found", err.to_string())
                }
                CanopyError::ReferenceNotFound(_) => {
                    (StatusCode::BAD_REQUEST, "reference_not_found", err.to_string())
                }
                CanopyError::CyclicMove => {
                    (StatusCode::BAD_REQUEST, "cyclic_move", err.to_string())
                }
                CanopyError::Conflict(_) => (StatusCode::CONFLICT, "conflict", err.to_string()),
                CanopyError::Properties(_) => {
                    (StatusCode::BAD_REQUEST, "invalid_properties", err.to_string())
                }
                CanopyError::Database(db_err) => {
                    error!("database error: {db_err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal_error",
                        "Internal server error".to_string(),
                    )
                }
            },
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request", message.clone())
            }
        };

        (
            status,
            Json(json!({
                "success": false,
                "error": { "code": code, "message": message },
            })),
        )
            .into_response()
    }
}

/// Result alias for handler functions.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Resolve the opaque caller identity from the request headers.
pub fn caller_id(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_ID)
        .to_string()
}

/// Routes for server status.
pub fn status_routes(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(state)
}

/// Server status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Fixed "ok"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Authenticated realtime connections
    pub connected_users: usize,
    /// Rooms with at least one member
    pub active_pages: usize,
}

/// GET /api/status - Get server status
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.hub.stats().await;
    Json(StatusResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected_users: stats.connected_users,
        active_pages: stats.active_pages,
    })
}
