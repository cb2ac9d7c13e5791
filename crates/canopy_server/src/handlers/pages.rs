use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use canopy_core::model::{BlockTree, BlockWithChildren, Page, PageDetail, PageWithCounts};
use canopy_core::pages::{CreatePage, UpdatePage};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, AppState, caller_id, ok};
use crate::collab::StoreEventKind;

/// Request body for POST /api/pages
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    /// Page title (1..=200 chars)
    pub title: String,
    /// Parent page id
    #[serde(default)]
    pub parent_page_id: Option<String>,
    /// Icon
    #[serde(default)]
    pub icon: Option<String>,
    /// Cover image URL
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Sibling to insert after
    #[serde(default)]
    pub after_page_id: Option<String>,
}

/// Request body for PUT /api/pages/{id}
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageRequest {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New icon
    #[serde(default)]
    pub icon: Option<String>,
    /// New cover image URL
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Request body for POST /api/pages/{id}/move
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MovePageRequest {
    /// New parent page; `None` moves to the top level
    #[serde(default)]
    pub parent_page_id: Option<String>,
    /// Sibling to place after; first in scope when `None`
    #[serde(default)]
    pub after_page_id: Option<String>,
}

/// Create page routes
pub fn pages_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_pages).post(create_page))
        .route("/{id}", get(get_page).put(update_page).delete(delete_page))
        .route("/{id}/blocks", get(get_page_blocks))
        .route("/{id}/tree", get(get_page_tree))
        .route("/{id}/move", post(move_page))
        .with_state(state)
}

fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    if title.chars().count() > 200 {
        return Err(ApiError::BadRequest(
            "title must be at most 200 characters".to_string(),
        ));
    }
    Ok(())
}

/// GET /api/pages - All live top-level pages
async fn list_pages(State(state): State<AppState>) -> ApiResult<Vec<PageWithCounts>> {
    Ok(ok(state.pages.list_top_level()?))
}

/// GET /api/pages/{id} - Page with child pages and block count
async fn get_page(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PageDetail> {
    Ok(ok(state.pages.get(&id)?))
}

/// POST /api/pages - Create a page
async fn create_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreatePageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_title(&req.title)?;
    let user_id = caller_id(&headers);

    let page = state.pages.create(CreatePage {
        title: req.title,
        parent_page_id: req.parent_page_id,
        icon: req.icon,
        cover_image: req.cover_image,
        after_page_id: req.after_page_id,
        created_by_id: user_id.clone(),
    })?;

    // Collaborators looking at the parent page see the new child appear.
    if let Some(parent_id) = &page.page.parent_page_id {
        state
            .hub
            .broadcast_store_event(
                parent_id,
                StoreEventKind::PageUpdated,
                json!({ "type": "child_page_created", "page": serde_json::to_value(&page)? }),
                Some(user_id),
            )
            .await;
    }

    Ok((StatusCode::CREATED, ok(page)))
}

/// PUT /api/pages/{id} - Update title/icon/cover
async fn update_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdatePageRequest>,
) -> ApiResult<PageWithCounts> {
    if let Some(title) = &req.title {
        validate_title(title)?;
    }
    let user_id = caller_id(&headers);

    let page = state.pages.update(
        &id,
        UpdatePage {
            title: req.title,
            icon: req.icon,
            cover_image: req.cover_image,
        },
    )?;

    state
        .hub
        .broadcast_store_event(
            &id,
            StoreEventKind::PageUpdated,
            json!({ "type": "page_updated", "page": serde_json::to_value(&page)? }),
            Some(user_id),
        )
        .await;

    Ok(ok(page))
}

/// DELETE /api/pages/{id} - Cascading soft-delete
async fn delete_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let user_id = caller_id(&headers);
    state.pages.delete(&id)?;

    state
        .hub
        .broadcast_store_event(
            &id,
            StoreEventKind::PageUpdated,
            json!({ "type": "page_deleted", "pageId": id }),
            Some(user_id),
        )
        .await;

    Ok(ok(json!({ "id": id })))
}

/// POST /api/pages/{id}/move - Fractional reposition
async fn move_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MovePageRequest>,
) -> ApiResult<Page> {
    let user_id = caller_id(&headers);
    let page = state.pages.move_page(
        &id,
        req.parent_page_id.as_deref(),
        req.after_page_id.as_deref(),
    )?;

    state
        .hub
        .broadcast_store_event(
            &id,
            StoreEventKind::PageUpdated,
            json!({ "type": "page_moved", "page": serde_json::to_value(&page)? }),
            Some(user_id),
        )
        .await;

    Ok(ok(page))
}

/// GET /api/pages/{id}/blocks - Top-level blocks with one level of children
async fn get_page_blocks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<BlockWithChildren>> {
    Ok(ok(state.pages.page_blocks(&id)?))
}

/// GET /api/pages/{id}/tree - Full nested block tree
async fn get_page_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<BlockTree>> {
    Ok(ok(state.blocks.tree(&id)?))
}
