use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use canopy_core::blocks::{CreateBlock, UpdateBlock};
use canopy_core::model::{Block, BlockProperties, BlockType, BlockWithChildren};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResult, AppState, caller_id, ok};
use crate::collab::StoreEventKind;

/// Request body for POST /api/blocks
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlockRequest {
    /// Owning page id
    pub page_id: String,
    /// Block kind
    #[serde(rename = "type")]
    pub block_type: BlockType,
    /// Initial property document
    #[serde(default)]
    pub properties: BlockProperties,
    /// Parent block within the same page
    #[serde(default)]
    pub parent_block_id: Option<String>,
    /// Sibling to insert after
    #[serde(default)]
    pub after_block_id: Option<String>,
}

/// Request body for PUT /api/blocks/{id}
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlockRequest {
    /// Replacement property document
    #[serde(default)]
    pub properties: Option<BlockProperties>,
    /// Explicit new sibling position
    #[serde(default)]
    pub sort_index: Option<f64>,
}

/// Request body for POST /api/blocks/{id}/move
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MoveBlockRequest {
    /// New parent block (same page); `None` moves to the top level
    #[serde(default)]
    pub parent_block_id: Option<String>,
    /// Sibling to place after; first in scope when `None`
    #[serde(default)]
    pub after_block_id: Option<String>,
}

/// Request body for POST /api/blocks/{id}/duplicate
#[derive(Debug, Deserialize)]
pub struct DuplicateBlockRequest {
    /// Copy the live child subtree too (default: true)
    #[serde(default = "default_true", rename = "includeChildren")]
    pub include_children: bool,
}

impl Default for DuplicateBlockRequest {
    fn default() -> Self {
        Self {
            include_children: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Create block routes
pub fn blocks_routes(state: AppState) -> Router {
    Router::new()
        .route("/", post(create_block))
        .route("/{id}", get(get_block).put(update_block).delete(delete_block))
        .route("/{id}/move", post(move_block))
        .route("/{id}/duplicate", post(duplicate_block))
        .with_state(state)
}

/// POST /api/blocks - Create a block
async fn create_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller_id(&headers);
    let block = state.blocks.create(CreateBlock {
        page_id: req.page_id,
        block_type: req.block_type,
        properties: req.properties,
        parent_block_id: req.parent_block_id,
        after_block_id: req.after_block_id,
        created_by_id: user_id.clone(),
    })?;

    state
        .hub
        .broadcast_store_event(
            &block.page_id,
            StoreEventKind::BlockCreated,
            serde_json::to_value(&block)?,
            Some(user_id),
        )
        .await;

    Ok((StatusCode::CREATED, ok(block)))
}

/// GET /api/blocks/{id} - Block with its direct children
async fn get_block(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BlockWithChildren> {
    Ok(ok(state.blocks.get(&id)?))
}

/// PUT /api/blocks/{id} - Update properties/position
async fn update_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<UpdateBlockRequest>,
) -> ApiResult<Block> {
    let user_id = caller_id(&headers);
    let block = state.blocks.update(
        &id,
        UpdateBlock {
            properties: req.properties,
            sort_index: req.sort_index,
        },
        &user_id,
    )?;

    state
        .hub
        .broadcast_store_event(
            &block.page_id,
            StoreEventKind::BlockUpdated,
            serde_json::to_value(&block)?,
            Some(user_id),
        )
        .await;

    Ok(ok(block))
}

/// DELETE /api/blocks/{id} - Cascading soft-delete
async fn delete_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let user_id = caller_id(&headers);
    let block = state.blocks.delete(&id)?;

    state
        .hub
        .broadcast_store_event(
            &block.page_id,
            StoreEventKind::BlockDeleted,
            json!({ "id": block.id }),
            Some(user_id),
        )
        .await;

    Ok(ok(json!({ "id": block.id })))
}

/// POST /api/blocks/{id}/move - Fractional reposition within the page
async fn move_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MoveBlockRequest>,
) -> ApiResult<Block> {
    let user_id = caller_id(&headers);
    let block = state.blocks.move_block(
        &id,
        req.parent_block_id.as_deref(),
        req.after_block_id.as_deref(),
    )?;

    state
        .hub
        .broadcast_store_event(
            &block.page_id,
            StoreEventKind::BlockUpdated,
            serde_json::to_value(&block)?,
            Some(user_id),
        )
        .await;

    Ok(ok(block))
}

/// POST /api/blocks/{id}/duplicate - Deep copy after the original
async fn duplicate_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Option<Json<DuplicateBlockRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = caller_id(&headers);
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let block = state.blocks.duplicate(&id, req.include_children)?;

    state
        .hub
        .broadcast_store_event(
            &block.page_id,
            StoreEventKind::BlockCreated,
            serde_json::to_value(&block)?,
            Some(user_id),
        )
        .await;

    Ok((StatusCode::CREATED, ok(block)))
}
