//! Board configuration endpoints.

use axum::{extract::State, Extension, Json};

use super::{respond, ApiResult};
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::{BoardId, ClearBoardIdsParams, KanbanConfig, User};
use crate::AppState;

/// GET /api/kanban/config - Boards, users and zone index visible to the caller.
pub async fn get_config(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<KanbanConfig> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        Ok(state.kanban.load_config_for_user(&snapshot, &session.username)),
        revision_id,
    )
}

/// GET /api/kanban/user - Board account of the caller.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<User> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;

    let user = state
        .kanban
        .get_user(&snapshot, &session.username)
        .ok_or_else(|| AppError::forbidden(format!("{} has no board account", session.username)));
    respond(user, revision_id)
}

/// POST /api/kanban/boards/clear - Keep only the board ids the caller can see.
pub async fn clear_board_ids(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(request): Json<ClearBoardIdsParams>,
) -> ApiResult<Vec<BoardId>> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    let cleared = state
        .kanban
        .clear_board_ids(&snapshot, &request.board_ids, &session.username);
    respond(Ok(cleared), revision_id)
}
