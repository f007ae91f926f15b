//! Follow lists and exports.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{respond, ApiResult};
use crate::auth::Session;
use crate::models::{CardsForUserParams, KanbanExports, Siret, Summaries};
use crate::AppState;

/// POST /api/kanban/follows - Establishment summaries in one of the three
/// follow modes.
pub async fn follows_for_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(params): Json<CardsForUserParams>,
) -> ApiResult<Summaries> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .select_follows_for_user(&snapshot, &params, &session.username, &session.roles)
            .await,
        revision_id,
    )
}

/// POST /api/kanban/follows/export - Export entries for the same selection.
pub async fn export_follows_for_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(params): Json<CardsForUserParams>,
) -> ApiResult<KanbanExports> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .export_follows_for_user(&snapshot, &params, &session.username, &session.roles)
            .await,
        revision_id,
    )
}

/// GET /api/kanban/exports/siret/{siret} - Export entries of one establishment.
pub async fn exports_from_siret(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(siret): Path<String>,
) -> ApiResult<KanbanExports> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;

    let siret = match Siret::parse(&siret) {
        Ok(siret) => siret,
        Err(e) => return respond(Err(e), revision_id),
    };
    respond(
        state
            .kanban
            .select_exports_with_siret(&snapshot, &siret, &session.username, &session.roles)
            .await,
        revision_id,
    )
}
