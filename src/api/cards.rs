//! Card endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{respond, ApiResult};
use crate::auth::Session;
use crate::models::{
    Card, CardId, MoveCardParams, NewCardParams, Siret, SiretsAndBoardsParams, UpdateCardParams,
};
use crate::AppState;

/// GET /api/kanban/cards/siret/{siret} - Cards of one establishment.
pub async fn cards_from_siret(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(siret): Path<String>,
) -> ApiResult<Vec<Card>> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;

    let siret = match Siret::parse(&siret) {
        Ok(siret) => siret,
        Err(e) => return respond(Err(e), revision_id),
    };
    respond(
        state
            .kanban
            .select_cards_from_siret(&snapshot, &siret, &session.username)
            .await,
        revision_id,
    )
}

/// POST /api/kanban/cards/search - Cards of several establishments on
/// selected boards.
pub async fn cards_from_sirets_and_boards(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(request): Json<SiretsAndBoardsParams>,
) -> ApiResult<Vec<Card>> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .select_cards_from_sirets_and_board_ids(
                &snapshot,
                &request.sirets,
                &request.board_ids,
                &session.username,
            )
            .await,
        revision_id,
    )
}

/// GET /api/kanban/cards/{id} - One card, for members of its board.
pub async fn get_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<Card> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .select_card_from_card_id(&snapshot, &CardId::new(id), &session.username)
            .await,
        revision_id,
    )
}

/// POST /api/kanban/cards - Create a card for an establishment.
pub async fn create_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(request): Json<NewCardParams>,
) -> ApiResult<Card> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state.kanban.create_card(&snapshot, &request, &session.username).await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id} - Replace the description.
pub async fn update_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCardParams>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .update_card(&snapshot, &CardId::new(id), request.description, &session.username)
            .await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id}/join
pub async fn join_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .join_card(&snapshot, &CardId::new(id), &session.username)
            .await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id}/part
pub async fn part_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .part_card(&snapshot, &CardId::new(id), &session.username)
            .await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id}/move - Move to a list given by id or title.
pub async fn move_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Json(request): Json<MoveCardParams>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .move_card_list(&snapshot, &CardId::new(id), &request, &session.username)
            .await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id}/archive
pub async fn archive_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .archive_card(&snapshot, &CardId::new(id), &session.username)
            .await,
        revision_id,
    )
}

/// PUT /api/kanban/cards/{id}/unarchive
pub async fn unarchive_card(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let snapshot = state.kanban.current();
    let revision_id = snapshot.generation;
    respond(
        state
            .kanban
            .unarchive_card(&snapshot, &CardId::new(id), &session.username)
            .await,
        revision_id,
    )
}
