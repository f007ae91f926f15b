//! Per-user kanban configuration and request parameters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BoardId, LabelId, ListId, SwimlaneId, UserId, Username};
use super::siret::Siret;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanList {
    pub title: String,
    pub sort: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanSwimlane {
    pub title: String,
    pub sort: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanLabel {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanBoardMember {
    pub username: Username,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanBoard {
    pub title: String,
    pub slug: String,
    pub lists: BTreeMap<ListId, KanbanList>,
    pub swimlanes: BTreeMap<SwimlaneId, KanbanSwimlane>,
    pub labels: BTreeMap<LabelId, KanbanLabel>,
    pub members: BTreeMap<UserId, KanbanBoardMember>,
}

/// A (board, swimlane) pair a card can be created in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BoardSwimlane {
    #[serde(rename = "boardID")]
    pub board_id: BoardId,
    #[serde(rename = "swimlaneID")]
    pub swimlane_id: SwimlaneId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanUser {
    pub username: Username,
    pub full_name: String,
    pub active: bool,
}

/// Zone code to the swimlanes that cover it.
pub type ZoneIndex = BTreeMap<String, Vec<BoardSwimlane>>;

/// The board configuration a single user is allowed to see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KanbanConfig {
    #[serde(rename = "userID")]
    pub user_id: Option<UserId>,
    pub boards: BTreeMap<BoardId, KanbanBoard>,
    pub departements: ZoneIndex,
    pub users: BTreeMap<UserId, KanbanUser>,
}

/// Which cards a follow query is built around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardsForUserType {
    /// Followed establishments that have no card.
    NoCard,
    /// Cards where the user is member or assignee.
    MyCards,
    #[default]
    AllCards,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    And,
    #[default]
    Or,
}

/// Filters of a follow or export query.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardsForUserParams {
    #[serde(rename = "type")]
    pub kind: CardsForUserType,
    pub zone: Vec<String>,
    #[serde(rename = "boardIDs")]
    pub board_ids: Vec<BoardId>,
    pub labels: Vec<String>,
    pub label_mode: LabelMode,
    pub since: Option<DateTime<Utc>>,
    pub lists: Vec<String>,
    pub raison_sociale: Option<String>,
}

/// Card creation request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCardParams {
    pub siret: Siret,
    /// Target swimlane. When absent, the first swimlane of the user's zone
    /// index for the establishment's department is used.
    #[serde(rename = "swimlaneID", default)]
    pub swimlane_id: Option<SwimlaneId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCardParams {
    pub description: String,
}

/// List move target, by id or by title within the card's board.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveCardParams {
    #[serde(rename = "listID")]
    pub list_id: Option<ListId>,
    pub list_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClearBoardIdsParams {
    #[serde(rename = "boardIDs")]
    pub board_ids: Vec<BoardId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiretsAndBoardsParams {
    pub sirets: Vec<Siret>,
    #[serde(rename = "boardIDs", default)]
    pub board_ids: Vec<BoardId>,
}
