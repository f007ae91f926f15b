//! Card documents as stored, and as projected for a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::board::Board;
use super::ids::{BoardId, CardId, CustomFieldId, LabelId, ListId, SwimlaneId, UserId, Username};
use super::siret::Siret;

/// Name of the board custom field holding the establishment code.
pub const SIRET_FIELD: &str = "SIRET";

/// Value of one custom field on a card, in the board system's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    #[serde(rename = "_id")]
    pub id: CustomFieldId,
    #[serde(default)]
    pub value: Option<String>,
}

/// A card document as the board system stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCard {
    pub id: CardId,
    pub board_id: BoardId,
    pub list_id: ListId,
    pub swimlane_id: SwimlaneId,
    pub title: String,
    pub description: String,
    /// Creator.
    pub user_id: UserId,
    pub assignees: Vec<UserId>,
    pub members: Vec<UserId>,
    pub label_ids: Vec<LabelId>,
    pub custom_fields: Vec<CustomFieldValue>,
    pub created_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub date_last_activity: DateTime<Utc>,
    pub archived: bool,
    pub sort: f64,
}

impl StoreCard {
    /// Establishment code carried by the card, resolved through the board's
    /// custom field definitions. Malformed values are ignored.
    pub fn siret(&self, board: &Board) -> Option<Siret> {
        let field = board.custom_field(SIRET_FIELD)?;
        self.custom_fields
            .iter()
            .find(|v| v.id == field.id)
            .and_then(|v| v.value.as_deref())
            .and_then(|v| Siret::parse(v).ok())
    }

    pub fn has_member_or_assignee(&self) -> bool {
        !self.members.is_empty() || !self.assignees.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub card_id: CardId,
    pub user_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardWithComments {
    pub card: StoreCard,
    pub comments: Vec<Comment>,
}

impl CardWithComments {
    /// Card activity including comment edits.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.comments
            .iter()
            .map(|c| c.modified_at)
            .fold(self.card.date_last_activity, DateTime::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardComment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Username>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A card as returned to a user.
///
/// Fields after `last_activity` are only filled when the user is an active
/// member of the card's board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub siret: Option<Siret>,
    pub list_title: String,
    pub board_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<Username>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,

    #[serde(rename = "listID", skip_serializing_if = "Option::is_none")]
    pub list_id: Option<ListId>,
    #[serde(rename = "boardID", skip_serializing_if = "Option::is_none")]
    pub board_id: Option<BoardId>,
    #[serde(rename = "swimlaneID", skip_serializing_if = "Option::is_none")]
    pub swimlane_id: Option<SwimlaneId>,
    #[serde(rename = "creatorID", skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "assigneeIDs", skip_serializing_if = "Vec::is_empty")]
    pub assignee_ids: Vec<UserId>,
    #[serde(rename = "memberIDs", skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<UserId>,
    #[serde(rename = "labelIDs", skip_serializing_if = "Vec::is_empty")]
    pub label_ids: Vec<LabelId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<CardComment>,
    pub user_is_board_member: bool,
}

impl Card {
    /// True when none of the member-only fields is populated.
    #[cfg(test)]
    pub fn is_redacted(&self) -> bool {
        self.list_id.is_none()
            && self.board_id.is_none()
            && self.swimlane_id.is_none()
            && self.creator_id.is_none()
            && self.url.is_none()
            && self.description.is_none()
            && self.assignee_ids.is_empty()
            && self.member_ids.is_empty()
            && self.label_ids.is_empty()
            && self.comments.is_empty()
            && !self.user_is_board_member
    }
}
