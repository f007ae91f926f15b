//! Board topology and the config snapshot built from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BoardId, CustomFieldId, LabelId, ListId, SwimlaneId, UserId, Username};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: ListId,
    pub title: String,
    pub sort: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swimlane {
    pub id: SwimlaneId,
    pub title: String,
    pub sort: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: LabelId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub is_active: bool,
}

/// One entry of a dropdown custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropdownItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub id: CustomFieldId,
    pub name: String,
    #[serde(default)]
    pub dropdown_items: Vec<DropdownItem>,
}

impl CustomField {
    pub fn dropdown_item(&self, name: &str) -> Option<&DropdownItem> {
        self.dropdown_items.iter().find(|item| item.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    pub slug: String,
    pub lists: Vec<List>,
    pub swimlanes: Vec<Swimlane>,
    pub labels: Vec<Label>,
    pub members: Vec<Member>,
    pub custom_fields: Vec<CustomField>,
}

impl Board {
    pub fn is_active_member(&self, user_id: &UserId) -> bool {
        self.members
            .iter()
            .any(|m| m.is_active && &m.user_id == user_id)
    }

    pub fn list(&self, id: &ListId) -> Option<&List> {
        self.lists.iter().find(|l| &l.id == id)
    }

    pub fn list_by_title(&self, title: &str) -> Option<&List> {
        self.lists.iter().find(|l| l.title == title)
    }

    /// The list a new card lands in: lowest sort order.
    pub fn first_list(&self) -> Option<&List> {
        self.lists
            .iter()
            .min_by(|a, b| a.sort.total_cmp(&b.sort))
    }

    pub fn swimlane(&self, id: &SwimlaneId) -> Option<&Swimlane> {
        self.swimlanes.iter().find(|s| &s.id == id)
    }

    pub fn label_name(&self, id: &LabelId) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| &l.id == id)
            .map(|l| l.name.as_str())
    }

    /// Board-local label ids carrying one of the given names.
    pub fn label_ids_for_names(&self, names: &[String]) -> Vec<LabelId> {
        self.labels
            .iter()
            .filter(|l| names.contains(&l.name))
            .map(|l| l.id.clone())
            .collect()
    }

    pub fn custom_field(&self, name: &str) -> Option<&CustomField> {
        self.custom_fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub full_name: String,
}

/// Raw result of one full topology fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub boards: Vec<Board>,
    pub users: Vec<User>,
}

/// Immutable view of the whole board topology at one point in time.
///
/// Never mutated after construction. A refresh builds a new one and swaps it
/// in, so a reader holding an `Arc<ConfigSnapshot>` always sees one
/// consistent fetch.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    pub boards: BTreeMap<BoardId, Board>,
    pub users: BTreeMap<UserId, User>,
    /// Monotonic publish counter, 0 until the first successful refresh.
    pub generation: i64,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl ConfigSnapshot {
    pub fn from_topology(topology: Topology, generation: i64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            boards: topology
                .boards
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
            users: topology
                .users
                .into_iter()
                .map(|u| (u.id.clone(), u))
                .collect(),
            generation,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn board(&self, id: &BoardId) -> Option<&Board> {
        self.boards.get(id)
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_by_username(&self, username: &Username) -> Option<&User> {
        self.users.values().find(|u| &u.username == username)
    }

    pub fn board_for_swimlane(&self, id: &SwimlaneId) -> Option<&Board> {
        self.boards.values().find(|b| b.swimlane(id).is_some())
    }

    /// Content equality, ignoring publish bookkeeping.
    pub fn same_topology(&self, other: &ConfigSnapshot) -> bool {
        self.boards == other.boards && self.users == other.users
    }
}
