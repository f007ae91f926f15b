//! Document store holding the board system's collections.

mod sqlite;

pub use sqlite::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::{CardId, CardWithComments, ConfigSnapshot, ListId, StoreCard, UserId};
use crate::pipeline::Pipeline;
use crate::snapshot::TopologySource;

/// A set of field changes applied to one card in a single write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    pub description: Option<String>,
    pub add_member: Option<UserId>,
    pub remove_member: Option<UserId>,
    pub list_id: Option<ListId>,
    /// `Some(None)` clears the end date.
    pub end_at: Option<Option<DateTime<Utc>>>,
    pub archived: Option<bool>,
}

#[async_trait]
pub trait DocumentStore: TopologySource {
    /// Run a card pipeline. Stages that depend on topology (domain, labels)
    /// are resolved against `snapshot`.
    async fn select_cards(
        &self,
        pipeline: &Pipeline,
        snapshot: &ConfigSnapshot,
    ) -> Result<Vec<CardWithComments>, AppError>;

    async fn get_card(&self, id: &CardId) -> Result<Option<CardWithComments>, AppError>;

    async fn insert_card(&self, card: &StoreCard) -> Result<(), AppError>;

    /// Apply `patch` atomically. Returns `false` when the card does not exist.
    async fn update_card(&self, id: &CardId, patch: &CardPatch) -> Result<bool, AppError>;
}
