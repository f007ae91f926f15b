//! Card creation and point writes.
//!
//! Each write resolves the acting user and the card's board against the
//! request's snapshot before building a single [`CardPatch`].

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{require_user, KanbanService, LIST_DONE, LIST_IN_PROGRESS};
use crate::access;
use crate::errors::AppError;
use crate::models::{
    Board, Card, CardId, CardWithComments, ConfigSnapshot, CustomFieldValue, EstablishmentData,
    MoveCardParams, NewCardParams, StoreCard, SwimlaneId, User, UserId, Username, SIRET_FIELD,
};
use crate::store::CardPatch;

const FIELD_ACTIVITE: &str = "Activité";
const FIELD_EFFECTIF: &str = "Effectif";
const FIELD_CONTACT: &str = "Contact";
const FIELD_FICHE: &str = "Fiche Signaux Faibles";

/// Lower bound of each staff band and the dropdown item naming it.
const EFFECTIF_CLASSES: [(i64, &str); 4] = [
    (10, "10-20"),
    (20, "20-50"),
    (50, "50-100"),
    (100, "100+"),
];

impl KanbanService {
    /// Create a card for an establishment in a swimlane covering its
    /// department.
    pub async fn create_card(
        &self,
        snapshot: &ConfigSnapshot,
        params: &NewCardParams,
        username: &Username,
    ) -> Result<Card, AppError> {
        let user = require_user(snapshot, username)?;
        let establishment = self
            .summaries
            .establishment_data(&params.siret)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("unknown establishment {}", params.siret))
            })?;

        let (board, swimlane_id) = self.target_swimlane(
            snapshot,
            user,
            &establishment.code_departement,
            params.swimlane_id.as_ref(),
        )?;
        let list = board
            .first_list()
            .ok_or_else(|| AppError::UnknownList(format!("no list on board {}", board.id)))?;

        let now = Utc::now();
        let card = StoreCard {
            id: CardId::new(Uuid::new_v4().simple().to_string()),
            board_id: board.id.clone(),
            list_id: list.id.clone(),
            swimlane_id,
            title: establishment.raison_sociale.clone(),
            description: params.description.clone(),
            user_id: user.id.clone(),
            assignees: vec![user.id.clone()],
            members: vec![user.id.clone()],
            label_ids: board.label_ids_for_names(&params.labels),
            custom_fields: self.custom_fields(board, &establishment),
            created_at: now,
            start_at: Some(now),
            end_at: None,
            date_last_activity: now,
            archived: false,
            sort: 0.0,
        };
        self.boards.insert_card(&card).await?;
        info!(card_id = %card.id, board_id = %card.board_id, siret = %params.siret, "Card created");

        let created = CardWithComments {
            card,
            comments: Vec::new(),
        };
        Ok(self.projector.project(&created, snapshot, Some(&user.id)))
    }

    pub async fn update_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        description: String,
        username: &Username,
    ) -> Result<(), AppError> {
        self.authorized_card(snapshot, card_id, username).await?;
        let patch = CardPatch {
            description: Some(description),
            ..Default::default()
        };
        self.apply(card_id, &patch).await
    }

    /// Add the user to the card's members and start the follow-up.
    pub async fn join_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<(), AppError> {
        let (card, user) = self.authorized_card(snapshot, card_id, username).await?;
        let mut patch = CardPatch {
            add_member: Some(user.clone()),
            ..Default::default()
        };
        if let Some(list) = board_of(snapshot, &card)?.list_by_title(LIST_IN_PROGRESS) {
            patch.list_id = Some(list.id.clone());
            patch.end_at = Some(None);
        }
        self.apply(card_id, &patch).await
    }

    /// Remove the user from the card's members. The follow-up ends when
    /// nobody is left on the card.
    pub async fn part_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<(), AppError> {
        let (card, user) = self.authorized_card(snapshot, card_id, username).await?;
        let mut patch = CardPatch {
            remove_member: Some(user.clone()),
            ..Default::default()
        };

        // assignees stay on the card
        let mut remaining = card.card.clone();
        remaining.members.retain(|m| *m != user);
        if !remaining.has_member_or_assignee() {
            if let Some(list) = board_of(snapshot, &card)?.list_by_title(LIST_DONE) {
                patch.list_id = Some(list.id.clone());
                patch.end_at = Some(Some(Utc::now()));
            }
        }
        self.apply(card_id, &patch).await
    }

    /// Move the card to another list of its board, by id or by title.
    pub async fn move_card_list(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        target: &MoveCardParams,
        username: &Username,
    ) -> Result<(), AppError> {
        let (card, _) = self.authorized_card(snapshot, card_id, username).await?;
        let board = board_of(snapshot, &card)?;
        let list = match (&target.list_id, &target.list_title) {
            (Some(id), _) => board.list(id),
            (None, Some(title)) => board.list_by_title(title),
            (None, None) => {
                return Err(AppError::BadRequest(
                    "either listID or listTitle is required".to_string(),
                ))
            }
        }
        .ok_or_else(|| {
            let wanted = target
                .list_id
                .as_ref()
                .map(|id| id.to_string())
                .or_else(|| target.list_title.clone())
                .unwrap_or_default();
            AppError::UnknownList(wanted)
        })?;

        let patch = CardPatch {
            list_id: Some(list.id.clone()),
            ..Default::default()
        };
        self.apply(card_id, &patch).await
    }

    pub async fn archive_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<(), AppError> {
        self.set_archived(snapshot, card_id, username, true).await
    }

    pub async fn unarchive_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<(), AppError> {
        self.set_archived(snapshot, card_id, username, false).await
    }

    async fn set_archived(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
        archived: bool,
    ) -> Result<(), AppError> {
        self.authorized_card(snapshot, card_id, username).await?;
        let patch = CardPatch {
            archived: Some(archived),
            ..Default::default()
        };
        self.apply(card_id, &patch).await
    }

    /// Load a card and check that `username` is an active member of its
    /// board in `snapshot`.
    async fn authorized_card(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<(CardWithComments, UserId), AppError> {
        let user = require_user(snapshot, username)?.id.clone();
        let card = self
            .boards
            .get_card(card_id)
            .await?
            .ok_or_else(|| AppError::UnknownCard(card_id.to_string()))?;
        if !board_of(snapshot, &card)?.is_active_member(&user) {
            return Err(AppError::forbidden("not a member of the card's board"));
        }
        Ok((card, user))
    }

    async fn apply(&self, card_id: &CardId, patch: &CardPatch) -> Result<(), AppError> {
        if self.boards.update_card(card_id, patch).await? {
            Ok(())
        } else {
            Err(AppError::UnknownCard(card_id.to_string()))
        }
    }

    /// Board and swimlane a new card goes to. An explicit swimlane must sit
    /// on a business-domain board of the user and cover the department.
    fn target_swimlane<'a>(
        &self,
        snapshot: &'a ConfigSnapshot,
        user: &User,
        departement: &str,
        requested: Option<&SwimlaneId>,
    ) -> Result<(&'a Board, SwimlaneId), AppError> {
        let zone = access::zone_index(access::boards_for(snapshot, &user.id), &self.referentiel)
            .remove(departement)
            .unwrap_or_default();

        if let Some(swimlane_id) = requested {
            let board = snapshot
                .board_for_swimlane(swimlane_id)
                .ok_or_else(|| AppError::UnknownBoard(format!("swimlane {}", swimlane_id)))?;
            if !board.is_active_member(&user.id) {
                return Err(AppError::forbidden("not a member of the swimlane's board"));
            }
            if !self.domain.matches(board) {
                return Err(AppError::forbidden("board is outside the business domain"));
            }
            if !zone.iter().any(|s| s.swimlane_id == *swimlane_id) {
                return Err(AppError::forbidden(
                    "swimlane does not cover the establishment's zone",
                ));
            }
            return Ok((board, swimlane_id.clone()));
        }

        zone.into_iter()
            .find_map(|entry| {
                snapshot
                    .board(&entry.board_id)
                    .filter(|b| self.domain.matches(b))
                    .map(|b| (b, entry.swimlane_id))
            })
            .ok_or_else(|| AppError::forbidden("no swimlane available for this zone"))
    }

    /// Custom field values for the fields `board` defines.
    fn custom_fields(&self, board: &Board, establishment: &EstablishmentData) -> Vec<CustomFieldValue> {
        let activite = match (
            establishment.libelle_activite.as_deref(),
            establishment.code_activite.as_deref(),
        ) {
            (Some(libelle), Some(code)) if !libelle.is_empty() && !code.is_empty() => {
                Some(format!("{} ({})", libelle, code))
            }
            _ => None,
        };

        let mut values = Vec::new();
        let mut set = |name: &str, value: Option<String>| {
            if let Some(field) = board.custom_field(name) {
                values.push(CustomFieldValue {
                    id: field.id.clone(),
                    value,
                });
            }
        };
        set(FIELD_ACTIVITE, activite);
        set(
            FIELD_EFFECTIF,
            board
                .custom_field(FIELD_EFFECTIF)
                .and_then(|f| effectif_class(establishment.effectif).and_then(|c| f.dropdown_item(c)))
                .map(|item| item.id.clone()),
        );
        set(FIELD_CONTACT, Some(String::new()));
        set(SIRET_FIELD, Some(establishment.siret.to_string()));
        set(
            FIELD_FICHE,
            Some(format!("{}ets/{}", self.web_base_url, establishment.siret)),
        );
        values
    }
}

/// Name of the highest staff band `effectif` reaches.
fn effectif_class(effectif: Option<i64>) -> Option<&'static str> {
    let effectif = effectif?;
    EFFECTIF_CLASSES
        .iter()
        .rev()
        .find(|(floor, _)| effectif >= *floor)
        .map(|(_, name)| *name)
}

fn board_of<'a>(snapshot: &'a ConfigSnapshot, card: &CardWithComments) -> Result<&'a Board, AppError> {
    snapshot
        .board(&card.card.board_id)
        .ok_or_else(|| AppError::UnknownBoard(card.card.board_id.to_string()))
}
