//! Read operations: config, card lookups, follows and exports.

use tracing::debug;

use super::{KanbanService, FOLLOWS_LIMIT};
use crate::access;
use crate::db::Selection;
use crate::errors::AppError;
use crate::join;
use crate::models::{
    BoardId, Card, CardId, CardsForUserParams, CardsForUserType, ConfigSnapshot, KanbanConfig,
    KanbanExports, Siret, Summaries, SummaryQuery, UserId, Username,
};
use crate::pipeline::PipelineBuilder;

impl KanbanService {
    pub fn load_config_for_user(
        &self,
        snapshot: &ConfigSnapshot,
        username: &Username,
    ) -> KanbanConfig {
        access::config_for(snapshot, username, &self.referentiel)
    }

    /// Requested board ids restricted to the ones `username` can see.
    pub fn clear_board_ids(
        &self,
        snapshot: &ConfigSnapshot,
        requested: &[BoardId],
        username: &Username,
    ) -> Vec<BoardId> {
        match snapshot.user_by_username(username) {
            Some(user) => access::clear_board_ids(requested, snapshot, &user.id),
            None => Vec::new(),
        }
    }

    /// Every business-domain card carrying `siret`, projected for `username`.
    pub async fn select_cards_from_siret(
        &self,
        snapshot: &ConfigSnapshot,
        siret: &Siret,
        username: &Username,
    ) -> Result<Vec<Card>, AppError> {
        let viewer = snapshot.user_by_username(username).map(|u| u.id.clone());
        let pipeline = PipelineBuilder::new(&self.domain)
            .sirets(vec![siret.clone()])
            .build();
        let cards = self.boards.select_cards(&pipeline, snapshot).await?;
        Ok(self.projector.project_all(&cards, snapshot, viewer.as_ref()))
    }

    /// Cards carrying any of `sirets`, restricted to boards the user can see.
    pub async fn select_cards_from_sirets_and_board_ids(
        &self,
        snapshot: &ConfigSnapshot,
        sirets: &[Siret],
        board_ids: &[BoardId],
        username: &Username,
    ) -> Result<Vec<Card>, AppError> {
        let Some(user) = snapshot.user_by_username(username) else {
            return Ok(Vec::new());
        };
        let pipeline = PipelineBuilder::new(&self.domain)
            .board_ids(access::clear_board_ids(board_ids, snapshot, &user.id))
            .sirets(sirets.to_vec())
            .build();
        let cards = self.boards.select_cards(&pipeline, snapshot).await?;
        Ok(self.projector.project_all(&cards, snapshot, Some(&user.id)))
    }

    /// A single card, for active members of its board only.
    pub async fn select_card_from_card_id(
        &self,
        snapshot: &ConfigSnapshot,
        card_id: &CardId,
        username: &Username,
    ) -> Result<Card, AppError> {
        let card = self
            .boards
            .get_card(card_id)
            .await?
            .ok_or_else(|| AppError::UnknownCard(card_id.to_string()))?;
        let board = snapshot
            .board(&card.card.board_id)
            .ok_or_else(|| AppError::UnknownBoard(card.card.board_id.to_string()))?;
        let user = snapshot
            .user_by_username(username)
            .filter(|u| board.is_active_member(&u.id))
            .ok_or_else(|| AppError::forbidden("not a member of the card's board"))?;
        Ok(self.projector.project(&card, snapshot, Some(&user.id)))
    }

    /// Establishment summaries around the user's cards, or around the
    /// establishments they follow without a card.
    pub async fn select_follows_for_user(
        &self,
        snapshot: &ConfigSnapshot,
        params: &CardsForUserParams,
        username: &Username,
        roles: &[String],
    ) -> Result<Summaries, AppError> {
        let (viewer, cards) = self.cards_for_user(snapshot, params, username).await?;
        let sirets = join::sirets_of(&cards);

        let mut query = summary_query(params, username, roles);
        if params.kind == CardsForUserType::NoCard {
            return self
                .summaries
                .select_summaries(Selection::FollowedWithout(&sirets), &query)
                .await;
        }

        if params.kind == CardsForUserType::MyCards && viewer.is_some() {
            let inserted = self.summaries.follow_from_cards(username, &sirets).await?;
            debug!(%username, inserted, "Follows backfilled from cards");
        }

        query.limit = Some(FOLLOWS_LIMIT);
        let mut page = self
            .summaries
            .select_summaries(Selection::Sirets(&sirets), &query)
            .await?;
        page.summaries = join::attach_cards(page.summaries, cards);
        Ok(page)
    }

    /// Export entries for the same selection as [`Self::select_follows_for_user`].
    pub async fn export_follows_for_user(
        &self,
        snapshot: &ConfigSnapshot,
        params: &CardsForUserParams,
        username: &Username,
        roles: &[String],
    ) -> Result<KanbanExports, AppError> {
        let query = summary_query(params, username, roles);

        if params.kind == CardsForUserType::NoCard {
            let (_, cards) = self.cards_for_user(snapshot, params, username).await?;
            let sirets = join::sirets_of(&cards);
            let records = self
                .summaries
                .select_exports(Selection::FollowedWithout(&sirets), &query)
                .await?;
            return Ok(KanbanExports {
                exports: join::records_to_exports(&records),
                cards_without_record: Vec::new(),
            });
        }

        let Some(user) = snapshot.user_by_username(username).map(|u| u.id.clone()) else {
            return Ok(KanbanExports::default());
        };
        let pipeline = PipelineBuilder::new(&self.domain)
            .for_user(params, &user, access::clear_board_ids(&params.board_ids, snapshot, &user))
            .build();
        let cards = self.boards.select_cards(&pipeline, snapshot).await?;
        let projected = self.projector.project_all(&cards, snapshot, Some(&user));
        let sirets = join::sirets_of(&projected);
        let records = self
            .summaries
            .select_exports(Selection::Sirets(&sirets), &query)
            .await?;
        Ok(join::join_exports(&records, &cards, snapshot, Some(&user)))
    }

    /// Exports of one establishment joined with its cards, or the bare
    /// record when it has none.
    pub async fn select_exports_with_siret(
        &self,
        snapshot: &ConfigSnapshot,
        siret: &Siret,
        username: &Username,
        roles: &[String],
    ) -> Result<KanbanExports, AppError> {
        let viewer = snapshot.user_by_username(username).map(|u| u.id.clone());
        let query = SummaryQuery {
            username: username.clone(),
            roles: roles.to_vec(),
            ..Default::default()
        };
        let sirets = [siret.clone()];
        let records = self
            .summaries
            .select_exports(Selection::Sirets(&sirets), &query)
            .await?;

        let pipeline = PipelineBuilder::new(&self.domain)
            .sirets(sirets.to_vec())
            .build();
        let cards = self.boards.select_cards(&pipeline, snapshot).await?;

        let mut exports = join::join_exports(&records, &cards, snapshot, viewer.as_ref());
        if exports.exports.is_empty() {
            exports.exports = join::records_to_exports(&records);
        }
        Ok(exports)
    }

    /// Cards selected by a follow query, projected for the user. Unknown
    /// users see no card. The no-card summaries and exports both exclude
    /// exactly this set.
    async fn cards_for_user(
        &self,
        snapshot: &ConfigSnapshot,
        params: &CardsForUserParams,
        username: &Username,
    ) -> Result<(Option<UserId>, Vec<Card>), AppError> {
        let Some(user) = snapshot.user_by_username(username).map(|u| u.id.clone()) else {
            return Ok((None, Vec::new()));
        };
        let board_ids = access::clear_board_ids(&params.board_ids, snapshot, &user);
        let pipeline = PipelineBuilder::new(&self.domain)
            .for_user(params, &user, board_ids)
            .build();
        let cards = self.boards.select_cards(&pipeline, snapshot).await?;
        let projected = self.projector.project_all(&cards, snapshot, Some(&user));
        Ok((Some(user), projected))
    }
}

fn summary_query(params: &CardsForUserParams, username: &Username, roles: &[String]) -> SummaryQuery {
    SummaryQuery {
        username: username.clone(),
        roles: roles.to_vec(),
        zone: params.zone.clone(),
        raison_sociale: params.raison_sociale.clone(),
        limit: None,
    }
}
