//! Maps stored cards to the representation returned to a user.
//!
//! Every query path goes through [`CardProjector::project`], so the
//! membership-based redaction holds for bulk results as much as for single
//! card lookups.

use crate::models::{Board, Card, CardComment, CardWithComments, ConfigSnapshot, UserId};

#[derive(Debug, Clone)]
pub struct CardProjector {
    board_url: String,
}

impl CardProjector {
    pub fn new(board_url: impl Into<String>) -> Self {
        let mut board_url = board_url.into();
        if !board_url.ends_with('/') {
            board_url.push('/');
        }
        Self { board_url }
    }

    pub fn card_url(&self, board: &Board, card_id: &str) -> String {
        format!("{}b/{}/{}/{}", self.board_url, board.id, board.slug, card_id)
    }

    /// Project one card for `viewer`. Non-members of the card's board get
    /// only the public fields.
    pub fn project(
        &self,
        card: &CardWithComments,
        snapshot: &ConfigSnapshot,
        viewer: Option<&UserId>,
    ) -> Card {
        let stored = &card.card;
        let board = snapshot.board(&stored.board_id);
        let creator = snapshot.user(&stored.user_id).map(|u| u.username.clone());

        let mut projected = Card {
            id: stored.id.clone(),
            siret: board.and_then(|b| stored.siret(b)),
            list_title: board
                .and_then(|b| b.list(&stored.list_id))
                .map(|l| l.title.clone())
                .unwrap_or_default(),
            board_title: board.map(|b| b.title.clone()).unwrap_or_default(),
            creator,
            archived: stored.archived,
            created_at: stored.created_at,
            start_at: stored.start_at,
            end_at: stored.end_at,
            last_activity: card.last_activity(),
            list_id: None,
            board_id: None,
            swimlane_id: None,
            creator_id: None,
            url: None,
            description: None,
            assignee_ids: Vec::new(),
            member_ids: Vec::new(),
            label_ids: Vec::new(),
            comments: Vec::new(),
            user_is_board_member: false,
        };

        let member_board = match (board, viewer) {
            (Some(board), Some(viewer)) if board.is_active_member(viewer) => board,
            _ => return projected,
        };

        projected.list_id = Some(stored.list_id.clone());
        projected.board_id = Some(stored.board_id.clone());
        projected.swimlane_id = Some(stored.swimlane_id.clone());
        projected.creator_id = Some(stored.user_id.clone());
        projected.url = Some(self.card_url(member_board, stored.id.as_str()));
        projected.description = Some(stored.description.clone());
        projected.assignee_ids = stored.assignees.clone();
        projected.member_ids = stored.members.clone();
        projected.label_ids = stored.label_ids.clone();
        projected.comments = card
            .comments
            .iter()
            .map(|c| CardComment {
                author: snapshot.user(&c.user_id).map(|u| u.username.clone()),
                text: c.text.clone(),
                created_at: c.created_at,
            })
            .collect();
        projected.user_is_board_member = true;
        projected
    }

    pub fn project_all(
        &self,
        cards: &[CardWithComments],
        snapshot: &ConfigSnapshot,
        viewer: Option<&UserId>,
    ) -> Vec<Card> {
        cards
            .iter()
            .map(|c| self.project(c, snapshot, viewer))
            .collect()
    }
}
