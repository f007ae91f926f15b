//! Card query composition.
//!
//! A [`Pipeline`] is an ordered list of filter stages, all applied
//! conjunctively. The store translates it into its own query language; this
//! module only decides which stages exist and in what order.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};

use crate::errors::AppError;
use crate::models::{
    Board, BoardId, CardsForUserParams, CardsForUserType, ConfigSnapshot, LabelId, LabelMode,
    Siret, UserId,
};

/// Board slug convention identifying business-domain boards.
#[derive(Debug, Clone)]
pub struct BoardDomain(Regex);

impl BoardDomain {
    pub fn new(pattern: &str) -> Result<Self, AppError> {
        RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(Self)
            .map_err(|e| AppError::Validation(format!("invalid slug pattern: {}", e)))
    }

    pub fn matches(&self, board: &Board) -> bool {
        self.0.is_match(&board.slug)
    }

    /// Domain boards of a snapshot.
    pub fn board_ids(&self, snapshot: &ConfigSnapshot) -> Vec<BoardId> {
        snapshot
            .boards
            .values()
            .filter(|b| self.matches(b))
            .map(|b| b.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum Stage {
    /// Card board in the given set.
    BoardFilter(Vec<BoardId>),
    /// Card board slug matches the business-domain convention.
    Domain(BoardDomain),
    /// Card carries one of the given establishment codes.
    SiretFilter(Vec<Siret>),
    /// Card list title in the given set.
    ListFilter(Vec<String>),
    /// User is a member or an assignee of the card.
    AssigneeFilter(UserId),
    LabelFilter { names: Vec<String>, mode: LabelMode },
    /// Latest of card and comment activity at or after the timestamp.
    SinceFilter(DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

/// Collects optional filters and emits them in a fixed order, with the
/// domain stage always present and the activity stage always last.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    domain: BoardDomain,
    board_ids: Option<Vec<BoardId>>,
    sirets: Option<Vec<Siret>>,
    lists: Option<Vec<String>>,
    assignee: Option<UserId>,
    labels: Option<(Vec<String>, LabelMode)>,
    since: Option<DateTime<Utc>>,
}

impl PipelineBuilder {
    pub fn new(domain: &BoardDomain) -> Self {
        Self {
            domain: domain.clone(),
            board_ids: None,
            sirets: None,
            lists: None,
            assignee: None,
            labels: None,
            since: None,
        }
    }

    /// Restrict to a board set. An explicit empty set matches nothing.
    pub fn board_ids(mut self, ids: Vec<BoardId>) -> Self {
        self.board_ids = Some(ids);
        self
    }

    pub fn sirets(mut self, sirets: Vec<Siret>) -> Self {
        self.sirets = Some(sirets);
        self
    }

    /// No-op for an empty title set.
    pub fn lists(mut self, titles: Vec<String>) -> Self {
        if !titles.is_empty() {
            self.lists = Some(titles);
        }
        self
    }

    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assignee = Some(user);
        self
    }

    /// No-op for an empty name set.
    pub fn labels(mut self, names: Vec<String>, mode: LabelMode) -> Self {
        if !names.is_empty() {
            self.labels = Some((names, mode));
        }
        self
    }

    pub fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Filters of a follow or export query for `user`, whose visible board
    /// set has already been cleared into `board_ids`.
    pub fn for_user(
        self,
        params: &CardsForUserParams,
        user: &UserId,
        board_ids: Vec<BoardId>,
    ) -> Self {
        let builder = self
            .board_ids(board_ids)
            .lists(params.lists.clone())
            .labels(params.labels.clone(), params.label_mode)
            .since(params.since);
        if params.kind == CardsForUserType::MyCards {
            builder.assigned_to(user.clone())
        } else {
            builder
        }
    }

    pub fn build(self) -> Pipeline {
        let mut stages = Vec::new();
        if let Some(ids) = self.board_ids {
            stages.push(Stage::BoardFilter(ids));
        }
        stages.push(Stage::Domain(self.domain));
        if let Some(sirets) = self.sirets {
            stages.push(Stage::SiretFilter(sirets));
        }
        if let Some(lists) = self.lists {
            stages.push(Stage::ListFilter(lists));
        }
        if let Some(user) = self.assignee {
            stages.push(Stage::AssigneeFilter(user));
        }
        if let Some((names, mode)) = self.labels {
            stages.push(Stage::LabelFilter { names, mode });
        }
        if let Some(since) = self.since {
            stages.push(Stage::SinceFilter(since));
        }
        Pipeline { stages }
    }
}

/// Label condition of one board: for each requested name present on the
/// board, the board-local ids carrying it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardLabelCondition {
    pub board_id: BoardId,
    pub groups: Vec<Vec<LabelId>>,
}

/// Resolve label names against each board of the snapshot. Boards carrying
/// none of the names are left out and so contribute no card.
pub fn label_plan(names: &[String], snapshot: &ConfigSnapshot) -> Vec<BoardLabelCondition> {
    snapshot
        .boards
        .values()
        .filter_map(|board| {
            let groups: Vec<Vec<LabelId>> = names
                .iter()
                .map(|name| board.label_ids_for_names(std::slice::from_ref(name)))
                .filter(|ids| !ids.is_empty())
                .collect();
            if groups.is_empty() {
                None
            } else {
                Some(BoardLabelCondition {
                    board_id: board.id.clone(),
                    groups,
                })
            }
        })
        .collect()
}
