//! SQLite rendition of the board system's collections.
//!
//! Array and sub-document fields are JSON text columns queried through
//! SQLite's JSON1 functions. Timestamps are RFC 3339 UTC strings with fixed
//! millisecond precision so lexical and chronological order agree.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{CardPatch, DocumentStore};
use crate::db::push_in_list;
use crate::errors::{AppError, QueryContext};
use crate::models::{
    Board, BoardId, CardId, CardWithComments, Comment, ConfigSnapshot, CustomField, Label,
    LabelMode, List, Member, StoreCard, Swimlane, Topology, User, SIRET_FIELD,
};
use crate::pipeline::{label_plan, Pipeline, Stage};
use crate::snapshot::TopologySource;

/// Chunk size for `IN` lists on comment lookups.
const COMMENT_BATCH: usize = 500;

const CARD_COLUMNS: &str = "c.id, c.board_id, c.list_id, c.swimlane_id, c.title, c.description, \
     c.user_id, c.assignees, c.members, c.label_ids, c.custom_fields, c.created_at, c.start_at, \
     c.end_at, c.date_last_activity, c.archived, c.sort";

/// Canonical text form of a stored timestamp.
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("invalid timestamp {:?}: {}", value, e)))
}

/// Board store backed by a SQLite file.
#[derive(Clone)]
pub struct SqliteBoardStore {
    pool: SqlitePool,
}

impl SqliteBoardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the store at `path`, creating its tables when missing.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let pool = crate::db::connect(path).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn attach_comments(
        &self,
        cards: Vec<StoreCard>,
    ) -> Result<Vec<CardWithComments>, AppError> {
        let mut by_card: HashMap<CardId, Vec<Comment>> = HashMap::new();
        for chunk in cards.chunks(COMMENT_BATCH) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT id, card_id, user_id, text, created_at, modified_at FROM card_comments WHERE ",
            );
            push_in_list(&mut qb, "card_id", chunk.iter().map(|c| c.id.to_string()));
            qb.push(" ORDER BY created_at, id");

            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .query("select_comments")?;
            for row in &rows {
                let comment = comment_from_row(row)?;
                by_card
                    .entry(comment.card_id.clone())
                    .or_default()
                    .push(comment);
            }
        }

        Ok(cards
            .into_iter()
            .map(|card| {
                let comments = by_card.remove(&card.id).unwrap_or_default();
                CardWithComments { card, comments }
            })
            .collect())
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS boards (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS board_members (
            board_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (board_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS board_labels (
            board_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (board_id, id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lists (
            id TEXT PRIMARY KEY,
            board_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sort REAL NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS swimlanes (
            id TEXT PRIMARY KEY,
            board_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sort REAL NOT NULL DEFAULT 0,
            archived INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS custom_fields (
            id TEXT PRIMARY KEY,
            board_id TEXT NOT NULL,
            name TEXT NOT NULL,
            dropdown_items TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            board_id TEXT NOT NULL,
            list_id TEXT NOT NULL,
            swimlane_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            user_id TEXT NOT NULL,
            assignees TEXT NOT NULL DEFAULT '[]',
            members TEXT NOT NULL DEFAULT '[]',
            label_ids TEXT NOT NULL DEFAULT '[]',
            custom_fields TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            start_at TEXT,
            end_at TEXT,
            date_last_activity TEXT NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0,
            sort REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS card_comments (
            id TEXT PRIMARY KEY,
            card_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cards_board ON cards(board_id);
        CREATE INDEX IF NOT EXISTS idx_comments_card ON card_comments(card_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append the SQL condition for one pipeline stage.
fn push_stage(qb: &mut QueryBuilder<'_, Sqlite>, stage: &Stage, snapshot: &ConfigSnapshot) {
    match stage {
        Stage::BoardFilter(ids) => {
            push_in_list(qb, "c.board_id", ids.iter().map(|id| id.to_string()));
        }
        Stage::Domain(domain) => {
            push_in_list(
                qb,
                "c.board_id",
                domain.board_ids(snapshot).into_iter().map(|id| id.0),
            );
        }
        Stage::SiretFilter(sirets) => {
            qb.push(
                "EXISTS (SELECT 1 FROM json_each(c.custom_fields) v \
                 JOIN custom_fields f ON f.id = json_extract(v.value, '$._id') \
                 WHERE f.name = ",
            )
            .push_bind(SIRET_FIELD)
            .push(" AND ");
            push_in_list(
                qb,
                "json_extract(v.value, '$.value')",
                sirets.iter().map(|s| s.to_string()),
            );
            qb.push(")");
        }
        Stage::ListFilter(titles) => {
            qb.push("c.list_id IN (SELECT l.id FROM lists l WHERE ");
            push_in_list(qb, "l.title", titles.iter().cloned());
            qb.push(")");
        }
        Stage::AssigneeFilter(user) => {
            qb.push("(EXISTS (SELECT 1 FROM json_each(c.members) WHERE value = ")
                .push_bind(user.to_string())
                .push(") OR EXISTS (SELECT 1 FROM json_each(c.assignees) WHERE value = ")
                .push_bind(user.to_string())
                .push("))");
        }
        Stage::LabelFilter { names, mode } => {
            let plan = label_plan(names, snapshot);
            if plan.is_empty() {
                qb.push("0");
                return;
            }
            let joiner = match mode {
                LabelMode::And => " AND ",
                LabelMode::Or => " OR ",
            };
            qb.push("(");
            for (i, board) in plan.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(c.board_id = ")
                    .push_bind(board.board_id.to_string())
                    .push(" AND (");
                for (j, group) in board.groups.iter().enumerate() {
                    if j > 0 {
                        qb.push(joiner);
                    }
                    qb.push("EXISTS (SELECT 1 FROM json_each(c.label_ids) WHERE ");
                    push_in_list(qb, "value", group.iter().map(|id| id.to_string()));
                    qb.push(")");
                }
                qb.push("))");
            }
            qb.push(")");
        }
        Stage::SinceFilter(since) => {
            // comment activity is only read here, never selected
            qb.push(
                "MAX(c.date_last_activity, COALESCE(\
                 (SELECT MAX(cc.modified_at) FROM card_comments cc WHERE cc.card_id = c.id), \
                 c.date_last_activity)) >= ",
            )
            .push_bind(timestamp(since));
        }
    }
}

#[async_trait]
impl TopologySource for SqliteBoardStore {
    async fn fetch_topology(&self) -> Result<Topology, AppError> {
        // one read transaction so every collection comes from the same state
        let mut tx = self.pool.begin().await.query("fetch_topology")?;

        let mut boards: BTreeMap<BoardId, Board> =
            sqlx::query("SELECT id, title, slug FROM boards WHERE archived = 0")
                .fetch_all(&mut *tx)
                .await
                .query("fetch_boards")?
                .iter()
                .map(|row| {
                    let board = Board {
                        id: BoardId::new(row.get::<String, _>("id")),
                        title: row.get("title"),
                        slug: row.get("slug"),
                        lists: Vec::new(),
                        swimlanes: Vec::new(),
                        labels: Vec::new(),
                        members: Vec::new(),
                        custom_fields: Vec::new(),
                    };
                    (board.id.clone(), board)
                })
                .collect();

        let rows = sqlx::query(
            "SELECT board_id, user_id, is_active FROM board_members ORDER BY board_id, user_id",
        )
        .fetch_all(&mut *tx)
        .await
        .query("fetch_members")?;
        for row in &rows {
            if let Some(board) = board_of(&mut boards, row) {
                board.members.push(Member {
                    user_id: row.get::<String, _>("user_id").into(),
                    is_active: row.get::<i64, _>("is_active") != 0,
                });
            }
        }

        let rows = sqlx::query(
            "SELECT board_id, id, name, color FROM board_labels ORDER BY board_id, id",
        )
        .fetch_all(&mut *tx)
        .await
        .query("fetch_labels")?;
        for row in &rows {
            if let Some(board) = board_of(&mut boards, row) {
                board.labels.push(Label {
                    id: row.get::<String, _>("id").into(),
                    name: row.get("name"),
                    color: row.get("color"),
                });
            }
        }

        let rows = sqlx::query(
            "SELECT board_id, id, title, sort FROM lists WHERE archived = 0 ORDER BY board_id, sort, id",
        )
        .fetch_all(&mut *tx)
        .await
        .query("fetch_lists")?;
        for row in &rows {
            if let Some(board) = board_of(&mut boards, row) {
                board.lists.push(List {
                    id: row.get::<String, _>("id").into(),
                    title: row.get("title"),
                    sort: row.get("sort"),
                });
            }
        }

        let rows = sqlx::query(
            "SELECT board_id, id, title, sort FROM swimlanes WHERE archived = 0 ORDER BY board_id, sort, id",
        )
        .fetch_all(&mut *tx)
        .await
        .query("fetch_swimlanes")?;
        for row in &rows {
            if let Some(board) = board_of(&mut boards, row) {
                board.swimlanes.push(Swimlane {
                    id: row.get::<String, _>("id").into(),
                    title: row.get("title"),
                    sort: row.get("sort"),
                });
            }
        }

        let rows = sqlx::query(
            "SELECT board_id, id, name, dropdown_items FROM custom_fields ORDER BY board_id, id",
        )
        .fetch_all(&mut *tx)
        .await
        .query("fetch_custom_fields")?;
        for row in &rows {
            if let Some(board) = board_of(&mut boards, row) {
                board.custom_fields.push(CustomField {
                    id: row.get::<String, _>("id").into(),
                    name: row.get("name"),
                    dropdown_items: parse_json_array(row.get("dropdown_items")),
                });
            }
        }

        let users = sqlx::query("SELECT id, username, full_name FROM users ORDER BY id")
            .fetch_all(&mut *tx)
            .await
            .query("fetch_users")?
            .iter()
            .map(|row| User {
                id: row.get::<String, _>("id").into(),
                username: row.get::<String, _>("username").into(),
                full_name: row.get("full_name"),
            })
            .collect();

        tx.commit().await.query("fetch_topology")?;

        Ok(Topology {
            boards: boards.into_values().collect(),
            users,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteBoardStore {
    async fn select_cards(
        &self,
        pipeline: &Pipeline,
        snapshot: &ConfigSnapshot,
    ) -> Result<Vec<CardWithComments>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM cards c WHERE 1 = 1",
            CARD_COLUMNS
        ));
        for stage in pipeline.stages() {
            qb.push(" AND ");
            push_stage(&mut qb, stage, snapshot);
        }
        qb.push(" ORDER BY c.board_id, c.sort, c.id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .query("select_cards")?;
        let cards = rows
            .iter()
            .map(card_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        self.attach_comments(cards).await
    }

    async fn get_card(&self, id: &CardId) -> Result<Option<CardWithComments>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM cards c WHERE c.id = ?", CARD_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .query("get_card")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let card = card_from_row(&row)?;
        Ok(self.attach_comments(vec![card]).await?.pop())
    }

    async fn insert_card(&self, card: &StoreCard) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO cards (id, board_id, list_id, swimlane_id, title, description, user_id, \
             assignees, members, label_ids, custom_fields, created_at, start_at, end_at, \
             date_last_activity, archived, sort) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(card.id.as_str())
        .bind(card.board_id.as_str())
        .bind(card.list_id.as_str())
        .bind(card.swimlane_id.as_str())
        .bind(&card.title)
        .bind(&card.description)
        .bind(card.user_id.as_str())
        .bind(serde_json::to_string(&card.assignees)?)
        .bind(serde_json::to_string(&card.members)?)
        .bind(serde_json::to_string(&card.label_ids)?)
        .bind(serde_json::to_string(&card.custom_fields)?)
        .bind(timestamp(&card.created_at))
        .bind(card.start_at.as_ref().map(timestamp))
        .bind(card.end_at.as_ref().map(timestamp))
        .bind(timestamp(&card.date_last_activity))
        .bind(card.archived as i32)
        .bind(card.sort)
        .execute(&self.pool)
        .await
        .query("insert_card")?;

        Ok(())
    }

    async fn update_card(&self, id: &CardId, patch: &CardPatch) -> Result<bool, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE cards SET date_last_activity = ");
        qb.push_bind(timestamp(&Utc::now()));

        if let Some(description) = &patch.description {
            qb.push(", description = ").push_bind(description.clone());
        }
        if let Some(user) = &patch.add_member {
            qb.push(
                ", members = CASE WHEN EXISTS \
                 (SELECT 1 FROM json_each(cards.members) WHERE value = ",
            )
            .push_bind(user.to_string())
            .push(") THEN cards.members ELSE json_insert(cards.members, '$[#]', ")
            .push_bind(user.to_string())
            .push(") END");
        }
        if let Some(user) = &patch.remove_member {
            qb.push(
                ", members = (SELECT json_group_array(value) \
                 FROM json_each(cards.members) WHERE value != ",
            )
            .push_bind(user.to_string())
            .push(")");
        }
        if let Some(list_id) = &patch.list_id {
            qb.push(", list_id = ").push_bind(list_id.to_string());
        }
        match &patch.end_at {
            Some(Some(end_at)) => {
                qb.push(", end_at = ").push_bind(timestamp(end_at));
            }
            Some(None) => {
                qb.push(", end_at = NULL");
            }
            None => {}
        }
        if let Some(archived) = patch.archived {
            qb.push(", archived = ").push_bind(archived as i32);
        }
        qb.push(" WHERE id = ").push_bind(id.to_string());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .query("update_card")?;

        Ok(result.rows_affected() > 0)
    }
}

// ==================== ROW HELPERS ====================

fn board_of<'a>(boards: &'a mut BTreeMap<BoardId, Board>, row: &SqliteRow) -> Option<&'a mut Board> {
    boards.get_mut(&BoardId::new(row.get::<String, _>("board_id")))
}

/// Parse a JSON array column, treating malformed content as empty.
fn parse_json_array<T: DeserializeOwned>(json: Option<String>) -> Vec<T> {
    json.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn card_from_row(row: &SqliteRow) -> Result<StoreCard, AppError> {
    let optional_timestamp = |column: &str| -> Result<Option<DateTime<Utc>>, AppError> {
        row.get::<Option<String>, _>(column)
            .map(|s| parse_timestamp(&s))
            .transpose()
    };

    Ok(StoreCard {
        id: row.get::<String, _>("id").into(),
        board_id: row.get::<String, _>("board_id").into(),
        list_id: row.get::<String, _>("list_id").into(),
        swimlane_id: row.get::<String, _>("swimlane_id").into(),
        title: row.get("title"),
        description: row.get("description"),
        user_id: row.get::<String, _>("user_id").into(),
        assignees: parse_json_array(row.get("assignees")),
        members: parse_json_array(row.get("members")),
        label_ids: parse_json_array(row.get("label_ids")),
        custom_fields: parse_json_array(row.get("custom_fields")),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        start_at: optional_timestamp("start_at")?,
        end_at: optional_timestamp("end_at")?,
        date_last_activity: parse_timestamp(&row.get::<String, _>("date_last_activity"))?,
        archived: row.get::<i64, _>("archived") != 0,
        sort: row.get("sort"),
    })
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment, AppError> {
    Ok(Comment {
        id: row.get("id"),
        card_id: row.get::<String, _>("card_id").into(),
        user_id: row.get::<String, _>("user_id").into(),
        text: row.get("text"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        modified_at: parse_timestamp(&row.get::<String, _>("modified_at"))?,
    })
}
