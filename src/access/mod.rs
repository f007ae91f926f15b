//! Per-user views of the board snapshot.
//!
//! Pure functions of an explicit snapshot: visibility comes from active board
//! membership and nothing else.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    Board, BoardId, BoardSwimlane, ConfigSnapshot, KanbanBoard, KanbanBoardMember, KanbanConfig,
    KanbanLabel, KanbanList, KanbanSwimlane, KanbanUser, Referentiel, UserId, Username, ZoneIndex,
};

/// Boards where `user` is an active member.
pub fn boards_for<'a>(
    snapshot: &'a ConfigSnapshot,
    user: &'a UserId,
) -> impl Iterator<Item = &'a Board> + 'a {
    snapshot
        .boards
        .values()
        .filter(move |b| b.is_active_member(user))
}

pub fn visible_board_ids(snapshot: &ConfigSnapshot, user: &UserId) -> BTreeSet<BoardId> {
    boards_for(snapshot, user).map(|b| b.id.clone()).collect()
}

/// Intersect a requested board filter with the user's visible boards.
///
/// An empty request means every visible board. Ids the user cannot see are
/// dropped without error.
pub fn clear_board_ids(
    requested: &[BoardId],
    snapshot: &ConfigSnapshot,
    user: &UserId,
) -> Vec<BoardId> {
    let visible = visible_board_ids(snapshot, user);
    if requested.is_empty() {
        return visible.into_iter().collect();
    }
    let mut cleared: Vec<BoardId> = requested
        .iter()
        .filter(|id| visible.contains(*id))
        .cloned()
        .collect();
    cleared.sort();
    cleared.dedup();
    cleared
}

/// Zone name of a swimlane title: the part before the first `" ("`.
pub fn parse_swimlane_title(title: &str) -> &str {
    let mut parts = title.split(" (");
    let zone = parts.next().unwrap_or_default().trim();
    if parts.count() > 1 {
        tracing::warn!(title, "Swimlane title has more than one parenthesis group");
    }
    zone
}

/// Map every zone code to the swimlanes of `boards` that cover it.
///
/// A swimlane named after a department lands under that code; one named
/// after a region lands under each of the region's departments.
pub fn zone_index<'a>(
    boards: impl IntoIterator<Item = &'a Board>,
    referentiel: &Referentiel,
) -> ZoneIndex {
    let mut index = ZoneIndex::new();
    for board in boards {
        let mut swimlanes: Vec<_> = board.swimlanes.iter().collect();
        swimlanes.sort_by(|a, b| a.sort.total_cmp(&b.sort));
        for swimlane in swimlanes {
            let zone = parse_swimlane_title(&swimlane.title);
            for code in referentiel.zone_departements(zone) {
                index.entry(code).or_default().push(BoardSwimlane {
                    board_id: board.id.clone(),
                    swimlane_id: swimlane.id.clone(),
                });
            }
        }
    }
    index
}

/// Board configuration restricted to what `username` can see.
pub fn config_for(
    snapshot: &ConfigSnapshot,
    username: &Username,
    referentiel: &Referentiel,
) -> KanbanConfig {
    let Some(user) = snapshot.user_by_username(username) else {
        return KanbanConfig::default();
    };

    let visible: Vec<&Board> = boards_for(snapshot, &user.id).collect();

    let mut users: BTreeMap<UserId, KanbanUser> = BTreeMap::new();
    for member in visible.iter().flat_map(|b| b.members.iter()) {
        let Some(u) = snapshot.user(&member.user_id) else {
            continue;
        };
        users
            .entry(u.id.clone())
            .and_modify(|ku| ku.active |= member.is_active)
            .or_insert_with(|| KanbanUser {
                username: u.username.clone(),
                full_name: u.full_name.clone(),
                active: member.is_active,
            });
    }

    KanbanConfig {
        user_id: Some(user.id.clone()),
        departements: zone_index(visible.iter().copied(), referentiel),
        boards: visible
            .iter()
            .map(|b| (b.id.clone(), kanban_board(b, snapshot)))
            .collect(),
        users,
    }
}

fn kanban_board(board: &Board, snapshot: &ConfigSnapshot) -> KanbanBoard {
    KanbanBoard {
        title: board.title.clone(),
        slug: board.slug.clone(),
        lists: board
            .lists
            .iter()
            .map(|l| {
                (
                    l.id.clone(),
                    KanbanList {
                        title: l.title.clone(),
                        sort: l.sort,
                    },
                )
            })
            .collect(),
        swimlanes: board
            .swimlanes
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    KanbanSwimlane {
                        title: s.title.clone(),
                        sort: s.sort,
                    },
                )
            })
            .collect(),
        labels: board
            .labels
            .iter()
            .map(|l| {
                (
                    l.id.clone(),
                    KanbanLabel {
                        name: l.name.clone(),
                        color: l.color.clone(),
                    },
                )
            })
            .collect(),
        members: board
            .members
            .iter()
            .filter_map(|m| {
                let user = snapshot.user(&m.user_id)?;
                Some((
                    m.user_id.clone(),
                    KanbanBoardMember {
                        username: user.username.clone(),
                        active: m.is_active,
                    },
                ))
            })
            .collect(),
    }
}
