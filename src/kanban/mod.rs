//! Board integration service.
//!
//! Callers read the snapshot once per request through [`KanbanService::current`]
//! and pass it to every operation, so authorization and the response revision
//! come from the same published topology.

mod mutations;
mod queries;

use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{ConfigSnapshot, Referentiel, User, Username};
use crate::pipeline::BoardDomain;
use crate::projector::CardProjector;
use crate::snapshot::SnapshotProvider;
use crate::store::DocumentStore;
use crate::db::SummaryStore;

/// Row cap of the summary query behind card-centric follow lists.
pub const FOLLOWS_LIMIT: i64 = 100;

/// List a card moves to when someone joins it.
pub const LIST_IN_PROGRESS: &str = "Accompagnement en cours";
/// List a card moves to when its last participant leaves.
pub const LIST_DONE: &str = "Accompagnement terminé";

pub struct KanbanService {
    snapshot: Arc<dyn SnapshotProvider>,
    boards: Arc<dyn DocumentStore>,
    summaries: Arc<dyn SummaryStore>,
    referentiel: Arc<Referentiel>,
    domain: BoardDomain,
    projector: CardProjector,
    web_base_url: String,
}

impl KanbanService {
    pub fn new(
        snapshot: Arc<dyn SnapshotProvider>,
        boards: Arc<dyn DocumentStore>,
        summaries: Arc<dyn SummaryStore>,
        referentiel: Arc<Referentiel>,
        domain: BoardDomain,
        projector: CardProjector,
        web_base_url: impl Into<String>,
    ) -> Self {
        Self {
            snapshot,
            boards,
            summaries,
            referentiel,
            domain,
            projector,
            web_base_url: web_base_url.into(),
        }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.current()
    }

    pub fn get_user(&self, snapshot: &ConfigSnapshot, username: &Username) -> Option<User> {
        snapshot.user_by_username(username).cloned()
    }
}

/// Board account of `username`, required by every write.
fn require_user<'a>(snapshot: &'a ConfigSnapshot, username: &Username) -> Result<&'a User, AppError> {
    snapshot
        .user_by_username(username)
        .ok_or_else(|| AppError::forbidden("user has no board account"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BoardId, CardId, CardsForUserParams, CardsForUserType, MoveCardParams, NewCardParams,
        SwimlaneId, UserId,
    };
    use crate::snapshot::{FixedSnapshot, SharedSnapshot};
    use crate::store::DocumentStore;
    use crate::testing::{
        card_fixture, domain, referentiel, siret, topology, AppFixture, BoardFixture,
    };

    struct Harness {
        service: KanbanService,
        boards: BoardFixture,
        app: AppFixture,
    }

    impl Harness {
        async fn new() -> Self {
            let boards = BoardFixture::new().await;
            let snapshot = Arc::new(FixedSnapshot::new(boards.snapshot.clone()));
            Self::with_snapshot(boards, snapshot).await
        }

        async fn with_snapshot(boards: BoardFixture, snapshot: Arc<dyn SnapshotProvider>) -> Self {
            let app = AppFixture::new().await;
            let service = KanbanService::new(
                snapshot,
                Arc::new(boards.store.clone()),
                Arc::new(app.repo.clone()),
                Arc::new(referentiel()),
                domain(),
                CardProjector::new("https://kanban.example/"),
                "https://app.example/",
            );
            Self {
                service,
                boards,
                app,
            }
        }

        fn snapshot(&self) -> Arc<ConfigSnapshot> {
            self.service.current()
        }

        async fn stored(&self, id: &str) -> crate::models::StoreCard {
            self.boards
                .store
                .get_card(&CardId::from(id))
                .await
                .unwrap()
                .unwrap()
                .card
        }
    }

    fn user(name: &str) -> Username {
        Username::from(name)
    }

    fn roles(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn new_card(code: &str, swimlane: Option<&str>) -> NewCardParams {
        NewCardParams {
            siret: siret(code),
            swimlane_id: swimlane.map(SwimlaneId::from),
            description: "Créée depuis la fiche".to_string(),
            labels: vec!["urgent".to_string()],
        }
    }

    #[tokio::test]
    async fn test_cards_from_siret_are_redacted_per_board() {
        let h = Harness::new().await;
        let code = siret("11111111100011");
        let snapshot = h.snapshot();

        let bob = h.service.select_cards_from_siret(&snapshot, &code, &user("bob")).await.unwrap();
        assert_eq!(bob.len(), 2);
        assert!(bob.iter().all(|c| c.user_is_board_member));

        let carol = h.service.select_cards_from_siret(&snapshot, &code, &user("carol")).await.unwrap();
        assert_eq!(carol.len(), 2);
        assert!(carol.iter().all(|c| c.is_redacted()));

        let alice = h.service.select_cards_from_siret(&snapshot, &code, &user("alice")).await.unwrap();
        let visible: Vec<_> = alice.iter().filter(|c| !c.is_redacted()).collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].board_title, "CRP Paris");
    }

    #[tokio::test]
    async fn test_sirets_and_board_ids_only_search_visible_boards() {
        let h = Harness::new().await;
        let codes = vec![siret("11111111100011"), siret("33333333300033")];

        let bob_b2 = h
            .service
            .select_cards_from_sirets_and_board_ids(
                &h.snapshot(),
                &codes,
                &[BoardId::from("b2")],
                &user("bob"),
            )
            .await
            .unwrap();
        let mut ids: Vec<_> = bob_b2.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["c3", "c5"]);

        let alice_b2 = h
            .service
            .select_cards_from_sirets_and_board_ids(
                &h.snapshot(),
                &codes,
                &[BoardId::from("b2")],
                &user("alice"),
            )
            .await
            .unwrap();
        assert!(alice_b2.is_empty());
    }

    #[tokio::test]
    async fn test_card_by_id_distinguishes_forbidden_from_unknown() {
        let h = Harness::new().await;

        let card = h
            .service
            .select_card_from_card_id(&h.snapshot(), &CardId::from("c3"), &user("bob"))
            .await
            .unwrap();
        assert_eq!(card.url.as_deref(), Some("https://kanban.example/b/b2/tableau-crp-idf/c3"));

        let forbidden = h
            .service
            .select_card_from_card_id(&h.snapshot(), &CardId::from("c1"), &user("carol"))
            .await
            .unwrap_err();
        assert!(matches!(forbidden, AppError::Forbidden { .. }));

        let unknown = h
            .service
            .select_card_from_card_id(&h.snapshot(), &CardId::from("nope"), &user("carol"))
            .await
            .unwrap_err();
        assert!(matches!(unknown, AppError::UnknownCard(_)));
    }

    #[tokio::test]
    async fn test_my_cards_backfills_follows() {
        let h = Harness::new().await;
        let params = CardsForUserParams {
            kind: CardsForUserType::MyCards,
            ..Default::default()
        };

        let summaries = h
            .service
            .select_follows_for_user(&h.snapshot(), &params, &user("bob"), &roles(&["75", "21"]))
            .await
            .unwrap();
        assert_eq!(summaries.count, 2);
        assert!(summaries.summaries.iter().all(|s| s.followed));

        let acme = summaries
            .summaries
            .iter()
            .find(|s| s.siret == siret("11111111100011"))
            .unwrap();
        let card_ids: Vec<_> = acme.cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(card_ids, vec!["c3"]);

        // all-cards never writes follows
        let before = h
            .service
            .select_follows_for_user(
                &h.snapshot(),
                &CardsForUserParams::default(),
                &user("alice"),
                &roles(&["75", "21"]),
            )
            .await
            .unwrap();
        assert!(before.summaries.iter().any(|s| !s.followed));
    }

    #[tokio::test]
    async fn test_no_card_lists_followed_establishments_without_cards() {
        let h = Harness::new().await;
        let params = CardsForUserParams {
            kind: CardsForUserType::NoCard,
            ..Default::default()
        };

        let summaries = h
            .service
            .select_follows_for_user(
                &h.snapshot(),
                &params,
                &user("alice"),
                &roles(&["75", "21", "92"]),
            )
            .await
            .unwrap();
        let codes: Vec<_> = summaries.summaries.iter().map(|s| s.siret.as_str()).collect();
        assert_eq!(codes, vec!["33333333300033", "44444444400044"]);
        assert!(summaries.summaries.iter().all(|s| s.cards.is_empty()));
    }

    #[tokio::test]
    async fn test_follow_filters_narrow_the_card_set() {
        let h = Harness::new().await;
        let params = CardsForUserParams {
            lists: vec!["Accompagnement en cours".to_string()],
            ..Default::default()
        };
        let summaries = h
            .service
            .select_follows_for_user(&h.snapshot(), &params, &user("bob"), &roles(&["75", "21"]))
            .await
            .unwrap();
        let codes: Vec<_> = summaries.summaries.iter().map(|s| s.siret.as_str()).collect();
        assert_eq!(codes, vec!["22222222200022"]);

        let params = CardsForUserParams {
            raison_sociale: Some("ACME".to_string()),
            ..Default::default()
        };
        let summaries = h
            .service
            .select_follows_for_user(&h.snapshot(), &params, &user("bob"), &roles(&["75", "21"]))
            .await
            .unwrap();
        assert_eq!(summaries.count, 1);
        assert_eq!(summaries.summaries[0].cards.len(), 2);
    }

    #[tokio::test]
    async fn test_export_follows_split_and_visibility() {
        let h = Harness::new().await;
        let params = CardsForUserParams::default();

        let bob = h
            .service
            .export_follows_for_user(&h.snapshot(), &params, &user("bob"), &roles(&["75", "21"]))
            .await
            .unwrap();
        assert_eq!(bob.exports.len(), 3);
        assert_eq!(bob.cards_without_record.len(), 1);
        assert_eq!(bob.cards_without_record[0].siret, "33333333300033");
        assert!(bob.cards_without_record[0].archived);

        let carol = h
            .service
            .export_follows_for_user(
                &h.snapshot(),
                &params,
                &user("carol"),
                &roles(&["75", "21", "92"]),
            )
            .await
            .unwrap();
        assert!(carol.exports.is_empty());
        assert!(carol.cards_without_record.is_empty());
    }

    #[tokio::test]
    async fn test_no_card_summaries_and_exports_exclude_the_same_cards() {
        let h = Harness::new().await;
        let scope = roles(&["75", "21", "92"]);
        let unfiltered = CardsForUserParams {
            kind: CardsForUserType::NoCard,
            ..Default::default()
        };
        let no_label_matches = CardsForUserParams {
            kind: CardsForUserType::NoCard,
            labels: vec!["absent".to_string()],
            ..Default::default()
        };

        // 33333333300033 only has cards on boards alice cannot see
        let cases = [
            (unfiltered, vec!["33333333300033", "44444444400044"]),
            (
                no_label_matches,
                vec!["11111111100011", "33333333300033", "44444444400044"],
            ),
        ];
        for (params, expected) in cases {
            let summaries = h
                .service
                .select_follows_for_user(&h.snapshot(), &params, &user("alice"), &scope)
                .await
                .unwrap();
            let exports = h
                .service
                .export_follows_for_user(&h.snapshot(), &params, &user("alice"), &scope)
                .await
                .unwrap();

            let summary_codes: Vec<_> =
                summaries.summaries.iter().map(|s| s.siret.as_str()).collect();
            let export_codes: Vec<_> = exports.exports.iter().map(|e| e.siret.as_str()).collect();
            assert_eq!(summary_codes, expected);
            assert_eq!(export_codes, expected);
            assert!(exports.exports.iter().all(|e| e.date_debut_suivi == "n/c"));
        }
    }

    #[tokio::test]
    async fn test_capped_follow_list_reports_the_full_count() {
        let h = Harness::new().await;
        for i in 0..150 {
            let code = format!("5{:013}", i);
            sqlx::query(
                "INSERT INTO etablissements (siret, siren, raison_sociale, code_departement, siege) \
                 VALUES (?, ?, ?, '75', 1)",
            )
            .bind(&code)
            .bind(&code[..9])
            .bind(format!("Lot {:03}", i))
            .execute(h.app.repo.pool())
            .await
            .unwrap();

            let mut card = card_fixture("c1").card;
            card.id = CardId::new(format!("bulk-{}", i));
            card.custom_fields[0].value = Some(code);
            h.boards.store.insert_card(&card).await.unwrap();
        }

        let page = h
            .service
            .select_follows_for_user(
                &h.snapshot(),
                &CardsForUserParams::default(),
                &user("bob"),
                &roles(&["75", "21", "92"]),
            )
            .await
            .unwrap();
        assert_eq!(page.summaries.len(), FOLLOWS_LIMIT as usize);
        // 150 new codes plus the three bob already sees
        assert_eq!(page.count, 153);
    }

    #[tokio::test]
    async fn test_exports_with_siret_redact_non_members() {
        let h = Harness::new().await;
        let code = siret("11111111100011");

        let carol = h
            .service
            .select_exports_with_siret(&h.snapshot(), &code, &user("carol"), &roles(&["75"]))
            .await
            .unwrap();
        assert_eq!(carol.exports.len(), 2);
        assert!(carol
            .exports
            .iter()
            .all(|e| e.labels.is_empty() && e.description_wekan.is_empty()));

        let bob = h
            .service
            .select_exports_with_siret(&h.snapshot(), &code, &user("bob"), &roles(&["75"]))
            .await
            .unwrap();
        assert!(bob.exports.iter().all(|e| !e.labels.is_empty()));

        let bare = h
            .service
            .select_exports_with_siret(
                &h.snapshot(),
                &siret("44444444400044"),
                &user("bob"),
                &roles(&["75"]),
            )
            .await
            .unwrap();
        assert_eq!(bare.exports.len(), 1);
        assert_eq!(bare.exports[0].raison_sociale, "Paris Deux");
        assert!(bare.exports[0].board.is_empty());
    }

    #[tokio::test]
    async fn test_create_card_fills_fields_from_establishment() {
        let h = Harness::new().await;
        let card = h
            .service
            .create_card(&h.snapshot(), &new_card("11111111100011", None), &user("alice"))
            .await
            .unwrap();
        assert!(card.user_is_board_member);
        assert_eq!(card.board_title, "CRP Paris");
        assert_eq!(card.list_title, "À définir");
        assert_eq!(card.siret, Some(siret("11111111100011")));

        let stored = h.stored(card.id.as_str()).await;
        assert_eq!(stored.swimlane_id, SwimlaneId::from("s1-75"));
        assert_eq!(stored.title, "ACME Paris");
        assert_eq!(stored.members, vec![UserId::from("u-alice")]);
        assert_eq!(stored.assignees, vec![UserId::from("u-alice")]);
        assert_eq!(stored.label_ids, vec![crate::models::LabelId::from("x1-urgent")]);
        assert!(stored.start_at.is_some());

        let value = |field: &str| {
            stored
                .custom_fields
                .iter()
                .find(|v| v.id.as_str() == field)
                .and_then(|v| v.value.clone())
        };
        assert_eq!(value("cf1-siret").as_deref(), Some("11111111100011"));
        assert_eq!(
            value("cf1-activite").as_deref(),
            Some("Fabrication de structures métalliques (2511Z)")
        );
        assert_eq!(value("cf1-effectif").as_deref(), Some("eff-20-50"));
        assert_eq!(value("cf1-contact").as_deref(), Some(""));
        assert_eq!(
            value("cf1-fiche").as_deref(),
            Some("https://app.example/ets/11111111100011")
        );
    }

    #[tokio::test]
    async fn test_create_card_with_explicit_region_swimlane() {
        let h = Harness::new().await;
        let card = h
            .service
            .create_card(&h.snapshot(), &new_card("11111111100011", Some("s2-idf")), &user("bob"))
            .await
            .unwrap();
        assert_eq!(card.board_id, Some(BoardId::from("b2")));
        assert_eq!(card.swimlane_id, Some(SwimlaneId::from("s2-idf")));
    }

    #[tokio::test]
    async fn test_create_card_zone_and_membership_checks() {
        let h = Harness::new().await;
        let create = |code: &'static str, swimlane: Option<&'static str>, who: &'static str| {
            let service = &h.service;
            async move {
                service
                    .create_card(&service.current(), &new_card(code, swimlane), &user(who))
                    .await
            }
        };

        // alice has no swimlane covering 21
        let err = create("22222222200022", None, "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        // s2-75 sits on a board alice is not a member of
        let err = create("11111111100011", Some("s2-75"), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        // s1-misc is not a zone swimlane
        let err = create("11111111100011", Some("s1-misc"), "alice").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        // carol's only board is outside the business domain
        let err = create("11111111100011", None, "carol").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));

        let err = create("11111111100011", Some("nope"), "bob").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownBoard(_)));

        let err = create("99999999900099", None, "bob").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create("11111111100011", None, "mallory").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_mutations_use_the_latest_snapshot() {
        let boards = BoardFixture::new().await;
        let shared = Arc::new(SharedSnapshot::new());
        shared.publish(topology());
        let h = Harness::with_snapshot(boards, shared.clone()).await;
        let c1 = CardId::from("c1");

        h.service
            .update_card(&h.snapshot(), &c1, "Nouvelle description".to_string(), &user("bob"))
            .await
            .unwrap();
        assert_eq!(h.stored("c1").await.description, "Nouvelle description");

        let mut revoked = topology();
        revoked.boards[0].members.retain(|m| m.user_id.as_str() != "u-bob");
        assert!(shared.publish(revoked));

        let err = h
            .service
            .update_card(&h.snapshot(), &c1, "Refusée".to_string(), &user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        assert_eq!(h.stored("c1").await.description, "Nouvelle description");
    }

    #[tokio::test]
    async fn test_join_and_part_move_between_campaign_lists() {
        let h = Harness::new().await;
        let c1 = CardId::from("c1");

        h.service.join_card(&h.snapshot(), &c1, &user("bob")).await.unwrap();
        let card = h.stored("c1").await;
        assert_eq!(card.list_id.as_str(), "l1-cours");
        assert_eq!(card.members, vec![UserId::from("u-alice"), UserId::from("u-bob")]);
        assert!(card.end_at.is_none());

        h.service.part_card(&h.snapshot(), &c1, &user("alice")).await.unwrap();
        let card = h.stored("c1").await;
        assert_eq!(card.list_id.as_str(), "l1-cours");
        assert!(card.end_at.is_none());

        h.service.part_card(&h.snapshot(), &c1, &user("bob")).await.unwrap();
        let card = h.stored("c1").await;
        assert!(card.members.is_empty());
        assert_eq!(card.list_id.as_str(), "l1-fin");
        assert!(card.end_at.is_some());

        // c2 keeps its assignee, so parting does not close it
        h.service.join_card(&h.snapshot(), &CardId::from("c2"), &user("alice")).await.unwrap();
        h.service.part_card(&h.snapshot(), &CardId::from("c2"), &user("alice")).await.unwrap();
        assert_eq!(h.stored("c2").await.list_id.as_str(), "l1-cours");

        let err = h.service.join_card(&h.snapshot(), &c1, &user("carol")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
        let err = h
            .service
            .join_card(&h.snapshot(), &CardId::from("nope"), &user("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownCard(_)));
    }

    #[tokio::test]
    async fn test_move_and_archive() {
        let h = Harness::new().await;
        let c3 = CardId::from("c3");
        let c1 = CardId::from("c1");

        let by_title = MoveCardParams {
            list_title: Some("Accompagnement terminé".to_string()),
            ..Default::default()
        };
        h.service.move_card_list(&h.snapshot(), &c1, &by_title, &user("alice")).await.unwrap();
        assert_eq!(h.stored("c1").await.list_id.as_str(), "l1-fin");

        let other_board = MoveCardParams {
            list_id: Some("l2-todo".into()),
            ..Default::default()
        };
        let err = h
            .service
            .move_card_list(&h.snapshot(), &c1, &other_board, &user("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownList(_)));

        let err = h
            .service
            .move_card_list(&h.snapshot(), &c1, &MoveCardParams::default(), &user("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        h.service.archive_card(&h.snapshot(), &c3, &user("bob")).await.unwrap();
        assert!(h.stored("c3").await.archived);
        h.service.unarchive_card(&h.snapshot(), &c3, &user("bob")).await.unwrap();
        assert!(!h.stored("c3").await.archived);

        let err = h.service.archive_card(&h.snapshot(), &c3, &user("alice")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_clear_board_ids_and_config() {
        let h = Harness::new().await;
        let requested = [BoardId::from("b1"), BoardId::from("b3")];
        assert_eq!(
            h.service.clear_board_ids(&h.snapshot(), &requested, &user("carol")),
            vec![BoardId::from("b3")]
        );
        assert!(h.service.clear_board_ids(&h.snapshot(), &requested, &user("mallory")).is_empty());

        let config = h.service.load_config_for_user(&h.snapshot(), &user("bob"));
        assert_eq!(config.boards.len(), 2);
        let bob = h.service.get_user(&h.snapshot(), &user("bob"));
        assert_eq!(bob.map(|u| u.id), Some(UserId::from("u-bob")));
        assert_eq!(h.snapshot().generation, 1);
    }
}
