//! Shared fixtures for module and integration tests.
//!
//! Three boards: two business-domain boards ("tableau-crp-*") and a personal
//! one. alice and bob are active on b1, carol only on b3 (and inactive on b1),
//! bob is also active on b2.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use crate::db::{self, Repository};
use crate::models::{
    Board, CardWithComments, Comment, ConfigSnapshot, CustomField, CustomFieldValue, DropdownItem,
    ExportRecord, Label, List, Member, Referentiel, Siret, StoreCard, Summary, Swimlane, Topology,
    User,
};
use crate::pipeline::BoardDomain;
use crate::snapshot::TopologySource;
use crate::store::{timestamp, DocumentStore, SqliteBoardStore};

pub const SLUG_DOMAIN: &str = "^tableau-crp.*";

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn siret(value: &str) -> Siret {
    Siret::parse(value).unwrap()
}

pub fn domain() -> BoardDomain {
    BoardDomain::new(SLUG_DOMAIN).unwrap()
}

pub fn referentiel() -> Referentiel {
    Referentiel::new(
        DEPARTEMENTS
            .iter()
            .map(|(c, l)| (c.to_string(), l.to_string()))
            .collect(),
        REGIONS
            .iter()
            .map(|(r, codes)| (r.to_string(), codes.iter().map(|c| c.to_string()).collect()))
            .collect::<BTreeMap<_, _>>(),
    )
}

const DEPARTEMENTS: [(&str, &str); 3] = [("21", "Côte-d'Or"), ("75", "Paris"), ("92", "Hauts-de-Seine")];
const REGIONS: [(&str, &[&str]); 2] = [
    ("Bourgogne-Franche-Comté", &["21"]),
    ("Île-de-France", &["75", "92"]),
];

// ==================== TOPOLOGY ====================

fn list(id: &str, title: &str, sort: f64) -> List {
    List {
        id: id.into(),
        title: title.to_string(),
        sort,
    }
}

fn swimlane(id: &str, title: &str, sort: f64) -> Swimlane {
    Swimlane {
        id: id.into(),
        title: title.to_string(),
        sort,
    }
}

fn label(id: &str, name: &str) -> Label {
    Label {
        id: id.into(),
        name: name.to_string(),
        color: "red".to_string(),
    }
}

fn member(user: &str, is_active: bool) -> Member {
    Member {
        user_id: user.into(),
        is_active,
    }
}

fn field(id: &str, name: &str) -> CustomField {
    CustomField {
        id: id.into(),
        name: name.to_string(),
        dropdown_items: Vec::new(),
    }
}

pub fn topology() -> Topology {
    let effectif = CustomField {
        dropdown_items: ["10-20", "20-50", "50-100", "100+"]
            .iter()
            .map(|name| DropdownItem {
                id: format!("eff-{}", name),
                name: name.to_string(),
            })
            .collect(),
        ..field("cf1-effectif", "Effectif")
    };

    let b1 = Board {
        id: "b1".into(),
        title: "CRP Paris".to_string(),
        slug: "tableau-crp-paris".to_string(),
        lists: vec![
            list("l1-todo", "À définir", 0.0),
            list("l1-cours", "Accompagnement en cours", 1.0),
            list("l1-fin", "Accompagnement terminé", 2.0),
        ],
        swimlanes: vec![swimlane("s1-75", "75 (x)", 0.0), swimlane("s1-misc", "Divers", 1.0)],
        labels: vec![label("x1-urgent", "urgent"), label("x1-ca", "ca")],
        members: vec![
            member("u-alice", true),
            member("u-bob", true),
            member("u-carol", false),
        ],
        custom_fields: vec![
            field("cf1-siret", "SIRET"),
            field("cf1-activite", "Activité"),
            effectif,
            field("cf1-contact", "Contact"),
            field("cf1-fiche", "Fiche Signaux Faibles"),
        ],
    };
    let b2 = Board {
        id: "b2".into(),
        title: "CRP IDF".to_string(),
        slug: "tableau-crp-idf".to_string(),
        lists: vec![list("l2-todo", "À définir", 0.0)],
        swimlanes: vec![
            swimlane("s2-75", "75 (y)", 0.0),
            swimlane("s2-idf", "Île-de-France (notes)", 1.0),
        ],
        labels: vec![label("x2-urgent", "urgent")],
        members: vec![member("u-bob", true)],
        custom_fields: vec![field("cf2-siret", "SIRET")],
    };
    let b3 = Board {
        id: "b3".into(),
        title: "Perso".to_string(),
        slug: "perso-board".to_string(),
        lists: vec![list("l3-todo", "À faire", 0.0)],
        swimlanes: vec![swimlane("s3-75", "75 (z)", 0.0)],
        labels: vec![label("x3-misc", "misc")],
        members: vec![member("u-carol", true)],
        custom_fields: vec![field("cf3-siret", "SIRET")],
    };

    Topology {
        boards: vec![b1, b2, b3],
        users: vec![
            user("u-alice", "alice", "Alice Martin"),
            user("u-bob", "bob", "Bob Durand"),
            user("u-carol", "carol", "Carol Petit"),
        ],
    }
}

fn user(id: &str, username: &str, full_name: &str) -> User {
    User {
        id: id.into(),
        username: username.into(),
        full_name: full_name.to_string(),
    }
}

pub fn snapshot_fixture() -> ConfigSnapshot {
    ConfigSnapshot::from_topology(topology(), 1, ts("2024-04-01T00:00:00Z"))
}

// ==================== CARDS ====================

struct CardSpec {
    id: &'static str,
    board: &'static str,
    list: &'static str,
    swimlane: &'static str,
    siret_field: &'static str,
    siret: &'static str,
    creator: &'static str,
    members: &'static [&'static str],
    assignees: &'static [&'static str],
    labels: &'static [&'static str],
    description: &'static str,
    created_at: &'static str,
    last_activity: &'static str,
    archived: bool,
}

const CARDS: [CardSpec; 5] = [
    CardSpec {
        id: "c1",
        board: "b1",
        list: "l1-todo",
        swimlane: "s1-75",
        siret_field: "cf1-siret",
        siret: "11111111100011",
        creator: "u-alice",
        members: &["u-alice"],
        assignees: &[],
        labels: &["x1-urgent", "x1-ca"],
        description: "Premier contact",
        created_at: "2024-01-01T00:00:00Z",
        last_activity: "2024-01-10T00:00:00Z",
        archived: false,
    },
    CardSpec {
        id: "c2",
        board: "b1",
        list: "l1-cours",
        swimlane: "s1-75",
        siret_field: "cf1-siret",
        siret: "22222222200022",
        creator: "u-alice",
        members: &[],
        assignees: &["u-bob"],
        labels: &["x1-urgent"],
        description: "Suivi fournisseur",
        created_at: "2024-01-03T00:00:00Z",
        last_activity: "2024-01-05T10:00:00Z",
        archived: false,
    },
    CardSpec {
        id: "c3",
        board: "b2",
        list: "l2-todo",
        swimlane: "s2-75",
        siret_field: "cf2-siret",
        siret: "11111111100011",
        creator: "u-bob",
        members: &["u-bob"],
        assignees: &[],
        labels: &["x2-urgent"],
        description: "Vu en réunion",
        created_at: "2024-01-20T00:00:00Z",
        last_activity: "2024-02-01T00:00:00Z",
        archived: false,
    },
    CardSpec {
        id: "c4",
        board: "b3",
        list: "l3-todo",
        swimlane: "s3-75",
        siret_field: "cf3-siret",
        siret: "33333333300033",
        creator: "u-carol",
        members: &["u-carol"],
        assignees: &[],
        labels: &["x3-misc"],
        description: "Note perso",
        created_at: "2024-02-10T00:00:00Z",
        last_activity: "2024-02-15T00:00:00Z",
        archived: false,
    },
    CardSpec {
        id: "c5",
        board: "b2",
        list: "l2-todo",
        swimlane: "s2-idf",
        siret_field: "cf2-siret",
        siret: "33333333300033",
        creator: "u-bob",
        members: &[],
        assignees: &[],
        labels: &[],
        description: "Dossier clos",
        created_at: "2023-11-01T00:00:00Z",
        last_activity: "2023-12-01T00:00:00Z",
        archived: true,
    },
];

fn comments_of(card_id: &str) -> Vec<Comment> {
    let comment = |id: &str, user: &str, text: &str, created: &str, modified: &str| Comment {
        id: id.to_string(),
        card_id: card_id.into(),
        user_id: user.into(),
        text: text.to_string(),
        created_at: ts(created),
        modified_at: ts(modified),
    };
    match card_id {
        "c1" => vec![comment(
            "cm2",
            "u-bob",
            "RDV pris",
            "2024-01-09T00:00:00Z",
            "2024-01-09T00:00:00Z",
        )],
        "c2" => vec![comment(
            "cm1",
            "u-alice",
            "Relance #export faite",
            "2024-02-28T00:00:00Z",
            "2024-03-01T09:00:00Z",
        )],
        _ => Vec::new(),
    }
}

fn ids<T: From<&'static str>>(values: &[&'static str]) -> Vec<T> {
    values.iter().map(|v| T::from(*v)).collect()
}

fn store_card(spec: &CardSpec) -> StoreCard {
    StoreCard {
        id: spec.id.into(),
        board_id: spec.board.into(),
        list_id: spec.list.into(),
        swimlane_id: spec.swimlane.into(),
        title: format!("Entreprise {}", spec.siret),
        description: spec.description.to_string(),
        user_id: spec.creator.into(),
        assignees: ids(spec.assignees),
        members: ids(spec.members),
        label_ids: ids(spec.labels),
        custom_fields: vec![CustomFieldValue {
            id: spec.siret_field.into(),
            value: Some(spec.siret.to_string()),
        }],
        created_at: ts(spec.created_at),
        start_at: Some(ts(spec.created_at)),
        end_at: None,
        date_last_activity: ts(spec.last_activity),
        archived: spec.archived,
        sort: 0.0,
    }
}

/// One of the fixture cards, with its comments.
pub fn card_fixture(id: &str) -> CardWithComments {
    let spec = CARDS.iter().find(|c| c.id == id).unwrap();
    CardWithComments {
        card: store_card(spec),
        comments: comments_of(id),
    }
}

// ==================== ESTABLISHMENTS ====================

pub fn summary(code: &str) -> Summary {
    let siret = siret(code);
    Summary {
        siren: siret.siren().to_string(),
        siret,
        raison_sociale: Some(format!("Entreprise {}", code)),
        commune: None,
        code_departement: Some("75".to_string()),
        libelle_departement: Some("Paris".to_string()),
        code_activite: None,
        libelle_activite: None,
        dernier_effectif: None,
        chiffre_affaire: None,
        variation_ca: None,
        etat_procol: None,
        alert: None,
        siege: true,
        followed: false,
        cards: Vec::new(),
    }
}

pub fn export_record(code: &str) -> ExportRecord {
    if code != "11111111100011" {
        return ExportRecord {
            siret: code.to_string(),
            raison_sociale: format!("Entreprise {}", code),
            code_departement: "21".to_string(),
            libelle_departement: "Côte-d'Or".to_string(),
            ..Default::default()
        };
    }
    ExportRecord {
        siret: code.to_string(),
        raison_sociale: "ACME Paris".to_string(),
        code_departement: "75".to_string(),
        libelle_departement: "Paris".to_string(),
        commune: "Paris".to_string(),
        siege: true,
        code_activite: "2511Z".to_string(),
        libelle_activite: "Fabrication de structures métalliques".to_string(),
        date_creation_entreprise: NaiveDate::from_ymd_opt(2001, 3, 15),
        dernier_effectif: Some(35),
        date_dernier_effectif: NaiveDate::from_ymd_opt(2023, 6, 30),
        exercice_diane: Some(2023),
        chiffre_affaire: Some(1200.0),
        chiffre_affaire_precedent: Some(1000.0),
        variation_ca: Some(1.2),
        derniere_liste: "2024-01".to_string(),
        derniere_alerte: "Alerte seuil F1".to_string(),
        procedure_collective: "in_bonis".to_string(),
        ..Default::default()
    }
}

// ==================== STORES ====================

/// Document store seeded with the fixture topology and cards.
pub struct BoardFixture {
    pub store: SqliteBoardStore,
    pub snapshot: ConfigSnapshot,
    _dir: TempDir,
}

impl BoardFixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = SqliteBoardStore::open(&dir.path().join("boards.sqlite"))
            .await
            .unwrap();
        seed_topology(store.pool(), &topology()).await;

        for spec in &CARDS {
            store.insert_card(&store_card(spec)).await.unwrap();
            for comment in comments_of(spec.id) {
                sqlx::query(
                    "INSERT INTO card_comments (id, card_id, user_id, text, created_at, modified_at) \
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(&comment.id)
                .bind(comment.card_id.as_str())
                .bind(comment.user_id.as_str())
                .bind(&comment.text)
                .bind(timestamp(&comment.created_at))
                .bind(timestamp(&comment.modified_at))
                .execute(store.pool())
                .await
                .unwrap();
            }
        }

        let topology = store.fetch_topology().await.unwrap();
        let snapshot = ConfigSnapshot::from_topology(topology, 1, Utc::now());
        Self {
            store,
            snapshot,
            _dir: dir,
        }
    }
}

async fn seed_topology(pool: &SqlitePool, topology: &Topology) {
    for user in &topology.users {
        sqlx::query("INSERT INTO users (id, username, full_name) VALUES (?, ?, ?)")
            .bind(user.id.as_str())
            .bind(user.username.as_str())
            .bind(&user.full_name)
            .execute(pool)
            .await
            .unwrap();
    }

    for board in &topology.boards {
        let board_id = board.id.as_str();
        sqlx::query("INSERT INTO boards (id, title, slug) VALUES (?, ?, ?)")
            .bind(board_id)
            .bind(&board.title)
            .bind(&board.slug)
            .execute(pool)
            .await
            .unwrap();

        for m in &board.members {
            sqlx::query("INSERT INTO board_members (board_id, user_id, is_active) VALUES (?, ?, ?)")
                .bind(board_id)
                .bind(m.user_id.as_str())
                .bind(m.is_active as i32)
                .execute(pool)
                .await
                .unwrap();
        }
        for l in &board.labels {
            sqlx::query("INSERT INTO board_labels (board_id, id, name, color) VALUES (?, ?, ?, ?)")
                .bind(board_id)
                .bind(l.id.as_str())
                .bind(&l.name)
                .bind(&l.color)
                .execute(pool)
                .await
                .unwrap();
        }
        for l in &board.lists {
            sqlx::query("INSERT INTO lists (id, board_id, title, sort) VALUES (?, ?, ?, ?)")
                .bind(l.id.as_str())
                .bind(board_id)
                .bind(&l.title)
                .bind(l.sort)
                .execute(pool)
                .await
                .unwrap();
        }
        for s in &board.swimlanes {
            sqlx::query("INSERT INTO swimlanes (id, board_id, title, sort) VALUES (?, ?, ?, ?)")
                .bind(s.id.as_str())
                .bind(board_id)
                .bind(&s.title)
                .bind(s.sort)
                .execute(pool)
                .await
                .unwrap();
        }
        for f in &board.custom_fields {
            sqlx::query(
                "INSERT INTO custom_fields (id, board_id, name, dropdown_items) VALUES (?, ?, ?, ?)",
            )
            .bind(f.id.as_str())
            .bind(board_id)
            .bind(&f.name)
            .bind(serde_json::to_string(&f.dropdown_items).unwrap())
            .execute(pool)
            .await
            .unwrap();
        }
    }

    // archived rows never reach the snapshot
    sqlx::query("INSERT INTO lists (id, board_id, title, sort, archived) VALUES ('l1-old', 'b1', 'Ancienne', -1, 1)")
        .execute(pool)
        .await
        .unwrap();
}

/// Relational store seeded with reference data, establishments and follows.
pub struct AppFixture {
    pub repo: Repository,
    _dir: TempDir,
}

impl AppFixture {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::init_database(&dir.path().join("app.sqlite"))
            .await
            .unwrap();

        for (code, libelle) in DEPARTEMENTS {
            sqlx::query("INSERT INTO departements (code, libelle) VALUES (?, ?)")
                .bind(code)
                .bind(libelle)
                .execute(&pool)
                .await
                .unwrap();
        }
        for (region, codes) in REGIONS {
            for code in codes {
                sqlx::query("INSERT INTO regions (libelle, code_departement) VALUES (?, ?)")
                    .bind(region)
                    .bind(*code)
                    .execute(&pool)
                    .await
                    .unwrap();
            }
        }

        sqlx::query(
            r#"
            INSERT INTO etablissements (
                siret, siren, raison_sociale, commune, code_departement, siege,
                code_activite, libelle_activite, date_creation_entreprise,
                dernier_effectif, date_dernier_effectif, exercice_diane,
                chiffre_affaire, chiffre_affaire_precedent, variation_ca,
                etat_procol, derniere_liste, derniere_alerte
            ) VALUES
                ('11111111100011', '111111111', 'ACME Paris', 'Paris', '75', 1,
                 '2511Z', 'Fabrication de structures métalliques', '2001-03-15',
                 35, '2023-06-30', 2023, 1200, 1000, 1.2,
                 'in_bonis', '2024-01', 'Alerte seuil F1'),
                ('22222222200022', '222222222', 'Bourgogne Bois', 'Dijon', '21', 1,
                 '1610A', 'Sciage et rabotage du bois', '1995-06-01',
                 120, '2023-06-30', 2023, 5400, 5600, 0.96,
                 'in_bonis', '2024-01', 'Pas d''alerte'),
                ('33333333300033', '333333333', 'Hauts Services', 'Nanterre', '92', 0,
                 NULL, NULL, NULL,
                 NULL, NULL, NULL, NULL, NULL, NULL,
                 NULL, NULL, NULL),
                ('44444444400044', '444444444', 'Paris Deux', 'Paris', '75', 1,
                 '4711D', 'Supermarchés', '2010-09-01',
                 8, '2023-06-30', 2022, 800, 900, 0.89,
                 'sauvegarde', '2024-01', 'Alerte seuil F2')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        for code in ["11111111100011", "33333333300033", "44444444400044"] {
            sqlx::query(
                "INSERT INTO etablissement_follow (siret, siren, username, active, since, comment, category) \
                 VALUES (?, ?, 'alice', 1, '2024-01-01T00:00:00.000Z', 'suivi', 'manual')",
            )
            .bind(code)
            .bind(&code[..9])
            .execute(&pool)
            .await
            .unwrap();
        }

        Self {
            repo: Repository::new(pool),
            _dir: dir,
        }
    }
}
