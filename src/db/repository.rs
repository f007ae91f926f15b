//! Relational store repository.
//!
//! Every summary and export query is scoped by the caller-supplied roles
//! (department codes the user may see) and optional zone filter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::push_in_list;
use crate::errors::{AppError, QueryContext};
use crate::models::{
    EstablishmentData, ExportRecord, Referentiel, Siret, Summaries, Summary, SummaryQuery,
    Username,
};

/// Category of follow rows created from card participation.
pub const FOLLOW_CATEGORY: &str = "kanban";
pub const FOLLOW_COMMENT: &str = "participe à la carte kanban";

/// Which establishments a summary or export query targets.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    /// Exactly these codes.
    Sirets(&'a [Siret]),
    /// Establishments the user actively follows, minus these codes.
    FollowedWithout(&'a [Siret]),
}

#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn load_referentiel(&self) -> Result<Referentiel, AppError>;

    /// Matching summaries, cut at `query.limit`. `count` is the number of
    /// matches before the cut.
    async fn select_summaries(
        &self,
        selection: Selection<'_>,
        query: &SummaryQuery,
    ) -> Result<Summaries, AppError>;

    async fn select_exports(
        &self,
        selection: Selection<'_>,
        query: &SummaryQuery,
    ) -> Result<Vec<ExportRecord>, AppError>;

    async fn establishment_data(&self, siret: &Siret)
        -> Result<Option<EstablishmentData>, AppError>;

    /// Mark every known establishment among `sirets` as followed by
    /// `username`, skipping the ones already followed. One statement.
    async fn follow_from_cards(&self, username: &Username, sirets: &[Siret])
        -> Result<u64, AppError>;
}

/// SQLite-backed relational store.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const SUMMARY_COLUMNS: &str = r#"
    SELECT e.siret, e.siren, e.raison_sociale, e.commune, e.code_departement,
           d.libelle AS libelle_departement, e.code_activite, e.libelle_activite,
           e.dernier_effectif, e.chiffre_affaire, e.variation_ca, e.etat_procol,
           e.derniere_alerte, e.siege, COUNT(*) OVER () AS nb_total,
           EXISTS (SELECT 1 FROM etablissement_follow f
                   WHERE f.siret = e.siret AND f.username = "#;

const EXPORT_COLUMNS: &str = r#"
    SELECT e.siret, e.raison_sociale, e.code_departement,
           d.libelle AS libelle_departement, e.commune,
           e.libelle_territoire_industrie, e.siege, e.tete_de_groupe,
           e.code_activite, e.libelle_activite, e.secteur_activite,
           e.statut_juridique, e.date_ouverture, e.date_creation_entreprise,
           e.dernier_effectif, e.date_dernier_effectif, e.exercice_diane,
           e.chiffre_affaire, e.chiffre_affaire_precedent, e.variation_ca,
           e.resultat_exploitation, e.excedent_brut_exploitation,
           e.derniere_liste, e.derniere_alerte, e.etat_procol
    FROM etablissements e
    LEFT JOIN departements d ON d.code = e.code_departement
    WHERE "#;

/// Append the selection, scope, zone and name filters shared by summary and
/// export queries.
fn push_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    selection: Selection<'_>,
    query: &SummaryQuery,
) {
    match selection {
        Selection::Sirets(sirets) => {
            push_in_list(qb, "e.siret", sirets.iter().map(|s| s.to_string()));
        }
        Selection::FollowedWithout(excluded) => {
            qb.push(
                "EXISTS (SELECT 1 FROM etablissement_follow f \
                 WHERE f.siret = e.siret AND f.active = 1 AND f.username = ",
            )
            .push_bind(query.username.to_string())
            .push(")");
            if !excluded.is_empty() {
                qb.push(" AND NOT ");
                push_in_list(qb, "e.siret", excluded.iter().map(|s| s.to_string()));
            }
        }
    }

    qb.push(" AND ");
    push_in_list(qb, "e.code_departement", query.roles.iter().cloned());

    if !query.zone.is_empty() {
        qb.push(" AND ");
        push_in_list(qb, "e.code_departement", query.zone.iter().cloned());
    }

    if let Some(name) = query.raison_sociale.as_deref().filter(|n| !n.is_empty()) {
        qb.push(" AND e.raison_sociale LIKE ")
            .push_bind(format!("%{}%", name));
    }

    qb.push(" ORDER BY e.raison_sociale, e.siret");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
}

#[async_trait]
impl SummaryStore for Repository {
    async fn load_referentiel(&self) -> Result<Referentiel, AppError> {
        let departements: BTreeMap<String, String> =
            sqlx::query("SELECT code, libelle FROM departements ORDER BY code")
                .fetch_all(&self.pool)
                .await
                .query("load_departements")?
                .iter()
                .map(|row| (row.get("code"), row.get("libelle")))
                .collect();

        let mut regions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let rows = sqlx::query(
            "SELECT libelle, code_departement FROM regions ORDER BY libelle, code_departement",
        )
        .fetch_all(&self.pool)
        .await
        .query("load_regions")?;
        for row in rows {
            regions
                .entry(row.get("libelle"))
                .or_default()
                .push(row.get("code_departement"));
        }

        Ok(Referentiel::new(departements, regions))
    }

    async fn select_summaries(
        &self,
        selection: Selection<'_>,
        query: &SummaryQuery,
    ) -> Result<Summaries, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(SUMMARY_COLUMNS);
        qb.push_bind(query.username.to_string())
            .push(
                " AND f.active = 1) AS followed \
                 FROM etablissements e \
                 LEFT JOIN departements d ON d.code = e.code_departement \
                 WHERE ",
            );
        push_filters(&mut qb, selection, query);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .query("select_summaries")?;

        let count = rows
            .first()
            .map(|row| row.get::<i64, _>("nb_total") as usize)
            .unwrap_or(0);
        Ok(Summaries {
            count,
            summaries: rows.iter().filter_map(summary_from_row).collect(),
        })
    }

    async fn select_exports(
        &self,
        selection: Selection<'_>,
        query: &SummaryQuery,
    ) -> Result<Vec<ExportRecord>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(EXPORT_COLUMNS);
        push_filters(&mut qb, selection, query);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .query("select_exports")?;

        Ok(rows.iter().map(export_from_row).collect())
    }

    async fn establishment_data(
        &self,
        siret: &Siret,
    ) -> Result<Option<EstablishmentData>, AppError> {
        let row = sqlx::query(
            "SELECT raison_sociale, code_departement, code_activite, libelle_activite, dernier_effectif \
             FROM etablissements WHERE siret = ?",
        )
        .bind(siret.as_str())
        .fetch_optional(&self.pool)
        .await
        .query("establishment_data")?;

        Ok(row.map(|row| EstablishmentData {
            siret: siret.clone(),
            raison_sociale: row.get("raison_sociale"),
            code_departement: row.get("code_departement"),
            code_activite: row.get("code_activite"),
            libelle_activite: row.get("libelle_activite"),
            effectif: row.get("dernier_effectif"),
        }))
    }

    async fn follow_from_cards(
        &self,
        username: &Username,
        sirets: &[Siret],
    ) -> Result<u64, AppError> {
        if sirets.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO etablissement_follow (siret, siren, username, active, since, comment, category) \
             SELECT e.siret, substr(e.siret, 1, 9), ",
        );
        qb.push_bind(username.to_string())
            .push(", 1, ")
            .push_bind(now)
            .push(", ")
            .push_bind(FOLLOW_COMMENT)
            .push(", ")
            .push_bind(FOLLOW_CATEGORY)
            .push(" FROM etablissements e WHERE ");
        let mut distinct: Vec<String> = sirets.iter().map(|s| s.to_string()).collect();
        distinct.sort();
        distinct.dedup();
        push_in_list(&mut qb, "e.siret", distinct);
        qb.push(
            " AND NOT EXISTS (SELECT 1 FROM etablissement_follow f \
             WHERE f.siret = e.siret AND f.active = 1 AND f.username = ",
        )
        .push_bind(username.to_string())
        .push(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .query("follow_from_cards")?;

        if result.rows_affected() > 0 {
            tracing::info!(
                username = %username,
                followed = result.rows_affected(),
                "Followed establishments from kanban cards"
            );
        }
        Ok(result.rows_affected())
    }
}

// ==================== ROW HELPERS ====================

fn summary_from_row(row: &SqliteRow) -> Option<Summary> {
    let raw: String = row.get("siret");
    let siret = match Siret::parse(&raw) {
        Ok(siret) => siret,
        Err(_) => {
            tracing::warn!(siret = %raw, "Skipping summary with malformed establishment code");
            return None;
        }
    };

    Some(Summary {
        siren: row.get("siren"),
        siret,
        raison_sociale: row.get("raison_sociale"),
        commune: row.get("commune"),
        code_departement: row.get("code_departement"),
        libelle_departement: row.get("libelle_departement"),
        code_activite: row.get("code_activite"),
        libelle_activite: row.get("libelle_activite"),
        dernier_effectif: row
            .get::<Option<i64>, _>("dernier_effectif")
            .map(|e| e as f64),
        chiffre_affaire: row.get("chiffre_affaire"),
        variation_ca: row.get("variation_ca"),
        etat_procol: row.get("etat_procol"),
        alert: row.get("derniere_alerte"),
        siege: row.get::<i64, _>("siege") != 0,
        followed: row.get::<i64, _>("followed") != 0,
        cards: Vec::new(),
    })
}

fn export_from_row(row: &SqliteRow) -> ExportRecord {
    ExportRecord {
        siret: row.get("siret"),
        raison_sociale: row.get("raison_sociale"),
        code_departement: row.get("code_departement"),
        libelle_departement: text(row, "libelle_departement"),
        commune: text(row, "commune"),
        libelle_territoire_industrie: text(row, "libelle_territoire_industrie"),
        siege: row.get::<i64, _>("siege") != 0,
        tete_de_groupe: text(row, "tete_de_groupe"),
        code_activite: text(row, "code_activite"),
        libelle_activite: text(row, "libelle_activite"),
        secteur_activite: text(row, "secteur_activite"),
        statut_juridique: text(row, "statut_juridique"),
        date_ouverture_etablissement: date(row, "date_ouverture"),
        date_creation_entreprise: date(row, "date_creation_entreprise"),
        dernier_effectif: row.get("dernier_effectif"),
        date_dernier_effectif: date(row, "date_dernier_effectif"),
        exercice_diane: row.get("exercice_diane"),
        chiffre_affaire: row.get("chiffre_affaire"),
        chiffre_affaire_precedent: row.get("chiffre_affaire_precedent"),
        variation_ca: row.get("variation_ca"),
        resultat_exploitation: row.get("resultat_exploitation"),
        excedent_brut_exploitation: row.get("excedent_brut_exploitation"),
        derniere_liste: text(row, "derniere_liste"),
        derniere_alerte: text(row, "derniere_alerte"),
        procedure_collective: text(row, "etat_procol"),
    }
}

fn text(row: &SqliteRow, column: &str) -> String {
    row.get::<Option<String>, _>(column).unwrap_or_default()
}

fn date(row: &SqliteRow, column: &str) -> Option<NaiveDate> {
    row.get::<Option<String>, _>(column)
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}
