//! Relational store: establishment summaries, follows and reference data.
//!
//! Summary and export rows are consumed as opaque, caller-scoped results;
//! the only writes here are follow backfills.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open a SQLite pool with the settings shared by both stores.
pub async fn connect(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Initialize the relational store pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(db_path).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departements (
            code TEXT PRIMARY KEY,
            libelle TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS regions (
            libelle TEXT NOT NULL,
            code_departement TEXT NOT NULL REFERENCES departements(code),
            PRIMARY KEY (libelle, code_departement)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etablissements (
            siret TEXT PRIMARY KEY,
            siren TEXT NOT NULL,
            raison_sociale TEXT NOT NULL,
            commune TEXT,
            code_departement TEXT NOT NULL,
            code_territoire_industrie TEXT,
            libelle_territoire_industrie TEXT,
            siege INTEGER NOT NULL DEFAULT 0,
            tete_de_groupe TEXT,
            code_activite TEXT,
            libelle_activite TEXT,
            secteur_activite TEXT,
            statut_juridique TEXT,
            date_ouverture TEXT,
            date_creation_entreprise TEXT,
            dernier_effectif INTEGER,
            date_dernier_effectif TEXT,
            exercice_diane INTEGER,
            chiffre_affaire REAL,
            chiffre_affaire_precedent REAL,
            variation_ca REAL,
            resultat_exploitation REAL,
            excedent_brut_exploitation REAL,
            etat_procol TEXT,
            derniere_liste TEXT,
            derniere_alerte TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS etablissement_follow (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            siret TEXT NOT NULL,
            siren TEXT NOT NULL,
            username TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            since TEXT NOT NULL,
            comment TEXT,
            category TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_etablissements_departement ON etablissements(code_departement);
        CREATE INDEX IF NOT EXISTS idx_etablissements_siren ON etablissements(siren);
        CREATE INDEX IF NOT EXISTS idx_follow_username ON etablissement_follow(username, active);
        CREATE INDEX IF NOT EXISTS idx_follow_siret ON etablissement_follow(siret);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Push `expr IN (v1, v2, ...)`, or a constant false for an empty set.
pub fn push_in_list<'a, I>(
    qb: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
    expr: &str,
    values: I,
) where
    I: IntoIterator<Item = String>,
{
    let mut values = values.into_iter().peekable();
    if values.peek().is_none() {
        qb.push("0");
        return;
    }
    qb.push(expr).push(" IN (");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}
