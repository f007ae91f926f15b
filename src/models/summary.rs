//! Establishment records read from the relational store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::card::Card;
use super::ids::Username;
use super::siret::Siret;

/// Business summary of one establishment, optionally with its cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub siret: Siret,
    pub siren: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raison_sociale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commune: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_departement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libelle_departement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_activite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libelle_activite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dernier_effectif: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chiffre_affaire: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_ca: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etat_procol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    pub siege: bool,
    pub followed: bool,
    pub cards: Vec<Card>,
}

/// A page of summaries. `count` is the total number of matches, which
/// exceeds `summaries.len()` when the query was capped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summaries {
    pub count: usize,
    pub summaries: Vec<Summary>,
}

/// Raw export row: establishment fields needed to build a [`KanbanExport`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRecord {
    pub siret: String,
    pub raison_sociale: String,
    pub code_departement: String,
    pub libelle_departement: String,
    pub commune: String,
    pub libelle_territoire_industrie: String,
    pub siege: bool,
    pub tete_de_groupe: String,
    pub code_activite: String,
    pub libelle_activite: String,
    pub secteur_activite: String,
    pub statut_juridique: String,
    pub date_ouverture_etablissement: Option<NaiveDate>,
    pub date_creation_entreprise: Option<NaiveDate>,
    pub dernier_effectif: Option<i64>,
    pub date_dernier_effectif: Option<NaiveDate>,
    pub exercice_diane: Option<i64>,
    pub chiffre_affaire: Option<f64>,
    pub chiffre_affaire_precedent: Option<f64>,
    pub variation_ca: Option<f64>,
    pub resultat_exploitation: Option<f64>,
    pub excedent_brut_exploitation: Option<f64>,
    pub derniere_liste: String,
    pub derniere_alerte: String,
    pub procedure_collective: String,
}

/// Flattened, human-readable export entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KanbanExport {
    pub raison_sociale: String,
    pub siret: String,
    pub type_etablissement: String,
    pub tete_de_groupe: String,
    pub departement: String,
    pub commune: String,
    pub territoire_industrie: String,
    pub secteur_activite: String,
    pub activite: String,
    pub statut_juridique: String,
    pub date_ouverture_etablissement: String,
    pub date_creation_entreprise: String,
    pub effectif: String,
    pub annee_exercice: String,
    pub ca: String,
    pub ebe: String,
    pub rex: String,
    pub procol: String,
    pub detection_sf: String,
    pub date_debut_suivi: String,
    pub date_fin_suivi: String,
    pub description_wekan: String,
    pub labels: Vec<String>,
    pub board: String,
    #[serde(rename = "lastActivity", skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    pub archived: bool,
}

/// Establishment fields used to fill a new card.
#[derive(Debug, Clone, PartialEq)]
pub struct EstablishmentData {
    pub siret: Siret,
    pub raison_sociale: String,
    pub code_departement: String,
    pub code_activite: Option<String>,
    pub libelle_activite: Option<String>,
    pub effectif: Option<i64>,
}

/// Parameters of a summary or export query against the relational store.
///
/// The authorization scope (`roles`) and `zone` are supplied by the caller;
/// the store only applies them.
#[derive(Debug, Clone, Default)]
pub struct SummaryQuery {
    pub username: Username,
    pub roles: Vec<String>,
    pub zone: Vec<String>,
    pub raison_sociale: Option<String>,
    pub limit: Option<i64>,
}

/// Result of an export query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanExports {
    /// Establishment records, each joined with one of its cards when any.
    pub exports: Vec<KanbanExport>,
    /// Cards whose establishment code matched no record.
    pub cards_without_record: Vec<KanbanExport>,
}
