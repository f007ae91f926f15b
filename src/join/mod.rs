//! Merging establishment records with cards.
//!
//! Records are keyed by establishment code; cards carry the same code in a
//! custom field. One record may match several cards (one per board).

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};

use crate::models::{
    Card, CardWithComments, ConfigSnapshot, ExportRecord, KanbanExport, KanbanExports, Siret,
    Summary, UserId,
};

/// Marker users put in comments meant for exports; stripped from the output.
const EXPORT_MARKER: &str = "#export";

/// Distinct establishment codes carried by `cards`, in first-seen order.
pub fn sirets_of(cards: &[Card]) -> Vec<Siret> {
    let mut seen = std::collections::HashSet::new();
    cards
        .iter()
        .filter_map(|c| c.siret.clone())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Attach to every summary the cards carrying its code. Every summary is
/// kept, with zero or more cards; cards matching no summary are dropped.
pub fn attach_cards(summaries: Vec<Summary>, cards: Vec<Card>) -> Vec<Summary> {
    let mut by_siret: HashMap<Siret, Vec<Card>> = HashMap::new();
    for card in cards {
        if let Some(siret) = card.siret.clone() {
            by_siret.entry(siret).or_default().push(card);
        }
    }
    summaries
        .into_iter()
        .map(|mut summary| {
            summary.cards = by_siret.get(&summary.siret).cloned().unwrap_or_default();
            summary
        })
        .collect()
}

/// Join export records with cards. Each card yields one entry: in `exports`
/// when its code has a record, in `cards_without_record` otherwise.
pub fn join_exports(
    records: &[ExportRecord],
    cards: &[CardWithComments],
    snapshot: &ConfigSnapshot,
    viewer: Option<&UserId>,
) -> KanbanExports {
    let by_siret: HashMap<&str, &ExportRecord> =
        records.iter().map(|r| (r.siret.as_str(), r)).collect();

    let mut result = KanbanExports::default();
    for card in cards {
        let siret = snapshot
            .board(&card.card.board_id)
            .and_then(|b| card.card.siret(b));
        let record = siret
            .as_ref()
            .and_then(|s| by_siret.get(s.as_str()).copied());
        match record {
            Some(record) => {
                let mut export = record_export(record);
                apply_card(&mut export, card, snapshot, viewer);
                result.exports.push(export);
            }
            None => {
                let mut export = KanbanExport {
                    siret: siret.map(String::from).unwrap_or_default(),
                    ..Default::default()
                };
                apply_card(&mut export, card, snapshot, viewer);
                result.cards_without_record.push(export);
            }
        }
    }
    result
}

/// Exports of records alone, for establishments without cards.
pub fn records_to_exports(records: &[ExportRecord]) -> Vec<KanbanExport> {
    records.iter().map(record_export).collect()
}

/// Establishment part of an export entry.
pub fn record_export(record: &ExportRecord) -> KanbanExport {
    KanbanExport {
        raison_sociale: record.raison_sociale.clone(),
        siret: record.siret.clone(),
        type_etablissement: if record.siege {
            "Siège social".to_string()
        } else {
            "Établissement secondaire".to_string()
        },
        tete_de_groupe: record.tete_de_groupe.clone(),
        departement: format!("{} ({})", record.libelle_departement, record.code_departement),
        commune: record.commune.clone(),
        territoire_industrie: record.libelle_territoire_industrie.clone(),
        secteur_activite: record.secteur_activite.clone(),
        activite: format!("{} ({})", record.libelle_activite, record.code_activite),
        statut_juridique: record.statut_juridique.clone(),
        date_ouverture_etablissement: day_date(record.date_ouverture_etablissement),
        date_creation_entreprise: day_date(record.date_creation_entreprise),
        effectif: libelle_effectif(record.dernier_effectif, record.date_dernier_effectif),
        annee_exercice: record
            .exercice_diane
            .filter(|y| *y != 0)
            .map(|y| y.to_string())
            .unwrap_or_default(),
        ca: libelle_ca(
            record.chiffre_affaire,
            record.chiffre_affaire_precedent,
            record.variation_ca,
        ),
        ebe: libelle_fin(record.excedent_brut_exploitation),
        rex: libelle_fin(record.resultat_exploitation),
        procol: libelle_procol(&record.procedure_collective).to_string(),
        detection_sf: libelle_alerte(&record.derniere_liste, &record.derniere_alerte),
        date_debut_suivi: "n/c".to_string(),
        ..Default::default()
    }
}

/// Card part of an export entry. Non-members only get the public fields.
fn apply_card(
    export: &mut KanbanExport,
    card: &CardWithComments,
    snapshot: &ConfigSnapshot,
    viewer: Option<&UserId>,
) {
    let stored = &card.card;
    let board = snapshot.board(&stored.board_id);

    export.board = board.map(|b| b.title.clone()).unwrap_or_default();
    export.date_debut_suivi = month_date(stored.start_at.map(|d| d.date_naive()));
    export.date_fin_suivi = stored
        .end_at
        .map(|d| month_date(Some(d.date_naive())))
        .unwrap_or_default();
    export.last_activity = Some(card.last_activity());
    export.archived = stored.archived;

    let Some(board) = board.filter(|b| viewer.is_some_and(|v| b.is_active_member(v))) else {
        return;
    };
    export.labels = stored
        .label_ids
        .iter()
        .map(|id| board.label_name(id).unwrap_or_default().to_string())
        .collect();
    export.description_wekan = export_description(&stored.description, card);
}

/// Card description followed by its comments, without export markers.
fn export_description(description: &str, card: &CardWithComments) -> String {
    let comments: Vec<&str> = card.comments.iter().map(|c| c.text.as_str()).collect();
    let text = format!(
        "{}\n\n{}",
        description,
        comments.join("\n\n").replace(EXPORT_MARKER, "")
    );
    text.trim_end_matches('\n').to_string()
}

fn is_unknown_date(date: NaiveDate) -> bool {
    // placeholder dates used upstream for "unknown"
    (date.year() == 1900 || date.year() == 1) && date.month() == 1 && date.day() == 1
}

fn day_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) if !is_unknown_date(d) => d.format("%d/%m/%Y").to_string(),
        _ => "n/c".to_string(),
    }
}

fn month_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) if !is_unknown_date(d) => d.format("%m/%Y").to_string(),
        _ => "n/c".to_string(),
    }
}

fn libelle_effectif(effectif: Option<i64>, date: Option<NaiveDate>) -> String {
    match effectif {
        Some(n) => format!("{} ({})", n, month_date(date)),
        None => "n/c".to_string(),
    }
}

fn libelle_fin(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => format!("{:.0} k€", v),
        _ => "n/c".to_string(),
    }
}

fn libelle_ca(value: Option<f64>, previous: Option<f64>, variation: Option<f64>) -> String {
    let v = match value {
        Some(v) if v != 0.0 => v,
        _ => return "n/c".to_string(),
    };
    if previous.unwrap_or(0.0) == 0.0 {
        return format!("{:.0} k€", v);
    }
    match variation {
        Some(var) if var > 1.05 => format!("{:.0} k€ (en hausse)", v),
        Some(var) if var < 0.95 => format!("{:.0} k€ (en baisse)", v),
        _ => format!("{:.0} k€", v),
    }
}

fn libelle_procol(procol: &str) -> &'static str {
    match procol {
        "in_bonis" => "In bonis",
        "liquidation" => "Liquidation judiciaire",
        "redressement" => "Redressement judiciaire",
        "plan_continuation" => "Plan de continuation",
        "sauvegarde" => "Sauvegarde",
        "plan_sauvegarde" => "Plan de Sauvegarde",
        _ => "",
    }
}

fn libelle_alerte(liste: &str, alerte: &str) -> String {
    match alerte {
        "Alerte seuil F1" => format!("Risque élevé ({})", liste),
        "Alerte seuil F2" => format!("Risque modéré ({})", liste),
        "Pas d'alerte" => format!("Pas de risque ({})", liste),
        _ => "Hors périmètre".to_string(),
    }
}
