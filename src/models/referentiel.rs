//! Department and region reference data.

use std::collections::BTreeMap;

/// Synthetic region covering every department.
pub const FRANCE_ENTIERE: &str = "France entière";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Referentiel {
    /// Department code to label.
    pub departements: BTreeMap<String, String>,
    /// Region name to the department codes it contains.
    pub regions: BTreeMap<String, Vec<String>>,
}

impl Referentiel {
    pub fn new(
        departements: BTreeMap<String, String>,
        mut regions: BTreeMap<String, Vec<String>>,
    ) -> Self {
        regions.insert(
            FRANCE_ENTIERE.to_string(),
            departements.keys().cloned().collect(),
        );
        Self {
            departements,
            regions,
        }
    }

    pub fn is_departement(&self, code: &str) -> bool {
        self.departements.contains_key(code)
    }

    #[cfg(test)]
    pub fn libelle_departement(&self, code: &str) -> Option<&str> {
        self.departements.get(code).map(String::as_str)
    }

    /// Department codes a zone name stands for: itself when it is a
    /// department, its members when it is a region, nothing otherwise.
    pub fn zone_departements(&self, zone: &str) -> Vec<String> {
        if self.is_departement(zone) {
            return vec![zone.to_string()];
        }
        self.regions.get(zone).cloned().unwrap_or_default()
    }
}
