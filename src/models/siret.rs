//! Establishment code value type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Length of an establishment code.
pub const SIRET_LEN: usize = 14;
/// Length of the legal-entity prefix of an establishment code.
pub const SIREN_LEN: usize = 9;

/// A validated 14-digit establishment code.
///
/// Built once where a code enters the process (request body, relational row,
/// card custom field) and passed around as this type afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siret(String);

impl Siret {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        if value.len() != SIRET_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::Validation(format!(
                "invalid establishment code: {:?}",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Legal-entity key used for head-office level joins.
    pub fn siren(&self) -> &str {
        &self.0[..SIREN_LEN]
    }
}

impl TryFrom<String> for Siret {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Siret::parse(&value)
    }
}

impl From<Siret> for String {
    fn from(value: Siret) -> Self {
        value.0
    }
}

impl fmt::Display for Siret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
