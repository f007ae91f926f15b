//! Data models for boards, cards and establishment records.

mod board;
mod card;
mod ids;
mod kanban;
mod referentiel;
mod siret;
mod summary;

pub use board::*;
pub use card::*;
pub use ids::*;
pub use kanban::*;
pub use referentiel::*;
pub use siret::*;
pub use summary::*;
