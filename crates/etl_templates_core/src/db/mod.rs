//! SQLite storage of the template registry.
//!
//! # Responsibility
//! - Open connections with the registry table layout in place.
//!
//! # Invariants
//! - The table layout is versioned by `PRAGMA user_version` as a
//!   [`LayoutVersion`]. It never moves with the template schema version in
//!   `registry_meta`, which only the template migration engine advances.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use migrations::LayoutVersion;
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a binary with a newer table layout.
    LayoutTooNew {
        found: LayoutVersion,
        supported: LayoutVersion,
    },
    /// One layout script failed; the whole upgrade was rolled back.
    LayoutScript {
        name: &'static str,
        error: rusqlite::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::LayoutTooNew { found, supported } => write!(
                f,
                "template store layout {found} is newer than supported {supported}"
            ),
            Self::LayoutScript { name, error } => {
                write!(f, "template store layout script `{name}` failed: {error}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::LayoutScript { error: err, .. } => Some(err),
            Self::LayoutTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
