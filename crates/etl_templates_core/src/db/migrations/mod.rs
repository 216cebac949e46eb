//! Table layout upgrades of the template store.
//!
//! # Invariants
//! - Scripts are listed with strictly increasing layout versions.
//! - All pending scripts of one upgrade commit together or not at all.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;
use std::fmt::{Display, Formatter};

/// Table layout version stored in `PRAGMA user_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayoutVersion(pub u32);

impl Display for LayoutVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

struct LayoutScript {
    version: LayoutVersion,
    name: &'static str,
    sql: &'static str,
}

const LAYOUT_SCRIPTS: &[LayoutScript] = &[
    LayoutScript {
        version: LayoutVersion(1),
        name: "template_tables",
        sql: include_str!("0001_init.sql"),
    },
    LayoutScript {
        version: LayoutVersion(2),
        name: "record_indexes",
        sql: include_str!("0002_statement_index.sql"),
    },
];

/// Layout this binary reads and writes.
pub fn latest_layout_version() -> LayoutVersion {
    LAYOUT_SCRIPTS
        .last()
        .map_or(LayoutVersion(0), |script| script.version)
}

pub fn read_layout_version(conn: &Connection) -> DbResult<LayoutVersion> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(LayoutVersion(version))
}

/// Runs every script newer than the stored layout and returns the layout
/// found before the upgrade.
///
/// # Errors
/// - `LayoutTooNew` when the store was written by a newer binary.
/// - `LayoutScript` naming the first script that failed.
pub fn upgrade_layout(conn: &mut Connection) -> DbResult<LayoutVersion> {
    let found = read_layout_version(conn)?;
    let latest = latest_layout_version();
    if found > latest {
        return Err(DbError::LayoutTooNew {
            found,
            supported: latest,
        });
    }

    let pending: Vec<&LayoutScript> = LAYOUT_SCRIPTS
        .iter()
        .filter(|script| script.version > found)
        .collect();
    if pending.is_empty() {
        return Ok(found);
    }

    let tx = conn.transaction()?;
    for script in pending {
        tx.execute_batch(script.sql)
            .map_err(|error| DbError::LayoutScript {
                name: script.name,
                error,
            })?;
        tx.pragma_update(None, "user_version", script.version.0)?;
        info!(
            "event=db_layout_upgrade module=db status=ok script={} layout={}",
            script.name, script.version
        );
    }
    tx.commit()?;
    Ok(found)
}
