// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only view of the 3x-ui SQLite database.
//!
//! 3x-ui owns the file and its schema; this module only ever issues one
//! `SELECT` against the `inbounds` table and never holds the connection
//! across requests, so panel upgrades and writes stay unaffected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::{TrafficError, TrafficSource};

/// Per-request reader of the panel's cumulative inbound counters.
#[derive(Debug, Clone)]
pub struct XuiDatabase {
    path: PathBuf,
}

impl XuiDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Builds from [`crate::config::XUI_DB_PATH_ENV`], defaulting to the
    /// stock panel location.
    pub fn from_env() -> Self {
        let path = std::env::var(crate::config::XUI_DB_PATH_ENV)
            .unwrap_or_else(|_| crate::config::DEFAULT_XUI_DB_PATH.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrafficSource for XuiDatabase {
    fn counters_by_port(&self) -> Result<HashMap<u16, u64>, TrafficError> {
        // An absent database is the normal state on hosts without the panel;
        // it means "no data", not an error worth logging on every request.
        if !self.path.exists() {
            debug!(path = %self.path.display(), "counter database not present");
            return Ok(HashMap::new());
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut stmt = conn.prepare("SELECT port, up, down FROM inbounds")?;
        let rows = stmt.query_map([], |row| {
            let port: i64 = row.get(0)?;
            let up: Option<i64> = row.get(1)?;
            let down: Option<i64> = row.get(2)?;
            Ok((port, up.unwrap_or(0), down.unwrap_or(0)))
        })?;

        let mut counters = HashMap::new();
        for row in rows {
            let (port, up, down) = row?;
            let Ok(port) = u16::try_from(port) else {
                continue;
            };
            counters.insert(port, up.max(0) as u64 + down.max(0) as u64);
        }
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(dir: &Path) -> XuiDatabase {
        let path = dir.join("x-ui.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE inbounds (
                 id INTEGER PRIMARY KEY,
                 port INTEGER,
                 up INTEGER,
                 down INTEGER,
                 remark TEXT
             );
             INSERT INTO inbounds (port, up, down, remark) VALUES (443, 100, 900, 'reality');
             INSERT INTO inbounds (port, up, down, remark) VALUES (8388, 5, 5, 'ss');
             INSERT INTO inbounds (port, up, down, remark) VALUES (70000, 1, 1, 'bogus');
             INSERT INTO inbounds (port, up, down, remark) VALUES (2053, NULL, 7, 'nulls');",
        )
        .unwrap();
        XuiDatabase::new(path)
    }

    #[test]
    fn sums_up_and_down_per_port() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());
        let counters = db.counters_by_port().unwrap();
        assert_eq!(counters.get(&443), Some(&1_000));
        assert_eq!(counters.get(&8388), Some(&10));
    }

    #[test]
    fn skips_ports_that_do_not_fit_u16_and_tolerates_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(dir.path());
        let counters = db.counters_by_port().unwrap();
        assert!(!counters.contains_key(&(70000u32 as u16)));
        assert_eq!(counters.get(&2053), Some(&7));
    }

    #[test]
    fn missing_database_reads_as_empty() {
        let db = XuiDatabase::new("/nonexistent/x-ui.db");
        assert!(db.counters_by_port().unwrap().is_empty());
    }
}
