//! SQLite persistence for patterns, technique statistics and synergy pairs.
//!
//! A connection is opened per operation; nothing is held across calls and no
//! transaction spans more than one logical write.

mod patterns;
mod techniques;

pub use patterns::*;
pub use techniques::*;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use rusqlite::Connection;

use crate::schema::TechniqueCategories;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL UNIQUE,
    code TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    techniques TEXT NOT NULL DEFAULT '[]',
    score REAL NOT NULL DEFAULT 75.0,
    innovation_score REAL NOT NULL DEFAULT 75.0,
    aesthetic_score REAL NOT NULL DEFAULT 75.0,
    mathematical_complexity REAL NOT NULL DEFAULT 75.0,
    motion_quality REAL NOT NULL DEFAULT 75.0,
    visual_coherence REAL NOT NULL DEFAULT 75.0,
    technique_synergy REAL NOT NULL DEFAULT 75.0,
    parent_patterns TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS technique_stats (
    technique TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    avg_score REAL NOT NULL DEFAULT 75.0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    success_rate REAL NOT NULL DEFAULT 0.75,
    last_used TEXT,
    aesthetic_score REAL NOT NULL DEFAULT 75.0,
    complexity_score REAL NOT NULL DEFAULT 75.0,
    innovation_factor REAL NOT NULL DEFAULT 1.0,
    adaptation_rate REAL NOT NULL DEFAULT 1.0
);

CREATE TABLE IF NOT EXISTS evolution_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    technique TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    score REAL NOT NULL,
    aesthetic REAL NOT NULL,
    complexity REAL NOT NULL,
    innovation REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS technique_synergy (
    technique1 TEXT NOT NULL,
    technique2 TEXT NOT NULL,
    synergy_score REAL NOT NULL DEFAULT 75.0,
    last_updated TEXT,
    usage_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (technique1, technique2)
);

CREATE INDEX IF NOT EXISTS idx_patterns_score ON patterns(score);
CREATE INDEX IF NOT EXISTS idx_patterns_timestamp ON patterns(timestamp);
CREATE INDEX IF NOT EXISTS idx_evolution_technique ON evolution_history(technique);
CREATE INDEX IF NOT EXISTS idx_evolution_timestamp ON evolution_history(timestamp);
";

const DROP_TABLES: &str = "
DROP TABLE IF EXISTS patterns;
DROP TABLE IF EXISTS technique_stats;
DROP TABLE IF EXISTS evolution_history;
DROP TABLE IF EXISTS technique_synergy;
";

/// Persistence errors. These always reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid list column: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the database file. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if needed) the database and its tables.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let store = Self { path };
        store.connect()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// Open and seed the technique catalog on first use.
    pub fn open_with_catalog<P: AsRef<Path>>(
        path: P,
        categories: &TechniqueCategories,
    ) -> Result<Self, StoreError> {
        let store = Self::open(path)?;
        store.techniques().seed_catalog(categories)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Drop every table, recreate them empty and reseed the catalog.
    pub fn reset(&self, categories: &TechniqueCategories) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute_batch(DROP_TABLES)?;
        conn.execute_batch(SCHEMA)?;
        drop(conn);
        let seeded = self.techniques().seed_catalog(categories)?;
        info!("Reset database {} ({} techniques seeded)", self.path.display(), seeded);
        Ok(())
    }

    /// Technique statistics, history and synergy pairs.
    pub fn techniques(&self) -> TechniqueRegistry<'_> {
        TechniqueRegistry::new(self)
    }

    /// Pattern records and lineage.
    pub fn patterns(&self) -> PatternLineageStore<'_> {
        PatternLineageStore::new(self)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Pattern;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("nested").join("prism.db");
        let store = Store::open(&path).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_reset_clears_patterns_and_reseeds() {
        let tmp = TempDir::new().unwrap();
        let categories = TechniqueCategories::default();
        let store = Store::open_with_catalog(tmp.path().join("prism.db"), &categories).unwrap();
        store.patterns().save(&Pattern::new(1, "code", Vec::new())).unwrap();

        store.reset(&categories).unwrap();
        assert_eq!(store.patterns().latest_version().unwrap(), 0);
        assert_eq!(store.techniques().catalog_size().unwrap(), categories.len());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
