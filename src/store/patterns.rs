//! Pattern rows and their ancestry.

use chrono::Utc;
use log::info;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use super::{Store, StoreError, format_timestamp, parse_timestamp};
use crate::schema::{PENDING_SCORE, Pattern};

const PATTERN_COLUMNS: &str = "id, version, code, timestamp, techniques, score, innovation_score,
     aesthetic_score, mathematical_complexity, motion_quality, visual_coherence,
     technique_synergy, parent_patterns";

/// Code stored for rows created only to anchor a lineage reference.
pub const PLACEHOLDER_CODE: &str = "PLACEHOLDER";

/// Raw pattern row; list columns are still JSON text.
struct PatternRow {
    id: i64,
    version: i64,
    code: String,
    timestamp: String,
    techniques: String,
    scores: [f64; 7],
    parent_patterns: String,
}

impl PatternRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            code: row.get(2)?,
            timestamp: row.get(3)?,
            techniques: row.get(4)?,
            scores: [
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
            ],
            parent_patterns: row.get(12)?,
        })
    }

    fn into_pattern(self) -> Result<Pattern, StoreError> {
        let [score, innovation, aesthetic, complexity, motion, coherence, synergy] = self.scores;
        let mut pattern = Pattern {
            id: Some(self.id),
            version: self.version,
            code: self.code,
            timestamp: parse_timestamp(&self.timestamp)?,
            techniques: serde_json::from_str(&self.techniques)?,
            score,
            innovation_score: innovation,
            aesthetic_score: aesthetic,
            mathematical_complexity: complexity,
            motion_quality: motion,
            visual_coherence: coherence,
            technique_synergy: synergy,
            parent_patterns: serde_json::from_str(&self.parent_patterns)?,
            evolution_chain: Vec::new(),
        };
        pattern.rebuild_chain();
        Ok(pattern)
    }
}

/// Aggregate counts over all stored patterns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub total_patterns: i64,
    pub latest_version: i64,
    /// Patterns scoring above 75.
    pub high_scoring_patterns: i64,
    pub avg_score: f64,
    pub avg_innovation: f64,
    pub avg_complexity: f64,
    pub avg_motion: f64,
    pub top_technique_combinations: Vec<TechniqueCombination>,
}

/// A high-synergy technique pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechniqueCombination {
    pub combination: String,
    pub synergy_score: f64,
    pub usage_count: i64,
}

/// Pattern persistence and lineage queries.
pub struct PatternLineageStore<'a> {
    store: &'a Store,
}

impl<'a> PatternLineageStore<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert a pattern and return its row id. A reused version is an error.
    pub fn save(&self, pattern: &Pattern) -> Result<i64, StoreError> {
        let conn = self.store.connect()?;
        conn.execute(
            "INSERT INTO patterns (
                version, code, timestamp, techniques, score, innovation_score,
                aesthetic_score, mathematical_complexity, motion_quality,
                visual_coherence, technique_synergy, parent_patterns
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                pattern.version,
                pattern.code,
                format_timestamp(&pattern.timestamp),
                serde_json::to_string(&pattern.techniques)?,
                pattern.score,
                pattern.innovation_score,
                pattern.aesthetic_score,
                pattern.mathematical_complexity,
                pattern.motion_quality,
                pattern.visual_coherence,
                pattern.technique_synergy,
                serde_json::to_string(&pattern.parent_patterns)?,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Saved pattern v{} as id {} (score {:.2})", pattern.version, id, pattern.score);
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<Option<Pattern>, StoreError> {
        self.fetch_one("id = ?1", id)
    }

    pub fn get_by_version(&self, version: i64) -> Result<Option<Pattern>, StoreError> {
        self.fetch_one("version = ?1", version)
    }

    fn fetch_one(&self, predicate: &str, key: i64) -> Result<Option<Pattern>, StoreError> {
        let conn = self.store.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM patterns WHERE {}", PATTERN_COLUMNS, predicate),
                [key],
                PatternRow::from_row,
            )
            .optional()?;
        row.map(PatternRow::into_pattern).transpose()
    }

    fn fetch_many(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Pattern>, StoreError> {
        let rows: Vec<PatternRow> = conn
            .prepare(sql)?
            .query_map(params, PatternRow::from_row)?
            .collect::<Result<_, _>>()?;
        rows.into_iter().map(PatternRow::into_pattern).collect()
    }

    /// Newest patterns first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Pattern>, StoreError> {
        let conn = self.store.connect()?;
        Self::fetch_many(
            &conn,
            &format!(
                "SELECT {} FROM patterns ORDER BY timestamp DESC, id DESC LIMIT ?1",
                PATTERN_COLUMNS
            ),
            [limit as i64],
        )
    }

    /// Patterns scoring at least `min_score`, best first.
    pub fn successful(&self, min_score: f64, limit: usize) -> Result<Vec<Pattern>, StoreError> {
        let conn = self.store.connect()?;
        Self::fetch_many(
            &conn,
            &format!(
                "SELECT {} FROM patterns WHERE score >= ?1 ORDER BY score DESC, id LIMIT ?2",
                PATTERN_COLUMNS
            ),
            params![min_score, limit as i64],
        )
    }

    /// Technique lists of the most recent patterns.
    pub fn historical_techniques(&self, limit: usize) -> Result<Vec<Vec<String>>, StoreError> {
        let conn = self.store.connect()?;
        let raw: Vec<String> = conn
            .prepare("SELECT techniques FROM patterns ORDER BY timestamp DESC, id DESC LIMIT ?1")?
            .query_map([limit as i64], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        raw.iter()
            .map(|json| Ok(serde_json::from_str(json)?))
            .collect()
    }

    /// A pattern and all of its stored ancestors, ordered by version.
    ///
    /// Parent references are followed recursively; `UNION` keeps cycles finite.
    pub fn lineage(&self, version: i64) -> Result<Vec<Pattern>, StoreError> {
        let conn = self.store.connect()?;
        Self::fetch_many(
            &conn,
            &format!(
                "WITH RECURSIVE lineage(version) AS (
                    SELECT ?1
                    UNION
                    SELECT CAST(parent.value AS INTEGER)
                    FROM patterns p
                    JOIN lineage l ON p.version = l.version
                    JOIN json_each(p.parent_patterns) AS parent
                )
                SELECT {} FROM patterns
                WHERE version IN (SELECT version FROM lineage)
                ORDER BY version",
                PATTERN_COLUMNS
            ),
            [version],
        )
    }

    /// Insert a placeholder row for `version` unless one exists. Returns
    /// whether a row was created.
    pub fn ensure_version_exists(&self, version: i64) -> Result<bool, StoreError> {
        let conn = self.store.connect()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO patterns (
                version, code, timestamp, techniques, score, innovation_score,
                aesthetic_score, mathematical_complexity, motion_quality,
                visual_coherence, technique_synergy, parent_patterns
            ) VALUES (?1, ?2, ?3, '[]', ?4, ?4, ?4, ?4, ?4, ?4, ?4, '[]')",
            params![
                version,
                PLACEHOLDER_CODE,
                format_timestamp(&Utc::now()),
                PENDING_SCORE
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Highest stored version, 0 when empty.
    pub fn latest_version(&self) -> Result<i64, StoreError> {
        let conn = self.store.connect()?;
        Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM patterns", [], |row| {
            row.get(0)
        })?)
    }

    pub fn next_version(&self) -> Result<i64, StoreError> {
        Ok(self.latest_version()? + 1)
    }

    /// Totals, averages and the strongest technique pairings.
    pub fn system_stats(&self) -> Result<SystemStats, StoreError> {
        let conn = self.store.connect()?;
        let (total, latest, high, avg_score, avg_innovation, avg_complexity, avg_motion): (
            i64,
            i64,
            i64,
            f64,
            f64,
            f64,
            f64,
        ) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(MAX(version), 0),
                        COALESCE(SUM(CASE WHEN score > 75 THEN 1 ELSE 0 END), 0),
                        COALESCE(AVG(score), 0.0),
                        COALESCE(AVG(innovation_score), 0.0),
                        COALESCE(AVG(mathematical_complexity), 0.0),
                        COALESCE(AVG(motion_quality), 0.0)
                 FROM patterns",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )?;

        let top_technique_combinations = conn
            .prepare(
                "SELECT t1.technique || ' + ' || t2.technique, s.synergy_score, s.usage_count
                 FROM technique_synergy s
                 JOIN technique_stats t1 ON t1.technique = s.technique1
                 JOIN technique_stats t2 ON t2.technique = s.technique2
                 WHERE s.synergy_score >= 80
                 ORDER BY s.synergy_score DESC
                 LIMIT 5",
            )?
            .query_map([], |row| {
                Ok(TechniqueCombination {
                    combination: row.get(0)?,
                    synergy_score: row.get(1)?,
                    usage_count: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(SystemStats {
            total_patterns: total,
            latest_version: latest,
            high_scoring_patterns: high,
            avg_score,
            avg_innovation,
            avg_complexity,
            avg_motion,
            top_technique_combinations,
        })
    }
}
