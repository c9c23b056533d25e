//! Technique statistics, evolution history and pairwise synergy.

use std::collections::BTreeMap;

use chrono::Utc;
use log::{debug, info};
use rusqlite::{OptionalExtension, params};

use super::{Store, StoreError, format_timestamp, parse_timestamp};
use crate::schema::{
    Category, HistoryEntry, SynergyPair, Technique, TechniqueCategories, TechniqueStats,
    canonical_pair,
};

/// Synergy score a partner needs to appear in [`TechniqueStats::synergies`].
pub const HIGH_SYNERGY: f64 = 80.0;

/// Registry view over the technique tables.
pub struct TechniqueRegistry<'a> {
    store: &'a Store,
}

/// Raw `technique_stats` row before timestamp parsing.
struct StatsRow {
    name: String,
    category: String,
    avg_score: f64,
    usage_count: i64,
    success_rate: f64,
    last_used: Option<String>,
    aesthetic_score: f64,
    complexity_score: f64,
    innovation_factor: f64,
    adaptation_rate: f64,
}

const STATS_COLUMNS: &str = "technique, category, avg_score, usage_count, success_rate, last_used,
     aesthetic_score, complexity_score, innovation_factor, adaptation_rate";

impl StatsRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            category: row.get(1)?,
            avg_score: row.get(2)?,
            usage_count: row.get(3)?,
            success_rate: row.get(4)?,
            last_used: row.get(5)?,
            aesthetic_score: row.get(6)?,
            complexity_score: row.get(7)?,
            innovation_factor: row.get(8)?,
            adaptation_rate: row.get(9)?,
        })
    }

    fn into_stats(self, synergies: BTreeMap<String, f64>) -> Result<(String, TechniqueStats), StoreError> {
        let last_used = self.last_used.as_deref().map(parse_timestamp).transpose()?;
        Ok((
            self.name,
            TechniqueStats {
                category: Category::parse(&self.category),
                avg_score: self.avg_score,
                usage_count: self.usage_count.max(0) as u64,
                success_rate: self.success_rate,
                last_used,
                aesthetic_score: self.aesthetic_score,
                complexity_score: self.complexity_score,
                innovation_factor: self.innovation_factor,
                adaptation_rate: self.adaptation_rate,
                synergies,
            },
        ))
    }
}

impl<'a> TechniqueRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert every configured technique with default statistics.
    ///
    /// Only runs against an empty table; returns the number of rows inserted.
    pub fn seed_catalog(&self, categories: &TechniqueCategories) -> Result<usize, StoreError> {
        let conn = self.store.connect()?;
        let existing: i64 = conn.query_row("SELECT COUNT(*) FROM technique_stats", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(0);
        }

        let now = format_timestamp(&Utc::now());
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO technique_stats (technique, category, last_used) VALUES (?1, ?2, ?3)",
        )?;
        let mut inserted = 0;
        for (category, names) in categories.iter() {
            for name in names {
                inserted += stmt.execute(params![name, category.as_str(), now])?;
            }
        }
        debug!("Seeded {} techniques", inserted);
        Ok(inserted)
    }

    /// Number of rows in the technique table.
    pub fn catalog_size(&self) -> Result<usize, StoreError> {
        let conn = self.store.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM technique_stats", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Statistics of every technique used at least once, with its high-synergy partners.
    pub fn get_stats(&self) -> Result<BTreeMap<String, TechniqueStats>, StoreError> {
        let conn = self.store.connect()?;

        let rows: Vec<StatsRow> = conn
            .prepare(&format!(
                "SELECT {} FROM technique_stats WHERE usage_count > 0",
                STATS_COLUMNS
            ))?
            .query_map([], StatsRow::from_row)?
            .collect::<Result<_, _>>()?;

        let high = self.synergy_pairs_with(&conn, HIGH_SYNERGY)?;

        rows.into_iter()
            .map(|row| {
                let synergies = partners_of(&high, &row.name);
                row.into_stats(synergies)
            })
            .collect()
    }

    /// Upsert a technique snapshot.
    ///
    /// Writes the stats row, appends the newest history entry and upserts one
    /// canonical synergy row per partner. Each write is its own statement.
    pub fn save(&self, technique: &Technique) -> Result<(), StoreError> {
        let conn = self.store.connect()?;
        let last_used = technique.last_used.as_ref().map(format_timestamp);

        conn.execute(
            "INSERT OR REPLACE INTO technique_stats (
                technique, category, avg_score, usage_count, success_rate, last_used,
                aesthetic_score, complexity_score, innovation_factor, adaptation_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                technique.name,
                technique.category.as_str(),
                technique.avg_score,
                technique.usage_count as i64,
                technique.success_rate,
                last_used,
                technique.aesthetic_score,
                technique.complexity_score,
                technique.innovation_factor,
                technique.adaptation_rate,
            ],
        )?;

        if let Some(entry) = technique.evolution_history.last() {
            conn.execute(
                "INSERT INTO evolution_history (technique, timestamp, score, aesthetic, complexity, innovation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    technique.name,
                    format_timestamp(&entry.timestamp),
                    entry.score,
                    entry.aesthetic,
                    entry.complexity,
                    entry.innovation,
                ],
            )?;
        }

        let now = format_timestamp(&Utc::now());
        for (other, score) in &technique.synergy_scores {
            let (first, second) = canonical_pair(&technique.name, other);
            conn.execute(
                "INSERT INTO technique_synergy (technique1, technique2, synergy_score, last_updated)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(technique1, technique2)
                 DO UPDATE SET synergy_score = excluded.synergy_score, last_updated = excluded.last_updated",
                params![first, second, score, now],
            )?;
        }

        info!(
            "Saved technique {} (uses {}, avg {:.2})",
            technique.name, technique.usage_count, technique.avg_score
        );
        Ok(())
    }

    /// Canonical synergy pairs scoring at least `min_score`, best first.
    pub fn get_synergy_pairs(&self, min_score: f64) -> Result<Vec<SynergyPair>, StoreError> {
        let conn = self.store.connect()?;
        self.synergy_pairs_with(&conn, min_score)
    }

    fn synergy_pairs_with(
        &self,
        conn: &rusqlite::Connection,
        min_score: f64,
    ) -> Result<Vec<SynergyPair>, StoreError> {
        let pairs = conn
            .prepare(
                "SELECT technique1, technique2, synergy_score FROM technique_synergy
                 WHERE synergy_score >= ?1
                 ORDER BY synergy_score DESC, technique1, technique2",
            )?
            .query_map([min_score], |row| {
                Ok(SynergyPair {
                    first: row.get(0)?,
                    second: row.get(1)?,
                    score: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(pairs)
    }

    /// Set the synergy of a pair and bump its usage counter.
    pub fn update_synergy_pair(&self, a: &str, b: &str, score: f64) -> Result<(), StoreError> {
        let (first, second) = canonical_pair(a, b);
        let conn = self.store.connect()?;
        conn.execute(
            "INSERT INTO technique_synergy (technique1, technique2, synergy_score, last_updated, usage_count)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(technique1, technique2)
             DO UPDATE SET synergy_score = excluded.synergy_score,
                           last_updated = excluded.last_updated,
                           usage_count = usage_count + 1",
            params![first, second, score, format_timestamp(&Utc::now())],
        )?;
        Ok(())
    }

    /// Most recent history entries of a technique, newest first.
    pub fn technique_evolution(&self, name: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.store.connect()?;
        history_rows(&conn, name, i64::try_from(limit).unwrap_or(i64::MAX))
    }

    /// Rebuild a full technique (stats, every synergy partner, whole history).
    pub fn load_technique(&self, name: &str) -> Result<Option<Technique>, StoreError> {
        let conn = self.store.connect()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM technique_stats WHERE technique = ?1", STATS_COLUMNS),
                [name],
                StatsRow::from_row,
            )
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let all_pairs = self.synergy_pairs_with(&conn, f64::MIN)?;
        let (name, stats) = row.into_stats(partners_of(&all_pairs, name))?;

        // SQLite treats a negative limit as unbounded
        let mut history = history_rows(&conn, &name, -1)?;
        history.reverse();

        Ok(Some(Technique {
            name,
            category: stats.category,
            success_rate: stats.success_rate,
            usage_count: stats.usage_count,
            avg_score: stats.avg_score,
            aesthetic_score: stats.aesthetic_score,
            complexity_score: stats.complexity_score,
            innovation_factor: stats.innovation_factor,
            adaptation_rate: stats.adaptation_rate,
            last_used: stats.last_used,
            synergy_scores: stats.synergies,
            evolution_history: history,
        }))
    }

    /// Working technique for a new generation.
    ///
    /// A technique used before resumes from its full stored snapshot (see
    /// [`Technique::resume`]); anything else starts with optimistic defaults.
    pub fn materialize(&self, name: &str, category: Category) -> Result<Technique, StoreError> {
        Ok(match self.load_technique(name)? {
            Some(stored) if stored.usage_count > 0 => Technique::resume(stored, category),
            _ => Technique::optimistic(name, category),
        })
    }
}

fn history_rows(
    conn: &rusqlite::Connection,
    name: &str,
    limit: i64,
) -> Result<Vec<HistoryEntry>, StoreError> {
    let rows: Vec<(String, f64, f64, f64, f64)> = conn
        .prepare(
            "SELECT timestamp, score, aesthetic, complexity, innovation FROM evolution_history
             WHERE technique = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?
        .query_map(params![name, limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<_, _>>()?;

    rows.into_iter()
        .map(|(ts, score, aesthetic, complexity, innovation)| {
            Ok(HistoryEntry {
                timestamp: parse_timestamp(&ts)?,
                score,
                aesthetic,
                complexity,
                innovation,
            })
        })
        .collect()
}

/// Partner name to score for every pair touching `name`.
fn partners_of(pairs: &[SynergyPair], name: &str) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .filter(|p| p.touches(name))
        .map(|p| {
            let other = if p.first == name { &p.second } else { &p.first };
            (other.clone(), p.score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Performance, TechniqueCategories};
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store =
            Store::open_with_catalog(tmp.path().join("prism.db"), &TechniqueCategories::default())
                .unwrap();
        (tmp, store)
    }

    fn performance(overall: f64, combined: &[&str]) -> Performance {
        Performance {
            overall,
            aesthetic: 72.0,
            complexity: 68.0,
            innovation: 85.0,
            combined_techniques: combined.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_seeded_catalog_has_no_used_stats() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        assert_eq!(registry.catalog_size().unwrap(), 70);
        assert!(registry.get_stats().unwrap().is_empty());
        // Second seeding is a no-op
        assert_eq!(registry.seed_catalog(&TechniqueCategories::default()).unwrap(), 0);
    }

    #[test]
    fn test_save_and_get_stats() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        let evolved = Technique::optimistic("voronoi_diagrams", Category::Geometry)
            .evolve(&performance(90.0, &["voronoi_diagrams", "circle_packing"]));
        registry.save(&evolved).unwrap();

        let stats = registry.get_stats().unwrap();
        let voronoi = &stats["voronoi_diagrams"];
        assert_eq!(voronoi.usage_count, 1);
        assert_eq!(voronoi.category, Category::Geometry);
        assert!((voronoi.avg_score - evolved.avg_score).abs() < 1e-12);
        // 75 * 0.8 + 90 * 0.2 = 78 stays below the partner threshold
        assert!(voronoi.synergies.is_empty());

        let history = registry.technique_evolution("voronoi_diagrams", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 90.0);
    }

    #[test]
    fn test_synergy_pairs_are_canonical() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        registry.update_synergy_pair("voronoi_diagrams", "circle_packing", 88.0).unwrap();
        registry.update_synergy_pair("circle_packing", "voronoi_diagrams", 91.0).unwrap();
        registry.update_synergy_pair("fractals", "flow_fields", 60.0).unwrap();

        let pairs = registry.get_synergy_pairs(70.0).unwrap();
        assert_eq!(pairs, vec![SynergyPair::new("circle_packing", "voronoi_diagrams", 91.0)]);
        assert_eq!(registry.get_synergy_pairs(0.0).unwrap().len(), 2);
    }

    #[test]
    fn test_stats_include_both_pair_directions() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        for name in ["circle_packing", "voronoi_diagrams"] {
            registry
                .save(&Technique::new(name, Category::Geometry).evolve(&performance(70.0, &[])))
                .unwrap();
        }
        registry.update_synergy_pair("circle_packing", "voronoi_diagrams", 86.0).unwrap();

        let stats = registry.get_stats().unwrap();
        assert_eq!(stats["circle_packing"].synergies["voronoi_diagrams"], 86.0);
        assert_eq!(stats["voronoi_diagrams"].synergies["circle_packing"], 86.0);
    }

    #[test]
    fn test_load_technique_rebuilds_history() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        let mut technique = Technique::new("fractals", Category::Patterns);
        for score in [60.0, 70.0, 80.0] {
            technique = technique.evolve(&performance(score, &["fractals", "flow_fields"]));
            registry.save(&technique).unwrap();
        }

        let loaded = registry.load_technique("fractals").unwrap().unwrap();
        assert_eq!(loaded.usage_count, 3);
        let scores: Vec<f64> = loaded.evolution_history.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![60.0, 70.0, 80.0]);
        assert!((loaded.synergy_score("flow_fields") - technique.synergy_score("flow_fields")).abs() < 1e-12);

        assert!(registry.load_technique("missing").unwrap().is_none());
    }

    #[test]
    fn test_materialize_new_and_used() {
        let (_tmp, store) = store();
        let registry = store.techniques();

        let fresh = registry.materialize("spirograph", Category::Geometry).unwrap();
        assert_eq!(fresh.avg_score, 80.0);
        assert_eq!(fresh.innovation_factor, 1.2);

        let used = Technique::new("spirograph", Category::Geometry)
            .evolve(&performance(90.0, &["spirograph", "fractals"]));
        registry.save(&used).unwrap();
        let known = registry.materialize("spirograph", Category::Geometry).unwrap();
        assert_eq!(known.usage_count, 1);
        assert_eq!(known.aesthetic_score, 90.0);
        assert!((known.complexity_score - 81.0).abs() < 1e-9);
        assert_eq!(known.evolution_history.len(), 1);
        // 78 is below the stats partner threshold but still carried
        assert!((known.synergy_score("fractals") - 78.0).abs() < 1e-9);
        assert_eq!(known.innovation_factor, 1.1);
    }

    #[test]
    fn test_materialized_technique_keeps_learning() {
        let (_tmp, store) = store();
        let registry = store.techniques();
        let mut expected = 75.0;
        let mut rates = Vec::new();
        for round in 0..7 {
            let score = if round % 2 == 0 { 40.0 } else { 95.0 };
            let technique = registry.materialize("fractals", Category::Patterns).unwrap();
            let evolved = technique.evolve(&performance(score, &["fractals", "flow_fields"]));
            registry.save(&evolved).unwrap();
            expected = expected * 0.8 + score * 0.2;
            rates.push(evolved.adaptation_rate);
        }

        let pairs = registry.get_synergy_pairs(f64::MIN).unwrap();
        assert!((pairs[0].score - expected).abs() < 1e-9);
        assert!(rates[..5].iter().all(|&r| r == 1.0));
        assert!(rates[5] < 1.0 && rates[6] < 1.0);
        assert_eq!(registry.load_technique("fractals").unwrap().unwrap().evolution_history.len(), 7);
    }
}
