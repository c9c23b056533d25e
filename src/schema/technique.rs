//! Technique records and their adaptive statistics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ScoreBundle;

/// Synergy assumed for a pair of techniques that have never been scored together.
pub const DEFAULT_SYNERGY: f64 = 75.0;

/// Number of recent history scores used for the stability estimate.
const STABILITY_WINDOW: usize = 5;

/// Technique category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Geometry,
    Motion,
    Patterns,
    /// Name not present in the configured catalog.
    #[default]
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Geometry => "geometry",
            Category::Motion => "motion",
            Category::Patterns => "patterns",
            Category::Unknown => "unknown",
        }
    }

    /// Parse a stored category name; anything unrecognised maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "geometry" => Category::Geometry,
            "motion" => Category::Motion,
            "patterns" => Category::Patterns,
            _ => Category::Unknown,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a technique's evolution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub aesthetic: f64,
    pub complexity: f64,
    pub innovation: f64,
}

impl HistoryEntry {
    /// Value of a named metric (`score`, `aesthetic`, `complexity`, `innovation`).
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "score" => Some(self.score),
            "aesthetic" => Some(self.aesthetic),
            "complexity" => Some(self.complexity),
            "innovation" => Some(self.innovation),
            _ => None,
        }
    }
}

/// Scores a technique contributed to, fed into [`Technique::evolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub overall: f64,
    pub aesthetic: f64,
    pub complexity: f64,
    pub innovation: f64,
    /// Every technique used in the same pattern (may include the technique itself).
    #[serde(default)]
    pub combined_techniques: Vec<String>,
}

impl Performance {
    pub fn from_scores(scores: &ScoreBundle, combined_techniques: &[String]) -> Self {
        Self {
            overall: scores.overall,
            aesthetic: scores.aesthetic,
            complexity: scores.complexity,
            innovation: scores.innovation,
            combined_techniques: combined_techniques.to_vec(),
        }
    }
}

/// Persisted per-technique statistics, as read back from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueStats {
    pub category: Category,
    pub avg_score: f64,
    pub usage_count: u64,
    pub success_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub aesthetic_score: f64,
    pub complexity_score: f64,
    pub innovation_factor: f64,
    pub adaptation_rate: f64,
    /// High-scoring synergy partners (>= 80).
    pub synergies: BTreeMap<String, f64>,
}

/// A named creative primitive with adaptive statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technique {
    pub name: String,
    pub category: Category,
    /// In [0, 1].
    pub success_rate: f64,
    pub usage_count: u64,
    pub avg_score: f64,
    pub aesthetic_score: f64,
    pub complexity_score: f64,
    /// Multiplicative; grows 10% per use with innovation above 80.
    pub innovation_factor: f64,
    /// Inverse of recent score volatility, in (0, 1].
    pub adaptation_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub synergy_scores: BTreeMap<String, f64>,
    pub evolution_history: Vec<HistoryEntry>,
}

impl Technique {
    /// Technique with the neutral defaults a fresh registry row carries.
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            success_rate: 0.75,
            usage_count: 0,
            avg_score: 75.0,
            aesthetic_score: 75.0,
            complexity_score: 75.0,
            innovation_factor: 1.0,
            adaptation_rate: 1.0,
            last_used: None,
            synergy_scores: BTreeMap::new(),
            evolution_history: Vec::new(),
        }
    }

    /// Never-used technique: optimistic scores so it gets tried.
    pub fn optimistic(name: impl Into<String>, category: Category) -> Self {
        Self {
            success_rate: 0.8,
            avg_score: 80.0,
            aesthetic_score: 80.0,
            complexity_score: 80.0,
            innovation_factor: 1.2,
            last_used: Some(Utc::now()),
            ..Self::new(name, category)
        }
    }

    /// Previously used technique resumed from its persisted snapshot.
    ///
    /// History, synergy partners, usage and adaptation rate carry over so the
    /// next [`Technique::evolve`] continues from them. Aesthetic and complexity
    /// are floored at 75 and the innovation factor restarts from `avg_score`.
    pub fn resume(stored: Technique, category: Category) -> Self {
        let avg = stored.avg_score;
        Self {
            category,
            aesthetic_score: avg.max(75.0),
            complexity_score: (avg * 0.9).max(75.0),
            innovation_factor: if avg > 80.0 { 1.1 } else { 1.0 },
            last_used: Some(Utc::now()),
            ..stored
        }
    }

    /// Synergy with another technique, defaulting to 75.
    pub fn synergy_score(&self, other: &str) -> f64 {
        self.synergy_scores
            .get(other)
            .copied()
            .unwrap_or(DEFAULT_SYNERGY)
    }

    /// Create the evolved snapshot after contributing to a scored pattern.
    pub fn evolve(&self, performance: &Performance) -> Technique {
        self.evolve_at(performance, Utc::now())
    }

    /// [`Technique::evolve`] with an explicit clock.
    pub fn evolve_at(&self, performance: &Performance, now: DateTime<Utc>) -> Technique {
        let score = performance.overall;

        let mut history = self.evolution_history.clone();
        history.push(HistoryEntry {
            timestamp: now,
            score,
            aesthetic: performance.aesthetic,
            complexity: performance.complexity,
            innovation: performance.innovation,
        });

        let mut adaptation_rate = self.adaptation_rate;
        if history.len() > STABILITY_WINDOW {
            let recent: Vec<f64> = history[history.len() - STABILITY_WINDOW..]
                .iter()
                .map(|h| h.score)
                .collect();
            adaptation_rate = 1.0 / (1.0 + population_std(&recent));
        }

        let usage = self.usage_count as f64;
        let success_rate = (self.success_rate * usage + (score / 100.0) * adaptation_rate)
            / (usage + adaptation_rate);
        let avg_score =
            (self.avg_score * usage + score * adaptation_rate) / (usage + adaptation_rate);

        let mut synergy_scores = self.synergy_scores.clone();
        for other in &performance.combined_techniques {
            if *other != self.name {
                let current = synergy_scores
                    .get(other)
                    .copied()
                    .unwrap_or(DEFAULT_SYNERGY);
                synergy_scores.insert(other.clone(), current * 0.8 + score * 0.2);
            }
        }

        let innovation_factor = if performance.innovation > 80.0 {
            self.innovation_factor * 1.1
        } else {
            self.innovation_factor
        };

        Technique {
            name: self.name.clone(),
            category: self.category,
            success_rate,
            usage_count: self.usage_count + 1,
            avg_score,
            aesthetic_score: performance.aesthetic,
            complexity_score: performance.complexity,
            innovation_factor,
            adaptation_rate,
            last_used: Some(now),
            synergy_scores,
            evolution_history: history,
        }
    }

    /// Least-squares slope of a metric over the last `window` history entries.
    pub fn evolution_trend(&self, metric: &str, window: usize) -> f64 {
        if self.evolution_history.len() < 2 {
            return 0.0;
        }
        let start = self.evolution_history.len().saturating_sub(window);
        let values: Vec<f64> = self.evolution_history[start..]
            .iter()
            .filter_map(|h| h.metric(metric))
            .collect();
        if values.len() < 2 {
            return 0.0;
        }

        let n = values.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n;
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        if den > 0.0 { num / den } else { 0.0 }
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Order a pair of technique names the way synergy rows are keyed.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// A stored synergy row, always in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynergyPair {
    pub first: String,
    pub second: String,
    pub score: f64,
}

impl SynergyPair {
    pub fn new(a: &str, b: &str, score: f64) -> Self {
        let (first, second) = canonical_pair(a, b);
        Self {
            first: first.to_string(),
            second: second.to_string(),
            score,
        }
    }

    pub fn touches(&self, name: &str) -> bool {
        self.first == name || self.second == name
    }
}

/// Symmetric in-memory lookup over synergy pairs.
#[derive(Debug, Clone, Default)]
pub struct SynergyTable {
    scores: HashMap<(String, String), f64>,
}

impl SynergyTable {
    pub fn from_pairs<I: IntoIterator<Item = SynergyPair>>(pairs: I) -> Self {
        let scores = pairs
            .into_iter()
            .map(|p| {
                let (a, b) = canonical_pair(&p.first, &p.second);
                ((a.to_string(), b.to_string()), p.score)
            })
            .collect();
        Self { scores }
    }

    /// Stored score for the pair, in either order.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let (first, second) = canonical_pair(a, b);
        self.scores
            .get(&(first.to_string(), second.to_string()))
            .copied()
    }

    /// Stored score, or 75 for an unseen pair.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.get(a, b).unwrap_or(DEFAULT_SYNERGY)
    }

    /// Whether any pair involving `name` reaches `threshold`.
    pub fn has_partner_above(&self, name: &str, threshold: f64) -> bool {
        self.scores
            .iter()
            .any(|((a, b), &s)| (a == name || b == name) && s >= threshold)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn performance(overall: f64, innovation: f64, combined: &[&str]) -> Performance {
        Performance {
            overall,
            aesthetic: 70.0,
            complexity: 65.0,
            innovation,
            combined_techniques: combined.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_evolve_does_not_mutate_source() {
        let original = Technique::new("fractals", Category::Patterns);
        let evolved = original.evolve(&performance(90.0, 85.0, &["fractals", "flow_fields"]));

        assert!(original.evolution_history.is_empty());
        assert!(original.synergy_scores.is_empty());
        assert_eq!(original.usage_count, 0);

        assert_eq!(evolved.usage_count, 1);
        assert_eq!(evolved.evolution_history.len(), 1);
        assert_eq!(evolved.aesthetic_score, 70.0);
        assert_eq!(evolved.complexity_score, 65.0);
    }

    #[test]
    fn test_first_evolution_takes_observed_score() {
        // usage 0: the weighted average collapses to the new observation
        let technique = Technique::new("spirograph", Category::Geometry);
        let evolved = technique.evolve(&performance(60.0, 50.0, &[]));
        assert!((evolved.avg_score - 60.0).abs() < 1e-12);
        assert!((evolved.success_rate - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_synergy_blend_skips_self() {
        let technique = Technique::new("fractals", Category::Patterns);
        let evolved = technique.evolve(&performance(95.0, 50.0, &["fractals", "flow_fields"]));

        assert!(!evolved.synergy_scores.contains_key("fractals"));
        let blended = evolved.synergy_score("flow_fields");
        assert!((blended - (75.0 * 0.8 + 95.0 * 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_innovation_factor_growth() {
        let technique = Technique::new("fractals", Category::Patterns);
        let boosted = technique.evolve(&performance(70.0, 81.0, &[]));
        assert!((boosted.innovation_factor - 1.1).abs() < 1e-12);

        let flat = technique.evolve(&performance(70.0, 80.0, &[]));
        assert_eq!(flat.innovation_factor, 1.0);
    }

    #[test]
    fn test_adaptation_rate_drops_when_unstable() {
        let mut technique = Technique::new("oscillation", Category::Motion);
        for score in [40.0, 90.0, 40.0, 90.0, 40.0, 90.0] {
            technique = technique.evolve(&performance(score, 50.0, &[]));
        }
        assert!(technique.adaptation_rate < 0.1);
    }

    #[test]
    fn test_evolution_trend() {
        let mut technique = Technique::new("oscillation", Category::Motion);
        assert_eq!(technique.evolution_trend("score", 5), 0.0);
        for score in [50.0, 60.0, 70.0, 80.0] {
            technique = technique.evolve(&performance(score, 50.0, &[]));
        }
        assert!((technique.evolution_trend("score", 5) - 10.0).abs() < 1e-9);
        assert_eq!(technique.evolution_trend("unknown", 5), 0.0);
    }

    #[test]
    fn test_resume_floors_and_keeps_state() {
        let mut stored = Technique::new("cardioids", Category::Geometry);
        for score in [60.0, 55.0, 65.0] {
            stored = stored.evolve(&performance(score, 50.0, &["cardioids", "spirograph"]));
        }
        stored.innovation_factor = 1.3;
        stored.adaptation_rate = 0.5;

        let technique = Technique::resume(stored.clone(), Category::Geometry);
        assert_eq!(technique.aesthetic_score, 75.0);
        assert_eq!(technique.complexity_score, 75.0);
        assert_eq!(technique.innovation_factor, 1.0);
        assert_eq!(technique.usage_count, 3);
        assert_eq!(technique.adaptation_rate, 0.5);
        assert_eq!(technique.evolution_history, stored.evolution_history);
        assert_eq!(technique.synergy_scores, stored.synergy_scores);
    }

    #[test]
    fn test_synergy_table_symmetric() {
        let table = SynergyTable::from_pairs([SynergyPair::new("voronoi", "circle", 88.0)]);
        assert_eq!(table.get("circle", "voronoi"), Some(88.0));
        assert_eq!(table.get("voronoi", "circle"), Some(88.0));
        assert_eq!(table.score("circle", "fractals"), DEFAULT_SYNERGY);
        assert!(table.has_partner_above("voronoi", 85.0));
        assert!(!table.has_partner_above("fractals", 85.0));
    }

    proptest! {
        #[test]
        fn prop_usage_count_accounting(scores in prop::collection::vec(0.0f64..100.0, 1..30)) {
            let mut technique = Technique::new("fractals", Category::Patterns);
            for &s in &scores {
                technique = technique.evolve(&performance(s, 50.0, &["flow_fields"]));
            }
            prop_assert_eq!(technique.usage_count, scores.len() as u64);
            prop_assert!(technique.adaptation_rate > 0.0 && technique.adaptation_rate <= 1.0);
            prop_assert!(technique.success_rate >= 0.0 && technique.success_rate <= 1.0);
        }

        #[test]
        fn prop_constant_stream_keeps_full_rate(score in 0.0f64..100.0, n in 6usize..20) {
            let mut technique = Technique::new("fractals", Category::Patterns);
            for _ in 0..n {
                technique = technique.evolve(&performance(score, 50.0, &[]));
            }
            prop_assert!((technique.adaptation_rate - 1.0).abs() < 1e-12);
        }

        #[test]
        fn prop_canonical_pair_symmetric(a in "[a-z_]{1,12}", b in "[a-z_]{1,12}") {
            prop_assert_eq!(canonical_pair(&a, &b), canonical_pair(&b, &a));
        }
    }
}
