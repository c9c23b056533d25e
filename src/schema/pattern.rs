//! Pattern records: one scored generative-art artifact per version.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score every field starts at until the pattern is evaluated.
pub const PENDING_SCORE: f64 = 75.0;

/// A generated artifact with its scores and lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Storage-assigned row id (None until persisted).
    pub id: Option<i64>,
    /// Monotonic, never reused.
    pub version: i64,
    /// Generated source; empty for image-only patterns.
    pub code: String,
    pub timestamp: DateTime<Utc>,
    /// Technique names in the order they were selected.
    pub techniques: Vec<String>,
    /// Overall score.
    pub score: f64,
    pub innovation_score: f64,
    pub aesthetic_score: f64,
    pub mathematical_complexity: f64,
    pub motion_quality: f64,
    pub visual_coherence: f64,
    pub technique_synergy: f64,
    /// Ancestor versions, deduplicated.
    pub parent_patterns: Vec<i64>,
    /// Parent versions followed by this version.
    pub evolution_chain: Vec<i64>,
}

impl Pattern {
    /// Create an unscored root pattern.
    pub fn new(version: i64, code: impl Into<String>, techniques: Vec<String>) -> Self {
        Self {
            id: None,
            version,
            code: code.into(),
            timestamp: Utc::now(),
            techniques,
            score: PENDING_SCORE,
            innovation_score: PENDING_SCORE,
            aesthetic_score: PENDING_SCORE,
            mathematical_complexity: PENDING_SCORE,
            motion_quality: PENDING_SCORE,
            visual_coherence: PENDING_SCORE,
            technique_synergy: PENDING_SCORE,
            parent_patterns: Vec::new(),
            evolution_chain: vec![version],
        }
    }

    /// A pattern without parents starts its own lineage.
    pub fn is_root(&self) -> bool {
        self.parent_patterns.is_empty()
    }

    /// All seven scores keyed by short metric name.
    pub fn metrics(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("score", self.score),
            ("innovation", self.innovation_score),
            ("aesthetic", self.aesthetic_score),
            ("complexity", self.mathematical_complexity),
            ("motion", self.motion_quality),
            ("coherence", self.visual_coherence),
            ("synergy", self.technique_synergy),
        ])
    }

    /// Copy a scoring result into the pattern.
    pub fn update_scores(&mut self, scores: &ScoreBundle) {
        self.score = scores.overall;
        self.innovation_score = scores.innovation;
        self.aesthetic_score = scores.aesthetic;
        self.mathematical_complexity = scores.complexity;
        self.motion_quality = scores.motion;
        self.visual_coherence = scores.coherence;
        self.technique_synergy = scores.synergy;
    }

    /// Record a parent version and rebuild the evolution chain.
    pub fn add_to_evolution_chain(&mut self, parent_version: i64) {
        if !self.parent_patterns.contains(&parent_version) {
            self.parent_patterns.push(parent_version);
        }
        self.rebuild_chain();
    }

    pub(crate) fn rebuild_chain(&mut self) {
        self.evolution_chain = self
            .parent_patterns
            .iter()
            .copied()
            .chain(std::iter::once(self.version))
            .collect();
    }
}

/// Output of one scoring pass. All values are plain `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBundle {
    pub overall: f64,
    pub complexity: f64,
    pub innovation: f64,
    pub aesthetic: f64,
    pub motion: f64,
    pub coherence: f64,
    pub synergy: f64,
}

impl ScoreBundle {
    /// `(name, value)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, f64); 7] {
        [
            ("overall", self.overall),
            ("complexity", self.complexity),
            ("innovation", self.innovation),
            ("aesthetic", self.aesthetic),
            ("motion", self.motion),
            ("coherence", self.coherence),
            ("synergy", self.synergy),
        ]
    }
}
