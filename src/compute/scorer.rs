//! Pattern scoring: frame metrics, novelty against history, technique synergy
//! and the dynamically weighted overall score.

use std::collections::BTreeSet;
use std::path::Path;

use image::GrayImage;
use log::{debug, error, info, warn};

use super::frames::FrameStore;
use super::metrics::{FrameMetricsEngine, MetricError, frame_variation, mean_frame};
use super::noise::{Fallback, ScoreRng};
use crate::schema::{AnalysisConfig, DEFAULT_SYNERGY, Pattern, PrismConfig, ScoreBundle, SynergyTable};
use crate::store::{Store, StoreError};

/// Innovation of the first pattern ever scored.
pub const FIRST_PATTERN_INNOVATION: f64 = 85.0;

/// Innovation before novelty bonuses.
const INNOVATION_BASE: f64 = 75.0;
/// Cap on each novelty bonus.
const MAX_BONUS: f64 = 10.0;
/// Bonus used when a bonus cannot be computed.
const BONUS_ON_ERROR: f64 = 5.0;

/// Multiplier for patterns combining at least three techniques.
const MULTI_TECHNIQUE_BOOST: f64 = 1.15;
/// Multiplier when frame-to-frame variation exceeds [`VARIATION_THRESHOLD`].
const VARIATION_BOOST: f64 = 1.1;
const VARIATION_THRESHOLD: f64 = 0.1;

pub const INNOVATION_FALLBACK: Fallback = Fallback::new(70.0, 10.0);
pub const SYNERGY_FALLBACK: Fallback = Fallback::new(75.0, 5.0);

/// Randomized bundle returned when no frames can be analysed, in draw order.
pub const DEFAULT_BUNDLE: [Fallback; 7] = [
    Fallback::new(65.0, 5.0),  // overall
    Fallback::new(60.0, 7.0),  // complexity
    Fallback::new(70.0, 10.0), // innovation
    Fallback::new(65.0, 5.0),  // aesthetic
    Fallback::new(60.0, 8.0),  // motion
    Fallback::new(70.0, 5.0),  // coherence
    Fallback::new(75.0, 5.0),  // synergy
];

/// Relative weight of each primary metric in the overall score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub complexity: f64,
    pub innovation: f64,
    pub aesthetic: f64,
    pub motion: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            complexity: 0.25,
            innovation: 0.35,
            aesthetic: 0.25,
            motion: 0.15,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.complexity + self.innovation + self.aesthetic + self.motion
    }

    fn normalized(self) -> Self {
        let total = self.sum();
        Self {
            complexity: self.complexity / total,
            innovation: self.innovation / total,
            aesthetic: self.aesthetic / total,
            motion: self.motion / total,
        }
    }
}

/// Shift weight toward whichever metrics stand out.
///
/// Adjustments are cumulative and applied in a fixed order (motion,
/// aesthetic, technique count, complexity, innovation), then normalized.
pub fn dynamic_weights(
    complexity: f64,
    innovation: f64,
    aesthetic: f64,
    motion: f64,
    technique_count: usize,
) -> Weights {
    let mut w = Weights::default();

    if motion > 80.0 {
        w.motion += 0.1;
        w.complexity -= 0.05;
        w.innovation -= 0.05;
    }
    if aesthetic > 85.0 {
        w.aesthetic += 0.1;
        w.complexity -= 0.05;
        w.motion -= 0.05;
    }
    if technique_count > 2 {
        w.innovation += 0.05;
        w.complexity += 0.05;
        w.aesthetic -= 0.05;
        w.motion -= 0.05;
    }
    if complexity > 80.0 {
        w.complexity += 0.1;
        w.innovation -= 0.05;
        w.aesthetic -= 0.05;
    }
    if innovation > 85.0 {
        w.innovation += 0.1;
        w.complexity -= 0.05;
        w.aesthetic -= 0.05;
    }

    w.normalized()
}

/// Weighted primary metrics nudged by coherence and synergy, clamped to [10, 100].
pub fn overall_score(
    weights: &Weights,
    complexity: f64,
    innovation: f64,
    aesthetic: f64,
    motion: f64,
    coherence: f64,
    synergy: f64,
) -> f64 {
    let weighted = complexity * weights.complexity
        + innovation * weights.innovation
        + aesthetic * weights.aesthetic
        + motion * weights.motion;
    let nudged = weighted * (1.0 + (coherence - 75.0) / 200.0) * (1.0 + (synergy - 75.0) / 200.0);
    nudged.clamp(10.0, 100.0)
}

/// Bonus for a technique set unlike recent ones: 0 for an exact repeat,
/// otherwise 10 minus 2 per overlapping historical set.
pub fn technique_bonus(current: &[String], history: &[Vec<String>]) -> f64 {
    if history.is_empty() || current.is_empty() {
        return MAX_BONUS;
    }
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let sets: Vec<BTreeSet<&str>> = history
        .iter()
        .map(|h| h.iter().map(String::as_str).collect())
        .collect();

    if sets.iter().any(|s| *s == current) {
        return 0.0;
    }
    let overlapping = sets.iter().filter(|s| !s.is_disjoint(&current)).count();
    (MAX_BONUS - 2.0 * overlapping as f64).max(0.0)
}

/// Bonus for looking unlike historical renders: mean absolute difference of
/// average frames, scaled and capped at 10.
pub fn visual_bonus(frames: &[GrayImage], history: &[Vec<GrayImage>]) -> Result<f64, MetricError> {
    if history.is_empty() {
        return Ok(MAX_BONUS);
    }
    let (w, h, current) = mean_frame(frames)?;

    let mut total = 0.0;
    for hist in history {
        let (hw, hh, past) = mean_frame(hist)?;
        if (hw, hh) != (w, h) {
            return Err(MetricError::DimensionMismatch {
                expected: (w, h),
                found: (hw, hh),
            });
        }
        let diff: f64 = current.iter().zip(past.iter()).map(|(a, b)| (a - b).abs()).sum();
        total += diff / current.len() as f64 / 255.0;
    }
    let avg_diff = total / history.len() as f64;
    Ok((avg_diff * 20.0).min(MAX_BONUS))
}

/// Mean pairwise synergy of a technique list in `[0, 1]`; 0.75 for fewer than two.
pub fn technique_synergy(techniques: &[String], table: &SynergyTable) -> f64 {
    if techniques.len() < 2 {
        return DEFAULT_SYNERGY / 100.0;
    }
    let mut scores = Vec::new();
    for (i, a) in techniques.iter().enumerate() {
        for b in &techniques[i + 1..] {
            scores.push(table.score(a, b) / 100.0);
        }
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Scores rendered patterns against their history.
pub struct PatternScorer<'a> {
    store: &'a Store,
    frames: FrameStore,
    engine: FrameMetricsEngine,
    analysis: AnalysisConfig,
    rng: ScoreRng,
}

impl<'a> PatternScorer<'a> {
    pub fn new(store: &'a Store, config: &PrismConfig) -> Self {
        Self {
            store,
            frames: FrameStore::new(&config.paths, &config.analysis),
            engine: FrameMetricsEngine::default(),
            analysis: config.analysis.clone(),
            rng: ScoreRng::from_seed(config.random_seed),
        }
    }

    /// Replace the noise source.
    pub fn with_rng(mut self, rng: ScoreRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn frame_store(&self) -> &FrameStore {
        &self.frames
    }

    /// Score a pattern from the frames in `render_dir`.
    ///
    /// Never fails: missing data yields [`DEFAULT_BUNDLE`] draws and each
    /// failing component falls back on its own.
    pub fn score(&mut self, pattern: &Pattern, render_dir: &Path) -> ScoreBundle {
        if !render_dir.exists() {
            error!("Render path does not exist: {}", render_dir.display());
            return self.default_bundle();
        }
        let frames = self.frames.load(render_dir);
        if frames.is_empty() {
            error!("No frames loaded for pattern v{}", pattern.version);
            return self.default_bundle();
        }
        debug!("Analyzing {} frames for pattern v{}", frames.len(), pattern.version);

        let metrics = self.engine.measure(&frames, &mut self.rng);

        let mut innovation = match self.innovation(&frames, pattern) {
            Ok(value) => value,
            Err(e) => {
                error!("Innovation history unavailable: {}", e);
                INNOVATION_FALLBACK.draw(&mut self.rng)
            }
        };
        if pattern.techniques.len() >= 3 {
            innovation = (innovation * MULTI_TECHNIQUE_BOOST).min(100.0);
        }

        let mut aesthetic = metrics.aesthetic;
        if frame_variation(&frames) > VARIATION_THRESHOLD {
            aesthetic = (aesthetic * VARIATION_BOOST).min(100.0);
        }

        let synergy = match self.synergy(pattern) {
            Ok(value) => value * 100.0,
            Err(e) => {
                error!("Synergy lookup failed: {}", e);
                SYNERGY_FALLBACK.draw(&mut self.rng)
            }
        };

        let weights = dynamic_weights(
            metrics.complexity,
            innovation,
            aesthetic,
            metrics.motion,
            pattern.techniques.len(),
        );
        let overall = overall_score(
            &weights,
            metrics.complexity,
            innovation,
            aesthetic,
            metrics.motion,
            metrics.coherence,
            synergy,
        );

        info!("Pattern v{} scored {:.2}", pattern.version, overall);
        ScoreBundle {
            overall,
            complexity: metrics.complexity,
            innovation,
            aesthetic,
            motion: metrics.motion,
            coherence: metrics.coherence,
            synergy,
        }
    }

    /// Draw the randomized default bundle.
    pub fn default_bundle(&mut self) -> ScoreBundle {
        let [overall, complexity, innovation, aesthetic, motion, coherence, synergy] =
            DEFAULT_BUNDLE.map(|f| f.draw(&mut self.rng));
        ScoreBundle {
            overall,
            complexity,
            innovation,
            aesthetic,
            motion,
            coherence,
            synergy,
        }
    }

    /// Raw innovation before the multi-technique multiplier.
    pub fn innovation(&mut self, frames: &[GrayImage], pattern: &Pattern) -> Result<f64, StoreError> {
        let history = self.historical_frames()?;
        if history.is_empty() {
            debug!("No historical frames; first pattern is maximally innovative");
            return Ok(FIRST_PATTERN_INNOVATION);
        }

        let recent = self
            .store
            .patterns()
            .historical_techniques(self.analysis.history_technique_sets)?;
        let technique = technique_bonus(&pattern.techniques, &recent);

        let visual = visual_bonus(frames, &history).unwrap_or_else(|e| {
            warn!("Visual bonus unavailable: {}", e);
            BONUS_ON_ERROR
        });

        debug!("Innovation bonuses: technique {:.2}, visual {:.2}", technique, visual);
        Ok((INNOVATION_BASE + technique + visual).min(100.0))
    }

    /// Frames of recent successful patterns that still have renders on disk.
    fn historical_frames(&self) -> Result<Vec<Vec<GrayImage>>, StoreError> {
        let successful = self
            .store
            .patterns()
            .successful(self.analysis.history_min_score, self.analysis.history_patterns)?;

        Ok(successful
            .iter()
            .map(|p| self.frames.load_version(p.version))
            .filter(|frames| !frames.is_empty())
            .collect())
    }

    /// Technique synergy in `[0, 1]` from stored pairs above the lookup floor.
    pub fn synergy(&self, pattern: &Pattern) -> Result<f64, StoreError> {
        if pattern.techniques.len() < 2 {
            return Ok(DEFAULT_SYNERGY / 100.0);
        }
        let pairs = self
            .store
            .techniques()
            .get_synergy_pairs(self.analysis.synergy_lookup_floor)?;
        Ok(technique_synergy(&pattern.techniques, &SynergyTable::from_pairs(pairs)))
    }
}
