//! Closing the loop: score a render, evolve its techniques, persist the pattern.

use std::path::Path;

use log::info;

use crate::compute::PatternScorer;
use crate::schema::{Pattern, Performance, ScoreBundle, Technique};
use crate::store::{Store, StoreError};

/// Result of recording one generation.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// The persisted pattern, with its storage id.
    pub pattern: Pattern,
    pub scores: ScoreBundle,
    /// Technique snapshots written back to the registry.
    pub evolved: Vec<Technique>,
}

/// Scores patterns and feeds the results back into the registry.
pub struct FeedbackLoop<'a> {
    store: &'a Store,
    scorer: PatternScorer<'a>,
}

impl<'a> FeedbackLoop<'a> {
    pub fn new(store: &'a Store, scorer: PatternScorer<'a>) -> Self {
        Self { store, scorer }
    }

    /// Score `pattern` from `render_dir`, evolve and save each of `techniques`,
    /// then save the pattern once.
    ///
    /// Scoring never fails. Store writes do, and are returned as-is; technique
    /// rows already written stay written.
    pub fn record(
        &mut self,
        mut pattern: Pattern,
        techniques: &[Technique],
        render_dir: &Path,
    ) -> Result<Recorded, StoreError> {
        let scores = self.scorer.score(&pattern, render_dir);
        pattern.update_scores(&scores);

        let performance = Performance::from_scores(&scores, &pattern.techniques);
        let registry = self.store.techniques();
        let mut evolved = Vec::with_capacity(techniques.len());
        for technique in techniques {
            let next = technique.evolve(&performance);
            registry.save(&next)?;
            evolved.push(next);
        }

        let id = self.store.patterns().save(&pattern)?;
        pattern.id = Some(id);
        info!(
            "Recorded pattern v{} (score {:.2}, {} techniques evolved)",
            pattern.version,
            scores.overall,
            evolved.len()
        );

        Ok(Recorded {
            pattern,
            scores,
            evolved,
        })
    }
}
