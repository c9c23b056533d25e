//! Performance-weighted, synergy-aware technique selection.

use std::collections::{BTreeMap, HashSet};

use log::{debug, error, info};
use rand::distributions::WeightedError;

use crate::compute::ScoreRng;
use crate::schema::{
    Category, GenerationTarget, PrismConfig, SynergyTable, Technique, TechniqueCategories,
    TechniqueStats,
};
use crate::store::{Store, StoreError};

/// Substrings that mark a technique as visually oriented for image targets.
const VISUAL_KEYWORDS: [&str; 4] = ["color", "pattern", "texture", "composition"];

const VISUAL_BOOST: f64 = 1.3;
const ADAPTIVE_BOOST: f64 = 1.2;
/// Applied to techniques with a stored partner at or above [`STRONG_SYNERGY`].
const SYNERGY_BOOST: f64 = 1.3;
const STRONG_SYNERGY: f64 = 85.0;
const ADAPTIVE_THRESHOLD: f64 = 1.1;

/// Baseline synergy; reweighting divides by it.
const NEUTRAL_SYNERGY: f64 = 75.0;

/// Why a selection produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("No techniques configured")]
    EmptyPool,
    #[error("Invalid selection weights: {0}")]
    Weights(#[from] WeightedError),
    #[error("Technique history unavailable: {0}")]
    Store(#[from] StoreError),
}

/// A technique eligible for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub category: Category,
    pub weight: f64,
}

/// Picks technique sets for the next generation from the configured catalog.
pub struct EvolutionSelector<'a> {
    store: &'a Store,
    categories: TechniqueCategories,
    target: GenerationTarget,
    rng: ScoreRng,
}

impl<'a> EvolutionSelector<'a> {
    pub fn new(store: &'a Store, config: &PrismConfig) -> Self {
        Self {
            store,
            categories: config.technique_categories.clone(),
            target: config.target,
            rng: ScoreRng::from_seed(config.random_seed),
        }
    }

    /// Replace the random source.
    pub fn with_rng(mut self, rng: ScoreRng) -> Self {
        self.rng = rng;
        self
    }

    /// Select 2-3 techniques for image targets, 1-4 otherwise.
    ///
    /// Any failure is logged and yields an empty list; callers must not
    /// generate a pattern from an empty selection.
    pub fn select_techniques(&mut self) -> Vec<Technique> {
        match self.try_select() {
            Ok(selected) => selected,
            Err(e) => {
                error!("Error selecting techniques: {}", e);
                Vec::new()
            }
        }
    }

    /// Fallible form of [`EvolutionSelector::select_techniques`].
    pub fn try_select(&mut self) -> Result<Vec<Technique>, SelectionError> {
        let count = if self.target.is_image() {
            self.rng.range_inclusive(2, 3)
        } else {
            self.rng.range_inclusive(1, 4)
        };

        let registry = self.store.techniques();
        let stats = registry.get_stats()?;
        let synergy = SynergyTable::from_pairs(registry.get_synergy_pairs(f64::MIN)?);

        let mut pool = build_pool(&self.categories, &stats, &synergy, self.target);
        if pool.is_empty() {
            return Err(SelectionError::EmptyPool);
        }

        let weights: Vec<f64> = pool.iter().map(|c| c.weight).collect();
        let first = pool.swap_remove(self.rng.weighted_index(&weights)?);
        debug!("First technique: {} (weight {:.3})", first.name, first.weight);
        let mut selected = vec![first];

        while selected.len() < count && !pool.is_empty() {
            let weights: Vec<f64> = pool
                .iter()
                .map(|c| c.weight * mean_synergy(&c.name, &selected, &synergy) / NEUTRAL_SYNERGY)
                .collect();
            let next = pool.swap_remove(self.rng.weighted_index(&weights)?);
            debug!("Next technique: {}", next.name);
            selected.push(next);
        }

        let techniques: Vec<Technique> = selected
            .iter()
            .map(|c| registry.materialize(&c.name, c.category))
            .collect::<Result<_, _>>()?;
        info!(
            "Selected techniques: {}",
            techniques
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(techniques)
    }
}

/// Weighted pool over every configured technique. Duplicate names keep their
/// first category.
pub fn build_pool(
    categories: &TechniqueCategories,
    stats: &BTreeMap<String, TechniqueStats>,
    synergy: &SynergyTable,
    target: GenerationTarget,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut pool = Vec::with_capacity(categories.len());
    for (category, names) in categories.iter() {
        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            pool.push(Candidate {
                name: name.clone(),
                category,
                weight: pool_weight(name, stats.get(name), synergy, target),
            });
        }
    }
    pool
}

/// Selection weight of one technique.
pub fn pool_weight(
    name: &str,
    stats: Option<&TechniqueStats>,
    synergy: &SynergyTable,
    target: GenerationTarget,
) -> f64 {
    let mut weight = 1.0;
    if let Some(s) = stats {
        weight *= 0.4 * (s.avg_score / 100.0) + 0.3 * s.success_rate + 0.3 * s.innovation_factor;
        if s.adaptation_rate > ADAPTIVE_THRESHOLD {
            weight *= ADAPTIVE_BOOST;
        }
    }
    if target.is_image() && VISUAL_KEYWORDS.iter().any(|k| name.contains(k)) {
        weight *= VISUAL_BOOST;
    }
    if synergy.has_partner_above(name, STRONG_SYNERGY) {
        weight *= SYNERGY_BOOST;
    }
    weight
}

/// Average stored synergy between `name` and every selected technique.
fn mean_synergy(name: &str, selected: &[Candidate], synergy: &SynergyTable) -> f64 {
    if selected.is_empty() {
        return NEUTRAL_SYNERGY;
    }
    let total: f64 = selected.iter().map(|s| synergy.score(name, &s.name)).sum();
    total / selected.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Performance, SynergyPair};
    use tempfile::TempDir;

    fn catalog(geometry: &[&str], motion: &[&str], patterns: &[&str]) -> TechniqueCategories {
        let own = |l: &[&str]| l.iter().map(|s| s.to_string()).collect();
        TechniqueCategories {
            geometry: own(geometry),
            motion: own(motion),
            patterns: own(patterns),
        }
    }

    fn setup(categories: TechniqueCategories, target: GenerationTarget) -> (TempDir, Store, PrismConfig) {
        let tmp = TempDir::new().unwrap();
        let config = PrismConfig {
            technique_categories: categories,
            target,
            random_seed: Some(17),
            ..PrismConfig::default()
        };
        let store = Store::open_with_catalog(tmp.path().join("prism.db"), &config.technique_categories).unwrap();
        (tmp, store, config)
    }

    fn stats(avg: f64, success: f64, innovation: f64, adaptation: f64) -> TechniqueStats {
        TechniqueStats {
            category: Category::Geometry,
            avg_score: avg,
            usage_count: 3,
            success_rate: success,
            last_used: None,
            aesthetic_score: avg,
            complexity_score: avg,
            innovation_factor: innovation,
            adaptation_rate: adaptation,
            synergies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_selection_has_no_duplicates() {
        let (_tmp, store, config) = setup(TechniqueCategories::default(), GenerationTarget::Animation);
        let mut selector = EvolutionSelector::new(&store, &config);
        for _ in 0..50 {
            let selected = selector.select_techniques();
            assert!((1..=4).contains(&selected.len()));
            let unique: HashSet<&str> = selected.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(unique.len(), selected.len());
        }
    }

    #[test]
    fn test_selection_bounded_by_catalog() {
        let (_tmp, store, config) = setup(catalog(&["spirograph"], &["oscillation"], &[]), GenerationTarget::Animation);
        let mut selector = EvolutionSelector::new(&store, &config);
        for _ in 0..30 {
            let selected = selector.select_techniques();
            assert!(!selected.is_empty() && selected.len() <= 2);
        }
    }

    #[test]
    fn test_image_target_picks_two_or_three() {
        let (_tmp, store, config) = setup(TechniqueCategories::default(), GenerationTarget::Image);
        let mut selector = EvolutionSelector::new(&store, &config);
        for _ in 0..30 {
            let n = selector.select_techniques().len();
            assert!(n == 2 || n == 3, "selected {}", n);
        }
    }

    #[test]
    fn test_empty_catalog_selects_nothing() {
        let (_tmp, store, config) = setup(catalog(&[], &[], &[]), GenerationTarget::Animation);
        let mut selector = EvolutionSelector::new(&store, &config);
        assert!(selector.select_techniques().is_empty());
        assert!(matches!(selector.try_select(), Err(SelectionError::EmptyPool)));
    }

    #[test]
    fn test_new_techniques_are_optimistic() {
        let (_tmp, store, config) = setup(catalog(&["spirograph"], &[], &[]), GenerationTarget::Animation);
        let selected = EvolutionSelector::new(&store, &config).select_techniques();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].category, Category::Geometry);
        assert_eq!(selected[0].success_rate, 0.8);
        assert_eq!(selected[0].innovation_factor, 1.2);
    }

    #[test]
    fn test_used_technique_inherits_stats() {
        let (_tmp, store, config) = setup(catalog(&[], &["oscillation"], &[]), GenerationTarget::Animation);
        let used = Technique::new("oscillation", Category::Motion).evolve(&Performance {
            overall: 64.0,
            aesthetic: 60.0,
            complexity: 60.0,
            innovation: 50.0,
            combined_techniques: Vec::new(),
        });
        store.techniques().save(&used).unwrap();

        let selected = EvolutionSelector::new(&store, &config).select_techniques();
        assert_eq!(selected[0].usage_count, 1);
        assert_eq!(selected[0].avg_score, 64.0);
        assert_eq!(selected[0].aesthetic_score, 75.0);
        assert_eq!(selected[0].innovation_factor, 1.0);
        assert_eq!(selected[0].evolution_history.len(), 1);
    }

    #[test]
    fn test_selected_technique_keeps_weak_synergies() {
        let (_tmp, store, config) = setup(catalog(&[], &["oscillation"], &[]), GenerationTarget::Animation);
        let used = Technique::new("oscillation", Category::Motion).evolve(&Performance {
            overall: 40.0,
            aesthetic: 60.0,
            complexity: 60.0,
            innovation: 50.0,
            combined_techniques: vec!["oscillation".into(), "flow_fields".into()],
        });
        store.techniques().save(&used).unwrap();

        let selected = EvolutionSelector::new(&store, &config).select_techniques();
        // 75 * 0.8 + 40 * 0.2
        assert!((selected[0].synergy_score("flow_fields") - 68.0).abs() < 1e-9);
    }

    #[test]
    fn test_pool_weight_factors() {
        let empty = SynergyTable::default();
        assert_eq!(pool_weight("fractals", None, &empty, GenerationTarget::Animation), 1.0);

        let s = stats(80.0, 0.5, 1.0, 1.0);
        // 0.32 + 0.15 + 0.3
        let w = pool_weight("fractals", Some(&s), &empty, GenerationTarget::Animation);
        assert!((w - 0.77).abs() < 1e-12);

        let adaptive = stats(80.0, 0.5, 1.0, 1.5);
        let w = pool_weight("fractals", Some(&adaptive), &empty, GenerationTarget::Animation);
        assert!((w - 0.77 * 1.2).abs() < 1e-12);

        assert!((pool_weight("color_harmonies", None, &empty, GenerationTarget::Image) - 1.3).abs() < 1e-12);
        assert_eq!(pool_weight("color_harmonies", None, &empty, GenerationTarget::Animation), 1.0);

        let strong = SynergyTable::from_pairs([SynergyPair::new("fractals", "flow_fields", 85.0)]);
        assert!((pool_weight("fractals", None, &strong, GenerationTarget::Animation) - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_build_pool_deduplicates() {
        let categories = catalog(&["fractals", "spirograph"], &["fractals"], &[]);
        let pool = build_pool(&categories, &BTreeMap::new(), &SynergyTable::default(), GenerationTarget::Animation);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[0].category, Category::Geometry);
    }

    #[test]
    fn test_mean_synergy_over_selection() {
        let table = SynergyTable::from_pairs([SynergyPair::new("a", "b", 95.0)]);
        let selected = vec![
            Candidate { name: "a".into(), category: Category::Geometry, weight: 1.0 },
            Candidate { name: "c".into(), category: Category::Motion, weight: 1.0 },
        ];
        assert!((mean_synergy("b", &selected, &table) - 85.0).abs() < 1e-12);
    }
}
