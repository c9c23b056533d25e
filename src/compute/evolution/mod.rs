//! Evolutionary feedback over the technique catalog.
//!
//! Each generation runs the same two steps:
//!
//! - **Selection** (`selector`): draw a technique set weighted by stored
//!   performance, then reweight later picks by synergy with the ones already chosen
//! - **Feedback** (`feedback`): score the rendered pattern, evolve every
//!   contributing technique and persist both
//!
//! # Example
//!
//! ```rust,no_run
//! use prism_evolve::compute::PatternScorer;
//! use prism_evolve::compute::evolution::{EvolutionSelector, FeedbackLoop};
//! use prism_evolve::schema::{Pattern, PrismConfig};
//! use prism_evolve::store::Store;
//!
//! let config = PrismConfig::default();
//! let store = Store::open_with_catalog(&config.paths.database, &config.technique_categories)?;
//!
//! let techniques = EvolutionSelector::new(&store, &config).select_techniques();
//! let names = techniques.iter().map(|t| t.name.clone()).collect();
//!
//! let version = store.patterns().next_version()?;
//! let pattern = Pattern::new(version, "", names);
//! let mut feedback = FeedbackLoop::new(&store, PatternScorer::new(&store, &config));
//! let recorded = feedback.record(pattern, &techniques, &config.paths.render_dir(version))?;
//! println!("v{} scored {:.1}", version, recorded.scores.overall);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod feedback;
mod selector;

pub use feedback::{FeedbackLoop, Recorded};
pub use selector::{
    Candidate, EvolutionSelector, SelectionError, build_pool, pool_weight,
};
