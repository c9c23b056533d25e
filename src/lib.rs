//! Prism - Pattern scoring and evolutionary feedback for generative art.
//!
//! Rendered animations are read back as grayscale frames, measured, and
//! scored. The scores feed a registry of techniques whose statistics drive
//! which techniques the next generation uses.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration, pattern records and technique statistics
//! - `compute`: Frame metrics, pattern scoring and evolutionary selection
//! - `store`: SQLite persistence for patterns, techniques and synergy pairs
//!
//! # Example
//!
//! ```rust,no_run
//! use prism_evolve::{
//!     compute::PatternScorer,
//!     schema::{Pattern, PrismConfig},
//!     store::Store,
//! };
//!
//! let config = PrismConfig::default();
//! let store = Store::open_with_catalog(&config.paths.database, &config.technique_categories)?;
//!
//! let pattern = Pattern::new(1, "", vec!["fractals".to_string()]);
//! let mut scorer = PatternScorer::new(&store, &config);
//! let scores = scorer.score(&pattern, &config.paths.render_dir(1));
//!
//! println!("Overall: {:.1}", scores.overall);
//! # Ok::<(), prism_evolve::store::StoreError>(())
//! ```

pub mod compute;
pub mod schema;
pub mod store;

// Re-export commonly used types
pub use compute::evolution::{EvolutionSelector, FeedbackLoop};
pub use compute::{FrameMetricsEngine, PatternScorer};
pub use schema::{Pattern, PrismConfig, ScoreBundle, Technique};
pub use store::Store;
