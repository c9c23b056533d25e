//! Configuration types for the scoring and evolution engine.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Category;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrismConfig {
    /// Technique catalog, one ordered list per category.
    #[serde(default)]
    pub technique_categories: TechniqueCategories,
    /// What the generator is producing for this run.
    #[serde(default)]
    pub target: GenerationTarget,
    /// Filesystem locations for renders and the database.
    #[serde(default)]
    pub paths: PathConfig,
    /// Frame analysis and history parameters.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Random seed for reproducible selection and score fallbacks.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for PrismConfig {
    fn default() -> Self {
        Self {
            technique_categories: TechniqueCategories::default(),
            target: GenerationTarget::default(),
            paths: PathConfig::default(),
            analysis: AnalysisConfig::default(),
            random_seed: None,
        }
    }
}

/// Generation target. Image targets change technique count and weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationTarget {
    /// Animated sketch rendered to a frame sequence.
    #[default]
    Animation,
    /// Still image produced by an image model.
    Image,
}

impl GenerationTarget {
    #[inline]
    pub fn is_image(self) -> bool {
        matches!(self, GenerationTarget::Image)
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding `render_v{version}` subdirectories.
    pub renders_dir: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            renders_dir: PathBuf::from("renders"),
            database: PathBuf::from("data/database.db"),
        }
    }
}

impl PathConfig {
    /// Render directory for a pattern version.
    pub fn render_dir(&self, version: i64) -> PathBuf {
        self.renders_dir.join(format!("render_v{}", version))
    }
}

/// Frame analysis and history comparison parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Decode every Nth frame file.
    #[serde(default = "default_frame_stride")]
    pub frame_stride: usize,
    /// File name prefix of frame files.
    #[serde(default = "default_frame_prefix")]
    pub frame_prefix: String,
    /// Accepted frame file extensions (lowercase, without dot).
    #[serde(default = "default_frame_extensions")]
    pub frame_extensions: Vec<String>,
    /// Number of successful patterns whose frames feed the visual-novelty bonus.
    #[serde(default = "default_history_patterns")]
    pub history_patterns: usize,
    /// Minimum overall score for a pattern to count as successful.
    #[serde(default = "default_history_min_score")]
    pub history_min_score: f64,
    /// Number of recent technique sets for the technique-novelty bonus.
    #[serde(default = "default_history_technique_sets")]
    pub history_technique_sets: usize,
    /// Stored synergy pairs below this score are treated as unseen by the scorer.
    #[serde(default = "default_synergy_lookup_floor")]
    pub synergy_lookup_floor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_stride: default_frame_stride(),
            frame_prefix: default_frame_prefix(),
            frame_extensions: default_frame_extensions(),
            history_patterns: default_history_patterns(),
            history_min_score: default_history_min_score(),
            history_technique_sets: default_history_technique_sets(),
            synergy_lookup_floor: default_synergy_lookup_floor(),
        }
    }
}

fn default_frame_stride() -> usize {
    6
}
fn default_frame_prefix() -> String {
    "frame-".to_string()
}
fn default_frame_extensions() -> Vec<String> {
    vec!["png".to_string()]
}
fn default_history_patterns() -> usize {
    5
}
fn default_history_min_score() -> f64 {
    75.0
}
fn default_history_technique_sets() -> usize {
    10
}
fn default_synergy_lookup_floor() -> f64 {
    70.0
}

/// Technique catalog grouped by category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechniqueCategories {
    pub geometry: Vec<String>,
    pub motion: Vec<String>,
    pub patterns: Vec<String>,
}

impl TechniqueCategories {
    /// Iterate `(category, names)` in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[String])> {
        [
            (Category::Geometry, self.geometry.as_slice()),
            (Category::Motion, self.motion.as_slice()),
            (Category::Patterns, self.patterns.as_slice()),
        ]
        .into_iter()
    }

    /// Category a technique belongs to, or `Unknown`.
    pub fn category_of(&self, name: &str) -> Category {
        self.iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(category, _)| category)
            .unwrap_or(Category::Unknown)
    }

    /// Total number of configured techniques.
    pub fn len(&self) -> usize {
        self.geometry.len() + self.motion.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for TechniqueCategories {
    fn default() -> Self {
        Self {
            geometry: names(&[
                "circle_packing",
                "voronoi_diagrams",
                "delaunay_triangulation",
                "fibonacci_spiral",
                "lissajous_curves",
                "cardioids",
                "superellipse",
                "hypocycloid",
                "rose_curves",
                "phyllotaxis",
                "polygon_morphing",
                "spirograph",
                "golden_ratio",
                "tesselation",
                "meander_patterns",
                "star_polygons",
                "truchet_tiles",
                "hyperbolic_tiling",
                "kaleidoscopic_transforms",
                "l_system_fractals",
                "strange_attractors",
                "chladni_patterns",
                "dla_growth",
                "procedural_terrain",
            ]),
            motion: names(&[
                "harmonic_motion",
                "wave_interference",
                "flow_fields",
                "parametric_motion",
                "brownian_motion",
                "particle_systems",
                "spring_physics",
                "orbital_motion",
                "pendulum_motion",
                "circular_motion",
                "wave_propagation",
                "perlin_noise_motion",
                "elastic_motion",
                "spiral_motion",
                "oscillation",
                "lerp_transitions",
                "flocking_boids",
                "swarm_intelligence",
                "advanced_physics",
                "agent_based_drawing",
                "temporal_shifts",
                "emergent_behavior",
                "collective_motion",
            ]),
            patterns: names(&[
                "cellular_automata",
                "fractals",
                "recursive_patterns",
                "stroke_variations",
                "reaction_diffusion",
                "noise_landscapes",
                "moiré_patterns",
                "tiling_systems",
                "interference_patterns",
                "mandala_patterns",
                "maze_generation",
                "dot_patterns",
                "grid_deformation",
                "symmetry_patterns",
                "line_weaving",
                "halftone_patterns",
                "l_systems",
                "pixel_sorting",
                "glitch_effects",
                "feedback_loops",
                "blend_modes",
                "color_harmonies",
                "resonance_patterns",
            ]),
        }
    }
}

impl PrismConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.technique_categories.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        if self.analysis.frame_stride == 0 {
            return Err(ConfigError::InvalidFrameStride);
        }
        if self.analysis.frame_extensions.is_empty() {
            return Err(ConfigError::NoFrameExtensions);
        }
        if self.analysis.history_patterns == 0 || self.analysis.history_technique_sets == 0 {
            return Err(ConfigError::InvalidHistoryLimit);
        }
        for (category, list) in self.technique_categories.iter() {
            if let Some(name) = list.iter().find(|n| n.trim().is_empty()) {
                return Err(ConfigError::InvalidTechniqueName {
                    category: category.as_str().to_string(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Technique catalog must contain at least one technique")]
    EmptyCatalog,
    #[error("Frame stride must be non-zero")]
    InvalidFrameStride,
    #[error("At least one frame file extension is required")]
    NoFrameExtensions,
    #[error("History limits must be non-zero")]
    InvalidHistoryLimit,
    #[error("Category {category} contains an invalid technique name {name:?}")]
    InvalidTechniqueName { category: String, name: String },
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
