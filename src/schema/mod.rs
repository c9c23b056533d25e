//! Schema module - Configuration and record types for patterns and techniques.

mod config;
mod pattern;
mod technique;

pub use config::*;
pub use pattern::*;
pub use technique::*;
