//! Compute module - Frame analysis, pattern scoring and technique evolution.

mod flow;
mod frames;
mod gradient;
mod metrics;
mod noise;
mod raster;
mod regions;
mod scorer;

pub mod evolution;

pub use flow::*;
pub use frames::*;
pub use gradient::*;
pub use metrics::*;
pub use noise::*;
pub use raster::*;
pub use regions::*;
pub use scorer::*;
