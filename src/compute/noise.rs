//! Seeded randomness for technique sampling and score fallbacks.

use rand::distributions::WeightedIndex;
use rand::prelude::*;

/// Random number generator shared by the scorer and the selector.
///
/// Every randomized default is drawn from here, so a fixed seed reproduces
/// fallback scores exactly.
pub struct ScoreRng {
    rng: StdRng,
}

impl ScoreRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when `seed` is set, otherwise from entropy.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::new).unwrap_or_else(Self::random)
    }

    /// `mean + N(0, sigma)`.
    pub fn gaussian(&mut self, mean: f64, sigma: f64) -> f64 {
        let noise: f64 = self.rng.sample(rand_distr::StandardNormal);
        mean + noise * sigma
    }

    /// Uniform integer in `[low, high]`.
    pub fn range_inclusive(&mut self, low: usize, high: usize) -> usize {
        self.rng.gen_range(low..=high)
    }

    /// Pick an index with probability proportional to its weight.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Result<usize, rand::distributions::WeightedError> {
        let dist = WeightedIndex::new(weights)?;
        Ok(dist.sample(&mut self.rng))
    }
}

/// Randomized default: a documented base plus Gaussian noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    pub base: f64,
    pub sigma: f64,
}

impl Fallback {
    pub const fn new(base: f64, sigma: f64) -> Self {
        Self { base, sigma }
    }

    pub fn draw(self, rng: &mut ScoreRng) -> f64 {
        rng.gaussian(self.base, self.sigma)
    }
}
