//! Pluggable choice-making for the stochastic operators.
//!
//! Every tie-break in mutation, crossover, and ring closure flows through a
//! [`SelectionStrategy`] so tests can pin outcomes deterministically while
//! production runs use a seeded RNG.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Decides among equally valid candidates.
pub trait SelectionStrategy {
    /// Picks an index in `0..n`. `None` when there is nothing to pick.
    fn choose(&mut self, n: usize) -> Option<usize>;

    /// Picks an index with probability proportional to its weight. `None`
    /// when the weights are empty, negative, or sum to zero.
    fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize>;
}

/// Uniform / weighted random selection backed by any [`Rng`].
#[derive(Debug)]
pub struct RandomSelection<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomSelection<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> SelectionStrategy for RandomSelection<R> {
    fn choose(&mut self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        Some(self.rng.gen_range(0..n))
    }

    fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let dist = WeightedIndex::new(weights).ok()?;
        Some(dist.sample(&mut self.rng))
    }
}

/// Always picks the first viable candidate. Used by tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstChoice;

impl SelectionStrategy for FirstChoice {
    fn choose(&mut self, n: usize) -> Option<usize> {
        (n > 0).then_some(0)
    }

    fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        weights.iter().position(|w| *w > 0.0)
    }
}

/// Weighting scheme for growth-type operations by graph level, so deep
/// graphs extend less often than shallow ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthProbability {
    /// Weight 1 regardless of level.
    Constant(f64),
    /// `exp(-lambda * level)`.
    ExpDiminish { lambda: f64 },
}

impl GrowthProbability {
    pub fn exp_diminish(lambda: f64) -> Self {
        Self::ExpDiminish { lambda }
    }

    pub fn weight(&self, level: i32) -> f64 {
        match *self {
            Self::Constant(w) => w,
            Self::ExpDiminish { lambda } => (-lambda * level.max(0) as f64).exp(),
        }
    }
}

impl Default for GrowthProbability {
    fn default() -> Self {
        Self::ExpDiminish { lambda: 0.1 }
    }
}
