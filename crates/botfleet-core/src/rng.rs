//! Injected random source.
//!
//! Cadence jitter must be reproducible under test, so randomness is a value
//! passed in at construction — never a global. Seed it for tests, use
//! entropy in production.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Shareable, seedable random source.
pub struct RandomSource {
    rng: Mutex<StdRng>,
}

impl RandomSource {
    /// Entropy-seeded source for production use.
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Fixed-seed source for deterministic tests.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    /// Uniform f64 in [0, 1).
    pub fn unit(&self) -> f64 {
        self.rng.lock().unwrap().gen::<f64>()
    }

    /// Uniform f64 in [low, high).
    pub fn range(&self, low: f64, high: f64) -> f64 {
        self.rng.lock().unwrap().gen_range(low..high)
    }

    /// Uniform usize in [0, n). Returns 0 for n == 0.
    pub fn index(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.rng.lock().unwrap().gen_range(0..n)
    }
}
