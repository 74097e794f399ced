//! Source of randomness for tie-breaks and random vote fallback.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::agent::AgentId;

/// Uniform choice among agent ids.
///
/// Injected into the engine so tournaments can be replayed exactly.
#[cfg_attr(test, mockall::automock)]
pub trait TieBreaker: Send + Sync {
    /// Pick one of `options`. Callers never pass an empty slice.
    fn pick(&self, options: &[AgentId]) -> AgentId;
}

/// `StdRng`-backed tie-breaker
pub struct RngTieBreaker {
    rng: Mutex<StdRng>,
}

impl RngTieBreaker {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }
}

impl TieBreaker for RngTieBreaker {
    fn pick(&self, options: &[AgentId]) -> AgentId {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        options.choose(&mut *rng).copied().unwrap_or_default()
    }
}
