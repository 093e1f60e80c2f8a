use crate::model::Environment;
use anyhow::Result;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};

/// Two-state Markov chain driving the environment of a deme.
///
/// From [`Environment::Base`] the chain moves to [`Environment::Alternate`]
/// with probability `alpha`. From [`Environment::Alternate`] it stays with
/// probability `beta` and returns to the base state otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switching {
    pub alpha: f64,
    pub beta: f64,
}

impl Switching {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self { alpha, beta }
    }

    /// Draw the environment of the next generation with one Bernoulli trial.
    pub fn next<R: Rng + ?Sized>(&self, env: Environment, rng: &mut R) -> Result<Environment> {
        let next = match env {
            Environment::Base => {
                if Bernoulli::new(self.alpha)?.sample(rng) {
                    Environment::Alternate
                } else {
                    Environment::Base
                }
            }
            Environment::Alternate => {
                if Bernoulli::new(self.beta)?.sample(rng) {
                    Environment::Alternate
                } else {
                    Environment::Base
                }
            }
        };
        Ok(next)
    }
}
