use crate::environment::Switching;
use crate::model::{Counts, DemeSnapshot, Environment};
use crate::reproduction::Reproduction;
use anyhow::{Context, Result, bail};
use rand_chacha::ChaCha12Rng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};

/// Per-generation rules shared by every deme of a population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dynamics {
    pub reproduction: Reproduction,
    pub switching: Switching,
    /// Favored individuals cannot survive [`Environment::Alternate`].
    pub lethal: bool,
}

/// Subpopulation of fixed capacity.
///
/// Owns its own random number generator so that demes can reproduce
/// concurrently without sharing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deme {
    capacity: usize,
    counts: Counts,
    env: Environment,
    dead: bool,
    /// Counts at the end of the last generation, before any migration.
    settled: Counts,
    history: Option<Vec<Counts>>,
    rng: ChaCha12Rng,
}

impl Deme {
    pub fn new(
        capacity: usize,
        counts: Counts,
        env: Environment,
        record_history: bool,
        rng: ChaCha12Rng,
    ) -> Result<Self> {
        if capacity == 0 {
            bail!("deme capacity must be positive");
        }
        if counts.total() != capacity {
            bail!(
                "deme counts must sum to {capacity}, but sum to {}",
                counts.total()
            );
        }
        let history = record_history.then(|| vec![counts]);
        Ok(Self {
            capacity,
            counts,
            env,
            dead: false,
            settled: counts,
            history,
            rng,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn counts(&self) -> Counts {
        self.counts
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    /// Whether the last reproduction step found no reproductive weight.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_fixed(&self) -> bool {
        self.counts.favored == self.capacity
    }

    pub fn is_extinct(&self) -> bool {
        self.counts.common == self.capacity
    }

    /// Counts after every generation, starting with the initial ones.
    pub fn history(&self) -> Option<&[Counts]> {
        self.history.as_deref()
    }

    pub fn snapshot(&self) -> DemeSnapshot {
        DemeSnapshot {
            counts: self.counts,
            env: self.env,
            dead: self.dead,
        }
    }

    /// Move one Favored individual in place of a Common one.
    pub(crate) fn inject_favored(&mut self) -> Result<()> {
        if self.counts.common == 0 {
            bail!("deme holds no common individual to replace");
        }
        self.counts.common -= 1;
        self.counts.favored += 1;
        self.settled = self.counts;
        if let Some(history) = &mut self.history {
            history[0] = self.counts;
        }
        Ok(())
    }

    /// Take emigrants out of the deme.
    pub(crate) fn remove(&mut self, out: Counts) -> Result<()> {
        if out.favored > self.counts.favored || out.common > self.counts.common {
            bail!(
                "cannot remove {out:?} from a deme holding {:?}",
                self.counts
            );
        }
        self.counts.favored -= out.favored;
        self.counts.common -= out.common;
        Ok(())
    }

    /// Add immigrants to the deme.
    pub(crate) fn insert(&mut self, inc: Counts) {
        self.counts.favored += inc.favored;
        self.counts.common += inc.common;
    }

    /// Advance the deme by one generation.
    ///
    /// Offspring are sampled with the fitnesses of the current environment,
    /// then the environment switches, then lethality is applied using the
    /// new environment. A deme without reproductive weight is marked dead and
    /// refilled to its capacity without selection.
    pub fn step(&mut self, dynamics: &Dynamics) -> Result<()> {
        let offspring = dynamics
            .reproduction
            .sample(self.capacity, self.counts, self.env, &mut self.rng)
            .context("failed to sample offspring")?;
        match offspring {
            Some(counts) => {
                self.counts = counts;
                self.dead = false;
            }
            None => {
                self.counts = self.refill().context("failed to refill dead deme")?;
                self.dead = true;
            }
        }

        self.env = dynamics
            .switching
            .next(self.env, &mut self.rng)
            .context("failed to switch environment")?;

        if dynamics.lethal && self.env == Environment::Alternate {
            self.counts = Counts::new(0, self.capacity);
        }

        self.settled = self.counts;
        if let Some(history) = &mut self.history {
            history.push(self.counts);
        }

        Ok(())
    }

    /// Counts of exactly `capacity` individuals for a deme whose parents
    /// carry no weight.
    ///
    /// Members left after migration are resampled neutrally. An emptied deme
    /// falls back to its counts before migration.
    fn refill(&mut self) -> Result<Counts> {
        let total = self.counts.total();
        if total == self.capacity {
            return Ok(self.counts);
        }
        if total == 0 {
            return Ok(self.settled);
        }
        let prob = self.counts.favored as f64 / total as f64;
        let favored = Binomial::new(self.capacity as u64, prob)?.sample(&mut self.rng) as usize;
        Ok(Counts::new(favored, self.capacity - favored))
    }
}
