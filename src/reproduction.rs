use crate::model::{Allele, Counts, Environment};
use anyhow::{Context, Result, bail};
use rand::Rng;
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};

/// Selection coefficients of each allele in each environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessTable {
    pub favored: [f64; 2],
    pub common: [f64; 2],
}

impl FitnessTable {
    /// Relative fitness `1 + s` of `allele` in `env`.
    pub fn weight(&self, allele: Allele, env: Environment) -> f64 {
        let coeffs = match allele {
            Allele::Favored => &self.favored,
            Allele::Common => &self.common,
        };
        1.0 + coeffs[env.index()]
    }
}

/// Offspring process of a deme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    /// The whole deme is replaced by `Binomial(N, p)` offspring.
    #[default]
    WrightFisher,
    /// `N` birth-death events, each moving the Favored count by at most one.
    Moran,
}

/// Resampling with selection and two-way mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reproduction {
    pub process: Process,
    pub fitness: FitnessTable,
    /// Mutation probability from Common to Favored.
    pub mu: f64,
    /// Mutation probability from Favored to Common.
    pub nu: f64,
}

impl Reproduction {
    /// Probability that an offspring carries the Favored allele.
    ///
    /// Returns `None` when the fitness-weighted total of the parents is zero.
    pub fn transition_prob(&self, counts: Counts, env: Environment) -> Option<f64> {
        let w_favored = counts.favored as f64 * self.fitness.weight(Allele::Favored, env);
        let w_common = counts.common as f64 * self.fitness.weight(Allele::Common, env);
        let total = w_favored + w_common;
        if total <= 0.0 {
            return None;
        }
        let prob = (w_favored * (1.0 - self.nu) + w_common * self.mu) / total;
        // Rounding can push the ratio an ulp outside of [0, 1].
        Some(prob.clamp(0.0, 1.0))
    }

    /// Probabilities that one Moran birth-death event raises or lowers the
    /// Favored count.
    ///
    /// The parent is drawn by weight and may mutate, the individual it
    /// replaces is drawn uniformly. Returns `None` when the weighted total
    /// is zero.
    pub fn moran_rates(&self, counts: Counts, env: Environment) -> Option<(f64, f64)> {
        let birth = self.transition_prob(counts, env)?;
        let total = counts.total() as f64;
        let up = birth * counts.common as f64 / total;
        let down = (1.0 - birth) * counts.favored as f64 / total;
        Some((up, down))
    }

    /// Sample the offspring generation of a deme of the given capacity.
    ///
    /// Returns `None` when the deme has no reproductive weight.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        capacity: usize,
        counts: Counts,
        env: Environment,
        rng: &mut R,
    ) -> Result<Option<Counts>> {
        match self.process {
            Process::WrightFisher => self.sample_wright_fisher(capacity, counts, env, rng),
            Process::Moran => self.sample_moran(capacity, counts, env, rng),
        }
    }

    fn sample_wright_fisher<R: Rng + ?Sized>(
        &self,
        capacity: usize,
        counts: Counts,
        env: Environment,
        rng: &mut R,
    ) -> Result<Option<Counts>> {
        let Some(prob) = self.transition_prob(counts, env) else {
            return Ok(None);
        };
        let dist = Binomial::new(capacity as u64, prob)
            .with_context(|| format!("invalid binomial parameters ({capacity}, {prob})"))?;
        let favored = dist.sample(rng) as usize;
        Ok(Some(Counts::new(favored, capacity - favored)))
    }

    fn sample_moran<R: Rng + ?Sized>(
        &self,
        capacity: usize,
        counts: Counts,
        env: Environment,
        rng: &mut R,
    ) -> Result<Option<Counts>> {
        if counts.total() != capacity {
            bail!(
                "moran events need a full deme of {capacity}, but it holds {}",
                counts.total()
            );
        }
        if self.transition_prob(counts, env).is_none() {
            return Ok(None);
        }

        let mut counts = counts;
        for _ in 0..capacity {
            // The weight can vanish mid-generation; the next one reports it.
            let Some((up, down)) = self.moran_rates(counts, env) else {
                break;
            };
            let draw: f64 = rng.random();
            if draw < up {
                counts.favored += 1;
                counts.common -= 1;
            } else if draw < up + down {
                counts.favored -= 1;
                counts.common += 1;
            }
        }
        Ok(Some(counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn neutral() -> Reproduction {
        Reproduction {
            process: Process::WrightFisher,
            fitness: FitnessTable {
                favored: [0.0, 0.0],
                common: [0.0, 0.0],
            },
            mu: 0.0,
            nu: 0.0,
        }
    }

    #[test]
    fn neutral_probability_is_frequency() {
        let prob = neutral()
            .transition_prob(Counts::new(25, 75), Environment::Base)
            .unwrap();
        assert!((prob - 0.25).abs() < 1e-12);
    }

    #[test]
    fn selection_uses_active_environment() {
        let rep = Reproduction {
            fitness: FitnessTable {
                favored: [1.0, 0.0],
                common: [0.0, 1.0],
            },
            ..neutral()
        };
        let counts = Counts::new(50, 50);
        let base = rep.transition_prob(counts, Environment::Base).unwrap();
        let alt = rep.transition_prob(counts, Environment::Alternate).unwrap();
        assert!((base - 2.0 / 3.0).abs() < 1e-12);
        assert!((alt - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn mutation_enters_probability() {
        let rep = Reproduction {
            mu: 0.1,
            nu: 0.2,
            ..neutral()
        };
        let prob = rep
            .transition_prob(Counts::new(50, 50), Environment::Base)
            .unwrap();
        // (50 * 0.8 + 50 * 0.1) / 100
        assert!((prob - 0.45).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_has_no_probability() {
        let rep = Reproduction {
            fitness: FitnessTable {
                favored: [-1.0, 0.0],
                common: [-1.0, 0.0],
            },
            ..neutral()
        };
        assert_eq!(rep.transition_prob(Counts::new(3, 7), Environment::Base), None);
        assert_eq!(neutral().transition_prob(Counts::new(0, 0), Environment::Base), None);

        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let out = rep
            .sample(10, Counts::new(3, 7), Environment::Base, &mut rng)
            .unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn sample_stays_within_capacity() {
        let rep = Reproduction {
            mu: 0.01,
            nu: 0.01,
            ..neutral()
        };
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut counts = Counts::new(10, 10);
        for _ in 0..500 {
            counts = rep
                .sample(20, counts, Environment::Base, &mut rng)
                .unwrap()
                .unwrap();
            assert_eq!(counts.total(), 20);
        }
    }

    #[test]
    fn boundaries_are_absorbing_without_mutation() {
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        let rep = neutral();
        for _ in 0..100 {
            let fixed = rep
                .sample(50, Counts::new(50, 0), Environment::Base, &mut rng)
                .unwrap();
            assert_eq!(fixed, Some(Counts::new(50, 0)));
            let lost = rep
                .sample(50, Counts::new(0, 50), Environment::Base, &mut rng)
                .unwrap();
            assert_eq!(lost, Some(Counts::new(0, 50)));
        }
    }

    fn moran(s: f64, mu: f64, nu: f64) -> Reproduction {
        Reproduction {
            process: Process::Moran,
            fitness: FitnessTable {
                favored: [s, s],
                common: [0.0, 0.0],
            },
            mu,
            nu,
        }
    }

    #[test]
    fn moran_rates_follow_birth_death_formula() {
        let (n, big_n, s, mu, nu) = (30.0, 100.0, 0.2, 0.01, 0.03);
        let rep = moran(s, mu, nu);
        let (up, down) = rep
            .moran_rates(Counts::new(30, 70), Environment::Base)
            .unwrap();

        let mean_fitness = (n * (1.0 + s) + (big_n - n)) / big_n;
        let norm = big_n * big_n * mean_fitness;
        let expected_up =
            (n * (1.0 + s) * (1.0 - nu) * (big_n - n) + (big_n - n) * mu * (big_n - n)) / norm;
        let expected_down =
            ((big_n - n) * (1.0 - mu) * n + n * (1.0 + s) * nu * n) / norm;
        assert!((up - expected_up).abs() < 1e-12);
        assert!((down - expected_down).abs() < 1e-12);
    }

    #[test]
    fn moran_boundaries_move_only_by_mutation() {
        let rep = moran(0.5, 0.0, 0.0);
        assert_eq!(
            rep.moran_rates(Counts::new(0, 10), Environment::Base),
            Some((0.0, 0.0))
        );
        assert_eq!(
            rep.moran_rates(Counts::new(10, 0), Environment::Base),
            Some((0.0, 0.0))
        );

        let rep = moran(0.0, 1.0, 0.0);
        let (up, down) = rep
            .moran_rates(Counts::new(0, 10), Environment::Base)
            .unwrap();
        assert!((up - 1.0).abs() < 1e-12);
        assert_eq!(down, 0.0);
    }

    #[test]
    fn moran_generation_keeps_size() {
        let rep = moran(1.0, 0.0, 0.0);
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let mut counts = Counts::new(10, 10);
        for _ in 0..200 {
            counts = rep
                .sample(20, counts, Environment::Base, &mut rng)
                .unwrap()
                .unwrap();
            assert_eq!(counts.total(), 20);
        }
        // Doubled fitness fixes from half the deme almost surely.
        assert_eq!(counts, Counts::new(20, 0));
    }

    #[test]
    fn moran_rejects_partial_deme() {
        let mut rng = ChaCha12Rng::seed_from_u64(10);
        let result = moran(0.0, 0.0, 0.0).sample(
            20,
            Counts::new(5, 10),
            Environment::Base,
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn moran_zero_weight_is_dead() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let out = moran(-1.0, 0.0, 0.0)
            .sample(10, Counts::new(10, 0), Environment::Base, &mut rng)
            .unwrap();
        assert_eq!(out, None);
    }
}
