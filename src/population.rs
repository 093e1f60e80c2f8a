use crate::config::{Allocation, Config, InitEnv};
use crate::deme::{Deme, Dynamics};
use crate::environment::Switching;
use crate::migration::{Migrate, Migration};
use crate::model::{Counts, Environment, Record, Status};
use crate::reproduction::Reproduction;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Metapopulation of demes coupled by migration.
///
/// Each generation migrates all demes, then lets every deme reproduce, then
/// evaluates the global status. The population generator drives migration
/// and seeding while each deme draws from its own stream, so a run is fully
/// determined by its master seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    demes: Vec<Deme>,
    dynamics: Dynamics,
    migration: Migration,
    horizon: Option<usize>,
    age: usize,
    status: Status,
    rng: ChaCha12Rng,
}

impl Population {
    /// Build the initial population described by `cfg`.
    pub fn new(cfg: &Config, seed: u64) -> Result<Self> {
        cfg.validate().context("invalid config")?;
        let model = &cfg.model;
        log::debug!("seeding population with {seed}");

        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let mut demes = Vec::with_capacity(model.n_demes);
        for i_deme in 0..model.n_demes {
            let mut deme_rng = rng.clone();
            deme_rng.set_stream(i_deme as u64 + 1);

            let env = match cfg.init.env {
                InitEnv::Base => Environment::Base,
                InitEnv::Random => {
                    if deme_rng.random_bool(0.5) {
                        Environment::Alternate
                    } else {
                        Environment::Base
                    }
                }
            };

            let size = model.deme_size;
            let counts = match cfg.init.alloc {
                Allocation::Split => Counts::new(size / 2, size - size / 2),
                Allocation::Seeded { .. } => Counts::new(0, size),
            };

            let deme = Deme::new(size, counts, env, cfg.output.record_history, deme_rng)
                .with_context(|| format!("failed to construct deme {i_deme}"))?;
            demes.push(deme);
        }

        let dynamics = Dynamics {
            reproduction: Reproduction {
                process: model.process,
                fitness: model.fitness.clone(),
                mu: model.mu,
                nu: model.nu,
            },
            switching: Switching::new(model.alpha, model.beta),
            lethal: model.lethal,
        };

        let mut pop = Self {
            demes,
            dynamics,
            migration: cfg.migration.clone(),
            horizon: cfg.output.max_generations,
            age: 0,
            status: Status::Running,
            rng,
        };

        if let Allocation::Seeded { n_seeded } = cfg.init.alloc {
            pop.seed_favored(n_seeded)
                .context("failed to seed favored individuals")?;
        }
        pop.status = pop.evaluate_status();

        Ok(pop)
    }

    /// Scatter `n_seeded` Favored individuals over demes that still hold a
    /// Common individual, one at a time.
    pub fn seed_favored(&mut self, n_seeded: usize) -> Result<()> {
        let mut eligible = Vec::with_capacity(self.demes.len());
        for _ in 0..n_seeded {
            eligible.clear();
            eligible.extend(
                self.demes
                    .iter()
                    .enumerate()
                    .filter(|(_, deme)| deme.counts().common > 0)
                    .map(|(i_deme, _)| i_deme),
            );
            let Some(&i_deme) = eligible.choose(&mut self.rng) else {
                bail!("no deme holds a common individual to replace");
            };
            self.demes[i_deme].inject_favored()?;
        }
        Ok(())
    }

    pub fn demes(&self) -> &[Deme] {
        &self.demes
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn horizon(&self) -> Option<usize> {
        self.horizon
    }

    /// Sum of the allele counts over all demes.
    pub fn totals(&self) -> Counts {
        self.demes.iter().fold(Counts::default(), |acc, deme| {
            let counts = deme.counts();
            Counts::new(acc.favored + counts.favored, acc.common + counts.common)
        })
    }

    pub fn record(&self) -> Record {
        Record {
            age: self.age,
            status: self.status,
            demes: self.demes.iter().map(Deme::snapshot).collect(),
        }
    }

    /// Advance the population by one generation.
    ///
    /// Does nothing once the status is terminal.
    pub fn advance(&mut self) -> Result<Status> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }
        if self.horizon.is_some_and(|horizon| self.age >= horizon) {
            self.set_status(Status::TimedOut);
            return Ok(self.status);
        }

        self.migration
            .migrate(&mut self.demes, &mut self.rng)
            .context("failed to migrate")?;

        let dynamics = &self.dynamics;
        self.demes
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i_deme, deme)| {
                deme.step(dynamics)
                    .with_context(|| format!("failed to step deme {i_deme}"))
            })?;

        self.age += 1;

        let mut status = self.evaluate_status();
        if status == Status::Running && self.horizon.is_some_and(|horizon| self.age >= horizon) {
            status = Status::TimedOut;
        }
        self.set_status(status);

        Ok(self.status)
    }

    /// Advance until the status is terminal.
    ///
    /// Without a horizon this only returns once every deme fixes, goes
    /// extinct or dies, which may never happen.
    pub fn run(&mut self) -> Result<Status> {
        while !self.status.is_terminal() {
            self.advance()?;
        }
        Ok(self.status)
    }

    fn evaluate_status(&self) -> Status {
        if self.demes.iter().all(Deme::is_dead) {
            Status::Dead
        } else if self.demes.iter().all(Deme::is_fixed) {
            Status::Fixed
        } else if self.demes.iter().all(Deme::is_extinct) {
            Status::Extinct
        } else {
            Status::Running
        }
    }

    fn set_status(&mut self, status: Status) {
        if status != self.status {
            log::debug!("status {:?} -> {status:?} at age {}", self.status, self.age);
            self.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InitConfig, ModelConfig, OutputConfig};
    use crate::migration::{BinomialExchange, PooledRedistribution};
    use crate::reproduction::{FitnessTable, Process};

    fn config(n_demes: usize, deme_size: usize, alloc: Allocation) -> Config {
        Config {
            model: ModelConfig {
                n_demes,
                deme_size,
                process: Process::WrightFisher,
                fitness: FitnessTable {
                    favored: [0.1, 0.0],
                    common: [0.0, 0.01],
                },
                mu: 0.0,
                nu: 0.0,
                alpha: 0.01,
                beta: 0.5,
                lethal: false,
            },
            migration: Migration::Pooled(PooledRedistribution { rate: 0.1 }),
            init: InitConfig {
                alloc,
                env: InitEnv::Random,
                seed: None,
            },
            output: OutputConfig {
                max_generations: Some(10_000),
                steps_per_save: 1,
                saves_per_file: 1,
                record_history: false,
            },
        }
    }

    #[test]
    fn split_allocation() {
        let pop = Population::new(&config(3, 11, Allocation::Split), 1).unwrap();
        for deme in pop.demes() {
            assert_eq!(deme.counts(), Counts::new(5, 6));
        }
        assert_eq!(pop.status(), Status::Running);
    }

    #[test]
    fn seeding_scatters_favored() {
        let cfg = config(5, 20, Allocation::Seeded { n_seeded: 37 });
        let pop = Population::new(&cfg, 2).unwrap();
        assert_eq!(pop.totals(), Counts::new(37, 63));
    }

    #[test]
    fn seeding_every_slot_fixes_immediately() {
        let cfg = config(3, 4, Allocation::Seeded { n_seeded: 12 });
        let pop = Population::new(&cfg, 3).unwrap();
        assert_eq!(pop.status(), Status::Fixed);
    }

    #[test]
    fn seeding_beyond_capacity_fails() {
        let cfg = config(2, 4, Allocation::Seeded { n_seeded: 0 });
        let mut pop = Population::new(&cfg, 4).unwrap();
        assert!(pop.seed_favored(9).is_err());
    }

    #[test]
    fn same_seed_same_trajectory() {
        let cfg = config(6, 30, Allocation::Split);
        let mut a = Population::new(&cfg, 5).unwrap();
        let mut b = Population::new(&cfg, 5).unwrap();
        for _ in 0..200 {
            a.advance().unwrap();
            b.advance().unwrap();
            assert_eq!(a.record(), b.record());
        }
    }

    #[test]
    fn horizon_times_out() {
        let mut cfg = config(2, 1000, Allocation::Split);
        cfg.output.max_generations = Some(3);
        cfg.model.alpha = 0.0;
        cfg.init.env = InitEnv::Base;
        let mut pop = Population::new(&cfg, 6).unwrap();
        let status = pop.run().unwrap();
        assert_eq!(status, Status::TimedOut);
        assert_eq!(pop.age(), 3);

        // Terminal states are absorbing.
        assert_eq!(pop.advance().unwrap(), Status::TimedOut);
        assert_eq!(pop.age(), 3);
    }

    #[test]
    fn zero_horizon_never_steps() {
        let mut cfg = config(2, 10, Allocation::Split);
        cfg.output.max_generations = Some(0);
        let mut pop = Population::new(&cfg, 7).unwrap();
        assert_eq!(pop.advance().unwrap(), Status::TimedOut);
        assert_eq!(pop.age(), 0);
    }

    #[test]
    fn zero_weight_everywhere_is_dead() {
        let mut cfg = config(3, 10, Allocation::Split);
        cfg.model.fitness = FitnessTable {
            favored: [-1.0, -1.0],
            common: [-1.0, -1.0],
        };
        let mut pop = Population::new(&cfg, 8).unwrap();
        assert_eq!(pop.advance().unwrap(), Status::Dead);
        assert_eq!(pop.age(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = config(0, 10, Allocation::Split);
        assert!(Population::new(&cfg, 9).is_err());

        cfg.model.n_demes = 3;
        cfg.migration = Migration::Pooled(PooledRedistribution { rate: -3.0 });
        assert!(Population::new(&cfg, 9).is_err());

        cfg.migration = Migration::Isolated;
        cfg.model.fitness.favored = [-2.5, 0.0];
        assert!(Population::new(&cfg, 9).is_err());
    }

    #[test]
    fn dead_demes_keep_capacity_under_pooled_migration() {
        let mut cfg = config(3, 10, Allocation::Split);
        cfg.migration = Migration::Pooled(PooledRedistribution { rate: 0.5 });
        cfg.model.fitness = FitnessTable {
            favored: [0.0, -1.0],
            common: [0.0, -1.0],
        };
        cfg.model.alpha = 1.0;
        cfg.model.beta = 1.0;
        cfg.init.env = InitEnv::Base;
        let mut pop = Population::new(&cfg, 10).unwrap();

        for _ in 0..5 {
            pop.advance().unwrap();
            for deme in pop.demes() {
                assert_eq!(deme.counts().total(), 10);
            }
        }
        assert_eq!(pop.status(), Status::Dead);
        assert_eq!(pop.totals().total(), 30);
    }

    #[test]
    fn parallel_step_matches_sequential_step() {
        for migration in [
            Migration::Pooled(PooledRedistribution { rate: 0.2 }),
            Migration::Binomial(BinomialExchange { count: 4 }),
        ] {
            let mut cfg = config(8, 25, Allocation::Seeded { n_seeded: 60 });
            cfg.migration = migration;
            cfg.model.mu = 0.01;
            cfg.model.nu = 0.01;
            let mut parallel = Population::new(&cfg, 11).unwrap();
            let mut sequential = parallel.clone();

            for _ in 0..100 {
                if parallel.status().is_terminal() {
                    break;
                }
                parallel.advance().unwrap();

                sequential
                    .migration
                    .migrate(&mut sequential.demes, &mut sequential.rng)
                    .unwrap();
                for deme in sequential.demes.iter_mut().rev() {
                    deme.step(&sequential.dynamics).unwrap();
                }
                sequential.age += 1;
                sequential.status = sequential.evaluate_status();

                assert_eq!(parallel.record(), sequential.record());
            }
        }
    }
}
