use crate::migration::Migration;
use crate::reproduction::{FitnessTable, Process};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub migration: Migration,
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Deme structure and evolutionary parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of demes (`M`).
    pub n_demes: usize,
    /// Capacity of every deme (`N`).
    pub deme_size: usize,

    /// Offspring process within each deme.
    #[serde(default)]
    pub process: Process,

    /// Selection coefficients per allele and environment.
    pub fitness: FitnessTable,

    /// Mutation probability from Common to Favored.
    pub mu: f64,
    /// Mutation probability from Favored to Common.
    pub nu: f64,

    /// Probability of switching from environment 0 to environment 1.
    pub alpha: f64,
    /// Probability of staying in environment 1.
    pub beta: f64,

    /// Favored individuals die in environment 1.
    #[serde(default)]
    pub lethal: bool,
}

/// Initial allocation of alleles to demes.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "alloc", rename_all = "snake_case")]
pub enum Allocation {
    /// `floor(N / 2)` Favored and `ceil(N / 2)` Common individuals per deme.
    Split,
    /// All Common, then `n_seeded` Favored individuals scattered at random.
    Seeded { n_seeded: usize },
}

/// Initial environment of the demes.
#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitEnv {
    /// Every deme starts in environment 0.
    Base,
    /// Each deme starts in a uniformly random environment.
    #[default]
    Random,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    #[serde(flatten)]
    pub alloc: Allocation,

    #[serde(default)]
    pub env: InitEnv,

    /// Master seed of a run. Drawn at random when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Generation horizon. Runs without one may never terminate.
    pub max_generations: Option<usize>,

    /// Number of generations between trajectory records.
    pub steps_per_save: usize,
    /// Number of records written per trajectory file.
    pub saves_per_file: usize,

    /// Keep the count history of every deme in memory.
    #[serde(default)]
    pub record_history: bool,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        check_num(model.n_demes, 1..=100_000).context("invalid number of demes")?;
        check_num(model.deme_size, 1..=1_000_000_000).context("invalid deme size")?;

        for (allele, coeffs) in [
            ("favored", &model.fitness.favored),
            ("common", &model.fitness.common),
        ] {
            for (i_env, &coeff) in coeffs.iter().enumerate() {
                check_num(coeff, -1.0..).with_context(|| {
                    format!("invalid {allele} selection coefficient in environment {i_env}")
                })?;
            }
        }

        check_num(model.mu, 0.0..=1.0).context("invalid mutation probability mu")?;
        check_num(model.nu, 0.0..=1.0).context("invalid mutation probability nu")?;
        check_num(model.alpha, 0.0..=1.0).context("invalid switching probability alpha")?;
        check_num(model.beta, 0.0..=1.0).context("invalid switching probability beta")?;

        match &self.migration {
            Migration::Isolated => {}
            Migration::Pooled(strategy) => {
                check_num(strategy.rate, 0.0..=1.0).context("invalid pooled migration rate")?;
                if model.process == Process::Moran && strategy.rate > 0.0 {
                    bail!("pooled migration cannot be combined with the moran process");
                }
            }
            Migration::Exchange(strategy) => {
                check_num(strategy.rate, 0.0..=1.0).context("invalid exchange migration rate")?;
            }
            Migration::Binomial(strategy) => {
                check_num(strategy.count, 0..=model.deme_size)
                    .context("invalid binomial migrant count")?;
            }
        }

        if let Allocation::Seeded { n_seeded } = self.init.alloc {
            check_num(n_seeded, 0..=model.n_demes * model.deme_size)
                .context("invalid number of seeded individuals")?;
        }

        check_num(self.output.steps_per_save, 1..=1_000_000)
            .context("invalid number of steps per save")?;
        check_num(self.output.saves_per_file, 1..=10_000)
            .context("invalid number of saves per file")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
