use crate::config::Config;
use crate::model::{Record, Status};
use crate::population::Population;
use anyhow::{Context, Result};
use rand::Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration, the master seed and the population, and provides
/// methods to initialize, run, save, and load simulations.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    seed: u64,
    pop: Population,
}

impl Engine {
    /// Create a new `Engine` with the given configuration.
    ///
    /// Uses the configured seed, or a random one if none is set.
    pub fn generate_initial_condition(cfg: Config) -> Result<Self> {
        let seed = match cfg.init.seed {
            Some(seed) => seed,
            None => rand::rng().random(),
        };

        let pop = Population::new(&cfg, seed).context("failed to construct population")?;

        Ok(Self { cfg, seed, pop })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn population(&self) -> &Population {
        &self.pop
    }

    /// Perform the simulation and save the resulting records to a binary file.
    ///
    /// Stops early once the population reaches a terminal status.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<Status> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        if self.pop.age() == 0 {
            encode::write_named(&mut writer, &self.pop.record())
                .context("failed to serialize record")?;
        }

        let saves_per_file = self.cfg.output.saves_per_file;
        for i_save in 0..saves_per_file {
            if self.pop.status().is_terminal() {
                break;
            }

            for _ in 0..self.cfg.output.steps_per_save {
                let status = self.pop.advance().context("failed to advance population")?;
                if status.is_terminal() {
                    break;
                }
            }

            encode::write_named(&mut writer, &self.pop.record())
                .context("failed to serialize record")?;

            let progress = 100.0 * (i_save + 1) as f64 / saves_per_file as f64;
            log::info!("completed {progress:06.2}%");
        }

        writer.flush().context("failed to flush writer stream")?;

        let status = self.pop.status();
        log::info!("population {status:?} at age {}", self.pop.age());

        Ok(status)
    }

    /// Read every record of a trajectory file.
    pub fn read_trajectory<P: AsRef<Path>>(file: P) -> Result<Vec<Record>> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        while !reader
            .fill_buf()
            .context("failed to read trajectory")?
            .is_empty()
        {
            let record = decode::from_read(&mut reader).context("failed to deserialize record")?;
            records.push(record);
        }

        Ok(records)
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }
}
