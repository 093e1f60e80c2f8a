use crate::model::Status;
use crate::population::Population;
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Outcome statistics over repeated runs of the same configuration.
#[derive(Default)]
pub struct Analyzer {
    n_runs: usize,
    n_fixed: usize,
    n_extinct: usize,
    n_dead: usize,
    n_timed_out: usize,
    n_running: usize,
    fix_age: Accumulator,
    ext_age: Accumulator,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub n_runs: usize,
    pub n_fixed: usize,
    pub n_extinct: usize,
    pub n_dead: usize,
    pub n_timed_out: usize,
    pub n_running: usize,
    /// Fraction of runs in which the Favored allele fixed.
    pub fix_prob: f64,
    pub fix_age: AccumulatorReport,
    pub ext_age: AccumulatorReport,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&mut self, pop: &Population) {
        self.n_runs += 1;
        let age = pop.age() as f64;
        match pop.status() {
            Status::Fixed => {
                self.n_fixed += 1;
                self.fix_age.add(age);
            }
            Status::Extinct => {
                self.n_extinct += 1;
                self.ext_age.add(age);
            }
            Status::Dead => self.n_dead += 1,
            Status::TimedOut => self.n_timed_out += 1,
            Status::Running => self.n_running += 1,
        }
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            n_runs: self.n_runs,
            n_fixed: self.n_fixed,
            n_extinct: self.n_extinct,
            n_dead: self.n_dead,
            n_timed_out: self.n_timed_out,
            n_running: self.n_running,
            fix_prob: if self.n_runs > 0 {
                self.n_fixed as f64 / self.n_runs as f64
            } else {
                f64::NAN
            },
            fix_age: self.fix_age.report(),
            ext_age: self.ext_age.report(),
        }
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, &self.report()).context("failed to serialize report")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}
