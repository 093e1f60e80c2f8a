//! Simulation data types.

use serde::{Deserialize, Serialize};

/// One of the two allele types carried by an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Allele {
    /// Allele `a`, the one under study.
    Favored,
    /// Allele `A`, the resident type.
    Common,
}

/// Selection regime of a deme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    /// Environment 0.
    Base,
    /// Environment 1. Lethal to [`Allele::Favored`] in the lethal variant.
    Alternate,
}

impl Environment {
    /// Index of the environment in per-environment tables.
    pub fn index(self) -> usize {
        match self {
            Environment::Base => 0,
            Environment::Alternate => 1,
        }
    }
}

/// Allele counts of a deme or of a migrant pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub favored: usize,
    pub common: usize,
}

impl Counts {
    pub fn new(favored: usize, common: usize) -> Self {
        Self { favored, common }
    }

    pub fn total(&self) -> usize {
        self.favored + self.common
    }
}

/// Global state of a population.
///
/// Every state other than [`Status::Running`] is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Running,
    /// Every deme is monomorphic for [`Allele::Favored`].
    Fixed,
    /// Every deme is monomorphic for [`Allele::Common`].
    Extinct,
    /// Every deme hit a zero weighted total in its last reproduction step.
    Dead,
    /// The generation horizon was reached first.
    TimedOut,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        self != Status::Running
    }
}

/// Observable state of one deme at a given generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemeSnapshot {
    pub counts: Counts,
    pub env: Environment,
    pub dead: bool,
}

/// Record of the simulation at a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Generation counter.
    pub age: usize,

    /// Population status after this generation.
    pub status: Status,

    /// One snapshot per deme, in deme order.
    pub demes: Vec<DemeSnapshot>,
}
