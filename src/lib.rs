//! Wright-Fisher dynamics of a two-allele trait in a metapopulation of demes
//! coupled by migration, under per-deme fluctuating environments.

pub mod analysis;
pub mod config;
pub mod deme;
pub mod engine;
pub mod environment;
pub mod manager;
pub mod migration;
pub mod model;
pub mod population;
pub mod reproduction;
pub mod stats;
