//! Migration strategies coupling the demes of a population.
//!
//! Every strategy runs once per generation, before reproduction, and leaves
//! the total headcount over all demes unchanged. The strategies are not
//! numerically equivalent: they differ in which individuals move and in the
//! biases they introduce.

use crate::deme::Deme;
use crate::model::{Allele, Counts};
use anyhow::{Context, Result, bail};
use rand::Rng;
use rand::seq::{SliceRandom, index};
use rand_distr::{Binomial, Distribution};
use serde::{Deserialize, Serialize};

/// Capability of redistributing allele counts across demes.
pub trait Migrate {
    fn migrate<R: Rng + ?Sized>(&self, demes: &mut [Deme], rng: &mut R) -> Result<()>;
}

/// Split `total` into `n_parts` shares differing by at most one.
///
/// The first `total % n_parts` shares receive the extra unit.
pub fn split_evenly(total: usize, n_parts: usize) -> impl Iterator<Item = usize> {
    let div = total.checked_div(n_parts).unwrap_or(0);
    let rem = total.checked_rem(n_parts).unwrap_or(0);
    (0..n_parts).map(move |i| div + usize::from(i < rem))
}

/// Proportional donation into a shared pool followed by an even split.
///
/// Each deme donates `floor(rate * count)` of each allele. The pool is
/// handed back in equal shares with the remainder going to the first demes.
/// No random draws are involved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledRedistribution {
    pub rate: f64,
}

impl Migrate for PooledRedistribution {
    fn migrate<R: Rng + ?Sized>(&self, demes: &mut [Deme], _rng: &mut R) -> Result<()> {
        let mut pool = Counts::default();
        for deme in demes.iter_mut() {
            let counts = deme.counts();
            let out = Counts::new(
                (self.rate * counts.favored as f64).floor() as usize,
                (self.rate * counts.common as f64).floor() as usize,
            );
            deme.remove(out).context("failed to collect donations")?;
            pool.favored += out.favored;
            pool.common += out.common;
        }

        let n_demes = demes.len();
        let shares = split_evenly(pool.favored, n_demes).zip(split_evenly(pool.common, n_demes));
        for (deme, (favored, common)) in demes.iter_mut().zip(shares) {
            deme.insert(Counts::new(favored, common));
        }

        Ok(())
    }
}

/// Exchange of individuals through a shuffled pool.
///
/// Each deme sends `round(rate * capacity)` individuals chosen without
/// replacement. The pool is shuffled and cut into contiguous blocks, one per
/// deme in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualExchange {
    pub rate: f64,
}

impl IndividualExchange {
    pub fn n_migrants(&self, capacity: usize) -> usize {
        (self.rate * capacity as f64).round() as usize
    }
}

impl Migrate for IndividualExchange {
    fn migrate<R: Rng + ?Sized>(&self, demes: &mut [Deme], rng: &mut R) -> Result<()> {
        let Some(first) = demes.first() else {
            return Ok(());
        };
        let n_mig = self.n_migrants(first.capacity());
        if n_mig == 0 {
            return Ok(());
        }

        let mut pool = Vec::with_capacity(n_mig * demes.len());
        for (i_deme, deme) in demes.iter_mut().enumerate() {
            let counts = deme.counts();
            let total = counts.total();
            if n_mig > total {
                bail!("deme {i_deme} holds {total} individuals, cannot send {n_mig} migrants");
            }

            // Members are laid out Favored first, so low indices are Favored.
            let n_favored = index::sample(rng, total, n_mig)
                .iter()
                .filter(|&i_mem| i_mem < counts.favored)
                .count();
            let out = Counts::new(n_favored, n_mig - n_favored);
            deme.remove(out).context("failed to collect migrants")?;

            pool.extend(std::iter::repeat_n(Allele::Favored, out.favored));
            pool.extend(std::iter::repeat_n(Allele::Common, out.common));
        }

        pool.shuffle(rng);

        for (deme, block) in demes.iter_mut().zip(pool.chunks_exact(n_mig)) {
            let n_favored = block.iter().filter(|&&a| a == Allele::Favored).count();
            deme.insert(Counts::new(n_favored, n_mig - n_favored));
        }

        Ok(())
    }
}

/// Approximate exchange of a fixed number of migrants per deme.
///
/// The number of Favored emigrants is binomial and the number of Favored
/// returners is uniform, both clamped to what is available. Costs O(M) per
/// generation at the price of a small bias with respect to
/// [`IndividualExchange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinomialExchange {
    pub count: usize,
}

impl Migrate for BinomialExchange {
    fn migrate<R: Rng + ?Sized>(&self, demes: &mut [Deme], rng: &mut R) -> Result<()> {
        let n_mig = self.count;
        if n_mig == 0 {
            return Ok(());
        }

        let mut pool = Counts::default();
        for (i_deme, deme) in demes.iter_mut().enumerate() {
            let counts = deme.counts();
            let total = counts.total();
            if n_mig > total {
                bail!("deme {i_deme} holds {total} individuals, cannot send {n_mig} migrants");
            }

            let prob = counts.favored as f64 / total as f64;
            let draw = Binomial::new(n_mig as u64, prob)?.sample(rng) as usize;
            let out = clamp_draw(draw, n_mig, counts);
            deme.remove(out).context("failed to collect migrants")?;
            pool.favored += out.favored;
            pool.common += out.common;
        }

        for deme in demes.iter_mut() {
            let draw = rng.random_range(0..=n_mig);
            let inc = clamp_draw(draw, n_mig, pool);
            pool.favored -= inc.favored;
            pool.common -= inc.common;
            deme.insert(inc);
        }

        Ok(())
    }
}

/// Split `n_mig` migrants taken from `stock` into Favored and Common, given
/// a drawn number of Favored migrants.
///
/// The draw is clamped to the Favored stock first, then raised until the
/// Common stock suffices. `stock` must hold at least `n_mig` individuals.
fn clamp_draw(draw: usize, n_mig: usize, stock: Counts) -> Counts {
    let mut favored = draw.min(stock.favored);
    if n_mig - favored > stock.common {
        favored = n_mig - stock.common;
    }
    Counts::new(favored, n_mig - favored)
}

/// Migration strategy of a population, chosen once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Migration {
    /// Demes never exchange individuals.
    Isolated,
    Pooled(PooledRedistribution),
    Exchange(IndividualExchange),
    Binomial(BinomialExchange),
}

impl Migrate for Migration {
    fn migrate<R: Rng + ?Sized>(&self, demes: &mut [Deme], rng: &mut R) -> Result<()> {
        match self {
            Migration::Isolated => Ok(()),
            Migration::Pooled(strategy) => strategy.migrate(demes, rng),
            Migration::Exchange(strategy) => strategy.migrate(demes, rng),
            Migration::Binomial(strategy) => strategy.migrate(demes, rng),
        }
    }
}
