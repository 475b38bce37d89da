//! k-nearest-neighbour donor sampling.
//!
//! Candidates are ranked by score (descending, ties keep pool order), the top
//! `k = floor(sqrt(n)) + 1` are kept and weighted by `score + 1`. Each
//! simulation run draws one donor from the resulting discrete distribution.

use rand::Rng;

use crate::error::AppError;

/// Source of uniform draws in `[0, 1)`.
///
/// Injected so sampling can be replayed deterministically.
pub trait UniformSource {
    fn next_uniform(&mut self) -> f64;
}

/// Adapts any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: Rng> UniformSource for RngSource<R> {
    fn next_uniform(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct FixedDraws {
    draws: Vec<f64>,
    pos: usize,
}

impl FixedDraws {
    pub fn new(draws: Vec<f64>) -> Self {
        Self { draws, pos: 0 }
    }
}

impl UniformSource for FixedDraws {
    fn next_uniform(&mut self) -> f64 {
        if self.draws.is_empty() {
            return 0.0;
        }
        let u = self.draws[self.pos % self.draws.len()];
        self.pos += 1;
        u
    }
}

/// Number of neighbours kept from a pool of `n` candidates.
pub fn neighbourhood_size(n: usize) -> usize {
    let root = (n as f64).sqrt().floor() as usize;
    (root + 1).min(n)
}

/// One ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    /// Index into the donor series.
    pub index: usize,
    pub score: f64,
}

/// Sort `pool` by `scores`, best first. Equal scores keep pool order.
pub fn rank(pool: &[usize], scores: &[f64]) -> Result<Vec<Ranked>, AppError> {
    if pool.len() != scores.len() {
        return Err(AppError::algorithm(format!(
            "{} candidates but {} scores",
            pool.len(),
            scores.len()
        )));
    }
    if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
        return Err(AppError::algorithm(format!(
            "candidate {} has a non-finite score",
            pool[bad]
        )));
    }

    let mut ranked: Vec<Ranked> = pool
        .iter()
        .zip(scores)
        .map(|(&index, &score)| Ranked { index, score })
        .collect();
    // `sort_by` is stable; scores are finite so `total_cmp` agrees with `<`.
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(ranked)
}

/// Discrete sampling distribution over the top-k candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnDistribution {
    /// Top-k candidates, best first.
    pub neighbours: Vec<Ranked>,
    pub weights: Vec<f64>,
    /// Running sum of `weights`; the last entry is 1.
    pub cdf: Vec<f64>,
}

impl KnnDistribution {
    pub fn new(pool: &[usize], scores: &[f64]) -> Result<Self, AppError> {
        if pool.is_empty() {
            return Err(AppError::algorithm("cannot sample from an empty candidate pool"));
        }
        let mut neighbours = rank(pool, scores)?;
        neighbours.truncate(neighbourhood_size(pool.len()));

        let raw: Vec<f64> = neighbours.iter().map(|r| r.score + 1.0).collect();
        let total: f64 = raw.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(AppError::algorithm(format!(
                "candidate weights sum to {total}; cannot form a sampling distribution"
            )));
        }

        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();
        let mut cdf = Vec::with_capacity(weights.len());
        let mut acc = 0.0;
        for w in &weights {
            acc += w;
            cdf.push(acc);
        }

        Ok(Self {
            neighbours,
            weights,
            cdf,
        })
    }

    pub fn k(&self) -> usize {
        self.neighbours.len()
    }

    /// Donor index for one uniform draw: first bucket whose cdf reaches `u`.
    pub fn select(&self, u: f64) -> usize {
        let bucket = self
            .cdf
            .iter()
            .position(|c| *c >= u)
            .unwrap_or(self.cdf.len() - 1);
        self.neighbours[bucket].index
    }

    /// One donor per simulation run.
    pub fn sample(&self, runs: usize, source: &mut dyn UniformSource) -> Vec<usize> {
        (0..runs).map(|_| self.select(source.next_uniform())).collect()
    }
}
