//! Closest-cluster refinement of ranked search results.
//!
//! A nearest-neighbour search returns a fixed number of results even when
//! only one or two are actually close to the query. This refiner looks at
//! the distribution of deltas and keeps only the top cluster.
//!
//! # Algorithm
//!
//! 1. Evaluate a Gaussian kernel density estimate of the deltas on an even
//!    grid spanning `[min - 0.01, max + 0.01]`.
//! 2. Start with bandwidth `factor^-1` and shrink by `factor` each step
//!    until the log-density has at least one strict local minimum.
//! 3. Take the highest-positioned local maximum. The cutoff is the last
//!    local minimum below it.
//! 4. Keep results whose delta exceeds the cutoff, optionally capped at
//!    `no_more_than_k`.
//!
//! Whenever a step has nothing to work with (equal deltas, no usable
//! bandwidth, empty selection) the input is returned unchanged.

use tracing::debug;

use crate::catalog::SearchResult;

#[derive(Debug, Clone, PartialEq)]
pub struct ClosestClusterRefiner {
    pub kde_distribution_n: usize,
    pub deepening_factor: f64,
    pub max_deepen_steps: i32,
    pub no_more_than_k: Option<usize>,
}

impl Default for ClosestClusterRefiner {
    fn default() -> Self {
        Self {
            kde_distribution_n: 10_000,
            deepening_factor: 0.1,
            max_deepen_steps: 10,
            no_more_than_k: None,
        }
    }
}

impl ClosestClusterRefiner {
    pub fn with_limit(mut self, k: usize) -> Self {
        self.no_more_than_k = Some(k);
        self
    }

    /// Trim `results` (ordered by descending delta) to the closest cluster.
    pub fn refine(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let deltas: Vec<f64> = results.iter().map(|r| r.delta as f64).collect();
        let Some(cutoff) = self.cutoff(&deltas) else {
            return results;
        };

        let mut kept: Vec<SearchResult> = results
            .iter()
            .filter(|r| (r.delta as f64) > cutoff)
            .cloned()
            .collect();
        if kept.is_empty() {
            return results;
        }
        if let Some(k) = self.no_more_than_k {
            kept.truncate(k);
        }
        kept
    }

    fn cutoff(&self, deltas: &[f64]) -> Option<f64> {
        if deltas.len() < 2 || self.kde_distribution_n < 3 {
            return None;
        }
        let min = deltas.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = deltas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if min == max {
            return None;
        }

        let grid = linspace(min - 0.01, max + 0.01, self.kde_distribution_n);
        for step in -1..self.max_deepen_steps {
            let bandwidth = self.deepening_factor.powi(step);
            let density = log_density(deltas, &grid, bandwidth);
            let minima = strict_extrema(&density, |a, b| a < b);
            if minima.is_empty() {
                debug!(bandwidth, "bandwidth not satisfiable, deepening");
                continue;
            }
            debug!(bandwidth, "using bandwidth");

            let maxima = strict_extrema(&density, |a, b| a > b);
            let top = *maxima.last()?;
            let below = minima.iter().rev().find(|&&m| m < top)?;
            return Some(grid[*below]);
        }
        None
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Log of the Gaussian KDE at each grid point, via log-sum-exp.
fn log_density(samples: &[f64], grid: &[f64], bandwidth: f64) -> Vec<f64> {
    let n = samples.len() as f64;
    let log_norm = -(bandwidth * (2.0 * std::f64::consts::PI).sqrt()).ln() - n.ln();
    grid.iter()
        .map(|&x| {
            let exponents: Vec<f64> = samples
                .iter()
                .map(|&s| {
                    let z = (x - s) / bandwidth;
                    -0.5 * z * z
                })
                .collect();
            let peak = exponents.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = exponents.iter().map(|e| (e - peak).exp()).sum();
            peak + sum.ln() + log_norm
        })
        .collect()
}

/// Interior indices strictly beating both neighbours under `cmp`.
fn strict_extrema(values: &[f64], cmp: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    (1..values.len().saturating_sub(1))
        .filter(|&i| cmp(values[i], values[i - 1]) && cmp(values[i], values[i + 1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DescriptorKind, RecordDescriptor, VersionDescriptor};
    use std::path::PathBuf;

    fn results(deltas: &[f32]) -> Vec<SearchResult> {
        deltas
            .iter()
            .enumerate()
            .map(|(i, &delta)| SearchResult {
                entry: RecordDescriptor {
                    name: format!("tool_{}", i),
                    description: format!("dummy tool {}", i),
                    source: PathBuf::from("."),
                    version: VersionDescriptor::committed(format!("{:040}", i)),
                    embedding: None,
                    annotations: None,
                    kind: DescriptorKind::ModelInput {
                        input: serde_json::json!({}),
                    },
                },
                delta,
            })
            .collect()
    }

    #[test]
    fn equal_deltas_are_unchanged() {
        let input = results(&[0.1; 10]);
        assert_eq!(ClosestClusterRefiner::default().refine(input.clone()), input);
    }

    #[test]
    fn single_outlier_is_kept_alone() {
        let input = results(&[0.999, 0.6, 0.6, 0.5, 0.3, -0.3]);
        let refined = ClosestClusterRefiner::default().refine(input.clone());
        assert_eq!(refined, input[..1].to_vec());
    }

    #[test]
    fn two_close_outliers_are_kept_in_order() {
        let input = results(&[0.9990, 0.9989, 0.6, 0.6, 0.5, 0.3, -0.3]);
        let refined = ClosestClusterRefiner::default().refine(input.clone());
        assert_eq!(refined, input[..2].to_vec());
    }

    #[test]
    fn cap_limits_kept_results() {
        let input = results(&[0.9990, 0.9989, 0.6, 0.6, 0.5, 0.3, -0.3]);
        let refined = ClosestClusterRefiner::default().with_limit(1).refine(input.clone());
        assert_eq!(refined, input[..1].to_vec());
    }

    #[test]
    fn short_inputs_are_unchanged() {
        assert!(ClosestClusterRefiner::default().refine(Vec::new()).is_empty());
        let one = results(&[0.4]);
        assert_eq!(ClosestClusterRefiner::default().refine(one.clone()), one);
    }

    #[test]
    fn no_satisfiable_bandwidth_is_unchanged() {
        let refiner = ClosestClusterRefiner {
            max_deepen_steps: 0,
            ..Default::default()
        };
        let input = results(&[0.999, 0.6, 0.6, 0.5, 0.3, -0.3]);
        assert_eq!(refiner.refine(input.clone()), input);
    }
}
