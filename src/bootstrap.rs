//! Bootstrap
//!
//! Nonparametric bootstrap for any scalar estimate computed from a dataset,
//! typically a g-formula contrast which has no closed-form variance.
use crate::data::Dataset;
use crate::errors::CausalError;
use crate::utils::{mean, sample_std, validate_float_parameter};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Resampling driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bootstrap {
    pub n_resamples: usize,
    pub seed: u64,
    /// Percentile intervals are reported at level `1 - alpha`.
    pub alpha: f64,
}

/// Distribution of the bootstrapped statistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub estimate_mean: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_failed: usize,
    pub replicates: Vec<f64>,
}

impl Default for Bootstrap {
    fn default() -> Self {
        Bootstrap {
            n_resamples: 200,
            seed: 0,
            alpha: 0.05,
        }
    }
}

/// Linear interpolation between order statistics, `q` in [0, 1].
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl Bootstrap {
    pub fn new(n_resamples: usize, seed: u64) -> Self {
        Bootstrap {
            n_resamples,
            seed,
            ..Default::default()
        }
    }

    pub fn set_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Indices of the `i`-th resample, drawn with replacement.
    ///
    /// Each replicate owns its generator, so results do not depend on how
    /// replicates are scheduled across threads.
    pub fn resample_indices(&self, i: usize, n: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
        (0..n).map(|_| rng.gen_range(0..n)).collect()
    }

    /// Evaluate `statistic` on `n_resamples` resamples of `data`.
    ///
    /// Replicates whose statistic fails (for example a resample with a single
    /// treatment arm) are skipped and counted in `n_failed`.
    pub fn run<F>(&self, data: &Dataset, statistic: F) -> Result<BootstrapSummary, CausalError>
    where
        F: Fn(&Dataset) -> Result<f64, CausalError> + Sync,
    {
        if self.n_resamples < 2 {
            return Err(CausalError::InvalidParameter(
                "n_resamples".to_string(),
                "at least 2".to_string(),
                self.n_resamples.to_string(),
            ));
        }
        validate_float_parameter(self.alpha, f64::MIN_POSITIVE, 1.0 - f64::EPSILON, "alpha")?;
        let n = data.n_rows();
        if n == 0 {
            return Err(CausalError::InvalidData("cannot resample an empty dataset".to_string()));
        }

        let results: Vec<Result<f64, CausalError>> = (0..self.n_resamples)
            .into_par_iter()
            .map(|i| statistic(&data.take(&self.resample_indices(i, n))))
            .collect();

        let mut replicates = Vec::with_capacity(results.len());
        let mut n_failed = 0;
        for (i, r) in results.into_iter().enumerate() {
            match r {
                Ok(v) if v.is_finite() => replicates.push(v),
                Ok(v) => {
                    warn!("Bootstrap replicate {} produced a non-finite estimate {}, skipping.", i, v);
                    n_failed += 1;
                }
                Err(e) => {
                    warn!("Bootstrap replicate {} failed: {}", i, e);
                    n_failed += 1;
                }
            }
        }
        if replicates.len() < 2 {
            return Err(CausalError::InvalidData(format!(
                "{} of {} bootstrap replicates failed",
                n_failed, self.n_resamples
            )));
        }
        if n_failed > 0 {
            info!("{} of {} bootstrap replicates were skipped.", n_failed, self.n_resamples);
        }

        let mut sorted = replicates.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Ok(BootstrapSummary {
            estimate_mean: mean(&replicates),
            std_error: sample_std(&replicates),
            ci_lower: quantile(&sorted, self.alpha / 2.0),
            ci_upper: quantile(&sorted, 1.0 - self.alpha / 2.0),
            n_failed,
            replicates,
        })
    }
}
