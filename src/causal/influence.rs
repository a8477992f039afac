//! Influence curve based inference.
//!
//! Both doubly-robust estimators are asymptotically linear: the standard error
//! of the point estimate is the sample standard deviation of its per-record
//! influence curve divided by `sqrt(n)`.
use crate::utils::{sample_std, z_critical};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A point estimate with optional Wald inference.
///
/// For ratio measures `std_error` is on the log scale and the interval is
/// `exp(log(point) ± z·std_error)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub point: f64,
    pub std_error: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
}

/// `sd(ic) / sqrt(n)`, with the n - 1 sample standard deviation.
pub fn influence_std_error(ic: &[f64]) -> f64 {
    sample_std(ic) / (ic.len() as f64).sqrt()
}

impl Estimate {
    pub fn point_only(point: f64) -> Self {
        Estimate {
            point,
            std_error: None,
            ci_lower: None,
            ci_upper: None,
        }
    }

    /// Additive measure: `point ± z·se`.
    pub fn from_influence(point: f64, ic: &[f64], alpha: f64) -> Self {
        let se = influence_std_error(ic);
        let z = z_critical(alpha);
        Estimate {
            point,
            std_error: Some(se),
            ci_lower: Some(point - z * se),
            ci_upper: Some(point + z * se),
        }
    }

    /// Ratio measure, `ic` being the influence curve of `log(point)`.
    pub fn from_log_influence(point: f64, ic: &[f64], alpha: f64) -> Self {
        let se = influence_std_error(ic);
        let z = z_critical(alpha);
        let log_point = point.ln();
        Estimate {
            point,
            std_error: Some(se),
            ci_lower: Some((log_point - z * se).exp()),
            ci_upper: Some((log_point + z * se).exp()),
        }
    }

    /// Multiply point, standard error and interval by `factor > 0`.
    pub fn rescale(self, factor: f64) -> Self {
        Estimate {
            point: self.point * factor,
            std_error: self.std_error.map(|v| v * factor),
            ci_lower: self.ci_lower.map(|v| v * factor),
            ci_upper: self.ci_upper.map(|v| v * factor),
        }
    }

    pub(crate) fn write_block(&self, s: &mut String, label: &str, alpha: f64) {
        let _ = writeln!(s, "{:<26}{:>10.4}", format!("{}:", label), self.point);
        if let Some(se) = self.std_error {
            let _ = writeln!(s, "{:<26}{:>10.4}", format!("{} SE:", label), se);
        }
        if let (Some(lo), Some(hi)) = (self.ci_lower, self.ci_upper) {
            let _ = writeln!(
                s,
                "{:<26}{:>10.4}, {:.4}",
                format!("{:.1}% two-sided CI:", 100.0 * (1.0 - alpha)),
                lo,
                hi
            );
        }
    }
}
