//! Generalized Linear Models
//!
//! Maximum likelihood fitting of binomial, Gaussian and Poisson regression
//! models by iteratively reweighted least squares (IRLS), used for the
//! exposure, outcome and targeting models of the causal estimators.
use crate::data::Row;
use crate::errors::CausalError;
use crate::family::Family;
use crate::formula::{DesignMatrix, ModelSpec};
use crate::linalg::Cholesky;
use crate::utils::{normal_cdf, validate_positive_float_parameter, z_critical};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

fn default_max_iter() -> usize {
    100
}
fn default_tolerance() -> f64 {
    1e-8
}

/// Stopping rules for IRLS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrlsConfig {
    /// Maximum number of IRLS iterations.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Convergence threshold on the relative change in deviance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        IrlsConfig {
            max_iter: default_max_iter(),
            tolerance: default_tolerance(),
        }
    }
}

impl IrlsConfig {
    pub fn validate(&self) -> Result<(), CausalError> {
        if self.max_iter == 0 {
            return Err(CausalError::InvalidParameter(
                "max_iter".to_string(),
                "a positive integer".to_string(),
                self.max_iter.to_string(),
            ));
        }
        validate_positive_float_parameter(self.tolerance, "tolerance")
    }
}

/// Result of fitting a generalized linear model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlmFit {
    pub family: Family,
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    /// Row-major covariance matrix of the coefficients.
    pub covariance: Vec<f64>,
    pub dispersion: f64,
    pub deviance: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub n_obs: usize,
    pub iterations: usize,
    pub converged: bool,
}

fn weighted_normal_equations(x: &DesignMatrix, w: &[f64], z: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let m = x.as_matrix();
    let p = m.cols;
    let mut xtwx = vec![0.0; p * p];
    let mut xtwz = vec![0.0; p];
    for a in 0..p {
        let col_a = m.get_col(a);
        xtwz[a] = col_a.iter().zip(w).zip(z).map(|((xa, wi), zi)| xa * wi * zi).sum();
        for b in a..p {
            let col_b = m.get_col(b);
            let v: f64 = col_a.iter().zip(col_b).zip(w).map(|((xa, xb), wi)| xa * xb * wi).sum();
            xtwx[a * p + b] = v;
            xtwx[b * p + a] = v;
        }
    }
    (xtwx, xtwz)
}

fn factor(xtwx: &[f64], x: &DesignMatrix) -> Result<Cholesky, CausalError> {
    Cholesky::new(xtwx, x.cols).map_err(|j| CausalError::SingularModel(x.labels[j].clone()))
}

/// Fit a generalized linear model by IRLS.
///
/// * `x` - Design matrix (intercept column included when wanted).
/// * `y` - Response, one value per design row.
/// * `offset` - Optional fixed term added to the linear predictor with coefficient one.
/// * `family` - Response distribution, with its canonical link.
/// * `config` - IRLS stopping rules.
pub fn fit_glm(
    x: &DesignMatrix,
    y: &[f64],
    offset: Option<&[f64]>,
    family: Family,
    config: &IrlsConfig,
) -> Result<GlmFit, CausalError> {
    let n = x.rows;
    let p = x.cols;
    if y.len() != n {
        return Err(CausalError::InvalidData(format!(
            "response has {} values but the design matrix has {} rows",
            y.len(),
            n
        )));
    }
    if p == 0 {
        return Err(CausalError::InvalidParameter(
            "model specification".to_string(),
            "at least one design column".to_string(),
            "0".to_string(),
        ));
    }
    if n <= p {
        return Err(CausalError::InvalidData(format!(
            "{} observations are not enough to estimate {} parameters",
            n, p
        )));
    }
    if let Some(v) = y.iter().find(|v| !family.validate_response(**v)) {
        return Err(CausalError::InvalidData(format!(
            "response value {} is outside the support of the {} family",
            v, family
        )));
    }
    let zeros;
    let offset = match offset {
        Some(o) if o.len() != n => {
            return Err(CausalError::InvalidData(format!(
                "offset has {} values, expected {}",
                o.len(),
                n
            )))
        }
        Some(o) => o,
        None => {
            zeros = vec![0.0; n];
            &zeros
        }
    };

    let m = x.as_matrix();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let mut mu: Vec<f64> = y.iter().map(|&yi| family.starting_mu(yi, y_mean)).collect();
    let mut eta: Vec<f64> = mu.iter().map(|&mi| family.link(mi)).collect();
    let mut dev_old: f64 = y.iter().zip(&mu).map(|(yi, mi)| family.unit_deviance(*yi, *mi)).sum();
    let mut beta = vec![0.0; p];
    let mut deviance = dev_old;
    let mut iterations = 0;
    let mut converged = false;

    for it in 1..=config.max_iter {
        iterations = it;
        let mut w = Vec::with_capacity(n);
        let mut z = Vec::with_capacity(n);
        for i in 0..n {
            let d = family.link_derivative(mu[i]);
            w.push(1.0 / (family.variance(mu[i]) * d * d));
            z.push(eta[i] - offset[i] + (y[i] - mu[i]) * d);
        }
        let (xtwx, xtwz) = weighted_normal_equations(x, &w, &z);
        beta = factor(&xtwx, x)?.solve(&xtwz);

        for i in 0..n {
            let lp: f64 = (0..p).map(|j| m.get(i, j) * beta[j]).sum();
            eta[i] = lp + offset[i];
            mu[i] = family.inverse_link(eta[i]);
        }
        deviance = y.iter().zip(&mu).map(|(yi, mi)| family.unit_deviance(*yi, *mi)).sum();
        debug!("IRLS iteration {}, deviance: {}", it, deviance);
        if !deviance.is_finite() {
            return Err(CausalError::InvalidData(format!(
                "IRLS diverged at iteration {} (deviance {})",
                it, deviance
            )));
        }
        if (deviance - dev_old).abs() / (deviance.abs() + 0.1) < config.tolerance {
            converged = true;
            break;
        }
        dev_old = deviance;
    }
    if !converged {
        warn!(
            "IRLS did not converge after {} iterations, the last iterate is returned.",
            config.max_iter
        );
    }

    let w: Vec<f64> = mu
        .iter()
        .map(|&mi| {
            let d = family.link_derivative(mi);
            1.0 / (family.variance(mi) * d * d)
        })
        .collect();
    let (xtwx, _) = weighted_normal_equations(x, &w, &vec![0.0; n]);
    let inverse = factor(&xtwx, x)?.inverse();
    let dispersion = if family.has_dispersion() {
        y.iter()
            .zip(&mu)
            .map(|(yi, mi)| (yi - mi) * (yi - mi) / family.variance(*mi))
            .sum::<f64>()
            / (n - p) as f64
    } else {
        1.0
    };
    let covariance: Vec<f64> = inverse.iter().map(|v| v * dispersion).collect();
    let standard_errors = (0..p).map(|j| covariance[j * p + j].sqrt()).collect();

    let scale = deviance / n as f64;
    let log_likelihood = family.log_likelihood(y, &mu, scale);
    let k = p + usize::from(family.has_dispersion());
    let aic = -2.0 * log_likelihood + 2.0 * k as f64;

    Ok(GlmFit {
        family,
        coefficients: beta,
        standard_errors,
        covariance,
        dispersion,
        deviance,
        log_likelihood,
        aic,
        n_obs: n,
        iterations,
        converged,
    })
}

impl GlmFit {
    /// Linear predictor `x'b` for one design row (offset excluded).
    pub fn linear_predictor(&self, x: &[f64]) -> f64 {
        x.iter().zip(&self.coefficients).map(|(a, b)| a * b).sum()
    }

    pub fn z_values(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.standard_errors)
            .map(|(b, se)| b / se)
            .collect()
    }

    /// Two-sided Wald p-values.
    pub fn p_values(&self) -> Vec<f64> {
        self.z_values()
            .iter()
            .map(|z| 2.0 * (1.0 - normal_cdf(z.abs())))
            .collect()
    }

    /// Wald confidence intervals at level `1 - alpha`.
    pub fn confidence_intervals(&self, alpha: f64) -> Vec<(f64, f64)> {
        let z = z_critical(alpha);
        self.coefficients
            .iter()
            .zip(&self.standard_errors)
            .map(|(b, se)| (b - z * se, b + z * se))
            .collect()
    }

    /// Human-readable regression table.
    pub fn summary(&self, labels: &[String], alpha: f64) -> String {
        let mut s = String::new();
        let rule = "=".repeat(78);
        let z = self.z_values();
        let p = self.p_values();
        let ci = self.confidence_intervals(alpha);
        let _ = writeln!(s, "{}", rule);
        let _ = writeln!(
            s,
            "Generalized Linear Model: {} family, {} link",
            self.family,
            self.family.link_name()
        );
        let _ = writeln!(
            s,
            "No. Observations: {:<8} Df Residuals: {:<8} Dispersion: {:.4}",
            self.n_obs,
            self.n_obs - self.coefficients.len(),
            self.dispersion
        );
        let _ = writeln!(
            s,
            "Deviance: {:<12.4} Log-Likelihood: {:<12.4} AIC: {:.4}",
            self.deviance, self.log_likelihood, self.aic
        );
        let _ = writeln!(
            s,
            "IRLS iterations: {} ({})",
            self.iterations,
            if self.converged { "converged" } else { "not converged" }
        );
        let _ = writeln!(s, "{}", "-".repeat(78));
        let _ = writeln!(
            s,
            "{:<16}{:>10}{:>10}{:>9}{:>9}{:>12}{:>12}",
            "",
            "coef",
            "std err",
            "z",
            "P>|z|",
            format!("[{:.3}", alpha / 2.0),
            format!("{:.3}]", 1.0 - alpha / 2.0)
        );
        for (j, label) in labels.iter().enumerate() {
            let _ = writeln!(
                s,
                "{:<16}{:>10.4}{:>10.4}{:>9.3}{:>9.3}{:>12.4}{:>12.4}",
                label, self.coefficients[j], self.standard_errors[j], z[j], p[j], ci[j].0, ci[j].1
            );
        }
        let _ = write!(s, "{}", rule);
        s
    }
}

/// A fitted regression model bound to its specification.
///
/// Immutable once fit; predictions are a deterministic function of the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedGlm {
    pub spec: ModelSpec,
    pub fit: GlmFit,
}

impl FittedGlm {
    /// Predicted mean for a record, honoring any value forced on the row.
    pub fn predict(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        let x = self.spec.design_row(row)?;
        Ok(self.fit.family.inverse_link(self.fit.linear_predictor(&x)))
    }

    pub fn summary(&self, alpha: f64) -> String {
        self.fit.summary(&self.spec.column_labels(), alpha)
    }
}
