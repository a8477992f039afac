//! Family
//!
//! Distributional families for generalized linear models, each paired with
//! its canonical link.
use crate::errors::CausalError;
use crate::utils::{expit, ln_gamma, logit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fitted means are kept this far from the boundary of the family's support.
const MU_EPS: f64 = 1e-10;

/// Exponent clamp for the log link.
const MAX_LOG_ETA: f64 = 700.0;

/// Distribution of the response in a generalized linear model.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    /// Bernoulli response with a logit link.
    #[default]
    Binomial,
    /// Normal response with an identity link.
    Gaussian,
    /// Count response with a log link.
    Poisson,
}

impl Family {
    /// Canonical link `g(mu)`.
    pub fn link(&self, mu: f64) -> f64 {
        match self {
            Family::Binomial => logit(mu),
            Family::Gaussian => mu,
            Family::Poisson => mu.ln(),
        }
    }

    /// Inverse link `g^-1(eta)`, kept inside the support.
    pub fn inverse_link(&self, eta: f64) -> f64 {
        match self {
            Family::Binomial => expit(eta).clamp(MU_EPS, 1.0 - MU_EPS),
            Family::Gaussian => eta,
            Family::Poisson => eta.min(MAX_LOG_ETA).exp().max(MU_EPS),
        }
    }

    /// Derivative of the link, `d eta / d mu`.
    pub fn link_derivative(&self, mu: f64) -> f64 {
        match self {
            Family::Binomial => 1.0 / (mu * (1.0 - mu)),
            Family::Gaussian => 1.0,
            Family::Poisson => 1.0 / mu,
        }
    }

    /// Variance function `V(mu)`.
    pub fn variance(&self, mu: f64) -> f64 {
        match self {
            Family::Binomial => mu * (1.0 - mu),
            Family::Gaussian => 1.0,
            Family::Poisson => mu,
        }
    }

    /// Starting mean for IRLS.
    pub fn starting_mu(&self, y: f64, y_mean: f64) -> f64 {
        match self {
            Family::Binomial => (y + 0.5) / 2.0,
            Family::Gaussian | Family::Poisson => (y + y_mean) / 2.0,
        }
    }

    /// Unit deviance contribution of one observation.
    pub fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        match self {
            Family::Binomial => {
                let mut d = 0.0;
                if y > 0.0 {
                    d += y * (y / mu).ln();
                }
                if y < 1.0 {
                    d += (1.0 - y) * ((1.0 - y) / (1.0 - mu)).ln();
                }
                2.0 * d
            }
            Family::Gaussian => (y - mu) * (y - mu),
            Family::Poisson => {
                let mut d = -(y - mu);
                if y > 0.0 {
                    d += y * (y / mu).ln();
                }
                2.0 * d
            }
        }
    }

    /// Log-likelihood of the fitted means. `scale` is only used by the
    /// Gaussian family (maximum likelihood estimate of the variance).
    pub fn log_likelihood(&self, y: &[f64], mu: &[f64], scale: f64) -> f64 {
        match self {
            Family::Binomial => y
                .iter()
                .zip(mu)
                .map(|(y_, mu_)| y_ * mu_.ln() + (1.0 - y_) * (1.0 - mu_).ln())
                .sum(),
            Family::Gaussian => {
                let n = y.len() as f64;
                -0.5 * n * ((2.0 * std::f64::consts::PI * scale).ln() + 1.0)
            }
            Family::Poisson => y
                .iter()
                .zip(mu)
                .map(|(y_, mu_)| y_ * mu_.ln() - mu_ - ln_gamma(y_ + 1.0))
                .sum(),
        }
    }

    /// Is the dispersion estimated (rather than fixed at one)?
    pub fn has_dispersion(&self) -> bool {
        matches!(self, Family::Gaussian)
    }

    /// Check that a response value lies in the support of the family.
    pub fn validate_response(&self, y: f64) -> bool {
        match self {
            Family::Binomial => (0.0..=1.0).contains(&y),
            Family::Gaussian => y.is_finite(),
            Family::Poisson => y >= 0.0 && y.is_finite(),
        }
    }

    /// Name of the link function.
    pub fn link_name(&self) -> &'static str {
        match self {
            Family::Binomial => "logit",
            Family::Gaussian => "identity",
            Family::Poisson => "log",
        }
    }
}

impl FromStr for Family {
    type Err = CausalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binomial" | "binary" | "logistic" => Ok(Family::Binomial),
            "gaussian" | "normal" => Ok(Family::Gaussian),
            "poisson" => Ok(Family::Poisson),
            _ => Err(CausalError::UnsupportedFamily(s.to_string())),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Family::Binomial => "Binomial",
            Family::Gaussian => "Gaussian",
            Family::Poisson => "Poisson",
        };
        write!(f, "{}", name)
    }
}
