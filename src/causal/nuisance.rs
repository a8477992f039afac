//! Nuisance models shared by the doubly-robust estimators: the propensity
//! score model `P(A = 1 | L)` and the outcome model `E[Y | A, L]`.
use crate::data::Dataset;
use crate::errors::CausalError;
use crate::family::Family;
use crate::predictor::{predict_all, predict_counterfactual, Bound, Learner, Predictor};
use crate::utils::{mean, sample_std};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Propensities outside `[EXTREME_PROPENSITY, 1 - EXTREME_PROPENSITY]` are flagged as extreme.
const EXTREME_PROPENSITY: f64 = 0.01;

fn count_extreme(g: &[f64]) -> usize {
    g.iter()
        .filter(|v| **v < EXTREME_PROPENSITY || **v > 1.0 - EXTREME_PROPENSITY)
        .count()
}

/// Summary of the inverse probability of treatment weights `A/g + (1−A)/(1−g)`
/// of the propensities used for weighting. Large maxima and a nonzero
/// `extreme_propensities` flag near violations of positivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositivityDiagnostics {
    pub mean_weight: f64,
    pub std_weight: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Propensities outside `[0.01, 0.99]`.
    pub extreme_propensities: usize,
}

impl PositivityDiagnostics {
    pub(crate) fn from_propensities(a: &[f64], g: &[f64]) -> Self {
        let w: Vec<f64> = a
            .iter()
            .zip(g)
            .map(|(a_, g_)| a_ / g_ + (1.0 - a_) / (1.0 - g_))
            .collect();
        PositivityDiagnostics {
            mean_weight: mean(&w),
            std_weight: sample_std(&w),
            min_weight: w.iter().copied().fold(f64::INFINITY, f64::min),
            max_weight: w.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            extreme_propensities: count_extreme(g),
        }
    }

    /// Appends the weight line, and a warning line when propensities are extreme.
    pub(crate) fn write_block(&self, s: &mut String) {
        let _ = writeln!(
            s,
            "IPT weights: mean {:.3}, sd {:.3}, min {:.3}, max {:.3}",
            self.mean_weight, self.std_weight, self.min_weight, self.max_weight
        );
        if self.extreme_propensities > 0 {
            let _ = writeln!(
                s,
                "Warning: {} propensity scores outside [{}, {}], positivity may be violated",
                self.extreme_propensities,
                EXTREME_PROPENSITY,
                1.0 - EXTREME_PROPENSITY
            );
        }
    }
}

/// Scale of the outcome, which decides the effect measures reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeType {
    /// Risk difference and ratios.
    Binary,
    /// Average treatment effect only.
    Continuous,
}

impl From<Family> for OutcomeType {
    fn from(family: Family) -> Self {
        match family {
            Family::Binomial => OutcomeType::Binary,
            Family::Gaussian | Family::Poisson => OutcomeType::Continuous,
        }
    }
}

/// Checks shared by every estimator constructor.
pub(crate) fn validate_inputs(data: &Dataset, treatment: &str, outcome: &str) -> Result<(), CausalError> {
    if treatment == outcome {
        return Err(CausalError::InvalidParameter(
            "outcome".to_string(),
            "a column different from the treatment".to_string(),
            outcome.to_string(),
        ));
    }
    data.column(outcome)?;
    let a = data.column(treatment)?;
    if let Some(v) = a.iter().find(|v| !v.is_nan() && **v != 0.0 && **v != 1.0) {
        return Err(CausalError::InvalidData(format!(
            "treatment {} must be binary (0/1), found {}",
            treatment, v
        )));
    }
    let treated = a.iter().filter(|v| **v == 1.0).count();
    let untreated = a.iter().filter(|v| **v == 0.0).count();
    if treated == 0 || untreated == 0 {
        return Err(CausalError::InvalidData(format!(
            "treatment {} has {} treated and {} untreated records, both arms are required",
            treatment, treated, untreated
        )));
    }
    Ok(())
}

fn log_summary(print_results: bool, title: &str, predictor: &dyn Predictor) {
    if print_results {
        match predictor.summary() {
            Some(s) => info!("{}\n{}", title, s),
            None => info!("{}: fit with a user supplied learner", title),
        }
    }
}

pub(crate) struct ExposureModel {
    predictor: Box<dyn Predictor>,
    bound: Option<Bound>,
}

impl ExposureModel {
    pub(crate) fn fit(
        data: &Dataset,
        treatment: &str,
        learner: &dyn Learner,
        bound: Option<Bound>,
        print_results: bool,
    ) -> Result<Self, CausalError> {
        data.check_complete([treatment])?;
        let predictor = learner.fit(data, treatment, None)?;
        log_summary(print_results, "Propensity Score Model", predictor.as_ref());
        Ok(ExposureModel { predictor, bound })
    }

    /// `P(A = 1 | L)` for every record, truncated to the bound when one is set.
    pub(crate) fn propensities(&self, data: &Dataset) -> Result<Vec<f64>, CausalError> {
        let mut g = predict_all(self.predictor.as_ref(), data)?;
        if let Some(v) = g.iter().find(|v| !v.is_finite()) {
            return Err(CausalError::InvalidData(format!("propensity score {} is not finite", v)));
        }
        match self.bound {
            Some(b) => {
                let clipped = b.clip_all(&mut g);
                if clipped > 0 {
                    info!(
                        "{} propensity scores truncated to [{}, {}].",
                        clipped, b.lower, b.upper
                    );
                }
            }
            None => {
                if let Some(v) = g.iter().find(|v| **v <= 0.0 || **v >= 1.0) {
                    return Err(CausalError::InvalidData(format!(
                        "propensity score {} is outside (0, 1), consider setting a bound",
                        v
                    )));
                }
                let extreme = count_extreme(&g);
                if extreme > 0 {
                    warn!(
                        "{} propensity scores are outside [{}, {}], consider setting a bound.",
                        extreme,
                        EXTREME_PROPENSITY,
                        1.0 - EXTREME_PROPENSITY
                    );
                }
            }
        }
        Ok(g)
    }
}

/// Outcome predictions under the observed, treated and untreated assignments.
pub(crate) struct OutcomePredictions {
    pub observed: Vec<f64>,
    pub treated: Vec<f64>,
    pub untreated: Vec<f64>,
}

pub(crate) struct OutcomeModel {
    predictor: Box<dyn Predictor>,
    pub family: Family,
}

impl OutcomeModel {
    pub(crate) fn fit(
        data: &Dataset,
        treatment: &str,
        outcome: &str,
        learner: &dyn Learner,
        family: Family,
        print_results: bool,
    ) -> Result<Self, CausalError> {
        data.check_complete([treatment, outcome])?;
        if family == Family::Binomial {
            data.check_binary(outcome)?;
        }
        let predictor = learner.fit(data, outcome, Some(treatment))?;
        log_summary(print_results, "Outcome Model", predictor.as_ref());
        Ok(OutcomeModel { predictor, family })
    }

    pub(crate) fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub(crate) fn outcome_type(&self) -> OutcomeType {
        self.family.into()
    }

    pub(crate) fn predictions(&self, data: &Dataset, treatment: &str) -> Result<OutcomePredictions, CausalError> {
        let p = self.predictor.as_ref();
        let preds = OutcomePredictions {
            observed: predict_all(p, data)?,
            treated: predict_counterfactual(p, data, treatment, 1.0)?,
            untreated: predict_counterfactual(p, data, treatment, 0.0)?,
        };
        for v in [&preds.observed, &preds.treated, &preds.untreated] {
            if let Some(x) = v.iter().find(|x| !x.is_finite()) {
                return Err(CausalError::InvalidData(format!("outcome prediction {} is not finite", x)));
            }
        }
        Ok(preds)
    }
}
