//! Targeted Maximum Likelihood Estimation
//!
//! Updates the initial outcome predictions along a one-parameter logistic
//! submodel indexed by the clever covariate
//! `H(A, L) = A/g(L) − (1 − A)/(1 − g(L))`, so that the targeted predictions
//! solve the efficient influence curve estimating equation. Continuous
//! outcomes are mapped to the unit interval for targeting and mapped back.
use crate::causal::influence::Estimate;
use crate::causal::nuisance::{validate_inputs, ExposureModel, OutcomeModel, OutcomeType, PositivityDiagnostics};
use crate::causal::state::EstimatorState;
use crate::config::EstimatorConfig;
use crate::data::Dataset;
use crate::errors::CausalError;
use crate::family::Family;
use crate::formula::{DesignMatrix, ModelSpec};
use crate::glm::fit_glm;
use crate::predictor::{Bound, GlmLearner, Learner};
use crate::utils::{expit, logit, mean, probability_to_odds};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmleResult {
    pub outcome_type: OutcomeType,
    /// Fluctuation parameter of the targeting step.
    pub epsilon: f64,
    /// Mean targeted prediction with everyone treated, on the outcome scale.
    pub mean_treated: f64,
    pub mean_untreated: f64,
    /// Risk difference for a binary outcome, average treatment effect otherwise.
    pub difference: Estimate,
    /// Binary outcomes only; `std_error` is on the log scale.
    pub risk_ratio: Option<Estimate>,
    /// Binary outcomes only; `std_error` is on the log scale.
    pub odds_ratio: Option<Estimate>,
    pub positivity: PositivityDiagnostics,
}

impl TmleResult {
    pub fn risk_difference(&self) -> Option<&Estimate> {
        match self.outcome_type {
            OutcomeType::Binary => Some(&self.difference),
            OutcomeType::Continuous => None,
        }
    }

    pub fn average_treatment_effect(&self) -> Option<&Estimate> {
        match self.outcome_type {
            OutcomeType::Binary => None,
            OutcomeType::Continuous => Some(&self.difference),
        }
    }
}

/// Targeted maximum likelihood estimator.
pub struct Tmle {
    data: Dataset,
    treatment: String,
    outcome: String,
    config: EstimatorConfig,
    exposure: Option<ExposureModel>,
    outcome_model: Option<OutcomeModel>,
    outcome_bound: Option<Bound>,
    result: Option<TmleResult>,
}

/// Map `[lo, hi]` onto `[0, 1]`.
struct UnitScale {
    lo: f64,
    hi: f64,
}

impl UnitScale {
    fn map(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| (v - self.lo) / (self.hi - self.lo)).collect()
    }

    fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

impl Tmle {
    /// * `data` - Dataset holding the treatment, outcome and covariates. It is copied.
    /// * `treatment` - Binary treatment column.
    /// * `outcome` - Outcome column, binary or continuous.
    pub fn new(data: &Dataset, treatment: &str, outcome: &str) -> Result<Self, CausalError> {
        validate_inputs(data, treatment, outcome)?;
        Ok(Tmle {
            data: data.clone(),
            treatment: treatment.to_string(),
            outcome: outcome.to_string(),
            config: EstimatorConfig::default(),
            exposure: None,
            outcome_model: None,
            outcome_bound: None,
            result: None,
        })
    }

    pub fn with_config(mut self, config: EstimatorConfig) -> Result<Self, CausalError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Logistic propensity score model.
    ///
    /// * `bound` - Truncation applied to the predicted probabilities.
    pub fn exposure_model(&mut self, spec: &str, bound: Option<Bound>, print_results: bool) -> Result<(), CausalError> {
        let learner = GlmLearner::new(ModelSpec::parse(spec)?, Family::Binomial).with_irls(self.config.irls);
        let model = ExposureModel::fit(
            &self.data,
            &self.treatment,
            &learner,
            bound,
            print_results || self.config.print_results,
        )?;
        self.exposure = Some(model);
        self.result = None;
        Ok(())
    }

    pub fn exposure_model_with(&mut self, learner: &dyn Learner, bound: Option<Bound>) -> Result<(), CausalError> {
        let model = ExposureModel::fit(&self.data, &self.treatment, learner, bound, self.config.print_results)?;
        self.exposure = Some(model);
        self.result = None;
        Ok(())
    }

    /// Regression outcome model, which must include the treatment.
    ///
    /// * `bound` - Truncation of the initial predictions. For continuous
    ///   outcomes it applies on the unit scale and replaces
    ///   `continuous_bound`.
    pub fn outcome_model(
        &mut self,
        spec: &str,
        family: Family,
        bound: Option<Bound>,
        print_results: bool,
    ) -> Result<(), CausalError> {
        let learner = GlmLearner::new(ModelSpec::parse(spec)?, family).with_irls(self.config.irls);
        let model = OutcomeModel::fit(
            &self.data,
            &self.treatment,
            &self.outcome,
            &learner,
            family,
            print_results || self.config.print_results,
        )?;
        self.set_outcome_model(model, bound);
        Ok(())
    }

    pub fn outcome_model_with(
        &mut self,
        learner: &dyn Learner,
        family: Family,
        bound: Option<Bound>,
    ) -> Result<(), CausalError> {
        let model = OutcomeModel::fit(
            &self.data,
            &self.treatment,
            &self.outcome,
            learner,
            family,
            self.config.print_results,
        )?;
        self.set_outcome_model(model, bound);
        Ok(())
    }

    fn set_outcome_model(&mut self, model: OutcomeModel, bound: Option<Bound>) {
        self.outcome_model = Some(model);
        self.outcome_bound = bound;
        self.result = None;
    }

    fn models(&self) -> Result<(&ExposureModel, &OutcomeModel), CausalError> {
        match (&self.exposure, &self.outcome_model) {
            (Some(e), Some(o)) => Ok((e, o)),
            (None, _) => Err(CausalError::ModelNotSpecified(
                "exposure_model must be specified before fit".to_string(),
            )),
            (_, None) => Err(CausalError::ModelNotSpecified(
                "outcome_model must be specified before fit".to_string(),
            )),
        }
    }

    /// Target the outcome predictions and estimate the effect of treating
    /// everyone versus no one.
    pub fn fit(&mut self) -> Result<&TmleResult, CausalError> {
        self.result = None;
        let (exposure, outcome_model) = self.models()?;
        let a = self.data.column(&self.treatment)?;
        let y_raw = self.data.column(&self.outcome)?;
        let g = exposure.propensities(&self.data)?;
        let q = outcome_model.predictions(&self.data, &self.treatment)?;
        let outcome_type = outcome_model.outcome_type();
        let alpha = self.config.alpha;
        let n = a.len();

        // Initial predictions and outcome, on the unit scale for continuous outcomes.
        let (y, mut qa, mut q1, mut q0, scale) = match outcome_type {
            OutcomeType::Binary => (y_raw.to_vec(), q.observed, q.treated, q.untreated, None),
            OutcomeType::Continuous => {
                let lo = y_raw.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = y_raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if hi <= lo {
                    return Err(CausalError::InvalidData(format!(
                        "outcome {} is constant, there is no effect to estimate",
                        self.outcome
                    )));
                }
                let s = UnitScale { lo, hi };
                let y = s.map(y_raw);
                let (qa, q1, q0) = (s.map(&q.observed), s.map(&q.treated), s.map(&q.untreated));
                (y, qa, q1, q0, Some(s))
            }
        };
        let bound = match (self.outcome_bound, &scale) {
            (Some(b), _) => Some(b),
            (None, Some(_)) => Some(Bound::symmetric(self.config.continuous_bound)?),
            (None, None) => None,
        };
        if let Some(b) = bound {
            for v in [&mut qa, &mut q1, &mut q0] {
                b.clip_all(v);
            }
        }
        if let Some(v) = qa.iter().chain(&q1).chain(&q0).find(|v| **v <= 0.0 || **v >= 1.0) {
            return Err(CausalError::InvalidData(format!(
                "outcome prediction {} is outside (0, 1) and cannot be targeted, consider setting an outcome bound",
                v
            )));
        }

        // Clever covariates and the fluctuation.
        let h: Vec<f64> = a.iter().zip(&g).map(|(a_, g_)| a_ / g_ - (1.0 - a_) / (1.0 - g_)).collect();
        let offset: Vec<f64> = qa.iter().map(|v| logit(*v)).collect();
        let design = DesignMatrix {
            values: h.clone(),
            rows: n,
            cols: 1,
            labels: vec!["H".to_string()],
        };
        let fluctuation = fit_glm(&design, &y, Some(&offset), Family::Binomial, &self.config.irls)?;
        let epsilon = fluctuation.coefficients[0];
        debug!("TMLE fluctuation epsilon: {}", epsilon);

        let mut s1 = Vec::with_capacity(n);
        let mut s0 = Vec::with_capacity(n);
        let mut sa = Vec::with_capacity(n);
        for i in 0..n {
            s1.push(expit(logit(q1[i]) + epsilon / g[i]));
            s0.push(expit(logit(q0[i]) - epsilon / (1.0 - g[i])));
            sa.push(expit(offset[i] + epsilon * h[i]));
        }
        let psi1 = mean(&s1);
        let psi0 = mean(&s0);
        let rd = psi1 - psi0;
        let ic: Vec<f64> = (0..n).map(|i| h[i] * (y[i] - sa[i]) + s1[i] - s0[i] - rd).collect();
        let difference = Estimate::from_influence(rd, &ic, alpha);
        let positivity = PositivityDiagnostics::from_propensities(a, &g);

        let result = match scale {
            None => {
                // Arm-specific influence curves of psi1 and psi0.
                let d1: Vec<f64> = (0..n).map(|i| a[i] / g[i] * (y[i] - sa[i]) + s1[i] - psi1).collect();
                let d0: Vec<f64> = (0..n)
                    .map(|i| (1.0 - a[i]) / (1.0 - g[i]) * (y[i] - sa[i]) + s0[i] - psi0)
                    .collect();
                let ic_rr: Vec<f64> = (0..n).map(|i| d1[i] / psi1 - d0[i] / psi0).collect();
                let ic_or: Vec<f64> = (0..n)
                    .map(|i| d1[i] / (psi1 * (1.0 - psi1)) - d0[i] / (psi0 * (1.0 - psi0)))
                    .collect();
                let odds_ratio = probability_to_odds(psi1) / probability_to_odds(psi0);
                TmleResult {
                    outcome_type,
                    epsilon,
                    mean_treated: psi1,
                    mean_untreated: psi0,
                    difference,
                    risk_ratio: Some(Estimate::from_log_influence(psi1 / psi0, &ic_rr, alpha)),
                    odds_ratio: Some(Estimate::from_log_influence(odds_ratio, &ic_or, alpha)),
                    positivity,
                }
            }
            Some(s) => TmleResult {
                outcome_type,
                epsilon,
                mean_treated: s.lo + psi1 * s.width(),
                mean_untreated: s.lo + psi0 * s.width(),
                difference: difference.rescale(s.width()),
                risk_ratio: None,
                odds_ratio: None,
                positivity,
            },
        };
        if self.config.print_results {
            info!("\n{}", format_summary(&result, alpha));
        }
        Ok(self.result.insert(result))
    }

    pub fn results(&self) -> Result<&TmleResult, CausalError> {
        self.result
            .as_ref()
            .ok_or_else(|| CausalError::ModelNotSpecified("fit must be called before reading results".to_string()))
    }

    /// Formatted estimates of the last `fit`.
    pub fn summary(&self) -> Result<String, CausalError> {
        Ok(format_summary(self.results()?, self.config.alpha))
    }

    pub fn state(&self) -> EstimatorState {
        EstimatorState::from_progress(
            self.exposure.is_some() && self.outcome_model.is_some(),
            self.result.is_some(),
        )
    }
}

fn format_summary(r: &TmleResult, alpha: f64) -> String {
    let mut s = String::new();
    let rule = "=".repeat(70);
    let sep = "-".repeat(70);
    let _ = writeln!(s, "{}", rule);
    let _ = writeln!(s, "{:^70}", "Targeted Maximum Likelihood Estimator");
    let _ = writeln!(s, "{}", rule);
    let _ = writeln!(s, "{:<26}{:>10.6}", "Epsilon:", r.epsilon);
    let _ = writeln!(s, "{}", sep);
    match r.outcome_type {
        OutcomeType::Binary => {
            r.difference.write_block(&mut s, "Risk Difference", alpha);
            if let Some(rr) = &r.risk_ratio {
                let _ = writeln!(s, "{}", sep);
                rr.write_block(&mut s, "Risk Ratio", alpha);
            }
            if let Some(or) = &r.odds_ratio {
                let _ = writeln!(s, "{}", sep);
                or.write_block(&mut s, "Odds Ratio", alpha);
            }
        }
        OutcomeType::Continuous => {
            r.difference.write_block(&mut s, "Average Treatment Effect", alpha);
        }
    }
    let _ = writeln!(s, "{}", sep);
    r.positivity.write_block(&mut s);
    let _ = write!(s, "{}", rule);
    s
}
