//! Augmented Inverse Probability of Treatment Weights
//!
//! Combines a propensity score model and an outcome model into doubly-robust
//! pseudo-outcomes
//!
//! ```text
//! DR1 = Y·A/g − Q1·(A − g)/g
//! DR0 = Y·(1 − A)/(1 − g) − Q0·((1 − A) − (1 − g))/(1 − g)
//! ```
//!
//! whose means are consistent when either model is correctly specified.
//! Inference uses the influence curve `DR1 − DR0 − RD`.
use crate::causal::influence::Estimate;
use crate::causal::nuisance::{validate_inputs, ExposureModel, OutcomeModel, OutcomeType, PositivityDiagnostics};
use crate::causal::state::EstimatorState;
use crate::config::EstimatorConfig;
use crate::data::Dataset;
use crate::errors::CausalError;
use crate::family::Family;
use crate::formula::ModelSpec;
use crate::predictor::{Bound, GlmLearner, Learner};
use crate::utils::mean;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiptwResult {
    pub outcome_type: OutcomeType,
    /// Mean of `DR1`, the estimated outcome had everyone been treated.
    pub mean_treated: f64,
    /// Mean of `DR0`.
    pub mean_untreated: f64,
    /// Risk difference for a binary outcome, average treatment effect otherwise.
    pub difference: Estimate,
    /// Binary outcomes only. No interval is computed for the ratio.
    pub risk_ratio: Option<f64>,
    pub positivity: PositivityDiagnostics,
}

impl AiptwResult {
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

/// Augmented inverse probability of treatment weight estimator.
pub struct Aiptw {
    data: Dataset,
    treatment: String,
    outcome: String,
    config: EstimatorConfig,
    exposure: Option<ExposureModel>,
    outcome_model: Option<OutcomeModel>,
    result: Option<AiptwResult>,
}

impl Aiptw {
    /// * `data` - Dataset holding the treatment, outcome and covariates. It is copied.
    /// * `treatment` - Binary treatment column.
    /// * `outcome` - Outcome column, binary or continuous.
    pub fn new(data: &Dataset, treatment: &str, outcome: &str) -> Result<Self, CausalError> {
        validate_inputs(data, treatment, outcome)?;
        Ok(Aiptw {
            data: data.clone(),
            treatment: treatment.to_string(),
            outcome: outcome.to_string(),
            config: EstimatorConfig::default(),
            exposure: None,
            outcome_model: None,
            result: None,
        })
    }

    pub fn with_config(mut self, config: EstimatorConfig) -> Result<Self, CausalError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Logistic propensity score model, e.g. `"male + age0 + cd40 + dvl0"`.
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
    pub fn outcome_model(&mut self, spec: &str, family: Family, print_results: bool) -> Result<(), CausalError> {
        let learner = GlmLearner::new(ModelSpec::parse(spec)?, family).with_irls(self.config.irls);
        let model = OutcomeModel::fit(
            &self.data,
            &self.treatment,
            &self.outcome,
            &learner,
            family,
            print_results || self.config.print_results,
        )?;
        self.outcome_model = Some(model);
        self.result = None;
        Ok(())
    }

    pub fn outcome_model_with(&mut self, learner: &dyn Learner, family: Family) -> Result<(), CausalError> {
        let model = OutcomeModel::fit(
            &self.data,
            &self.treatment,
            &self.outcome,
            learner,
            family,
            self.config.print_results,
        )?;
        self.outcome_model = Some(model);
        self.result = None;
        Ok(())
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

    /// Weight diagnostics of the (bounded) propensity scores.
    pub fn positivity(&self) -> Result<PositivityDiagnostics, CausalError> {
        let exposure = self.exposure.as_ref().ok_or_else(|| {
            CausalError::ModelNotSpecified("exposure_model must be specified before positivity".to_string())
        })?;
        let g = exposure.propensities(&self.data)?;
        Ok(PositivityDiagnostics::from_propensities(
            self.data.column(&self.treatment)?,
            &g,
        ))
    }

    /// Estimate the effect of treating everyone versus no one.
    pub fn fit(&mut self) -> Result<&AiptwResult, CausalError> {
        self.result = None;
        let (exposure, outcome_model) = self.models()?;
        let a = self.data.column(&self.treatment)?;
        let y = self.data.column(&self.outcome)?;
        let g = exposure.propensities(&self.data)?;
        let q = outcome_model.predictions(&self.data, &self.treatment)?;

        let n = a.len();
        let mut dr1 = Vec::with_capacity(n);
        let mut dr0 = Vec::with_capacity(n);
        for i in 0..n {
            dr1.push(y[i] * a[i] / g[i] - q.treated[i] * (a[i] - g[i]) / g[i]);
            dr0.push(
                y[i] * (1.0 - a[i]) / (1.0 - g[i]) - q.untreated[i] * ((1.0 - a[i]) - (1.0 - g[i])) / (1.0 - g[i]),
            );
        }
        let mean_treated = mean(&dr1);
        let mean_untreated = mean(&dr0);
        let point = mean_treated - mean_untreated;
        let ic: Vec<f64> = dr1.iter().zip(&dr0).map(|(d1, d0)| d1 - d0 - point).collect();
        let outcome_type = outcome_model.outcome_type();
        let result = AiptwResult {
            outcome_type,
            mean_treated,
            mean_untreated,
            difference: Estimate::from_influence(point, &ic, self.config.alpha),
            risk_ratio: match outcome_type {
                OutcomeType::Binary => Some(mean_treated / mean_untreated),
                OutcomeType::Continuous => None,
            },
            positivity: PositivityDiagnostics::from_propensities(a, &g),
        };
        if self.config.print_results {
            info!("\n{}", format_summary(&result, self.config.alpha));
        }
        Ok(self.result.insert(result))
    }

    pub fn results(&self) -> Result<&AiptwResult, CausalError> {
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

fn format_summary(r: &AiptwResult, alpha: f64) -> String {
    let mut s = String::new();
    let rule = "=".repeat(70);
    let _ = writeln!(s, "{}", rule);
    let _ = writeln!(s, "{:^70}", "Augmented Inverse Probability of Treatment Weights");
    let _ = writeln!(s, "{}", rule);
    match r.outcome_type {
        OutcomeType::Binary => {
            r.difference.write_block(&mut s, "Risk Difference", alpha);
            let _ = writeln!(s, "{}", "-".repeat(70));
            if let Some(rr) = r.risk_ratio {
                let _ = writeln!(s, "{:<26}{:>10.4}", "Risk Ratio:", rr);
            }
        }
        OutcomeType::Continuous => {
            r.difference.write_block(&mut s, "Average Treatment Effect", alpha);
        }
    }
    let _ = writeln!(s, "{}", "-".repeat(70));
    r.positivity.write_block(&mut s);
    let _ = write!(s, "{}", rule);
    s
}
