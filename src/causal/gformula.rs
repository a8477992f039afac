//! Parametric g-formula
//!
//! Standardizes the outcome model over the empirical covariate distribution:
//! every record is predicted with its treatment forced to the value a
//! treatment rule assigns, and the predictions are averaged. There is no
//! closed-form variance; use [`crate::bootstrap::Bootstrap`] around a full
//! refit for intervals.
use crate::causal::nuisance::{validate_inputs, OutcomeModel, OutcomeType};
use crate::causal::state::EstimatorState;
use crate::config::EstimatorConfig;
use crate::data::Dataset;
use crate::errors::CausalError;
use crate::family::Family;
use crate::formula::ModelSpec;
use crate::predictor::{GlmLearner, Learner, Predictor};
use crate::treatment::TreatmentRule;
use crate::utils::mean;
use log::info;
use serde::{Deserialize, Serialize};

/// Result of standardizing the outcome model under a treatment rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GFormulaResult {
    /// Mean predicted outcome had the rule been followed.
    pub marginal_outcome: f64,
    /// Per-record predictions under the rule.
    pub predicted_outcomes: Vec<f64>,
    /// Records assigned treatment by the rule.
    pub n_treated_under_rule: usize,
    pub outcome_type: OutcomeType,
}

/// Time-fixed parametric g-formula.
pub struct TimeFixedGFormula {
    data: Dataset,
    treatment: String,
    outcome: String,
    config: EstimatorConfig,
    outcome_model: Option<OutcomeModel>,
    result: Option<GFormulaResult>,
}

impl TimeFixedGFormula {
    /// * `data` - Dataset holding the treatment, outcome and covariates. It is copied.
    /// * `treatment` - Binary treatment column.
    /// * `outcome` - Outcome column.
    pub fn new(data: &Dataset, treatment: &str, outcome: &str) -> Result<Self, CausalError> {
        validate_inputs(data, treatment, outcome)?;
        Ok(TimeFixedGFormula {
            data: data.clone(),
            treatment: treatment.to_string(),
            outcome: outcome.to_string(),
            config: EstimatorConfig::default(),
            outcome_model: None,
            result: None,
        })
    }

    pub fn with_config(mut self, config: EstimatorConfig) -> Result<Self, CausalError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Fit a regression outcome model, e.g. `"art + male + age0 + cd40 + dvl0"`.
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
        self.set_outcome_model(model);
        Ok(())
    }

    /// Fit the outcome model with any learner.
    pub fn outcome_model_with(&mut self, learner: &dyn Learner, family: Family) -> Result<(), CausalError> {
        let model = OutcomeModel::fit(
            &self.data,
            &self.treatment,
            &self.outcome,
            learner,
            family,
            self.config.print_results,
        )?;
        self.set_outcome_model(model);
        Ok(())
    }

    fn set_outcome_model(&mut self, model: OutcomeModel) {
        self.outcome_model = Some(model);
        self.result = None;
    }

    /// Marginal outcome under `rule`. May be called repeatedly with different
    /// rules; the outcome model is never modified.
    pub fn fit(&mut self, rule: &TreatmentRule) -> Result<&GFormulaResult, CausalError> {
        self.result = None;
        let model = self.outcome_model.as_ref().ok_or_else(|| {
            CausalError::ModelNotSpecified("outcome_model must be specified before fit".to_string())
        })?;
        let assigned = rule.assign(&self.data)?;
        let predictor: &dyn Predictor = model.predictor();
        let predicted_outcomes = self
            .data
            .iter_rows()
            .zip(&assigned)
            .map(|(row, a)| predictor.predict(&row.with_override(&self.treatment, *a)))
            .collect::<Result<Vec<f64>, CausalError>>()?;
        let result = GFormulaResult {
            marginal_outcome: mean(&predicted_outcomes),
            n_treated_under_rule: assigned.iter().filter(|a| **a == 1.0).count(),
            predicted_outcomes,
            outcome_type: model.outcome_type(),
        };
        if self.config.print_results {
            info!(
                "g-formula under rule {}: marginal outcome {:.4} ({} treated)",
                rule, result.marginal_outcome, result.n_treated_under_rule
            );
        }
        Ok(self.result.insert(result))
    }

    /// Result of the last `fit`, cleared when that fit failed.
    pub fn results(&self) -> Result<&GFormulaResult, CausalError> {
        self.result
            .as_ref()
            .ok_or_else(|| CausalError::ModelNotSpecified("fit must be called before reading results".to_string()))
    }

    pub fn state(&self) -> EstimatorState {
        EstimatorState::from_progress(self.outcome_model.is_some(), self.result.is_some())
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }
}
