//! Predictors
//!
//! The capability the estimators depend on: something that can be fit to a
//! dataset ([`Learner`]) and then predicts a mean for any record, possibly
//! under a forced treatment value ([`Predictor`]). The built-in
//! [`GlmLearner`] is one implementation; any external model (ensembles,
//! boosted trees, ...) can be injected by implementing the same traits.
use crate::data::{Dataset, Row};
use crate::errors::CausalError;
use crate::family::Family;
use crate::formula::ModelSpec;
use crate::glm::{fit_glm, FittedGlm, IrlsConfig};
use log::warn;
use serde::{Deserialize, Serialize};

/// A fitted model mapping a record to a predicted mean or probability.
///
/// Implementations must be deterministic: estimators call `predict` for the
/// observed and both counterfactual treatment arms of every record.
pub trait Predictor: Send + Sync {
    /// Predict for `row`. A forced treatment value travels on the row, see
    /// [`Row::with_override`].
    fn predict(&self, row: &Row<'_>) -> Result<f64, CausalError>;

    /// Optional human-readable description of the fit.
    fn summary(&self) -> Option<String> {
        None
    }
}

impl<F> Predictor for F
where
    F: Fn(&Row<'_>) -> Result<f64, CausalError> + Send + Sync,
{
    fn predict(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        self(row)
    }
}

/// Something that can be fit to predict `target` from a dataset.
pub trait Learner: Send + Sync {
    /// * `data` - Complete-case training data.
    /// * `target` - Column to predict.
    /// * `treatment` - Treatment column, when fitting an outcome model. `None`
    ///   when the target is the treatment itself.
    fn fit(&self, data: &Dataset, target: &str, treatment: Option<&str>) -> Result<Box<dyn Predictor>, CausalError>;
}

impl<F> Learner for F
where
    F: Fn(&Dataset, &str, Option<&str>) -> Result<Box<dyn Predictor>, CausalError> + Send + Sync,
{
    fn fit(&self, data: &Dataset, target: &str, treatment: Option<&str>) -> Result<Box<dyn Predictor>, CausalError> {
        self(data, target, treatment)
    }
}

/// Generalized linear model learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlmLearner {
    pub spec: ModelSpec,
    pub family: Family,
    pub irls: IrlsConfig,
}

impl GlmLearner {
    pub fn new(spec: ModelSpec, family: Family) -> Self {
        GlmLearner {
            spec,
            family,
            irls: IrlsConfig::default(),
        }
    }

    pub fn with_irls(mut self, irls: IrlsConfig) -> Self {
        self.irls = irls;
        self
    }

    /// Fit and return the concrete model.
    pub fn fit_model(&self, data: &Dataset, target: &str) -> Result<FittedGlm, CausalError> {
        let mut referenced = self.spec.columns();
        referenced.push(target);
        data.check_complete(&referenced)?;
        let design = self.spec.design_matrix(data)?;
        let fit = fit_glm(&design, data.column(target)?, None, self.family, &self.irls)?;
        Ok(FittedGlm {
            spec: self.spec.clone(),
            fit,
        })
    }
}

impl Learner for GlmLearner {
    fn fit(&self, data: &Dataset, target: &str, treatment: Option<&str>) -> Result<Box<dyn Predictor>, CausalError> {
        if let Some(treatment) = treatment {
            if !self.spec.references(treatment) {
                warn!(
                    "Outcome model {} does not include the treatment {}, counterfactual predictions will not differ.",
                    self.spec, treatment
                );
            }
        }
        Ok(Box::new(self.fit_model(data, target)?))
    }
}

impl Predictor for FittedGlm {
    fn predict(&self, row: &Row<'_>) -> Result<f64, CausalError> {
        FittedGlm::predict(self, row)
    }

    fn summary(&self) -> Option<String> {
        Some(FittedGlm::summary(self, 0.05))
    }
}

/// Predictions for every record under the observed data.
pub fn predict_all(predictor: &dyn Predictor, data: &Dataset) -> Result<Vec<f64>, CausalError> {
    data.iter_rows().map(|row| predictor.predict(&row)).collect()
}

/// Predictions for every record with `treatment` forced to `value`.
pub fn predict_counterfactual(
    predictor: &dyn Predictor,
    data: &Dataset,
    treatment: &str,
    value: f64,
) -> Result<Vec<f64>, CausalError> {
    data.iter_rows()
        .map(|row| predictor.predict(&row.with_override(treatment, value)))
        .collect()
}

/// Truncation interval for predicted probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    /// Require `0 < lower < upper < 1`.
    pub fn new(lower: f64, upper: f64) -> Result<Self, CausalError> {
        if lower.is_nan() || upper.is_nan() || lower <= 0.0 || upper >= 1.0 || lower >= upper {
            return Err(CausalError::InvalidParameter(
                "bound".to_string(),
                "0 < lower < upper < 1".to_string(),
                format!("[{}, {}]", lower, upper),
            ));
        }
        Ok(Bound { lower, upper })
    }

    /// The interval `[b, 1 - b]`.
    pub fn symmetric(b: f64) -> Result<Self, CausalError> {
        Bound::new(b, 1.0 - b)
    }

    pub fn clip(&self, v: f64) -> f64 {
        v.clamp(self.lower, self.upper)
    }

    /// Clip in place, returning how many values were changed.
    pub fn clip_all(&self, values: &mut [f64]) -> usize {
        let mut changed = 0;
        for v in values.iter_mut() {
            let c = self.clip(*v);
            if c != *v {
                changed += 1;
                *v = c;
            }
        }
        changed
    }
}
