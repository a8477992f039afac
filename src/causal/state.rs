//! Lifecycle of an estimator.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an estimator is in its lifecycle.
///
/// `Configured` until every required model is fit, `ModelsFit` once they are,
/// `Estimated` after a successful `fit`. Fitting any model again drops the
/// previous estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimatorState {
    Configured,
    ModelsFit,
    Estimated,
}

impl EstimatorState {
    pub(crate) fn from_progress(models_ready: bool, estimated: bool) -> Self {
        match (models_ready, estimated) {
            (true, true) => EstimatorState::Estimated,
            (true, false) => EstimatorState::ModelsFit,
            (false, _) => EstimatorState::Configured,
        }
    }
}

impl fmt::Display for EstimatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstimatorState::Configured => "configured",
            EstimatorState::ModelsFit => "models fit",
            EstimatorState::Estimated => "estimated",
        };
        write!(f, "{}", s)
    }
}
