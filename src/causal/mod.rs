//! Causal
//!
//! Estimators of the average effect of a time-fixed binary treatment: the
//! parametric g-formula, augmented inverse probability of treatment weights
//! (AIPTW) and targeted maximum likelihood estimation (TMLE). Each estimator
//! owns a copy of its data, is configured with a propensity and/or outcome
//! model, and reports results once `fit` has succeeded.
pub mod aiptw;
pub mod gformula;
pub mod influence;
pub mod nuisance;
pub mod state;
pub mod tmle;

mod tests;

pub use aiptw::{Aiptw, AiptwResult};
pub use gformula::{GFormulaResult, TimeFixedGFormula};
pub use influence::Estimate;
pub use nuisance::{OutcomeType, PositivityDiagnostics};
pub use state::EstimatorState;
pub use tmle::{Tmle, TmleResult};
