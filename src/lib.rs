mod linalg;

// Modules
pub mod bootstrap;
pub mod causal;
pub mod config;
pub mod data;
pub mod errors;
pub mod family;
pub mod formula;
pub mod glm;
pub mod predictor;
pub mod treatment;
pub mod utils;

// Individual classes, and functions
pub use bootstrap::{Bootstrap, BootstrapSummary};
pub use causal::{Aiptw, Estimate, EstimatorState, TimeFixedGFormula, Tmle};
pub use config::{ConfigIO, EstimatorConfig};
pub use data::{Dataset, Matrix, Row};
pub use errors::CausalError;
pub use family::Family;
pub use formula::ModelSpec;
pub use glm::{fit_glm, FittedGlm, GlmFit, IrlsConfig};
pub use predictor::{Bound, GlmLearner, Learner, Predictor};
pub use treatment::{col, lit, Expr, TreatmentRule};
