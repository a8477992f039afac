//! Config
//!
//! Shared settings of the causal estimators and their JSON persistence.
use crate::errors::CausalError;
use crate::glm::IrlsConfig;
use crate::utils::validate_float_parameter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_alpha() -> f64 {
    0.05
}
fn default_continuous_bound() -> f64 {
    0.0005
}
fn default_print_results() -> bool {
    false
}

/// Configuration shared by the g-formula, AIPTW and TMLE estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Confidence intervals are reported at level `1 - alpha`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Truncation applied to unit-scaled predictions of a continuous outcome
    /// during targeting.
    #[serde(default = "default_continuous_bound")]
    pub continuous_bound: f64,
    /// Stopping rules of every regression fit by the estimator.
    #[serde(default)]
    pub irls: IrlsConfig,
    /// Log model and estimate summaries at info level.
    #[serde(default = "default_print_results")]
    pub print_results: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            alpha: default_alpha(),
            continuous_bound: default_continuous_bound(),
            irls: IrlsConfig::default(),
            print_results: default_print_results(),
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<(), CausalError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(CausalError::InvalidParameter(
                "alpha".to_string(),
                "a value in (0, 1)".to_string(),
                self.alpha.to_string(),
            ));
        }
        if !(self.continuous_bound > 0.0 && self.continuous_bound < 0.5) {
            return Err(CausalError::InvalidParameter(
                "continuous_bound".to_string(),
                "a value in (0, 0.5)".to_string(),
                self.continuous_bound.to_string(),
            ));
        }
        validate_float_parameter(self.irls.tolerance, 0.0, 1.0, "tolerance")?;
        self.irls.validate()
    }

    pub fn set_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn set_continuous_bound(mut self, continuous_bound: f64) -> Self {
        self.continuous_bound = continuous_bound;
        self
    }

    pub fn set_irls(mut self, irls: IrlsConfig) -> Self {
        self.irls = irls;
        self
    }

    pub fn set_print_results(mut self, print_results: bool) -> Self {
        self.print_results = print_results;
        self
    }
}

/// JSON persistence for configurations and results.
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), CausalError> {
        fs::write(path, self.json_dump()?).map_err(|e| CausalError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object.
    fn json_dump(&self) -> Result<String, CausalError> {
        serde_json::to_string(self).map_err(|e| CausalError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    fn from_json(json_str: &str) -> Result<Self, CausalError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| CausalError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, CausalError> {
        let json_str = fs::read_to_string(path).map_err(|e| CausalError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for EstimatorConfig {}
impl ConfigIO for IrlsConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_estimator_config_default() {
        let config = EstimatorConfig::default();
        assert_eq!(config.alpha, 0.05);
        assert_eq!(config.continuous_bound, 0.0005);
        assert_eq!(config.irls.max_iter, 100);
        assert!(!config.print_results);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_io_json() {
        let config = EstimatorConfig::default().set_alpha(0.1).set_print_results(true);
        let json = config.json_dump().unwrap();
        let config2 = EstimatorConfig::from_json(&json).unwrap();
        assert_eq!(config, config2);
    }

    #[test]
    fn test_config_io_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("estimator.json");
        let config = EstimatorConfig::default().set_continuous_bound(0.001);
        config.save_config(&file_path).unwrap();
        let config2 = EstimatorConfig::load_config(&file_path).unwrap();
        assert_eq!(config, config2);
    }

    #[test]
    fn test_parse_partial() {
        let json = r#"{"alpha": 0.1, "irls": {"max_iter": 25}}"#;
        let config: EstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.alpha, 0.1);
        assert_eq!(config.irls.max_iter, 25);
        assert_eq!(config.irls.tolerance, 1e-8);
        assert_eq!(config.continuous_bound, 0.0005);
    }

    #[test]
    fn test_validate_rejects() {
        assert!(EstimatorConfig::default().set_alpha(0.0).validate().is_err());
        assert!(EstimatorConfig::default().set_alpha(1.5).validate().is_err());
        assert!(EstimatorConfig::default().set_continuous_bound(0.5).validate().is_err());
        let irls = IrlsConfig {
            max_iter: 0,
            tolerance: 1e-8,
        };
        assert!(EstimatorConfig::default().set_irls(irls).validate().is_err());
        assert!(matches!(
            EstimatorConfig::load_config("/nonexistent/estimator.json"),
            Err(CausalError::UnableToRead(_))
        ));
    }
}
