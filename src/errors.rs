//! Errors
//!
//! Custom error types used throughout the `epicausal` crate.
use thiserror::Error;

/// Errors that can occur while fitting models or estimating causal effects.
#[derive(Debug, Error)]
pub enum CausalError {
    /// A column referenced at fit time contains missing (NaN) values.
    #[error("Column {column} contains {count} missing value(s); a complete-case dataset is required.")]
    MissingData { column: String, count: usize },
    /// An estimate or prediction was requested before the required model was fit.
    #[error("Model not specified: {0}")]
    ModelNotSpecified(String),
    /// The weighted design matrix is not of full rank.
    #[error("Design matrix is rank deficient, column {0} is collinear with the preceding columns.")]
    SingularModel(String),
    /// A treatment rule could not be evaluated or produced a non-binary value.
    #[error("Invalid treatment rule: {0}")]
    InvalidTreatmentRule(String),
    /// The requested distributional family is not supported.
    #[error("Unsupported family {0}, expected one of binomial, gaussian, poisson.")]
    UnsupportedFamily(String),
    /// A column name was not found in the dataset.
    #[error("Column {0} not found in the dataset.")]
    UnknownColumn(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// The data cannot support the requested computation.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Unable to write a configuration or result to file.
    #[error("Unable to write to file: {0}")]
    UnableToWrite(String),
    /// Unable to read a configuration from file.
    #[error("Unable to read from file {0}")]
    UnableToRead(String),
}
