use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `ModelError` and maps to other errors to
/// convert to a `ModelError`
///
/// Every failure in the model is a defect: there are no transient errors in
/// the numeric core, so callers are expected to stop the run when one of
/// these is returned.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum ModelError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// Rate tables or snapshots disagree with each other. Detected at load time.
    ConfigInconsistency(String),
    /// A compartment left its valid range while stepping a cell.
    InvariantViolation {
        step: u64,
        age_group: usize,
        quantity: String,
        value: f64,
    },
    /// A neighbor, age group or phase referenced by the model is absent.
    MissingData(String),
    ReportError(String),
    ModelError(String),
}

impl ModelError {
    pub(crate) fn invariant(step: u64, age_group: usize, quantity: &str, value: f64) -> Self {
        ModelError::InvariantViolation {
            step,
            age_group,
            quantity: quantity.to_string(),
            value,
        }
    }
}

impl From<io::Error> for ModelError {
    fn from(error: io::Error) -> Self {
        ModelError::IoError(error)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(error: serde_json::Error) -> Self {
        ModelError::JsonError(error)
    }
}

impl From<csv::Error> for ModelError {
    fn from(error: csv::Error) -> Self {
        ModelError::CSVError(error)
    }
}

impl From<String> for ModelError {
    fn from(error: String) -> Self {
        ModelError::ModelError(error)
    }
}

impl From<&str> for ModelError {
    fn from(error: &str) -> Self {
        ModelError::ModelError(error.to_string())
    }
}

impl std::error::Error for ModelError {}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelError::ConfigInconsistency(msg) => {
                write!(f, "Error: inconsistent configuration: {msg}")
            }
            ModelError::InvariantViolation {
                step,
                age_group,
                quantity,
                value,
            } => write!(
                f,
                "Error: invariant violated at step {step}, age group {age_group}: \
                 {quantity} = {value}"
            ),
            ModelError::MissingData(msg) => write!(f, "Error: missing data: {msg}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
