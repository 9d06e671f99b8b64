//! Error types for generation.
//!
//! Configuration, motif-definition and integrity errors are fatal.
//! Population shortfalls and temporal overflows are recoverable: the
//! instance is dropped and reported in the manifest.

use kleptosyn_motif::{DistributionError, LibraryError, MotifDefinitionError};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid configuration at `{field}`: {message}")]
pub struct ConfigurationError {
    pub field: String,
    pub message: String,
}

impl ConfigurationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("instance `{instance}`: role `{role}` needs {required} entities, {available} available")]
pub struct InsufficientPopulationError {
    pub instance: String,
    pub role: String,
    pub required: usize,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("integrity violation: {0}")]
pub struct IntegrityViolationError(pub String);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error(
    "instance `{instance}`: timestamps span {observed_hours:.3}h, window is {window_hours}h \
     (after {attempts} attempts)"
)]
pub struct TemporalConstraintError {
    pub instance: String,
    pub window_hours: f64,
    pub observed_hours: f64,
    pub attempts: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    MotifDefinition(#[from] MotifDefinitionError),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    InsufficientPopulation(#[from] InsufficientPopulationError),
    #[error(transparent)]
    IntegrityViolation(#[from] IntegrityViolationError),
    #[error(transparent)]
    TemporalConstraint(#[from] TemporalConstraintError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SynthError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Recoverable errors drop one instance; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SynthError::InsufficientPopulation(_) | SynthError::TemporalConstraint(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SynthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_population_and_timing_failures_are_recoverable() {
        let short: SynthError = InsufficientPopulationError {
            instance: "mule_burst#0".into(),
            role: "mule".into(),
            required: 3,
            available: 1,
        }
        .into();
        assert!(short.is_recoverable());

        let late: SynthError = TemporalConstraintError {
            instance: "fan_out_burst#1".into(),
            window_hours: 2.0,
            observed_hours: 2.5,
            attempts: 5,
        }
        .into();
        assert!(late.is_recoverable());

        let config: SynthError = ConfigurationError::new("seed", "bad").into();
        assert!(!config.is_recoverable());
        assert!(config.to_string().contains("seed"));
        assert!(!SynthError::from(IntegrityViolationError("dangling".into())).is_recoverable());
    }
}
