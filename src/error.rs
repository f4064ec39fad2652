//! Error types for vizpack.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. Validation problems are reported as lists, decode
//! problems fail the decode call, and generation problems degrade to the
//! monolithic fallback inside the styling cache.

use thiserror::Error;
use chrono::{DateTime, Utc};

/// Violations found while checking package data against a visualization schema,
/// or while constructing model values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' must be {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Field '{field}' has an invalid shape: {reason}")]
    InvalidShape {
        field: String,
        reason: String,
    },

    #[error("Fields '{left}' ({left_len}) and '{right}' ({right_len}) must have the same length")]
    LengthMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },

    #[error("Fields '{left}' {left_shape:?} and '{right}' {right_shape:?} must have the same shape")]
    ShapeMismatch {
        left: String,
        left_shape: Vec<usize>,
        right: String,
        right_shape: Vec<usize>,
    },

    #[error("Visualization type '{visualization_type}' is not in the catalog; data was not checked")]
    UnknownVisualizationType {
        visualization_type: String,
    },

    #[error("Invalid interval: start ({start}) is after end ({end})")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Time series must contain at least one timestamp")]
    EmptySeries,

    #[error("Time series is out of order at index {index}")]
    UnorderedSeries {
        index: usize,
    },

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Annotation log has no sequence numbers left")]
    SequenceExhausted,

    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        field: String,
    },

    #[error("Array shape {shape:?} holds {expected} values, got {actual}")]
    ArrayLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Value {value} at index {index} is not representable as {dtype}")]
    ArrayValue {
        index: usize,
        value: f64,
        dtype: String,
    },
}

impl ValidationError {
    /// Returns true for non-fatal advisories that accompany successful processing.
    #[must_use]
    pub const fn is_advisory(&self) -> bool {
        matches!(self, Self::UnknownVisualizationType { .. })
    }

    /// Name of the field the error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field }
            | Self::TypeMismatch { field, .. }
            | Self::InvalidShape { field, .. }
            | Self::EmptyField { field } => Some(field),
            Self::LengthMismatch { left, .. } | Self::ShapeMismatch { left, .. } => Some(left),
            _ => None,
        }
    }
}

/// Errors raised while decoding a wire document into a package.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
    #[error("Wire document must be a JSON object")]
    NotAnObject,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' is malformed: {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },

    #[error("Time does not match any known variant: {reason}")]
    UnknownTimeVariant {
        reason: String,
    },

    #[error("Time is inconsistent: {0}")]
    InvalidTime(ValidationError),

    #[error("Malformed JSON: {message}")]
    Malformed {
        message: String,
    },
}

/// Failures of tiered artifact derivation.
///
/// These never escape the styling cache in texture or shader mode; they
/// trigger the monolithic fallback and are recorded on the response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("No geometry generator for visualization type '{visualization_type}'")]
    UnsupportedType {
        visualization_type: String,
    },

    #[error("Invalid styling configuration: {reason}")]
    InvalidStyling {
        reason: String,
    },

    #[error("Data field '{field}' cannot be meshed: {reason}")]
    UnusableData {
        field: String,
        reason: String,
    },

    #[error("Generation for key {key} was abandoned before completing")]
    Abandoned {
        key: String,
    },
}

/// Top-level error type for vizpack.
#[derive(Debug, Error)]
pub enum VizError {
    #[error("Package '{package_id}' is invalid for '{visualization_type}' ({} error(s))", errors.len())]
    Invalid {
        package_id: String,
        visualization_type: String,
        errors: Vec<ValidationError>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Package not found: {package_id}")]
    NotFound {
        package_id: String,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl VizError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns true if the package failed schema validation.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. } | Self::Validation(_))
    }

    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structural(_))
    }

    pub const fn is_generation(&self) -> bool {
        matches!(self, Self::Generation(_))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the condition cannot be fixed by the caller changing its input.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }

    /// Validation errors carried by this error, if any.
    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Invalid { errors, .. } => errors,
            Self::Validation(e) => std::slice::from_ref(e),
            _ => &[],
        }
    }
}

/// Result type alias for vizpack operations.
pub type VizResult<T> = Result<T, VizError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_message() {
        let err = ValidationError::MissingField { field: "locations".to_string() };
        let msg = format!("{err}");
        assert!(msg.contains("locations"));
        assert!(msg.contains("missing"));
        assert_eq!(err.field(), Some("locations"));
    }

    #[test]
    fn test_unknown_type_is_advisory() {
        let err = ValidationError::UnknownVisualizationType {
            visualization_type: "hologram".to_string(),
        };
        assert!(err.is_advisory());
        assert!(!ValidationError::EmptySeries.is_advisory());
    }

    #[test]
    fn test_length_mismatch_message() {
        let err = ValidationError::LengthMismatch {
            left: "locations".to_string(),
            left_len: 3,
            right: "values".to_string(),
            right_len: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("locations"));
        assert!(msg.contains("values"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_viz_error_invalid_carries_errors() {
        let err = VizError::Invalid {
            package_id: "p1".to_string(),
            visualization_type: "heatmap".to_string(),
            errors: vec![ValidationError::MissingField { field: "grid".to_string() }],
        };
        assert!(err.is_invalid());
        assert!(!err.is_fatal());
        assert_eq!(err.validation_errors().len(), 1);
        assert!(format!("{err}").contains("1 error"));
    }

    #[test]
    fn test_viz_error_from_structural() {
        let err: VizError = StructuralError::MissingField { field: "id".to_string() }.into();
        assert!(err.is_structural());
        assert!(err.validation_errors().is_empty());
    }

    #[test]
    fn test_viz_error_from_generation() {
        let err: VizError = GenerationError::InvalidStyling { reason: "min > max".to_string() }.into();
        assert!(err.is_generation());
        assert!(format!("{err}").contains("min > max"));
    }

    #[test]
    fn test_storage_is_fatal() {
        let err = VizError::storage("poisoned lock");
        assert!(err.is_fatal());
        assert!(VizError::internal("x").is_fatal());
    }
}
