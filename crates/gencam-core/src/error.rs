//! Custom error types for the application.
//!
//! `CamError` consolidates the error sources of the camera stack: I/O and
//! configuration failures, device/driver faults, node-map lookups and
//! parameter validation. Driver crates generally work in `anyhow::Result`
//! and wrap device faults in the structured variants here; the `#[from]`
//! conversions keep `?` ergonomic throughout.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Initialization,
    Configuration,
    Communication,
    Acquisition,
    Shutdown,
    Timeout,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Acquisition => "acquisition",
            DriverErrorKind::Shutdown => "shutdown",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Structured driver error with a category, so callers can distinguish a
/// failed open from a failed grab without string matching.
#[derive(Error, Debug, Clone)]
#[error("driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type CamResult<T> = std::result::Result<T, CamError>;

/// Primary error type for the camera application.
#[derive(Error, Debug)]
pub enum CamError {
    /// Configuration file parsing failed (settings file or environment).
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration values parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General camera/device fault reported by the vendor subsystem.
    #[error("camera error: {0}")]
    Camera(String),

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(DriverError),

    /// Named node is absent from the device node map.
    #[error("node '{0}' not found in device node map")]
    NodeNotFound(String),

    /// Enumeration node has no entry with the requested symbolic name.
    #[error("node '{node}' has no entry named '{entry}'")]
    InvalidEnumEntry { node: String, entry: String },

    /// A raw node write was outside the node's reported bounds.
    ///
    /// The feature layer clamps before writing, so hitting this indicates a
    /// caller bypassed the clamped setters.
    #[error("node '{node}': value {value} outside [{min}, {max}]")]
    NodeOutOfRange {
        node: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// An operation did not complete within its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Required feature not enabled at compile time.
    #[error("feature '{0}' is not enabled. Rebuild with --features {0}")]
    FeatureNotEnabled(String),

    /// Attempted to modify a read-only parameter.
    #[error("parameter '{0}' is read-only")]
    ParameterReadOnly(String),

    /// Parameter value rejected by its range validator.
    #[error("parameter '{name}': {detail}")]
    ParameterOutOfRange { name: String, detail: String },

    /// Invalid choice for an enumerated parameter.
    #[error("parameter '{name}': '{value}' is not a valid choice")]
    ParameterInvalidChoice { name: String, value: String },

    /// No hardware reader connected for the parameter.
    #[error("parameter '{0}' has no hardware reader connected")]
    ParameterNoHardwareReader(String),

    /// JSON conversion failed for a type-erased parameter access.
    #[error("parameter '{name}': JSON conversion failed: {message}")]
    ParameterJson { name: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CamError::Camera("image grab failed".to_string());
        assert_eq!(err.to_string(), "camera error: image grab failed");
    }

    #[test]
    fn driver_error_display() {
        let err = CamError::Driver(DriverError::new(
            "spinnaker",
            DriverErrorKind::Initialization,
            "no cameras detected",
        ));
        assert!(err
            .to_string()
            .contains("driver 'spinnaker' initialization error"));
    }

    #[test]
    fn node_out_of_range_display() {
        let err = CamError::NodeOutOfRange {
            node: "ExposureTime".into(),
            value: 1e9,
            min: 12.0,
            max: 30000000.0,
        };
        assert!(err.to_string().contains("ExposureTime"));
        assert!(err.to_string().contains("30000000"));
    }
}
