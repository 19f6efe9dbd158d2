//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while validating inputs or building request parameters.
///
/// All variants are fatal to the operation that raised them and are never
/// retried; they indicate malformed caller input rather than remote state.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Malformed spatial, temporal, or product input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Requested orbital cycle or reference ground track outside the known set.
    #[error("Orbit parameter out of range: {0}")]
    InvalidOrbitParameter(String),

    /// Extent file extension outside the supported vector-format allow-list.
    #[error("Unsupported extent file format: {0}")]
    UnsupportedExtentFile(String),

    /// Extent file did not contain exactly one polygon feature.
    #[error("Extent file must contain exactly one polygon feature: {0}")]
    BadExtentFeatureCount(String),

    /// Variable path not present in the known catalog.
    #[error("Unknown variable path: {0}")]
    InvalidVariable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidOrbitParameter("cycle 120".to_string());
        assert!(format!("{}", err).contains("cycle 120"));

        let err = ProtocolError::Validation("start after end".to_string());
        assert!(format!("{}", err).contains("Invalid input"));
    }
}
