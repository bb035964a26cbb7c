//! Measurement error types

use thiserror::Error;

/// Errors surfaced to the caller of the measurement pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeasurementError {
    #[error("No network connection")]
    NoConnectivity,

    #[error("No server selected")]
    NoServerSelected,

    #[error("Server is unreachable")]
    ServerUnreachable,

    #[error("Probe failed: {0}")]
    TransientProbeFailure(String),

    #[error("Measurement aborted")]
    Aborted,

    #[error("A measurement is already running")]
    AlreadyRunning,
}

impl MeasurementError {
    /// Whether this error ends the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MeasurementError::TransientProbeFailure(_))
    }
}

/// Failure of a single ping, download or upload probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Probe timed out")]
    Timeout,

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<ProbeError> for MeasurementError {
    fn from(err: ProbeError) -> Self {
        MeasurementError::TransientProbeFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_is_transient() {
        let err: MeasurementError = ProbeError::Status(503).into();
        assert_eq!(
            err,
            MeasurementError::TransientProbeFailure("Unexpected HTTP status: 503".to_string())
        );
        assert!(!err.is_fatal());
        assert!(MeasurementError::Aborted.is_fatal());
    }
}
