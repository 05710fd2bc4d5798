//! Provider error types.
//!
//! Errors are categorized by recoverability:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Transient** | `BackendUnavailable`, `Timeout` | Retry with backoff |
//! | **Input** | `InvalidCircuit`, `InvalidGate`, `InvalidWaveform`, `InvalidRegister`, `InvalidLayout`, `InvalidShots`, `InvalidPubs`, `UnboundParameter`, `InvalidBackend`, `Unsupported` | Fix input |
//! | **Job-level** | `SubmissionFailed`, `JobFailed`, `JobCancelled`, `JobNotFound` | Resubmit or abort |
//! | **Auth** | `AuthenticationFailed`, `MissingRemoteConfig` | Re-authenticate |
//! | **Config** | `Configuration`, `Backend` | Fix configuration |

use thiserror::Error;

/// Errors that can occur while building analog programs or running them.
///
/// Cloud transport failures are first raised as
/// [`CloudError`](crate::remote::CloudError) and folded into this type at
/// the backend boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    // ── Transient errors (retry with backoff) ────────────────────────
    /// Backend is not available.
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// Timeout waiting for job.
    #[error("Timeout waiting for job {0}")]
    Timeout(String),

    // ── Input errors (fix input) ─────────────────────────────────────
    /// Invalid circuit.
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// Invalid analog gate definition.
    #[error("Invalid gate: {0}")]
    InvalidGate(String),

    /// Invalid waveform points, duration or times.
    #[error("Invalid waveform: {0}")]
    InvalidWaveform(String),

    /// Register rejected by the device or malformed coordinates.
    #[error("Invalid register: {0}")]
    InvalidRegister(String),

    /// Layout rejected by the device.
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    /// Invalid number of shots.
    #[error("Invalid shots: {0}")]
    InvalidShots(String),

    /// Sampler inputs could not be interpreted.
    #[error("Invalid pubs: {0}")]
    InvalidPubs(String),

    /// A parameter used in the program has no value.
    #[error("Parameter '{0}' has no bound value")]
    UnboundParameter(String),

    /// Unknown backend name.
    #[error("{0} is not a valid backend")]
    InvalidBackend(String),

    /// Unsupported feature.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    // ── Job-level errors ─────────────────────────────────────────────
    /// Job submission failed.
    #[error("Job submission failed: {0}")]
    SubmissionFailed(String),

    /// Job execution failed.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Job was cancelled.
    #[error("Job cancelled")]
    JobCancelled,

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    // ── Auth errors ──────────────────────────────────────────────────
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A remote backend was requested without cloud credentials.
    #[error("remote backend '{0}' requires a remote configuration")]
    MissingRemoteConfig(String),

    // ── Config errors ────────────────────────────────────────────────
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ProviderError {
    /// Returns `true` if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Timeout(_))
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ProviderError::BackendUnavailable("offline".into()).is_transient());
        assert!(ProviderError::Timeout("job-123".into()).is_transient());
        assert!(!ProviderError::InvalidCircuit("bad".into()).is_transient());
        assert!(!ProviderError::MissingRemoteConfig("qpu".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::InvalidBackend("fake-backend".into());
        assert_eq!(err.to_string(), "fake-backend is not a valid backend");

        let err = ProviderError::UnboundParameter("t".into());
        assert_eq!(err.to_string(), "Parameter 't' has no bound value");
    }
}
