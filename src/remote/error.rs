//! Error types for the cloud client.

use thiserror::Error;

use crate::error::ProviderError;

pub type CloudResult<T> = Result<T, CloudError>;

/// Errors raised while talking to the cloud.
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing credentials: set PASQAL_TOKEN or PASQAL_USERNAME and PASQAL_PASSWORD")]
    MissingCredentials,

    #[error("Missing project id (set PASQAL_PROJECT_ID)")]
    MissingProjectId,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Batch, job or device not found.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Device {0} is not offered by the cloud")]
    DeviceNotFound(String),

    /// A finished job came back without counts.
    #[error("Job {0} has no results")]
    MissingResults(String),

    /// API error response.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
}

impl From<CloudError> for ProviderError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::MissingCredentials
            | CloudError::MissingProjectId
            | CloudError::AuthFailed(_) => ProviderError::AuthenticationFailed(e.to_string()),
            CloudError::NotFound(what) => ProviderError::JobNotFound(what),
            CloudError::DeviceNotFound(_) => ProviderError::Configuration(e.to_string()),
            CloudError::ApiError { status, .. } if status >= 500 => {
                ProviderError::BackendUnavailable(e.to_string())
            }
            CloudError::Http(ref err) if err.is_timeout() || err.is_connect() => {
                ProviderError::BackendUnavailable(e.to_string())
            }
            _ => ProviderError::Backend(e.to_string()),
        }
    }
}
