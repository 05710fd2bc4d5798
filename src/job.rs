//! Job lifecycle types.
//!
//! The job state machine:
//!
//! ```text
//!   submit() ──→ Queued ──→ Running ──→ Completed
//!                  │           │
//!                  │           ├──→ Failed(reason)
//!                  │           │
//!                  └───────────┴──→ Cancelled
//! ```
//!
//! Local jobs start `Queued`. Cloud batches report `PENDING` and `PAUSED`
//! as `Queued` as well. Terminal states are permanent and `result()` is
//! only valid once a job is `Completed`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::circuit::QuantumCircuit;
use crate::error::ProviderResult;
use crate::parameter::ParameterValues;
use crate::result::ExecutionResult;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a job stands.
///
/// Cloud states fold into these: `PENDING`/`PAUSED` are `Queued`,
/// `DONE` is `Completed`, and `ERROR`/`TIMED_OUT` are `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    /// The engine or the QPU is executing the sequence.
    Running,
    Completed,
    /// Failed, with the engine's or the cloud's reason.
    Failed(String),
    Cancelled,
}

impl JobStatus {
    /// `Completed`, `Failed` and `Cancelled` never change again.
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Completed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed(reason) => return write!(f, "Failed: {reason}"),
        };
        f.write_str(label)
    }
}

/// A submitted job bound to the backend that runs it.
#[derive(Clone)]
pub struct Job {
    backend: Arc<dyn Backend>,
    id: JobId,
}

impl Job {
    pub fn new(backend: Arc<dyn Backend>, id: JobId) -> Self {
        Self { backend, id }
    }

    /// Submit `circuit` to `backend` and track the new job.
    pub async fn submit(
        backend: Arc<dyn Backend>,
        circuit: &QuantumCircuit,
        shots: Option<u32>,
        values: &ParameterValues,
    ) -> ProviderResult<Self> {
        let id = backend.submit(circuit, shots, values).await?;
        Ok(Self::new(backend, id))
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub async fn status(&self) -> ProviderResult<JobStatus> {
        self.backend.status(&self.id).await
    }

    /// Whether the job completed successfully.
    pub async fn done(&self) -> ProviderResult<bool> {
        Ok(self.status().await?.is_success())
    }

    pub async fn running(&self) -> ProviderResult<bool> {
        Ok(self.status().await? == JobStatus::Running)
    }

    pub async fn cancelled(&self) -> ProviderResult<bool> {
        Ok(self.status().await? == JobStatus::Cancelled)
    }

    pub async fn in_final_state(&self) -> ProviderResult<bool> {
        Ok(self.status().await?.is_terminal())
    }

    /// Wait for the job and return its result.
    pub async fn result(&self) -> ProviderResult<ExecutionResult> {
        self.backend.wait(&self.id).await
    }

    pub async fn cancel(&self) -> ProviderResult<()> {
        self.backend.cancel(&self.id).await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("backend", &self.backend.name())
            .field("id", &self.id)
            .finish()
    }
}
