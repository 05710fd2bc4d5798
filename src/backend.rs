//! Backend trait and availability types.
//!
//! The [`Backend`] trait defines the lifecycle of an analog job:
//!
//! ```text
//!   target() ──→ validate() ──→ submit() ──→ status() ──→ result()
//!   (async)       (async)       (async)      (async)      (async)
//! ```
//!
//! Local emulators and cloud backends both implement it and are shared as
//! `Arc<dyn Backend>`. `target()` is async because a cloud backend fetches
//! its device description on first use.
//!
//! | Method | Kind | Required | Returns |
//! |--------|------|----------|---------|
//! | `name()` | sync | yes | `&str` |
//! | `backend_type()` | sync | yes | `BackendType` |
//! | `target()` | async | yes | `ProviderResult<Target>` |
//! | `capabilities()` | async | provided | `ProviderResult<Capabilities>` |
//! | `availability()` | async | yes | `ProviderResult<BackendAvailability>` |
//! | `validate()` | async | provided | `ProviderResult<ValidationResult>` |
//! | `submit()` | async | yes | `ProviderResult<JobId>` |
//! | `status()` | async | yes | `ProviderResult<JobStatus>` |
//! | `result()` | async | yes | `ProviderResult<ExecutionResult>` |
//! | `cancel()` | async | yes | `ProviderResult<()>` |
//! | `wait()` | async | provided | `ProviderResult<ExecutionResult>` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::circuit::QuantumCircuit;
use crate::error::{ProviderError, ProviderResult};
use crate::gate::HamiltonianGate;
use crate::job::{JobId, JobStatus};
use crate::parameter::ParameterValues;
use crate::result::ExecutionResult;
use crate::sequence::Sequence;
use crate::target::Target;

/// Names under which backends are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendType {
    /// Local state-vector emulator.
    #[serde(rename = "qutip")]
    Qutip,
    /// Local tensor-network emulator, behind the `emu-mps` feature.
    #[serde(rename = "emu-mps")]
    EmuMps,
    #[serde(rename = "remote-emu-free")]
    RemoteEmuFree,
    #[serde(rename = "remote-emu-tn")]
    RemoteEmuTn,
    #[serde(rename = "remote-emu-fresnel")]
    RemoteEmuFresnel,
    /// The Fresnel QPU.
    #[serde(rename = "qpu")]
    Qpu,
}

impl BackendType {
    pub const ALL: [BackendType; 6] = [
        BackendType::Qutip,
        BackendType::EmuMps,
        BackendType::RemoteEmuFree,
        BackendType::RemoteEmuTn,
        BackendType::RemoteEmuFresnel,
        BackendType::Qpu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Qutip => "qutip",
            BackendType::EmuMps => "emu-mps",
            BackendType::RemoteEmuFree => "remote-emu-free",
            BackendType::RemoteEmuTn => "remote-emu-tn",
            BackendType::RemoteEmuFresnel => "remote-emu-fresnel",
            BackendType::Qpu => "qpu",
        }
    }

    pub fn list() -> Vec<&'static str> {
        Self::ALL.iter().map(BackendType::as_str).collect()
    }

    /// Whether jobs go through the cloud.
    pub fn is_remote(&self) -> bool {
        !matches!(self, BackendType::Qutip | BackendType::EmuMps)
    }

    pub fn is_simulator(&self) -> bool {
        !matches!(self, BackendType::Qpu)
    }

    /// Whether registers are always placed on a device layout, even when
    /// the device would run them without one.
    pub fn forces_layout(&self) -> bool {
        matches!(self, BackendType::RemoteEmuFresnel | BackendType::Qpu)
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ProviderError::InvalidBackend(s.to_string()))
    }
}

/// How [`Backend::wait`] polls a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    /// Longest time `wait` polls before giving up.
    pub fn timeout(&self) -> Duration {
        self.interval * self.max_polls
    }
}

impl Default for PollPolicy {
    /// 500 ms polls for up to 5 minutes.
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 600)
    }
}

/// A backend able to run analog circuits.
///
/// # Contract
///
/// - `submit()` MUST return a `JobId` whose initial status is `Queued`
///   (or later, for engines that finish immediately).
/// - `result()` MUST only be called when status is `Completed`.
/// - Parameter values are bound per submission. Every parameter of the
///   circuit must be given a value.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name under which the backend was requested, e.g. `qutip`.
    fn name(&self) -> &str;

    fn backend_type(&self) -> BackendType;

    /// Device and layout jobs run on.
    async fn target(&self) -> ProviderResult<Target>;

    async fn capabilities(&self) -> ProviderResult<Capabilities> {
        let target = self.target().await?;
        Ok(Capabilities::from_target(
            self.name(),
            &target,
            self.backend_type().is_simulator(),
        ))
    }

    /// Check backend availability.
    async fn availability(&self) -> ProviderResult<BackendAvailability>;

    /// Check a circuit against the target without submitting it.
    async fn validate(&self, circuit: &QuantumCircuit) -> ProviderResult<ValidationResult> {
        let target = self.target().await?;
        Ok(validate_circuit(
            circuit,
            &target,
            self.backend_type().forces_layout(),
        ))
    }

    /// Submit a circuit with its parameter values.
    ///
    /// Without `shots` the backend default is used where one exists.
    async fn submit(
        &self,
        circuit: &QuantumCircuit,
        shots: Option<u32>,
        values: &ParameterValues,
    ) -> ProviderResult<JobId>;

    async fn status(&self, job_id: &JobId) -> ProviderResult<JobStatus>;

    /// Get the result of a completed job.
    async fn result(&self, job_id: &JobId) -> ProviderResult<ExecutionResult>;

    async fn cancel(&self, job_id: &JobId) -> ProviderResult<()>;

    /// Polling used by [`wait`](Backend::wait).
    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }

    /// Wait for a job to complete and return its result.
    async fn wait(&self, job_id: &JobId) -> ProviderResult<ExecutionResult> {
        use tokio::time::sleep;

        let policy = self.poll_policy();
        for _ in 0..policy.max_polls {
            match self.status(job_id).await? {
                JobStatus::Completed => return self.result(job_id).await,
                JobStatus::Failed(msg) => return Err(ProviderError::JobFailed(msg)),
                JobStatus::Cancelled => return Err(ProviderError::JobCancelled),
                JobStatus::Queued | JobStatus::Running => sleep(policy.interval).await,
            }
        }

        Err(ProviderError::Timeout(job_id.to_string()))
    }
}

/// Check `circuit` against `target`.
///
/// Waveforms are only checked against the channel when the circuit has no
/// parameters, since their values are unknown before submission.
pub fn validate_circuit(
    circuit: &QuantumCircuit,
    target: &Target,
    force_layout: bool,
) -> ValidationResult {
    let mut reasons = Vec::new();
    for instruction in circuit.data() {
        if instruction.operation.as_analog().is_none() {
            reasons.push(format!(
                "operation '{}' is not supported, only '{}' gates can run",
                instruction.operation.name(),
                HamiltonianGate::NAME
            ));
        }
    }
    if circuit.num_qubits() > target.num_qubits() {
        reasons.push(format!(
            "circuit uses {} qubits, {} offers {}",
            circuit.num_qubits(),
            target.device().name,
            target.num_qubits()
        ));
    }
    if reasons.is_empty() {
        let checked = Sequence::for_target(circuit, target, force_layout).and_then(|seq| {
            if seq.is_parametrized() {
                Ok(())
            } else {
                seq.build(&ParameterValues::new()).map(|_| ())
            }
        });
        if let Err(e) = checked {
            reasons.push(e.to_string());
        }
    }

    if reasons.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid { reasons }
    }
}

/// Backend availability information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAvailability {
    /// Whether the backend is currently accepting jobs.
    pub is_available: bool,
    /// Number of jobs currently in queue (if known).
    pub queue_depth: Option<u32>,
    /// Estimated wait time for a new job in seconds (if known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl BackendAvailability {
    /// Zero queue, zero wait. Typical for local emulators.
    pub fn always_available() -> Self {
        Self {
            is_available: true,
            queue_depth: Some(0),
            estimated_wait_secs: Some(0.0),
            status_message: None,
        }
    }

    /// Reachable, queue unknown.
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            is_available: true,
            queue_depth: None,
            estimated_wait_secs: None,
            status_message: Some(message.into()),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_available: false,
            queue_depth: None,
            estimated_wait_secs: None,
            status_message: Some(reason.into()),
        }
    }
}

/// Result of checking a circuit against a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid,
    Invalid {
        /// Reasons the circuit cannot run.
        reasons: Vec<String>,
    },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}
