//! Local backends.
//!
//! A [`LocalBackend`] lowers circuits to sequences on the caller's side and
//! hands them to an [`Emulator`]. Numerical engines live outside this crate
//! and are registered per backend type through the provider.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendAvailability, BackendType, PollPolicy};
use crate::circuit::QuantumCircuit;
use crate::config::ProviderOptions;
use crate::error::{ProviderError, ProviderResult};
use crate::job::{JobId, JobStatus};
use crate::parameter::ParameterValues;
use crate::result::{Counts, ExecutionResult};
use crate::sequence::{BuiltSequence, Sequence};
use crate::target::Target;

/// An engine that samples bitstrings from a built sequence.
///
/// Implementations must return exactly `shots` samples, one character per
/// atom in register order.
#[async_trait]
pub trait Emulator: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, sequence: &BuiltSequence, shots: u32) -> ProviderResult<Counts>;
}

struct LocalJob {
    status: JobStatus,
    shots: u32,
    result: Option<ExecutionResult>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    handle: Option<JoinHandle<()>>,
}

/// Snapshot of a local job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub status: JobStatus,
    pub shots: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

type JobTable = Arc<Mutex<FxHashMap<String, LocalJob>>>;

fn update_job(jobs: &JobTable, id: &str, f: impl FnOnce(&mut LocalJob)) {
    let mut jobs = jobs.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(job) = jobs.get_mut(id) {
        f(job);
    }
}

/// Evict the oldest finished jobs until at most `keep` remain. Pending
/// jobs are never evicted.
fn prune_finished(jobs: &mut FxHashMap<String, LocalJob>, keep: usize) -> usize {
    let mut finished: Vec<(DateTime<Utc>, String)> = jobs
        .iter()
        .filter(|(_, job)| job.status.is_terminal())
        .map(|(id, job)| (job.finished_at.unwrap_or(job.created_at), id.clone()))
        .collect();
    if finished.len() <= keep {
        return 0;
    }
    finished.sort();
    let evicted = finished.len() - keep;
    for (_, id) in finished.into_iter().take(evicted) {
        jobs.remove(&id);
    }
    evicted
}

/// A backend running sequences on a local engine.
pub struct LocalBackend {
    backend_type: BackendType,
    target: Target,
    emulator: Option<Arc<dyn Emulator>>,
    options: ProviderOptions,
    jobs: JobTable,
}

impl LocalBackend {
    /// Create a local backend of `backend_type` on `target`.
    ///
    /// `emu-mps` needs the `emu-mps` feature and is not available on
    /// Windows.
    pub fn new(backend_type: BackendType, target: Target) -> ProviderResult<Self> {
        match backend_type {
            BackendType::Qutip => {}
            BackendType::EmuMps => {
                if !cfg!(feature = "emu-mps") {
                    return Err(ProviderError::BackendUnavailable(
                        "emu-mps requires the `emu-mps` feature".into(),
                    ));
                }
                if cfg!(windows) {
                    return Err(ProviderError::BackendUnavailable(
                        "emu-mps is not available on Windows".into(),
                    ));
                }
            }
            remote => {
                return Err(ProviderError::Configuration(format!(
                    "{remote} is a remote backend"
                )));
            }
        }
        Ok(Self {
            backend_type,
            target,
            emulator: None,
            options: ProviderOptions::default(),
            jobs: Arc::new(Mutex::new(FxHashMap::default())),
        })
    }

    pub fn with_emulator(mut self, emulator: Arc<dyn Emulator>) -> Self {
        self.emulator = Some(emulator);
        self
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn emulator(&self) -> Option<&Arc<dyn Emulator>> {
        self.emulator.as_ref()
    }

    pub fn default_shots(&self) -> u32 {
        self.options.default_shots
    }

    pub fn job_info(&self, job_id: &JobId) -> Option<JobInfo> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_id.as_str()).map(|job| JobInfo {
            id: job_id.clone(),
            status: job.status.clone(),
            shots: job.shots,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        })
    }

    /// Drop a finished job from the table. Returns whether it was removed.
    ///
    /// Pending jobs are kept; cancel them first.
    pub fn forget(&self, job_id: &JobId) -> bool {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(job_id.as_str()) {
            Some(job) if job.status.is_terminal() => jobs.remove(job_id.as_str()).is_some(),
            _ => false,
        }
    }

    fn spawn_job(
        &self,
        id: String,
        emulator: Arc<dyn Emulator>,
        sequence: BuiltSequence,
        shots: u32,
    ) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let metadata = serde_json::json!({
            "engine": emulator.name(),
            "backend": self.backend_type.as_str(),
            "device": sequence.device().name,
            "num_atoms": sequence.register().len(),
            "duration_ns": sequence.duration(),
        });

        tokio::spawn(async move {
            update_job(&jobs, &id, |job| {
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
            });

            let start = Instant::now();
            let outcome = emulator.run(&sequence, shots).await;
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            update_job(&jobs, &id, |job| {
                if job.status.is_terminal() {
                    return;
                }
                job.finished_at = Some(Utc::now());
                match outcome {
                    Ok(counts) => {
                        if counts.total_shots() != u64::from(shots) {
                            warn!(
                                "engine returned {} samples for {} shots",
                                counts.total_shots(),
                                shots
                            );
                        }
                        debug!("Job {} completed in {} ms", id, elapsed_ms);
                        job.result = Some(
                            ExecutionResult::new(counts, shots)
                                .with_execution_time(elapsed_ms)
                                .with_metadata(metadata),
                        );
                        job.status = JobStatus::Completed;
                    }
                    Err(e) => {
                        warn!("Job {} failed: {}", id, e);
                        job.status = JobStatus::Failed(e.to_string());
                    }
                }
            });
        })
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("backend_type", &self.backend_type)
            .field("device", &self.target.device().name)
            .field("emulator", &self.emulator.as_ref().map(|e| e.name()))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        self.backend_type.as_str()
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    async fn target(&self) -> ProviderResult<Target> {
        Ok(self.target.clone())
    }

    async fn availability(&self) -> ProviderResult<BackendAvailability> {
        Ok(match &self.emulator {
            Some(_) => BackendAvailability::always_available(),
            None => BackendAvailability::unavailable(format!(
                "no engine registered for {}",
                self.backend_type
            )),
        })
    }

    #[instrument(skip(self, circuit, values), fields(backend = %self.backend_type))]
    async fn submit(
        &self,
        circuit: &QuantumCircuit,
        shots: Option<u32>,
        values: &ParameterValues,
    ) -> ProviderResult<JobId> {
        let shots = shots.unwrap_or(self.options.default_shots);
        if shots == 0 {
            return Err(ProviderError::InvalidShots(
                "shots must be a positive number".into(),
            ));
        }
        let Some(emulator) = self.emulator.clone() else {
            return Err(ProviderError::BackendUnavailable(format!(
                "no engine registered for {}",
                self.backend_type
            )));
        };

        let sequence = Sequence::for_target(circuit, &self.target, false)?.build(values)?;
        let id = Uuid::new_v4().to_string();
        {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = prune_finished(&mut jobs, self.options.max_finished_jobs);
            if evicted > 0 {
                debug!("Evicted {} finished jobs", evicted);
            }
            jobs.insert(
                id.clone(),
                LocalJob {
                    status: JobStatus::Queued,
                    shots,
                    result: None,
                    created_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                    handle: None,
                },
            );
        }

        let handle = self.spawn_job(id.clone(), emulator, sequence, shots);
        update_job(&self.jobs, &id, |job| job.handle = Some(handle));

        info!("Submitted job {} ({} shots)", id, shots);
        Ok(JobId::new(id))
    }

    async fn status(&self, job_id: &JobId) -> ProviderResult<JobStatus> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get(job_id.as_str())
            .map(|job| job.status.clone())
            .ok_or_else(|| ProviderError::JobNotFound(job_id.to_string()))
    }

    async fn result(&self, job_id: &JobId) -> ProviderResult<ExecutionResult> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get(job_id.as_str())
            .ok_or_else(|| ProviderError::JobNotFound(job_id.to_string()))?;
        match (&job.status, &job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result.clone()),
            (JobStatus::Failed(msg), _) => Err(ProviderError::JobFailed(msg.clone())),
            (JobStatus::Cancelled, _) => Err(ProviderError::JobCancelled),
            (status, _) => Err(ProviderError::Backend(format!(
                "job {job_id} has no result yet ({status})"
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn cancel(&self, job_id: &JobId) -> ProviderResult<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| ProviderError::JobNotFound(job_id.to_string()))?;
        if job.status.is_terminal() {
            debug!("Job {} already finished ({})", job_id, job.status);
            return Ok(());
        }
        if let Some(handle) = job.handle.take() {
            handle.abort();
        }
        job.status = JobStatus::Cancelled;
        job.finished_at = Some(Utc::now());
        info!("Cancelled job {}", job_id);
        Ok(())
    }

    fn poll_policy(&self) -> PollPolicy {
        self.options.poll_policy
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gate::HamiltonianGate;
    use crate::parameter::parameter;
    use crate::register::GridTransform;
    use crate::waveform::InterpolatePoints;

    /// Every atom stays in the ground state.
    struct GroundState;

    #[async_trait]
    impl Emulator for GroundState {
        fn name(&self) -> &str {
            "ground-state"
        }

        async fn run(&self, sequence: &BuiltSequence, shots: u32) -> ProviderResult<Counts> {
            let bits = "0".repeat(sequence.register().len());
            Ok(Counts::from_pairs([(bits, u64::from(shots))]))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Emulator for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn run(&self, _sequence: &BuiltSequence, _shots: u32) -> ProviderResult<Counts> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Counts::new())
        }
    }

    struct Broken;

    #[async_trait]
    impl Emulator for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run(&self, _sequence: &BuiltSequence, _shots: u32) -> ProviderResult<Counts> {
            Err(ProviderError::Backend("out of memory".into()))
        }
    }

    fn backend(emulator: Arc<dyn Emulator>) -> LocalBackend {
        LocalBackend::new(BackendType::Qutip, Target::default())
            .unwrap()
            .with_emulator(emulator)
            .with_options(ProviderOptions::default().with_poll_interval(Duration::from_millis(5)))
    }

    fn circuit() -> QuantumCircuit {
        let amplitude =
            InterpolatePoints::new([0.0.into(), parameter("omega"), 0.0.into()]).unwrap();
        let detuning = InterpolatePoints::new([-1.0, 0.0, 1.0]).unwrap();
        let coords = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        let gate = HamiltonianGate::with_transform(
            amplitude,
            detuning,
            0.0,
            &coords,
            GridTransform::Triangular,
        )
        .unwrap();
        let mut qc = QuantumCircuit::new(3);
        qc.append(gate, &[0, 1, 2]).unwrap();
        qc
    }

    fn values() -> ParameterValues {
        ParameterValues::new().with("omega", 4.0)
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let backend = backend(Arc::new(GroundState));
        let job_id = backend.submit(&circuit(), None, &values()).await.unwrap();

        let result = backend.wait(&job_id).await.unwrap();
        assert_eq!(result.shots, 1000);
        assert_eq!(result.counts.get("000"), 1000);
        assert_eq!(result.metadata["engine"], "ground-state");
        assert_eq!(result.metadata["duration_ns"], 1000);

        let info = backend.job_info(&job_id).unwrap();
        assert_eq!(info.status, JobStatus::Completed);
        assert!(info.finished_at.unwrap() >= info.created_at);
    }

    #[tokio::test]
    async fn test_submit_rejects_bad_input() {
        let backend = backend(Arc::new(GroundState));
        let err = backend
            .submit(&circuit(), None, &ParameterValues::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnboundParameter(_)));

        let err = backend.submit(&circuit(), Some(0), &values()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidShots(_)));
    }

    #[tokio::test]
    async fn test_no_engine() {
        let backend = LocalBackend::new(BackendType::Qutip, Target::default()).unwrap();
        assert!(!backend.availability().await.unwrap().is_available);
        let err = backend.submit(&circuit(), None, &values()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let backend = backend(Arc::new(Stalled));
        let job_id = backend.submit(&circuit(), Some(10), &values()).await.unwrap();

        backend.cancel(&job_id).await.unwrap();
        assert_eq!(backend.status(&job_id).await.unwrap(), JobStatus::Cancelled);
        assert!(matches!(
            backend.wait(&job_id).await,
            Err(ProviderError::JobCancelled)
        ));
    }

    #[tokio::test]
    async fn test_engine_failure() {
        let backend = backend(Arc::new(Broken));
        let job_id = backend.submit(&circuit(), Some(10), &values()).await.unwrap();
        match backend.wait(&job_id).await {
            Err(ProviderError::JobFailed(msg)) => assert!(msg.contains("out of memory")),
            other => panic!("expected a failed job, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let backend = backend(Arc::new(GroundState));
        let missing = JobId::new("missing");
        assert!(matches!(
            backend.status(&missing).await,
            Err(ProviderError::JobNotFound(_))
        ));
        assert!(backend.cancel(&missing).await.is_err());
    }

    #[tokio::test]
    async fn test_finished_jobs_evicted() {
        let backend = LocalBackend::new(BackendType::Qutip, Target::default())
            .unwrap()
            .with_emulator(Arc::new(GroundState))
            .with_options(
                ProviderOptions::default()
                    .with_poll_interval(Duration::from_millis(5))
                    .with_max_finished_jobs(2),
            );

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = backend.submit(&circuit(), Some(10), &values()).await.unwrap();
            backend.wait(&id).await.unwrap();
            ids.push(id);
        }
        assert!(backend.job_info(&ids[0]).is_some());

        let latest = backend.submit(&circuit(), Some(10), &values()).await.unwrap();
        assert!(backend.job_info(&ids[0]).is_none());
        assert!(matches!(
            backend.status(&ids[0]).await,
            Err(ProviderError::JobNotFound(_))
        ));
        assert!(backend.job_info(&ids[1]).is_some());
        assert!(backend.job_info(&ids[2]).is_some());
        assert!(backend.job_info(&latest).is_some());
    }

    #[tokio::test]
    async fn test_forget_keeps_pending_jobs() {
        let backend = backend(Arc::new(Stalled));
        let job_id = backend.submit(&circuit(), Some(10), &values()).await.unwrap();
        assert!(!backend.forget(&job_id));

        backend.cancel(&job_id).await.unwrap();
        assert!(backend.forget(&job_id));
        assert!(backend.job_info(&job_id).is_none());
        assert!(!backend.forget(&job_id));
    }

    #[test]
    fn test_remote_types_rejected() {
        let err = LocalBackend::new(BackendType::Qpu, Target::default()).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[cfg(not(feature = "emu-mps"))]
    #[test]
    fn test_emu_mps_needs_feature() {
        let err = LocalBackend::new(BackendType::EmuMps, Target::default()).unwrap_err();
        assert!(err.to_string().contains("emu-mps"));
    }
}
