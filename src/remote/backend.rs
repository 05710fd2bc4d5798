//! Backends running on the Pasqal cloud.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::backend::{Backend, BackendAvailability, BackendType, PollPolicy};
use crate::circuit::QuantumCircuit;
use crate::error::{ProviderError, ProviderResult};
use crate::job::{JobId, JobStatus};
use crate::parameter::ParameterValues;
use crate::result::ExecutionResult;
use crate::sequence::Sequence;
use crate::target::Target;

use super::api::{CloudClient, EmulatorType, JobSpec};

/// Cloud device every remote backend runs on unless a target is given.
pub const DEFAULT_DEVICE: &str = "FRESNEL";

/// A cloud emulator or the QPU.
///
/// Without an explicit target the device specs are fetched on first use.
#[derive(Debug)]
pub struct RemoteBackend {
    backend_type: BackendType,
    client: CloudClient,
    device_name: String,
    target: OnceCell<Target>,
    poll_policy: PollPolicy,
}

impl RemoteBackend {
    pub fn new(
        backend_type: BackendType,
        client: CloudClient,
        target: Option<Target>,
    ) -> ProviderResult<Self> {
        if !backend_type.is_remote() {
            return Err(ProviderError::Configuration(format!(
                "{backend_type} is a local backend"
            )));
        }
        Ok(Self {
            backend_type,
            client,
            device_name: DEFAULT_DEVICE.to_string(),
            target: OnceCell::new_with(target),
            poll_policy: PollPolicy::new(std::time::Duration::from_secs(2), 900),
        })
    }

    /// Run on the cloud device called `name` instead of Fresnel.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn client(&self) -> &CloudClient {
        &self.client
    }

    /// Cloud emulator used for jobs, `None` for the QPU.
    pub fn emulator(&self) -> Option<EmulatorType> {
        match self.backend_type {
            BackendType::RemoteEmuFree => Some(EmulatorType::EmuFree),
            BackendType::RemoteEmuTn => Some(EmulatorType::EmuTn),
            BackendType::RemoteEmuFresnel => Some(EmulatorType::EmuFresnel),
            _ => None,
        }
    }

    async fn resolved_target(&self) -> ProviderResult<&Target> {
        self.target
            .get_or_try_init(|| async {
                info!("Fetching {} specs", self.device_name);
                Target::fetch_device(&self.client, &self.device_name).await
            })
            .await
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        self.backend_type.as_str()
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    async fn target(&self) -> ProviderResult<Target> {
        self.resolved_target().await.cloned()
    }

    async fn availability(&self) -> ProviderResult<BackendAvailability> {
        Ok(match self.client.fetch_device_specs().await {
            Ok(devices) if devices.contains_key(&self.device_name) => {
                BackendAvailability::available(format!("{} is online", self.device_name))
            }
            Ok(_) => BackendAvailability::unavailable(format!(
                "{} is not offered by the cloud",
                self.device_name
            )),
            Err(e) => BackendAvailability::unavailable(e.to_string()),
        })
    }

    #[instrument(skip(self, circuit, values), fields(backend = %self.backend_type))]
    async fn submit(
        &self,
        circuit: &QuantumCircuit,
        shots: Option<u32>,
        values: &ParameterValues,
    ) -> ProviderResult<JobId> {
        let Some(shots) = shots.filter(|&s| s > 0) else {
            return Err(ProviderError::InvalidShots(
                "remote backends need a positive number of shots".into(),
            ));
        };
        let target = self.resolved_target().await?;
        if let Some(max) = target.device().max_runs {
            if shots > max {
                return Err(ProviderError::InvalidShots(format!(
                    "{shots} shots requested, {} allows at most {max}",
                    target.device().name
                )));
            }
        }

        let sequence =
            Sequence::for_target(circuit, target, self.backend_type.forces_layout())?
                .build(values)?;
        let jobs = [JobSpec {
            runs: shots,
            variables: values.clone(),
        }];
        let batch = self
            .client
            .create_batch(&sequence.to_json()?, &jobs, self.emulator())
            .await
            .map_err(|e| match ProviderError::from(e) {
                ProviderError::Backend(msg) => ProviderError::SubmissionFailed(msg),
                other => other,
            })?;

        info!("Submitted batch {} ({} shots)", batch.id, shots);
        Ok(JobId::new(batch.id))
    }

    async fn status(&self, job_id: &JobId) -> ProviderResult<JobStatus> {
        let batch = self.client.get_batch(job_id.as_str()).await?;
        debug!("Batch {} is {:?}", batch.id, batch.status);
        Ok(batch.job_status())
    }

    #[instrument(skip(self))]
    async fn result(&self, job_id: &JobId) -> ProviderResult<ExecutionResult> {
        let batch = self.client.get_batch(job_id.as_str()).await?;
        match batch.job_status() {
            JobStatus::Completed => {}
            JobStatus::Failed(msg) => return Err(ProviderError::JobFailed(msg)),
            JobStatus::Cancelled => return Err(ProviderError::JobCancelled),
            status => {
                return Err(ProviderError::Backend(format!(
                    "batch {job_id} has no result yet ({status})"
                )));
            }
        }
        let job = batch.jobs.first().ok_or_else(|| {
            ProviderError::Backend(format!("batch {job_id} finished without jobs"))
        })?;

        let counts = self.client.get_job_results(&job.id).await?;
        let shots = job
            .runs
            .unwrap_or_else(|| u32::try_from(counts.total_shots()).unwrap_or(u32::MAX));
        Ok(ExecutionResult::new(counts, shots).with_metadata(serde_json::json!({
            "backend": self.backend_type.as_str(),
            "batch_id": batch.id,
            "job_id": job.id,
            "emulator": self.emulator(),
            "device": self.device_name,
        })))
    }

    #[instrument(skip(self))]
    async fn cancel(&self, job_id: &JobId) -> ProviderResult<()> {
        let batch = self.client.cancel_batch(job_id.as_str()).await?;
        info!("Cancelled batch {} ({:?})", batch.id, batch.status);
        Ok(())
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{Endpoints, RemoteConfig};
    use crate::device::Device;
    use crate::gate::HamiltonianGate;
    use crate::parameter::parameter;
    use crate::register::GridTransform;
    use crate::waveform::InterpolatePoints;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> CloudClient {
        let config = RemoteConfig::with_token("tok", "project-1").with_endpoints(Endpoints {
            core: server.base_url(),
            account: server.base_url(),
        });
        CloudClient::new(config).unwrap()
    }

    fn circuit() -> QuantumCircuit {
        let amplitude =
            InterpolatePoints::new([0.0.into(), parameter("omega"), 0.0.into()]).unwrap();
        let detuning = InterpolatePoints::new([0.0, 0.0, 0.0]).unwrap();
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

    async fn mock_specs(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/devices/specs");
                then.status(200)
                    .json_body(json!({"data": {"FRESNEL": Device::analog()}}));
            })
            .await
    }

    #[test]
    fn test_emulator_mapping() {
        let server = MockServer::start();
        let remote = |t| RemoteBackend::new(t, client(&server), None).unwrap();
        assert_eq!(
            remote(BackendType::RemoteEmuFree).emulator(),
            Some(EmulatorType::EmuFree)
        );
        assert_eq!(
            remote(BackendType::RemoteEmuFresnel).emulator(),
            Some(EmulatorType::EmuFresnel)
        );
        assert_eq!(remote(BackendType::Qpu).emulator(), None);
        assert!(RemoteBackend::new(BackendType::Qutip, client(&server), None).is_err());
    }

    #[tokio::test]
    async fn test_target_fetched_once() {
        let server = MockServer::start_async().await;
        let specs = mock_specs(&server).await;

        let backend = RemoteBackend::new(BackendType::Qpu, client(&server), None).unwrap();
        let target = backend.target().await.unwrap();
        assert_eq!(target.device().name, "PasqalDevice1");
        backend.target().await.unwrap();
        specs.assert_hits_async(1).await;

        let caps = backend.capabilities().await.unwrap();
        assert!(!caps.is_simulator);
        assert_eq!(caps.max_shots, Some(2000));
    }

    #[tokio::test]
    async fn test_fetch_target() {
        let server = MockServer::start_async().await;
        mock_specs(&server).await;
        let client = client(&server);

        let target = Target::fetch(&client).await.unwrap();
        assert_eq!(target.layout().number_of_traps(), 61);

        let err = Target::fetch_device(&client, "NOPE").await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn test_shots_are_checked() {
        let server = MockServer::start_async().await;
        mock_specs(&server).await;
        let backend = RemoteBackend::new(BackendType::Qpu, client(&server), None).unwrap();
        let values = ParameterValues::new().with("omega", 1.0);

        for shots in [None, Some(0), Some(5000)] {
            let err = backend.submit(&circuit(), shots, &values).await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidShots(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_submit_and_collect() {
        let server = MockServer::start_async().await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/batches")
                    .json_body_partial(r#"{"emulator": "EMU_FRESNEL", "jobs": [{"runs": 100}]}"#);
                then.status(200).json_body(json!({
                    "data": {"id": "b1", "status": "PENDING",
                             "jobs": [{"id": "j1", "status": "PENDING", "runs": 100}]}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/batches/b1");
                then.status(200).json_body(json!({
                    "data": {"id": "b1", "status": "DONE",
                             "jobs": [{"id": "j1", "status": "DONE", "runs": 100}]}
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/jobs/j1/results");
                then.status(200)
                    .json_body(json!({"data": {"counter": {"000": 60, "100": 40}}}));
            })
            .await;

        let backend = RemoteBackend::new(
            BackendType::RemoteEmuFresnel,
            client(&server),
            Some(Target::default()),
        )
        .unwrap()
        .with_poll_policy(PollPolicy::new(Duration::from_millis(5), 10));

        let values = ParameterValues::new().with("omega", 2.0);
        let job_id = backend.submit(&circuit(), Some(100), &values).await.unwrap();
        create.assert_async().await;
        assert_eq!(job_id.as_str(), "b1");

        let result = backend.wait(&job_id).await.unwrap();
        assert_eq!(result.shots, 100);
        assert_eq!(result.counts.get("100"), 40);
        assert_eq!(result.metadata["batch_id"], "b1");
        assert_eq!(result.metadata["emulator"], "EMU_FRESNEL");
    }

    #[tokio::test]
    async fn test_failed_batch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/batches/b2");
                then.status(200).json_body(json!({
                    "data": {"id": "b2", "status": "ERROR",
                             "jobs": [{"id": "j2", "status": "ERROR", "errors": ["bad layout"]}]}
                }));
            })
            .await;

        let backend = RemoteBackend::new(
            BackendType::RemoteEmuTn,
            client(&server),
            Some(Target::default()),
        )
        .unwrap();
        match backend.wait(&JobId::new("b2")).await {
            Err(ProviderError::JobFailed(msg)) => assert_eq!(msg, "bad layout"),
            other => panic!("expected a failed batch, got {other:?}"),
        }
    }
}
