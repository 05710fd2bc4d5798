//! Sampler primitive.
//!
//! A [`Sampler`] runs pubs, each a circuit with its parameter values, on
//! one backend and collects the counts of every pub.
//!
//! ```no_run
//! # async fn demo(backend: std::sync::Arc<dyn pasqal_provider::Backend>,
//! #               circuit: pasqal_provider::QuantumCircuit) -> pasqal_provider::ProviderResult<()> {
//! use pasqal_provider::{ParameterValues, Sampler};
//!
//! let sampler = Sampler::new(backend);
//! let values = ParameterValues::new().with("omega", 2.0);
//! let job = sampler.run([(circuit, values)], Some(500)).await?;
//! let result = job.result().await?;
//! println!("{:?}", result[0].counts);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::circuit::QuantumCircuit;
use crate::error::{ProviderError, ProviderResult};
use crate::job::{Job, JobId, JobStatus};
use crate::parameter::ParameterValues;
use crate::result::{SamplerPubResult, SamplerResult};
use crate::sequence::{BuiltSequence, Sequence};

/// One unit of sampler work: a circuit and the values of its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerPub {
    pub circuit: QuantumCircuit,
    pub parameter_values: ParameterValues,
}

impl From<QuantumCircuit> for SamplerPub {
    fn from(circuit: QuantumCircuit) -> Self {
        Self {
            circuit,
            parameter_values: ParameterValues::new(),
        }
    }
}

impl From<(QuantumCircuit, ParameterValues)> for SamplerPub {
    fn from((circuit, parameter_values): (QuantumCircuit, ParameterValues)) -> Self {
        Self {
            circuit,
            parameter_values,
        }
    }
}

fn collect_pubs(
    pubs: impl IntoIterator<Item = impl Into<SamplerPub>>,
) -> ProviderResult<Vec<SamplerPub>> {
    let pubs: Vec<SamplerPub> = pubs.into_iter().map(Into::into).collect();
    if pubs.is_empty() {
        return Err(ProviderError::InvalidPubs(
            "'pubs' argument must be a QuantumCircuit or a tuple of QuantumCircuit \
             and ParameterExpression."
                .into(),
        ));
    }
    Ok(pubs)
}

/// Samples analog circuits on a backend.
#[derive(Clone)]
pub struct Sampler {
    backend: Arc<dyn Backend>,
}

impl Sampler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Execution modes are not supported; always `None`.
    pub fn mode(&self) -> Option<&'static str> {
        warn!("'mode' is not a valid method for Pasqal's Sampler class.");
        None
    }

    /// Lower the first pub for the backend's target without running it.
    pub async fn build(
        &self,
        pubs: impl IntoIterator<Item = impl Into<SamplerPub>>,
    ) -> ProviderResult<BuiltSequence> {
        let pubs = collect_pubs(pubs)?;
        let first = &pubs[0];
        let target = self.backend.target().await?;
        Sequence::for_target(
            &first.circuit,
            &target,
            self.backend.backend_type().forces_layout(),
        )?
        .build(&first.parameter_values)
    }

    /// Submit every pub as its own backend job.
    ///
    /// Without `shots` the backend default applies. If a submission fails,
    /// the jobs already submitted are cancelled.
    pub async fn run(
        &self,
        pubs: impl IntoIterator<Item = impl Into<SamplerPub>>,
        shots: Option<u32>,
    ) -> ProviderResult<SamplerJob> {
        let pubs = collect_pubs(pubs)?;
        let mut jobs = Vec::with_capacity(pubs.len());
        for pub_ in &pubs {
            let submitted = Job::submit(
                Arc::clone(&self.backend),
                &pub_.circuit,
                shots,
                &pub_.parameter_values,
            )
            .await;
            match submitted {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    for job in &jobs {
                        if let Err(cancel_err) = job.cancel().await {
                            warn!("Could not cancel job {}: {}", job.id(), cancel_err);
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "Sampler submitted {} pubs to {}",
            jobs.len(),
            self.backend.name()
        );
        Ok(SamplerJob {
            backend_name: self.backend.name().to_string(),
            jobs,
        })
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// The backend jobs of one sampler run.
#[derive(Debug, Clone)]
pub struct SamplerJob {
    backend_name: String,
    jobs: Vec<Job>,
}

impl SamplerJob {
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|job| job.id().clone()).collect()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Combined status: a failure or cancellation of any job wins, then
    /// `Running` if any job runs, `Completed` once all are done.
    pub async fn status(&self) -> ProviderResult<JobStatus> {
        let mut statuses = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            statuses.push(job.status().await?);
        }
        if let Some(failed) = statuses.iter().find(|s| matches!(s, JobStatus::Failed(_))) {
            return Ok(failed.clone());
        }
        if statuses.contains(&JobStatus::Cancelled) {
            return Ok(JobStatus::Cancelled);
        }
        if statuses.iter().all(JobStatus::is_success) {
            return Ok(JobStatus::Completed);
        }
        if statuses.contains(&JobStatus::Running) || statuses.contains(&JobStatus::Completed) {
            return Ok(JobStatus::Running);
        }
        Ok(JobStatus::Queued)
    }

    pub async fn done(&self) -> ProviderResult<bool> {
        Ok(self.status().await?.is_success())
    }

    pub async fn in_final_state(&self) -> ProviderResult<bool> {
        Ok(self.status().await?.is_terminal())
    }

    /// Cancel every job still pending.
    pub async fn cancel(&self) -> ProviderResult<()> {
        for job in &self.jobs {
            if job.status().await?.is_pending() {
                job.cancel().await?;
            }
        }
        Ok(())
    }

    /// Wait for every job and gather the counts in pub order.
    pub async fn result(&self) -> ProviderResult<SamplerResult> {
        let mut pub_results = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            pub_results.push(SamplerPubResult::from(job.result().await?));
        }
        Ok(SamplerResult {
            pub_results,
            backend_name: self.backend_name.clone(),
            job_ids: self.job_ids(),
            date: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::backend::BackendType;
    use crate::config::ProviderOptions;
    use crate::gate::HamiltonianGate;
    use crate::local::{Emulator, LocalBackend};
    use crate::parameter::parameter;
    use crate::register::GridTransform;
    use crate::result::Counts;
    use crate::target::Target;
    use crate::waveform::InterpolatePoints;

    /// Excites the first atom in a share of shots set by the peak amplitude.
    struct PeakAmplitude;

    #[async_trait]
    impl Emulator for PeakAmplitude {
        fn name(&self) -> &str {
            "peak-amplitude"
        }

        async fn run(&self, sequence: &BuiltSequence, shots: u32) -> ProviderResult<Counts> {
            let n = sequence.register().len();
            let peak = sequence.pulses()[0].amplitude.max();
            let excited = (f64::from(shots) * (peak / 10.0).min(1.0)).round() as u64;
            let mut counts = Counts::new();
            counts.insert(format!("1{}", "0".repeat(n - 1)), excited);
            counts.insert("0".repeat(n), u64::from(shots) - excited);
            Ok(counts)
        }
    }

    fn sampler() -> Sampler {
        let backend = LocalBackend::new(BackendType::Qutip, Target::default())
            .unwrap()
            .with_emulator(Arc::new(PeakAmplitude))
            .with_options(ProviderOptions::default().with_poll_interval(Duration::from_millis(5)));
        Sampler::new(Arc::new(backend))
    }

    fn circuit() -> QuantumCircuit {
        let amplitude =
            InterpolatePoints::new([0.0.into(), parameter("omega"), 0.0.into()]).unwrap();
        let detuning = InterpolatePoints::new([-2.0, 0.0, 2.0]).unwrap();
        let coords = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let gate = HamiltonianGate::with_transform(
            amplitude,
            detuning,
            0.0,
            &coords,
            GridTransform::Triangular,
        )
        .unwrap();
        let mut qc = QuantumCircuit::new(4);
        qc.append(gate, &[0, 1, 2, 3]).unwrap();
        qc
    }

    #[tokio::test]
    async fn test_run_pubs() {
        let sampler = sampler();
        let pubs = [
            (circuit(), ParameterValues::new().with("omega", 5.0)),
            (circuit(), ParameterValues::new().with("omega", 10.0)),
        ];
        let job = sampler.run(pubs, Some(200)).await.unwrap();
        assert_eq!(job.job_ids().len(), 2);

        let result = job.result().await.unwrap();
        assert!(job.done().await.unwrap());
        assert_eq!(result.len(), 2);
        assert_eq!(result.backend_name, "qutip");
        assert_eq!(result[0].counts.total_shots(), 200);
        assert_eq!(result[0].counts.get("1000"), 100);
        assert_eq!(result[1].counts.get("1000"), 200);
    }

    #[tokio::test]
    async fn test_default_shots() {
        let sampler = sampler();
        let job = sampler
            .run([(circuit(), ParameterValues::new().with("omega", 1.0))], None)
            .await
            .unwrap();
        let result = job.result().await.unwrap();
        assert_eq!(result[0].shots, 1000);
    }

    #[tokio::test]
    async fn test_empty_pubs() {
        let err = sampler()
            .run(Vec::<SamplerPub>::new(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'pubs' argument must be a QuantumCircuit"));
    }

    #[tokio::test]
    async fn test_unbound_parameter() {
        let err = sampler().run([circuit()], Some(10)).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnboundParameter(name) if name == "omega"));
    }

    #[tokio::test]
    async fn test_build_sequence() {
        let built = sampler()
            .build([(circuit(), ParameterValues::new().with("omega", 3.0))])
            .await
            .unwrap();
        assert_eq!(built.register().len(), 4);
        assert!((built.pulses()[0].amplitude.max() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mode_is_none() {
        assert!(sampler().mode().is_none());
    }
}
