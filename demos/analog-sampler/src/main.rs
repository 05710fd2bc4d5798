//! Analog sampler demo.
//!
//! Sweeps the Rabi amplitude of a three-atom Hamiltonian gate on a local
//! backend. The engine treats atoms as independent two-level systems, so
//! the excitation probability of each atom is `sin²(area / 2)`.
//!
//! With `PASQAL_USERNAME`/`PASQAL_PASSWORD`/`PASQAL_PROJECT_ID` (or
//! `PASQAL_TOKEN`) set, the same circuit is also sent to the cloud
//! tensor-network emulator.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use pasqal_provider::{
    BackendType, BuiltSequence, Counts, Emulator, GridTransform, HamiltonianGate,
    InterpolatePoints, ParameterValues, PasqalProvider, ProviderResult, QuantumCircuit, Sampler,
    SamplerPub, parameter,
};

/// Independent-atom Rabi engine. Counts are the expected frequencies,
/// rounded.
struct RabiEngine;

#[async_trait]
impl Emulator for RabiEngine {
    fn name(&self) -> &str {
        "rabi"
    }

    async fn run(&self, sequence: &BuiltSequence, shots: u32) -> ProviderResult<Counts> {
        let n = sequence.register().len();
        // Amplitude is in rad/µs, time in ns.
        let area: f64 = sequence
            .pulses()
            .iter()
            .map(|p| p.amplitude.integral() / 1000.0)
            .sum();
        let p = (area / 2.0).sin().powi(2);

        let mut counts = Counts::new();
        for state in 0..(1u64 << n) {
            let excited = state.count_ones() as i32;
            let prob = p.powi(excited) * (1.0 - p).powi(n as i32 - excited);
            let count = (prob * f64::from(shots)).round() as u64;
            if count > 0 {
                let bits: String = (0..n)
                    .map(|k| if (state >> k) & 1 == 1 { '1' } else { '0' })
                    .collect();
                counts.insert(bits, count);
            }
        }
        Ok(counts)
    }
}

fn rabi_circuit() -> Result<QuantumCircuit> {
    let amplitude = InterpolatePoints::new([parameter("omega"), parameter("omega")])?;
    let detuning = InterpolatePoints::new([0.0, 0.0])?;
    let gate = HamiltonianGate::with_transform(
        amplitude,
        detuning,
        0.0,
        &[(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)],
        GridTransform::Triangular,
    )?;
    let mut circuit = QuantumCircuit::new(3);
    circuit.append(gate, &[0, 1, 2])?;
    Ok(circuit)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let provider =
        PasqalProvider::from_env()?.with_emulator(BackendType::Qutip, Arc::new(RabiEngine));
    info!("Backends: {}", provider.backends().join(", "));

    let circuit = rabi_circuit()?;
    let omegas = [0.5, 1.5, 3.0, 6.0];
    let pubs: Vec<SamplerPub> = omegas
        .iter()
        .map(|&omega| (circuit.clone(), ParameterValues::new().with("omega", omega)).into())
        .collect();

    let sampler = Sampler::new(provider.get_backend("qutip", None)?);
    let result = sampler.run(pubs.clone(), Some(1000)).await?.result().await?;
    for (omega, pub_result) in omegas.iter().zip(result.iter()) {
        let ground = pub_result.counts.get("000");
        info!("omega = {omega:>5.2} rad/µs  P(000) = {:.3}", ground as f64 / 1000.0);
    }

    if provider.remote_config().is_some() {
        let cloud = Sampler::new(provider.get_backend("remote-emu-tn", None)?);
        let job = cloud.run(pubs.into_iter().take(1), Some(100)).await?;
        info!("Submitted cloud batch {:?}", job.job_ids());
        let result = job.result().await?;
        for (bits, count) in result[0].counts.sorted() {
            info!("{bits}: {count}");
        }
    } else {
        info!("No cloud credentials set, skipping the remote run");
    }

    Ok(())
}
