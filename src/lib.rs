//! Pasqal provider: analog neutral-atom circuits on local engines and the
//! Pasqal cloud.
//!
//! A circuit carries a single [`HamiltonianGate`]: global amplitude and
//! detuning waveforms, a phase, and the coordinates of the atoms it drives.
//! A [`PasqalProvider`] hands out [`Backend`]s by name, and a [`Sampler`]
//! runs circuits on them and collects [`Counts`].
//!
//! # Overview
//!
//! - [`HamiltonianGate`], [`InterpolatePoints`] and [`GridTransform`] describe
//!   the analog evolution
//! - [`Device`], [`RegisterLayout`] and [`Target`] describe the hardware
//! - [`Sequence`] lowers a circuit onto a target; [`BuiltSequence`] is the
//!   bound result sent to engines
//! - [`LocalBackend`] runs on an [`Emulator`]; [`RemoteBackend`] runs in the
//!   cloud through a [`CloudClient`]
//! - [`ProviderError`] categorizes every failure
//!
//! # Example
//!
//! ```
//! use pasqal_provider::{
//!     GridTransform, HamiltonianGate, InterpolatePoints, ParameterValues, QuantumCircuit,
//!     Sequence, Target, parameter,
//! };
//!
//! let amplitude = InterpolatePoints::new([0.0.into(), parameter("omega"), 0.0.into()])?;
//! let detuning = InterpolatePoints::new([-5.0, 0.0, 5.0])?;
//! let coords = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
//! let gate = HamiltonianGate::with_transform(
//!     amplitude,
//!     detuning,
//!     0.0,
//!     &coords,
//!     GridTransform::Triangular,
//! )?;
//!
//! let mut circuit = QuantumCircuit::new(3);
//! circuit.append(gate, &[0, 1, 2])?;
//!
//! let sequence = Sequence::for_target(&circuit, &Target::default(), false)?;
//! assert_eq!(sequence.declared_variables(), vec!["omega".to_string()]);
//!
//! let built = sequence.build(&ParameterValues::new().with("omega", 2.0))?;
//! assert_eq!(built.register().len(), 3);
//! # Ok::<(), pasqal_provider::ProviderError>(())
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   get_backend() ──→ validate() ──→ submit() ──→ status() ──→ result()
//!     (sync)          (async)        (async)      (async)      (async)
//! ```

pub mod backend;
pub mod capability;
pub mod circuit;
pub mod config;
pub mod device;
pub mod error;
pub mod gate;
pub mod job;
pub mod layout;
pub mod local;
pub mod parameter;
pub mod provider;
pub mod register;
pub mod remote;
pub mod result;
pub mod sampler;
pub mod sequence;
pub mod target;
pub mod waveform;

pub use backend::{
    Backend, BackendAvailability, BackendType, PollPolicy, ValidationResult, validate_circuit,
};
pub use capability::{Capabilities, ChannelLimits};
pub use circuit::{CircuitInstruction, Operation, QuantumCircuit};
pub use config::{Auth0Config, Endpoints, ProviderOptions, RemoteConfig};
pub use device::{Device, DeviceType, RydbergChannel, available_devices};
pub use error::{ProviderError, ProviderResult};
pub use gate::{HamiltonianGate, Phase};
pub use job::{Job, JobId, JobStatus};
pub use layout::RegisterLayout;
pub use local::{Emulator, JobInfo, LocalBackend};
pub use parameter::{ParameterExpression, ParameterValues, parameter};
pub use provider::PasqalProvider;
pub use register::{Atom, GridTransform, Register, RegisterTransform};
pub use remote::{CloudClient, CloudError, RemoteBackend};
pub use result::{Counts, ExecutionResult, SamplerPubResult, SamplerResult};
pub use sampler::{Sampler, SamplerJob, SamplerPub};
pub use sequence::{BuiltPulse, BuiltSequence, Pulse, Sequence};
pub use target::Target;
pub use waveform::{InterpolatePoints, Interpolator, Waveform};
