//! Backend capability introspection.
//!
//! [`Capabilities`] summarizes what a backend can run: how many atoms, how
//! many shots, which operations, and the limits of the global Rydberg
//! channel. They are derived from the backend's [`Target`] when the
//! backend is built, so reading them never needs I/O.

use serde::{Deserialize, Serialize};

use crate::gate::HamiltonianGate;
use crate::target::Target;

/// Hardware capabilities of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the backend.
    pub name: String,
    /// Name of the device the backend runs on.
    pub device: String,
    /// Maximum number of atoms in one register.
    pub num_qubits: u32,
    /// Maximum shots per job, if the device caps them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_shots: Option<u32>,
    /// Whether this is an emulator (not real hardware).
    pub is_simulator: bool,
    /// Operations accepted in circuits.
    pub operations: Vec<String>,
    /// Limits of the global Rydberg channel.
    pub channel: ChannelLimits,
    /// Minimum distance between two atoms (µm).
    pub min_atom_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_radial_distance: Option<f64>,
    /// Slug of the layout selected for the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

/// Pulse limits on the global Rydberg channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLimits {
    /// rad/µs
    pub max_amplitude: f64,
    /// rad/µs
    pub max_abs_detuning: f64,
    /// ns
    pub min_duration: u32,
    /// ns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    /// Longest whole sequence, in ns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sequence_duration: Option<u32>,
}

impl Capabilities {
    /// Capabilities of a backend named `name` running on `target`.
    pub fn from_target(name: impl Into<String>, target: &Target, is_simulator: bool) -> Self {
        let device = target.device();
        let channel = &device.rydberg_global;
        Self {
            name: name.into(),
            device: device.name.clone(),
            num_qubits: u32::try_from(target.num_qubits()).unwrap_or(u32::MAX),
            max_shots: device.max_runs,
            is_simulator,
            operations: vec![HamiltonianGate::NAME.into()],
            channel: ChannelLimits {
                max_amplitude: channel.max_amp,
                max_abs_detuning: channel.max_abs_detuning,
                min_duration: channel.min_duration,
                max_duration: channel.max_duration,
                max_sequence_duration: device.max_sequence_duration,
            },
            min_atom_distance: device.min_atom_distance,
            max_radial_distance: device.max_radial_distance,
            layout: target.layout().slug().map(str::to_string),
            features: if device.is_virtual {
                vec!["virtual-device".into()]
            } else {
                Vec::new()
            },
        }
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    /// Whether `operation` may appear in circuits sent to this backend.
    pub fn supports(&self, operation: &str) -> bool {
        self.operations.iter().any(|op| op == operation)
    }

    /// Whether `shots` is within the shot limit.
    pub fn accepts_shots(&self, shots: u32) -> bool {
        shots > 0 && self.max_shots.is_none_or(|max| shots <= max)
    }
}
