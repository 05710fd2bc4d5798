//! Neutral-atom device specifications.
//!
//! Two devices ship with the crate: [`Device::analog`], a layout-bound analog
//! device, and [`Device::hybrid`], which accepts arbitrary layouts. The
//! Fresnel QPU is only known to the cloud and is fetched at run time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::layout::RegisterLayout;
use crate::register::Register;
use crate::waveform::Waveform;

/// Slack applied to distance checks (µm).
const DISTANCE_SLACK: f64 = 1e-9;

/// Limits of the global Rydberg channel.
///
/// Amplitude and detuning are in rad/µs, durations in ns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RydbergChannel {
    pub max_abs_detuning: f64,
    pub max_amp: f64,
    pub clock_period: u32,
    pub min_duration: u32,
    #[serde(default)]
    pub max_duration: Option<u32>,
}

/// A neutral-atom device.
///
/// Custom devices are built with struct update syntax:
///
/// ```
/// use pasqal_provider::Device;
///
/// let device = Device {
///     name: "MyDevice".into(),
///     max_atom_num: Some(10),
///     ..Device::hybrid()
/// };
/// assert!(device.accepts_new_layouts);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub dimensions: u8,
    pub rydberg_level: u32,
    /// C6 coefficient, rad·µm⁶/µs.
    pub interaction_coeff: f64,
    #[serde(default)]
    pub max_atom_num: Option<usize>,
    #[serde(default)]
    pub max_radial_distance: Option<f64>,
    pub min_atom_distance: f64,
    #[serde(default)]
    pub max_sequence_duration: Option<u32>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub requires_layout: bool,
    #[serde(default = "default_true")]
    pub accepts_new_layouts: bool,
    #[serde(default)]
    pub pre_calibrated_layouts: Vec<RegisterLayout>,
    pub rydberg_global: RydbergChannel,
    /// Mock devices that only exist in emulation.
    #[serde(default)]
    pub is_virtual: bool,
}

fn default_true() -> bool {
    true
}

impl Device {
    /// The layout-bound analog device, "PasqalDevice1".
    pub fn analog() -> Self {
        Self {
            name: "PasqalDevice1".into(),
            dimensions: 2,
            rydberg_level: 60,
            interaction_coeff: 865_723.02,
            max_atom_num: Some(25),
            max_radial_distance: Some(35.0),
            min_atom_distance: 5.0,
            max_sequence_duration: Some(6_000),
            max_runs: Some(2_000),
            requires_layout: true,
            accepts_new_layouts: false,
            pre_calibrated_layouts: vec![RegisterLayout::triangular_lattice(61, 5.0)],
            is_virtual: false,
            rydberg_global: RydbergChannel {
                max_abs_detuning: 2.0 * std::f64::consts::PI * 20.0,
                max_amp: 2.0 * std::f64::consts::PI * 2.0,
                clock_period: 4,
                min_duration: 16,
                max_duration: Some(1 << 26),
            },
        }
    }

    /// The digital-analog device, "HybridDevice". No calibrated layouts;
    /// any layout is accepted.
    pub fn hybrid() -> Self {
        Self {
            name: "HybridDevice".into(),
            dimensions: 2,
            rydberg_level: 70,
            interaction_coeff: 5_420_158.53,
            max_atom_num: Some(100),
            max_radial_distance: Some(50.0),
            min_atom_distance: 4.0,
            max_sequence_duration: None,
            max_runs: None,
            requires_layout: false,
            accepts_new_layouts: true,
            pre_calibrated_layouts: Vec::new(),
            is_virtual: false,
            rydberg_global: RydbergChannel {
                max_abs_detuning: 2.0 * std::f64::consts::PI * 20.0,
                max_amp: 2.0 * std::f64::consts::PI * 10.0,
                clock_period: 4,
                min_duration: 16,
                max_duration: Some(1 << 26),
            },
        }
    }

    /// Whether `layout` is one of the device's pre-calibrated layouts.
    pub fn is_calibrated_layout(&self, layout: &RegisterLayout) -> bool {
        self.pre_calibrated_layouts.iter().any(|l| l.matches(layout))
    }

    /// Distance (µm) under which two atoms driven at `rabi` (rad/µs) block
    /// each other.
    pub fn rydberg_blockade_radius(&self, rabi: f64) -> f64 {
        (self.interaction_coeff / rabi).powf(1.0 / 6.0)
    }

    /// Check that the device can hold `register`.
    pub fn validate_register(&self, register: &Register) -> ProviderResult<()> {
        if register.is_empty() {
            return Err(ProviderError::InvalidRegister(
                "the register has no atoms".into(),
            ));
        }
        if let Some(max) = self.max_atom_num {
            if register.len() > max {
                return Err(ProviderError::InvalidRegister(format!(
                    "{} atoms requested, {} accepts at most {max}",
                    register.len(),
                    self.name
                )));
            }
        }
        if let Some(max) = self.max_radial_distance {
            let radial = register.max_radial_distance();
            if radial > max + DISTANCE_SLACK {
                return Err(ProviderError::InvalidRegister(format!(
                    "an atom sits {radial:.3} µm from the center, {} allows at most {max} µm",
                    self.name
                )));
            }
        }
        if let Some(min) = register.min_distance() {
            if min < self.min_atom_distance - DISTANCE_SLACK {
                return Err(ProviderError::InvalidRegister(format!(
                    "atoms are {min:.3} µm apart, {} needs at least {} µm",
                    self.name, self.min_atom_distance
                )));
            }
        }
        match register.layout() {
            None if self.requires_layout => Err(ProviderError::InvalidLayout(format!(
                "{} requires the register to be defined from a layout",
                self.name
            ))),
            Some(layout) if !self.accepts_new_layouts && !self.is_calibrated_layout(layout) => {
                Err(ProviderError::InvalidLayout(format!(
                    "{} only accepts its pre-calibrated layouts",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }

    /// Check a pulse against the global Rydberg channel.
    pub fn validate_pulse(&self, amplitude: &Waveform, detuning: &Waveform) -> ProviderResult<()> {
        let channel = &self.rydberg_global;
        let duration = amplitude.duration();

        if detuning.duration() != duration {
            return Err(ProviderError::InvalidWaveform(format!(
                "amplitude lasts {duration} ns but detuning lasts {} ns",
                detuning.duration()
            )));
        }
        if duration < channel.min_duration {
            return Err(ProviderError::InvalidWaveform(format!(
                "pulse lasts {duration} ns, the channel needs at least {} ns",
                channel.min_duration
            )));
        }
        if let Some(max) = channel.max_duration {
            if duration > max {
                return Err(ProviderError::InvalidWaveform(format!(
                    "pulse lasts {duration} ns, the channel allows at most {max} ns"
                )));
            }
        }
        if amplitude.min() < 0.0 {
            return Err(ProviderError::InvalidWaveform(
                "amplitude must not be negative".into(),
            ));
        }
        if amplitude.max() > channel.max_amp {
            return Err(ProviderError::InvalidWaveform(format!(
                "amplitude reaches {:.4} rad/µs, the channel allows at most {:.4}",
                amplitude.max(),
                channel.max_amp
            )));
        }
        let peak_detuning = detuning.max().abs().max(detuning.min().abs());
        if peak_detuning > channel.max_abs_detuning {
            return Err(ProviderError::InvalidWaveform(format!(
                "detuning reaches {peak_detuning:.4} rad/µs, the channel allows at most {:.4}",
                channel.max_abs_detuning
            )));
        }
        Ok(())
    }
}

/// Devices known by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// The local analog device.
    Analog,
    /// The local digital-analog device.
    Hybrid,
    /// The Fresnel QPU, described by the cloud.
    Fresnel,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Analog => "analog",
            DeviceType::Hybrid => "hybrid",
            DeviceType::Fresnel => "fresnel",
        }
    }

    /// All device names.
    pub fn list() -> Vec<&'static str> {
        [DeviceType::Analog, DeviceType::Hybrid, DeviceType::Fresnel]
            .iter()
            .map(DeviceType::as_str)
            .collect()
    }

    /// The device spec, for devices that do not live in the cloud.
    pub fn device(&self) -> Option<Device> {
        match self {
            DeviceType::Analog => Some(Device::analog()),
            DeviceType::Hybrid => Some(Device::hybrid()),
            DeviceType::Fresnel => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analog" => Ok(DeviceType::Analog),
            "hybrid" => Ok(DeviceType::Hybrid),
            "fresnel" => Ok(DeviceType::Fresnel),
            other => Err(ProviderError::Configuration(format!(
                "unknown device '{other}', expected one of {:?}",
                DeviceType::list()
            ))),
        }
    }
}

/// Devices available without the cloud, keyed by [`DeviceType`] name.
pub fn available_devices() -> Vec<(&'static str, Device)> {
    [DeviceType::Analog, DeviceType::Hybrid]
        .iter()
        .filter_map(|t| Some((t.as_str(), t.device()?)))
        .collect()
}
