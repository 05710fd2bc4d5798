//! The analog Hamiltonian gate.
//!
//! A [`HamiltonianGate`] drives every atom of its register with one global
//! pulse: an amplitude waveform, a detuning waveform and a phase. It acts
//! on as many qubits as it has atom coordinates.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::parameter::ParameterExpression;
use crate::register::{GridTransform, Register, RegisterTransform};
use crate::waveform::InterpolatePoints;

/// Phase of the driving pulse, in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    Value(f64),
    Expression(ParameterExpression),
    /// Must hold the same value at every point when lowered.
    Waveform(InterpolatePoints),
}

impl Phase {
    fn collect_parameters(&self, set: &mut BTreeSet<String>) {
        match self {
            Phase::Value(_) => {}
            Phase::Expression(expr) => expr.collect_symbols(set),
            // Only the point values survive lowering; the duration is unused.
            Phase::Waveform(points) => points
                .values()
                .iter()
                .for_each(|value| value.collect_symbols(set)),
        }
    }
}

impl From<f64> for Phase {
    fn from(value: f64) -> Self {
        Phase::Value(value)
    }
}

impl From<ParameterExpression> for Phase {
    fn from(expr: ParameterExpression) -> Self {
        match expr.as_f64() {
            Some(value) => Phase::Value(value),
            None => Phase::Expression(expr),
        }
    }
}

impl From<InterpolatePoints> for Phase {
    fn from(points: InterpolatePoints) -> Self {
        Phase::Waveform(points)
    }
}

/// Analog gate made of a global amplitude, detuning and phase.
///
/// ```
/// use pasqal_provider::{GridTransform, HamiltonianGate, InterpolatePoints};
///
/// let amplitude = InterpolatePoints::new([0.0, 2.0, 0.0]).unwrap();
/// let detuning = InterpolatePoints::new([-5.0, 0.0, 5.0]).unwrap();
/// let coords = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];
///
/// let gate = HamiltonianGate::with_transform(
///     amplitude,
///     detuning,
///     0.0,
///     &coords,
///     GridTransform::Triangular,
/// )
/// .unwrap();
/// assert_eq!(gate.name(), "HG");
/// assert_eq!(gate.num_qubits(), 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HamiltonianGate {
    amplitude: InterpolatePoints,
    detuning: InterpolatePoints,
    phase: Phase,
    grid_transform: GridTransform,
    register: Register,
}

impl HamiltonianGate {
    pub const NAME: &'static str = "HG";

    /// Create a gate whose atoms sit at `coords` (µm).
    pub fn new(
        amplitude: InterpolatePoints,
        detuning: InterpolatePoints,
        phase: impl Into<Phase>,
        coords: &[(f64, f64)],
        grid_transform: GridTransform,
    ) -> ProviderResult<Self> {
        Self::build(amplitude, detuning, phase.into(), coords, grid_transform, false)
    }

    /// Create a gate whose `coords` are grid points, mapped to atom
    /// positions by `grid_transform`.
    pub fn with_transform(
        amplitude: InterpolatePoints,
        detuning: InterpolatePoints,
        phase: impl Into<Phase>,
        coords: &[(f64, f64)],
        grid_transform: GridTransform,
    ) -> ProviderResult<Self> {
        Self::build(amplitude, detuning, phase.into(), coords, grid_transform, true)
    }

    fn build(
        amplitude: InterpolatePoints,
        detuning: InterpolatePoints,
        phase: Phase,
        coords: &[(f64, f64)],
        grid_transform: GridTransform,
        transform: bool,
    ) -> ProviderResult<Self> {
        if amplitude.duration() != detuning.duration() {
            return Err(ProviderError::InvalidGate(format!(
                "amplitude and detuning must have the same duration times; \
                 amplitude duration: {}, detuning duration: {}.",
                amplitude.duration(),
                detuning.duration()
            )));
        }
        if amplitude.len() != detuning.len() {
            return Err(ProviderError::InvalidGate(format!(
                "amplitude and detuning must have the same values' length; \
                 amplitude length: {}, detuning length: {}.",
                amplitude.len(),
                detuning.len()
            )));
        }
        if coords.is_empty() {
            return Err(ProviderError::InvalidGate(
                "an analog gate needs at least one atom coordinate".into(),
            ));
        }

        let register = if transform {
            let transformed = RegisterTransform::new(grid_transform, 1.0, Some(coords), None)?;
            Register::from_coordinates(transformed.coords(), "q")?
        } else {
            Register::from_coordinates(coords, "q")?
        };

        Ok(Self {
            amplitude,
            detuning,
            phase,
            grid_transform,
            register,
        })
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn num_qubits(&self) -> usize {
        self.register.len()
    }

    /// Pulse duration, shared by amplitude and detuning.
    pub fn duration(&self) -> &ParameterExpression {
        self.amplitude.duration()
    }

    /// Sorted names of every parameter the gate depends on.
    pub fn params(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        self.amplitude.collect_parameters(&mut set);
        self.detuning.collect_parameters(&mut set);
        self.phase.collect_parameters(&mut set);
        set.into_iter().collect()
    }

    pub fn amplitude(&self) -> &InterpolatePoints {
        &self.amplitude
    }

    pub fn detuning(&self) -> &InterpolatePoints {
        &self.detuning
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn grid_transform(&self) -> GridTransform {
        self.grid_transform
    }

    /// Qubit ids with their (x, y) positions.
    pub fn coords(&self) -> Vec<(&str, [f64; 2])> {
        self.register.qubits()
    }

    /// The atoms this gate drives. Unrelated to circuit qubit registers.
    pub fn analog_register(&self) -> &Register {
        &self.register
    }

    /// Analog gates cannot be raised to a power.
    pub fn power(&self, _exponent: f64) -> ProviderResult<Self> {
        Err(ProviderError::Unsupported(
            "Cannot raise this gate to the power of `exponent`.".into(),
        ))
    }

    /// Analog gates have no unitary matrix form.
    pub fn to_matrix(&self) -> ProviderResult<Vec<Vec<f64>>> {
        Err(ProviderError::Unsupported(
            "HamiltonianGate has no matrix representation.".into(),
        ))
    }

    /// Analog gates cannot be controlled.
    pub fn control(&self, _num_ctrl_qubits: usize) -> ProviderResult<Self> {
        Err(ProviderError::Unsupported(
            "Cannot have a control on an analog gate.".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::parameter;

    const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];

    fn points(values: &[f64]) -> InterpolatePoints {
        InterpolatePoints::new(values.iter().copied()).unwrap()
    }

    #[test]
    fn test_gate_phase_kinds() {
        for phase in [Phase::from(0.0), Phase::from(points(&[0.0, 0.0]))] {
            let gate = HamiltonianGate::new(
                points(&[0.0, 0.0]),
                points(&[0.0, 0.0]),
                phase,
                &SQUARE,
                GridTransform::Triangular,
            )
            .unwrap();
            assert_eq!(gate.num_qubits(), 4);
            assert_eq!(gate.name(), "HG");
        }
    }

    #[test]
    fn test_mismatched_duration() {
        let err = HamiltonianGate::new(
            points(&[0.0, 0.0]).with_duration(1000u32).unwrap(),
            points(&[0.0, 0.0]).with_duration(900u32).unwrap(),
            0.0,
            &SQUARE,
            GridTransform::Triangular,
        )
        .unwrap_err();
        assert!(err.to_string().contains("same duration times"));
    }

    #[test]
    fn test_mismatched_length() {
        let err = HamiltonianGate::new(
            points(&[0.0, 0.0]),
            points(&[0.0, 0.0, 0.0]),
            0.0,
            &SQUARE,
            GridTransform::Triangular,
        )
        .unwrap_err();
        assert!(err.to_string().contains("same values' length"));
    }

    #[test]
    fn test_params_union() {
        let omega = parameter("omega");
        let t = parameter("t");
        let amplitude = InterpolatePoints::new([0.0.into(), omega.clone(), 0.0.into()])
            .unwrap()
            .with_duration(t.clone())
            .unwrap();
        let detuning = InterpolatePoints::new([-1.0, 0.0, 1.0])
            .unwrap()
            .with_duration(t)
            .unwrap();

        let gate = HamiltonianGate::new(
            amplitude,
            detuning,
            parameter("phi") * 0.5,
            &SQUARE,
            GridTransform::Square,
        )
        .unwrap();
        assert_eq!(gate.params(), vec!["omega", "phi", "t"]);
        assert_eq!(gate.duration(), &parameter("t"));
    }

    #[test]
    fn test_phase_waveform_duration_not_a_param() {
        let phase = InterpolatePoints::new([parameter("phi"), parameter("phi")])
            .unwrap()
            .with_duration(parameter("t_phase"))
            .unwrap();
        let gate = HamiltonianGate::new(
            points(&[0.0, 0.0]),
            points(&[0.0, 0.0]),
            phase,
            &SQUARE,
            GridTransform::Square,
        )
        .unwrap();
        assert_eq!(gate.params(), vec!["phi"]);
    }

    #[test]
    fn test_transform_applied() {
        let gate = HamiltonianGate::with_transform(
            points(&[0.0, 0.0]),
            points(&[0.0, 0.0]),
            0.0,
            &SQUARE,
            GridTransform::Square,
        )
        .unwrap();
        let register = gate.analog_register();
        assert!((register.min_distance().unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(gate.coords()[0].0, "q0");
        assert_eq!(gate.grid_transform(), GridTransform::Square);
    }

    #[test]
    fn test_power_and_control_unsupported() {
        let gate = HamiltonianGate::new(
            points(&[0.0, 0.0]),
            points(&[0.0, 0.0]),
            0.0,
            &SQUARE,
            GridTransform::Triangular,
        )
        .unwrap();
        assert!(matches!(gate.power(2.0), Err(ProviderError::Unsupported(_))));
        assert!(matches!(gate.control(1), Err(ProviderError::Unsupported(_))));
        assert!(matches!(gate.to_matrix(), Err(ProviderError::Unsupported(_))));
    }

    #[test]
    fn test_empty_coords() {
        assert!(
            HamiltonianGate::new(
                points(&[0.0, 0.0]),
                points(&[0.0, 0.0]),
                0.0,
                &[],
                GridTransform::Triangular,
            )
            .is_err()
        );
    }
}
