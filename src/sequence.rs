//! Pulse sequences handed to execution engines.
//!
//! A circuit with one analog gate maps onto a [`Sequence`] on the global
//! Rydberg channel: one pulse per gate, with every gate parameter declared
//! as a sequence variable. [`Sequence::build`] binds the variables and
//! checks the pulses against the device, producing a [`BuiltSequence`]
//! that engines sample and the cloud accepts as JSON.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::circuit::QuantumCircuit;
use crate::device::Device;
use crate::error::{ProviderError, ProviderResult};
use crate::gate::Phase;
use crate::layout::RegisterLayout;
use crate::parameter::{ParameterExpression, ParameterValues};
use crate::register::{Atom, Register};
use crate::target::Target;
use crate::waveform::{InterpolatePoints, Waveform};

/// The only channel analog gates are played on.
pub const CHANNEL: &str = "rydberg_global";

/// The analog register of a circuit.
///
/// Every instruction must be an analog gate, and there must be exactly one.
pub fn get_register_from_circuit(circuit: &QuantumCircuit) -> ProviderResult<Register> {
    let mut registers = Vec::new();
    for instruction in circuit.data() {
        match instruction.operation.as_analog() {
            Some(gate) => registers.push(gate.analog_register()),
            None => {
                return Err(ProviderError::InvalidCircuit(
                    "'run_input' argument must only contain analog gate.".into(),
                ));
            }
        }
    }
    match registers.as_slice() {
        [register] => Ok((*register).clone()),
        [] => Err(ProviderError::InvalidCircuit(
            "the circuit contains no analog gate".into(),
        )),
        _ => Err(ProviderError::InvalidCircuit(
            "Pasqal's QPU backend supports only a single analog gate with one coordinates set"
                .into(),
        )),
    }
}

/// A pulse whose waveforms may still reference parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    pub amplitude: InterpolatePoints,
    pub detuning: InterpolatePoints,
    pub phase: ParameterExpression,
}

/// A parametrized pulse sequence on one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    register: Register,
    device: Device,
    pulses: Vec<Pulse>,
    variables: BTreeSet<String>,
}

impl Sequence {
    /// Lower the analog gates of `circuit` onto `register`.
    pub fn generate(
        register: Register,
        device: &Device,
        circuit: &QuantumCircuit,
    ) -> ProviderResult<Self> {
        device.validate_register(&register)?;

        let mut pulses = Vec::with_capacity(circuit.len());
        let mut variables = BTreeSet::new();
        for instruction in circuit.data() {
            let Some(gate) = instruction.operation.as_analog() else {
                return Err(ProviderError::InvalidCircuit(format!(
                    "gate {} has no waveform properties and therefore cannot be used \
                     for analog computing.",
                    instruction.operation.name()
                )));
            };

            let phase = match gate.phase() {
                Phase::Value(v) => ParameterExpression::Constant(*v),
                Phase::Expression(expr) => expr.clone(),
                Phase::Waveform(points) if points.is_constant() => points.values()[0].clone(),
                Phase::Waveform(_) => {
                    return Err(ProviderError::Unsupported(
                        "a phase waveform must hold the same value at every point".into(),
                    ));
                }
            };

            variables.extend(gate.params());
            pulses.push(Pulse {
                amplitude: gate.amplitude().clone(),
                detuning: gate.detuning().clone(),
                phase,
            });
        }

        Ok(Self {
            register,
            device: device.clone(),
            pulses,
            variables,
        })
    }

    /// Lower `circuit` for `target`, placing its register on a layout when
    /// the device needs one or `force_layout` is set.
    pub fn for_target(
        circuit: &QuantumCircuit,
        target: &Target,
        force_layout: bool,
    ) -> ProviderResult<Self> {
        let register = get_register_from_circuit(circuit)?;
        let device = target.device();
        let register = if force_layout || (device.requires_layout && register.layout().is_none())
        {
            match target.layout().embed(&register) {
                Some(placed) => placed,
                None => register.with_automatic_layout(device)?,
            }
        } else {
            register
        };
        Self::generate(register, device, circuit)
    }

    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn channel(&self) -> &'static str {
        CHANNEL
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Names of the variables that must be bound before building.
    pub fn declared_variables(&self) -> Vec<String> {
        self.variables.iter().cloned().collect()
    }

    pub fn is_parametrized(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Bind every declared variable and check the result against the device.
    pub fn build(&self, values: &ParameterValues) -> ProviderResult<BuiltSequence> {
        if let Some(missing) = self.variables.iter().find(|v| values.get(v).is_none()) {
            return Err(ProviderError::UnboundParameter(missing.clone()));
        }
        let unknown: Vec<&String> = values
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !self.variables.contains(*name))
            .collect();
        if !unknown.is_empty() {
            return Err(ProviderError::InvalidCircuit(format!(
                "values given for undeclared parameters {unknown:?}"
            )));
        }

        let mut pulses = Vec::with_capacity(self.pulses.len());
        for pulse in &self.pulses {
            let amplitude = pulse.amplitude.bind(values)?;
            let detuning = pulse.detuning.bind(values)?;
            let phase = pulse.phase.evaluate(values)?;
            if !phase.is_finite() {
                return Err(ProviderError::InvalidWaveform(format!(
                    "phase must be finite, got {phase}"
                )));
            }
            self.device.validate_pulse(&amplitude, &detuning)?;
            pulses.push(BuiltPulse {
                amplitude,
                detuning,
                phase,
            });
        }

        let built = BuiltSequence {
            register: self.register.clone(),
            device: self.device.clone(),
            pulses,
            values: values.clone(),
        };
        if let Some(max) = self.device.max_sequence_duration {
            if built.duration() > u64::from(max) {
                return Err(ProviderError::InvalidWaveform(format!(
                    "sequence lasts {} ns, {} allows at most {max} ns",
                    built.duration(),
                    self.device.name
                )));
            }
        }
        Ok(built)
    }
}

/// A pulse with concrete waveforms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltPulse {
    pub amplitude: Waveform,
    pub detuning: Waveform,
    pub phase: f64,
}

/// A sequence with every variable bound, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSequence {
    register: Register,
    device: Device,
    pulses: Vec<BuiltPulse>,
    values: ParameterValues,
}

#[derive(Serialize)]
struct AbstractRepr<'a> {
    version: &'static str,
    name: &'static str,
    register: &'a [Atom],
    #[serde(skip_serializing_if = "Option::is_none")]
    layout: Option<&'a RegisterLayout>,
    device: &'a Device,
    channels: serde_json::Value,
    variables: &'a ParameterValues,
    operations: Vec<AbstractOperation<'a>>,
    measurement: &'static str,
}

#[derive(Serialize)]
struct AbstractOperation<'a> {
    op: &'static str,
    channel: &'static str,
    protocol: &'static str,
    amplitude: &'a Waveform,
    detuning: &'a Waveform,
    phase: f64,
    post_phase_shift: f64,
}

impl BuiltSequence {
    pub fn register(&self) -> &Register {
        &self.register
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn pulses(&self) -> &[BuiltPulse] {
        &self.pulses
    }

    /// Values the sequence was built with.
    pub fn values(&self) -> &ParameterValues {
        &self.values
    }

    /// Total duration in ns.
    pub fn duration(&self) -> u64 {
        self.pulses
            .iter()
            .map(|p| u64::from(p.amplitude.duration()))
            .sum()
    }

    /// The sequence as a JSON document.
    pub fn to_abstract_repr(&self) -> ProviderResult<serde_json::Value> {
        let repr = AbstractRepr {
            version: "1",
            name: "analog-sequence",
            register: self.register.atoms(),
            layout: self.register.layout(),
            device: &self.device,
            channels: serde_json::json!({ CHANNEL: CHANNEL }),
            variables: &self.values,
            operations: self
                .pulses
                .iter()
                .map(|p| AbstractOperation {
                    op: "pulse",
                    channel: CHANNEL,
                    protocol: "min-delay",
                    amplitude: &p.amplitude,
                    detuning: &p.detuning,
                    phase: p.phase,
                    post_phase_shift: 0.0,
                })
                .collect(),
            measurement: "ground-rydberg",
        };
        serde_json::to_value(repr)
            .map_err(|e| ProviderError::Backend(format!("failed to serialize sequence: {e}")))
    }

    /// [`to_abstract_repr`](Self::to_abstract_repr) as a string.
    pub fn to_json(&self) -> ProviderResult<String> {
        Ok(self.to_abstract_repr()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Operation;
    use crate::device::DeviceType;
    use crate::gate::HamiltonianGate;
    use crate::parameter::parameter;
    use crate::register::GridTransform;

    const SQUARE: [(f64, f64); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)];

    fn analog_circuit(phase: impl Into<Phase>) -> QuantumCircuit {
        let amplitude = InterpolatePoints::new([1.0.into(), parameter("omega"), 1.0.into()]).unwrap();
        let detuning = InterpolatePoints::new([0.0, 0.5, 1.0]).unwrap();
        let gate = HamiltonianGate::with_transform(
            amplitude,
            detuning,
            phase,
            &SQUARE,
            GridTransform::Triangular,
        )
        .unwrap();
        let mut qc = QuantumCircuit::new(4);
        qc.append(gate, &[0, 1, 2, 3]).unwrap();
        qc
    }

    #[test]
    fn test_register_from_circuit() {
        let qc = analog_circuit(0.0);
        let register = get_register_from_circuit(&qc).unwrap();
        assert_eq!(register.len(), 4);
    }

    #[test]
    fn test_register_rejects_digital_gates() {
        let mut qc = analog_circuit(0.0);
        qc.append(Operation::gate("h", 1), &[0]).unwrap();
        let err = get_register_from_circuit(&qc).unwrap_err();
        assert!(err.to_string().contains("must only contain analog gate"));
    }

    #[test]
    fn test_register_rejects_two_gates() {
        let mut qc = analog_circuit(0.0);
        let second = qc.data()[0].operation.clone();
        qc.append(second, &[0, 1, 2, 3]).unwrap();
        let err = get_register_from_circuit(&qc).unwrap_err();
        assert!(err.to_string().contains("single analog gate"));
    }

    #[test]
    fn test_generate_and_build() {
        let target = Target::from_type(DeviceType::Analog, None).unwrap();
        let qc = analog_circuit(parameter("phi"));
        let seq = Sequence::for_target(&qc, &target, false).unwrap();

        assert_eq!(seq.declared_variables(), vec!["omega", "phi"]);
        assert!(seq.register().layout().is_some());
        assert_eq!(seq.channel(), "rydberg_global");

        let values = ParameterValues::from_pairs([("omega", 2.0), ("phi", 0.25)]);
        let built = seq.build(&values).unwrap();
        assert_eq!(built.duration(), 1000);
        assert!((built.pulses()[0].phase - 0.25).abs() < 1e-12);

        assert!(matches!(
            seq.build(&ParameterValues::new().with("omega", 1.0)),
            Err(ProviderError::UnboundParameter(name)) if name == "phi"
        ));
        assert!(seq.build(&values.clone().with("extra", 1.0)).is_err());
    }

    #[test]
    fn test_build_checks_device_limits() {
        let target = Target::default();
        let qc = analog_circuit(0.0);
        let seq = Sequence::for_target(&qc, &target, false).unwrap();
        let too_strong = ParameterValues::new().with("omega", 100.0);
        assert!(matches!(
            seq.build(&too_strong),
            Err(ProviderError::InvalidWaveform(_))
        ));
    }

    #[test]
    fn test_build_rejects_non_finite_values() {
        let seq = Sequence::for_target(&analog_circuit(0.0), &Target::default(), false).unwrap();
        for omega in [f64::NAN, f64::INFINITY] {
            let err = seq
                .build(&ParameterValues::new().with("omega", omega))
                .unwrap_err();
            assert!(
                matches!(&err, ProviderError::InvalidWaveform(msg) if msg.contains("must be finite")),
                "{err}"
            );
        }

        let qc = analog_circuit(parameter("phi"));
        let seq = Sequence::for_target(&qc, &Target::default(), false).unwrap();
        let values = ParameterValues::from_pairs([("omega", 1.0), ("phi", f64::NAN)]);
        assert!(matches!(
            seq.build(&values),
            Err(ProviderError::InvalidWaveform(msg)) if msg.contains("phase must be finite")
        ));
    }

    #[test]
    fn test_varying_phase_waveform_unsupported() {
        let target = Target::default();
        let phase = InterpolatePoints::new([0.0, 1.0, 0.0]).unwrap();
        let qc = analog_circuit(phase);
        assert!(matches!(
            Sequence::for_target(&qc, &target, false),
            Err(ProviderError::Unsupported(_))
        ));

        let flat = InterpolatePoints::new([0.5, 0.5, 0.5]).unwrap();
        let seq = Sequence::for_target(&analog_circuit(flat), &target, false).unwrap();
        assert_eq!(seq.pulses()[0].phase, ParameterExpression::Constant(0.5));
    }

    #[test]
    fn test_abstract_repr() {
        let target = Target::default();
        let seq = Sequence::for_target(&analog_circuit(0.0), &target, true).unwrap();
        let built = seq.build(&ParameterValues::new().with("omega", 1.0)).unwrap();

        let repr = built.to_abstract_repr().unwrap();
        assert_eq!(repr["register"].as_array().unwrap().len(), 4);
        assert_eq!(repr["register"][0]["name"], "q0");
        assert_eq!(repr["channels"]["rydberg_global"], "rydberg_global");
        assert_eq!(repr["operations"][0]["op"], "pulse");
        assert_eq!(repr["operations"][0]["amplitude"]["kind"], "interpolated");
        assert_eq!(repr["operations"][0]["amplitude"]["duration"], 1000);
        assert_eq!(repr["variables"]["omega"], 1.0);
        assert!(repr["layout"]["coordinates"].is_array());
        assert!(built.to_json().unwrap().starts_with('{'));
    }
}
