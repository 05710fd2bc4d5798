//! A minimal quantum circuit holding analog gates.
//!
//! Only analog gates can be executed, but circuits may also record named
//! digital gates so that such circuits can be rejected with a clear error.

use std::collections::BTreeSet;

use crate::error::{ProviderError, ProviderResult};
use crate::gate::HamiltonianGate;

/// An operation placed in a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Analog(Box<HamiltonianGate>),
    /// A named digital gate, e.g. `h` or `cx`.
    Gate { name: String, num_qubits: usize },
}

impl Operation {
    /// A named digital gate.
    pub fn gate(name: impl Into<String>, num_qubits: usize) -> Self {
        Operation::Gate {
            name: name.into(),
            num_qubits,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Operation::Analog(gate) => gate.name(),
            Operation::Gate { name, .. } => name,
        }
    }

    pub fn num_qubits(&self) -> usize {
        match self {
            Operation::Analog(gate) => gate.num_qubits(),
            Operation::Gate { num_qubits, .. } => *num_qubits,
        }
    }

    pub fn as_analog(&self) -> Option<&HamiltonianGate> {
        match self {
            Operation::Analog(gate) => Some(gate),
            Operation::Gate { .. } => None,
        }
    }
}

impl From<HamiltonianGate> for Operation {
    fn from(gate: HamiltonianGate) -> Self {
        Operation::Analog(Box::new(gate))
    }
}

/// An operation and the circuit qubits it acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitInstruction {
    pub operation: Operation,
    pub qubits: Vec<usize>,
}

/// An ordered list of instructions over a fixed number of qubits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuantumCircuit {
    num_qubits: usize,
    data: Vec<CircuitInstruction>,
}

impl QuantumCircuit {
    pub fn new(num_qubits: usize) -> Self {
        Self {
            num_qubits,
            data: Vec::new(),
        }
    }

    /// Append `operation` on `qubits`.
    pub fn append(
        &mut self,
        operation: impl Into<Operation>,
        qubits: &[usize],
    ) -> ProviderResult<&mut Self> {
        let operation = operation.into();
        if qubits.len() != operation.num_qubits() {
            return Err(ProviderError::InvalidCircuit(format!(
                "{} acts on {} qubits, {} given",
                operation.name(),
                operation.num_qubits(),
                qubits.len()
            )));
        }
        for (i, &q) in qubits.iter().enumerate() {
            if q >= self.num_qubits {
                return Err(ProviderError::InvalidCircuit(format!(
                    "qubit {q} is out of range for a circuit of {} qubits",
                    self.num_qubits
                )));
            }
            if qubits[..i].contains(&q) {
                return Err(ProviderError::InvalidCircuit(format!(
                    "qubit {q} is used twice by {}",
                    operation.name()
                )));
            }
        }
        self.data.push(CircuitInstruction {
            operation,
            qubits: qubits.to_vec(),
        });
        Ok(self)
    }

    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    pub fn data(&self) -> &[CircuitInstruction] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Analog gates in circuit order.
    pub fn analog_gates(&self) -> impl Iterator<Item = &HamiltonianGate> {
        self.data.iter().filter_map(|i| i.operation.as_analog())
    }

    /// Sorted names of every parameter used by the circuit.
    pub fn parameters(&self) -> Vec<String> {
        let set: BTreeSet<String> = self.analog_gates().flat_map(|g| g.params()).collect();
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::parameter;
    use crate::register::GridTransform;
    use crate::waveform::InterpolatePoints;

    fn gate(n: usize) -> HamiltonianGate {
        let coords: Vec<(f64, f64)> = (0..n).map(|i| (i as f64 * 6.0, 0.0)).collect();
        HamiltonianGate::new(
            InterpolatePoints::new([0.0.into(), parameter("omega")]).unwrap(),
            InterpolatePoints::new([0.0, 0.0]).unwrap(),
            0.0,
            &coords,
            GridTransform::Square,
        )
        .unwrap()
    }

    #[test]
    fn test_append_analog_gate() {
        let mut qc = QuantumCircuit::new(3);
        qc.append(gate(3), &[0, 1, 2]).unwrap();

        assert_eq!(qc.len(), 1);
        assert_eq!(qc.analog_gates().count(), 1);
        assert_eq!(qc.parameters(), vec!["omega"]);
    }

    #[test]
    fn test_append_checks_qubits() {
        let mut qc = QuantumCircuit::new(2);
        assert!(qc.append(gate(3), &[0, 1, 2]).is_err());
        assert!(qc.append(gate(2), &[0]).is_err());
        assert!(qc.append(gate(2), &[1, 1]).is_err());
        assert!(qc.append(Operation::gate("h", 1), &[0]).is_ok());
        assert_eq!(qc.analog_gates().count(), 0);
    }
}
