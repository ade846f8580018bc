use itertools::Itertools;

use crate::circuit::{Circuit, EdgeId, GateId, GateLogic, GateType, Point};
use crate::error::CircuitError;
use crate::logic::builder::GateTemplate;
use crate::logic::TickContext;

/// Gates captured by a packed gate, together with its port mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedCircuit {
    // evaluation order inside the packed gate
    pub gates: Vec<GateId>,
    // circuit input gate behind each input port
    pub inputs: Vec<GateId>,
    // circuit output gate behind each output port
    pub outputs: Vec<GateId>,
}

/// Result of unpacking: the restored gates and every edge touching them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub gates: Vec<GateId>,
    pub edges: Vec<EdgeId>,
}

impl GateTemplate {
    pub fn packed(inputs: Vec<String>, outputs: Vec<String>, packed: PackedCircuit) -> Self {
        Self {
            builder: "Packed".to_string(),
            name: "Packed".to_string(),
            info: format!("{} gates", packed.gates.len()),
            inputs,
            outputs,
            gate_type: GateType::Plain,
            logic: GateLogic::Packed(packed),
            args: Vec::new(),
        }
    }
}

impl Circuit {
    /// Replaces the given gates with a single packed gate appended to the
    /// gate list. Its input ports are named after the captured circuit input
    /// gates and its output ports after the captured circuit output gates.
    pub fn pack(&mut self, gates: &[GateId]) -> eyre::Result<GateId> {
        if let Some(id) = gates.iter().duplicates().next() {
            eyre::bail!(CircuitError::invalid(format!("gate {id} selected twice")));
        }

        for id in gates {
            if !self.is_attached(*id) {
                eyre::bail!(CircuitError::invalid(format!(
                    "gate {id} is not an active gate"
                )));
            }
        }

        let interface = |gate_type: GateType| -> eyre::Result<Vec<GateId>> {
            let mut ids = Vec::new();
            for id in gates {
                if self.gate(*id)?.gate_type == gate_type {
                    ids.push(*id);
                }
            }
            Ok(ids)
        };

        let inputs = interface(GateType::CircuitInput)?;
        let outputs = interface(GateType::CircuitOutput)?;

        if inputs.is_empty() && outputs.is_empty() {
            eyre::bail!(CircuitError::EmptyInterface);
        }

        // a packed gate reaches the outside only through its ports
        for id in gates {
            for edge in self.edges_of(*id)? {
                let edge = self.wiring.edge(edge)?;
                for connector in [Some(edge.start), edge.end].into_iter().flatten() {
                    let owner = self.wiring.connector(connector)?.gate;
                    if !gates.contains(&owner) {
                        eyre::bail!(CircuitError::invalid(format!(
                            "gate {id} is wired to {owner} outside the selection, \
                             disconnect it before packing"
                        )));
                    }
                }
            }
        }

        let port_names = |ids: &[GateId]| -> eyre::Result<Vec<String>> {
            ids.iter().map(|id| Ok(self.gate(*id)?.name.clone())).collect()
        };

        let template = GateTemplate::packed(
            port_names(&inputs)?,
            port_names(&outputs)?,
            PackedCircuit {
                gates: gates.to_vec(),
                inputs,
                outputs,
            },
        );

        let positions = gates.iter().filter_map(|id| self.position(*id)).collect_vec();

        // fails on duplicated port names before anything is detached
        let packed = self.insert_gate(template)?;

        for id in gates {
            self.detach(*id)?;
            self.gate_mut(*id)?.packed_in = Some(packed);
            self.seal_gate(*id, true)?;
        }
        self.order.push(packed);

        if !positions.is_empty() {
            let count = positions.len() as f64;
            let x = positions.iter().map(|point| point.x).sum::<f64>() / count;
            let y = positions.iter().map(|point| point.y).sum::<f64>() / count;
            self.set_position(packed, Point::new(x, y))?;
        }

        tracing::info!("packed {} gates into {packed}", gates.len());

        Ok(packed)
    }

    /// Packs every active gate.
    pub fn pack_all(&mut self) -> eyre::Result<GateId> {
        let gates = self.order.clone();
        self.pack(&gates)
    }

    /// Restores the gates captured by a packed gate at its place in the gate
    /// list and removes the packed gate together with its own edges.
    pub fn unpack(&mut self, id: GateId) -> eyre::Result<Unpacked> {
        if !self.contains(id) {
            eyre::bail!(CircuitError::invalid(format!(
                "gate {id} does not exist, it may have been unpacked already"
            )));
        }

        let gate = self.gate(id)?;
        let Some(packed) = gate.logic.as_packed().cloned() else {
            eyre::bail!(CircuitError::invalid(format!("gate {id} is not a packed gate")));
        };

        if let Some(owner) = gate.packed_in {
            eyre::bail!(CircuitError::invalid(format!(
                "gate {id} is packed in {owner}, unpack that first"
            )));
        }

        let index = self
            .order
            .iter()
            .position(|gate| *gate == id)
            .unwrap_or(self.order.len());

        self.order.retain(|gate| *gate != id);
        self.layout.remove(&id);

        if let Some(gate) = self.gates.remove(&id) {
            for connector in gate.inputs.ids().iter().chain(gate.outputs.ids()) {
                self.wiring.remove_connector(*connector)?;
            }
        }

        for captured in &packed.gates {
            self.gate_mut(*captured)?.packed_in = None;
            self.seal_gate(*captured, false)?;
        }
        self.order
            .splice(index..index, packed.gates.iter().copied());

        let mut edges = Vec::new();
        for captured in &packed.gates {
            edges.extend(self.edges_of(*captured)?);
        }
        let edges = edges.into_iter().sorted().dedup().collect_vec();

        tracing::info!("unpacked {id} into {} gates", packed.gates.len());

        Ok(Unpacked {
            gates: packed.gates,
            edges,
        })
    }

    // captured gates keep their inner edges but take no new ones
    fn seal_gate(&mut self, id: GateId, sealed: bool) -> eyre::Result<()> {
        let gate = self.gate(id)?;
        let connectors = gate.inputs.ids().iter().chain(gate.outputs.ids()).copied().collect_vec();

        for connector in connectors {
            self.wiring.seal(connector, sealed)?;
        }
        Ok(())
    }

    pub(crate) fn run_packed(
        &mut self,
        packed: &PackedCircuit,
        inputs: &[bool],
        outputs: &mut [bool],
        ctx: &TickContext,
    ) -> eyre::Result<()> {
        if inputs.len() != packed.inputs.len() {
            eyre::bail!(CircuitError::ArityMismatch {
                expected: packed.inputs.len(),
                actual: inputs.len(),
            });
        }

        if outputs.len() != packed.outputs.len() {
            eyre::bail!(CircuitError::ArityMismatch {
                expected: packed.outputs.len(),
                actual: outputs.len(),
            });
        }

        for (gate, value) in packed.inputs.iter().zip(inputs) {
            self.force(*gate, 0, *value)?;
        }

        for gate in &packed.gates {
            self.run_gate(*gate, ctx)?;
        }

        for (gate, value) in packed.outputs.iter().zip(outputs.iter_mut()) {
            *value = self.read_input(*gate, 0)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use itertools::{iproduct, Itertools};

    use crate::circuit::{Circuit, GateId, Point};
    use crate::error::CircuitError;
    use crate::logic::builder::GateRegistry;
    use crate::utils::Verify;

    struct HalfAdder {
        circuit: Circuit,
        gates: Vec<GateId>,
    }

    fn half_adder(registry: &GateRegistry) -> eyre::Result<HalfAdder> {
        let mut circuit = Circuit::default();

        let a = circuit.build_gate(registry, "Input", &[])?;
        let b = circuit.build_gate(registry, "Input", &[])?;
        let xor = circuit.build_gate(registry, "Xor", &[])?;
        let and = circuit.build_gate(registry, "And", &[])?;
        let sum = circuit.build_gate(registry, "Output", &[])?;
        let carry = circuit.build_gate(registry, "Output", &[])?;

        circuit.connect(a, 0, xor, 0)?;
        circuit.connect(b, 0, xor, 1)?;
        circuit.connect(a, 0, and, 0)?;
        circuit.connect(b, 0, and, 1)?;
        circuit.connect(xor, 0, sum, 0)?;
        circuit.connect(and, 0, carry, 0)?;

        Ok(HalfAdder {
            circuit,
            gates: vec![a, b, xor, and, sum, carry],
        })
    }

    fn connection_pairs(circuit: &Circuit) -> Vec<(usize, usize)> {
        circuit
            .wiring()
            .edges()
            .filter_map(|(_, edge)| Some((edge.start.0, edge.end?.0)))
            .sorted()
            .collect()
    }

    #[test]
    fn unittest_pack_empty_interface() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();

        let and = circuit.build_gate(&registry, "And", &[])?;
        let not = circuit.build_gate(&registry, "Not", &[])?;
        circuit.connect(and, 0, not, 0)?;

        let err = circuit.pack(&[and, not]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CircuitError>(),
            Some(&CircuitError::EmptyInterface)
        );

        assert_eq!(circuit.order(), &[and, not]);
        assert_eq!(circuit.len(), 2);
        assert!(circuit.gates().all(|gate| gate.packed_in().is_none()));
        circuit.verify()
    }

    #[test]
    fn unittest_pack_half_adder() -> eyre::Result<()> {
        let registry = GateRegistry::default();

        for (a, b) in iproduct!([false, true], [false, true]) {
            let HalfAdder { mut circuit, .. } = half_adder(&registry)?;
            let packed = circuit.pack_all()?;

            let gate = circuit.gate(packed)?;
            assert_eq!(gate.name, "Packed");
            assert_eq!(gate.inputs.names(circuit.wiring())?, vec!["In A", "In B"]);
            assert_eq!(gate.outputs.names(circuit.wiring())?, vec!["Out Q", "Out R"]);
            assert_eq!(circuit.order(), &[packed]);

            let sa = circuit.build_gate(&registry, "Switch", &[a.into()])?;
            let sb = circuit.build_gate(&registry, "Switch", &[b.into()])?;
            circuit.connect(sa, 0, packed, 0)?;
            circuit.connect(sb, 0, packed, 1)?;

            circuit.settle(8)?;
            assert_eq!(circuit.read_output(packed, 0)?, a != b, "sum {a} {b}");
            assert_eq!(circuit.read_output(packed, 1)?, a && b, "carry {a} {b}");
            circuit.verify()?;
        }

        Ok(())
    }

    #[test]
    fn unittest_pack_unpack_round_trip() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let HalfAdder { mut circuit, gates } = half_adder(&registry)?;
        circuit.set_position(gates[0], Point::new(0.0, 0.0))?;
        circuit.set_position(gates[1], Point::new(10.0, 20.0))?;

        let before = connection_pairs(&circuit);
        let packed = circuit.pack(&gates)?;
        assert_eq!(circuit.position(packed), Some(Point::new(5.0, 10.0)));

        let err = circuit.dispose(gates[2]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CircuitError>(),
            Some(CircuitError::InvalidOperation { .. })
        ));

        let source = circuit.build_gate(&registry, "True", &[])?;
        circuit.connect(source, 0, packed, 0)?;

        let unpacked = circuit.unpack(packed)?;
        assert_eq!(unpacked.gates, gates);
        assert_eq!(unpacked.edges.len(), 6);
        assert_eq!(connection_pairs(&circuit), before);
        assert!(circuit.edges_of(source)?.is_empty());

        let mut expected = gates.clone();
        expected.push(source);
        assert_eq!(circuit.order(), expected.as_slice());

        for id in [packed, gates[2]] {
            let err = circuit.unpack(id).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<CircuitError>(),
                Some(CircuitError::InvalidOperation { .. })
            ));
        }

        circuit.verify()
    }

    #[test]
    fn unittest_pack_dispose_takes_captured_gates() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let HalfAdder { mut circuit, gates } = half_adder(&registry)?;

        let source = circuit.build_gate(&registry, "True", &[])?;
        let packed = circuit.pack(&gates)?;
        circuit.connect(source, 0, packed, 1)?;

        let disposed = circuit.dispose(packed)?;
        assert_eq!(disposed.len(), 7);

        assert_eq!(circuit.order(), &[source]);
        circuit.dispose(source)?;

        assert!(circuit.is_empty());
        assert!(!circuit.contains(packed));
        assert!(gates.iter().all(|id| !circuit.contains(*id)));
        assert_eq!(circuit.wiring().edges().count(), 0);

        Ok(())
    }

    #[test]
    fn unittest_pack_rejects_crossing_edges() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let HalfAdder { mut circuit, gates } = half_adder(&registry)?;

        let lamp = circuit.build_gate(&registry, "Lamp", &[])?;
        circuit.connect(gates[2], 0, lamp, 0)?;
        let before = connection_pairs(&circuit);

        let err = circuit.pack(&gates).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CircuitError>(),
            Some(CircuitError::InvalidOperation { .. })
        ));

        assert_eq!(circuit.len(), 7);
        assert_eq!(connection_pairs(&circuit), before);
        assert!(circuit.gates().all(|gate| gate.packed_in().is_none()));
        circuit.verify()?;

        circuit.dispose(lamp)?;
        circuit.pack(&gates)?;
        circuit.verify()
    }

    #[test]
    fn unittest_pack_seals_captured_gates() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();

        let input = circuit.build_gate(&registry, "Input", &[])?;
        let not = circuit.build_gate(&registry, "Not", &[])?;
        let output = circuit.build_gate(&registry, "Output", &[])?;
        circuit.connect(input, 0, not, 0)?;
        circuit.connect(not, 0, output, 0)?;
        let source = circuit.build_gate(&registry, "True", &[])?;

        let packed = circuit.pack(&[input, not, output])?;
        let inner = circuit.edges_of(not)?;
        assert_eq!(inner.len(), 2);

        for err in [
            circuit.connect(source, 0, not, 0).unwrap_err(),
            circuit.connect(not, 0, packed, 0).unwrap_err(),
        ] {
            assert!(matches!(
                err.downcast_ref::<CircuitError>(),
                Some(CircuitError::InvalidOperation { .. })
            ));
        }
        assert_eq!(circuit.edges_of(not)?, inner);
        assert!(circuit.wiring().pending_edges().is_empty());

        circuit.connect(source, 0, packed, 0)?;
        circuit.settle(8)?;
        assert!(!circuit.read_output(packed, 0)?);

        circuit.unpack(packed)?;
        circuit.connect(source, 0, not, 0)?;
        circuit.verify()
    }
}
