use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use eyre::{ContextCompat, WrapErr};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::circuit::{Circuit, EdgeId, GateId, GateLogic, Point};
use crate::error::CircuitError;
use crate::logic::builder::GateRegistry;
use crate::transform::pack::PackedCircuit;
use crate::utils::Verify;

use self::connection::ConnectionSpec;

pub mod connection;
pub mod predefined;
pub mod text;

/// Declaration type of a packed gate. Its single argument is the nested
/// blueprint of the captured gates.
pub const PACKED: &str = "Packed";

/// A declarative description of a circuit: gate declarations keyed by local
/// id, optional layout positions and `SOURCE[:PORT] to TARGET[:PORT]`
/// connection strings. Declaration order is kept and becomes the gate order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Blueprint {
    pub declaration: IndexMap<String, GateSpec>,
    pub positions: IndexMap<String, Point>,
    pub connections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GateSpec {
    Name(String),
    Full {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Value>,
    },
}

impl GateSpec {
    pub fn new(type_name: &str, args: Vec<Value>) -> Self {
        if args.is_empty() {
            GateSpec::Name(type_name.to_string())
        } else {
            GateSpec::Full {
                type_name: type_name.to_string(),
                args,
            }
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            GateSpec::Name(name) => name,
            GateSpec::Full { type_name, .. } => type_name,
        }
    }

    pub fn args(&self) -> &[Value] {
        match self {
            GateSpec::Name(_) => &[],
            GateSpec::Full { args, .. } => args,
        }
    }
}

/// Materializes a blueprint and returns its gates in declaration order.
pub fn parse_blueprint(
    circuit: &mut Circuit,
    registry: &GateRegistry,
    blueprint: &Blueprint,
) -> eyre::Result<Vec<GateId>> {
    Ok(blueprint.instantiate(circuit, registry)?.into_values().collect())
}

impl Blueprint {
    /// Creates every declared gate, applies positions and connects every
    /// edge. Nothing is left behind when any step fails.
    pub fn instantiate(
        &self,
        circuit: &mut Circuit,
        registry: &GateRegistry,
    ) -> eyre::Result<IndexMap<String, GateId>> {
        self.verify()?;

        let connections = self
            .connections
            .iter()
            .map(|connection| connection.parse::<ConnectionSpec>())
            .collect::<eyre::Result<Vec<_>>>()?;

        let mut gates = IndexMap::new();

        if let Err(err) = self.populate(circuit, registry, &connections, &mut gates) {
            rollback(circuit, gates.values().copied());
            return Err(err);
        }

        tracing::info!(
            "instantiated blueprint with {} gates and {} connections",
            gates.len(),
            connections.len()
        );

        Ok(gates)
    }

    fn populate(
        &self,
        circuit: &mut Circuit,
        registry: &GateRegistry,
        connections: &[ConnectionSpec],
        gates: &mut IndexMap<String, GateId>,
    ) -> eyre::Result<()> {
        for (local, spec) in &self.declaration {
            let id = if spec.type_name() == PACKED && !registry.contains(PACKED) {
                instantiate_packed(circuit, registry, spec.args())?
            } else {
                circuit.build_gate(registry, spec.type_name(), spec.args())?
            };

            tracing::debug!("`{local}` is {id}");
            gates.insert(local.clone(), id);
        }

        for (local, point) in &self.positions {
            let id = gates
                .get(local)
                .with_context(|| format!("`{local}` was not created"))?;
            circuit.set_position(*id, *point)?;
        }

        for connection in connections {
            let start = connection.resolve_source(circuit, gates)?;
            let end = connection.resolve_target(circuit, gates)?;
            circuit.wiring_mut().connect(start, end)?;
        }

        Ok(())
    }

    /// Describes the given gates and every connected edge between them.
    pub fn create(circuit: &Circuit, gates: &[GateId]) -> eyre::Result<Self> {
        let members = gates.iter().copied().collect::<HashSet<_>>();

        let mut edges = Vec::new();
        for (id, edge) in circuit.wiring().edges() {
            let end = edge.end.with_context(|| format!("edge {id} is pending"))?;
            let start_gate = circuit.wiring().connector(edge.start)?.gate;
            let end_gate = circuit.wiring().connector(end)?.gate;

            if members.contains(&start_gate) && members.contains(&end_gate) {
                edges.push(id);
            }
        }

        Self::create_with_edges(circuit, gates, &edges)
    }

    /// Describes the given gates and edges. Every edge must join two of the
    /// given gates.
    pub fn create_with_edges(
        circuit: &Circuit,
        gates: &[GateId],
        edges: &[EdgeId],
    ) -> eyre::Result<Self> {
        if let Some(id) = gates.iter().duplicates().next() {
            eyre::bail!(CircuitError::invalid(format!("gate {id} listed twice")));
        }

        let mut blueprint = Blueprint::default();
        let mut local_ids = HashMap::new();
        let mut counters = HashMap::new();

        for id in gates {
            let gate = circuit.gate(*id)?;

            let spec = match &gate.logic {
                GateLogic::Packed(packed) => {
                    let nested = Self::create_packed(circuit, packed)?;
                    GateSpec::new(PACKED, vec![serde_json::to_value(nested)?])
                }
                GateLogic::Primitive(_) if gate.builder.is_empty() => {
                    eyre::bail!(CircuitError::invalid(format!(
                        "gate {id} `{}` was not built from a registry",
                        gate.name
                    )))
                }
                GateLogic::Primitive(_) => GateSpec::new(&gate.builder, gate.args.clone()),
            };

            let local = local_id(&gate.builder, &mut counters);
            if let Some(point) = circuit.position(*id) {
                blueprint.positions.insert(local.clone(), point);
            }
            blueprint.declaration.insert(local.clone(), spec);
            local_ids.insert(*id, local);
        }

        for id in edges {
            let edge = circuit.wiring().edge(*id)?;
            let end = edge.end.with_context(|| format!("edge {id} is pending"))?;
            let start = circuit.wiring().connector(edge.start)?;
            let end = circuit.wiring().connector(end)?;

            let source = local_ids.get(&start.gate);
            let target = local_ids.get(&end.gate);
            let (Some(source), Some(target)) = (source, target) else {
                eyre::bail!(CircuitError::invalid(format!(
                    "edge {id} leaves the described gates"
                )));
            };

            blueprint.connections.push(format!(
                "{source}:{} to {target}:{}",
                start.name, end.name
            ));
        }

        Ok(blueprint)
    }

    fn create_packed(circuit: &Circuit, packed: &PackedCircuit) -> eyre::Result<Self> {
        let mut edges = Vec::new();
        for id in &packed.gates {
            edges.extend(circuit.edges_of(*id)?);
        }
        let edges = edges.into_iter().sorted().dedup().collect_vec();

        for id in &edges {
            let edge = circuit.wiring().edge(*id)?;
            let end = edge.end.with_context(|| format!("edge {id} is pending"))?;

            for connector in [edge.start, end] {
                let gate = circuit.wiring().connector(connector)?.gate;
                if !packed.gates.contains(&gate) {
                    eyre::bail!(CircuitError::invalid(format!(
                        "edge {id} crosses the boundary of a packed gate"
                    )));
                }
            }
        }

        Self::create_with_edges(circuit, &packed.gates, &edges)
    }

    /// Writes the blueprint in the relaxed object-literal notation.
    pub fn to_text(&self) -> eyre::Result<String> {
        Ok(text::to_text(&serde_json::to_value(self)?))
    }
}

impl FromStr for Blueprint {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = text::parse(s).wrap_err("cannot read blueprint text")?;
        serde_json::from_value(value).wrap_err("malformed blueprint")
    }
}

impl Verify for Blueprint {
    fn verify(&self) -> eyre::Result<()> {
        for local in self.positions.keys() {
            if !self.declaration.contains_key(local) {
                eyre::bail!(CircuitError::UndeclaredId {
                    id: local.clone(),
                    section: "positions".to_string(),
                });
            }
        }

        for connection in &self.connections {
            let spec = connection.parse::<ConnectionSpec>()?;

            for side in [&spec.source, &spec.target] {
                if !self.declaration.contains_key(&side.id) {
                    eyre::bail!(CircuitError::unresolved(
                        connection.as_str(),
                        format!("`{}` is not declared", side.id)
                    ));
                }
            }
        }

        for spec in self.declaration.values() {
            if spec.type_name() == PACKED {
                nested_blueprint(spec.args())?.verify()?;
            }
        }

        Ok(())
    }
}

fn nested_blueprint(args: &[Value]) -> eyre::Result<Blueprint> {
    let [nested] = args else {
        eyre::bail!(CircuitError::invalid(format!(
            "{PACKED} takes one nested blueprint, got {} arguments",
            args.len()
        )));
    };

    serde_json::from_value(nested.clone()).wrap_err("malformed nested blueprint")
}

fn instantiate_packed(
    circuit: &mut Circuit,
    registry: &GateRegistry,
    args: &[Value],
) -> eyre::Result<GateId> {
    let nested = nested_blueprint(args)?;
    let gates = nested.instantiate(circuit, registry)?;
    let ids = gates.values().copied().collect_vec();

    match circuit.pack(&ids) {
        Ok(id) => Ok(id),
        Err(err) => {
            rollback(circuit, ids);
            Err(err)
        }
    }
}

fn rollback(circuit: &mut Circuit, gates: impl IntoIterator<Item = GateId>) {
    let gates = gates.into_iter().collect_vec();

    for id in gates.into_iter().rev() {
        if let Err(err) = circuit.dispose(id) {
            tracing::warn!("rollback could not dispose {id}: {err}");
        }
    }
}

fn local_id(builder: &str, counters: &mut HashMap<String, usize>) -> String {
    let slug = builder
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>();

    let counter = counters.entry(slug.clone()).or_insert(0);
    *counter += 1;
    format!("{slug}_{counter}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use itertools::{iproduct, Itertools};
    use serde_json::json;

    use super::{parse_blueprint, predefined, Blueprint, GateSpec};
    use crate::circuit::{Circuit, GateId, Point};
    use crate::error::CircuitError;
    use crate::logic::builder::GateRegistry;
    use crate::utils::Verify;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    // gate kinds in order, and each connection as gate index and port name
    fn structure(
        circuit: &Circuit,
        gates: &[GateId],
    ) -> eyre::Result<(Vec<String>, Vec<(usize, String, usize, String)>)> {
        let index = gates
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect::<HashMap<_, _>>();

        let kinds = gates
            .iter()
            .map(|id| Ok(circuit.gate(*id)?.builder.clone()))
            .collect::<eyre::Result<Vec<_>>>()?;

        let mut connections = Vec::new();
        for (_, edge) in circuit.wiring().edges() {
            let Some(end) = edge.end else { continue };
            let start = circuit.wiring().connector(edge.start)?;
            let end = circuit.wiring().connector(end)?;

            if let (Some(source), Some(target)) = (index.get(&start.gate), index.get(&end.gate)) {
                connections.push((*source, start.name.clone(), *target, end.name.clone()));
            }
        }

        Ok((kinds, connections.into_iter().sorted().collect()))
    }

    #[test]
    fn unittest_blueprint_starter_latch() -> eyre::Result<()> {
        init_tracing();

        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();
        let gates = predefined::sr_latch()?.instantiate(&mut circuit, &registry)?;

        assert_eq!(circuit.order(), gates.values().copied().collect_vec().as_slice());
        assert_eq!(circuit.position(gates["set"]), Some(Point::new(40.0, 40.0)));
        assert_eq!(circuit.wiring().edges().count(), 8);
        circuit.verify()?;

        let q = gates["not_q"];
        let qn = gates["not_qn"];

        circuit.settle(5)?;
        assert_eq!((circuit.read_output(q, 0)?, circuit.read_output(qn, 0)?), (true, false));

        circuit.press(gates["reset"])?;
        circuit.tick()?;
        circuit.release(gates["reset"])?;
        assert!(circuit.settle(5)? <= 5);
        assert_eq!((circuit.read_output(q, 0)?, circuit.read_output(qn, 0)?), (false, true));

        Ok(())
    }

    #[test]
    fn unittest_blueprint_round_trip() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();

        let text = r#"{
            declaration: {
                a: { type: "Switch", args: [true] },
                b: { type: "Input", args: ["In B"] },
                clk: { type: "Clock", args: [250] },
                xor: "Xor",
                and: "And",
                probe: "Probe",
                lamp: "Lamp",
            },
            positions: { a: { x: 10, y: 20 } },
            connections: [
                "a to xor:A",
                "b to xor:B",
                "xor to and:A",
                "clk:C to and:B",
                "and to probe",
                "probe:C to lamp:A",
            ],
        }"#;

        let blueprint = text.parse::<Blueprint>()?;
        let gates = parse_blueprint(&mut circuit, &registry, &blueprint)?;
        let expected = structure(&circuit, &gates)?;

        let created = Blueprint::create(&circuit, &gates)?;
        assert_eq!(created.declaration.len(), 7);
        assert_eq!(
            created.declaration["clock_1"],
            GateSpec::Full {
                type_name: "Clock".to_string(),
                args: vec![json!(250)],
            }
        );
        assert_eq!(created.declaration["xor_1"], GateSpec::Name("Xor".to_string()));
        assert_eq!(created.positions["switch_1"], Point::new(10.0, 20.0));
        assert!(created.connections.contains(&"xor_1:C to and_1:A".to_string()));

        let reparsed = created.to_text()?.parse::<Blueprint>()?;
        assert_eq!(reparsed, created);

        let mut copy = Circuit::default();
        let copied = parse_blueprint(&mut copy, &registry, &reparsed)?;
        assert_eq!(structure(&copy, &copied)?, expected);
        assert_eq!(copy.gate(copied[1])?.name, "In B");
        assert_eq!(copy.gate(copied[5])?.name, circuit.gate(gates[5])?.name);

        Ok(())
    }

    #[test]
    fn unittest_blueprint_errors_roll_back() -> eyre::Result<()> {
        let registry = GateRegistry::default();

        let cases = [
            (
                r#"{ declaration: { a: "Nand" } }"#,
                "unknown type",
            ),
            (
                r#"{ declaration: { a: "True", b: "Lamp" }, connections: ["a to c"] }"#,
                "undeclared id",
            ),
            (
                r#"{ declaration: { a: "True", b: "Lamp" }, connections: ["a:Q to b"] }"#,
                "unknown port",
            ),
            (
                r#"{ declaration: { a: "True", b: "And" }, connections: ["a to b"] }"#,
                "ambiguous port",
            ),
            (
                r#"{ declaration: { a: "Lamp", b: "Lamp" }, connections: ["a to b"] }"#,
                "no outputs",
            ),
            (
                r#"{ declaration: { a: "True" }, positions: { z: { x: 0, y: 0 } } }"#,
                "undeclared position",
            ),
        ];

        for (text, case) in cases {
            let mut circuit = Circuit::default();
            let err = text
                .parse::<Blueprint>()?
                .instantiate(&mut circuit, &registry)
                .unwrap_err();

            let kind = err.downcast_ref::<CircuitError>();
            match case {
                "unknown type" => assert_eq!(
                    kind,
                    Some(&CircuitError::UnknownGateType {
                        name: "Nand".to_string()
                    })
                ),
                "undeclared position" => assert!(
                    matches!(kind, Some(CircuitError::UndeclaredId { .. })),
                    "{case}"
                ),
                _ => assert!(
                    matches!(kind, Some(CircuitError::ConnectionResolution { .. })),
                    "{case}: {err}"
                ),
            }

            assert!(circuit.is_empty(), "{case}");
            assert_eq!(circuit.wiring().edges().count(), 0, "{case}");
        }

        Ok(())
    }

    #[test]
    fn unittest_blueprint_full_adder() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();
        let gates = predefined::full_adder()?.instantiate(&mut circuit, &registry)?;

        let half = circuit.gate(gates["ha1"])?;
        assert!(half.is_packed());
        assert_eq!(half.inputs.names(circuit.wiring())?, vec!["In A", "In B"]);

        let check = |circuit: &mut Circuit, gates: &[GateId]| -> eyre::Result<()> {
            let [a, b, cin] = [gates[0], gates[1], gates[2]];
            let (sum, cout) = (gates[gates.len() - 2], gates[gates.len() - 1]);

            for (x, y, z) in iproduct!([false, true], [false, true], [false, true]) {
                circuit.force(a, 0, x)?;
                circuit.force(b, 0, y)?;
                circuit.force(cin, 0, z)?;
                circuit.settle(8)?;

                let total = x as u8 + y as u8 + z as u8;
                assert_eq!(circuit.read_input(sum, 0)?, total % 2 == 1, "{x} {y} {z}");
                assert_eq!(circuit.read_input(cout, 0)?, total >= 2, "{x} {y} {z}");
            }
            Ok(())
        };

        let ids = gates.values().copied().collect_vec();
        check(&mut circuit, &ids)?;

        let text = Blueprint::create(&circuit, &ids)?.to_text()?;
        assert!(text.contains("type: \"Packed\""));

        let mut copy = Circuit::default();
        let copied = parse_blueprint(&mut copy, &registry, &text.parse::<Blueprint>()?)?;
        check(&mut copy, &copied)?;
        copy.verify()
    }

    #[test]
    fn unittest_blueprint_packed_boundary() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();
        let gates = predefined::half_adder()?.instantiate(&mut circuit, &registry)?;
        let half = gates.values().copied().collect_vec();

        // wired into the selection before packing
        let source = circuit.build_gate(&registry, "True", &[])?;
        circuit.connect(source, 0, gates["xor"], 1)?;

        let err = circuit.pack(&half).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CircuitError>(),
            Some(CircuitError::InvalidOperation { .. })
        ));
        assert!(circuit.gates().all(|gate| gate.packed_in().is_none()));

        let mut all = half.clone();
        all.push(source);
        let created = Blueprint::create(&circuit, &all)?;
        assert!(created.connections.contains(&"true_1:C to xor_1:B".to_string()));

        circuit.dispose(source)?;
        circuit.connect(gates["b"], 0, gates["xor"], 1)?;
        let packed = circuit.pack(&half)?;

        let late = circuit.build_gate(&registry, "True", &[])?;
        let err = circuit.connect(late, 0, gates["xor"], 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CircuitError>(),
            Some(CircuitError::InvalidOperation { .. })
        ));
        assert_eq!(circuit.edges_of(gates["xor"])?.len(), 3);
        assert!(Blueprint::create(&circuit, &[packed]).is_ok());

        Ok(())
    }

    #[test]
    fn unittest_blueprint_partial_pack_round_trip() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();

        let sw_a = circuit.build_gate(&registry, "Switch", &[json!(true)])?;
        let sw_b = circuit.build_gate(&registry, "Switch", &[])?;
        let gates = predefined::half_adder()?.instantiate(&mut circuit, &registry)?;
        let lamp_sum = circuit.build_gate(&registry, "Lamp", &[])?;
        let lamp_carry = circuit.build_gate(&registry, "Lamp", &[])?;

        let packed = circuit.pack(&gates.values().copied().collect_vec())?;
        circuit.connect(sw_a, 0, packed, 0)?;
        circuit.connect(sw_b, 0, packed, 1)?;
        circuit.connect(packed, 0, lamp_sum, 0)?;
        circuit.connect(packed, 1, lamp_carry, 0)?;
        circuit.toggle(sw_b)?;

        let ids = vec![sw_a, sw_b, packed, lamp_sum, lamp_carry];
        let expected = structure(&circuit, &ids)?;
        circuit.settle(8)?;
        let lamps = |circuit: &Circuit, ids: &[GateId]| -> eyre::Result<(bool, bool)> {
            Ok((circuit.read_input(ids[3], 0)?, circuit.read_input(ids[4], 0)?))
        };
        assert_eq!(lamps(&circuit, &ids)?, (false, true));

        let created = Blueprint::create(&circuit, &ids)?;
        assert_eq!(created.declaration.len(), 5);
        assert!(created.connections.contains(&"packed_1:Out S to lamp_1:A".to_string()));

        let mut copy = Circuit::default();
        let copied = parse_blueprint(&mut copy, &registry, &created.to_text()?.parse::<Blueprint>()?)?;
        assert_eq!(structure(&copy, &copied)?, expected);

        copy.settle(8)?;
        assert_eq!(lamps(&copy, &copied)?, (false, true));
        copy.verify()
    }

    #[test]
    fn unittest_blueprint_toggled_switch() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();

        let switch = circuit.build_gate(&registry, "Switch", &[])?;
        assert_eq!(
            Blueprint::create(&circuit, &[switch])?.declaration["switch_1"],
            GateSpec::Name("Switch".to_string())
        );

        assert!(circuit.toggle(switch)?);
        let created = Blueprint::create(&circuit, &[switch])?;
        assert_eq!(
            created.declaration["switch_1"],
            GateSpec::Full {
                type_name: "Switch".to_string(),
                args: vec![json!(true)],
            }
        );

        let mut copy = Circuit::default();
        let copied = created.instantiate(&mut copy, &registry)?;
        copy.tick()?;
        assert!(copy.read_output(copied["switch_1"], 0)?);

        Ok(())
    }
}
