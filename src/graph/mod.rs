use std::collections::HashMap;

use petgraph::graph::NodeIndex;

use crate::circuit::{Circuit, GateId, GateLogic};

pub mod graphviz;

pub type GraphNodeId = usize;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: GraphNodeId,
    pub gate: GateId,
    pub name: String,
    pub tag: String,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    // neighbour nodes, built from the edges
    pub inputs: Vec<GraphNodeId>,
    pub outputs: Vec<GraphNodeId>,
}

/// A port-level connection between two nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: GraphNodeId,
    pub from_port: usize,
    pub to: GraphNodeId,
    pub to_port: usize,
    pub value: bool,
}

#[derive(Default, Debug, Clone)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Nodes that belong to one packed gate.
#[derive(Debug, Clone)]
pub struct SubGraph {
    pub name: String,
    pub nodes: Vec<GraphNodeId>,
}

impl Graph {
    /// Builds the graph of the given gates and of every connected edge
    /// between them.
    pub fn from_gates(circuit: &Circuit, gates: &[GateId]) -> eyre::Result<Self> {
        let mut graph = Graph::default();
        let mut index = HashMap::new();

        for gate_id in gates {
            let gate = circuit.gate(*gate_id)?;
            let id = graph.nodes.len();
            index.insert(*gate_id, id);

            graph.nodes.push(GraphNode {
                id,
                gate: *gate_id,
                name: gate.name.clone(),
                tag: gate.info.clone(),
                input_ports: gate.inputs.names(circuit.wiring())?,
                output_ports: gate.outputs.names(circuit.wiring())?,
                inputs: Vec::new(),
                outputs: Vec::new(),
            });
        }

        for (_, edge) in circuit.wiring().edges() {
            let Some(end) = edge.end else { continue };
            let start = circuit.wiring().connector(edge.start)?;
            let end_connector = circuit.wiring().connector(end)?;

            let from = index.get(&start.gate);
            let to = index.get(&end_connector.gate);
            let (Some(from), Some(to)) = (from, to) else {
                continue;
            };

            let from_port = circuit
                .gate(start.gate)?
                .outputs
                .ids()
                .iter()
                .position(|id| *id == edge.start)
                .unwrap_or_default();
            let to_port = circuit
                .gate(end_connector.gate)?
                .inputs
                .ids()
                .iter()
                .position(|id| *id == end)
                .unwrap_or_default();

            graph.edges.push(GraphEdge {
                from: *from,
                from_port,
                to: *to,
                to_port,
                value: start.value,
            });
        }

        graph.build_neighbours();
        Ok(graph)
    }

    pub fn to_petgraph(&self) -> petgraph::Graph<(), ()> {
        self.into()
    }

    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.to_petgraph())
    }

    pub fn find_node_by_gate(&self, gate: GateId) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.gate == gate)
    }

    fn build_neighbours(&mut self) {
        let mut inputs: HashMap<GraphNodeId, Vec<GraphNodeId>> = HashMap::new();
        let mut outputs: HashMap<GraphNodeId, Vec<GraphNodeId>> = HashMap::new();

        for edge in &self.edges {
            inputs.entry(edge.to).or_default().push(edge.from);
            outputs.entry(edge.from).or_default().push(edge.to);
        }

        for node in self.nodes.iter_mut() {
            node.inputs = inputs.remove(&node.id).unwrap_or_default();
            node.outputs = outputs.remove(&node.id).unwrap_or_default();
        }
    }
}

impl From<&Graph> for petgraph::Graph<(), ()> {
    fn from(value: &Graph) -> Self {
        let mut graph = petgraph::Graph::with_capacity(value.nodes.len(), value.edges.len());

        for _ in &value.nodes {
            graph.add_node(());
        }

        for edge in &value.edges {
            graph.add_edge(NodeIndex::new(edge.from), NodeIndex::new(edge.to), ());
        }

        graph
    }
}

/// Every gate of a circuit, with the gates captured by packed gates
/// included and grouped per packed gate.
#[derive(Debug, Clone, derive_more::Deref)]
pub struct CircuitGraph {
    #[deref]
    pub graph: Graph,
    pub clusters: Vec<SubGraph>,
}

impl CircuitGraph {
    pub fn new(circuit: &Circuit) -> eyre::Result<Self> {
        let mut gates = circuit.order().to_vec();
        let mut groups = Vec::new();
        let mut pending = gates.clone();

        while let Some(id) = pending.pop() {
            if let GateLogic::Packed(packed) = &circuit.gate(id)?.logic {
                gates.extend_from_slice(&packed.gates);
                pending.extend_from_slice(&packed.gates);
                groups.push((id, packed.gates.clone()));
            }
        }

        let graph = Graph::from_gates(circuit, &gates)?;

        let clusters = groups
            .into_iter()
            .rev()
            .map(|(id, members)| {
                let nodes = members
                    .iter()
                    .filter_map(|gate| graph.find_node_by_gate(*gate).map(|node| node.id))
                    .collect();
                SubGraph {
                    name: format!("Packed {id}"),
                    nodes,
                }
            })
            .collect();

        Ok(Self { graph, clusters })
    }

    /// Whether any wiring loops back on itself, as in a latch.
    pub fn has_feedback(&self) -> bool {
        self.graph.has_cycle()
    }
}

#[cfg(test)]
mod tests {
    use super::CircuitGraph;
    use crate::blueprint::predefined;
    use crate::circuit::Circuit;
    use crate::logic::builder::GateRegistry;

    #[test]
    fn unittest_graph_feedback() -> eyre::Result<()> {
        let registry = GateRegistry::default();

        let mut latch = Circuit::default();
        predefined::sr_latch()?.instantiate(&mut latch, &registry)?;
        let graph = CircuitGraph::new(&latch)?;
        assert_eq!(graph.nodes.len(), 8);
        assert_eq!(graph.edges.len(), 8);
        assert!(graph.has_feedback());

        let mut adder = Circuit::default();
        predefined::full_adder()?.instantiate(&mut adder, &registry)?;
        let graph = CircuitGraph::new(&adder)?;
        assert_eq!(graph.nodes.len(), 8 + 2 * 6);
        assert_eq!(graph.clusters.len(), 2);
        assert!(graph.clusters.iter().all(|cluster| cluster.nodes.len() == 6));
        assert!(!graph.has_feedback());

        Ok(())
    }
}
