use itertools::Itertools;

use super::{CircuitGraph, Graph, GraphEdge, GraphNode, GraphNodeId, SubGraph};

pub struct GraphvizBuilder<'a> {
    graph: &'a Graph,
    clusters: Option<Vec<(String, Vec<GraphNodeId>)>>,
}

impl<'a> GraphvizBuilder<'a> {
    pub fn new(g: &'a Graph) -> Self {
        Self {
            graph: g,
            clusters: None,
        }
    }

    pub fn with_cluster(&mut self, clusters: Vec<(String, Vec<GraphNodeId>)>) -> &mut Self {
        self.clusters = Some(clusters);
        self
    }

    pub fn build(&self, graph_name: &str) -> String {
        format!(
            r#"digraph {graph_name} {{
    rankdir=LR
    graph [splines=line, nodesep=0.8]
    node [shape=record]
{}
{}
{}
}}
"#,
            self.print_nodes(),
            self.print_edges(),
            self.print_cluster(),
        )
    }

    fn print_nodes(&self) -> String {
        self.graph
            .nodes
            .iter()
            .map(Self::print_node)
            .collect_vec()
            .join("\n")
    }

    // record with the input ports on the left and the output ports on the right
    fn print_node(node: &GraphNode) -> String {
        let ports = |prefix: &str, names: &[String]| {
            names
                .iter()
                .enumerate()
                .map(|(index, name)| format!("<{prefix}{index}> {}", escape(name)))
                .join("|")
        };

        let mut fields = Vec::new();
        if !node.input_ports.is_empty() {
            fields.push(format!("{{{}}}", ports("i", &node.input_ports)));
        }
        if node.tag.is_empty() {
            fields.push(escape(&node.name));
        } else {
            fields.push(format!("{{{}|{}}}", escape(&node.name), escape(&node.tag)));
        }
        if !node.output_ports.is_empty() {
            fields.push(format!("{{{}}}", ports("o", &node.output_ports)));
        }

        format!("    node{} [label=\"{{{}}}\"]", node.id, fields.join("|"))
    }

    fn print_edges(&self) -> String {
        self.graph
            .edges
            .iter()
            .map(|GraphEdge { from, from_port, to, to_port, value }| {
                let color = if *value { " [color=red]" } else { "" };
                format!("    node{from}:o{from_port} -> node{to}:i{to_port}{color}")
            })
            .collect_vec()
            .join("\n")
    }

    fn print_cluster(&self) -> String {
        let Some(clusters) = &self.clusters else {
            return String::new();
        };

        clusters
            .iter()
            .enumerate()
            .map(|(index, (name, members))| {
                format!(
                    "    subgraph cluster_{index} {{ label=\"{}\" {} }}",
                    escape(name),
                    members
                        .iter()
                        .map(|id| format!("node{id}"))
                        .collect_vec()
                        .join(" ")
                )
            })
            .collect_vec()
            .join("\n")
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '"' | '{' | '}' | '|' | '<' | '>' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub trait ToGraphviz {
    fn to_graphviz(&self) -> String;

    fn to_graphviz_with_clusters(&self, clusters: &[SubGraph]) -> String;
}

impl ToGraphviz for Graph {
    fn to_graphviz(&self) -> String {
        GraphvizBuilder::new(self).build("Circuit")
    }

    fn to_graphviz_with_clusters(&self, clusters: &[SubGraph]) -> String {
        GraphvizBuilder::new(self)
            .with_cluster(
                clusters
                    .iter()
                    .map(|cluster| (cluster.name.clone(), cluster.nodes.clone()))
                    .collect_vec(),
            )
            .build("Circuit")
    }
}

impl ToGraphviz for CircuitGraph {
    fn to_graphviz(&self) -> String {
        self.graph.to_graphviz_with_clusters(&self.clusters)
    }

    fn to_graphviz_with_clusters(&self, clusters: &[SubGraph]) -> String {
        self.graph.to_graphviz_with_clusters(clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::ToGraphviz;
    use crate::blueprint::predefined;
    use crate::circuit::Circuit;
    use crate::graph::CircuitGraph;
    use crate::logic::builder::GateRegistry;

    #[test]
    fn unittest_graphviz_records_and_clusters() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let mut circuit = Circuit::default();
        let gates = predefined::full_adder()?.instantiate(&mut circuit, &registry)?;

        circuit.force(gates["a"], 0, true)?;
        circuit.tick()?;

        let dot = CircuitGraph::new(&circuit)?.to_graphviz();

        assert!(dot.starts_with("digraph Circuit {"));
        assert!(dot.contains("node5 [label=\"{{<i0> A|<i1> B}|OR|{<o0> C}}\"]"));
        assert!(dot.contains("node0 [label=\"{A|{<o0> C}}\"]"));
        assert!(dot.contains("node0:o0 -> node3:i0 [color=red]"));
        assert!(dot.contains("subgraph cluster_0 { label=\"Packed g9\""));
        assert!(dot.contains("subgraph cluster_1"));

        Ok(())
    }
}
