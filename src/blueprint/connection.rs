use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::circuit::{Circuit, ConnectorId, Direction, GateId};
use crate::error::CircuitError;

/// One side of a connection: a declared gate and optionally a port name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub id: String,
    pub port: Option<String>,
}

/// A parsed `SOURCE[:PORT] to TARGET[:PORT]` connection string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionSpec {
    pub source: PortRef,
    pub target: PortRef,
}

/// Whether a connection string can name `name` as a port: non-empty, no
/// surrounding whitespace, and neither `:` nor ` to ` inside.
pub fn is_port_name(name: &str) -> bool {
    !name.is_empty() && name.trim() == name && !name.contains(':') && !name.contains(" to ")
}

impl PortRef {
    fn parse(connection: &str, side: &str, text: &str) -> eyre::Result<Self> {
        let text = text.trim();

        let (id, port) = match text.split_once(':') {
            Some((id, port)) => (id.trim(), Some(port.trim())),
            None => (text, None),
        };

        if id.is_empty() {
            eyre::bail!(CircuitError::unresolved(connection, format!("missing {side} gate")));
        }

        if port.map_or(false, str::is_empty) {
            eyre::bail!(CircuitError::unresolved(
                connection,
                format!("empty port name after `{id}:`")
            ));
        }

        Ok(Self {
            id: id.to_string(),
            port: port.map(str::to_string),
        })
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port {
            Some(port) => write!(f, "{}:{port}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for ConnectionSpec {
    type Err = eyre::Report;

    fn from_str(connection: &str) -> Result<Self, Self::Err> {
        let Some((source, target)) = connection.split_once(" to ") else {
            eyre::bail!(CircuitError::unresolved(
                connection,
                "expected `SOURCE[:PORT] to TARGET[:PORT]`"
            ));
        };

        Ok(Self {
            source: PortRef::parse(connection, "source", source)?,
            target: PortRef::parse(connection, "target", target)?,
        })
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.source, self.target)
    }
}

impl ConnectionSpec {
    /// Finds the output connector the connection starts at.
    pub fn resolve_source(
        &self,
        circuit: &Circuit,
        gates: &IndexMap<String, GateId>,
    ) -> eyre::Result<ConnectorId> {
        self.resolve(circuit, gates, &self.source, Direction::Output)
    }

    /// Finds the input connector the connection ends at.
    pub fn resolve_target(
        &self,
        circuit: &Circuit,
        gates: &IndexMap<String, GateId>,
    ) -> eyre::Result<ConnectorId> {
        self.resolve(circuit, gates, &self.target, Direction::Input)
    }

    fn resolve(
        &self,
        circuit: &Circuit,
        gates: &IndexMap<String, GateId>,
        port_ref: &PortRef,
        direction: Direction,
    ) -> eyre::Result<ConnectorId> {
        let connection = self.to_string();

        let Some(id) = gates.get(&port_ref.id) else {
            eyre::bail!(CircuitError::unresolved(
                connection,
                format!("`{}` is not declared", port_ref.id)
            ));
        };

        let gate = circuit.gate(*id)?;
        let side = match direction {
            Direction::Input => &gate.inputs,
            Direction::Output => &gate.outputs,
        };

        if side.is_empty() {
            eyre::bail!(CircuitError::unresolved(
                connection,
                format!("`{}` has no {}s", port_ref.id, direction.name())
            ));
        }

        let index = match &port_ref.port {
            Some(port) => side.position(circuit.wiring(), port).ok_or_else(|| {
                CircuitError::unresolved(
                    connection.clone(),
                    format!(
                        "`{}` has no {} named `{port}`",
                        port_ref.id,
                        direction.name()
                    ),
                )
            })?,
            None if side.len() == 1 => 0,
            None => eyre::bail!(CircuitError::unresolved(
                connection,
                format!(
                    "`{}` has {} {}s, name one",
                    port_ref.id,
                    side.len(),
                    direction.name()
                )
            )),
        };

        side.get(index)
    }
}
