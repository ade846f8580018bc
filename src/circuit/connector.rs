use eyre::ContextCompat;
use serde::{Deserialize, Serialize};

use super::{ConnectorId, EdgeId, GateId, Wiring};
use crate::error::CircuitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// A single named pin on one side of a gate.
#[derive(Debug, Clone)]
pub struct Connector {
    pub name: String,
    pub direction: Direction,
    pub gate: GateId,
    // authoritative for outputs only
    pub(crate) value: bool,
    pub(crate) edges: Vec<EdgeId>,
    // set while the owning gate is captured inside a packed gate
    pub(crate) sealed: bool,
}

impl Connector {
    pub(crate) fn new(gate: GateId, name: String, direction: Direction) -> Self {
        Self {
            name,
            direction,
            gate,
            value: false,
            edges: Vec::new(),
            sealed: false,
        }
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    pub fn is_input(&self) -> bool {
        matches!(self.direction, Direction::Input)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.direction, Direction::Output)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn attach_edge(&mut self, edge: EdgeId) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub(crate) fn detach_edge(&mut self, edge: EdgeId) {
        self.edges.retain(|id| *id != edge);
    }
}

/// The ordered connectors on one side of a gate. Position is declaration
/// order, and every accessor is index based.
#[derive(Debug, Clone)]
pub struct ConnectorCollection {
    direction: Direction,
    connectors: Vec<ConnectorId>,
}

impl ConnectorCollection {
    pub(crate) fn new(direction: Direction, connectors: Vec<ConnectorId>) -> Self {
        Self {
            direction,
            connectors,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn ids(&self) -> &[ConnectorId] {
        &self.connectors
    }

    pub fn get(&self, index: usize) -> eyre::Result<ConnectorId> {
        self.connectors.get(index).copied().with_context(|| {
            format!(
                "{} index {index} out of range ({} connectors)",
                self.direction.name(),
                self.connectors.len()
            )
        })
    }

    pub fn position(&self, wiring: &Wiring, name: &str) -> Option<usize> {
        self.connectors.iter().position(|id| {
            wiring
                .connector(*id)
                .map_or(false, |connector| connector.name == name)
        })
    }

    pub fn names(&self, wiring: &Wiring) -> eyre::Result<Vec<String>> {
        self.connectors
            .iter()
            .map(|id| Ok(wiring.connector(*id)?.name.clone()))
            .collect()
    }

    pub fn read(&self, wiring: &Wiring, index: usize) -> eyre::Result<bool> {
        wiring.read(self.get(index)?)
    }

    pub fn force(&self, wiring: &mut Wiring, index: usize, value: bool) -> eyre::Result<()> {
        wiring.force(self.get(index)?, value)
    }

    pub fn to_bool_array(&self, wiring: &Wiring) -> eyre::Result<Vec<bool>> {
        self.connectors.iter().map(|id| wiring.read(*id)).collect()
    }

    pub fn from_bool_array(&self, wiring: &mut Wiring, values: &[bool]) -> eyre::Result<()> {
        if self.direction == Direction::Input {
            eyre::bail!(CircuitError::invalid("input connectors cannot be written"));
        }

        if values.len() != self.connectors.len() {
            eyre::bail!(CircuitError::ArityMismatch {
                expected: self.connectors.len(),
                actual: values.len(),
            });
        }

        for (id, value) in self.connectors.iter().zip(values) {
            wiring.force(*id, *value)?;
        }

        Ok(())
    }
}
