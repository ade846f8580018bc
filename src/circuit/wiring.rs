use std::collections::HashMap;

use eyre::ContextCompat;
use itertools::Itertools;

use super::connector::{Connector, Direction};
use super::edge::Edge;
use super::{ConnectorId, EdgeId, GateId};
use crate::error::CircuitError;

/// Arena of every connector and edge in a circuit. Edges refer to their
/// endpoints by id, so feedback loops need no shared ownership.
#[derive(Debug, Default, Clone)]
pub struct Wiring {
    connectors: HashMap<ConnectorId, Connector>,
    edges: HashMap<EdgeId, Edge>,
    next_connector: usize,
    next_edge: usize,
}

impl Wiring {
    pub(crate) fn add_connector(
        &mut self,
        gate: GateId,
        name: String,
        direction: Direction,
    ) -> ConnectorId {
        let id = ConnectorId(self.next_connector);
        self.next_connector += 1;
        self.connectors
            .insert(id, Connector::new(gate, name, direction));
        id
    }

    // disposes every edge touching the connector, pending ones included
    pub(crate) fn remove_connector(&mut self, id: ConnectorId) -> eyre::Result<Vec<EdgeId>> {
        let touching = self
            .edges
            .iter()
            .filter(|(_, edge)| edge.touches(id))
            .map(|(edge_id, _)| *edge_id)
            .sorted()
            .collect_vec();

        for edge in &touching {
            self.dispose_edge(*edge)?;
        }

        self.connectors
            .remove(&id)
            .with_context(|| format!("connector {id} not found"))?;

        Ok(touching)
    }

    pub fn connector(&self, id: ConnectorId) -> eyre::Result<&Connector> {
        self.connectors
            .get(&id)
            .with_context(|| format!("connector {id} not found"))
    }

    fn connector_mut(&mut self, id: ConnectorId) -> eyre::Result<&mut Connector> {
        self.connectors
            .get_mut(&id)
            .with_context(|| format!("connector {id} not found"))
    }

    pub(crate) fn seal(&mut self, id: ConnectorId, sealed: bool) -> eyre::Result<()> {
        self.connector_mut(id)?.sealed = sealed;
        Ok(())
    }

    pub fn edge(&self, id: EdgeId) -> eyre::Result<&Edge> {
        self.edges
            .get(&id)
            .with_context(|| format!("edge {id} not found"))
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains_key(&id)
    }

    /// Connected edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .filter(|(_, edge)| !edge.is_pending())
            .map(|(id, edge)| (*id, edge))
            .sorted_by_key(|(id, _)| *id)
    }

    pub fn pending_edges(&self) -> Vec<EdgeId> {
        self.edges
            .iter()
            .filter(|(_, edge)| edge.is_pending())
            .map(|(id, _)| *id)
            .sorted()
            .collect()
    }

    /// Effective value of a connector: an output's own value, or the value
    /// carried by an input's incoming edge (`false` when unconnected).
    pub fn read(&self, id: ConnectorId) -> eyre::Result<bool> {
        let connector = self.connector(id)?;

        match connector.direction {
            Direction::Output => Ok(connector.value),
            Direction::Input => match connector.edges.first() {
                Some(edge) => self.edge_value(*edge),
                None => Ok(false),
            },
        }
    }

    pub fn edge_value(&self, id: EdgeId) -> eyre::Result<bool> {
        let start = self.edge(id)?.start;
        Ok(self.connector(start)?.value)
    }

    /// Writes an output connector directly, bypassing its gate's logic.
    pub fn force(&mut self, id: ConnectorId, value: bool) -> eyre::Result<()> {
        let connector = self.connector_mut(id)?;

        if connector.is_input() {
            eyre::bail!(CircuitError::invalid(format!(
                "cannot write input connector `{}`",
                connector.name
            )));
        }

        connector.value = value;
        Ok(())
    }

    pub fn incoming(&self, input: ConnectorId) -> eyre::Result<Option<EdgeId>> {
        let connector = self.connector(input)?;

        if connector.is_output() {
            return Ok(None);
        }

        Ok(connector.edges.first().copied())
    }

    /// Starts a pending edge at an output connector.
    pub fn new_edge(&mut self, start: ConnectorId) -> eyre::Result<EdgeId> {
        let connector = self.connector(start)?;

        if connector.is_input() {
            eyre::bail!(CircuitError::invalid(format!(
                "edges start at outputs, `{}` is an input",
                connector.name
            )));
        }
        ensure_open(connector)?;

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(id, Edge::pending(start));

        Ok(id)
    }

    /// Completes a pending edge at an input connector. The input's previous
    /// edge, if any, is disposed and returned.
    pub fn end_edge(&mut self, edge: EdgeId, end: ConnectorId) -> eyre::Result<Option<EdgeId>> {
        let start = {
            let pending = self.edge(edge)?;
            if !pending.is_pending() {
                eyre::bail!(CircuitError::invalid(format!("edge {edge} is already connected")));
            }
            pending.start
        };

        let start_direction = self.connector(start)?.direction;
        let end_connector = self.connector(end)?;

        if end_connector.direction == start_direction {
            eyre::bail!(CircuitError::invalid(format!(
                "cannot connect two {} connectors",
                start_direction.name()
            )));
        }
        ensure_open(end_connector)?;
        ensure_open(self.connector(start)?)?;

        let displaced = end_connector.edges.first().copied();
        if let Some(stale) = displaced {
            tracing::debug!("edge {stale} displaced by {edge}");
            self.dispose_edge(stale)?;
        }

        if let Some(pending) = self.edges.get_mut(&edge) {
            pending.end = Some(end);
        }
        self.connector_mut(start)?.attach_edge(edge);
        self.connector_mut(end)?.attach_edge(edge);

        tracing::debug!("connect {start} -> {end} as {edge}");

        Ok(displaced)
    }

    pub fn connect(&mut self, start: ConnectorId, end: ConnectorId) -> eyre::Result<EdgeId> {
        let edge = self.new_edge(start)?;

        if let Err(err) = self.end_edge(edge, end) {
            self.dispose_edge(edge)?;
            return Err(err);
        }

        Ok(edge)
    }

    /// Removes an edge and unregisters it from both endpoints.
    pub fn dispose_edge(&mut self, id: EdgeId) -> eyre::Result<()> {
        let edge = self
            .edges
            .remove(&id)
            .with_context(|| format!("edge {id} not found"))?;

        for connector in [Some(edge.start), edge.end].into_iter().flatten() {
            if let Some(connector) = self.connectors.get_mut(&connector) {
                connector.detach_edge(id);
            }
        }

        Ok(())
    }

    /// Whether two connectors are already joined by a connected edge.
    pub fn has_connection(&self, a: ConnectorId, b: ConnectorId) -> eyre::Result<bool> {
        Ok(self.connector(a)?.edges.iter().any(|edge| {
            self.edges
                .get(edge)
                .map_or(false, |edge| edge.touches(b) && !edge.is_pending())
        }))
    }

    /// Drops every edge that was started but never completed.
    pub fn discard_pending(&mut self) -> eyre::Result<usize> {
        let pending = self.pending_edges();

        for edge in &pending {
            tracing::warn!("discarding pending edge {edge}");
            self.dispose_edge(*edge)?;
        }

        Ok(pending.len())
    }

    /// Output values of every connector, ordered by id. Used to detect a
    /// settled circuit.
    pub(crate) fn snapshot(&self) -> Vec<(ConnectorId, bool)> {
        self.connectors
            .iter()
            .filter(|(_, connector)| connector.is_output())
            .map(|(id, connector)| (*id, connector.value))
            .sorted()
            .collect()
    }
}

fn ensure_open(connector: &Connector) -> eyre::Result<()> {
    if connector.sealed {
        eyre::bail!(CircuitError::invalid(format!(
            "`{}` belongs to a gate captured by a packed gate",
            connector.name
        )));
    }
    Ok(())
}
