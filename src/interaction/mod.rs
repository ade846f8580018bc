use crate::circuit::{Circuit, ConnectorId, EdgeId, GateId, Mutation, Point};
use crate::error::CircuitError;

/// What the host found under the pointer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DragTarget {
    Connector(ConnectorId),
    Gate(GateId),
    Trash,
    Empty,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    DraggingEdge {
        edge: EdgeId,
        start: ConnectorId,
    },
    DraggingGate {
        gate: GateId,
        // gate position minus pointer position at drag start
        offset: Point,
    },
}

/// How the pending edge should be drawn while hovering.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EdgeFeedback {
    Neutral,
    Legal,
    Illegal,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DragOutcome {
    Ignored,
    // drag started on an input connector, flash it
    Rejected(ConnectorId),
    EdgeStarted(EdgeId),
    Hover(EdgeFeedback),
    EdgeConnected {
        edge: EdgeId,
        displaced: Option<EdgeId>,
    },
    EdgeDiscarded(EdgeId),
    GateMoved {
        gate: GateId,
        position: Point,
    },
    // disposal is deferred to the next tick boundary
    GateTrashed(GateId),
}

/// Pointer interaction state machine for drawing edges and moving gates.
/// The host reports each pointer event together with the hit-tested target.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DragState::Idle
    }

    pub fn on_start(
        &mut self,
        circuit: &mut Circuit,
        target: DragTarget,
        pointer: Point,
    ) -> eyre::Result<DragOutcome> {
        if !self.is_idle() {
            tracing::warn!("drag started while {:?}, cancelling it", self.state);
            self.cancel(circuit)?;
        }

        let outcome = match target {
            DragTarget::Connector(connector) => {
                let pin = circuit.wiring().connector(connector)?;
                if pin.is_sealed() {
                    eyre::bail!(CircuitError::invalid(format!(
                        "connector {connector} is inside a packed gate"
                    )));
                }
                if pin.is_input() {
                    return Ok(DragOutcome::Rejected(connector));
                }

                let edge = circuit.wiring_mut().new_edge(connector)?;
                self.state = DragState::DraggingEdge {
                    edge,
                    start: connector,
                };
                DragOutcome::EdgeStarted(edge)
            }
            DragTarget::Gate(gate) => {
                if let Some(owner) = circuit.gate(gate)?.packed_in() {
                    eyre::bail!(CircuitError::invalid(format!(
                        "gate {gate} is packed in {owner}"
                    )));
                }

                let position = circuit.position(gate).unwrap_or_default();
                self.state = DragState::DraggingGate {
                    gate,
                    offset: Point::new(position.x - pointer.x, position.y - pointer.y),
                };
                DragOutcome::Ignored
            }
            DragTarget::Trash | DragTarget::Empty => DragOutcome::Ignored,
        };

        Ok(outcome)
    }

    pub fn on_update(
        &mut self,
        circuit: &mut Circuit,
        target: DragTarget,
        pointer: Point,
    ) -> eyre::Result<DragOutcome> {
        match self.state {
            DragState::Idle => Ok(DragOutcome::Ignored),
            DragState::DraggingEdge { start, .. } => {
                Ok(DragOutcome::Hover(feedback(circuit, start, target)?))
            }
            DragState::DraggingGate { gate, offset } => {
                let position = Point::new(pointer.x + offset.x, pointer.y + offset.y);
                circuit.set_position(gate, position)?;
                Ok(DragOutcome::GateMoved { gate, position })
            }
        }
    }

    pub fn on_end(
        &mut self,
        circuit: &mut Circuit,
        target: DragTarget,
        pointer: Point,
    ) -> eyre::Result<DragOutcome> {
        match std::mem::take(&mut self.state) {
            DragState::Idle => Ok(DragOutcome::Ignored),
            DragState::DraggingEdge { edge, start } => {
                let legal = feedback(circuit, start, target)? == EdgeFeedback::Legal;

                let end = match target {
                    DragTarget::Connector(end) if legal => end,
                    _ => {
                        circuit.wiring_mut().dispose_edge(edge)?;
                        return Ok(DragOutcome::EdgeDiscarded(edge));
                    }
                };

                match circuit.wiring_mut().end_edge(edge, end) {
                    Ok(displaced) => Ok(DragOutcome::EdgeConnected { edge, displaced }),
                    Err(err) => {
                        circuit.wiring_mut().dispose_edge(edge)?;
                        Err(err)
                    }
                }
            }
            DragState::DraggingGate { gate, offset } => {
                if target == DragTarget::Trash {
                    circuit.defer(Mutation::Dispose(gate));
                    return Ok(DragOutcome::GateTrashed(gate));
                }

                let position = Point::new(pointer.x + offset.x, pointer.y + offset.y);
                circuit.set_position(gate, position)?;
                Ok(DragOutcome::GateMoved { gate, position })
            }
        }
    }

    /// Abandons the current drag, discarding a pending edge.
    pub fn cancel(&mut self, circuit: &mut Circuit) -> eyre::Result<()> {
        if let DragState::DraggingEdge { edge, .. } = std::mem::take(&mut self.state) {
            if circuit.wiring().contains_edge(edge) {
                circuit.wiring_mut().dispose_edge(edge)?;
            }
        }
        Ok(())
    }
}

fn feedback(circuit: &Circuit, start: ConnectorId, target: DragTarget) -> eyre::Result<EdgeFeedback> {
    let DragTarget::Connector(connector) = target else {
        return Ok(EdgeFeedback::Neutral);
    };

    let wiring = circuit.wiring();
    let end = wiring.connector(connector)?;
    if end.is_output() || end.is_sealed() || wiring.has_connection(connector, start)? {
        return Ok(EdgeFeedback::Illegal);
    }

    Ok(EdgeFeedback::Legal)
}
