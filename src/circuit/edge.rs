use super::ConnectorId;

/// A wire from one output connector to one input connector.
///
/// An edge is created pending (only `start` set) while the host is still
/// dragging it, and becomes connected once `end` is assigned through
/// [`Wiring::end_edge`](super::Wiring::end_edge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub start: ConnectorId,
    pub end: Option<ConnectorId>,
}

impl Edge {
    pub fn pending(start: ConnectorId) -> Self {
        Self { start, end: None }
    }

    pub fn is_pending(&self) -> bool {
        self.end.is_none()
    }

    pub fn touches(&self, connector: ConnectorId) -> bool {
        self.start == connector || self.end == Some(connector)
    }
}
