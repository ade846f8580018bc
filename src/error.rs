/// Contract violations raised by the circuit core.
///
/// Operations return `eyre::Result` and raise these with `eyre::bail!`, so a
/// caller classifies a failure with `report.downcast_ref::<CircuitError>()`.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum CircuitError {
    #[display("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[display("expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[display("unknown gate type `{name}`")]
    UnknownGateType { name: String },

    #[display("cannot resolve connection `{connection}`: {reason}")]
    ConnectionResolution { connection: String, reason: String },

    #[display("cannot pack a circuit with no inputs or outputs")]
    EmptyInterface,

    #[display("`{id}` is referenced in {section} but never declared")]
    UndeclaredId { id: String, section: String },
}

impl CircuitError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            reason: reason.into(),
        }
    }

    pub fn unresolved(connection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionResolution {
            connection: connection.into(),
            reason: reason.into(),
        }
    }
}
