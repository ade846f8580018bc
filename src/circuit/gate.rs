use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConnectorCollection, GateId};
use crate::logic::Logic;
use crate::transform::pack::PackedCircuit;

/// Role of a gate when its circuit is packed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateType {
    #[default]
    Plain,
    // becomes an input port of the packed gate
    CircuitInput,
    // becomes an output port of the packed gate
    CircuitOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateLogic {
    Primitive(Logic),
    Packed(PackedCircuit),
}

impl GateLogic {
    pub fn as_primitive(&self) -> Option<&Logic> {
        match self {
            GateLogic::Primitive(logic) => Some(logic),
            GateLogic::Packed(_) => None,
        }
    }

    pub fn as_packed(&self) -> Option<&PackedCircuit> {
        match self {
            GateLogic::Packed(packed) => Some(packed),
            GateLogic::Primitive(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gate {
    pub id: GateId,
    pub name: String,
    pub info: String,
    pub gate_type: GateType,
    // registry name and arguments that rebuild this gate
    pub builder: String,
    pub args: Vec<Value>,
    pub inputs: ConnectorCollection,
    pub outputs: ConnectorCollection,
    pub logic: GateLogic,
    // set while the gate is captured by a packed gate
    pub(crate) packed_in: Option<GateId>,
}

impl Gate {
    pub fn packed_in(&self) -> Option<GateId> {
        self.packed_in
    }

    pub fn is_packed(&self) -> bool {
        matches!(self.logic, GateLogic::Packed(_))
    }
}
