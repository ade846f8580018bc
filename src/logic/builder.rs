use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use strum::IntoEnumIterator;

use super::naming::Namer;
use super::{Logic, LogicType, ProbeState};
use crate::blueprint::connection::is_port_name;
use crate::circuit::{GateLogic, GateType};
use crate::error::CircuitError;

/// Everything needed to materialize one gate in a circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct GateTemplate {
    // registry name the gate was built from
    pub builder: String,
    pub name: String,
    pub info: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub gate_type: GateType,
    pub logic: GateLogic,
    // arguments that rebuild an equivalent gate
    pub args: Vec<Value>,
}

impl GateTemplate {
    pub fn new(name: impl Into<String>, inputs: &[&str], outputs: &[&str], logic: Logic) -> Self {
        Self {
            builder: String::new(),
            name: name.into(),
            info: String::new(),
            inputs: inputs.iter().map(|name| name.to_string()).collect(),
            outputs: outputs.iter().map(|name| name.to_string()).collect(),
            gate_type: GateType::Plain,
            logic: GateLogic::Primitive(logic),
            args: Vec::new(),
        }
    }

    pub fn with_type(mut self, gate_type: GateType) -> Self {
        self.gate_type = gate_type;
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }
}

pub type GateFactory = Box<dyn Fn(&mut Namer, &[Value]) -> eyre::Result<GateTemplate>>;

/// Named gate factories, in registration order.
pub struct GateRegistry {
    builders: IndexMap<String, GateFactory>,
}

impl GateRegistry {
    pub fn empty() -> Self {
        Self {
            builders: IndexMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&mut Namer, &[Value]) -> eyre::Result<GateTemplate> + 'static,
    {
        self.builders.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|name| name.as_str())
    }

    pub fn build(&self, name: &str, namer: &mut Namer, args: &[Value]) -> eyre::Result<GateTemplate> {
        let Some(factory) = self.builders.get(name) else {
            eyre::bail!(CircuitError::UnknownGateType {
                name: name.to_string()
            });
        };

        let mut template = factory(namer, args)?;
        template.builder = name.to_string();
        Ok(template)
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();

        for logic_type in LogicType::iter() {
            registry.register(logic_type.name(), move |namer, args| {
                builtin(logic_type, namer, args)
            });
        }

        registry.register("2Hz Clock", |_, args| {
            no_args("2Hz Clock", args)?;
            Ok(clock(Duration::from_millis(500)))
        });
        registry.register("1Hz Clock", |_, args| {
            no_args("1Hz Clock", args)?;
            Ok(clock(Duration::from_millis(1000)))
        });

        registry
    }
}

impl fmt::Debug for GateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.builders.keys()).finish()
    }
}

fn builtin(logic_type: LogicType, namer: &mut Namer, args: &[Value]) -> eyre::Result<GateTemplate> {
    let type_name = logic_type.name();

    let template = match logic_type {
        LogicType::And => {
            no_args(type_name, args)?;
            GateTemplate::new("AND", &["A", "B"], &["C"], Logic::And)
        }
        LogicType::Or => {
            no_args(type_name, args)?;
            GateTemplate::new("OR", &["A", "B"], &["C"], Logic::Or)
        }
        LogicType::Not => {
            no_args(type_name, args)?;
            GateTemplate::new("NOT", &["A"], &["C"], Logic::Not)
        }
        LogicType::Xor => {
            no_args(type_name, args)?;
            GateTemplate::new("XOR", &["A", "B"], &["C"], Logic::Xor)
        }
        LogicType::True => {
            no_args(type_name, args)?;
            GateTemplate::new("1", &[], &["C"], Logic::True)
        }
        LogicType::Switch => {
            let on = bool_arg(type_name, args)?.unwrap_or(false);
            GateTemplate::new("Switch", &[], &["C"], Logic::Switch { on }).with_args(args.to_vec())
        }
        LogicType::Button => {
            no_args(type_name, args)?;
            GateTemplate::new("Button", &[], &["C"], Logic::Button { pressed: false })
        }
        LogicType::Clock => {
            let period = match args {
                [] => 1000,
                [value] => value.as_u64().filter(|ms| *ms > 0).ok_or_else(|| {
                    CircuitError::invalid(format!("Clock period must be a positive integer, got {value}"))
                })?,
                _ => eyre::bail!(CircuitError::invalid("Clock takes at most one argument")),
            };
            clock(Duration::from_millis(period)).with_args(vec![period.into()])
        }
        LogicType::Probe => {
            let name = match name_arg(type_name, args)? {
                Some(name) => name,
                None => namer.next_probe(),
            };
            GateTemplate::new(name.clone(), &["A"], &["C"], Logic::Probe(ProbeState::default()))
                .with_args(vec![name.into()])
        }
        LogicType::Lamp => {
            no_args(type_name, args)?;
            GateTemplate::new("💡", &["A"], &[], Logic::Lamp { on: false })
        }
        LogicType::Counter => {
            no_args(type_name, args)?;
            GateTemplate::new(
                "#",
                &["A"],
                &[],
                Logic::Counter {
                    count: 0,
                    last: false,
                },
            )
        }
        LogicType::Input => {
            let name = match name_arg(type_name, args)? {
                Some(name) => name,
                None => namer.next_input(),
            };
            GateTemplate::new(name.clone(), &[], &["C"], Logic::Input)
                .with_type(GateType::CircuitInput)
                .with_args(vec![name.into()])
        }
        LogicType::Output => {
            let name = match name_arg(type_name, args)? {
                Some(name) => name,
                None => namer.next_output(),
            };
            GateTemplate::new(name.clone(), &["A"], &[], Logic::Output)
                .with_type(GateType::CircuitOutput)
                .with_args(vec![name.into()])
        }
    };

    Ok(template)
}

fn clock(period: Duration) -> GateTemplate {
    let ms = period.as_millis();
    let label = if ms > 0 && 1000 % ms == 0 {
        format!("{}Hz", 1000 / ms)
    } else {
        format!("{ms}ms")
    };

    GateTemplate::new(label, &[], &["C"], Logic::Clock { period })
        .with_info(format!("period {ms}ms"))
}

fn no_args(type_name: &str, args: &[Value]) -> eyre::Result<()> {
    if !args.is_empty() {
        eyre::bail!(CircuitError::invalid(format!("{type_name} takes no arguments")));
    }
    Ok(())
}

fn name_arg(type_name: &str, args: &[Value]) -> eyre::Result<Option<String>> {
    match args {
        [] => Ok(None),
        [Value::String(name)] if is_port_name(name) => Ok(Some(name.clone())),
        _ => eyre::bail!(CircuitError::invalid(format!(
            "{type_name} takes an optional name without surrounding spaces, `:` or ` to `"
        ))),
    }
}

fn bool_arg(type_name: &str, args: &[Value]) -> eyre::Result<Option<bool>> {
    match args {
        [] => Ok(None),
        [Value::Bool(value)] => Ok(Some(*value)),
        _ => eyre::bail!(CircuitError::invalid(format!(
            "{type_name} takes an optional boolean"
        ))),
    }
}
