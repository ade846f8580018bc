use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use eyre::ContextCompat;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blueprint::connection::is_port_name;
use crate::config::SimulationConfig;
use crate::error::CircuitError;
use crate::logic::builder::{GateRegistry, GateTemplate};
use crate::logic::naming::Namer;
use crate::logic::{Logic, TickContext};
use crate::utils::Verify;

pub mod connector;
pub mod edge;
pub mod gate;
pub mod wiring;

pub use connector::{Connector, ConnectorCollection, Direction};
pub use edge::Edge;
pub use gate::{Gate, GateLogic, GateType};
pub use wiring::Wiring;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("g{_0}")]
pub struct GateId(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("c{_0}")]
pub struct ConnectorId(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("e{_0}")]
pub struct EdgeId(pub usize);

/// Layout position handed through to the renderer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A change to the gate list requested between ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mutation {
    Attach(GateId),
    Detach(GateId),
    Dispose(GateId),
}

/// The simulation context: every gate, connector and edge, the ordered list
/// of active gates, layout metadata and the auto-naming counters.
///
/// Each tick evaluates the active gates once, strictly in list order. A gate
/// driven by a gate later in the list (or through a feedback loop) sees the
/// value from the previous tick, so latches settle over several ticks.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub(crate) gates: HashMap<GateId, Gate>,
    pub(crate) order: Vec<GateId>,
    pub(crate) wiring: Wiring,
    pub(crate) layout: HashMap<GateId, Point>,
    pending: VecDeque<Mutation>,
    namer: Namer,
    next_gate: usize,
    ticks: u64,
    epoch: Instant,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl Circuit {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            gates: HashMap::new(),
            order: Vec::new(),
            wiring: Wiring::default(),
            layout: HashMap::new(),
            pending: VecDeque::new(),
            namer: Namer::new(config),
            next_gate: 0,
            ticks: 0,
            epoch: Instant::now(),
        }
    }

    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    pub fn wiring_mut(&mut self) -> &mut Wiring {
        &mut self.wiring
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Active gates in evaluation order.
    pub fn order(&self) -> &[GateId] {
        &self.order
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.order.iter().filter_map(|id| self.gates.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: GateId) -> bool {
        self.gates.contains_key(&id)
    }

    pub fn is_attached(&self, id: GateId) -> bool {
        self.order.contains(&id)
    }

    pub fn gate(&self, id: GateId) -> eyre::Result<&Gate> {
        self.gates
            .get(&id)
            .with_context(|| format!("gate {id} not found"))
    }

    pub(crate) fn gate_mut(&mut self, id: GateId) -> eyre::Result<&mut Gate> {
        self.gates
            .get_mut(&id)
            .with_context(|| format!("gate {id} not found"))
    }

    pub fn primitive(&self, id: GateId) -> eyre::Result<&Logic> {
        self.gate(id)?
            .logic
            .as_primitive()
            .with_context(|| format!("gate {id} is a packed gate"))
    }

    pub fn build_gate(
        &mut self,
        registry: &GateRegistry,
        type_name: &str,
        args: &[Value],
    ) -> eyre::Result<GateId> {
        let template = registry.build(type_name, &mut self.namer, args)?;
        self.add_gate(template)
    }

    /// Materializes a template and appends it to the gate list.
    pub fn add_gate(&mut self, template: GateTemplate) -> eyre::Result<GateId> {
        let id = self.insert_gate(template)?;
        self.order.push(id);
        Ok(id)
    }

    // creates the gate and its connectors without attaching it
    pub(crate) fn insert_gate(&mut self, template: GateTemplate) -> eyre::Result<GateId> {
        validate_template(&template)?;

        let id = GateId(self.next_gate);
        self.next_gate += 1;

        let inputs = template
            .inputs
            .into_iter()
            .map(|name| self.wiring.add_connector(id, name, Direction::Input))
            .collect();
        let outputs = template
            .outputs
            .into_iter()
            .map(|name| self.wiring.add_connector(id, name, Direction::Output))
            .collect();

        tracing::debug!("create gate {id} `{}` ({})", template.name, template.builder);

        self.gates.insert(
            id,
            Gate {
                id,
                name: template.name,
                info: template.info,
                gate_type: template.gate_type,
                builder: template.builder,
                args: template.args,
                inputs: ConnectorCollection::new(Direction::Input, inputs),
                outputs: ConnectorCollection::new(Direction::Output, outputs),
                logic: template.logic,
                packed_in: None,
            },
        );

        Ok(id)
    }

    pub fn input(&self, id: GateId, index: usize) -> eyre::Result<ConnectorId> {
        self.gate(id)?.inputs.get(index)
    }

    pub fn output(&self, id: GateId, index: usize) -> eyre::Result<ConnectorId> {
        self.gate(id)?.outputs.get(index)
    }

    pub fn input_by_name(&self, id: GateId, name: &str) -> eyre::Result<ConnectorId> {
        let gate = self.gate(id)?;
        let index = gate
            .inputs
            .position(&self.wiring, name)
            .with_context(|| format!("gate {id} has no input `{name}`"))?;
        gate.inputs.get(index)
    }

    pub fn output_by_name(&self, id: GateId, name: &str) -> eyre::Result<ConnectorId> {
        let gate = self.gate(id)?;
        let index = gate
            .outputs
            .position(&self.wiring, name)
            .with_context(|| format!("gate {id} has no output `{name}`"))?;
        gate.outputs.get(index)
    }

    /// Connects output `output` of `source` to input `input` of `target`.
    pub fn connect(
        &mut self,
        source: GateId,
        output: usize,
        target: GateId,
        input: usize,
    ) -> eyre::Result<EdgeId> {
        let start = self.output(source, output)?;
        let end = self.input(target, input)?;
        self.wiring.connect(start, end)
    }

    pub fn read_output(&self, id: GateId, index: usize) -> eyre::Result<bool> {
        self.gate(id)?.outputs.read(&self.wiring, index)
    }

    pub fn read_input(&self, id: GateId, index: usize) -> eyre::Result<bool> {
        self.gate(id)?.inputs.read(&self.wiring, index)
    }

    pub fn force(&mut self, id: GateId, index: usize, value: bool) -> eyre::Result<()> {
        let gate = self
            .gates
            .get(&id)
            .with_context(|| format!("gate {id} not found"))?;
        gate.outputs.force(&mut self.wiring, index, value)
    }

    /// Flips a switch and returns its new state. The gate's rebuild
    /// arguments follow, so a blueprint created afterwards keeps the state.
    pub fn toggle(&mut self, id: GateId) -> eyre::Result<bool> {
        let gate = self.gate_mut(id)?;
        let on = match gate.logic {
            GateLogic::Primitive(Logic::Switch { ref mut on }) => {
                *on = !*on;
                *on
            }
            _ => eyre::bail!(CircuitError::invalid(format!("gate {id} is not a switch"))),
        };

        gate.args = vec![Value::Bool(on)];
        Ok(on)
    }

    pub fn press(&mut self, id: GateId) -> eyre::Result<()> {
        self.set_button(id, true)
    }

    pub fn release(&mut self, id: GateId) -> eyre::Result<()> {
        self.set_button(id, false)
    }

    fn set_button(&mut self, id: GateId, value: bool) -> eyre::Result<()> {
        match self.gate_mut(id)?.logic {
            GateLogic::Primitive(Logic::Button { ref mut pressed }) => {
                *pressed = value;
                Ok(())
            }
            _ => eyre::bail!(CircuitError::invalid(format!("gate {id} is not a button"))),
        }
    }

    /// Connected edges touching any connector of the gate.
    pub fn edges_of(&self, id: GateId) -> eyre::Result<Vec<EdgeId>> {
        let gate = self.gate(id)?;
        let mut edges = Vec::new();

        for connector in gate.inputs.ids().iter().chain(gate.outputs.ids()) {
            edges.extend_from_slice(self.wiring.connector(*connector)?.edges());
        }

        Ok(edges.into_iter().sorted().dedup().collect())
    }

    pub fn position(&self, id: GateId) -> Option<Point> {
        self.layout.get(&id).copied()
    }

    pub fn set_position(&mut self, id: GateId, point: Point) -> eyre::Result<()> {
        eyre::ensure!(self.contains(id), "gate {id} not found");
        self.layout.insert(id, point);
        Ok(())
    }

    /// Removes the gate from the gate list but keeps its connectors, edges
    /// and state so it can be attached again.
    pub fn detach(&mut self, id: GateId) -> eyre::Result<()> {
        let Some(index) = self.order.iter().position(|gate| *gate == id) else {
            eyre::bail!(CircuitError::invalid(format!("gate {id} is not attached")));
        };

        self.order.remove(index);
        tracing::debug!("detach gate {id}");
        Ok(())
    }

    pub fn attach(&mut self, id: GateId) -> eyre::Result<()> {
        let gate = self.gate(id)?;

        if let Some(owner) = gate.packed_in {
            eyre::bail!(CircuitError::invalid(format!(
                "gate {id} is packed in {owner}"
            )));
        }

        if self.is_attached(id) {
            eyre::bail!(CircuitError::invalid(format!("gate {id} is already attached")));
        }

        self.order.push(id);
        tracing::debug!("attach gate {id}");
        Ok(())
    }

    /// Destroys the gate: unregisters it, disposes every edge touching it
    /// and drops its state. A packed gate takes its captured gates with it.
    pub fn dispose(&mut self, id: GateId) -> eyre::Result<Vec<EdgeId>> {
        if let Some(owner) = self.gate(id)?.packed_in {
            eyre::bail!(CircuitError::invalid(format!(
                "gate {id} is packed in {owner}, dispose the packed gate instead"
            )));
        }

        self.dispose_inner(id)
    }

    pub(crate) fn dispose_inner(&mut self, id: GateId) -> eyre::Result<Vec<EdgeId>> {
        let gate = self
            .gates
            .remove(&id)
            .with_context(|| format!("gate {id} not found"))?;

        self.order.retain(|gate| *gate != id);
        self.layout.remove(&id);

        let mut disposed = Vec::new();
        for connector in gate.inputs.ids().iter().chain(gate.outputs.ids()) {
            disposed.extend(self.wiring.remove_connector(*connector)?);
        }

        if let GateLogic::Packed(packed) = gate.logic {
            for captured in packed.gates {
                disposed.extend(self.dispose_inner(captured)?);
            }
        }

        tracing::debug!("dispose gate {id} `{}`", gate.name);

        Ok(disposed)
    }

    /// Disposes every active gate.
    pub fn clear(&mut self) -> eyre::Result<()> {
        for id in self.order.clone() {
            self.dispose(id)?;
        }

        self.pending.clear();
        Ok(())
    }

    /// Queues a gate-list change until the next tick boundary.
    pub fn defer(&mut self, mutation: Mutation) {
        self.pending.push_back(mutation);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn apply_pending(&mut self) -> eyre::Result<()> {
        while let Some(mutation) = self.pending.pop_front() {
            let id = match mutation {
                Mutation::Attach(id) | Mutation::Detach(id) | Mutation::Dispose(id) => id,
            };

            if !self.contains(id) {
                tracing::warn!("skip {mutation:?}, gate {id} no longer exists");
                continue;
            }

            match mutation {
                Mutation::Attach(id) => self.attach(id)?,
                Mutation::Detach(id) => self.detach(id)?,
                Mutation::Dispose(id) => {
                    self.dispose(id)?;
                }
            }
        }

        Ok(())
    }

    /// Advances one tick using wall-clock time since the circuit was created.
    pub fn tick(&mut self) -> eyre::Result<()> {
        let elapsed = self.epoch.elapsed();
        self.tick_at(elapsed)
    }

    pub fn tick_at(&mut self, elapsed: Duration) -> eyre::Result<()> {
        self.apply_pending()?;

        let ctx = TickContext {
            tick: self.ticks,
            elapsed,
        };

        let order = std::mem::take(&mut self.order);
        let result = order.iter().try_for_each(|id| self.run_gate(*id, &ctx));
        self.order = order;
        result?;

        self.ticks += 1;
        Ok(())
    }

    /// Ticks until no output value changes between two ticks and returns the
    /// number of ticks that took.
    pub fn settle(&mut self, max_ticks: usize) -> eyre::Result<usize> {
        let mut previous = self.wiring.snapshot();

        for tick in 1..=max_ticks {
            self.tick()?;

            let current = self.wiring.snapshot();
            if current == previous {
                return Ok(tick);
            }
            previous = current;
        }

        eyre::bail!("circuit did not settle within {max_ticks} ticks")
    }

    pub(crate) fn run_gate(&mut self, id: GateId, ctx: &TickContext) -> eyre::Result<()> {
        let gate = self
            .gates
            .get(&id)
            .with_context(|| format!("gate {id} not found"))?;

        let inputs = gate.inputs.to_bool_array(&self.wiring)?;
        let mut outputs = gate.outputs.to_bool_array(&self.wiring)?;

        match gate.logic.as_packed().cloned() {
            Some(packed) => self.run_packed(&packed, &inputs, &mut outputs, ctx)?,
            None => {
                let gate = self.gate_mut(id)?;
                if let GateLogic::Primitive(logic) = &mut gate.logic {
                    logic.evaluate(&gate.name, &inputs, &mut outputs, ctx);
                }
            }
        }

        let gate = self
            .gates
            .get(&id)
            .with_context(|| format!("gate {id} not found"))?;
        gate.outputs.from_bool_array(&mut self.wiring, &outputs)
    }
}

fn validate_template(template: &GateTemplate) -> eyre::Result<()> {
    for (side, names) in [("input", &template.inputs), ("output", &template.outputs)] {
        if let Some(name) = names.iter().duplicates().next() {
            eyre::bail!(CircuitError::invalid(format!(
                "`{}` declares {side} `{name}` twice",
                template.name
            )));
        }

        if let Some(name) = names.iter().find(|name| !is_port_name(name)) {
            eyre::bail!(CircuitError::invalid(format!(
                "`{}` declares {side} {name:?}, which a connection cannot name",
                template.name
            )));
        }
    }

    let arity = (template.inputs.len(), template.outputs.len());
    match template.gate_type {
        GateType::CircuitInput if arity != (0, 1) => eyre::bail!(CircuitError::invalid(format!(
            "circuit input `{}` needs zero inputs and one output",
            template.name
        ))),
        GateType::CircuitOutput if arity != (1, 0) => eyre::bail!(CircuitError::invalid(
            format!("circuit output `{}` needs one input and zero outputs", template.name)
        )),
        _ => Ok(()),
    }
}

impl Verify for Circuit {
    fn verify(&self) -> eyre::Result<()> {
        let mut seen = HashSet::new();
        for id in &self.order {
            eyre::ensure!(seen.insert(*id), "gate {id} appears twice in the gate list");
            eyre::ensure!(
                self.gate(*id)?.packed_in.is_none(),
                "captured gate {id} is attached"
            );
        }

        for gate in self.gates.values() {
            for connector_id in gate.inputs.ids().iter().chain(gate.outputs.ids()) {
                eyre::ensure!(
                    self.wiring.connector(*connector_id)?.is_sealed() == gate.packed_in.is_some(),
                    "connector {connector_id} of gate {} is sealed out of step with its gate",
                    gate.id
                );
            }

            for connector_id in gate.inputs.ids() {
                let connector = self.wiring.connector(*connector_id)?;
                eyre::ensure!(
                    connector.edges().len() <= 1,
                    "input {connector_id} of gate {} has {} incoming edges",
                    gate.id,
                    connector.edges().len()
                );
            }
        }

        for (id, edge) in self.wiring.edges() {
            let end = edge.end.with_context(|| format!("edge {id} is pending"))?;
            eyre::ensure!(
                self.wiring.connector(edge.start)?.edges().contains(&id),
                "edge {id} is not registered at its start"
            );
            eyre::ensure!(
                self.wiring.connector(end)?.edges().contains(&id),
                "edge {id} is not registered at its end"
            );

            let start_owner = self.gate(self.wiring.connector(edge.start)?.gate)?.packed_in;
            let end_owner = self.gate(self.wiring.connector(end)?.gate)?.packed_in;
            eyre::ensure!(
                start_owner == end_owner,
                "edge {id} crosses the boundary of a packed gate"
            );
        }

        Ok(())
    }
}
