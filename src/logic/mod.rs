use std::time::Duration;

use strum_macros::{AsRefStr, EnumIter};

pub mod builder;
pub mod naming;

/// Built-in gate kinds, named as they appear in blueprints.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
pub enum LogicType {
    And,
    Or,
    Not,
    Xor,
    Switch,
    Button,
    True,
    Clock,
    Probe,
    Lamp,
    Counter,
    Input,
    Output,
}

impl LogicType {
    pub fn name(&self) -> &str {
        self.as_ref()
    }
}

/// Simulation time handed to every gate evaluated during one tick.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct TickContext {
    pub tick: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProbeReport {
    pub was_on: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeState {
    last_on: Option<Duration>,
    last_off: Option<Duration>,
    pub last_report: Option<ProbeReport>,
}

/// Behaviour of a primitive gate together with its private state.
#[derive(Debug, Clone, PartialEq)]
pub enum Logic {
    And,
    Or,
    Not,
    Xor,
    True,
    Switch { on: bool },
    Button { pressed: bool },
    Clock { period: Duration },
    Probe(ProbeState),
    Lamp { on: bool },
    Counter { count: u64, last: bool },
    // driven from outside, usually by the packed gate that owns it
    Input,
    Output,
}

impl Logic {
    /// Runs one evaluation step. `outputs` holds the current output values on
    /// entry and the new ones on return; gates that do not write an output
    /// keep its previous value.
    pub fn evaluate(&mut self, label: &str, inputs: &[bool], outputs: &mut [bool], ctx: &TickContext) {
        let a = input(inputs, 0);
        let b = input(inputs, 1);

        let value = match self {
            Logic::And => Some(a && b),
            Logic::Or => Some(a || b),
            Logic::Not => Some(!a),
            Logic::Xor => Some(a != b),
            Logic::True => Some(true),
            Logic::Switch { on } => Some(*on),
            Logic::Button { pressed } => Some(*pressed),
            Logic::Clock { period } => {
                let period = period.as_millis().max(1);
                Some(ctx.elapsed.as_millis() % period < period / 2)
            }
            Logic::Probe(state) => {
                state.observe(label, a, ctx.elapsed);
                Some(a)
            }
            Logic::Lamp { on } => {
                if *on != a {
                    tracing::debug!("{label} turned {}", if a { "on" } else { "off" });
                    *on = a;
                }
                None
            }
            Logic::Counter { count, last } => {
                if a && !*last {
                    *count += 1;
                }
                *last = a;
                None
            }
            Logic::Input | Logic::Output => None,
        };

        if let (Some(value), Some(out)) = (value, outputs.first_mut()) {
            *out = value;
        }
    }
}

impl ProbeState {
    fn observe(&mut self, label: &str, on: bool, now: Duration) {
        if on && self.last_on.is_none() {
            self.last_on = Some(now);
        } else if let (false, Some(since)) = (on, self.last_on) {
            let duration = now.saturating_sub(since);
            tracing::info!("{label} on for {}ms", duration.as_millis());
            self.last_report = Some(ProbeReport {
                was_on: true,
                duration,
            });
            self.last_on = None;
        }

        if !on && self.last_off.is_none() {
            self.last_off = Some(now);
        } else if let (true, Some(since)) = (on, self.last_off) {
            let duration = now.saturating_sub(since);
            tracing::info!("{label} off for {}ms", duration.as_millis());
            self.last_report = Some(ProbeReport {
                was_on: false,
                duration,
            });
            self.last_off = None;
        }
    }
}

fn input(inputs: &[bool], index: usize) -> bool {
    inputs.get(index).copied().unwrap_or(false)
}
