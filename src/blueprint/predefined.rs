use super::{Blueprint, GateSpec, PACKED};

const SR_LATCH: &str = r#"{
  declaration: {
    set: "Button",
    reset: "Button",
    or_q: "Or",
    not_q: "Not",
    or_qn: "Or",
    not_qn: "Not",
    q: "Lamp",
    qn: "Lamp",
  },
  positions: {
    set: { x: 40, y: 40 },
    reset: { x: 40, y: 200 },
    or_q: { x: 200, y: 200 },
    not_q: { x: 340, y: 200 },
    or_qn: { x: 200, y: 40 },
    not_qn: { x: 340, y: 40 },
    q: { x: 500, y: 200 },
    qn: { x: 500, y: 40 },
  },
  connections: [
    "reset to or_q:A",
    "not_qn to or_q:B",
    "or_q to not_q",
    "set to or_qn:A",
    "not_q to or_qn:B",
    "or_qn to not_qn",
    "not_q to q",
    "not_qn to qn",
  ],
}"#;

const HALF_ADDER: &str = r#"{
  declaration: {
    a: { type: "Input", args: ["In A"] },
    b: { type: "Input", args: ["In B"] },
    xor: "Xor",
    and: "And",
    sum: { type: "Output", args: ["Out S"] },
    carry: { type: "Output", args: ["Out C"] },
  },
  connections: [
    "a to xor:A",
    "b to xor:B",
    "a to and:A",
    "b to and:B",
    "xor to sum",
    "and to carry",
  ],
}"#;

// `ha1` and `ha2` receive the packed half adder
const FULL_ADDER: &str = r#"{
  declaration: {
    a: { type: "Input", args: ["A"] },
    b: { type: "Input", args: ["B"] },
    cin: { type: "Input", args: ["Cin"] },
    ha1: "Packed",
    ha2: "Packed",
    carry: "Or",
    sum: { type: "Output", args: ["S"] },
    cout: { type: "Output", args: ["Cout"] },
  },
  connections: [
    "a to ha1:In A",
    "b to ha1:In B",
    "ha1:Out S to ha2:In A",
    "cin to ha2:In B",
    "ha1:Out C to carry:A",
    "ha2:Out C to carry:B",
    "ha2:Out S to sum",
    "carry to cout",
  ],
}"#;

/// The starter circuit: a set/reset latch of two cross-coupled OR/NOT
/// pairs, driven by two buttons and shown on two lamps.
pub fn sr_latch() -> eyre::Result<Blueprint> {
    SR_LATCH.parse()
}

pub fn half_adder() -> eyre::Result<Blueprint> {
    HALF_ADDER.parse()
}

/// A full adder built from two packed half adders.
pub fn full_adder() -> eyre::Result<Blueprint> {
    let mut blueprint: Blueprint = FULL_ADDER.parse()?;
    let half_adder = serde_json::to_value(half_adder()?)?;

    for local in ["ha1", "ha2"] {
        blueprint
            .declaration
            .insert(local.to_string(), GateSpec::new(PACKED, vec![half_adder.clone()]));
    }

    Ok(blueprint)
}

/// Looks a predefined blueprint up by name.
pub fn by_name(name: &str) -> eyre::Result<Blueprint> {
    match name {
        "sr-latch" => sr_latch(),
        "half-adder" => half_adder(),
        "full-adder" => full_adder(),
        _ => eyre::bail!("no predefined blueprint named `{name}`"),
    }
}

pub const NAMES: [&str; 3] = ["sr-latch", "half-adder", "full-adder"];
