use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};

use crate::blueprint::connection::is_port_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // ticks per second the simulator aims for
    pub tick_rate: f64,
    // upper bound for `Circuit::settle`
    pub settle_limit: usize,
    pub probe_markers: Vec<String>,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 120.0,
            settle_limit: 64,
            probe_markers: to_strings(&["🔴", "🟠", "🟡", "🟢", "🔵", "🟣", "🟤"]),
            input_names: to_strings(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"]),
            output_names: to_strings(&["Q", "R", "S", "T", "U", "V", "W", "X", "Y", "Z"]),
        }
    }
}

impl SimulationConfig {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let file = File::open(path)
            .wrap_err_with(|| format!("cannot open config {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("cannot parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        eyre::ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick rate must be positive, got {}",
            self.tick_rate
        );
        eyre::ensure!(!self.probe_markers.is_empty(), "probe markers are empty");
        eyre::ensure!(!self.input_names.is_empty(), "input names are empty");
        eyre::ensure!(!self.output_names.is_empty(), "output names are empty");

        // auto names become port names once their gates are packed
        for name in self.input_names.iter().chain(&self.output_names) {
            eyre::ensure!(
                is_port_name(&format!("In {name}")),
                "{name:?} cannot be used in a port name"
            );
        }
        Ok(())
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
