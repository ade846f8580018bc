use crate::config::SimulationConfig;

/// Auto-naming counters for input, output and probe gates. Names cycle
/// through the configured table and gain a lap suffix: `A`..`J`, `A1`..`J1`.
#[derive(Debug, Clone)]
pub struct Namer {
    input_names: Vec<String>,
    output_names: Vec<String>,
    probe_markers: Vec<String>,
    input_index: usize,
    output_index: usize,
    probe_index: usize,
}

impl Namer {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            input_names: config.input_names.clone(),
            output_names: config.output_names.clone(),
            probe_markers: config.probe_markers.clone(),
            input_index: 0,
            output_index: 0,
            probe_index: 0,
        }
    }

    pub fn next_input(&mut self) -> String {
        format!("In {}", next_name(&self.input_names, &mut self.input_index))
    }

    pub fn next_output(&mut self) -> String {
        format!("Out {}", next_name(&self.output_names, &mut self.output_index))
    }

    pub fn next_probe(&mut self) -> String {
        format!("{} Probe", next_name(&self.probe_markers, &mut self.probe_index))
    }
}

impl Default for Namer {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

fn next_name(table: &[String], index: &mut usize) -> String {
    let current = *index;
    *index += 1;

    if table.is_empty() {
        return current.to_string();
    }

    let lap = current / table.len();
    let base = &table[current % table.len()];

    if lap > 0 {
        format!("{base}{lap}")
    } else {
        base.clone()
    }
}
