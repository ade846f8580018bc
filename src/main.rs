use std::fs;
use std::path::{Path, PathBuf};

use eyre::{ContextCompat, WrapErr};
use gate_canvas::blueprint::{predefined, Blueprint};
use gate_canvas::circuit::{Circuit, GateId};
use gate_canvas::config::SimulationConfig;
use gate_canvas::graph::graphviz::ToGraphviz;
use gate_canvas::graph::CircuitGraph;
use gate_canvas::logic::builder::GateRegistry;
use gate_canvas::simulator::Simulator;
use indexmap::IndexMap;
use structopt::StructOpt;
use tracing::Level;

#[derive(Debug, StructOpt)]
#[structopt(name = "gate-canvas", about = "Logic gate network simulator")]
struct Opt {
    /// JSON file overriding the simulation defaults
    #[structopt(long, parse(from_os_str), global = true)]
    config: Option<PathBuf>,

    /// Log more, repeat for more detail
    #[structopt(short, long, parse(from_occurrences), global = true)]
    verbose: u8,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Simulate a blueprint and print the final values of its gates
    Run {
        /// Blueprint file or predefined name
        blueprint: String,
        #[structopt(long, default_value = "120")]
        ticks: usize,
        /// Tick as fast as possible using simulated time
        #[structopt(long)]
        unpaced: bool,
        /// Switches to flip before the first tick
        #[structopt(long)]
        toggle: Vec<String>,
        /// Buttons to hold down for the whole run
        #[structopt(long)]
        press: Vec<String>,
    },
    /// Print a blueprint as a graphviz digraph
    Dot { blueprint: String },
    /// Pack every gate of a blueprint into one and print the result
    Pack { blueprint: String },
    /// Print a predefined blueprint
    Starter {
        #[structopt(default_value = "sr-latch")]
        name: String,
    },
    /// List the registered gate types
    Gates,
}

fn main() -> eyre::Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &opt.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    let registry = GateRegistry::default();

    match opt.command {
        Command::Run {
            blueprint,
            ticks,
            unpaced,
            toggle,
            press,
        } => {
            let mut circuit = Circuit::new(&config);
            let gates = load_blueprint(&blueprint)?.instantiate(&mut circuit, &registry)?;

            for local in &toggle {
                circuit.toggle(lookup(&gates, local)?)?;
            }
            for local in &press {
                circuit.press(lookup(&gates, local)?)?;
            }

            let mut simulator = Simulator::new(circuit, &config)?.with_progress(!unpaced);
            if unpaced {
                simulator.run_unpaced(ticks)?;
            } else {
                simulator.run(ticks)?;
            }

            print_values(simulator.circuit(), &gates)?;
        }
        Command::Dot { blueprint } => {
            let mut circuit = Circuit::new(&config);
            load_blueprint(&blueprint)?.instantiate(&mut circuit, &registry)?;
            print!("{}", CircuitGraph::new(&circuit)?.to_graphviz());
        }
        Command::Pack { blueprint } => {
            let mut circuit = Circuit::new(&config);
            load_blueprint(&blueprint)?.instantiate(&mut circuit, &registry)?;
            let packed = circuit.pack_all()?;
            println!("{}", Blueprint::create(&circuit, &[packed])?.to_text()?);
        }
        Command::Starter { name } => {
            println!("{}", predefined::by_name(&name)?.to_text()?);
        }
        Command::Gates => {
            for name in registry.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn load_blueprint(source: &str) -> eyre::Result<Blueprint> {
    let path = Path::new(source);
    if !path.exists() && predefined::NAMES.contains(&source) {
        return predefined::by_name(source);
    }

    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read blueprint {}", path.display()))?;
    text.parse::<Blueprint>()
        .wrap_err_with(|| format!("cannot load blueprint {}", path.display()))
}

fn lookup(gates: &IndexMap<String, GateId>, local: &str) -> eyre::Result<GateId> {
    gates
        .get(local)
        .copied()
        .with_context(|| format!("blueprint declares no gate `{local}`"))
}

fn print_values(circuit: &Circuit, gates: &IndexMap<String, GateId>) -> eyre::Result<()> {
    for (local, id) in gates {
        let gate = circuit.gate(*id)?;
        let bits = |values: Vec<bool>| {
            values
                .into_iter()
                .map(|value| if value { '1' } else { '0' })
                .collect::<String>()
        };

        println!(
            "{local:<12} {:<12} in {:<4} out {}",
            gate.name,
            bits(gate.inputs.to_bool_array(circuit.wiring())?),
            bits(gate.outputs.to_bool_array(circuit.wiring())?),
        );
    }
    Ok(())
}
