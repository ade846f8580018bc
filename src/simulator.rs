use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::circuit::Circuit;
use crate::config::SimulationConfig;

/// Ticks per second measured over the last second of wall-clock time.
#[derive(Debug, Default, Clone)]
pub struct Speedometer {
    samples: VecDeque<Instant>,
}

impl Speedometer {
    pub fn record(&mut self, now: Instant) {
        self.samples.push_back(now);
        while let Some(front) = self.samples.front() {
            if now.duration_since(*front) <= Duration::from_secs(1) {
                break;
            }
            self.samples.pop_front();
        }
    }

    pub fn ticks_per_second(&self) -> usize {
        self.samples.len()
    }
}

/// Drives a circuit at a fixed tick rate.
#[derive(Debug)]
pub struct Simulator {
    circuit: Circuit,
    interval: Duration,
    speedometer: Speedometer,
    progress: bool,
}

impl Simulator {
    pub fn new(circuit: Circuit, config: &SimulationConfig) -> eyre::Result<Self> {
        config.validate()?;

        Ok(Self {
            circuit,
            interval: Duration::from_secs_f64(1.0 / config.tick_rate),
            speedometer: Speedometer::default(),
            progress: false,
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn into_circuit(self) -> Circuit {
        self.circuit
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn ticks_per_second(&self) -> usize {
        self.speedometer.ticks_per_second()
    }

    /// Runs `ticks` ticks, sleeping out the rest of each interval. Returns
    /// the number of ticks run.
    pub fn run(&mut self, ticks: usize) -> eyre::Result<usize> {
        self.run_with(ticks, true)
    }

    /// Runs `ticks` ticks back to back. Clock gates see simulated time, one
    /// interval per tick.
    pub fn run_unpaced(&mut self, ticks: usize) -> eyre::Result<usize> {
        self.run_with(ticks, false)
    }

    fn run_with(&mut self, ticks: usize, paced: bool) -> eyre::Result<usize> {
        tracing::info!(
            "running {ticks} ticks at {:.1} Hz{}",
            1.0 / self.interval.as_secs_f64(),
            if paced { "" } else { " (unpaced)" }
        );

        let bar = if self.progress {
            let bar = ProgressBar::new(ticks as u64);
            bar.set_style(progress_style()?);
            bar
        } else {
            ProgressBar::hidden()
        };

        let started = Instant::now();

        for _ in 0..ticks {
            let tick_started = Instant::now();

            if paced {
                self.circuit.tick()?;
            } else {
                let elapsed = simulated_time(self.interval, self.circuit.ticks());
                self.circuit.tick_at(elapsed)?;
            }

            self.speedometer.record(Instant::now());
            bar.inc(1);
            bar.set_message(format!("{} tps", self.speedometer.ticks_per_second()));

            if paced {
                if let Some(rest) = self.interval.checked_sub(tick_started.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }

        bar.finish_and_clear();
        tracing::info!(
            "ran {ticks} ticks in {:?}, {} tps",
            started.elapsed(),
            self.speedometer.ticks_per_second()
        );

        Ok(ticks)
    }
}

/// Simulated time of tick number `ticks` when running unpaced.
fn simulated_time(interval: Duration, ticks: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(ticks));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn progress_style() -> eyre::Result<ProgressStyle> {
    Ok(ProgressStyle::with_template(
        "{spinner:.green} [{eta_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}",
    )?
    .progress_chars("#>-"))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{simulated_time, Simulator, Speedometer};
    use crate::blueprint::predefined;
    use crate::circuit::Circuit;
    use crate::config::SimulationConfig;
    use crate::logic::builder::GateRegistry;
    use crate::logic::Logic;

    #[test]
    fn unittest_speedometer_window() {
        let mut speedometer = Speedometer::default();
        let start = Instant::now();

        for ms in [0, 200, 400, 900, 1300, 1350] {
            speedometer.record(start + Duration::from_millis(ms));
        }

        // 0 and 200 fell out of the window ending at 1350
        assert_eq!(speedometer.ticks_per_second(), 4);
    }

    #[test]
    fn unittest_unpaced_clock() -> eyre::Result<()> {
        let registry = GateRegistry::default();
        let config = SimulationConfig {
            tick_rate: 10.0,
            ..Default::default()
        };

        let mut circuit = Circuit::new(&config);
        let clock = circuit.build_gate(&registry, "2Hz Clock", &[])?;
        let counter = circuit.build_gate(&registry, "Counter", &[])?;
        circuit.connect(clock, 0, counter, 0)?;

        let mut simulator = Simulator::new(circuit, &config)?;
        assert_eq!(simulator.interval(), Duration::from_millis(100));
        assert_eq!(simulator.run_unpaced(20)?, 20);

        let circuit = simulator.into_circuit();
        assert_eq!(circuit.ticks(), 20);
        // rising edges at 0, 500, 1000 and 1500ms
        assert!(matches!(
            circuit.primitive(counter)?,
            Logic::Counter { count: 4, .. }
        ));
        Ok(())
    }

    #[test]
    fn unittest_simulated_time_past_u32_ticks() {
        let interval = Duration::from_millis(1);
        let ticks = u64::from(u32::MAX) + 10;

        assert_eq!(simulated_time(interval, 0), Duration::ZERO);
        assert_eq!(simulated_time(interval, ticks), Duration::from_millis(ticks));
        assert_eq!(simulated_time(Duration::MAX, ticks), Duration::from_nanos(u64::MAX));
    }

    #[test]
    fn unittest_paced_latch() -> eyre::Result<()> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let registry = GateRegistry::default();
        let config = SimulationConfig {
            tick_rate: 1000.0,
            ..Default::default()
        };

        let mut circuit = Circuit::new(&config);
        let gates = predefined::sr_latch()?.instantiate(&mut circuit, &registry)?;

        let mut simulator = Simulator::new(circuit, &config)?;
        simulator.circuit_mut().press(gates["set"])?;

        let started = Instant::now();
        simulator.run(10)?;
        assert!(started.elapsed() >= Duration::from_millis(9));
        assert!(simulator.ticks_per_second() > 0);

        let circuit = simulator.circuit();
        assert!(circuit.read_input(gates["q"], 0)?);
        assert!(!circuit.read_input(gates["qn"], 0)?);
        Ok(())
    }

    #[test]
    fn unittest_simulator_rejects_bad_rate() {
        let config = SimulationConfig {
            tick_rate: -1.0,
            ..Default::default()
        };

        assert!(Simulator::new(Circuit::default(), &config).is_err());
    }
}
