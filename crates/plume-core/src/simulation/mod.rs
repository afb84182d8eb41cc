mod metrics;

pub use metrics::{AgentSnapshot, RunSummary, StepMetrics, StepTimings};

use crate::config::ScenarioConfig;
use crate::environment::{Environment, EnvironmentInitError};
use crate::mosquito::{MosquitoPopulation, PopulationInitError};
use std::time::Instant;
use std::{error::Error, fmt};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationInitError {
    Environment(EnvironmentInitError),
    Population {
        index: usize,
        source: PopulationInitError,
    },
}

impl fmt::Display for SimulationInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationInitError::Environment(e) => write!(f, "{}", e),
            SimulationInitError::Population { index, source } => {
                write!(f, "population {index}: {source}")
            }
        }
    }
}

impl From<EnvironmentInitError> for SimulationInitError {
    fn from(err: EnvironmentInitError) -> Self {
        SimulationInitError::Environment(err)
    }
}

impl Error for SimulationInitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SimulationInitError::Environment(e) => Some(e),
            SimulationInitError::Population { source, .. } => Some(source),
        }
    }
}

/// Couples one environment with any number of populations and advances
/// them together from `initial_time` to `final_time`.
pub struct Simulation {
    environment: Environment,
    populations: Vec<MosquitoPopulation>,
    step_index: usize,
}

impl Simulation {
    pub fn new(scenario: ScenarioConfig) -> Self {
        Self::try_new(scenario).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(scenario: ScenarioConfig) -> Result<Self, SimulationInitError> {
        let environment = Environment::try_new(scenario.sim, scenario.hosts)?;
        let populations = scenario
            .populations
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                MosquitoPopulation::try_new(spec.config, &spec.initial_x, &environment)
                    .map_err(|source| SimulationInitError::Population { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_parts(environment, populations))
    }

    /// Populations must have been built against `environment`.
    pub fn from_parts(environment: Environment, populations: Vec<MosquitoPopulation>) -> Self {
        Self {
            environment,
            populations,
            step_index: 0,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn populations(&self) -> &[MosquitoPopulation] {
        &self.populations
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Time at the start of the next step.
    pub fn time(&self) -> f64 {
        let config = self.environment.config();
        config.initial_time + self.step_index as f64 * config.dt
    }

    /// Field steps between `initial_time` and `final_time`.
    pub fn total_steps(&self) -> usize {
        let config = self.environment.config();
        ((config.final_time - config.initial_time) / config.dt).round() as usize
    }

    /// True once every agent of every population has stopped searching.
    /// A simulation without populations is never terminal.
    pub fn all_terminal(&self) -> bool {
        !self.populations.is_empty() && self.populations.iter().all(|p| p.stop_simulation())
    }

    /// One field step. On decision boundaries every population decides
    /// first, sensing the field at the current time.
    pub fn step(&mut self) -> StepTimings {
        let total_start = Instant::now();
        let t = self.time();

        let t0 = Instant::now();
        let decided = self.step_index % self.environment.steps_per_decision() == 0;
        if decided {
            for population in &mut self.populations {
                population.update_position(&self.environment, t);
            }
        }
        let decision_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        self.environment.update_environment(t);
        let field_update_us = t1.elapsed().as_micros() as u64;

        self.step_index += 1;
        StepTimings {
            decision_us,
            field_update_us,
            total_us: total_start.elapsed().as_micros() as u64,
            decided,
        }
    }

    /// Step until `final_time`, or until every agent is terminal.
    pub fn run(&mut self) -> RunSummary {
        let total = self.total_steps();
        let config = self.environment.config();
        let sample_every = config.sample_every;
        let sample_period = self
            .environment
            .steps_per_decision()
            .saturating_mul(sample_every);
        info!(
            steps = total,
            populations = self.populations.len(),
            hosts = self.environment.hosts().len(),
            "simulation started"
        );

        let mut samples = Vec::with_capacity(total / sample_period + 1);
        let mut stopped_early = false;
        while self.step_index < total {
            self.step();
            let done = self.all_terminal();
            if done || self.step_index % sample_period == 0 || self.step_index == total {
                samples.push(self.collect_step_metrics());
            }
            if done {
                stopped_early = self.step_index < total;
                break;
            }
        }

        let final_counts: Vec<_> = self.populations.iter().map(|p| p.counts()).collect();
        let searching: usize = final_counts.iter().map(|c| c.searching).sum();
        if searching > 0 {
            warn!(searching, t = self.environment.time(), "run ended with agents still searching");
        }
        info!(
            steps = self.step_index,
            t = self.environment.time(),
            stopped_early,
            "simulation finished"
        );

        RunSummary {
            schema_version: 1,
            steps: self.step_index,
            final_time: self.environment.time(),
            sample_every,
            stopped_early,
            samples,
            final_counts,
            agents: self.agent_snapshots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PopulationConfig, PopulationSpec, RandomWindConfig, SimConfig};
    use crate::mosquito::PlumeFinding;
    use crate::spatial::Host;
    use crate::wind::RandomWindMode;

    fn scenario(final_time: f64, populations: Vec<PopulationSpec>) -> ScenarioConfig {
        ScenarioConfig {
            sim: SimConfig {
                final_time,
                random_wind: RandomWindConfig {
                    mode: RandomWindMode::Off,
                    ..RandomWindConfig::default()
                },
                ..SimConfig::default()
            },
            hosts: Vec::new(),
            populations,
        }
    }

    fn upwind(initial_y: Option<f64>) -> PopulationSpec {
        PopulationSpec {
            config: PopulationConfig {
                start_time: 0.0,
                initial_y,
                ..PopulationConfig::for_strategy(PlumeFinding::Upwind)
            },
            initial_x: vec![50.0],
        }
    }

    #[test]
    fn decisions_happen_once_per_interval() {
        let mut sim = Simulation::new(scenario(5.0, vec![upwind(None)]));
        assert!(sim.step().decided);
        for _ in 1..10 {
            assert!(!sim.step().decided);
        }
        assert_eq!(sim.populations()[0].agents()[0].decisions, 1);
        assert!(sim.step().decided);
        assert_eq!(sim.populations()[0].agents()[0].decisions, 2);
        assert!((sim.time() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn run_without_agents_reaches_final_time() {
        let mut sim = Simulation::new(scenario(2.0, Vec::new()));
        let summary = sim.run();
        assert_eq!(summary.steps, 20);
        assert!(!summary.stopped_early);
        assert!((summary.final_time - 2.0).abs() < 1e-9);
        // sample_every = 10 decisions = 100 steps, so only the final sample
        assert_eq!(summary.samples.len(), 1);
        assert!(summary.agents.is_empty());
    }

    #[test]
    fn run_stops_once_every_agent_is_terminal() {
        let mut sim = Simulation::new(scenario(100.0, vec![upwind(Some(0.3))]));
        let summary = sim.run();
        assert!(summary.stopped_early);
        assert_eq!(summary.steps, 1);
        assert_eq!(summary.final_counts[0].lost, 1);
        assert_eq!(summary.samples.len(), 1);
        assert_eq!(summary.agents.len(), 1);
    }

    #[test]
    fn huge_sample_interval_keeps_only_the_final_sample() {
        let mut scenario = scenario(1.0, Vec::new());
        scenario.sim.sample_every = usize::MAX;
        let summary = Simulation::new(scenario).run();
        assert_eq!(summary.steps, 10);
        assert_eq!(summary.samples.len(), 1);
    }

    #[test]
    fn agents_sense_the_field_before_it_advances() {
        let mut scenario = scenario(5.0, vec![upwind(Some(50.0))]);
        scenario.hosts = vec![Host::new(50.0, 50.0, 10.0)];
        scenario.populations[0].config.host_radius = 0.0;
        let mut sim = Simulation::new(scenario);
        let thresh = sim.populations()[0].config().co2.thresh;
        assert_eq!(sim.environment().signal_at(50.0, 50.0).co2, 0.0);

        assert!(sim.step().decided);
        // One step of emission lifts the agent's starting cell into the plume,
        // but the decision saw the empty field.
        assert!(sim.environment().signal_at(50.0, 50.0).co2 > thresh);
        let agent = &sim.populations()[0].agents()[0];
        assert_eq!(agent.decisions, 1);
        assert_eq!(agent.previous_co2, 0.0);
    }

    #[test]
    fn reports_which_population_failed() {
        let mut bad = upwind(None);
        bad.initial_x.clear();
        let err = Simulation::try_new(scenario(1.0, vec![upwind(None), bad]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            SimulationInitError::Population {
                index: 1,
                source: PopulationInitError::EmptyPopulation
            }
        );
        assert!(err.source().is_some());
    }
}
