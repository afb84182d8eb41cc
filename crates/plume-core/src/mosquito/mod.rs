mod strategy;

pub use strategy::{PlumeFinding, PlumeTracking};

use crate::config::PopulationConfig;
use crate::environment::{Environment, Signal};
use crate::response::InvalidParameterError;
use crate::spatial;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};
use strategy::{Decision, ResponseCurves, StrategyParams};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Searching,
    FoundHost,
    Lost,
}

impl AgentState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AgentState::Searching)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mosquito {
    pub id: u32,
    pub position: [f64; 2],
    /// CO2 sensed at the last in-plume decision.
    pub previous_co2: f64,
    /// Course of the last displacement, radians.
    pub previous_motion_dir: f64,
    pub state: AgentState,
    /// `+1` or `-1`; which side of the wind crosswind flight heads to.
    pub crosswind_side: f64,
    /// Decisions left in the current crosswind leg.
    pub crosswind_remaining: u32,
    pub found_host: Option<u32>,
    pub decisions: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopulationInitError {
    InvalidParameter(InvalidParameterError),
    EmptyPopulation,
    NonFiniteInitialPosition { index: usize },
    InvalidCrosswindDuration { min: u32, max: u32 },
    InvalidHostRadius(f64),
    InvalidMaxSpeed(f64),
    InvalidStartTime(f64),
}

impl fmt::Display for PopulationInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationInitError::InvalidParameter(e) => write!(f, "{}", e),
            PopulationInitError::EmptyPopulation => {
                write!(f, "population needs at least one initial position")
            }
            PopulationInitError::NonFiniteInitialPosition { index } => {
                write!(f, "initial position {index} is not finite")
            }
            PopulationInitError::InvalidCrosswindDuration { min, max } => write!(
                f,
                "crosswind durations need 1 <= min < max (got min={min}, max={max})"
            ),
            PopulationInitError::InvalidHostRadius(r) => {
                write!(f, "host_radius must be finite and non-negative (got {r})")
            }
            PopulationInitError::InvalidMaxSpeed(s) => {
                write!(f, "max_speed must be finite and non-negative (got {s})")
            }
            PopulationInitError::InvalidStartTime(t) => {
                write!(f, "start_time must be finite (got {t})")
            }
        }
    }
}

impl From<InvalidParameterError> for PopulationInitError {
    fn from(err: InvalidParameterError) -> Self {
        PopulationInitError::InvalidParameter(err)
    }
}

impl Error for PopulationInitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PopulationInitError::InvalidParameter(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-state agent counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub searching: usize,
    pub found_host: usize,
    pub lost: usize,
}

/// What one call to [`MosquitoPopulation::update_position`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecisionSummary {
    pub in_plume: usize,
    pub wind_only: usize,
    pub newly_found_host: usize,
    pub newly_lost: usize,
}

impl DecisionSummary {
    pub fn moved(&self) -> usize {
        self.in_plume + self.wind_only
    }
}

/// A group of agents sharing one strategy pair and one random stream.
#[derive(Clone, Debug)]
pub struct MosquitoPopulation {
    config: PopulationConfig,
    params: StrategyParams,
    pub(crate) agents: Vec<Mosquito>,
    rng: ChaCha12Rng,
}

impl MosquitoPopulation {
    pub fn new(config: PopulationConfig, initial_x: &[f64], env: &Environment) -> Self {
        Self::try_new(config, initial_x, env).unwrap_or_else(|e| panic!("{e}"))
    }

    /// One agent per entry of `initial_x`, all starting on the strategy's
    /// row unless `config.initial_y` overrides it.
    pub fn try_new(
        config: PopulationConfig,
        initial_x: &[f64],
        env: &Environment,
    ) -> Result<Self, PopulationInitError> {
        let curves = ResponseCurves::from_config(&config)?;
        if initial_x.is_empty() {
            return Err(PopulationInitError::EmptyPopulation);
        }
        if let Some(index) = initial_x.iter().position(|x| !x.is_finite()) {
            return Err(PopulationInitError::NonFiniteInitialPosition { index });
        }
        let (min, max) = (config.crosswind_min_duration, config.crosswind_max_duration);
        if min == 0 || max <= min {
            return Err(PopulationInitError::InvalidCrosswindDuration { min, max });
        }
        if !(config.host_radius.is_finite() && config.host_radius >= 0.0) {
            return Err(PopulationInitError::InvalidHostRadius(config.host_radius));
        }
        if !(config.max_speed.is_finite() && config.max_speed >= 0.0) {
            return Err(PopulationInitError::InvalidMaxSpeed(config.max_speed));
        }
        if !config.start_time.is_finite() {
            return Err(PopulationInitError::InvalidStartTime(config.start_time));
        }

        let grid = env.grid();
        let y0 = match config.initial_y {
            Some(y) if y.is_finite() => y,
            Some(_) => return Err(PopulationInitError::NonFiniteInitialPosition { index: 0 }),
            None => config.strategy.initial_y(grid),
        };

        let mut rng = ChaCha12Rng::seed_from_u64(config.seed);
        let agents = initial_x
            .iter()
            .enumerate()
            .map(|(id, &x)| {
                let (side, remaining) = match config.strategy {
                    PlumeFinding::Crosswind => {
                        let side = if rng.random::<f64>() < 0.5 { -1.0 } else { 1.0 };
                        (side, rng.random_range(min..max))
                    }
                    PlumeFinding::Upwind | PlumeFinding::Downwind => (1.0, 0),
                };
                let state = if grid.in_domain(x, y0) {
                    AgentState::Searching
                } else {
                    AgentState::Lost
                };
                Mosquito {
                    id: id as u32,
                    position: [x, y0],
                    previous_co2: 0.0,
                    previous_motion_dir: config.strategy.initial_heading(side),
                    state,
                    crosswind_side: side,
                    crosswind_remaining: remaining,
                    found_host: None,
                    decisions: 0,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            agents = agents.len(),
            strategy = ?config.strategy,
            tracking = ?config.tracking,
            y0,
            "population constructed"
        );

        Ok(Self {
            params: StrategyParams {
                curves,
                max_speed: config.max_speed,
                decision_interval: env.config().decision_interval,
                crosswind_durations: (min, max),
            },
            config,
            agents,
            rng,
        })
    }

    pub fn config(&self) -> &PopulationConfig {
        &self.config
    }

    pub fn agents(&self) -> &[Mosquito] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn positions_x(&self) -> Vec<f64> {
        self.agents.iter().map(|a| a.position[0]).collect()
    }

    pub fn positions_y(&self) -> Vec<f64> {
        self.agents.iter().map(|a| a.position[1]).collect()
    }

    pub fn counts(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for agent in &self.agents {
            match agent.state {
                AgentState::Searching => counts.searching += 1,
                AgentState::FoundHost => counts.found_host += 1,
                AgentState::Lost => counts.lost += 1,
            }
        }
        counts
    }

    /// True once no agent is still searching.
    pub fn stop_simulation(&self) -> bool {
        self.agents.iter().all(|a| a.state.is_terminal())
    }

    /// One decision for every searching agent, against the field as it
    /// stands at `current_time`.
    ///
    /// Agents sensing CO2 at or above the CO2 threshold follow the tracking
    /// strategy; the rest follow the finding strategy. All agents decide
    /// before any of them moves. Nothing happens before `start_time`.
    pub fn update_position(&mut self, env: &Environment, current_time: f64) -> DecisionSummary {
        let mut summary = DecisionSummary::default();
        let half_step = 0.5 * env.config().dt;
        if current_time < self.config.start_time - half_step {
            return summary;
        }

        let active: Vec<usize> = (0..self.agents.len())
            .filter(|&k| self.agents[k].state == AgentState::Searching)
            .collect();
        if active.is_empty() {
            return summary;
        }
        let xs: Vec<f64> = active.iter().map(|&k| self.agents[k].position[0]).collect();
        let ys: Vec<f64> = active.iter().map(|&k| self.agents[k].position[1]).collect();
        let signals = env.query_signal(&xs, &ys);

        let thresh = self.config.co2.thresh;
        let (in_plume, wind_only): (Vec<(usize, Signal)>, Vec<(usize, Signal)>) = active
            .iter()
            .copied()
            .zip(signals)
            .partition(|(_, s)| s.co2 >= thresh);
        summary.in_plume = in_plume.len();
        summary.wind_only = wind_only.len();

        let mut decisions: Vec<(usize, Decision)> = Vec::with_capacity(active.len());
        for (k, signal) in in_plume {
            let decision =
                self.config
                    .tracking
                    .respond(&self.agents[k], signal, &self.params, &mut self.rng);
            decisions.push((k, decision));
        }
        for (k, signal) in wind_only {
            let decision =
                self.config
                    .strategy
                    .respond(&self.agents[k], signal, &self.params, &mut self.rng);
            decisions.push((k, decision));
        }

        for (k, decision) in decisions {
            let agent = &mut self.agents[k];
            let [dx, dy] = decision.displacement;
            agent.position[0] += dx;
            agent.position[1] += dy;
            agent.previous_motion_dir = dy.atan2(dx);
            if let Some(c) = decision.sensed_co2 {
                agent.previous_co2 = c;
            }
            if let Some((side, remaining)) = decision.crosswind {
                agent.crosswind_side = side;
                agent.crosswind_remaining = remaining;
            }
            agent.decisions += 1;
        }

        let radius = self.config.host_radius;
        let grid = env.grid();
        for &k in &active {
            let agent = &mut self.agents[k];
            if let Some(host) = spatial::host_within(env.host_index(), agent.position, radius) {
                agent.state = AgentState::FoundHost;
                agent.found_host = Some(host);
                summary.newly_found_host += 1;
            } else if !grid.in_domain(agent.position[0], agent.position[1]) {
                agent.state = AgentState::Lost;
                summary.newly_lost += 1;
            }
        }

        debug!(
            t = current_time,
            in_plume = summary.in_plume,
            wind_only = summary.wind_only,
            found = summary.newly_found_host,
            lost = summary.newly_lost,
            "population decided"
        );
        summary
    }
}
