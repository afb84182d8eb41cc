use crate::grid::Grid;
use crate::integrator::IntegratorKind;
use crate::mosquito::{PlumeFinding, PlumeTracking};
use crate::response::ResponseParams;
use crate::spatial::Host;
use crate::wind::RandomWindMode;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::{error::Error, fmt};

/// Relative tolerance for "`dt` evenly divides this period".
const DIVISIBILITY_TOLERANCE: f64 = 1e-9;

/// Number of whole `dt` steps in `period`, if `dt` divides it evenly.
pub fn whole_steps(period: f64, dt: f64) -> Option<usize> {
    if !(period.is_finite() && dt.is_finite() && period > 0.0 && dt > 0.0) {
        return None;
    }
    let ratio = period / dt;
    let steps = ratio.round();
    if steps >= 1.0 && (ratio - steps).abs() <= DIVISIBILITY_TOLERANCE * steps {
        Some(steps as usize)
    } else {
        None
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWindConfig {
    pub mode: RandomWindMode,
    /// Peak magnitude of each perturbation component.
    pub amplitude: f64,
    pub num_modes: usize,
    pub max_wavenumber: u32,
}

impl Default for RandomWindConfig {
    fn default() -> Self {
        Self {
            mode: RandomWindMode::Heaviside,
            amplitude: 0.05,
            num_modes: 4,
            max_wavenumber: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub domain_length: f64,
    pub num_grid_points: usize,
    pub dt: f64,
    pub initial_time: f64,
    pub final_time: f64,
    pub decision_interval: f64,
    /// Period between random wind refreshes.
    pub rand_vel_switch: f64,
    pub random_wind: RandomWindConfig,
    /// `None` selects the default for the random wind mode.
    pub integrator: Option<IntegratorKind>,
    /// Constant bulk wind `(u, v)`.
    pub bulk_wind: [f64; 2],
    /// Decision intervals between run metric samples.
    pub sample_every: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            domain_length: 100.0,
            num_grid_points: 128,
            dt: 0.1,
            initial_time: 0.0,
            final_time: 1000.0,
            decision_interval: 1.0,
            rand_vel_switch: 10.0,
            random_wind: RandomWindConfig::default(),
            integrator: None,
            bulk_wind: [0.0, 0.2],
            sample_every: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimConfigError {
    NonPositiveDomainLength(f64),
    InvalidGridPoints { max: usize, actual: usize },
    NonPositiveTimeStep(f64),
    TimeStepDoesNotDivide {
        name: &'static str,
        period: f64,
        dt: f64,
    },
    InvalidTimeWindow { initial: f64, final_time: f64 },
    InvalidRandomWind(&'static str),
    NonFiniteBulkWind,
    InvalidSampleEvery,
}

impl fmt::Display for SimConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimConfigError::NonPositiveDomainLength(l) => {
                write!(f, "domain_length must be positive and finite (got {l})")
            }
            SimConfigError::InvalidGridPoints { max, actual } => {
                write!(f, "num_grid_points must be in 2..={max} (got {actual})")
            }
            SimConfigError::NonPositiveTimeStep(dt) => {
                write!(f, "dt must be positive and finite (got {dt})")
            }
            SimConfigError::TimeStepDoesNotDivide { name, period, dt } => {
                write!(f, "dt ({dt}) must evenly divide {name} ({period})")
            }
            SimConfigError::InvalidTimeWindow {
                initial,
                final_time,
            } => write!(
                f,
                "final_time ({final_time}) must be finite and not before initial_time ({initial})"
            ),
            SimConfigError::InvalidRandomWind(reason) => write!(f, "random_wind: {reason}"),
            SimConfigError::NonFiniteBulkWind => write!(f, "bulk_wind must be finite"),
            SimConfigError::InvalidSampleEvery => write!(f, "sample_every must be positive"),
        }
    }
}

impl Error for SimConfigError {}

impl SimConfig {
    pub const MAX_GRID_POINTS: usize = Grid::MAX_GRID_POINTS;

    pub fn validate(&self) -> Result<(), SimConfigError> {
        if !(self.domain_length.is_finite() && self.domain_length > 0.0) {
            return Err(SimConfigError::NonPositiveDomainLength(self.domain_length));
        }
        if !(2..=Self::MAX_GRID_POINTS).contains(&self.num_grid_points) {
            return Err(SimConfigError::InvalidGridPoints {
                max: Self::MAX_GRID_POINTS,
                actual: self.num_grid_points,
            });
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimConfigError::NonPositiveTimeStep(self.dt));
        }
        for (name, period) in [
            ("decision_interval", self.decision_interval),
            ("rand_vel_switch", self.rand_vel_switch),
        ] {
            if whole_steps(period, self.dt).is_none() {
                return Err(SimConfigError::TimeStepDoesNotDivide {
                    name,
                    period,
                    dt: self.dt,
                });
            }
        }
        if !(self.initial_time.is_finite()
            && self.final_time.is_finite()
            && self.final_time >= self.initial_time)
        {
            return Err(SimConfigError::InvalidTimeWindow {
                initial: self.initial_time,
                final_time: self.final_time,
            });
        }
        let rw = &self.random_wind;
        if !(rw.amplitude.is_finite() && rw.amplitude >= 0.0) {
            return Err(SimConfigError::InvalidRandomWind(
                "amplitude must be finite and non-negative",
            ));
        }
        if rw.mode != RandomWindMode::Off && (rw.num_modes == 0 || rw.max_wavenumber == 0) {
            return Err(SimConfigError::InvalidRandomWind(
                "num_modes and max_wavenumber must be positive",
            ));
        }
        if !self.bulk_wind.iter().all(|c| c.is_finite()) {
            return Err(SimConfigError::NonFiniteBulkWind);
        }
        if self.sample_every == 0 {
            return Err(SimConfigError::InvalidSampleEvery);
        }
        Ok(())
    }

    pub fn integrator(&self) -> IntegratorKind {
        self.integrator
            .unwrap_or_else(|| self.random_wind.mode.default_integrator())
    }
}

/// Parameters shared by every agent in one population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub strategy: PlumeFinding,
    pub tracking: PlumeTracking,
    /// Agents hold still until the plume has developed.
    pub start_time: f64,
    pub host_radius: f64,
    /// Flight speed outside the plume.
    pub max_speed: f64,
    /// Speed window inside the plume.
    pub co2: ResponseParams,
    /// Heading spread around the wind-relative course.
    pub wind: ResponseParams,
    /// Heading spread around the remembered course, driven by |ΔCO2|.
    pub diff_co2: ResponseParams,
    pub crosswind_min_duration: u32,
    /// Exclusive.
    pub crosswind_max_duration: u32,
    /// Overrides the strategy's starting row.
    pub initial_y: Option<f64>,
    pub seed: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            strategy: PlumeFinding::Upwind,
            tracking: PlumeTracking::Klinotaxis,
            start_time: 350.0,
            host_radius: 5.0,
            max_speed: 1.5,
            co2: ResponseParams {
                thresh: 0.01,
                sat: 1.0,
                kappa: 0.0,
                window_min: 0.4,
                window_max: 1.5,
            },
            wind: ResponseParams {
                thresh: 0.0,
                sat: 0.5,
                kappa: 0.0,
                window_min: PI / 6.0,
                window_max: PI / 2.0,
            },
            diff_co2: ResponseParams {
                thresh: (0.01 / 10.0) * 0.0042 / 0.0833,
                sat: (1.0 - 0.01) / 50.0,
                kappa: 0.0,
                window_min: PI / 36.0,
                window_max: PI,
            },
            crosswind_min_duration: 5,
            crosswind_max_duration: 10,
            initial_y: None,
            seed: 7,
        }
    }
}

impl PopulationConfig {
    pub fn for_strategy(strategy: PlumeFinding) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationSpec {
    #[serde(default)]
    pub config: PopulationConfig,
    pub initial_x: Vec<f64>,
}

/// Everything needed to build a [`crate::simulation::Simulation`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub sim: SimConfig,
    pub hosts: Vec<Host>,
    pub populations: Vec<PopulationSpec>,
}
