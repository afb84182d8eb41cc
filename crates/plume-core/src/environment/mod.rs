pub mod advection;

use crate::config::{whole_steps, SimConfig, SimConfigError};
use crate::field::ScalarField;
use crate::grid::{Grid, GridError, OutOfDomainError};
use crate::integrator::IntegratorKind;
use crate::spatial::{self, Host, HostLocation};
use crate::wind::{BulkWind, ConstantWind, RandomWind, RandomWindMode, WindPerturbation};
use rstar::RTree;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::{error::Error, fmt};
use tracing::{debug, trace, warn};

/// Whether `elapsed` lands on a multiple of `period`, to within half a step.
pub fn on_period_boundary(elapsed: f64, period: f64, dt: f64) -> bool {
    let r = elapsed.rem_euclid(period);
    r < 0.5 * dt || period - r < 0.5 * dt
}

/// Wind and CO2 sensed at one point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub u: f64,
    pub v: f64,
    pub co2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentInitError {
    Config(SimConfigError),
    Grid(GridError),
    HostOutOfDomain {
        index: usize,
        source: OutOfDomainError,
    },
    InvalidHostStrength {
        index: usize,
        strength: f64,
    },
}

impl fmt::Display for EnvironmentInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentInitError::Config(e) => write!(f, "{}", e),
            EnvironmentInitError::Grid(e) => write!(f, "{}", e),
            EnvironmentInitError::HostOutOfDomain { index, source } => {
                write!(f, "host {index} cannot emit onto the grid: {source}")
            }
            EnvironmentInitError::InvalidHostStrength { index, strength } => write!(
                f,
                "host {index} source strength must be finite and non-negative (got {strength})"
            ),
        }
    }
}

impl From<SimConfigError> for EnvironmentInitError {
    fn from(err: SimConfigError) -> Self {
        EnvironmentInitError::Config(err)
    }
}

impl From<GridError> for EnvironmentInitError {
    fn from(err: GridError) -> Self {
        EnvironmentInitError::Grid(err)
    }
}

impl Error for EnvironmentInitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EnvironmentInitError::Config(e) => Some(e),
            EnvironmentInitError::Grid(e) => Some(e),
            EnvironmentInitError::HostOutOfDomain { source, .. } => Some(source),
            EnvironmentInitError::InvalidHostStrength { .. } => None,
        }
    }
}

/// CO2 plume and wind over the square domain.
pub struct Environment {
    config: SimConfig,
    grid: Grid,
    co2: ScalarField,
    random_wind: RandomWind,
    bulk_wind: Box<dyn BulkWind>,
    /// Bulk wind sampled at the nodes at `initial_time`. Unsteady winds are
    /// resampled at every stage instead.
    bulk_u: ScalarField,
    bulk_v: ScalarField,
    hosts: Vec<Host>,
    host_index: RTree<HostLocation>,
    /// Host emission splatted onto the grid, per unit time.
    source: ScalarField,
    integrator: IntegratorKind,
    time: f64,
    step_index: usize,
}

impl Environment {
    pub fn new(config: SimConfig, hosts: Vec<Host>) -> Self {
        Self::try_new(config, hosts).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Environment with the constant bulk wind from `config.bulk_wind`.
    pub fn try_new(config: SimConfig, hosts: Vec<Host>) -> Result<Self, EnvironmentInitError> {
        let bulk = ConstantWind::new(config.bulk_wind);
        Self::try_with_bulk_wind(config, hosts, Box::new(bulk))
    }

    pub fn try_with_bulk_wind(
        config: SimConfig,
        hosts: Vec<Host>,
        bulk_wind: Box<dyn BulkWind>,
    ) -> Result<Self, EnvironmentInitError> {
        config.validate()?;
        let grid = Grid::with_points(config.domain_length, config.num_grid_points)?;

        let mut xs = Vec::with_capacity(hosts.len());
        let mut ys = Vec::with_capacity(hosts.len());
        let mut strengths = Vec::with_capacity(hosts.len());
        for (index, host) in hosts.iter().enumerate() {
            if !(host.source_strength.is_finite() && host.source_strength >= 0.0) {
                return Err(EnvironmentInitError::InvalidHostStrength {
                    index,
                    strength: host.source_strength,
                });
            }
            grid.locate(host.position_x, host.position_y)
                .map_err(|source| EnvironmentInitError::HostOutOfDomain { index, source })?;
            xs.push(host.position_x);
            ys.push(host.position_y);
            strengths.push(host.source_strength);
        }
        let source = grid
            .extrapolate(&xs, &ys, &strengths)
            .map_err(|source| EnvironmentInitError::HostOutOfDomain { index: 0, source })?;

        let random_wind = RandomWind::new(
            &grid,
            config.random_wind.clone(),
            config.rand_vel_switch,
            config.seed,
        );

        let t0 = config.initial_time;
        let bulk_u = grid.sample(|x, y| bulk_wind.velocity(x, y, t0)[0]);
        let bulk_v = grid.sample(|x, y| bulk_wind.velocity(x, y, t0)[1]);
        let host_index = spatial::build_index(&hosts);
        let integrator = config.integrator();

        let cfl = courant_number(&bulk_u, &bulk_v, &config, grid.spacing());
        if cfl > 1.0 {
            warn!(
                cfl,
                dt = config.dt,
                h = grid.spacing(),
                "advective CFL number exceeds 1; the upwind scheme may be unstable"
            );
        }

        debug!(
            n = grid.num_grid_points(),
            h = grid.spacing(),
            hosts = hosts.len(),
            ?integrator,
            mode = ?config.random_wind.mode,
            "environment constructed"
        );

        Ok(Self {
            co2: grid.zeros(),
            grid,
            random_wind,
            bulk_wind,
            bulk_u,
            bulk_v,
            hosts,
            host_index,
            source,
            integrator,
            time: t0,
            step_index: 0,
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn co2(&self) -> &ScalarField {
        &self.co2
    }

    /// Direct access for seeding a plume; the shape must stay `n * n`.
    pub fn co2_mut(&mut self) -> &mut ScalarField {
        &mut self.co2
    }

    pub fn random_wind(&self) -> &RandomWind {
        &self.random_wind
    }

    pub fn source(&self) -> &ScalarField {
        &self.source
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host_index(&self) -> &RTree<HostLocation> {
        &self.host_index
    }

    pub fn integrator(&self) -> IntegratorKind {
        self.integrator
    }

    /// Time the field currently represents.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn is_switch_time(&self, t: f64) -> bool {
        on_period_boundary(
            t - self.config.initial_time,
            self.config.rand_vel_switch,
            self.config.dt,
        )
    }

    pub fn is_decision_time(&self, t: f64) -> bool {
        on_period_boundary(
            t - self.config.initial_time,
            self.config.decision_interval,
            self.config.dt,
        )
    }

    /// Advance the CO2 field from `current_time` to `current_time + dt`.
    ///
    /// Random wind is refreshed before integration when `current_time` lands
    /// on a switch boundary, and stays fixed for the whole integrator call.
    pub fn update_environment(&mut self, current_time: f64) {
        if self.is_switch_time(current_time) {
            let elapsed = current_time - self.config.initial_time;
            let index = (elapsed / self.config.rand_vel_switch).round().max(0.0) as usize;
            self.random_wind.refresh(&self.grid, index, current_time);
            debug!(t = current_time, index, "random wind refreshed");
        }
        let dt = self.config.dt;
        let next = {
            let derivative = |t: f64, c: &[f64]| self.tendency(t, c);
            self.integrator.step(current_time, self.co2.data(), dt, derivative)
        };
        self.co2 = ScalarField::from_vec(self.grid.num_grid_points(), next);
        self.time = current_time + dt;
        self.step_index += 1;
        trace!(t = self.time, total = self.co2.total(), "co2 field advanced");
    }

    /// `dc/dt` at stage time `t`: upwind advection by the total wind plus
    /// the host source.
    pub fn tendency(&self, t: f64, c: &[f64]) -> Vec<f64> {
        let perturbation = self.random_wind.at(t);
        let (bulk_u, bulk_v) = self.bulk_fields(t);
        let u = add_fields(&bulk_u, &perturbation.u);
        let v = add_fields(&bulk_v, &perturbation.v);
        let mut dcdt = advection::upwind_tendency(
            self.grid.num_grid_points(),
            self.grid.spacing(),
            c,
            &u,
            &v,
        );
        for (d, s) in dcdt.iter_mut().zip(self.source.data()) {
            *d += s;
        }
        dcdt
    }

    /// Signal at one point. Points outside the interpolation margin sense
    /// the bulk wind only, with no perturbation and no CO2.
    pub fn signal_at(&self, x: f64, y: f64) -> Signal {
        let perturbation = self.random_wind.at(self.time);
        self.sample_signal(&perturbation, x, y)
            .unwrap_or_else(|_| self.background_signal(x, y))
    }

    pub fn query_signal(&self, xs: &[f64], ys: &[f64]) -> Vec<Signal> {
        assert_eq!(xs.len(), ys.len(), "x and y arrays must have equal length");
        let perturbation = self.random_wind.at(self.time);
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| {
                self.sample_signal(&perturbation, x, y)
                    .unwrap_or_else(|_| self.background_signal(x, y))
            })
            .collect()
    }

    /// Like [`Environment::query_signal`] but fails on the first point
    /// outside the interpolation margin.
    pub fn query_signal_strict(&self, xs: &[f64], ys: &[f64]) -> Result<Vec<Signal>, OutOfDomainError> {
        assert_eq!(xs.len(), ys.len(), "x and y arrays must have equal length");
        let perturbation = self.random_wind.at(self.time);
        xs.iter()
            .zip(ys.iter())
            .map(|(&x, &y)| self.sample_signal(&perturbation, x, y))
            .collect()
    }

    fn sample_signal(
        &self,
        perturbation: &WindPerturbation,
        x: f64,
        y: f64,
    ) -> Result<Signal, OutOfDomainError> {
        let [ur, vr, co2] = self
            .grid
            .interpolate_fields(x, y, [&perturbation.u, &perturbation.v, &self.co2])?;
        let [ub, vb] = self.bulk_wind.velocity(x, y, self.time);
        Ok(Signal {
            u: ub + ur,
            v: vb + vr,
            co2,
        })
    }

    fn background_signal(&self, x: f64, y: f64) -> Signal {
        let [u, v] = self.bulk_wind.velocity(x, y, self.time);
        Signal { u, v, co2: 0.0 }
    }

    fn bulk_fields(&self, t: f64) -> (Cow<'_, ScalarField>, Cow<'_, ScalarField>) {
        if self.bulk_wind.is_time_varying() {
            let u = self.grid.sample(|x, y| self.bulk_wind.velocity(x, y, t)[0]);
            let v = self.grid.sample(|x, y| self.bulk_wind.velocity(x, y, t)[1]);
            (Cow::Owned(u), Cow::Owned(v))
        } else {
            (Cow::Borrowed(&self.bulk_u), Cow::Borrowed(&self.bulk_v))
        }
    }

    /// Upper bound on the advective Courant number, from the bulk wind as
    /// sampled at `initial_time` plus the peak random perturbation, if any.
    pub fn cfl_number(&self) -> f64 {
        courant_number(&self.bulk_u, &self.bulk_v, &self.config, self.grid.spacing())
    }

    /// Number of whole field steps per decision interval.
    pub fn steps_per_decision(&self) -> usize {
        whole_steps(self.config.decision_interval, self.config.dt).unwrap_or(1)
    }
}

fn courant_number(bulk_u: &ScalarField, bulk_v: &ScalarField, config: &SimConfig, h: f64) -> f64 {
    let peak_bulk = bulk_u
        .data()
        .iter()
        .zip(bulk_v.data())
        .map(|(u, v)| u.abs() + v.abs())
        .fold(0.0, f64::max);
    let peak_random = match config.random_wind.mode {
        RandomWindMode::Off => 0.0,
        RandomWindMode::Heaviside | RandomWindMode::Continuous => 2.0 * config.random_wind.amplitude,
    };
    let peak = peak_bulk + peak_random;
    config.dt * peak / h
}

fn add_fields(a: &ScalarField, b: &ScalarField) -> Vec<f64> {
    a.data()
        .iter()
        .zip(b.data().iter())
        .map(|(x, y)| x + y)
        .collect()
}
