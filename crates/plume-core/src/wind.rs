//! Bulk wind and the random wind perturbation fields layered on top of it.

use crate::config::RandomWindConfig;
use crate::field::ScalarField;
use crate::grid::Grid;
use crate::integrator::IntegratorKind;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::f64::consts::TAU;
use std::fmt;

/// Deterministic large-scale wind.
pub trait BulkWind: fmt::Debug + Send + Sync {
    fn velocity(&self, x: f64, y: f64, t: f64) -> [f64; 2];

    /// Time-varying winds are re-evaluated every field step.
    fn is_time_varying(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantWind {
    pub u: f64,
    pub v: f64,
}

impl ConstantWind {
    pub fn new([u, v]: [f64; 2]) -> Self {
        Self { u, v }
    }
}

impl BulkWind for ConstantWind {
    fn velocity(&self, _x: f64, _y: f64, _t: f64) -> [f64; 2] {
        [self.u, self.v]
    }
}

/// Bulk wind from a closure `f(x, y, t)`.
pub struct FnWind<F> {
    f: F,
    time_varying: bool,
}

impl<F> FnWind<F>
where
    F: Fn(f64, f64, f64) -> [f64; 2] + Send + Sync,
{
    pub fn steady(f: F) -> Self {
        Self {
            f,
            time_varying: false,
        }
    }

    pub fn unsteady(f: F) -> Self {
        Self {
            f,
            time_varying: true,
        }
    }
}

impl<F> fmt::Debug for FnWind<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWind")
            .field("time_varying", &self.time_varying)
            .finish_non_exhaustive()
    }
}

impl<F> BulkWind for FnWind<F>
where
    F: Fn(f64, f64, f64) -> [f64; 2] + Send + Sync,
{
    fn velocity(&self, x: f64, y: f64, t: f64) -> [f64; 2] {
        (self.f)(x, y, t)
    }

    fn is_time_varying(&self) -> bool {
        self.time_varying
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomWindMode {
    /// No perturbation.
    Off,
    /// Piecewise constant; jumps at every switch.
    Heaviside,
    /// Linear blend between the draws at consecutive switches.
    Continuous,
}

impl RandomWindMode {
    pub fn default_integrator(self) -> IntegratorKind {
        match self {
            RandomWindMode::Off | RandomWindMode::Heaviside => IntegratorKind::ForwardEuler,
            RandomWindMode::Continuous => IntegratorKind::RungeKutta4,
        }
    }
}

/// Seeds drawn once from a master seed and consumed by index, so the field
/// drawn for refresh `k` never depends on which refreshes ran before it.
#[derive(Clone, Debug)]
pub struct SeedSequence {
    rng: ChaCha12Rng,
    seeds: Vec<u64>,
}

impl SeedSequence {
    pub fn new(master_seed: u64, len: usize) -> Self {
        let mut sequence = Self {
            rng: ChaCha12Rng::seed_from_u64(master_seed),
            seeds: Vec::with_capacity(len),
        };
        sequence.extend_to(len);
        sequence
    }

    /// Seed at `index`, drawing further ahead in the same stream if needed.
    pub fn seed(&mut self, index: usize) -> u64 {
        self.extend_to(index + 1);
        self.seeds[index]
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    fn extend_to(&mut self, len: usize) {
        while self.seeds.len() < len {
            self.seeds.push(self.rng.random::<u64>());
        }
    }
}

/// The two perturbation components on the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct WindPerturbation {
    pub u: ScalarField,
    pub v: ScalarField,
}

impl WindPerturbation {
    pub fn zeros(grid: &Grid) -> Self {
        Self {
            u: grid.zeros(),
            v: grid.zeros(),
        }
    }

    /// Smooth random field: a sum of `num_modes` plane waves per component
    /// with integer wavenumbers, so its peak magnitude is at most `amplitude`.
    pub fn draw(grid: &Grid, config: &RandomWindConfig, seed: u64) -> Self {
        let mut rng = ChaCha12Rng::seed_from_u64(seed);
        let u = Self::draw_component(grid, config, &mut rng);
        let v = Self::draw_component(grid, config, &mut rng);
        Self { u, v }
    }

    fn draw_component(grid: &Grid, config: &RandomWindConfig, rng: &mut ChaCha12Rng) -> ScalarField {
        let modes: Vec<[f64; 4]> = (0..config.num_modes)
            .map(|_| {
                let kx = rng.random_range(0..=config.max_wavenumber) as f64;
                let ky = rng.random_range(0..=config.max_wavenumber) as f64;
                let phase = rng.random_range(0.0..TAU);
                let weight = rng.random_range(-1.0..=1.0);
                [kx, ky, phase, weight]
            })
            .collect();
        let scale = config.amplitude / config.num_modes.max(1) as f64;
        let omega = TAU / grid.length();
        grid.sample(|x, y| {
            scale
                * modes
                    .iter()
                    .map(|&[kx, ky, phase, weight]| weight * (omega * (kx * x + ky * y) + phase).sin())
                    .sum::<f64>()
        })
    }

    pub fn lerp(&self, other: &WindPerturbation, alpha: f64) -> WindPerturbation {
        WindPerturbation {
            u: self.u.lerp(&other.u, alpha),
            v: self.v.lerp(&other.v, alpha),
        }
    }
}

const PREDRAWN_SEEDS: usize = 16;

/// Random perturbation state across switch intervals.
#[derive(Clone, Debug)]
pub struct RandomWind {
    config: RandomWindConfig,
    period: f64,
    seeds: SeedSequence,
    /// Draw in effect since the last switch (the blend start when continuous).
    current: WindPerturbation,
    /// Blend target for continuous mode, with its refresh index.
    next: Option<(usize, WindPerturbation)>,
    switch_time: f64,
    refreshes: usize,
}

impl RandomWind {
    /// Seeds beyond the first few are drawn on demand; none are drawn when
    /// the perturbation is off.
    pub fn new(grid: &Grid, config: RandomWindConfig, period: f64, master_seed: u64) -> Self {
        let predrawn = match config.mode {
            RandomWindMode::Off => 0,
            RandomWindMode::Heaviside | RandomWindMode::Continuous => PREDRAWN_SEEDS,
        };
        Self {
            current: WindPerturbation::zeros(grid),
            next: None,
            seeds: SeedSequence::new(master_seed, predrawn),
            config,
            period,
            switch_time: 0.0,
            refreshes: 0,
        }
    }

    pub fn mode(&self) -> RandomWindMode {
        self.config.mode
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    /// Redraw for switch interval `index` starting at `switch_time`.
    pub fn refresh(&mut self, grid: &Grid, index: usize, switch_time: f64) {
        self.switch_time = switch_time;
        match self.config.mode {
            RandomWindMode::Off => {}
            RandomWindMode::Heaviside => {
                self.current = self.draw_indexed(grid, index);
                self.refreshes += 1;
            }
            RandomWindMode::Continuous => {
                self.current = match self.next.take() {
                    Some((k, field)) if k == index => field,
                    _ => self.draw_indexed(grid, index),
                };
                let target = self.draw_indexed(grid, index + 1);
                self.next = Some((index + 1, target));
                self.refreshes += 1;
            }
        }
    }

    /// Perturbation at time `t`; only the continuous mode depends on `t`.
    pub fn at(&self, t: f64) -> Cow<'_, WindPerturbation> {
        match (&self.config.mode, &self.next) {
            (RandomWindMode::Continuous, Some((_, target))) => {
                let alpha = ((t - self.switch_time) / self.period).clamp(0.0, 1.0);
                Cow::Owned(self.current.lerp(target, alpha))
            }
            _ => Cow::Borrowed(&self.current),
        }
    }

    pub fn current(&self) -> &WindPerturbation {
        &self.current
    }

    fn draw_indexed(&mut self, grid: &Grid, index: usize) -> WindPerturbation {
        let seed = self.seeds.seed(index);
        WindPerturbation::draw(grid, &self.config, seed)
    }
}
