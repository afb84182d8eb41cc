use super::Mosquito;
use crate::config::PopulationConfig;
use crate::environment::Signal;
use crate::grid::Grid;
use crate::response::{InvalidParameterError, ResponseCurve};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

/// Plume-finding strategy used while no CO2 above threshold is sensed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlumeFinding {
    #[default]
    Upwind,
    Downwind,
    Crosswind,
}

/// Plume-tracking strategy used inside the plume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlumeTracking {
    #[default]
    Klinotaxis,
}

impl PlumeFinding {
    /// Starting row: upwind agents enter from the downstream (top) edge.
    pub fn initial_y(self, grid: &Grid) -> f64 {
        match self {
            PlumeFinding::Upwind => grid.length() - grid.spacing(),
            PlumeFinding::Downwind | PlumeFinding::Crosswind => 0.0,
        }
    }

    pub fn initial_heading(self, side: f64) -> f64 {
        match self {
            PlumeFinding::Upwind => -FRAC_PI_2,
            PlumeFinding::Downwind => FRAC_PI_2,
            PlumeFinding::Crosswind => side * FRAC_PI_2,
        }
    }

    /// Course relative to the direction the wind blows toward.
    pub fn heading_offset(self, side: f64) -> f64 {
        match self {
            PlumeFinding::Upwind => PI,
            PlumeFinding::Downwind => 0.0,
            PlumeFinding::Crosswind => side * FRAC_PI_2,
        }
    }

    /// Wind-only flight: local advection plus flight at `max_speed` along
    /// the strategy course, spread by the wind response window.
    pub(crate) fn respond<R: Rng + ?Sized>(
        self,
        agent: &Mosquito,
        signal: Signal,
        params: &StrategyParams,
        rng: &mut R,
    ) -> Decision {
        let window = params.curves.wind.window(signal.u.hypot(signal.v));
        let heading = self.heading_offset(agent.crosswind_side)
            + signal.v.atan2(signal.u)
            + jitter(window, rng);
        let di = params.decision_interval;
        let displacement = [
            di * (signal.u + params.max_speed * heading.cos()),
            di * (signal.v + params.max_speed * heading.sin()),
        ];

        let crosswind = match self {
            PlumeFinding::Crosswind => {
                let remaining = agent.crosswind_remaining.saturating_sub(1);
                if remaining == 0 {
                    let duration = rng.random_range(params.crosswind_durations.0..params.crosswind_durations.1);
                    Some((-agent.crosswind_side, duration))
                } else {
                    Some((agent.crosswind_side, remaining))
                }
            }
            PlumeFinding::Upwind | PlumeFinding::Downwind => None,
        };

        Decision {
            displacement,
            sensed_co2: None,
            crosswind,
        }
    }
}

impl PlumeTracking {
    pub(crate) fn respond<R: Rng + ?Sized>(
        self,
        agent: &Mosquito,
        signal: Signal,
        params: &StrategyParams,
        rng: &mut R,
    ) -> Decision {
        match self {
            PlumeTracking::Klinotaxis => klinotaxis(agent, signal, params, rng),
        }
    }
}

/// Memory-based plume tracking. The course is the mean of a CO2-driven
/// heading (previous course, turned around if CO2 dropped) and an upwind
/// heading; CO2 sets the speed.
fn klinotaxis<R: Rng + ?Sized>(
    agent: &Mosquito,
    signal: Signal,
    params: &StrategyParams,
    rng: &mut R,
) -> Decision {
    let curves = &params.curves;
    let speed = curves.co2.window(signal.co2);

    let diff = signal.co2 - agent.previous_co2;
    let co2_window = curves.diff_co2.window(diff.abs());
    let mut co2_heading = agent.previous_motion_dir + jitter(co2_window, rng);
    if diff < 0.0 {
        co2_heading -= PI;
    }

    let wind_window = curves.wind.window(signal.u.hypot(signal.v));
    let wind_heading = PI + signal.v.atan2(signal.u) + jitter(wind_window, rng);

    let di = params.decision_interval;
    let displacement = [
        di * (signal.u + 0.5 * speed * (co2_heading.cos() + wind_heading.cos())),
        di * (signal.v + 0.5 * speed * (co2_heading.sin() + wind_heading.sin())),
    ];
    Decision {
        displacement,
        sensed_co2: Some(signal.co2),
        crosswind: None,
    }
}

/// Uniform draw in `[-window, window)`.
fn jitter<R: Rng + ?Sized>(window: f64, rng: &mut R) -> f64 {
    window * (-1.0 + 2.0 * rng.random::<f64>())
}

/// Outcome of one decision, applied after every agent has decided.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Decision {
    pub displacement: [f64; 2],
    /// CO2 to remember; only plume tracking updates the memory.
    pub sensed_co2: Option<f64>,
    /// New crosswind `(side, remaining decisions)`.
    pub crosswind: Option<(f64, u32)>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ResponseCurves {
    pub co2: ResponseCurve,
    pub wind: ResponseCurve,
    pub diff_co2: ResponseCurve,
}

impl ResponseCurves {
    pub fn from_config(config: &PopulationConfig) -> Result<Self, InvalidParameterError> {
        Ok(Self {
            co2: ResponseCurve::new("CO2", config.co2)?,
            wind: ResponseCurve::new("wind", config.wind)?,
            diff_co2: ResponseCurve::new("diffCO2", config.diff_co2)?,
        })
    }
}

/// Per-population constants the strategies read.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StrategyParams {
    pub curves: ResponseCurves,
    pub max_speed: f64,
    pub decision_interval: f64,
    /// Half-open range of crosswind leg lengths, in decisions.
    pub crosswind_durations: (u32, u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mosquito::AgentState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn params() -> StrategyParams {
        let config = PopulationConfig::default();
        StrategyParams {
            curves: ResponseCurves::from_config(&config).unwrap(),
            max_speed: config.max_speed,
            decision_interval: 1.0,
            crosswind_durations: (5, 10),
        }
    }

    fn agent(side: f64, remaining: u32) -> Mosquito {
        Mosquito {
            id: 0,
            position: [50.0, 50.0],
            previous_co2: 0.0,
            previous_motion_dir: 0.0,
            state: AgentState::Searching,
            crosswind_side: side,
            crosswind_remaining: remaining,
            found_host: None,
            decisions: 0,
        }
    }

    const NORTH_WIND: Signal = Signal {
        u: 0.0,
        v: 0.2,
        co2: 0.0,
    };

    #[test]
    fn upwind_and_downwind_fly_against_and_with_the_wind() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        for _ in 0..100 {
            let up = PlumeFinding::Upwind.respond(&agent(1.0, 0), NORTH_WIND, &params(), &mut rng);
            let down = PlumeFinding::Downwind.respond(&agent(1.0, 0), NORTH_WIND, &params(), &mut rng);
            assert!(up.displacement[1] < 0.0);
            assert!(down.displacement[1] > 0.0);
            assert!(up.crosswind.is_none() && up.sensed_co2.is_none());
        }
    }

    #[test]
    fn crosswind_flies_across_and_flips_after_leg() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let left = PlumeFinding::Crosswind.respond(&agent(1.0, 3), NORTH_WIND, &params(), &mut rng);
        assert!(left.displacement[0] < 0.0);
        assert_eq!(left.crosswind, Some((1.0, 2)));

        let right = PlumeFinding::Crosswind.respond(&agent(-1.0, 1), NORTH_WIND, &params(), &mut rng);
        assert!(right.displacement[0] > 0.0);
        let (side, remaining) = right.crosswind.unwrap();
        assert_eq!(side, 1.0);
        assert!((5..10).contains(&remaining));
    }

    #[test]
    fn klinotaxis_turns_away_when_co2_drops() {
        let mut p = params();
        let mut no_spread = PopulationConfig::default();
        no_spread.wind.window_min = 0.0;
        no_spread.wind.window_max = 0.0;
        no_spread.diff_co2.window_min = 0.0;
        no_spread.diff_co2.window_max = 0.0;
        p.curves = ResponseCurves::from_config(&no_spread).unwrap();

        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let signal = Signal { co2: 0.5, ..NORTH_WIND };
        let speed = p.curves.co2.window(0.5);

        let mut rising = agent(1.0, 0);
        rising.previous_motion_dir = -FRAC_PI_2;
        let up = klinotaxis(&rising, signal, &p, &mut rng);
        assert!((up.displacement[1] - (0.2 - speed)).abs() < 1e-12);
        assert_eq!(up.sensed_co2, Some(0.5));

        let mut falling = rising.clone();
        falling.previous_co2 = 0.9;
        let away = klinotaxis(&falling, signal, &p, &mut rng);
        assert!((away.displacement[1] - 0.2).abs() < 1e-12);
        assert!(away.displacement[0].abs() < 1e-12);
    }

    #[test]
    fn klinotaxis_slows_down_as_co2_saturates() {
        let mut no_spread = PopulationConfig::default();
        no_spread.wind.window_max = 0.0;
        no_spread.wind.window_min = 0.0;
        no_spread.diff_co2.window_max = 0.0;
        no_spread.diff_co2.window_min = 0.0;
        let mut p = params();
        p.curves = ResponseCurves::from_config(&no_spread).unwrap();

        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut heading_west = agent(1.0, 0);
        heading_west.previous_motion_dir = PI;
        let still = Signal {
            u: 0.0,
            v: 0.0,
            co2: 0.0,
        };

        // The co2 window runs from 1.5 at threshold down to 0.4 at saturation.
        for (co2, speed) in [(0.01, 1.5), (1.0, 0.4), (2.0, 0.4)] {
            let step = klinotaxis(&heading_west, Signal { co2, ..still }, &p, &mut rng);
            assert!((step.displacement[0] + speed).abs() < 1e-12, "co2 = {co2}");
            assert!(step.displacement[1].abs() < 1e-12);
        }
    }
}
