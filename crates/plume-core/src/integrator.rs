//! Explicit one-step time integrators over flat state vectors.
//!
//! The derivative is taken as `Fn`, not `FnMut`: it must not mutate state
//! between stages. Anything that changes over a step (the random wind
//! perturbation, for example) has to be expressed through the stage time `t`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegratorKind {
    ForwardEuler,
    RungeKutta4,
}

impl IntegratorKind {
    pub fn step<F>(self, t: f64, y: &[f64], dt: f64, derivative: F) -> Vec<f64>
    where
        F: Fn(f64, &[f64]) -> Vec<f64>,
    {
        match self {
            IntegratorKind::ForwardEuler => forward_euler(t, y, dt, derivative),
            IntegratorKind::RungeKutta4 => runge_kutta4(t, y, dt, derivative),
        }
    }
}

/// `y + dt * f(t, y)`
pub fn forward_euler<F>(t: f64, y: &[f64], dt: f64, derivative: F) -> Vec<f64>
where
    F: Fn(f64, &[f64]) -> Vec<f64>,
{
    let k1 = derivative(t, y);
    debug_assert_eq!(k1.len(), y.len(), "derivative must preserve state length");
    axpy(y, dt, &k1)
}

/// Classical four-stage Runge-Kutta step.
pub fn runge_kutta4<F>(t: f64, y: &[f64], dt: f64, derivative: F) -> Vec<f64>
where
    F: Fn(f64, &[f64]) -> Vec<f64>,
{
    let half = 0.5 * dt;
    let k1 = derivative(t, y);
    debug_assert_eq!(k1.len(), y.len(), "derivative must preserve state length");
    let k2 = derivative(t + half, &axpy(y, half, &k1));
    let k3 = derivative(t + half, &axpy(y, half, &k2));
    let k4 = derivative(t + dt, &axpy(y, dt, &k3));

    let sixth = dt / 6.0;
    y.iter()
        .enumerate()
        .map(|(n, &yn)| yn + sixth * (k1[n] + 2.0 * k2[n] + 2.0 * k3[n] + k4[n]))
        .collect()
}

fn axpy(y: &[f64], a: f64, x: &[f64]) -> Vec<f64> {
    y.iter().zip(x.iter()).map(|(yn, xn)| yn + a * xn).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decay(_t: f64, y: &[f64]) -> Vec<f64> {
        y.iter().map(|v| -v).collect()
    }

    #[test]
    fn rk4_matches_exponential_decay_to_fifth_order() {
        let dt = 0.01;
        let y = runge_kutta4(0.0, &[1.0], dt, decay);
        let err = (y[0] - (-dt).exp()).abs();
        // Local error of RK4 is dt^5 / 120 ~ 8.3e-13 here.
        assert!(err < 1e-11, "rk4 error {err}");
    }

    #[test]
    fn forward_euler_is_only_second_order_locally() {
        let dt = 0.01;
        let y = forward_euler(0.0, &[1.0], dt, decay);
        let err = (y[0] - (-dt).exp()).abs();
        assert!(err > 1e-5 && err < 1e-4, "euler error {err}");
    }

    #[test]
    fn rk4_uses_stage_times() {
        // dy/dt = t integrates exactly to dt^2 / 2 from y = 0.
        let dt = 0.5;
        let y = runge_kutta4(1.0, &[0.0], dt, |t, _| vec![t]);
        assert!((y[0] - (1.0 * dt + 0.5 * dt * dt)).abs() < 1e-14);
    }

    #[test]
    fn integrators_are_reproducible() {
        let y0 = [0.3, -1.2, 4.0];
        let f = |t: f64, y: &[f64]| y.iter().map(|v| (t * v).sin()).collect::<Vec<_>>();
        for kind in [IntegratorKind::ForwardEuler, IntegratorKind::RungeKutta4] {
            let a = kind.step(0.25, &y0, 0.1, f);
            let b = kind.step(0.25, &y0, 0.1, f);
            assert_eq!(a, b);
        }
    }
}
