//! Saturating, threshold-gated response curves mapping a sensed signal to a
//! behavioral output.
//!
//! With the signal scaled by its saturation, `v = raw / sat` and
//! `t = thresh / sat`, the curve is
//!
//! ```text
//! r(v) = 0                                          v <= t
//!      = 1                                          v >= 1
//!      = (1 + k t)(v - t) / (1 + k t v (1 - t))     otherwise
//! ```
//!
//! `k` bends the curve between the threshold and saturation. The curve is only
//! monotonic when `k > -1 / t`, which is checked at construction.

use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Unscaled parameters for one signal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseParams {
    pub thresh: f64,
    pub sat: f64,
    pub kappa: f64,
    pub window_min: f64,
    pub window_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvalidParameterError {
    pub signal: &'static str,
    pub kappa: f64,
    pub scaled_thresh: f64,
}

impl fmt::Display for InvalidParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Kappa must be > -1.0 / {:.3} (got {})",
            self.signal, self.scaled_thresh, self.kappa
        )
    }
}

impl Error for InvalidParameterError {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResponseCurve {
    sat: f64,
    scaled_thresh: f64,
    kappa: f64,
    window_min: f64,
    window_max: f64,
}

impl ResponseCurve {
    /// `signal` only labels the error.
    pub fn new(signal: &'static str, params: ResponseParams) -> Result<Self, InvalidParameterError> {
        let scaled_thresh = params.thresh / params.sat;
        if scaled_thresh != 0.0 && params.kappa <= -1.0 / scaled_thresh {
            return Err(InvalidParameterError {
                signal,
                kappa: params.kappa,
                scaled_thresh,
            });
        }
        Ok(Self {
            sat: params.sat,
            scaled_thresh,
            kappa: params.kappa,
            window_min: params.window_min,
            window_max: params.window_max,
        })
    }

    /// Unwindowed response in `[0, 1]`.
    pub fn response(&self, raw: f64) -> f64 {
        let v = raw / self.sat;
        let t = self.scaled_thresh;
        if v <= t {
            0.0
        } else if v >= 1.0 {
            1.0
        } else {
            let k = self.kappa;
            (1.0 + k * t) * (v - t) / (1.0 + k * t * v * (1.0 - t))
        }
    }

    /// `window_max` below threshold, shrinking to `window_min` at saturation.
    pub fn window(&self, raw: f64) -> f64 {
        self.window_max - (self.window_max - self.window_min) * self.response(raw)
    }

    pub fn scaled_thresh(&self) -> f64 {
        self.scaled_thresh
    }
}
