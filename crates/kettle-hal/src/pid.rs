//! Sample-time gated PID (Proportional–Integral–Derivative) engine.
//!
//! The engine owns its clock and decides on its own whether a call is due:
//! calls arriving sooner than one sample interval after the last real
//! computation return the cached output untouched.  Callers can therefore
//! invoke [`PidEngine::compute`] as often as they like.
//!
//! - Gains are pre-scaled once: `ki * sample_time` and `kd / sample_time`.
//! - The integral only accumulates while the previous output was strictly
//!   inside the output limits, and is clamped to those limits.
//! - The derivative acts on the measurement, not on the error, so setpoint
//!   changes do not kick the output.
//!
//! # Example
//!
//! ```rust
//! use kettle_hal::clock::ManualClock;
//! use kettle_hal::pid::{PidEngine, PidParameters};
//!
//! let params = PidParameters::new(1.0, 0.0, 0.0, 5.0)
//!     .and_then(|p| p.with_output_limits(0.0, 100.0))
//!     .expect("valid parameters");
//! let mut pid = PidEngine::new(params, Box::new(ManualClock::new()));
//!
//! assert_eq!(pid.compute(20.0, 30.0), 10.0);
//! ```

use std::fmt;

use kettle_types::KettleError;
use tracing::{debug, warn};

use crate::clock::Clock;

/// Validated tuning and limits for one [`PidEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidParameters {
    kp: f64,
    ki: f64,
    kd: f64,
    sample_time_secs: f64,
    output_min: f64,
    output_max: f64,
}

impl PidParameters {
    /// Gains and sample interval in seconds.
    ///
    /// Output is unclamped (`-inf..inf`) until
    /// [`with_output_limits`][Self::with_output_limits] is applied.
    ///
    /// # Errors
    ///
    /// [`KettleError::InvalidConfiguration`] if a gain is not a finite number
    /// or `sample_time_secs` is not strictly positive.
    pub fn new(kp: f64, ki: f64, kd: f64, sample_time_secs: f64) -> Result<Self, KettleError> {
        for (name, gain) in [("kp", kp), ("ki", ki), ("kd", kd)] {
            if !gain.is_finite() {
                return Err(KettleError::InvalidConfiguration(format!(
                    "{name} must be specified as a finite number, got {gain}"
                )));
            }
        }
        if sample_time_secs.is_nan() || sample_time_secs <= 0.0 || sample_time_secs.is_infinite() {
            return Err(KettleError::InvalidConfiguration(format!(
                "sample time must be greater than 0 seconds, got {sample_time_secs}"
            )));
        }
        Ok(Self {
            kp,
            ki,
            kd,
            sample_time_secs,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
        })
    }

    /// Bound the output (and the integral term) to `[min, max]`.
    ///
    /// # Errors
    ///
    /// [`KettleError::InvalidConfiguration`] unless `min < max`.
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Result<Self, KettleError> {
        if min.is_nan() || max.is_nan() || min >= max {
            return Err(KettleError::InvalidConfiguration(format!(
                "output_min must be less than output_max (got {min} >= {max})"
            )));
        }
        self.output_min = min;
        self.output_max = max;
        Ok(self)
    }

    pub fn gains(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }

    pub fn sample_time_secs(&self) -> f64 {
        self.sample_time_secs
    }

    pub fn output_min(&self) -> f64 {
        self.output_min
    }

    pub fn output_max(&self) -> f64 {
        self.output_max
    }
}

/// Mutable state of a [`PidEngine`], readable through [`PidEngine::state`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidState {
    pub integral_term: f64,
    pub last_input: f64,
    pub last_output: f64,
    /// Clock reading of the last real computation; `None` before the first.
    pub last_compute_ms: Option<u64>,
}

/// PID engine with sample-time gating and saturation-gated integration.
pub struct PidEngine {
    params: PidParameters,
    ki_scaled: f64,
    kd_scaled: f64,
    sample_time_ms: f64,
    state: PidState,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for PidEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidEngine")
            .field("params", &self.params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl PidEngine {
    pub fn new(params: PidParameters, clock: Box<dyn Clock>) -> Self {
        Self {
            ki_scaled: params.ki * params.sample_time_secs,
            kd_scaled: params.kd / params.sample_time_secs,
            sample_time_ms: params.sample_time_secs * 1000.0,
            params,
            state: PidState::default(),
            clock,
        }
    }

    pub fn params(&self) -> &PidParameters {
        &self.params
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Compute the output for `input` (process value) against `setpoint`.
    ///
    /// Returns the cached output without touching any state when less than
    /// one sample interval has passed since the last computation, or when
    /// `input` or `setpoint` is not a finite number.
    pub fn compute(&mut self, input: f64, setpoint: f64) -> f64 {
        let now = self.clock.now_ms();

        if let Some(last) = self.state.last_compute_ms
            && (now.saturating_sub(last) as f64) < self.sample_time_ms
        {
            return self.state.last_output;
        }

        let min = self.params.output_min;
        let max = self.params.output_max;

        if !input.is_finite() || !setpoint.is_finite() {
            warn!(input, setpoint, "ignoring non-finite pid input");
            return self.state.last_output.clamp(min, max);
        }

        let error = setpoint - input;
        let d_input = input - self.state.last_input;

        let i_step = self.ki_scaled * error;
        if !i_step.is_nan() && self.state.last_output > min && self.state.last_output < max {
            self.state.integral_term = (self.state.integral_term + i_step).clamp(min, max);
        }

        let p = self.params.kp * error;
        let i = self.state.integral_term;
        let d = -(self.kd_scaled * d_input);
        // Opposite overflows of P and D sum to NaN, which `clamp` passes through.
        let raw = p + i + d;
        let output = if raw.is_nan() {
            self.state.last_output.clamp(min, max)
        } else {
            raw.clamp(min, max)
        };

        debug!(p, i, d, output, "pid computed");

        self.state.last_input = input;
        self.state.last_compute_ms = Some(now);
        self.state.last_output = output;
        output
    }

    /// Forget all accumulated state; the next call computes immediately.
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }
}
