//! Configuration of a window pipeline.
//!
//! Passed explicitly into pipeline construction; there is no process-wide
//! execution environment.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::WindowError;
use crate::time::TimeCharacteristic;

/// What to do with a watermark older than the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatermarkRegressionPolicy {
    /// Fail with [`WindowError::WatermarkRegression`]; state is left untouched.
    #[default]
    Reject,
    /// Ignore the watermark.
    Clamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub time_characteristic: TimeCharacteristic,
    /// How long after a window's end late elements are still accepted.
    /// Only meaningful for event-time windows.
    pub allowed_lateness_ms: i64,
    pub watermark_regression: WatermarkRegressionPolicy,
    /// Upper bound on pending timers per operator. `None` means unbounded.
    pub timer_capacity: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            time_characteristic: TimeCharacteristic::EventTime,
            allowed_lateness_ms: 0,
            watermark_regression: WatermarkRegressionPolicy::Reject,
            timer_capacity: None,
        }
    }
}

impl WindowConfig {
    pub fn new(time_characteristic: TimeCharacteristic) -> Self {
        Self {
            time_characteristic,
            ..Self::default()
        }
    }

    pub fn with_allowed_lateness(mut self, lateness: Duration) -> Self {
        self.allowed_lateness_ms = i64::try_from(lateness.as_millis()).unwrap_or(i64::MAX);
        self
    }

    pub fn with_watermark_regression(mut self, policy: WatermarkRegressionPolicy) -> Self {
        self.watermark_regression = policy;
        self
    }

    pub fn with_timer_capacity(mut self, capacity: usize) -> Self {
        self.timer_capacity = Some(capacity);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.allowed_lateness_ms < 0 {
            return Err(WindowError::configuration(format!(
                "allowed lateness must not be negative, got {}ms",
                self.allowed_lateness_ms
            ))
            .into());
        }
        if self.timer_capacity == Some(0) {
            return Err(WindowError::configuration("timer capacity must be at least 1").into());
        }
        Ok(())
    }
}
