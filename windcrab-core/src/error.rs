//! Error taxonomy for window pipelines.
//!
//! Fallible paths return [`anyhow::Result`]; the variants below are what ends up
//! inside those errors and can be recovered with `downcast_ref::<WindowError>()`.

use thiserror::Error;

use crate::time::TimeDomain;
use crate::types::EventTime;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum WindowError {
    /// Invalid pipeline configuration, detected before any element is processed.
    #[error("configuration rejected: {reason}")]
    ConfigurationRejected { reason: String },

    /// An aggregation function or trigger failed for one (key, window).
    #[error("{stage} failed for key {key} in window {window}: {source}")]
    Processing {
        key: String,
        window: String,
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    /// The timer service refused to register or cancel a timer.
    #[error("timer {operation} failed at {time} ({domain:?}): {reason}")]
    TimerService {
        operation: &'static str,
        time: EventTime,
        domain: TimeDomain,
        reason: String,
    },

    /// A watermark arrived that is older than the current one.
    #[error("watermark {watermark} is behind current watermark {current}")]
    WatermarkRegression {
        watermark: EventTime,
        current: EventTime,
    },

    /// An event-time pipeline received a record without a timestamp.
    #[error("record has no timestamp; event-time windows need one")]
    MissingTimestamp,
}

impl WindowError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::ConfigurationRejected {
            reason: reason.into(),
        }
    }

    /// Fatal errors abort processing of the current element across all its windows.
    ///
    /// Timer-service failures are surfaced to the caller but do not stop sibling
    /// windows from being processed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::TimerService { .. } => false,
            Self::Processing { source, .. } => !matches!(
                source.downcast_ref::<WindowError>(),
                Some(WindowError::TimerService { .. })
            ),
            _ => true,
        }
    }
}

/// Return whether an `anyhow` error should abort processing of the current element.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<WindowError>() {
        Some(window_err) => window_err.is_fatal(),
        None => true,
    }
}
