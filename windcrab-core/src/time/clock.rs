use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::*;

/// Source of processing time for ingestion/processing-time windows.
pub trait ProcessingTimeClock: Send + Sync {
    /// Current processing time in milliseconds since epoch.
    fn now(&self) -> EventTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ProcessingTimeClock for SystemClock {
    fn now(&self) -> EventTime {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as EventTime)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: EventTime) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, time: EventTime) {
        self.now.store(time, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl ProcessingTimeClock for ManualClock {
    fn now(&self) -> EventTime {
        self.now.load(Ordering::SeqCst)
    }
}
