use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::{EventTime, Watermark};

mod clock;
mod timer_service;
mod watermark;

pub use clock::*;
pub use timer_service::*;
pub use watermark::*;

/// Which clock a window or timer is driven by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimeDomain {
    /// Driven by watermarks derived from element timestamps.
    EventTime,
    /// Driven by the wall clock of the processing machine.
    ProcessingTime,
}

/// Time semantics in force for a whole pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeCharacteristic {
    /// Element timestamps come from the records themselves.
    #[default]
    EventTime,
    /// Elements are stamped with the processing time at which they enter the operator.
    IngestionTime,
    /// Elements are assigned by the current processing time only.
    ProcessingTime,
}

impl TimeCharacteristic {
    /// The time domain that drives window completion under this characteristic.
    pub fn time_domain(self) -> TimeDomain {
        match self {
            TimeCharacteristic::EventTime => TimeDomain::EventTime,
            TimeCharacteristic::IngestionTime | TimeCharacteristic::ProcessingTime => {
                TimeDomain::ProcessingTime
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
