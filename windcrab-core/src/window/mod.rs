//! Keyed windowing: assigners, triggers, evictors and the two window operators.
//!
//! A pipeline is described with [`WindowPipeline`] and turned into an
//! [`AnyWindowOperator`] by [`WindowPipeline::build`]. Construction decides, once,
//! whether per-window state is an accumulator (plain [`WindowOperator`]) or a buffer
//! of raw elements ([`EvictingWindowOperator`]), and which trigger is in force.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{WatermarkRegressionPolicy, WindowConfig};
use crate::error::{self, BoxError, WindowError};
use crate::time::{
    InMemoryTimerService, ProcessingTimeClock, SystemClock, TimeCharacteristic, TimeDomain,
    TimerService, EVENT_TIME_MAX, EVENT_TIME_MIN,
};
use crate::types::{EventTime, StreamData, StreamElement, StreamRecord, Watermark};

mod assigners;
mod driver;
mod evicting;
mod evictors;
mod functions;
mod operator;
mod pipeline;
mod primitives;
mod selector;
mod state;
mod triggers;

pub use assigners::*;
pub use evicting::*;
pub use evictors::*;
pub use functions::*;
pub use operator::*;
pub use pipeline::*;
pub use primitives::*;
pub use selector::*;
pub use state::*;
pub use triggers::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/operator_tests.rs"]
mod operator_tests;
