use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use windcrab_core::channel::DEFAULT_CHANNEL_CAPACITY;
use windcrab_core::config::WindowConfig;
use windcrab_core::time::{ProcessingTimeClock, SystemClock};
use windcrab_core::types::{StreamData, StreamElement};

use crate::datastream::DataStream;

/// How a job is executed: number of window operator instances, the buffer
/// between the router and each of them, and how often processing-time timers
/// are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub parallelism: usize,
    pub channel_capacity: usize,
    /// Minimum clock advance between two processing-time ticks. Operators are
    /// ticked between elements; `None` disables ticking, leaving processing-time
    /// windows to end-of-stream.
    pub processing_time_tick_interval: Option<Duration>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            processing_time_tick_interval: Some(Duration::ZERO),
        }
    }
}

impl ExecutionConfig {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_processing_time_tick(mut self, interval: Option<Duration>) -> Self {
        self.processing_time_tick_interval = interval;
        self
    }
}

/// Everything a stream inherits from the environment it was created in.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub job_name: Arc<str>,
    pub window_config: WindowConfig,
    pub execution: ExecutionConfig,
    pub clock: Arc<dyn ProcessingTimeClock>,
}

/// The entry point for building a windowed job.
///
/// The environment only carries configuration; it holds no global state and
/// any number of them can coexist. Create streams with [`from_iter`](Self::from_iter),
/// chain transformations on the returned [`DataStream`] and execute the job the
/// chain ends in.
pub struct StreamExecutionEnvironment {
    context: JobContext,
}

impl StreamExecutionEnvironment {
    /// Create an environment for a job with the given name and window configuration.
    pub fn new(job_name: &str, window_config: WindowConfig) -> Self {
        Self {
            context: JobContext {
                job_name: Arc::from(job_name),
                window_config,
                execution: ExecutionConfig::default(),
                clock: Arc::new(SystemClock),
            },
        }
    }

    pub fn with_execution_config(mut self, execution: ExecutionConfig) -> Self {
        self.context.execution = execution;
        self
    }

    /// Clock used for processing-time and ingestion-time windows.
    pub fn with_clock(mut self, clock: impl ProcessingTimeClock + 'static) -> Self {
        self.context.clock = Arc::new(clock);
        self
    }

    pub fn job_name(&self) -> &str {
        &self.context.job_name
    }

    pub fn window_config(&self) -> &WindowConfig {
        &self.context.window_config
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.context.execution
    }

    /// A bounded stream of untimestamped records.
    pub fn from_iter<T, I>(&self, iter: I) -> DataStream<T>
    where
        T: StreamData,
        I: IntoIterator<Item = T>,
    {
        self.from_elements(iter.into_iter().map(StreamElement::record))
    }

    /// A bounded stream of already prepared elements: timestamped records and
    /// watermarks, optionally terminated by `End`.
    pub fn from_elements<T, I>(&self, elements: I) -> DataStream<T>
    where
        T: StreamData,
        I: IntoIterator<Item = StreamElement<T>>,
    {
        DataStream::new(self.context.clone(), elements.into_iter().collect())
    }
}
