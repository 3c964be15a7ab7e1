use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};
use windcrab_core::channel::{local_channel, LocalChannelSender};
use windcrab_core::error;
use windcrab_core::partitioner::{HashPartitioner, Partitioner};
use windcrab_core::time::{ProcessingTimeClock, TimeDomain, WatermarkStrategy, EVENT_TIME_MIN};
use windcrab_core::types::{EventTime, StreamData, StreamElement, StreamRecord};
use windcrab_core::window::{
    AnyWindowOperator, Evictor, KeySelector, OperatorVariant, PassThroughWindowFunction, Reducer,
    StateRepresentation, Trigger, Window, WindowAggregation, WindowAssigner, WindowFunction,
    WindowPipeline,
};

use crate::environment::JobContext;

/// Produces a fresh aggregation for every operator instance of a job.
type AggregationFactory<K, W, T, OUT> = Arc<dyn Fn() -> WindowAggregation<K, W, T, OUT> + Send + Sync>;

// ── DataStream ────────────────────────────────────────────────────────────────

/// A bounded stream of elements of type `T`.
///
/// Created by [`StreamExecutionEnvironment::from_iter`](crate::environment::StreamExecutionEnvironment::from_iter).
/// Call [`key_by`](Self::key_by) to partition by key.
pub struct DataStream<T> {
    context: JobContext,
    elements: Vec<StreamElement<T>>,
}

impl<T: StreamData> DataStream<T> {
    pub(crate) fn new(context: JobContext, elements: Vec<StreamElement<T>>) -> Self {
        Self { context, elements }
    }

    pub fn elements(&self) -> &[StreamElement<T>] {
        &self.elements
    }

    /// Stamp every record with its event time and insert a watermark after each
    /// record that advances the generator's watermark.
    ///
    /// Watermarks already present in the stream are replaced by generated ones.
    pub fn assign_timestamps_and_watermarks(self, strategy: impl WatermarkStrategy<T>) -> Self {
        let mut generator = strategy.create_watermark_generator();
        let mut elements = Vec::with_capacity(self.elements.len());

        for element in self.elements {
            match element {
                StreamElement::Record(record) => {
                    let timestamp = strategy.extract_timestamp(&record.value);
                    elements.push(StreamElement::timestamped_record(record.value, timestamp));
                    if let Some(watermark) = generator.on_event(timestamp) {
                        elements.push(StreamElement::Watermark(watermark));
                    }
                }
                StreamElement::Watermark(_) => {}
                StreamElement::End => elements.push(StreamElement::End),
            }
        }

        Self {
            context: self.context,
            elements,
        }
    }

    /// Partition the stream by key, returning a [`KeyedStream`].
    pub fn key_by<K, F>(self, key_fn: F) -> KeyedStream<K, T>
    where
        K: StreamData + Debug + Hash,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        KeyedStream {
            context: self.context,
            elements: self.elements,
            key_selector: Arc::new(key_fn),
        }
    }
}

// ── KeyedStream ───────────────────────────────────────────────────────────────

/// A stream partitioned by key. Elements with the same key are windowed together.
pub struct KeyedStream<K, T> {
    context: JobContext,
    elements: Vec<StreamElement<T>>,
    key_selector: KeySelector<T, K>,
}

impl<K, T> KeyedStream<K, T>
where
    K: StreamData + Debug + Hash,
    T: StreamData,
{
    /// Group each key's elements into the windows produced by `assigner`.
    pub fn window<A>(self, assigner: A) -> WindowedStream<K, T, A::Window>
    where
        A: WindowAssigner<T> + 'static,
    {
        WindowedStream {
            context: self.context,
            elements: self.elements,
            key_selector: self.key_selector,
            assigner: Arc::new(assigner),
            trigger: None,
            evictor: None,
        }
    }
}

// ── WindowedStream ────────────────────────────────────────────────────────────

/// A keyed stream with a window assigner. Ends in an aggregation.
pub struct WindowedStream<K, T, W> {
    context: JobContext,
    elements: Vec<StreamElement<T>>,
    key_selector: KeySelector<T, K>,
    assigner: Arc<dyn WindowAssigner<T, Window = W>>,
    trigger: Option<Arc<dyn Trigger<T, W>>>,
    evictor: Option<Arc<dyn Evictor<T, W>>>,
}

impl<K, T, W> WindowedStream<K, T, W>
where
    K: StreamData + Debug + Hash,
    T: StreamData,
    W: Window,
{
    /// Replace the trigger derived from the time characteristic.
    pub fn trigger(mut self, trigger: impl Trigger<T, W> + 'static) -> Self {
        self.trigger = Some(Arc::new(trigger));
        self
    }

    /// Trim window contents before (or after) evaluation. Forces buffered state.
    pub fn evictor(mut self, evictor: impl Evictor<T, W> + 'static) -> Self {
        self.evictor = Some(Arc::new(evictor));
        self
    }

    pub fn allowed_lateness(mut self, lateness: Duration) -> Self {
        self.context.window_config = self.context.window_config.with_allowed_lateness(lateness);
        self
    }

    /// Fold every window with `reduce_fn` and emit the folded value.
    pub fn reduce<F>(self, reduce_fn: F) -> Result<WindowJob<K, T, W, T>>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        self.reduce_with(Reducer::new(reduce_fn), PassThroughWindowFunction)
    }

    /// Fold every window with `reducer`, then hand the folded value to `finisher`.
    ///
    /// Fails if `reducer` was created with [`Reducer::rich`].
    pub fn reduce_with<F, OUT>(self, reducer: Reducer<T>, finisher: F) -> Result<WindowJob<K, T, W, OUT>>
    where
        F: WindowFunction<K, W, T, OUT> + Clone + Sync + 'static,
        OUT: StreamData,
    {
        self.into_job(Arc::new(move || {
            WindowAggregation::reduce_with(reducer.clone(), finisher.clone())
        }))
    }

    /// Evaluate every window with `function` over all of its elements.
    pub fn apply<F, OUT>(self, function: F) -> Result<WindowJob<K, T, W, OUT>>
    where
        F: WindowFunction<K, W, T, OUT> + Clone + Sync + 'static,
        OUT: StreamData,
    {
        self.into_job(Arc::new(move || WindowAggregation::apply(function.clone())))
    }

    fn into_job<OUT: StreamData>(self, aggregation: AggregationFactory<K, W, T, OUT>) -> Result<WindowJob<K, T, W, OUT>> {
        let mut job = WindowJob {
            context: self.context,
            elements: self.elements,
            key_selector: self.key_selector,
            assigner: self.assigner,
            trigger: self.trigger,
            evictor: self.evictor,
            aggregation,
            variant: OperatorVariant::Plain,
            representation: StateRepresentation::Accumulator,
            trigger_name: "",
            evictor_name: None,
        };

        // Build once up front so that configuration errors surface here.
        let validated = job.pipeline().build()?;
        job.variant = validated.variant();
        job.representation = validated.representation();
        job.trigger_name = validated.trigger_name();
        job.evictor_name = validated.evictor_name();
        Ok(job)
    }
}

// ── WindowJob ─────────────────────────────────────────────────────────────────

/// A validated windowed job, ready to execute.
///
/// Execution returns the records emitted by every fired window, stamped with the
/// window's max timestamp. Within one key, results appear in firing order; across
/// keys on different partitions the order is unspecified.
pub struct WindowJob<K, T, W, OUT> {
    context: JobContext,
    elements: Vec<StreamElement<T>>,
    key_selector: KeySelector<T, K>,
    assigner: Arc<dyn WindowAssigner<T, Window = W>>,
    trigger: Option<Arc<dyn Trigger<T, W>>>,
    evictor: Option<Arc<dyn Evictor<T, W>>>,
    aggregation: AggregationFactory<K, W, T, OUT>,
    variant: OperatorVariant,
    representation: StateRepresentation,
    trigger_name: &'static str,
    evictor_name: Option<&'static str>,
}

impl<K, T, W, OUT> WindowJob<K, T, W, OUT>
where
    K: StreamData + Debug + Hash,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    pub fn variant(&self) -> OperatorVariant {
        self.variant
    }

    pub fn representation(&self) -> StateRepresentation {
        self.representation
    }

    pub fn trigger_name(&self) -> &'static str {
        self.trigger_name
    }

    pub fn evictor_name(&self) -> Option<&'static str> {
        self.evictor_name
    }

    fn pipeline(&self) -> WindowPipeline<K, T, W, OUT> {
        let mut pipeline = WindowPipeline::from_shared(
            Arc::clone(&self.assigner),
            Arc::clone(&self.key_selector),
            (self.aggregation)(),
        )
        .config(self.context.window_config.clone())
        .shared_clock(Arc::clone(&self.context.clock));

        if let Some(trigger) = &self.trigger {
            pipeline = pipeline.shared_trigger(Arc::clone(trigger));
        }
        if let Some(evictor) = &self.evictor {
            pipeline = pipeline.shared_evictor(Arc::clone(evictor));
        }
        pipeline
    }

    fn ticker(&self) -> ProcessingTimeTicker {
        ProcessingTimeTicker::new(
            Arc::clone(&self.context.clock),
            self.context.execution.processing_time_tick_interval,
        )
    }

    /// Execute with the parallelism of the environment's [`ExecutionConfig`](crate::environment::ExecutionConfig).
    pub fn execute(self) -> Result<Vec<StreamRecord<OUT>>> {
        let parallelism = self.context.execution.parallelism;
        self.execute_with_parallelism(parallelism)
    }

    /// Execute the job with the specified parallelism.
    ///
    /// # Architecture
    ///
    /// ```text
    /// Router (calling thread)
    ///     |
    ///     | hash partition records by key,
    ///     | broadcast watermarks and End
    ///     v
    /// Window operators (parallelism threads)
    /// ```
    ///
    /// A parallelism of 0 or 1 runs a single operator on the calling thread.
    pub fn execute_with_parallelism(self, parallelism: usize) -> Result<Vec<StreamRecord<OUT>>> {
        let job_name = Arc::clone(&self.context.job_name);
        info!(
            job = %job_name,
            parallelism,
            variant = ?self.variant,
            trigger = self.trigger_name,
            "executing window job"
        );

        let records = if parallelism <= 1 {
            let mut operator = self.pipeline().build()?;
            let mut ticker = self.ticker();
            run_operator(&mut operator, self.elements, &mut ticker)?
        } else {
            self.execute_partitioned(parallelism)?
        };

        info!(job = %job_name, records = records.len(), "window job finished");
        Ok(records)
    }

    fn execute_partitioned(self, parallelism: usize) -> Result<Vec<StreamRecord<OUT>>> {
        let capacity = self.context.execution.channel_capacity.max(1);
        let mut senders = Vec::with_capacity(parallelism);
        let mut handles = Vec::with_capacity(parallelism);

        for index in 0..parallelism {
            let mut operator = self.pipeline().build()?;
            let mut ticker = self.ticker();
            let (sender, receiver) = local_channel::<T>(capacity);
            let handle = thread::Builder::new()
                .name(format!("{}-window-{index}", self.context.job_name))
                .spawn(move || run_operator(&mut operator, receiver.iter(), &mut ticker))?;
            senders.push(sender);
            handles.push(handle);
        }

        let partitioner = HashPartitioner::new(Arc::clone(&self.key_selector));
        let routed = route(self.elements, &senders, &partitioner);
        drop(senders);

        let mut records = Vec::new();
        let mut first_error: Option<anyhow::Error> = None;
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(partition_records)) => {
                    debug!(partition = index, records = partition_records.len(), "partition finished");
                    records.extend(partition_records);
                }
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(anyhow!("window worker {index} panicked"));
                }
            }
        }

        // A worker error explains a failed route (its receiver is gone), so report it first.
        if let Some(err) = first_error {
            return Err(err);
        }
        routed?;
        Ok(records)
    }
}

/// Send records to their key's partition; broadcast watermarks and End.
fn route<T, P>(elements: Vec<StreamElement<T>>, senders: &[LocalChannelSender<T>], partitioner: &P) -> Result<()>
where
    T: StreamData,
    P: Partitioner<T>,
{
    for element in elements {
        match element {
            StreamElement::Record(record) => {
                let partition = partitioner.partition(&record.value, senders.len());
                senders[partition].send(StreamElement::Record(record))?;
            }
            StreamElement::End => {
                broadcast(senders, StreamElement::End)?;
                return Ok(());
            }
            watermark => broadcast(senders, watermark)?,
        }
    }
    broadcast(senders, StreamElement::End)
}

fn broadcast<T: StreamData>(senders: &[LocalChannelSender<T>], element: StreamElement<T>) -> Result<()> {
    for sender in senders {
        sender.send(element.clone())?;
    }
    Ok(())
}

/// Fires due processing-time timers of an operator from the job clock.
struct ProcessingTimeTicker {
    clock: Arc<dyn ProcessingTimeClock>,
    interval_ms: Option<EventTime>,
    last_tick: EventTime,
}

impl ProcessingTimeTicker {
    fn new(clock: Arc<dyn ProcessingTimeClock>, interval: Option<Duration>) -> Self {
        Self {
            clock,
            interval_ms: interval.map(|d| d.as_millis().min(EventTime::MAX as u128) as EventTime),
            last_tick: EVENT_TIME_MIN,
        }
    }

    fn tick<K, T, W, OUT>(
        &mut self,
        operator: &mut AnyWindowOperator<K, T, W, OUT>,
        records: &mut Vec<StreamRecord<OUT>>,
    ) -> Result<()>
    where
        K: StreamData + Debug,
        T: StreamData,
        W: Window,
        OUT: StreamData,
    {
        let Some(interval) = self.interval_ms else {
            return Ok(());
        };
        if operator.time_domain() != TimeDomain::ProcessingTime {
            return Ok(());
        }
        let now = self.clock.now();
        if now < self.last_tick.saturating_add(interval) {
            return Ok(());
        }
        self.last_tick = now;
        let result = operator.on_processing_time(now);
        collect_records(operator, result, records)
    }
}

/// Drive one operator over `elements` until End, closing it if the input runs dry.
/// Processing time is ticked after every element but End.
fn run_operator<K, T, W, OUT, I>(
    operator: &mut AnyWindowOperator<K, T, W, OUT>,
    elements: I,
    ticker: &mut ProcessingTimeTicker,
) -> Result<Vec<StreamRecord<OUT>>>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
    I: IntoIterator<Item = StreamElement<T>>,
{
    operator.open()?;
    let mut records = Vec::new();
    for element in elements {
        let is_end = matches!(element, StreamElement::End);
        let result = operator.process(element);
        collect_records(operator, result, &mut records)?;
        if is_end {
            return Ok(records);
        }
        ticker.tick(operator, &mut records)?;
    }
    let result = operator.process(StreamElement::End);
    collect_records(operator, result, &mut records)?;
    Ok(records)
}

fn collect_records<K, T, W, OUT>(
    operator: &mut AnyWindowOperator<K, T, W, OUT>,
    result: Result<Vec<StreamElement<OUT>>>,
    records: &mut Vec<StreamRecord<OUT>>,
) -> Result<()>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    let output = match result {
        Ok(output) => output,
        Err(err) if !error::is_fatal(&err) => {
            warn!(error = %err, "non-fatal window error; keeping results produced so far");
            operator.take_pending_output()
        }
        Err(err) => return Err(err),
    };
    records.extend(output.into_iter().filter_map(|element| match element {
        StreamElement::Record(record) => Some(record),
        _ => None,
    }));
    Ok(())
}
