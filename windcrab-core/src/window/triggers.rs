use super::*;

// ── TriggerResult ─────────────────────────────────────────────────────────────

/// Outcome of a trigger evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    /// Keep accumulating; do nothing.
    Continue,
    /// Evaluate the window and emit the result; keep the window state.
    Fire,
    /// Discard the window state without emitting anything.
    Purge,
    /// Evaluate the window, emit the result, then discard the state.
    FireAndPurge,
}

impl TriggerResult {
    /// Return true if the window function should be evaluated.
    pub fn is_fire(self) -> bool {
        matches!(self, TriggerResult::Fire | TriggerResult::FireAndPurge)
    }

    /// Return true if the window state should be discarded after this result.
    pub fn is_purge(self) -> bool {
        matches!(self, TriggerResult::Purge | TriggerResult::FireAndPurge)
    }
}

// ── TriggerContext ────────────────────────────────────────────────────────────

/// Handle passed into every trigger callback for one (key, window).
///
/// Timers registered here are tracked by the state store and are cancelled when
/// the window is purged. Trigger-local state is stored per (key, window) as named,
/// bincode-encoded values; the engine never looks inside.
pub struct TriggerContext<'a> {
    namespace: &'a [u8],
    current_watermark: EventTime,
    current_processing_time: EventTime,
    timer_service: &'a mut dyn TimerService,
    registered: &'a mut BTreeSet<(TimeDomain, EventTime)>,
    state: &'a mut TriggerState,
    merged: &'a [TriggerState],
}

impl<'a> TriggerContext<'a> {
    pub(crate) fn new(
        namespace: &'a [u8],
        current_watermark: EventTime,
        current_processing_time: EventTime,
        timer_service: &'a mut dyn TimerService,
        registered: &'a mut BTreeSet<(TimeDomain, EventTime)>,
        state: &'a mut TriggerState,
        merged: &'a [TriggerState],
    ) -> Self {
        Self {
            namespace,
            current_watermark,
            current_processing_time,
            timer_service,
            registered,
            state,
            merged,
        }
    }

    pub fn current_watermark(&self) -> EventTime {
        self.current_watermark
    }

    pub fn current_processing_time(&self) -> EventTime {
        self.current_processing_time
    }

    pub fn register_event_time_timer(&mut self, time: EventTime) -> Result<()> {
        self.register(time, TimeDomain::EventTime)
    }

    pub fn delete_event_time_timer(&mut self, time: EventTime) -> Result<()> {
        self.delete(time, TimeDomain::EventTime)
    }

    pub fn register_processing_time_timer(&mut self, time: EventTime) -> Result<()> {
        self.register(time, TimeDomain::ProcessingTime)
    }

    pub fn delete_processing_time_timer(&mut self, time: EventTime) -> Result<()> {
        self.delete(time, TimeDomain::ProcessingTime)
    }

    fn register(&mut self, time: EventTime, domain: TimeDomain) -> Result<()> {
        self.timer_service
            .register(self.namespace.to_vec(), time, domain)?;
        self.registered.insert((domain, time));
        Ok(())
    }

    fn delete(&mut self, time: EventTime, domain: TimeDomain) -> Result<()> {
        self.timer_service.cancel(self.namespace, time, domain)?;
        self.registered.remove(&(domain, time));
        Ok(())
    }

    /// Read a named trigger-local value.
    pub fn state<S: DeserializeOwned>(&self, name: &str) -> Result<Option<S>> {
        match self.state.get(name) {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a named trigger-local value.
    pub fn put_state<S: Serialize>(&mut self, name: &str, value: &S) -> Result<()> {
        self.state.insert(name.to_string(), bincode::serialize(value)?);
        Ok(())
    }

    pub fn clear_state(&mut self, name: &str) {
        self.state.remove(name);
    }

    /// Values stored under `name` by the windows being merged into this one.
    ///
    /// Only populated during [`Trigger::on_merge`]; empty otherwise.
    pub fn merged_state<S: DeserializeOwned>(&self, name: &str) -> Result<Vec<S>> {
        self.merged
            .iter()
            .filter_map(|state| state.get(name))
            .map(|bytes| bincode::deserialize::<S>(bytes).map_err(anyhow::Error::from))
            .collect()
    }
}

// ── Trigger ───────────────────────────────────────────────────────────────────

/// Decides when a window is evaluated and when its state is discarded.
///
/// One trigger instance serves every key and window of a pipeline, so callbacks
/// take `&self`; anything that must be remembered per (key, window) goes through
/// the [`TriggerContext`].
pub trait Trigger<T, W>: Send + Sync {
    /// Called for every element added to `window`.
    fn on_element(
        &self,
        element: &T,
        timestamp: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult>;

    /// Called when an event-time timer registered for `window` fires.
    fn on_event_time(&self, time: EventTime, window: &W, ctx: &mut TriggerContext<'_>) -> Result<TriggerResult>;

    /// Called when a processing-time timer registered for `window` fires.
    fn on_processing_time(
        &self,
        time: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult>;

    /// Whether this trigger can be used with a merging assigner.
    fn can_merge(&self) -> bool {
        false
    }

    /// Called after several windows were merged into `window`. The merged windows'
    /// trigger state is available through [`TriggerContext::merged_state`].
    fn on_merge(&self, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<()> {
        bail!("trigger {} does not support merging", self.name())
    }

    /// Called right before the window's state is purged.
    fn clear(&self, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called for every live window when its key is closed.
    ///
    /// `None` means the window is purged without emission.
    fn on_end_of_stream(&self, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<Option<TriggerResult>> {
        Ok(None)
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ── EventTimeTrigger ──────────────────────────────────────────────────────────

/// Default trigger for event-time windows.
///
/// Registers an event-time timer at the window's max timestamp and fires (and
/// purges) when the watermark reaches it. An element arriving for a window the
/// watermark has already passed fires the window immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTimeTrigger;

impl EventTimeTrigger {
    pub fn create() -> Self {
        Self
    }
}

impl<T, W: Window> Trigger<T, W> for EventTimeTrigger {
    fn on_element(
        &self,
        _element: &T,
        _timestamp: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        if window.max_timestamp() <= ctx.current_watermark() {
            return Ok(TriggerResult::FireAndPurge);
        }
        ctx.register_event_time_timer(window.max_timestamp())?;
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(&self, time: EventTime, window: &W, _ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        if time >= window.max_timestamp() {
            Ok(TriggerResult::FireAndPurge)
        } else {
            Ok(TriggerResult::Continue)
        }
    }

    fn on_processing_time(
        &self,
        _time: EventTime,
        _window: &W,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        if window.max_timestamp() > ctx.current_watermark() {
            ctx.register_event_time_timer(window.max_timestamp())?;
        }
        Ok(())
    }

    fn clear(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        ctx.delete_event_time_timer(window.max_timestamp())
    }

    fn on_end_of_stream(&self, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<Option<TriggerResult>> {
        Ok(Some(TriggerResult::FireAndPurge))
    }

    fn name(&self) -> &'static str {
        "EventTimeTrigger"
    }
}

// ── ProcessingTimeTrigger ─────────────────────────────────────────────────────

/// Default trigger for processing-time and ingestion-time windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingTimeTrigger;

impl ProcessingTimeTrigger {
    pub fn create() -> Self {
        Self
    }
}

impl<T, W: Window> Trigger<T, W> for ProcessingTimeTrigger {
    fn on_element(
        &self,
        _element: &T,
        _timestamp: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        ctx.register_processing_time_timer(window.max_timestamp())?;
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(&self, _time: EventTime, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        time: EventTime,
        window: &W,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        if time >= window.max_timestamp() {
            Ok(TriggerResult::FireAndPurge)
        } else {
            Ok(TriggerResult::Continue)
        }
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        ctx.register_processing_time_timer(window.max_timestamp())
    }

    fn clear(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        ctx.delete_processing_time_timer(window.max_timestamp())
    }

    fn on_end_of_stream(&self, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<Option<TriggerResult>> {
        Ok(Some(TriggerResult::FireAndPurge))
    }

    fn name(&self) -> &'static str {
        "ProcessingTimeTrigger"
    }
}

// ── CountTrigger ──────────────────────────────────────────────────────────────

const COUNT_STATE: &str = "count";

/// Fires every `max_count` elements. The running count is trigger-local state.
#[derive(Debug, Clone, Copy)]
pub struct CountTrigger {
    max_count: u64,
}

impl CountTrigger {
    pub fn of(max_count: u64) -> Self {
        Self { max_count }
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }
}

impl<T, W: Window> Trigger<T, W> for CountTrigger {
    fn on_element(
        &self,
        _element: &T,
        _timestamp: EventTime,
        _window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        let count = ctx.state::<u64>(COUNT_STATE)?.unwrap_or(0) + 1;
        if count >= self.max_count {
            ctx.clear_state(COUNT_STATE);
            return Ok(TriggerResult::Fire);
        }
        ctx.put_state(COUNT_STATE, &count)?;
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(&self, _time: EventTime, _window: &W, _ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        _time: EventTime,
        _window: &W,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, _window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        let merged: u64 = ctx.merged_state::<u64>(COUNT_STATE)?.into_iter().sum();
        let count = ctx.state::<u64>(COUNT_STATE)?.unwrap_or(0) + merged;
        ctx.put_state(COUNT_STATE, &count)
    }

    fn clear(&self, _window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        ctx.clear_state(COUNT_STATE);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CountTrigger"
    }
}

// ── PurgingTrigger ────────────────────────────────────────────────────────────

/// Wraps another trigger and turns every `Fire` into `FireAndPurge`.
#[derive(Debug, Clone)]
pub struct PurgingTrigger<TR> {
    inner: TR,
}

impl<TR> PurgingTrigger<TR> {
    pub fn of(inner: TR) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &TR {
        &self.inner
    }
}

fn purging(result: TriggerResult) -> TriggerResult {
    match result {
        TriggerResult::Fire => TriggerResult::FireAndPurge,
        other => other,
    }
}

impl<T, W, TR> Trigger<T, W> for PurgingTrigger<TR>
where
    TR: Trigger<T, W>,
{
    fn on_element(
        &self,
        element: &T,
        timestamp: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        self.inner
            .on_element(element, timestamp, window, ctx)
            .map(purging)
    }

    fn on_event_time(&self, time: EventTime, window: &W, ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        self.inner.on_event_time(time, window, ctx).map(purging)
    }

    fn on_processing_time(
        &self,
        time: EventTime,
        window: &W,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        self.inner.on_processing_time(time, window, ctx).map(purging)
    }

    fn can_merge(&self) -> bool {
        self.inner.can_merge()
    }

    fn on_merge(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        self.inner.on_merge(window, ctx)
    }

    fn clear(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<()> {
        self.inner.clear(window, ctx)
    }

    fn on_end_of_stream(&self, window: &W, ctx: &mut TriggerContext<'_>) -> Result<Option<TriggerResult>> {
        Ok(self.inner.on_end_of_stream(window, ctx)?.map(purging))
    }

    fn name(&self) -> &'static str {
        "PurgingTrigger"
    }
}
