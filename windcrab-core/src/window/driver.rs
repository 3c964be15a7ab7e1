//! Per-element and per-timer processing shared by both window operators.
//!
//! The driver owns the state store, runs the trigger through a
//! [`TriggerContext`], applies lateness and cleanup, merges session windows and
//! hands fired windows to a [`WindowEmitter`].

use super::*;

/// Evaluates the contents of a window when its trigger fires.
pub(crate) trait WindowEmitter<K, T, W, OUT>: Send {
    fn emit(
        &mut self,
        key: &K,
        window: &W,
        contents: &mut WindowState<T>,
        ctx: &EvictorContext,
        output: &mut Vec<OUT>,
    ) -> Result<()>;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Everything a driver needs besides the emitter.
pub(crate) struct DriverParts<K, T, W> {
    pub assigner: Arc<dyn WindowAssigner<T, Window = W>>,
    pub trigger: Arc<dyn Trigger<T, W>>,
    pub key_selector: KeySelector<T, K>,
    pub store: WindowStateStore<K, T, W>,
    pub clock: Arc<dyn ProcessingTimeClock>,
    pub domain: TimeDomain,
    pub allowed_lateness_ms: i64,
    pub regression_policy: WatermarkRegressionPolicy,
}

pub(crate) struct WindowDriver<K, T, W, OUT, E> {
    assigner: Arc<dyn WindowAssigner<T, Window = W>>,
    trigger: Arc<dyn Trigger<T, W>>,
    key_selector: KeySelector<T, K>,
    store: WindowStateStore<K, T, W>,
    clock: Arc<dyn ProcessingTimeClock>,
    domain: TimeDomain,
    allowed_lateness_ms: i64,
    regression_policy: WatermarkRegressionPolicy,
    emitter: E,
    current_watermark: EventTime,
    late_elements_dropped: u64,
    /// Results produced before an error, handed out by the next call.
    pending: Vec<StreamElement<OUT>>,
    closed: bool,
}

fn processing_error<K: Debug, W: Debug>(
    key: &K,
    window: &W,
    stage: &'static str,
    err: anyhow::Error,
) -> anyhow::Error {
    // Keep a typed source so `is_fatal` can see through the wrapper.
    let source: BoxError = match err.downcast::<WindowError>() {
        Ok(window_err) => Box::new(window_err),
        Err(err) => err.into(),
    };
    WindowError::Processing {
        key: format!("{key:?}"),
        window: format!("{window:?}"),
        stage,
        source,
    }
    .into()
}

impl<K, T, W, OUT, E> WindowDriver<K, T, W, OUT, E>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
    E: WindowEmitter<K, T, W, OUT>,
{
    pub(crate) fn new(parts: DriverParts<K, T, W>, emitter: E) -> Self {
        Self {
            assigner: parts.assigner,
            trigger: parts.trigger,
            key_selector: parts.key_selector,
            store: parts.store,
            clock: parts.clock,
            domain: parts.domain,
            allowed_lateness_ms: parts.allowed_lateness_ms,
            regression_policy: parts.regression_policy,
            emitter,
            current_watermark: EVENT_TIME_MIN,
            late_elements_dropped: 0,
            pending: Vec::new(),
            closed: false,
        }
    }

    // ── Public entry points ───────────────────────────────────────────────────

    pub(crate) fn open(&mut self) -> Result<()> {
        self.closed = false;
        self.emitter.open()
    }

    pub(crate) fn process(&mut self, element: StreamElement<T>) -> Result<Vec<StreamElement<OUT>>> {
        let mut output = std::mem::take(&mut self.pending);
        let result = match element {
            StreamElement::Record(record) => self.process_record(record, &mut output),
            StreamElement::Watermark(watermark) => self.process_watermark(watermark, &mut output),
            StreamElement::End => {
                let closed = self.close_into(&mut output);
                if closed.is_ok() {
                    output.push(StreamElement::End);
                }
                closed
            }
        };
        self.finish(result, output)
    }

    pub(crate) fn on_processing_time(&mut self, now: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        let mut output = std::mem::take(&mut self.pending);
        let result = self.fire_due_timers(TimeDomain::ProcessingTime, now, &mut output);
        self.finish(result, output)
    }

    pub(crate) fn close_key(&mut self, key: &K) -> Result<Vec<StreamElement<OUT>>> {
        let mut output = std::mem::take(&mut self.pending);
        let result = match bincode::serialize(key) {
            Ok(key_bytes) => self.flush_key(&key_bytes, &mut output),
            Err(err) => Err(err.into()),
        };
        self.finish(result, output)
    }

    pub(crate) fn close(&mut self) -> Result<Vec<StreamElement<OUT>>> {
        let mut output = std::mem::take(&mut self.pending);
        let result = self.close_into(&mut output);
        self.finish(result, output)
    }

    pub(crate) fn take_pending_output(&mut self) -> Vec<StreamElement<OUT>> {
        std::mem::take(&mut self.pending)
    }

    fn finish(&mut self, result: Result<()>, output: Vec<StreamElement<OUT>>) -> Result<Vec<StreamElement<OUT>>> {
        match result {
            Ok(()) => Ok(output),
            Err(err) => {
                self.pending = output;
                Err(err)
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub(crate) fn trigger_name(&self) -> &'static str {
        self.trigger.name()
    }

    pub(crate) fn assigner_name(&self) -> &'static str {
        self.assigner.name()
    }

    pub(crate) fn time_domain(&self) -> TimeDomain {
        self.domain
    }

    pub(crate) fn store(&self) -> &WindowStateStore<K, T, W> {
        &self.store
    }

    pub(crate) fn current_watermark(&self) -> EventTime {
        self.current_watermark
    }

    pub(crate) fn late_elements_dropped(&self) -> u64 {
        self.late_elements_dropped
    }

    pub(crate) fn emitter(&self) -> &E {
        &self.emitter
    }

    // ── Elements ──────────────────────────────────────────────────────────────

    fn element_timestamp(&self, record: &StreamRecord<T>) -> Result<EventTime> {
        match self.domain {
            TimeDomain::EventTime => record
                .timestamp
                .ok_or_else(|| WindowError::MissingTimestamp.into()),
            TimeDomain::ProcessingTime => Ok(self.clock.now()),
        }
    }

    fn process_record(&mut self, record: StreamRecord<T>, output: &mut Vec<StreamElement<OUT>>) -> Result<()> {
        let timestamp = self.element_timestamp(&record)?;
        let value = record.value;
        let key = (self.key_selector)(&value);
        let key_bytes = bincode::serialize(&key)?;
        let assigner_ctx = AssignerContext {
            current_processing_time: self.clock.now(),
            current_watermark: self.current_watermark,
        };
        let windows = self.assigner.assign_windows(&value, timestamp, &assigner_ctx);

        let mut accepted = false;
        let mut first_error: Option<anyhow::Error> = None;
        for window in windows {
            if self.is_window_late(&window) {
                continue;
            }
            accepted = true;
            if let Err(err) = self.add_to_window(&key, &key_bytes, window, &value, timestamp, output) {
                if error::is_fatal(&err) {
                    return Err(err);
                }
                warn!(error = %err, "window processing failed; continuing with remaining windows");
                first_error.get_or_insert(err);
            }
        }

        if !accepted {
            self.late_elements_dropped += 1;
            warn!(
                key = ?key,
                timestamp,
                watermark = self.current_watermark,
                "dropping late element"
            );
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn add_to_window(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        window: W,
        value: &T,
        timestamp: EventTime,
        output: &mut Vec<StreamElement<OUT>>,
    ) -> Result<()> {
        // Timer registration failures are reported after the trigger result is applied.
        let mut timer_error: Option<anyhow::Error> = None;
        let window = if self.assigner.is_merging() {
            self.merge_session(key, key_bytes, window, &mut timer_error)?
        } else {
            window
        };

        self.store
            .merge_element(key, key_bytes, &window, value.clone(), timestamp)
            .map_err(|err| processing_error(key, &window, "reduce", err))?;

        let watermark = self.current_watermark;
        let now = self.clock.now();
        let result = match self.store.trigger_context(key_bytes, &window, watermark, now, &[]) {
            Some(mut ctx) => self.trigger.on_element(value, timestamp, &window, &mut ctx),
            None => Err(anyhow!("window state missing right after insertion")),
        }
        .map_err(|err| processing_error(key, &window, "trigger on_element", err))?;

        self.apply_result(key, key_bytes, &window, result, FireReason::Element, now, output)?;
        if let Err(err) = self.register_cleanup_timer(key_bytes, &window) {
            timer_error.get_or_insert(err);
        }
        match timer_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Merge `window` with the overlapping windows already held for the key.
    /// Returns the window the element ends up in.
    fn merge_session(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        window: W,
        timer_error: &mut Option<anyhow::Error>,
    ) -> Result<W> {
        let mut candidates = self.store.windows_of(key_bytes);
        if !candidates.contains(&window) {
            candidates.push(window.clone());
        }

        let mut actual = window.clone();
        for (target, sources) in self.assigner.merge_windows(&candidates) {
            if sources.contains(&window) {
                actual = target.clone();
            }
            let held: Vec<W> = sources
                .into_iter()
                .filter(|w| self.store.contains(key_bytes, w))
                .collect();
            if held.is_empty() || (held.len() == 1 && held[0] == target) {
                continue;
            }

            debug!(key = ?key, target = ?target, merged = held.len(), "merging windows");
            let merged_states = self
                .store
                .merge_windows(key, key_bytes, &held, &target)
                .map_err(|err| processing_error(key, &target, "merge", err))?;

            let watermark = self.current_watermark;
            let now = self.clock.now();
            if let Some(mut ctx) = self
                .store
                .trigger_context(key_bytes, &target, watermark, now, &merged_states)
            {
                self.trigger
                    .on_merge(&target, &mut ctx)
                    .map_err(|err| processing_error(key, &target, "trigger on_merge", err))?;
            }
            if let Err(err) = self.register_cleanup_timer(key_bytes, &target) {
                timer_error.get_or_insert(err);
            }
        }
        Ok(actual)
    }

    // ── Lateness and cleanup ──────────────────────────────────────────────────

    fn cleanup_time(&self, window: &W) -> EventTime {
        // A window reaching the end of time is never cleaned up.
        if window.max_timestamp() >= EVENT_TIME_MAX - 1 {
            return EVENT_TIME_MAX;
        }
        match self.domain {
            TimeDomain::EventTime => window.max_timestamp().saturating_add(self.allowed_lateness_ms),
            TimeDomain::ProcessingTime => window.max_timestamp(),
        }
    }

    fn is_window_late(&self, window: &W) -> bool {
        self.domain == TimeDomain::EventTime && self.cleanup_time(window) <= self.current_watermark
    }

    fn register_cleanup_timer(&mut self, key_bytes: &[u8], window: &W) -> Result<()> {
        let time = self.cleanup_time(window);
        if time == EVENT_TIME_MAX {
            return Ok(());
        }
        self.store.register_timer(key_bytes, window, time, self.domain)
    }

    // ── Trigger results ───────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn apply_result(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        window: &W,
        result: TriggerResult,
        reason: FireReason,
        processing_time: EventTime,
        output: &mut Vec<StreamElement<OUT>>,
    ) -> Result<()> {
        if result.is_fire() {
            self.fire(key, key_bytes, window, reason, processing_time, output)?;
        }
        if result.is_purge() {
            self.clear_window(key, key_bytes, window, processing_time)?;
        }
        Ok(())
    }

    fn fire(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        window: &W,
        reason: FireReason,
        processing_time: EventTime,
        output: &mut Vec<StreamElement<OUT>>,
    ) -> Result<()> {
        let Some(entry) = self.store.entry_mut(key_bytes, window) else {
            return Ok(());
        };
        let ctx = EvictorContext {
            reason,
            current_watermark: self.current_watermark,
            current_processing_time: processing_time,
        };

        let mut results = Vec::new();
        self.emitter
            .emit(key, window, entry.contents_mut(), &ctx, &mut results)
            .map_err(|err| processing_error(key, window, "window function", err))?;

        debug!(key = ?key, window = ?window, ?reason, results = results.len(), "window fired");
        let timestamp = window.max_timestamp();
        output.extend(
            results
                .into_iter()
                .map(|value| StreamElement::timestamped_record(value, timestamp)),
        );
        Ok(())
    }

    /// Clear trigger state, then drop contents and timers of the window.
    fn clear_window(&mut self, key: &K, key_bytes: &[u8], window: &W, processing_time: EventTime) -> Result<()> {
        let watermark = self.current_watermark;
        let cleared = match self
            .store
            .trigger_context(key_bytes, window, watermark, processing_time, &[])
        {
            Some(mut ctx) => self.trigger.clear(window, &mut ctx),
            None => Ok(()),
        };
        self.store.purge(key_bytes, window)?;
        cleared.map_err(|err| processing_error(key, window, "trigger clear", err))
    }

    // ── Time ──────────────────────────────────────────────────────────────────

    fn process_watermark(&mut self, watermark: Watermark, output: &mut Vec<StreamElement<OUT>>) -> Result<()> {
        if watermark.timestamp < self.current_watermark {
            match self.regression_policy {
                WatermarkRegressionPolicy::Reject => {
                    return Err(WindowError::WatermarkRegression {
                        watermark: watermark.timestamp,
                        current: self.current_watermark,
                    }
                    .into());
                }
                WatermarkRegressionPolicy::Clamp => {
                    debug!(%watermark, current = self.current_watermark, "ignoring regressing watermark");
                    return Ok(());
                }
            }
        }

        self.current_watermark = watermark.timestamp;
        self.fire_due_timers(TimeDomain::EventTime, watermark.timestamp, output)?;
        output.push(StreamElement::Watermark(watermark));
        Ok(())
    }

    fn fire_due_timers(
        &mut self,
        domain: TimeDomain,
        up_to: EventTime,
        output: &mut Vec<StreamElement<OUT>>,
    ) -> Result<()> {
        let processing_time = match domain {
            TimeDomain::ProcessingTime => up_to,
            TimeDomain::EventTime => self.clock.now(),
        };

        // One timer at a time: triggers may register timers that are already due,
        // and a fatal error leaves the timers not reached yet registered.
        let mut first_error: Option<anyhow::Error> = None;
        while let Some(timer) = self.store.pop_due(domain, up_to)? {
            if let Err(err) = self.on_timer(timer, processing_time, output) {
                if error::is_fatal(&err) {
                    return Err(err);
                }
                warn!(error = %err, "timer processing failed; continuing with remaining timers");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn on_timer(
        &mut self,
        timer: FiredTimer<W>,
        processing_time: EventTime,
        output: &mut Vec<StreamElement<OUT>>,
    ) -> Result<()> {
        let FiredTimer {
            key_bytes,
            window,
            time,
            domain,
        } = timer;
        let Some(key) = self.store.key_of(&key_bytes).cloned() else {
            return Ok(());
        };

        let watermark = self.current_watermark;
        let result = match self
            .store
            .trigger_context(&key_bytes, &window, watermark, processing_time, &[])
        {
            Some(mut ctx) => match domain {
                TimeDomain::EventTime => self.trigger.on_event_time(time, &window, &mut ctx),
                TimeDomain::ProcessingTime => self.trigger.on_processing_time(time, &window, &mut ctx),
            },
            None => return Ok(()),
        }
        .map_err(|err| processing_error(&key, &window, "trigger on_timer", err))?;

        let reason = match domain {
            TimeDomain::EventTime => FireReason::EventTime,
            TimeDomain::ProcessingTime => FireReason::ProcessingTime,
        };
        self.apply_result(&key, &key_bytes, &window, result, reason, processing_time, output)?;

        if domain == self.domain
            && time == self.cleanup_time(&window)
            && self.store.contains(&key_bytes, &window)
        {
            debug!(key = ?key, window = ?window, "cleanup time reached; purging window");
            self.clear_window(&key, &key_bytes, &window, processing_time)?;
        }
        Ok(())
    }

    // ── Closing ───────────────────────────────────────────────────────────────

    /// Run end-of-stream behaviour for every window of one key, then release it.
    fn flush_key(&mut self, key_bytes: &[u8], output: &mut Vec<StreamElement<OUT>>) -> Result<()> {
        let Some(key) = self.store.key_of(key_bytes).cloned() else {
            return Ok(());
        };
        let processing_time = self.clock.now();
        let watermark = self.current_watermark;

        for window in self.store.windows_of(key_bytes) {
            let result = match self
                .store
                .trigger_context(key_bytes, &window, watermark, processing_time, &[])
            {
                Some(mut ctx) => self.trigger.on_end_of_stream(&window, &mut ctx),
                None => continue,
            }
            .map_err(|err| processing_error(&key, &window, "trigger on_end_of_stream", err))?;

            match result {
                Some(result) => self.apply_result(
                    &key,
                    key_bytes,
                    &window,
                    result,
                    FireReason::EndOfStream,
                    processing_time,
                    output,
                )?,
                None => debug!(key = ?key, window = ?window, "purging window at end of stream"),
            }
            if self.store.contains(key_bytes, &window) {
                self.clear_window(&key, key_bytes, &window, processing_time)?;
            }
        }
        Ok(())
    }

    fn close_into(&mut self, output: &mut Vec<StreamElement<OUT>>) -> Result<()> {
        for key_bytes in self.store.key_bytes() {
            self.flush_key(&key_bytes, output)?;
        }
        if !self.closed {
            self.closed = true;
            debug!(
                assigner = self.assigner.name(),
                trigger = self.trigger.name(),
                late_elements_dropped = self.late_elements_dropped,
                "window operator closed"
            );
            self.emitter.close()?;
        }
        Ok(())
    }
}
