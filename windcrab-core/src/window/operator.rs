use super::driver::{DriverParts, WindowDriver, WindowEmitter};
use super::*;

/// Finishes an accumulated window value with a window function.
pub(crate) struct AccumulatingEmitter<K, W, T, OUT> {
    finisher: Box<dyn WindowFunction<K, W, T, OUT>>,
}

impl<K, W, T, OUT> WindowEmitter<K, T, W, OUT> for AccumulatingEmitter<K, W, T, OUT> {
    fn emit(
        &mut self,
        key: &K,
        window: &W,
        contents: &mut WindowState<T>,
        _ctx: &EvictorContext,
        output: &mut Vec<OUT>,
    ) -> Result<()> {
        match contents {
            WindowState::Accumulator(Some(value)) => {
                self.finisher
                    .apply(key, window, std::slice::from_ref(value), output)
            }
            WindowState::Accumulator(None) => Ok(()),
            WindowState::Buffer(_) => bail!("plain window operator cannot evaluate buffered state"),
        }
    }

    fn open(&mut self) -> Result<()> {
        self.finisher.open()
    }

    fn close(&mut self) -> Result<()> {
        self.finisher.close()
    }
}

// ── WindowOperator ────────────────────────────────────────────────────────────

/// Window operator over accumulator state.
///
/// Every element is folded into its windows' accumulators as it arrives. When
/// a window fires, the accumulated value goes through the finisher and each
/// result is emitted as a record stamped with the window's max timestamp.
///
/// # Processing model
///
/// - **Records**: assigned to windows, folded, then the trigger is consulted.
/// - **Watermarks**: fire due event-time timers, then are forwarded.
/// - **End**: every live window gets its trigger's end-of-stream decision, then
///   `End` is forwarded.
pub struct WindowOperator<K, T, W, OUT> {
    driver: WindowDriver<K, T, W, OUT, AccumulatingEmitter<K, W, T, OUT>>,
}

impl<K, T, W, OUT> WindowOperator<K, T, W, OUT>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    pub(crate) fn new(parts: DriverParts<K, T, W>, finisher: Box<dyn WindowFunction<K, W, T, OUT>>) -> Self {
        Self {
            driver: WindowDriver::new(parts, AccumulatingEmitter { finisher }),
        }
    }

    /// Run the finisher's `open` hook.
    pub fn open(&mut self) -> Result<()> {
        self.driver.open()
    }

    /// Process one stream element and return the results it produced.
    ///
    /// On error, results produced before the failure are kept and returned by
    /// the next call (or by [`take_pending_output`](Self::take_pending_output)).
    pub fn process(&mut self, element: StreamElement<T>) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.process(element)
    }

    /// Fire processing-time timers due at or before `now`.
    pub fn on_processing_time(&mut self, now: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.on_processing_time(now)
    }

    /// Flush one key with end-of-stream semantics and release its state.
    pub fn close_key(&mut self, key: &K) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.close_key(key)
    }

    /// Flush every key and run the finisher's `close` hook.
    pub fn close(&mut self) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.close()
    }

    pub fn take_pending_output(&mut self) -> Vec<StreamElement<OUT>> {
        self.driver.take_pending_output()
    }

    pub fn trigger_name(&self) -> &'static str {
        self.driver.trigger_name()
    }

    pub fn assigner_name(&self) -> &'static str {
        self.driver.assigner_name()
    }

    pub fn time_domain(&self) -> TimeDomain {
        self.driver.time_domain()
    }

    pub fn state(&self) -> &WindowStateStore<K, T, W> {
        self.driver.store()
    }

    pub fn current_watermark(&self) -> EventTime {
        self.driver.current_watermark()
    }

    /// Elements dropped because every window they belonged to was past cleanup time.
    pub fn late_elements_dropped(&self) -> u64 {
        self.driver.late_elements_dropped()
    }
}
