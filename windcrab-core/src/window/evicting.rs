use super::driver::{DriverParts, WindowDriver, WindowEmitter};
use super::*;

/// Evicts, evaluates, and evicts again over a window buffer.
pub(crate) struct EvictingEmitter<K, T, W, OUT> {
    evictor: Option<Arc<dyn Evictor<T, W>>>,
    aggregation: WindowAggregation<K, W, T, OUT>,
}

impl<K, T, W, OUT> EvictingEmitter<K, T, W, OUT> {
    fn evictor_name(&self) -> Option<&'static str> {
        self.evictor.as_ref().map(|evictor| evictor.name())
    }
}

impl<K, T, W, OUT> WindowEmitter<K, T, W, OUT> for EvictingEmitter<K, T, W, OUT>
where
    K: Send,
    T: Clone + Send,
    OUT: Send,
{
    fn emit(
        &mut self,
        key: &K,
        window: &W,
        contents: &mut WindowState<T>,
        ctx: &EvictorContext,
        output: &mut Vec<OUT>,
    ) -> Result<()> {
        let WindowState::Buffer(buffer) = contents else {
            bail!("evicting window operator cannot evaluate accumulator state");
        };

        if let Some(evictor) = &self.evictor {
            evictor.evict_before(&mut EvictableElements::new(buffer), window, ctx);
        }

        let elements: Vec<T> = buffer.iter().map(|e| e.value.clone()).collect();
        match &mut self.aggregation {
            WindowAggregation::Reduce { reducer, finisher } => {
                let mut folded: Option<T> = None;
                for element in elements {
                    folded = Some(match folded {
                        Some(acc) => reducer.reduce(acc, element)?,
                        None => element,
                    });
                }
                let folded: Vec<T> = folded.into_iter().collect();
                finisher.apply(key, window, &folded, output)?;
            }
            WindowAggregation::Apply { function } => function.apply(key, window, &elements, output)?,
        }

        if let Some(evictor) = &self.evictor {
            evictor.evict_after(&mut EvictableElements::new(buffer), window, ctx);
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        self.aggregation.open()
    }

    fn close(&mut self) -> Result<()> {
        self.aggregation.close()
    }
}

// ── EvictingWindowOperator ────────────────────────────────────────────────────

/// Window operator over buffered state.
///
/// Keeps every element of a window. On each firing the evictor (if any) trims
/// the buffer, the aggregation runs over what is left in arrival order, the
/// evictor may trim again, and the buffer is kept unless the trigger purges.
/// Used whenever an evictor is configured or the aggregation needs the whole window.
pub struct EvictingWindowOperator<K, T, W, OUT> {
    driver: WindowDriver<K, T, W, OUT, EvictingEmitter<K, T, W, OUT>>,
}

impl<K, T, W, OUT> EvictingWindowOperator<K, T, W, OUT>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    pub(crate) fn new(
        parts: DriverParts<K, T, W>,
        evictor: Option<Arc<dyn Evictor<T, W>>>,
        aggregation: WindowAggregation<K, W, T, OUT>,
    ) -> Self {
        Self {
            driver: WindowDriver::new(
                parts,
                EvictingEmitter {
                    evictor,
                    aggregation,
                },
            ),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        self.driver.open()
    }

    pub fn process(&mut self, element: StreamElement<T>) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.process(element)
    }

    pub fn on_processing_time(&mut self, now: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.on_processing_time(now)
    }

    pub fn close_key(&mut self, key: &K) -> Result<Vec<StreamElement<OUT>>> {
        self.driver.close_key(key)
    }

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

    /// Name of the configured evictor, if any.
    pub fn evictor_name(&self) -> Option<&'static str> {
        self.driver.emitter().evictor_name()
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

    pub fn late_elements_dropped(&self) -> u64 {
        self.driver.late_elements_dropped()
    }
}
