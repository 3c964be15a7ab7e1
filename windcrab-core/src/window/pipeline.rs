use super::driver::DriverParts;
use super::*;

/// Extracts the partitioning key from an element.
pub type KeySelector<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Everything needed to construct a window operator.
///
/// Immutable once [`build`](Self::build) runs: the state representation, the
/// operator variant and the trigger are decided there and never change.
pub struct WindowPipeline<K, T, W, OUT> {
    assigner: Arc<dyn WindowAssigner<T, Window = W>>,
    key_selector: KeySelector<T, K>,
    aggregation: WindowAggregation<K, W, T, OUT>,
    trigger: Option<Arc<dyn Trigger<T, W>>>,
    evictor: Option<Arc<dyn Evictor<T, W>>>,
    config: WindowConfig,
    clock: Arc<dyn ProcessingTimeClock>,
}

impl<K, T, W, OUT> WindowPipeline<K, T, W, OUT>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    pub fn new<A, F>(assigner: A, key_selector: F, aggregation: WindowAggregation<K, W, T, OUT>) -> Self
    where
        A: WindowAssigner<T, Window = W> + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self::from_shared(Arc::new(assigner), Arc::new(key_selector), aggregation)
    }

    /// Like [`new`](Self::new), for callers that already hold shared handles.
    pub fn from_shared(
        assigner: Arc<dyn WindowAssigner<T, Window = W>>,
        key_selector: KeySelector<T, K>,
        aggregation: WindowAggregation<K, W, T, OUT>,
    ) -> Self {
        Self {
            assigner,
            key_selector,
            aggregation,
            trigger: None,
            evictor: None,
            config: WindowConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the default trigger.
    pub fn trigger(self, trigger: impl Trigger<T, W> + 'static) -> Self {
        self.shared_trigger(Arc::new(trigger))
    }

    pub fn shared_trigger(mut self, trigger: Arc<dyn Trigger<T, W>>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Add an evictor. Forces buffered window state.
    pub fn evictor(self, evictor: impl Evictor<T, W> + 'static) -> Self {
        self.shared_evictor(Arc::new(evictor))
    }

    pub fn shared_evictor(mut self, evictor: Arc<dyn Evictor<T, W>>) -> Self {
        self.evictor = Some(evictor);
        self
    }

    pub fn config(mut self, config: WindowConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for processing and ingestion time.
    pub fn clock(self, clock: impl ProcessingTimeClock + 'static) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    pub fn shared_clock(mut self, clock: Arc<dyn ProcessingTimeClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn time_domain(&self) -> TimeDomain {
        self.assigner.time_domain(self.config.time_characteristic)
    }

    pub fn representation(&self) -> StateRepresentation {
        select_representation(self.aggregation.shape(), self.evictor.is_some())
    }

    /// Validate the configuration and construct the operator.
    ///
    /// Fails with [`WindowError::ConfigurationRejected`] before any element is
    /// processed if the combination is invalid.
    pub fn build(self) -> Result<AnyWindowOperator<K, T, W, OUT>> {
        if let Err(err) = self.assigner.validate() {
            return Err(WindowError::configuration(format!(
                "invalid {}: {err}",
                self.assigner.name()
            ))
            .into());
        }
        self.config.validate()?;
        if let Some(reducer) = self.aggregation.reducer() {
            check_incremental_reducer(reducer)?;
        }

        let domain = self.time_domain();
        let trigger = resolve_trigger(domain, self.trigger);
        if self.assigner.is_merging() && !trigger.can_merge() {
            return Err(WindowError::configuration(format!(
                "{} merges windows but trigger {} cannot merge",
                self.assigner.name(),
                trigger.name()
            ))
            .into());
        }

        let allowed_lateness_ms = match domain {
            TimeDomain::EventTime => self.config.allowed_lateness_ms,
            TimeDomain::ProcessingTime => {
                if self.config.allowed_lateness_ms > 0 {
                    warn!(
                        allowed_lateness_ms = self.config.allowed_lateness_ms,
                        "allowed lateness has no effect on processing-time windows"
                    );
                }
                0
            }
        };

        let representation = select_representation(self.aggregation.shape(), self.evictor.is_some());
        let variant = OperatorVariant::from(representation);
        let timer_service: Box<dyn TimerService> = match self.config.timer_capacity {
            Some(capacity) => Box::new(InMemoryTimerService::with_capacity_limit(capacity)),
            None => Box::new(InMemoryTimerService::new()),
        };

        debug!(
            assigner = self.assigner.name(),
            trigger = trigger.name(),
            evictor = self.evictor.as_ref().map(|e| e.name()),
            ?domain,
            ?representation,
            ?variant,
            "building window operator"
        );

        let store = match (representation, self.aggregation.reducer()) {
            (StateRepresentation::Accumulator, Some(reducer)) => {
                WindowStateStore::accumulating(reducer.clone(), timer_service)
            }
            (StateRepresentation::Accumulator, None) => {
                bail!("accumulator state requires a reduce aggregation")
            }
            (StateRepresentation::Buffer, _) => WindowStateStore::buffering(timer_service),
        };

        let parts = DriverParts {
            assigner: self.assigner,
            trigger,
            key_selector: self.key_selector,
            store,
            clock: self.clock,
            domain,
            allowed_lateness_ms,
            regression_policy: self.config.watermark_regression,
        };

        match (variant, self.aggregation) {
            (OperatorVariant::Plain, WindowAggregation::Reduce { finisher, .. }) => {
                Ok(AnyWindowOperator::Plain(WindowOperator::new(parts, finisher)))
            }
            (OperatorVariant::Plain, WindowAggregation::Apply { .. }) => {
                bail!("plain window operator requires a reduce aggregation")
            }
            (OperatorVariant::Evicting, aggregation) => Ok(AnyWindowOperator::Evicting(
                EvictingWindowOperator::new(parts, self.evictor, aggregation),
            )),
        }
    }
}

// ── AnyWindowOperator ─────────────────────────────────────────────────────────

/// The operator a pipeline was built into.
pub enum AnyWindowOperator<K, T, W, OUT> {
    Plain(WindowOperator<K, T, W, OUT>),
    Evicting(EvictingWindowOperator<K, T, W, OUT>),
}

impl<K, T, W, OUT> AnyWindowOperator<K, T, W, OUT>
where
    K: StreamData + Debug,
    T: StreamData,
    W: Window,
    OUT: StreamData,
{
    pub fn variant(&self) -> OperatorVariant {
        match self {
            Self::Plain(_) => OperatorVariant::Plain,
            Self::Evicting(_) => OperatorVariant::Evicting,
        }
    }

    pub fn representation(&self) -> StateRepresentation {
        self.state().representation()
    }

    pub fn trigger_name(&self) -> &'static str {
        match self {
            Self::Plain(op) => op.trigger_name(),
            Self::Evicting(op) => op.trigger_name(),
        }
    }

    pub fn assigner_name(&self) -> &'static str {
        match self {
            Self::Plain(op) => op.assigner_name(),
            Self::Evicting(op) => op.assigner_name(),
        }
    }

    pub fn evictor_name(&self) -> Option<&'static str> {
        match self {
            Self::Plain(_) => None,
            Self::Evicting(op) => op.evictor_name(),
        }
    }

    pub fn time_domain(&self) -> TimeDomain {
        match self {
            Self::Plain(op) => op.time_domain(),
            Self::Evicting(op) => op.time_domain(),
        }
    }

    pub fn state(&self) -> &WindowStateStore<K, T, W> {
        match self {
            Self::Plain(op) => op.state(),
            Self::Evicting(op) => op.state(),
        }
    }

    pub fn current_watermark(&self) -> EventTime {
        match self {
            Self::Plain(op) => op.current_watermark(),
            Self::Evicting(op) => op.current_watermark(),
        }
    }

    pub fn late_elements_dropped(&self) -> u64 {
        match self {
            Self::Plain(op) => op.late_elements_dropped(),
            Self::Evicting(op) => op.late_elements_dropped(),
        }
    }

    pub fn open(&mut self) -> Result<()> {
        match self {
            Self::Plain(op) => op.open(),
            Self::Evicting(op) => op.open(),
        }
    }

    pub fn process(&mut self, element: StreamElement<T>) -> Result<Vec<StreamElement<OUT>>> {
        match self {
            Self::Plain(op) => op.process(element),
            Self::Evicting(op) => op.process(element),
        }
    }

    pub fn on_processing_time(&mut self, now: EventTime) -> Result<Vec<StreamElement<OUT>>> {
        match self {
            Self::Plain(op) => op.on_processing_time(now),
            Self::Evicting(op) => op.on_processing_time(now),
        }
    }

    pub fn close_key(&mut self, key: &K) -> Result<Vec<StreamElement<OUT>>> {
        match self {
            Self::Plain(op) => op.close_key(key),
            Self::Evicting(op) => op.close_key(key),
        }
    }

    pub fn close(&mut self) -> Result<Vec<StreamElement<OUT>>> {
        match self {
            Self::Plain(op) => op.close(),
            Self::Evicting(op) => op.close(),
        }
    }

    pub fn take_pending_output(&mut self) -> Vec<StreamElement<OUT>> {
        match self {
            Self::Plain(op) => op.take_pending_output(),
            Self::Evicting(op) => op.take_pending_output(),
        }
    }
}
