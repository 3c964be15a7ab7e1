//! Construction-time policy: state representation, operator variant and trigger.

use super::*;

/// How per-window contents are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateRepresentation {
    /// One folded value per window.
    Accumulator,
    /// Every element of the window, in arrival order.
    Buffer,
}

/// Which window operator runs a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorVariant {
    /// [`WindowOperator`]: accumulator state, no eviction.
    Plain,
    /// [`EvictingWindowOperator`]: buffered state, optional eviction.
    Evicting,
}

impl From<StateRepresentation> for OperatorVariant {
    fn from(representation: StateRepresentation) -> Self {
        match representation {
            StateRepresentation::Accumulator => OperatorVariant::Plain,
            StateRepresentation::Buffer => OperatorVariant::Evicting,
        }
    }
}

/// Pick the state representation for a pipeline.
///
/// An evictor always forces a buffer. Without one, pairwise-incremental
/// aggregations fold into an accumulator and everything else is buffered.
pub fn select_representation(shape: AggregationShape, has_evictor: bool) -> StateRepresentation {
    match (shape, has_evictor) {
        (_, true) => StateRepresentation::Buffer,
        (AggregationShape::PairwiseIncremental, false) => StateRepresentation::Accumulator,
        (AggregationShape::WholeWindow, false) => StateRepresentation::Buffer,
    }
}

/// The trigger in force: the explicit override if there is one, otherwise the
/// default for `domain`.
pub fn resolve_trigger<T, W: Window>(
    domain: TimeDomain,
    override_trigger: Option<Arc<dyn Trigger<T, W>>>,
) -> Arc<dyn Trigger<T, W>> {
    match override_trigger {
        Some(trigger) => trigger,
        None => default_trigger(domain),
    }
}

pub fn default_trigger<T, W: Window>(domain: TimeDomain) -> Arc<dyn Trigger<T, W>> {
    match domain {
        TimeDomain::EventTime => Arc::new(EventTimeTrigger),
        TimeDomain::ProcessingTime => Arc::new(ProcessingTimeTrigger),
    }
}

/// Reject a reduce aggregation whose function needs lifecycle hooks.
///
/// Such a function would be called repeatedly and incrementally, never once per
/// firing with full context.
pub fn check_incremental_reducer<T>(reducer: &Reducer<T>) -> Result<()> {
    if reducer.lifecycle() == FunctionLifecycle::WithHooks {
        return Err(WindowError::configuration(
            "reduce() does not support functions with lifecycle hooks; use apply() with a window function instead",
        )
        .into());
    }
    Ok(())
}
