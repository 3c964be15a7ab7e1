use super::*;

// ── ReduceFunction ────────────────────────────────────────────────────────────

/// Combines two values of the same type into one.
///
/// Used to fold each new element into a window's accumulator, in arrival order.
/// Associativity or commutativity is not required.
pub trait ReduceFunction<T>: Send + Sync {
    /// - `value1`: the accumulated value
    /// - `value2`: the incoming value
    fn reduce(&self, value1: T, value2: T) -> Result<T>;
}

impl<T, F> ReduceFunction<T> for F
where
    F: Fn(T, T) -> T + Send + Sync,
{
    fn reduce(&self, value1: T, value2: T) -> Result<T> {
        Ok(self(value1, value2))
    }
}

/// Whether a reduce function needs per-invocation setup and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionLifecycle {
    /// A pure function of its two arguments.
    Stateless,
    /// Needs `open`/`close` hooks and runtime context around every call.
    WithHooks,
}

/// A reduce function tagged with its lifecycle requirements.
///
/// Only [`FunctionLifecycle::Stateless`] reducers can fold window state
/// incrementally; pipelines built from a reducer created with
/// [`Reducer::rich`] are rejected at construction.
pub struct Reducer<T> {
    function: Arc<dyn ReduceFunction<T>>,
    lifecycle: FunctionLifecycle,
}

impl<T> Clone for Reducer<T> {
    fn clone(&self) -> Self {
        Self {
            function: Arc::clone(&self.function),
            lifecycle: self.lifecycle,
        }
    }
}

impl<T: 'static> Reducer<T> {
    pub fn new(function: impl ReduceFunction<T> + 'static) -> Self {
        Self {
            function: Arc::new(function),
            lifecycle: FunctionLifecycle::Stateless,
        }
    }

    /// Tag a reduce function as requiring lifecycle hooks.
    pub fn rich(function: impl ReduceFunction<T> + 'static) -> Self {
        Self {
            function: Arc::new(function),
            lifecycle: FunctionLifecycle::WithHooks,
        }
    }
}

impl<T> Reducer<T> {
    pub fn lifecycle(&self) -> FunctionLifecycle {
        self.lifecycle
    }

    pub fn function(&self) -> Arc<dyn ReduceFunction<T>> {
        Arc::clone(&self.function)
    }

    pub fn reduce(&self, value1: T, value2: T) -> Result<T> {
        self.function.reduce(value1, value2)
    }
}

// ── WindowFunction ────────────────────────────────────────────────────────────

/// Evaluates a window when it fires.
///
/// Used either as the whole-window function over every buffered element, or as
/// the finisher of a reduce over a single accumulated value.
pub trait WindowFunction<K, W, IN, OUT>: Send {
    /// Called once before the operator processes anything.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// - `key`: the group key
    /// - `window`: the window that fired
    /// - `elements`: the window contents, in arrival order
    /// - `output`: push computed results here
    fn apply(&mut self, key: &K, window: &W, elements: &[IN], output: &mut Vec<OUT>) -> Result<()>;

    /// Called once when the operator is closed.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<K, W, IN, OUT, F> WindowFunction<K, W, IN, OUT> for F
where
    F: FnMut(&K, &W, &[IN], &mut Vec<OUT>) + Send,
{
    fn apply(&mut self, key: &K, window: &W, elements: &[IN], output: &mut Vec<OUT>) -> Result<()> {
        self(key, window, elements, output);
        Ok(())
    }
}

/// Emits every element it is given, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughWindowFunction;

impl<K, W, T: Clone> WindowFunction<K, W, T, T> for PassThroughWindowFunction {
    fn apply(&mut self, _key: &K, _window: &W, elements: &[T], output: &mut Vec<T>) -> Result<()> {
        output.extend_from_slice(elements);
        Ok(())
    }
}

// ── WindowAggregation ─────────────────────────────────────────────────────────

/// Capability of an aggregation, as far as state representation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationShape {
    /// Two partial values fold into one.
    PairwiseIncremental,
    /// Needs every element of the window at once.
    WholeWindow,
}

/// The aggregation a window pipeline runs.
pub enum WindowAggregation<K, W, T, OUT> {
    /// Fold elements with `reducer`; `finisher` turns the folded value into output.
    Reduce {
        reducer: Reducer<T>,
        finisher: Box<dyn WindowFunction<K, W, T, OUT>>,
    },
    /// Run `function` over the buffered window contents.
    Apply {
        function: Box<dyn WindowFunction<K, W, T, OUT>>,
    },
}

impl<K, W, T> WindowAggregation<K, W, T, T>
where
    K: 'static,
    W: 'static,
    T: Clone + Send + 'static,
{
    /// Reduce and emit the folded value.
    pub fn reduce(reducer: Reducer<T>) -> Self {
        Self::Reduce {
            reducer,
            finisher: Box::new(PassThroughWindowFunction),
        }
    }
}

impl<K, W, T, OUT> WindowAggregation<K, W, T, OUT> {
    /// Reduce, then hand the folded value to `finisher`.
    pub fn reduce_with(reducer: Reducer<T>, finisher: impl WindowFunction<K, W, T, OUT> + 'static) -> Self {
        Self::Reduce {
            reducer,
            finisher: Box::new(finisher),
        }
    }

    pub fn apply(function: impl WindowFunction<K, W, T, OUT> + 'static) -> Self {
        Self::Apply {
            function: Box::new(function),
        }
    }

    pub fn shape(&self) -> AggregationShape {
        match self {
            Self::Reduce { .. } => AggregationShape::PairwiseIncremental,
            Self::Apply { .. } => AggregationShape::WholeWindow,
        }
    }

    /// The reducer, if this is a reduce aggregation.
    pub fn reducer(&self) -> Option<&Reducer<T>> {
        match self {
            Self::Reduce { reducer, .. } => Some(reducer),
            Self::Apply { .. } => None,
        }
    }

    pub(crate) fn open(&mut self) -> Result<()> {
        match self {
            Self::Reduce { finisher, .. } => finisher.open(),
            Self::Apply { function } => function.open(),
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        match self {
            Self::Reduce { finisher, .. } => finisher.close(),
            Self::Apply { function } => function.close(),
        }
    }
}
