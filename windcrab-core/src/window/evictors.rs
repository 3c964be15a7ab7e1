use super::*;

/// Why a window is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReason {
    Element,
    EventTime,
    ProcessingTime,
    EndOfStream,
}

/// What an evictor can observe about the firing it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictorContext {
    pub reason: FireReason,
    pub current_watermark: EventTime,
    pub current_processing_time: EventTime,
}

/// Mutable view over a window buffer that only allows order-preserving removal.
pub struct EvictableElements<'a, T> {
    elements: &'a mut Vec<TimestampedValue<T>>,
}

impl<'a, T> EvictableElements<'a, T> {
    pub fn new(elements: &'a mut Vec<TimestampedValue<T>>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimestampedValue<T>> {
        self.elements.iter()
    }

    pub fn last(&self) -> Option<&TimestampedValue<T>> {
        self.elements.last()
    }

    /// Largest timestamp among the buffered elements.
    pub fn max_timestamp(&self) -> Option<EventTime> {
        self.elements.iter().map(|e| e.timestamp).max()
    }

    /// Keep only the elements for which `keep` returns true. Returns how many were evicted.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&TimestampedValue<T>) -> bool,
    {
        let before = self.elements.len();
        self.elements.retain(keep);
        before - self.elements.len()
    }

    /// Evict the `n` oldest elements. Returns how many were evicted.
    pub fn evict_first(&mut self, n: usize) -> usize {
        let n = n.min(self.elements.len());
        self.elements.drain(..n);
        n
    }
}

/// Removes elements from a window buffer around a firing.
///
/// Evictors only ever remove; the relative order of what remains is preserved.
pub trait Evictor<T, W>: Send + Sync {
    /// Called before the window function runs.
    fn evict_before(&self, elements: &mut EvictableElements<'_, T>, window: &W, ctx: &EvictorContext);

    /// Called after the window function ran, before the buffer is kept.
    fn evict_after(&self, _elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {}

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ── CountEvictor ──────────────────────────────────────────────────────────────

/// Keeps at most `max_count` of the most recent elements.
#[derive(Debug, Clone, Copy)]
pub struct CountEvictor {
    max_count: usize,
    evict_after: bool,
}

impl CountEvictor {
    /// Evict before the window function runs.
    pub fn of(max_count: usize) -> Self {
        Self {
            max_count,
            evict_after: false,
        }
    }

    /// Evict after the window function ran.
    pub fn of_after(max_count: usize) -> Self {
        Self {
            max_count,
            evict_after: true,
        }
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    fn evict<T>(&self, elements: &mut EvictableElements<'_, T>) {
        if elements.len() > self.max_count {
            elements.evict_first(elements.len() - self.max_count);
        }
    }
}

impl<T, W> Evictor<T, W> for CountEvictor {
    fn evict_before(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if !self.evict_after {
            self.evict(elements);
        }
    }

    fn evict_after(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if self.evict_after {
            self.evict(elements);
        }
    }

    fn name(&self) -> &'static str {
        "CountEvictor"
    }
}

// ── TimeEvictor ───────────────────────────────────────────────────────────────

/// Keeps elements whose timestamp is within `window_size` of the newest element.
#[derive(Debug, Clone, Copy)]
pub struct TimeEvictor {
    window_size_ms: i64,
    evict_after: bool,
}

impl TimeEvictor {
    pub fn of(window_size: Duration) -> Self {
        Self {
            window_size_ms: i64::try_from(window_size.as_millis()).unwrap_or(i64::MAX),
            evict_after: false,
        }
    }

    pub fn of_after(window_size: Duration) -> Self {
        Self {
            evict_after: true,
            ..Self::of(window_size)
        }
    }

    fn evict<T>(&self, elements: &mut EvictableElements<'_, T>) {
        let Some(newest) = elements.max_timestamp() else {
            return;
        };
        let cutoff = newest.saturating_sub(self.window_size_ms);
        elements.retain(|e| e.timestamp > cutoff);
    }
}

impl<T, W> Evictor<T, W> for TimeEvictor {
    fn evict_before(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if !self.evict_after {
            self.evict(elements);
        }
    }

    fn evict_after(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if self.evict_after {
            self.evict(elements);
        }
    }

    fn name(&self) -> &'static str {
        "TimeEvictor"
    }
}

// ── DeltaEvictor ──────────────────────────────────────────────────────────────

/// Evicts elements whose delta to the last buffered element is at least `threshold`.
pub struct DeltaEvictor<F> {
    threshold: f64,
    delta_fn: F,
    evict_after: bool,
}

impl<F> DeltaEvictor<F> {
    pub fn of(threshold: f64, delta_fn: F) -> Self {
        Self {
            threshold,
            delta_fn,
            evict_after: false,
        }
    }

    pub fn of_after(threshold: f64, delta_fn: F) -> Self {
        Self {
            threshold,
            delta_fn,
            evict_after: true,
        }
    }
}

impl<F> DeltaEvictor<F> {
    fn evict<T>(&self, elements: &mut EvictableElements<'_, T>)
    where
        T: Clone,
        F: Fn(&T, &T) -> f64,
    {
        let Some(last) = elements.last().map(|e| e.value.clone()) else {
            return;
        };
        elements.retain(|e| (self.delta_fn)(&e.value, &last) < self.threshold);
    }
}

impl<T, W, F> Evictor<T, W> for DeltaEvictor<F>
where
    T: Clone,
    F: Fn(&T, &T) -> f64 + Send + Sync,
{
    fn evict_before(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if !self.evict_after {
            self.evict(elements);
        }
    }

    fn evict_after(&self, elements: &mut EvictableElements<'_, T>, _window: &W, _ctx: &EvictorContext) {
        if self.evict_after {
            self.evict(elements);
        }
    }

    fn name(&self) -> &'static str {
        "DeltaEvictor"
    }
}
