use super::*;

/// Earliest representable event time; the watermark of an operator that has seen none.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Latest representable event time.
pub const EVENT_TIME_MAX: EventTime = i64::MAX;

/// How a bounded source stamps its records and derives watermarks from them.
pub trait WatermarkStrategy<T>: Send + Sync {
    /// Event time of `element`, in milliseconds.
    fn extract_timestamp(&self, element: &T) -> EventTime;

    /// A generator with no history, one per stream the strategy is applied to.
    fn create_watermark_generator(&self) -> Box<dyn WatermarkGenerator>;
}

/// Tracks observed timestamps and reports watermark progress.
pub trait WatermarkGenerator: Send {
    /// Observe one timestamp. Returns a watermark only when it moves past the
    /// last one returned, so emitted watermarks strictly increase.
    fn on_event(&mut self, timestamp: EventTime) -> Option<Watermark>;

    /// The watermark implied by everything observed so far, `None` before the
    /// first event.
    fn current_watermark(&self) -> Option<Watermark>;
}

/// Watermarks trail the highest timestamp seen by a fixed delay.
///
/// Records up to `max_delay` older than the newest one are still on time.
///
/// ```
/// use std::time::Duration;
/// use windcrab_core::time::BoundedOutOfOrderness;
///
/// let strategy = BoundedOutOfOrderness::new(Duration::from_secs(5), |ts: &i64| *ts);
/// ```
pub struct BoundedOutOfOrderness<T, F> {
    max_delay_ms: EventTime,
    timestamp_extractor: F,
    _element: std::marker::PhantomData<fn(&T)>,
}

impl<T, F: Fn(&T) -> EventTime + Send + Sync> BoundedOutOfOrderness<T, F> {
    pub fn new(max_delay: Duration, timestamp_extractor: F) -> Self {
        Self {
            max_delay_ms: max_delay.as_millis().min(EventTime::MAX as u128) as EventTime,
            timestamp_extractor,
            _element: std::marker::PhantomData,
        }
    }
}

impl<T, F> WatermarkStrategy<T> for BoundedOutOfOrderness<T, F>
where
    F: Fn(&T) -> EventTime + Send + Sync,
{
    fn extract_timestamp(&self, element: &T) -> EventTime {
        (self.timestamp_extractor)(element)
    }

    fn create_watermark_generator(&self) -> Box<dyn WatermarkGenerator> {
        Box::new(TrailingMaxGenerator::new(self.max_delay_ms))
    }
}

/// For sources whose timestamps never decrease: the watermark is the latest
/// timestamp itself.
pub struct MonotonousTimestamps<T, F> {
    timestamp_extractor: F,
    _element: std::marker::PhantomData<fn(&T)>,
}

impl<T, F: Fn(&T) -> EventTime + Send + Sync> MonotonousTimestamps<T, F> {
    pub fn new(timestamp_extractor: F) -> Self {
        Self {
            timestamp_extractor,
            _element: std::marker::PhantomData,
        }
    }
}

impl<T, F> WatermarkStrategy<T> for MonotonousTimestamps<T, F>
where
    F: Fn(&T) -> EventTime + Send + Sync,
{
    fn extract_timestamp(&self, element: &T) -> EventTime {
        (self.timestamp_extractor)(element)
    }

    fn create_watermark_generator(&self) -> Box<dyn WatermarkGenerator> {
        Box::new(TrailingMaxGenerator::new(0))
    }
}

/// `max_seen - delay`, reported when it advances.
struct TrailingMaxGenerator {
    delay_ms: EventTime,
    max_seen: Option<EventTime>,
    last_emitted: Option<EventTime>,
}

impl TrailingMaxGenerator {
    fn new(delay_ms: EventTime) -> Self {
        Self {
            delay_ms,
            max_seen: None,
            last_emitted: None,
        }
    }
}

impl WatermarkGenerator for TrailingMaxGenerator {
    fn on_event(&mut self, timestamp: EventTime) -> Option<Watermark> {
        self.max_seen = Some(self.max_seen.map_or(timestamp, |max| max.max(timestamp)));
        let watermark = self.current_watermark()?;
        if self.last_emitted.is_some_and(|last| watermark.timestamp <= last) {
            return None;
        }
        self.last_emitted = Some(watermark.timestamp);
        Some(watermark)
    }

    fn current_watermark(&self) -> Option<Watermark> {
        self.max_seen
            .map(|max| Watermark::new(max.saturating_sub(self.delay_ms)))
    }
}
