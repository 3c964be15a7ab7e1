use super::*;

/// Identifier of a bounded grouping of elements that share a key.
///
/// Windows are compared, ordered and hashed by value; two elements of the same
/// key land in the same window instance iff their assigned windows compare equal.
pub trait Window:
    Clone + Eq + Ord + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The largest timestamp that still belongs to this window.
    fn max_timestamp(&self) -> EventTime;
}

/// A half-open time window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Return true if the two windows overlap or touch.
    ///
    /// Touching windows count as intersecting so that sessions separated by exactly
    /// the gap are merged.
    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// The smallest window that covers both `self` and `other`.
    pub fn cover(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl Window for TimeWindow {
    fn max_timestamp(&self) -> EventTime {
        self.end.saturating_sub(1)
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// A buffered element together with the timestamp it was assigned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue<T> {
    pub value: T,
    pub timestamp: EventTime,
}

impl<T> TimestampedValue<T> {
    pub fn new(value: T, timestamp: EventTime) -> Self {
        Self { value, timestamp }
    }
}
