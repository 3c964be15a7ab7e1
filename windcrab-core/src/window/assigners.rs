use super::*;

/// Information the runtime exposes to an assigner while it assigns an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignerContext {
    pub current_processing_time: EventTime,
    pub current_watermark: EventTime,
}

/// Maps each element to the windows it belongs to.
///
/// Assignment must be deterministic for a given `(element, timestamp, ctx)`.
/// The time domain is declared per pipeline through [`time_domain`](Self::time_domain);
/// the operator uses it to pick the default trigger and to decide which clock
/// completes windows.
pub trait WindowAssigner<T>: Send + Sync {
    type Window: Window;

    /// Return the windows that contain the element with the given timestamp.
    fn assign_windows(
        &self,
        element: &T,
        timestamp: EventTime,
        ctx: &AssignerContext,
    ) -> Vec<Self::Window>;

    /// The time domain this assigner operates in under `characteristic`.
    fn time_domain(&self, characteristic: TimeCharacteristic) -> TimeDomain;

    /// Whether windows produced by this assigner must be merged when they overlap.
    fn is_merging(&self) -> bool {
        false
    }

    /// Group overlapping windows.
    ///
    /// Returns `(merged, sources)` for every group of two or more windows that
    /// collapse into `merged`. Windows that merge with nothing are not reported.
    fn merge_windows(&self, _windows: &[Self::Window]) -> Vec<(Self::Window, Vec<Self::Window>)> {
        Vec::new()
    }

    /// Check the assigner's parameters.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn domain_for(fixed: Option<TimeDomain>, characteristic: TimeCharacteristic) -> TimeDomain {
    fixed.unwrap_or_else(|| characteristic.time_domain())
}

// ── Tumbling ──────────────────────────────────────────────────────────────────

/// Fixed-size, non-overlapping windows aligned to multiples of `size` (plus `offset`).
#[derive(Debug, Clone)]
pub struct TumblingWindows {
    size_ms: i64,
    offset_ms: i64,
    domain: Option<TimeDomain>,
}

impl TumblingWindows {
    /// Tumbling windows whose domain follows the pipeline's time characteristic.
    pub fn of(size: Duration) -> Self {
        Self {
            size_ms: duration_ms(size),
            offset_ms: 0,
            domain: None,
        }
    }

    /// Tumbling windows completed by watermarks.
    pub fn event_time(size: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::EventTime),
            ..Self::of(size)
        }
    }

    /// Tumbling windows completed by the wall clock.
    pub fn processing_time(size: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::ProcessingTime),
            ..Self::of(size)
        }
    }

    /// Shift window alignment by `offset`.
    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset_ms = duration_ms(offset);
        self
    }

    pub fn size_ms(&self) -> i64 {
        self.size_ms
    }
}

impl<T: Send + Sync> WindowAssigner<T> for TumblingWindows {
    type Window = TimeWindow;

    fn assign_windows(&self, _element: &T, timestamp: EventTime, _ctx: &AssignerContext) -> Vec<TimeWindow> {
        let start = window_start(timestamp, self.offset_ms, self.size_ms);
        vec![TimeWindow::new(start, start.saturating_add(self.size_ms))]
    }

    fn time_domain(&self, characteristic: TimeCharacteristic) -> TimeDomain {
        domain_for(self.domain, characteristic)
    }

    fn validate(&self) -> Result<()> {
        if self.size_ms <= 0 {
            bail!("tumbling window size must be positive, got {}ms", self.size_ms);
        }
        if self.offset_ms >= self.size_ms {
            bail!(
                "tumbling window offset {}ms must be smaller than the size {}ms",
                self.offset_ms,
                self.size_ms
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TumblingWindows"
    }
}

/// Start of the window of length `size` that contains `timestamp`.
fn window_start(timestamp: EventTime, offset: i64, size: i64) -> EventTime {
    let remainder = (i128::from(timestamp) - i128::from(offset)).rem_euclid(i128::from(size));
    // `remainder < size`, so it fits back into an i64.
    timestamp.saturating_sub(remainder as i64)
}

// ── Sliding ───────────────────────────────────────────────────────────────────

/// Fixed-size windows that start every `slide`; an element belongs to
/// `ceil(size / slide)` windows.
#[derive(Debug, Clone)]
pub struct SlidingWindows {
    size_ms: i64,
    slide_ms: i64,
    offset_ms: i64,
    domain: Option<TimeDomain>,
}

impl SlidingWindows {
    pub fn of(size: Duration, slide: Duration) -> Self {
        Self {
            size_ms: duration_ms(size),
            slide_ms: duration_ms(slide),
            offset_ms: 0,
            domain: None,
        }
    }

    pub fn event_time(size: Duration, slide: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::EventTime),
            ..Self::of(size, slide)
        }
    }

    pub fn processing_time(size: Duration, slide: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::ProcessingTime),
            ..Self::of(size, slide)
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset_ms = duration_ms(offset);
        self
    }
}

impl<T: Send + Sync> WindowAssigner<T> for SlidingWindows {
    type Window = TimeWindow;

    fn assign_windows(&self, _element: &T, timestamp: EventTime, _ctx: &AssignerContext) -> Vec<TimeWindow> {
        // Walk back from the latest window start until no window covers `timestamp`.
        let last_start = window_start(timestamp, self.offset_ms, self.slide_ms);
        let mut windows = Vec::new();
        let lower = timestamp.saturating_sub(self.size_ms);
        let mut start = last_start;
        while start > lower {
            windows.push(TimeWindow::new(start, start.saturating_add(self.size_ms)));
            match start.checked_sub(self.slide_ms) {
                Some(previous) => start = previous,
                None => break,
            }
        }
        windows
    }

    fn time_domain(&self, characteristic: TimeCharacteristic) -> TimeDomain {
        domain_for(self.domain, characteristic)
    }

    fn validate(&self) -> Result<()> {
        if self.size_ms <= 0 || self.slide_ms <= 0 {
            bail!(
                "sliding window size and slide must be positive, got size {}ms slide {}ms",
                self.size_ms,
                self.slide_ms
            );
        }
        if self.offset_ms >= self.slide_ms {
            bail!(
                "sliding window offset {}ms must be smaller than the slide {}ms",
                self.offset_ms,
                self.slide_ms
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SlidingWindows"
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Gap-based windows. Each element starts as `[timestamp, timestamp + gap)` and the
/// operator merges overlapping sessions of the same key as elements arrive.
#[derive(Debug, Clone)]
pub struct SessionWindows {
    gap_ms: i64,
    domain: Option<TimeDomain>,
}

impl SessionWindows {
    pub fn with_gap(gap: Duration) -> Self {
        Self {
            gap_ms: duration_ms(gap),
            domain: None,
        }
    }

    pub fn event_time(gap: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::EventTime),
            ..Self::with_gap(gap)
        }
    }

    pub fn processing_time(gap: Duration) -> Self {
        Self {
            domain: Some(TimeDomain::ProcessingTime),
            ..Self::with_gap(gap)
        }
    }
}

impl<T: Send + Sync> WindowAssigner<T> for SessionWindows {
    type Window = TimeWindow;

    fn assign_windows(&self, _element: &T, timestamp: EventTime, _ctx: &AssignerContext) -> Vec<TimeWindow> {
        vec![TimeWindow::new(timestamp, timestamp.saturating_add(self.gap_ms))]
    }

    fn time_domain(&self, characteristic: TimeCharacteristic) -> TimeDomain {
        domain_for(self.domain, characteristic)
    }

    fn is_merging(&self) -> bool {
        true
    }

    fn merge_windows(&self, windows: &[TimeWindow]) -> Vec<(TimeWindow, Vec<TimeWindow>)> {
        let mut sorted = windows.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut groups: Vec<(TimeWindow, Vec<TimeWindow>)> = Vec::new();
        for window in sorted {
            match groups.last_mut() {
                Some((cover, members)) if cover.intersects(&window) => {
                    *cover = cover.cover(&window);
                    members.push(window);
                }
                _ => groups.push((window.clone(), vec![window])),
            }
        }
        groups.retain(|(_, members)| members.len() > 1);
        groups
    }

    fn validate(&self) -> Result<()> {
        if self.gap_ms <= 0 {
            bail!("session gap must be positive, got {}ms", self.gap_ms);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SessionWindows"
    }
}

// ── Global ────────────────────────────────────────────────────────────────────

/// A single window spanning all time. Needs a trigger that fires on something
/// other than time (for instance [`CountTrigger`]) or relies on end of stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalWindows;

impl GlobalWindows {
    pub fn create() -> Self {
        Self
    }

    pub fn window() -> TimeWindow {
        TimeWindow::new(EVENT_TIME_MIN, EVENT_TIME_MAX)
    }
}

impl<T: Send + Sync> WindowAssigner<T> for GlobalWindows {
    type Window = TimeWindow;

    fn assign_windows(&self, _element: &T, _timestamp: EventTime, _ctx: &AssignerContext) -> Vec<TimeWindow> {
        vec![Self::window()]
    }

    fn time_domain(&self, characteristic: TimeCharacteristic) -> TimeDomain {
        characteristic.time_domain()
    }

    fn name(&self) -> &'static str {
        "GlobalWindows"
    }
}
