use super::*;

use crate::error::WindowError;

/// A timer registered on behalf of one (key, window).
///
/// `namespace` is the serialized `(key_bytes, window)` pair; the window operator
/// decodes it when the timer fires to restore the trigger context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timer {
    pub namespace: Vec<u8>,
    pub time: EventTime,
    pub domain: TimeDomain,
}

/// Timer registry used by window operators.
///
/// # Invariant
/// A `(namespace, time, domain)` triple is registered at most once; re-registering
/// the same triple is idempotent. A drained timer is gone, so each timer fires at
/// most once, and exactly once unless it was cancelled first.
pub trait TimerService: Send {
    /// Register a timer. Fails if the service cannot hold it.
    fn register(&mut self, namespace: Vec<u8>, time: EventTime, domain: TimeDomain) -> Result<()>;

    /// Cancel a timer. No-op if it was never registered or already fired.
    fn cancel(&mut self, namespace: &[u8], time: EventTime, domain: TimeDomain) -> Result<()>;

    /// Remove and return the earliest timer of `domain` with `time <= up_to`.
    /// Timers with equal time come out in namespace order.
    fn pop_due(&mut self, domain: TimeDomain, up_to: EventTime) -> Option<Timer>;

    /// Remove and return all timers of `domain` with `time <= up_to`, ascending by time.
    fn drain_due(&mut self, domain: TimeDomain, up_to: EventTime) -> Vec<Timer> {
        std::iter::from_fn(|| self.pop_due(domain, up_to)).collect()
    }

    /// Timestamp of the earliest pending timer in `domain`.
    fn next_timer(&self, domain: TimeDomain) -> Option<EventTime>;

    /// Total number of pending timers across both domains.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory timer service backed by one `BTreeMap` per time domain.
///
/// Timers are sorted by fire time, so draining due timers is a range scan.
/// An optional capacity bounds the number of pending timers; registrations
/// beyond it are refused with [`WindowError::TimerService`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTimerService {
    event_time: BTreeMap<EventTime, BTreeSet<Vec<u8>>>,
    processing_time: BTreeMap<EventTime, BTreeSet<Vec<u8>>>,
    capacity: Option<usize>,
    pending: usize,
}

impl InMemoryTimerService {
    /// Create an unbounded timer service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a timer service that refuses registrations beyond `capacity` pending timers.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    fn timers(&self, domain: TimeDomain) -> &BTreeMap<EventTime, BTreeSet<Vec<u8>>> {
        match domain {
            TimeDomain::EventTime => &self.event_time,
            TimeDomain::ProcessingTime => &self.processing_time,
        }
    }

    fn timers_mut(&mut self, domain: TimeDomain) -> &mut BTreeMap<EventTime, BTreeSet<Vec<u8>>> {
        match domain {
            TimeDomain::EventTime => &mut self.event_time,
            TimeDomain::ProcessingTime => &mut self.processing_time,
        }
    }

    fn contains(&self, namespace: &[u8], time: EventTime, domain: TimeDomain) -> bool {
        self.timers(domain)
            .get(&time)
            .is_some_and(|namespaces| namespaces.contains(namespace))
    }
}

impl TimerService for InMemoryTimerService {
    fn register(&mut self, namespace: Vec<u8>, time: EventTime, domain: TimeDomain) -> Result<()> {
        if self.contains(&namespace, time, domain) {
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            if self.pending >= capacity {
                return Err(WindowError::TimerService {
                    operation: "registration",
                    time,
                    domain,
                    reason: format!("capacity of {capacity} pending timers exhausted"),
                }
                .into());
            }
        }
        self.timers_mut(domain)
            .entry(time)
            .or_default()
            .insert(namespace);
        self.pending += 1;
        Ok(())
    }

    fn cancel(&mut self, namespace: &[u8], time: EventTime, domain: TimeDomain) -> Result<()> {
        let timers = self.timers_mut(domain);
        let mut removed = false;
        if let Some(namespaces) = timers.get_mut(&time) {
            removed = namespaces.remove(namespace);
            if namespaces.is_empty() {
                timers.remove(&time);
            }
        }
        if removed {
            self.pending -= 1;
        }
        Ok(())
    }

    fn pop_due(&mut self, domain: TimeDomain, up_to: EventTime) -> Option<Timer> {
        let timers = self.timers_mut(domain);
        let mut earliest = timers.first_entry()?;
        let time = *earliest.key();
        if time > up_to {
            return None;
        }
        let namespace = earliest.get_mut().pop_first()?;
        if earliest.get().is_empty() {
            earliest.remove();
        }
        self.pending -= 1;
        Some(Timer {
            namespace,
            time,
            domain,
        })
    }

    fn next_timer(&self, domain: TimeDomain) -> Option<EventTime> {
        self.timers(domain).keys().next().copied()
    }

    fn len(&self) -> usize {
        self.pending
    }
}
