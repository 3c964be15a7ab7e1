use super::*;

/// Named, serialized trigger-local values of one (key, window).
pub type TriggerState = BTreeMap<String, Vec<u8>>;

/// Contents of one (key, window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowState<T> {
    /// Elements folded in arrival order. `None` until the first element arrives.
    Accumulator(Option<T>),
    /// Raw elements in arrival order. Append-only; eviction removes without reordering.
    Buffer(Vec<TimestampedValue<T>>),
}

impl<T: Clone> WindowState<T> {
    fn empty(representation: StateRepresentation) -> Self {
        match representation {
            StateRepresentation::Accumulator => WindowState::Accumulator(None),
            StateRepresentation::Buffer => WindowState::Buffer(Vec::new()),
        }
    }

    /// Current elements in order, or the accumulated value as a single element.
    pub fn to_sequence(&self) -> Vec<T> {
        match self {
            WindowState::Accumulator(acc) => acc.iter().cloned().collect(),
            WindowState::Buffer(elements) => elements.iter().map(|e| e.value.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WindowState::Accumulator(acc) => usize::from(acc.is_some()),
            WindowState::Buffer(elements) => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything held for one (key, window): contents, trigger state and the timers
/// registered on its behalf.
#[derive(Debug, Clone)]
pub struct WindowEntry<T> {
    contents: WindowState<T>,
    trigger_state: TriggerState,
    timers: BTreeSet<(TimeDomain, EventTime)>,
    namespace: Vec<u8>,
}

impl<T> WindowEntry<T> {
    pub fn contents(&self) -> &WindowState<T> {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut WindowState<T> {
        &mut self.contents
    }

    pub fn trigger_state(&self) -> &TriggerState {
        &self.trigger_state
    }

    /// Timers currently registered for this window.
    pub fn timers(&self) -> &BTreeSet<(TimeDomain, EventTime)> {
        &self.timers
    }
}

#[derive(Debug)]
struct KeyWindows<K, T, W> {
    key: K,
    windows: BTreeMap<W, WindowEntry<T>>,
}

/// A timer that fired, decoded back to the (key, window) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer<W> {
    pub key_bytes: Vec<u8>,
    pub window: W,
    pub time: EventTime,
    pub domain: TimeDomain,
}

/// Per-key, per-window state owned by a window operator.
///
/// Keys are addressed by their bincode encoding. Every operation names one exact
/// key and window; only merging and key closing list the windows of a key.
/// The store owns the timer service so that purging a window also cancels every
/// timer registered for it.
pub struct WindowStateStore<K, T, W> {
    representation: StateRepresentation,
    reducer: Option<Reducer<T>>,
    keys: HashMap<Vec<u8>, KeyWindows<K, T, W>>,
    timer_service: Box<dyn TimerService>,
}

impl<K, T, W> WindowStateStore<K, T, W>
where
    K: Clone,
    T: Clone,
    W: Window,
{
    /// A store that folds elements into one value per window.
    pub fn accumulating(reducer: Reducer<T>, timer_service: Box<dyn TimerService>) -> Self {
        Self {
            representation: StateRepresentation::Accumulator,
            reducer: Some(reducer),
            keys: HashMap::new(),
            timer_service,
        }
    }

    /// A store that buffers every element.
    pub fn buffering(timer_service: Box<dyn TimerService>) -> Self {
        Self {
            representation: StateRepresentation::Buffer,
            reducer: None,
            keys: HashMap::new(),
            timer_service,
        }
    }

    pub fn representation(&self) -> StateRepresentation {
        self.representation
    }

    /// Return the entry for (key, window), creating an empty one if needed.
    pub fn get_or_create(&mut self, key: &K, key_bytes: &[u8], window: &W) -> Result<&mut WindowEntry<T>> {
        let representation = self.representation;
        let windows = &mut self
            .keys
            .entry(key_bytes.to_vec())
            .or_insert_with(|| KeyWindows {
                key: key.clone(),
                windows: BTreeMap::new(),
            })
            .windows;

        if !windows.contains_key(window) {
            let namespace = bincode::serialize(&(key_bytes, window))?;
            windows.insert(
                window.clone(),
                WindowEntry {
                    contents: WindowState::empty(representation),
                    trigger_state: TriggerState::new(),
                    timers: BTreeSet::new(),
                    namespace,
                },
            );
        }
        windows
            .get_mut(window)
            .ok_or_else(|| anyhow!("window {window:?} vanished after insertion"))
    }

    /// Append `element` to the window buffer, or fold it into the accumulator.
    pub fn merge_element(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        window: &W,
        element: T,
        timestamp: EventTime,
    ) -> Result<()> {
        let reducer = self.reducer.clone();
        let entry = self.get_or_create(key, key_bytes, window)?;
        match &mut entry.contents {
            WindowState::Accumulator(acc) => {
                let reducer = reducer.ok_or_else(|| anyhow!("accumulating store has no reducer"))?;
                let folded = match acc.as_ref() {
                    Some(current) => reducer.reduce(current.clone(), element)?,
                    None => element,
                };
                *acc = Some(folded);
            }
            WindowState::Buffer(elements) => elements.push(TimestampedValue::new(element, timestamp)),
        }
        Ok(())
    }

    /// Remove contents, trigger state and timers of (key, window).
    ///
    /// Returns whether anything was held. Purging an absent window is a no-op.
    pub fn purge(&mut self, key_bytes: &[u8], window: &W) -> Result<bool> {
        let Some(key_windows) = self.keys.get_mut(key_bytes) else {
            return Ok(false);
        };
        let Some(entry) = key_windows.windows.remove(window) else {
            return Ok(false);
        };
        if key_windows.windows.is_empty() {
            self.keys.remove(key_bytes);
        }
        for (domain, time) in &entry.timers {
            self.timer_service.cancel(&entry.namespace, *time, *domain)?;
        }
        Ok(true)
    }

    /// Read-only copy of the window contents: the buffered elements in order, or
    /// the accumulated value.
    pub fn snapshot_sequence(&self, key_bytes: &[u8], window: &W) -> Option<Vec<T>> {
        self.entry(key_bytes, window)
            .map(|entry| entry.contents.to_sequence())
    }

    /// Merge the contents of `sources` into `target`.
    ///
    /// Contents are combined in window order: accumulators are folded with the
    /// reducer, buffers are concatenated. Timers of the sources are cancelled.
    /// Returns the trigger state of every merged window so the trigger can fold
    /// it into the target's state.
    pub fn merge_windows(
        &mut self,
        key: &K,
        key_bytes: &[u8],
        sources: &[W],
        target: &W,
    ) -> Result<Vec<TriggerState>> {
        let mut ordered: Vec<&W> = sources.iter().collect();
        if !sources.contains(target) {
            ordered.push(target);
        }
        ordered.sort();
        ordered.dedup();

        let mut removed = Vec::new();
        if let Some(key_windows) = self.keys.get_mut(key_bytes) {
            for window in ordered {
                if let Some(entry) = key_windows.windows.remove(window) {
                    removed.push(entry);
                }
            }
        }
        for entry in &removed {
            for (domain, time) in &entry.timers {
                self.timer_service.cancel(&entry.namespace, *time, *domain)?;
            }
        }

        let mut merged_states = Vec::with_capacity(removed.len());
        let mut contents = WindowState::empty(self.representation);
        for entry in removed {
            merged_states.push(entry.trigger_state);
            contents = self.combine(contents, entry.contents)?;
        }

        let target_entry = self.get_or_create(key, key_bytes, target)?;
        target_entry.contents = contents;
        Ok(merged_states)
    }

    fn combine(&self, left: WindowState<T>, right: WindowState<T>) -> Result<WindowState<T>> {
        match (left, right) {
            (WindowState::Accumulator(None), right @ WindowState::Accumulator(_)) => Ok(right),
            (left @ WindowState::Accumulator(_), WindowState::Accumulator(None)) => Ok(left),
            (WindowState::Accumulator(Some(a)), WindowState::Accumulator(Some(b))) => {
                let reducer = self
                    .reducer
                    .as_ref()
                    .ok_or_else(|| anyhow!("accumulating store has no reducer"))?;
                Ok(WindowState::Accumulator(Some(reducer.reduce(a, b)?)))
            }
            (WindowState::Buffer(mut a), WindowState::Buffer(b)) => {
                a.extend(b);
                Ok(WindowState::Buffer(a))
            }
            _ => bail!("cannot combine accumulator and buffer window state"),
        }
    }

    pub fn contains(&self, key_bytes: &[u8], window: &W) -> bool {
        self.entry(key_bytes, window).is_some()
    }

    pub fn entry(&self, key_bytes: &[u8], window: &W) -> Option<&WindowEntry<T>> {
        self.keys.get(key_bytes)?.windows.get(window)
    }

    pub fn entry_mut(&mut self, key_bytes: &[u8], window: &W) -> Option<&mut WindowEntry<T>> {
        self.keys.get_mut(key_bytes)?.windows.get_mut(window)
    }

    /// The original key for `key_bytes`, while any of its windows is live.
    pub fn key_of(&self, key_bytes: &[u8]) -> Option<&K> {
        self.keys.get(key_bytes).map(|k| &k.key)
    }

    /// Windows held for one key, in window order.
    pub fn windows_of(&self, key_bytes: &[u8]) -> Vec<W> {
        self.keys
            .get(key_bytes)
            .map(|k| k.windows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Encoded keys with live windows, sorted.
    pub fn key_bytes(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = self.keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Build a trigger context for (key, window). `None` if the window is not held.
    pub fn trigger_context<'a>(
        &'a mut self,
        key_bytes: &[u8],
        window: &W,
        current_watermark: EventTime,
        current_processing_time: EventTime,
        merged: &'a [TriggerState],
    ) -> Option<TriggerContext<'a>> {
        let entry = self.keys.get_mut(key_bytes)?.windows.get_mut(window)?;
        Some(TriggerContext::new(
            &entry.namespace,
            current_watermark,
            current_processing_time,
            self.timer_service.as_mut(),
            &mut entry.timers,
            &mut entry.trigger_state,
            merged,
        ))
    }

    /// Register an engine timer for (key, window). No-op if the window is not held.
    pub fn register_timer(&mut self, key_bytes: &[u8], window: &W, time: EventTime, domain: TimeDomain) -> Result<()> {
        let Some(entry) = self.keys.get_mut(key_bytes).and_then(|k| k.windows.get_mut(window)) else {
            return Ok(());
        };
        self.timer_service
            .register(entry.namespace.clone(), time, domain)?;
        entry.timers.insert((domain, time));
        Ok(())
    }

    pub fn cancel_timer(&mut self, key_bytes: &[u8], window: &W, time: EventTime, domain: TimeDomain) -> Result<()> {
        let Some(entry) = self.keys.get_mut(key_bytes).and_then(|k| k.windows.get_mut(window)) else {
            return Ok(());
        };
        self.timer_service.cancel(&entry.namespace, time, domain)?;
        entry.timers.remove(&(domain, time));
        Ok(())
    }

    /// Remove and decode the earliest timer of `domain` due at or before `up_to`.
    ///
    /// Timers not popped yet stay registered, so a caller that stops early
    /// loses nothing.
    pub fn pop_due(&mut self, domain: TimeDomain, up_to: EventTime) -> Result<Option<FiredTimer<W>>> {
        let Some(timer) = self.timer_service.pop_due(domain, up_to) else {
            return Ok(None);
        };
        let (key_bytes, window): (Vec<u8>, W) = bincode::deserialize(&timer.namespace)?;
        if let Some(entry) = self.entry_mut(&key_bytes, &window) {
            entry.timers.remove(&(timer.domain, timer.time));
        }
        Ok(Some(FiredTimer {
            key_bytes,
            window,
            time: timer.time,
            domain: timer.domain,
        }))
    }

    pub fn next_timer(&self, domain: TimeDomain) -> Option<EventTime> {
        self.timer_service.next_timer(domain)
    }

    /// Number of (key, window) pairs currently held.
    pub fn window_count(&self) -> usize {
        self.keys.values().map(|k| k.windows.len()).sum()
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Number of pending timers across both domains.
    pub fn timer_count(&self) -> usize {
        self.timer_service.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
