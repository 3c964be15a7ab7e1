use super::*;

type Store = WindowStateStore<String, i32, TimeWindow>;

fn key_bytes(key: &str) -> Vec<u8> {
    bincode::serialize(&key.to_string()).unwrap()
}

fn summing() -> Store {
    WindowStateStore::accumulating(
        Reducer::new(|a: i32, b: i32| a + b),
        Box::new(InMemoryTimerService::new()),
    )
}

fn buffering() -> Store {
    WindowStateStore::buffering(Box::new(InMemoryTimerService::new()))
}

#[test]
fn test_accumulator_folds_in_arrival_order() {
    let mut store = WindowStateStore::<String, String, TimeWindow>::accumulating(
        Reducer::new(|a: String, b: String| format!("{a}{b}")),
        Box::new(InMemoryTimerService::new()),
    );
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    for s in ["a", "b", "c"] {
        store.merge_element(&key, &kb, &w, s.to_string(), 1).unwrap();
    }
    assert_eq!(store.snapshot_sequence(&kb, &w), Some(vec!["abc".to_string()]));
    assert_eq!(store.representation(), StateRepresentation::Accumulator);
}

#[test]
fn test_buffer_keeps_every_element() {
    let mut store = buffering();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    for (v, ts) in [(3, 1), (1, 2), (2, 3)] {
        store.merge_element(&key, &kb, &w, v, ts).unwrap();
    }
    assert_eq!(store.snapshot_sequence(&kb, &w), Some(vec![3, 1, 2]));
    let entry = store.entry(&kb, &w).unwrap();
    assert_eq!(entry.contents().len(), 3);
}

#[test]
fn test_snapshot_of_absent_window_is_none() {
    let store = summing();
    assert_eq!(store.snapshot_sequence(&key_bytes("k"), &TimeWindow::new(0, 10)), None);
}

#[test]
fn test_empty_accumulator_has_empty_sequence() {
    let mut store = summing();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.get_or_create(&key, &kb, &w).unwrap();
    assert_eq!(store.snapshot_sequence(&kb, &w), Some(vec![]));
}

#[test]
fn test_windows_are_isolated_per_key_and_window() {
    let mut store = summing();
    let (a, b) = ("a".to_string(), "b".to_string());
    let (ka, kb) = (key_bytes("a"), key_bytes("b"));
    let w1 = TimeWindow::new(0, 10);
    let w2 = TimeWindow::new(10, 20);

    store.merge_element(&a, &ka, &w1, 1, 1).unwrap();
    store.merge_element(&a, &ka, &w2, 10, 11).unwrap();
    store.merge_element(&b, &kb, &w1, 100, 1).unwrap();

    assert_eq!(store.snapshot_sequence(&ka, &w1), Some(vec![1]));
    assert_eq!(store.snapshot_sequence(&ka, &w2), Some(vec![10]));
    assert_eq!(store.snapshot_sequence(&kb, &w1), Some(vec![100]));
    assert_eq!(store.window_count(), 3);
    assert_eq!(store.key_count(), 2);
    assert_eq!(store.windows_of(&ka), vec![w1, w2]);
    assert_eq!(store.key_of(&kb), Some(&b));
}

#[test]
fn test_purge_is_idempotent_and_releases_key() {
    let mut store = summing();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.merge_element(&key, &kb, &w, 5, 1).unwrap();

    assert!(store.purge(&kb, &w).unwrap());
    assert!(!store.purge(&kb, &w).unwrap());
    assert!(store.is_empty());
    assert_eq!(store.key_of(&kb), None);

    // A purged window starts over.
    store.merge_element(&key, &kb, &w, 7, 2).unwrap();
    assert_eq!(store.snapshot_sequence(&kb, &w), Some(vec![7]));
}

#[test]
fn test_purge_cancels_registered_timers() {
    let mut store = summing();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.merge_element(&key, &kb, &w, 5, 1).unwrap();
    store.register_timer(&kb, &w, 9, TimeDomain::EventTime).unwrap();
    store.register_timer(&kb, &w, 50, TimeDomain::ProcessingTime).unwrap();
    assert_eq!(store.timer_count(), 2);
    assert_eq!(store.entry(&kb, &w).unwrap().timers().len(), 2);

    store.purge(&kb, &w).unwrap();
    assert_eq!(store.timer_count(), 0);
    assert_eq!(store.next_timer(TimeDomain::EventTime), None);
}

#[test]
fn test_register_timer_for_absent_window_is_noop() {
    let mut store = summing();
    store
        .register_timer(&key_bytes("k"), &TimeWindow::new(0, 10), 9, TimeDomain::EventTime)
        .unwrap();
    assert_eq!(store.timer_count(), 0);
}

#[test]
fn test_pop_due_decodes_key_and_window() {
    let mut store = buffering();
    let key = "user-1".to_string();
    let kb = key_bytes("user-1");
    let w1 = TimeWindow::new(0, 10);
    let w2 = TimeWindow::new(10, 20);
    store.merge_element(&key, &kb, &w1, 1, 1).unwrap();
    store.merge_element(&key, &kb, &w2, 2, 11).unwrap();
    store.register_timer(&kb, &w2, 19, TimeDomain::EventTime).unwrap();
    store.register_timer(&kb, &w1, 9, TimeDomain::EventTime).unwrap();

    let fired = store.pop_due(TimeDomain::EventTime, 15).unwrap();
    assert_eq!(
        fired,
        Some(FiredTimer {
            key_bytes: kb.clone(),
            window: w1.clone(),
            time: 9,
            domain: TimeDomain::EventTime,
        })
    );
    assert_eq!(store.pop_due(TimeDomain::EventTime, 15).unwrap(), None);
    assert!(store.entry(&kb, &w1).unwrap().timers().is_empty());
    assert_eq!(store.next_timer(TimeDomain::EventTime), Some(19));
}

#[test]
fn test_pop_due_leaves_later_timers_registered() {
    let mut store = buffering();
    let w = TimeWindow::new(0, 10);
    for key in ["a", "b"] {
        store.merge_element(&key.to_string(), &key_bytes(key), &w, 1, 1).unwrap();
        store.register_timer(&key_bytes(key), &w, 9, TimeDomain::EventTime).unwrap();
    }

    let first = store.pop_due(TimeDomain::EventTime, 9).unwrap().unwrap();
    assert_eq!(first.key_bytes, key_bytes("a"));
    assert_eq!(store.timer_count(), 1);
    assert!(store.entry(&key_bytes("a"), &w).unwrap().timers().is_empty());
    assert_eq!(store.entry(&key_bytes("b"), &w).unwrap().timers().len(), 1);

    assert!(store.pop_due(TimeDomain::EventTime, 8).unwrap().is_none());
    let second = store.pop_due(TimeDomain::EventTime, 9).unwrap().unwrap();
    assert_eq!(second.key_bytes, key_bytes("b"));
    assert!(store.pop_due(TimeDomain::EventTime, 9).unwrap().is_none());
}

#[test]
fn test_cancel_timer() {
    let mut store = buffering();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.get_or_create(&key, &kb, &w).unwrap();
    store.register_timer(&kb, &w, 9, TimeDomain::EventTime).unwrap();
    store.cancel_timer(&kb, &w, 9, TimeDomain::EventTime).unwrap();
    assert_eq!(store.timer_count(), 0);
    assert!(store.pop_due(TimeDomain::EventTime, 100).unwrap().is_none());
}

#[test]
fn test_merge_windows_folds_accumulators_in_window_order() {
    let mut store = WindowStateStore::<String, String, TimeWindow>::accumulating(
        Reducer::new(|a: String, b: String| format!("{a}{b}")),
        Box::new(InMemoryTimerService::new()),
    );
    let key = "k".to_string();
    let kb = key_bytes("k");
    let late = TimeWindow::new(8, 15);
    let early = TimeWindow::new(0, 10);
    store.merge_element(&key, &kb, &late, "y".to_string(), 8).unwrap();
    store.merge_element(&key, &kb, &early, "x".to_string(), 0).unwrap();

    let target = TimeWindow::new(0, 15);
    store.merge_windows(&key, &kb, &[late, early], &target).unwrap();

    assert_eq!(store.windows_of(&kb), vec![target.clone()]);
    assert_eq!(store.snapshot_sequence(&kb, &target), Some(vec!["xy".to_string()]));
}

#[test]
fn test_merge_windows_concatenates_buffers_and_returns_trigger_state() {
    let mut store = buffering();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let a = TimeWindow::new(0, 10);
    let b = TimeWindow::new(5, 15);
    store.merge_element(&key, &kb, &a, 1, 0).unwrap();
    store.merge_element(&key, &kb, &b, 2, 5).unwrap();
    store.register_timer(&kb, &a, 9, TimeDomain::EventTime).unwrap();
    {
        let mut ctx = store.trigger_context(&kb, &b, EVENT_TIME_MIN, 0, &[]).unwrap();
        ctx.put_state("count", &3_u64).unwrap();
    }

    let target = TimeWindow::new(0, 15);
    let states = store.merge_windows(&key, &kb, &[a, b], &target).unwrap();

    assert_eq!(states.len(), 2);
    assert!(states[0].is_empty());
    assert!(states[1].contains_key("count"));
    assert_eq!(store.snapshot_sequence(&kb, &target), Some(vec![1, 2]));
    // Source timers are cancelled; the trigger re-registers for the target.
    assert_eq!(store.timer_count(), 0);
    assert!(store.entry(&kb, &target).unwrap().trigger_state().is_empty());
}

#[test]
fn test_trigger_context_registers_timers_on_the_entry() {
    let mut store = buffering();
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.get_or_create(&key, &kb, &w).unwrap();

    {
        let mut ctx = store.trigger_context(&kb, &w, EVENT_TIME_MIN, 0, &[]).unwrap();
        ctx.register_event_time_timer(w.max_timestamp()).unwrap();
    }
    assert!(store
        .entry(&kb, &w)
        .unwrap()
        .timers()
        .contains(&(TimeDomain::EventTime, 9)));
    assert_eq!(store.next_timer(TimeDomain::EventTime), Some(9));
    assert!(store
        .trigger_context(&kb, &TimeWindow::new(10, 20), EVENT_TIME_MIN, 0, &[])
        .is_none());
}

#[test]
fn test_timer_capacity_error_is_not_fatal() {
    let mut store: Store = WindowStateStore::buffering(Box::new(InMemoryTimerService::with_capacity_limit(1)));
    let key = "k".to_string();
    let kb = key_bytes("k");
    let w = TimeWindow::new(0, 10);
    store.get_or_create(&key, &kb, &w).unwrap();
    store.register_timer(&kb, &w, 1, TimeDomain::EventTime).unwrap();

    let err = store.register_timer(&kb, &w, 2, TimeDomain::EventTime).unwrap_err();
    assert!(!error::is_fatal(&err));
    assert_eq!(store.entry(&kb, &w).unwrap().timers().len(), 1);
}

#[test]
fn test_key_bytes_sorted() {
    let mut store = summing();
    let w = TimeWindow::new(0, 10);
    for k in ["zeta", "alpha", "mid"] {
        store.merge_element(&k.to_string(), &key_bytes(k), &w, 1, 1).unwrap();
    }
    let keys = store.key_bytes();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys.len(), 3);
}
