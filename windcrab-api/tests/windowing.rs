use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::Result;
use windcrab_api::environment::{ExecutionConfig, StreamExecutionEnvironment};
use windcrab_core::config::WindowConfig;
use windcrab_core::error::WindowError;
use windcrab_core::time::{
    BoundedOutOfOrderness, ManualClock, MonotonousTimestamps, ProcessingTimeClock, TimeCharacteristic,
};
use windcrab_core::types::{EventTime, StreamElement};
use windcrab_core::window::{
    CountEvictor, CountTrigger, OperatorVariant, PassThroughWindowFunction, Reducer, SessionWindows,
    SlidingWindows, StateRepresentation, TimeWindow, Trigger, TriggerContext, TriggerResult,
    TumblingWindows, Window,
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
struct Event {
    user: String,
    ts: i64,
    value: i32,
}

fn ev(user: &str, ts: i64, value: i32) -> Event {
    Event {
        user: user.to_string(),
        ts,
        value,
    }
}

fn env(name: &str) -> StreamExecutionEnvironment {
    StreamExecutionEnvironment::new(name, WindowConfig::default())
}

fn sum(a: Event, b: Event) -> Event {
    Event {
        user: a.user,
        ts: a.ts.max(b.ts),
        value: a.value + b.value,
    }
}

fn by_timestamp<OUT: Clone>(records: Vec<windcrab_core::types::StreamRecord<OUT>>) -> Vec<(EventTime, OUT)> {
    let mut out: Vec<_> = records
        .into_iter()
        .map(|r| (r.timestamp.unwrap(), r.value))
        .collect();
    out.sort_by_key(|(ts, _)| *ts);
    out
}

fn assert_rejected<T>(result: Result<T>) {
    let Err(err) = result else {
        panic!("expected the job to be rejected");
    };
    assert!(matches!(
        err.downcast_ref::<WindowError>(),
        Some(WindowError::ConfigurationRejected { .. })
    ));
}

#[test]
fn test_event_time_tumbling_window_reduce_out_of_order_and_late_drop() {
    // Window size: 10s. Out-of-orderness: 2s.
    // Watermark = max_seen_ts - 2s.
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(2), |e: &Event| e.ts);

    let events = vec![
        ev("u1", 1_000, 1),
        ev("u1", 9_000, 2),
        // Out of order but within the 2s delay.
        ev("u1", 8_000, 3),
        // Advances the watermark to 10_000, closing [0, 10_000).
        ev("u1", 12_000, 10),
        // Late: the watermark already passed the end of its window.
        ev("u1", 5_000, 1000),
    ];

    let out = env("tumbling-window-reduce")
        .from_iter(events)
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(10)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    // - [0, 10_000) => max_timestamp=9_999, sum=1+2+3=6
    // - [10_000, 20_000) flushed at end of stream => sum=10
    let by_ts = by_timestamp(out);
    assert_eq!(by_ts.len(), 2);
    assert_eq!(by_ts[0].0, 9_999);
    assert_eq!(by_ts[0].1.value, 6);
    assert_eq!(by_ts[1].0, 19_999);
    assert_eq!(by_ts[1].1.value, 10);
}

#[test]
fn test_out_of_order_sequence_fires_on_watermark() {
    // (T=1), (T=5), (T=3), then T=9 with max_delay=3 produces Watermark(6).
    let strategy = BoundedOutOfOrderness::new(Duration::from_millis(3), |e: &Event| e.ts);
    let events = vec![ev("u1", 1, 1), ev("u1", 5, 5), ev("u1", 3, 3), ev("u1", 9, 9)];

    let out = env("out-of-order")
        .from_iter(events)
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_millis(5)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    let by_ts: Vec<_> = by_timestamp(out)
        .into_iter()
        .map(|(ts, e)| (ts, e.value))
        .collect();
    // [0,5) fires when the watermark reaches 6; [5,10) is flushed at end of stream.
    assert_eq!(by_ts, vec![(4, 4), (9, 14)]);
}

#[test]
fn test_watermarks_only_advance() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_millis(0), |e: &Event| e.ts);
    let stream = env("watermarks")
        .from_iter(vec![ev("u1", 5, 1), ev("u1", 3, 1), ev("u1", 7, 1)])
        .assign_timestamps_and_watermarks(strategy);

    let watermarks: Vec<EventTime> = stream
        .elements()
        .iter()
        .filter_map(|e| match e {
            StreamElement::Watermark(wm) => Some(wm.timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(watermarks, vec![5, 7]);
}

#[test]
fn test_monotonous_timestamps_fire_each_window_as_it_closes() {
    let strategy = MonotonousTimestamps::new(|e: &Event| e.ts);
    let stream = env("monotonous")
        .from_iter(vec![ev("u1", 100, 1), ev("u1", 900, 2), ev("u1", 1_000, 4), ev("u1", 2_500, 8)])
        .assign_timestamps_and_watermarks(strategy);

    // The watermark after the record at 1000 closes [0, 1000) before the end of the stream.
    assert_eq!(stream.elements()[5], StreamElement::watermark(1_000));

    let results = stream
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(1)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();
    let by_ts: Vec<(EventTime, i32)> = results
        .into_iter()
        .map(|r| (r.timestamp.unwrap(), r.value.value))
        .collect();
    assert_eq!(by_ts, vec![(999, 3), (1_999, 4), (2_999, 8)]);
}

#[test]
fn test_event_time_sliding_window_multi_membership() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let out = env("sliding")
        .from_iter(vec![ev("u1", 1_000, 1), ev("u1", 6_000, 10)])
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(SlidingWindows::of(Duration::from_secs(10), Duration::from_secs(5)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    let by_ts: Vec<_> = by_timestamp(out)
        .into_iter()
        .map(|(ts, e)| (ts, e.value))
        .collect();
    // [-5s, 5s) holds 1; [0, 10s) holds both; [5s, 15s) holds 10.
    assert_eq!(by_ts, vec![(4_999, 1), (9_999, 11), (14_999, 10)]);
}

#[test]
fn test_session_windows_per_user() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let events = vec![
        ev("u1", 0, 1),
        ev("u2", 100, 5),
        ev("u1", 400, 2),
        ev("u1", 2_000, 4),
        ev("u2", 2_100, 6),
    ];
    let out = env("sessions")
        .from_iter(events)
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(SessionWindows::with_gap(Duration::from_millis(500)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    let mut sessions: Vec<_> = out
        .into_iter()
        .map(|r| (r.value.user, r.timestamp.unwrap(), r.value.value))
        .collect();
    sessions.sort();
    assert_eq!(
        sessions,
        vec![
            ("u1".to_string(), 899, 3),
            ("u1".to_string(), 2_499, 4),
            ("u2".to_string(), 599, 5),
            ("u2".to_string(), 2_599, 6),
        ]
    );
}

#[test]
fn test_apply_whole_window_function() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let job = env("apply")
        .from_iter(vec![ev("u1", 300, 3), ev("u1", 100, 1), ev("u1", 200, 2)])
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(1)))
        .apply(
            |user: &String, window: &TimeWindow, events: &[Event], out: &mut Vec<String>| {
                let values: Vec<String> = events.iter().map(|e| e.value.to_string()).collect();
                out.push(format!("{user} {window}: {}", values.join(",")));
            },
        )
        .unwrap();

    assert_eq!(job.variant(), OperatorVariant::Evicting);
    assert_eq!(job.representation(), StateRepresentation::Buffer);
    assert_eq!(job.trigger_name(), "EventTimeTrigger");

    let out = job.execute().unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].value, "u1 TimeWindow([0, 1000)): 3,1,2");
}

#[test]
fn test_evictor_forces_buffer_and_keeps_default_trigger() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let job = env("evictor")
        .from_iter((1..=5).map(|i| ev("u1", i * 100, i as i32)))
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(1)))
        .evictor(CountEvictor::of(2))
        .reduce(sum)
        .unwrap();

    assert_eq!(job.variant(), OperatorVariant::Evicting);
    assert_eq!(job.representation(), StateRepresentation::Buffer);
    assert_eq!(job.trigger_name(), "EventTimeTrigger");
    assert_eq!(job.evictor_name(), Some("CountEvictor"));

    let out = job.execute().unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].value.value, 4 + 5);
}

/// Fires on every element without purging.
struct FireOnElementTrigger;

impl Trigger<Event, TimeWindow> for FireOnElementTrigger {
    fn on_element(
        &self,
        _element: &Event,
        _timestamp: i64,
        _window: &TimeWindow,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Fire)
    }

    fn on_event_time(&self, _time: i64, _window: &TimeWindow, _ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        _time: i64,
        _window: &TimeWindow,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn name(&self) -> &'static str {
        "FireOnElementTrigger"
    }
}

#[test]
fn test_custom_trigger_fire_on_each_element() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let job = env("custom-trigger")
        .from_iter(vec![ev("u1", 1_000, 1), ev("u1", 2_000, 2), ev("u1", 3_000, 3)])
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(10)))
        .trigger(FireOnElementTrigger)
        .reduce(sum)
        .unwrap();
    assert_eq!(job.trigger_name(), "FireOnElementTrigger");

    let values: Vec<i32> = job.execute().unwrap().into_iter().map(|r| r.value.value).collect();
    // Running sums; the trigger has no end-of-stream decision so nothing more is emitted.
    assert_eq!(values, vec![1, 3, 6]);
}

#[test]
fn test_count_trigger_on_tumbling_window() {
    let strategy = BoundedOutOfOrderness::new(Duration::from_secs(0), |e: &Event| e.ts);
    let job = env("count-trigger")
        .from_iter((1..=7).map(|i| ev("u1", i, 1)))
        .assign_timestamps_and_watermarks(strategy)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(10)))
        .trigger(CountTrigger::of(3))
        .reduce(sum)
        .unwrap();
    assert_eq!(job.trigger_name(), "CountTrigger");
    assert_eq!(job.representation(), StateRepresentation::Accumulator);

    let values: Vec<i32> = job.execute().unwrap().into_iter().map(|r| r.value.value).collect();
    assert_eq!(values, vec![3, 6]);
}

#[test]
fn test_allowed_lateness_refires_window() {
    let elements = vec![
        StreamElement::timestamped_record(ev("u1", 100, 1), 100),
        StreamElement::watermark(1_100),
        StreamElement::timestamped_record(ev("u1", 200, 2), 200),
        StreamElement::watermark(1_600),
        StreamElement::timestamped_record(ev("u1", 300, 4), 300),
    ];
    let out = env("lateness")
        .from_elements(elements)
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(1)))
        .allowed_lateness(Duration::from_millis(500))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    let values: Vec<i32> = out.into_iter().map(|r| r.value.value).collect();
    // The second element is late but allowed; the third is past cleanup and dropped.
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn test_processing_time_windows_use_environment_clock() {
    let config = WindowConfig::new(TimeCharacteristic::ProcessingTime);
    let out = StreamExecutionEnvironment::new("processing-time", config)
        .with_clock(ManualClock::new(42_000))
        .from_iter(vec![ev("u1", 0, 1), ev("u1", 0, 2)])
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(10)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].timestamp, Some(49_999));
    assert_eq!(out[0].value.value, 3);
}

/// Moves one millisecond forward every time it is read.
struct SteppingClock(AtomicI64);

impl ProcessingTimeClock for SteppingClock {
    fn now(&self) -> EventTime {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Fires on processing-time timers only; windows still open at the end are dropped.
struct ProcessingTimeOnlyTrigger;

impl Trigger<Event, TimeWindow> for ProcessingTimeOnlyTrigger {
    fn on_element(
        &self,
        _element: &Event,
        _timestamp: i64,
        window: &TimeWindow,
        ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        ctx.register_processing_time_timer(window.max_timestamp())?;
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(&self, _time: i64, _window: &TimeWindow, _ctx: &mut TriggerContext<'_>) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        _time: i64,
        _window: &TimeWindow,
        _ctx: &mut TriggerContext<'_>,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::FireAndPurge)
    }
}

fn processing_time_job_output(execution: ExecutionConfig) -> Vec<i32> {
    StreamExecutionEnvironment::new("ticking", WindowConfig::new(TimeCharacteristic::ProcessingTime))
        .with_execution_config(execution)
        .with_clock(SteppingClock(AtomicI64::new(0)))
        .from_iter((0..40).map(|_| ev("u1", 0, 1)))
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_millis(5)))
        .trigger(ProcessingTimeOnlyTrigger)
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap()
        .into_iter()
        .map(|r| r.value.value)
        .collect()
}

#[test]
fn test_processing_time_windows_fire_before_end_of_stream() {
    let fired = processing_time_job_output(ExecutionConfig::default());
    assert!(!fired.is_empty());
    assert!(fired.iter().sum::<i32>() <= 40);

    // Without ticks every window is still open at the end and gets dropped.
    let unticked = processing_time_job_output(ExecutionConfig::default().with_processing_time_tick(None));
    assert!(unticked.is_empty());
}

#[test]
fn test_rich_reducer_rejected_before_execution() {
    let rich = || Reducer::rich(sum);

    assert_rejected(
        env("rich")
            .from_iter(vec![ev("u1", 0, 1)])
            .key_by(|e: &Event| e.user.clone())
            .window(TumblingWindows::of(Duration::from_secs(1)))
            .reduce_with(rich(), PassThroughWindowFunction),
    );
    assert_rejected(
        env("rich-evicting")
            .from_iter(vec![ev("u1", 0, 1)])
            .key_by(|e: &Event| e.user.clone())
            .window(SlidingWindows::of(Duration::from_secs(1), Duration::from_millis(100)))
            .evictor(CountEvictor::of(100))
            .trigger(CountTrigger::of(100))
            .reduce_with(rich(), PassThroughWindowFunction),
    );
}

#[test]
fn test_invalid_assigner_rejected() {
    assert_rejected(
        env("invalid")
            .from_iter(vec![ev("u1", 0, 1)])
            .key_by(|e: &Event| e.user.clone())
            .window(SlidingWindows::of(Duration::from_secs(1), Duration::ZERO))
            .reduce(sum),
    );
}

#[test]
fn test_missing_timestamps_fail_event_time_job() {
    let err = env("no-timestamps")
        .from_iter(vec![ev("u1", 0, 1)])
        .key_by(|e: &Event| e.user.clone())
        .window(TumblingWindows::of(Duration::from_secs(1)))
        .reduce(sum)
        .unwrap()
        .execute()
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WindowError>(),
        Some(WindowError::MissingTimestamp)
    ));
}
