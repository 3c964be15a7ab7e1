//! # windcrab API
//!
//! Fluent builder for keyed, windowed aggregations over bounded streams.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use windcrab_api::environment::StreamExecutionEnvironment;
//! use windcrab_core::config::WindowConfig;
//! use windcrab_core::time::BoundedOutOfOrderness;
//! use windcrab_core::window::TumblingWindows;
//!
//! let env = StreamExecutionEnvironment::new("clicks-per-second", WindowConfig::default());
//! let clicks = vec![("home".to_string(), 1_000_i64), ("home".to_string(), 1_500)];
//! let results = env
//!     .from_iter(clicks)
//!     .assign_timestamps_and_watermarks(BoundedOutOfOrderness::new(
//!         Duration::from_millis(200),
//!         |(_, ts): &(String, i64)| *ts,
//!     ))
//!     .key_by(|(page, _): &(String, i64)| page.clone())
//!     .window(TumblingWindows::of(Duration::from_secs(1)))
//!     .reduce(|a, _b| a)
//!     .unwrap()
//!     .execute_with_parallelism(2)
//!     .unwrap();
//! ```
//!
//! - [`environment`]: [`StreamExecutionEnvironment`](environment::StreamExecutionEnvironment)
//!   and [`ExecutionConfig`](environment::ExecutionConfig).
//! - [`datastream`]: [`DataStream`](datastream::DataStream),
//!   [`KeyedStream`](datastream::KeyedStream), [`WindowedStream`](datastream::WindowedStream)
//!   and the executable [`WindowJob`](datastream::WindowJob).

pub mod datastream;
pub mod environment;

pub use windcrab_core;
