//! # windcrab core
//!
//! Keyed window assignment, trigger evaluation and eviction for streams of
//! timestamped records.
//!
//! - [`types`]: [`StreamElement`](types::StreamElement),
//!   [`StreamRecord`](types::StreamRecord), [`Watermark`](types::Watermark) and the
//!   [`StreamData`](types::StreamData) bound.
//! - [`time`]: time domains, clocks, watermark strategies and the timer service.
//! - [`window`]: assigners, triggers, evictors, the per-key window state store
//!   and the two window operators.
//! - [`config`]: [`WindowConfig`](config::WindowConfig), passed explicitly into
//!   pipeline construction.
//! - [`error`]: the [`WindowError`](error::WindowError) taxonomy.
//! - [`partitioner`], [`channel`]: plumbing for running one operator per key
//!   partition on its own thread.

pub mod channel;
pub mod config;
pub mod error;
pub mod partitioner;
pub mod time;
pub mod types;
pub mod window;
