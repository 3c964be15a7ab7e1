//! Session windows driven directly through a window operator.
//!
//! Each user's clicks are grouped into sessions separated by at least 3 seconds
//! of inactivity. A watermark closes every session that ended before it; the
//! final `End` flushes whatever is still open.

use std::time::Duration;

use anyhow::Result;
use windcrab_core::config::WindowConfig;
use windcrab_core::types::StreamElement;
use windcrab_core::window::{SessionWindows, TimeWindow, WindowAggregation, WindowPipeline};

fn main() -> Result<()> {
    let summarize = |user: &String, window: &TimeWindow, clicks: &[(String, u32)], out: &mut Vec<String>| {
        let pages: Vec<String> = clicks.iter().map(|(_, page)| page.to_string()).collect();
        out.push(format!(
            "{user}: session [{}, {}) visited {}",
            window.start,
            window.end,
            pages.join(" -> ")
        ));
    };

    let mut operator = WindowPipeline::new(
        SessionWindows::with_gap(Duration::from_secs(3)),
        |(user, _): &(String, u32)| user.clone(),
        WindowAggregation::apply(summarize),
    )
    .config(WindowConfig::default())
    .build()?;
    operator.open()?;

    let input = vec![
        StreamElement::timestamped_record(("alice".to_string(), 1), 1_000),
        StreamElement::timestamped_record(("bob".to_string(), 4), 1_500),
        StreamElement::timestamped_record(("alice".to_string(), 2), 2_500),
        StreamElement::timestamped_record(("alice".to_string(), 3), 9_000),
        StreamElement::watermark(6_000),
        StreamElement::timestamped_record(("bob".to_string(), 5), 10_000),
        StreamElement::End,
    ];

    for element in input {
        for output in operator.process(element)? {
            match output {
                StreamElement::Record(record) => println!("{:>6}  {}", record.timestamp.unwrap_or_default(), record.value),
                StreamElement::Watermark(wm) => println!("--- watermark {}", wm.timestamp),
                StreamElement::End => println!("--- end"),
            }
        }
    }

    Ok(())
}
