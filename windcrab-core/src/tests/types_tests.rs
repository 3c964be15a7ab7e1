use super::*;

#[test]
fn test_stream_element_record() {
    let elem = StreamElement::record(42i32);
    match &elem {
        StreamElement::Record(rec) => {
            assert_eq!(rec.value, 42);
            assert_eq!(rec.timestamp, None);
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn test_stream_element_watermark() {
    let elem = StreamElement::<i32>::watermark(1000);
    match elem {
        StreamElement::Watermark(wm) => assert_eq!(wm.timestamp, 1000),
        _ => panic!("expected Watermark"),
    }
}

#[test]
fn test_as_record_skips_control_elements() {
    assert!(StreamElement::<i32>::End.as_record().is_none());
    assert!(StreamElement::<i32>::watermark(5).as_record().is_none());
    let elem = StreamElement::timestamped_record("a", 7);
    assert_eq!(elem.as_record().map(|r| r.timestamp), Some(Some(7)));
}

#[test]
fn test_stream_record_with_timestamp() {
    let rec = StreamRecord::with_timestamp("hello", 999);
    assert_eq!(rec.value, "hello");
    assert_eq!(rec.timestamp, Some(999));
}

#[test]
fn test_watermark_ordering() {
    assert!(Watermark::new(1) < Watermark::new(2));
    assert_eq!(Watermark::new(42_000).to_string(), "Watermark(42000ms)");
}

#[test]
fn test_stream_data_trait() {
    // Verify common types satisfy StreamData.
    fn assert_stream_data<T: StreamData>() {}
    assert_stream_data::<i32>();
    assert_stream_data::<String>();
    assert_stream_data::<(String, i32)>();
    assert_stream_data::<Vec<u8>>();
}
