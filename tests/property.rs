//! Property-based tests using proptest
//!
//! For arbitrary queue lengths and batch sizes, a drain must split the
//! queue into full batches followed by one remainder, in enqueue order.

mod common;

use common::*;
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use table_logger::{CancellationToken, FlushOutcome, LogRecord, TableLogger};

// Strategy for generating log levels
fn log_level_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["TRACE", "DEBUG", "INFO", "WARN", "ERROR"]).prop_map(|s| s.to_string())
}

// Strategy for arbitrary Unicode messages, including edge cases
fn message_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?]{0,100}",
        "[\u{0080}-\u{10FFFF}]{0,50}",
        "\\PC{0,200}",
        Just("".to_string()),
        Just("line one\nline two\r\n\ttabbed".to_string()),
    ]
}

/// Queue `count` entries without flushing, then drain them with one flush
fn drain_queued(count: usize, batch_size: usize) -> (RecordingStore, FlushOutcome) {
    let store = RecordingStore::new();
    let logger = TableLogger::new(store.factory()).with_batch_size(batch_size);

    let outcome = tokio_test::block_on(async {
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        for i in 0..count {
            // Queued, then rejected before flushing
            let _ = logger.enqueue(TestLog::new(i), &cancelled).await;
        }
        logger.flush(&CancellationToken::new()).await.unwrap()
    });

    (store, outcome)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_drain_partitions_into_bounded_batches(
        count in 1usize..400,
        batch_size in 1usize..80,
    ) {
        let (store, outcome) = drain_queued(count, batch_size);

        let expected_batches = count.div_ceil(batch_size);
        let sizes = store.batch_sizes();
        prop_assert_eq!(sizes.len(), expected_batches);
        prop_assert!(sizes.iter().all(|&n| n <= batch_size && n > 0));
        prop_assert!(sizes[..sizes.len() - 1].iter().all(|&n| n == batch_size));
        prop_assert_eq!(outcome, FlushOutcome::Drained { batches: expected_batches, entries: count });
    }

    #[test]
    fn test_drain_preserves_enqueue_order(count in 0usize..300) {
        let (store, _) = drain_queued(count, table_logger::DEFAULT_BATCH_SIZE);

        let expected: Vec<TestLog> = (0..count).map(TestLog::new).collect();
        prop_assert_eq!(store.rows(), expected);
    }

    #[test]
    fn test_record_json_roundtrip(
        level in log_level_strategy(),
        message in message_strategy(),
        source in prop::option::of("[a-z_:]{1,30}"),
    ) {
        let mut record = LogRecord::new(level, message);
        if let Some(source) = source {
            record = record.with_source(source);
        }

        let json = serde_json::to_string(&record).unwrap();
        prop_assert!(!json.contains('\n'));
        let parsed: LogRecord = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed, record);
    }
}
