//! Tests for PriorityMergeReaderByTimestamp
//!
//! These tests verify:
//! - Point lookups return the highest-priority value at a timestamp
//! - Lookups between points and outside every source return None
//! - Sequential reading continues after the last looked-up timestamp
//! - Sources wrapped with ByTimestampAdapter behave like native ones

use std::collections::BTreeMap;

use tsmerge::memtable::MemSeriesReader;
use tsmerge::merge::PriorityMergeReaderByTimestamp;
use tsmerge::series::{
    ByTimestampAdapter, Priority, PrioritySeriesReaderByTimestamp, SeriesReader,
    SeriesReaderByTimestamp, TimeValuePair, TypedValue,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// `size` points from `start`, every `interval`, valued `time % modulus`
fn stepped_pairs(start: i64, size: usize, interval: i64, modulus: i64) -> Vec<TimeValuePair> {
    (0..size as i64)
        .map(|i| {
            let ts = start + i * interval;
            TimeValuePair::new(ts, TypedValue::Int64(ts % modulus))
        })
        .collect()
}

fn stepped(start: i64, size: usize, interval: i64, modulus: i64, priority: u32) -> PrioritySeriesReaderByTimestamp {
    PrioritySeriesReaderByTimestamp::from_reader(
        MemSeriesReader::from_sorted(stepped_pairs(start, size, interval, modulus)),
        Priority(priority),
    )
}

/// Expected merged contents: later (higher priority) inputs overwrite
fn model(inputs: &[Vec<TimeValuePair>]) -> BTreeMap<i64, TypedValue> {
    let mut map = BTreeMap::new();
    for pairs in inputs {
        for pair in pairs {
            map.insert(pair.timestamp, pair.value.clone());
        }
    }
    map
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

// =============================================================================
// Lookup Tests
// =============================================================================

#[test]
fn test_value_at_then_sequential_tail() {
    let inputs = vec![
        stepped_pairs(100, 200, 5, 11),
        stepped_pairs(850, 200, 7, 19),
        stepped_pairs(1080, 200, 13, 31),
    ];
    let expected = model(&inputs);

    let mut reader = PriorityMergeReaderByTimestamp::new(vec![
        stepped(100, 200, 5, 11, 1),
        stepped(850, 200, 7, 19, 2),
        stepped(1080, 200, 13, 31, 3),
    ])
    .unwrap();

    let mut rng = Lcg(7);
    let mut time = 4;
    let mut last = time;
    while time < 1080 + 200 * 13 + 600 {
        let value = reader.value_at(time).unwrap();
        assert_eq!(value, expected.get(&time).cloned(), "time = {}", time);
        last = time;
        time += (rng.next() % 50) as i64 + 1;
    }

    let tail: Vec<TimeValuePair> = reader.pairs().map(|p| p.unwrap()).collect();
    let expected_tail: Vec<TimeValuePair> = expected
        .range(last + 1..)
        .map(|(ts, v)| TimeValuePair::new(*ts, v.clone()))
        .collect();
    assert_eq!(tail, expected_tail);
}

#[test]
fn test_value_at_every_timestamp() {
    let inputs = vec![stepped_pairs(0, 50, 2, 5), stepped_pairs(10, 50, 3, 7)];
    let expected = model(&inputs);

    let mut reader = PriorityMergeReaderByTimestamp::new(vec![
        stepped(0, 50, 2, 5, 1),
        stepped(10, 50, 3, 7, 2),
    ])
    .unwrap();

    for time in 0..200 {
        assert_eq!(reader.value_at(time).unwrap(), expected.get(&time).cloned());
    }
    assert_eq!(reader.next_pair().unwrap(), None);
}

#[test]
fn test_higher_priority_wins_regardless_of_order() {
    let high = PrioritySeriesReaderByTimestamp::from_reader(
        MemSeriesReader::from_sorted(vec![TimeValuePair::new(5, TypedValue::Int64(2))]),
        Priority(2),
    );
    let low = PrioritySeriesReaderByTimestamp::from_reader(
        MemSeriesReader::from_sorted(vec![TimeValuePair::new(5, TypedValue::Int64(1))]),
        Priority(1),
    );

    let mut reader = PriorityMergeReaderByTimestamp::new(vec![high, low]).unwrap();
    assert_eq!(reader.value_at(5).unwrap(), Some(TypedValue::Int64(2)));
}

#[test]
fn test_sequential_read_deduplicates() {
    let mut reader = PriorityMergeReaderByTimestamp::new(vec![
        stepped(0, 5, 1, 100, 1),
        stepped(2, 5, 1, 100, 2),
    ])
    .unwrap();

    let ts: Vec<i64> = reader.pairs().map(|p| p.unwrap().timestamp).collect();
    assert_eq!(ts, vec![0, 1, 2, 3, 4, 5, 6]);
}

// =============================================================================
// Adapter Tests
// =============================================================================

#[test]
fn test_adapter_sources() {
    let adapted = |pairs: Vec<TimeValuePair>, priority| {
        PrioritySeriesReaderByTimestamp::from_reader(
            ByTimestampAdapter::new(MemSeriesReader::from_sorted(pairs)),
            Priority(priority),
        )
    };
    let inputs = vec![stepped_pairs(0, 40, 3, 10), stepped_pairs(1, 40, 4, 10)];
    let expected = model(&inputs);

    let mut reader = PriorityMergeReaderByTimestamp::new(vec![
        adapted(inputs[0].clone(), 1),
        adapted(inputs[1].clone(), 2),
    ])
    .unwrap();

    for time in (0..100).step_by(3) {
        assert_eq!(reader.value_at(time).unwrap(), expected.get(&time).cloned());
    }
}

#[test]
fn test_adapter_value_at_keeps_lookahead() {
    let mut adapter = ByTimestampAdapter::new(MemSeriesReader::from_sorted(vec![
        TimeValuePair::new(10, TypedValue::Boolean(true)),
        TimeValuePair::new(20, TypedValue::Boolean(false)),
    ]));

    assert_eq!(adapter.value_at(15).unwrap(), None);
    assert_eq!(adapter.value_at(20).unwrap(), Some(TypedValue::Boolean(false)));
    assert_eq!(adapter.next_pair().unwrap(), None);
}
