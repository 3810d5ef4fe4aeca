//! Tests for PriorityMergeReader
//!
//! These tests verify:
//! - Output is strictly ascending with no duplicate timestamps
//! - The highest-priority source wins a timestamp collision
//! - Equal priorities resolve to the later registered source
//! - Empty and exhausted sources, and close behaviour

use std::collections::BTreeMap;

use tsmerge::memtable::MemSeriesReader;
use tsmerge::merge::PriorityMergeReader;
use tsmerge::series::{Priority, PrioritySeriesReader, SeriesReader, TimeValuePair, TypedValue};
use tsmerge::TsError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Source whose values record the priority that produced them
fn source(priority: u32, timestamps: &[i64]) -> PrioritySeriesReader {
    let pairs = timestamps
        .iter()
        .map(|&ts| TimeValuePair::new(ts, TypedValue::Int32(priority as i32)))
        .collect();
    PrioritySeriesReader::from_reader(MemSeriesReader::from_sorted(pairs), Priority(priority))
}

/// Source with explicit values, for equal-priority cases
fn tagged(priority: u32, pairs: &[(i64, i64)]) -> PrioritySeriesReader {
    let pairs = pairs
        .iter()
        .map(|&(ts, v)| TimeValuePair::new(ts, TypedValue::Int64(v)))
        .collect();
    PrioritySeriesReader::from_reader(MemSeriesReader::from_sorted(pairs), Priority(priority))
}

fn drain(reader: &mut PriorityMergeReader) -> Vec<(i64, TypedValue)> {
    reader
        .pairs()
        .map(|p| {
            let p = p.unwrap();
            (p.timestamp, p.value)
        })
        .collect()
}

/// Small deterministic generator so data sets are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

// =============================================================================
// Merge Semantics Tests
// =============================================================================

#[test]
fn test_three_sources_priority_wins() {
    let mut reader = PriorityMergeReader::new(vec![
        source(1, &[1, 2, 3, 4, 5]),
        source(2, &[1, 5, 6, 7, 8]),
        source(3, &[4, 5, 6, 7, 10]),
    ])
    .unwrap();

    let merged = drain(&mut reader);
    let expected: Vec<(i64, TypedValue)> = [
        (1, 2),
        (2, 1),
        (3, 1),
        (4, 3),
        (5, 3),
        (6, 3),
        (7, 3),
        (8, 2),
        (10, 3),
    ]
    .iter()
    .map(|&(ts, p)| (ts, TypedValue::Int32(p)))
    .collect();

    assert_eq!(merged, expected);
}

#[test]
fn test_registration_order_does_not_change_winner() {
    let mut reader = PriorityMergeReader::new(vec![
        source(3, &[4, 5, 6, 7, 10]),
        source(1, &[1, 2, 3, 4, 5]),
        source(2, &[1, 5, 6, 7, 8]),
    ])
    .unwrap();

    let winners: Vec<i32> = drain(&mut reader)
        .into_iter()
        .map(|(_, v)| match v {
            TypedValue::Int32(p) => p,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(winners, vec![2, 1, 1, 3, 3, 3, 3, 2, 3]);
}

#[test]
fn test_equal_priority_later_source_wins() {
    let mut reader = PriorityMergeReader::new(vec![
        tagged(1, &[(1, 100), (2, 100)]),
        tagged(1, &[(2, 200), (3, 200)]),
    ])
    .unwrap();

    let merged = drain(&mut reader);
    assert_eq!(
        merged,
        vec![
            (1, TypedValue::Int64(100)),
            (2, TypedValue::Int64(200)),
            (3, TypedValue::Int64(200)),
        ]
    );
}

#[test]
fn test_single_source_passes_through() {
    let mut reader = PriorityMergeReader::new(vec![source(7, &[3, 9, 27])]).unwrap();

    let ts: Vec<i64> = drain(&mut reader).into_iter().map(|(ts, _)| ts).collect();
    assert_eq!(ts, vec![3, 9, 27]);
}

#[test]
fn test_random_sources_match_model() {
    let mut rng = Lcg(42);
    let mut sources = Vec::new();
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();

    for priority in 0..6u32 {
        let mut ts = 0i64;
        let mut pairs = Vec::new();
        for _ in 0..300 {
            ts += (rng.next() % 7) as i64 + 1;
            pairs.push((ts, (priority as i64) * 1_000_000 + ts));
        }
        // Ascending priority insertion lets the higher priority overwrite
        for &(ts, v) in &pairs {
            model.insert(ts, v);
        }
        sources.push(tagged(priority, &pairs));
    }

    let mut reader = PriorityMergeReader::new(sources).unwrap();
    let merged = drain(&mut reader);

    let expected: Vec<(i64, TypedValue)> = model
        .into_iter()
        .map(|(ts, v)| (ts, TypedValue::Int64(v)))
        .collect();
    assert_eq!(merged, expected);
    assert!(merged.windows(2).all(|w| w[0].0 < w[1].0));
}

// =============================================================================
// Edge Case Tests
// =============================================================================

#[test]
fn test_empty_source_list_rejected() {
    let result = PriorityMergeReader::new(Vec::new());
    assert!(matches!(result, Err(TsError::InvalidArgument(_))));
}

#[test]
fn test_all_sources_empty() {
    let mut reader = PriorityMergeReader::new(vec![source(1, &[]), source(2, &[])]).unwrap();

    assert!(!reader.has_next());
    assert_eq!(reader.next_pair().unwrap(), None);
    assert_eq!(reader.next_pair().unwrap(), None);
}

#[test]
fn test_peek_timestamp() {
    let mut reader = PriorityMergeReader::new(vec![source(1, &[5, 6]), source(2, &[3])]).unwrap();

    assert_eq!(reader.source_count(), 2);
    assert_eq!(reader.peek_timestamp(), Some(3));
    reader.next_pair().unwrap();
    assert_eq!(reader.peek_timestamp(), Some(5));
}

#[test]
fn test_skip_current() {
    let mut reader = PriorityMergeReader::new(vec![source(1, &[1, 2, 3])]).unwrap();

    reader.skip_current().unwrap();
    assert_eq!(reader.next_pair().unwrap().map(|p| p.timestamp), Some(2));
}

#[test]
fn test_close_ends_sequence() {
    let mut reader = PriorityMergeReader::new(vec![source(1, &[1, 2, 3])]).unwrap();

    reader.next_pair().unwrap();
    reader.close().unwrap();

    assert_eq!(reader.next_pair().unwrap(), None);
}
