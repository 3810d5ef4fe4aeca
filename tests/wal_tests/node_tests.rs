//! Tests for ExclusiveWriteLogNode
//!
//! These tests verify:
//! - Records reach the file only on sync (threshold or forced)
//! - Every record carries the CRC32 of its payload
//! - Rotation around a storage flush
//! - Oversized plans are rejected and not buffered
//! - Delete and close semantics
//! - Concurrent writers never interleave frames
//! - Node names cannot leave the WAL directory

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;
use tsmerge::config::Config;
use tsmerge::series::{SeriesPath, TypedValue};
use tsmerge::wal::{
    checksum, ExclusiveWriteLogNode, FlushStatus, PhysicalPlan, RecordReader, WriteLogNode,
    FRAME_HEADER_SIZE,
};
use tsmerge::TsError;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_node(threshold: usize) -> (TempDir, PathBuf, ExclusiveWriteLogNode) {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .flush_wal_threshold(threshold)
        .build();
    let node = ExclusiveWriteLogNode::open("root.d1", &wal_dir, &config).unwrap();
    (temp_dir, wal_dir, node)
}

fn plan(i: i64) -> PhysicalPlan {
    PhysicalPlan::insert(
        "root.d1",
        i,
        vec!["s1".to_string()],
        vec![TypedValue::Int64(i * 10)],
    )
}

/// Count records in a file, checking each checksum by hand
fn count_records(path: &Path) -> usize {
    let bytes = fs::read(path).unwrap();
    let mut offset = 0;
    let mut count = 0;
    while offset < bytes.len() {
        let len = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
        let crc = u64::from_be_bytes(bytes[offset + 4..offset + 12].try_into().unwrap());
        let payload = &bytes[offset + FRAME_HEADER_SIZE..offset + FRAME_HEADER_SIZE + len];
        assert_eq!(crc, checksum(payload));
        offset += FRAME_HEADER_SIZE + len;
        count += 1;
    }
    count
}

// =============================================================================
// Write / Sync Tests
// =============================================================================

#[test]
fn test_open_creates_directory_but_no_file() {
    let (_temp, wal_dir, node) = setup_node(10);

    assert!(wal_dir.join("root.d1").is_dir());
    assert!(!node.wal_path().exists());
    assert_eq!(node.identifier(), "root.d1");
    assert_eq!(node.log_directory(), wal_dir.join("root.d1"));
}

#[test]
fn test_force_sync_writes_all_records() {
    let (_temp, _wal_dir, node) = setup_node(1000);

    for i in 0..25 {
        node.write(&plan(i)).unwrap();
    }
    assert_eq!(node.buffered_records(), 25);

    node.force_sync().unwrap();

    assert_eq!(node.buffered_records(), 0);
    assert_eq!(count_records(&node.wal_path()), 25);

    let mut reader = RecordReader::open(&node.wal_path()).unwrap();
    let first = reader.next_record().unwrap().unwrap();
    assert_eq!(PhysicalPlan::decode(&first).unwrap(), plan(0));
}

#[test]
fn test_threshold_triggers_sync() {
    let (_temp, _wal_dir, node) = setup_node(3);

    node.write(&plan(1)).unwrap();
    node.write(&plan(2)).unwrap();
    assert!(!node.wal_path().exists());

    node.write(&plan(3)).unwrap();
    assert!(node.wal_path().exists());
    assert_eq!(count_records(&node.wal_path()), 3);
    assert_eq!(node.buffered_records(), 0);
}

#[test]
fn test_force_sync_with_empty_buffer_is_noop() {
    let (_temp, _wal_dir, node) = setup_node(10);

    node.force_sync().unwrap();
    assert!(!node.wal_path().exists());
}

#[test]
fn test_oversized_plan_rejected() {
    let (_temp, _wal_dir, node) = setup_node(10);
    let huge = PhysicalPlan::insert(
        "root.d1",
        1,
        vec!["s1".to_string()],
        vec![TypedValue::Text("x".repeat(4 * 1024 * 1024))],
    );

    let err = node.write(&huge).unwrap_err();
    assert!(matches!(err, TsError::OversizedRecord { .. }));
    assert_eq!(node.buffered_records(), 0);

    node.write(&plan(1)).unwrap();
    assert_eq!(node.buffered_records(), 1);
}

// =============================================================================
// Flush Rotation Tests
// =============================================================================

#[test]
fn test_flush_rotation() {
    let (_temp, _wal_dir, node) = setup_node(100);
    for i in 0..5 {
        node.write(&plan(i)).unwrap();
    }

    node.notify_start_flush().unwrap();
    let old = node.old_wal_path();
    assert!(old.exists());
    assert!(fs::metadata(&old).unwrap().len() > 0);
    assert_eq!(count_records(&old), 5);

    node.notify_end_flush(FlushStatus::Succeeded).unwrap();
    assert!(!old.exists());
    assert!(node.wal_path().exists());
    assert_eq!(fs::metadata(node.wal_path()).unwrap().len(), 0);
}

#[test]
fn test_writes_after_rotation_go_to_new_file() {
    let (_temp, _wal_dir, node) = setup_node(100);
    node.write(&plan(1)).unwrap();
    node.notify_start_flush().unwrap();

    node.write(&plan(2)).unwrap();
    node.force_sync().unwrap();

    assert_eq!(count_records(&node.old_wal_path()), 1);
    assert_eq!(count_records(&node.wal_path()), 1);
}

#[test]
fn test_failed_flush_keeps_old_log() {
    let (_temp, _wal_dir, node) = setup_node(100);
    node.write(&plan(1)).unwrap();
    node.notify_start_flush().unwrap();
    node.notify_end_flush(FlushStatus::Failed).unwrap();
    assert!(node.old_wal_path().exists());

    // The next rotation appends to the retained wal-old
    node.write(&plan(2)).unwrap();
    node.notify_start_flush().unwrap();
    assert_eq!(count_records(&node.old_wal_path()), 2);

    let (plans, result) = node.recover().unwrap();
    assert_eq!(plans, vec![plan(1), plan(2)]);
    assert_eq!(result.entries_recovered, 2);
}

#[test]
fn test_recover_reads_old_then_live() {
    let (_temp, _wal_dir, node) = setup_node(100);
    node.write(&plan(1)).unwrap();
    node.write(&plan(2)).unwrap();
    node.notify_start_flush().unwrap();
    node.write(&plan(3)).unwrap();
    node.force_sync().unwrap();

    let (plans, result) = node.recover().unwrap();
    assert_eq!(plans, vec![plan(1), plan(2), plan(3)]);
    assert_eq!(result.entries_corrupted, 0);
}

// =============================================================================
// Delete / Close Tests
// =============================================================================

#[test]
fn test_delete_removes_directory() {
    let (_temp, _wal_dir, node) = setup_node(1);
    node.write(&plan(1)).unwrap();
    assert!(node.log_directory().exists());

    node.delete().unwrap();

    assert!(!node.log_directory().exists());
    assert!(matches!(node.write(&plan(2)), Err(TsError::NodeClosed(_))));
}

#[test]
fn test_close_syncs_and_rejects_writes() {
    let (_temp, _wal_dir, node) = setup_node(100);
    node.write(&plan(1)).unwrap();

    node.close().unwrap();

    assert_eq!(count_records(&node.wal_path()), 1);
    assert!(matches!(node.write(&plan(2)), Err(TsError::NodeClosed(_))));
    assert!(matches!(node.force_sync(), Err(TsError::NodeClosed(_))));
    // Closing again is harmless
    node.close().unwrap();
}

#[test]
fn test_plans_for_other_series_share_node() {
    let (_temp, _wal_dir, node) = setup_node(100);
    node.write(&PhysicalPlan::Delete {
        path: SeriesPath::new("root.d1", "s2"),
        delete_time: 5,
    })
    .unwrap();
    node.force_sync().unwrap();

    assert_eq!(count_records(&node.wal_path()), 1);
}

#[test]
fn test_open_rejects_escaping_identifier() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    let config = Config::builder().data_dir(temp_dir.path()).build();

    for identifier in ["../evil", "root/evil", "root..evil", ""] {
        let result = ExclusiveWriteLogNode::open(identifier, &wal_dir, &config);
        assert!(matches!(result, Err(TsError::InvalidArgument(_))), "{:?}", identifier);
    }
    assert!(!temp_dir.path().join("evil").exists());
    assert!(!wal_dir.exists());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    const THREADS: i64 = 8;
    const PLANS: i64 = 50;

    let (_temp, _wal_dir, node) = setup_node(3);
    let node = Arc::new(node);
    let mut handles = vec![];

    for t in 0..THREADS {
        let node = Arc::clone(&node);
        handles.push(thread::spawn(move || {
            for i in 0..PLANS {
                node.write(&plan(t * 1000 + i)).unwrap();
                if i % 7 == 0 {
                    node.force_sync().unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    node.force_sync().unwrap();

    let (plans, result) = node.recover().unwrap();
    assert_eq!(result.entries_recovered, (THREADS * PLANS) as u64);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(count_records(&node.wal_path()), (THREADS * PLANS) as usize);

    let mut per_thread: HashMap<i64, Vec<i64>> = HashMap::new();
    for plan in plans {
        match plan {
            PhysicalPlan::Insert { time, .. } => per_thread.entry(time / 1000).or_default().push(time % 1000),
            other => panic!("unexpected plan {:?}", other),
        }
    }
    assert_eq!(per_thread.len(), THREADS as usize);
    for times in per_thread.values() {
        assert_eq!(*times, (0..PLANS).collect::<Vec<_>>());
    }
}
