//! Tests for WAL records and the frame reader
//!
//! These tests verify:
//! - Frame layout (big-endian length, widened CRC32, payload)
//! - Plans survive encoding
//! - The reader skips bad checksums without losing alignment
//! - A short tail is reported as truncated

use std::io::{self, Write};

use bytes::BytesMut;
use tsmerge::series::{SeriesPath, TypedValue};
use tsmerge::wal::{
    append_frames, checksum, encode_frame, PhysicalPlan, RecordReader, WalFile, FRAME_HEADER_SIZE,
};
use tsmerge::TsError;

// =============================================================================
// Helper Functions
// =============================================================================

fn frames(payloads: &[&[u8]]) -> BytesMut {
    let mut buf = BytesMut::new();
    for payload in payloads {
        encode_frame(payload, &mut buf);
    }
    buf
}

/// In-memory log file that accepts `budget` more bytes, then fails
struct FlakyFile {
    bytes: Vec<u8>,
    budget: Option<usize>,
}

impl FlakyFile {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            budget: None,
        }
    }
}

impl Write for FlakyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.budget {
            Some(0) => return Err(io::Error::new(io::ErrorKind::Other, "no space left")),
            Some(left) => left.min(buf.len()),
            None => buf.len(),
        };
        if let Some(left) = self.budget.as_mut() {
            *left -= n;
        }
        self.bytes.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WalFile for FlakyFile {
    fn size(&self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.bytes.truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_all(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = RecordReader::new(bytes);
    let mut records = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        records.push(record);
    }
    records
}

// =============================================================================
// Frame Tests
// =============================================================================

#[test]
fn test_frame_layout_is_big_endian() {
    let buf = frames(&[b"abc"]);

    assert_eq!(buf.len(), FRAME_HEADER_SIZE + 3);
    assert_eq!(&buf[0..4], &3u32.to_be_bytes());
    assert_eq!(&buf[4..12], &checksum(b"abc").to_be_bytes());
    assert_eq!(&buf[12..], b"abc");
}

#[test]
fn test_checksum_is_crc32() {
    // CRC-32 (IEEE) check value
    assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
}

// =============================================================================
// Plan Tests
// =============================================================================

#[test]
fn test_plans_survive_encoding() {
    let plans = vec![
        PhysicalPlan::insert(
            "root.d1",
            42,
            vec!["s1".to_string(), "s2".to_string()],
            vec![TypedValue::Float(1.5), TypedValue::Text("on".to_string())],
        ),
        PhysicalPlan::Update {
            path: SeriesPath::new("root.d1", "s1"),
            intervals: vec![(0, 10), (20, 30)],
            value: TypedValue::Float(0.0),
        },
        PhysicalPlan::Delete {
            path: SeriesPath::new("root.d2", "s9"),
            delete_time: 99,
        },
    ];

    for plan in plans {
        let bytes = plan.encode().unwrap();
        assert_eq!(PhysicalPlan::decode(&bytes).unwrap(), plan);
    }
}

#[test]
fn test_plan_device() {
    let insert = PhysicalPlan::insert("root.d1", 1, vec![], vec![]);
    let delete = PhysicalPlan::Delete {
        path: SeriesPath::new("root.d2", "s1"),
        delete_time: 10,
    };

    assert_eq!(insert.device(), "root.d1");
    assert_eq!(delete.device(), "root.d2");
}

#[test]
fn test_decode_garbage_fails() {
    let result = PhysicalPlan::decode(&[0xFF; 3]);
    assert!(matches!(result, Err(TsError::Serialization(_))));
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reads_frames_in_order() {
    let buf = frames(&[b"one", b"two"]);

    let mut reader = RecordReader::new(&buf[..]);
    assert_eq!(reader.next_record().unwrap(), Some(b"one".to_vec()));
    assert_eq!(reader.offset(), (FRAME_HEADER_SIZE + 3) as u64);
    assert_eq!(reader.next_record().unwrap(), Some(b"two".to_vec()));
    assert_eq!(reader.next_record().unwrap(), None);
}

#[test]
fn test_bad_checksum_keeps_alignment() {
    let mut buf = frames(&[b"one", b"two"]);
    buf[FRAME_HEADER_SIZE] ^= 0xFF;

    let mut reader = RecordReader::new(&buf[..]);
    assert!(matches!(
        reader.next_record(),
        Err(TsError::ChecksumMismatch { .. })
    ));
    assert_eq!(reader.next_record().unwrap(), Some(b"two".to_vec()));
}

#[test]
fn test_short_payload_is_truncated() {
    let buf = frames(&[b"payload"]);

    let mut reader = RecordReader::new(&buf[..buf.len() - 2]);
    assert!(matches!(
        reader.next_record(),
        Err(TsError::TruncatedRecord(_))
    ));
}

#[test]
fn test_short_header_is_truncated() {
    let buf = frames(&[b"payload"]);

    let mut reader = RecordReader::new(&buf[..5]);
    assert!(matches!(
        reader.next_record(),
        Err(TsError::TruncatedRecord(_))
    ));
}

#[test]
fn test_huge_length_does_not_allocate() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&u32::MAX.to_be_bytes());
    buf.extend_from_slice(&0u64.to_be_bytes());
    buf.extend_from_slice(b"tiny");

    let mut reader = RecordReader::new(&buf[..]);
    assert!(matches!(
        reader.next_record(),
        Err(TsError::TruncatedRecord(_))
    ));
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_failed_append_is_cut_back() {
    let mut file = FlakyFile::new();
    let committed = append_frames(&mut file, 0, &frames(&[b"one"])).unwrap();
    assert_eq!(committed, (FRAME_HEADER_SIZE + 3) as u64);

    // Half a header gets through before the write fails
    file.budget = Some(FRAME_HEADER_SIZE / 2);
    let batch = frames(&[b"two", b"three"]);
    assert!(append_frames(&mut file, committed, &batch).is_err());
    assert_eq!(file.bytes.len() as u64, committed);

    file.budget = None;
    let committed = append_frames(&mut file, committed, &batch).unwrap();
    assert_eq!(committed, file.bytes.len() as u64);
    assert_eq!(
        read_all(&file.bytes),
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
}

#[test]
fn test_append_drops_stray_tail() {
    let mut file = FlakyFile::new();
    let committed = append_frames(&mut file, 0, &frames(&[b"one"])).unwrap();
    file.bytes.extend_from_slice(b"torn");

    append_frames(&mut file, committed, &frames(&[b"two"])).unwrap();
    assert_eq!(read_all(&file.bytes), vec![b"one".to_vec(), b"two".to_vec()]);
}
