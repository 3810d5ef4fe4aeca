//! Overflow update files
//!
//! Persisted update/delete operations, one checksummed frame per operation
//! in the WAL frame layout, payload bincode-encoded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TsError};
use crate::series::SeriesPath;
use crate::wal::{encode_frame, RecordReader};

use super::operation::OverflowOperation;

/// One persisted operation and the series it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowRecord {
    pub path: SeriesPath,
    pub operation: OverflowOperation,
    /// The operation covers sealed files with an id below this one
    pub watermark: u64,
}

impl OverflowRecord {
    /// Whether the operation was written after the sealed file `file_id`
    pub fn covers_file(&self, file_id: u64) -> bool {
        file_id < self.watermark
    }
}

/// Write records, in order, to a new update file
pub fn write_update_file(path: &Path, records: &[OverflowRecord]) -> Result<()> {
    let mut buf = BytesMut::new();
    for record in records {
        let payload = bincode::serialize(record)?;
        encode_frame(&payload, &mut buf);
    }

    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)?;
    file.write_all(&buf)?;
    file.sync_all()?;

    debug!(path = %path.display(), records = records.len(), "overflow update file written");
    Ok(())
}

/// Read every intact record back, in write order.
///
/// Damaged records are skipped and a partial tail ends the file, as in WAL
/// recovery.
pub fn read_update_file(path: &Path) -> Result<Vec<OverflowRecord>> {
    let mut reader = RecordReader::open(path)?;
    let mut records = Vec::new();

    loop {
        match reader.next_record() {
            Ok(Some(payload)) => {
                let record = bincode::deserialize::<OverflowRecord>(&payload)
                    .map_err(TsError::from)
                    .and_then(|record| record.operation.validate().map(|_| record));
                match record {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping bad overflow record")
                    }
                }
            }
            Ok(None) => break,
            Err(TsError::ChecksumMismatch { expected, actual }) => {
                warn!(path = %path.display(), expected, actual, "skipping overflow record with bad checksum");
            }
            Err(TsError::TruncatedRecord(detail)) => {
                warn!(path = %path.display(), %detail, "overflow update file ends with a partial record");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}
