//! WAL Recovery
//!
//! Replays a log file into plans, tolerating damage:
//! - a record whose checksum does not match is skipped
//! - a record whose payload does not decode is skipped
//! - a record cut short by EOF ends the file (partial last write)

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Result, TsError};

use super::reader::RecordReader;
use super::record::PhysicalPlan;

/// Handles WAL recovery after a crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of plans successfully recovered
    pub entries_recovered: u64,

    /// Number of damaged or undecodable records skipped
    pub entries_corrupted: u64,

    /// Whether the file ended inside a record (partial write dropped)
    pub was_truncated: bool,
}

impl RecoveryResult {
    /// Fold another file's result into this one
    pub fn absorb(&mut self, other: &RecoveryResult) {
        self.entries_recovered += other.entries_recovered;
        self.entries_corrupted += other.entries_corrupted;
        self.was_truncated |= other.was_truncated;
    }
}

impl WalRecovery {
    /// Recover plans from a WAL file, in file order.
    ///
    /// A missing file recovers nothing.
    pub fn recover(path: &Path) -> Result<(Vec<PhysicalPlan>, RecoveryResult)> {
        let mut plans = Vec::new();
        let result = Self::scan(path, |plan| plans.push(plan))?;
        Ok((plans, result))
    }

    /// Verify integrity of a WAL file without keeping the plans
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| {})
    }

    fn scan(path: &Path, mut on_plan: impl FnMut(PhysicalPlan)) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        if !path.exists() {
            return Ok(result);
        }

        let mut reader = RecordReader::open(path)?;
        loop {
            let offset = reader.offset();
            match reader.next_record() {
                Ok(Some(payload)) => match PhysicalPlan::decode(&payload) {
                    Ok(plan) => {
                        on_plan(plan);
                        result.entries_recovered += 1;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), offset, error = %e, "skipping undecodable WAL record");
                        result.entries_corrupted += 1;
                    }
                },
                Ok(None) => break,
                Err(TsError::ChecksumMismatch { expected, actual }) => {
                    warn!(
                        path = %path.display(),
                        offset,
                        expected,
                        actual,
                        "skipping WAL record with bad checksum"
                    );
                    result.entries_corrupted += 1;
                }
                Err(TsError::TruncatedRecord(detail)) => {
                    warn!(path = %path.display(), %detail, "WAL ends with a partial record");
                    result.was_truncated = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            path = %path.display(),
            recovered = result.entries_recovered,
            corrupted = result.entries_corrupted,
            truncated = result.was_truncated,
            "WAL file scanned"
        );
        Ok(result)
    }
}
