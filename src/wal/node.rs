//! Write log nodes
//!
//! A node owns the log of one device: a directory holding the live `wal`
//! file and, while a storage flush is in progress, the rotated `wal-old`.
//!
//! ## Lifecycle
//! ```text
//! write ──► buffer ──(threshold / force_sync / auto-sync)──► wal
//!                                                              │
//!         notify_start_flush:  wal ──rename/append──► wal-old ◄┘
//!         notify_end_flush(Succeeded): wal-old removed
//!         notify_end_flush(Failed):    wal-old kept for recovery
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, TsError};
use crate::series::check_device;

use super::file::append_frames;
use super::record::{encode_frame, PhysicalPlan};
use super::recovery::{RecoveryResult, WalRecovery};

/// Live log file name inside a node directory
pub const WAL_FILE_NAME: &str = "wal";

/// Rotated log file name, present during a storage flush
pub const OLD_WAL_FILE_NAME: &str = "wal-old";

/// Outcome of the storage flush a rotation was made for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Succeeded,
    Failed,
}

/// Write-ahead log of one device
pub trait WriteLogNode: Send + Sync {
    /// Log a plan; durable only after the next sync
    fn write(&self, plan: &PhysicalPlan) -> Result<()>;

    /// Write buffered records to the live file and fsync it
    fn force_sync(&self) -> Result<()>;

    /// Rotate the live log to `wal-old` before a storage flush
    fn notify_start_flush(&self) -> Result<()>;

    /// Finish a rotation; `wal-old` is dropped only if the flush succeeded
    fn notify_end_flush(&self, status: FlushStatus) -> Result<()>;

    /// Remove the node directory and everything in it
    fn delete(&self) -> Result<()>;

    /// Sync and release the file handle
    fn close(&self) -> Result<()>;

    /// Replay `wal-old` then `wal`
    fn recover(&self) -> Result<(Vec<PhysicalPlan>, RecoveryResult)>;

    fn identifier(&self) -> &str;

    fn log_directory(&self) -> &Path;
}

struct NodeState {
    /// Encoded frames not yet written to the file
    buffer: BytesMut,
    /// Number of frames in `buffer`
    buffered: usize,
    /// Live file, opened on first sync
    file: Option<File>,
    /// Length of the live file holding only whole, synced frames
    committed: u64,
    closed: bool,
}

/// Log node guarded by a single mutex.
///
/// ## Concurrency:
/// - Every mutation (write, sync, rotation, delete) holds `state`
/// - The background auto-sync calls `force_sync` through the same lock
pub struct ExclusiveWriteLogNode {
    identifier: String,
    log_directory: PathBuf,
    flush_threshold: usize,
    max_record_size: usize,
    state: Mutex<NodeState>,
}

impl ExclusiveWriteLogNode {
    /// Create the node and its directory under `wal_dir`
    pub fn open(identifier: &str, wal_dir: &Path, config: &Config) -> Result<Self> {
        check_device(identifier)?;
        let log_directory = wal_dir.join(identifier);
        fs::create_dir_all(&log_directory)?;
        debug!(node = identifier, dir = %log_directory.display(), "write log node opened");

        Ok(Self {
            identifier: identifier.to_string(),
            log_directory,
            flush_threshold: config.flush_wal_threshold.max(1),
            max_record_size: config.max_wal_record_size,
            state: Mutex::new(NodeState {
                buffer: BytesMut::new(),
                buffered: 0,
                file: None,
                committed: 0,
                closed: false,
            }),
        })
    }

    /// Path of the live log file
    pub fn wal_path(&self) -> PathBuf {
        self.log_directory.join(WAL_FILE_NAME)
    }

    /// Path of the rotated log file
    pub fn old_wal_path(&self) -> PathBuf {
        self.log_directory.join(OLD_WAL_FILE_NAME)
    }

    /// Records waiting for the next sync
    pub fn buffered_records(&self) -> usize {
        self.state.lock().buffered
    }

    fn lock_open(&self) -> Result<MutexGuard<'_, NodeState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(TsError::NodeClosed(self.identifier.clone()));
        }
        Ok(state)
    }

    fn sync_locked(&self, state: &mut NodeState) -> Result<()> {
        if state.buffered == 0 {
            return Ok(());
        }

        if state.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.wal_path())?;
            state.committed = file.metadata()?.len();
            state.file = Some(file);
        }
        let NodeState {
            buffer,
            file,
            committed,
            ..
        } = &mut *state;
        if let Some(file) = file.as_mut() {
            *committed = append_frames(file, *committed, buffer)?;
        }

        debug!(
            node = %self.identifier,
            records = state.buffered,
            bytes = state.buffer.len(),
            "WAL synced"
        );
        state.buffer.clear();
        state.buffered = 0;
        Ok(())
    }

    /// Move the live file onto `wal-old`, appending if one is left over
    fn rotate(&self) -> io::Result<()> {
        let wal = self.wal_path();
        let old = self.old_wal_path();
        if !wal.exists() {
            return Ok(());
        }

        if old.exists() {
            let mut target = OpenOptions::new().append(true).open(&old)?;
            let mut source = File::open(&wal)?;
            io::copy(&mut source, &mut target)?;
            target.sync_all()?;
            fs::remove_file(&wal)?;
            warn!(node = %self.identifier, "appended WAL to a wal-old left by a failed flush");
        } else {
            fs::rename(&wal, &old)?;
        }
        Ok(())
    }
}

impl WriteLogNode for ExclusiveWriteLogNode {
    fn write(&self, plan: &PhysicalPlan) -> Result<()> {
        let payload = plan.encode()?;
        if payload.len() > self.max_record_size {
            return Err(TsError::OversizedRecord {
                size: payload.len(),
                max: self.max_record_size,
            });
        }

        let mut state = self.lock_open()?;
        encode_frame(&payload, &mut state.buffer);
        state.buffered += 1;

        if state.buffered >= self.flush_threshold {
            self.sync_locked(&mut state)?;
        }
        Ok(())
    }

    fn force_sync(&self) -> Result<()> {
        let mut state = self.lock_open()?;
        self.sync_locked(&mut state)
    }

    fn notify_start_flush(&self) -> Result<()> {
        let mut state = self.lock_open()?;
        self.sync_locked(&mut state)?;
        state.file = None;

        self.rotate()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.wal_path())?;
        state.committed = file.metadata()?.len();
        state.file = Some(file);

        info!(node = %self.identifier, "WAL rotated for flush");
        Ok(())
    }

    fn notify_end_flush(&self, status: FlushStatus) -> Result<()> {
        let _state = self.lock_open()?;
        let old = self.old_wal_path();

        match status {
            FlushStatus::Succeeded => {
                if old.exists() {
                    fs::remove_file(&old)?;
                }
                debug!(node = %self.identifier, "flush finished, wal-old removed");
            }
            FlushStatus::Failed => {
                warn!(node = %self.identifier, "flush failed, keeping wal-old for recovery");
            }
        }
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.file = None;
        state.buffer.clear();
        state.buffered = 0;
        state.closed = true;

        if self.log_directory.exists() {
            fs::remove_dir_all(&self.log_directory)?;
        }
        info!(node = %self.identifier, "write log node deleted");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        self.sync_locked(&mut state)?;
        state.file = None;
        state.closed = true;
        debug!(node = %self.identifier, "write log node closed");
        Ok(())
    }

    fn recover(&self) -> Result<(Vec<PhysicalPlan>, RecoveryResult)> {
        let _state = self.state.lock();

        let (mut plans, mut result) = WalRecovery::recover(&self.old_wal_path())?;
        let (live, live_result) = WalRecovery::recover(&self.wal_path())?;
        plans.extend(live);
        result.absorb(&live_result);

        Ok((plans, result))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn log_directory(&self) -> &Path {
        &self.log_directory
    }
}
