//! Log file appends
//!
//! Frames reach a log file only whole: an append that fails part way is
//! cut back to the last committed length, so a retry starts on a frame
//! boundary.

use std::fs::File;
use std::io::{self, Write};

use tracing::warn;

/// File a write log node appends frames to
pub trait WalFile: Write {
    /// Current length in bytes
    fn size(&self) -> io::Result<u64>;

    /// Cut the file to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Make appended bytes durable
    fn sync(&mut self) -> io::Result<()>;
}

impl WalFile for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Append `frames` after the first `committed` bytes and sync.
///
/// Bytes past `committed` (left by an earlier failed append) are dropped
/// first. On failure the file is cut back to `committed` again. Returns the
/// new committed length.
pub fn append_frames<F: WalFile + ?Sized>(file: &mut F, committed: u64, frames: &[u8]) -> io::Result<u64> {
    if file.size()? != committed {
        file.truncate(committed)?;
    }

    match file.write_all(frames).and_then(|_| file.flush()).and_then(|_| file.sync()) {
        Ok(()) => Ok(committed + frames.len() as u64),
        Err(e) => {
            if let Err(cut) = file.truncate(committed) {
                warn!(committed, error = %cut, "failed to cut back a partial WAL append");
            }
            Err(e)
        }
    }
}
