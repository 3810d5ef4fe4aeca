//! WAL Reader
//!
//! Reads checksummed frames back from a log (or overflow update) file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Result, TsError};

use super::record::{checksum, FRAME_HEADER_SIZE};

/// Sequential frame reader.
///
/// A `ChecksumMismatch` consumes the whole bad frame, so reading may go on
/// with the next one. A `TruncatedRecord` means the tail of the input is
/// incomplete and nothing more can be read.
pub struct RecordReader<R> {
    reader: R,
    /// Byte offset of the next frame
    offset: u64,
}

impl RecordReader<BufReader<File>> {
    /// Open a file for reading
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next verified payload, `None` at a clean end of input
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let read = read_full(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < FRAME_HEADER_SIZE {
            return Err(TsError::TruncatedRecord(format!(
                "header at offset {} has {} of {} bytes",
                self.offset, read, FRAME_HEADER_SIZE
            )));
        }

        let mut len = [0u8; 4];
        let mut crc = [0u8; 8];
        len.copy_from_slice(&header[0..4]);
        crc.copy_from_slice(&header[4..12]);
        let len = u32::from_be_bytes(len) as u64;
        let expected = u64::from_be_bytes(crc);

        // Bounded by `take` so a corrupt length cannot force a huge allocation
        let mut payload = Vec::new();
        (&mut self.reader).take(len).read_to_end(&mut payload)?;
        if (payload.len() as u64) < len {
            return Err(TsError::TruncatedRecord(format!(
                "payload at offset {} has {} of {} bytes",
                self.offset,
                payload.len(),
                len
            )));
        }

        self.offset += FRAME_HEADER_SIZE as u64 + len;

        let actual = checksum(&payload);
        if actual != expected {
            return Err(TsError::ChecksumMismatch { expected, actual });
        }
        Ok(Some(payload))
    }
}

/// Read until `buf` is full or EOF; returns the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

