//! WAL records
//!
//! A record is a serialized [`PhysicalPlan`] wrapped in a checksummed frame.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::series::{SeriesPath, TypedValue};

/// Frame header: length (4) + crc32 widened to 8 bytes
pub const FRAME_HEADER_SIZE: usize = 12;

/// A logged mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhysicalPlan {
    /// One timestamp, several measurements of one device
    Insert {
        device: String,
        time: i64,
        measurements: Vec<String>,
        values: Vec<TypedValue>,
    },

    /// Overwrite existing points inside each `[start, end)` interval
    Update {
        path: SeriesPath,
        intervals: Vec<(i64, i64)>,
        value: TypedValue,
    },

    /// Remove every point at or before `delete_time`
    Delete { path: SeriesPath, delete_time: i64 },
}

impl PhysicalPlan {
    pub fn insert(
        device: impl Into<String>,
        time: i64,
        measurements: Vec<String>,
        values: Vec<TypedValue>,
    ) -> Self {
        PhysicalPlan::Insert {
            device: device.into(),
            time,
            measurements,
            values,
        }
    }

    /// Device the plan belongs to; it names the WAL node
    pub fn device(&self) -> &str {
        match self {
            PhysicalPlan::Insert { device, .. } => device,
            PhysicalPlan::Update { path, .. } | PhysicalPlan::Delete { path, .. } => &path.device,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// CRC32 of a payload, stored widened to 64 bits
pub fn checksum(payload: &[u8]) -> u64 {
    crc32fast::hash(payload) as u64
}

/// Append `[u32 len][u64 crc32][payload]` (big-endian) to `buf`
pub fn encode_frame(payload: &[u8], buf: &mut BytesMut) {
    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u64(checksum(payload));
    buf.put_slice(payload);
}

