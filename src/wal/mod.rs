//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Log every mutation plan before it is applied
//! - CRC32 checksums for corruption detection
//! - Threshold and periodic syncing of buffered records
//! - Rotation around storage flushes and crash recovery
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ Record 1                                  │
//! │ ┌─────────┬──────────┬──────────────────┐ │
//! │ │ Len (4) │ CRC (8)  │ Payload (Len)    │ │
//! │ └─────────┴──────────┴──────────────────┘ │
//! ├───────────────────────────────────────────┤
//! │ Record 2 ...                              │
//! └───────────────────────────────────────────┘
//! ```
//! Big-endian; the payload is a bincode-encoded [`PhysicalPlan`].

mod file;
mod manager;
mod node;
mod reader;
mod record;
mod recovery;

pub use file::{append_frames, WalFile};
pub use manager::{RecoveryReport, WriteLogNodeManager};
pub use node::{ExclusiveWriteLogNode, FlushStatus, WriteLogNode, OLD_WAL_FILE_NAME, WAL_FILE_NAME};
pub use reader::RecordReader;
pub use record::{checksum, encode_frame, PhysicalPlan, FRAME_HEADER_SIZE};
pub use recovery::{RecoveryResult, WalRecovery};
