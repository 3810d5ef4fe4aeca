//! # tsmerge
//!
//! Read-merge and durability core of a time-series storage engine:
//! - Priority merge of sequential, overflow and in-memory sources
//! - External sort when a series has more sources than the fan-in limit
//! - Overflow update/delete operations over the data written before them
//! - Checksummed write-ahead log per device with replay-based recovery
//!
//! ## Architecture Overview
//!
//! ```text
//!        execute(plan)                          query(series)
//!             │                                       │
//! ┌───────────▼───────────┐          ┌────────────────▼────────────────┐
//! │   WriteLogNodeManager │          │  sources (priority low → high)  │
//! │   (one node / device) │          │  seq files · overflow files     │
//! └───────────┬───────────┘          │    (each + later update/delete) │
//!             │                      │  overflow memtable · memtable   │
//!     ┌───────┴────────┐             └────────────────┬────────────────┘
//!     ▼                ▼                              │ > fan-in
//! ┌──────────┐  ┌─────────────┐              ┌────────▼────────┐
//! │ MemTable │  │  Overflow   │              │  ExternalSort   │
//! │ (in order│  │ (late points│              │  (spill files)  │
//! │  points) │  │  + ops)     │              └────────┬────────┘
//! └────┬─────┘  └──────┬──────┘                       ▼
//!      │ flush         │ flush               ┌─────────────────┐
//!      ▼               ▼                     │ PriorityMerge   │
//! ┌──────────────────────────┐               └─────────────────┘
//! │     SeriesFileStore      │
//! │ (sealed series files)    │
//! └──────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod series;
pub mod merge;
pub mod externalsort;
pub mod overflow;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod engine;
pub mod flush;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use engine::Engine;
pub use error::{Result, TsError};
pub use flush::ForceFlushPolicy;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of tsmerge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
