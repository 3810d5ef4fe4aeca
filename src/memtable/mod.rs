//! MemTable Module
//!
//! In-memory data structure for recent points of one series.
//!
//! ## Responsibilities
//! - Fast inserts and point reads in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered snapshots that feed the merge readers
//!
//! ## Data Structure Choice
//! BTreeMap keyed by timestamp, wrapped in RwLock:
//! - Ordered timestamps (required for sealed files and merging)
//! - A later insert at the same timestamp replaces the earlier one

mod reader;
mod table;

pub use reader::MemSeriesReader;
pub use table::MemTable;
