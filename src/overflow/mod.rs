//! Overflow Module
//!
//! Out-of-order data: inserts older than what was already flushed, and
//! update/delete operations over time intervals.
//!
//! ## Responsibilities
//! - Validate and order operations by recency
//! - Apply operations on top of a merged insert stream
//! - Hold unflushed overflow data and persist operations to update files

mod file;
mod operation;
mod reader;
mod series_reader;
mod support;

pub use file::{read_update_file, write_update_file, OverflowRecord};
pub use operation::{OverflowOpKind, OverflowOperation};
pub use reader::OverflowOperationReader;
pub use series_reader::SeriesWithOverflowOpReader;
pub use support::OverflowSupport;
