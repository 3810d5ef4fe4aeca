//! Merge Module
//!
//! Priority-based merging of several sources of one series.
//!
//! ## Responsibilities
//! - Produce a single ascending sequence with no duplicate timestamps
//! - Resolve collisions in favour of the highest-priority source
//! - Point lookups across sources with forward-only cursors

mod by_timestamp;
mod priority;

pub use by_timestamp::PriorityMergeReaderByTimestamp;
pub use priority::PriorityMergeReader;
