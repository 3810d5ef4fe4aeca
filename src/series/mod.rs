//! Series Module
//!
//! Values, pairs, series paths and the reader interfaces every source
//! implements.
//!
//! ## Responsibilities
//! - `TimeValuePair`: the unit exchanged between readers
//! - `SeriesReader` / `SeriesReaderByTimestamp`: consumed reader interface
//! - `PrioritySeriesReader`: a reader tagged with the rank that resolves
//!   timestamp collisions

mod path;
mod priority;
mod reader;
mod value;

pub use path::{check_device, SeriesPath};
pub use priority::{Priority, PrioritySeriesReader, PrioritySeriesReaderByTimestamp};
pub use reader::{ByTimestampAdapter, Pairs, SeriesReader, SeriesReaderByTimestamp};
pub use value::{DataType, TimeValuePair, TypedValue};
