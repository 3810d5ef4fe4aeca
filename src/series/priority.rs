//! Prioritized readers
//!
//! A higher priority means more recently written data, which wins when two
//! sources report the same timestamp.

use std::fmt;

use crate::error::Result;

use super::{SeriesReader, SeriesReaderByTimestamp, TimeValuePair, TypedValue};

/// Rank of a source; higher wins on timestamp collision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A reader paired with its priority. Owns the reader exclusively.
pub struct PrioritySeriesReader {
    reader: Box<dyn SeriesReader>,
    priority: Priority,
}

impl PrioritySeriesReader {
    pub fn new(reader: Box<dyn SeriesReader>, priority: Priority) -> Self {
        Self { reader, priority }
    }

    /// Convenience for wrapping a concrete reader
    pub fn from_reader<R: SeriesReader + 'static>(reader: R, priority: Priority) -> Self {
        Self::new(Box::new(reader), priority)
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl SeriesReader for PrioritySeriesReader {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        self.reader.next_pair()
    }

    fn skip_current(&mut self) -> Result<()> {
        self.reader.skip_current()
    }

    fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}

impl fmt::Debug for PrioritySeriesReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrioritySeriesReader")
            .field("priority", &self.priority)
            .finish()
    }
}

/// A point-lookup reader paired with its priority
pub struct PrioritySeriesReaderByTimestamp {
    reader: Box<dyn SeriesReaderByTimestamp>,
    priority: Priority,
}

impl PrioritySeriesReaderByTimestamp {
    pub fn new(reader: Box<dyn SeriesReaderByTimestamp>, priority: Priority) -> Self {
        Self { reader, priority }
    }

    pub fn from_reader<R: SeriesReaderByTimestamp + 'static>(reader: R, priority: Priority) -> Self {
        Self::new(Box::new(reader), priority)
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl SeriesReader for PrioritySeriesReaderByTimestamp {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        self.reader.next_pair()
    }

    fn skip_current(&mut self) -> Result<()> {
        self.reader.skip_current()
    }

    fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}

impl SeriesReaderByTimestamp for PrioritySeriesReaderByTimestamp {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        self.reader.value_at(timestamp)
    }
}
