//! Insert stream with update/delete operations applied

use tracing::trace;

use crate::error::Result;
use crate::series::{SeriesReader, SeriesReaderByTimestamp, TimeValuePair, TypedValue};

use super::operation::OverflowOpKind;
use super::reader::OverflowOperationReader;

/// Applies overflow operations on top of an insert reader.
///
/// For each pair the most recent operation covering its timestamp decides:
/// an update replaces the value, a delete drops the pair. Pairs outside
/// every interval pass through.
pub struct SeriesWithOverflowOpReader<R> {
    inner: R,
    operations: OverflowOperationReader,
}

impl<R: SeriesReader> SeriesWithOverflowOpReader<R> {
    pub fn new(inner: R, operations: OverflowOperationReader) -> Self {
        Self { inner, operations }
    }

    pub fn operations(&self) -> &OverflowOperationReader {
        &self.operations
    }
}

impl<R: SeriesReader> SeriesReader for SeriesWithOverflowOpReader<R> {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        while let Some(pair) = self.inner.next_pair()? {
            let op = match self.operations.covering(pair.timestamp) {
                Some(op) => op,
                None => return Ok(Some(pair)),
            };
            let timestamp = pair.timestamp;
            match op.apply(pair) {
                Some(updated) => return Ok(Some(updated)),
                None => trace!(timestamp, "pair deleted by overflow operation"),
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<()> {
        self.operations.close();
        self.inner.close()
    }
}

impl<R: SeriesReaderByTimestamp> SeriesReaderByTimestamp for SeriesWithOverflowOpReader<R> {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        let value = match self.inner.value_at(timestamp)? {
            Some(value) => value,
            None => return Ok(None),
        };
        match self.operations.covering(timestamp) {
            None => Ok(Some(value)),
            Some(op) => match op.kind() {
                OverflowOpKind::Delete => Ok(None),
                OverflowOpKind::Update => Ok(Some(op.value().cloned().unwrap_or(value))),
            },
        }
    }
}
