//! Series reader traits
//!
//! A `SeriesReader` is a lazy, ascending sequence of pairs for one series
//! from one source. End of data is `Ok(None)`; errors are reserved for I/O
//! and corruption.

use crate::error::Result;

use super::{TimeValuePair, TypedValue};

/// Pull-based reader over one series from one source
pub trait SeriesReader: Send {
    /// Next pair in ascending timestamp order, or `None` once exhausted
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>>;

    /// Discard the next pair
    fn skip_current(&mut self) -> Result<()> {
        self.next_pair().map(|_| ())
    }

    /// Release the underlying resources. Reading after close yields `None`.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Borrowing iterator over the remaining pairs
    fn pairs(&mut self) -> Pairs<'_, Self>
    where
        Self: Sized,
    {
        Pairs { reader: self }
    }
}

/// Reader that also answers point lookups.
///
/// `value_at` must be called with non-decreasing timestamps. It moves the
/// cursor past every pair before `timestamp` and consumes the pair at
/// `timestamp`, so a later `next_pair` continues after it.
pub trait SeriesReaderByTimestamp: SeriesReader {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>>;
}

impl<R: SeriesReader + ?Sized> SeriesReader for Box<R> {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        (**self).next_pair()
    }

    fn skip_current(&mut self) -> Result<()> {
        (**self).skip_current()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<R: SeriesReaderByTimestamp + ?Sized> SeriesReaderByTimestamp for Box<R> {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        (**self).value_at(timestamp)
    }
}

/// Iterator adapter returned by [`SeriesReader::pairs`]
pub struct Pairs<'a, R: SeriesReader> {
    reader: &'a mut R,
}

impl<R: SeriesReader> Iterator for Pairs<'_, R> {
    type Item = Result<TimeValuePair>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_pair().transpose()
    }
}

/// Adds forward-only point lookup to any sequential reader.
///
/// Keeps one pair of lookahead; pairs before a requested timestamp are
/// dropped for good.
pub struct ByTimestampAdapter<R> {
    inner: R,
    cached: Option<TimeValuePair>,
}

impl<R: SeriesReader> ByTimestampAdapter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cached: None,
        }
    }
}

impl<R: SeriesReader> SeriesReader for ByTimestampAdapter<R> {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        match self.cached.take() {
            Some(pair) => Ok(Some(pair)),
            None => self.inner.next_pair(),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.cached = None;
        self.inner.close()
    }
}

impl<R: SeriesReader> SeriesReaderByTimestamp for ByTimestampAdapter<R> {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        loop {
            let pair = match self.cached.take() {
                Some(pair) => pair,
                None => match self.inner.next_pair()? {
                    Some(pair) => pair,
                    None => return Ok(None),
                },
            };

            if pair.timestamp < timestamp {
                continue;
            }
            if pair.timestamp == timestamp {
                return Ok(Some(pair.value));
            }
            self.cached = Some(pair);
            return Ok(None);
        }
    }
}
