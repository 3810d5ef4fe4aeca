//! Snapshot reader over in-memory points

use crate::error::Result;
use crate::series::{SeriesReader, SeriesReaderByTimestamp, TimeValuePair, TypedValue};

/// Reader over an owned, ascending vector of pairs
#[derive(Debug, Default)]
pub struct MemSeriesReader {
    pairs: Vec<TimeValuePair>,
    position: usize,
}

impl MemSeriesReader {
    /// Build from pairs already in ascending timestamp order
    pub fn from_sorted(pairs: Vec<TimeValuePair>) -> Self {
        debug_assert!(pairs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { pairs, position: 0 }
    }

    /// Build from arbitrary pairs; later duplicates of a timestamp win
    pub fn from_unsorted(mut pairs: Vec<TimeValuePair>) -> Self {
        pairs.reverse();
        pairs.sort_by_key(|p| p.timestamp);
        pairs.dedup_by_key(|p| p.timestamp);
        Self::from_sorted(pairs)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Pairs not yet consumed
    pub fn remaining(&self) -> usize {
        self.pairs.len() - self.position
    }
}

impl SeriesReader for MemSeriesReader {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        match self.pairs.get(self.position) {
            Some(pair) => {
                self.position += 1;
                Ok(Some(pair.clone()))
            }
            None => Ok(None),
        }
    }

    fn skip_current(&mut self) -> Result<()> {
        if self.position < self.pairs.len() {
            self.position += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.position = self.pairs.len();
        Ok(())
    }
}

impl SeriesReaderByTimestamp for MemSeriesReader {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        let rest = &self.pairs[self.position..];
        self.position += rest.partition_point(|p| p.timestamp < timestamp);

        match self.pairs.get(self.position) {
            Some(pair) if pair.timestamp == timestamp => {
                self.position += 1;
                Ok(Some(pair.value.clone()))
            }
            _ => Ok(None),
        }
    }
}
