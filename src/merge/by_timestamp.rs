//! Point-lookup priority merge
//!
//! Answers "what is the value at `t`" across prioritized sources, each
//! advanced with a forward-only cursor.

use crate::error::{Result, TsError};
use crate::series::{
    PrioritySeriesReaderByTimestamp, SeriesReader, SeriesReaderByTimestamp, TimeValuePair,
    TypedValue,
};

/// Priority merge over point-lookup sources.
///
/// `value_at` must be called with non-decreasing timestamps; earlier
/// timestamps after a later one give undefined results. `next_pair`
/// continues the merged sequence after the last looked-up timestamp.
pub struct PriorityMergeReaderByTimestamp {
    /// Sources ordered from highest to lowest priority
    sources: Vec<PrioritySeriesReaderByTimestamp>,
    /// Per-source lookahead used by sequential reads, indexed like `sources`
    slots: Vec<Option<TimeValuePair>>,
}

impl PriorityMergeReaderByTimestamp {
    pub fn new(sources: Vec<PrioritySeriesReaderByTimestamp>) -> Result<Self> {
        if sources.is_empty() {
            return Err(TsError::InvalidArgument(
                "priority merge needs at least one source".to_string(),
            ));
        }

        // Highest priority first; among equals the later registration first
        let mut indexed: Vec<(usize, PrioritySeriesReaderByTimestamp)> =
            sources.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| b.priority().cmp(&a.priority()).then(ib.cmp(ia)));
        let sources: Vec<_> = indexed.into_iter().map(|(_, source)| source).collect();

        Ok(Self {
            slots: (0..sources.len()).map(|_| None).collect(),
            sources,
        })
    }
}

impl SeriesReaderByTimestamp for PriorityMergeReaderByTimestamp {
    fn value_at(&mut self, timestamp: i64) -> Result<Option<TypedValue>> {
        let mut result = None;

        for (source, slot) in self.sources.iter_mut().zip(self.slots.iter_mut()) {
            let found = match slot.take() {
                Some(pair) if pair.timestamp > timestamp => {
                    *slot = Some(pair);
                    None
                }
                Some(pair) if pair.timestamp == timestamp => Some(pair.value),
                // Empty or already behind: ask the source itself
                _ => source.value_at(timestamp)?,
            };

            // Every cursor advances, the first (highest priority) hit wins
            if result.is_none() {
                result = found;
            }
        }

        Ok(result)
    }
}

impl SeriesReader for PriorityMergeReaderByTimestamp {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        for (source, slot) in self.sources.iter_mut().zip(self.slots.iter_mut()) {
            if slot.is_none() {
                *slot = source.next_pair()?;
            }
        }

        let mut best: Option<(usize, i64)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(pair) = slot {
                match best {
                    Some((_, ts)) if pair.timestamp >= ts => {}
                    _ => best = Some((index, pair.timestamp)),
                }
            }
        }

        let (winner, timestamp) = match best {
            Some(best) => best,
            None => return Ok(None),
        };

        let pair = self.slots[winner].take();
        for slot in self.slots.iter_mut() {
            if slot.as_ref().map_or(false, |p| p.timestamp == timestamp) {
                *slot = None;
            }
        }
        Ok(pair)
    }

    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (source, slot) in self.sources.iter_mut().zip(self.slots.iter_mut()) {
            *slot = None;
            if let Err(e) = source.close() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
