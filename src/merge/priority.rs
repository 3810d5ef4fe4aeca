//! Priority merge reader
//!
//! K-way merge over prioritized sources. Keeps one lookahead pair per
//! source in a min-heap keyed by `(timestamp, -priority, -source index)`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::error::{Result, TsError};
use crate::series::{Priority, PrioritySeriesReader, SeriesReader, TimeValuePair};

/// Lookahead pair of one source
#[derive(Debug)]
struct HeapEntry {
    pair: TimeValuePair,
    priority: Priority,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: the "greatest" entry is the smallest
    // timestamp, then the highest priority, then the latest registration.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .pair
            .timestamp
            .cmp(&self.pair.timestamp)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges prioritized sources into one ascending, duplicate-free sequence.
///
/// When several sources hold the same timestamp only the pair of the
/// highest-priority source is emitted. Among equal priorities the source
/// registered last wins.
pub struct PriorityMergeReader {
    /// Sources indexed by registration order
    sources: Vec<PrioritySeriesReader>,
    heap: BinaryHeap<HeapEntry>,
}

impl PriorityMergeReader {
    /// Create a merge reader over a non-empty list of sources
    pub fn new(sources: Vec<PrioritySeriesReader>) -> Result<Self> {
        if sources.is_empty() {
            return Err(TsError::InvalidArgument(
                "priority merge needs at least one source".to_string(),
            ));
        }

        let mut reader = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
        };
        for source in 0..reader.sources.len() {
            reader.refill(source)?;
        }
        Ok(reader)
    }

    /// Whether another pair will be produced
    pub fn has_next(&self) -> bool {
        !self.heap.is_empty()
    }

    /// Timestamp of the next pair, without consuming it
    pub fn peek_timestamp(&self) -> Option<i64> {
        self.heap.peek().map(|entry| entry.pair.timestamp)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Pull the next pair of one source into the heap
    fn refill(&mut self, source: usize) -> Result<()> {
        let reader = &mut self.sources[source];
        if let Some(pair) = reader.next_pair()? {
            self.heap.push(HeapEntry {
                pair,
                priority: reader.priority(),
                source,
            });
        }
        Ok(())
    }
}

impl SeriesReader for PriorityMergeReader {
    fn next_pair(&mut self) -> Result<Option<TimeValuePair>> {
        let winner = match self.heap.pop() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let timestamp = winner.pair.timestamp;
        self.refill(winner.source)?;

        // Every other source positioned on this timestamp loses
        while self
            .heap
            .peek()
            .map_or(false, |entry| entry.pair.timestamp == timestamp)
        {
            if let Some(loser) = self.heap.pop() {
                trace!(
                    timestamp,
                    winner = %winner.priority,
                    loser = %loser.priority,
                    "discarding shadowed pair"
                );
                self.refill(loser.source)?;
            }
        }

        Ok(Some(winner.pair))
    }

    fn close(&mut self) -> Result<()> {
        self.heap.clear();
        let mut first_error = None;
        for source in &mut self.sources {
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
