//! MemTable implementation
//!
//! BTreeMap-based series memtable with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use crate::series::{DataType, TimeValuePair, TypedValue};

use super::MemSeriesReader;

/// In-memory table for recent points of one series
pub struct MemTable {
    inner: RwLock<Inner>,
}

struct Inner {
    /// Points ordered by timestamp
    points: BTreeMap<i64, TypedValue>,
    /// Type fixed by the first insert
    data_type: Option<DataType>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                points: BTreeMap::new(),
                data_type: None,
            }),
        }
    }

    /// Create a MemTable whose type is already known
    pub fn with_type(data_type: DataType) -> Self {
        Self {
            inner: RwLock::new(Inner {
                points: BTreeMap::new(),
                data_type: Some(data_type),
            }),
        }
    }

    /// Insert a point (write lock). Returns the new point count.
    ///
    /// The first insert fixes the data type; later values must match it.
    pub fn insert(&self, timestamp: i64, value: TypedValue) -> Result<usize> {
        let mut inner = self.inner.write();

        match inner.data_type {
            Some(expected) => value.expect_type(expected)?,
            None => inner.data_type = Some(value.data_type()),
        }

        inner.points.insert(timestamp, value);
        Ok(inner.points.len())
    }

    /// Get the value at a timestamp (read lock)
    pub fn get(&self, timestamp: i64) -> Option<TypedValue> {
        self.inner.read().points.get(&timestamp).cloned()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.inner.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().points.is_empty()
    }

    /// Check if should flush (point count >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.len() >= size_limit
    }

    pub fn min_time(&self) -> Option<i64> {
        self.inner.read().points.keys().next().copied()
    }

    pub fn max_time(&self) -> Option<i64> {
        self.inner.read().points.keys().next_back().copied()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.inner.read().data_type
    }

    /// Copy of all points in timestamp order
    pub fn to_pairs(&self) -> Vec<TimeValuePair> {
        self.inner
            .read()
            .points
            .iter()
            .map(|(ts, value)| TimeValuePair::new(*ts, value.clone()))
            .collect()
    }

    /// Point-in-time reader over the current contents
    pub fn snapshot(&self) -> MemSeriesReader {
        MemSeriesReader::from_sorted(self.to_pairs())
    }

    /// Remove points in `[start, end)`. Returns how many were removed.
    pub fn remove_range(&self, start: i64, end: i64) -> usize {
        if start >= end {
            return 0;
        }
        let mut inner = self.inner.write();
        let mut covered = inner.points.split_off(&start);
        let mut after = covered.split_off(&end);
        inner.points.append(&mut after);
        covered.len()
    }

    /// Overwrite existing points in `[start, end)`; no point is created.
    /// Returns how many were rewritten.
    pub fn update_range(&self, start: i64, end: i64, value: &TypedValue) -> Result<usize> {
        if start >= end {
            return Ok(0);
        }
        let mut inner = self.inner.write();
        if let Some(expected) = inner.data_type {
            value.expect_type(expected)?;
        }

        let mut count = 0;
        for (_, existing) in inner.points.range_mut(start..end) {
            *existing = value.clone();
            count += 1;
        }
        Ok(count)
    }

    /// Drop all points (after a successful flush). The data type is kept.
    pub fn clear(&self) {
        self.inner.write().points.clear();
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
