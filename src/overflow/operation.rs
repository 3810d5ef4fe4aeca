//! Overflow update/delete operations

use serde::{Deserialize, Serialize};

use crate::error::{Result, TsError};
use crate::memtable::MemTable;
use crate::series::{TimeValuePair, TypedValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowOpKind {
    Update,
    Delete,
}

/// An update or delete over the half-open interval `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowOperation {
    kind: OverflowOpKind,
    start: i64,
    end: i64,
    /// Replacement value, present for updates only
    value: Option<TypedValue>,
}

impl OverflowOperation {
    pub fn update(start: i64, end: i64, value: TypedValue) -> Result<Self> {
        check_interval(start, end)?;
        Ok(Self {
            kind: OverflowOpKind::Update,
            start,
            end,
            value: Some(value),
        })
    }

    pub fn delete(start: i64, end: i64) -> Result<Self> {
        check_interval(start, end)?;
        Ok(Self {
            kind: OverflowOpKind::Delete,
            start,
            end,
            value: None,
        })
    }

    /// Delete of every point at or before `delete_time`
    pub fn delete_before(delete_time: i64) -> Result<Self> {
        Self::delete(0, delete_time.saturating_add(1))
    }

    /// Re-check an operation that was decoded rather than constructed
    pub fn validate(&self) -> Result<()> {
        check_interval(self.start, self.end)?;
        match (self.kind, &self.value) {
            (OverflowOpKind::Update, None) => Err(TsError::Corruption(
                "update operation without a value".to_string(),
            )),
            (OverflowOpKind::Delete, Some(_)) => Err(TsError::Corruption(
                "delete operation with a value".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> OverflowOpKind {
        self.kind
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn value(&self) -> Option<&TypedValue> {
        self.value.as_ref()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Effect of this operation on a covered pair: the rewritten pair, or
    /// `None` when the pair is deleted
    pub fn apply(&self, pair: TimeValuePair) -> Option<TimeValuePair> {
        match (self.kind, &self.value) {
            (OverflowOpKind::Update, Some(value)) => {
                Some(TimeValuePair::new(pair.timestamp, value.clone()))
            }
            (OverflowOpKind::Update, None) => Some(pair),
            (OverflowOpKind::Delete, _) => None,
        }
    }

    /// Apply this operation to the points a memtable holds right now.
    /// Returns the number of points affected.
    pub fn apply_to(&self, table: &MemTable) -> Result<usize> {
        match (self.kind, &self.value) {
            (OverflowOpKind::Update, Some(value)) => table.update_range(self.start, self.end, value),
            (OverflowOpKind::Update, None) => Ok(0),
            (OverflowOpKind::Delete, _) => Ok(table.remove_range(self.start, self.end)),
        }
    }
}

fn check_interval(start: i64, end: i64) -> Result<()> {
    if start < 0 || start >= end {
        return Err(TsError::InvalidInterval { start, end });
    }
    Ok(())
}
