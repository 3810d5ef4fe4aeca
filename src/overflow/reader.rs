//! Recency-ordered operation reader

use super::operation::OverflowOperation;

/// Operations of one series, most recent first
#[derive(Debug, Clone, Default)]
pub struct OverflowOperationReader {
    operations: Vec<OverflowOperation>,
    index: usize,
}

impl OverflowOperationReader {
    /// Wrap operations already ordered most recent first
    pub fn new(operations: Vec<OverflowOperation>) -> Self {
        Self {
            operations,
            index: 0,
        }
    }

    /// Build from in-memory operations and update files.
    ///
    /// Both inputs are in write order (oldest first): `memory` holds the
    /// operations not yet flushed, `files` one list per update file.
    pub fn from_sources(memory: Vec<OverflowOperation>, files: Vec<Vec<OverflowOperation>>) -> Self {
        let mut operations: Vec<OverflowOperation> = memory.into_iter().rev().collect();
        for file in files.into_iter().rev() {
            operations.extend(file.into_iter().rev());
        }
        Self::new(operations)
    }

    pub fn has_next(&self) -> bool {
        self.index < self.operations.len()
    }

    /// Next operation in recency order
    pub fn next(&mut self) -> Option<&OverflowOperation> {
        let op = self.operations.get(self.index)?;
        self.index += 1;
        Some(op)
    }

    /// Operation most recently returned by `next`
    pub fn current(&self) -> Option<&OverflowOperation> {
        self.index.checked_sub(1).and_then(|i| self.operations.get(i))
    }

    /// Most recent operation covering `timestamp`
    pub fn covering(&self, timestamp: i64) -> Option<&OverflowOperation> {
        self.operations.iter().find(|op| op.contains(timestamp))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn close(&mut self) {
        self.operations.clear();
        self.index = 0;
    }
}
