//! In-memory overflow store of one storage group

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::memtable::{MemSeriesReader, MemTable};
use crate::series::{SeriesPath, TypedValue};

use super::file::{write_update_file, OverflowRecord};
use super::operation::OverflowOperation;

/// Overflow data not yet flushed: late inserts and update/delete operations.
///
/// Every operation carries a watermark, the id the next sealed file will
/// get when it is recorded. It applies to sealed files below the watermark
/// at read time; unflushed points are rewritten when it is recorded, so
/// later inserts are never touched by it.
///
/// ## Concurrency:
/// - `operations`: device → measurement → (watermark, operation) in write order
/// - `inserts`: one overflow insert memtable per series
pub struct OverflowSupport {
    operations: RwLock<HashMap<String, HashMap<String, Vec<(u64, OverflowOperation)>>>>,
    inserts: RwLock<HashMap<SeriesPath, Arc<MemTable>>>,
}

impl OverflowSupport {
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            inserts: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record a late insert
    pub fn insert(&self, path: &SeriesPath, timestamp: i64, value: TypedValue) -> Result<()> {
        let table = {
            let mut inserts = self.inserts.write();
            Arc::clone(inserts.entry(path.clone()).or_default())
        };
        table.insert(timestamp, value)?;
        Ok(())
    }

    /// Record an update of existing points in `[start, end)`
    pub fn update(
        &self,
        path: &SeriesPath,
        start: i64,
        end: i64,
        value: TypedValue,
        watermark: u64,
    ) -> Result<()> {
        let op = OverflowOperation::update(start, end, value)?;
        self.add_operation(path, op, watermark)
    }

    /// Record a delete of every point at or before `delete_time`
    pub fn delete(&self, path: &SeriesPath, delete_time: i64, watermark: u64) -> Result<()> {
        let op = OverflowOperation::delete_before(delete_time)?;
        self.add_operation(path, op, watermark)
    }

    /// Apply `op` to the late inserts held now and keep it for sealed files
    /// below `watermark`
    pub fn add_operation(&self, path: &SeriesPath, op: OverflowOperation, watermark: u64) -> Result<()> {
        if let Some(table) = self.insert_table(path) {
            op.apply_to(&table)?;
        }

        self.operations
            .write()
            .entry(path.device.clone())
            .or_default()
            .entry(path.measurement.clone())
            .or_default()
            .push((watermark, op));
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Operations of one series in write order (oldest first)
    pub fn operations(&self, path: &SeriesPath) -> Vec<OverflowOperation> {
        self.stamped(path, |_| true)
    }

    /// Operations of one series that cover the sealed file `file_id`, oldest first
    pub fn operations_for_file(&self, path: &SeriesPath, file_id: u64) -> Vec<OverflowOperation> {
        self.stamped(path, |watermark| file_id < watermark)
    }

    fn stamped(&self, path: &SeriesPath, keep: impl Fn(u64) -> bool) -> Vec<OverflowOperation> {
        self.operations
            .read()
            .get(&path.device)
            .and_then(|measurements| measurements.get(&path.measurement))
            .map(|ops| {
                ops.iter()
                    .filter(|(watermark, _)| keep(*watermark))
                    .map(|(_, op)| op.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the late inserts of one series, if any
    pub fn insert_reader(&self, path: &SeriesPath) -> Option<MemSeriesReader> {
        let table = self.inserts.read().get(path).cloned()?;
        if table.is_empty() {
            return None;
        }
        Some(table.snapshot())
    }

    pub fn insert_table(&self, path: &SeriesPath) -> Option<Arc<MemTable>> {
        self.inserts.read().get(path).cloned()
    }

    /// Series holding late inserts, sorted
    pub fn insert_series(&self) -> Vec<SeriesPath> {
        let mut series: Vec<SeriesPath> = self
            .inserts
            .read()
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(path, _)| path.clone())
            .collect();
        series.sort();
        series
    }

    pub fn operation_count(&self) -> usize {
        self.operations
            .read()
            .values()
            .flat_map(|measurements| measurements.values())
            .map(|ops| ops.len())
            .sum()
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.read().values().map(|table| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_count() == 0 && self.insert_count() == 0
    }

    /// All operations as records, series sorted, write order kept per series
    pub fn records(&self) -> Vec<OverflowRecord> {
        let operations = self.operations.read();
        let mut devices: Vec<&String> = operations.keys().collect();
        devices.sort();

        let mut records = Vec::new();
        for device in devices {
            let measurements = &operations[device];
            let mut names: Vec<&String> = measurements.keys().collect();
            names.sort();
            for name in names {
                let path = SeriesPath::new(device.as_str(), name.as_str());
                records.extend(measurements[name].iter().map(|(watermark, op)| OverflowRecord {
                    path: path.clone(),
                    operation: op.clone(),
                    watermark: *watermark,
                }));
            }
        }
        records
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write all operations to a new update file. Writes nothing and
    /// returns 0 when there are no operations.
    pub fn flush_operations(&self, file: &Path) -> Result<usize> {
        let records = self.records();
        if records.is_empty() {
            return Ok(0);
        }
        write_update_file(file, &records)?;
        debug!(path = %file.display(), operations = records.len(), "overflow operations flushed");
        Ok(records.len())
    }

    pub fn clear_operations(&self) {
        self.operations.write().clear();
    }

    pub fn clear_inserts(&self) {
        self.inserts.write().clear();
    }

    pub fn clear(&self) {
        self.clear_operations();
        self.clear_inserts();
    }
}

impl Default for OverflowSupport {
    fn default() -> Self {
        Self::new()
    }
}
