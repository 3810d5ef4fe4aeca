//! Engine Module
//!
//! The storage engine of one storage group, coordinating all components.
//!
//! ## Responsibilities
//! - Log every plan to the device's WAL node before applying it
//! - Route inserts to the working memtable or, when late, to overflow
//! - Assemble prioritized sources and merge them for queries
//! - Flush memtables and overflow data, rotating the WAL around it
//! - Replay the WAL on startup

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, TsError};
use crate::externalsort::{ExternalSortEngine, SimpleExternalSortEngine, TimeValuePairDeserializer};
use crate::memtable::{MemSeriesReader, MemTable};
use crate::merge::{PriorityMergeReader, PriorityMergeReaderByTimestamp};
use crate::overflow::{
    read_update_file, OverflowOperation, OverflowOperationReader, OverflowRecord, OverflowSupport,
    SeriesWithOverflowOpReader,
};
use crate::series::{
    ByTimestampAdapter, DataType, Priority, PrioritySeriesReader, PrioritySeriesReaderByTimestamp,
    SeriesPath, SeriesReader, TypedValue,
};
use crate::storage::{FileKind, SeriesFileStore};
use crate::wal::{FlushStatus, PhysicalPlan, RecoveryReport, WriteLogNode, WriteLogNodeManager};

/// Sequential query result: merged sources, overflow operations applied
pub type SeriesQueryReader = PriorityMergeReader;

/// Point-lookup query result
pub type SeriesQueryReaderByTimestamp = PriorityMergeReaderByTimestamp;

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (execute/flush): serialized by `write_lock`; the WAL node is
///   written before any in-memory structure changes
/// - **Queries**: hold `layout` shared while collecting sources, so a flush
///   (which holds it exclusively) never moves data between two snapshots
/// - Memtables and overflow structures carry their own RwLocks
pub struct Engine {
    config: Config,

    /// WAL nodes, one per device; `None` when logging is disabled
    wal: Option<WriteLogNodeManager>,

    /// Working memtables for in-order inserts
    memtables: RwLock<HashMap<SeriesPath, Arc<MemTable>>>,

    /// Late inserts and update/delete operations not yet flushed
    overflow: OverflowSupport,

    /// Sealed files
    storage: SeriesFileStore,

    /// Operations of each flushed update file, oldest file first
    flushed_operations: RwLock<Vec<Vec<OverflowRecord>>>,

    /// Data type of every known series
    schema: RwLock<HashMap<SeriesPath, DataType>>,

    sort_engine: SimpleExternalSortEngine,

    /// Summary of the WAL replay done by `open`
    recovery: Option<RecoveryReport>,

    /// Serializes write operations (execute/flush)
    write_lock: Mutex<()>,

    /// Taken exclusively while a flush moves data into files
    layout: RwLock<()>,

    closed: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create the data directory and discover sealed files
    /// 2. Load flushed overflow operations and series types
    /// 3. Remove spill files left by an interrupted query
    /// 4. Replay every WAL node, then flush what was recovered
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = SeriesFileStore::open(&config.data_dir)?;

        let mut flushed_operations = Vec::new();
        for path in storage.update_files() {
            flushed_operations.push(read_update_file(&path)?);
        }

        let mut schema = HashMap::new();
        for series in storage.series() {
            if let Some(data_type) = storage.data_type(&series)? {
                schema.insert(series, data_type);
            }
        }

        let sort_dir = config.external_sort_dir();
        remove_stale_spill_files(&sort_dir)?;
        let sort_engine = SimpleExternalSortEngine::new(sort_dir, config.external_sort_fan_in)?;

        let wal = if config.enable_wal {
            Some(WriteLogNodeManager::open(&config)?)
        } else {
            None
        };

        let mut engine = Self {
            config,
            wal,
            memtables: RwLock::new(HashMap::new()),
            overflow: OverflowSupport::new(),
            storage,
            flushed_operations: RwLock::new(flushed_operations),
            schema: RwLock::new(schema),
            sort_engine,
            recovery: None,
            write_lock: Mutex::new(()),
            layout: RwLock::new(()),
            closed: AtomicBool::new(false),
        };

        let recovery = match engine.wal.as_ref() {
            Some(wal) => {
                let report = wal.recover(|plan| {
                    engine.validate(plan)?;
                    engine.apply(plan).map(|_| ())
                })?;
                if report.files.entries_recovered > 0 {
                    info!(plans = report.files.entries_recovered, "flushing recovered data");
                    let _write_guard = engine.write_lock.lock();
                    engine.flush_internal()?;
                }
                Some(report)
            }
            None => None,
        };
        engine.recovery = recovery;

        info!(dir = %engine.config.data_dir.display(), "engine opened");
        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Log and apply a plan
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Validate the plan (nothing invalid reaches the log)
    /// 3. Write to the device's WAL node
    /// 4. Apply to memtables / overflow, registering new series types
    /// 5. Flush if a memtable reached its limit
    pub fn execute(&self, plan: PhysicalPlan) -> Result<()> {
        self.ensure_open()?;

        let _write_guard = self.write_lock.lock();
        self.validate(&plan)?;

        if let Some(wal) = &self.wal {
            wal.get_node(plan.device())?.write(&plan)?;
        }

        if self.apply(&plan)? {
            debug!(device = plan.device(), "memtable limit reached, flushing");
            self.flush_internal()?;
        }
        Ok(())
    }

    /// Insert one point
    pub fn insert(&self, series: &SeriesPath, time: i64, value: TypedValue) -> Result<()> {
        self.execute(PhysicalPlan::insert(
            series.device.clone(),
            time,
            vec![series.measurement.clone()],
            vec![value],
        ))
    }

    /// Overwrite existing points in `[start, end)`
    pub fn update(&self, series: &SeriesPath, start: i64, end: i64, value: TypedValue) -> Result<()> {
        self.execute(PhysicalPlan::Update {
            path: series.clone(),
            intervals: vec![(start, end)],
            value,
        })
    }

    /// Delete every point at or before `delete_time`
    pub fn delete(&self, series: &SeriesPath, delete_time: i64) -> Result<()> {
        self.execute(PhysicalPlan::Delete {
            path: series.clone(),
            delete_time,
        })
    }

    /// Flush memtables and overflow data to disk (public API)
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Close the engine gracefully
    ///
    /// Flushes pending data, then syncs and closes every WAL node. Later
    /// calls on the engine fail with `EngineClosed`.
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let flushed = self.flush_internal();
        if let Some(wal) = &self.wal {
            wal.close()?;
        }
        flushed?;

        info!("engine closed");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Ascending, duplicate-free pairs of one series
    pub fn query(&self, series: &SeriesPath) -> Result<SeriesQueryReader> {
        self.ensure_open()?;
        let sources = self.collect_sources(series)?;
        PriorityMergeReader::new(sources)
    }

    /// Point lookups over one series
    pub fn query_by_timestamp(&self, series: &SeriesPath) -> Result<SeriesQueryReaderByTimestamp> {
        self.ensure_open()?;
        let sources = self
            .collect_sources(series)?
            .into_iter()
            .map(|source| {
                let priority = source.priority();
                PrioritySeriesReaderByTimestamp::from_reader(ByTimestampAdapter::new(source), priority)
            })
            .collect();
        PriorityMergeReaderByTimestamp::new(sources)
    }

    /// Every series the engine knows of, sorted
    pub fn series(&self) -> Vec<SeriesPath> {
        let mut series: Vec<SeriesPath> = self.schema.read().keys().cloned().collect();
        series.sort();
        series
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// WAL manager, when logging is enabled
    pub fn wal(&self) -> Option<&WriteLogNodeManager> {
        self.wal.as_ref()
    }

    /// Summary of the WAL replay done when the engine was opened
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    pub fn storage(&self) -> &SeriesFileStore {
        &self.storage
    }

    pub fn overflow(&self) -> &OverflowSupport {
        &self.overflow
    }

    /// Points held in the working memtable of a series
    pub fn memtable_len(&self, series: &SeriesPath) -> usize {
        self.memtables
            .read()
            .get(series)
            .map_or(0, |table| table.len())
    }

    pub fn data_type(&self, series: &SeriesPath) -> Option<DataType> {
        self.schema.read().get(series).copied()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TsError::EngineClosed);
        }
        Ok(())
    }

    /// Reject plans that cannot be applied. Nothing is registered here.
    fn validate(&self, plan: &PhysicalPlan) -> Result<()> {
        match plan {
            PhysicalPlan::Insert {
                device,
                measurements,
                values,
                ..
            } => {
                if measurements.len() != values.len() {
                    return Err(TsError::InvalidArgument(format!(
                        "insert into {} has {} measurements but {} values",
                        device,
                        measurements.len(),
                        values.len()
                    )));
                }
                // A measurement repeated in one plan must keep one type
                let mut pending: HashMap<SeriesPath, DataType> = HashMap::new();
                for (measurement, value) in measurements.iter().zip(values) {
                    let series = SeriesPath::new(device.as_str(), measurement.as_str());
                    series.validate()?;
                    let expected = match self.schema.read().get(&series) {
                        Some(known) => *known,
                        None => *pending.entry(series).or_insert_with(|| value.data_type()),
                    };
                    value.expect_type(expected)?;
                }
            }
            PhysicalPlan::Update {
                path,
                intervals,
                value,
            } => {
                path.validate()?;
                for (start, end) in intervals {
                    OverflowOperation::update(*start, *end, value.clone())?;
                }
                if let Some(expected) = self.schema.read().get(path) {
                    value.expect_type(*expected)?;
                }
            }
            PhysicalPlan::Delete { path, delete_time } => {
                path.validate()?;
                OverflowOperation::delete_before(*delete_time)?;
            }
        }
        Ok(())
    }

    /// Record the type of a series once a value of it has been applied
    fn register_type(&self, series: &SeriesPath, data_type: DataType) {
        if self.schema.read().contains_key(series) {
            return;
        }
        self.schema.write().entry(series.clone()).or_insert(data_type);
    }

    /// Apply a validated plan. Returns whether a memtable is now full.
    fn apply(&self, plan: &PhysicalPlan) -> Result<bool> {
        let mut needs_flush = false;
        match plan {
            PhysicalPlan::Insert {
                device,
                time,
                measurements,
                values,
            } => {
                for (measurement, value) in measurements.iter().zip(values) {
                    let series = SeriesPath::new(device.as_str(), measurement.as_str());
                    needs_flush |= self.insert_point(&series, *time, value.clone())?;
                    self.register_type(&series, value.data_type());
                }
            }
            PhysicalPlan::Update {
                path,
                intervals,
                value,
            } => {
                for (start, end) in intervals {
                    let op = OverflowOperation::update(*start, *end, value.clone())?;
                    self.apply_operation(path, op)?;
                }
                self.register_type(path, value.data_type());
            }
            PhysicalPlan::Delete { path, delete_time } => {
                self.apply_operation(path, OverflowOperation::delete_before(*delete_time)?)?;
            }
        }
        Ok(needs_flush)
    }

    /// Rewrite the points held in memory now and keep `op` for the sealed
    /// files that exist now. Points inserted later are left alone.
    fn apply_operation(&self, series: &SeriesPath, op: OverflowOperation) -> Result<()> {
        let working = self.memtables.read().get(series).cloned();
        if let Some(table) = working {
            op.apply_to(&table)?;
        }
        self.overflow.add_operation(series, op, self.storage.next_file_id())
    }

    /// Route one point; late points go to overflow
    fn insert_point(&self, series: &SeriesPath, time: i64, value: TypedValue) -> Result<bool> {
        let late = self
            .storage
            .last_flushed_time(series)
            .map_or(false, |last| time <= last);
        if late {
            self.overflow.insert(series, time, value)?;
            return Ok(false);
        }

        let table = {
            let mut memtables = self.memtables.write();
            Arc::clone(memtables.entry(series.clone()).or_default())
        };
        let len = table.insert(time, value)?;
        Ok(len >= self.config.memtable_size_limit)
    }

    /// Prioritized sources of a series, reduced to the fan-in limit.
    ///
    /// Priorities, lowest first: sequential files (oldest first), overflow
    /// insert files, overflow insert memtable, working memtable.
    fn collect_sources(&self, series: &SeriesPath) -> Result<Vec<PrioritySeriesReader>> {
        let _layout = self.layout.read();

        let mut readers: Vec<Box<dyn SeriesReader>> = Vec::new();
        for kind in [FileKind::Sequence, FileKind::Overflow] {
            for (file_id, reader) in self.storage.readers(kind, series)? {
                readers.push(self.sealed_reader(series, file_id, reader));
            }
        }
        if let Some(reader) = self.overflow.insert_reader(series) {
            readers.push(Box::new(reader));
        }
        let working = self.memtables.read().get(series).cloned();
        if let Some(table) = working.filter(|table| !table.is_empty()) {
            readers.push(Box::new(table.snapshot()));
        }

        let sources: Vec<PrioritySeriesReader> = readers
            .into_iter()
            .enumerate()
            .map(|(i, reader)| PrioritySeriesReader::new(reader, Priority(i as u32 + 1)))
            .collect();
        debug!(series = %series, sources = sources.len(), "query sources collected");

        // Merging needs at least one source, even when nothing is stored
        let mut sources = self.sort_engine.execute(sources)?;
        if sources.is_empty() {
            sources.push(PrioritySeriesReader::from_reader(MemSeriesReader::empty(), Priority(0)));
        }
        Ok(sources)
    }

    /// Sealed file reader with the operations recorded after it was written
    fn sealed_reader(
        &self,
        series: &SeriesPath,
        file_id: u64,
        reader: TimeValuePairDeserializer,
    ) -> Box<dyn SeriesReader> {
        let files: Vec<Vec<OverflowOperation>> = self
            .flushed_operations
            .read()
            .iter()
            .map(|records| {
                records
                    .iter()
                    .filter(|record| &record.path == series && record.covers_file(file_id))
                    .map(|record| record.operation.clone())
                    .collect()
            })
            .collect();
        let operations = OverflowOperationReader::from_sources(
            self.overflow.operations_for_file(series, file_id),
            files,
        );
        if operations.is_empty() {
            return Box::new(reader);
        }
        Box::new(SeriesWithOverflowOpReader::new(reader, operations))
    }

    /// Flush with the write lock held
    fn flush_internal(&self) -> Result<()> {
        let _layout = self.layout.write();

        let memtables: Vec<(SeriesPath, Arc<MemTable>)> = {
            let mut entries: Vec<_> = self
                .memtables
                .read()
                .iter()
                .filter(|(_, table)| !table.is_empty())
                .map(|(series, table)| (series.clone(), Arc::clone(table)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };
        if memtables.is_empty() && self.overflow.is_empty() {
            return Ok(());
        }

        if let Some(wal) = &self.wal {
            wal.notify_start_flush_all()?;
        }

        let outcome = self.persist(&memtables);
        let status = match &outcome {
            Ok(()) => FlushStatus::Succeeded,
            Err(e) => {
                warn!(error = %e, "flush failed");
                FlushStatus::Failed
            }
        };

        if let Some(wal) = &self.wal {
            if let Err(e) = wal.notify_end_flush_all(status) {
                warn!(error = %e, "failed to finish WAL rotation");
            }
        }
        outcome
    }

    fn persist(&self, memtables: &[(SeriesPath, Arc<MemTable>)]) -> Result<()> {
        for (series, table) in memtables {
            self.storage.write(FileKind::Sequence, series, &table.to_pairs())?;
            table.clear();
        }

        for series in self.overflow.insert_series() {
            if let Some(table) = self.overflow.insert_table(&series) {
                self.storage.write(FileKind::Overflow, &series, &table.to_pairs())?;
            }
        }

        let records = self.overflow.records();
        if !records.is_empty() {
            let path = self.storage.next_update_file();
            self.overflow.flush_operations(&path)?;
            self.storage.register_update_file(path);
            self.flushed_operations.write().push(records);
        }

        self.overflow.clear();
        info!(memtables = memtables.len(), "flush completed");
        Ok(())
    }
}

/// Remove spill files an interrupted query left behind
fn remove_stale_spill_files(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(false, |ext| ext == "tmp") {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed stale spill file"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove stale spill file"),
            }
        }
    }
    Ok(())
}
