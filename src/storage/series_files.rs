//! Sealed series files
//!
//! Manages the flushed files of every series and hands out readers.
//!
//! ## Responsibilities
//! - Discover existing files on startup
//! - Write memtable snapshots to new sequential / overflow files
//! - Track overflow update files
//! - Remember the newest flushed timestamp per series

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, TsError};
use crate::externalsort::{TimeValuePairDeserializer, TimeValuePairSerializer};
use crate::series::{DataType, SeriesPath, SeriesReader, TimeValuePair};

const SEQUENCE_DIR: &str = "sequence";
const OVERFLOW_DIR: &str = "overflow";
const UPDATES_DIR: &str = "updates";

const SEQUENCE_PREFIX: &str = "seq_";
const OVERFLOW_PREFIX: &str = "ovf_";
const UPDATE_PREFIX: &str = "upd_";

const SERIES_EXT: &str = "tvp";
const UPDATE_EXT: &str = "ovf";

/// Kind of sealed series file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Points newer than everything flushed before them
    Sequence,
    /// Late points
    Overflow,
}

/// Manages the sealed files under one data directory
///
/// ## Concurrency:
/// - File lists: RwLock (many concurrent readers, exclusive writer)
/// - `next_file_id`: Atomic counter shared by every file kind
/// - All methods use `&self`
pub struct SeriesFileStore {
    data_dir: PathBuf,

    /// Sequential files per series, oldest first
    sequence: RwLock<HashMap<SeriesPath, Vec<PathBuf>>>,

    /// Overflow insert files per series, oldest first
    overflow: RwLock<HashMap<SeriesPath, Vec<PathBuf>>>,

    /// Overflow update files, oldest first
    updates: RwLock<Vec<PathBuf>>,

    /// Newest timestamp in the sequential files of each series
    last_flushed: RwLock<HashMap<SeriesPath, i64>>,

    next_file_id: AtomicU64,
}

impl SeriesFileStore {
    /// Open or create storage in the given data directory
    ///
    /// On startup:
    /// 1. Create the directory tree if it doesn't exist
    /// 2. Discover series directories and their files, ordered by ID
    /// 3. Read back the newest flushed timestamp of each series
    pub fn open(data_dir: &Path) -> Result<Self> {
        let sequence_root = data_dir.join(SEQUENCE_DIR);
        let overflow_root = data_dir.join(OVERFLOW_DIR);
        let updates_root = overflow_root.join(UPDATES_DIR);
        fs::create_dir_all(&sequence_root)?;
        fs::create_dir_all(&updates_root)?;

        let mut max_id = 0;
        let sequence = discover_series(&sequence_root, SEQUENCE_PREFIX, &mut max_id)?;
        let overflow = discover_series(&overflow_root, OVERFLOW_PREFIX, &mut max_id)?;
        let updates = discover_files(&updates_root, UPDATE_PREFIX, UPDATE_EXT, &mut max_id)?;

        let mut last_flushed = HashMap::new();
        for (series, files) in &sequence {
            if let Some(last) = files.last() {
                if let Some(ts) = last_timestamp(last)? {
                    last_flushed.insert(series.clone(), ts);
                }
            }
        }

        info!(
            dir = %data_dir.display(),
            series = sequence.len(),
            overflow_series = overflow.len(),
            update_files = updates.len(),
            "series file store opened"
        );

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            sequence: RwLock::new(sequence),
            overflow: RwLock::new(overflow),
            updates: RwLock::new(updates),
            last_flushed: RwLock::new(last_flushed),
            next_file_id: AtomicU64::new(max_id + 1),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Seal ascending pairs of one series into a new file.
    ///
    /// Returns `None` without creating anything when `pairs` is empty.
    pub fn write(&self, kind: FileKind, series: &SeriesPath, pairs: &[TimeValuePair]) -> Result<Option<PathBuf>> {
        let first = match pairs.first() {
            Some(first) => first,
            None => return Ok(None),
        };

        let (root, prefix) = match kind {
            FileKind::Sequence => (SEQUENCE_DIR, SEQUENCE_PREFIX),
            FileKind::Overflow => (OVERFLOW_DIR, OVERFLOW_PREFIX),
        };
        let dir = self.data_dir.join(root).join(series.file_name());
        fs::create_dir_all(&dir)?;

        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(format!("{}{:06}.{}", prefix, id, SERIES_EXT));
        let tmp = path.with_extension("tmp");

        let mut serializer = TimeValuePairSerializer::create(&tmp, first.value.data_type())?;
        for pair in pairs {
            serializer.write(pair)?;
        }
        let count = serializer.finish()?;
        fs::rename(&tmp, &path)?;

        match kind {
            FileKind::Sequence => {
                self.sequence.write().entry(series.clone()).or_default().push(path.clone());
                if let Some(last) = pairs.last() {
                    let mut last_flushed = self.last_flushed.write();
                    let entry = last_flushed.entry(series.clone()).or_insert(last.timestamp);
                    *entry = (*entry).max(last.timestamp);
                }
            }
            FileKind::Overflow => {
                self.overflow.write().entry(series.clone()).or_default().push(path.clone());
            }
        }

        debug!(series = %series, path = %path.display(), pairs = count, "series file sealed");
        Ok(Some(path))
    }

    /// Reserve the path of the next overflow update file
    pub fn next_update_file(&self) -> PathBuf {
        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        self.data_dir
            .join(OVERFLOW_DIR)
            .join(UPDATES_DIR)
            .join(format!("{}{:06}.{}", UPDATE_PREFIX, id, UPDATE_EXT))
    }

    /// Track an update file written to a path from `next_update_file`
    pub fn register_update_file(&self, path: PathBuf) {
        self.updates.write().push(path);
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Files of one series, oldest first
    pub fn files(&self, kind: FileKind, series: &SeriesPath) -> Vec<PathBuf> {
        let files = match kind {
            FileKind::Sequence => self.sequence.read(),
            FileKind::Overflow => self.overflow.read(),
        };
        files.get(series).cloned().unwrap_or_default()
    }

    /// Persistent readers over the files of one series with their ids,
    /// oldest first
    pub fn readers(
        &self,
        kind: FileKind,
        series: &SeriesPath,
    ) -> Result<Vec<(u64, TimeValuePairDeserializer)>> {
        let prefix = match kind {
            FileKind::Sequence => SEQUENCE_PREFIX,
            FileKind::Overflow => OVERFLOW_PREFIX,
        };
        self.files(kind, series)
            .iter()
            .map(|path| {
                let id = parse_file_id(path, prefix, SERIES_EXT).ok_or_else(|| {
                    TsError::Corruption(format!("{}: not a series file name", path.display()))
                })?;
                Ok((id, TimeValuePairDeserializer::open(path)?))
            })
            .collect()
    }

    /// Id the next sealed file will get; every existing file is below it
    pub fn next_file_id(&self) -> u64 {
        self.next_file_id.load(Ordering::SeqCst)
    }

    /// Data type recorded in the oldest file of the series
    pub fn data_type(&self, series: &SeriesPath) -> Result<Option<DataType>> {
        let first = self
            .files(FileKind::Sequence, series)
            .into_iter()
            .chain(self.files(FileKind::Overflow, series))
            .next();
        match first {
            Some(path) => {
                let mut reader = TimeValuePairDeserializer::open(&path)?;
                let data_type = reader.data_type();
                reader.close()?;
                Ok(Some(data_type))
            }
            None => Ok(None),
        }
    }

    /// Overflow update files, oldest first
    pub fn update_files(&self) -> Vec<PathBuf> {
        self.updates.read().clone()
    }

    /// Newest timestamp sealed in a sequential file of the series
    pub fn last_flushed_time(&self, series: &SeriesPath) -> Option<i64> {
        self.last_flushed.read().get(series).copied()
    }

    /// Every series with at least one sealed file, sorted
    pub fn series(&self) -> Vec<SeriesPath> {
        let mut series: Vec<SeriesPath> = self.sequence.read().keys().cloned().collect();
        series.extend(self.overflow.read().keys().cloned());
        series.sort();
        series.dedup();
        series
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Series directories under `root` and their files, oldest first
fn discover_series(root: &Path, prefix: &str, max_id: &mut u64) -> Result<HashMap<SeriesPath, Vec<PathBuf>>> {
    let mut found = HashMap::new();
    if !root.exists() {
        return Ok(found);
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == UPDATES_DIR {
            continue;
        }
        let series = match SeriesPath::parse(&name) {
            Ok(series) => series,
            Err(_) => {
                warn!(dir = %entry.path().display(), "ignoring directory that is not a series");
                continue;
            }
        };

        let files = discover_files(&entry.path(), prefix, SERIES_EXT, max_id)?;
        if !files.is_empty() {
            found.insert(series, files);
        }
    }
    Ok(found)
}

/// Files named `<prefix>NNNNNN.<ext>` in `dir`, ordered by ID
fn discover_files(dir: &Path, prefix: &str, ext: &str, max_id: &mut u64) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = parse_file_id(&path, prefix, ext) {
            *max_id = (*max_id).max(id);
            files.push((id, path));
        }
    }
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// "seq_000042.tvp" → Some(42)
fn parse_file_id(path: &Path, prefix: &str, ext: &str) -> Option<u64> {
    if path.extension()?.to_str()? != ext {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(prefix)?.parse().ok()
}

/// Timestamp of the last pair in a sealed file
fn last_timestamp(path: &Path) -> Result<Option<i64>> {
    let mut reader = TimeValuePairDeserializer::open(path)?;
    let mut last = None;
    while let Some(pair) = reader.next_pair()? {
        last = Some(pair.timestamp);
    }
    reader.close()?;
    Ok(last)
}
