//! External sort job parts
//!
//! A job is a tree: leaves are original sources, inner nodes merge their
//! children into one spill file read back as a temporary reader.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{Result, TsError};
use crate::merge::PriorityMergeReader;
use crate::series::{PrioritySeriesReader, SeriesReader};

use super::codec::{TimeValuePairDeserializer, TimeValuePairSerializer};

/// Merges a group of sources into one spill file
pub struct LineMerger {
    tmp_path: PathBuf,
}

impl LineMerger {
    pub fn new(tmp_path: impl Into<PathBuf>) -> Self {
        Self {
            tmp_path: tmp_path.into(),
        }
    }

    /// Merge `sources` and return a temporary reader over the result.
    ///
    /// The result carries the highest priority of the group. Returns `None`
    /// (and leaves no file behind) when every source is empty. The sources
    /// are closed whether or not the merge succeeds.
    pub fn merge(&self, sources: Vec<PrioritySeriesReader>) -> Result<Option<PrioritySeriesReader>> {
        let priority = sources
            .iter()
            .map(|source| source.priority())
            .max()
            .ok_or_else(|| TsError::InvalidArgument("line merger needs sources".to_string()))?;
        let source_count = sources.len();

        let mut merged = PriorityMergeReader::new(sources)?;
        let spilled = self.spill(&mut merged);
        let closed = merged.close();

        let count = match spilled.and_then(|count| closed.map(|_| count)) {
            Ok(count) => count,
            Err(e) => {
                self.discard();
                return Err(e);
            }
        };

        let count = match count {
            Some(count) => count,
            None => {
                debug!(sources = source_count, "merged group is empty, no spill file");
                return Ok(None);
            }
        };

        debug!(
            path = %self.tmp_path.display(),
            sources = source_count,
            pairs = count,
            priority = %priority,
            "spilled merged group"
        );
        let reader = TimeValuePairDeserializer::open_temporary(&self.tmp_path)?;
        Ok(Some(PrioritySeriesReader::from_reader(reader, priority)))
    }

    /// Write the merged sequence; `None` if it was empty
    fn spill(&self, merged: &mut PriorityMergeReader) -> Result<Option<u64>> {
        let first = match merged.next_pair()? {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let mut serializer = TimeValuePairSerializer::create(&self.tmp_path, first.value.data_type())?;
        serializer.write(&first)?;
        serializer.write_all_from(merged)?;
        serializer.finish().map(Some)
    }

    fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.tmp_path.display(), error = %e, "failed to remove partial spill file");
            }
        }
    }
}

/// One node of an external sort plan
pub enum ExternalSortJobPart {
    /// An original source, passed through untouched
    Single(PrioritySeriesReader),
    /// Children merged into the spill file at `tmp_path`
    Multi {
        tmp_path: PathBuf,
        parts: Vec<ExternalSortJobPart>,
    },
}

impl ExternalSortJobPart {
    /// Run the subtree bottom-up. `None` means the subtree produced no data.
    pub fn execute(self) -> Result<Option<PrioritySeriesReader>> {
        match self {
            ExternalSortJobPart::Single(reader) => Ok(Some(reader)),
            ExternalSortJobPart::Multi { tmp_path, parts } => {
                // Readers collected so far are dropped on error, which
                // removes any spill files they own.
                let mut readers = Vec::with_capacity(parts.len());
                for part in parts {
                    if let Some(reader) = part.execute()? {
                        readers.push(reader);
                    }
                }
                if readers.is_empty() {
                    return Ok(None);
                }
                LineMerger::new(tmp_path).merge(readers)
            }
        }
    }

    /// Number of original sources below this node
    pub fn leaf_count(&self) -> usize {
        match self {
            ExternalSortJobPart::Single(_) => 1,
            ExternalSortJobPart::Multi { parts, .. } => parts.iter().map(|p| p.leaf_count()).sum(),
        }
    }
}
