//! External Sort Module
//!
//! Bounds the number of sources merged at once. When a query has more
//! sources than the fan-in limit, groups of sources are merged into
//! temporary spill files first, recursively, until few enough remain.
//!
//! ## Responsibilities
//! - Plan contiguous-priority groups of at most `fan_in` sources
//! - Spill each group through a priority merge
//! - Hand back readers that delete their spill file on close

mod codec;
mod job;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{Result, TsError};
use crate::series::PrioritySeriesReader;

pub use codec::{TimeValuePairDeserializer, TimeValuePairSerializer};
pub use job::{ExternalSortJobPart, LineMerger};

/// Spill file ids, unique within the process
static NEXT_SPILL_ID: AtomicU64 = AtomicU64::new(0);

/// Reduces a source list to at most a fan-in limit of readers
pub trait ExternalSortEngine: Send + Sync {
    /// Returns an equivalent list of readers: merging the result with a
    /// priority merge yields the same sequence as merging `sources`.
    fn execute(&self, sources: Vec<PrioritySeriesReader>) -> Result<Vec<PrioritySeriesReader>>;
}

/// Spills groups of sources to files under one base directory
pub struct SimpleExternalSortEngine {
    base_dir: PathBuf,
    fan_in: usize,
}

impl SimpleExternalSortEngine {
    pub fn new(base_dir: impl Into<PathBuf>, fan_in: usize) -> Result<Self> {
        check_fan_in(fan_in)?;
        Ok(Self {
            base_dir: base_dir.into(),
            fan_in,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    /// Same as [`ExternalSortEngine::execute`] with an explicit limit
    pub fn execute_with_limit(
        &self,
        sources: Vec<PrioritySeriesReader>,
        fan_in: usize,
    ) -> Result<Vec<PrioritySeriesReader>> {
        check_fan_in(fan_in)?;
        if sources.len() <= fan_in {
            return Ok(sources);
        }

        fs::create_dir_all(&self.base_dir)?;
        let source_count = sources.len();
        let parts = self.plan(sources, fan_in);
        debug!(
            sources = source_count,
            fan_in,
            parts = parts.len(),
            "external sort planned"
        );

        let mut readers = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(reader) = part.execute()? {
                readers.push(reader);
            }
        }
        Ok(readers)
    }

    /// Group sources until at most `fan_in` parts remain.
    ///
    /// Sources are ordered by ascending priority first (stable, so equal
    /// priorities keep registration order), which makes every group cover a
    /// contiguous priority range and lets it stand in for its members at
    /// the group's highest priority.
    pub fn plan(&self, mut sources: Vec<PrioritySeriesReader>, fan_in: usize) -> Vec<ExternalSortJobPart> {
        sources.sort_by_key(|source| source.priority());
        let mut parts: Vec<ExternalSortJobPart> =
            sources.into_iter().map(ExternalSortJobPart::Single).collect();

        while parts.len() > fan_in {
            let mut grouped = Vec::with_capacity((parts.len() + fan_in - 1) / fan_in);
            let mut rest = parts.into_iter();
            loop {
                let mut group: Vec<ExternalSortJobPart> = rest.by_ref().take(fan_in).collect();
                match group.len() {
                    0 => break,
                    1 => grouped.append(&mut group),
                    _ => grouped.push(ExternalSortJobPart::Multi {
                        tmp_path: self.next_spill_path(),
                        parts: group,
                    }),
                }
            }
            parts = grouped;
        }
        parts
    }

    fn next_spill_path(&self) -> PathBuf {
        let id = NEXT_SPILL_ID.fetch_add(1, Ordering::Relaxed);
        self.base_dir
            .join(format!("sort_{}_{:08}.tmp", std::process::id(), id))
    }
}

impl ExternalSortEngine for SimpleExternalSortEngine {
    fn execute(&self, sources: Vec<PrioritySeriesReader>) -> Result<Vec<PrioritySeriesReader>> {
        self.execute_with_limit(sources, self.fan_in)
    }
}

fn check_fan_in(fan_in: usize) -> Result<()> {
    if fan_in < 2 {
        return Err(TsError::Config(format!(
            "external sort fan-in must be at least 2, got {}",
            fan_in
        )));
    }
    Ok(())
}
