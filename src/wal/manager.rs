//! Write log node manager
//!
//! Owns every node under one WAL root, creates nodes on demand, keeps a
//! background thread that syncs all nodes periodically, and drives
//! recovery across nodes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, select, tick, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Result, TsError};
use crate::series::check_device;

use super::node::{ExclusiveWriteLogNode, FlushStatus, WriteLogNode};
use super::record::PhysicalPlan;
use super::recovery::RecoveryResult;

type NodeMap = Arc<RwLock<HashMap<String, Arc<ExclusiveWriteLogNode>>>>;

/// Totals of a recovery pass over all nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Nodes found on disk
    pub nodes: usize,
    /// Nodes whose files could not be read at all
    pub failed_nodes: usize,
    /// Plans the caller refused to apply
    pub failed_plans: u64,
    /// Combined file statistics
    pub files: RecoveryResult,
}

/// Manages the write log nodes of one WAL root
///
/// ## Concurrency:
/// - `nodes`: RwLock map shared with the auto-sync thread
/// - Each node serializes its own mutations
pub struct WriteLogNodeManager {
    wal_dir: PathBuf,
    config: Config,
    nodes: NodeMap,
    /// Dropping the sender stops the auto-sync thread
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteLogNodeManager {
    /// Open the WAL root and start the auto-sync thread
    pub fn open(config: &Config) -> Result<Self> {
        let wal_dir = config.wal_dir();
        fs::create_dir_all(&wal_dir)?;

        let nodes: NodeMap = Arc::new(RwLock::new(HashMap::new()));
        let (stop_tx, stop_rx) = bounded(1);
        let period = Duration::from_millis(config.flush_wal_period_ms.max(1));
        let worker = spawn_sync_worker(Arc::clone(&nodes), period, stop_rx)?;

        info!(dir = %wal_dir.display(), period_ms = config.flush_wal_period_ms, "WAL manager started");
        Ok(Self {
            wal_dir,
            config: config.clone(),
            nodes,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    /// Existing node, or a new one created on demand
    pub fn get_node(&self, identifier: &str) -> Result<Arc<ExclusiveWriteLogNode>> {
        if let Some(node) = self.nodes.read().get(identifier) {
            return Ok(Arc::clone(node));
        }

        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.get(identifier) {
            return Ok(Arc::clone(node));
        }
        let node = Arc::new(ExclusiveWriteLogNode::open(identifier, &self.wal_dir, &self.config)?);
        nodes.insert(identifier.to_string(), Arc::clone(&node));
        Ok(node)
    }

    /// Node by identifier, without creating it
    pub fn node(&self, identifier: &str) -> Option<Arc<ExclusiveWriteLogNode>> {
        self.nodes.read().get(identifier).cloned()
    }

    /// Identifiers of the live nodes, sorted
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a node and remove its directory
    pub fn delete_node(&self, identifier: &str) -> Result<()> {
        let node = self.nodes.write().remove(identifier);
        match node {
            Some(node) => node.delete(),
            None => {
                check_device(identifier)?;
                let dir = self.wal_dir.join(identifier);
                if dir.exists() {
                    fs::remove_dir_all(&dir)?;
                }
                Ok(())
            }
        }
    }

    /// Sync every node; reports the first failure after trying all
    pub fn force_sync_all(&self) -> Result<()> {
        self.for_each_node(|node| node.force_sync())
    }

    /// Rotate every node ahead of a storage flush
    pub fn notify_start_flush_all(&self) -> Result<()> {
        self.for_each_node(|node| node.notify_start_flush())
    }

    /// Finish the rotation of every node
    pub fn notify_end_flush_all(&self, status: FlushStatus) -> Result<()> {
        self.for_each_node(|node| node.notify_end_flush(status))
    }

    /// Replay every node directory found under the WAL root.
    ///
    /// Best effort: a node that cannot be read, or a plan `apply` rejects,
    /// is logged and counted and recovery moves on.
    pub fn recover<F>(&self, mut apply: F) -> Result<RecoveryReport>
    where
        F: FnMut(&PhysicalPlan) -> Result<()>,
    {
        let mut report = RecoveryReport::default();

        let mut identifiers = Vec::new();
        for entry in fs::read_dir(&self.wal_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                identifiers.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        identifiers.sort();

        for identifier in identifiers {
            report.nodes += 1;
            let recovered = self
                .get_node(&identifier)
                .and_then(|node| node.recover());

            let (plans, result) = match recovered {
                Ok(recovered) => recovered,
                Err(e) => {
                    error!(node = %identifier, error = %e, "failed to recover write log node");
                    report.failed_nodes += 1;
                    continue;
                }
            };

            for plan in &plans {
                if let Err(e) = apply(plan) {
                    warn!(node = %identifier, error = %e, "failed to replay plan");
                    report.failed_plans += 1;
                }
            }
            report.files.absorb(&result);
            debug!(
                node = %identifier,
                recovered = result.entries_recovered,
                corrupted = result.entries_corrupted,
                "write log node recovered"
            );
        }

        info!(
            nodes = report.nodes,
            recovered = report.files.entries_recovered,
            corrupted = report.files.entries_corrupted,
            failed_nodes = report.failed_nodes,
            failed_plans = report.failed_plans,
            "WAL recovery finished"
        );
        Ok(report)
    }

    /// Stop the auto-sync thread and close every node
    pub fn close(&self) -> Result<()> {
        self.stop_worker();

        let nodes: Vec<_> = self.nodes.write().drain().map(|(_, node)| node).collect();
        let mut first_error = None;
        for node in nodes {
            if let Err(e) = node.close() {
                warn!(node = %node.identifier(), error = %e, "failed to close write log node");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn for_each_node(&self, mut op: impl FnMut(&ExclusiveWriteLogNode) -> Result<()>) -> Result<()> {
        let nodes: Vec<_> = self.nodes.read().values().cloned().collect();
        let mut first_error = None;
        for node in nodes {
            if let Err(e) = op(node.as_ref()) {
                warn!(node = %node.identifier(), error = %e, "write log node operation failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop_worker(&self) {
        self.stop_tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("WAL sync worker panicked");
            }
        }
    }
}

impl Drop for WriteLogNodeManager {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn spawn_sync_worker(nodes: NodeMap, period: Duration, stop_rx: Receiver<()>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("wal-sync".to_string())
        .spawn(move || {
            let ticker = tick(period);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        let snapshot: Vec<_> = nodes.read().values().cloned().collect();
                        for node in snapshot {
                            match node.force_sync() {
                                Ok(()) | Err(TsError::NodeClosed(_)) => {}
                                Err(e) => warn!(node = %node.identifier(), error = %e, "auto-sync failed"),
                            }
                        }
                    }
                }
            }
            debug!("WAL sync worker stopped");
        })?;
    Ok(handle)
}
