//! tsmerge WAL inspection tool
//!
//! Reads write-ahead log directories without modifying them.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use tsmerge::wal::{RecoveryResult, WalRecovery, OLD_WAL_FILE_NAME, WAL_FILE_NAME};

/// tsmerge WAL tool
#[derive(Parser, Debug)]
#[command(name = "tsmerge-wal")]
#[command(about = "Inspect tsmerge write-ahead logs")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recovery statistics for every node under a WAL root
    Verify {
        /// WAL root directory (one subdirectory per node)
        wal_dir: PathBuf,
    },

    /// Print every plan recovered from one node directory
    Dump {
        /// Node directory holding `wal` and possibly `wal-old`
        node_dir: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tsmerge=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Command::Verify { wal_dir } => verify(&wal_dir),
        Command::Dump { node_dir } => dump(&node_dir),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn verify(wal_dir: &Path) -> tsmerge::Result<()> {
    let mut nodes: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(wal_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            nodes.push(path);
        }
    }
    nodes.sort();

    let mut total = RecoveryResult::default();
    for node in &nodes {
        let mut stats = WalRecovery::verify(&node.join(OLD_WAL_FILE_NAME))?;
        stats.absorb(&WalRecovery::verify(&node.join(WAL_FILE_NAME))?);

        println!(
            "{:<32} recovered={:<8} corrupted={:<6} truncated={}",
            node.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            stats.entries_recovered,
            stats.entries_corrupted,
            stats.was_truncated
        );
        total.absorb(&stats);
    }

    println!(
        "{} nodes: recovered={} corrupted={} truncated={}",
        nodes.len(),
        total.entries_recovered,
        total.entries_corrupted,
        total.was_truncated
    );
    Ok(())
}

fn dump(node_dir: &Path) -> tsmerge::Result<()> {
    for name in [OLD_WAL_FILE_NAME, WAL_FILE_NAME] {
        let (plans, stats) = WalRecovery::recover(&node_dir.join(name))?;
        println!("== {} ({} plans, {} corrupted)", name, plans.len(), stats.entries_corrupted);
        for (i, plan) in plans.iter().enumerate() {
            println!("{:>6}  {:?}", i, plan);
        }
    }
    Ok(())
}
