//! Storage Module
//!
//! Persistent storage of flushed series data.
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── sequence/<device>.<measurement>/seq_000001.tvp
//!   ├── overflow/<device>.<measurement>/ovf_000002.tvp
//!   └── overflow/updates/upd_000003.ovf
//! ```
//! Series files use the spill file format of the external sort module and
//! are opened in persistent mode. Update files hold checksummed overflow
//! operation records.

mod series_files;

pub use series_files::{FileKind, SeriesFileStore};
