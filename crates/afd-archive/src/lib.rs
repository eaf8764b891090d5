//! # afd-archive
//!
//! The archive keeps a copy of every delivered file whose job asked for it,
//! under `<work>/<archive>/<archive_dir>/<unique_string>_<local_name>`.
//! This crate turns an output-log record into that path and brings the
//! archived bytes back into a spool directory.
//!
//! ## Modules
//!
//! - `resolver`: record to archive path, filesystem-id prefix
//! - `link_strategy`: how a file gets into the spool (hard link or not at all)
//! - `materialise`: link, with copy fall-backs that never leave partial files

pub mod link_strategy;
pub mod materialise;
pub mod resolver;

pub use link_strategy::{get_strategy, CopyStrategy, HardLinkStrategy, LinkStrategy};
pub use materialise::{Materialiser, Method, Outcome};
pub use resolver::{ArchiveResolver, ArchivedFile};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or materialising an archived file
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("job {job_id:x}: {local_name} was not archived")]
    NotArchived { job_id: u32, local_name: String },

    #[error("archived file {} is gone", path.display())]
    ArchiveMissing { path: PathBuf },

    #[error("archive directory {dir} does not start with a filesystem id")]
    InvalidArchiveDir { dir: String },
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
