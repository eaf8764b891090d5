//! # afd-dispatch
//!
//! Turns a selection of output-log records back into work for the AFD:
//!
//! - `resend`: stage archived files into the outgoing spool and publish one
//!   binary message per batch to the daemon's message FIFO
//! - `view`: hand archived files to viewer programs, a bounded number at
//!   a time
//! - `send`: write a manifest and start the external send tool
//!
//! Supporting pieces: the FIFO message codec (`message`), the publisher
//! seam (`publisher`), the shared unique-number counter (`counter`),
//! staging-directory names (`name`) and operator permissions
//! (`permissions`).

pub mod context;
pub mod counter;
pub mod message;
pub mod name;
pub mod permissions;
pub mod publisher;
pub mod resend;
pub mod send;
pub mod view;

pub use context::DispatchContext;
pub use counter::CounterFile;
pub use message::{MessageLayout, OutboundMessage, SHOW_OLOG_NO};
pub use name::{NameGenerator, StagingDir};
pub use permissions::{Limit, Permissions};
pub use publisher::{FifoPublisher, Publisher};
pub use resend::{ResendDispatcher, ResendReport};
pub use send::{SendDispatcher, SendReport};
pub use view::{ViewDispatcher, ViewReport};

use std::io;
use std::path::PathBuf;

use afd_archive::ArchiveError;
use afd_olog::OlogError;
use afd_tables::TableError;
use thiserror::Error;

/// Errors surfaced by the dispatchers
///
/// Per-handle classes (`Parse` to `NotInArchive`) are counted in the
/// reports; only the remaining variants fail an invocation.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("position {pos}: malformed log line: {reason}")]
    Parse { pos: usize, reason: String },

    #[error("position {pos} has no log entry")]
    NotFound { pos: usize },

    #[error("position {pos} was not archived")]
    NotArchived { pos: usize },

    #[error("{} is not in the archive", path.display())]
    NotInArchive { path: PathBuf },

    #[error("USER LIMIT ({limit}) REACHED")]
    LimitReached { limit: u32 },

    #[error("{table}: version {found} does not match expected {expected}")]
    VersionMismatch {
        table: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{path} is locked by another process")]
    LockContention { path: String },

    #[error("no permission to {action}")]
    NoPermission { action: &'static str },

    #[error("invalid permission entry `{0}`")]
    InvalidPermission(String),

    #[error("table error: {0}")]
    Table(TableError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<TableError> for DispatchError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Io(e) => DispatchError::Io(e),
            TableError::VersionMismatch {
                table,
                expected,
                found,
            } => DispatchError::VersionMismatch {
                table,
                expected,
                found,
            },
            TableError::LockContention { path } => DispatchError::LockContention { path },
            other => DispatchError::Table(other),
        }
    }
}

impl DispatchError {
    /// Failure reading the log entry at selection position `pos`.
    pub fn from_log(pos: usize, e: OlogError) -> Self {
        match e {
            OlogError::Io(e) => DispatchError::Io(e),
            OlogError::Parse {
                file_no,
                line_offset,
                source,
            } => DispatchError::Parse {
                pos,
                reason: format!("log {} offset {}: {}", file_no, line_offset, source),
            },
            OlogError::NotFound { .. } => DispatchError::NotFound { pos },
        }
    }

    /// Failure bringing the archived file of position `pos` into place.
    pub fn from_archive(pos: usize, e: ArchiveError) -> Self {
        match e {
            ArchiveError::Io(e) => DispatchError::Io(e),
            ArchiveError::NotArchived { .. } => DispatchError::NotArchived { pos },
            ArchiveError::ArchiveMissing { path } => DispatchError::NotInArchive { path },
            ArchiveError::InvalidArchiveDir { dir } => DispatchError::NotInArchive { path: dir.into() },
        }
    }
}
