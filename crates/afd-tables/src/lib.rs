//! # afd-tables
//!
//! Read and update the flat, memory-mapped tables that the AFD daemon
//! shares with its operator tools.
//!
//! ## Layout
//!
//! Every table file starts with a 16-byte word header (`AFD_WORD_OFFSET`):
//!
//! ```text
//! offset  field          size
//! ------  -------------  ----
//!  0      no_of_entries   4
//!  4      reserved        3   (byte 2 doubles as the rl lock byte)
//!  7      version         1
//!  8      reserved        8
//! ```
//!
//! followed by a dense `#[repr(C)]` array of entries. Positional indexing
//! into these arrays is part of the on-disk contract (`dir_id_pos` indexes
//! the directory-name table), so nothing here builds a graph on top of them.
//!
//! ## Concurrency
//!
//! - job / directory / DIR_CONFIG tables are read-only here and never locked
//! - host-status entries are updated under a one-byte `fcntl` lock at
//!   `LOCK_TFC` inside the entry
//! - retrieve lists are updated under a one-byte lock at `LOCK_RETR_PROC`

pub mod build;
pub mod header;
pub mod host_status;
pub mod job_store;
pub mod lock;
pub mod retrieve_list;

pub use header::{TableEntry, TableHeader, AFD_WORD_OFFSET, VERSION_BYTE_OFFSET};
pub use host_status::{HostStatus, HostStatusArea};
pub use job_store::{DcEntry, DirNameEntry, JobDef, JobIdEntry, JobInfoStore, JobRef, RecipientUser};
pub use lock::{LockKind, RegionLock};
pub use retrieve_list::{RetrieveEntry, RetrieveList};

use std::io;
use thiserror::Error;

/// Longest host alias the tables store (without the NUL).
pub const MAX_HOSTNAME_LENGTH: usize = 8;
/// Longest file name the tables store.
pub const MAX_FILENAME_LENGTH: usize = 256;
/// Longest directory path the tables store.
pub const MAX_PATH_LENGTH: usize = 1024;
/// Size of the option buffers in a job entry.
pub const MAX_OPTION_LENGTH: usize = 256;
/// Size of the recipient buffer in a job entry.
pub const MAX_RECIPIENT_LENGTH: usize = 256;

pub const CURRENT_JID_VERSION: u8 = 3;
pub const CURRENT_DCID_VERSION: u8 = 1;
pub const CURRENT_FSA_VERSION: u8 = 4;
pub const CURRENT_RL_VERSION: u8 = 4;

/// Errors raised while opening or updating a shared table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{table}: version {found} does not match expected {expected}")]
    VersionMismatch {
        table: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("{table}: file holds {len} bytes, header promises {needed}")]
    Truncated {
        table: &'static str,
        len: usize,
        needed: usize,
    },

    #[error("{path} is locked by another process")]
    LockContention { path: String },

    #[error("{table}: index {index} out of range ({count} entries)")]
    OutOfRange {
        table: &'static str,
        index: usize,
        count: usize,
    },
}

pub type Result<T> = std::result::Result<T, TableError>;

/// Bytes of a fixed-size C string up to (not including) the first NUL.
pub fn c_str(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// Lossy UTF-8 view of a fixed-size C string.
pub fn c_str_lossy(buf: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(c_str(buf))
}

/// Copy `src` into `dst`, truncating so at least one NUL terminator remains.
pub fn set_c_str(dst: &mut [u8], src: &[u8]) {
    dst.fill(0);
    let n = src.len().min(dst.len().saturating_sub(1));
    dst[..n].copy_from_slice(&src[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_str_roundtrip() {
        let mut buf = [0xffu8; 6];
        set_c_str(&mut buf, b"hostname");
        assert_eq!(c_str(&buf), b"hostn");
        assert_eq!(buf[5], 0);

        set_c_str(&mut buf, b"ab");
        assert_eq!(c_str(&buf), b"ab");
        assert_eq!(c_str_lossy(&buf), "ab");
    }

    #[test]
    fn test_c_str_without_nul() {
        assert_eq!(c_str(b"abc"), b"abc");
    }
}
