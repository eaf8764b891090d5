//! # afd-olog
//!
//! Reader for the AFD output log: the rolling, append-only text files in
//! which the transfer daemon records every delivered file.
//!
//! - `record`: bit-exact line grammar (parse and format)
//! - `reader`: `LogIndex`, a position-addressed index over all rolling files
//! - `filter`: search criteria and AFD `pmatch` wildcards
//! - `selection`: the operator's marked handles
//! - `summary`: order-independent aggregate and its one-line rendering

pub mod filter;
pub mod reader;
pub mod record;
pub mod selection;
pub mod summary;

pub use filter::{pmatch, PatternMatch, SearchFilter};
pub use reader::{IndexEntry, LogIndex};
pub use record::{LineError, LineLayout, LogRecord, OVERSIZED_SENTINEL, SEPARATOR_CHAR};
pub use selection::{Selection, Transition};
pub use summary::{Summary, SummaryAccumulator};

use std::io;
use thiserror::Error;

/// Longest file name a log field may carry.
pub const MAX_FILENAME_LENGTH: usize = 256;
/// Longest archive path a log field may carry.
pub const MAX_PATH_LENGTH: usize = 1024;
/// Upper bound of one log line read by `fetch`.
pub const MAX_LINE_LENGTH: usize = MAX_FILENAME_LENGTH + MAX_PATH_LENGTH;

/// Errors raised while reading the output log
#[derive(Error, Debug)]
pub enum OlogError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("log {file_no} offset {line_offset}: {source}")]
    Parse {
        file_no: usize,
        line_offset: u64,
        #[source]
        source: LineError,
    },

    #[error("selection position {pos} beyond index of {len} entries")]
    NotFound { pos: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, OlogError>;
