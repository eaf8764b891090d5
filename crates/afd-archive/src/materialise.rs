//! Bring an archived file into a spool directory.
//!
//! ```text
//! writable archive:  link --ok------------> Linked (mtime refreshed)
//!                         --exists--------> unlink + copy, overwritten
//!                         --cross-device--> copy
//!                         --permission----> block copy
//!                         --other---------> error
//! read-only archive: block copy (mtime refresh skipped, warned)
//! ```
//!
//! Every copy path removes whatever it left at the destination before
//! returning an error.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use afd_config::{log_archive_debug, log_archive_warn};
use filetime::FileTime;
use nix::unistd::{access, AccessFlags};

use crate::link_strategy::{get_strategy, LinkStrategy};
use crate::{ArchiveError, Result};

/// Fallback buffer when the filesystem reports no block size.
const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// How the destination was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Linked,
    /// Link target existed; replaced by a copy
    CopiedOverExisting,
    /// Link crossed devices
    Copied,
    /// Archive could not be linked; read block by block
    BlockCopied,
}

/// Result of one materialisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub method: Method,
    pub bytes: u64,
    /// An earlier file of the same name was replaced
    pub overwritten: bool,
}

/// Link-or-copy engine
pub struct Materialiser {
    strategy: &'static dyn LinkStrategy,
}

impl Default for Materialiser {
    fn default() -> Self {
        Self::new()
    }
}

impl Materialiser {
    pub fn new() -> Self {
        Self::with_strategy(get_strategy())
    }

    pub fn with_strategy(strategy: &'static dyn LinkStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Produce `dest` with the contents of `archive`.
    pub fn materialise(&self, archive: &Path, dest: &Path) -> Result<Outcome> {
        let meta = match fs::metadata(archive) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::ArchiveMissing {
                    path: archive.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let block_size = block_size(&meta);

        if access(archive, AccessFlags::W_OK).is_err() {
            log_archive_warn!(
                "Archive is read-only, copying without mtime refresh",
                archive = archive.display().to_string().as_str(),
            );
            return replace_by_copy(archive, dest, block_size, Method::BlockCopied);
        }

        let outcome = match self.strategy.link_file(archive, dest) {
            Ok(()) => {
                refresh_mtime(dest);
                Outcome {
                    method: Method::Linked,
                    bytes: meta.len(),
                    overwritten: false,
                }
            }
            // The existing name may be a link into the archive; copying
            // through it would rewrite another archived file.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                replace_by_copy(archive, dest, block_size, Method::CopiedOverExisting)?
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                replace_by_copy(archive, dest, block_size, Method::Copied)?
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log_archive_warn!(
                    "Link refused, copying block by block",
                    archive = archive.display().to_string().as_str(),
                );
                replace_by_copy(archive, dest, block_size, Method::BlockCopied)?
            }
            Err(e) => return Err(e.into()),
        };

        log_archive_debug!(
            "Materialised archived file",
            dest = dest.display().to_string().as_str(),
            method = format!("{:?}", outcome.method).as_str(),
            bytes = outcome.bytes,
        );
        Ok(outcome)
    }
}

/// Unlink whatever sits at `dest`, then copy.
fn replace_by_copy(archive: &Path, dest: &Path, block_size: usize, method: Method) -> Result<Outcome> {
    let overwritten = remove_if_present(dest)?;
    let bytes = copy_file(archive, dest, block_size)?;
    let method = if overwritten {
        Method::CopiedOverExisting
    } else {
        method
    };
    Ok(Outcome {
        method,
        bytes,
        overwritten,
    })
}

fn block_size(meta: &fs::Metadata) -> usize {
    match meta.blksize() {
        0 => DEFAULT_BLOCK_SIZE,
        n => n as usize,
    }
}

fn refresh_mtime(dest: &Path) {
    if let Err(e) = filetime::set_file_mtime(dest, FileTime::now()) {
        log_archive_warn!(
            "Failed to refresh mtime",
            dest = dest.display().to_string().as_str(),
            error = e.to_string().as_str(),
        );
    }
}

/// Returns whether something was removed.
fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy with `block_size` reads; on error the destination is unlinked.
fn copy_file(src: &Path, dest: &Path, block_size: usize) -> Result<u64> {
    match copy_blocks(src, dest, block_size) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            let _ = remove_if_present(dest);
            Err(e.into())
        }
    }
}

fn copy_blocks(src: &Path, dest: &Path, block_size: usize) -> io::Result<u64> {
    let mut input = File::open(src)?;
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;

    let mut buf = vec![0u8; block_size];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buf[..n])?;
        total += n as u64;
    }

    if let Err(e) = output.sync_all() {
        if total == 0 {
            log_archive_warn!(
                "Close of empty spool file failed",
                dest = dest.display().to_string().as_str(),
                error = e.to_string().as_str(),
            );
        } else {
            return Err(e);
        }
    }
    Ok(total)
}
