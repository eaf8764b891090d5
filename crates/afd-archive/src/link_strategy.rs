//! Link strategy for getting an archived file into a spool directory.
//!
//! A strategy only attempts the zero-copy step and reports the raw error.
//! Deciding what to do on `AlreadyExists` or `CrossesDevices` is the
//! materialiser's job, because those cases need different bookkeeping.

use std::fs;
use std::io;
use std::path::Path;

/// Zero-copy placement of `source` at `target`
pub trait LinkStrategy: Send + Sync {
    /// Place `source` at `target` without copying bytes, or fail with the
    /// underlying error untouched.
    fn link_file(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Name of this strategy (for logging/debugging)
    fn name(&self) -> &'static str;
}

/// `link(2)`: archive and spool share the inode
pub struct HardLinkStrategy;

impl LinkStrategy for HardLinkStrategy {
    fn link_file(&self, source: &Path, target: &Path) -> io::Result<()> {
        fs::hard_link(source, target)
    }

    fn name(&self) -> &'static str {
        "hardlink"
    }
}

/// Never links; every file takes the cross-device copy path.
///
/// For spools on filesystems that refuse hard links altogether.
pub struct CopyStrategy;

impl LinkStrategy for CopyStrategy {
    fn link_file(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::CrossesDevices))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Default strategy
pub fn get_strategy() -> &'static dyn LinkStrategy {
    static STRATEGY: HardLinkStrategy = HardLinkStrategy;
    &STRATEGY
}
