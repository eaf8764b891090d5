//! Shared unique-number counter.
//!
//! One native-endian `i32` in a small file below the FIFO directory. Every
//! AFD process that creates spool names increments it under an exclusive
//! whole-file lock, and the new value is on disk before anyone uses it.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};

use afd_config::WorkDir;
use fs2::FileExt;

/// Open handle on the counter file
#[derive(Debug)]
pub struct CounterFile {
    file: File,
    path: PathBuf,
}

/// Releases the whole-file lock on every exit path.
struct CounterLock<'a>(&'a File);

impl<'a> CounterLock<'a> {
    fn acquire(file: &'a File) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self(file))
    }
}

impl Drop for CounterLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.0);
    }
}

impl CounterFile {
    pub fn open(work: &WorkDir) -> io::Result<Self> {
        Self::open_path(&work.counter_file())
    }

    /// Open, creating a zeroed counter if the file does not exist yet.
    pub fn open_path(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value without incrementing.
    pub fn current(&self) -> io::Result<u32> {
        let _lock = CounterLock::acquire(&self.file)?;
        self.read_value()
    }

    /// Increment, wrapping to 0 once `max` is reached, and return the new
    /// value.
    pub fn next_counter(&mut self, max: u32) -> io::Result<u32> {
        let _lock = CounterLock::acquire(&self.file)?;
        let current = self.read_value()?;
        let next = match current.checked_add(1) {
            Some(n) if n < max => n,
            _ => 0,
        };
        self.file.write_all_at(&(next as i32).to_ne_bytes(), 0)?;
        self.file.sync_data()?;
        Ok(next)
    }

    fn read_value(&self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled < buf.len() {
            // Fresh or truncated file starts over.
            return Ok(0);
        }
        Ok(i32::from_ne_bytes(buf).max(0) as u32)
    }
}
