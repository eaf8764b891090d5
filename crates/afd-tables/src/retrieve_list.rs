//! Listing cache (`rl`): one record per remote file name a retrieving
//! directory has seen.
//!
//! Writers hold the one-byte lock at `LOCK_RETR_PROC` inside the header.
//! The retrieving process may rewrite the list in place between our open
//! and our lock, so the header is read again and the file remapped once
//! the lock is held. A file whose version byte does not match is refused,
//! at open and under the lock, before anything could be written.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use afd_config::{log_rl_info, WorkDir};
use memmap2::MmapMut;

use crate::header::{entries, entries_mut, validate, TableEntry, AFD_WORD_OFFSET};
use crate::lock::{LockKind, RegionLock};
use crate::{c_str, set_c_str, Result, TableError, CURRENT_RL_VERSION, MAX_FILENAME_LENGTH};

/// Header byte locked by processes updating a retrieve list.
pub const LOCK_RETR_PROC: u64 = 2;

/// One retrieve-list record (288 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RetrieveEntry {
    pub file_name: [u8; MAX_FILENAME_LENGTH],
    pub size: i64,
    pub prev_size: i64,
    pub file_mtime: i64,
    pub got_date: u8,
    pub retrieved: u8,
    pub in_list: u8,
    pub assigned: u8,
    pub special_flag: u8,
    pub _pad: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<RetrieveEntry>() == 288);

unsafe impl TableEntry for RetrieveEntry {
    const TABLE: &'static str = "retrieve_list";
    const VERSION: Option<u8> = Some(CURRENT_RL_VERSION);
}

impl RetrieveEntry {
    pub fn new(file_name: &str, size: i64, file_mtime: i64) -> Self {
        let mut entry = Self {
            file_name: [0; MAX_FILENAME_LENGTH],
            size,
            prev_size: 0,
            file_mtime,
            got_date: 1,
            retrieved: 0,
            in_list: 1,
            assigned: 0,
            special_flag: 0,
            _pad: [0; 3],
        };
        set_c_str(&mut entry.file_name, file_name.as_bytes());
        entry
    }

    pub fn name(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(c_str(&self.file_name))
    }

    pub fn is_retrieved(&self) -> bool {
        self.retrieved != 0
    }
}

/// Writable mapping of one `rl` file
pub struct RetrieveList {
    path: PathBuf,
    file: File,
    map: MmapMut,
    count: usize,
}

impl RetrieveList {
    /// Open the listing cache of `dir_alias`.
    pub fn open(work: &WorkDir, dir_alias: &str) -> Result<Self> {
        Self::open_path(&work.listing_cache(dir_alias))
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let (map, count) = map_list(&file)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn entries(&self) -> &[RetrieveEntry] {
        entries::<RetrieveEntry>(&self.map, self.count)
    }

    pub fn find(&self, file_name: &str) -> Option<&RetrieveEntry> {
        self.entries()
            .iter()
            .find(|e| c_str(&e.file_name) == file_name.as_bytes())
    }

    /// Set or clear the `retrieved` flag.
    ///
    /// With an empty `names` every entry is changed. Returns the number of
    /// entries whose flag actually flipped. A held `LOCK_RETR_PROC` is
    /// reported as `LockContention` and nothing is touched.
    pub fn set_retrieved(&mut self, names: &[&str], retrieved: bool) -> Result<usize> {
        let _guard = match RegionLock::try_acquire(&self.file, LOCK_RETR_PROC, LockKind::Write) {
            Ok(guard) => guard,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                return Err(TableError::LockContention {
                    path: self.path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if self.file.metadata()?.len() != self.map.len() as u64 {
            let (map, count) = map_list(&self.file)?;
            self.map = map;
            self.count = count;
        } else {
            self.count = validate::<RetrieveEntry>(&self.map)?;
        }

        let flag = u8::from(retrieved);
        let mut changed = 0;
        for entry in entries_mut::<RetrieveEntry>(&mut self.map, self.count) {
            let selected = names.is_empty()
                || names.iter().any(|n| c_str(&entry.file_name) == n.as_bytes());
            if selected && entry.retrieved != flag {
                entry.retrieved = flag;
                changed += 1;
            }
        }
        self.map.flush()?;
        log_rl_info!(
            "Retrieve list updated",
            path = self.path.display().to_string().as_str(),
            retrieved = retrieved,
            changed = changed,
        );
        Ok(changed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Map the whole file and validate its header.
fn map_list(file: &File) -> Result<(MmapMut, usize)> {
    let len = file.metadata()?.len();
    if len < AFD_WORD_OFFSET as u64 {
        return Err(TableError::Truncated {
            table: RetrieveEntry::TABLE,
            len: len as usize,
            needed: AFD_WORD_OFFSET,
        });
    }
    // Safety: the retrieving process resizes the list only while holding
    // LOCK_RETR_PROC; callers remap under that lock before touching entries.
    let map = unsafe { MmapMut::map_mut(file)? };
    let count = validate::<RetrieveEntry>(&map)?;
    Ok((map, count))
}
