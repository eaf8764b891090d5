//! Host-status area (FSA): per-host transfer counters shared with the daemon.
//!
//! The tools only ever touch `total_file_counter` and `total_file_size`,
//! always under the entry's `LOCK_TFC` byte so the daemon's own
//! read-modify-write cannot interleave with ours.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use afd_config::{log_tables_debug, log_tables_warn, WorkDir};
use memmap2::MmapMut;

use crate::header::{entries, entries_mut, validate, TableEntry, AFD_WORD_OFFSET};
use crate::lock::{LockKind, RegionLock};
use crate::{c_str, set_c_str, Result, TableError, CURRENT_FSA_VERSION};

/// Size of the alias buffer in a host entry.
pub const MAX_HOSTNAME_BUFFER: usize = 16;

/// Lock byte inside each host entry guarding the transfer counters.
pub const LOCK_TFC: usize = std::mem::offset_of!(HostStatus, total_file_counter);

/// One host entry (64 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostStatus {
    pub host_alias: [u8; MAX_HOSTNAME_BUFFER],
    pub total_file_size: u64,
    pub file_size_done: u64,
    pub bytes_send: u64,
    pub total_file_counter: i32,
    pub file_counter_done: u32,
    pub jobs_queued: u32,
    pub error_counter: i32,
    pub host_status: u32,
    pub _reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<HostStatus>() == 64);

unsafe impl TableEntry for HostStatus {
    const TABLE: &'static str = "fsa_status";
    const VERSION: Option<u8> = Some(CURRENT_FSA_VERSION);
}

impl HostStatus {
    pub fn new(host_alias: &str) -> Self {
        let mut entry = Self {
            host_alias: [0; MAX_HOSTNAME_BUFFER],
            total_file_size: 0,
            file_size_done: 0,
            bytes_send: 0,
            total_file_counter: 0,
            file_counter_done: 0,
            jobs_queued: 0,
            error_counter: 0,
            host_status: 0,
            _reserved: [0; 4],
        };
        set_c_str(&mut entry.host_alias, host_alias.as_bytes());
        entry
    }

    pub fn alias(&self) -> String {
        String::from_utf8_lossy(c_str(&self.host_alias)).into_owned()
    }
}

/// Writable mapping of the host-status file
pub struct HostStatusArea {
    path: PathBuf,
    file: File,
    map: MmapMut,
    count: usize,
    max_hostname_length: usize,
}

impl HostStatusArea {
    /// Map `<work>/<fifo_dir>/<fsa_file>` read-write.
    pub fn open(work: &WorkDir, max_hostname_length: usize) -> Result<Self> {
        Self::open_path(&work.fsa_file(), max_hostname_length)
    }

    pub fn open_path(path: &Path, max_hostname_length: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(TableError::Truncated {
                table: HostStatus::TABLE,
                len: 0,
                needed: AFD_WORD_OFFSET,
            });
        }
        // Safety: shared with the daemon, which only changes the mapping
        // under the same per-entry locks.
        let map = unsafe { MmapMut::map_mut(&file)? };
        let count = validate::<HostStatus>(&map)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            count,
            max_hostname_length,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Index of `host_alias`, comparing both sides truncated to the
    /// configured hostname length.
    pub fn position(&self, host_alias: &str) -> Option<usize> {
        let wanted = truncate(host_alias.as_bytes(), self.max_hostname_length);
        entries::<HostStatus>(&self.map, self.count)
            .iter()
            .position(|h| truncate(c_str(&h.host_alias), self.max_hostname_length) == wanted)
    }

    /// Snapshot of one entry.
    pub fn get(&self, index: usize) -> Option<HostStatus> {
        entries::<HostStatus>(&self.map, self.count).get(index).copied()
    }

    /// Apply `(delta_count, delta_bytes)` to the host's totals.
    ///
    /// An unknown host is not an error; returns `Ok(None)` so callers can
    /// still publish. Totals clamp at zero.
    pub fn adjust(&mut self, host_alias: &str, delta_count: i32, delta_bytes: i64) -> Result<Option<usize>> {
        match self.position(host_alias) {
            Some(index) => {
                self.adjust_at(index, delta_count, delta_bytes)?;
                Ok(Some(index))
            }
            None => {
                log_tables_debug!("Host not in status area, counters untouched", host = host_alias);
                Ok(None)
            }
        }
    }

    pub fn adjust_at(&mut self, index: usize, delta_count: i32, delta_bytes: i64) -> Result<()> {
        if index >= self.count {
            return Err(TableError::OutOfRange {
                table: HostStatus::TABLE,
                index,
                count: self.count,
            });
        }
        let lock_offset = AFD_WORD_OFFSET + index * std::mem::size_of::<HostStatus>() + LOCK_TFC;
        let _guard = RegionLock::acquire(&self.file, lock_offset as u64, LockKind::Write)?;

        let entry = &mut entries_mut::<HostStatus>(&mut self.map, self.count)[index];
        let counter = entry.total_file_counter as i64 + delta_count as i64;
        if counter < 0 {
            log_tables_warn!(
                "total_file_counter would go negative, clamping",
                host = entry.alias().as_str(),
                counter = counter,
            );
        }
        entry.total_file_counter = counter.clamp(0, i32::MAX as i64) as i32;

        let size = entry.total_file_size as i128 + delta_bytes as i128;
        if size < 0 {
            log_tables_warn!(
                "total_file_size would go negative, clamping",
                host = entry.alias().as_str(),
                size = size as i64,
            );
        }
        entry.total_file_size = size.clamp(0, u64::MAX as i128) as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn truncate(alias: &[u8], max: usize) -> &[u8] {
    &alias[..alias.len().min(max)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::write_table;
    use tempfile::tempdir;

    fn area(hosts: &[HostStatus]) -> (tempfile::TempDir, HostStatusArea) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fsa_status");
        write_table(&path, hosts).unwrap();
        let area = HostStatusArea::open_path(&path, 8).unwrap();
        (dir, area)
    }

    #[test]
    fn test_lock_byte_inside_entry() {
        assert_eq!(LOCK_TFC, 40);
    }

    #[test]
    fn test_adjust_positive_and_negative() {
        let (_dir, mut area) = area(&[HostStatus::new("alpha"), HostStatus::new("beta")]);
        assert_eq!(area.adjust("beta", 3, 1500).unwrap(), Some(1));
        let beta = area.get(1).unwrap();
        assert_eq!(beta.total_file_counter, 3);
        assert_eq!(beta.total_file_size, 1500);

        area.adjust("beta", -3, -1500).unwrap();
        let beta = area.get(1).unwrap();
        assert_eq!(beta.total_file_counter, 0);
        assert_eq!(beta.total_file_size, 0);
        assert_eq!(area.get(0).unwrap().total_file_counter, 0);
    }

    #[test]
    fn test_unknown_host_is_silent() {
        let (_dir, mut area) = area(&[HostStatus::new("alpha")]);
        assert_eq!(area.adjust("gamma", 1, 10).unwrap(), None);
        assert_eq!(area.get(0).unwrap().total_file_counter, 0);
    }

    #[test]
    fn test_lookup_uses_truncated_alias() {
        let (_dir, area) = area(&[HostStatus::new("longhostname")]);
        assert_eq!(area.position("longhost"), Some(0));
        assert_eq!(area.position("longhostXYZ"), Some(0));
        assert_eq!(area.position("longhos"), None);
    }

    #[test]
    fn test_adjust_clamps_at_zero() {
        let (_dir, mut area) = area(&[HostStatus::new("alpha")]);
        area.adjust("alpha", -2, -100).unwrap();
        let h = area.get(0).unwrap();
        assert_eq!(h.total_file_counter, 0);
        assert_eq!(h.total_file_size, 0);
    }

    #[test]
    fn test_changes_visible_through_file() {
        let (dir, mut area) = area(&[HostStatus::new("alpha")]);
        area.adjust("alpha", 1, 1000).unwrap();
        drop(area);
        let reopened = HostStatusArea::open_path(&dir.path().join("fsa_status"), 8).unwrap();
        assert_eq!(reopened.get(0).unwrap().total_file_size, 1000);
    }
}
