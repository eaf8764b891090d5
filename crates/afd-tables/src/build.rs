//! Table writers.
//!
//! The daemon owns these files in production; the writers here exist so a
//! work directory can be stood up from scratch (fixtures, `show_olog`
//! self-checks). Files are written beside the target and renamed into
//! place, so a reader never maps a half-written table.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use afd_config::WorkDir;

use crate::header::{TableEntry, TableHeader};
use crate::host_status::HostStatus;
use crate::job_store::{DcEntry, DirNameEntry, JobDef, JobIdEntry};
use crate::retrieve_list::RetrieveEntry;

/// Write `entries` behind a header carrying `T::VERSION`.
pub fn write_table<T: TableEntry>(path: &Path, entries: &[T]) -> io::Result<()> {
    write_table_with_version(path, T::VERSION.unwrap_or(0), entries)
}

/// Write `entries` behind a header carrying an explicit version byte.
pub fn write_table_with_version<T: TableEntry>(
    path: &Path,
    version: u8,
    entries: &[T],
) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(TableHeader::new(entries.len(), version).as_bytes())?;
        for entry in entries {
            file.write_all(entry.as_bytes())?;
        }
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Job-id, directory-name and DIR_CONFIG tables of one work directory.
pub fn write_job_tables(
    work: &WorkDir,
    jobs: &[JobDef],
    dirs: &[DirNameEntry],
    dcs: &[DcEntry],
) -> io::Result<()> {
    let jobs: Vec<JobIdEntry> = jobs.iter().map(JobIdEntry::from_def).collect();
    write_table(&work.job_id_file(), &jobs)?;
    write_table(&work.dir_name_file(), dirs)?;
    write_table(&work.dc_list_file(), dcs)
}

pub fn write_host_status(work: &WorkDir, hosts: &[HostStatus]) -> io::Result<()> {
    write_table(&work.fsa_file(), hosts)
}

pub fn write_retrieve_list(work: &WorkDir, dir_alias: &str, entries: &[RetrieveEntry]) -> io::Result<()> {
    write_table(&work.listing_cache(dir_alias), entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MappedTable;
    use crate::TableError;
    use tempfile::tempdir;

    #[test]
    fn test_written_table_maps_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dc_list_data");
        write_table(&path, &[DcEntry::new(1, "DIR_CONFIG"), DcEntry::new(9, "DIR_CONFIG.ftp")]).unwrap();

        let table = MappedTable::<DcEntry>::open(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().dc_id, 9);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_unversioned_table_accepts_any_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory_names");
        write_table_with_version(&path, 42, &[DirNameEntry::new(1, "/data/in", "/data/in")]).unwrap();
        assert_eq!(MappedTable::<DirNameEntry>::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_body_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dc_list_data");
        write_table(&path, &[DcEntry::new(1, "DIR_CONFIG")]).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let err = MappedTable::<DcEntry>::open(&path).err().unwrap();
        assert!(matches!(err, TableError::Truncated { table: "dc_list_data", .. }));
    }
}
