//! Output-log record to archive path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use afd_config::WorkDir;
use afd_olog::LogRecord;

use crate::{ArchiveError, Result};

/// An archived file that exists on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub path: PathBuf,
    /// Leading filesystem id of the archive directory (sharded mode only)
    pub fs_id: Option<u64>,
    pub size: u64,
}

/// Builds archive paths below one archive root
#[derive(Debug, Clone)]
pub struct ArchiveResolver {
    root: PathBuf,
    multi_fs: bool,
}

impl ArchiveResolver {
    pub fn new(work: &WorkDir, multi_fs: bool) -> Self {
        Self {
            root: work.archive_root(),
            multi_fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<archive_dir>/<unique_string>_<local_name>`, without looking
    /// at the disk.
    pub fn path_for(&self, record: &LogRecord) -> Result<PathBuf> {
        let dir = record.archive_dir.as_deref().ok_or_else(|| ArchiveError::NotArchived {
            job_id: record.job_id,
            local_name: record.local_name.clone(),
        })?;
        Ok(self
            .root
            .join(dir)
            .join(format!("{}_{}", record.unique_string, record.local_name)))
    }

    /// Filesystem id carried by the record's archive directory.
    ///
    /// `None` unless sharding is enabled.
    pub fn fs_id(&self, record: &LogRecord) -> Result<Option<u64>> {
        if !self.multi_fs {
            return Ok(None);
        }
        let dir = record.archive_dir.as_deref().unwrap_or("");
        let first = dir.split('/').find(|c| !c.is_empty()).unwrap_or("");
        u64::from_str_radix(first, 16)
            .map(Some)
            .map_err(|_| ArchiveError::InvalidArchiveDir { dir: dir.to_string() })
    }

    /// Resolve and stat the archived file.
    pub fn resolve(&self, record: &LogRecord) -> Result<ArchivedFile> {
        let path = self.path_for(record)?;
        let fs_id = self.fs_id(record)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(ArchivedFile {
                size: meta.len(),
                path,
                fs_id,
            }),
            Ok(_) => Err(ArchiveError::ArchiveMissing { path }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ArchiveError::ArchiveMissing { path }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(archive_dir: Option<&str>) -> LogRecord {
        LogRecord {
            send_time: 0x6523_1a00,
            host_name: "ducktown".to_string(),
            type_offset: 1,
            type_tag: 0,
            local_name: "report.csv".to_string(),
            remote_name: String::new(),
            file_size: 5,
            transfer_seconds: 1.0,
            retries: None,
            job_id: 0x2a,
            unique_string: "6523_1a00_0_1f".to_string(),
            mail_id: None,
            archive_dir: archive_dir.map(str::to_string),
            oversized: false,
        }
    }

    #[test]
    fn test_path_layout() {
        let work = WorkDir::with_root("/srv/afd");
        let resolver = ArchiveResolver::new(&work, false);
        assert_eq!(
            resolver.path_for(&record(Some("ducktown/0/2a"))).unwrap(),
            PathBuf::from("/srv/afd/archive/ducktown/0/2a/6523_1a00_0_1f_report.csv")
        );
    }

    #[test]
    fn test_not_archived() {
        let resolver = ArchiveResolver::new(&WorkDir::with_root("/srv/afd"), false);
        assert!(matches!(
            resolver.resolve(&record(None)),
            Err(ArchiveError::NotArchived { job_id: 0x2a, .. })
        ));
    }

    #[test]
    fn test_missing_and_present() {
        let dir = tempdir().unwrap();
        let work = WorkDir::with_root(dir.path());
        let resolver = ArchiveResolver::new(&work, false);
        let r = record(Some("ducktown/0/2a"));

        assert!(matches!(resolver.resolve(&r), Err(ArchiveError::ArchiveMissing { .. })));

        let path = resolver.path_for(&r).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"hello").unwrap();
        let found = resolver.resolve(&r).unwrap();
        assert_eq!(found.size, 5);
        assert_eq!(found.fs_id, None);
    }

    #[test]
    fn test_fs_id_prefix() {
        let resolver = ArchiveResolver::new(&WorkDir::with_root("/srv/afd"), true);
        assert_eq!(resolver.fs_id(&record(Some("fd01/ducktown/0/2a"))).unwrap(), Some(0xfd01));
        assert!(matches!(
            resolver.fs_id(&record(Some("ducktown/0/2a"))),
            Err(ArchiveError::InvalidArchiveDir { .. })
        ));
    }
}
