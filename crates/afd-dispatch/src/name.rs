//! Spool directory names.
//!
//! A staging directory lives at
//! `<outgoing>/[<fs_id>/]<dir_no>/<priority>_<time>_<job_id>_<split>_<unique>`
//! (all numbers lower-case hex). The message name is everything after the
//! spool root, so its first component is always `dir_no`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use afd_config::{log_resend_debug, ResendConfig, WorkDir};

use crate::counter::CounterFile;

/// Upper bound on fresh unique numbers tried before giving up on a name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A freshly created, empty staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDir {
    pub path: PathBuf,
    /// `<dir_no>/<priority>_<time>_<job_id>_<split>_<unique>`
    pub msg_name: String,
    pub creation_time: i64,
    pub job_id: u32,
    pub split_job_counter: u32,
    pub unique_number: u32,
    pub fs_id: Option<u64>,
}

/// Hex `dir_no` from the leading component of a message name.
pub fn parse_dir_no(msg_name: &str) -> Option<u16> {
    let first = msg_name.split('/').next()?;
    u16::from_str_radix(first, 16).ok()
}

/// First `<base>/<n:hex>` directory holding fewer than `max_files_per_dir`
/// entries; missing directories are created and count as empty.
pub fn get_dir_number(base: &Path, max_files_per_dir: usize) -> io::Result<u16> {
    for dir_no in 0..=u16::MAX {
        let dir = base.join(format!("{:x}", dir_no));
        match fs::read_dir(&dir) {
            Ok(entries) => {
                if entries.take(max_files_per_dir).count() < max_files_per_dir {
                    return Ok(dir_no);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&dir)?;
                return Ok(dir_no);
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::Other,
        format!("{}: every spool directory is full", base.display()),
    ))
}

/// Creates unique staging directories below the outgoing spool
#[derive(Debug)]
pub struct NameGenerator {
    outgoing: PathBuf,
    counter: CounterFile,
    counter_max: u32,
    max_files_per_dir: usize,
}

impl NameGenerator {
    pub fn open(work: &WorkDir, cfg: &ResendConfig) -> io::Result<Self> {
        Ok(Self::new(work.outgoing(), CounterFile::open(work)?, cfg))
    }

    pub fn new(outgoing: PathBuf, counter: CounterFile, cfg: &ResendConfig) -> Self {
        Self {
            outgoing,
            counter,
            counter_max: cfg.counter_max,
            max_files_per_dir: cfg.max_files_per_dir.max(1),
        }
    }

    /// Create a new staging directory. A name that already exists (another
    /// client got the same number after a wrap) is skipped by drawing the
    /// next unique number.
    pub fn create_name(
        &mut self,
        priority: u8,
        creation_time: i64,
        job_id: u32,
        split_job_counter: u32,
        fs_id: Option<u64>,
    ) -> io::Result<StagingDir> {
        let base = match fs_id {
            Some(id) => self.outgoing.join(format!("{:x}", id)),
            None => self.outgoing.clone(),
        };

        for _ in 0..MAX_NAME_ATTEMPTS {
            let unique_number = self.counter.next_counter(self.counter_max)?;
            let dir_no = get_dir_number(&base, self.max_files_per_dir)?;
            let msg_name = format!(
                "{:x}/{}_{:x}_{:x}_{:x}_{:x}",
                dir_no, priority as char, creation_time, job_id, split_job_counter, unique_number
            );
            let path = base.join(&msg_name);
            match fs::create_dir(&path) {
                Ok(()) => {
                    log_resend_debug!("Created staging directory", msg_name = msg_name.as_str());
                    return Ok(StagingDir {
                        path,
                        msg_name,
                        creation_time,
                        job_id,
                        split_job_counter,
                        unique_number,
                        fs_id,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free staging name for job {:x}", job_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn generator(root: &Path, max_files_per_dir: usize) -> NameGenerator {
        let cfg = ResendConfig {
            max_files_per_dir,
            ..ResendConfig::default()
        };
        let counter = CounterFile::open_path(&root.join("fifodir/counter")).unwrap();
        NameGenerator::new(root.join("outgoing"), counter, &cfg)
    }

    #[test]
    fn test_name_layout() {
        let dir = tempdir().unwrap();
        let mut names = generator(dir.path(), 100);
        let staging = names.create_name(b'5', 0x6523_1a00, 0x2a, 0, None).unwrap();
        assert_eq!(staging.msg_name, "0/5_65231a00_2a_0_1");
        assert_eq!(staging.path, dir.path().join("outgoing/0/5_65231a00_2a_0_1"));
        assert!(staging.path.is_dir());
        assert_eq!(parse_dir_no(&staging.msg_name), Some(0));
    }

    #[test]
    fn test_unique_numbers_differ() {
        let dir = tempdir().unwrap();
        let mut names = generator(dir.path(), 100);
        let a = names.create_name(b'5', 100, 1, 0, None).unwrap();
        let b = names.create_name(b'5', 100, 1, 0, None).unwrap();
        assert_ne!(a.unique_number, b.unique_number);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn test_existing_name_is_skipped() {
        let dir = tempdir().unwrap();
        let mut names = generator(dir.path(), 100);
        fs::create_dir_all(dir.path().join("outgoing/0/5_64_1_0_1")).unwrap();
        let staging = names.create_name(b'5', 100, 1, 0, None).unwrap();
        assert_eq!(staging.unique_number, 2);
    }

    #[test]
    fn test_full_directory_moves_on() {
        let dir = tempdir().unwrap();
        let mut names = generator(dir.path(), 2);
        let a = names.create_name(b'1', 1, 1, 0, None).unwrap();
        let b = names.create_name(b'1', 1, 1, 0, None).unwrap();
        let c = names.create_name(b'1', 1, 1, 0, None).unwrap();
        assert_eq!(parse_dir_no(&a.msg_name), Some(0));
        assert_eq!(parse_dir_no(&b.msg_name), Some(0));
        assert_eq!(parse_dir_no(&c.msg_name), Some(1));
    }

    #[test]
    fn test_sharded_prefix() {
        let dir = tempdir().unwrap();
        let mut names = generator(dir.path(), 100);
        let staging = names.create_name(b'9', 1, 1, 0, Some(0xfd01)).unwrap();
        assert!(staging.path.starts_with(dir.path().join("outgoing/fd01/0")));
        assert_eq!(staging.fs_id, Some(0xfd01));
    }

    #[test]
    fn test_parse_dir_no() {
        assert_eq!(parse_dir_no("1f/5_1_2_0_3"), Some(0x1f));
        assert_eq!(parse_dir_no("zz/5_1_2_0_3"), None);
    }
}
