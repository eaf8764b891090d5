//! Work-directory fixture: job tables, host status, one output log and
//! the archive files behind it.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use afd_archive::ArchiveResolver;
use afd_config::{Config, WorkDir};
use afd_dispatch::DispatchContext;
use afd_olog::{LineLayout, LogIndex, LogRecord};
use afd_tables::build::{write_host_status, write_job_tables};
use afd_tables::{DcEntry, DirNameEntry, HostStatus, HostStatusArea, JobDef};
use tempfile::TempDir;

pub const JOB: u32 = 0x2a;
pub const OTHER_JOB: u32 = 0x2b;
pub const HOST: &str = "ducktown";
pub const OTHER_HOST: &str = "pluto";

pub struct Fixture {
    _dir: TempDir,
    pub config: Config,
    pub work: WorkDir,
    records: Vec<LogRecord>,
    next_time: u64,
}

fn job(job_id: u32, host_alias: &str) -> JobDef {
    JobDef {
        job_id,
        dir_id: 1,
        dir_id_pos: 0,
        dir_config_id: 1,
        file_mask_id: 1,
        priority: b'5',
        host_alias: host_alias.to_string(),
        local_options: vec!["archive 2".to_string()],
        standard_options: String::new(),
        recipient: format!("ftp://user@{}/in", host_alias),
    }
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.work_dir = dir.path().to_path_buf();
        let work = config.work_dir();

        write_job_tables(
            &work,
            &[job(JOB, HOST), job(OTHER_JOB, OTHER_HOST)],
            &[DirNameEntry::new(1, "/data/in", "~/in")],
            &[DcEntry::new(1, "DIR_CONFIG")],
        )
        .unwrap();
        write_host_status(&work, &[HostStatus::new(HOST), HostStatus::new(OTHER_HOST)]).unwrap();

        Self {
            _dir: dir,
            config,
            work,
            records: Vec::new(),
            next_time: 0x6523_1a00,
        }
    }

    /// Log a delivered file. When `archived`, `size` bytes are also put into
    /// the archive. Returns the selection position.
    pub fn add(&mut self, local_name: &str, size: u64, job_id: u32, archived: bool) -> usize {
        self.push(local_name, size, 2.0, job_id, archived, archived, None)
    }

    /// Archived below a filesystem-id prefix, as sharded archives are.
    pub fn add_on_fs(&mut self, local_name: &str, size: u64, fs_id: u64) -> usize {
        self.push(local_name, size, 2.0, JOB, true, true, Some(fs_id))
    }

    /// Logged as archived, but the archive file is gone.
    pub fn add_missing(&mut self, local_name: &str, size: u64, job_id: u32) -> usize {
        self.push(local_name, size, 2.0, job_id, true, false, None)
    }

    pub fn add_timed(&mut self, local_name: &str, size: u64, transfer_seconds: f64) -> usize {
        self.push(local_name, size, transfer_seconds, JOB, true, true, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        local_name: &str,
        size: u64,
        transfer_seconds: f64,
        job_id: u32,
        archived: bool,
        in_archive: bool,
        fs_id: Option<u64>,
    ) -> usize {
        let send_time = self.next_time;
        self.next_time += 1;
        let host = if job_id == OTHER_JOB { OTHER_HOST } else { HOST };
        let record = LogRecord {
            send_time,
            host_name: host.to_string(),
            type_offset: 1,
            type_tag: 0,
            local_name: local_name.to_string(),
            remote_name: String::new(),
            file_size: size,
            transfer_seconds,
            retries: None,
            job_id,
            unique_string: format!("{:x}_{:x}_0_{:x}", send_time, job_id, self.records.len()),
            mail_id: None,
            archive_dir: archived.then(|| match fs_id {
                Some(id) => format!("{:x}/{}/0/{:x}", id, host, job_id),
                None => format!("{}/0/{:x}", host, job_id),
            }),
            oversized: false,
        };
        if in_archive {
            let path = ArchiveResolver::new(&self.work, false).path_for(&record).unwrap();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, vec![b'x'; size as usize]).unwrap();
        }
        self.records.push(record);
        self.write_log();
        self.records.len() - 1
    }

    fn write_log(&self) {
        let layout = LineLayout::from(&self.config.log);
        let path = self.work.output_log(&self.config.log.log_name, 0);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let body: String = self.records.iter().map(|r| r.format(&layout)).collect();
        fs::write(path, body).unwrap();
    }

    pub fn index(&self) -> LogIndex {
        LogIndex::open_logs(&self.work, &self.config.log).unwrap()
    }

    pub fn context(&self, grant: &str) -> DispatchContext {
        let mut config = self.config.clone();
        config.permissions.grant = grant.to_string();
        DispatchContext::new(config).unwrap()
    }

    pub fn archive_path(&self, pos: usize) -> PathBuf {
        ArchiveResolver::new(&self.work, false)
            .path_for(&self.records[pos])
            .unwrap()
    }

    /// `(total_file_counter, total_file_size)` of `alias`.
    pub fn host_totals(&self, alias: &str) -> (i32, u64) {
        let area = HostStatusArea::open(&self.work, self.config.log.max_hostname_length).unwrap();
        let entry = area.get(area.position(alias).unwrap()).unwrap();
        (entry.total_file_counter, entry.total_file_size)
    }

    /// Staging directories below `outgoing/<dir_no>/`, sorted.
    pub fn staging_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let outgoing = self.work.outgoing();
        let Ok(numbers) = fs::read_dir(&outgoing) else {
            return dirs;
        };
        for number in numbers {
            for staging in fs::read_dir(number.unwrap().path()).unwrap() {
                dirs.push(staging.unwrap().path());
            }
        }
        dirs.sort();
        dirs
    }

    pub fn root(&self) -> &Path {
        self.work.root()
    }
}
