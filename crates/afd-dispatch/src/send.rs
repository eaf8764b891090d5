//! Send: hand archived files to the external send tool.
//!
//! A manifest with one `archive_path|file_name` line per file is written to
//! the work tmp directory, then the tool is started as
//! `<tool> -f <font> <manifest>` with `WORK_DIR_ID` in its environment.
//! The manifest is created with the real uid, so a set-uid installation
//! drops its effective uid for the open and restores it after the spawn.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use afd_archive::{ArchiveError, ArchiveResolver};
use afd_config::{log_send_info, log_send_warn};
use afd_olog::{LogIndex, Selection};
use nix::unistd::{geteuid, getuid, seteuid, Uid};
use serde::Serialize;

use crate::context::DispatchContext;
use crate::{DispatchError, Result};

/// Environment variable naming the work directory for the send tool.
pub const WORK_DIR_ID_ENV: &str = "WORK_DIR_ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub sent: u32,
    pub not_archived: u32,
    pub not_in_archive: u32,
    pub not_found: u32,
    pub limit_reached: Option<u32>,
    pub stopped: bool,
    /// Manifest handed to the tool; `None` when nothing was sendable
    pub manifest: Option<PathBuf>,
    /// Process id of the started tool
    pub pid: Option<u32>,
}

/// Runs with the real uid as effective uid until dropped.
struct RealUidGuard {
    restore: Option<Uid>,
}

impl RealUidGuard {
    fn enter() -> io::Result<Self> {
        let real = getuid();
        let effective = geteuid();
        if real == effective {
            return Ok(Self { restore: None });
        }
        seteuid(real)?;
        Ok(Self {
            restore: Some(effective),
        })
    }
}

impl Drop for RealUidGuard {
    fn drop(&mut self) {
        if let Some(uid) = self.restore {
            if let Err(e) = seteuid(uid) {
                log_send_warn!("Could not restore effective uid", uid = uid.as_raw(), error = e.to_string().as_str());
            }
        }
    }
}

pub struct SendDispatcher<'a> {
    ctx: &'a DispatchContext,
    resolver: ArchiveResolver,
    running: Vec<Child>,
}

impl<'a> SendDispatcher<'a> {
    pub fn new(ctx: &'a DispatchContext) -> Self {
        Self {
            ctx,
            resolver: ArchiveResolver::new(&ctx.work, ctx.config.resend.multi_fs),
            running: Vec::new(),
        }
    }

    /// Send tools started here that have not exited yet.
    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.running.len()
    }

    /// Wait for every send tool started here. Returns the status of the
    /// last one started, or the first wait error.
    pub fn wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let mut last = None;
        let mut failed = None;
        for mut child in self.running.drain(..) {
            match child.wait() {
                Ok(status) => last = Some(status),
                Err(e) => {
                    failed.get_or_insert(e);
                }
            }
        }
        match failed {
            Some(e) => Err(e),
            None => Ok(last),
        }
    }

    fn reap(&mut self) {
        self.running.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }

    pub fn send(&mut self, index: &LogIndex, selection: &mut Selection) -> Result<SendReport> {
        let limit = self.ctx.permissions.send;
        if !limit.is_permitted() {
            return Err(DispatchError::NoPermission { action: "send" });
        }

        self.reap();
        let mut report = SendReport::default();
        let mut chosen = Vec::new();
        let mut lines = String::new();
        for pos in selection.positions() {
            if self.ctx.stopped() {
                report.stopped = true;
                break;
            }
            if let Some(n) = limit.reached(chosen.len() as u32) {
                report.limit_reached = Some(n);
                break;
            }
            let record = match index.fetch(pos) {
                Ok(record) => record,
                Err(e) => {
                    log_send_warn!(
                        "Cannot read log entry",
                        error = DispatchError::from_log(pos, e).to_string().as_str(),
                    );
                    report.not_found += 1;
                    continue;
                }
            };
            if record.oversized {
                report.not_in_archive += 1;
                continue;
            }
            match self.resolver.resolve(&record) {
                Ok(archived) => {
                    lines.push_str(&format!("{}|{}\n", archived.path.display(), record.local_name));
                    chosen.push(pos);
                }
                Err(ArchiveError::NotArchived { .. }) => report.not_archived += 1,
                Err(_) => report.not_in_archive += 1,
            }
        }
        if chosen.is_empty() {
            return Ok(report);
        }

        let tmp_dir = self.ctx.work.tmp_dir();
        fs::create_dir_all(&tmp_dir)?;

        let guard = RealUidGuard::enter()?;
        let mut manifest = tempfile::Builder::new()
            .prefix("send_file_")
            .tempfile_in(&tmp_dir)?;
        manifest.write_all(lines.as_bytes())?;
        manifest.flush()?;
        let (_, manifest_path) = manifest.keep().map_err(|e| e.error)?;

        let spawned = Command::new(&self.ctx.config.send.tool)
            .arg("-f")
            .arg(&self.ctx.config.send.font)
            .arg(&manifest_path)
            .env(WORK_DIR_ID_ENV, self.ctx.work.root())
            .stdin(Stdio::null())
            .spawn();
        drop(guard);
        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = fs::remove_file(&manifest_path);
                return Err(e.into());
            }
        };

        log_send_info!(
            "Started send tool",
            pid = child.id(),
            files = chosen.len(),
            manifest = manifest_path.display().to_string().as_str(),
        );
        report.pid = Some(child.id());
        self.running.push(child);
        for pos in &chosen {
            selection.deselect(*pos);
        }
        report.sent = chosen.len() as u32;
        report.manifest = Some(manifest_path);
        Ok(report)
    }
}
