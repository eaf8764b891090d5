//! Resend: stage archived files into the outgoing spool and announce each
//! batch on the message FIFO.
//!
//! Selected handles are grouped by job id. Each job is walked in selection
//! order; every `max_copied_files` materialised files (and the tail of the
//! job) form one batch:
//!
//! 1. the host-status totals of the job's host are raised by the batch
//! 2. the batch message is written to the FIFO
//! 3. the batch's handles are deselected
//!
//! A failed publish lowers the totals again and removes the staging
//! directory. Batches already published stay published.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use afd_archive::{ArchiveError, ArchiveResolver, Materialiser};
use afd_config::{log_resend_debug, log_resend_error, log_resend_info, log_resend_warn};
use afd_olog::{LogIndex, Selection};
use afd_tables::{HostStatusArea, JobDef, JobInfoStore};
use serde::Serialize;

use crate::context::DispatchContext;
use crate::message::{MessageLayout, OutboundMessage, SHOW_OLOG_NO};
use crate::name::{parse_dir_no, NameGenerator, StagingDir};
use crate::publisher::{FifoPublisher, Publisher};
use crate::{DispatchError, Result};

/// Outcome of one resend invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResendReport {
    /// Files announced in published batches
    pub resent: u32,
    pub not_archived: u32,
    pub not_in_archive: u32,
    /// Staged files that replaced one of the same name
    pub overwrites: u32,
    pub not_found: u32,
    /// Set to the limit when the user allowance ran out
    pub limit_reached: Option<u32>,
    pub stopped: bool,
    /// Published messages, in publish order
    pub messages: Vec<OutboundMessage>,
}

impl ResendReport {
    /// One line naming every non-zero counter.
    pub fn summary_line(&self) -> String {
        let mut parts = vec![if self.resent == 1 {
            "1 file resend".to_string()
        } else {
            format!("{} files resend", self.resent)
        }];
        for (n, what) in [
            (self.not_archived, "not archived"),
            (self.not_in_archive, "not in archive"),
            (self.overwrites, "overwrites"),
            (self.not_found, "not found"),
        ] {
            if n > 0 {
                parts.push(format!("{} {}", n, what));
            }
        }
        if let Some(limit) = self.limit_reached {
            parts.push(DispatchError::LimitReached { limit }.to_string());
        }
        parts.join(", ")
    }
}

impl fmt::Display for ResendReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_line())
    }
}

/// One job's walk through the selection
struct JobPass {
    job: JobDef,
    staging: Option<StagingDir>,
    positions: Vec<usize>,
    bytes: u64,
    batches: u32,
    split_job_counter: u32,
    last_time: i64,
}

impl JobPass {
    fn new(job: JobDef) -> Self {
        Self {
            job,
            staging: None,
            positions: Vec::new(),
            bytes: 0,
            batches: 0,
            split_job_counter: 0,
            last_time: 0,
        }
    }

    fn files(&self) -> u32 {
        self.positions.len() as u32
    }

    /// A file on another filesystem cannot join the open batch.
    fn fs_id_differs(&self, fs_id: Option<u64>) -> bool {
        matches!(&self.staging, Some(s) if s.fs_id != fs_id)
    }
}

pub struct ResendDispatcher<'a, P: Publisher = FifoPublisher> {
    ctx: &'a DispatchContext,
    jobs: JobInfoStore,
    hosts: HostStatusArea,
    names: NameGenerator,
    publisher: P,
    resolver: ArchiveResolver,
    materialiser: Materialiser,
    layout: MessageLayout,
}

impl<'a> ResendDispatcher<'a, FifoPublisher> {
    /// Open the tables, counter file and message FIFO of `ctx`'s work
    /// directory.
    pub fn open(ctx: &'a DispatchContext) -> Result<Self> {
        let publisher = FifoPublisher::open(&ctx.work.msg_fifo(), ctx.config.resend.fifo_mode)?;
        Self::with_publisher(ctx, publisher)
    }
}

impl<'a, P: Publisher> ResendDispatcher<'a, P> {
    pub fn with_publisher(ctx: &'a DispatchContext, publisher: P) -> Result<Self> {
        let jobs = JobInfoStore::open(&ctx.work)?;
        let hosts = HostStatusArea::open(&ctx.work, ctx.config.log.max_hostname_length)?;
        let names = NameGenerator::open(&ctx.work, &ctx.config.resend)?;
        Ok(Self {
            ctx,
            jobs,
            hosts,
            names,
            publisher,
            resolver: ArchiveResolver::new(&ctx.work, ctx.config.resend.multi_fs),
            materialiser: Materialiser::new(),
            layout: MessageLayout::from_config(&ctx.config.resend),
        })
    }

    pub fn with_materialiser(mut self, materialiser: Materialiser) -> Self {
        self.materialiser = materialiser;
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn host_status(&self) -> &HostStatusArea {
        &self.hosts
    }

    /// Resend every archived file in `selection`.
    ///
    /// Published handles are removed from `selection`; everything else
    /// stays selected and is counted in the report.
    pub fn resend(&mut self, index: &LogIndex, selection: &mut Selection) -> Result<ResendReport> {
        let limit = self.ctx.permissions.resend;
        if !limit.is_permitted() {
            return Err(DispatchError::NoPermission { action: "resend" });
        }
        let max_copied_files = self.ctx.config.resend.max_copied_files.max(1);

        let mut report = ResendReport::default();
        let mut pending: Vec<(usize, u32)> = Vec::new();
        for pos in selection.positions() {
            match index.get(pos) {
                None => report.not_found += 1,
                Some(entry) if !entry.archived => report.not_archived += 1,
                Some(entry) => pending.push((pos, entry.job_id)),
            }
        }

        let mut materialised = 0u32;
        'jobs: while let Some(&(_, job_id)) = pending.first() {
            let (this_job, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|&(_, j)| j == job_id);
            pending = rest;

            let Some(job) = self.jobs.job(job_id).map(|j| j.to_def()) else {
                log_resend_warn!("Job id not in job table", job_id = job_id, files = this_job.len());
                report.not_found += this_job.len() as u32;
                continue;
            };
            let mut pass = JobPass::new(job);

            for (pos, _) in this_job {
                if self.ctx.stopped() {
                    report.stopped = true;
                    self.flush(&mut pass, selection, &mut report)?;
                    break 'jobs;
                }
                if let Some(n) = limit.reached(materialised - report.overwrites) {
                    report.limit_reached = Some(n);
                    self.flush(&mut pass, selection, &mut report)?;
                    break 'jobs;
                }

                let record = match index.fetch(pos) {
                    Ok(record) => record,
                    Err(e) => {
                        log_resend_warn!(
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
                let archived = match self.resolver.resolve(&record) {
                    Ok(archived) => archived,
                    Err(ArchiveError::NotArchived { .. }) => {
                        report.not_archived += 1;
                        continue;
                    }
                    Err(e) => {
                        log_resend_debug!(
                            "Skipping handle",
                            error = DispatchError::from_archive(pos, e).to_string().as_str(),
                        );
                        report.not_in_archive += 1;
                        continue;
                    }
                };

                if pass.fs_id_differs(archived.fs_id) {
                    self.flush(&mut pass, selection, &mut report)?;
                }
                let staging = self.staging_for(&mut pass, archived.fs_id)?;
                let dest = staging.join(&record.local_name);
                match self.materialiser.materialise(&archived.path, &dest) {
                    Ok(outcome) => {
                        materialised += 1;
                        if outcome.overwritten {
                            report.overwrites += 1;
                        }
                        pass.positions.push(pos);
                        pass.bytes += outcome.bytes;
                    }
                    Err(ArchiveError::ArchiveMissing { .. }) => {
                        report.not_in_archive += 1;
                        continue;
                    }
                    Err(e) => {
                        log_resend_error!(
                            "Staging failed, abandoning batch",
                            dest = dest.display().to_string().as_str(),
                            error = e.to_string().as_str(),
                        );
                        if let Some(s) = pass.staging.take() {
                            remove_staging(&s.path);
                        }
                        return Err(DispatchError::from_archive(pos, e));
                    }
                }

                if pass.files() >= max_copied_files {
                    self.flush(&mut pass, selection, &mut report)?;
                }
            }
            self.flush(&mut pass, selection, &mut report)?;
        }

        log_resend_info!("Resend finished", summary = report.summary_line().as_str());
        Ok(report)
    }

    /// Staging directory of the open batch, creating one if needed.
    fn staging_for(&mut self, pass: &mut JobPass, fs_id: Option<u64>) -> Result<PathBuf> {
        if let Some(s) = &pass.staging {
            return Ok(s.path.clone());
        }
        let now = unix_now();
        pass.split_job_counter = if pass.batches > 0 && pass.last_time == now {
            pass.split_job_counter + 1
        } else {
            0
        };
        pass.last_time = now;
        pass.batches += 1;

        let staging = self.names.create_name(
            pass.job.priority,
            now,
            pass.job.job_id,
            pass.split_job_counter,
            fs_id,
        )?;
        let path = staging.path.clone();
        pass.staging = Some(staging);
        Ok(path)
    }

    /// Publish the open batch, if any.
    fn flush(&mut self, pass: &mut JobPass, selection: &mut Selection, report: &mut ResendReport) -> Result<()> {
        let Some(staging) = pass.staging.take() else {
            return Ok(());
        };
        let positions = std::mem::take(&mut pass.positions);
        let bytes = std::mem::take(&mut pass.bytes);
        let files = positions.len() as u32;
        if files == 0 {
            remove_staging(&staging.path);
            return Ok(());
        }

        let dir_no = parse_dir_no(&staging.msg_name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message name without dir number: {}", staging.msg_name),
            )
        })?;
        let message = OutboundMessage {
            creation_time: staging.creation_time,
            fs_id: staging.fs_id,
            job_id: staging.job_id,
            split_job_counter: staging.split_job_counter,
            files_to_send: files,
            total_bytes: bytes,
            unique_number: staging.unique_number,
            dir_no,
            priority: pass.job.priority,
            originator: SHOW_OLOG_NO,
        };

        let host = pass.job.host_alias.as_str();
        let delta_bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        if let Err(e) = self.hosts.adjust(host, files as i32, delta_bytes) {
            remove_staging(&staging.path);
            return Err(e.into());
        }

        if let Err(e) = self.publisher.publish(&message.encode(self.layout)) {
            log_resend_error!(
                "Publishing batch failed",
                msg_name = staging.msg_name.as_str(),
                error = e.to_string().as_str(),
            );
            if let Err(undo) = self.hosts.adjust(host, -(files as i32), -delta_bytes) {
                log_resend_warn!(
                    "Could not roll back host counters",
                    host = host,
                    error = undo.to_string().as_str(),
                );
            }
            remove_staging(&staging.path);
            return Err(e.into());
        }

        for pos in &positions {
            selection.deselect(*pos);
        }
        report.resent += files;
        report.messages.push(message);
        log_resend_info!(
            "Published batch",
            msg_name = staging.msg_name.as_str(),
            host = host,
            files = files,
            bytes = bytes,
        );
        Ok(())
    }
}

fn remove_staging(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log_resend_warn!(
                "Failed to remove staging directory",
                path = path.display().to_string().as_str(),
                error = e.to_string().as_str(),
            );
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_single() {
        let report = ResendReport {
            resent: 1,
            ..Default::default()
        };
        assert_eq!(report.summary_line(), "1 file resend");
    }

    #[test]
    fn test_summary_line_lists_non_zero_counters() {
        let report = ResendReport {
            resent: 2,
            not_archived: 1,
            not_found: 3,
            limit_reached: Some(2),
            ..Default::default()
        };
        assert_eq!(
            report.to_string(),
            "2 files resend, 1 not archived, 3 not found, USER LIMIT (2) REACHED"
        );
    }

    #[test]
    fn test_report_json() {
        let report = ResendReport {
            resent: 3,
            limit_reached: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resent"], 3);
        assert_eq!(json["limit_reached"], 3);
        assert_eq!(json["messages"].as_array().unwrap().len(), 0);
    }
}
