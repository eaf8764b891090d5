//! View: open archived files in viewer programs.
//!
//! The viewer is picked by the first `[view] programs` entry whose filter
//! matches the file name, falling back to `default_program`. The archive
//! path is always the last argument. Shell-style entries run as
//! `sh -c '<program> "$1"' sh <path>`.

use std::path::Path;
use std::process::{Child, Command, Stdio};

use afd_archive::{ArchiveError, ArchiveResolver};
use afd_config::{log_view_debug, log_view_warn, ViewProgram};
use afd_olog::{pmatch, LogIndex, PatternMatch, Selection};
use serde::Serialize;

use crate::context::DispatchContext;
use crate::{DispatchError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewReport {
    pub viewed: u32,
    pub not_archived: u32,
    pub not_in_archive: u32,
    pub not_found: u32,
    /// Viewable, but left selected because every viewer slot was taken
    pub deferred: u32,
    pub stopped: bool,
}

pub struct ViewDispatcher<'a> {
    ctx: &'a DispatchContext,
    resolver: ArchiveResolver,
    running: Vec<Child>,
}

impl<'a> ViewDispatcher<'a> {
    pub fn new(ctx: &'a DispatchContext) -> Self {
        Self {
            ctx,
            resolver: ArchiveResolver::new(&ctx.work, ctx.config.resend.multi_fs),
            running: Vec::new(),
        }
    }

    /// Viewers that have not exited yet.
    pub fn in_flight(&mut self) -> usize {
        self.reap();
        self.running.len()
    }

    /// Block until every viewer started here has exited.
    pub fn wait_all(&mut self) {
        for mut child in self.running.drain(..) {
            if let Err(e) = child.wait() {
                log_view_warn!("Waiting for viewer failed", pid = child.id(), error = e.to_string().as_str());
            }
        }
    }

    /// Start a viewer for every resolvable handle, up to `max_windows`
    /// running at once.
    pub fn view(&mut self, index: &LogIndex, selection: &mut Selection) -> Result<ViewReport> {
        if !self.ctx.permissions.view_data {
            return Err(DispatchError::NoPermission { action: "view data" });
        }
        let max_windows = self.ctx.config.view.max_windows.max(1);
        let mut report = ViewReport::default();
        let mut full = false;

        for pos in selection.positions() {
            if self.ctx.stopped() {
                report.stopped = true;
                break;
            }
            let record = match index.fetch(pos) {
                Ok(record) => record,
                Err(e) => {
                    log_view_warn!(
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
                Err(_) => {
                    report.not_in_archive += 1;
                    continue;
                }
            };

            if !full {
                self.reap();
                full = self.running.len() >= max_windows;
            }
            if full {
                report.deferred += 1;
                continue;
            }

            let child = self.command_for(&record.local_name, &archived.path).spawn()?;
            log_view_debug!(
                "Started viewer",
                pid = child.id(),
                path = archived.path.display().to_string().as_str(),
            );
            self.running.push(child);
            selection.deselect(pos);
            report.viewed += 1;
        }
        if report.deferred > 0 {
            log_view_warn!("Viewer limit reached", max_windows = max_windows, deferred = report.deferred);
        }
        Ok(report)
    }

    fn program_for(&self, file_name: &str) -> Option<&ViewProgram> {
        self.ctx
            .config
            .view
            .programs
            .iter()
            .find(|p| pmatch(&p.filter, file_name) == PatternMatch::Match)
    }

    fn command_for(&self, file_name: &str, path: &Path) -> Command {
        let mut cmd = match self.program_for(file_name) {
            Some(p) if p.shell => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(format!("{} \"$1\"", p.program)).arg("sh");
                cmd
            }
            Some(p) => {
                let mut cmd = Command::new(&p.program);
                cmd.args(&p.args);
                cmd
            }
            None => Command::new(&self.ctx.config.view.default_program),
        };
        cmd.arg(path).stdin(Stdio::null());
        cmd
    }

    fn reap(&mut self) {
        self.running.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}
