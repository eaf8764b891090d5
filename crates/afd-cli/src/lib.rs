//! Shared pieces of the `show_olog` and `rl_tool` binaries.

use std::path::{Path, PathBuf};

use afd_config::Config;
use afd_olog::{LogIndex, SearchFilter, Selection, Transition};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use clap::Args;

/// Load the configuration, then apply a `--work-dir` override.
pub fn load_config(config: Option<&Path>, work_dir: Option<&Path>) -> Result<Config> {
    let mut cfg = Config::load_from(config).context("Failed to load configuration")?;
    if let Some(dir) = work_dir {
        cfg.paths.work_dir = dir.to_path_buf();
    }
    Ok(cfg)
}

/// Reset `SIGPIPE` so `show_olog search | head` exits quietly.
pub fn restore_sigpipe() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

/// Search criteria shared by every record-selecting command
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Earliest send time (unix seconds or `YYYY-MM-DD HH:MM[:SS]`, local time)
    #[arg(long, value_parser = parse_time)]
    pub start: Option<u64>,

    /// Latest send time
    #[arg(long, value_parser = parse_time)]
    pub end: Option<u64>,

    /// Host alias pattern (`*`, `?`, leading `!`); repeatable
    #[arg(long = "host", value_name = "PATTERN")]
    pub hosts: Vec<String>,

    /// Local file-name pattern; repeatable
    #[arg(long = "file", value_name = "PATTERN")]
    pub files: Vec<String>,

    /// Remote file-name pattern; repeatable
    #[arg(long = "remote", value_name = "PATTERN")]
    pub remotes: Vec<String>,

    #[arg(long)]
    pub min_size: Option<u64>,

    #[arg(long)]
    pub max_size: Option<u64>,

    /// Job id in hex; repeatable
    #[arg(long = "job", value_name = "HEX", value_parser = parse_hex)]
    pub jobs: Vec<u32>,

    /// Only records whose file was archived
    #[arg(long)]
    pub archived: bool,
}

impl FilterArgs {
    pub fn to_filter(&self) -> SearchFilter {
        SearchFilter {
            start_time: self.start,
            end_time: self.end,
            hosts: self.hosts.clone(),
            local_names: self.files.clone(),
            remote_names: self.remotes.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
            job_ids: self.jobs.clone(),
            archived_only: self.archived,
        }
    }
}

/// Filter plus an optional explicit pick of result positions
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Result positions (as printed by `search`) to act on; default is all
    #[arg(short = 'p', long = "pos", value_delimiter = ',')]
    pub positions: Vec<usize>,
}

impl SelectArgs {
    /// Selection over `index`: the given positions, or every result.
    pub fn select(&self, index: &LogIndex) -> Result<Selection> {
        if self.positions.is_empty() {
            return Ok(Selection::all(index));
        }
        let mut selection = Selection::new();
        selection
            .apply(index, Transition::Modification(self.positions.clone()))
            .context("Invalid result position")?;
        Ok(selection)
    }
}

pub fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|e| format!("`{}` is not a hex number: {}", s, e))
}

/// Unix seconds, or a local date and time.
pub fn parse_time(s: &str) -> Result<u64, String> {
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .and_then(|t| u64::try_from(t.timestamp()).ok())
                .ok_or_else(|| format!("`{}` is not a valid local time", s));
        }
    }
    Err(format!("`{}` is neither unix seconds nor YYYY-MM-DD HH:MM[:SS]", s))
}

/// Default configuration file location for display.
pub fn config_path(cfg: &Config) -> PathBuf {
    cfg.paths.work_dir.join("etc").join("olog.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("2a"), Ok(0x2a));
        assert_eq!(parse_hex("0x2A"), Ok(0x2a));
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("1696798208"), Ok(1_696_798_208));
        let local = parse_time("2023-10-08 20:50").unwrap();
        let with_secs = parse_time("2023-10-08 20:50:30").unwrap();
        assert_eq!(with_secs - local, 30);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_filter_mapping() {
        let args = FilterArgs {
            hosts: vec!["duck*".to_string()],
            jobs: vec![0x2a],
            archived: true,
            ..Default::default()
        };
        let filter = args.to_filter();
        assert_eq!(filter.hosts, vec!["duck*"]);
        assert_eq!(filter.job_ids, vec![0x2a]);
        assert!(filter.archived_only);
        assert!(FilterArgs::default().to_filter().is_empty());
    }
}
