//! # rl_tool
//!
//! Inspect or edit a retrieve list, the per-directory listing cache the
//! AFD keeps for remote directories. Marking entries as not retrieved makes
//! the next scan fetch them again.

use std::path::PathBuf;

use afd_cli::{load_config, restore_sigpipe};
use afd_config::{init_logging, log_rl_warn, LogLevel};
use afd_tables::{RetrieveList, TableError};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};

#[derive(Parser)]
#[command(name = "rl_tool")]
#[command(version, about = "Show or edit an AFD retrieve list", long_about = None)]
struct Cli {
    /// Directory alias whose retrieve list to use
    #[arg(short = 'd', value_name = "DIR_ALIAS")]
    dir_alias: String,

    /// Mark the files as retrieved
    #[arg(short = 'r', conflicts_with_all = ["not_retrieved", "list"])]
    retrieved: bool,

    /// Mark the files as not retrieved
    #[arg(short = 'R', conflicts_with = "list")]
    not_retrieved: bool,

    /// Print the list (default when neither -r nor -R is given)
    #[arg(long)]
    list: bool,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// AFD work directory, overriding the configuration
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// File names to change; none means every entry
    files: Vec<String>,
}

/// Accept the classic `-?` and `-help` spellings.
fn normalise_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .map(|arg| match arg.as_str() {
            "-?" | "-help" => "--help".to_string(),
            _ => arg,
        })
        .collect()
}

fn main() -> Result<()> {
    restore_sigpipe();
    let cli = Cli::parse_from(normalise_args(std::env::args()));
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let cfg = load_config(cli.config.as_deref(), cli.work_dir.as_deref())?;
    let work = cfg.work_dir();
    let path = work.listing_cache(&cli.dir_alias);
    let mut list = RetrieveList::open(&work, &cli.dir_alias)
        .with_context(|| format!("Failed to open retrieve list {}", path.display()))?;

    if !cli.retrieved && !cli.not_retrieved {
        for entry in list.entries() {
            println!(
                "{} {:>12} {:>12} {}",
                if entry.is_retrieved() { "R" } else { "-" },
                entry.size,
                entry.file_mtime,
                entry.name()
            );
        }
        return Ok(());
    }

    let names: Vec<&str> = cli.files.iter().map(String::as_str).collect();
    for name in &names {
        if list.find(name).is_none() {
            log_rl_warn!("File not in retrieve list", file = *name);
            eprintln!("{}: not in retrieve list", name);
        }
    }
    let changed = match list.set_retrieved(&names, cli.retrieved) {
        Ok(changed) => changed,
        Err(e @ TableError::LockContention { .. }) => {
            return Err(e).context("Retrieve list is being updated by another process, try again");
        }
        Err(e) => return Err(e).context("Failed to update retrieve list"),
    };
    println!(
        "{} entries marked {}",
        changed,
        if cli.retrieved { "retrieved" } else { "not retrieved" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_classic_help_spellings() {
        let args = normalise_args(["rl_tool", "-?", "-help", "-d"].map(String::from));
        assert_eq!(args, vec!["rl_tool", "--help", "--help", "-d"]);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["rl_tool", "-d", "ducktown", "-R", "a.txt", "b.txt"]).unwrap();
        assert_eq!(cli.dir_alias, "ducktown");
        assert!(cli.not_retrieved);
        assert_eq!(cli.files, vec!["a.txt", "b.txt"]);
        assert!(Cli::try_parse_from(["rl_tool", "-d", "x", "-r", "-R"]).is_err());
        assert!(Cli::try_parse_from(["rl_tool", "-r"]).is_err());
    }
}
