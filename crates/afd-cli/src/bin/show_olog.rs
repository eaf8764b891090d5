//! # show_olog
//!
//! Search the AFD output log and act on the results: summarise, resend
//! archived files, hand them to the send tool or open them in a viewer.

use std::path::PathBuf;

use afd_cli::{load_config, parse_hex, restore_sigpipe, FilterArgs, SelectArgs};
use afd_config::{init_logging, Config, LogLevel};
use afd_dispatch::{DispatchContext, ResendDispatcher, SendDispatcher, ViewDispatcher};
use afd_olog::{LogIndex, Selection};
use afd_tables::JobInfoStore;
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "show_olog")]
#[command(version, about = "Search and resend AFD output-log entries", long_about = None)]
struct Cli {
    /// Configuration file (default: <work>/etc/olog.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AFD work directory, overriding the configuration
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List matching log entries with their positions
    Search(FilterArgs),

    /// One-line summary of the matching entries
    Summary(SelectArgs),

    /// Put archived files back into the outgoing queue
    Resend(SelectArgs),

    /// Hand archived files to the send tool
    Send {
        #[command(flatten)]
        select: SelectArgs,

        /// Return without waiting for the send tool
        #[arg(long)]
        no_wait: bool,
    },

    /// Open archived files in a viewer
    View {
        #[command(flatten)]
        select: SelectArgs,

        /// Return without waiting for the viewers
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the definition behind a job id
    Job {
        /// Job id in hex
        #[arg(value_parser = parse_hex)]
        job_id: u32,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the default configuration as TOML
    Default,
    /// Print the configuration file location
    Path,
}

#[derive(Serialize)]
struct SearchHit {
    pos: usize,
    #[serde(flatten)]
    record: afd_olog::LogRecord,
}

#[derive(Serialize)]
struct JobView {
    job_id: u32,
    host_alias: String,
    priority: char,
    directory: Option<String>,
    dir_config: Option<String>,
    recipient_user: String,
    recipient_host: String,
    mail_destination: Option<String>,
    local_options: Vec<String>,
    standard_options: String,
}

fn main() -> Result<()> {
    restore_sigpipe();
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let cfg = load_config(cli.config.as_deref(), cli.work_dir.as_deref())?;

    match &cli.command {
        Commands::Search(filter) => cmd_search(&cfg, filter, cli.json),
        Commands::Summary(select) => cmd_summary(&cfg, select, cli.json),
        Commands::Resend(select) => cmd_resend(&cfg, select, cli.json),
        Commands::Send { select, no_wait } => cmd_send(&cfg, select, *no_wait, cli.json),
        Commands::View { select, no_wait } => cmd_view(&cfg, select, *no_wait, cli.json),
        Commands::Job { job_id } => cmd_job(&cfg, *job_id, cli.json),
        Commands::Config { command } => cmd_config(&cfg, command),
    }
}

fn open_index(cfg: &Config, filter: &FilterArgs) -> Result<LogIndex> {
    let work = cfg.work_dir();
    let index = LogIndex::open_filtered(&work, &cfg.log, &filter.to_filter())
        .with_context(|| format!("Failed to read output logs in {}", work.log_dir().display()))?;
    if index.parse_errors() > 0 {
        eprintln!("{} malformed log lines skipped", index.parse_errors());
    }
    Ok(index)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_search(cfg: &Config, filter: &FilterArgs, json: bool) -> Result<()> {
    let index = open_index(cfg, filter)?;
    let mut hits = Vec::with_capacity(index.len());
    for pos in 0..index.len() {
        match index.fetch(pos) {
            Ok(record) => hits.push(SearchHit { pos, record }),
            Err(e) => eprintln!("position {}: {}", pos, e),
        }
    }
    if json {
        return print_json(&hits);
    }
    for hit in &hits {
        println!("{:>6} {}", hit.pos, hit.record.display_line());
    }
    println!("{}", Selection::all(&index).summary());
    Ok(())
}

fn cmd_summary(cfg: &Config, select: &SelectArgs, json: bool) -> Result<()> {
    let index = open_index(cfg, &select.filter)?;
    let summary = select.select(&index)?.summary();
    if json {
        return print_json(&summary);
    }
    println!("{}", summary);
    Ok(())
}

fn context(cfg: &Config) -> Result<DispatchContext> {
    DispatchContext::new(cfg.clone()).context("Invalid permission grant")
}

fn cmd_resend(cfg: &Config, select: &SelectArgs, json: bool) -> Result<()> {
    let index = open_index(cfg, &select.filter)?;
    let mut selection = select.select(&index)?;
    if selection.is_empty() {
        bail!("Nothing selected");
    }
    let ctx = context(cfg)?;
    let mut dispatcher = ResendDispatcher::open(&ctx).with_context(|| {
        format!(
            "Failed to open AFD tables or message FIFO in {}",
            ctx.work.root().display()
        )
    })?;
    let report = dispatcher.resend(&index, &mut selection)?;
    if json {
        return print_json(&report);
    }
    println!("{}", report);
    Ok(())
}

fn cmd_send(cfg: &Config, select: &SelectArgs, no_wait: bool, json: bool) -> Result<()> {
    let index = open_index(cfg, &select.filter)?;
    let mut selection = select.select(&index)?;
    let ctx = context(cfg)?;
    let mut dispatcher = SendDispatcher::new(&ctx);
    let report = dispatcher.send(&index, &mut selection)?;
    if json {
        print_json(&report)?;
    } else {
        println!(
            "{} files handed to {}, {} not archived, {} not in archive",
            report.sent, cfg.send.tool, report.not_archived, report.not_in_archive
        );
        if let Some(limit) = report.limit_reached {
            println!("USER LIMIT ({}) REACHED", limit);
        }
    }
    if !no_wait {
        if let Some(status) = dispatcher.wait().context("Failed to wait for send tool")? {
            if !status.success() {
                bail!("{} exited with {}", cfg.send.tool, status);
            }
        }
    }
    Ok(())
}

fn cmd_view(cfg: &Config, select: &SelectArgs, no_wait: bool, json: bool) -> Result<()> {
    let index = open_index(cfg, &select.filter)?;
    let mut selection = select.select(&index)?;
    let ctx = context(cfg)?;
    let mut dispatcher = ViewDispatcher::new(&ctx);
    let report = dispatcher.view(&index, &mut selection)?;
    if json {
        print_json(&report)?;
    } else {
        println!(
            "{} viewed, {} not archived, {} not in archive, {} deferred",
            report.viewed, report.not_archived, report.not_in_archive, report.deferred
        );
    }
    if !no_wait {
        dispatcher.wait_all();
    }
    Ok(())
}

fn cmd_job(cfg: &Config, job_id: u32, json: bool) -> Result<()> {
    let ctx = context(cfg)?;
    let store = JobInfoStore::open(&ctx.work).context("Failed to open job tables")?;
    let Some(job) = store.job(job_id) else {
        bail!("Job {:x} not found", job_id);
    };
    let recipient = afd_tables::job_store::parse_recipient(&job.recipient(), ctx.permissions.view_passwd);
    let view = JobView {
        job_id,
        host_alias: job.host_alias().into_owned(),
        priority: job.priority() as char,
        directory: job.dir_path().map(|d| d.into_owned()),
        dir_config: job.dir_config_name().map(|d| d.into_owned()),
        recipient_user: recipient.user,
        recipient_host: recipient.host,
        mail_destination: recipient.mail_destination,
        local_options: job.local_options().into_iter().map(|o| o.into_owned()).collect(),
        standard_options: job.standard_options().into_owned(),
    };
    if json {
        return print_json(&view);
    }
    println!("Job id     : {:x}", view.job_id);
    println!("Host       : {}", view.host_alias);
    println!("Priority   : {}", view.priority);
    println!("Directory  : {}", view.directory.as_deref().unwrap_or("-"));
    println!("DIR_CONFIG : {}", view.dir_config.as_deref().unwrap_or("-"));
    println!("Recipient  : {}@{}", view.recipient_user, view.recipient_host);
    if let Some(mail) = &view.mail_destination {
        println!("Mail to    : {}", mail);
    }
    for option in &view.local_options {
        println!("Option     : {}", option);
    }
    if !view.standard_options.is_empty() {
        println!("Standard   : {}", view.standard_options);
    }
    Ok(())
}

fn cmd_config(cfg: &Config, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => print!("{}", toml::to_string_pretty(cfg)?),
        ConfigCommands::Default => print!("{}", Config::default_toml()),
        ConfigCommands::Path => println!("{}", afd_cli::config_path(cfg).display()),
    }
    Ok(())
}
