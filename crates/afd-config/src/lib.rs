//! # afd-config
//!
//! Configuration management for the AFD output-log tools.
//!
//! Loads configuration from:
//! 1. `~/.afd/olog.toml` (per-user)
//! 2. `$AFD_WORK_DIR/etc/olog.toml` (per-installation, replaces the per-user file)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;

pub use logging::{init_logging, LogLevel};
pub use path::WorkDir;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default number of files materialised into one staging directory.
pub const MAX_COPIED_FILES: u32 = 100;

/// Upper bound accepted for `resend.max_copied_files`.
pub const MAX_COPIED_FILES_LIMIT: u32 = 10240;

/// Default cap on concurrently running viewers.
pub const MAX_VIEW_DATA_WINDOWS: usize = 10;

/// Default work directory when neither config nor environment name one.
pub const DEFAULT_WORK_DIR: &str = "/var/lib/afd";

/// Environment variable naming the AFD work directory.
pub const WORK_DIR_ENV: &str = "AFD_WORK_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub log: LogConfig,
    pub resend: ResendConfig,
    pub view: ViewConfig,
    pub send: SendConfig,
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load config, using `explicit` instead of the work-dir file when given.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Per-user config (~/.afd/olog.toml)
        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                debug!("Loading user config from {:?}", user_path);
                config = Self::read_file(&user_path)?;
            }
        }

        // 2. Installation config, located through the (possibly overridden) work dir
        let install_path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let work_dir = std::env::var(WORK_DIR_ENV)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| config.paths.work_dir.clone());
                Some(work_dir.join("etc").join("olog.toml"))
            }
        };
        if let Some(path) = install_path {
            if path.exists() {
                debug!("Loading installation config from {:?}", path);
                config = Self::read_file(&path)?;
            } else if explicit.is_some() {
                return Err(ConfigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file {} does not exist", path.display()),
                )));
            }
        }

        // 3. Environment overrides
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Per-user config path: ~/.afd/olog.toml
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".afd/olog.toml"))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(WORK_DIR_ENV) {
            self.paths.work_dir = PathBuf::from(path);
        }
        if let Ok(n) = std::env::var("AFD_MAX_COPIED_FILES") {
            if let Ok(n) = n.parse() {
                self.resend.max_copied_files = n;
            }
        }
        if let Ok(grant) = std::env::var("AFD_PERMISSIONS") {
            self.permissions.grant = grant;
        }
    }

    /// Reject values the dispatchers cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.resend.max_copied_files;
        if !(1..=MAX_COPIED_FILES_LIMIT).contains(&n) {
            return Err(ConfigError::Invalid(format!(
                "resend.max_copied_files must be in [1, {}], got {}",
                MAX_COPIED_FILES_LIMIT, n
            )));
        }
        if self.log.max_hostname_length == 0 {
            return Err(ConfigError::Invalid(
                "log.max_hostname_length must be positive".to_string(),
            ));
        }
        if self.log.log_date_length == 0 || self.log.log_date_length > 16 {
            return Err(ConfigError::Invalid(format!(
                "log.log_date_length must be in [1, 16], got {}",
                self.log.log_date_length
            )));
        }
        if self.view.max_windows == 0 {
            return Err(ConfigError::Invalid(
                "view.max_windows must be positive".to_string(),
            ));
        }
        if self.resend.max_files_per_dir == 0 {
            return Err(ConfigError::Invalid(
                "resend.max_files_per_dir must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Work-directory layout derived from `[paths]`.
    pub fn work_dir(&self) -> WorkDir {
        WorkDir::new(&self.paths)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Directory and file names below the work directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub work_dir: PathBuf,
    pub archive_dir: String,
    pub outgoing_dir: String,
    pub incoming_dir: String,
    pub ls_data_dir: String,
    pub fifo_dir: String,
    pub log_dir: String,
    pub tmp_dir: String,
    pub msg_fifo: String,
    pub fsa_file: String,
    pub job_id_file: String,
    pub dir_name_file: String,
    pub dc_list_file: String,
    pub counter_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            archive_dir: "archive".to_string(),
            outgoing_dir: "files/outgoing".to_string(),
            incoming_dir: "files/incoming".to_string(),
            ls_data_dir: "ls_data".to_string(),
            fifo_dir: "fifodir".to_string(),
            log_dir: "log".to_string(),
            tmp_dir: "tmp".to_string(),
            msg_fifo: "msg.fifo".to_string(),
            fsa_file: "fsa_status".to_string(),
            job_id_file: "job_id_data".to_string(),
            dir_name_file: "directory_names".to_string(),
            dc_list_file: "dc_list_data".to_string(),
            counter_file: "amg_counter".to_string(),
        }
    }
}

/// Output-log grammar parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Width of the hex timestamp field
    pub log_date_length: usize,
    /// Width of the padded host-name field
    pub max_hostname_length: usize,
    /// Number of rolling output-log files (`OUTPUT_LOG.0` is the newest)
    pub log_files: usize,
    /// File name stem of the rolling logs
    pub log_name: String,
    /// Treat every multi-byte type field as five bytes wide
    pub wide_type_field: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_date_length: 10,
            max_hostname_length: 8,
            log_files: 7,
            log_name: "OUTPUT_LOG".to_string(),
            wide_type_field: false,
        }
    }
}

/// How the message FIFO is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FifoMode {
    /// Single `O_RDWR` descriptor
    #[default]
    ReadWrite,
    /// Open a non-blocking read descriptor first, then a write descriptor
    ReadThenWrite,
}

/// Resend dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResendConfig {
    /// Files per staging directory / outbound message
    pub max_copied_files: u32,
    /// Archive and spool are sharded by a leading filesystem-id component
    pub multi_fs: bool,
    pub fifo_mode: FifoMode,
    /// Entries allowed in one `<outgoing>/<dir_no>` directory
    pub max_files_per_dir: usize,
    /// Wrap value of the shared unique-number counter
    pub counter_max: u32,
    /// Message layout uses a 64-bit creation time
    pub wide_time: bool,
}

impl Default for ResendConfig {
    fn default() -> Self {
        Self {
            max_copied_files: MAX_COPIED_FILES,
            multi_fs: false,
            fifo_mode: FifoMode::ReadWrite,
            max_files_per_dir: 10000,
            counter_max: i32::MAX as u32,
            wide_time: true,
        }
    }
}

/// One entry of the viewer table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewProgram {
    /// File-name filter (`*`, `?`, leading `!`)
    pub filter: String,
    /// Program, or full command string when `shell` is set
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Run through `sh -c` instead of exec
    #[serde(default)]
    pub shell: bool,
}

/// View dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub max_windows: usize,
    pub default_program: String,
    pub programs: Vec<ViewProgram>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            max_windows: MAX_VIEW_DATA_WINDOWS,
            default_program: "afd_hex_print".to_string(),
            programs: Vec::new(),
        }
    }
}

/// Send dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    pub tool: String,
    pub font: String,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            tool: "xsend_file".to_string(),
            font: "fixed".to_string(),
        }
    }
}

/// Serialised permission buffer for the invoking user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub grant: String,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            grant: "all".to_string(),
        }
    }
}
