//! Work-directory layout.
//!
//! Every file the tools touch lives below one AFD work directory. `WorkDir`
//! resolves the configured names into absolute paths so the rest of the
//! workspace never joins path fragments by hand.

use std::path::{Path, PathBuf};

use crate::PathsConfig;

/// Resolved work-directory layout
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
    names: PathsConfig,
}

impl WorkDir {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            root: paths.work_dir.clone(),
            names: paths.clone(),
        }
    }

    /// Layout rooted at `root` with default names (handy for fixtures).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let names = PathsConfig {
            work_dir: root.as_ref().to_path_buf(),
            ..PathsConfig::default()
        };
        Self::new(&names)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<work>/<archive>`
    pub fn archive_root(&self) -> PathBuf {
        self.root.join(&self.names.archive_dir)
    }

    /// `<work>/<outgoing>`
    pub fn outgoing(&self) -> PathBuf {
        self.root.join(&self.names.outgoing_dir)
    }

    /// `<work>/<log>`
    pub fn log_dir(&self) -> PathBuf {
        self.root.join(&self.names.log_dir)
    }

    /// `<work>/<tmp>`
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(&self.names.tmp_dir)
    }

    /// `<work>/<fifo_dir>`
    pub fn fifo_dir(&self) -> PathBuf {
        self.root.join(&self.names.fifo_dir)
    }

    pub fn msg_fifo(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.msg_fifo)
    }

    pub fn fsa_file(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.fsa_file)
    }

    pub fn job_id_file(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.job_id_file)
    }

    pub fn dir_name_file(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.dir_name_file)
    }

    pub fn dc_list_file(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.dc_list_file)
    }

    pub fn counter_file(&self) -> PathBuf {
        self.fifo_dir().join(&self.names.counter_file)
    }

    /// `<work>/<incoming>/<ls_data>/<dir_alias>`
    pub fn listing_cache(&self, dir_alias: &str) -> PathBuf {
        self.root
            .join(&self.names.incoming_dir)
            .join(&self.names.ls_data_dir)
            .join(dir_alias)
    }

    /// `<work>/<log>/<name>.<file_no>`
    pub fn output_log(&self, log_name: &str, file_no: usize) -> PathBuf {
        self.log_dir().join(format!("{}.{}", log_name, file_no))
    }
}
