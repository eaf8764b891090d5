//! State shared by one operator session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use afd_config::{Config, WorkDir};

use crate::permissions::Permissions;
use crate::Result;

/// Everything a dispatcher needs besides the selection itself
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub config: Config,
    pub work: WorkDir,
    pub permissions: Permissions,
    stop: Arc<AtomicBool>,
}

impl DispatchContext {
    /// Build from a loaded configuration, parsing its permission buffer.
    pub fn new(config: Config) -> Result<Self> {
        let permissions = Permissions::from_buffer(&config.permissions.grant)?;
        Ok(Self::with_permissions(config, permissions))
    }

    pub fn with_permissions(config: Config, permissions: Permissions) -> Self {
        let work = config.work_dir();
        Self {
            config,
            work,
            permissions,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for the "Stop" control; setting it ends the running
    /// dispatcher at the next file or batch boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Clear a previous stop request before the next invocation.
    pub fn reset_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }
}
