//! Structured logging utilities for the output-log tools.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use afd_config::log_resend_info;
//!
//! log_resend_info!("Published batch", job_id = 42, files = 3);
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const OLOG: &'static str = "OLOG";
    pub const ARCHIVE: &'static str = "ARCHIVE";
    pub const TABLES: &'static str = "TABLES";
    pub const RESEND: &'static str = "RESEND";
    pub const VIEW: &'static str = "VIEW";
    pub const SEND: &'static str = "SEND";
    pub const RL: &'static str = "RL";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Map a `-v` count onto a level, starting at `Warn`.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

// === OLOG logging macros ===

#[macro_export]
macro_rules! log_olog_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "OLOG", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_olog_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "OLOG", $($key = $value,)* $msg)
    };
}

// === ARCHIVE logging macros ===

#[macro_export]
macro_rules! log_archive_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "ARCHIVE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_archive_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "ARCHIVE", $($key = $value,)* $msg)
    };
}

// === TABLES logging macros ===

#[macro_export]
macro_rules! log_tables_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "TABLES", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_tables_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "TABLES", $($key = $value,)* $msg)
    };
}

// === RESEND logging macros ===

#[macro_export]
macro_rules! log_resend_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "RESEND", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resend_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RESEND", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resend_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "RESEND", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_resend_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "RESEND", $($key = $value,)* $msg)
    };
}

// === VIEW / SEND logging macros ===

#[macro_export]
macro_rules! log_view_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "VIEW", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_view_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "VIEW", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_send_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "SEND", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_send_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "SEND", $($key = $value,)* $msg)
    };
}

// === RL logging macros ===

#[macro_export]
macro_rules! log_rl_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RL", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_rl_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "RL", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
///
/// `AFD_LOG` wins over `RUST_LOG`; both win over `level`.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_env("AFD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::OLOG, "OLOG");
        assert_eq!(Component::RESEND, "RESEND");
        assert_eq!(Component::RL, "RL");
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }
}
