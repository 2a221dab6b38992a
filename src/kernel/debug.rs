// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Logging and Diagnostics
//!
//! This module provides the logging macros used by the object manager.
//! Messages go through the `log` facade with the `rxsync` target, so the
//! embedding server decides where they end up.
//!
//! # Usage
//!
//! ```rust,ignore
//! log_info!("sync mode {}", mode);
//! log_error!("failed to open inproc device: {}", err);
//! log_trace_if!(LOCAL_TRACE, "wake_up {:#x}", id);
//! ```

/// Log target for every message emitted by this crate
pub const LOG_TARGET: &str = "rxsync";

/// Log levels
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Logging disabled
    Off = 0,

    /// Errors only
    Error = 1,

    /// Warnings and errors
    Warning = 2,

    /// Informational logging
    Info = 3,

    /// Debug-level logging (verbose)
    Debug = 4,

    /// Trace-level logging (very verbose)
    Trace = 5,
}

impl LogLevel {
    /// Parse a level name as given on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" | "none" => Some(Self::Off),
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Get the log level name as a string
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Set the maximum level passed to the installed logger
pub fn log_set_max_level(level: LogLevel) {
    log::set_max_level(level.to_filter());
}

/// Log a trace message
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::log::trace!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*)
    };
}

/// Log a trace message if condition is true
#[macro_export]
macro_rules! log_trace_if {
    ($cond:expr, $($arg:tt)*) => {
        if $cond {
            $crate::log_trace!($($arg)*);
        }
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log::debug!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*)
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::log::info!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log::warn!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log::error!(target: $crate::kernel::debug::LOG_TARGET, $($arg)*)
    };
}
