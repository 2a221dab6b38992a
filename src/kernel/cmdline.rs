// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Server Command Line Parsing
//!
//! This module parses the option string the object manager is started with.
//! Options are `key=value` pairs separated by whitespace.
//!
//! # Design
//!
//! - Invalid characters converted to '.'
//! - Tabs and newlines act as separators
//! - A key with no value is stored with an empty value
//! - Later options override earlier ones
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut cmdline = Cmdline::new();
//! cmdline.append("sync.inproc=auto debug.level=info");
//!
//! let mode = cmdline.get("sync.inproc");
//! let verbose = cmdline.get_bool("debug.verbose", false);
//! ```

/// ============================================================================
/// Command Line Configuration
/// ============================================================================

/// Maximum command line size
const CMDLINE_MAX: usize = 4096;

/// Environment variable appended by [`Cmdline::from_env`]
pub const CMDLINE_ENV: &str = "RXSYNC_CMDLINE";

/// Option selecting the synchronization mode (`auto`, `on`, `off`)
pub const OPT_SYNC_INPROC: &str = "sync.inproc";

/// Option selecting the inproc device backend (`ntsync`, `soft`)
pub const OPT_SYNC_DEVICE: &str = "sync.device";

/// Option selecting the log level
pub const OPT_DEBUG_LEVEL: &str = "debug.level";

/// Parsed command line
#[derive(Debug, Clone, Default)]
pub struct Cmdline {
    /// Options in the order they were appended
    entries: Vec<(String, String)>,

    /// Total bytes accepted so far
    size: usize,
}

impl Cmdline {
    /// Create an empty command line
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            size: 0,
        }
    }

    /// Create a command line from the `RXSYNC_CMDLINE` environment variable
    pub fn from_env() -> Self {
        let mut cmdline = Self::new();
        if let Ok(data) = std::env::var(CMDLINE_ENV) {
            cmdline.append(&data);
        }
        cmdline
    }

    /// Append data to the command line
    ///
    /// Input beyond the command line size limit is dropped.
    pub fn append(&mut self, data: &str) {
        let room = CMDLINE_MAX.saturating_sub(self.size);
        if room == 0 {
            return;
        }

        let mut sanitized = String::with_capacity(data.len().min(room));
        for c in data.chars().take(room) {
            let c = match c {
                '\n' | '\r' | '\t' => ' ',
                c if (c as u32) < 0x20 || (c as u32) > 0x7f => '.',
                c => c,
            };
            sanitized.push(c);
        }
        self.size += sanitized.len();

        for arg in sanitized.split(' ').filter(|arg| !arg.is_empty()) {
            let (key, value) = match arg.split_once('=') {
                Some((key, value)) => (key, value),
                None => (arg, ""),
            };
            if key.is_empty() {
                continue;
            }
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    /// Get a value from the command line
    ///
    /// # Returns
    ///
    /// Value string if found (empty for a bare key), None otherwise
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get a boolean value from the command line
    ///
    /// Returns false if the value is "0", "false", or "off".
    /// Returns true for any other value, including a bare key.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(v) => !matches!(v, "0" | "false" | "off"),
        }
    }

    /// Get a uint32 value from the command line
    ///
    /// Accepts decimal or `0x`-prefixed hexadecimal; anything else yields
    /// `default`.
    pub fn get_uint32(&self, key: &str, default: u32) -> u32 {
        let value = match self.get(key) {
            None | Some("") => return default,
            Some(v) => v,
        };

        let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => value.parse::<u32>(),
        };
        parsed.unwrap_or(default)
    }

    /// Get the number of command line entries
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
