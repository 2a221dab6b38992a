// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Server Initialization
//!
//! Resolves the server configuration from the command line and decides,
//! once, which synchronization path new objects use.
//!
//! # Initialization Order
//!
//! 1. Parse the command line (`RXSYNC_CMDLINE` or an explicit string)
//! 2. Apply the log level
//! 3. Choose the device backend
//! 4. Resolve the synchronization mode, probing the device for `auto`
//!
//! # Usage
//!
//! ```rust,ignore
//! let server = Server::new(&Cmdline::from_env());
//! log_info!("sync mode {}", server.mode());
//! ```

use crate::kernel::cmdline::{Cmdline, OPT_DEBUG_LEVEL, OPT_SYNC_DEVICE, OPT_SYNC_INPROC};
use crate::kernel::debug::{log_set_max_level, LogLevel};
use crate::kernel::dev::inproc::DeviceSlot;

// Import logging macros
use crate::{log_info, log_warn};

/// ============================================================================
/// Synchronization Mode
/// ============================================================================

/// Path every object of a server uses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// State and waits managed by the broker
    Broker = 0,

    /// State and waits delegated to the synchronization device
    Inproc = 1,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Inproc => "inproc",
        }
    }
}

impl core::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `sync.inproc` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InprocPolicy {
    /// Use the device if it opens
    Auto,

    /// Always use the device; object creation fails without it
    On,

    /// Never use the device
    Off,
}

impl InprocPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "auto" => Some(Self::Auto),
            "on" | "1" | "true" => Some(Self::On),
            "off" | "0" | "false" => Some(Self::Off),
            _ => None,
        }
    }
}

/// `sync.device` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    /// The kernel facility
    NtSync,

    /// In-process implementation
    Soft,
}

impl DeviceChoice {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ntsync" => Some(Self::NtSync),
            "soft" => Some(Self::Soft),
            _ => None,
        }
    }

    /// Slot that opens this backend
    pub fn slot(self) -> DeviceSlot {
        match self {
            Self::NtSync => DeviceSlot::system(),
            Self::Soft => DeviceSlot::soft(),
        }
    }
}

/// ============================================================================
/// Configuration
/// ============================================================================

/// Resolved server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub policy: InprocPolicy,
    pub device: DeviceChoice,
    pub log_level: Option<LogLevel>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            policy: InprocPolicy::Auto,
            device: DeviceChoice::NtSync,
            log_level: None,
        }
    }
}

impl SyncConfig {
    /// Read the configuration; unknown values fall back to the default
    pub fn from_cmdline(cmdline: &Cmdline) -> Self {
        let mut config = Self::default();

        if let Some(value) = cmdline.get(OPT_SYNC_INPROC) {
            match InprocPolicy::from_name(value) {
                Some(policy) => config.policy = policy,
                None => log_warn!("ignoring {}={:?}", OPT_SYNC_INPROC, value),
            }
        }
        if let Some(value) = cmdline.get(OPT_SYNC_DEVICE) {
            match DeviceChoice::from_name(value) {
                Some(device) => config.device = device,
                None => log_warn!("ignoring {}={:?}", OPT_SYNC_DEVICE, value),
            }
        }
        if let Some(value) = cmdline.get(OPT_DEBUG_LEVEL) {
            match LogLevel::from_name(value) {
                Some(level) => config.log_level = Some(level),
                None => log_warn!("ignoring {}={:?}", OPT_DEBUG_LEVEL, value),
            }
        }
        config
    }

    /// Apply process-wide settings
    pub fn apply(&self) {
        if let Some(level) = self.log_level {
            log_set_max_level(level);
        }
    }
}

/// Decide the synchronization mode for `policy`
///
/// `Auto` opens the device to find out whether it exists; the opened
/// device stays in the slot for later use.
pub fn select_mode(policy: InprocPolicy, slot: &DeviceSlot) -> SyncMode {
    let mode = match policy {
        InprocPolicy::Off => SyncMode::Broker,
        InprocPolicy::On => SyncMode::Inproc,
        InprocPolicy::Auto => match slot.grab() {
            Ok(_) => SyncMode::Inproc,
            Err(err) => {
                log_info!("inproc sync unavailable ({}), using broker", err);
                SyncMode::Broker
            }
        },
    };
    log_info!("sync mode {} (policy {:?})", mode, policy);
    mode
}

// ============================================================================
// Tests
// ============================================================================
