// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Synchronization Objects
//!
//! Mutexes, events and semaphores for the Rustux object server. Objects
//! are waited on either through the server's own wait queues (broker
//! path) or through a kernel synchronization device that clients drive
//! directly (inproc path). The path is decided once, at startup.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rxsync::{Cmdline, Server};
//!
//! let server = Server::new(&Cmdline::from_env());
//! let process = server.create_process();
//! let thread = server.create_thread(&process)?;
//! ```

// Re-exported for the logging macros
pub use log;

pub mod rustux;
pub mod kernel;

pub use kernel::cmdline::Cmdline;
pub use kernel::init::{SyncConfig, SyncMode};
pub use kernel::object::{EventInfo, EventOp, MutexInfo, ObjectAttributes, Rights, SemaphoreInfo};
pub use kernel::server::Server;
pub use kernel::sync::wait::WaitOutcome;
pub use kernel::syscalls::{InprocSyncInfo, Reply, Request};
pub use rustux::errors::{Error, Result};
pub use rustux::types::{Disposition, HandleValue, Status, WaitStatus, WaitType};
