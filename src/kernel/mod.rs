// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Object Server - Synchronization Core
//!
//! Waitable mutex, event and semaphore objects, the handle and name
//! tables that reach them, and the requests clients issue against them.
//!
//! # Layout
//!
//! - [`object`] - Objects, handles and the name directory
//! - [`sync`] - Wait queues, broker waits and mutex abandonment
//! - [`dev`] - Synchronization devices for the inproc path
//! - [`syscalls`] - Request handlers
//! - [`server`] - Thread and process lifecycle
//! - [`init`] - Startup configuration and mode selection

pub mod cmdline;
pub mod debug;
pub mod dev;
pub mod init;
pub mod object;
pub mod process;
pub mod server;
pub mod sync;
pub mod syscalls;
pub mod thread;

#[cfg(test)]
pub(crate) mod tests;
