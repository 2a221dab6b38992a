// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Core
//!
//! Shared machinery behind the mutex, event and semaphore objects.
//!
//! # Modules
//!
//! - [`wait_queue`] - per-object waiter lists and the wait callback table
//! - [`wait`] - broker wait engine (begin, wake, cancel, timeout)
//! - [`abandon`] - mutex abandonment on thread termination

pub mod abandon;
pub mod wait;
pub mod wait_queue;

// Re-exports
pub use abandon::*;
pub use wait::*;
pub use wait_queue::*;
