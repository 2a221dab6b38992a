// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wait Queue
//!
//! Every waitable object carries a wait queue listing the threads with a
//! pending broker wait on it, and implements the [`WaitObject`] callback
//! table the broker uses to arbitrate those waits.
//!
//! # Design
//!
//! - **FIFO ordering**: waiters are examined in the order they queued
//! - **Weak entries**: a queue never keeps a thread alive
//! - **Poll / commit split**: `signaled` has no side effects, `satisfied`
//!   performs the acquire for exactly one waiter
//!
//! # Usage
//!
//! ```rust,ignore
//! let wq = WaitQueue::new();
//! wq.add(&thread);
//! for waiter in wq.snapshot() { /* try to wake */ }
//! wq.remove(thread.tid());
//! ```

use crate::kernel::object::handle::Rights;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// ============================================================================
/// Wait Queue
/// ============================================================================

/// Wait queue entry
#[derive(Debug, Clone)]
pub struct WaitQueueEntry {
    /// Thread ID waiting
    pub tid: ThreadId,

    /// The waiting thread
    pub thread: Weak<Thread>,
}

/// Wait queue
///
/// Tracks the threads waiting for an object to become signaled.
pub struct WaitQueue {
    queue: spin::Mutex<VecDeque<WaitQueueEntry>>,
}

impl WaitQueue {
    /// Create a new wait queue
    pub const fn new() -> Self {
        Self {
            queue: spin::Mutex::new(VecDeque::new()),
        }
    }

    /// Append a thread to the queue
    pub fn add(&self, thread: &Arc<Thread>) {
        self.queue.lock().push_back(WaitQueueEntry {
            tid: thread.tid(),
            thread: Arc::downgrade(thread),
        });
    }

    /// Remove a specific thread from the wait queue
    ///
    /// # Returns
    ///
    /// true if thread was found and removed, false otherwise
    pub fn remove(&self, tid: ThreadId) -> bool {
        let mut queue = self.queue.lock();
        let len_before = queue.len();
        queue.retain(|entry| entry.tid != tid);
        len_before > queue.len()
    }

    /// Copy the current entries in queue order
    ///
    /// Wake-up walks a snapshot so the queue lock is never held while
    /// waiters are being satisfied.
    pub fn snapshot(&self) -> Vec<WaitQueueEntry> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Check if the wait queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Get the number of waiting threads
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Wait Object Operations
/// ============================================================================

/// Callback table of a waitable object
///
/// The object supplies `signaled`, `satisfied` and `signal`; queue handling
/// and dumping have shared default implementations.
pub trait WaitObject: Send + Sync {
    /// Object identifier
    fn id(&self) -> ObjectId;

    /// Object type
    fn object_type(&self) -> ObjectType;

    /// The object's wait queue
    fn wait_queue(&self) -> &WaitQueue;

    /// Write a one-line description of the object state
    fn dump(&self, f: &mut dyn core::fmt::Write) -> core::fmt::Result {
        write!(f, "{} {:#x} waiters={}", self.object_type(), self.id(), self.wait_queue().len())
    }

    /// Register a waiter
    fn add_queue(&self, thread: &Arc<Thread>) {
        self.wait_queue().add(thread);
    }

    /// Unregister a waiter
    fn remove_queue(&self, tid: ThreadId) -> bool {
        self.wait_queue().remove(tid)
    }

    /// Reject a wait before it starts
    ///
    /// Called once per object when `candidate` begins a wait.
    fn check_wait(&self, _candidate: &Arc<Thread>) -> Result {
        Ok(())
    }

    /// Would a wait by `candidate` succeed right now (no side effects)
    fn signaled(&self, candidate: &Arc<Thread>) -> bool;

    /// Commit a successful wait for `candidate`
    ///
    /// # Returns
    ///
    /// true if the wait must be reported as abandoned
    fn satisfied(&self, candidate: &Arc<Thread>) -> bool;

    /// Explicit signal by `thread` through a handle with `access`
    fn signal(&self, _thread: &Arc<Thread>, _access: Rights) -> Result {
        Err(Error::ObjectTypeMismatch)
    }
}

// ============================================================================
// Tests
// ============================================================================
