// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Process Management
//!
//! A process is a container of threads with its own handle table.
//!
//! # Design
//!
//! - Each process has a unique process ID (PID)
//! - Processes contain threads (tracked by TID)
//! - Processes have handle tables for access-checked object references
//!
//! # Process States
//!
//! ```text
//! Running -> Exiting -> Dead
//! ```

use crate::kernel::object::handle::HandleTable;
use crate::rustux::types::*;
use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// Import logging macros
use crate::log_debug;

/// ============================================================================
/// Process ID
/// ============================================================================

/// Invalid process ID
pub const PID_INVALID: ProcessId = 0;

/// Global process ID allocator
static PID_ALLOCATOR: PidAllocator = PidAllocator::new();

/// Process ID allocator
struct PidAllocator {
    next: AtomicU32,
}

impl PidAllocator {
    const fn new() -> Self {
        Self {
            next: AtomicU32::new(1), // Start at 1
        }
    }

    fn allocate(&self) -> ProcessId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// ============================================================================
/// Process State
/// ============================================================================

/// Process state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is running
    Running = 0,

    /// Process is exiting (threads terminating)
    Exiting = 1,

    /// Process is dead (all threads terminated, handles closed)
    Dead = 2,
}

impl ProcessState {
    /// Check if process is alive
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// ============================================================================
/// Process
/// ============================================================================

/// Process
pub struct Process {
    /// Process ID
    pid: ProcessId,

    /// Process state
    state: spin::Mutex<ProcessState>,

    /// Threads in this process
    threads: spin::Mutex<Vec<ThreadId>>,

    /// Handle table
    handles: HandleTable,
}

impl Process {
    /// Create a new process
    pub(crate) fn new() -> Arc<Self> {
        let process = Arc::new(Self {
            pid: PID_ALLOCATOR.allocate(),
            state: spin::Mutex::new(ProcessState::Running),
            threads: spin::Mutex::new(Vec::new()),
            handles: HandleTable::new(),
        });
        log_debug!("process {:#x} created", process.pid);
        process
    }

    /// Get process ID
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Get process state
    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }

    /// Get the handle table
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub(crate) fn add_thread(&self, tid: ThreadId) {
        self.threads.lock().push(tid);
    }

    pub(crate) fn remove_thread(&self, tid: ThreadId) -> bool {
        let mut threads = self.threads.lock();
        let before = threads.len();
        threads.retain(|&t| t != tid);
        before > threads.len()
    }

    /// Get thread IDs in this process
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().clone()
    }

    /// Get thread count
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }
}

impl core::fmt::Debug for Process {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.state())
            .field("threads", &self.thread_count())
            .field("handles", &self.handles.count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
