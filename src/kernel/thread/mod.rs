// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Management
//!
//! A thread is the unit that issues requests, waits on objects and owns
//! mutexes. It belongs to exactly one process.
//!
//! # Design
//!
//! - Each thread has a unique thread ID (TID), never `TID_INVALID`
//! - The owned-mutex set holds weak references; ownership never keeps a
//!   mutex alive
//! - A pending broker wait and the wake-up status it produced are stored
//!   on the thread
//! - On the inproc path the thread carries an alert event; raising it
//!   interrupts a wait blocked in the device
//!
//! # Thread States
//!
//! ```text
//! Running -> Waiting -> Running
//!    |          |
//!    v          v
//!  Terminated <--
//! ```

use crate::kernel::dev::inproc::InprocSync;
use crate::kernel::object::Mutex;
use crate::kernel::process::Process;
use crate::kernel::sync::wait::ThreadWait;
use crate::rustux::types::*;
use core::sync::atomic::{AtomicU32, Ordering};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

// Import logging macros
use crate::{log_trace, log_warn};

/// ============================================================================
/// Thread ID
/// ============================================================================

/// Global thread ID allocator
static TID_ALLOCATOR: TidAllocator = TidAllocator::new();

/// Thread ID allocator
struct TidAllocator {
    next: AtomicU32,
}

impl TidAllocator {
    const fn new() -> Self {
        Self {
            next: AtomicU32::new(1), // TID 0 is reserved/invalid
        }
    }

    fn allocate(&self) -> ThreadId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// ============================================================================
/// Thread State
/// ============================================================================

/// Thread state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Thread is running
    Running = 0,

    /// Thread has a pending broker wait
    Waiting = 1,

    /// Thread has terminated
    Terminated = 2,
}

/// ============================================================================
/// Thread
/// ============================================================================

/// Thread
pub struct Thread {
    /// Thread ID
    tid: ThreadId,

    /// Owning process ID
    pid: ProcessId,

    /// Owning process
    process: Weak<Process>,

    /// Thread state
    state: spin::Mutex<ThreadState>,

    /// Broker-path mutexes currently owned
    owned_mutexes: spin::Mutex<BTreeMap<ObjectId, Weak<Mutex>>>,

    /// Pending broker wait
    wait: spin::Mutex<Option<ThreadWait>>,

    /// Completion status of the last broker wait, until collected
    wakeup: spin::Mutex<Option<WaitStatus>>,

    /// Interrupts this thread's device waits
    alert: spin::Once<Arc<InprocSync>>,
}

impl Thread {
    /// Create a new thread in `process`
    pub(crate) fn new(process: &Arc<Process>) -> Arc<Self> {
        let thread = Arc::new(Self {
            tid: TID_ALLOCATOR.allocate(),
            pid: process.pid(),
            process: Arc::downgrade(process),
            state: spin::Mutex::new(ThreadState::Running),
            owned_mutexes: spin::Mutex::new(BTreeMap::new()),
            wait: spin::Mutex::new(None),
            wakeup: spin::Mutex::new(None),
            alert: spin::Once::new(),
        });
        log_trace!("thread {:#x} created in process {:#x}", thread.tid, thread.pid);
        thread
    }

    /// Get thread ID
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Get owning process ID
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Get owning process, if it is still alive
    pub fn process(&self) -> Option<Arc<Process>> {
        self.process.upgrade()
    }

    /// Get thread state
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        let mut current = self.state.lock();
        // Termination is final
        if *current != ThreadState::Terminated {
            *current = state;
        }
    }

    /// Check if the thread has terminated
    pub fn is_terminated(&self) -> bool {
        self.state() == ThreadState::Terminated
    }

    /// ============================================================================
    /// Owned Mutexes
    /// ============================================================================

    pub(crate) fn link_owned(&self, id: ObjectId, mutex: Weak<Mutex>) {
        self.owned_mutexes.lock().insert(id, mutex);
    }

    pub(crate) fn unlink_owned(&self, id: ObjectId) -> bool {
        self.owned_mutexes.lock().remove(&id).is_some()
    }

    /// Empty the owned set, returning the mutexes still alive
    pub(crate) fn take_owned(&self) -> Vec<Arc<Mutex>> {
        let owned = core::mem::take(&mut *self.owned_mutexes.lock());
        owned.into_values().filter_map(|m| m.upgrade()).collect()
    }

    /// Number of broker-path mutexes owned
    pub fn owned_count(&self) -> usize {
        self.owned_mutexes.lock().len()
    }

    /// Check if the thread owns mutex `id` on the broker path
    pub fn owns(&self, id: ObjectId) -> bool {
        self.owned_mutexes.lock().contains_key(&id)
    }

    /// ============================================================================
    /// Wait State
    /// ============================================================================

    pub(crate) fn wait_slot(&self) -> &spin::Mutex<Option<ThreadWait>> {
        &self.wait
    }

    /// Check if the thread has a pending broker wait
    pub fn is_waiting(&self) -> bool {
        self.wait.lock().is_some()
    }

    pub(crate) fn deliver_wakeup(&self, status: WaitStatus) {
        *self.wakeup.lock() = Some(status);
        self.set_state(ThreadState::Running);
    }

    /// Collect the status a pending wait completed with
    pub fn take_wakeup(&self) -> Option<WaitStatus> {
        self.wakeup.lock().take()
    }

    pub(crate) fn install_alert(&self, alert: Arc<InprocSync>) {
        self.alert.call_once(|| alert);
    }

    /// Device event that interrupts this thread's inproc waits
    pub fn alert(&self) -> Option<&Arc<InprocSync>> {
        self.alert.get()
    }

    /// Interrupt the thread's current or next inproc wait
    ///
    /// # Returns
    ///
    /// false if the thread has no alert
    pub(crate) fn raise_alert(&self) -> bool {
        match self.alert() {
            Some(alert) => match alert.event_set() {
                Ok(_) => true,
                Err(err) => {
                    log_warn!("thread {:#x} alert failed: {}", self.tid, err);
                    false
                }
            },
            None => false,
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
