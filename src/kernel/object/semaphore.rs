// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Semaphore Objects
//!
//! Counting semaphores bounded by a maximum fixed at creation. A wait
//! consumes one unit; a release adds units and wakes at most that many
//! waiters.

use crate::kernel::dev::inproc::{create_inproc_semaphore, InprocSync};
use crate::kernel::init::SyncMode;
use crate::kernel::object::handle::Rights;
use crate::kernel::object::{alloc_object_id, ObjectContext};
use crate::kernel::sync::wait::wake_up;
use crate::kernel::sync::wait_queue::{WaitObject, WaitQueue};
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::sync::Arc;

// Import logging macros
use crate::log_trace;

/// Snapshot returned by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreInfo {
    pub count: u32,
    pub max: u32,
}

enum SemaphoreRepr {
    Broker(spin::Mutex<SemaphoreInfo>),
    Inproc(Arc<InprocSync>),
}

/// Semaphore object
pub struct Semaphore {
    id: ObjectId,
    name: Option<String>,
    wait_queue: WaitQueue,
    repr: SemaphoreRepr,
}

impl Semaphore {
    /// Create a semaphore
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `max` is zero or `initial` exceeds it
    pub fn create(ctx: &ObjectContext, name: Option<String>, initial: u32, max: u32) -> Result<Arc<Self>> {
        if max == 0 || initial > max {
            return Err(Error::InvalidParameter);
        }
        let repr = match ctx.mode() {
            SyncMode::Broker => SemaphoreRepr::Broker(spin::Mutex::new(SemaphoreInfo { count: initial, max })),
            SyncMode::Inproc => SemaphoreRepr::Inproc(create_inproc_semaphore(ctx.device(), initial, max)?),
        };
        let sem = Arc::new(Self {
            id: alloc_object_id(),
            name,
            wait_queue: WaitQueue::new(),
            repr,
        });
        log_trace!("semaphore {:#x} created ({}/{})", sem.id, initial, max);
        Ok(sem)
    }

    /// Namespace name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Add `count` units, returning the previous count
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `count` is zero
    /// - `SemaphoreLimitExceeded` if the result would pass the maximum
    pub fn release(&self, count: u32) -> Result<u32> {
        if count == 0 {
            return Err(Error::InvalidParameter);
        }
        match &self.repr {
            SemaphoreRepr::Broker(state) => {
                let prev = {
                    let mut st = state.lock();
                    let prev = st.count;
                    match prev.checked_add(count) {
                        Some(next) if next <= st.max => st.count = next,
                        _ => return Err(Error::SemaphoreLimitExceeded),
                    }
                    prev
                };
                wake_up(self, count as usize);
                Ok(prev)
            }
            SemaphoreRepr::Inproc(sync) => sync.sem_release(count),
        }
    }

    /// Read the current state
    pub fn query(&self) -> Result<SemaphoreInfo> {
        match &self.repr {
            SemaphoreRepr::Broker(state) => Ok(*state.lock()),
            SemaphoreRepr::Inproc(sync) => {
                let read = sync.sem_read()?;
                Ok(SemaphoreInfo {
                    count: read.count,
                    max: read.max,
                })
            }
        }
    }

    /// Device object, on the inproc path
    pub fn inproc_sync(&self) -> Option<Arc<InprocSync>> {
        match &self.repr {
            SemaphoreRepr::Inproc(sync) => Some(Arc::clone(sync)),
            SemaphoreRepr::Broker(_) => None,
        }
    }
}

impl WaitObject for Semaphore {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Semaphore
    }

    fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }

    fn dump(&self, f: &mut dyn core::fmt::Write) -> core::fmt::Result {
        match &self.repr {
            SemaphoreRepr::Broker(state) => {
                let st = state.lock();
                write!(f, "Semaphore {:#x} count={} max={}", self.id, st.count, st.max)
            }
            SemaphoreRepr::Inproc(_) => write!(f, "Semaphore {:#x} inproc", self.id),
        }
    }

    fn signaled(&self, _candidate: &Arc<Thread>) -> bool {
        match &self.repr {
            SemaphoreRepr::Broker(state) => state.lock().count > 0,
            SemaphoreRepr::Inproc(_) => false,
        }
    }

    fn satisfied(&self, _candidate: &Arc<Thread>) -> bool {
        if let SemaphoreRepr::Broker(state) = &self.repr {
            let mut st = state.lock();
            st.count = st.count.saturating_sub(1);
        }
        false
    }

    fn signal(&self, _thread: &Arc<Thread>, access: Rights) -> Result {
        access.require(Rights::SEMAPHORE_MODIFY_STATE)?;
        self.release(1).map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================
