// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Mutex Abandonment
//!
//! When a thread terminates, every mutex it still holds becomes abandoned:
//! ownership is dropped, the next acquirer is told the protected state may
//! be inconsistent, and waiters are woken.
//!
//! On the broker path the thread's owned set lists exactly the mutexes to
//! abandon. On the inproc path ownership lives in the device, so every live
//! device-backed mutex is offered the dying thread's ID and only the ones
//! it actually holds react.

use crate::kernel::dev::inproc::{abandon_inproc_mutex, InprocSync};
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

// Import logging macros
use crate::{log_debug, log_warn};

/// ============================================================================
/// Inproc Mutex Registry
/// ============================================================================

/// Registry of live device-backed mutexes
///
/// Mutex objects link themselves on creation and unlink on destruction.
pub struct InprocMutexList {
    entries: spin::Mutex<BTreeMap<ObjectId, Weak<InprocSync>>>,
}

impl InprocMutexList {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            entries: spin::Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn link(&self, id: ObjectId, sync: &Arc<InprocSync>) {
        self.entries.lock().insert(id, Arc::downgrade(sync));
    }

    pub(crate) fn unlink(&self, id: ObjectId) {
        self.entries.lock().remove(&id);
    }

    /// Number of registered mutexes
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no mutex is registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Offer a terminating thread's ID to every registered mutex
    ///
    /// # Returns
    ///
    /// Number of mutexes that were held by `tid` and are now abandoned
    pub fn abandon(&self, tid: ThreadId) -> usize {
        // Collect first; the device is never called under the registry lock
        let live: Vec<Arc<InprocSync>> = self
            .entries
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        let mut abandoned = 0;
        for sync in &live {
            match abandon_inproc_mutex(tid, Some(sync)) {
                Ok(true) => abandoned += 1,
                Ok(false) => {}
                Err(err) => log_warn!("abandon on inproc mutex failed: {}", err),
            }
        }
        if abandoned > 0 {
            log_debug!("thread {:#x} abandoned {} inproc mutexes", tid, abandoned);
        }
        abandoned
    }
}

impl Default for InprocMutexList {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Broker Abandonment
/// ============================================================================

/// Abandon every broker-path mutex owned by a terminating thread
///
/// # Returns
///
/// Number of mutexes abandoned
pub fn abandon_mutexes(thread: &Arc<Thread>) -> usize {
    let owned = thread.take_owned();
    let mut abandoned = 0;
    for mutex in &owned {
        if mutex.abandon(thread) {
            abandoned += 1;
        }
    }
    if abandoned > 0 {
        log_debug!("thread {:#x} abandoned {} mutexes", thread.tid(), abandoned);
    }
    abandoned
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::dev::inproc::{create_inproc_mutex, DeviceSlot};
    use crate::kernel::object::Mutex;
    use crate::kernel::tests::fixture::Fixture;

    #[test]
    fn test_registry_link_unlink() {
        let slot = DeviceSlot::soft();
        let list = InprocMutexList::new();
        let sync = create_inproc_mutex(&slot, TID_INVALID, 0).unwrap();

        list.link(1, &sync);
        assert_eq!(list.len(), 1);
        list.unlink(1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_registry_abandon_broadcast() {
        let slot = DeviceSlot::soft();
        let list = InprocMutexList::new();
        let held = create_inproc_mutex(&slot, 9, 2).unwrap();
        let other = create_inproc_mutex(&slot, 10, 1).unwrap();
        let free = create_inproc_mutex(&slot, TID_INVALID, 0).unwrap();
        list.link(1, &held);
        list.link(2, &other);
        list.link(3, &free);

        assert_eq!(list.abandon(9), 1);
        assert!(held.mutex_read().unwrap().abandoned);
        assert_eq!(other.mutex_read().unwrap().owner, 10);
        assert!(!free.mutex_read().unwrap().abandoned);

        // A dead entry is skipped
        drop(other);
        assert_eq!(list.abandon(10), 0);
    }

    #[test]
    fn test_abandon_mutexes_empties_owned_set() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let a = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        let b = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        assert_eq!(t.owned_count(), 2);

        assert_eq!(abandon_mutexes(&t), 2);
        assert_eq!(t.owned_count(), 0);
        assert!(a.query(&t).unwrap().abandoned);
        assert!(b.query(&t).unwrap().abandoned);
        assert_eq!(abandon_mutexes(&t), 0);
    }
}
