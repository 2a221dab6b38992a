// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Mutex Objects
//!
//! Recursive, owner-tracked mutual exclusion objects (mutants).
//!
//! # Design
//!
//! - **Recursion**: the owner may acquire again; each acquire adds one to
//!   the count and each release removes one
//! - **Ownership set**: on the broker path the owning thread lists the
//!   mutex, so it can be abandoned when the thread terminates
//! - **Abandonment**: a mutex whose owner died becomes free, and the next
//!   acquire reports it as abandoned exactly once
//!
//! Both representations expose the same operations through [`MutexOps`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let mutex = Mutex::create(&ctx, None, Some(&thread))?;
//! let prev = mutex.release(&thread)?; // 1
//! ```

use crate::kernel::dev::inproc::{abandon_inproc_mutex, create_inproc_mutex, InprocSync};
use crate::kernel::init::SyncMode;
use crate::kernel::object::handle::Rights;
use crate::kernel::object::{alloc_object_id, ObjectContext};
use crate::kernel::sync::abandon::InprocMutexList;
use crate::kernel::sync::wait::wake_up;
use crate::kernel::sync::wait_queue::{WaitObject, WaitQueue};
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::sync::{Arc, Weak};

// Import logging macros
use crate::{log_error, log_trace};

/// ============================================================================
/// Mutex State
/// ============================================================================

/// Snapshot returned by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexInfo {
    /// Recursion count
    pub count: u32,

    /// Held by the querying thread
    pub owned: bool,

    /// Previous owner terminated while holding it
    pub abandoned: bool,
}

#[derive(Debug, Clone)]
struct Owner {
    tid: ThreadId,
    thread: Weak<Thread>,
}

#[derive(Debug, Default)]
struct MutexState {
    owner: Option<Owner>,
    count: u32,
    abandoned: bool,
}

impl MutexState {
    fn owner_tid(&self) -> ThreadId {
        self.owner.as_ref().map_or(TID_INVALID, |owner| owner.tid)
    }
}

/// Operations both representations provide
trait MutexOps {
    fn release(&self, mutex: &Mutex, thread: &Arc<Thread>) -> Result<u32>;
    fn query(&self, thread: &Thread) -> Result<MutexInfo>;
    fn abandon(&self, mutex: &Mutex, thread: &Arc<Thread>) -> bool;
}

/// ============================================================================
/// Broker Representation
/// ============================================================================

struct BrokerMutex {
    state: spin::Mutex<MutexState>,
}

impl BrokerMutex {
    fn new() -> Self {
        Self {
            state: spin::Mutex::new(MutexState::default()),
        }
    }

    /// Acquire once for `thread`; returns true if it was abandoned
    fn grab(&self, mutex: &Mutex, thread: &Arc<Thread>) -> bool {
        let (first, abandoned) = {
            let mut st = self.state.lock();
            let first = st.count == 0;
            if first {
                st.owner = Some(Owner {
                    tid: thread.tid(),
                    thread: Arc::downgrade(thread),
                });
            }
            match st.count.checked_add(1) {
                Some(count) => st.count = count,
                // check_wait refuses the wait that would get here
                None => log_error!("mutex {:#x} recursion count overflow", mutex.id),
            }
            (first, core::mem::replace(&mut st.abandoned, false))
        };
        if first {
            thread.link_owned(mutex.id, mutex.self_ref.clone());
        }
        abandoned
    }

    fn signaled(&self, candidate: &Thread) -> bool {
        let st = self.state.lock();
        st.count == 0 || st.owner_tid() == candidate.tid()
    }

    fn check_wait(&self, candidate: &Thread) -> Result {
        let st = self.state.lock();
        if st.owner_tid() == candidate.tid() && st.count == u32::MAX {
            return Err(Error::MutantLimitExceeded);
        }
        Ok(())
    }
}

impl MutexOps for BrokerMutex {
    fn release(&self, mutex: &Mutex, thread: &Arc<Thread>) -> Result<u32> {
        let (prev, freed) = {
            let mut st = self.state.lock();
            if st.count == 0 || st.owner_tid() != thread.tid() {
                return Err(Error::MutantNotOwned);
            }
            let prev = st.count;
            st.count -= 1;
            let freed = st.count == 0;
            if freed {
                st.owner = None;
            }
            (prev, freed)
        };
        if freed {
            thread.unlink_owned(mutex.id);
            wake_up(mutex, 0);
        }
        Ok(prev)
    }

    fn query(&self, thread: &Thread) -> Result<MutexInfo> {
        let st = self.state.lock();
        Ok(MutexInfo {
            count: st.count,
            owned: st.count > 0 && st.owner_tid() == thread.tid(),
            abandoned: st.abandoned,
        })
    }

    fn abandon(&self, mutex: &Mutex, thread: &Arc<Thread>) -> bool {
        {
            let mut st = self.state.lock();
            if st.count == 0 || st.owner_tid() != thread.tid() {
                return false;
            }
            st.abandoned = true;
            st.count = 0;
            st.owner = None;
        }
        thread.unlink_owned(mutex.id);
        wake_up(mutex, 0);
        true
    }
}

/// ============================================================================
/// Inproc Representation
/// ============================================================================

struct InprocMutex {
    sync: Arc<InprocSync>,
    list: Arc<InprocMutexList>,
}

impl MutexOps for InprocMutex {
    fn release(&self, _mutex: &Mutex, thread: &Arc<Thread>) -> Result<u32> {
        self.sync.mutex_unlock(thread.tid())
    }

    fn query(&self, thread: &Thread) -> Result<MutexInfo> {
        let state = self.sync.mutex_read()?;
        Ok(MutexInfo {
            count: state.count,
            owned: state.count > 0 && state.owner == thread.tid(),
            abandoned: state.abandoned,
        })
    }

    fn abandon(&self, _mutex: &Mutex, thread: &Arc<Thread>) -> bool {
        abandon_inproc_mutex(thread.tid(), Some(&self.sync)).unwrap_or(false)
    }
}

enum MutexRepr {
    Broker(BrokerMutex),
    Inproc(InprocMutex),
}

/// ============================================================================
/// Mutex
/// ============================================================================

/// Mutex object
pub struct Mutex {
    id: ObjectId,
    name: Option<String>,
    self_ref: Weak<Mutex>,
    wait_queue: WaitQueue,
    repr: MutexRepr,
}

impl Mutex {
    /// Create a mutex, optionally owned once by `owner`
    ///
    /// # Errors
    ///
    /// On the inproc path, any failure to reach the device or create the
    /// device object.
    pub fn create(ctx: &ObjectContext, name: Option<String>, owner: Option<&Arc<Thread>>) -> Result<Arc<Self>> {
        let id = alloc_object_id();
        let repr = match ctx.mode() {
            SyncMode::Broker => MutexRepr::Broker(BrokerMutex::new()),
            SyncMode::Inproc => {
                let (tid, count) = owner.map_or((TID_INVALID, 0), |t| (t.tid(), 1));
                MutexRepr::Inproc(InprocMutex {
                    sync: create_inproc_mutex(ctx.device(), tid, count)?,
                    list: Arc::clone(ctx.inproc_mutexes()),
                })
            }
        };

        let mutex = Arc::new_cyclic(|self_ref| Self {
            id,
            name,
            self_ref: self_ref.clone(),
            wait_queue: WaitQueue::new(),
            repr,
        });

        match &mutex.repr {
            MutexRepr::Broker(broker) => {
                if let Some(owner) = owner {
                    broker.grab(&mutex, owner);
                }
            }
            MutexRepr::Inproc(inproc) => inproc.list.link(id, &inproc.sync),
        }
        log_trace!("mutex {:#x} created", id);
        Ok(mutex)
    }

    fn ops(&self) -> &dyn MutexOps {
        match &self.repr {
            MutexRepr::Broker(broker) => broker,
            MutexRepr::Inproc(inproc) => inproc,
        }
    }

    /// Namespace name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Release once on behalf of `thread`
    ///
    /// # Returns
    ///
    /// The recursion count before the release
    ///
    /// # Errors
    ///
    /// `MutantNotOwned` if `thread` does not hold the mutex
    pub fn release(&self, thread: &Arc<Thread>) -> Result<u32> {
        self.ops().release(self, thread)
    }

    /// Read the state as seen by `thread`
    pub fn query(&self, thread: &Thread) -> Result<MutexInfo> {
        self.ops().query(thread)
    }

    /// Abandon the mutex if `thread` holds it
    pub fn abandon(&self, thread: &Arc<Thread>) -> bool {
        self.ops().abandon(self, thread)
    }

    /// Device object, on the inproc path
    pub fn inproc_sync(&self) -> Option<Arc<InprocSync>> {
        match &self.repr {
            MutexRepr::Inproc(inproc) => Some(Arc::clone(&inproc.sync)),
            MutexRepr::Broker(_) => None,
        }
    }
}

impl WaitObject for Mutex {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Mutex
    }

    fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }

    fn dump(&self, f: &mut dyn core::fmt::Write) -> core::fmt::Result {
        match &self.repr {
            MutexRepr::Broker(broker) => {
                let st = broker.state.lock();
                write!(
                    f,
                    "Mutant {:#x} owner={:#x} count={} abandoned={}",
                    self.id,
                    st.owner_tid(),
                    st.count,
                    st.abandoned
                )
            }
            MutexRepr::Inproc(_) => write!(f, "Mutant {:#x} inproc", self.id),
        }
    }

    fn check_wait(&self, candidate: &Arc<Thread>) -> Result {
        match &self.repr {
            MutexRepr::Broker(broker) => broker.check_wait(candidate),
            MutexRepr::Inproc(_) => Ok(()),
        }
    }

    fn signaled(&self, candidate: &Arc<Thread>) -> bool {
        match &self.repr {
            MutexRepr::Broker(broker) => broker.signaled(candidate),
            // Inproc objects are waited on in the device
            MutexRepr::Inproc(_) => false,
        }
    }

    fn satisfied(&self, candidate: &Arc<Thread>) -> bool {
        match &self.repr {
            MutexRepr::Broker(broker) => broker.grab(self, candidate),
            MutexRepr::Inproc(_) => false,
        }
    }

    fn signal(&self, thread: &Arc<Thread>, access: Rights) -> Result {
        access.require(Rights::SYNCHRONIZE)?;
        self.release(thread).map(|_| ())
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        match &mut self.repr {
            MutexRepr::Broker(broker) => {
                let st = broker.state.get_mut();
                if let Some(owner) = st.owner.take() {
                    if let Some(thread) = owner.thread.upgrade() {
                        thread.unlink_owned(self.id);
                    }
                }
            }
            MutexRepr::Inproc(inproc) => inproc.list.unlink(self.id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::fixture::Fixture;

    #[test]
    fn test_create_unowned() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, None).unwrap();
        assert_eq!(mutex.query(&t).unwrap(), MutexInfo { count: 0, owned: false, abandoned: false });
        assert!(mutex.signaled(&t));
        assert_eq!(mutex.release(&t), Err(Error::MutantNotOwned));
    }

    #[test]
    fn test_recursive_acquire_release() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        assert!(t.owns(mutex.id()));

        assert!(!mutex.satisfied(&t));
        assert!(!mutex.satisfied(&t));
        assert_eq!(mutex.query(&t).unwrap().count, 3);

        assert_eq!(mutex.release(&t), Ok(3));
        assert_eq!(mutex.release(&t), Ok(2));
        assert!(t.owns(mutex.id()));
        assert_eq!(mutex.release(&t), Ok(1));
        assert!(!t.owns(mutex.id()));
        assert_eq!(mutex.release(&t), Err(Error::MutantNotOwned));
    }

    #[test]
    fn test_owner_only_release() {
        let fx = Fixture::broker();
        let a = fx.thread();
        let b = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&a)).unwrap();

        assert!(!mutex.signaled(&b));
        assert_eq!(mutex.release(&b), Err(Error::MutantNotOwned));
        let info = mutex.query(&b).unwrap();
        assert_eq!(info.count, 1);
        assert!(!info.owned);
        assert!(mutex.query(&a).unwrap().owned);
    }

    #[test]
    fn test_abandon_then_acquire_reports_once() {
        let fx = Fixture::broker();
        let a = fx.thread();
        let b = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&a)).unwrap();

        assert!(!mutex.abandon(&b));
        assert!(mutex.abandon(&a));
        assert!(!a.owns(mutex.id()));
        assert_eq!(mutex.query(&b).unwrap(), MutexInfo { count: 0, owned: false, abandoned: true });

        assert!(mutex.signaled(&b));
        assert!(mutex.satisfied(&b));
        assert_eq!(mutex.query(&b).unwrap(), MutexInfo { count: 1, owned: true, abandoned: false });
        assert_eq!(mutex.release(&b), Ok(1));
        assert!(!mutex.satisfied(&b));
    }

    #[test]
    fn test_recursion_limit_refused() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        if let MutexRepr::Broker(broker) = &mutex.repr {
            broker.state.lock().count = u32::MAX;
        }
        assert_eq!(mutex.check_wait(&t), Err(Error::MutantLimitExceeded));
        assert_eq!(mutex.check_wait(&fx.thread()), Ok(()));
    }

    #[test]
    fn test_signal_requires_synchronize() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        assert_eq!(mutex.signal(&t, Rights::MUTANT_QUERY_STATE), Err(Error::AccessDenied));
        assert_eq!(mutex.signal(&t, Rights::SYNCHRONIZE), Ok(()));
        assert_eq!(mutex.query(&t).unwrap().count, 0);
    }

    #[test]
    fn test_drop_unlinks_owner() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&t)).unwrap();
        assert_eq!(t.owned_count(), 1);
        drop(mutex);
        assert_eq!(t.owned_count(), 0);
    }

    #[test]
    fn test_inproc_mutex() {
        let fx = Fixture::inproc();
        let a = fx.thread();
        let b = fx.thread();
        let mutex = Mutex::create(&fx.ctx(), None, Some(&a)).unwrap();
        assert_eq!(fx.ctx().inproc_mutexes().len(), 1);
        assert!(mutex.inproc_sync().is_some());
        assert_eq!(a.owned_count(), 0);

        assert_eq!(mutex.release(&b), Err(Error::MutantNotOwned));
        assert!(mutex.query(&a).unwrap().owned);
        assert_eq!(mutex.release(&a), Ok(1));
        assert_eq!(mutex.query(&a).unwrap().count, 0);

        drop(mutex);
        assert!(fx.ctx().inproc_mutexes().is_empty());
    }
}
