// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Broker Wait Engine
//!
//! Arbitrates multi-object waits on the broker path. A wait either
//! completes immediately, or the thread is queued on every object and is
//! completed later by [`wake_up`], by a timeout, or by cancellation.
//!
//! # Locking
//!
//! Object state locks are never held across [`wake_up`]. The engine takes a
//! thread's wait slot, then object state locks one at a time through the
//! `signaled` / `satisfied` callbacks.
//!
//! # Usage
//!
//! ```rust,ignore
//! match begin_wait(&thread, objects, WaitType::Any, None)? {
//!     WaitOutcome::Completed(status) => reply(status),
//!     WaitOutcome::Pending => { /* status arrives via thread.take_wakeup() */ }
//! }
//! ```

use crate::kernel::sync::wait_queue::WaitObject;
use crate::kernel::thread::{Thread, ThreadState};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

// Import logging macros
use crate::{log_debug, log_trace_if};

const LOCAL_TRACE: bool = false;

/// ============================================================================
/// Wait Records
/// ============================================================================

/// A pending broker wait
pub struct ThreadWait {
    /// Objects waited on, in request order
    objects: Vec<Arc<dyn WaitObject>>,

    /// Any / all
    wait_type: WaitType,

    /// Expiry, None waits forever
    deadline: Option<Instant>,
}

impl ThreadWait {
    /// Check if the wait has expired at `now`
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Objects waited on
    pub fn objects(&self) -> &[Arc<dyn WaitObject>] {
        &self.objects
    }
}

/// Result of starting a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Finished without blocking
    Completed(WaitStatus),

    /// Thread is queued; completion is delivered to the thread
    Pending,
}

impl WaitOutcome {
    /// Completion status, None while pending
    pub fn status(self) -> Option<WaitStatus> {
        match self {
            Self::Completed(status) => Some(status),
            Self::Pending => None,
        }
    }
}

/// ============================================================================
/// Wait Engine
/// ============================================================================

/// Evaluate the wait condition and commit it if met
fn satisfy(thread: &Arc<Thread>, objects: &[Arc<dyn WaitObject>], wait_type: WaitType) -> Option<WaitStatus> {
    match wait_type {
        WaitType::Any => {
            let index = objects.iter().position(|obj| obj.signaled(thread))?;
            if objects[index].satisfied(thread) {
                Some(WaitStatus::Abandoned(index))
            } else {
                Some(WaitStatus::Signaled(index))
            }
        }
        WaitType::All => {
            if !objects.iter().all(|obj| obj.signaled(thread)) {
                return None;
            }
            let mut abandoned = false;
            for obj in objects {
                abandoned |= obj.satisfied(thread);
            }
            if abandoned {
                Some(WaitStatus::Abandoned(0))
            } else {
                Some(WaitStatus::Signaled(0))
            }
        }
    }
}

fn has_duplicates(objects: &[Arc<dyn WaitObject>]) -> bool {
    let mut ids: Vec<ObjectId> = objects.iter().map(|obj| obj.id()).collect();
    ids.sort_unstable();
    ids.windows(2).any(|pair| pair[0] == pair[1])
}

/// Start a wait by `thread` on `objects`
///
/// An empty object list with a timeout is a plain sleep.
///
/// # Errors
///
/// - `ThreadIsTerminating` if the thread is terminated
/// - `InvalidParameter` for too many objects, a duplicate object in a
///   wait-all, or a thread that already has a pending wait
/// - any error raised by an object's `check_wait`
pub fn begin_wait(
    thread: &Arc<Thread>,
    objects: Vec<Arc<dyn WaitObject>>,
    wait_type: WaitType,
    timeout: Option<Duration>,
) -> Result<WaitOutcome> {
    if thread.is_terminated() {
        return Err(Error::ThreadIsTerminating);
    }
    if objects.len() > MAX_WAIT_OBJECTS {
        return Err(Error::InvalidParameter);
    }
    if wait_type == WaitType::All && has_duplicates(&objects) {
        return Err(Error::InvalidParameter);
    }

    let mut slot = thread.wait_slot().lock();
    if slot.is_some() {
        return Err(Error::InvalidParameter);
    }
    for obj in &objects {
        obj.check_wait(thread)?;
    }
    thread.take_wakeup();

    if !objects.is_empty() {
        if let Some(status) = satisfy(thread, &objects, wait_type) {
            log_trace_if!(LOCAL_TRACE, "thread {:#x} wait satisfied at once: {:?}", thread.tid(), status);
            return Ok(WaitOutcome::Completed(status));
        }
    }
    if timeout.is_some_and(|t| t.is_zero()) {
        return Ok(WaitOutcome::Completed(WaitStatus::TimedOut));
    }

    for obj in &objects {
        obj.add_queue(thread);
    }
    *slot = Some(ThreadWait {
        objects,
        wait_type,
        deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
    });
    thread.set_state(ThreadState::Waiting);
    log_trace_if!(LOCAL_TRACE, "thread {:#x} blocked", thread.tid());
    Ok(WaitOutcome::Pending)
}

fn end_wait(thread: &Arc<Thread>, wait: ThreadWait, status: WaitStatus) {
    for obj in &wait.objects {
        obj.remove_queue(thread.tid());
    }
    thread.deliver_wakeup(status);
    log_trace_if!(LOCAL_TRACE, "thread {:#x} woken: {:?}", thread.tid(), status);
}

/// Complete `thread`'s pending wait if its condition now holds
pub fn try_wake(thread: &Arc<Thread>) -> bool {
    let mut slot = thread.wait_slot().lock();
    let Some(status) = slot
        .as_ref()
        .and_then(|wait| satisfy(thread, &wait.objects, wait.wait_type))
    else {
        return false;
    };
    let Some(wait) = slot.take() else {
        return false;
    };
    drop(slot);
    end_wait(thread, wait, status);
    true
}

/// Offer `obj` to its waiters in queue order
///
/// Stops after `max` successful wake-ups; 0 means no limit.
///
/// # Returns
///
/// Number of waits completed
pub fn wake_up(obj: &dyn WaitObject, max: usize) -> usize {
    let mut woken = 0;
    for entry in obj.wait_queue().snapshot() {
        let Some(thread) = entry.thread.upgrade() else {
            obj.remove_queue(entry.tid);
            continue;
        };
        if try_wake(&thread) {
            woken += 1;
            if max != 0 && woken >= max {
                break;
            }
        }
    }
    woken
}

/// Abort `thread`'s pending wait with `status`
///
/// No object state is changed.
pub fn cancel_wait(thread: &Arc<Thread>, status: WaitStatus) -> bool {
    let wait = thread.wait_slot().lock().take();
    match wait {
        Some(wait) => {
            log_debug!("thread {:#x} wait cancelled: {:?}", thread.tid(), status);
            end_wait(thread, wait, status);
            true
        }
        None => false,
    }
}

/// Time out every wait among `threads` that expired at `now`
pub fn expire_timeouts<'a>(threads: impl IntoIterator<Item = &'a Arc<Thread>>, now: Instant) -> usize {
    let mut expired = 0;
    for thread in threads {
        let wait = {
            let mut slot = thread.wait_slot().lock();
            match slot.as_ref() {
                Some(wait) if wait.expired(now) => slot.take(),
                _ => None,
            }
        };
        if let Some(wait) = wait {
            end_wait(thread, wait, WaitStatus::TimedOut);
            expired += 1;
        }
    }
    expired
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::{Event, Semaphore};
    use crate::kernel::tests::fixture::Fixture;

    fn objs(list: &[Arc<dyn WaitObject>]) -> Vec<Arc<dyn WaitObject>> {
        list.to_vec()
    }

    #[test]
    fn test_immediate_and_zero_timeout() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let set: Arc<dyn WaitObject> = Event::create(&fx.ctx(), None, true, true).unwrap();
        let unset: Arc<dyn WaitObject> = Event::create(&fx.ctx(), None, true, false).unwrap();

        let outcome = begin_wait(&t, objs(&[unset.clone(), set]), WaitType::Any, None).unwrap();
        assert_eq!(outcome, WaitOutcome::Completed(WaitStatus::Signaled(1)));

        let outcome = begin_wait(&t, objs(&[unset.clone()]), WaitType::Any, Some(Duration::ZERO)).unwrap();
        assert_eq!(outcome, WaitOutcome::Completed(WaitStatus::TimedOut));
        assert!(unset.wait_queue().is_empty());
    }

    #[test]
    fn test_pending_wait_completed_by_wake_up() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let event = Event::create(&fx.ctx(), None, false, false).unwrap();
        let obj: Arc<dyn WaitObject> = event.clone();

        assert_eq!(
            begin_wait(&t, objs(&[obj.clone()]), WaitType::Any, None).unwrap(),
            WaitOutcome::Pending
        );
        assert!(t.is_waiting());
        assert_eq!(t.state(), ThreadState::Waiting);
        assert_eq!(obj.wait_queue().len(), 1);

        event.set().unwrap();
        assert_eq!(t.take_wakeup(), Some(WaitStatus::Signaled(0)));
        assert!(!t.is_waiting());
        assert!(obj.wait_queue().is_empty());
        assert!(!event.query().unwrap().signaled);
    }

    #[test]
    fn test_second_wait_rejected() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let obj: Arc<dyn WaitObject> = Event::create(&fx.ctx(), None, true, false).unwrap();
        begin_wait(&t, objs(&[obj.clone()]), WaitType::Any, None).unwrap();
        assert_eq!(
            begin_wait(&t, objs(&[obj]), WaitType::Any, None).err(),
            Some(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_wait_all_duplicates_rejected() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let sem: Arc<dyn WaitObject> = Semaphore::create(&fx.ctx(), None, 2, 2).unwrap();
        assert_eq!(
            begin_wait(&t, objs(&[sem.clone(), sem]), WaitType::All, None).err(),
            Some(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_cancel_leaves_objects_untouched() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let sem = Semaphore::create(&fx.ctx(), None, 0, 1).unwrap();
        let obj: Arc<dyn WaitObject> = sem.clone();

        begin_wait(&t, objs(&[obj.clone()]), WaitType::Any, None).unwrap();
        assert!(cancel_wait(&t, WaitStatus::Cancelled));
        assert!(!cancel_wait(&t, WaitStatus::Cancelled));
        assert_eq!(t.take_wakeup(), Some(WaitStatus::Cancelled));
        assert!(obj.wait_queue().is_empty());

        sem.release(1).unwrap();
        assert_eq!(sem.query().unwrap().count, 1);
    }

    #[test]
    fn test_expire_timeouts() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let u = fx.thread();
        let obj: Arc<dyn WaitObject> = Event::create(&fx.ctx(), None, true, false).unwrap();

        begin_wait(&t, objs(&[obj.clone()]), WaitType::Any, Some(Duration::from_millis(5))).unwrap();
        begin_wait(&u, objs(&[obj.clone()]), WaitType::Any, None).unwrap();

        let later = Instant::now() + Duration::from_secs(1);
        assert_eq!(expire_timeouts([&t, &u], later), 1);
        assert_eq!(t.take_wakeup(), Some(WaitStatus::TimedOut));
        assert!(u.is_waiting());
        assert_eq!(obj.wait_queue().len(), 1);
    }

    #[test]
    fn test_terminated_thread_cannot_wait() {
        let fx = Fixture::broker();
        let t = fx.thread();
        t.set_state(ThreadState::Terminated);
        assert_eq!(
            begin_wait(&t, Vec::new(), WaitType::Any, None).err(),
            Some(Error::ThreadIsTerminating)
        );
    }
}
