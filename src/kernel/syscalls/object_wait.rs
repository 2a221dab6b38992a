// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Wait Requests
//!
//! # Requests Implemented
//!
//! - `select` - Wait for any or all of a set of handles
//! - `signal_and_wait` - Signal one object, then wait on another
//!
//! # Design
//!
//! Every handle needs `SYNCHRONIZE`. On the broker path a wait that cannot
//! complete at once is left pending and its status is delivered to the
//! thread later. On the inproc path the calling thread blocks in the device
//! until the wait completes.

use crate::kernel::dev::inproc::wait_inproc;
use crate::kernel::init::SyncMode;
use crate::kernel::object::{ObjectRef, Rights};
use crate::kernel::server::Server;
use crate::kernel::sync::wait::{begin_wait, WaitOutcome};
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::time::Duration;
use std::sync::Arc;

// Import logging macros
use crate::log_trace_if;

const LOCAL_TRACE: bool = false;

impl Server {
    fn wait_objects(thread: &Thread, handles: &[HandleValue]) -> Result<Vec<ObjectRef>> {
        if handles.is_empty() || handles.len() > MAX_WAIT_OBJECTS {
            return Err(Error::InvalidParameter);
        }
        let process = Self::process_of(thread)?;
        handles
            .iter()
            .map(|&handle| process.handles().get_checked(handle, Rights::SYNCHRONIZE))
            .collect()
    }

    fn wait_on(
        &self,
        thread: &Arc<Thread>,
        objects: Vec<ObjectRef>,
        wait_type: WaitType,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        match self.mode() {
            SyncMode::Broker => {
                let objects = objects.iter().map(ObjectRef::wait_object).collect();
                begin_wait(thread, objects, wait_type, timeout)
            }
            SyncMode::Inproc => {
                let syncs = objects
                    .iter()
                    .map(|obj| obj.inproc_sync().ok_or(Error::NotImplemented))
                    .collect::<Result<Vec<_>>>()?;
                let status = wait_inproc(self.context().device(), &syncs, wait_type, thread, timeout)?;
                Ok(WaitOutcome::Completed(status))
            }
        }
    }

    /// Wait on `handles`
    ///
    /// `timeout` of None waits forever; a zero timeout polls.
    pub fn select(
        &self,
        thread: &Arc<Thread>,
        handles: &[HandleValue],
        wait_type: WaitType,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let objects = Self::wait_objects(thread, handles)?;
        let outcome = self.wait_on(thread, objects, wait_type, timeout)?;
        log_trace_if!(LOCAL_TRACE, "thread {:#x} select -> {:?}", thread.tid(), outcome);
        Ok(outcome)
    }

    /// Signal `signal`, then wait on `wait`
    ///
    /// Both handles are resolved before anything is signaled, so a bad
    /// wait handle leaves the signaled object untouched.
    pub fn signal_and_wait(
        &self,
        thread: &Arc<Thread>,
        signal: HandleValue,
        wait: HandleValue,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let objects = Self::wait_objects(thread, &[wait])?;
        self.signal_object(thread, signal)?;
        self.wait_on(thread, objects, WaitType::Any, timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::ObjectAttributes;
    use crate::kernel::tests::fixture::Fixture;

    #[test]
    fn test_select_requires_synchronize() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_MODIFY_STATE, ObjectAttributes::empty(), true, true)
            .unwrap();
        assert_eq!(
            fx.server.select(&t, &[h], WaitType::Any, None).err(),
            Some(Error::AccessDenied)
        );
        assert_eq!(
            fx.server.select(&t, &[], WaitType::Any, None).err(),
            Some(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_select_any_reports_index() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (a, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, false)
            .unwrap();
        let (b, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, true)
            .unwrap();
        assert_eq!(
            fx.server.select(&t, &[a, b], WaitType::Any, None),
            Ok(WaitOutcome::Completed(WaitStatus::Signaled(1)))
        );
        assert_eq!(
            fx.server.select(&t, &[a, b], WaitType::All, Some(Duration::ZERO)),
            Ok(WaitOutcome::Completed(WaitStatus::TimedOut))
        );
    }

    #[test]
    fn test_signal_and_wait() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (mutex, _) = fx
            .server
            .create_mutex(&t, None, Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), true)
            .unwrap();
        let (event, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, false)
            .unwrap();

        // Bad wait handle: nothing is signaled
        assert_eq!(
            fx.server.signal_and_wait(&t, mutex, 0x999, None).err(),
            Some(Error::InvalidHandle)
        );
        assert_eq!(fx.server.query_mutex(&t, mutex).unwrap().count, 1);

        assert_eq!(
            fx.server.signal_and_wait(&t, mutex, event, None),
            Ok(WaitOutcome::Pending)
        );
        assert_eq!(fx.server.query_mutex(&t, mutex).unwrap().count, 0);
    }
}
