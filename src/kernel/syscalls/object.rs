// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Generic Object Requests
//!
//! Creation and opening shared by the typed handlers, plus the requests
//! that work on any synchronization object.
//!
//! # Requests Implemented
//!
//! - `close_handle` - Drop a handle
//! - `signal_object` - Type-specific signal through a handle
//! - `get_inproc_sync` - Device object behind a handle

use crate::kernel::dev::inproc::{InprocKind, InprocSync};
use crate::kernel::init::SyncMode;
use crate::kernel::object::{ObjectAttributes, ObjectContext, ObjectRef, Rights};
use crate::kernel::process::Process;
use crate::kernel::server::Server;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::sync::Arc;

// Import logging macros
use crate::log_trace;

/// Device object exported to a client
#[derive(Debug, Clone)]
pub struct InprocSyncInfo {
    pub sync: Arc<InprocSync>,
    pub kind: InprocKind,

    /// Access granted by the handle it was looked up through
    pub access: Rights,
}

impl Server {
    /// Process of the requesting thread
    pub(crate) fn process_of(thread: &Thread) -> Result<Arc<Process>> {
        if thread.is_terminated() {
            return Err(Error::ThreadIsTerminating);
        }
        thread.process().ok_or(Error::ThreadIsTerminating)
    }

    /// Create (or open, for an existing name) an object and return a handle
    ///
    /// An absent or empty name creates an anonymous object. `create` runs
    /// only when a new object is needed.
    pub(crate) fn create_object<F>(
        &self,
        thread: &Thread,
        name: Option<&str>,
        obj_type: ObjectType,
        access: Rights,
        attributes: ObjectAttributes,
        create: F,
    ) -> Result<(HandleValue, Disposition)>
    where
        F: FnOnce(&ObjectContext, Option<String>) -> Result<ObjectRef>,
    {
        let process = Self::process_of(thread)?;
        let access = access.map(obj_type);
        let (object, disposition) = match name.filter(|name| !name.is_empty()) {
            None => (create(self.context(), None)?, Disposition::Created),
            Some(name) => self.namespace().create_or_open(name, attributes, obj_type, || {
                create(self.context(), Some(name.to_string()))
            })?,
        };
        let handle = process.handles().alloc(object, access, attributes)?;
        log_trace!("{} handle {:#x} ({:?})", obj_type, handle, disposition);
        Ok((handle, disposition))
    }

    /// Open a named object and return a handle
    pub(crate) fn open_object(
        &self,
        thread: &Thread,
        name: &str,
        obj_type: ObjectType,
        access: Rights,
        attributes: ObjectAttributes,
    ) -> Result<HandleValue> {
        let process = Self::process_of(thread)?;
        let object = self.namespace().lookup(name, attributes, obj_type)?;
        process.handles().alloc(object, access.map(obj_type), attributes)
    }

    /// Close a handle
    pub fn close_handle(&self, thread: &Thread, handle: HandleValue) -> Result {
        let process = Self::process_of(thread)?;
        let object = process.handles().close(handle)?;
        log_trace!("closed handle {:#x} to {:?}", handle, object);
        Ok(())
    }

    /// Signal the object behind `handle`
    ///
    /// Release for a mutex (needs `SYNCHRONIZE`), set for an event (needs
    /// `EVENT_MODIFY_STATE`), release one unit for a semaphore (needs
    /// `SEMAPHORE_MODIFY_STATE`).
    pub fn signal_object(&self, thread: &Arc<Thread>, handle: HandleValue) -> Result {
        let process = Self::process_of(thread)?;
        let entry = process.handles().get(handle)?;
        entry.object.wait_object().signal(thread, entry.access)
    }

    /// Export the device object behind `handle`
    ///
    /// # Errors
    ///
    /// `NotImplemented` when the server runs on the broker path
    pub fn get_inproc_sync(&self, thread: &Thread, handle: HandleValue) -> Result<InprocSyncInfo> {
        if self.mode() != SyncMode::Inproc {
            return Err(Error::NotImplemented);
        }
        let process = Self::process_of(thread)?;
        let entry = process.handles().get(handle)?;
        let sync = entry.object.inproc_sync().ok_or(Error::NotImplemented)?;
        Ok(InprocSyncInfo {
            kind: sync.kind(),
            sync,
            access: entry.access,
        })
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
    fn test_close_handle() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, false)
            .unwrap();
        assert_eq!(fx.server.close_handle(&t, h), Ok(()));
        assert_eq!(fx.server.close_handle(&t, h), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_empty_name_is_anonymous() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (_, disp) = fx
            .server
            .create_semaphore(&t, Some(""), Rights::SEMAPHORE_ALL_ACCESS, ObjectAttributes::empty(), 0, 1)
            .unwrap();
        assert_eq!(disp, Disposition::Created);
        assert_eq!(fx.server.namespace().count(), 0);
    }

    #[test]
    fn test_generic_access_mapped() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_event(&t, None, Rights::GENERIC_WRITE, ObjectAttributes::empty(), true, false)
            .unwrap();
        let entry = fx.process.handles().get(h).unwrap();
        assert!(entry.access.contains(Rights::EVENT_MODIFY_STATE));
        assert!(!entry.access.contains(Rights::SYNCHRONIZE));
    }

    #[test]
    fn test_signal_object_per_type() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (ev, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, false)
            .unwrap();
        let (sem, _) = fx
            .server
            .create_semaphore(&t, None, Rights::SYNCHRONIZE, ObjectAttributes::empty(), 0, 2)
            .unwrap();

        fx.server.signal_object(&t, ev).unwrap();
        assert!(fx.server.query_event(&t, ev).unwrap().signaled);
        assert_eq!(fx.server.signal_object(&t, sem), Err(Error::AccessDenied));
    }

    #[test]
    fn test_get_inproc_sync_requires_inproc_mode() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_mutex(&t, None, Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), false)
            .unwrap();
        assert_eq!(fx.server.get_inproc_sync(&t, h).err(), Some(Error::NotImplemented));

        let fx = Fixture::inproc();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_mutex(&t, None, Rights::SYNCHRONIZE, ObjectAttributes::empty(), false)
            .unwrap();
        let info = fx.server.get_inproc_sync(&t, h).unwrap();
        assert_eq!(info.kind, InprocKind::Mutex);
        assert_eq!(info.access, Rights::SYNCHRONIZE);
    }

    #[test]
    fn test_terminated_thread_rejected() {
        let fx = Fixture::broker();
        let t = fx.thread();
        fx.server.terminate_thread(t.tid()).unwrap();
        assert_eq!(
            fx.server
                .create_mutex(&t, None, Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), false)
                .err(),
            Some(Error::ThreadIsTerminating)
        );
    }
}
