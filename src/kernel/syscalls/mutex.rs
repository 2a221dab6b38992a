// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Mutex Requests
//!
//! # Requests Implemented
//!
//! - `create_mutex` - Create or open a mutex, optionally owned
//! - `open_mutex` - Open a named mutex
//! - `release_mutex` - Release once (no access right needed)
//! - `query_mutex` - Read count, ownership and abandonment

use crate::kernel::object::{Mutex, MutexInfo, ObjectAttributes, ObjectRef, Rights};
use crate::kernel::server::Server;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::sync::Arc;

impl Server {
    /// Create a mutex
    ///
    /// `initially_owned` makes the calling thread the owner with count 1,
    /// but only when the mutex is actually created.
    pub fn create_mutex(
        &self,
        thread: &Arc<Thread>,
        name: Option<&str>,
        access: Rights,
        attributes: ObjectAttributes,
        initially_owned: bool,
    ) -> Result<(HandleValue, Disposition)> {
        let owner = initially_owned.then_some(thread);
        self.create_object(thread, name, ObjectType::Mutex, access, attributes, |ctx, name| {
            Ok(ObjectRef::Mutex(Mutex::create(ctx, name, owner)?))
        })
    }

    /// Open a named mutex
    pub fn open_mutex(
        &self,
        thread: &Thread,
        name: &str,
        access: Rights,
        attributes: ObjectAttributes,
    ) -> Result<HandleValue> {
        self.open_object(thread, name, ObjectType::Mutex, access, attributes)
    }

    /// Release a mutex held by the calling thread
    ///
    /// # Returns
    ///
    /// The recursion count before the release
    pub fn release_mutex(&self, thread: &Arc<Thread>, handle: HandleValue) -> Result<u32> {
        let process = Self::process_of(thread)?;
        let mutex = process.handles().get_mutex(handle, Rights::empty())?;
        mutex.release(thread)
    }

    /// Query a mutex
    pub fn query_mutex(&self, thread: &Thread, handle: HandleValue) -> Result<MutexInfo> {
        let process = Self::process_of(thread)?;
        let mutex = process.handles().get_mutex(handle, Rights::MUTANT_QUERY_STATE)?;
        mutex.query(thread)
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
    fn test_create_owned_and_release() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, disp) = fx
            .server
            .create_mutex(&t, None, Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), true)
            .unwrap();
        assert_eq!(disp, Disposition::Created);
        assert_eq!(
            fx.server.query_mutex(&t, h).unwrap(),
            MutexInfo { count: 1, owned: true, abandoned: false }
        );
        assert_eq!(fx.server.release_mutex(&t, h), Ok(1));
        assert_eq!(fx.server.release_mutex(&t, h), Err(Error::MutantNotOwned));
    }

    #[test]
    fn test_existing_name_ignores_initial_owner() {
        let fx = Fixture::broker();
        let a = fx.thread();
        let b = fx.thread();
        let (ha, _) = fx
            .server
            .create_mutex(&a, Some("m"), Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), false)
            .unwrap();
        let (hb, disp) = fx
            .server
            .create_mutex(&b, Some("m"), Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), true)
            .unwrap();
        assert_eq!(disp, Disposition::Existed);
        assert_eq!(disp.to_status(), status::STATUS_OBJECT_NAME_EXISTS);
        assert_ne!(ha, hb);
        assert_eq!(fx.server.query_mutex(&b, hb).unwrap().count, 0);
    }

    #[test]
    fn test_release_needs_no_access() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (h, _) = fx
            .server
            .create_mutex(&t, Some("bare"), Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty(), true)
            .unwrap();
        let bare = fx
            .server
            .open_mutex(&t, "bare", Rights::empty(), ObjectAttributes::empty())
            .unwrap();
        assert_eq!(fx.server.query_mutex(&t, bare).err(), Some(Error::AccessDenied));
        assert_eq!(fx.server.release_mutex(&t, bare), Ok(1));
        assert_eq!(fx.server.query_mutex(&t, h).unwrap().count, 0);
    }

    #[test]
    fn test_wrong_type_handle() {
        let fx = Fixture::broker();
        let t = fx.thread();
        let (ev, _) = fx
            .server
            .create_event(&t, None, Rights::EVENT_ALL_ACCESS, ObjectAttributes::empty(), true, false)
            .unwrap();
        assert_eq!(fx.server.release_mutex(&t, ev), Err(Error::ObjectTypeMismatch));
        assert_eq!(fx.server.release_mutex(&t, 0x1234), Err(Error::InvalidHandle));
        assert_eq!(
            fx.server.open_mutex(&t, "missing", Rights::SYNCHRONIZE, ObjectAttributes::empty()).err(),
            Some(Error::ObjectNameNotFound)
        );
    }
}
