// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Semaphore Requests
//!
//! # Requests Implemented
//!
//! - `create_semaphore` - Create or open a semaphore
//! - `open_semaphore` - Open a named semaphore
//! - `release_semaphore` - Add units
//! - `query_semaphore` - Read count and maximum

use crate::kernel::object::{ObjectAttributes, ObjectRef, Rights, Semaphore, SemaphoreInfo};
use crate::kernel::server::Server;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;

impl Server {
    /// Create a semaphore
    pub fn create_semaphore(
        &self,
        thread: &Thread,
        name: Option<&str>,
        access: Rights,
        attributes: ObjectAttributes,
        initial: u32,
        max: u32,
    ) -> Result<(HandleValue, Disposition)> {
        self.create_object(thread, name, ObjectType::Semaphore, access, attributes, |ctx, name| {
            Ok(ObjectRef::Semaphore(Semaphore::create(ctx, name, initial, max)?))
        })
    }

    /// Open a named semaphore
    pub fn open_semaphore(
        &self,
        thread: &Thread,
        name: &str,
        access: Rights,
        attributes: ObjectAttributes,
    ) -> Result<HandleValue> {
        self.open_object(thread, name, ObjectType::Semaphore, access, attributes)
    }

    /// Release `count` units
    ///
    /// # Returns
    ///
    /// The count before the release
    pub fn release_semaphore(&self, thread: &Thread, handle: HandleValue, count: u32) -> Result<u32> {
        let process = Self::process_of(thread)?;
        let sem = process.handles().get_semaphore(handle, Rights::SEMAPHORE_MODIFY_STATE)?;
        sem.release(count)
    }

    /// Query a semaphore
    pub fn query_semaphore(&self, thread: &Thread, handle: HandleValue) -> Result<SemaphoreInfo> {
        let process = Self::process_of(thread)?;
        let sem = process.handles().get_semaphore(handle, Rights::SEMAPHORE_QUERY_STATE)?;
        sem.query()
    }
}

// ============================================================================
// Tests
// ============================================================================
