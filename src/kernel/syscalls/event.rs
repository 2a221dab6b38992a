// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Requests
//!
//! # Requests Implemented
//!
//! - `create_event` - Create or open an event
//! - `open_event` - Open a named event
//! - `event_op` - Set, reset or pulse
//! - `query_event` - Read reset mode and state

use crate::kernel::object::{Event, EventInfo, EventOp, ObjectAttributes, ObjectRef, Rights};
use crate::kernel::server::Server;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;

impl Server {
    /// Create an event
    pub fn create_event(
        &self,
        thread: &Thread,
        name: Option<&str>,
        access: Rights,
        attributes: ObjectAttributes,
        manual_reset: bool,
        initial_state: bool,
    ) -> Result<(HandleValue, Disposition)> {
        self.create_object(thread, name, ObjectType::Event, access, attributes, |ctx, name| {
            Ok(ObjectRef::Event(Event::create(ctx, name, manual_reset, initial_state)?))
        })
    }

    /// Open a named event
    pub fn open_event(
        &self,
        thread: &Thread,
        name: &str,
        access: Rights,
        attributes: ObjectAttributes,
    ) -> Result<HandleValue> {
        self.open_object(thread, name, ObjectType::Event, access, attributes)
    }

    /// Set, reset or pulse an event
    ///
    /// # Returns
    ///
    /// The signaled state before the operation
    pub fn event_op(&self, thread: &Thread, handle: HandleValue, op: EventOp) -> Result<bool> {
        let process = Self::process_of(thread)?;
        let event = process.handles().get_event(handle, Rights::EVENT_MODIFY_STATE)?;
        event.apply(op)
    }

    /// Query an event
    pub fn query_event(&self, thread: &Thread, handle: HandleValue) -> Result<EventInfo> {
        let process = Self::process_of(thread)?;
        let event = process.handles().get_event(handle, Rights::EVENT_QUERY_STATE)?;
        event.query()
    }
}

// ============================================================================
// Tests
// ============================================================================
