// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Request Interface
//!
//! Client requests for synchronization objects. Each request is a method
//! on [`Server`] taking the requesting thread; [`Server::dispatch`] routes
//! a decoded [`Request`] and converts the result to a status code.
//!
//! # Design Rules
//!
//! - **Handle-based**: every operation on an existing object goes through
//!   a handle and its granted access
//! - **Status codes**: failures map onto NT status values, successes carry
//!   the disposition or wait status
//!
//! # Status Convention
//!
//! ```text
//! Success:  STATUS_SUCCESS, STATUS_OBJECT_NAME_EXISTS, wait statuses
//! Failure:  0xC0000000-range error status
//! ```

pub mod event;
pub mod mutex;
pub mod object;
pub mod object_wait;
pub mod semaphore;

pub use object::InprocSyncInfo;

use crate::kernel::object::{EventInfo, EventOp, MutexInfo, ObjectAttributes, Rights, SemaphoreInfo};
use crate::kernel::server::Server;
use crate::kernel::sync::wait::WaitOutcome;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::time::Duration;
use std::sync::Arc;

// Import logging macros
use crate::log_debug;

/// ============================================================================
/// Requests
/// ============================================================================

/// Decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateMutex {
        name: Option<String>,
        access: u32,
        attributes: u32,
        owned: bool,
    },
    OpenMutex {
        name: String,
        access: u32,
        attributes: u32,
    },
    ReleaseMutex {
        handle: HandleValue,
    },
    QueryMutex {
        handle: HandleValue,
    },
    CreateEvent {
        name: Option<String>,
        access: u32,
        attributes: u32,
        manual_reset: bool,
        initial_state: bool,
    },
    OpenEvent {
        name: String,
        access: u32,
        attributes: u32,
    },
    EventOp {
        handle: HandleValue,
        op: EventOp,
    },
    QueryEvent {
        handle: HandleValue,
    },
    CreateSemaphore {
        name: Option<String>,
        access: u32,
        attributes: u32,
        initial: u32,
        max: u32,
    },
    OpenSemaphore {
        name: String,
        access: u32,
        attributes: u32,
    },
    ReleaseSemaphore {
        handle: HandleValue,
        count: u32,
    },
    QuerySemaphore {
        handle: HandleValue,
    },
    Select {
        handles: Vec<HandleValue>,
        wait_type: WaitType,
        timeout: Option<Duration>,
    },
    SignalAndWait {
        signal: HandleValue,
        wait: HandleValue,
        timeout: Option<Duration>,
    },
    CloseHandle {
        handle: HandleValue,
    },
}

/// Successful reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Handle {
        handle: HandleValue,
        disposition: Disposition,
    },
    /// Handle from an open by name
    Opened(HandleValue),
    /// Previous count of a mutex or semaphore
    PrevCount(u32),
    /// Previous state of an event
    PrevState(bool),
    Mutex(MutexInfo),
    Event(EventInfo),
    Semaphore(SemaphoreInfo),
    Wait(WaitOutcome),
    Done,
}

impl Reply {
    /// Status code reported with this reply
    pub fn status(&self) -> Status {
        match self {
            Self::Handle { disposition, .. } => disposition.to_status(),
            Self::Wait(WaitOutcome::Completed(status)) => status.to_status(),
            Self::Wait(WaitOutcome::Pending) => status::STATUS_PENDING,
            _ => status::STATUS_SUCCESS,
        }
    }
}

fn handle_reply((handle, disposition): (HandleValue, Disposition)) -> Reply {
    Reply::Handle { handle, disposition }
}

impl Server {
    /// Execute `request` on behalf of `thread`
    pub fn dispatch(&self, thread: &Arc<Thread>, request: Request) -> Result<Reply> {
        let attrs = ObjectAttributes::from_bits_truncate;
        match request {
            Request::CreateMutex { name, access, attributes, owned } => self
                .create_mutex(thread, name.as_deref(), Rights::from_raw(access), attrs(attributes), owned)
                .map(handle_reply),
            Request::OpenMutex { name, access, attributes } => self
                .open_mutex(thread, &name, Rights::from_raw(access), attrs(attributes))
                .map(Reply::Opened),
            Request::ReleaseMutex { handle } => self.release_mutex(thread, handle).map(Reply::PrevCount),
            Request::QueryMutex { handle } => self.query_mutex(thread, handle).map(Reply::Mutex),
            Request::CreateEvent { name, access, attributes, manual_reset, initial_state } => self
                .create_event(
                    thread,
                    name.as_deref(),
                    Rights::from_raw(access),
                    attrs(attributes),
                    manual_reset,
                    initial_state,
                )
                .map(handle_reply),
            Request::OpenEvent { name, access, attributes } => self
                .open_event(thread, &name, Rights::from_raw(access), attrs(attributes))
                .map(Reply::Opened),
            Request::EventOp { handle, op } => self.event_op(thread, handle, op).map(Reply::PrevState),
            Request::QueryEvent { handle } => self.query_event(thread, handle).map(Reply::Event),
            Request::CreateSemaphore { name, access, attributes, initial, max } => self
                .create_semaphore(thread, name.as_deref(), Rights::from_raw(access), attrs(attributes), initial, max)
                .map(handle_reply),
            Request::OpenSemaphore { name, access, attributes } => self
                .open_semaphore(thread, &name, Rights::from_raw(access), attrs(attributes))
                .map(Reply::Opened),
            Request::ReleaseSemaphore { handle, count } => {
                self.release_semaphore(thread, handle, count).map(Reply::PrevCount)
            }
            Request::QuerySemaphore { handle } => self.query_semaphore(thread, handle).map(Reply::Semaphore),
            Request::Select { handles, wait_type, timeout } => {
                self.select(thread, &handles, wait_type, timeout).map(Reply::Wait)
            }
            Request::SignalAndWait { signal, wait, timeout } => {
                self.signal_and_wait(thread, signal, wait, timeout).map(Reply::Wait)
            }
            Request::CloseHandle { handle } => self.close_handle(thread, handle).map(|()| Reply::Done),
        }
    }

    /// Execute `request` and reduce the result to a status code
    pub fn dispatch_status(&self, thread: &Arc<Thread>, request: Request) -> (Status, Option<Reply>) {
        match self.dispatch(thread, request) {
            Ok(reply) => (reply.status(), Some(reply)),
            Err(err) => {
                log_debug!("request from thread {:#x} failed: {}", thread.tid(), err);
                (err.to_status(), None)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
