// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Event Objects
//!
//! Events are simple synchronization primitives that can be signaled
//! and waited upon. They support both auto-reset and manual-reset modes.
//!
//! # Design
//!
//! - **Simple signaling**: Binary state (signaled/not signaled)
//! - **Auto-reset**: A satisfied wait clears the event, so one set releases
//!   one waiter
//! - **Manual-reset**: Remains signaled until explicitly cleared
//! - **Pulse**: Set, wake whoever can be woken, then reset
//!
//! # Usage
//!
//! ```rust,ignore
//! let event = Event::create(&ctx, None, true, false)?;
//! event.set()?;
//! event.reset()?;
//! ```

use crate::kernel::dev::inproc::{create_inproc_event, reset_inproc_event, set_inproc_event, InprocKind, InprocSync};
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

/// ============================================================================
/// Event Operations
/// ============================================================================

/// State change requested on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    Set,
    Reset,
    Pulse,
}

/// Snapshot returned by a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventInfo {
    pub manual_reset: bool,
    pub signaled: bool,
}

#[derive(Debug)]
struct EventState {
    manual_reset: bool,
    signaled: bool,
}

enum EventRepr {
    Broker(spin::Mutex<EventState>),
    Inproc { sync: Arc<InprocSync>, manual_reset: bool },
}

/// ============================================================================
/// Event
/// ============================================================================

/// Event object
pub struct Event {
    id: ObjectId,
    name: Option<String>,
    wait_queue: WaitQueue,
    repr: EventRepr,
}

impl Event {
    /// Create an event
    pub fn create(ctx: &ObjectContext, name: Option<String>, manual_reset: bool, initial_state: bool) -> Result<Arc<Self>> {
        let repr = match ctx.mode() {
            SyncMode::Broker => EventRepr::Broker(spin::Mutex::new(EventState {
                manual_reset,
                signaled: initial_state,
            })),
            SyncMode::Inproc => {
                let kind = if manual_reset {
                    InprocKind::ManualEvent
                } else {
                    InprocKind::AutoEvent
                };
                EventRepr::Inproc {
                    sync: create_inproc_event(ctx.device(), kind, initial_state)?,
                    manual_reset,
                }
            }
        };

        let event = Arc::new(Self {
            id: alloc_object_id(),
            name,
            wait_queue: WaitQueue::new(),
            repr,
        });
        log_trace!("event {:#x} created (manual={})", event.id, manual_reset);
        Ok(event)
    }

    /// Namespace name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Check if the event is manual-reset
    pub fn is_manual_reset(&self) -> bool {
        match &self.repr {
            EventRepr::Broker(state) => state.lock().manual_reset,
            EventRepr::Inproc { manual_reset, .. } => *manual_reset,
        }
    }

    /// Apply `op`, returning the previous signaled state
    pub fn apply(&self, op: EventOp) -> Result<bool> {
        match op {
            EventOp::Set => self.set(),
            EventOp::Reset => self.reset(),
            EventOp::Pulse => self.pulse(),
        }
    }

    /// Signal the event and wake waiters
    ///
    /// A manual-reset event wakes every waiter that can proceed, an
    /// auto-reset event at most one.
    pub fn set(&self) -> Result<bool> {
        match &self.repr {
            EventRepr::Broker(state) => {
                let (prev, manual) = {
                    let mut st = state.lock();
                    (core::mem::replace(&mut st.signaled, true), st.manual_reset)
                };
                wake_up(self, if manual { 0 } else { 1 });
                Ok(prev)
            }
            EventRepr::Inproc { sync, .. } => set_inproc_event(Some(sync)),
        }
    }

    /// Clear the event
    pub fn reset(&self) -> Result<bool> {
        match &self.repr {
            EventRepr::Broker(state) => Ok(core::mem::replace(&mut state.lock().signaled, false)),
            EventRepr::Inproc { sync, .. } => reset_inproc_event(Some(sync)),
        }
    }

    /// Set, wake eligible waiters, then reset
    pub fn pulse(&self) -> Result<bool> {
        match &self.repr {
            EventRepr::Broker(_) => {
                let prev = self.set()?;
                self.reset()?;
                Ok(prev)
            }
            EventRepr::Inproc { sync, .. } => sync.event_pulse(),
        }
    }

    /// Read the current state
    pub fn query(&self) -> Result<EventInfo> {
        match &self.repr {
            EventRepr::Broker(state) => {
                let st = state.lock();
                Ok(EventInfo {
                    manual_reset: st.manual_reset,
                    signaled: st.signaled,
                })
            }
            EventRepr::Inproc { sync, .. } => {
                let read = sync.event_read()?;
                Ok(EventInfo {
                    manual_reset: read.manual,
                    signaled: read.signaled,
                })
            }
        }
    }

    /// Device object, on the inproc path
    pub fn inproc_sync(&self) -> Option<Arc<InprocSync>> {
        match &self.repr {
            EventRepr::Inproc { sync, .. } => Some(Arc::clone(sync)),
            EventRepr::Broker(_) => None,
        }
    }
}

impl WaitObject for Event {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn object_type(&self) -> ObjectType {
        ObjectType::Event
    }

    fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }

    fn dump(&self, f: &mut dyn core::fmt::Write) -> core::fmt::Result {
        match &self.repr {
            EventRepr::Broker(state) => {
                let st = state.lock();
                write!(
                    f,
                    "Event {:#x} {} signaled={}",
                    self.id,
                    if st.manual_reset { "manual" } else { "auto" },
                    st.signaled
                )
            }
            EventRepr::Inproc { .. } => write!(f, "Event {:#x} inproc", self.id),
        }
    }

    fn signaled(&self, _candidate: &Arc<Thread>) -> bool {
        match &self.repr {
            EventRepr::Broker(state) => state.lock().signaled,
            EventRepr::Inproc { .. } => false,
        }
    }

    fn satisfied(&self, _candidate: &Arc<Thread>) -> bool {
        if let EventRepr::Broker(state) = &self.repr {
            let mut st = state.lock();
            if !st.manual_reset {
                st.signaled = false;
            }
        }
        false
    }

    fn signal(&self, _thread: &Arc<Thread>, access: Rights) -> Result {
        access.require(Rights::EVENT_MODIFY_STATE)?;
        self.set().map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================
