// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Objects
//!
//! Mutexes, events and semaphores, reached from clients through per-process
//! handle tables with access rights, optionally named in a shared
//! namespace.
//!
//! # Design
//!
//! - **Dual representation**: each object is either broker-managed (state
//!   kept here, waits arbitrated by the wait engine) or inproc (state kept
//!   in the synchronization device), fixed at creation by the server mode
//! - **Reference counting**: an object lives while a handle, a namespace
//!   entry or a pending wait refers to it
//!
//! # Modules
//!
//! - [`handle`] - Handle and rights model
//! - [`namespace`] - Named object directory
//! - [`mutex`] - Mutex (mutant) objects
//! - [`event`] - Event objects
//! - [`semaphore`] - Semaphore objects

pub mod event;
pub mod handle;
pub mod mutex;
pub mod namespace;
pub mod semaphore;

// Re-exports
pub use event::{Event, EventInfo, EventOp};
pub use handle::{HandleEntry, HandleTable, ObjectAttributes, Rights};
pub use mutex::{Mutex, MutexInfo};
pub use namespace::Namespace;
pub use semaphore::{Semaphore, SemaphoreInfo};

use crate::kernel::dev::inproc::{DeviceSlot, InprocSync};
use crate::kernel::init::SyncMode;
use crate::kernel::sync::abandon::InprocMutexList;
use crate::kernel::sync::wait_queue::WaitObject;
use crate::rustux::types::*;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// ============================================================================
/// Object ID
/// ============================================================================

/// Next object ID counter
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a new object ID
pub(crate) fn alloc_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// ============================================================================
/// Object Context
/// ============================================================================

/// Everything an object needs at creation time
///
/// Cloning shares the device slot and the inproc mutex registry.
#[derive(Clone)]
pub struct ObjectContext {
    mode: SyncMode,
    device: Arc<DeviceSlot>,
    inproc_mutexes: Arc<InprocMutexList>,
}

impl ObjectContext {
    /// Create a context for `mode` backed by `device`
    pub fn new(mode: SyncMode, device: Arc<DeviceSlot>) -> Self {
        Self {
            mode,
            device,
            inproc_mutexes: Arc::new(InprocMutexList::new()),
        }
    }

    /// Synchronization mode new objects use
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// The device slot for inproc objects
    pub fn device(&self) -> &DeviceSlot {
        &self.device
    }

    /// Registry of live inproc mutexes
    pub fn inproc_mutexes(&self) -> &Arc<InprocMutexList> {
        &self.inproc_mutexes
    }

    #[cfg(test)]
    pub fn broker_for_tests() -> Self {
        Self::new(SyncMode::Broker, Arc::new(DeviceSlot::unavailable()))
    }

    #[cfg(test)]
    pub fn inproc_for_tests() -> Self {
        Self::new(SyncMode::Inproc, Arc::new(DeviceSlot::soft()))
    }
}

/// ============================================================================
/// Object References
/// ============================================================================

/// Strong reference to a synchronization object
#[derive(Clone)]
pub enum ObjectRef {
    Mutex(Arc<Mutex>),
    Event(Arc<Event>),
    Semaphore(Arc<Semaphore>),
}

impl ObjectRef {
    /// Object type
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Mutex(_) => ObjectType::Mutex,
            Self::Event(_) => ObjectType::Event,
            Self::Semaphore(_) => ObjectType::Semaphore,
        }
    }

    /// Object identifier
    pub fn id(&self) -> ObjectId {
        self.wait_object_ref().id()
    }

    /// Namespace name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Mutex(m) => m.name(),
            Self::Event(e) => e.name(),
            Self::Semaphore(s) => s.name(),
        }
    }

    fn wait_object_ref(&self) -> &dyn WaitObject {
        match self {
            Self::Mutex(m) => m.as_ref(),
            Self::Event(e) => e.as_ref(),
            Self::Semaphore(s) => s.as_ref(),
        }
    }

    /// The object as a waitable
    pub fn wait_object(&self) -> Arc<dyn WaitObject> {
        match self {
            Self::Mutex(m) => m.clone(),
            Self::Event(e) => e.clone(),
            Self::Semaphore(s) => s.clone(),
        }
    }

    /// Device object behind an inproc object
    pub fn inproc_sync(&self) -> Option<Arc<InprocSync>> {
        match self {
            Self::Mutex(m) => m.inproc_sync(),
            Self::Event(e) => e.inproc_sync(),
            Self::Semaphore(s) => s.inproc_sync(),
        }
    }

    /// Check if both refer to the same object
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id() == other.id()
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        match self {
            Self::Mutex(m) => WeakObjectRef::Mutex(Arc::downgrade(m)),
            Self::Event(e) => WeakObjectRef::Event(Arc::downgrade(e)),
            Self::Semaphore(s) => WeakObjectRef::Semaphore(Arc::downgrade(s)),
        }
    }
}

impl core::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.wait_object_ref().dump(f)
    }
}

impl core::fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ObjectRef({} {:#x})", self.object_type(), self.id())
    }
}

/// Weak reference to a synchronization object
#[derive(Clone)]
pub enum WeakObjectRef {
    Mutex(Weak<Mutex>),
    Event(Weak<Event>),
    Semaphore(Weak<Semaphore>),
}

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        match self {
            Self::Mutex(m) => m.upgrade().map(ObjectRef::Mutex),
            Self::Event(e) => e.upgrade().map(ObjectRef::Event),
            Self::Semaphore(s) => s.upgrade().map(ObjectRef::Semaphore),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ids_unique() {
        let a = alloc_object_id();
        let b = alloc_object_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_ref_accessors() {
        let ctx = ObjectContext::broker_for_tests();
        let event = ObjectRef::Event(Event::create(&ctx, Some("ev".into()), true, false).unwrap());
        let sem = ObjectRef::Semaphore(Semaphore::create(&ctx, None, 0, 3).unwrap());

        assert_eq!(event.object_type(), ObjectType::Event);
        assert_eq!(event.name(), Some("ev"));
        assert_eq!(sem.name(), None);
        assert!(event.inproc_sync().is_none());
        assert!(!event.ptr_eq(&sem));
        assert_eq!(event.wait_object().id(), event.id());

        let text = sem.to_string();
        assert!(text.starts_with("Semaphore"), "{}", text);
        assert!(text.contains("count=0"), "{}", text);
    }

    #[test]
    fn test_weak_ref_does_not_keep_alive() {
        let ctx = ObjectContext::broker_for_tests();
        let obj = ObjectRef::Mutex(Mutex::create(&ctx, None, None).unwrap());
        let weak = obj.downgrade();
        assert!(weak.upgrade().is_some());
        drop(obj);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_inproc_context_backs_objects_with_device() {
        let ctx = ObjectContext::inproc_for_tests();
        let obj = ObjectRef::Event(Event::create(&ctx, None, false, true).unwrap());
        assert!(obj.inproc_sync().is_some());
        assert!(ctx.device().is_open());
    }
}
