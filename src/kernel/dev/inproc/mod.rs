// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! In-Kernel Synchronization Device
//!
//! The accelerated path backs every synchronization object with a
//! primitive living in a kernel facility that natively implements
//! owner-tracked recursive mutexes, auto/manual-reset events and counting
//! semaphores. Waits and signals then go straight to the facility.
//!
//! # Design
//!
//! - **One device per process**: opened lazily through a [`DeviceSlot`],
//!   kept for the life of the process once the first open succeeds
//! - **Independent objects**: a created primitive does not keep the device
//!   alive; the device reference is held only while creating
//! - **Typed wrapper**: [`InprocSync`] records the object category and
//!   refuses operations that do not apply to it
//!
//! # Backends
//!
//! - [`ntsync`] - Linux `/dev/ntsync`
//! - [`soft`] - in-process implementation of the same contract

#[cfg(all(target_os = "linux", feature = "ntsync"))]
pub mod ntsync;
pub mod soft;

use crate::kernel::thread::{Thread, ThreadState};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::any::Any;
use core::time::Duration;
use std::sync::Arc;

// Import logging macros
use crate::{log_debug, log_info, log_trace, log_warn};

/// ============================================================================
/// Device Contract
/// ============================================================================

/// Semaphore creation / read arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemArgs {
    pub count: u32,
    pub max: u32,
}

/// Mutex creation / unlock arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexArgs {
    /// Owning thread, or `TID_INVALID`
    pub owner: ThreadId,
    pub count: u32,
}

/// Event creation / read arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventArgs {
    pub manual: bool,
    pub signaled: bool,
}

/// Mutex state as read back from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexRead {
    pub owner: ThreadId,
    pub count: u32,
    /// Previous owner terminated while holding it
    pub abandoned: bool,
}

/// Wait arguments
#[derive(Clone, Copy)]
pub struct WaitArgs<'a> {
    pub wait_type: WaitType,

    /// Thread performing the wait (owner key for mutexes)
    pub owner: ThreadId,

    /// Relative timeout, None waits forever
    pub timeout: Option<Duration>,

    /// Event that interrupts the wait with `Cancelled` when signaled.
    /// Checked only after the objects themselves.
    pub alert: Option<&'a dyn SyncPrimitive>,
}

/// Per-object handle on the device
///
/// Operations that do not apply to the primitive's shape fail with
/// `InvalidParameter`, like the kernel facility does.
pub trait SyncPrimitive: Send + Sync {
    fn sem_release(&self, count: u32) -> Result<u32>;
    fn sem_read(&self) -> Result<SemArgs>;

    /// Unlock once; returns the count before the unlock
    fn mutex_unlock(&self, owner: ThreadId) -> Result<u32>;

    /// Mark the mutex abandoned if `owner` holds it
    fn mutex_kill(&self, owner: ThreadId) -> Result;
    fn mutex_read(&self) -> Result<MutexRead>;

    /// Set / reset / pulse; each returns the previous signaled state
    fn event_set(&self) -> Result<bool>;
    fn event_reset(&self) -> Result<bool>;
    fn event_pulse(&self) -> Result<bool>;
    fn event_read(&self) -> Result<EventArgs>;

    fn as_any(&self) -> &dyn Any;
}

/// Control handle on the kernel synchronization facility
pub trait SyncDevice: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    fn create_sem(&self, args: SemArgs) -> Result<Box<dyn SyncPrimitive>>;
    fn create_mutex(&self, args: MutexArgs) -> Result<Box<dyn SyncPrimitive>>;
    fn create_event(&self, args: EventArgs) -> Result<Box<dyn SyncPrimitive>>;

    /// Block until the objects satisfy `args.wait_type`, the alert fires,
    /// or the timeout expires
    fn wait(&self, objs: &[&dyn SyncPrimitive], args: &WaitArgs<'_>) -> Result<WaitStatus>;
}

/// ============================================================================
/// Device Acquisition
/// ============================================================================

/// Opens a device
pub type DeviceOpener = fn() -> Result<Arc<dyn SyncDevice>>;

/// Lazily opened, permanent device reference
///
/// The first successful open is kept for the life of the slot; a failed
/// open is not remembered, so a later call tries again.
pub struct DeviceSlot {
    device: spin::Once<Arc<dyn SyncDevice>>,
    opener: DeviceOpener,
}

impl DeviceSlot {
    /// Create a slot that opens its device with `opener`
    pub const fn new(opener: DeviceOpener) -> Self {
        Self {
            device: spin::Once::new(),
            opener,
        }
    }

    /// Slot sharing the process-wide system device
    pub const fn system() -> Self {
        Self::new(system_device)
    }

    /// Slot with a private in-process device
    pub const fn soft() -> Self {
        Self::new(soft::open)
    }

    /// Slot whose device never opens
    pub fn unavailable() -> Self {
        Self::new(|| Err(Error::NotImplemented))
    }

    /// Take a counted reference on the device, opening it if needed
    pub fn grab(&self) -> Result<Arc<dyn SyncDevice>> {
        let device = self.device.try_call_once(|| {
            let device = (self.opener)()?;
            log_info!("opened inproc sync device ({})", device.name());
            Ok::<_, Error>(device)
        })?;
        Ok(Arc::clone(device))
    }

    /// Check if the device has been opened
    pub fn is_open(&self) -> bool {
        self.device.is_completed()
    }
}

/// The process-wide system device
static SYSTEM_DEVICE: DeviceSlot = DeviceSlot::new(open_system_device);

/// Grab the process-wide system device
pub fn system_device() -> Result<Arc<dyn SyncDevice>> {
    SYSTEM_DEVICE.grab()
}

#[cfg(all(target_os = "linux", feature = "ntsync"))]
fn open_system_device() -> Result<Arc<dyn SyncDevice>> {
    let device = ntsync::NtSyncDevice::open()?;
    Ok(Arc::new(device))
}

#[cfg(not(all(target_os = "linux", feature = "ntsync")))]
fn open_system_device() -> Result<Arc<dyn SyncDevice>> {
    Err(Error::NotImplemented)
}

/// ============================================================================
/// Typed Objects
/// ============================================================================

/// Object category requested by a front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InprocKind {
    /// Auto-reset event
    AutoEvent,

    /// Manual-reset event
    ManualEvent,

    /// Auto-reset signal for a generic server object
    AutoServer,

    /// Manual-reset signal for a generic server object
    ManualServer,

    /// Message queue signal (manual reset)
    Queue,

    /// Counting semaphore
    Semaphore,

    /// Owner-tracked recursive mutex
    Mutex,
}

impl InprocKind {
    /// Check if the category is backed by an event
    pub const fn is_event(self) -> bool {
        !matches!(self, Self::Semaphore | Self::Mutex)
    }

    /// Check if the category is backed by a manual-reset event
    pub const fn is_manual(self) -> bool {
        matches!(self, Self::ManualEvent | Self::ManualServer | Self::Queue)
    }
}

/// Initial state for a new device object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InprocInit {
    /// Event-shaped categories
    Signaled(bool),

    /// Semaphore
    Count { count: u32, max: u32 },

    /// Mutex
    Owner { owner: ThreadId, count: u32 },
}

/// Typed handle to a device object
pub struct InprocSync {
    kind: InprocKind,
    prim: Box<dyn SyncPrimitive>,
}

impl InprocSync {
    /// Object category
    pub fn kind(&self) -> InprocKind {
        self.kind
    }

    /// Raw device object
    pub fn primitive(&self) -> &dyn SyncPrimitive {
        self.prim.as_ref()
    }

    fn require_event(&self) -> Result {
        if self.kind.is_event() {
            Ok(())
        } else {
            Err(Error::ObjectTypeMismatch)
        }
    }

    fn require(&self, kind: InprocKind) -> Result {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::ObjectTypeMismatch)
        }
    }

    /// Signal an event-shaped object, returning the previous state
    pub fn event_set(&self) -> Result<bool> {
        self.require_event()?;
        self.prim.event_set()
    }

    /// Reset an event-shaped object, returning the previous state
    pub fn event_reset(&self) -> Result<bool> {
        self.require_event()?;
        self.prim.event_reset()
    }

    /// Pulse an event-shaped object, returning the previous state
    pub fn event_pulse(&self) -> Result<bool> {
        self.require_event()?;
        self.prim.event_pulse()
    }

    /// Read an event-shaped object
    pub fn event_read(&self) -> Result<EventArgs> {
        self.require_event()?;
        self.prim.event_read()
    }

    /// Release a semaphore, returning the previous count
    pub fn sem_release(&self, count: u32) -> Result<u32> {
        self.require(InprocKind::Semaphore)?;
        self.prim.sem_release(count)
    }

    /// Read a semaphore
    pub fn sem_read(&self) -> Result<SemArgs> {
        self.require(InprocKind::Semaphore)?;
        self.prim.sem_read()
    }

    /// Unlock a mutex on behalf of `owner`, returning the previous count
    pub fn mutex_unlock(&self, owner: ThreadId) -> Result<u32> {
        self.require(InprocKind::Mutex)?;
        self.prim.mutex_unlock(owner)
    }

    /// Read a mutex
    pub fn mutex_read(&self) -> Result<MutexRead> {
        self.require(InprocKind::Mutex)?;
        self.prim.mutex_read()
    }

    /// Abandon a mutex held by `owner`
    pub fn kill_owner(&self, owner: ThreadId) -> Result {
        self.require(InprocKind::Mutex)?;
        self.prim.mutex_kill(owner)
    }
}

impl core::fmt::Debug for InprocSync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InprocSync").field("kind", &self.kind).finish()
    }
}

/// Create a device object of category `kind`
///
/// The device reference taken here is dropped before returning, on success
/// and on failure alike.
pub fn create_inproc_sync(slot: &DeviceSlot, kind: InprocKind, init: InprocInit) -> Result<Arc<InprocSync>> {
    let device = slot.grab()?;

    let prim = match (kind, init) {
        (InprocKind::Semaphore, InprocInit::Count { count, max }) => {
            device.create_sem(SemArgs { count, max })?
        }
        (InprocKind::Mutex, InprocInit::Owner { owner, count }) => {
            device.create_mutex(MutexArgs { owner, count })?
        }
        (kind, InprocInit::Signaled(signaled)) if kind.is_event() => {
            device.create_event(EventArgs {
                manual: kind.is_manual(),
                signaled,
            })?
        }
        _ => return Err(Error::InvalidParameter),
    };

    log_trace!("created inproc {:?} on {}", kind, device.name());
    Ok(Arc::new(InprocSync { kind, prim }))
}

/// Create an event-shaped device object
pub fn create_inproc_event(slot: &DeviceSlot, kind: InprocKind, signaled: bool) -> Result<Arc<InprocSync>> {
    create_inproc_sync(slot, kind, InprocInit::Signaled(signaled))
}

/// Create a device semaphore
pub fn create_inproc_semaphore(slot: &DeviceSlot, count: u32, max: u32) -> Result<Arc<InprocSync>> {
    create_inproc_sync(slot, InprocKind::Semaphore, InprocInit::Count { count, max })
}

/// Create a device mutex
pub fn create_inproc_mutex(slot: &DeviceSlot, owner: ThreadId, count: u32) -> Result<Arc<InprocSync>> {
    create_inproc_sync(slot, InprocKind::Mutex, InprocInit::Owner { owner, count })
}

/// Set an event-shaped object; an absent object is a no-op
pub fn set_inproc_event(sync: Option<&InprocSync>) -> Result<bool> {
    match sync {
        Some(sync) => sync.event_set(),
        None => Ok(false),
    }
}

/// Reset an event-shaped object; an absent object is a no-op
pub fn reset_inproc_event(sync: Option<&InprocSync>) -> Result<bool> {
    match sync {
        Some(sync) => sync.event_reset(),
        None => Ok(false),
    }
}

/// Abandon a mutex on behalf of a terminating thread
///
/// # Returns
///
/// true if `owner` held the mutex; an absent object or one held by someone
/// else is not an error
pub fn abandon_inproc_mutex(owner: ThreadId, sync: Option<&InprocSync>) -> Result<bool> {
    let Some(sync) = sync else {
        return Ok(false);
    };
    match sync.kill_owner(owner) {
        Ok(()) => {
            log_debug!("abandoned inproc mutex held by thread {:#x}", owner);
            Ok(true)
        }
        Err(Error::MutantNotOwned) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Create the alert event that interrupts `thread`'s device waits
pub fn create_inproc_alert(slot: &DeviceSlot) -> Result<Arc<InprocSync>> {
    create_inproc_event(slot, InprocKind::AutoEvent, false)
}

/// Give back what a wait acquired for a thread that terminated meanwhile
///
/// Mutexes are abandoned; semaphore counts and auto-reset events are
/// restored.
fn surrender_inproc(syncs: &[Arc<InprocSync>], status: WaitStatus, wait_type: WaitType, owner: ThreadId) {
    let acquired = match (status, wait_type) {
        (WaitStatus::Signaled(i) | WaitStatus::Abandoned(i), WaitType::Any) => syncs.get(i..=i).unwrap_or(&[]),
        (WaitStatus::Signaled(_) | WaitStatus::Abandoned(_), WaitType::All) => syncs,
        _ => &[],
    };
    for sync in acquired {
        let result = match sync.kind {
            InprocKind::Mutex => abandon_inproc_mutex(owner, Some(sync)).map(drop),
            InprocKind::Semaphore => sync.sem_release(1).map(drop),
            kind if kind.is_manual() => Ok(()),
            _ => sync.event_set().map(drop),
        };
        if let Err(err) = result {
            log_warn!("thread {:#x} could not give back {:?}: {}", owner, sync.kind, err);
        }
    }
}

/// Wait on device objects on behalf of `thread`
///
/// Blocks the calling thread inside the device. The thread's alert, if it
/// has one, interrupts the wait.
///
/// # Errors
///
/// `ThreadIsTerminating` if the thread terminated while it was blocked;
/// anything the wait acquired has been given back.
pub fn wait_inproc(
    slot: &DeviceSlot,
    syncs: &[Arc<InprocSync>],
    wait_type: WaitType,
    thread: &Thread,
    timeout: Option<Duration>,
) -> Result<WaitStatus> {
    if syncs.is_empty() || syncs.len() > MAX_WAIT_OBJECTS {
        return Err(Error::InvalidParameter);
    }

    // A re-entry past the maximum recursion is refused, not blocked on
    for sync in syncs.iter().filter(|s| s.kind == InprocKind::Mutex) {
        let state = sync.mutex_read()?;
        if state.owner == thread.tid() && state.count == u32::MAX {
            log_warn!("mutex recursion limit reached by thread {:#x}", thread.tid());
            return Err(Error::MutantLimitExceeded);
        }
    }

    let device = slot.grab()?;
    let objs: Vec<&dyn SyncPrimitive> = syncs.iter().map(|s| s.primitive()).collect();
    let args = WaitArgs {
        wait_type,
        owner: thread.tid(),
        timeout,
        alert: thread.alert().map(|alert| alert.primitive()),
    };

    thread.set_state(ThreadState::Waiting);
    let status = device.wait(&objs, &args);
    thread.set_state(ThreadState::Running);
    let status = status?;

    // Termination may race with a wait the device satisfied anyway
    if thread.is_terminated() {
        surrender_inproc(syncs, status, wait_type, thread.tid());
        log_debug!("thread {:#x} terminated during wait ({:?})", thread.tid(), status);
        return Err(Error::ThreadIsTerminating);
    }
    Ok(status)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::fixture::Fixture;

    fn failing_open() -> Result<Arc<dyn SyncDevice>> {
        Err(Error::InsufficientResources)
    }

    #[test]
    fn test_kind_shapes() {
        assert!(InprocKind::AutoEvent.is_event());
        assert!(InprocKind::Queue.is_event());
        assert!(!InprocKind::Mutex.is_event());
        assert!(InprocKind::Queue.is_manual());
        assert!(InprocKind::ManualServer.is_manual());
        assert!(!InprocKind::AutoServer.is_manual());
    }

    #[test]
    fn test_slot_opens_once() {
        let slot = DeviceSlot::soft();
        assert!(!slot.is_open());
        let a = slot.grab().unwrap();
        let b = slot.grab().unwrap();
        assert!(slot.is_open());
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_slot_open_failure_is_not_cached() {
        let slot = DeviceSlot::new(failing_open);
        assert_eq!(slot.grab().err(), Some(Error::InsufficientResources));
        assert!(!slot.is_open());
        assert_eq!(
            create_inproc_mutex(&slot, TID_INVALID, 0).err(),
            Some(Error::InsufficientResources)
        );
    }

    #[test]
    fn test_unavailable_device_reports_not_implemented() {
        let slot = DeviceSlot::unavailable();
        assert_eq!(
            create_inproc_event(&slot, InprocKind::ManualEvent, false).err(),
            Some(Error::NotImplemented)
        );
    }

    #[test]
    fn test_device_released_after_creation() {
        let slot = DeviceSlot::soft();
        let sync = create_inproc_semaphore(&slot, 1, 2).unwrap();
        let device = slot.grab().unwrap();
        // slot + this reference only
        assert_eq!(Arc::strong_count(&device), 2);
        assert_eq!(sync.sem_read().unwrap(), SemArgs { count: 1, max: 2 });
    }

    #[test]
    fn test_create_rejects_mismatched_init() {
        let slot = DeviceSlot::soft();
        assert_eq!(
            create_inproc_sync(&slot, InprocKind::Mutex, InprocInit::Signaled(true)).err(),
            Some(Error::InvalidParameter)
        );
        assert_eq!(
            create_inproc_sync(&slot, InprocKind::AutoEvent, InprocInit::Count { count: 0, max: 1 }).err(),
            Some(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_typed_operations() {
        let slot = DeviceSlot::soft();
        let event = create_inproc_event(&slot, InprocKind::Queue, false).unwrap();
        let mutex = create_inproc_mutex(&slot, 7, 1).unwrap();

        assert_eq!(set_inproc_event(Some(&event)), Ok(false));
        assert_eq!(event.event_read().unwrap(), EventArgs { manual: true, signaled: true });
        assert_eq!(reset_inproc_event(Some(&event)), Ok(true));

        assert_eq!(mutex.event_set().err(), Some(Error::ObjectTypeMismatch));
        assert_eq!(event.kill_owner(7).err(), Some(Error::ObjectTypeMismatch));
    }

    #[test]
    fn test_absent_objects_are_noops() {
        assert_eq!(set_inproc_event(None), Ok(false));
        assert_eq!(reset_inproc_event(None), Ok(false));
        assert_eq!(abandon_inproc_mutex(5, None), Ok(false));
    }

    #[test]
    fn test_abandon_only_hits_the_owner() {
        let slot = DeviceSlot::soft();
        let mutex = create_inproc_mutex(&slot, 7, 2).unwrap();

        assert_eq!(abandon_inproc_mutex(8, Some(&mutex)), Ok(false));
        assert_eq!(mutex.mutex_read().unwrap().count, 2);

        assert_eq!(abandon_inproc_mutex(7, Some(&mutex)), Ok(true));
        let state = mutex.mutex_read().unwrap();
        assert_eq!(state, MutexRead { owner: 0, count: 0, abandoned: true });
    }

    #[test]
    fn test_terminated_waiter_gives_back_acquisitions() {
        let fx = Fixture::inproc();
        let t = fx.thread();
        let ctx = fx.ctx();
        let slot = ctx.device();
        let mutex = create_inproc_mutex(slot, TID_INVALID, 0).unwrap();
        let sem = create_inproc_semaphore(slot, 1, 1).unwrap();
        let event = create_inproc_event(slot, InprocKind::AutoEvent, true).unwrap();

        fx.server.terminate_thread(t.tid()).unwrap();
        let syncs = [Arc::clone(&mutex), Arc::clone(&sem), Arc::clone(&event)];
        assert_eq!(
            wait_inproc(slot, &syncs, WaitType::All, &t, Some(Duration::ZERO)),
            Err(Error::ThreadIsTerminating)
        );

        assert_eq!(mutex.mutex_read().unwrap(), MutexRead { owner: 0, count: 0, abandoned: true });
        assert_eq!(sem.sem_read().unwrap().count, 1);
        assert!(event.event_read().unwrap().signaled);
    }

    #[test]
    fn test_alert_interrupts_wait() {
        let fx = Fixture::inproc();
        let t = fx.thread();
        let ctx = fx.ctx();
        let event = create_inproc_event(ctx.device(), InprocKind::ManualEvent, false).unwrap();
        let syncs = [Arc::clone(&event)];

        assert!(t.alert().is_some());
        assert_eq!(t.alert().unwrap().event_set(), Ok(false));
        assert_eq!(
            wait_inproc(ctx.device(), &syncs, WaitType::Any, &t, None),
            Ok(WaitStatus::Cancelled)
        );
        // Consumed by the interrupted wait
        assert_eq!(
            wait_inproc(ctx.device(), &syncs, WaitType::Any, &t, Some(Duration::ZERO)),
            Ok(WaitStatus::TimedOut)
        );
    }
}
