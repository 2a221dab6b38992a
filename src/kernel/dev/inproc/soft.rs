// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Soft Synchronization Device
//!
//! In-process implementation of the device contract. Object state lives in
//! one table guarded by a host mutex; blocked waiters park on a condition
//! variable.
//!
//! Every state change runs the pending waiters in FIFO order and satisfies
//! those that can proceed while the table is still locked, the way a kernel
//! driver does. A waiter therefore owns its acquisition before it even
//! wakes up, which keeps pulse and fairness exact.

use super::{EventArgs, MutexArgs, MutexRead, SemArgs, SyncDevice, SyncPrimitive, WaitArgs};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, MutexGuard, PoisonError};
use std::time::Instant;

/// Open a private soft device
pub fn open() -> Result<Arc<dyn SyncDevice>> {
    Ok(Arc::new(SoftDevice::new()))
}

/// ============================================================================
/// Object Table
/// ============================================================================

#[derive(Debug, Clone, Copy)]
enum SoftObject {
    Semaphore { count: u32, max: u32 },
    Mutex { owner: ThreadId, count: u32, abandoned: bool },
    Event { manual: bool, signaled: bool },
}

struct PendingWait {
    id: u64,
    objs: Vec<u64>,
    wait_type: WaitType,
    owner: ThreadId,
    alert: Option<u64>,
    outcome: Option<WaitStatus>,
}

#[derive(Default)]
struct SoftTable {
    objects: BTreeMap<u64, SoftObject>,
    waiters: Vec<PendingWait>,
    next_id: u64,
}

impl SoftTable {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_signaled(&self, id: u64, owner: ThreadId) -> bool {
        match self.objects.get(&id) {
            Some(SoftObject::Semaphore { count, .. }) => *count > 0,
            Some(SoftObject::Mutex { owner: o, count, .. }) => {
                *o == TID_INVALID || (*o == owner && *count < u32::MAX)
            }
            Some(SoftObject::Event { signaled, .. }) => *signaled,
            None => false,
        }
    }

    /// Acquire one object; returns true if it was abandoned
    fn consume(&mut self, id: u64, owner: ThreadId) -> bool {
        match self.objects.get_mut(&id) {
            Some(SoftObject::Semaphore { count, .. }) => {
                *count -= 1;
                false
            }
            Some(SoftObject::Mutex { owner: o, count, abandoned }) => {
                *o = owner;
                *count += 1;
                core::mem::replace(abandoned, false)
            }
            Some(SoftObject::Event { manual, signaled }) => {
                if !*manual {
                    *signaled = false;
                }
                false
            }
            None => false,
        }
    }

    /// Satisfy a wait from its objects, or else from its alert
    fn try_satisfy(
        &mut self,
        objs: &[u64],
        wait_type: WaitType,
        owner: ThreadId,
        alert: Option<u64>,
    ) -> Option<WaitStatus> {
        if let Some(status) = self.try_acquire(objs, wait_type, owner) {
            return Some(status);
        }
        let alert = alert.filter(|&id| self.is_signaled(id, owner))?;
        self.consume(alert, owner);
        Some(WaitStatus::Cancelled)
    }

    fn try_acquire(&mut self, objs: &[u64], wait_type: WaitType, owner: ThreadId) -> Option<WaitStatus> {
        match wait_type {
            WaitType::Any => {
                let index = objs.iter().position(|&id| self.is_signaled(id, owner))?;
                if self.consume(objs[index], owner) {
                    Some(WaitStatus::Abandoned(index))
                } else {
                    Some(WaitStatus::Signaled(index))
                }
            }
            WaitType::All => {
                if !objs.iter().all(|&id| self.is_signaled(id, owner)) {
                    return None;
                }
                let mut abandoned = false;
                for &id in objs {
                    abandoned |= self.consume(id, owner);
                }
                if abandoned {
                    Some(WaitStatus::Abandoned(0))
                } else {
                    Some(WaitStatus::Signaled(0))
                }
            }
        }
    }

    /// Satisfy pending waiters in arrival order
    fn wake_waiters(&mut self) -> bool {
        let mut waiters = core::mem::take(&mut self.waiters);
        let mut woken = false;
        for waiter in waiters.iter_mut().filter(|w| w.outcome.is_none()) {
            if let Some(status) = self.try_satisfy(&waiter.objs, waiter.wait_type, waiter.owner, waiter.alert) {
                waiter.outcome = Some(status);
                woken = true;
            }
        }
        self.waiters = waiters;
        woken
    }

    fn take_outcome(&mut self, id: u64) -> Option<WaitStatus> {
        let pos = self.waiters.iter().position(|w| w.id == id && w.outcome.is_some())?;
        self.waiters.remove(pos).outcome
    }

    fn cancel(&mut self, id: u64) {
        self.waiters.retain(|w| w.id != id);
    }
}

struct SoftCore {
    table: std::sync::Mutex<SoftTable>,
    cond: Condvar,
}

impl SoftCore {
    fn lock(&self) -> MutexGuard<'_, SoftTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to object `id`, then hand freshly signaled state to waiters
    fn update<T>(&self, id: u64, f: impl FnOnce(&mut SoftObject) -> Result<T>) -> Result<T> {
        let mut table = self.lock();
        let object = table.objects.get_mut(&id).ok_or(Error::InvalidHandle)?;
        let result = f(object)?;
        if table.wake_waiters() {
            self.cond.notify_all();
        }
        Ok(result)
    }

    fn read(&self, id: u64) -> Result<SoftObject> {
        self.lock().objects.get(&id).copied().ok_or(Error::InvalidHandle)
    }
}

/// ============================================================================
/// Device
/// ============================================================================

/// In-process synchronization device
pub struct SoftDevice {
    core: Arc<SoftCore>,
}

impl SoftDevice {
    /// Create a device with an empty object table
    pub fn new() -> Self {
        Self {
            core: Arc::new(SoftCore {
                table: std::sync::Mutex::new(SoftTable::default()),
                cond: Condvar::new(),
            }),
        }
    }

    fn insert(&self, object: SoftObject) -> Box<dyn SyncPrimitive> {
        let mut table = self.core.lock();
        let id = table.alloc_id();
        table.objects.insert(id, object);
        Box::new(SoftPrimitive {
            id,
            core: Arc::clone(&self.core),
        })
    }

    fn object_id(&self, obj: &dyn SyncPrimitive) -> Result<u64> {
        match obj.as_any().downcast_ref::<SoftPrimitive>() {
            Some(prim) if Arc::ptr_eq(&prim.core, &self.core) => Ok(prim.id),
            _ => Err(Error::InvalidHandle),
        }
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncDevice for SoftDevice {
    fn name(&self) -> &'static str {
        "soft"
    }

    fn create_sem(&self, args: SemArgs) -> Result<Box<dyn SyncPrimitive>> {
        if args.count > args.max {
            return Err(Error::InvalidParameter);
        }
        Ok(self.insert(SoftObject::Semaphore {
            count: args.count,
            max: args.max,
        }))
    }

    fn create_mutex(&self, args: MutexArgs) -> Result<Box<dyn SyncPrimitive>> {
        // An owner without a count, or a count without an owner
        if (args.owner == TID_INVALID) != (args.count == 0) {
            return Err(Error::InvalidParameter);
        }
        Ok(self.insert(SoftObject::Mutex {
            owner: args.owner,
            count: args.count,
            abandoned: false,
        }))
    }

    fn create_event(&self, args: EventArgs) -> Result<Box<dyn SyncPrimitive>> {
        Ok(self.insert(SoftObject::Event {
            manual: args.manual,
            signaled: args.signaled,
        }))
    }

    fn wait(&self, objs: &[&dyn SyncPrimitive], args: &WaitArgs<'_>) -> Result<WaitStatus> {
        if objs.is_empty() || objs.len() > MAX_WAIT_OBJECTS || args.owner == TID_INVALID {
            return Err(Error::InvalidParameter);
        }
        let ids = objs
            .iter()
            .map(|obj| self.object_id(*obj))
            .collect::<Result<Vec<u64>>>()?;
        if args.wait_type == WaitType::All {
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != ids.len() {
                return Err(Error::InvalidParameter);
            }
        }
        let alert = args.alert.map(|alert| self.object_id(alert)).transpose()?;

        let deadline = args.timeout.and_then(|t| Instant::now().checked_add(t));
        let mut table = self.core.lock();
        if alert.is_some_and(|id| !matches!(table.objects.get(&id), Some(SoftObject::Event { .. }))) {
            return Err(Error::InvalidParameter);
        }
        if let Some(status) = table.try_satisfy(&ids, args.wait_type, args.owner, alert) {
            return Ok(status);
        }
        if args.timeout.is_some_and(|t| t.is_zero()) {
            return Ok(WaitStatus::TimedOut);
        }

        let id = table.alloc_id();
        table.waiters.push(PendingWait {
            id,
            objs: ids,
            wait_type: args.wait_type,
            owner: args.owner,
            alert,
            outcome: None,
        });

        loop {
            if let Some(status) = table.take_outcome(id) {
                return Ok(status);
            }
            table = match deadline {
                None => self.core.cond.wait(table).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        table.cancel(id);
                        return Ok(WaitStatus::TimedOut);
                    }
                    let (table, _) = self
                        .core
                        .cond
                        .wait_timeout(table, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    table
                }
            };
        }
    }
}

/// ============================================================================
/// Primitive
/// ============================================================================

struct SoftPrimitive {
    id: u64,
    core: Arc<SoftCore>,
}

impl SoftPrimitive {
    fn update_event(&self, f: impl FnOnce(&mut bool, bool)) -> Result<bool> {
        self.core.update(self.id, |object| match object {
            SoftObject::Event { manual, signaled } => {
                let prev = *signaled;
                f(signaled, *manual);
                Ok(prev)
            }
            _ => Err(Error::InvalidParameter),
        })
    }
}

impl SyncPrimitive for SoftPrimitive {
    fn sem_release(&self, release: u32) -> Result<u32> {
        self.core.update(self.id, |object| match object {
            SoftObject::Semaphore { count, max } => {
                let prev = *count;
                match prev.checked_add(release) {
                    Some(next) if next <= *max => {
                        *count = next;
                        Ok(prev)
                    }
                    _ => Err(Error::SemaphoreLimitExceeded),
                }
            }
            _ => Err(Error::InvalidParameter),
        })
    }

    fn sem_read(&self) -> Result<SemArgs> {
        match self.core.read(self.id)? {
            SoftObject::Semaphore { count, max } => Ok(SemArgs { count, max }),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn mutex_unlock(&self, owner: ThreadId) -> Result<u32> {
        if owner == TID_INVALID {
            return Err(Error::InvalidParameter);
        }
        self.core.update(self.id, |object| match object {
            SoftObject::Mutex { owner: o, count, .. } => {
                if *o != owner {
                    return Err(Error::MutantNotOwned);
                }
                let prev = *count;
                *count -= 1;
                if *count == 0 {
                    *o = TID_INVALID;
                }
                Ok(prev)
            }
            _ => Err(Error::InvalidParameter),
        })
    }

    fn mutex_kill(&self, owner: ThreadId) -> Result {
        if owner == TID_INVALID {
            return Err(Error::InvalidParameter);
        }
        self.core.update(self.id, |object| match object {
            SoftObject::Mutex { owner: o, count, abandoned } => {
                if *o != owner {
                    return Err(Error::MutantNotOwned);
                }
                *o = TID_INVALID;
                *count = 0;
                *abandoned = true;
                Ok(())
            }
            _ => Err(Error::InvalidParameter),
        })
    }

    fn mutex_read(&self) -> Result<MutexRead> {
        match self.core.read(self.id)? {
            SoftObject::Mutex { owner, count, abandoned } => Ok(MutexRead { owner, count, abandoned }),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn event_set(&self) -> Result<bool> {
        self.update_event(|signaled, _| *signaled = true)
    }

    fn event_reset(&self) -> Result<bool> {
        self.update_event(|signaled, _| *signaled = false)
    }

    fn event_pulse(&self) -> Result<bool> {
        let mut table = self.core.lock();
        let prev = match table.objects.get_mut(&self.id) {
            Some(SoftObject::Event { signaled, .. }) => core::mem::replace(signaled, true),
            Some(_) => return Err(Error::InvalidParameter),
            None => return Err(Error::InvalidHandle),
        };
        let woken = table.wake_waiters();
        if let Some(SoftObject::Event { signaled, .. }) = table.objects.get_mut(&self.id) {
            *signaled = false;
        }
        if woken {
            self.core.cond.notify_all();
        }
        Ok(prev)
    }

    fn event_read(&self) -> Result<EventArgs> {
        match self.core.read(self.id)? {
            SoftObject::Event { manual, signaled } => Ok(EventArgs { manual, signaled }),
            _ => Err(Error::InvalidParameter),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for SoftPrimitive {
    fn drop(&mut self) {
        self.core.lock().objects.remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
