// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Handle & Rights Model
//!
//! Every client reference to a synchronization object goes through a handle
//! in the client process's handle table. A handle carries the access mask
//! granted when it was opened, and every request validates that mask before
//! touching the object.
//!
//! # Design
//!
//! - **Handles**: per-process values (multiples of 4) referencing objects
//! - **Rights**: NT access masks, generic rights mapped per object type
//! - **Enforcement**: typed lookups check both object type and access
//! - **Reference counting**: a handle holds one strong object reference
//!
//! # Usage
//!
//! ```rust,ignore
//! let access = Rights::GENERIC_READ.map(ObjectType::Mutex);
//! let handle = table.alloc(ObjectRef::Mutex(mutex), access, ObjectAttributes::empty())?;
//! let mutex = table.get_mutex(handle, Rights::MUTANT_QUERY_STATE)?;
//! ```

use crate::kernel::object::ObjectRef;
use crate::kernel::object::{Event, Mutex, Semaphore};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// ============================================================================
/// Handle Rights
/// ============================================================================

bitflags::bitflags! {
    /// Access mask
    ///
    /// The low 16 bits are object specific; mutexes, events and semaphores
    /// share the QUERY_STATE / MODIFY_STATE layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        /// Query object state (MUTANT/EVENT/SEMAPHORE_QUERY_STATE)
        const QUERY_STATE = 0x0000_0001;

        /// Modify object state (EVENT/SEMAPHORE_MODIFY_STATE)
        const MODIFY_STATE = 0x0000_0002;

        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const WRITE_DAC = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;

        /// Wait on the object
        const SYNCHRONIZE = 0x0010_0000;

        const MAXIMUM_ALLOWED = 0x0200_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_EXECUTE = 0x2000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;

        const STANDARD_RIGHTS_REQUIRED = Self::DELETE.bits()
            | Self::READ_CONTROL.bits()
            | Self::WRITE_DAC.bits()
            | Self::WRITE_OWNER.bits();
    }
}

impl Rights {
    pub const MUTANT_QUERY_STATE: Self = Self::QUERY_STATE;
    pub const EVENT_QUERY_STATE: Self = Self::QUERY_STATE;
    pub const EVENT_MODIFY_STATE: Self = Self::MODIFY_STATE;
    pub const SEMAPHORE_QUERY_STATE: Self = Self::QUERY_STATE;
    pub const SEMAPHORE_MODIFY_STATE: Self = Self::MODIFY_STATE;

    pub const STANDARD_RIGHTS_READ: Self = Self::READ_CONTROL;
    pub const STANDARD_RIGHTS_WRITE: Self = Self::READ_CONTROL;
    pub const STANDARD_RIGHTS_EXECUTE: Self = Self::READ_CONTROL;

    pub const MUTANT_ALL_ACCESS: Self = Self::STANDARD_RIGHTS_REQUIRED
        .union(Self::SYNCHRONIZE)
        .union(Self::QUERY_STATE);
    pub const EVENT_ALL_ACCESS: Self = Self::STANDARD_RIGHTS_REQUIRED
        .union(Self::SYNCHRONIZE)
        .union(Self::QUERY_STATE)
        .union(Self::MODIFY_STATE);
    pub const SEMAPHORE_ALL_ACCESS: Self = Self::EVENT_ALL_ACCESS;

    const GENERIC_MASK: Self = Self::GENERIC_ALL
        .union(Self::GENERIC_EXECUTE)
        .union(Self::GENERIC_WRITE)
        .union(Self::GENERIC_READ)
        .union(Self::MAXIMUM_ALLOWED);

    /// Create a rights mask from a raw client value, dropping unknown bits
    pub const fn from_raw(raw: u32) -> Self {
        Self::from_bits_truncate(raw)
    }

    /// Get the full access mask for an object type
    pub const fn all_for_type(obj_type: ObjectType) -> Self {
        match obj_type {
            ObjectType::Mutex => Self::MUTANT_ALL_ACCESS,
            ObjectType::Event => Self::EVENT_ALL_ACCESS,
            ObjectType::Semaphore => Self::SEMAPHORE_ALL_ACCESS,
        }
    }

    /// Map generic rights onto the object-specific rights of `obj_type`
    pub fn map(self, obj_type: ObjectType) -> Self {
        let (read, write, execute) = match obj_type {
            ObjectType::Mutex => (
                Self::STANDARD_RIGHTS_READ | Self::MUTANT_QUERY_STATE,
                Self::STANDARD_RIGHTS_WRITE,
                Self::STANDARD_RIGHTS_EXECUTE | Self::SYNCHRONIZE,
            ),
            ObjectType::Event => (
                Self::STANDARD_RIGHTS_READ | Self::EVENT_QUERY_STATE,
                Self::STANDARD_RIGHTS_WRITE | Self::EVENT_MODIFY_STATE,
                Self::STANDARD_RIGHTS_EXECUTE | Self::SYNCHRONIZE,
            ),
            ObjectType::Semaphore => (
                Self::STANDARD_RIGHTS_READ | Self::SEMAPHORE_QUERY_STATE,
                Self::STANDARD_RIGHTS_WRITE | Self::SEMAPHORE_MODIFY_STATE,
                Self::STANDARD_RIGHTS_EXECUTE | Self::SYNCHRONIZE,
            ),
        };

        let mut mapped = self.difference(Self::GENERIC_MASK);
        if self.intersects(Self::GENERIC_READ) {
            mapped |= read;
        }
        if self.intersects(Self::GENERIC_WRITE) {
            mapped |= write;
        }
        if self.intersects(Self::GENERIC_EXECUTE) {
            mapped |= execute;
        }
        if self.intersects(Self::GENERIC_ALL | Self::MAXIMUM_ALLOWED) {
            mapped |= Self::all_for_type(obj_type);
        }
        mapped
    }

    /// Require specific rights
    ///
    /// # Returns
    ///
    /// - Ok(()) if all rights are present
    /// - Err(Error::AccessDenied) if any right is missing
    pub fn require(self, required: Self) -> Result {
        if self.contains(required) {
            Ok(())
        } else {
            Err(Error::AccessDenied)
        }
    }
}

bitflags::bitflags! {
    /// Object attributes passed with create and open requests
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectAttributes: u32 {
        /// Handle is inherited by child processes
        const INHERIT = 0x0000_0002;

        /// Named object outlives its last handle
        const PERMANENT = 0x0000_0010;

        /// Name lookup ignores ASCII case
        const CASE_INSENSITIVE = 0x0000_0040;
    }
}

/// ============================================================================
/// Handle Table
/// ============================================================================

/// Maximum handles per process
pub const MAX_HANDLES: usize = 16384;

/// Handle table entry
#[derive(Clone)]
pub struct HandleEntry {
    /// Referenced object
    pub object: ObjectRef,

    /// Granted access
    pub access: Rights,

    /// Inherit flag from the open attributes
    pub inherit: bool,
}

struct HandleSlots {
    entries: BTreeMap<HandleValue, HandleEntry>,
}

/// Handle table
///
/// Manages handles for a process.
pub struct HandleTable {
    slots: spin::Mutex<HandleSlots>,
}

impl HandleTable {
    /// Create a new handle table
    pub const fn new() -> Self {
        Self {
            slots: spin::Mutex::new(HandleSlots {
                entries: BTreeMap::new(),
            }),
        }
    }

    /// Add a handle to the table
    ///
    /// # Returns
    ///
    /// Handle value for the client
    pub fn alloc(&self, object: ObjectRef, access: Rights, attributes: ObjectAttributes) -> Result<HandleValue> {
        let mut slots = self.slots.lock();
        if slots.entries.len() >= MAX_HANDLES {
            return Err(Error::InsufficientResources);
        }

        // Values are multiples of 4; reuse the lowest free one
        let mut value = 4;
        while slots.entries.contains_key(&value) {
            value += 4;
        }

        let entry = HandleEntry {
            object,
            access,
            inherit: attributes.contains(ObjectAttributes::INHERIT),
        };
        slots.entries.insert(value, entry);
        Ok(value)
    }

    /// Get a handle entry from the table
    pub fn get(&self, value: HandleValue) -> Result<HandleEntry> {
        self.slots
            .lock()
            .entries
            .get(&value)
            .cloned()
            .ok_or(Error::InvalidHandle)
    }

    /// Get the object behind a handle, checking the granted access
    pub fn get_checked(&self, value: HandleValue, required: Rights) -> Result<ObjectRef> {
        let entry = self.get(value)?;
        entry.access.require(required)?;
        Ok(entry.object)
    }

    /// Typed lookup of a mutex
    pub fn get_mutex(&self, value: HandleValue, required: Rights) -> Result<Arc<Mutex>> {
        match self.get_typed(value, ObjectType::Mutex, required)? {
            ObjectRef::Mutex(mutex) => Ok(mutex),
            _ => Err(Error::ObjectTypeMismatch),
        }
    }

    /// Typed lookup of an event
    pub fn get_event(&self, value: HandleValue, required: Rights) -> Result<Arc<Event>> {
        match self.get_typed(value, ObjectType::Event, required)? {
            ObjectRef::Event(event) => Ok(event),
            _ => Err(Error::ObjectTypeMismatch),
        }
    }

    /// Typed lookup of a semaphore
    pub fn get_semaphore(&self, value: HandleValue, required: Rights) -> Result<Arc<Semaphore>> {
        match self.get_typed(value, ObjectType::Semaphore, required)? {
            ObjectRef::Semaphore(sem) => Ok(sem),
            _ => Err(Error::ObjectTypeMismatch),
        }
    }

    // Type is checked before access so a wrong-type handle reports a mismatch
    fn get_typed(&self, value: HandleValue, obj_type: ObjectType, required: Rights) -> Result<ObjectRef> {
        let entry = self.get(value)?;
        if entry.object.object_type() != obj_type {
            return Err(Error::ObjectTypeMismatch);
        }
        entry.access.require(required)?;
        Ok(entry.object)
    }

    /// Remove a handle from the table
    ///
    /// The object reference is returned so the caller controls where the
    /// last reference is dropped.
    pub fn close(&self, value: HandleValue) -> Result<ObjectRef> {
        self.slots
            .lock()
            .entries
            .remove(&value)
            .map(|entry| entry.object)
            .ok_or(Error::InvalidHandle)
    }

    /// Remove every handle, returning the released objects
    pub fn close_all(&self) -> Vec<ObjectRef> {
        let entries = core::mem::take(&mut self.slots.lock().entries);
        entries.into_values().map(|entry| entry.object).collect()
    }

    /// Get handle count
    pub fn count(&self) -> usize {
        self.slots.lock().entries.len()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Tests
/// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::ObjectContext;

    #[test]
    fn test_rights_require() {
        let r = Rights::QUERY_STATE | Rights::SYNCHRONIZE;
        assert_eq!(r.require(Rights::SYNCHRONIZE), Ok(()));
        assert_eq!(r.require(Rights::MODIFY_STATE), Err(Error::AccessDenied));
    }

    #[test]
    fn test_rights_generic_mapping() {
        let read = Rights::GENERIC_READ.map(ObjectType::Mutex);
        assert!(read.contains(Rights::MUTANT_QUERY_STATE));
        assert!(!read.contains(Rights::SYNCHRONIZE));

        let exec = Rights::GENERIC_EXECUTE.map(ObjectType::Event);
        assert!(exec.contains(Rights::SYNCHRONIZE));
        assert!(!exec.contains(Rights::EVENT_MODIFY_STATE));

        let write = Rights::GENERIC_WRITE.map(ObjectType::Semaphore);
        assert!(write.contains(Rights::SEMAPHORE_MODIFY_STATE));

        assert_eq!(Rights::MAXIMUM_ALLOWED.map(ObjectType::Mutex), Rights::MUTANT_ALL_ACCESS);
        assert_eq!(Rights::GENERIC_ALL.map(ObjectType::Event), Rights::EVENT_ALL_ACCESS);
    }

    #[test]
    fn test_rights_from_raw_drops_unknown_bits() {
        let r = Rights::from_raw(0x0010_0001 | 0x0000_0400);
        assert_eq!(r, Rights::SYNCHRONIZE | Rights::QUERY_STATE);
    }

    #[test]
    fn test_handle_table() {
        let table = HandleTable::new();
        let ctx = ObjectContext::broker_for_tests();
        let mutex = Mutex::create(&ctx, None, None).unwrap();

        let h1 = table
            .alloc(ObjectRef::Mutex(mutex.clone()), Rights::MUTANT_ALL_ACCESS, ObjectAttributes::empty())
            .unwrap();
        let h2 = table
            .alloc(ObjectRef::Mutex(mutex), Rights::SYNCHRONIZE, ObjectAttributes::INHERIT)
            .unwrap();
        assert_eq!(h1, 4);
        assert_eq!(h2, 8);
        assert_eq!(table.count(), 2);
        assert!(table.get(h2).unwrap().inherit);

        assert!(table.get_mutex(h1, Rights::MUTANT_QUERY_STATE).is_ok());
        assert_eq!(
            table.get_mutex(h2, Rights::MUTANT_QUERY_STATE).err(),
            Some(Error::AccessDenied)
        );
        assert_eq!(
            table.get_event(h1, Rights::empty()).err(),
            Some(Error::ObjectTypeMismatch)
        );

        table.close(h1).unwrap();
        assert_eq!(table.close(h1).err(), Some(Error::InvalidHandle));

        // Lowest free value is reused
        let ctx = ObjectContext::broker_for_tests();
        let other = Mutex::create(&ctx, None, None).unwrap();
        let h3 = table
            .alloc(ObjectRef::Mutex(other), Rights::SYNCHRONIZE, ObjectAttributes::empty())
            .unwrap();
        assert_eq!(h3, 4);
        assert_eq!(table.close_all().len(), 2);
        assert_eq!(table.count(), 0);
    }
}
