// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Namespace
//!
//! Flat directory of named synchronization objects shared by all
//! processes. An entry refers to its object weakly unless the object was
//! created permanent; a dead entry is pruned on the next lookup.

use crate::kernel::object::handle::ObjectAttributes;
use crate::kernel::object::{ObjectRef, WeakObjectRef};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::collections::BTreeMap;

// Import logging macros
use crate::log_trace;

/// Longest accepted object name, in bytes
pub const MAX_NAME_LEN: usize = 1024;

struct NamespaceEntry {
    object: WeakObjectRef,

    /// Strong reference for permanent objects
    permanent: Option<ObjectRef>,
}

/// Named object directory
pub struct Namespace {
    entries: spin::Mutex<BTreeMap<String, NamespaceEntry>>,
}

impl Namespace {
    /// Create an empty namespace
    pub const fn new() -> Self {
        Self {
            entries: spin::Mutex::new(BTreeMap::new()),
        }
    }

    fn validate(name: &str) -> Result {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('\\') {
            return Err(Error::ObjectNameInvalid);
        }
        Ok(())
    }

    /// Find the live entry matching `name`; dead entries are pruned
    fn find(entries: &mut BTreeMap<String, NamespaceEntry>, name: &str, attributes: ObjectAttributes) -> Option<ObjectRef> {
        entries.retain(|_, entry| entry.object.upgrade().is_some());
        if let Some(entry) = entries.get(name) {
            return entry.object.upgrade();
        }
        if attributes.contains(ObjectAttributes::CASE_INSENSITIVE) {
            return entries
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, entry)| entry.object.upgrade());
        }
        None
    }

    /// Look up a named object of type `obj_type`
    ///
    /// # Errors
    ///
    /// - `ObjectNameInvalid` for an empty or malformed name
    /// - `ObjectNameNotFound` if no live object has this name
    /// - `ObjectTypeMismatch` if the object has another type
    pub fn lookup(&self, name: &str, attributes: ObjectAttributes, obj_type: ObjectType) -> Result<ObjectRef> {
        Self::validate(name)?;
        let mut entries = self.entries.lock();
        let object = Self::find(&mut entries, name, attributes).ok_or(Error::ObjectNameNotFound)?;
        if object.object_type() != obj_type {
            return Err(Error::ObjectTypeMismatch);
        }
        Ok(object)
    }

    /// Open the object named `name`, or create it with `create`
    ///
    /// The directory stays locked while `create` runs, so two creators of
    /// one name always end up with the same object.
    pub fn create_or_open<F>(
        &self,
        name: &str,
        attributes: ObjectAttributes,
        obj_type: ObjectType,
        create: F,
    ) -> Result<(ObjectRef, Disposition)>
    where
        F: FnOnce() -> Result<ObjectRef>,
    {
        Self::validate(name)?;
        let mut entries = self.entries.lock();
        if let Some(object) = Self::find(&mut entries, name, attributes) {
            if object.object_type() != obj_type {
                return Err(Error::ObjectTypeMismatch);
            }
            return Ok((object, Disposition::Existed));
        }

        let object = create()?;
        let permanent = attributes
            .contains(ObjectAttributes::PERMANENT)
            .then(|| object.clone());
        entries.insert(
            name.to_string(),
            NamespaceEntry {
                object: object.downgrade(),
                permanent,
            },
        );
        log_trace!("named {} {:?}", object.object_type(), name);
        Ok((object, Disposition::Created))
    }

    /// Drop the permanent reference held for `name`
    pub fn make_temporary(&self, name: &str) -> Result {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(name).ok_or(Error::ObjectNameNotFound)?;
        entry.permanent = None;
        Ok(())
    }

    /// Number of live named objects
    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.object.upgrade().is_some())
            .count()
    }

    /// Live named objects, in name order
    pub fn objects(&self) -> Vec<ObjectRef> {
        self.entries
            .lock()
            .values()
            .filter_map(|entry| entry.object.upgrade())
            .collect()
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::object::{Event, Mutex, ObjectContext};

    fn new_event(ctx: &ObjectContext, name: &str) -> Result<ObjectRef> {
        Ok(ObjectRef::Event(Event::create(ctx, Some(name.to_string()), true, false)?))
    }

    #[test]
    fn test_create_then_open_same_object() {
        let ctx = ObjectContext::broker_for_tests();
        let ns = Namespace::new();
        let (a, disp) = ns
            .create_or_open("ev", ObjectAttributes::empty(), ObjectType::Event, || new_event(&ctx, "ev"))
            .unwrap();
        assert_eq!(disp, Disposition::Created);

        let (b, disp) = ns
            .create_or_open("ev", ObjectAttributes::empty(), ObjectType::Event, || panic!("must not create"))
            .unwrap();
        assert_eq!(disp, Disposition::Existed);
        assert!(a.ptr_eq(&b));
        assert!(ns.lookup("ev", ObjectAttributes::empty(), ObjectType::Event).unwrap().ptr_eq(&a));
    }

    #[test]
    fn test_type_mismatch() {
        let ctx = ObjectContext::broker_for_tests();
        let ns = Namespace::new();
        let (_ev, _) = ns
            .create_or_open("x", ObjectAttributes::empty(), ObjectType::Event, || new_event(&ctx, "x"))
            .unwrap();
        let res = ns.create_or_open("x", ObjectAttributes::empty(), ObjectType::Mutex, || {
            Ok(ObjectRef::Mutex(Mutex::create(&ctx, None, None)?))
        });
        assert_eq!(res.err(), Some(Error::ObjectTypeMismatch));
        assert_eq!(
            ns.lookup("x", ObjectAttributes::empty(), ObjectType::Semaphore).err(),
            Some(Error::ObjectTypeMismatch)
        );
    }

    #[test]
    fn test_invalid_and_missing_names() {
        let ns = Namespace::new();
        assert_eq!(
            ns.lookup("", ObjectAttributes::empty(), ObjectType::Event).err(),
            Some(Error::ObjectNameInvalid)
        );
        assert_eq!(
            ns.lookup("a\\b", ObjectAttributes::empty(), ObjectType::Event).err(),
            Some(Error::ObjectNameInvalid)
        );
        assert_eq!(
            ns.lookup("nope", ObjectAttributes::empty(), ObjectType::Event).err(),
            Some(Error::ObjectNameNotFound)
        );
    }

    #[test]
    fn test_entry_dies_with_object() {
        let ctx = ObjectContext::broker_for_tests();
        let ns = Namespace::new();
        let (obj, _) = ns
            .create_or_open("tmp", ObjectAttributes::empty(), ObjectType::Event, || new_event(&ctx, "tmp"))
            .unwrap();
        assert_eq!(ns.count(), 1);
        drop(obj);
        assert_eq!(ns.count(), 0);
        assert_eq!(
            ns.lookup("tmp", ObjectAttributes::empty(), ObjectType::Event).err(),
            Some(Error::ObjectNameNotFound)
        );
    }

    #[test]
    fn test_permanent_object_survives() {
        let ctx = ObjectContext::broker_for_tests();
        let ns = Namespace::new();
        let (obj, _) = ns
            .create_or_open("perm", ObjectAttributes::PERMANENT, ObjectType::Event, || new_event(&ctx, "perm"))
            .unwrap();
        drop(obj);
        assert_eq!(ns.count(), 1);

        ns.make_temporary("perm").unwrap();
        assert_eq!(ns.count(), 0);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let ctx = ObjectContext::broker_for_tests();
        let ns = Namespace::new();
        let (_obj, _) = ns
            .create_or_open("Global", ObjectAttributes::empty(), ObjectType::Event, || new_event(&ctx, "Global"))
            .unwrap();
        assert!(ns.lookup("global", ObjectAttributes::empty(), ObjectType::Event).is_err());
        assert!(ns
            .lookup("global", ObjectAttributes::CASE_INSENSITIVE, ObjectType::Event)
            .is_ok());
        assert_eq!(ns.objects().len(), 1);
    }
}
