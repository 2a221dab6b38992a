// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common type aliases used throughout the object manager

/// NTSTATUS value as reported to clients
pub type Status = u32;

/// Thread ID type
///
/// Thread IDs double as owner keys on the inproc device, which reserves 0
/// for "no owner", so a valid thread ID is never zero.
pub type ThreadId = u32;

/// Process ID type
pub type ProcessId = u32;

/// Object identifier, unique for the life of the server and never reused
pub type ObjectId = u64;

/// Handle value as seen by a client process
pub type HandleValue = u32;

/// Invalid thread ID (also the "unowned" owner value)
pub const TID_INVALID: ThreadId = 0;

/// Invalid handle value
pub const HANDLE_INVALID: HandleValue = 0;

/// Maximum number of objects in one wait
pub const MAX_WAIT_OBJECTS: usize = 64;

/// Status codes
///
/// Values match the NTSTATUS codes a guest expects from the object manager.
pub mod status {
    use super::Status;

    pub const STATUS_SUCCESS: Status = 0x0000_0000;
    pub const STATUS_WAIT_0: Status = 0x0000_0000;
    pub const STATUS_ABANDONED_WAIT_0: Status = 0x0000_0080;
    pub const STATUS_TIMEOUT: Status = 0x0000_0102;
    pub const STATUS_PENDING: Status = 0x0000_0103;
    pub const STATUS_OBJECT_NAME_EXISTS: Status = 0x4000_0000;

    pub const STATUS_NOT_IMPLEMENTED: Status = 0xC000_0002;
    pub const STATUS_INVALID_HANDLE: Status = 0xC000_0008;
    pub const STATUS_INVALID_PARAMETER: Status = 0xC000_000D;
    pub const STATUS_NO_MEMORY: Status = 0xC000_0017;
    pub const STATUS_ACCESS_DENIED: Status = 0xC000_0022;
    pub const STATUS_OBJECT_TYPE_MISMATCH: Status = 0xC000_0024;
    pub const STATUS_OBJECT_NAME_INVALID: Status = 0xC000_0033;
    pub const STATUS_OBJECT_NAME_NOT_FOUND: Status = 0xC000_0034;
    pub const STATUS_MUTANT_NOT_OWNED: Status = 0xC000_0046;
    pub const STATUS_SEMAPHORE_LIMIT_EXCEEDED: Status = 0xC000_0047;
    pub const STATUS_THREAD_IS_TERMINATING: Status = 0xC000_004B;
    pub const STATUS_INSUFFICIENT_RESOURCES: Status = 0xC000_009A;
    pub const STATUS_INTERNAL_ERROR: Status = 0xC000_00E5;
    pub const STATUS_CANCELLED: Status = 0xC000_0120;
    pub const STATUS_MUTANT_LIMIT_EXCEEDED: Status = 0xC000_0191;
}

/// Object type
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Mutex (NT "mutant")
    Mutex = 1,

    /// Event object
    Event = 2,

    /// Semaphore object
    Semaphore = 3,
}

impl ObjectType {
    /// Get name as string
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mutex => "Mutant",
            Self::Event => "Event",
            Self::Semaphore => "Semaphore",
        }
    }
}

impl core::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a successful create request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A new object was allocated
    Created,

    /// An object of that name already existed and was returned unchanged
    Existed,
}

impl Disposition {
    /// Status reported alongside the handle
    pub const fn to_status(self) -> Status {
        match self {
            Self::Created => status::STATUS_SUCCESS,
            Self::Existed => status::STATUS_OBJECT_NAME_EXISTS,
        }
    }
}

/// Result of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Object at `index` satisfied the wait (index 0 for wait-all)
    Signaled(usize),

    /// As `Signaled`, and a mutex in the wait was abandoned by its owner
    Abandoned(usize),

    /// Timeout expired first
    TimedOut,

    /// Wait was cancelled before it was satisfied, by termination or an
    /// explicit cancel; nothing was acquired
    Cancelled,
}

impl WaitStatus {
    /// Convert to the status value reported to the client
    pub const fn to_status(self) -> Status {
        match self {
            Self::Signaled(i) => status::STATUS_WAIT_0 + i as Status,
            Self::Abandoned(i) => status::STATUS_ABANDONED_WAIT_0 + i as Status,
            Self::TimedOut => status::STATUS_TIMEOUT,
            Self::Cancelled => status::STATUS_CANCELLED,
        }
    }

    /// Check if the wait acquired its object(s)
    pub const fn is_satisfied(self) -> bool {
        matches!(self, Self::Signaled(_) | Self::Abandoned(_))
    }

    /// Check if the wait reported abandonment
    pub const fn is_abandoned(self) -> bool {
        matches!(self, Self::Abandoned(_))
    }
}

/// Wait type for multi-object waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitType {
    /// Satisfied by the first signaled object
    Any,

    /// Satisfied only when every object is signaled at once
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_status_values() {
        assert_eq!(WaitStatus::Signaled(0).to_status(), 0);
        assert_eq!(WaitStatus::Signaled(3).to_status(), 3);
        assert_eq!(WaitStatus::Abandoned(1).to_status(), 0x81);
        assert_eq!(WaitStatus::TimedOut.to_status(), status::STATUS_TIMEOUT);
        assert_eq!(WaitStatus::Cancelled.to_status(), status::STATUS_CANCELLED);
        assert!(!WaitStatus::Cancelled.is_satisfied());
        assert!(WaitStatus::Abandoned(0).is_satisfied());
        assert!(!WaitStatus::TimedOut.is_satisfied());
    }

    #[test]
    fn test_disposition_status() {
        assert_eq!(Disposition::Created.to_status(), status::STATUS_SUCCESS);
        assert_eq!(Disposition::Existed.to_status(), status::STATUS_OBJECT_NAME_EXISTS);
    }

    #[test]
    fn test_object_type_name() {
        assert_eq!(ObjectType::Mutex.name(), "Mutant");
        assert_eq!(ObjectType::Semaphore.to_string(), "Semaphore");
    }
}
