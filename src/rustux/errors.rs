// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Common error types used throughout the object manager

use crate::rustux::types::status::*;
use crate::rustux::types::Status;

/// Result type for operations that can fail
pub type Result<T = ()> = core::result::Result<T, Error>;

/// Common error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation is not available (inproc device absent)
    NotImplemented,
    InvalidHandle,
    InvalidParameter,
    NoMemory,
    InsufficientResources,
    AccessDenied,
    ObjectTypeMismatch,
    ObjectNameInvalid,
    ObjectNameNotFound,
    /// Release or signal by a thread that does not hold the mutex
    MutantNotOwned,
    /// Recursion count would overflow
    MutantLimitExceeded,
    SemaphoreLimitExceeded,
    ThreadIsTerminating,
    /// Device error with no direct status mapping (raw errno)
    Io(i32),
    Internal,
}

impl Error {
    /// Convert error to status code
    pub fn to_status(self) -> Status {
        match self {
            Error::NotImplemented => STATUS_NOT_IMPLEMENTED,
            Error::InvalidHandle => STATUS_INVALID_HANDLE,
            Error::InvalidParameter => STATUS_INVALID_PARAMETER,
            Error::NoMemory => STATUS_NO_MEMORY,
            Error::InsufficientResources => STATUS_INSUFFICIENT_RESOURCES,
            Error::AccessDenied => STATUS_ACCESS_DENIED,
            Error::ObjectTypeMismatch => STATUS_OBJECT_TYPE_MISMATCH,
            Error::ObjectNameInvalid => STATUS_OBJECT_NAME_INVALID,
            Error::ObjectNameNotFound => STATUS_OBJECT_NAME_NOT_FOUND,
            Error::MutantNotOwned => STATUS_MUTANT_NOT_OWNED,
            Error::MutantLimitExceeded => STATUS_MUTANT_LIMIT_EXCEEDED,
            Error::SemaphoreLimitExceeded => STATUS_SEMAPHORE_LIMIT_EXCEEDED,
            Error::ThreadIsTerminating => STATUS_THREAD_IS_TERMINATING,
            Error::Io(_) | Error::Internal => STATUS_INTERNAL_ERROR,
        }
    }

    /// Convert status code to error
    pub fn from_status(status: Status) -> Self {
        match status {
            STATUS_NOT_IMPLEMENTED => Error::NotImplemented,
            STATUS_INVALID_HANDLE => Error::InvalidHandle,
            STATUS_INVALID_PARAMETER => Error::InvalidParameter,
            STATUS_NO_MEMORY => Error::NoMemory,
            STATUS_INSUFFICIENT_RESOURCES => Error::InsufficientResources,
            STATUS_ACCESS_DENIED => Error::AccessDenied,
            STATUS_OBJECT_TYPE_MISMATCH => Error::ObjectTypeMismatch,
            STATUS_OBJECT_NAME_INVALID => Error::ObjectNameInvalid,
            STATUS_OBJECT_NAME_NOT_FOUND => Error::ObjectNameNotFound,
            STATUS_MUTANT_NOT_OWNED => Error::MutantNotOwned,
            STATUS_MUTANT_LIMIT_EXCEEDED => Error::MutantLimitExceeded,
            STATUS_SEMAPHORE_LIMIT_EXCEEDED => Error::SemaphoreLimitExceeded,
            STATUS_THREAD_IS_TERMINATING => Error::ThreadIsTerminating,
            _ => Error::Internal,
        }
    }

    /// Convert a device errno into an error
    ///
    /// Only the errno values that carry no wait outcome are mapped here;
    /// `ETIMEDOUT` and `EOWNERDEAD` are handled by the wait path itself.
    pub fn from_errno(errno: i32) -> Self {
        const EPERM: i32 = 1;
        const ENOENT: i32 = 2;
        const EBADF: i32 = 9;
        const ENOMEM: i32 = 12;
        const EACCES: i32 = 13;
        const EINVAL: i32 = 22;
        const EMFILE: i32 = 24;
        const ENOTTY: i32 = 25;
        const ENOSYS: i32 = 38;
        const EOVERFLOW: i32 = 75;

        match errno {
            EPERM => Error::MutantNotOwned,
            ENOENT | ENOSYS | ENOTTY => Error::NotImplemented,
            EBADF => Error::InvalidHandle,
            ENOMEM => Error::NoMemory,
            EMFILE => Error::InsufficientResources,
            EACCES => Error::AccessDenied,
            EINVAL => Error::InvalidParameter,
            EOVERFLOW => Error::SemaphoreLimitExceeded,
            other => Error::Io(other),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io(errno) => write!(f, "device error (errno {})", errno),
            other => write!(f, "{:?} (status {:#010x})", other, other.to_status()),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(errno) => Self::from_errno(errno),
            None => Error::Internal,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_for_named_errors() {
        for err in [
            Error::MutantNotOwned,
            Error::AccessDenied,
            Error::InvalidHandle,
            Error::SemaphoreLimitExceeded,
            Error::NotImplemented,
        ] {
            assert_eq!(Error::from_status(err.to_status()), err);
        }
    }

    #[test]
    fn test_from_errno() {
        assert_eq!(Error::from_errno(1), Error::MutantNotOwned);
        assert_eq!(Error::from_errno(2), Error::NotImplemented);
        assert_eq!(Error::from_errno(12), Error::NoMemory);
        assert_eq!(Error::from_errno(5), Error::Io(5));
    }

    #[test]
    fn test_io_error_conversion() {
        let err = std::io::Error::from_raw_os_error(24);
        assert_eq!(Error::from(err), Error::InsufficientResources);
    }
}
