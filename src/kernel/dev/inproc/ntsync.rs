// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Linux ntsync Device
//!
//! Backend for `/dev/ntsync`. The device file is the control handle; each
//! created primitive is its own file descriptor, driven by ioctls.
//!
//! # Error Mapping
//!
//! | errno | Meaning |
//! |-------|---------|
//! | EPERM | mutex not owned by the caller |
//! | EOVERFLOW | semaphore or mutex limit exceeded |
//! | ETIMEDOUT | wait timed out |
//! | EOWNERDEAD | acquired or read an abandoned mutex |

use super::{EventArgs, MutexArgs, MutexRead, SemArgs, SyncDevice, SyncPrimitive, WaitArgs};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::any::Any;
use core::mem::size_of;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

// Import logging macros
use crate::log_debug;

/// Device node
pub const NTSYNC_DEVICE: &str = "/dev/ntsync";

/// ============================================================================
/// Kernel ABI
/// ============================================================================

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NtsyncSemArgs {
    count: u32,
    max: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NtsyncMutexArgs {
    owner: u32,
    count: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NtsyncEventArgs {
    manual: u32,
    signaled: u32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct NtsyncWaitArgs {
    timeout: u64,
    objs: u64,
    count: u32,
    index: u32,
    flags: u32,
    owner: u32,
    alert: u32,
    pad: u32,
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Generic ioctl request encoding (x86, arm, riscv)
const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((b'N' as u32) << 8) | nr
}

const NTSYNC_IOC_CREATE_SEM: u32 = ioc(IOC_WRITE, 0x80, size_of::<NtsyncSemArgs>());
const NTSYNC_IOC_SEM_RELEASE: u32 = ioc(IOC_READ | IOC_WRITE, 0x81, size_of::<u32>());
const NTSYNC_IOC_WAIT_ANY: u32 = ioc(IOC_READ | IOC_WRITE, 0x82, size_of::<NtsyncWaitArgs>());
const NTSYNC_IOC_WAIT_ALL: u32 = ioc(IOC_READ | IOC_WRITE, 0x83, size_of::<NtsyncWaitArgs>());
const NTSYNC_IOC_CREATE_MUTEX: u32 = ioc(IOC_WRITE, 0x84, size_of::<NtsyncMutexArgs>());
const NTSYNC_IOC_MUTEX_UNLOCK: u32 = ioc(IOC_READ | IOC_WRITE, 0x85, size_of::<NtsyncMutexArgs>());
const NTSYNC_IOC_MUTEX_KILL: u32 = ioc(IOC_WRITE, 0x86, size_of::<u32>());
const NTSYNC_IOC_CREATE_EVENT: u32 = ioc(IOC_WRITE, 0x87, size_of::<NtsyncEventArgs>());
const NTSYNC_IOC_EVENT_SET: u32 = ioc(IOC_READ, 0x88, size_of::<u32>());
const NTSYNC_IOC_EVENT_RESET: u32 = ioc(IOC_READ, 0x89, size_of::<u32>());
const NTSYNC_IOC_EVENT_PULSE: u32 = ioc(IOC_READ, 0x8a, size_of::<u32>());
const NTSYNC_IOC_SEM_READ: u32 = ioc(IOC_READ, 0x8b, size_of::<NtsyncSemArgs>());
const NTSYNC_IOC_MUTEX_READ: u32 = ioc(IOC_READ, 0x8c, size_of::<NtsyncMutexArgs>());
const NTSYNC_IOC_EVENT_READ: u32 = ioc(IOC_READ, 0x8d, size_of::<NtsyncEventArgs>());

/// Issue an ioctl with an argument buffer
///
/// # Safety
///
/// `request` must take a pointer to a `T`-shaped buffer.
unsafe fn ioctl<T>(fd: &impl AsRawFd, request: u32, arg: *mut T) -> io::Result<i32> {
    // SAFETY: fd is a live descriptor and arg points to a valid T
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, arg) };
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn errno_of(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(0)
}

/// Absolute CLOCK_MONOTONIC deadline in nanoseconds, u64::MAX for infinite
fn deadline_ns(timeout: Option<core::time::Duration>) -> Result<u64> {
    let Some(timeout) = timeout else {
        return Ok(u64::MAX);
    };
    let mut now = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: now is a valid timespec
    if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now) } != 0 {
        return Err(Error::from(io::Error::last_os_error()));
    }
    let now_ns = (now.tv_sec as u64)
        .saturating_mul(1_000_000_000)
        .saturating_add(now.tv_nsec as u64);
    let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
    Ok(now_ns.saturating_add(timeout_ns))
}

/// ============================================================================
/// Device
/// ============================================================================

/// Open `/dev/ntsync` control handle
pub struct NtSyncDevice {
    fd: OwnedFd,
}

impl NtSyncDevice {
    /// Open the device node
    ///
    /// # Errors
    ///
    /// `NotImplemented` if the node does not exist, otherwise the mapped
    /// open error
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(NTSYNC_DEVICE).map_err(|err| {
            log_debug!("cannot open {}: {}", NTSYNC_DEVICE, err);
            Error::from(err)
        })?;
        Ok(Self { fd: OwnedFd::from(file) })
    }

    fn create<T>(&self, request: u32, mut args: T) -> Result<Box<dyn SyncPrimitive>> {
        // SAFETY: every create request takes its matching args struct
        let fd = unsafe { ioctl(&self.fd, request, &mut args) }?;
        // SAFETY: a successful create returns a new descriptor we now own
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Box::new(NtSyncObject { fd }))
    }
}

impl SyncDevice for NtSyncDevice {
    fn name(&self) -> &'static str {
        "ntsync"
    }

    fn create_sem(&self, args: SemArgs) -> Result<Box<dyn SyncPrimitive>> {
        let args = NtsyncSemArgs {
            count: args.count,
            max: args.max,
        };
        self.create(NTSYNC_IOC_CREATE_SEM, args)
    }

    fn create_mutex(&self, args: MutexArgs) -> Result<Box<dyn SyncPrimitive>> {
        let args = NtsyncMutexArgs {
            owner: args.owner,
            count: args.count,
        };
        self.create(NTSYNC_IOC_CREATE_MUTEX, args)
    }

    fn create_event(&self, args: EventArgs) -> Result<Box<dyn SyncPrimitive>> {
        let args = NtsyncEventArgs {
            manual: args.manual as u32,
            signaled: args.signaled as u32,
        };
        self.create(NTSYNC_IOC_CREATE_EVENT, args)
    }

    fn wait(&self, objs: &[&dyn SyncPrimitive], args: &WaitArgs<'_>) -> Result<WaitStatus> {
        if objs.is_empty() || objs.len() > MAX_WAIT_OBJECTS {
            return Err(Error::InvalidParameter);
        }
        let fds = objs.iter().map(|obj| raw_fd(*obj)).collect::<Result<Vec<u32>>>()?;
        let alert = args.alert.map(raw_fd).transpose()?;

        let mut wait = NtsyncWaitArgs {
            timeout: deadline_ns(args.timeout)?,
            objs: fds.as_ptr() as u64,
            count: fds.len() as u32,
            owner: args.owner,
            alert: alert.unwrap_or(0),
            ..Default::default()
        };
        let request = match args.wait_type {
            WaitType::Any => NTSYNC_IOC_WAIT_ANY,
            WaitType::All => NTSYNC_IOC_WAIT_ALL,
        };

        // SAFETY: wait points to a valid NtsyncWaitArgs whose objs array
        // (fds) outlives the call
        match unsafe { ioctl(&self.fd, request, &mut wait) } {
            // The alert reports the index just past the objects
            Ok(_) if wait.index as usize == fds.len() => Ok(WaitStatus::Cancelled),
            Ok(_) => Ok(WaitStatus::Signaled(wait.index as usize)),
            Err(err) => match errno_of(&err) {
                libc::ETIMEDOUT => Ok(WaitStatus::TimedOut),
                libc::EOWNERDEAD => Ok(WaitStatus::Abandoned(wait.index as usize)),
                errno => Err(Error::from_errno(errno)),
            },
        }
    }
}

fn raw_fd(obj: &dyn SyncPrimitive) -> Result<u32> {
    match obj.as_any().downcast_ref::<NtSyncObject>() {
        Some(obj) => Ok(obj.fd.as_raw_fd() as u32),
        None => Err(Error::InvalidHandle),
    }
}

/// ============================================================================
/// Primitive
/// ============================================================================

/// One ntsync object descriptor
struct NtSyncObject {
    fd: OwnedFd,
}

impl NtSyncObject {
    fn call<T>(&self, request: u32, mut arg: T) -> Result<T> {
        // SAFETY: callers pair each request with its argument type
        unsafe { ioctl(&self.fd, request, &mut arg) }?;
        Ok(arg)
    }

    fn event_call(&self, request: u32) -> Result<bool> {
        let prev = self.call(request, 0u32)?;
        Ok(prev != 0)
    }
}

impl SyncPrimitive for NtSyncObject {
    fn sem_release(&self, count: u32) -> Result<u32> {
        // EOVERFLOW maps to SemaphoreLimitExceeded
        self.call(NTSYNC_IOC_SEM_RELEASE, count)
    }

    fn sem_read(&self) -> Result<SemArgs> {
        let args = self.call(NTSYNC_IOC_SEM_READ, NtsyncSemArgs::default())?;
        Ok(SemArgs {
            count: args.count,
            max: args.max,
        })
    }

    fn mutex_unlock(&self, owner: ThreadId) -> Result<u32> {
        let args = self.call(NTSYNC_IOC_MUTEX_UNLOCK, NtsyncMutexArgs { owner, count: 0 })?;
        Ok(args.count)
    }

    fn mutex_kill(&self, owner: ThreadId) -> Result {
        self.call(NTSYNC_IOC_MUTEX_KILL, owner).map(|_| ())
    }

    fn mutex_read(&self) -> Result<MutexRead> {
        let mut args = NtsyncMutexArgs::default();
        // SAFETY: MUTEX_READ takes an NtsyncMutexArgs
        match unsafe { ioctl(&self.fd, NTSYNC_IOC_MUTEX_READ, &mut args) } {
            Ok(_) => Ok(MutexRead {
                owner: args.owner,
                count: args.count,
                abandoned: false,
            }),
            // The state is still filled in for an abandoned mutex
            Err(err) if errno_of(&err) == libc::EOWNERDEAD => Ok(MutexRead {
                owner: args.owner,
                count: args.count,
                abandoned: true,
            }),
            Err(err) => Err(Error::from(err)),
        }
    }

    fn event_set(&self) -> Result<bool> {
        self.event_call(NTSYNC_IOC_EVENT_SET)
    }

    fn event_reset(&self) -> Result<bool> {
        self.event_call(NTSYNC_IOC_EVENT_RESET)
    }

    fn event_pulse(&self) -> Result<bool> {
        self.event_call(NTSYNC_IOC_EVENT_PULSE)
    }

    fn event_read(&self) -> Result<EventArgs> {
        let args = self.call(NTSYNC_IOC_EVENT_READ, NtsyncEventArgs::default())?;
        Ok(EventArgs {
            manual: args.manual != 0,
            signaled: args.signaled != 0,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
