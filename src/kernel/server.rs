// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Server
//!
//! Owns the registries of processes and threads, the object namespace and
//! the synchronization context, and drives thread lifecycle. Request
//! handlers live in [`crate::kernel::syscalls`] as further `impl Server`
//! blocks.
//!
//! # Thread Termination
//!
//! 1. Mark the thread terminated
//! 2. Cancel its pending wait, or raise its alert to interrupt a device wait
//! 3. Abandon the mutexes it holds
//! 4. Drop it from the registries

use crate::kernel::cmdline::Cmdline;
use crate::kernel::dev::inproc::{create_inproc_alert, DeviceSlot};
use crate::kernel::init::{select_mode, SyncConfig, SyncMode};
use crate::kernel::object::{Namespace, ObjectContext};
use crate::kernel::process::{Process, ProcessState};
use crate::kernel::sync::abandon::abandon_mutexes;
use crate::kernel::sync::wait::{cancel_wait, expire_timeouts};
use crate::kernel::thread::{Thread, ThreadState};
use crate::rustux::types::*;
use crate::rustux::errors::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

// Import logging macros
use crate::{log_debug, log_info, log_warn};

/// Object server
pub struct Server {
    ctx: ObjectContext,
    namespace: Namespace,
    processes: spin::Mutex<BTreeMap<ProcessId, Arc<Process>>>,
    threads: spin::Mutex<BTreeMap<ThreadId, Arc<Thread>>>,
}

impl Server {
    /// Create a server configured from `cmdline`
    pub fn new(cmdline: &Cmdline) -> Self {
        let config = SyncConfig::from_cmdline(cmdline);
        config.apply();
        let device = config.device.slot();
        let mode = select_mode(config.policy, &device);
        Self::with_mode(mode, device)
    }

    /// Create a server with an explicit mode and device
    pub fn with_mode(mode: SyncMode, device: DeviceSlot) -> Self {
        log_info!("object server starting in {} mode", mode);
        Self {
            ctx: ObjectContext::new(mode, Arc::new(device)),
            namespace: Namespace::new(),
            processes: spin::Mutex::new(BTreeMap::new()),
            threads: spin::Mutex::new(BTreeMap::new()),
        }
    }

    /// Synchronization mode
    pub fn mode(&self) -> SyncMode {
        self.ctx.mode()
    }

    /// Object creation context
    pub fn context(&self) -> &ObjectContext {
        &self.ctx
    }

    /// Named object directory
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// ============================================================================
    /// Processes and Threads
    /// ============================================================================

    /// Create and register a process
    pub fn create_process(&self) -> Arc<Process> {
        let process = Process::new();
        self.processes.lock().insert(process.pid(), Arc::clone(&process));
        process
    }

    /// Create and register a thread in `process`
    pub fn create_thread(&self, process: &Arc<Process>) -> Result<Arc<Thread>> {
        if !process.state().is_alive() {
            return Err(Error::InvalidParameter);
        }
        let thread = Thread::new(process);
        if self.mode() == SyncMode::Inproc {
            match create_inproc_alert(self.ctx.device()) {
                Ok(alert) => thread.install_alert(alert),
                // No device: the thread cannot create or wait on anything
                Err(err) => log_warn!("no wait alert for thread {:#x}: {}", thread.tid(), err),
            }
        }
        process.add_thread(thread.tid());
        self.threads.lock().insert(thread.tid(), Arc::clone(&thread));
        Ok(thread)
    }

    /// Look up a live thread
    pub fn thread(&self, tid: ThreadId) -> Option<Arc<Thread>> {
        self.threads.lock().get(&tid).cloned()
    }

    /// Look up a live process
    pub fn process(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// Terminate a thread
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if no live thread has this ID
    pub fn terminate_thread(&self, tid: ThreadId) -> Result {
        let thread = self.threads.lock().remove(&tid).ok_or(Error::InvalidHandle)?;
        thread.set_state(ThreadState::Terminated);

        let abandoned = match self.mode() {
            SyncMode::Broker => {
                cancel_wait(&thread, WaitStatus::Cancelled);
                abandon_mutexes(&thread)
            }
            SyncMode::Inproc => {
                thread.raise_alert();
                self.ctx.inproc_mutexes().abandon(tid)
            }
        };
        if let Some(process) = thread.process() {
            process.remove_thread(tid);
        }
        log_debug!("thread {:#x} terminated ({} mutexes abandoned)", tid, abandoned);
        Ok(())
    }

    /// Terminate every thread of a process and close its handles
    pub fn terminate_process(&self, pid: ProcessId) -> Result {
        let process = self.processes.lock().remove(&pid).ok_or(Error::InvalidHandle)?;
        process.set_state(ProcessState::Exiting);
        for tid in process.threads() {
            // Already gone if terminated concurrently
            let _ = self.terminate_thread(tid);
        }
        let closed = process.handles().close_all();
        log_debug!("process {:#x} exited, {} handles closed", pid, closed.len());
        drop(closed);
        process.set_state(ProcessState::Dead);
        Ok(())
    }

    /// ============================================================================
    /// Wait Maintenance
    /// ============================================================================

    /// Time out broker waits whose deadline has passed
    pub fn check_timeouts(&self) -> usize {
        self.expire_timeouts_at(Instant::now())
    }

    /// Time out broker waits whose deadline is at or before `now`
    pub fn expire_timeouts_at(&self, now: Instant) -> usize {
        let threads: Vec<Arc<Thread>> = self.threads.lock().values().cloned().collect();
        expire_timeouts(&threads, now)
    }

    /// Abort the wait thread `tid` is in
    ///
    /// On the inproc path the wait is interrupted through the thread's
    /// alert and returns `Cancelled` to the blocked caller.
    ///
    /// # Returns
    ///
    /// true if a wait was cancelled
    pub fn cancel_wait(&self, tid: ThreadId) -> Result<bool> {
        let thread = self.thread(tid).ok_or(Error::InvalidHandle)?;
        Ok(match self.mode() {
            SyncMode::Broker => cancel_wait(&thread, WaitStatus::Cancelled),
            SyncMode::Inproc => thread.state() == ThreadState::Waiting && thread.raise_alert(),
        })
    }

    /// One line per named object
    pub fn dump_objects(&self) -> String {
        let mut out = String::new();
        for object in self.namespace.objects() {
            let name = object.name().unwrap_or("");
            out.push_str(&format!("{:?}: {}\n", name, object));
        }
        out
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_from_cmdline() {
        let mut cmdline = Cmdline::new();
        cmdline.append("sync.inproc=auto sync.device=soft");
        assert_eq!(Server::new(&cmdline).mode(), SyncMode::Inproc);

        let mut cmdline = Cmdline::new();
        cmdline.append("sync.inproc=off");
        assert_eq!(Server::new(&cmdline).mode(), SyncMode::Broker);
    }

    #[test]
    fn test_thread_lifecycle() {
        let server = Server::with_mode(SyncMode::Broker, DeviceSlot::unavailable());
        let process = server.create_process();
        let thread = server.create_thread(&process).unwrap();
        assert_eq!(server.thread_count(), 1);
        assert!(server.thread(thread.tid()).is_some());
        assert_eq!(process.thread_count(), 1);

        server.terminate_thread(thread.tid()).unwrap();
        assert!(thread.is_terminated());
        assert_eq!(server.thread_count(), 0);
        assert_eq!(process.thread_count(), 0);
        assert_eq!(server.terminate_thread(thread.tid()), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_terminate_process() {
        let server = Server::with_mode(SyncMode::Broker, DeviceSlot::unavailable());
        let process = server.create_process();
        let a = server.create_thread(&process).unwrap();
        let _b = server.create_thread(&process).unwrap();

        server.terminate_process(process.pid()).unwrap();
        assert!(a.is_terminated());
        assert_eq!(server.thread_count(), 0);
        assert_eq!(process.state(), ProcessState::Dead);
        assert!(server.process(process.pid()).is_none());
        assert_eq!(server.create_thread(&process).err(), Some(Error::InvalidParameter));
    }
}
