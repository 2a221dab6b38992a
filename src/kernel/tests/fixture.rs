// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Test Fixture
//!
//! A server with one process, on either synchronization path, plus a
//! helper that runs a wait the way each path runs it: pending in the
//! broker, blocked on a host thread for the inproc device.

use crate::kernel::dev::inproc::DeviceSlot;
use crate::kernel::init::SyncMode;
use crate::kernel::object::ObjectContext;
use crate::kernel::process::Process;
use crate::kernel::server::Server;
use crate::kernel::sync::wait::WaitOutcome;
use crate::kernel::thread::Thread;
use crate::rustux::types::*;
use crate::rustux::errors::*;
use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Server plus one process
pub struct Fixture {
    pub server: Arc<Server>,
    pub process: Arc<Process>,
}

impl Fixture {
    fn with_server(server: Server) -> Self {
        let server = Arc::new(server);
        let process = server.create_process();
        Self { server, process }
    }

    /// Broker path, no device
    pub fn broker() -> Self {
        Self::with_server(Server::with_mode(SyncMode::Broker, DeviceSlot::unavailable()))
    }

    /// Inproc path on a private soft device
    pub fn inproc() -> Self {
        Self::with_server(Server::with_mode(SyncMode::Inproc, DeviceSlot::soft()))
    }

    /// One fixture per path
    pub fn both() -> [Self; 2] {
        [Self::broker(), Self::inproc()]
    }

    /// New thread in the fixture's process
    pub fn thread(&self) -> Arc<Thread> {
        self.server.create_thread(&self.process).expect("create thread")
    }

    /// Object creation context
    pub fn ctx(&self) -> ObjectContext {
        self.server.context().clone()
    }

    /// Start a wait that may block
    pub fn start_wait(
        &self,
        thread: &Arc<Thread>,
        handles: &[HandleValue],
        wait_type: WaitType,
        timeout: Option<Duration>,
    ) -> Waiter {
        match self.server.mode() {
            SyncMode::Broker => match self.server.select(thread, handles, wait_type, timeout) {
                Ok(WaitOutcome::Pending) => Waiter::Broker(Arc::clone(thread)),
                Ok(WaitOutcome::Completed(status)) => Waiter::Done(Ok(status)),
                Err(err) => Waiter::Done(Err(err)),
            },
            SyncMode::Inproc => {
                let server = Arc::clone(&self.server);
                let thread = Arc::clone(thread);
                let handles = handles.to_vec();
                Waiter::Inproc(std::thread::spawn(move || {
                    match server.select(&thread, &handles, wait_type, timeout)? {
                        WaitOutcome::Completed(status) => Ok(status),
                        WaitOutcome::Pending => Err(Error::Internal),
                    }
                }))
            }
        }
    }
}

/// A wait started by [`Fixture::start_wait`]
pub enum Waiter {
    Broker(Arc<Thread>),
    Inproc(JoinHandle<Result<WaitStatus>>),
    Done(Result<WaitStatus>),
}

impl Waiter {
    /// Check that the wait has not completed
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Broker(thread) => thread.is_waiting(),
            Self::Inproc(handle) => {
                std::thread::sleep(Duration::from_millis(20));
                !handle.is_finished()
            }
            Self::Done(_) => false,
        }
    }

    /// Collect the result; a broker wait that is still pending yields None
    pub fn finish(self) -> Option<Result<WaitStatus>> {
        match self {
            Self::Broker(thread) => thread.take_wakeup().map(Ok),
            Self::Inproc(handle) => Some(handle.join().expect("waiter panicked")),
            Self::Done(result) => Some(result),
        }
    }
}
