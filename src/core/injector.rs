//! Remote thread injection with a bounded wait

use crate::core::models::{RoutineAddress, WaitStatus};
use crate::error::InjectionError;
use crate::platform::{ProcessRef, ProcessSystem};
use std::time::Duration;
use tracing::debug;

/// Grace period for an injected routine before falling back.
pub const DEFAULT_INJECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a routine inside another process as a thread entry point.
///
/// Success means the thread finished within the timeout. A timed-out thread
/// may still complete later; the injector only reports that it could not
/// confirm completion.
#[derive(Debug, Clone, Copy)]
pub struct RemoteInjector {
    timeout: Duration,
}

impl Default for RemoteInjector {
    fn default() -> Self {
        Self::new(DEFAULT_INJECTION_TIMEOUT)
    }
}

impl RemoteInjector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inject<S: ProcessSystem>(
        &self,
        system: &S,
        process: &S::Process,
        address: RoutineAddress,
        argument: u32,
    ) -> Result<(), InjectionError> {
        let thread = system
            .spawn_remote_thread(process, address, argument)
            .map_err(InjectionError::Spawn)?;
        debug!(pid = process.pid(), %address, argument, "remote thread started");

        // `thread` is dropped (and its handle closed) on every path below.
        match system.wait_thread(&thread, self.timeout) {
            Ok(WaitStatus::Finished) => Ok(()),
            Ok(WaitStatus::TimedOut) => Err(InjectionError::TimedOut(self.timeout)),
            Err(err) => Err(InjectionError::Wait(err)),
        }
    }
}
