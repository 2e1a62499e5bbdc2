//! Operating-system seam for the termination pipeline
//!
//! Everything the pipeline needs from the OS goes through [`ProcessSystem`].
//! The Win32 implementation lives in [`windows`]; tests drive the same code
//! through an in-memory fake.

use crate::core::models::{AccessTier, ProcessEntry, Routine, RoutineAddress, WaitStatus};
use std::io;
use std::time::Duration;

#[cfg(windows)]
pub mod windows;

#[cfg(windows)]
pub use self::windows::{Win32Process, Win32System, Win32Thread};

/// A process reference handed out by a [`ProcessSystem`].
///
/// Implementations release the underlying OS handle on drop unless the
/// reference was borrowed from the caller.
pub trait ProcessRef {
    fn pid(&self) -> u32;
}

pub trait ProcessSystem {
    type Process: ProcessRef;
    type Thread;

    /// WOW64 status of the calling process.
    fn current_is_wow64(&self) -> io::Result<bool>;

    fn is_wow64(&self, process: &Self::Process) -> io::Result<bool>;

    /// Address of an exported routine in the locally mapped system library.
    /// Only `ExitProcess` can be found this way.
    fn local_routine_address(&self, routine: Routine) -> Option<RoutineAddress>;

    fn open_process(&self, pid: u32, access: AccessTier) -> io::Result<Self::Process>;

    /// `Ok(false)` once the process has an exit code.
    fn is_running(&self, process: &Self::Process) -> io::Result<bool>;

    fn spawn_remote_thread(
        &self,
        process: &Self::Process,
        start: RoutineAddress,
        argument: u32,
    ) -> io::Result<Self::Thread>;

    fn wait_thread(&self, thread: &Self::Thread, timeout: Duration) -> io::Result<WaitStatus>;

    fn terminate(&self, process: &Self::Process, exit_code: u32) -> io::Result<()>;

    /// Point-in-time list of every process and its parent.
    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>>;
}
