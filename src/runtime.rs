//! Boundary to the POSIX-emulation runtime
//!
//! The tree walker only needs three things from the runtime: whether an OS
//! process is one of its own, which process group it belongs to, and a way to
//! hand a signal to a group leader so the runtime's own propagation takes over.

use std::io;

#[cfg_attr(test, mockall::automock)]
pub trait RuntimeDirectory {
    /// Runtime pid for an OS pid, `None` if the process is not runtime-managed.
    fn runtime_pid(&self, os_pid: u32) -> Option<i32>;

    /// Process group of a runtime pid.
    fn process_group(&self, pid: i32) -> Option<i32>;

    /// Runtime `kill(pid, signal)`.
    fn deliver_signal(&self, pid: i32, signal: u8) -> io::Result<()>;
}

/// No runtime present: every process is handled structurally.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneRuntime;

impl RuntimeDirectory for StandaloneRuntime {
    fn runtime_pid(&self, _os_pid: u32) -> Option<i32> {
        None
    }

    fn process_group(&self, _pid: i32) -> Option<i32> {
        None
    }

    fn deliver_signal(&self, _pid: i32, _signal: u8) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "no runtime to deliver signals through",
        ))
    }
}
