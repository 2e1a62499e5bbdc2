//! Win32 implementation of [`ProcessSystem`]

use super::{ProcessRef, ProcessSystem};
use crate::core::models::{AccessTier, ProcessEntry, Routine, RoutineAddress, WaitStatus};
use std::ffi::c_void;
use std::io;
use std::mem;
use std::time::Duration;
use windows::core::{s, w};
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
    TH32CS_SNAPPROCESS,
};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::System::Threading::{
    CreateRemoteThread, GetCurrentProcess, GetExitCodeProcess, GetProcessId, IsWow64Process,
    OpenProcess, TerminateProcess, WaitForSingleObject, LPTHREAD_START_ROUTINE,
    PROCESS_ACCESS_RIGHTS, PROCESS_CREATE_THREAD, PROCESS_QUERY_INFORMATION, PROCESS_TERMINATE,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

const STILL_ACTIVE: u32 = 259;
const WAIT_OBJECT_0: u32 = 0;
const WAIT_TIMEOUT: u32 = 258;

/// Rights `CreateRemoteThread()` needs on the target, plus terminate so the
/// forcible fallback works on the same handle.
pub const INJECTION_ACCESS: PROCESS_ACCESS_RIGHTS = PROCESS_ACCESS_RIGHTS(
    PROCESS_CREATE_THREAD.0
        | PROCESS_TERMINATE.0
        | PROCESS_QUERY_INFORMATION.0
        | PROCESS_VM_OPERATION.0
        | PROCESS_VM_WRITE.0
        | PROCESS_VM_READ.0,
);

fn access_rights(access: AccessTier) -> PROCESS_ACCESS_RIGHTS {
    match access {
        AccessTier::Full => INJECTION_ACCESS,
        AccessTier::TerminateOnly => PROCESS_TERMINATE,
    }
}

/// Process handle that is closed on drop unless borrowed.
#[derive(Debug)]
pub struct Win32Process {
    handle: HANDLE,
    pid: u32,
    owned: bool,
}

impl Win32Process {
    /// Wraps a handle owned by the caller. It is never closed here.
    ///
    /// # Safety
    /// `handle` must be a valid process handle that outlives the returned value.
    pub unsafe fn borrow_raw(handle: HANDLE) -> Self {
        let pid = unsafe { GetProcessId(handle) };
        Self {
            handle,
            pid,
            owned: false,
        }
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }
}

impl ProcessRef for Win32Process {
    fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for Win32Process {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[derive(Debug)]
pub struct Win32Thread(HANDLE);

impl Drop for Win32Thread {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

struct SnapshotHandle(HANDLE);

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32System;

impl Win32System {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSystem for Win32System {
    type Process = Win32Process;
    type Thread = Win32Thread;

    fn current_is_wow64(&self) -> io::Result<bool> {
        let mut is_wow64 = BOOL::default();
        unsafe { IsWow64Process(GetCurrentProcess(), &mut is_wow64) }.map_err(io::Error::from)?;
        Ok(is_wow64.as_bool())
    }

    fn is_wow64(&self, process: &Win32Process) -> io::Result<bool> {
        let mut is_wow64 = BOOL::default();
        unsafe { IsWow64Process(process.handle, &mut is_wow64) }.map_err(io::Error::from)?;
        Ok(is_wow64.as_bool())
    }

    fn local_routine_address(&self, routine: Routine) -> Option<RoutineAddress> {
        if routine != Routine::ExitProcess {
            return None;
        }
        // kernel32 is mapped at the same base in every process of one bitness.
        let kernel32 = unsafe { GetModuleHandleW(w!("kernel32")) }.ok()?;
        let proc_address = unsafe { GetProcAddress(kernel32, s!("ExitProcess")) }?;
        RoutineAddress::new(proc_address as usize as u64)
    }

    fn open_process(&self, pid: u32, access: AccessTier) -> io::Result<Win32Process> {
        let handle =
            unsafe { OpenProcess(access_rights(access), false, pid) }.map_err(io::Error::from)?;
        Ok(Win32Process {
            handle,
            pid,
            owned: true,
        })
    }

    fn is_running(&self, process: &Win32Process) -> io::Result<bool> {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(process.handle, &mut code) }.map_err(io::Error::from)?;
        Ok(code == STILL_ACTIVE)
    }

    fn spawn_remote_thread(
        &self,
        process: &Win32Process,
        start: RoutineAddress,
        argument: u32,
    ) -> io::Result<Win32Thread> {
        let address = usize::try_from(start.get())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "address exceeds pointer width"))?;
        // SAFETY: the address was resolved for this target's bitness; the
        // routine takes a single pointer-sized argument.
        let entry: LPTHREAD_START_ROUTINE = Some(unsafe {
            mem::transmute::<usize, unsafe extern "system" fn(*mut c_void) -> u32>(address)
        });
        let thread = unsafe {
            CreateRemoteThread(
                process.handle,
                None,
                0,
                entry,
                Some(argument as usize as *const c_void),
                0,
                None,
            )
        }
        .map_err(io::Error::from)?;
        Ok(Win32Thread(thread))
    }

    fn wait_thread(&self, thread: &Win32Thread, timeout: Duration) -> io::Result<WaitStatus> {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);
        let status = unsafe { WaitForSingleObject(thread.0, millis) };
        match status.0 {
            WAIT_OBJECT_0 => Ok(WaitStatus::Finished),
            WAIT_TIMEOUT => Ok(WaitStatus::TimedOut),
            _ => Err(io::Error::last_os_error()),
        }
    }

    fn terminate(&self, process: &Win32Process, exit_code: u32) -> io::Result<()> {
        unsafe { TerminateProcess(process.handle, exit_code) }.map_err(io::Error::from)
    }

    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>> {
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map(SnapshotHandle)
            .map_err(io::Error::from)?;

        let mut entry = PROCESSENTRY32W {
            dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut entries = Vec::new();
        if unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_err() {
            return Ok(entries);
        }
        loop {
            entries.push(ProcessEntry::new(
                entry.th32ProcessID,
                entry.th32ParentProcessID,
            ));
            if unsafe { Process32NextW(snapshot.0, &mut entry) }.is_err() {
                break;
            }
        }
        Ok(entries)
    }
}
