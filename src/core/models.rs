//! Core data model shared by the resolver, injector, terminator and tree walker

use std::fmt;

/// The two routines a remote thread can be started at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Routine {
    /// `kernel32!CtrlRoutine`, the worker behind `GenerateConsoleCtrlEvent()`.
    /// Not exported, so it can only be located by the helper oracle.
    CtrlRoutine,
    /// `kernel32!ExitProcess`.
    ExitProcess,
}

impl Routine {
    /// Name passed to the helper's `--get-address-of`.
    pub fn symbol(self) -> &'static str {
        match self {
            Routine::CtrlRoutine => "CtrlRoutine",
            Routine::ExitProcess => "ExitProcess",
        }
    }

    pub fn from_symbol(name: &str) -> Option<Self> {
        match name {
            "CtrlRoutine" => Some(Routine::CtrlRoutine),
            "ExitProcess" => Some(Routine::ExitProcess),
            _ => None,
        }
    }
}

impl fmt::Display for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A function entry point inside a target's address space.
///
/// Only meaningful for processes of the bitness class it was resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutineAddress(u64);

impl RoutineAddress {
    /// Zero is never a valid entry point.
    pub fn new(address: u64) -> Option<Self> {
        (address != 0).then_some(Self(address))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoutineAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Bitness of a target relative to the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitnessClass {
    Native,
    /// The WOW64 status differs: a 32-bit target from a 64-bit caller or
    /// the other way round.
    Foreign,
}

impl BitnessClass {
    pub fn from_wow64(current_is_wow64: bool, target_is_wow64: bool) -> Self {
        if current_is_wow64 == target_is_wow64 {
            BitnessClass::Native
        } else {
            BitnessClass::Foreign
        }
    }
}

/// Which build of the helper executable to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperVariant {
    /// Same architecture as this process.
    Native,
    /// The other architecture, used for foreign-bitness targets.
    Foreign,
}

impl From<BitnessClass> for HelperVariant {
    fn from(class: BitnessClass) -> Self {
        match class {
            BitnessClass::Native => HelperVariant::Native,
            BitnessClass::Foreign => HelperVariant::Foreign,
        }
    }
}

/// One row of a system-wide process snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: u32,
}

impl ProcessEntry {
    pub fn new(pid: u32, parent_pid: u32) -> Self {
        Self { pid, parent_pid }
    }
}

/// Access rights requested when opening a descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    /// Create-thread, query and VM operation/read/write: enough for injection.
    Full,
    /// `PROCESS_TERMINATE` only.
    TerminateOnly,
}

/// Console control events understood by `CtrlRoutine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEvent {
    CtrlC,
    CtrlBreak,
}

impl ConsoleEvent {
    pub fn code(self) -> u32 {
        match self {
            ConsoleEvent::CtrlC => 0,
            ConsoleEvent::CtrlBreak => 1,
        }
    }
}

/// Result of waiting on a remote thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Finished,
    TimedOut,
}
