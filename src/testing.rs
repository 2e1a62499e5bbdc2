//! In-memory `ProcessSystem` used by the unit tests

use crate::core::models::{AccessTier, ProcessEntry, Routine, RoutineAddress, WaitStatus};
use crate::platform::{ProcessRef, ProcessSystem};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadBehavior {
    Finish,
    Hang,
    SpawnFails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open { pid: u32, full: bool },
    Close { pid: u32 },
    Inject { pid: u32, address: u64, argument: u32 },
    InjectFailed { pid: u32, address: u64 },
    ThreadClosed { pid: u32 },
    Terminate { pid: u32, code: u32 },
}

#[derive(Debug, Clone)]
struct FakeProcessState {
    running: bool,
    wow64: bool,
    wow64_fails: bool,
    deny_full: bool,
    deny_open: bool,
    terminate_fails: bool,
    thread_behavior: ThreadBehavior,
    thread_overrides: HashMap<u64, ThreadBehavior>,
}

impl Default for FakeProcessState {
    fn default() -> Self {
        Self {
            running: true,
            wow64: false,
            wow64_fails: false,
            deny_full: false,
            deny_open: false,
            terminate_fails: false,
            thread_behavior: ThreadBehavior::Finish,
            thread_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    processes: HashMap<u32, FakeProcessState>,
    snapshot: Vec<ProcessEntry>,
    snapshot_fails: bool,
    snapshots_taken: usize,
    current_wow64_fails: bool,
    local_exit_process: Option<u64>,
    local_lookups: usize,
    events: Vec<Event>,
}

impl State {
    fn process(&mut self, pid: u32) -> &mut FakeProcessState {
        self.processes.entry(pid).or_default()
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeSystem {
    state: Rc<RefCell<State>>,
}

#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    full: bool,
    owned: bool,
    state: Rc<RefCell<State>>,
}

impl ProcessRef for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        if self.owned {
            self.state
                .borrow_mut()
                .events
                .push(Event::Close { pid: self.pid });
        }
    }
}

#[derive(Debug)]
pub struct FakeThread {
    pid: u32,
    behavior: ThreadBehavior,
    state: Rc<RefCell<State>>,
}

impl Drop for FakeThread {
    fn drop(&mut self) {
        self.state
            .borrow_mut()
            .events
            .push(Event::ThreadClosed { pid: self.pid });
    }
}

fn denied() -> io::Error {
    io::Error::from(io::ErrorKind::PermissionDenied)
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_exit_process(self, address: u64) -> Self {
        self.state.borrow_mut().local_exit_process = Some(address);
        self
    }

    /// Adds a running process; snapshot order is insertion order.
    pub fn add_process(&self, pid: u32, parent_pid: u32) {
        let mut state = self.state.borrow_mut();
        state.process(pid);
        state.snapshot.push(ProcessEntry::new(pid, parent_pid));
    }

    pub fn set_wow64(&self, pid: u32, wow64: bool) {
        self.state.borrow_mut().process(pid).wow64 = wow64;
    }

    pub fn fail_wow64_query(&self, pid: u32) {
        self.state.borrow_mut().process(pid).wow64_fails = true;
    }

    pub fn fail_current_wow64_query(&self) {
        self.state.borrow_mut().current_wow64_fails = true;
    }

    pub fn fail_snapshot(&self) {
        self.state.borrow_mut().snapshot_fails = true;
    }

    pub fn fail_terminate(&self, pid: u32) {
        self.state.borrow_mut().process(pid).terminate_fails = true;
    }

    pub fn deny_full_access(&self, pid: u32) {
        self.state.borrow_mut().process(pid).deny_full = true;
    }

    pub fn deny_open(&self, pid: u32) {
        self.state.borrow_mut().process(pid).deny_open = true;
    }

    pub fn mark_exited(&self, pid: u32) {
        self.state.borrow_mut().process(pid).running = false;
    }

    pub fn revive(&self, pid: u32) {
        self.state.borrow_mut().process(pid).running = true;
    }

    pub fn set_thread_behavior(&self, pid: u32, behavior: ThreadBehavior) {
        self.state.borrow_mut().process(pid).thread_behavior = behavior;
    }

    pub fn set_thread_behavior_for(&self, pid: u32, address: u64, behavior: ThreadBehavior) {
        self.state
            .borrow_mut()
            .process(pid)
            .thread_overrides
            .insert(address, behavior);
    }

    pub fn open_full(&self, pid: u32) -> FakeProcess {
        self.open_process(pid, AccessTier::Full)
            .expect("fake process should open")
    }

    /// A caller-owned handle: never recorded as opened or closed.
    pub fn borrow_root(&self, pid: u32) -> FakeProcess {
        FakeProcess {
            pid,
            full: true,
            owned: false,
            state: Rc::clone(&self.state),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn injections(&self) -> Vec<(u32, u64, u32)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Inject {
                    pid,
                    address,
                    argument,
                } => Some((pid, address, argument)),
                _ => None,
            })
            .collect()
    }

    pub fn terminations(&self) -> Vec<(u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Terminate { pid, code } => Some((pid, code)),
                _ => None,
            })
            .collect()
    }

    pub fn opens_for(&self, target: u32) -> usize {
        self.count(|event| matches!(event, Event::Open { pid, .. } if *pid == target))
    }

    pub fn closes_for(&self, target: u32) -> usize {
        self.count(|event| matches!(event, Event::Close { pid } if *pid == target))
    }

    pub fn threads_closed(&self, target: u32) -> usize {
        self.count(|event| matches!(event, Event::ThreadClosed { pid } if *pid == target))
    }

    pub fn snapshots_taken(&self) -> usize {
        self.state.borrow().snapshots_taken
    }

    pub fn local_lookups(&self) -> usize {
        self.state.borrow().local_lookups
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl ProcessSystem for FakeSystem {
    type Process = FakeProcess;
    type Thread = FakeThread;

    fn current_is_wow64(&self) -> io::Result<bool> {
        if self.state.borrow().current_wow64_fails {
            return Err(denied());
        }
        Ok(false)
    }

    fn is_wow64(&self, process: &FakeProcess) -> io::Result<bool> {
        let mut state = self.state.borrow_mut();
        let target = state.process(process.pid);
        if !process.full || target.wow64_fails {
            return Err(denied());
        }
        Ok(target.wow64)
    }

    fn local_routine_address(&self, routine: Routine) -> Option<RoutineAddress> {
        let mut state = self.state.borrow_mut();
        state.local_lookups += 1;
        match routine {
            Routine::ExitProcess => state.local_exit_process.and_then(RoutineAddress::new),
            Routine::CtrlRoutine => None,
        }
    }

    fn open_process(&self, pid: u32, access: AccessTier) -> io::Result<FakeProcess> {
        let mut state = self.state.borrow_mut();
        let Some(target) = state.processes.get(&pid) else {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        };
        let full = access == AccessTier::Full;
        if target.deny_open || (full && target.deny_full) {
            return Err(denied());
        }
        state.events.push(Event::Open { pid, full });
        Ok(FakeProcess {
            pid,
            full,
            owned: true,
            state: Rc::clone(&self.state),
        })
    }

    fn is_running(&self, process: &FakeProcess) -> io::Result<bool> {
        if !process.full {
            return Err(denied());
        }
        Ok(self.state.borrow_mut().process(process.pid).running)
    }

    fn spawn_remote_thread(
        &self,
        process: &FakeProcess,
        start: RoutineAddress,
        argument: u32,
    ) -> io::Result<FakeThread> {
        let mut state = self.state.borrow_mut();
        let target = state.process(process.pid);
        let behavior = target
            .thread_overrides
            .get(&start.get())
            .copied()
            .unwrap_or(target.thread_behavior);
        if !process.full || behavior == ThreadBehavior::SpawnFails {
            state.events.push(Event::InjectFailed {
                pid: process.pid,
                address: start.get(),
            });
            return Err(denied());
        }
        if behavior == ThreadBehavior::Finish {
            target.running = false;
        }
        state.events.push(Event::Inject {
            pid: process.pid,
            address: start.get(),
            argument,
        });
        Ok(FakeThread {
            pid: process.pid,
            behavior,
            state: Rc::clone(&self.state),
        })
    }

    fn wait_thread(&self, thread: &FakeThread, _timeout: Duration) -> io::Result<WaitStatus> {
        Ok(match thread.behavior {
            ThreadBehavior::Hang => WaitStatus::TimedOut,
            _ => WaitStatus::Finished,
        })
    }

    fn terminate(&self, process: &FakeProcess, exit_code: u32) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        let target = state.process(process.pid);
        if target.terminate_fails {
            return Err(denied());
        }
        target.running = false;
        state.events.push(Event::Terminate {
            pid: process.pid,
            code: exit_code,
        });
        Ok(())
    }

    fn snapshot(&self) -> io::Result<Vec<ProcessEntry>> {
        let mut state = self.state.borrow_mut();
        if state.snapshot_fails {
            return Err(io::Error::other("snapshot unavailable"));
        }
        state.snapshots_taken += 1;
        Ok(state.snapshot.clone())
    }
}
