//! Process tree discovery and bottom-up teardown
//!
//! Discovery works on a single system-wide snapshot. Nothing guarantees that
//! the snapshot lists parents before their children, so the snapshot is
//! scanned repeatedly until a full pass adds no new process (or the capacity
//! is reached). Teardown then walks the discovered list backwards: the newest
//! descendants go first and the root goes last.

use crate::core::models::AccessTier;
use crate::core::oracle::AddressOracle;
use crate::core::terminator::{ProcessTerminator, Technique};
use crate::error::KillError;
use crate::platform::{ProcessRef, ProcessSystem};
use crate::runtime::RuntimeDirectory;
use crate::signal::TerminationRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFAULT_TREE_CAPACITY: usize = 16384;

/// How descendants that cannot be opened at all count toward the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnopenablePolicy {
    /// Assume the process is gone or out of reach; do not fail the tree.
    #[default]
    Skip,
    /// Any unopenable descendant fails the tree.
    Fail,
}

/// A runtime-managed descendant that was not expanded structurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBranch {
    pub os_pid: u32,
    pub runtime_pid: i32,
    /// Group leaders get the signal through the runtime; other members are
    /// left to their leader.
    pub group_leader: bool,
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Discovery order; `pids[0]` is the root.
    pub pids: Vec<u32>,
    pub runtime_branches: Vec<RuntimeBranch>,
    /// Capacity was reached before the traversal converged.
    pub truncated: bool,
}

#[derive(Debug)]
pub enum Outcome {
    Terminated(Technique),
    AlreadyExited,
    Unopenable(KillError),
    Failed(KillError),
}

#[derive(Debug)]
pub struct EntryOutcome {
    pub pid: u32,
    pub outcome: Outcome,
}

/// Result of a tree teardown; `outcomes` is in teardown order.
#[derive(Debug)]
pub struct TreeReport {
    pub outcomes: Vec<EntryOutcome>,
    pub runtime_branches: Vec<RuntimeBranch>,
    pub truncated: bool,
    policy: UnopenablePolicy,
}

impl TreeReport {
    pub fn teardown_order(&self) -> Vec<u32> {
        self.outcomes.iter().map(|entry| entry.pid).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|entry| match entry.outcome {
            Outcome::Terminated(_) | Outcome::AlreadyExited => true,
            Outcome::Unopenable(_) => self.policy == UnopenablePolicy::Skip,
            Outcome::Failed(_) => false,
        })
    }

    pub fn terminated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| matches!(entry.outcome, Outcome::Terminated(_)))
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &KillError> {
        self.outcomes.iter().filter_map(|entry| match &entry.outcome {
            Outcome::Failed(err) => Some(err),
            Outcome::Unopenable(err) if self.policy == UnopenablePolicy::Fail => Some(err),
            _ => None,
        })
    }
}

/// Opens `pid` with injection rights, falling back to terminate-only.
pub fn open_with_fallback<S: ProcessSystem>(system: &S, pid: u32) -> Result<S::Process, KillError> {
    system
        .open_process(pid, AccessTier::Full)
        .or_else(|err| {
            debug!(pid, error = %err, "full access denied, retrying terminate-only");
            system.open_process(pid, AccessTier::TerminateOnly)
        })
        .map_err(|source| KillError::Open { pid, source })
}

pub struct ProcessTreeWalker<'a, S, O, R> {
    terminator: ProcessTerminator<'a, S, O>,
    runtime: &'a R,
    capacity: usize,
    policy: UnopenablePolicy,
}

impl<'a, S, O, R> ProcessTreeWalker<'a, S, O, R>
where
    S: ProcessSystem,
    O: AddressOracle,
    R: RuntimeDirectory,
{
    pub fn new(terminator: ProcessTerminator<'a, S, O>, runtime: &'a R) -> Self {
        Self {
            terminator,
            runtime,
            capacity: DEFAULT_TREE_CAPACITY,
            policy: UnopenablePolicy::default(),
        }
    }

    /// Capacity includes the root; values below 1 are treated as 1.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_policy(mut self, policy: UnopenablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Collects the root and its live descendants. Runtime group leaders
    /// found on the way are signalled through the runtime instead.
    pub fn discover(&self, root_pid: u32, request: TerminationRequest) -> Discovery {
        let mut pids = vec![root_pid];
        let mut members: HashSet<u32> = HashSet::from([root_pid]);
        let mut runtime_branches = Vec::new();
        let mut absorbed: HashSet<u32> = HashSet::new();
        let signal = request.signal().map(|signal| signal.number()).unwrap_or(0);

        let snapshot = match self.terminator.system().snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(root_pid, error = %err, "process snapshot failed, handling root only");
                return Discovery {
                    pids,
                    runtime_branches,
                    truncated: false,
                };
            }
        };

        loop {
            let before = pids.len();
            for entry in &snapshot {
                if pids.len() >= self.capacity {
                    break;
                }
                if members.contains(&entry.pid)
                    || absorbed.contains(&entry.pid)
                    || !members.contains(&entry.parent_pid)
                {
                    continue;
                }

                if let Some(runtime_pid) = self.runtime.runtime_pid(entry.pid) {
                    absorbed.insert(entry.pid);
                    let group_leader = self.runtime.process_group(runtime_pid) == Some(runtime_pid);
                    let delivered = group_leader && self.deliver(runtime_pid, signal);
                    runtime_branches.push(RuntimeBranch {
                        os_pid: entry.pid,
                        runtime_pid,
                        group_leader,
                        delivered,
                    });
                    continue;
                }

                debug!(pid = entry.pid, parent = entry.parent_pid, "found descendant");
                members.insert(entry.pid);
                pids.push(entry.pid);
            }

            if pids.len() == before || pids.len() >= self.capacity {
                break;
            }
        }

        // Truncated only if something reachable was actually left behind.
        let truncated = pids.len() >= self.capacity
            && snapshot.iter().any(|entry| {
                members.contains(&entry.parent_pid)
                    && !members.contains(&entry.pid)
                    && !absorbed.contains(&entry.pid)
            });
        if truncated {
            warn!(
                root_pid,
                capacity = self.capacity,
                "process tree exceeds capacity, remaining descendants are left alone"
            );
        }

        Discovery {
            pids,
            runtime_branches,
            truncated,
        }
    }

    fn deliver(&self, runtime_pid: i32, signal: u8) -> bool {
        match self.runtime.deliver_signal(runtime_pid, signal) {
            Ok(()) => {
                info!(runtime_pid, signal, "delegated signal to runtime process group");
                true
            }
            Err(err) => {
                warn!(runtime_pid, signal, error = %err, "runtime signal delivery failed");
                false
            }
        }
    }

    /// Terminates `root` and every descendant, children before parents.
    ///
    /// `root` is borrowed from the caller and is terminated last.
    pub fn terminate_tree(&self, root: &S::Process, request: TerminationRequest) -> TreeReport {
        let discovery = self.discover(root.pid(), request);
        let mut outcomes = Vec::with_capacity(discovery.pids.len());

        for (index, &pid) in discovery.pids.iter().enumerate().rev() {
            let outcome = if index == 0 {
                self.terminate_live(root, request)
            } else {
                match open_with_fallback(self.terminator.system(), pid) {
                    // The handle is closed at the end of this arm.
                    Ok(process) => self.terminate_live(&process, request),
                    Err(err) => {
                        debug!(pid, error = %err, "cannot open descendant, skipping");
                        Outcome::Unopenable(err)
                    }
                }
            };
            outcomes.push(EntryOutcome { pid, outcome });
        }

        TreeReport {
            outcomes,
            runtime_branches: discovery.runtime_branches,
            truncated: discovery.truncated,
            policy: self.policy,
        }
    }

    fn terminate_live(&self, process: &S::Process, request: TerminationRequest) -> Outcome {
        match self.terminator.system().is_running(process) {
            Ok(false) => {
                debug!(pid = process.pid(), "already exited");
                return Outcome::AlreadyExited;
            }
            Ok(true) => {}
            // Terminate-only handles cannot query the exit code.
            Err(err) => debug!(pid = process.pid(), error = %err, "liveness unknown"),
        }
        match self.terminator.terminate(process, request) {
            Ok(technique) => Outcome::Terminated(technique),
            Err(err) => Outcome::Failed(err),
        }
    }
}
