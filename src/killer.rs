//! Entry point tying the engine together
//!
//! `GentleKiller` owns the process system, the address resolver (and with it
//! the address cache) and the runtime directory, so repeated calls share the
//! cache.

use crate::config::KillConfig;
use crate::core::injector::RemoteInjector;
use crate::core::oracle::AddressOracle;
use crate::core::process_tree::{
    open_with_fallback, ProcessTreeWalker, TreeReport, UnopenablePolicy, DEFAULT_TREE_CAPACITY,
};
use crate::core::resolver::AddressResolver;
use crate::core::terminator::{ProcessTerminator, Technique};
use crate::error::KillResult;
use crate::platform::ProcessSystem;
use crate::runtime::RuntimeDirectory;
use crate::signal::TerminationRequest;
use std::time::Duration;

pub struct GentleKiller<S, O, R> {
    system: S,
    resolver: AddressResolver<O>,
    runtime: R,
    injector: RemoteInjector,
    capacity: usize,
    policy: UnopenablePolicy,
}

impl<S, O, R> GentleKiller<S, O, R>
where
    S: ProcessSystem,
    O: AddressOracle,
    R: RuntimeDirectory,
{
    pub fn new(system: S, oracle: O, runtime: R) -> Self {
        Self {
            system,
            resolver: AddressResolver::new(oracle),
            runtime,
            injector: RemoteInjector::default(),
            capacity: DEFAULT_TREE_CAPACITY,
            policy: UnopenablePolicy::default(),
        }
    }

    /// Applies the `[injection]` and `[tree]` sections.
    pub fn configured(system: S, oracle: O, runtime: R, config: &KillConfig) -> Self {
        Self::new(system, oracle, runtime)
            .with_injection_timeout(config.injection_timeout())
            .with_capacity(config.tree.capacity)
            .with_policy(config.tree.unopenable)
    }

    pub fn with_injection_timeout(mut self, timeout: Duration) -> Self {
        self.injector = RemoteInjector::new(timeout);
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_policy(mut self, policy: UnopenablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn resolver(&self) -> &AddressResolver<O> {
        &self.resolver
    }

    fn terminator(&self) -> ProcessTerminator<'_, S, O> {
        ProcessTerminator::new(&self.system, &self.resolver, self.injector)
    }

    fn walker(&self) -> ProcessTreeWalker<'_, S, O, R> {
        ProcessTreeWalker::new(self.terminator(), &self.runtime)
            .with_capacity(self.capacity)
            .with_policy(self.policy)
    }

    /// Terminates one process through its technique chain.
    pub fn terminate_process(
        &self,
        process: &S::Process,
        request: TerminationRequest,
    ) -> KillResult<Technique> {
        self.terminator().terminate(process, request)
    }

    /// Terminates `root` and all of its descendants, root last.
    pub fn terminate_tree(&self, root: &S::Process, request: TerminationRequest) -> TreeReport {
        self.walker().terminate_tree(root, request)
    }

    /// Like [`Self::terminate_process`], opening `pid` first.
    pub fn kill_pid(&self, pid: u32, request: TerminationRequest) -> KillResult<Technique> {
        let process = open_with_fallback(&self.system, pid)?;
        self.terminate_process(&process, request)
    }

    /// Like [`Self::terminate_tree`], opening `pid` first.
    pub fn kill_tree(&self, pid: u32, request: TerminationRequest) -> KillResult<TreeReport> {
        let root = open_with_fallback(&self.system, pid)?;
        Ok(self.terminate_tree(&root, request))
    }
}

#[cfg(windows)]
mod win32 {
    use super::GentleKiller;
    use crate::config::KillConfig;
    use crate::core::oracle::HelperProcessOracle;
    use crate::platform::Win32System;
    use crate::runtime::StandaloneRuntime;

    impl GentleKiller<Win32System, HelperProcessOracle, StandaloneRuntime> {
        /// The live Win32 backend with helper executables from `config`.
        pub fn win32(config: &KillConfig) -> Self {
            Self::configured(
                Win32System,
                HelperProcessOracle::from_config(config),
                StandaloneRuntime,
                config,
            )
        }
    }
}
