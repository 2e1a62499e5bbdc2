//! Single-process termination: an ordered chain of techniques per signal
//!
//! | signal  | chain                                              |
//! |---------|----------------------------------------------------|
//! | SIGINT  | Ctrl-C injection, `ExitProcess` injection, forcible |
//! | SIGQUIT | Ctrl-Break injection, `ExitProcess` injection, forcible |
//! | SIGTERM | `ExitProcess` injection, forcible                   |
//! | other   | forcible                                           |
//!
//! Only the failure of `TerminateProcess` is reported; every earlier
//! technique failing just moves on to the next one.

use crate::core::injector::RemoteInjector;
use crate::core::models::{ConsoleEvent, Routine};
use crate::core::oracle::AddressOracle;
use crate::core::resolver::AddressResolver;
use crate::error::{KillError, KillResult};
use crate::platform::{ProcessRef, ProcessSystem};
use crate::signal::{Signal, TerminationRequest};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    /// Inject `CtrlRoutine` with a console event code.
    ConsoleControl(ConsoleEvent),
    /// Inject `ExitProcess` with the encoded status.
    GentleExit,
    /// `TerminateProcess` with the encoded status.
    Forcible,
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technique::ConsoleControl(ConsoleEvent::CtrlC) => f.write_str("Ctrl-C injection"),
            Technique::ConsoleControl(ConsoleEvent::CtrlBreak) => {
                f.write_str("Ctrl-Break injection")
            }
            Technique::GentleExit => f.write_str("ExitProcess injection"),
            Technique::Forcible => f.write_str("TerminateProcess"),
        }
    }
}

/// Techniques to try, in order, for `signal`. Always ends with `Forcible`.
pub fn technique_chain(signal: Option<Signal>) -> &'static [Technique] {
    const INT: &[Technique] = &[
        Technique::ConsoleControl(ConsoleEvent::CtrlC),
        Technique::GentleExit,
        Technique::Forcible,
    ];
    const QUIT: &[Technique] = &[
        Technique::ConsoleControl(ConsoleEvent::CtrlBreak),
        Technique::GentleExit,
        Technique::Forcible,
    ];
    const TERM: &[Technique] = &[Technique::GentleExit, Technique::Forcible];
    const OTHER: &[Technique] = &[Technique::Forcible];

    match signal {
        Some(Signal::Int) => INT,
        Some(Signal::Quit) => QUIT,
        Some(Signal::Term) => TERM,
        _ => OTHER,
    }
}

/// Terminates one process. Holds no state between calls apart from the
/// resolver's address cache.
pub struct ProcessTerminator<'a, S, O> {
    system: &'a S,
    resolver: &'a AddressResolver<O>,
    injector: RemoteInjector,
}

impl<'a, S, O> ProcessTerminator<'a, S, O>
where
    S: ProcessSystem,
    O: AddressOracle,
{
    pub fn new(system: &'a S, resolver: &'a AddressResolver<O>, injector: RemoteInjector) -> Self {
        Self {
            system,
            resolver,
            injector,
        }
    }

    pub fn system(&self) -> &'a S {
        self.system
    }

    /// Returns the technique that took effect.
    pub fn terminate(
        &self,
        process: &S::Process,
        request: TerminationRequest,
    ) -> KillResult<Technique> {
        let pid = process.pid();
        for &technique in technique_chain(request.signal()) {
            let done = match technique {
                Technique::ConsoleControl(event) => {
                    self.inject(process, Routine::CtrlRoutine, event.code())
                }
                Technique::GentleExit => {
                    self.inject(process, Routine::ExitProcess, request.exit_code())
                }
                Technique::Forcible => break,
            };
            if done {
                info!(pid, %request, "terminated via {technique}");
                return Ok(technique);
            }
        }

        self.system
            .terminate(process, request.exit_code())
            .map_err(|source| KillError::Terminate { pid, source })?;
        info!(pid, %request, "terminated via {}", Technique::Forcible);
        Ok(Technique::Forcible)
    }

    fn inject(&self, process: &S::Process, routine: Routine, argument: u32) -> bool {
        let pid = process.pid();
        let Some(address) = self.resolver.resolve(self.system, process, routine) else {
            debug!(pid, %routine, "routine address unresolvable, falling through");
            return false;
        };
        match self.injector.inject(self.system, process, address, argument) {
            Ok(()) => true,
            Err(err) => {
                warn!(pid, %routine, error = %err, "injection failed, falling through");
                false
            }
        }
    }
}
