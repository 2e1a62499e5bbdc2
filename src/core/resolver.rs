//! Routine address resolution for (possibly foreign-bitness) targets

use crate::core::models::{BitnessClass, HelperVariant, Routine, RoutineAddress};
use crate::core::oracle::AddressOracle;
use crate::platform::{ProcessRef, ProcessSystem};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

/// Resolves `ExitProcess`/`CtrlRoutine` entry points for target processes.
///
/// Successful resolutions are cached per `(Routine, BitnessClass)`: the
/// system library sits at the same base in every process of one bitness, so
/// the address never needs to be looked up twice. Failures are not cached.
pub struct AddressResolver<O> {
    oracle: O,
    current_is_wow64: OnceLock<Option<bool>>,
    cache: Mutex<HashMap<(Routine, BitnessClass), RoutineAddress>>,
}

impl<O: AddressOracle> AddressResolver<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            current_is_wow64: OnceLock::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bitness of `target` relative to this process, or `None` if either
    /// WOW64 query fails.
    pub fn bitness_of<S: ProcessSystem>(
        &self,
        system: &S,
        target: &S::Process,
    ) -> Option<BitnessClass> {
        let current = *self
            .current_is_wow64
            .get_or_init(|| system.current_is_wow64().ok());
        let current = current?;
        match system.is_wow64(target) {
            Ok(target_is_wow64) => Some(BitnessClass::from_wow64(current, target_is_wow64)),
            Err(err) => {
                debug!(pid = target.pid(), error = %err, "cannot determine target bitness");
                None
            }
        }
    }

    pub fn resolve<S: ProcessSystem>(
        &self,
        system: &S,
        target: &S::Process,
        routine: Routine,
    ) -> Option<RoutineAddress> {
        let class = self.bitness_of(system, target)?;

        if let Some(address) = self.cache.lock().get(&(routine, class)).copied() {
            return Some(address);
        }

        let address = match (routine, class) {
            (Routine::ExitProcess, BitnessClass::Native) => system.local_routine_address(routine),
            // CtrlRoutine is not exported; foreign kernel32 is not mapped here.
            _ => self.oracle.query(routine, HelperVariant::from(class)),
        }?;

        debug!(pid = target.pid(), %routine, ?class, %address, "resolved routine address");
        self.cache.lock().insert((routine, class), address);
        Some(address)
    }

    pub fn cached(&self, routine: Routine, class: BitnessClass) -> Option<RoutineAddress> {
        self.cache.lock().get(&(routine, class)).copied()
    }
}
