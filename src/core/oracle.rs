//! Helper-process address oracle
//!
//! `CtrlRoutine` is an internal kernel32 function, and a foreign-bitness
//! kernel32 is not mapped into this process at all. Both cases are answered by
//! a small helper executable built for the right architecture: it is started
//! as `<helper> --get-address-of <Routine>` and prints one hexadecimal address
//! on stdout.

use crate::config::KillConfig;
use crate::core::models::{HelperVariant, Routine, RoutineAddress};
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Hard cap on the address line, newline excluded.
pub const MAX_ADDRESS_LINE: usize = 63;

/// Answers "where is `routine` in a process of this architecture".
///
/// `None` means unresolvable; callers fall through to the next technique.
#[cfg_attr(test, mockall::automock)]
pub trait AddressOracle {
    fn query(&self, routine: Routine, variant: HelperVariant) -> Option<RoutineAddress>;
}

/// Oracle backed by the `gentle-kill-helper` executables.
#[derive(Debug, Clone)]
pub struct HelperProcessOracle {
    native_helper: PathBuf,
    foreign_helper: Option<PathBuf>,
    timeout: Duration,
    alloc_console: bool,
}

impl HelperProcessOracle {
    pub fn new(native_helper: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            native_helper: native_helper.into(),
            foreign_helper: None,
            timeout,
            alloc_console: false,
        }
    }

    pub fn with_foreign_helper(mut self, path: Option<PathBuf>) -> Self {
        self.foreign_helper = path;
        self
    }

    /// Ask the helper to allocate its own console before raising Ctrl-Break.
    pub fn with_alloc_console(mut self, alloc_console: bool) -> Self {
        self.alloc_console = alloc_console;
        self
    }

    pub fn from_config(config: &KillConfig) -> Self {
        Self::new(config.native_helper_path(), config.oracle_timeout())
            .with_foreign_helper(config.foreign_helper_path())
            .with_alloc_console(config.oracle.alloc_console)
    }

    fn helper_for(&self, variant: HelperVariant) -> Option<&PathBuf> {
        match variant {
            HelperVariant::Native => Some(&self.native_helper),
            HelperVariant::Foreign => self.foreign_helper.as_ref(),
        }
    }

    fn spawn(&self, helper: &PathBuf, routine: Routine) -> io::Result<Child> {
        let mut command = Command::new(helper);
        command
            .arg("--get-address-of")
            .arg(routine.symbol())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if self.alloc_console {
            command.arg("--alloc-console");
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};

            // Hidden, and in its own group so its Ctrl-Break stays local.
            command.creation_flags(CREATE_NO_WINDOW.0 | CREATE_NEW_PROCESS_GROUP.0);
        }

        command.spawn()
    }
}

impl AddressOracle for HelperProcessOracle {
    fn query(&self, routine: Routine, variant: HelperVariant) -> Option<RoutineAddress> {
        let Some(helper) = self.helper_for(variant) else {
            debug!(%routine, ?variant, "no helper configured for variant");
            return None;
        };
        if !helper.is_file() {
            debug!(%routine, helper = %helper.display(), "helper executable not found");
            return None;
        }

        let mut child = match self.spawn(helper, routine) {
            Ok(child) => child,
            Err(err) => {
                warn!(%routine, helper = %helper.display(), error = %err, "failed to launch helper");
                return None;
            }
        };
        // Our copy of the write end is gone once `spawn` returns, so EOF is
        // observed as soon as the helper exits.
        let stdout = child.stdout.take()?;

        let (tx, rx) = mpsc::channel();
        // If the helper leaves a grandchild holding the write end, this
        // reader stays blocked after a timeout and is left detached; the
        // caller still returns once `recv_timeout` expires.
        thread::spawn(move || {
            let _ = tx.send(read_address_line(stdout));
        });

        let line = match rx.recv_timeout(self.timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(err)) => {
                debug!(%routine, error = %err, "reading helper output failed");
                String::new()
            }
            Err(_) => {
                warn!(%routine, timeout = ?self.timeout, "helper did not answer in time");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        };
        // Reap if it already exited; a lingering helper is left detached.
        let _ = child.try_wait();

        let address = parse_address(&line);
        debug!(%routine, ?variant, ?address, "helper answered");
        address
    }
}

/// Reads up to [`MAX_ADDRESS_LINE`] bytes, stopping at the first newline or EOF.
pub fn read_address_line<R: Read>(reader: R) -> io::Result<String> {
    let mut line = Vec::with_capacity(MAX_ADDRESS_LINE);
    for byte in BufReader::new(reader).bytes() {
        let byte = byte?;
        if byte == b'\n' {
            break;
        }
        line.push(byte);
        if line.len() >= MAX_ADDRESS_LINE {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Parses `%p`-style output: hex digits with an optional `0x` prefix.
pub fn parse_address(line: &str) -> Option<RoutineAddress> {
    let trimmed = line.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16)
        .ok()
        .and_then(RoutineAddress::new)
}
