//! Address oracle and handshake helper
//!
//! `gentle-kill-helper --get-address-of <ExitProcess|CtrlRoutine> [--alloc-console]`
//! prints the routine's address in this process as one hex line. One build per
//! architecture is shipped so that foreign-bitness targets can be answered.
//!
//! `gentle-kill-helper <signal-handle> <wait-handle>` signals the first
//! inherited event and then blocks on the second handle.

use clap::Parser;
use gentle_kill::core::models::Routine;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "gentle-kill-helper", version, about = "Routine address oracle for gentle-kill")]
struct HelperCli {
    /// Print the address of ExitProcess or CtrlRoutine
    #[arg(long = "get-address-of", value_name = "ROUTINE")]
    get_address_of: Option<String>,

    /// Detach from the inherited console and allocate a fresh one first
    #[arg(long, requires = "get_address_of")]
    alloc_console: bool,

    /// Inherited handle values: event to signal, then object to wait on
    #[arg(
        value_name = "HANDLE",
        num_args = 0..=2,
        conflicts_with = "get_address_of",
        value_parser = parse_handle
    )]
    handles: Vec<u64>,
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(not(windows), allow(dead_code))]
enum Mode {
    Address { routine: Routine, alloc_console: bool },
    Handshake { signal: u64, wait: u64 },
}

impl HelperCli {
    fn mode(&self) -> Result<Mode, String> {
        if let Some(name) = &self.get_address_of {
            let routine =
                Routine::from_symbol(name).ok_or_else(|| format!("Unhandled function name: {name}"))?;
            return Ok(Mode::Address {
                routine,
                alloc_console: self.alloc_console,
            });
        }
        match self.handles[..] {
            [signal, wait] => Ok(Mode::Handshake { signal, wait }),
            _ => Err("expected --get-address-of or two handle values".to_string()),
        }
    }
}

/// Handle values are passed as decimal or `0x` hex.
fn parse_handle(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid handle value '{value}': {err}"))
}

/// `%p`-style: upper-case hex, zero padded to pointer width.
#[cfg_attr(not(windows), allow(dead_code))]
fn format_address(address: u64) -> String {
    format!("{:0width$X}", address, width = std::mem::size_of::<usize>() * 2)
}

fn main() -> ExitCode {
    let cli = match HelperCli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let mode = match cli.mode() {
        Ok(mode) => mode,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(1);
        }
    };
    match run(mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

#[cfg(not(windows))]
fn run(mode: Mode) -> Result<(), String> {
    Err(format!("{mode:?} is only available on Windows"))
}

#[cfg(windows)]
fn run(mode: Mode) -> Result<(), String> {
    match mode {
        Mode::Address {
            routine,
            alloc_console,
        } => {
            if alloc_console {
                win32::fresh_console()?;
            }
            match routine {
                Routine::ExitProcess => win32::print_exit_process(),
                Routine::CtrlRoutine => win32::print_ctrl_routine(),
            }
        }
        Mode::Handshake { signal, wait } => win32::handshake(signal, wait),
    }
}

#[cfg(windows)]
mod win32 {
    use super::format_address;
    use std::ffi::c_void;
    use std::io::Write;
    use std::mem;
    use std::time::Duration;
    use windows::core::{s, w, PCSTR};
    use windows::Win32::Foundation::{BOOL, ERROR_INVALID_PARAMETER, FALSE, HANDLE};
    use windows::Win32::System::Console::{
        AllocConsole, FreeConsole, GenerateConsoleCtrlEvent, SetConsoleCtrlHandler,
        CTRL_BREAK_EVENT,
    };
    use windows::Win32::System::Diagnostics::Debug::{
        RtlCaptureStackBackTrace, SymCleanup, SymFromAddrW, SymInitialize, SYMBOL_INFOW,
    };
    use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
    use windows::Win32::System::Threading::{
        GetCurrentProcess, SetEvent, WaitForSingleObject, INFINITE,
    };

    const MAX_SYM_NAME: usize = 2000;

    /// How long to wait for the Ctrl-Break handler to print and exit.
    const HANDLER_GRACE: Duration = Duration::from_secs(1);

    fn emit(address: u64) -> Result<(), String> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", format_address(address))
            .and_then(|()| stdout.flush())
            .map_err(|err| format!("Could not write address: {err}"))
    }

    pub fn fresh_console() -> Result<(), String> {
        if let Err(err) = unsafe { FreeConsole() } {
            if err.code() != ERROR_INVALID_PARAMETER.to_hresult() {
                return Err(format!("Could not detach from current Console: {err}"));
            }
        }
        unsafe { AllocConsole() }.map_err(|err| format!("Could not allocate a new Console: {err}"))
    }

    pub fn print_exit_process() -> Result<(), String> {
        let kernel32 = unsafe { GetModuleHandleW(w!("kernel32")) }
            .map_err(|err| format!("kernel32 not loaded: {err}"))?;
        let address = unsafe { GetProcAddress(kernel32, s!("ExitProcess")) }
            .ok_or_else(|| "ExitProcess not exported".to_string())?;
        emit(address as usize as u64)
    }

    /// Installs a handler, raises Ctrl-Break on our own group and lets the
    /// handler report the routine it was called from. `CtrlRoutine` is not
    /// exported, so the caller frame plus symbol lookup is the only way in.
    pub fn print_ctrl_routine() -> Result<(), String> {
        unsafe { SetConsoleCtrlHandler(Some(ctrl_handler), true) }
            .map_err(|err| format!("Could not register Ctrl handler: {err}"))?;
        unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, 0) }
            .map_err(|err| format!("Could not simulate Ctrl+Break: {err}"))?;

        // The handler exits the process on success.
        std::thread::sleep(HANDLER_GRACE);
        Err("Ctrl handler did not report an address".to_string())
    }

    unsafe extern "system" fn ctrl_handler(_ctrl_type: u32) -> BOOL {
        let mut caller: *mut c_void = std::ptr::null_mut();
        // Frame 0 is this handler; frame 1 is inside CtrlRoutine.
        let count = unsafe { RtlCaptureStackBackTrace(1, 1, &mut caller, None) };
        if count != 1 {
            eprintln!("Could not capture backtrace (count = {count})");
            return FALSE;
        }

        match routine_start(caller as usize as u64) {
            Ok(address) => {
                if let Err(message) = emit(address) {
                    eprintln!("{message}");
                    return FALSE;
                }
                std::process::exit(0);
            }
            Err(message) => {
                eprintln!("{message}");
                FALSE
            }
        }
    }

    /// Start address of the symbol containing `address`.
    fn routine_start(address: u64) -> Result<u64, String> {
        let process = unsafe { GetCurrentProcess() };
        unsafe { SymInitialize(process, PCSTR::null(), true) }
            .map_err(|err| format!("Could not initialize symbols: {err}"))?;

        // SYMBOL_INFOW ends in a one-element name array; reserve room for
        // the full name behind it, u64-aligned.
        let bytes = mem::size_of::<SYMBOL_INFOW>() + MAX_SYM_NAME * mem::size_of::<u16>();
        let mut buffer = vec![0u64; bytes.div_ceil(mem::size_of::<u64>())];
        let info = buffer.as_mut_ptr().cast::<SYMBOL_INFOW>();
        let mut displacement = 0u64;

        let result = unsafe {
            (*info).SizeOfStruct = mem::size_of::<SYMBOL_INFOW>() as u32;
            (*info).MaxNameLen = MAX_SYM_NAME as u32;
            SymFromAddrW(process, address, Some(&mut displacement), info)
                .map(|()| (*info).Address)
        };
        let _ = unsafe { SymCleanup(process) };
        result.map_err(|err| format!("Could not get symbol info: {err}"))
    }

    pub fn handshake(signal: u64, wait: u64) -> Result<(), String> {
        let signal = HANDLE(signal as isize);
        let wait = HANDLE(wait as isize);
        unsafe { SetEvent(signal) }.map_err(|err| format!("Could not signal event: {err}"))?;
        unsafe { WaitForSingleObject(wait, INFINITE) };
        Ok(())
    }
}
