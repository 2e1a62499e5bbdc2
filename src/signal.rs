//! Signal numbers and the encoded termination status
//!
//! A termination status follows the POSIX wait-status convention used by the
//! runtime: the low 7 bits carry the signal number (0 = plain exit) and the
//! whole value is the exit code handed to the Win32 process-exit APIs.

use std::fmt;
use std::str::FromStr;

const SIGNAL_MASK: u32 = 0x7f;

/// POSIX signals the termination pipeline distinguishes.
///
/// Anything else is carried as `Other` and is always delivered by forcible
/// termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Int,
    Quit,
    Kill,
    Term,
    Other(u8),
}

impl Signal {
    pub const SIGINT: u8 = 2;
    pub const SIGQUIT: u8 = 3;
    pub const SIGKILL: u8 = 9;
    pub const SIGTERM: u8 = 15;

    pub fn from_number(number: u8) -> Self {
        match number {
            Self::SIGINT => Signal::Int,
            Self::SIGQUIT => Signal::Quit,
            Self::SIGKILL => Signal::Kill,
            Self::SIGTERM => Signal::Term,
            other => Signal::Other(other),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Signal::Int => Self::SIGINT,
            Signal::Quit => Self::SIGQUIT,
            Signal::Kill => Self::SIGKILL,
            Signal::Term => Self::SIGTERM,
            Signal::Other(number) => number,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Int => f.write_str("SIGINT"),
            Signal::Quit => f.write_str("SIGQUIT"),
            Signal::Kill => f.write_str("SIGKILL"),
            Signal::Term => f.write_str("SIGTERM"),
            Signal::Other(number) => write!(f, "signal {number}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSignalError(String);

impl fmt::Display for ParseSignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown signal '{}'", self.0)
    }
}

impl std::error::Error for ParseSignalError {}

/// Accepts `TERM`, `SIGTERM`, `term` or a number in `1..=127`.
impl FromStr for Signal {
    type Err = ParseSignalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            if number == 0 || u32::from(number) > SIGNAL_MASK {
                return Err(ParseSignalError(value.to_string()));
            }
            return Ok(Signal::from_number(number));
        }

        let upper = trimmed.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "INT" => Ok(Signal::Int),
            "QUIT" => Ok(Signal::Quit),
            "KILL" => Ok(Signal::Kill),
            "TERM" => Ok(Signal::Term),
            "HUP" => Ok(Signal::Other(1)),
            "ABRT" => Ok(Signal::Other(6)),
            _ => Err(ParseSignalError(value.to_string())),
        }
    }
}

/// Encoded exit status passed by value through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminationRequest(u32);

impl TerminationRequest {
    pub fn from_raw(status: u32) -> Self {
        Self(status)
    }

    /// The status a shell reports for a process killed by `signal`.
    pub fn for_signal(signal: Signal) -> Self {
        Self(128 + u32::from(signal.number()))
    }

    /// `None` when the low 7 bits are zero.
    pub fn signal(self) -> Option<Signal> {
        match (self.0 & SIGNAL_MASK) as u8 {
            0 => None,
            number => Some(Signal::from_number(number)),
        }
    }

    pub fn exit_code(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TerminationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal() {
            Some(signal) => write!(f, "{signal} (status {})", self.0),
            None => write!(f, "exit (status {})", self.0),
        }
    }
}
