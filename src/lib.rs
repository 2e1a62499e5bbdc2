//! gentle-kill
//!
//! POSIX-style signal delivery for Windows processes and process trees.
//! Each signal maps to a chain of techniques, from console-control injection
//! through `ExitProcess` injection down to `TerminateProcess`.

pub mod config;
pub mod core;
pub mod error;
pub mod killer;
pub mod platform;
pub mod runtime;
pub mod signal;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types for convenience
pub use crate::config::KillConfig;
pub use crate::core::models::*;
pub use crate::core::oracle::{AddressOracle, HelperProcessOracle};
pub use crate::core::process_tree::{Outcome, TreeReport, UnopenablePolicy};
pub use crate::core::terminator::{technique_chain, Technique};
pub use crate::error::{ConfigError, InjectionError, KillError, KillResult};
pub use crate::killer::GentleKiller;
pub use crate::runtime::{RuntimeDirectory, StandaloneRuntime};
pub use crate::signal::{Signal, TerminationRequest};
