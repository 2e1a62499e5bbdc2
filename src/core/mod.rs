//! Termination engine
//!
//! Address resolution, remote injection, the per-signal technique chain and
//! the process tree walk.

pub mod injector;
pub mod models;
pub mod oracle;
pub mod process_tree;
pub mod resolver;
pub mod terminator;
