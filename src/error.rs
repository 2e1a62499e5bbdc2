//! Error types for the termination pipeline
//!
//! Only a small part of the pipeline can actually fail from the caller's point
//! of view: address resolution and injection failures are absorbed by the
//! technique chain, so they never surface as `KillError`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the public termination API.
#[derive(Error, Debug)]
pub enum KillError {
    /// `TerminateProcess` itself failed; the last technique in every chain.
    #[error("Failed to terminate process {pid}: {source}")]
    Terminate {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Neither full nor terminate-only rights could be obtained.
    #[error("Failed to open process {pid}: {source}")]
    Open {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),
}

impl KillError {
    pub fn pid(&self) -> Option<u32> {
        match self {
            KillError::Terminate { pid, .. } | KillError::Open { pid, .. } => Some(*pid),
            _ => None,
        }
    }
}

/// Why a remote thread could not be confirmed to have run.
#[derive(Error, Debug)]
pub enum InjectionError {
    #[error("CreateRemoteThread failed: {0}")]
    Spawn(#[source] io::Error),

    /// The thread may still complete later; only confirmation is missing.
    #[error("Remote thread did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Waiting for remote thread failed: {0}")]
    Wait(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

pub type KillResult<T> = Result<T, KillError>;
