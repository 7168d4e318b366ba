//! Error types for the Tempo runtime

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures writing frequency control files. Logged and tolerated: the run
/// continues with whatever frequency the OS governor picks, making results
/// approximate rather than invalid.
#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Permission denied writing {path}: please run as root")]
    PermissionDenied { path: PathBuf },

    #[error("Frequency control file not found: {path}")]
    PathMissing { path: PathBuf },

    #[error("IO error writing {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Failures reading a power rail or frequency file. Per-tick: the rail is
/// skipped for that tick only.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Failed to read sensor {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Sensor {path} returned unparseable data")]
    Parse { path: PathBuf },
}

/// Failures inside one worker's inference runtime. Isolated to the worker;
/// its result row carries null throughput, other workers continue.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load engine '{name}' from {path}: {reason}")]
    Load {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Batch execution failed for '{name}': {reason}")]
    Batch { name: String, reason: String },
}
