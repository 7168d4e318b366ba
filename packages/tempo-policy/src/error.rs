//! Error types for the Tempo policy engine

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Profile record for '{app}' not found: {path}")]
    ProfileNotFound { app: String, path: PathBuf },

    #[error("Profile record for '{app}' is malformed: {reason}")]
    ProfileMalformed { app: String, reason: String },

    #[error("Slowdown table has no entry for '{0}'")]
    SlowdownMissing(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PolicyError {
    pub(crate) fn malformed(app: &str, reason: impl Into<String>) -> Self {
        PolicyError::ProfileMalformed {
            app: app.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolicyError>;
