use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdraftError {
    #[error("invalid name '{0}': must not be empty or contain path separators or '..'")]
    InvalidName(String),

    #[error("invalid force scope: {0}")]
    InvalidScope(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("history store error: {0}")]
    History(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    SelfUpdate(#[from] SelfUpdateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for UpdraftError {
    fn from(e: rusqlite::Error) -> Self {
        UpdraftError::History(e.to_string())
    }
}

/// Failures of a single resumable fetch. The partial file is left on disk
/// for every variant so the next attempt can resume.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed Content-Range '{0}'")]
    BadContentRange(String),

    #[error("transfer incomplete: {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("digest mismatch for {path}: expected {expected}, got {actual}")]
    Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("i/o error while hashing: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("artifact is not a readable archive: {0}")]
    InvalidArchive(String),

    #[error("failed to back up {install} to {backup}: {source}")]
    Backup {
        install: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction failed (previous install kept at {backup:?}): {reason}")]
    Extract {
        backup: Option<PathBuf>,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SelfUpdateError {
    #[error("cannot locate running executable: {0}")]
    CurrentExe(std::io::Error),

    #[error("download of new executable failed: {0}")]
    Download(#[from] TransferError),

    #[error("failed to move {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to relaunch {exe}: {source}")]
    Relaunch {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UpdraftError>;
