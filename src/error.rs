//! Error type shared by every [`crate::location::Location`] adapter and by the
//! synchronization engine itself.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode the engine and its adapters can produce.
///
/// Per-file failures (`NotFound`, `IoError`) are caught and logged by the
/// coordinator rather than propagated to the process; only a startup
/// misconfiguration (zero valid locations) is meant to terminate the binary.
#[derive(Debug, Error)]
pub enum Error {
    /// A location spec string did not match the `folder:`/`zip:`/`ftp:` grammar.
    #[error("invalid location specification: {0}")]
    SpecInvalid(String),

    /// `read` was called for a relative path that does not exist at the location.
    #[error("not found: {0}")]
    NotFound(String),

    /// A backend (filesystem, ZIP archive, FTP control/data connection) failed.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A location has become persistently unusable (e.g. archive corrupted,
    /// FTP host unreachable across retries). The watcher for it keeps running
    /// and reports empty snapshots rather than aborting the process.
    #[error("adapter fatal: {0}")]
    AdapterFatal(String),

    /// The user requested shutdown (SIGINT). Not a failure; used to unwind the
    /// cycle loop cleanly.
    #[error("stop requested")]
    StopRequested,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(e.to_string())
        } else {
            Error::IoError(e.to_string())
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::FileNotFound => Error::NotFound(e.to_string()),
            other => Error::IoError(other.to_string()),
        }
    }
}

impl From<suppaftp::FtpError> for Error {
    fn from(e: suppaftp::FtpError) -> Self {
        Error::IoError(e.to_string())
    }
}
