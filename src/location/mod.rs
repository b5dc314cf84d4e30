//! Defines the [`Location`] value type and the [`Backend`] trait every
//! adapter implements.

mod folder;
mod ftp;
mod spec;
mod zip_archive;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

pub use folder::FolderBackend;
pub use ftp::FtpBackend;
pub use spec::parse_spec;
pub use zip_archive::ZipBackend;

use crate::error::Result;

/// A relative, forward-slash-normalized file path, stable across backends.
pub type RelPath = String;

/// Seconds since the Unix epoch, as reported by a backend. Fractional because
/// some backends (local filesystem) report sub-second precision.
pub type Mtime = f64;

/// One synchronized endpoint: a local directory, a ZIP archive, or an FTP
/// server rooted at a remote directory.
///
/// Two locations are identical iff their variant and all fields match;
/// [`Location`] derives `PartialEq`/`Eq`/`Hash` for exactly this purpose, and
/// `Clone` because it is cheaply duplicated into every adapter/event that
/// references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// An existing directory on the local filesystem.
    Folder {
        /// Absolute path to the root directory.
        path: PathBuf,
    },
    /// An existing `.zip` archive file.
    Zip {
        /// Absolute path to the archive.
        path: PathBuf,
    },
    /// An FTP endpoint with a base remote directory.
    Ftp {
        /// Server hostname or address.
        host: String,
        /// Login username.
        username: String,
        /// Login password (plaintext, per RFC 959 — no other auth is supported).
        password: String,
        /// Base remote directory; always begins with `/`.
        remote_path: String,
    },
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Folder { path } => write!(f, "folder:{}", path.display()),
            Location::Zip { path } => write!(f, "zip:{}", path.display()),
            Location::Ftp { host, remote_path, .. } => write!(f, "ftp:{host}{remote_path}"),
        }
    }
}

/// A location's complete file set at an instant: `RelPath -> mtime`. The
/// owning [`Location`] is implicit (snapshots are always taken of one
/// location and never mixed).
pub type Snapshot = HashMap<RelPath, Mtime>;

/// Uniform list/read/write/delete contract implemented by each backend.
///
/// Watchers only ever call [`Backend::list`]; `read`/`write`/`delete` are
/// reserved for the coordinator's apply phase (§4.E of the design).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Enumerates every regular file reachable under this location,
    /// recursively. Must not panic on a backend error — return a partial
    /// snapshot and log instead (see [`crate::error::Error::AdapterFatal`]).
    async fn list(&self) -> Snapshot;

    /// Returns the full contents of `rel_path`.
    async fn read(&self, rel_path: &str) -> Result<Vec<u8>>;

    /// Overwrites or creates `rel_path` with `bytes`, atomically with respect
    /// to a concurrent `list`/`read` of the same path.
    async fn write(&self, rel_path: &str, bytes: &[u8]) -> Result<()>;

    /// Removes `rel_path`. Succeeds silently if it is already absent.
    async fn delete(&self, rel_path: &str) -> Result<()>;

    /// The [`Location`] this backend was constructed from, for logging and
    /// for identifying the "winner" location in an event batch.
    fn location(&self) -> &Location;
}

/// Constructs the concrete [`Backend`] implementation for a [`Location`].
pub fn open(location: Location) -> Box<dyn Backend> {
    match location {
        Location::Folder { .. } => Box::new(FolderBackend::new(location)),
        Location::Zip { .. } => Box::new(ZipBackend::new(location)),
        Location::Ftp { .. } => Box::new(FtpBackend::new(location)),
    }
}

/// Normalizes a native path component sequence into a forward-slash
/// [`RelPath`], matching the spec's backend boundary requirement: backends
/// convert to/from native separators, but the engine only ever sees `/`.
pub fn to_rel_path(path: &std::path::Path) -> RelPath {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
