//! FTP backend. Uses [`suppaftp::FtpStream`] (a blocking client) bridged into
//! async code via `tokio::task::spawn_blocking`, the pattern used throughout
//! the corpus for wrapping blocking network clients. Every operation opens
//! its own control connection and closes it when done — no pooling, per the
//! spec's resource policy.

use async_trait::async_trait;
use suppaftp::FtpStream;

use super::{Backend, Location, Snapshot};
use crate::error::{Error, Result};

pub struct FtpBackend {
    location: Location,
    host: String,
    username: String,
    password: String,
    remote_path: String,
}

impl FtpBackend {
    pub fn new(location: Location) -> Self {
        let (host, username, password, remote_path) = match &location {
            Location::Ftp { host, username, password, remote_path } => {
                (host.clone(), username.clone(), password.clone(), remote_path.clone())
            }
            _ => unreachable!("FtpBackend constructed from non-ftp Location"),
        };
        Self { location, host, username, password, remote_path }
    }

    fn remote(&self, rel_path: &str) -> String {
        format!("{}/{}", self.remote_path.trim_end_matches('/'), rel_path)
    }

    /// Creates every parent directory of `remote_path`, tolerating
    /// "already exists" replies, per §4.A.
    fn ensure_parents(stream: &mut FtpStream, remote_path: &str) {
        let Some((dir, _)) = remote_path.rsplit_once('/') else { return };
        if dir.is_empty() {
            return;
        }
        let mut built = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            built.push('/');
            built.push_str(segment);
            if let Err(e) = stream.mkdir(&built) {
                tracing::debug!(dir = %built, error = %e, "mkdir (tolerated, may already exist)");
            }
        }
    }

    /// Recursively lists `dir` into `out`, matching the spec's "walk via LIST,
    /// MDTM per file" protocol. Per-entry MDTM failures drop the entry
    /// silently (logged at `warn`) rather than failing the whole snapshot.
    fn list_dir(stream: &mut FtpStream, dir: &str, root: &str, out: &mut Snapshot) {
        let lines = match stream.list(Some(dir)) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(dir, error = %e, "LIST failed");
                return;
            }
        };

        for line in lines {
            let Some((is_dir, name)) = parse_unix_list_line(&line) else { continue };
            if name == "." || name == ".." {
                continue;
            }
            let child_path = format!("{}/{name}", dir.trim_end_matches('/'));

            if is_dir {
                Self::list_dir(stream, &child_path, root, out);
                continue;
            }

            match stream.mdtm(&child_path) {
                Ok(dt) => {
                    let rel = child_path
                        .strip_prefix(root)
                        .unwrap_or(&child_path)
                        .trim_start_matches('/')
                        .to_string();
                    out.insert(rel, dt.assume_utc().unix_timestamp() as f64);
                }
                Err(e) => {
                    tracing::warn!(path = %child_path, error = %e, "MDTM failed, omitting entry");
                }
            }
        }
    }
}

/// Opens a fresh control connection, logs in, and switches to binary mode.
/// Called once per operation; no connection pooling, per the spec's resource
/// policy.
fn connect_blocking(host: &str, username: &str, password: &str) -> Result<FtpStream> {
    let mut stream =
        FtpStream::connect(host).map_err(|e| Error::IoError(format!("connecting to {host}: {e}")))?;
    stream
        .login(username, password)
        .map_err(|e| Error::IoError(format!("logging in to {host}: {e}")))?;
    stream
        .transfer_type(suppaftp::types::FileType::Binary)
        .map_err(|e| Error::IoError(format!("setting binary mode: {e}")))?;
    Ok(stream)
}

/// Parses one line of a Unix-style `LIST` reply: `drwxr-xr-x ... name`.
/// Returns `(is_directory, name)`. The name is everything after the 8th
/// whitespace-separated field (permissions, links, owner, group, size,
/// month, day, time/year), joined back together to tolerate spaces in names.
fn parse_unix_list_line(line: &str) -> Option<(bool, String)> {
    let is_dir = line.starts_with('d');
    let mut fields = line.split_whitespace();
    for _ in 0..8 {
        fields.next()?;
    }
    let name: Vec<&str> = fields.collect();
    if name.is_empty() {
        return None;
    }
    Some((is_dir, name.join(" ")))
}

#[async_trait]
impl Backend for FtpBackend {
    async fn list(&self) -> Snapshot {
        let host = self.host.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        let remote_path = self.remote_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut out = Snapshot::new();
            match connect_blocking(&host, &username, &password) {
                Ok(mut stream) => {
                    FtpBackend::list_dir(&mut stream, &remote_path, &remote_path, &mut out);
                    let _ = stream.quit();
                }
                Err(e) => tracing::warn!(error = %e, "FTP connection failed during list"),
            }
            out
        })
        .await
        .unwrap_or_default()
    }

    async fn read(&self, rel_path: &str) -> Result<Vec<u8>> {
        let remote = self.remote(rel_path);
        let host = self.host.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || {
            let mut stream = connect_blocking(&host, &username, &password)?;
            let mut cursor = stream.retr_as_buffer(&remote).map_err(|e| match e {
                suppaftp::FtpError::UnexpectedResponse(_) => Error::NotFound(remote.clone()),
                other => Error::from(other),
            })?;
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut cursor, &mut buf)
                .map_err(|e| Error::IoError(format!("reading FTP transfer buffer: {e}")))?;
            let _ = stream.quit();
            Ok(buf)
        })
        .await
        .map_err(|e| Error::IoError(format!("ftp read task panicked: {e}")))?
    }

    async fn write(&self, rel_path: &str, bytes: &[u8]) -> Result<()> {
        let remote = self.remote(rel_path);
        let host = self.host.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut stream = connect_blocking(&host, &username, &password)?;
            FtpBackend::ensure_parents(&mut stream, &remote);
            let mut reader = std::io::Cursor::new(bytes);
            stream.put_file(&remote, &mut reader).map_err(Error::from)?;
            let _ = stream.quit();
            Ok(())
        })
        .await
        .map_err(|e| Error::IoError(format!("ftp write task panicked: {e}")))?
    }

    async fn delete(&self, rel_path: &str) -> Result<()> {
        let remote = self.remote(rel_path);
        let host = self.host.clone();
        let username = self.username.clone();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || {
            let mut stream = connect_blocking(&host, &username, &password)?;
            match stream.rm(&remote) {
                Ok(()) => {}
                Err(suppaftp::FtpError::UnexpectedResponse(_)) => {}
                Err(e) => return Err(Error::from(e)),
            }
            let _ = stream.quit();
            Ok(())
        })
        .await
        .map_err(|e| Error::IoError(format!("ftp delete task panicked: {e}")))?
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_directory_line() {
        let (is_dir, name) = parse_unix_list_line("drwxr-xr-x 2 user group 4096 Jan 1 2024 subdir").unwrap();
        assert!(is_dir);
        assert_eq!(name, "subdir");
    }

    #[test]
    fn parses_unix_file_line_with_spaces_in_name() {
        let (is_dir, name) =
            parse_unix_list_line("-rw-r--r-- 1 user group 123 Jan 1 12:00 my file.txt").unwrap();
        assert!(!is_dir);
        assert_eq!(name, "my file.txt");
    }

    #[test]
    fn rejects_short_lines() {
        assert!(parse_unix_list_line("not a listing line").is_none());
    }
}
