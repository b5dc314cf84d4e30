//! Local-filesystem backend. `list` walks the directory tree; `write` goes
//! through a sibling temp file + rename so a concurrent `list` never observes
//! a truncated file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{to_rel_path, Backend, Location, Snapshot};
use crate::error::{Error, Result};

/// Depth bound that kicks in on platforms where inode-based cycle detection
/// isn't available (anything without `std::os::unix::fs::MetadataExt`).
const MAX_WALK_DEPTH: usize = 64;

pub struct FolderBackend {
    location: Location,
    root: PathBuf,
}

impl FolderBackend {
    pub fn new(location: Location) -> Self {
        let root = match &location {
            Location::Folder { path } => path.clone(),
            _ => unreachable!("FolderBackend constructed from non-folder Location"),
        };
        Self { location, root }
    }

    fn native_path(&self, rel_path: &str) -> PathBuf {
        let mut p = self.root.clone();
        for component in rel_path.split('/').filter(|c| !c.is_empty()) {
            p.push(component);
        }
        p
    }

    async fn walk(root: &Path, dir: &Path, visited: &mut HashSet<InodeKey>, depth: usize, out: &mut Snapshot) {
        if depth > MAX_WALK_DEPTH {
            tracing::warn!(dir = %dir.display(), "folder walk exceeded max depth, stopping");
            return;
        }
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "could not read directory");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "directory iteration failed");
                    break;
                }
            };

            let path = entry.path();
            let metadata = match fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not stat entry");
                    continue;
                }
            };

            if metadata.is_dir() {
                if let Some(key) = inode_key(&metadata) {
                    if !visited.insert(key) {
                        continue;
                    }
                }
                Box::pin(Self::walk(root, &path, visited, depth + 1, out)).await;
            } else if metadata.is_file() {
                let rel = to_rel_path(path.strip_prefix(root).unwrap_or(&path));
                let mtime = mtime_secs(&metadata);
                out.insert(rel, mtime);
            }
        }
    }
}

#[cfg(unix)]
type InodeKey = (u64, u64);

#[cfg(unix)]
fn inode_key(metadata: &std::fs::Metadata) -> Option<InodeKey> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
type InodeKey = ();

#[cfg(not(unix))]
fn inode_key(_metadata: &std::fs::Metadata) -> Option<InodeKey> {
    None
}

fn mtime_secs(metadata: &std::fs::Metadata) -> f64 {
    match metadata.modified() {
        Ok(t) => match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(_) => 0.0,
        },
        Err(_) => 0.0,
    }
}

#[async_trait]
impl Backend for FolderBackend {
    async fn list(&self) -> Snapshot {
        let mut out = Snapshot::new();
        let mut visited = HashSet::new();
        Self::walk(&self.root, &self.root, &mut visited, 0, &mut out).await;
        out
    }

    async fn read(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.native_path(rel_path);
        fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(rel_path.to_string())
            } else {
                Error::IoError(format!("{}: {e}", path.display()))
            }
        })
    }

    async fn write(&self, rel_path: &str, bytes: &[u8]) -> Result<()> {
        let path = self.native_path(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::IoError(format!("creating {}: {e}", parent.display())))?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".sync-tmp");
        let tmp_path = path.with_file_name(tmp_name);
        fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| Error::IoError(format!("writing {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| Error::IoError(format!("renaming {} -> {}: {e}", tmp_path.display(), path.display())))?;
        Ok(())
    }

    async fn delete(&self, rel_path: &str) -> Result<()> {
        let path = self.native_path(rel_path);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::IoError(format!("deleting {}: {e}", path.display()))),
        }
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &std::path::Path) -> FolderBackend {
        FolderBackend::new(Location::Folder { path: dir.to_path_buf() })
    }

    #[tokio::test]
    async fn list_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();

        let snapshot = backend(dir.path()).list().await;
        assert!(snapshot.contains_key("a/b/c.txt"));
        assert!(snapshot.contains_key("top.txt"));
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let b = backend(dir.path());
        b.write("nested/file.txt", b"payload").await.unwrap();
        let data = b.read("nested/file.txt").await.unwrap();
        assert_eq!(data, b"payload");
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let b = backend(dir.path());
        b.write("f.txt", b"x").await.unwrap();
        b.delete("f.txt").await.unwrap();
        let err = b.read("f.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let b = backend(dir.path());
        assert!(b.delete("missing.txt").await.is_ok());
    }
}
