//! One-shot reconciliation run before the cycle loop begins (§4.F).
//! Propagates the latest copy of each relative path to every location;
//! unlike a regular cycle, deletions are never propagated here — a path
//! absent from a location is assumed missing, not deleted.

use std::collections::HashMap;

use futures::future::join_all;

use crate::location::{Backend, Location, Mtime, RelPath};

/// Runs the initial synchronization across `backends`.
pub async fn run(backends: &[Box<dyn Backend>]) {
    let snapshots: Vec<_> = join_all(backends.iter().map(|b| async move { (b.location().clone(), b.list().await) })).await;

    let mut latest: HashMap<RelPath, (Location, Mtime)> = HashMap::new();
    for (location, snapshot) in &snapshots {
        for (rel_path, &mtime) in snapshot {
            latest
                .entry(rel_path.clone())
                .and_modify(|(winner_loc, winner_mtime)| {
                    if mtime > *winner_mtime {
                        *winner_loc = location.clone();
                        *winner_mtime = mtime;
                    }
                })
                .or_insert_with(|| (location.clone(), mtime));
        }
    }

    let by_location: HashMap<&Location, &dyn Backend> =
        backends.iter().map(|b| (b.location(), b.as_ref())).collect();

    let mut tasks = Vec::new();
    for (location, snapshot) in &snapshots {
        let backend = by_location[location];
        for (rel_path, (winner_loc, winner_mtime)) in &latest {
            if winner_loc == location {
                continue;
            }
            let needs_write = match snapshot.get(rel_path) {
                None => true,
                Some(&existing_mtime) => existing_mtime < *winner_mtime,
            };
            if !needs_write {
                continue;
            }
            tasks.push(async move {
                let source = by_location[winner_loc];
                match source.read(rel_path).await {
                    Ok(bytes) => {
                        if let Err(e) = backend.write(rel_path, &bytes).await {
                            tracing::warn!(
                                location = %backend.location(),
                                rel_path = %rel_path,
                                error = %e,
                                "initial sync write failed"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            location = %source.location(),
                            rel_path = %rel_path,
                            error = %e,
                            "initial sync read of winner failed"
                        );
                    }
                }
            });
        }
    }
    join_all(tasks).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FolderBackend;

    fn folder_backend(dir: &std::path::Path) -> Box<dyn Backend> {
        Box::new(FolderBackend::new(Location::Folder { path: dir.to_path_buf() }))
    }

    #[tokio::test]
    async fn propagates_only_file_to_empty_location() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("x.txt"), b"hello").unwrap();

        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        run(&backends).await;

        assert_eq!(std::fs::read(dir_b.path().join("x.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn resolves_conflict_by_mtime() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("y.txt"), b"A").unwrap();
        std::fs::write(dir_b.path().join("y.txt"), b"B").unwrap();

        // Give dir_b's copy a strictly later mtime.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(10);
        filetime_touch(&dir_b.path().join("y.txt"), later);

        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        run(&backends).await;

        assert_eq!(std::fs::read(dir_a.path().join("y.txt")).unwrap(), b"B");
        assert_eq!(std::fs::read(dir_b.path().join("y.txt")).unwrap(), b"B");
    }

    #[tokio::test]
    async fn steady_state_produces_no_writes() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("z.txt"), b"same").unwrap();
        std::fs::write(dir_b.path().join("z.txt"), b"same").unwrap();

        let before_a = std::fs::metadata(dir_a.path().join("z.txt")).unwrap().modified().unwrap();
        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        run(&backends).await;
        let after_a = std::fs::metadata(dir_a.path().join("z.txt")).unwrap().modified().unwrap();

        assert_eq!(before_a, after_a);
    }

    fn filetime_touch(path: &std::path::Path, when: std::time::SystemTime) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }
}
