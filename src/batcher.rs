//! Event batcher and conflict resolver (§4.E): groups one cycle's events by
//! relative path and applies last-writer-wins resolution across every
//! configured location.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;

use crate::event::{Event, EventKind, LastEventTable};
use crate::location::{Backend, RelPath};

/// Resolves one cycle's event batch against `backends`, applying the
/// necessary `write`/`delete` calls and recording each winner in
/// `last_events`.
pub async fn resolve(events: Vec<Event>, backends: &[Box<dyn Backend>], last_events: &LastEventTable) {
    let mut groups: HashMap<RelPath, Vec<Event>> = HashMap::new();
    for event in events {
        groups.entry(event.rel_path.clone()).or_default().push(event);
    }

    for (rel_path, mut group) in groups {
        // Stable sort ascending by mtime; ties keep arrival order, so the
        // last element after a stable sort is the latest arrival among the
        // latest mtime.
        group.sort_by(|a, b| a.mtime.partial_cmp(&b.mtime).unwrap_or(std::cmp::Ordering::Equal));
        let winner = group.last().expect("group is never empty").clone();

        let kinds: HashSet<EventKind> = group.iter().map(|e| e.kind).collect();
        let pure_delete = kinds.len() == 1 && kinds.contains(&EventKind::Deleted);

        if pure_delete {
            apply_delete(&rel_path, backends, last_events).await;
        } else {
            apply_write(&rel_path, backends, last_events, &winner).await;
        }
    }
}

async fn apply_delete(rel_path: &str, backends: &[Box<dyn Backend>], last_events: &LastEventTable) {
    let futures = backends.iter().map(|backend| async move {
        if let Err(e) = backend.delete(rel_path).await {
            tracing::warn!(
                location = %backend.location(),
                rel_path,
                error = %e,
                "delete failed during batch apply"
            );
        }
    });
    join_all(futures).await;
    last_events.record(rel_path.to_string(), EventKind::Deleted);
}

async fn apply_write(
    rel_path: &str,
    backends: &[Box<dyn Backend>],
    last_events: &LastEventTable,
    winner: &Event,
) {
    let Some(source) = backends.iter().find(|b| b.location() == &winner.location) else {
        tracing::warn!(rel_path, "winner location not among configured backends, skipping");
        return;
    };

    let bytes = match source.read(rel_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                location = %winner.location,
                rel_path,
                error = %e,
                "could not read winner's bytes, skipping batch apply"
            );
            return;
        }
    };

    let futures = backends.iter().filter(|b| b.location() != &winner.location).map(|backend| {
        let bytes = &bytes;
        async move {
            if let Err(e) = backend.write(rel_path, bytes).await {
                tracing::warn!(
                    location = %backend.location(),
                    rel_path,
                    error = %e,
                    "write failed during batch apply"
                );
            }
        }
    });
    join_all(futures).await;
    last_events.record(rel_path.to_string(), winner.kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FolderBackend, Location};

    fn folder_backend(dir: &std::path::Path) -> Box<dyn Backend> {
        Box::new(FolderBackend::new(Location::Folder { path: dir.to_path_buf() }))
    }

    #[tokio::test]
    async fn pure_delete_batch_deletes_everywhere() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("z.txt"), b"z").unwrap();
        std::fs::write(dir_b.path().join("z.txt"), b"z").unwrap();

        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        let last_events = LastEventTable::new();

        let events = vec![Event {
            kind: EventKind::Deleted,
            location: Location::Folder { path: dir_b.path().to_path_buf() },
            rel_path: "z.txt".to_string(),
            mtime: 500.0,
        }];

        resolve(events, &backends, &last_events).await;

        assert!(!dir_a.path().join("z.txt").exists());
        assert!(!dir_b.path().join("z.txt").exists());
        assert_eq!(last_events.kind_for("z.txt"), Some(EventKind::Deleted));
    }

    #[tokio::test]
    async fn mixed_batch_prefers_write_over_delete() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("a.txt"), b"updated").unwrap();

        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        let last_events = LastEventTable::new();

        let events = vec![
            Event {
                kind: EventKind::Updated,
                location: Location::Folder { path: dir_a.path().to_path_buf() },
                rel_path: "a.txt".to_string(),
                mtime: 10.0,
            },
            Event {
                kind: EventKind::Deleted,
                location: Location::Folder { path: dir_b.path().to_path_buf() },
                rel_path: "a.txt".to_string(),
                mtime: 12.0,
            },
        ];

        resolve(events, &backends, &last_events).await;

        assert_eq!(std::fs::read(dir_b.path().join("a.txt")).unwrap(), b"updated");
        assert_eq!(last_events.kind_for("a.txt"), Some(EventKind::Updated));
    }

    #[tokio::test]
    async fn conflict_resolves_to_newest_mtime() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        std::fs::write(dir_a.path().join("y.txt"), b"A").unwrap();
        std::fs::write(dir_b.path().join("y.txt"), b"B").unwrap();

        let backends = vec![folder_backend(dir_a.path()), folder_backend(dir_b.path())];
        let last_events = LastEventTable::new();

        let events = vec![
            Event {
                kind: EventKind::Updated,
                location: Location::Folder { path: dir_a.path().to_path_buf() },
                rel_path: "y.txt".to_string(),
                mtime: 2000.0,
            },
            Event {
                kind: EventKind::Updated,
                location: Location::Folder { path: dir_b.path().to_path_buf() },
                rel_path: "y.txt".to_string(),
                mtime: 3000.0,
            },
        ];

        resolve(events, &backends, &last_events).await;

        assert_eq!(std::fs::read(dir_a.path().join("y.txt")).unwrap(), b"B");
        assert_eq!(std::fs::read(dir_b.path().join("y.txt")).unwrap(), b"B");
    }
}
