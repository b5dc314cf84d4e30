//! Events, the last-event suppression table, and the pure snapshot differ
//! (§4.B).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::location::{Location, Mtime, RelPath, Snapshot};

/// The kind of change observed between two snapshots of the same location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

/// One observed (or replayed) change at one location.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub location: Location,
    pub rel_path: RelPath,
    /// A file mtime for `Created`/`Updated`; wall-clock observation time for
    /// `Deleted`.
    pub mtime: Mtime,
}

/// Tracks, per relative path, the most recent event the coordinator acted on.
/// Watchers consult this (read-only) to suppress re-emitting the echo of the
/// coordinator's own apply phase. Cleared at the top of each cycle, updated
/// at the bottom, per §4.D.
#[derive(Default)]
pub struct LastEventTable {
    inner: RwLock<HashMap<RelPath, EventKind>>,
}

impl LastEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the kind of the last event acted on for `rel_path`, if any.
    pub fn kind_for(&self, rel_path: &str) -> Option<EventKind> {
        self.inner.read().expect("LastEventTable lock poisoned").get(rel_path).copied()
    }

    /// Clears the table. Called by the coordinator at the top of each cycle,
    /// before draining the event queue.
    pub fn clear(&self) {
        self.inner.write().expect("LastEventTable lock poisoned").clear();
    }

    /// Records the winner's kind for `rel_path`. Called by the coordinator
    /// after applying a batch, before releasing the end barrier.
    pub fn record(&self, rel_path: RelPath, kind: EventKind) {
        self.inner.write().expect("LastEventTable lock poisoned").insert(rel_path, kind);
    }
}

fn now_secs() -> Mtime {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Compares `prev` and `curr` snapshots of the same location and returns the
/// surviving events (after LastEventTable suppression). Pure aside from the
/// wall-clock read for `Deleted` mtimes: identical `(prev, curr)` always
/// produce the same set of created/updated paths.
pub fn diff(
    location: &Location,
    prev: &Snapshot,
    curr: &Snapshot,
    last_events: &LastEventTable,
) -> Vec<Event> {
    let mut events = Vec::new();

    for (rel_path, &prev_mtime) in prev {
        if let Some(&curr_mtime) = curr.get(rel_path) {
            if curr_mtime > prev_mtime {
                push_if_not_suppressed(
                    &mut events,
                    last_events,
                    Event {
                        kind: EventKind::Updated,
                        location: location.clone(),
                        rel_path: rel_path.clone(),
                        mtime: curr_mtime,
                    },
                );
            }
        } else {
            push_if_not_suppressed(
                &mut events,
                last_events,
                Event {
                    kind: EventKind::Deleted,
                    location: location.clone(),
                    rel_path: rel_path.clone(),
                    mtime: now_secs(),
                },
            );
        }
    }

    for (rel_path, &curr_mtime) in curr {
        if !prev.contains_key(rel_path) {
            push_if_not_suppressed(
                &mut events,
                last_events,
                Event {
                    kind: EventKind::Created,
                    location: location.clone(),
                    rel_path: rel_path.clone(),
                    mtime: curr_mtime,
                },
            );
        }
    }

    events
}

fn push_if_not_suppressed(events: &mut Vec<Event>, last_events: &LastEventTable, event: Event) {
    if last_events.kind_for(&event.rel_path) == Some(event.kind) {
        return;
    }
    events.push(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc() -> Location {
        Location::Folder { path: PathBuf::from("/tmp/x") }
    }

    #[test]
    fn identical_snapshots_emit_nothing() {
        let mut s = Snapshot::new();
        s.insert("a.txt".to_string(), 100.0);
        let table = LastEventTable::new();
        let events = diff(&loc(), &s, &s, &table);
        assert!(events.is_empty());
    }

    #[test]
    fn newer_mtime_emits_updated() {
        let mut prev = Snapshot::new();
        prev.insert("a.txt".to_string(), 100.0);
        let mut curr = Snapshot::new();
        curr.insert("a.txt".to_string(), 200.0);
        let table = LastEventTable::new();
        let events = diff(&loc(), &prev, &curr, &table);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Updated);
    }

    #[test]
    fn missing_from_curr_emits_deleted() {
        let mut prev = Snapshot::new();
        prev.insert("a.txt".to_string(), 100.0);
        let curr = Snapshot::new();
        let table = LastEventTable::new();
        let events = diff(&loc(), &prev, &curr, &table);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Deleted);
    }

    #[test]
    fn new_in_curr_emits_created() {
        let prev = Snapshot::new();
        let mut curr = Snapshot::new();
        curr.insert("a.txt".to_string(), 100.0);
        let table = LastEventTable::new();
        let events = diff(&loc(), &prev, &curr, &table);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Created);
    }

    #[test]
    fn suppresses_echo_of_last_applied_event() {
        let mut prev = Snapshot::new();
        prev.insert("a.txt".to_string(), 100.0);
        let mut curr = Snapshot::new();
        curr.insert("a.txt".to_string(), 200.0);
        let table = LastEventTable::new();
        table.record("a.txt".to_string(), EventKind::Updated);
        let events = diff(&loc(), &prev, &curr, &table);
        assert!(events.is_empty());
    }

    #[test]
    fn does_not_suppress_a_different_kind() {
        let mut prev = Snapshot::new();
        prev.insert("a.txt".to_string(), 100.0);
        let curr = Snapshot::new();
        let table = LastEventTable::new();
        table.record("a.txt".to_string(), EventKind::Updated);
        let events = diff(&loc(), &prev, &curr, &table);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Deleted);
    }
}
