//! Per-location polling task (§4.C), one per watched [`Location`], driven by
//! the coordinator's barrier protocol. Mirrors the corpus's
//! `spawn(...) -> JoinHandle<()>` task shape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Barrier};
use tokio::task::JoinHandle;

use crate::event::{diff, Event, LastEventTable};
use crate::location::{Backend, Location, Snapshot};

/// Long-lived per-location polling loop. A watcher only ever calls
/// [`Backend::list`]; it never reads, writes, or deletes, and it never
/// mutates the [`LastEventTable`] — only the coordinator does.
pub struct Watcher {
    backend: Box<dyn Backend>,
    events: mpsc::UnboundedSender<Event>,
    last_events: Arc<LastEventTable>,
    start_barrier: Arc<Barrier>,
    end_barrier: Arc<Barrier>,
    stop: Arc<AtomicBool>,
}

impl Watcher {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        backend: Box<dyn Backend>,
        events: mpsc::UnboundedSender<Event>,
        last_events: Arc<LastEventTable>,
        start_barrier: Arc<Barrier>,
        end_barrier: Arc<Barrier>,
        stop: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let watcher = Self { backend, events, last_events, start_barrier, end_barrier, stop };
        tokio::spawn(watcher.run())
    }

    async fn run(mut self) {
        let location = self.backend.location().clone();
        let mut prev: Snapshot = self.backend.list().await;

        loop {
            self.start_barrier.wait().await;
            if self.stop.load(Ordering::Acquire) {
                return;
            }

            let curr = self.backend.list().await;
            for event in diff(&location, &prev, &curr, &self.last_events) {
                // An unbounded channel's only failure mode is a dropped
                // receiver, which means the coordinator has shut down; in
                // that case there is nothing useful left to do this cycle.
                if self.events.send(event).is_err() {
                    break;
                }
            }
            prev = curr;

            self.end_barrier.wait().await;
            if self.stop.load(Ordering::Acquire) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::FolderBackend;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn first_iteration_emits_nothing_and_seeds_prev() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let backend = Box::new(FolderBackend::new(Location::Folder { path: dir.path().to_path_buf() }));
        let (tx, mut rx) = unbounded_channel();
        let last_events = Arc::new(LastEventTable::new());
        let start = Arc::new(Barrier::new(2));
        let end = Arc::new(Barrier::new(2));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = Watcher::spawn(backend, tx, last_events, start.clone(), end.clone(), stop.clone());

        start.wait().await;
        end.wait().await;

        assert!(rx.try_recv().is_err());

        stop.store(true, Ordering::Release);
        start.wait().await;
        handle.abort();
    }
}
