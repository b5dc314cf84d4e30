//! The synchronization engine (§4.D, §4.L): owns every watcher, the shared
//! event queue, the [`LastEventTable`], and the barrier pair that gates each
//! cycle. There is no process-wide mutable state outside this struct — the
//! corpus's `Vfs`/`VfsTask` pattern of passing shared state through `Arc`
//! rather than statics is followed throughout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Barrier};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::batcher;
use crate::config::EngineConfig;
use crate::event::{Event, LastEventTable};
use crate::location::{Backend, Location};
use crate::watcher::Watcher;

/// Owns the full set of watched locations and drives the cycle loop until
/// asked to stop. Constructed once from a `Vec<Location>` and an
/// [`EngineConfig`]; has no knowledge of the CLI, config files, or `tracing`
/// initialization — those live in the binary front-end.
pub struct Engine {
    backends: Arc<[Box<dyn Backend>]>,
    last_events: Arc<LastEventTable>,
    config: EngineConfig,
    stop: Arc<AtomicBool>,
    start_barrier: Arc<Barrier>,
    end_barrier: Arc<Barrier>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    watchers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Builds an engine over `locations`, opening one backend adapter per
    /// location (§4.A's `open` factory) but not yet spawning any watchers.
    pub fn new(locations: Vec<Location>, config: EngineConfig) -> Self {
        let backends: Vec<Box<dyn Backend>> = locations.into_iter().map(crate::location::open).collect();
        let width = backends.len() + 1;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            backends: backends.into(),
            last_events: Arc::new(LastEventTable::new()),
            config,
            stop: Arc::new(AtomicBool::new(false)),
            start_barrier: Arc::new(Barrier::new(width)),
            end_barrier: Arc::new(Barrier::new(width)),
            events_tx,
            events_rx,
            watchers: Vec::new(),
        }
    }

    /// Runs the one-shot initial reconciliation (§4.F). Must be called before
    /// [`Engine::run`] so the cycle loop starts from a converged state.
    pub async fn initial_sync(&self) {
        crate::initial_sync::run(&self.backends).await;
    }

    /// Spawns one watcher task per location and runs the barrier-coordinated
    /// cycle loop (§4.D) until `stop_signal` resolves. Returns once every
    /// watcher has observed the stop flag and exited.
    ///
    /// The coordinator never cancels a cycle partway through: a background
    /// task flips the shared stop flag when `stop_signal` resolves, and both
    /// the coordinator and every watcher only ever check it at a barrier
    /// boundary. This keeps every barrier arrival count exact — there is no
    /// path where the coordinator stops arriving mid-cycle while watchers are
    /// still waiting on it.
    pub async fn run(&mut self, stop_signal: impl std::future::Future<Output = ()> + Send + 'static) {
        for backend in self.backends.iter() {
            // Each backend needs its own boxed trait object; `Engine` keeps
            // the canonical list in `self.backends` for the coordinator's
            // apply phase, so watchers get a second handle onto the same
            // location rather than ownership of the shared list.
            let handle = Watcher::spawn(
                crate::location::open(backend.location().clone()),
                self.events_tx.clone(),
                self.last_events.clone(),
                self.start_barrier.clone(),
                self.end_barrier.clone(),
                self.stop.clone(),
            );
            self.watchers.push(handle);
        }

        let stop = self.stop.clone();
        tokio::spawn(async move {
            stop_signal.await;
            stop.store(true, Ordering::Release);
        });

        let mut cycle_count: u64 = 0;
        loop {
            cycle_count += 1;
            let span = tracing::info_span!("cycle", n = cycle_count);
            if self.run_one_cycle().instrument(span).await {
                break;
            }
        }

        for handle in self.watchers.drain(..) {
            let _ = handle.await;
        }
    }

    /// Runs the start-barrier / drain+apply / end-barrier protocol once,
    /// returning `true` if the stop flag was observed and the coordinator
    /// should exit its loop.
    async fn run_one_cycle(&mut self) -> bool {
        self.start_barrier.wait().await;
        if self.stop.load(Ordering::Acquire) {
            return true;
        }

        self.last_events.clear();
        let batch = self.drain_events().await;
        tracing::debug!(events = batch.len(), "drained cycle batch");

        self.end_barrier.wait().await;
        if self.stop.load(Ordering::Acquire) {
            return true;
        }

        // The apply phase happens between the end-barrier wait above and the
        // next cycle's start-barrier wait: watchers are blocked at their own
        // end-barrier call until this returns, so no watcher can race a
        // `list()` against the writes below within this cycle.
        let applied = batch.len();
        batcher::resolve(batch, &self.backends, &self.last_events).await;
        tracing::info!(applied, "cycle complete");
        false
    }

    async fn drain_events(&mut self) -> Vec<Event> {
        let mut batch = Vec::new();

        match tokio::time::timeout(self.config.drain_timeout, self.events_rx.recv()).await {
            Ok(Some(event)) => batch.push(event),
            Ok(None) => return batch,
            Err(_) => return batch,
        }

        while let Ok(event) = self.events_rx.try_recv() {
            batch.push(event);
        }
        batch
    }
}
