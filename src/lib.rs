//! `locksync`: a multi-location file-set replicator. Keeps a set of
//! heterogeneous locations — local folders, ZIP archives, FTP servers — byte
//! equal at the file level, using last-modification time as the
//! conflict-resolution key.
//!
//! The engine ([`engine::Engine`]) is the crate's entry point: build a
//! [`location::Location`] per endpoint (via [`location::parse_spec`] or
//! directly), construct an [`Engine::new`](engine::Engine::new), run
//! [`Engine::initial_sync`](engine::Engine::initial_sync) once, then
//! [`Engine::run`](engine::Engine::run) until shutdown.

pub mod batcher;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod initial_sync;
pub mod location;
pub mod watcher;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use location::{Backend, Location};
