//! Takes registry using Actor pattern.
//!
//! The registry is the central state manager for all takes and user
//! aggregates. It receives commands via a tokio mpsc channel and
//! maintains the canonical source of truth.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Command Server  │────▶│   TakesActor    │────▶│ Broadcast Channel │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   TakesCommand        │   TakeEvent           │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!    start/pause/stop        TakeStore +             Notifier task
//!    upload/review           UserStore               sends messages
//! ```
//!
//! The scanner and reconciliation tasks talk to the same mailbox, so
//! every mutation is serialized through one loop.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::{broadcast, mpsc};

use takes_core::TakesConfig;

mod actor;
mod commands;
mod handle;

pub use actor::TakesActor;
pub use commands::{ReviewDecision, TakeEvent, TakesCommand, TakesError, UserHistory};
pub use handle::TakesHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the takes actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the TakesActor on a tokio task
/// 3. Returns a TakesHandle for client use
///
/// The periodic scanner and reconciliation tasks are spawned separately
/// (see `scanner` and `reconcile`) so tests can drive sweeps directly.
///
/// # Example
///
/// ```no_run
/// use takes_core::TakesConfig;
/// use takesd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(TakesConfig::default());
///     let history = handle.history(takes_core::UserId::new("U123")).await;
///     let _ = history;
/// }
/// ```
pub fn spawn_registry(config: TakesConfig) -> TakesHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = TakesActor::new(cmd_rx, event_tx.clone(), config);
    tokio::spawn(actor.run());

    TakesHandle::new(cmd_tx, event_tx)
}
