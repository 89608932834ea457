//! User notifications driven by registry events.
//!
//! The notifier task subscribes to the registry's broadcast channel and
//! turns warning and completion events into user-facing messages. Delivery
//! is behind the `Notifier` trait so the built-in log delivery can be
//! swapped for a chat integration without touching the event plumbing.
//!
//! A failed or slow send never stops the task; each event is delivered
//! independently with its own timeout.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use takes_core::{pretty_duration, CompletionReason, UserId};

use crate::registry::{ReviewDecision, TakeEvent, TakesHandle};

/// Per-send delivery timeout.
const SEND_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Delivery backend for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message to one user.
    async fn send(&self, user_id: &UserId, message: &str) -> anyhow::Result<()>;
}

/// Default backend: writes notifications to the daemon log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, user_id: &UserId, message: &str) -> anyhow::Result<()> {
        info!(user_id = %user_id, message, "Notification");
        Ok(())
    }
}

/// Renders the user-facing message for an event.
///
/// Returns `None` for events that don't notify anyone (start, pause,
/// resume are acknowledged inline by the command server).
pub fn render_message(event: &TakeEvent) -> Option<String> {
    match event {
        TakeEvent::LowTimeWarning { remaining, .. } => Some(format!(
            "Heads up! You have {} left on your take.",
            pretty_duration(*remaining)
        )),
        TakeEvent::PauseExpiryWarning { remaining, .. } => Some(format!(
            "Your paused take will be automatically completed in {}.",
            pretty_duration(*remaining)
        )),
        TakeEvent::Completed { take, reason } => match reason {
            CompletionReason::Manual => None,
            CompletionReason::PauseExpired => Some(format!(
                "Your take was automatically completed because it stayed paused too long. \
                 Recorded time: {}. Please upload your video.",
                take.elapsed_display
            )),
            CompletionReason::TimeExpired => Some(format!(
                "Time's up! Your take was automatically completed. \
                 Recorded time: {}. Please upload your video.",
                take.elapsed_display
            )),
        },
        TakeEvent::Reviewed { take, decision } => match decision {
            ReviewDecision::Approve => Some(format!(
                "Your take was approved at {}x. Credited time: {}.",
                take.multiplier, take.elapsed_display
            )),
            ReviewDecision::Reject => Some("Your take was rejected by review.".to_string()),
        },
        TakeEvent::Started { .. }
        | TakeEvent::Paused { .. }
        | TakeEvent::Resumed { .. }
        | TakeEvent::Uploaded { .. } => None,
    }
}

/// Spawns the notifier task.
///
/// Subscribes to registry events and delivers rendered messages through
/// `notifier`. Exits on shutdown or when the event channel closes. A
/// lagged receiver (too many undelivered events) drops the missed events
/// and keeps going.
pub fn spawn_notifier_task(
    handle: &TakesHandle,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        info!("Notifier task starting");
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Notifier task stopping: shutdown requested");
                    break;
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => deliver(notifier.as_ref(), &event).await,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Notifier lagged, dropping missed events");
                        }
                        Err(RecvError::Closed) => {
                            info!("Notifier task stopping: event channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}

async fn deliver(notifier: &dyn Notifier, event: &TakeEvent) {
    let Some(message) = render_message(event) else {
        return;
    };
    let user_id = event.user_id().clone();
    match tokio::time::timeout(SEND_TIMEOUT, notifier.send(&user_id, &message)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(user_id = %user_id, error = %e, "Notification delivery failed"),
        Err(_) => warn!(user_id = %user_id, "Notification delivery timed out"),
    }
}
