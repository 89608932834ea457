//! Client interface for interacting with the TakesActor.
//!
//! The `TakesHandle` provides a cheap-to-clone interface for sending commands
//! to the takes actor and subscribing to take events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `TakesError::ChannelClosed`

use chrono::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use takes_core::{TakeId, TakeView, UserId};

use crate::reconcile::ReconcileReport;

use super::commands::{ReviewDecision, TakeEvent, TakesCommand, TakesError, UserHistory};

// ============================================================================
// Takes Handle
// ============================================================================

/// Handle for interacting with the takes actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = takes_handle.clone();
///
/// let view = handle.start(user, None, None).await?;
/// let history = handle.history(user).await;
///
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct TakesHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<TakesCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<TakeEvent>,
}

impl TakesHandle {
    pub fn new(
        sender: mpsc::Sender<TakesCommand>,
        event_sender: broadcast::Sender<TakeEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Starts a new take for the user.
    ///
    /// # Errors
    ///
    /// - `TakesError::AlreadyActive` if the user has a live take
    /// - `TakesError::UploadInProgress` if an upload lease is held
    /// - `TakesError::ChannelClosed` if the actor has shut down
    pub async fn start(
        &self,
        user_id: UserId,
        target: Option<Duration>,
        description: Option<String>,
    ) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Start {
                user_id,
                target,
                description,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Pauses the user's active take.
    pub async fn pause(&self, user_id: UserId) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Pause {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Resumes the user's paused take.
    pub async fn resume(&self, user_id: UserId) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Resume {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Stops the user's live take.
    pub async fn stop(
        &self,
        user_id: UserId,
        notes: Option<String>,
    ) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Stop {
                user_id,
                notes,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Acquires the user's upload lease.
    pub async fn begin_upload(&self, user_id: UserId) -> Result<(), TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::BeginUpload {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Releases the user's upload lease. Idempotent.
    pub async fn end_upload(&self, user_id: UserId) -> Result<(), TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::EndUpload {
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Marks a waiting-upload take as uploaded.
    pub async fn mark_uploaded(&self, take_id: TakeId) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::MarkUploaded {
                take_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Reviews an uploaded take.
    pub async fn review(
        &self,
        take_id: TakeId,
        decision: ReviewDecision,
        multiplier: f64,
    ) -> Result<TakeView, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Review {
                take_id,
                decision,
                multiplier,
                respond_to: tx,
            })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)?
    }

    /// Gets the user's live take.
    ///
    /// Returns `None` if there is no live take or if communication with
    /// the actor fails.
    pub async fn status(&self, user_id: UserId) -> Option<TakeView> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Status {
                user_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Gets the user's recent history and aggregate total.
    ///
    /// Returns an empty history if communication with the actor fails.
    pub async fn history(&self, user_id: UserId) -> UserHistory {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TakesCommand::History {
                user_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return UserHistory {
                takes: Vec::new(),
                total_secs: 0,
            };
        }

        rx.await.unwrap_or(UserHistory {
            takes: Vec::new(),
            total_secs: 0,
        })
    }

    /// Gets recently completed takes across all users.
    pub async fn recent(&self, limit: usize) -> Vec<TakeView> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(TakesCommand::Recent {
                limit,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Triggers an expiry sweep.
    ///
    /// Fire-and-forget: does not wait for the sweep to complete.
    pub async fn sweep(&self) {
        // Ignore send errors (actor may be shutting down)
        let _ = self.sender.send(TakesCommand::Sweep).await;
    }

    /// Runs an aggregate reconciliation pass and returns its report.
    pub async fn reconcile(&self) -> Result<ReconcileReport, TakesError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(TakesCommand::Reconcile { respond_to: tx })
            .await
            .map_err(|_| TakesError::ChannelClosed)?;

        rx.await.map_err(|_| TakesError::ChannelClosed)
    }

    /// Subscribes to take events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<TakeEvent> {
        self.event_sender.subscribe()
    }

    /// Checks if the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
