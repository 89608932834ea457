//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `TakesActor`:
//! - `TakesCommand`: Commands sent to the actor
//! - `TakesError`: Errors that can occur during take operations
//! - `TakeEvent`: Events published by the registry for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chrono::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use takes_core::{CompletionReason, TakeId, TakeView, UserId};

use crate::reconcile::ReconcileReport;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the takes registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
///
/// Commands for the same user are serialized through the actor's single
/// mailbox, so two racing `Start` commands can never both succeed.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(TakesCommand::Status {
///     user_id: id,
///     respond_to: tx,
/// }).await?;
/// let view = rx.await?;
/// ```
#[derive(Debug)]
pub enum TakesCommand {
    /// Start a new take for a user.
    ///
    /// # Errors
    /// - `TakesError::AlreadyActive` when the user has a live take
    /// - `TakesError::UploadInProgress` when an earlier upload still holds the lease
    Start {
        user_id: UserId,
        /// Target duration; `None` uses the configured session length.
        target: Option<Duration>,
        description: Option<String>,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Pause the user's active take.
    ///
    /// # Errors
    /// - `TakesError::NoActiveTake` when nothing is active
    /// - `TakesError::PauseBudgetSpent` when the pause allowance is used up
    Pause {
        user_id: UserId,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Resume the user's paused take.
    ///
    /// # Errors
    /// - `TakesError::NoPausedTake` when nothing is paused
    Resume {
        user_id: UserId,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Stop the user's live take and move it to waiting-upload.
    ///
    /// # Errors
    /// - `TakesError::NoLiveTake` when the user has no live take
    Stop {
        user_id: UserId,
        notes: Option<String>,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Acquire the user's upload lease before streaming a file.
    ///
    /// # Errors
    /// - `TakesError::UploadInProgress` when a non-expired lease exists
    BeginUpload {
        user_id: UserId,
        respond_to: oneshot::Sender<Result<(), TakesError>>,
    },

    /// Release the user's upload lease (success or failure of the upload).
    ///
    /// Idempotent: releasing an absent lease is not an error.
    EndUpload {
        user_id: UserId,
        respond_to: oneshot::Sender<Result<(), TakesError>>,
    },

    /// Mark a waiting-upload take as uploaded.
    ///
    /// # Errors
    /// - `TakesError::NotWaitingUpload` when the take is in another status
    MarkUploaded {
        take_id: TakeId,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Review an uploaded take: approve (with a multiplier) or reject.
    ///
    /// Approval credits `round(elapsed_secs * multiplier)` to the user's
    /// aggregate total.
    ///
    /// # Errors
    /// - `TakesError::NotReviewable` when the take is not uploaded
    /// - `TakesError::InvalidMultiplier` for negative or non-finite values
    Review {
        take_id: TakeId,
        decision: ReviewDecision,
        multiplier: f64,
        respond_to: oneshot::Sender<Result<TakeView, TakesError>>,
    },

    /// Get the user's live take, if any.
    Status {
        user_id: UserId,
        respond_to: oneshot::Sender<Option<TakeView>>,
    },

    /// Get the user's recent completed takes plus their aggregate total.
    History {
        user_id: UserId,
        respond_to: oneshot::Sender<UserHistory>,
    },

    /// Get recently completed takes across all users.
    Recent {
        limit: usize,
        respond_to: oneshot::Sender<Vec<TakeView>>,
    },

    /// Sweep live takes for expiry warnings and forced completion.
    ///
    /// Fire-and-forget command sent by the scanner task. Routing it through
    /// the same mailbox as user commands means a forced completion can never
    /// race a user's stop.
    Sweep,

    /// Recompute every user's aggregate total from their approved takes.
    Reconcile {
        respond_to: oneshot::Sender<ReconcileReport>,
    },
}

/// Reviewer's verdict on an uploaded take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during take operations.
///
/// Display strings double as the user-facing response lines, so keep
/// them readable as sentences.
#[derive(Debug, Clone, Error)]
pub enum TakesError {
    /// The user already has a live (active or paused) take.
    #[error("you already have a take in progress")]
    AlreadyActive,

    /// The user has no active take to pause.
    #[error("you don't have an active take")]
    NoActiveTake,

    /// The user has no paused take to resume.
    #[error("you don't have a paused take")]
    NoPausedTake,

    /// The user has no live take to stop.
    #[error("you don't have a take in progress")]
    NoLiveTake,

    /// The pause allowance for this take is used up.
    #[error("you've used up your pause time for this take")]
    PauseBudgetSpent,

    /// An upload lease is already held for this user.
    #[error("an upload is already in progress, try again in a moment")]
    UploadInProgress,

    /// The take is not waiting for an upload.
    #[error("take {0} is not waiting for an upload")]
    NotWaitingUpload(TakeId),

    /// The take is not in a reviewable (uploaded) state.
    #[error("take {0} is not ready for review")]
    NotReviewable(TakeId),

    /// The requested take does not exist.
    #[error("take not found: {0}")]
    TakeNotFound(TakeId),

    /// Approval multiplier was negative or non-finite.
    #[error("invalid multiplier: {0}")]
    InvalidMultiplier(f64),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TakesError {
    /// Creates an internal error from any error type.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal(err.to_string())
    }
}

// ============================================================================
// Take Events
// ============================================================================

/// Events published by the registry to subscribers.
///
/// The notifier task turns these into user messages; other subscribers
/// (tests, future surfaces) can observe the same stream.
#[derive(Debug, Clone)]
pub enum TakeEvent {
    /// A take was started.
    Started { take: Box<TakeView> },

    /// A take was paused.
    Paused { take: Box<TakeView> },

    /// A paused take was resumed.
    Resumed { take: Box<TakeView> },

    /// A take finished its live phase (manually or forced).
    Completed {
        take: Box<TakeView>,
        reason: CompletionReason,
    },

    /// An active take is close to its target duration.
    LowTimeWarning {
        take: Box<TakeView>,
        remaining: Duration,
    },

    /// A paused take is close to exhausting its pause allowance.
    PauseExpiryWarning {
        take: Box<TakeView>,
        remaining: Duration,
    },

    /// A take's recording was uploaded.
    Uploaded { take: Box<TakeView> },

    /// A take was reviewed.
    Reviewed {
        take: Box<TakeView>,
        decision: ReviewDecision,
    },
}

impl TakeEvent {
    /// The user the event concerns.
    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Started { take }
            | Self::Paused { take }
            | Self::Resumed { take }
            | Self::Completed { take, .. }
            | Self::LowTimeWarning { take, .. }
            | Self::PauseExpiryWarning { take, .. }
            | Self::Uploaded { take }
            | Self::Reviewed { take, .. } => &take.user_id,
        }
    }
}

/// Response payload for the `History` command.
#[derive(Debug, Clone)]
pub struct UserHistory {
    pub takes: Vec<TakeView>,
    /// Aggregate approved time in seconds.
    pub total_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takes_error_display() {
        let err = TakesError::AlreadyActive;
        assert_eq!(err.to_string(), "you already have a take in progress");

        let err = TakesError::PauseBudgetSpent;
        assert_eq!(
            err.to_string(),
            "you've used up your pause time for this take"
        );

        let id = TakeId::generate();
        let err = TakesError::TakeNotFound(id.clone());
        assert_eq!(err.to_string(), format!("take not found: {id}"));

        let err = TakesError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");
    }

    #[test]
    fn test_takes_error_internal_helper() {
        let err = TakesError::internal("boom");
        assert!(matches!(err, TakesError::Internal(_)));
        assert_eq!(err.to_string(), "internal error: boom");
    }

    #[tokio::test]
    async fn test_command_oneshot_pattern() {
        let (tx, rx) = oneshot::channel::<Result<(), TakesError>>();

        tokio::spawn(async move {
            tx.send(Ok(())).ok();
        });

        let result = rx.await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<(), TakesError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
