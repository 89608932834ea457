//! Takes actor - owns all take and user state and processes commands.
//!
//! The TakesActor is the single owner of mutable state in the system.
//! It receives commands via an mpsc channel and publishes events via
//! broadcast. Commands are processed one at a time, so every per-user
//! guard (one live take, upload lease, pause budget) is evaluated and
//! applied without interleaving. The scanner's `Sweep` goes through the
//! same mailbox, which is what makes forced auto-completion and a user's
//! own `stop` mutually exclusive.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use takes_core::{
    compact_duration, CompletionReason, Take, TakeId, TakeStatus, TakeView, TakesConfig, UserId,
};

use crate::reconcile::{FixedTotal, ReconcileReport};
use crate::store::{StoreError, TakeStore, UserStore};

use super::commands::{ReviewDecision, TakeEvent, TakesCommand, TakesError, UserHistory};

// ============================================================================
// Takes Actor
// ============================================================================

/// The takes actor - owns all take and user state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `takes`: every take, with a live-uniqueness index per user
/// - `users`: per-user aggregate totals and upload leases
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// All state mutations happen within this single task.
pub struct TakesActor {
    /// Command receiver
    receiver: mpsc::Receiver<TakesCommand>,

    /// Take storage with the one-live-take-per-user index
    takes: TakeStore,

    /// User aggregates and upload leases
    users: UserStore,

    /// Timing policy (session length, pause allowance, warning thresholds)
    config: TakesConfig,

    /// Event publisher for the notifier task and other subscribers
    event_publisher: broadcast::Sender<TakeEvent>,
}

impl TakesActor {
    /// Creates a new takes actor.
    pub fn new(
        receiver: mpsc::Receiver<TakesCommand>,
        event_publisher: broadcast::Sender<TakeEvent>,
        config: TakesConfig,
    ) -> Self {
        Self {
            receiver,
            takes: TakeStore::new(),
            users: UserStore::new(),
            config,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Takes actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Takes actor stopped (users: {})", self.users.len());
    }

    /// Dispatches a command to the appropriate handler.
    ///
    /// Every handler that mutates state stamps its own `now` once and
    /// threads it through, so a single command sees one consistent clock.
    fn handle_command(&mut self, cmd: TakesCommand) {
        match cmd {
            TakesCommand::Start {
                user_id,
                target,
                description,
                respond_to,
            } => {
                let result = self.handle_start(user_id, target, description, Utc::now());
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            TakesCommand::Pause {
                user_id,
                respond_to,
            } => {
                let result = self.handle_pause(&user_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Resume {
                user_id,
                respond_to,
            } => {
                let result = self.handle_resume(&user_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Stop {
                user_id,
                notes,
                respond_to,
            } => {
                let result = self.handle_stop(&user_id, notes, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::BeginUpload {
                user_id,
                respond_to,
            } => {
                let result = self.handle_begin_upload(&user_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::EndUpload {
                user_id,
                respond_to,
            } => {
                self.handle_end_upload(&user_id, Utc::now());
                let _ = respond_to.send(Ok(()));
            }
            TakesCommand::MarkUploaded {
                take_id,
                respond_to,
            } => {
                let result = self.handle_mark_uploaded(&take_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Review {
                take_id,
                decision,
                multiplier,
                respond_to,
            } => {
                let result = self.handle_review(&take_id, decision, multiplier, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Status {
                user_id,
                respond_to,
            } => {
                let result = self.handle_status(&user_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::History {
                user_id,
                respond_to,
            } => {
                let result = self.handle_history(&user_id, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Recent { limit, respond_to } => {
                let result = self.handle_recent(limit, Utc::now());
                let _ = respond_to.send(result);
            }
            TakesCommand::Sweep => {
                self.handle_sweep(Utc::now());
            }
            TakesCommand::Reconcile { respond_to } => {
                let result = self.handle_reconcile(Utc::now());
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Lifecycle Handlers
    // ========================================================================

    /// Handles starting a new take.
    fn handle_start(
        &mut self,
        user_id: UserId,
        target: Option<chrono::Duration>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        if self.takes.find_live(&user_id).is_some() {
            return Err(TakesError::AlreadyActive);
        }
        if self
            .users
            .get(&user_id)
            .is_some_and(|u| u.is_uploading(now))
        {
            // The previous take's video is still streaming in.
            return Err(TakesError::UploadInProgress);
        }

        let target = target.unwrap_or(self.config.session_length);
        let take = Take::start(user_id.clone(), target, description, now);
        let view = self.view(&take, now);

        // The store re-checks live uniqueness on insert.
        match self.takes.insert_live(take) {
            Ok(()) => {}
            Err(StoreError::LiveTakeExists { .. }) => return Err(TakesError::AlreadyActive),
            Err(e) => return Err(TakesError::internal(e)),
        }
        self.users.get_or_create(&user_id, now);

        info!(
            user_id = %user_id,
            take_id = %view.id_short,
            target_mins = target.num_minutes(),
            "Take started"
        );
        self.publish(TakeEvent::Started {
            take: Box::new(view.clone()),
        });
        Ok(view)
    }

    /// Handles pausing the user's active take.
    fn handle_pause(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        let take = self
            .takes
            .find_by_user_status(user_id, TakeStatus::Active)
            .ok_or(TakesError::NoActiveTake)?;
        let id = take.id.clone();

        if take.periods.paused_duration(now) >= self.config.max_pause {
            return Err(TakesError::PauseBudgetSpent);
        }

        let view = self.mutate_live(&id, TakeStatus::Active, now, |take, now| take.pause(now))?;

        info!(user_id = %user_id, take_id = %view.id_short, "Take paused");
        self.publish(TakeEvent::Paused {
            take: Box::new(view.clone()),
        });
        Ok(view)
    }

    /// Handles resuming the user's paused take.
    fn handle_resume(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        let take = self
            .takes
            .find_by_user_status(user_id, TakeStatus::Paused)
            .ok_or(TakesError::NoPausedTake)?;
        let id = take.id.clone();

        let view = self.mutate_live(&id, TakeStatus::Paused, now, |take, now| take.resume(now))?;

        info!(user_id = %user_id, take_id = %view.id_short, "Take resumed");
        self.publish(TakeEvent::Resumed {
            take: Box::new(view.clone()),
        });
        Ok(view)
    }

    /// Handles manually stopping the user's live take.
    fn handle_stop(
        &mut self,
        user_id: &UserId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        let take = self.takes.find_live(user_id).ok_or(TakesError::NoLiveTake)?;
        let id = take.id.clone();
        let status = take.status;

        let cap = self.config.session_cap;
        let view = self.mutate_live(&id, status, now, move |take, now| {
            take.complete(CompletionReason::Manual, notes, cap, now)
        })?;

        info!(
            user_id = %user_id,
            take_id = %view.id_short,
            elapsed = %view.elapsed_display,
            "Take stopped"
        );
        self.publish(TakeEvent::Completed {
            take: Box::new(view.clone()),
            reason: CompletionReason::Manual,
        });
        Ok(view)
    }

    // ========================================================================
    // Upload and Review Handlers
    // ========================================================================

    /// Handles acquiring the user's upload lease.
    fn handle_begin_upload(
        &mut self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), TakesError> {
        let user = self.users.get_or_create(user_id, now);
        if !user.try_acquire_upload_lease(self.config.upload_lease_ttl, now) {
            return Err(TakesError::UploadInProgress);
        }
        debug!(user_id = %user_id, "Upload lease acquired");
        Ok(())
    }

    /// Handles releasing the user's upload lease. Idempotent.
    fn handle_end_upload(&mut self, user_id: &UserId, now: DateTime<Utc>) {
        let user = self.users.get_or_create(user_id, now);
        user.release_upload_lease();
        debug!(user_id = %user_id, "Upload lease released");
    }

    /// Handles marking a waiting-upload take as uploaded.
    fn handle_mark_uploaded(
        &mut self,
        take_id: &TakeId,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        let view = self.mutate_live(take_id, TakeStatus::WaitingUpload, now, |take, _| {
            take.mark_uploaded()
        })
        .map_err(|e| match e {
            TakesError::Internal(_) => TakesError::NotWaitingUpload(take_id.clone()),
            other => other,
        })?;

        // Upload finished; release the lease as well.
        let owner = view.user_id.clone();
        self.handle_end_upload(&owner, now);

        info!(take_id = %view.id_short, user_id = %view.user_id, "Take uploaded");
        self.publish(TakeEvent::Uploaded {
            take: Box::new(view.clone()),
        });
        Ok(view)
    }

    /// Handles approving or rejecting an uploaded take.
    ///
    /// Approval credits the weighted elapsed time to the user's aggregate
    /// total; reconciliation is the backstop if this write is ever missed.
    fn handle_review(
        &mut self,
        take_id: &TakeId,
        decision: ReviewDecision,
        multiplier: f64,
        now: DateTime<Utc>,
    ) -> Result<TakeView, TakesError> {
        if decision == ReviewDecision::Approve && (!multiplier.is_finite() || multiplier < 0.0) {
            return Err(TakesError::InvalidMultiplier(multiplier));
        }

        let view = self.mutate_live(take_id, TakeStatus::Uploaded, now, |take, _| match decision {
            ReviewDecision::Approve => take.approve(multiplier),
            ReviewDecision::Reject => take.reject(),
        })
        .map_err(|e| match e {
            TakesError::Internal(_) => TakesError::NotReviewable(take_id.clone()),
            other => other,
        })?;

        if decision == ReviewDecision::Approve {
            let credited = self
                .takes
                .get(take_id)
                .map(Take::credited_secs)
                .unwrap_or(0);
            self.users.add_total(&view.user_id, credited, now);
            info!(
                take_id = %view.id_short,
                user_id = %view.user_id,
                multiplier,
                credited_secs = credited,
                "Take approved"
            );
        } else {
            info!(take_id = %view.id_short, user_id = %view.user_id, "Take rejected");
        }

        self.publish(TakeEvent::Reviewed {
            take: Box::new(view.clone()),
            decision,
        });
        Ok(view)
    }

    // ========================================================================
    // Query Handlers
    // ========================================================================

    /// Handles fetching the user's live take.
    fn handle_status(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<TakeView> {
        self.takes.find_live(user_id).map(|t| self.view(t, now))
    }

    /// Handles fetching the user's recent history and aggregate total.
    fn handle_history(&self, user_id: &UserId, now: DateTime<Utc>) -> UserHistory {
        let takes = self
            .takes
            .completed_for_user(user_id, self.config.max_history_items)
            .into_iter()
            .map(|t| self.view(t, now))
            .collect();
        let total_secs = self
            .users
            .get(user_id)
            .map(|u| u.total_takes_time_secs)
            .unwrap_or(0);
        UserHistory { takes, total_secs }
    }

    /// Handles fetching recently completed takes across all users.
    fn handle_recent(&self, limit: usize, now: DateTime<Utc>) -> Vec<TakeView> {
        self.takes
            .recently_completed(limit)
            .into_iter()
            .map(|t| self.view(t, now))
            .collect()
    }

    // ========================================================================
    // Sweep Handler
    // ========================================================================

    /// Handles a scanner sweep over live takes.
    ///
    /// Two passes, each with its own forced-completion and one-shot
    /// warning logic:
    /// - active takes past their target are completed as time-expired;
    ///   those within the low-time window get a single warning
    /// - paused takes past the pause allowance are completed as
    ///   pause-expired; those close to it get a single warning
    ///
    /// Warning flags are persisted before the warning event is published,
    /// so a crash between the two drops the notification rather than
    /// repeating it.
    fn handle_sweep(&mut self, now: DateTime<Utc>) {
        self.sweep_active(now);
        self.sweep_paused(now);
    }

    fn sweep_active(&mut self, now: DateTime<Utc>) {
        let cap = self.config.session_cap;
        let candidates: Vec<TakeId> = self
            .takes
            .find_by_status(TakeStatus::Active)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        for id in candidates {
            let Some(take) = self.takes.get(&id) else { continue };
            if let Err(e) = take.periods.check_integrity() {
                // Corrupt ledgers are surfaced, never silently repaired.
                error!(take_id = %id.short(), error = %e, "Skipping take with corrupt period ledger");
                continue;
            }

            let remaining = take.remaining(now, cap).remaining;
            if remaining <= chrono::Duration::zero() {
                self.force_complete(&id, TakeStatus::Active, CompletionReason::TimeExpired, now);
            } else if remaining <= self.config.low_time_warning && !take.notified_low_time {
                let result = self.takes.update_status(&id, TakeStatus::Active, |t| {
                    t.notified_low_time = true;
                });
                match result {
                    Ok(()) => {
                        if let Some(take) = self.takes.get(&id) {
                            let view = self.view(take, now);
                            info!(
                                take_id = %view.id_short,
                                user_id = %view.user_id,
                                remaining = %compact_duration(remaining),
                                "Low time warning"
                            );
                            self.publish(TakeEvent::LowTimeWarning {
                                take: Box::new(view),
                                remaining,
                            });
                        }
                    }
                    Err(e) => warn!(take_id = %id.short(), error = %e, "Low-time flag update failed"),
                }
            }
        }
    }

    fn sweep_paused(&mut self, now: DateTime<Utc>) {
        let max_pause = self.config.max_pause;
        let candidates: Vec<TakeId> = self
            .takes
            .find_by_status(TakeStatus::Paused)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        for id in candidates {
            let Some(take) = self.takes.get(&id) else { continue };
            if let Err(e) = take.periods.check_integrity() {
                error!(take_id = %id.short(), error = %e, "Skipping take with corrupt period ledger");
                continue;
            }

            let pause_left = take.periods.paused_time_remaining(max_pause, now);
            if pause_left <= chrono::Duration::zero() {
                self.force_complete(&id, TakeStatus::Paused, CompletionReason::PauseExpired, now);
            } else if pause_left <= self.config.pause_expiration_warning
                && !take.notified_pause_expiration
            {
                let result = self.takes.update_status(&id, TakeStatus::Paused, |t| {
                    t.notified_pause_expiration = true;
                });
                match result {
                    Ok(()) => {
                        if let Some(take) = self.takes.get(&id) {
                            let view = self.view(take, now);
                            info!(
                                take_id = %view.id_short,
                                user_id = %view.user_id,
                                remaining = %compact_duration(pause_left),
                                "Pause expiry warning"
                            );
                            self.publish(TakeEvent::PauseExpiryWarning {
                                take: Box::new(view),
                                remaining: pause_left,
                            });
                        }
                    }
                    Err(e) => {
                        warn!(take_id = %id.short(), error = %e, "Pause-expiry flag update failed")
                    }
                }
            }
        }
    }

    /// Force-completes a live take during a sweep.
    ///
    /// The user's notes are preserved; the completion annotation is
    /// appended by `Take::complete`.
    fn force_complete(
        &mut self,
        id: &TakeId,
        expected: TakeStatus,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) {
        let cap = self.config.session_cap;
        let result = self
            .takes
            .update_status(id, expected, |t| t.complete(reason, None, cap, now));
        match result {
            Ok(Ok(())) => {
                if let Some(take) = self.takes.get(id) {
                    let view = self.view(take, now);
                    warn!(
                        take_id = %view.id_short,
                        user_id = %view.user_id,
                        reason = %reason,
                        elapsed = %view.elapsed_display,
                        "Take force-completed"
                    );
                    self.publish(TakeEvent::Completed {
                        take: Box::new(view),
                        reason,
                    });
                }
            }
            Ok(Err(e)) => error!(take_id = %id.short(), error = %e, "Force completion rejected"),
            // Lost the race against a just-processed user command; fine.
            Err(StoreError::StatusConflict { .. }) => {}
            Err(e) => error!(take_id = %id.short(), error = %e, "Force completion failed"),
        }
    }

    // ========================================================================
    // Reconciliation Handler
    // ========================================================================

    /// Recomputes every user's aggregate total from their approved takes
    /// and fixes any drift.
    ///
    /// One bad user never aborts the pass; failures are collected in the
    /// report and the remaining users are still reconciled.
    fn handle_reconcile(&mut self, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        // Union of users with a record and users owning takes, so approved
        // takes for a user with no record still produce a total.
        let mut user_ids: Vec<UserId> = self.users.iter().map(|u| u.id.clone()).collect();
        for take in self.takes.iter() {
            if !user_ids.contains(&take.user_id) {
                user_ids.push(take.user_id.clone());
            }
        }

        for user_id in user_ids {
            report.checked += 1;
            let mut computed: i64 = 0;
            let mut corrupt = false;
            for take in self.takes.iter().filter(|t| t.user_id == user_id) {
                if take.status != TakeStatus::Approved {
                    continue;
                }
                if let Err(e) = take.periods.check_integrity() {
                    report.errors.push(format!(
                        "user {user_id}: take {} has a corrupt ledger: {e}",
                        take.id.short()
                    ));
                    corrupt = true;
                    break;
                }
                computed += take.credited_secs();
            }
            if corrupt {
                continue;
            }

            let stored = self
                .users
                .get(&user_id)
                .map(|u| u.total_takes_time_secs)
                .unwrap_or(0);
            if stored != computed {
                warn!(
                    user_id = %user_id,
                    stored_secs = stored,
                    computed_secs = computed,
                    "Fixing drifted aggregate total"
                );
                self.users.set_total(&user_id, computed, now);
                report.fixed.push(FixedTotal {
                    user_id,
                    stored_secs: stored,
                    computed_secs: computed,
                });
            }
        }

        info!(
            checked = report.checked,
            fixed = report.fixed.len(),
            errors = report.errors.len(),
            "Reconciliation pass complete"
        );
        report
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// CAS-updates a take and returns its fresh view.
    ///
    /// Store-level conflicts and domain-transition failures both map to
    /// `TakesError`; callers refine `Internal` where a more specific
    /// variant exists.
    fn mutate_live(
        &mut self,
        id: &TakeId,
        expected: TakeStatus,
        now: DateTime<Utc>,
        mutate: impl FnOnce(&mut Take, DateTime<Utc>) -> takes_core::DomainResult<()>,
    ) -> Result<TakeView, TakesError> {
        let result = self
            .takes
            .update_status(id, expected, |t| mutate(t, now));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TakesError::internal(e)),
            Err(StoreError::TakeNotFound { take_id }) => {
                return Err(TakesError::TakeNotFound(take_id))
            }
            Err(e) => return Err(TakesError::internal(e)),
        }
        self.takes
            .get(id)
            .map(|t| self.view(t, now))
            .ok_or_else(|| TakesError::TakeNotFound(id.clone()))
    }

    fn view(&self, take: &Take, now: DateTime<Utc>) -> TakeView {
        TakeView::from_take(take, now, self.config.session_cap)
    }

    /// Publishes an event, ignoring the no-receivers case.
    fn publish(&self, event: TakeEvent) {
        if self.event_publisher.send(event).is_err() {
            debug!("No event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio::sync::{broadcast, mpsc};

    fn test_config() -> TakesConfig {
        TakesConfig {
            session_length: Duration::minutes(90),
            session_cap: Duration::minutes(90),
            max_pause: Duration::minutes(45),
            low_time_warning: Duration::minutes(10),
            pause_expiration_warning: Duration::minutes(5),
            ..TakesConfig::default()
        }
    }

    fn test_actor() -> (TakesActor, broadcast::Receiver<TakeEvent>) {
        let (_tx, rx) = mpsc::channel(8);
        let (event_tx, event_rx) = broadcast::channel(64);
        (TakesActor::new(rx, event_tx, test_config()), event_rx)
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    fn drain_events(rx: &mut broadcast::Receiver<TakeEvent>) -> Vec<TakeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_rejects_second_live_take() {
        let (mut actor, _events) = test_actor();
        let now = Utc::now();

        actor
            .handle_start(uid("U1"), None, None, now)
            .expect("first start succeeds");
        let err = actor
            .handle_start(uid("U1"), None, None, now)
            .expect_err("second start must fail");
        assert!(matches!(err, TakesError::AlreadyActive));

        // A different user is unaffected.
        actor
            .handle_start(uid("U2"), None, None, now)
            .expect("other user can start");
    }

    #[tokio::test]
    async fn test_lifecycle_elapsed_excludes_pause() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(10)).unwrap();
        actor
            .handle_resume(&uid("U1"), t0 + Duration::minutes(25))
            .unwrap();
        let view = actor
            .handle_stop(&uid("U1"), Some("done".to_string()), t0 + Duration::minutes(40))
            .unwrap();

        // 10 active + 15 paused + 15 active = 25 minutes elapsed.
        assert_eq!(view.elapsed_secs, 25 * 60);
        assert_eq!(view.status, TakeStatus::WaitingUpload);
        assert_eq!(view.notes.as_deref(), Some("done"));

        // Live slot is free again.
        assert!(actor.handle_status(&uid("U1"), t0 + Duration::minutes(41)).is_none());
        actor
            .handle_start(uid("U1"), None, None, t0 + Duration::minutes(41))
            .expect("can start after stop");
    }

    #[tokio::test]
    async fn test_pause_budget_guard() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(1)).unwrap();
        // 45 minutes paused spends the whole allowance.
        actor
            .handle_resume(&uid("U1"), t0 + Duration::minutes(46))
            .unwrap();

        let err = actor
            .handle_pause(&uid("U1"), t0 + Duration::minutes(47))
            .expect_err("pause budget is spent");
        assert!(matches!(err, TakesError::PauseBudgetSpent));
    }

    #[tokio::test]
    async fn test_wrong_state_transitions_rejected() {
        let (mut actor, _events) = test_actor();
        let now = Utc::now();

        assert!(matches!(
            actor.handle_pause(&uid("U1"), now),
            Err(TakesError::NoActiveTake)
        ));
        assert!(matches!(
            actor.handle_resume(&uid("U1"), now),
            Err(TakesError::NoPausedTake)
        ));
        assert!(matches!(
            actor.handle_stop(&uid("U1"), None, now),
            Err(TakesError::NoLiveTake)
        ));

        actor.handle_start(uid("U1"), None, None, now).unwrap();
        assert!(matches!(
            actor.handle_resume(&uid("U1"), now),
            Err(TakesError::NoPausedTake)
        ));
    }

    #[tokio::test]
    async fn test_sweep_low_time_warning_fires_once() {
        let (mut actor, mut events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        drain_events(&mut events);

        // 85 of 90 minutes spent: inside the 10-minute warning window.
        actor.handle_sweep(t0 + Duration::minutes(85));
        actor.handle_sweep(t0 + Duration::minutes(86));

        let warnings: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, TakeEvent::LowTimeWarning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1, "warning must be one-shot");

        // Still active; warned, not completed.
        let view = actor.handle_status(&uid("U1"), t0 + Duration::minutes(86)).unwrap();
        assert_eq!(view.status, TakeStatus::Active);
    }

    #[tokio::test]
    async fn test_sweep_resume_rearms_low_time_warning() {
        let (mut actor, mut events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        actor.handle_sweep(t0 + Duration::minutes(85));
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(86)).unwrap();
        actor.handle_resume(&uid("U1"), t0 + Duration::minutes(90)).unwrap();
        drain_events(&mut events);

        // Still in the warning window after resume; flag was reset.
        actor.handle_sweep(t0 + Duration::minutes(91));
        let warnings: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, TakeEvent::LowTimeWarning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_force_completes_expired_take() {
        let (mut actor, mut events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        drain_events(&mut events);

        actor.handle_sweep(t0 + Duration::minutes(95));

        let completed: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                TakeEvent::Completed { take, reason } => Some((take, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1, CompletionReason::TimeExpired);
        assert_eq!(completed[0].0.status, TakeStatus::WaitingUpload);
        // Elapsed is capped at the session cap.
        assert_eq!(completed[0].0.elapsed_secs, 90 * 60);
        assert!(completed[0]
            .0
            .notes
            .as_deref()
            .is_some_and(|n| n.contains("Automatically completed - time expired")));

        // A second sweep is a no-op.
        actor.handle_sweep(t0 + Duration::minutes(100));
        assert!(drain_events(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_force_completes_overpaused_take() {
        let (mut actor, mut events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(10)).unwrap();
        drain_events(&mut events);

        // 41 minutes paused: inside the 5-minute expiry warning window.
        actor.handle_sweep(t0 + Duration::minutes(51));
        let warnings: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, TakeEvent::PauseExpiryWarning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1);

        // Past the 45-minute allowance: forced completion.
        actor.handle_sweep(t0 + Duration::minutes(56));
        let completed: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                TakeEvent::Completed { take, reason } => Some((take, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1, CompletionReason::PauseExpired);
        // Only the 10 active minutes count.
        assert_eq!(completed[0].0.elapsed_secs, 10 * 60);
        assert!(completed[0]
            .0
            .notes
            .as_deref()
            .is_some_and(|n| n.contains("Automatically completed due to pause timeout")));
    }

    #[tokio::test]
    async fn test_sweep_pause_allowance_is_cumulative() {
        let (mut actor, mut events) = test_actor();
        let t0 = Utc::now();

        // First pause spends 40 of the 45-minute allowance.
        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(10)).unwrap();
        actor.handle_resume(&uid("U1"), t0 + Duration::minutes(50)).unwrap();
        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(55)).unwrap();
        drain_events(&mut events);

        // 1 minute into the second pause: 41 minutes cumulative, inside
        // the 5-minute expiry warning window.
        actor.handle_sweep(t0 + Duration::minutes(56));
        let warnings: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, TakeEvent::PauseExpiryWarning { .. }))
            .collect();
        assert_eq!(warnings.len(), 1);

        // 58 minutes cumulative: a fresh pause could run much longer, but
        // the allowance is spent across both cycles.
        actor.handle_sweep(t0 + Duration::minutes(73));
        let completed: Vec<_> = drain_events(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                TakeEvent::Completed { take, reason } => Some((take, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].1, CompletionReason::PauseExpired);
        // 10 + 5 active minutes count toward elapsed.
        assert_eq!(completed[0].0.elapsed_secs, 15 * 60);
        assert!(actor.handle_status(&uid("U1"), t0 + Duration::minutes(74)).is_none());
    }

    #[tokio::test]
    async fn test_upload_lease_guards() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_begin_upload(&uid("U1"), t0).unwrap();
        assert!(matches!(
            actor.handle_begin_upload(&uid("U1"), t0 + Duration::seconds(1)),
            Err(TakesError::UploadInProgress)
        ));

        // Starting a take while the lease is held is refused.
        assert!(matches!(
            actor.handle_start(uid("U1"), None, None, t0 + Duration::seconds(2)),
            Err(TakesError::UploadInProgress)
        ));

        // Release is idempotent and frees the lease.
        actor.handle_end_upload(&uid("U1"), t0 + Duration::seconds(3));
        actor.handle_end_upload(&uid("U1"), t0 + Duration::seconds(3));
        actor
            .handle_begin_upload(&uid("U1"), t0 + Duration::seconds(4))
            .unwrap();

        // An expired lease is treated as free.
        let later = t0 + Duration::minutes(30);
        actor.handle_begin_upload(&uid("U1"), later).unwrap();
    }

    #[tokio::test]
    async fn test_review_credits_weighted_total() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        let view = actor
            .handle_stop(&uid("U1"), None, t0 + Duration::minutes(30))
            .unwrap();
        actor
            .handle_mark_uploaded(&view.id, t0 + Duration::minutes(31))
            .unwrap();
        actor
            .handle_review(&view.id, ReviewDecision::Approve, 2.0, t0 + Duration::minutes(32))
            .unwrap();

        // 30 minutes at 2.0x credits an hour.
        let history = actor.handle_history(&uid("U1"), t0 + Duration::minutes(33));
        assert_eq!(history.total_secs, 3600);
        assert_eq!(history.takes.len(), 1);
        assert_eq!(history.takes[0].status, TakeStatus::Approved);
    }

    #[tokio::test]
    async fn test_rejected_take_credits_nothing() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        let view = actor
            .handle_stop(&uid("U1"), None, t0 + Duration::minutes(20))
            .unwrap();
        actor.handle_mark_uploaded(&view.id, t0 + Duration::minutes(21)).unwrap();
        actor
            .handle_review(&view.id, ReviewDecision::Reject, 0.0, t0 + Duration::minutes(22))
            .unwrap();

        let history = actor.handle_history(&uid("U1"), t0 + Duration::minutes(23));
        assert_eq!(history.total_secs, 0);
        assert_eq!(history.takes[0].status, TakeStatus::Rejected);
        assert_eq!(history.takes[0].multiplier, 0.0);
    }

    #[tokio::test]
    async fn test_review_rejects_bad_multiplier_and_state() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        let view = actor
            .handle_stop(&uid("U1"), None, t0 + Duration::minutes(10))
            .unwrap();

        // Not uploaded yet.
        assert!(matches!(
            actor.handle_review(&view.id, ReviewDecision::Approve, 1.0, t0),
            Err(TakesError::NotReviewable(_))
        ));

        actor.handle_mark_uploaded(&view.id, t0 + Duration::minutes(11)).unwrap();
        assert!(matches!(
            actor.handle_review(&view.id, ReviewDecision::Approve, -1.0, t0),
            Err(TakesError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            actor.handle_review(&view.id, ReviewDecision::Approve, f64::NAN, t0),
            Err(TakesError::InvalidMultiplier(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_fixes_drifted_total() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        let view = actor
            .handle_stop(&uid("U1"), None, t0 + Duration::minutes(30))
            .unwrap();
        actor.handle_mark_uploaded(&view.id, t0 + Duration::minutes(31)).unwrap();
        actor
            .handle_review(&view.id, ReviewDecision::Approve, 1.0, t0 + Duration::minutes(32))
            .unwrap();

        // No drift yet.
        let report = actor.handle_reconcile(t0 + Duration::minutes(33));
        assert!(report.is_clean());
        assert!(report.checked >= 1);

        // Corrupt the stored total and reconcile again.
        actor.users.set_total(&uid("U1"), 7, t0 + Duration::minutes(34));
        let report = actor.handle_reconcile(t0 + Duration::minutes(35));
        assert_eq!(report.fixed.len(), 1);
        assert_eq!(report.fixed[0].stored_secs, 7);
        assert_eq!(report.fixed[0].computed_secs, 30 * 60);

        let history = actor.handle_history(&uid("U1"), t0 + Duration::minutes(36));
        assert_eq!(history.total_secs, 30 * 60);

        // Reconciliation is idempotent.
        let report = actor.handle_reconcile(t0 + Duration::minutes(37));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_status_reports_live_elapsed() {
        let (mut actor, _events) = test_actor();
        let t0 = Utc::now();

        actor.handle_start(uid("U1"), None, None, t0).unwrap();
        let view = actor.handle_status(&uid("U1"), t0 + Duration::minutes(12)).unwrap();
        assert_eq!(view.elapsed_secs, 12 * 60);

        actor.handle_pause(&uid("U1"), t0 + Duration::minutes(15)).unwrap();
        // Elapsed freezes while paused.
        let view = actor.handle_status(&uid("U1"), t0 + Duration::minutes(25)).unwrap();
        assert_eq!(view.elapsed_secs, 15 * 60);
        assert_eq!(view.status, TakeStatus::Paused);
    }
}
