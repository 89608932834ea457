//! Take domain entity and lifecycle mutations.

use crate::error::{DomainError, DomainResult};
use crate::id::{TakeId, UserId};
use crate::period::{PeriodKind, PeriodLedger, Remaining};
use crate::time::compact_duration;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a take.
///
/// `Active` and `Paused` are the live states; at most one take per user may
/// be live at any time. The rest are post-completion review states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TakeStatus {
    /// Clock is running.
    Active,
    /// Clock stopped, pause budget draining.
    Paused,
    /// Session finished, waiting for the user's video.
    WaitingUpload,
    /// Video received, waiting for review.
    Uploaded,
    /// Reviewer accepted; multiplier applied.
    Approved,
    /// Reviewer declined; multiplier forced to zero.
    Rejected,
}

impl TakeStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::WaitingUpload => "waiting upload",
            Self::Uploaded => "uploaded",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns true while the session clock exists (active or paused).
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }
}

impl fmt::Display for TakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Why a take left the live states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The user stopped the session.
    Manual,
    /// The scanner force-completed an over-paused take.
    PauseExpired,
    /// The scanner force-completed a take whose time ran out.
    TimeExpired,
}

impl CompletionReason {
    /// Notes annotation recorded on auto-completion; `None` for manual stops.
    pub fn annotation(&self) -> Option<&'static str> {
        match self {
            Self::Manual => None,
            Self::PauseExpired => Some("Automatically completed due to pause timeout"),
            Self::TimeExpired => Some("Automatically completed - time expired"),
        }
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "stopped by user"),
            Self::PauseExpired => write!(f, "pause timeout"),
            Self::TimeExpired => write!(f, "time expired"),
        }
    }
}

// ============================================================================
// Entity
// ============================================================================

/// One timed work session.
///
/// While the take is live, the period ledger is the source of truth for
/// elapsed time; the cached `elapsed` field is only finalized when the take
/// completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Take {
    pub id: TakeId,
    pub user_id: UserId,
    pub status: TakeStatus,
    pub periods: PeriodLedger,

    /// Committed session length, fixed at creation.
    #[serde(rename = "targetDurationMs", with = "duration_ms")]
    pub target_duration: Duration,

    /// Finalized active time; zero until completion.
    #[serde(rename = "elapsedTimeMs", with = "duration_ms")]
    pub elapsed: Duration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Reward multiplier set on review.
    pub multiplier: f64,

    /// One-shot flag: low-time warning already sent. Reset on resume.
    pub notified_low_time: bool,

    /// One-shot flag: pause-expiry warning already sent. Reset on pause.
    pub notified_pause_expiration: bool,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Take {
    /// Creates a new active take with a single open active period.
    pub fn start(
        user_id: UserId,
        target_duration: Duration,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TakeId::generate(),
            user_id,
            status: TakeStatus::Active,
            periods: PeriodLedger::started(PeriodKind::Active, now),
            target_duration,
            elapsed: Duration::zero(),
            description,
            notes: None,
            multiplier: 1.0,
            notified_low_time: false,
            notified_pause_expiration: false,
            created_at: now,
            completed_at: None,
        }
    }

    /// Pauses an active take.
    ///
    /// The caller is responsible for the pause-budget guard; this only
    /// enforces the status precondition.
    pub fn pause(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != TakeStatus::Active {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "active",
            });
        }
        self.periods.push_period(PeriodKind::Paused, now);
        self.status = TakeStatus::Paused;
        self.notified_pause_expiration = false;
        Ok(())
    }

    /// Resumes a paused take.
    pub fn resume(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != TakeStatus::Paused {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "paused",
            });
        }
        self.periods.push_period(PeriodKind::Active, now);
        self.status = TakeStatus::Active;
        self.notified_low_time = false;
        Ok(())
    }

    /// Completes a live take: closes the open period, finalizes elapsed
    /// time from the ledger, stamps `completed_at`, records notes, and
    /// moves to `WaitingUpload`.
    pub fn complete(
        &mut self,
        reason: CompletionReason,
        user_notes: Option<String>,
        cap: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.status.is_live() {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "active or paused",
            });
        }
        self.periods.close(now);
        self.elapsed = self.periods.elapsed_active(now, cap);
        self.completed_at = Some(now);
        self.status = TakeStatus::WaitingUpload;

        if let Some(notes) = user_notes {
            self.notes = Some(notes);
        }
        if let Some(annotation) = reason.annotation() {
            self.notes = Some(match self.notes.take() {
                Some(existing) => format!("{existing} ({annotation})"),
                None => annotation.to_string(),
            });
        }
        Ok(())
    }

    /// Records that the user's video arrived.
    pub fn mark_uploaded(&mut self) -> DomainResult<()> {
        if self.status != TakeStatus::WaitingUpload {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "waiting upload",
            });
        }
        self.status = TakeStatus::Uploaded;
        Ok(())
    }

    /// Approves an uploaded take with a reward multiplier.
    pub fn approve(&mut self, multiplier: f64) -> DomainResult<()> {
        if self.status != TakeStatus::Uploaded {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "uploaded",
            });
        }
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(DomainError::InvalidMultiplier { value: multiplier });
        }
        self.status = TakeStatus::Approved;
        self.multiplier = multiplier;
        Ok(())
    }

    /// Rejects an uploaded take; the multiplier is forced to zero.
    pub fn reject(&mut self) -> DomainResult<()> {
        if self.status != TakeStatus::Uploaded {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                expected: "uploaded",
            });
        }
        self.status = TakeStatus::Rejected;
        self.multiplier = 0.0;
        Ok(())
    }

    /// Live remaining-time projection from the ledger.
    pub fn remaining(&self, now: DateTime<Utc>, cap: Duration) -> Remaining {
        self.periods.remaining(self.target_duration, now, cap)
    }

    /// Seconds credited toward the owner's aggregate total.
    ///
    /// Only approved takes count; the reward multiplier weights the
    /// elapsed time (a 2.0x take of 30 minutes credits an hour).
    pub fn credited_secs(&self) -> i64 {
        if self.status != TakeStatus::Approved {
            return 0;
        }
        (self.elapsed.num_seconds() as f64 * self.multiplier).round() as i64
    }
}

// ============================================================================
// View
// ============================================================================

/// Read-only snapshot of a take for command responses and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeView {
    pub id: TakeId,
    pub id_short: String,
    pub user_id: UserId,
    pub status: TakeStatus,
    pub status_label: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub elapsed_secs: i64,
    pub elapsed_display: String,
    pub multiplier: f64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl TakeView {
    /// Creates a view, deriving live elapsed time from the ledger when the
    /// take has not completed yet.
    pub fn from_take(take: &Take, now: DateTime<Utc>, cap: Duration) -> Self {
        let elapsed = if take.status.is_live() {
            take.periods.elapsed_active(now, cap)
        } else {
            take.elapsed
        };
        Self {
            id: take.id.clone(),
            id_short: take.id.short().to_string(),
            user_id: take.user_id.clone(),
            status: take.status,
            status_label: take.status.label().to_string(),
            description: take.description.clone(),
            notes: take.notes.clone(),
            elapsed_secs: elapsed.num_seconds(),
            elapsed_display: compact_duration(elapsed),
            multiplier: take.multiplier,
            created_at: take.created_at.to_rfc3339(),
            completed_at: take.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Serde helper storing `chrono::Duration` as integer milliseconds, the
/// ledger's storage-facing unit.
mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms = i64::deserialize(de)?;
        Ok(Duration::milliseconds(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn mins(m: i64) -> Duration {
        Duration::minutes(m)
    }

    fn sample_take(now: DateTime<Utc>) -> Take {
        Take::start(UserId::new("U1"), mins(90), Some("demo".into()), now)
    }

    #[test]
    fn test_start_has_single_open_active_period() {
        let take = sample_take(t0());
        assert_eq!(take.status, TakeStatus::Active);
        assert_eq!(take.periods.len(), 1);
        assert!(take.periods.last().is_some_and(|p| p.is_open()));
        assert_eq!(take.multiplier, 1.0);
    }

    #[test]
    fn test_pause_resume_cycle() {
        let now = t0();
        let mut take = sample_take(now);

        take.pause(now + mins(10)).unwrap();
        assert_eq!(take.status, TakeStatus::Paused);
        assert!(!take.notified_pause_expiration);

        take.resume(now + mins(20)).unwrap();
        assert_eq!(take.status, TakeStatus::Active);
        assert!(!take.notified_low_time);
        assert_eq!(take.periods.len(), 3);
    }

    #[test]
    fn test_pause_requires_active() {
        let now = t0();
        let mut take = sample_take(now);
        take.pause(now).unwrap();
        assert!(matches!(
            take.pause(now + mins(1)),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_resume_requires_paused() {
        let now = t0();
        let mut take = sample_take(now);
        assert!(matches!(
            take.resume(now),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_complete_finalizes_elapsed_and_closes_ledger() {
        let now = t0();
        let mut take = sample_take(now);
        take.pause(now + mins(30)).unwrap();
        take.resume(now + mins(40)).unwrap();

        take.complete(CompletionReason::Manual, Some("done".into()), mins(90), now + mins(50))
            .unwrap();

        assert_eq!(take.status, TakeStatus::WaitingUpload);
        assert_eq!(take.elapsed, mins(40));
        assert_eq!(take.completed_at, Some(now + mins(50)));
        assert_eq!(take.notes.as_deref(), Some("done"));
        assert!(take.periods.open_period().is_none());
    }

    #[test]
    fn test_complete_from_paused() {
        let now = t0();
        let mut take = sample_take(now);
        take.pause(now + mins(15)).unwrap();

        take.complete(CompletionReason::PauseExpired, None, mins(90), now + mins(90))
            .unwrap();

        assert_eq!(take.status, TakeStatus::WaitingUpload);
        assert_eq!(take.elapsed, mins(15));
        assert_eq!(
            take.notes.as_deref(),
            Some("Automatically completed due to pause timeout")
        );
    }

    #[test]
    fn test_auto_complete_appends_annotation_to_existing_notes() {
        let now = t0();
        let mut take = sample_take(now);
        take.notes = Some("wip".into());

        take.complete(CompletionReason::TimeExpired, None, mins(90), now + mins(100))
            .unwrap();

        assert_eq!(
            take.notes.as_deref(),
            Some("wip (Automatically completed - time expired)")
        );
    }

    #[test]
    fn test_complete_requires_live_status() {
        let now = t0();
        let mut take = sample_take(now);
        take.complete(CompletionReason::Manual, None, mins(90), now).unwrap();
        assert!(matches!(
            take.complete(CompletionReason::Manual, None, mins(90), now),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_review_flow() {
        let now = t0();
        let mut take = sample_take(now);
        take.complete(CompletionReason::Manual, None, mins(90), now + mins(60))
            .unwrap();

        // Review requires upload first.
        assert!(take.approve(1.5).is_err());

        take.mark_uploaded().unwrap();
        take.approve(1.5).unwrap();
        assert_eq!(take.status, TakeStatus::Approved);
        assert_eq!(take.multiplier, 1.5);
    }

    #[test]
    fn test_reject_zeroes_multiplier() {
        let now = t0();
        let mut take = sample_take(now);
        take.complete(CompletionReason::Manual, None, mins(90), now + mins(60))
            .unwrap();
        take.mark_uploaded().unwrap();
        take.reject().unwrap();

        assert_eq!(take.status, TakeStatus::Rejected);
        assert_eq!(take.multiplier, 0.0);
        assert_eq!(take.credited_secs(), 0);
    }

    #[test]
    fn test_approve_rejects_bad_multiplier() {
        let now = t0();
        let mut take = sample_take(now);
        take.complete(CompletionReason::Manual, None, mins(90), now).unwrap();
        take.mark_uploaded().unwrap();
        assert!(matches!(
            take.approve(-1.0),
            Err(DomainError::InvalidMultiplier { .. })
        ));
        assert!(take.approve(f64::NAN).is_err());
    }

    #[test]
    fn test_credited_secs_weights_by_multiplier() {
        let now = t0();
        let mut take = sample_take(now);
        take.complete(CompletionReason::Manual, None, mins(90), now + mins(30))
            .unwrap();
        take.mark_uploaded().unwrap();
        take.approve(2.0).unwrap();

        assert_eq!(take.elapsed.num_seconds(), 1800);
        assert_eq!(take.credited_secs(), 3600);
    }

    #[test]
    fn test_status_serde_uses_camel_case() {
        let json = serde_json::to_string(&TakeStatus::WaitingUpload).unwrap_or_default();
        assert_eq!(json, "\"waitingUpload\"");
    }

    #[test]
    fn test_view_live_elapsed_comes_from_ledger() {
        let now = t0();
        let take = sample_take(now);
        let view = TakeView::from_take(&take, now + mins(12), mins(90));
        assert_eq!(view.elapsed_secs, 12 * 60);
        assert_eq!(view.status_label, "active");
    }
}
