//! The time-period ledger: source of truth for a take's elapsed time.
//!
//! A take's lifetime is recorded as an append-only sequence of periods,
//! each tagged `active` or `paused`. Exactly one period may be open
//! (`ended_at == None`) and it must be the last element. All math here is
//! pure: every operation takes an explicit `now` so results are
//! reproducible under test.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a period counts toward elapsed time or toward pause budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    Active,
    Paused,
}

/// One contiguous span of a take's lifetime.
///
/// Serialized with the storage-facing field names (`type`, `startTime`,
/// `endTime`) so the ledger remains portable across backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    #[serde(rename = "type")]
    pub kind: PeriodKind,
    #[serde(rename = "startTime")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "endTime")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TimePeriod {
    /// Creates an open period starting at `now`.
    pub fn open(kind: PeriodKind, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            started_at: now,
            ended_at: None,
        }
    }

    /// Returns true if the period has no end yet.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duration of this period, treating an open end as `now`.
    ///
    /// A malformed period whose end precedes its start contributes zero
    /// rather than a negative duration.
    pub fn span(&self, now: DateTime<Utc>) -> Duration {
        let end = self.ended_at.unwrap_or(now);
        (end - self.started_at).max(Duration::zero())
    }
}

/// Data-integrity violations in a period sequence.
///
/// These indicate corrupted state, not user error: they are surfaced
/// loudly instead of being silently repaired, since a quiet "fix" could
/// hide double-counted time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// More than one period has no end time.
    #[error("ledger has {count} open periods, expected at most one")]
    MultipleOpenPeriods { count: usize },

    /// An open period exists but is not the last element.
    #[error("open period at index {index} is not the last element")]
    OpenPeriodNotLast { index: usize },
}

/// Remaining-time projection for a live take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    /// Time left until the target duration is reached (never negative).
    pub remaining: Duration,
    /// When the take would complete if it stays active from `now` on.
    pub projected_end: DateTime<Utc>,
}

/// Ordered sequence of periods for one take.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodLedger(Vec<TimePeriod>);

impl PeriodLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a ledger with a single open period of `kind` starting at `now`.
    pub fn started(kind: PeriodKind, now: DateTime<Utc>) -> Self {
        Self(vec![TimePeriod::open(kind, now)])
    }

    /// Returns the periods in order.
    pub fn periods(&self) -> &[TimePeriod] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the last period, if any.
    pub fn last(&self) -> Option<&TimePeriod> {
        self.0.last()
    }

    /// Returns the currently open period, if any.
    pub fn open_period(&self) -> Option<&TimePeriod> {
        self.0.last().filter(|p| p.is_open())
    }

    /// Closes the open period (if one exists) and appends a new open
    /// period of `kind` starting at `now`.
    ///
    /// Closing is a no-op on an empty ledger or when the last period is
    /// already closed, keeping periods contiguous.
    pub fn push_period(&mut self, kind: PeriodKind, now: DateTime<Utc>) {
        self.close(now);
        self.0.push(TimePeriod::open(kind, now));
    }

    /// Closes the open period at `now`, if one exists.
    pub fn close(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.0.last_mut() {
            if last.ended_at.is_none() {
                last.ended_at = Some(now);
            }
        }
    }

    /// Total active time, treating the open period's end as `now`.
    ///
    /// The result is clamped to `cap` so a stuck open period cannot
    /// accumulate runaway time.
    pub fn elapsed_active(&self, now: DateTime<Utc>, cap: Duration) -> Duration {
        let total = self
            .0
            .iter()
            .filter(|p| p.kind == PeriodKind::Active)
            .fold(Duration::zero(), |acc, p| acc + p.span(now));
        total.min(cap)
    }

    /// Total paused time (closed or open paused periods).
    pub fn paused_duration(&self, now: DateTime<Utc>) -> Duration {
        self.0
            .iter()
            .filter(|p| p.kind == PeriodKind::Paused)
            .fold(Duration::zero(), |acc, p| acc + p.span(now))
    }

    /// Live remaining-time projection against `target`.
    ///
    /// Derived purely from accumulated active time within the ledger, never
    /// from wall-clock deltas since the take started, so it stays correct
    /// no matter when it is evaluated.
    pub fn remaining(&self, target: Duration, now: DateTime<Utc>, cap: Duration) -> Remaining {
        let elapsed = self.elapsed_active(now, cap);
        let remaining = (target - elapsed).max(Duration::zero());
        Remaining {
            remaining,
            projected_end: now + remaining,
        }
    }

    /// Time left before a paused take is force-completed.
    ///
    /// The pause allowance is cumulative: every paused period drains it,
    /// not just the current one, so a take cannot reset its budget by
    /// briefly resuming. Only meaningful when the last period is a pause;
    /// returns zero otherwise (defensive, mirrors the empty-ledger case).
    pub fn paused_time_remaining(&self, max_pause: Duration, now: DateTime<Utc>) -> Duration {
        let Some(last) = self.0.last() else {
            return Duration::zero();
        };
        if last.kind != PeriodKind::Paused {
            return Duration::zero();
        }
        (max_pause - self.paused_duration(now)).max(Duration::zero())
    }

    /// Verifies the open-period invariant: at most one open period, and it
    /// must be the last element.
    pub fn check_integrity(&self) -> Result<(), LedgerError> {
        let open: Vec<usize> = self
            .0
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.is_open().then_some(i))
            .collect();

        match open.as_slice() {
            [] => Ok(()),
            [index] if *index == self.0.len() - 1 => Ok(()),
            [index] => Err(LedgerError::OpenPeriodNotLast { index: *index }),
            many => Err(LedgerError::MultipleOpenPeriods { count: many.len() }),
        }
    }
}
