//! User aggregate: the denormalized per-user total and the upload lease.

use crate::id::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Advisory lock for media upload processing.
///
/// A lease with an expiry rather than a bare boolean: if the process
/// crashes mid-upload, the lease simply lapses and the user is not
/// stranded in a locked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLease {
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadLease {
    /// Creates a lease valid for `ttl` from `now`.
    pub fn acquire(ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true once the lease has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Per-user aggregate record.
///
/// A read-mostly cache derived from takes: `total_takes_time_secs` must
/// always equal the credited seconds summed over the user's approved
/// takes, and is periodically corrected by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,

    /// Denormalized total credited time in seconds.
    pub total_takes_time_secs: i64,

    /// In-flight upload lease, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_lease: Option<UploadLease>,

    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// Creates a fresh record with a zero total.
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            total_takes_time_secs: 0,
            upload_lease: None,
            created_at: now,
        }
    }

    /// Returns true if an unexpired upload lease is held.
    pub fn is_uploading(&self, now: DateTime<Utc>) -> bool {
        self.upload_lease.is_some_and(|lease| !lease.is_expired(now))
    }

    /// Acquires the upload lease if it is free or lapsed.
    ///
    /// Returns false without touching the lease when a live one is held.
    pub fn try_acquire_upload_lease(&mut self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.is_uploading(now) {
            return false;
        }
        self.upload_lease = Some(UploadLease::acquire(ttl, now));
        true
    }

    /// Releases the upload lease. Safe to call when none is held.
    pub fn release_upload_lease(&mut self) {
        self.upload_lease = None;
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

    #[test]
    fn test_lease_acquire_and_expiry() {
        let now = t0();
        let lease = UploadLease::acquire(Duration::minutes(10), now);
        assert!(!lease.is_expired(now));
        assert!(!lease.is_expired(now + Duration::minutes(9)));
        assert!(lease.is_expired(now + Duration::minutes(10)));
    }

    #[test]
    fn test_acquire_blocked_while_held() {
        let now = t0();
        let mut user = UserRecord::new(UserId::new("U1"), now);

        assert!(user.try_acquire_upload_lease(Duration::minutes(10), now));
        assert!(user.is_uploading(now));
        assert!(!user.try_acquire_upload_lease(Duration::minutes(10), now + Duration::minutes(1)));
    }

    #[test]
    fn test_expired_lease_is_treated_as_free() {
        let now = t0();
        let mut user = UserRecord::new(UserId::new("U1"), now);
        assert!(user.try_acquire_upload_lease(Duration::minutes(10), now));

        // A crash never released the lease; a later acquire still succeeds.
        let later = now + Duration::minutes(11);
        assert!(!user.is_uploading(later));
        assert!(user.try_acquire_upload_lease(Duration::minutes(10), later));
    }

    #[test]
    fn test_release_is_idempotent() {
        let now = t0();
        let mut user = UserRecord::new(UserId::new("U1"), now);
        user.release_upload_lease();
        assert!(user.try_acquire_upload_lease(Duration::minutes(10), now));
        user.release_upload_lease();
        user.release_upload_lease();
        assert!(!user.is_uploading(now));
    }
}
