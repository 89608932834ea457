//! In-memory stores owned by the registry actor.
//!
//! The take store enforces the two storage-level guards the state machine
//! relies on:
//! - `insert_live` rejects a second live take per user (the equivalent of
//!   a partial unique index on `(user_id) WHERE status IN (active, paused)`)
//! - `update_live`/`update_status` are compare-and-swap updates that check
//!   the expected prior status as part of the write
//!
//! The actor is the single writer, so the CAS guards against logic races
//! (scanner auto-expiry vs. a user's stop arriving back-to-back), not
//! against concurrent threads. All stored values are serde-serializable so
//! a SQL backend can replace the maps at this seam.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use takes_core::{Take, TakeId, TakeStatus, UserId, UserRecord};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A live (active or paused) take already exists for the user.
    #[error("user {user_id} already has a live take")]
    LiveTakeExists { user_id: UserId },

    /// No take with this id.
    #[error("take not found: {take_id}")]
    TakeNotFound { take_id: TakeId },

    /// Conditional update failed: the take is not in the expected status.
    #[error("take {take_id} is {actual}, expected {expected}")]
    StatusConflict {
        take_id: TakeId,
        expected: TakeStatus,
        actual: TakeStatus,
    },
}

/// Take storage with a live-uniqueness index.
#[derive(Debug, Default)]
pub struct TakeStore {
    takes: HashMap<TakeId, Take>,
    /// Index of the single live take per user.
    live_by_user: HashMap<UserId, TakeId>,
}

impl TakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly started take.
    ///
    /// Fails when the user already has a live take, regardless of what the
    /// caller checked beforehand - this is the storage-level guard for the
    /// one-live-take-per-user invariant.
    pub fn insert_live(&mut self, take: Take) -> Result<(), StoreError> {
        if !take.status.is_live() {
            // Inserting a non-live take is a caller bug; still store it
            // but skip the index.
            self.takes.insert(take.id.clone(), take);
            return Ok(());
        }
        if self.live_by_user.contains_key(&take.user_id) {
            return Err(StoreError::LiveTakeExists {
                user_id: take.user_id.clone(),
            });
        }
        self.live_by_user
            .insert(take.user_id.clone(), take.id.clone());
        self.takes.insert(take.id.clone(), take);
        Ok(())
    }

    /// Returns the take by id.
    pub fn get(&self, id: &TakeId) -> Option<&Take> {
        self.takes.get(id)
    }

    /// Returns the user's live take, if any.
    pub fn find_live(&self, user_id: &UserId) -> Option<&Take> {
        self.live_by_user
            .get(user_id)
            .and_then(|id| self.takes.get(id))
    }

    /// Returns the user's live take filtered to one status.
    pub fn find_by_user_status(&self, user_id: &UserId, status: TakeStatus) -> Option<&Take> {
        self.find_live(user_id).filter(|t| t.status == status)
    }

    /// Returns all takes in the given status.
    pub fn find_by_status(&self, status: TakeStatus) -> Vec<&Take> {
        self.takes.values().filter(|t| t.status == status).collect()
    }

    /// Returns the user's completed takes, most recent first.
    pub fn completed_for_user(&self, user_id: &UserId, limit: usize) -> Vec<&Take> {
        let mut completed: Vec<&Take> = self
            .takes
            .values()
            .filter(|t| t.user_id == *user_id && !t.status.is_live())
            .collect();
        completed.sort_by_key(|t| std::cmp::Reverse(t.completed_at.unwrap_or(t.created_at)));
        completed.truncate(limit);
        completed
    }

    /// Returns completed takes across all users, most recent first.
    pub fn recently_completed(&self, limit: usize) -> Vec<&Take> {
        let mut completed: Vec<&Take> = self
            .takes
            .values()
            .filter(|t| !t.status.is_live())
            .collect();
        completed.sort_by_key(|t| std::cmp::Reverse(t.completed_at.unwrap_or(t.created_at)));
        completed.truncate(limit);
        completed
    }

    /// Iterates over every stored take.
    pub fn iter(&self) -> impl Iterator<Item = &Take> {
        self.takes.values()
    }

    /// Conditional update: applies `mutate` only when the take currently
    /// has `expected` status, then re-syncs the live index.
    ///
    /// The closure must leave the take in a consistent state; its return
    /// value is passed through.
    pub fn update_status<R>(
        &mut self,
        id: &TakeId,
        expected: TakeStatus,
        mutate: impl FnOnce(&mut Take) -> R,
    ) -> Result<R, StoreError> {
        let take = self.takes.get_mut(id).ok_or_else(|| StoreError::TakeNotFound {
            take_id: id.clone(),
        })?;
        if take.status != expected {
            return Err(StoreError::StatusConflict {
                take_id: id.clone(),
                expected,
                actual: take.status,
            });
        }
        let result = mutate(take);
        let user_id = take.user_id.clone();
        let still_live = take.status.is_live();
        if !still_live {
            self.live_by_user.remove(&user_id);
        }
        Ok(result)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.takes.len()
    }
}

/// User aggregate storage.
#[derive(Debug, Default)]
pub struct UserStore {
    users: HashMap<UserId, UserRecord>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &UserId) -> Option<&UserRecord> {
        self.users.get(id)
    }

    /// Returns the user record, creating a zeroed one on first touch.
    pub fn get_or_create(&mut self, id: &UserId, now: DateTime<Utc>) -> &mut UserRecord {
        self.users
            .entry(id.clone())
            .or_insert_with(|| UserRecord::new(id.clone(), now))
    }

    /// Overwrites the stored aggregate total.
    pub fn set_total(&mut self, id: &UserId, total_secs: i64, now: DateTime<Utc>) {
        self.get_or_create(id, now).total_takes_time_secs = total_secs;
    }

    /// Adds a delta to the stored aggregate (best-effort maintenance;
    /// reconciliation is the backstop).
    pub fn add_total(&mut self, id: &UserId, delta_secs: i64, now: DateTime<Utc>) {
        let user = self.get_or_create(id, now);
        user.total_takes_time_secs += delta_secs;
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut UserRecord> {
        self.users.values_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}
