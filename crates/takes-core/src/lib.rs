//! takes-core - Domain types for timed work-session tracking
//!
//! This crate holds the pure domain model shared by the daemon and its
//! tests: the time-period ledger (source of truth for elapsed time), the
//! take entity with its lifecycle states, the per-user aggregate, and
//! configuration.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]` in
//! non-test code.

pub mod config;
pub mod error;
pub mod id;
pub mod period;
pub mod take;
pub mod time;
pub mod user;

// Re-exports for convenience
pub use config::TakesConfig;
pub use error::{DomainError, DomainResult};
pub use id::{TakeId, UserId};
pub use period::{LedgerError, PeriodKind, PeriodLedger, Remaining, TimePeriod};
pub use take::{CompletionReason, Take, TakeStatus, TakeView};
pub use time::{compact_duration, pretty_duration};
pub use user::{UploadLease, UserRecord};
