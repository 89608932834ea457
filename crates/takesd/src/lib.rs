//! Takes daemon - timed work-session registry and command server
//!
//! This crate provides the infrastructure for the takes daemon:
//! - `registry` - Takes registry actor owning all take and user state
//! - `server` - Unix socket server for the line command protocol
//! - `command` - Text command parsing
//! - `scanner` - Periodic expiry sweep
//! - `reconcile` - Self-healing aggregate totals
//! - `notify` - User notification delivery
//! - `cache` - Single-flight TTL cache for external lookups
//! - `names` - Cached display-name resolution
//! - `store` - In-memory take and user storage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      takesd daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DaemonServer   │────▶│        TakesActor           │    │
//! │  │ (Unix Socket)   │     │  (take + user state owner)  │    │
//! │  └─────────────────┘     └──────┬───────────▲──────────┘    │
//! │                                 │           │ Sweep /       │
//! │                          events │           │ Reconcile     │
//! │                                 ▼           │               │
//! │  ┌─────────────────┐     ┌──────────────────┴──────────┐    │
//! │  │  Notifier task  │◀────│   scanner + reconcile tasks │    │
//! │  │ (user messages) │     │   (interval tickers)        │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cache;
pub mod command;
pub mod names;
pub mod notify;
pub mod reconcile;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod store;
