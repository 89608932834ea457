//! Type-safe identifiers for takes and users.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a take (one timed work session).
///
/// Generated locally at session creation. Wraps a UUID string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TakeId(String);

impl TakeId {
    /// Generates a fresh random take id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a TakeId from an existing string (e.g. loaded from storage).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened display form (first 8 characters).
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for TakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TakeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TakeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TakeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier for a user, supplied by the chat platform (e.g. "U0123ABCD").
///
/// Never generated locally; we trust the upstream format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_id_generate_unique() {
        let a = TakeId::generate();
        let b = TakeId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_take_id_short() {
        let id = TakeId::new("8e11bfb5-7dc2-432b-9206-928fa5c35731");
        assert_eq!(id.short(), "8e11bfb5");
    }

    #[test]
    fn test_take_id_short_short_id() {
        let id = TakeId::new("abc");
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_user_id_display() {
        let id = UserId::new("U0123ABCD");
        assert_eq!(format!("{id}"), "U0123ABCD");
    }
}
