//! Display-name resolution with single-flight caching.
//!
//! User ids are opaque external identifiers; responses and notifications
//! read better with a display name. Lookups go through a `NameSource`
//! (identity by default, a directory service in deployment) behind the
//! single-flight cache so a burst of commands for one user costs one
//! lookup. Resolution failures fall back to the raw id, never an error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use takes_core::UserId;

use crate::cache::SingleFlightCache;

/// How long a resolved name stays fresh.
const NAME_TTL: Duration = Duration::from_secs(600);

/// Backend that maps a user id to a display name.
#[async_trait]
pub trait NameSource: Send + Sync {
    async fn lookup(&self, user_id: &UserId) -> anyhow::Result<String>;
}

/// Fallback source: the display name is the id itself.
pub struct IdentityNameSource;

#[async_trait]
impl NameSource for IdentityNameSource {
    async fn lookup(&self, user_id: &UserId) -> anyhow::Result<String> {
        Ok(user_id.as_str().to_string())
    }
}

/// Cached directory of display names.
pub struct NameDirectory {
    source: Arc<dyn NameSource>,
    cache: SingleFlightCache<UserId, String>,
}

impl NameDirectory {
    pub fn new(source: Arc<dyn NameSource>) -> Self {
        Self {
            source,
            cache: SingleFlightCache::new(NAME_TTL),
        }
    }

    /// Directory that echoes ids back, for deployments without a backend.
    pub fn identity() -> Self {
        Self::new(Arc::new(IdentityNameSource))
    }

    /// Resolves a display name, falling back to the raw id on failure.
    pub async fn display_name(&self, user_id: &UserId) -> String {
        let source = Arc::clone(&self.source);
        let lookup_id = user_id.clone();
        match self
            .cache
            .get_or_fetch(user_id.clone(), move || async move {
                source.lookup(&lookup_id).await
            })
            .await
        {
            Ok(name) => name,
            Err(e) => {
                debug!(user_id = %user_id, error = %e, "Name lookup failed, using id");
                user_id.as_str().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl NameSource for CountingSource {
        async fn lookup(&self, user_id: &UserId) -> anyhow::Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("name-of-{user_id}"))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl NameSource for FailingSource {
        async fn lookup(&self, _user_id: &UserId) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("directory down"))
        }
    }

    #[tokio::test]
    async fn test_identity_directory() {
        let names = NameDirectory::identity();
        assert_eq!(names.display_name(&UserId::new("U1")).await, "U1");
    }

    #[tokio::test]
    async fn test_lookup_is_cached() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let names = NameDirectory::new(Arc::clone(&source) as Arc<dyn NameSource>);

        for _ in 0..3 {
            assert_eq!(names.display_name(&UserId::new("U1")).await, "name-of-U1");
        }
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        // A different user triggers its own lookup.
        names.display_name(&UserId::new("U2")).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_id() {
        let names = NameDirectory::new(Arc::new(FailingSource));
        assert_eq!(names.display_name(&UserId::new("U1")).await, "U1");
    }
}
