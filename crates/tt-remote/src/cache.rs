//! Split registry cache using moka
//!
//! The split registry changes rarely and every visitor in a process reads
//! the same one, so [`CachedAuthority`] keeps it for a short TTL and lets
//! concurrent misses share a single fetch.

use crate::authority::{IdentifierRequest, RemoteAuthority, RemoteError, RemoteVisitor};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tt_split::{Assignment, SplitRegistry};

/// Default time a fetched split registry stays fresh
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(5);

/// Remote authority decorator caching the split registry
///
/// Failed fetches are not cached. All other calls pass straight through.
#[derive(Clone)]
pub struct CachedAuthority {
    inner: Arc<dyn RemoteAuthority>,
    registry: Cache<(), SplitRegistry>,
}

impl CachedAuthority {
    /// Wrap an authority with the default TTL
    #[inline]
    #[must_use]
    pub fn new(inner: Arc<dyn RemoteAuthority>) -> Self {
        Self::with_ttl(inner, DEFAULT_REGISTRY_TTL)
    }

    /// Wrap an authority with a custom TTL
    #[must_use]
    pub fn with_ttl(inner: Arc<dyn RemoteAuthority>, ttl: Duration) -> Self {
        Self {
            inner,
            registry: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    /// Drop the cached registry
    pub async fn invalidate(&self) {
        self.registry.invalidate(&()).await;
    }
}

impl std::fmt::Debug for CachedAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedAuthority")
            .field("cached", &self.registry.contains_key(&()))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RemoteAuthority for CachedAuthority {
    async fn fetch_visitor(&self, id: &str) -> Result<RemoteVisitor, RemoteError> {
        self.inner.fetch_visitor(id).await
    }

    async fn fetch_split_registry(&self) -> Result<SplitRegistry, RemoteError> {
        let inner = Arc::clone(&self.inner);
        self.registry
            .try_get_with((), async move {
                tracing::debug!("Split registry cache miss");
                inner.fetch_split_registry().await
            })
            .await
            .map_err(|e| (*e).clone())
    }

    async fn create_identifier(
        &self,
        request: &IdentifierRequest,
    ) -> Result<RemoteVisitor, RemoteError> {
        self.inner.create_identifier(request).await
    }

    async fn resolve_visitor_by_identifier(
        &self,
        identifier_type: &str,
        identifier_value: &str,
    ) -> Result<RemoteVisitor, RemoteError> {
        self.inner
            .resolve_visitor_by_identifier(identifier_type, identifier_value)
            .await
    }

    async fn persist_assignment(
        &self,
        visitor_id: &str,
        assignment: &Assignment,
    ) -> Result<(), RemoteError> {
        self.inner.persist_assignment(visitor_id, assignment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::MockRemoteAuthority;
    use pretty_assertions::assert_eq;

    fn registry() -> SplitRegistry {
        SplitRegistry::new().with_split("blue_button", [("false", 50), ("true", 50)])
    }

    #[tokio::test]
    async fn registry_fetched_once_within_ttl() {
        let mut mock = MockRemoteAuthority::new();
        mock.expect_fetch_split_registry()
            .times(1)
            .returning(|| Ok(registry()));
        let cached = CachedAuthority::new(Arc::new(mock));

        assert_eq!(cached.fetch_split_registry().await.unwrap(), registry());
        assert_eq!(cached.fetch_split_registry().await.unwrap(), registry());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut mock = MockRemoteAuthority::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_fetch_split_registry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(RemoteError::Server { status: 502 }));
        mock.expect_fetch_split_registry()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(registry()));
        let cached = CachedAuthority::new(Arc::new(mock));

        assert_eq!(
            cached.fetch_split_registry().await,
            Err(RemoteError::Server { status: 502 })
        );
        assert!(cached.fetch_split_registry().await.is_ok());
    }

    #[tokio::test]
    async fn registry_refetched_after_ttl() {
        let mut mock = MockRemoteAuthority::new();
        mock.expect_fetch_split_registry()
            .times(2)
            .returning(|| Ok(registry()));
        let cached = CachedAuthority::with_ttl(Arc::new(mock), Duration::from_millis(50));

        cached.fetch_split_registry().await.unwrap();
        // moka keeps its own clock, so this needs a real sleep
        tokio::time::sleep(Duration::from_millis(120)).await;
        cached.fetch_split_registry().await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let mut mock = MockRemoteAuthority::new();
        mock.expect_fetch_split_registry()
            .times(2)
            .returning(|| Ok(registry()));
        let cached = CachedAuthority::new(Arc::new(mock));

        cached.fetch_split_registry().await.unwrap();
        cached.invalidate().await;
        cached.fetch_split_registry().await.unwrap();
    }

    #[tokio::test]
    async fn other_calls_pass_through() {
        let mut mock = MockRemoteAuthority::new();
        mock.expect_fetch_visitor()
            .times(2)
            .returning(|id| Ok(RemoteVisitor::new(id)));
        let cached = CachedAuthority::new(Arc::new(mock));

        assert_eq!(cached.fetch_visitor("a").await.unwrap().id, "a");
        assert_eq!(cached.fetch_visitor("a").await.unwrap().id, "a");
    }
}
