//! Per-run memoization of provider outcomes.
//!
//! Keyed by `(domain, provider)`. Only final outcomes are stored: a fetch
//! that ends in an error leaves the slot empty. Concurrent callers for the
//! same key share one in-flight fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use enricher_providers::{Lookup, ProviderKind, ProviderRecord};
use enricher_shared::{CanonicalDomain, Result};
use tokio::sync::{Mutex, OnceCell};
use tracing::trace;

type Key = (CanonicalDomain, ProviderKind);
type Slot = Arc<OnceCell<Lookup<ProviderRecord>>>;

/// Hit/miss counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Write-through, no eviction. Lives exactly as long as one pipeline run.
#[derive(Default)]
pub struct ResponseCache {
    slots: Mutex<HashMap<Key, Slot>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, domain: &CanonicalDomain, kind: ProviderKind) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry((domain.clone(), kind)).or_default().clone()
    }

    /// Stored outcome, if a final one exists.
    pub async fn get(
        &self,
        domain: &CanonicalDomain,
        kind: ProviderKind,
    ) -> Option<Lookup<ProviderRecord>> {
        let slots = self.slots.lock().await;
        let value = slots
            .get(&(domain.clone(), kind))
            .and_then(|slot| slot.get().cloned());
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Store a final outcome. The first outcome for a key wins; returns
    /// `false` when one was already present.
    pub async fn put(
        &self,
        domain: &CanonicalDomain,
        kind: ProviderKind,
        outcome: Lookup<ProviderRecord>,
    ) -> bool {
        self.slot(domain, kind).await.set(outcome).is_ok()
    }

    /// Return the stored outcome or run `fetch` once to produce it.
    ///
    /// Errors from `fetch` are returned to the caller and not stored.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        domain: &CanonicalDomain,
        kind: ProviderKind,
        fetch: F,
    ) -> Result<Lookup<ProviderRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Lookup<ProviderRecord>>>,
    {
        let slot = self.slot(domain, kind).await;
        let mut fetched = false;
        let value = slot
            .get_or_try_init(|| {
                fetched = true;
                fetch()
            })
            .await?
            .clone();

        if fetched {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(%domain, %kind, "cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.slots.lock().await.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use enricher_providers::{AttributeRecord, GraphOrganization};
    use enricher_shared::EnricherError;

    use super::*;

    fn domain(d: &str) -> CanonicalDomain {
        CanonicalDomain::from_normalized(d)
    }

    fn graph_record(id: &str) -> Lookup<ProviderRecord> {
        Lookup::Found(ProviderRecord::RelationshipGraph(GraphOrganization {
            id: Some(id.into()),
            ..GraphOrganization::default()
        }))
    }

    #[tokio::test]
    async fn put_keeps_first_outcome() {
        let cache = ResponseCache::new();
        let acme = domain("acme.com");

        assert!(cache.get(&acme, ProviderKind::SearchIndex).await.is_none());
        assert!(cache.put(&acme, ProviderKind::SearchIndex, Lookup::NotFound).await);
        assert!(
            !cache
                .put(
                    &acme,
                    ProviderKind::SearchIndex,
                    Lookup::Found(ProviderRecord::SearchIndex(AttributeRecord::default()))
                )
                .await
        );
        assert_eq!(
            cache.get(&acme, ProviderKind::SearchIndex).await,
            Some(Lookup::NotFound)
        );
        // Different provider, same domain: separate slot.
        assert!(cache.get(&acme, ProviderKind::Crm).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = ResponseCache::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let acme = domain("acme.com");

        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(graph_record("42"))
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch(&acme, ProviderKind::RelationshipGraph, fetch),
            cache.get_or_fetch(&acme, ProviderKind::RelationshipGraph, fetch),
            cache.get_or_fetch(&acme, ProviderKind::RelationshipGraph, fetch),
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), graph_record("42"));
        assert_eq!(b.unwrap(), graph_record("42"));
        assert_eq!(c.unwrap(), graph_record("42"));

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ResponseCache::new();
        let acme = domain("acme.com");

        let err = cache
            .get_or_fetch(&acme, ProviderKind::SearchIndex, || async {
                Err(EnricherError::Network("timeout".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(cache.get(&acme, ProviderKind::SearchIndex).await.is_none());

        let value = cache
            .get_or_fetch(&acme, ProviderKind::SearchIndex, || async {
                Ok(Lookup::NotFound)
            })
            .await
            .unwrap();
        assert_eq!(value, Lookup::NotFound);
    }
}
