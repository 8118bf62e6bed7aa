//! Key id → decoding key resolution, with an optional TTL cache.
//!
//! # Architecture
//!
//! ```text
//! kid from token header
//!   → cache enabled? check local cache (per kid, TTL)
//!   → miss? fetch the whole key set from the provider
//!   → repopulate the cache with every RSA key in the set
//!   → look the kid up in the fresh set
//! ```
//!
//! Without a cache every resolution fetches the key set, matching the
//! per-request lookup of the issuer's JWKS. With a cache, a kid that is not
//! cached always triggers a fresh fetch, so a rotated key becomes usable as
//! soon as the issuer publishes it.
//!
//! The cache is a [`moka::future::Cache`]: reads are concurrent and a refresh
//! inserting new entries never blocks readers of entries that are still valid.

use std::{sync::Arc, time::Duration};

use jsonwebtoken::DecodingKey;
use moka::future::Cache;

use crate::{error::AuthError, jwks::KeySetProvider};

/// Default maximum cache capacity.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

/// Resolves key ids to RSA decoding keys via a [`KeySetProvider`].
pub struct KeyResolver {
    provider: Arc<dyn KeySetProvider>,
    /// Decoding keys by kid; `None` disables caching.
    cache: Option<Cache<String, Arc<DecodingKey>>>,
}

impl KeyResolver {
    /// Creates a resolver that fetches the key set on every call.
    #[must_use]
    pub fn uncached(provider: Arc<dyn KeySetProvider>) -> Self {
        Self { provider, cache: None }
    }

    /// Creates a resolver that caches decoding keys for `ttl`.
    #[must_use]
    pub fn cached(provider: Arc<dyn KeySetProvider>, ttl: Duration) -> Self {
        Self::with_capacity(provider, ttl, DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a caching resolver with a custom capacity.
    #[must_use]
    pub fn with_capacity(
        provider: Arc<dyn KeySetProvider>,
        ttl: Duration,
        max_capacity: u64,
    ) -> Self {
        let cache = Cache::builder().time_to_live(ttl).max_capacity(max_capacity).build();
        Self { provider, cache: Some(cache) }
    }

    /// Whether decoding keys are cached between calls.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Returns the decoding key for `kid`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::KeyFetch`] if the key set cannot be fetched
    /// - [`AuthError::KeyNotFound`] if no key in the set has this kid
    /// - [`AuthError::TokenUnparseable`] if the matching key is not a usable RSA key
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<DecodingKey>, AuthError> {
        if let Some(cache) = &self.cache {
            if let Some(key) = cache.get(kid).await {
                tracing::debug!(cache = "hit", "resolved signing key");
                return Ok(key);
            }
            tracing::debug!(cache = "miss", "fetching key set");
        }

        let key_set = self.provider.fetch_key_set().await?;

        if let Some(cache) = &self.cache {
            for jwk in &key_set.keys {
                // Keys that cannot verify RS256 are skipped here and reported
                // only if a token actually names them below.
                if let Ok(key) = jwk.decoding_key() {
                    cache.insert(jwk.kid.clone(), Arc::new(key)).await;
                }
            }
        }

        let Some(jwk) = key_set.find(kid) else {
            tracing::debug!(available = key_set.keys.len(), "no key matches kid");
            return Err(AuthError::key_not_found(kid));
        };

        Ok(Arc::new(jwk.decoding_key()?))
    }

    /// Removes a key from the cache, forcing the next lookup to refetch.
    #[tracing::instrument(skip(self))]
    pub async fn invalidate(&self, kid: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(kid).await;
            tracing::info!(kid, "invalidated cached signing key");
        }
    }

    /// Clears every cached key.
    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            tracing::info!("cleared signing key cache");
        }
    }

    /// Returns the number of cached keys.
    ///
    /// Note: This count is eventually consistent. For accurate counts in tests,
    /// call `sync` first.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.as_ref().map_or(0, |cache| cache.entry_count())
    }

    /// Synchronizes pending cache operations.
    #[cfg(test)]
    pub async fn sync(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks().await;
        }
    }
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver").field("cached", &self.is_cached()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        jwks::{JwkSet, StaticKeySetProvider},
        testutil::{PRIMARY_KID, SECONDARY_KID, primary_jwk, secondary_jwk},
    };

    /// Provider whose key set can be replaced, counting fetches.
    struct SwappableSet {
        set: Mutex<JwkSet>,
        fetches: AtomicUsize,
        fail: AtomicBool,
    }

    impl SwappableSet {
        fn new(set: JwkSet) -> Self {
            Self { set: Mutex::new(set), fetches: AtomicUsize::new(0), fail: AtomicBool::new(false) }
        }

        fn replace(&self, set: JwkSet) {
            *self.set.lock().expect("lock") = set;
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySetProvider for SwappableSet {
        async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthError::key_fetch("issuer unreachable"));
            }
            Ok(self.set.lock().expect("lock").clone())
        }
    }

    fn primary_set() -> JwkSet {
        JwkSet { keys: vec![primary_jwk(PRIMARY_KID)] }
    }

    #[tokio::test]
    async fn test_key_not_found() {
        let resolver = KeyResolver::uncached(Arc::new(StaticKeySetProvider::new(primary_set())));

        let result = resolver.resolve("nonexistent").await;

        assert!(matches!(result, Err(AuthError::KeyNotFound { kid }) if kid == "nonexistent"));
    }

    #[tokio::test]
    async fn test_uncached_fetches_every_time() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::uncached(Arc::clone(&provider) as Arc<dyn KeySetProvider>);

        resolver.resolve(PRIMARY_KID).await.unwrap();
        resolver.resolve(PRIMARY_KID).await.unwrap();

        assert_eq!(provider.fetch_count(), 2);
        assert!(!resolver.is_cached());
        assert_eq!(resolver.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(60),
        );

        resolver.resolve(PRIMARY_KID).await.unwrap();
        resolver.resolve(PRIMARY_KID).await.unwrap();
        resolver.sync().await;

        assert_eq!(provider.fetch_count(), 1);
        assert_eq!(resolver.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_rotated_key_is_fetched() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );
        resolver.resolve(PRIMARY_KID).await.unwrap();

        // Issuer rotates: the new key is published alongside the old one.
        provider.replace(JwkSet { keys: vec![primary_jwk(PRIMARY_KID), secondary_jwk(SECONDARY_KID)] });

        assert!(resolver.resolve(SECONDARY_KID).await.is_ok());
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_each_time() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );

        assert!(resolver.resolve("unknown").await.is_err());
        assert!(resolver.resolve("unknown").await.is_err());
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        provider.set_failing(true);
        let resolver = KeyResolver::uncached(Arc::clone(&provider) as Arc<dyn KeySetProvider>);

        let result = resolver.resolve(PRIMARY_KID).await;
        assert!(matches!(result, Err(AuthError::KeyFetch { .. })));
    }

    #[tokio::test]
    async fn test_cached_key_survives_issuer_outage() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );
        resolver.resolve(PRIMARY_KID).await.unwrap();

        provider.set_failing(true);
        assert!(resolver.resolve(PRIMARY_KID).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );
        resolver.resolve(PRIMARY_KID).await.unwrap();

        resolver.invalidate(PRIMARY_KID).await;
        resolver.resolve(PRIMARY_KID).await.unwrap();

        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let provider = Arc::new(SwappableSet::new(JwkSet {
            keys: vec![primary_jwk(PRIMARY_KID), secondary_jwk(SECONDARY_KID)],
        }));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );
        resolver.resolve(PRIMARY_KID).await.unwrap();
        resolver.sync().await;
        assert_eq!(resolver.entry_count(), 2);

        resolver.clear();
        resolver.sync().await;
        assert_eq!(resolver.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_millis(50),
        );
        resolver.resolve(PRIMARY_KID).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        resolver.sync().await;

        resolver.resolve(PRIMARY_KID).await.unwrap();
        assert_eq!(provider.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_non_rsa_key_not_cached() {
        let mut ec_key = secondary_jwk("ec-key");
        ec_key.kty = "EC".into();
        let provider =
            Arc::new(SwappableSet::new(JwkSet { keys: vec![primary_jwk(PRIMARY_KID), ec_key] }));
        let resolver = KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        );

        let result = resolver.resolve("ec-key").await;
        assert!(matches!(result, Err(AuthError::TokenUnparseable { .. })));
        resolver.sync().await;
        assert_eq!(resolver.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolves() {
        let provider = Arc::new(SwappableSet::new(primary_set()));
        let resolver = Arc::new(KeyResolver::cached(
            Arc::clone(&provider) as Arc<dyn KeySetProvider>,
            Duration::from_secs(600),
        ));
        resolver.resolve(PRIMARY_KID).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move { resolver.resolve(PRIMARY_KID).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // warm cache: no further fetches
        assert_eq!(provider.fetch_count(), 1);
    }
}
