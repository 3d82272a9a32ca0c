//! Caching for full key pairs, keyed by name.
//!
//! [`KeyPairCache`] facilitates the use of rotatable key pairs stored in a
//! high-latency backing store by caching fetched pairs until their rotation
//! deadline, re-fetching on expiry, and retrying transient fetch failures
//! under per-key exponential backoff. In serverless environments the cache
//! is typically created once at module scope so warm instances share it
//! across invocations.
//!
//! While the cache can be used directly, it is usually consumed through
//! [`sign_with_key_pair_cache`](crate::jwt::sign_with_key_pair_cache).

use std::sync::Arc;

use crate::{
    cache::{CacheConfig, PerishableCache},
    clock::Clock,
    error::Result,
    keypair::KeyPair,
    store::KeyPairStore,
};

/// TTL/LRU/backoff cache over a [`KeyPairStore`], keyed by key name.
///
/// A cached pair is valid until its `expires_at`; past that the next get
/// re-fetches from the store, expecting the rotation process to have
/// published a newer version. If the freshly fetched pair is itself already
/// expired, or the fetch fails, callers observe the failure, gated by
/// backoff on repeated failures.
///
/// Cloning is cheap and shares the underlying cache state.
#[derive(Clone)]
pub struct KeyPairCache {
    cache: PerishableCache<String, KeyPair>,
    store: Arc<dyn KeyPairStore>,
}

impl KeyPairCache {
    /// Creates a cache over `store` with the given TTL/retry configuration.
    #[must_use]
    pub fn new(store: Arc<dyn KeyPairStore>, config: CacheConfig) -> Self {
        Self { cache: PerishableCache::new(config), store }
    }

    /// Creates a cache reading time from the given [`Clock`]. Test hook.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn KeyPairStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { cache: PerishableCache::with_clock(config, clock), store }
    }

    /// Resolves the named key pair, from cache or from the store.
    ///
    /// ***Note:*** the resolved pair includes the private key material;
    /// callers must treat it as security-sensitive and not persist it.
    ///
    /// # Errors
    ///
    /// Propagates the store's failure reason (or the recorded one while the
    /// retry gate is closed), or [`KeyError::KeyExpired`] when the fetched
    /// pair's rotation deadline has already passed.
    ///
    /// [`KeyError::KeyExpired`]: crate::error::KeyError::KeyExpired
    #[tracing::instrument(skip(self))]
    pub async fn get_key_pair(&self, name: &str) -> Result<KeyPair> {
        let store = Arc::clone(&self.store);
        let key_name = name.to_string();
        self.cache
            .get(name.to_string(), move |cx| async move {
                let pair = store.fetch_key_pair(&key_name).await?;
                cx.set_expires_at_ms(pair.expires_at.saturating_mul(1_000));
                Ok(pair)
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use super::*;
    use crate::{
        clock::ManualClock,
        error::KeyError,
        keypair::KeyAlgorithm,
        store::MemoryKeyStore,
    };

    fn config() -> CacheConfig {
        CacheConfig::new(
            NonZeroUsize::new(4).expect("non-zero"),
            Duration::from_millis(500),
            Duration::from_secs(120),
        )
    }

    fn pair(version: &str, expires_at: u64) -> KeyPair {
        KeyPair::generate(KeyAlgorithm::Ed25519, "signing", version, expires_at, 1)
            .expect("generate")
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_store() {
        let store = MemoryKeyStore::shared();
        store.publish(&pair("1", 2_000)); // expires at 2_000s = 2_000_000ms
        let clock = Arc::new(ManualClock::at(1_000_000));
        let cache = KeyPairCache::with_clock(Arc::clone(&store) as _, config(), clock);

        let first = cache.get_key_pair("signing").await.expect("resolve");
        let second = cache.get_key_pair("signing").await.expect("resolve");
        assert_eq!(first.version, "1");
        assert_eq!(second.version, "1");
        assert_eq!(store.key_pair_fetches(), 1);
    }

    #[tokio::test]
    async fn test_expiry_refetches_rotated_version() {
        let store = MemoryKeyStore::shared();
        store.publish(&pair("1", 2_000));
        let clock = Arc::new(ManualClock::at(1_000_000));
        let cache = KeyPairCache::with_clock(
            Arc::clone(&store) as _,
            config(),
            Arc::clone(&clock) as _,
        );

        assert_eq!(cache.get_key_pair("signing").await.expect("resolve").version, "1");

        // Rotation publishes version 2, then the cached pair's TTL elapses.
        store.publish(&pair("2", 4_000));
        clock.set_ms(2_000_000);
        assert_eq!(cache.get_key_pair("signing").await.expect("resolve").version, "2");
        assert_eq!(store.key_pair_fetches(), 2);
    }

    #[tokio::test]
    async fn test_fetched_pair_already_expired_is_stale() {
        let store = MemoryKeyStore::shared();
        store.publish(&pair("1", 100)); // expired long before "now"
        let clock = Arc::new(ManualClock::at(1_000_000));
        let cache = KeyPairCache::with_clock(Arc::clone(&store) as _, config(), clock);

        let result = cache.get_key_pair("signing").await;
        assert!(matches!(result, Err(KeyError::KeyExpired(_))));
    }

    #[tokio::test]
    async fn test_not_found_is_gated_by_backoff() {
        let store = MemoryKeyStore::shared();
        let clock = Arc::new(ManualClock::at(1_000_000));
        let cache = KeyPairCache::with_clock(
            Arc::clone(&store) as _,
            config(),
            Arc::clone(&clock) as _,
        );

        assert!(cache.get_key_pair("missing").await.is_err());
        assert!(cache.get_key_pair("missing").await.is_err());
        assert_eq!(store.key_pair_fetches(), 1, "second miss served from the failed entry");

        clock.advance_ms(500);
        assert!(cache.get_key_pair("missing").await.is_err());
        assert_eq!(store.key_pair_fetches(), 2, "retry gate opened");
    }
}
