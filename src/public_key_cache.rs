//! Caching for published public keys, keyed by name and version.
//!
//! [`PublicKeyCache`] backs token verification: a verifier resolves the
//! exact key version named by a token's key identifier. Because a version's
//! expiry never changes once published, an expired version is reported as
//! permanently expired without contacting the backing store again —
//! re-fetching could never yield a different answer. Callers seeing that
//! failure should expect a newer key version in newer tokens, not a
//! recovery of the old one.
//!
//! While the cache can be used directly, it is usually consumed through
//! [`verify_with_public_key_cache`](crate::jwt::verify_with_public_key_cache).

use std::sync::Arc;

use crate::{
    cache::{CacheConfig, PerishableCache},
    clock::Clock,
    error::{KeyError, Result},
    keypair::{KeyId, PublicKeyRecord},
    store::PublicKeyStore,
};

/// TTL/LRU/backoff cache over a [`PublicKeyStore`], keyed by
/// `(name, version)`.
///
/// Transient fetch failures are retried under per-key backoff like the key
/// pair cache; expiry of a successfully resolved version is permanent.
///
/// Cloning is cheap and shares the underlying cache state.
#[derive(Clone)]
pub struct PublicKeyCache {
    cache: PerishableCache<KeyId, PublicKeyRecord>,
    store: Arc<dyn PublicKeyStore>,
}

impl PublicKeyCache {
    /// Creates a cache over `store` with the given TTL/retry configuration.
    #[must_use]
    pub fn new(store: Arc<dyn PublicKeyStore>, config: CacheConfig) -> Self {
        Self { cache: PerishableCache::new(config), store }
    }

    /// Creates a cache reading time from the given [`Clock`]. Test hook.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn PublicKeyStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { cache: PerishableCache::with_clock(config, clock), store }
    }

    /// Resolves the PEM-encoded public key for an exact key version.
    ///
    /// # Errors
    ///
    /// Propagates the store's failure reason under the retry gate, or
    /// [`KeyError::KeyExpired`] — permanently — once the version's
    /// grace-extended expiry has passed.
    #[tracing::instrument(skip(self))]
    pub async fn get_public_key(&self, name: &str, version: &str) -> Result<String> {
        let id = KeyId::new(name, version);
        let store = Arc::clone(&self.store);
        let fetch_id = id.clone();
        self.cache
            .get(id, move |cx| async move {
                // A version's expiry is immutable: once this key resolved we
                // know a re-fetch cannot produce a later expiry, so fail
                // without contacting the store.
                if cx.previously_resolved() {
                    return Err(KeyError::key_expired(fetch_id.to_string()));
                }
                let record = store.fetch_public_key(&fetch_id.name, &fetch_id.version).await?;
                cx.set_expires_at_ms(record.expires_at.saturating_mul(1_000));
                Ok(record)
            })
            .await
            .map(|record| record.public_key_pem)
    }
}
