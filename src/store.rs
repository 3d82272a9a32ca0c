//! Storage traits for key pair retrieval.
//!
//! The caches are agnostic towards key storage: callers supply the backing
//! store as an implementation of [`KeyPairStore`] (fetch the latest pair by
//! name, used when signing) and/or [`PublicKeyStore`] (fetch an exact
//! version's public record, used when verifying). Production
//! implementations typically front a high-latency secrets service; the
//! bundled [`MemoryKeyStore`] serves tests and development.
//!
//! # Error Mapping
//!
//! Implementations map their backend failures onto [`KeyError`]:
//! a missing record is [`KeyError::KeyNotFound`]; connection and timeout
//! failures are [`KeyError::StoreUnavailable`] so the caches retry them
//! under backoff. Bounding the fetch's own duration (timeouts,
//! cancellation) is the store implementation's responsibility — the caches
//! impose none.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{KeyError, Result},
    keypair::{KeyPair, PublicKeyRecord},
};

/// Backing store access for full key pairs, looked up by name.
///
/// If the named key is on a rotation schedule and multiple versions exist,
/// implementations must yield the most recent version — the key pair cache
/// re-fetches on expiry expecting rotation to have published a newer one.
#[async_trait]
pub trait KeyPairStore: Send + Sync {
    /// Fetches the latest version of the named key pair.
    ///
    /// # Errors
    ///
    /// [`KeyError::KeyNotFound`] when the store has no record for `name`;
    /// [`KeyError::StoreUnavailable`] (or another caller-chosen reason) on
    /// backend failure.
    async fn fetch_key_pair(&self, name: &str) -> Result<KeyPair>;
}

/// Backing store access for published public key records, looked up by
/// name and version.
#[async_trait]
pub trait PublicKeyStore: Send + Sync {
    /// Fetches the public key record for an exact `(name, version)`.
    ///
    /// # Errors
    ///
    /// [`KeyError::KeyNotFound`] when the store has no record for the
    /// version; [`KeyError::StoreUnavailable`] (or another caller-chosen
    /// reason) on backend failure.
    async fn fetch_public_key(&self, name: &str, version: &str) -> Result<PublicKeyRecord>;
}

/// In-memory implementation of both store traits.
///
/// Suitable for tests and development. [`publish`](Self::publish) mirrors a
/// rotation process: it replaces the latest pair for the name and adds the
/// derived public record for the pair's version. Fetch counters let tests
/// assert how often the caches actually reached the store.
///
/// # Examples
///
/// ```
/// use keypair_cache::{KeyAlgorithm, KeyPair, MemoryKeyStore};
///
/// # fn main() -> Result<(), keypair_cache::KeyError> {
/// let store = MemoryKeyStore::new();
/// let pair = KeyPair::generate(KeyAlgorithm::Ed25519, "signing", "1", 2_000_000_000, 1)?;
/// store.publish(&pair);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    pairs: RwLock<HashMap<String, KeyPair>>,
    records: RwLock<HashMap<(String, String), PublicKeyRecord>>,
    key_pair_fetches: AtomicU64,
    public_key_fetches: AtomicU64,
}

impl MemoryKeyStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store behind an [`Arc`], ready to share with the
    /// caches.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publishes a pair the way a rotation process would: the pair becomes
    /// the latest version for its name, and its derived public record is
    /// added under `(name, version)`.
    pub fn publish(&self, pair: &KeyPair) {
        self.records
            .write()
            .insert((pair.name.clone(), pair.version.clone()), pair.public_key_record());
        self.pairs.write().insert(pair.name.clone(), pair.clone());
    }

    /// Removes the latest pair for `name`, leaving published public records
    /// in place (rotation never unpublishes old versions).
    pub fn remove_key_pair(&self, name: &str) {
        self.pairs.write().remove(name);
    }

    /// Number of [`KeyPairStore::fetch_key_pair`] calls served.
    #[must_use]
    pub fn key_pair_fetches(&self) -> u64 {
        self.key_pair_fetches.load(Ordering::SeqCst)
    }

    /// Number of [`PublicKeyStore::fetch_public_key`] calls served.
    #[must_use]
    pub fn public_key_fetches(&self) -> u64 {
        self.public_key_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyPairStore for MemoryKeyStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_key_pair(&self, name: &str) -> Result<KeyPair> {
        self.key_pair_fetches.fetch_add(1, Ordering::SeqCst);
        self.pairs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KeyError::key_not_found(name))
    }
}

#[async_trait]
impl PublicKeyStore for MemoryKeyStore {
    #[tracing::instrument(skip(self))]
    async fn fetch_public_key(&self, name: &str, version: &str) -> Result<PublicKeyRecord> {
        self.public_key_fetches.fetch_add(1, Ordering::SeqCst);
        self.records
            .read()
            .get(&(name.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| KeyError::key_not_found(format!("{name}/{version}")))
    }
}
