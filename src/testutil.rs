//! Shared test utilities.
//!
//! Helpers for building key pairs, claims and flaky stores used across the
//! crate's unit and integration tests. Feature-gated behind `testutil` to
//! keep them out of production builds.
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! keypair-cache = { path = ".", features = ["testutil"] }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use crate::{
    error::{KeyError, Result},
    keypair::{KeyAlgorithm, KeyPair, PublicKeyRecord},
    store::{KeyPairStore, PublicKeyStore},
};

/// Current time in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Generates an Ed25519 pair named `name`/`version` expiring `ttl_secs`
/// from now, with a one-day grace period.
///
/// # Panics
///
/// Panics if generation fails (should not happen with valid inputs).
#[must_use]
pub fn test_key_pair(name: &str, version: &str, ttl_secs: i64) -> KeyPair {
    let expires_at = unix_now().saturating_add_signed(ttl_secs);
    KeyPair::generate(KeyAlgorithm::Ed25519, name, version, expires_at, 1)
        .expect("test key pair generation")
}

/// Claims with a subject and an expiry `ttl_secs` from now.
#[must_use]
pub fn test_claims(sub: &str, ttl_secs: i64) -> Value {
    json!({
        "sub": sub,
        "iat": unix_now(),
        "exp": unix_now().saturating_add_signed(ttl_secs),
    })
}

/// Store whose fetches fail with [`KeyError::StoreUnavailable`] until
/// [`recover`](Self::recover) is called, then delegate to an inner store.
///
/// Counts attempted fetches so tests can assert backoff gating.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: S,
    healthy: std::sync::atomic::AtomicBool,
    fetches: AtomicU64,
}

impl<S> FlakyStore<S> {
    /// Wraps `inner`, starting in the failing state.
    pub fn failing(inner: S) -> Self {
        Self {
            inner,
            healthy: std::sync::atomic::AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    /// Lets subsequent fetches through to the inner store.
    pub fn recover(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }

    /// Makes subsequent fetches fail again.
    pub fn fail(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }

    /// The wrapped store, e.g. for publishing records directly.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of fetches attempted (failed or delegated).
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeyError::store_unavailable("injected outage"))
        }
    }
}

#[async_trait]
impl<S: KeyPairStore> KeyPairStore for FlakyStore<S> {
    async fn fetch_key_pair(&self, name: &str) -> Result<KeyPair> {
        self.check()?;
        self.inner.fetch_key_pair(name).await
    }
}

#[async_trait]
impl<S: PublicKeyStore> PublicKeyStore for FlakyStore<S> {
    async fn fetch_public_key(&self, name: &str, version: &str) -> Result<PublicKeyRecord> {
        self.check()?;
        self.inner.fetch_public_key(name, version).await
    }
}
