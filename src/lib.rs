//! Caching for rotatable, cloud-stored signing key pairs.
//!
//! This crate facilitates the use of asymmetric key pairs that are rotated
//! on a schedule and kept in a high-latency, unreliable backing store (for
//! example a cloud secrets service). It solves three coupled problems:
//!
//! - avoid paying network latency on every use of a key,
//! - detect key expiration and react without serving stale material,
//! - tolerate transient fetch failures without hammering the backing store.
//!
//! The core is [`PerishableCache`], a keyed async-value cache with TTL
//! semantics, LRU eviction and per-key exponential-backoff retry gating.
//! Two specializations wrap it: [`KeyPairCache`] (signing side: re-fetches
//! on expiry, expecting rotation to have published a newer version) and
//! [`PublicKeyCache`] (verification side: a resolved version's expiry is
//! permanent, so it is never re-fetched). The [`jwt`] module binds the
//! caches to JWT signing and verification, embedding a `name/version` key
//! identifier in each token so verifiers can locate the exact version used.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use keypair_cache::{
//!     CacheConfig, KeyAlgorithm, KeyPair, KeyPairCache, MemoryKeyStore, PublicKeyCache,
//!     jwt::{sign_with_key_pair_cache, verify_with_public_key_cache},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), keypair_cache::KeyError> {
//! // A rotation process generates and publishes a pair.
//! let now = chrono::Utc::now().timestamp() as u64;
//! let pair = KeyPair::generate(KeyAlgorithm::Ed25519, "api-tokens", "1", now + 86_400, 1)?;
//! let store = MemoryKeyStore::shared();
//! store.publish(&pair);
//!
//! // Signing and verifying services each front the store with a cache.
//! let signing_keys = KeyPairCache::new(Arc::clone(&store) as _, CacheConfig::default());
//! let verify_keys = PublicKeyCache::new(Arc::clone(&store) as _, CacheConfig::default());
//!
//! let claims = serde_json::json!({ "sub": "user-1", "exp": now + 3_600 });
//! let token = sign_with_key_pair_cache(&signing_keys, &claims, "api-tokens").await?;
//! let decoded: serde_json::Value =
//!     verify_with_public_key_cache(&verify_keys, &token, "api-tokens").await?;
//! assert_eq!(decoded["sub"], "user-1");
//! # Ok(())
//! # }
//! ```
//!
//! The caches are process-local, in-memory state; persistence across
//! restarts and cross-process coherency are out of scope. In serverless
//! environments, create the caches once at module scope so warm instances
//! reuse them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The perishable retry cache engine.
pub mod cache;
/// Time source abstraction.
pub mod clock;
/// Key and token error types.
pub mod error;
/// JWT sign/verify binding.
pub mod jwt;
/// Key pair data model and generation.
pub mod keypair;
/// Key pair cache (signing side).
pub mod keypair_cache;
/// Public key cache (verification side).
pub mod public_key_cache;
/// Storage traits and the in-memory store.
pub mod store;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

// Re-export key types for convenience
pub use cache::{CacheConfig, FetchContext, PerishableCache};
pub use clock::{Clock, SystemClock};
pub use error::{KeyError, Result};
pub use keypair::{DEFAULT_GRACE_DAYS, KeyAlgorithm, KeyId, KeyPair, PublicKeyRecord};
pub use keypair_cache::KeyPairCache;
pub use public_key_cache::PublicKeyCache;
pub use store::{KeyPairStore, MemoryKeyStore, PublicKeyStore};
