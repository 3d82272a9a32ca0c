//! End-to-end rotation and outage scenarios.
//!
//! These tests drive the full path — factory, store, both caches, token
//! binding — the way a signing service and a verifying service would share
//! a backing store across a key rotation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use keypair_cache::{
    CacheConfig, KeyError, KeyPairCache, MemoryKeyStore, PublicKeyCache,
    clock::ManualClock,
    jwt::{sign_with_key_pair_cache, verify_with_public_key_cache},
    testutil::{FlakyStore, test_claims, test_key_pair, unix_now},
};
use serde_json::Value;

/// Caches for the signing and verifying side over one store, each driven by
/// its own manual clock starting at the real wall time. Token `exp`/`nbf`
/// claims are checked by the JWT library against the wall clock, so the
/// manual clocks must start in agreement with it.
fn rig(
    store: &Arc<MemoryKeyStore>,
) -> (KeyPairCache, Arc<ManualClock>, PublicKeyCache, Arc<ManualClock>) {
    let sign_clock = Arc::new(ManualClock::at(unix_now() * 1_000));
    let verify_clock = Arc::new(ManualClock::at(unix_now() * 1_000));
    let sign_cache = KeyPairCache::with_clock(
        Arc::clone(store) as _,
        CacheConfig::default(),
        Arc::clone(&sign_clock) as _,
    );
    let verify_cache = PublicKeyCache::with_clock(
        Arc::clone(store) as _,
        CacheConfig::default(),
        Arc::clone(&verify_clock) as _,
    );
    (sign_cache, sign_clock, verify_cache, verify_clock)
}

#[tokio::test]
async fn tokens_signed_before_rotation_verify_during_grace() {
    let store = MemoryKeyStore::shared();
    let (sign_cache, sign_clock, verify_cache, verify_clock) = rig(&store);

    // Version 1 rotates out 100 seconds from now; its public record stays
    // valid a further grace day.
    let v1 = test_key_pair("rotate", "1", 100);
    store.publish(&v1);

    let before = sign_with_key_pair_cache(&sign_cache, &test_claims("alice", 3_600), "rotate")
        .await
        .expect("sign with v1");

    // Rotation publishes version 2 and v1's deadline passes.
    store.publish(&test_key_pair("rotate", "2", 7_200));
    sign_clock.advance_ms(101 * 1_000);

    let after = sign_with_key_pair_cache(&sign_cache, &test_claims("bob", 3_600), "rotate")
        .await
        .expect("sign with v2");

    // The pre-rotation token still verifies: record v1 is inside its grace
    // window. The post-rotation token verifies under v2.
    let decoded: Value = verify_with_public_key_cache(&verify_cache, &before, "rotate")
        .await
        .expect("verify pre-rotation token");
    assert_eq!(decoded["sub"], "alice");

    let decoded: Value = verify_with_public_key_cache(&verify_cache, &after, "rotate")
        .await
        .expect("verify post-rotation token");
    assert_eq!(decoded["sub"], "bob");

    assert_eq!(store.key_pair_fetches(), 2, "one fetch per key pair version");
    assert_eq!(store.public_key_fetches(), 2, "one fetch per public key version");

    // Once record v1's grace-extended expiry passes, the old token is gone
    // for good: the cache reports expiry without contacting the store again.
    verify_clock.set_ms((v1.public_key_record().expires_at + 1) * 1_000);
    let expired: Result<Value, _> =
        verify_with_public_key_cache(&verify_cache, &before, "rotate").await;
    assert!(matches!(expired, Err(KeyError::KeyExpired(ref id)) if id == "rotate/1"));
    assert_eq!(store.public_key_fetches(), 2, "expired version not re-fetched");
}

#[tokio::test]
async fn signing_survives_a_store_outage_with_backoff() {
    let flaky = Arc::new(FlakyStore::failing(MemoryKeyStore::new()));
    flaky.inner().publish(&test_key_pair("signing", "1", 3_600));

    let clock = Arc::new(ManualClock::at(unix_now() * 1_000));
    let cache = KeyPairCache::with_clock(
        Arc::clone(&flaky) as _,
        CacheConfig::default(),
        Arc::clone(&clock) as _,
    );

    // The outage surfaces as the store's own reason, and repeated attempts
    // inside the gate do not reach the store.
    let claims = test_claims("alice", 3_600);
    let down = sign_with_key_pair_cache(&cache, &claims, "signing").await;
    assert!(matches!(down, Err(KeyError::StoreUnavailable(_))));
    let down = sign_with_key_pair_cache(&cache, &claims, "signing").await;
    assert!(matches!(down, Err(KeyError::StoreUnavailable(_))));
    assert_eq!(flaky.fetches(), 1);

    // Store recovers; the retry after the first gate succeeds.
    flaky.recover();
    clock.advance_ms(500);
    let token = sign_with_key_pair_cache(&cache, &claims, "signing")
        .await
        .expect("sign after recovery");
    assert!(!token.is_empty());
    assert_eq!(flaky.fetches(), 2);
}

#[tokio::test]
async fn verification_keeps_working_from_cache_during_outage() {
    let flaky = Arc::new(FlakyStore::failing(MemoryKeyStore::new()));
    flaky.inner().publish(&test_key_pair("signing", "1", 3_600));
    flaky.recover();

    let sign_cache = KeyPairCache::new(Arc::clone(&flaky) as _, CacheConfig::default());
    let verify_cache = PublicKeyCache::new(Arc::clone(&flaky) as _, CacheConfig::default());

    let token = sign_with_key_pair_cache(&sign_cache, &test_claims("alice", 3_600), "signing")
        .await
        .expect("sign");
    let _: Value = verify_with_public_key_cache(&verify_cache, &token, "signing")
        .await
        .expect("first verify populates the cache");

    // A fresh outage is invisible to verifiers of the cached version.
    flaky.fail();
    let fetches_before = flaky.fetches();
    let _: Value = verify_with_public_key_cache(&verify_cache, &token, "signing")
        .await
        .expect("verify from cache during outage");
    assert_eq!(flaky.fetches(), fetches_before);
}
