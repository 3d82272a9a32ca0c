//! Perishable retry cache: keyed async values with TTL, LRU eviction and
//! backoff-gated retry.
//!
//! [`PerishableCache`] is the engine behind [`KeyPairCache`] and
//! [`PublicKeyCache`]. Given a key and a producer (an async fetch plus a
//! validity window reported through [`FetchContext`]), it returns a result
//! that is cache-consistent, TTL-bounded, LRU-evicted and backoff-gated on
//! failure.
//!
//! # Entry lifecycle
//!
//! Exactly one entry exists per key at a time:
//!
//! - **Pending** — a fetch is in flight. Concurrent callers for the same key
//!   join the in-flight attempt instead of issuing duplicate fetches, so the
//!   backing store sees at most one outstanding fetch per key.
//! - **Fresh** — a value with an absolute expiry. Returned only while
//!   `now < expires_at_ms`; crossing that boundary invalidates the entry for
//!   reads even though it is not actively purged.
//! - **Failed** — a rejection reason with a retry gate. The same reason is
//!   yielded to every caller until `now >= next_retry_at_ms`, then the next
//!   caller triggers a new fetch. Consecutive failures double the gate delay
//!   up to the configured ceiling; a success resets it.
//!
//! Inserting a new key at capacity evicts the least-recently-used entry
//! wholesale, discarding its TTL, backoff and resolved-once state.
//!
//! # Failure reasons
//!
//! Reasons are opaque to the engine; it only synthesizes
//! [`KeyError::KeyExpired`] when a producer's value arrives with its
//! validity window already elapsed.
//!
//! [`KeyPairCache`]: crate::keypair_cache::KeyPairCache
//! [`PublicKeyCache`]: crate::public_key_cache::PublicKeyCache

use std::{fmt, future::Future, hash::Hash, num::NonZeroUsize, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;

use crate::{
    clock::{Clock, SystemClock},
    error::{KeyError, Result},
};

/// Default LRU capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 16;

/// Default delay before the first retry after a fetch failure.
pub const DEFAULT_RETRY_FIRST_DELAY: Duration = Duration::from_millis(500);

/// Default backoff ceiling for consecutive fetch failures.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(120);

/// Configuration for a [`PerishableCache`].
///
/// `retry_max_delay` is normalized at construction to be at least
/// `retry_first_delay`, so the backoff ceiling can never undercut the
/// starting delay.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    pub max_entries: NonZeroUsize,
    /// Delay applied after the first consecutive fetch failure for a key.
    pub retry_first_delay: Duration,
    /// Ceiling for the per-key exponential backoff delay.
    pub retry_max_delay: Duration,
}

impl CacheConfig {
    /// Creates a configuration, normalizing the backoff ceiling.
    #[must_use]
    pub fn new(
        max_entries: NonZeroUsize,
        retry_first_delay: Duration,
        retry_max_delay: Duration,
    ) -> Self {
        Self {
            max_entries,
            retry_first_delay,
            retry_max_delay: retry_max_delay.max(retry_first_delay),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            retry_first_delay: DEFAULT_RETRY_FIRST_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

/// Per-attempt mutable context handed to the producer.
///
/// The producer reports the fetched value's absolute expiry through
/// [`set_expires_at_ms`](Self::set_expires_at_ms) before returning; the
/// engine reads it back once the producer's asynchronous step completes.
/// A value whose reported expiry is not in the future (or left unset) is
/// treated as a [`KeyError::KeyExpired`] failure.
///
/// [`previously_resolved`](Self::previously_resolved) reports whether this
/// key has ever resolved successfully since it entered the cache. Producers
/// whose values are immutable per key (e.g. a versioned public key) use it
/// to short-circuit pointless re-fetches.
#[derive(Debug, Clone)]
pub struct FetchContext {
    state: Arc<ContextState>,
}

#[derive(Debug)]
struct ContextState {
    expires_at_ms: Mutex<Option<u64>>,
    resolved_once: bool,
}

impl FetchContext {
    fn new(resolved_once: bool) -> Self {
        Self { state: Arc::new(ContextState { expires_at_ms: Mutex::new(None), resolved_once }) }
    }

    /// Sets the fetched value's absolute expiry in epoch milliseconds.
    pub fn set_expires_at_ms(&self, expires_at_ms: u64) {
        *self.state.expires_at_ms.lock() = Some(expires_at_ms);
    }

    /// Whether this key has resolved successfully at least once before.
    #[must_use]
    pub fn previously_resolved(&self) -> bool {
        self.state.resolved_once
    }

    fn expires_at_ms(&self) -> Option<u64> {
        *self.state.expires_at_ms.lock()
    }
}

type SharedAttempt<V> = Shared<BoxFuture<'static, Result<V>>>;

enum EntryState<V> {
    /// Fetch in flight; waiters join the shared future.
    Pending { attempt: u64, future: SharedAttempt<V> },
    /// Resolved value, valid while `now < expires_at_ms`.
    Fresh { value: V, expires_at_ms: u64 },
    /// Recorded failure, re-yielded while `now < next_retry_at_ms`.
    Failed { error: KeyError, next_retry_at_ms: u64 },
}

struct Entry<V> {
    state: EntryState<V>,
    /// Current backoff delay; `None` until a failure is recorded, reset on success.
    retry_delay: Option<Duration>,
    /// Whether any attempt for this key has succeeded since insertion.
    resolved_once: bool,
}

struct Inner<K, V> {
    entries: LruCache<K, Entry<V>>,
    retry_first_delay: Duration,
    retry_max_delay: Duration,
    /// Monotonic id distinguishing in-flight attempts, so a completion that
    /// was evicted or superseded mid-flight does not record over a newer entry.
    next_attempt: u64,
}

impl<K: Hash + Eq, V: Clone> Inner<K, V> {
    /// Records the outcome of attempt `attempt` for `key`, unless the entry
    /// was evicted or superseded while the fetch was in flight.
    fn complete(&mut self, key: &K, attempt: u64, now: u64, outcome: Result<(V, u64)>) -> Result<V> {
        let entry = match self.entries.peek_mut(key) {
            Some(entry)
                if matches!(&entry.state, EntryState::Pending { attempt: a, .. } if *a == attempt) =>
            {
                Some(entry)
            },
            _ => None,
        };

        match outcome {
            Ok((value, expires_at_ms)) => {
                if let Some(entry) = entry {
                    entry.state = EntryState::Fresh { value: value.clone(), expires_at_ms };
                    // A future failure restarts at retry_first_delay.
                    entry.retry_delay = None;
                    entry.resolved_once = true;
                }
                Ok(value)
            },
            Err(error) => {
                if let Some(entry) = entry {
                    let delay = match entry.retry_delay {
                        Some(prev) => prev.saturating_mul(2).min(self.retry_max_delay),
                        None => self.retry_first_delay,
                    };
                    entry.retry_delay = Some(delay);
                    entry.state = EntryState::Failed {
                        error: error.clone(),
                        next_retry_at_ms: now.saturating_add(delay.as_millis() as u64),
                    };
                }
                Err(error)
            },
        }
    }
}

enum Gate<V> {
    Join(SharedAttempt<V>),
    Start { resolved_once: bool },
}

/// Keyed async-value cache with TTL, LRU eviction and backoff-gated retry.
///
/// Cloning is cheap and shares the underlying state.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
/// use std::time::Duration;
/// use keypair_cache::cache::{CacheConfig, PerishableCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: PerishableCache<String, u32> = PerishableCache::new(CacheConfig::new(
///     NonZeroUsize::new(4).expect("non-zero"),
///     Duration::from_millis(500),
///     Duration::from_secs(120),
/// ));
///
/// let value = cache
///     .get("answer".to_string(), |cx| async move {
///         cx.set_expires_at_ms(u64::MAX);
///         Ok(42)
///     })
///     .await;
/// assert_eq!(value, Ok(42));
/// # }
/// ```
pub struct PerishableCache<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> Clone for PerishableCache<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), clock: Arc::clone(&self.clock) }
    }
}

impl<K, V> PerishableCache<K, V>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache using the wall clock.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from the given [`Clock`].
    ///
    /// Intended for tests that need to cross TTL and retry gates without
    /// sleeping.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let config = CacheConfig::new(
            config.max_entries,
            config.retry_first_delay,
            config.retry_max_delay,
        );
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(config.max_entries),
                retry_first_delay: config.retry_first_delay,
                retry_max_delay: config.retry_max_delay,
                next_attempt: 0,
            })),
            clock,
        }
    }

    /// Number of entries currently held (any state).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached or freshly fetched value for `key`.
    ///
    /// `producer` is invoked only when no usable entry exists: it receives a
    /// [`FetchContext`], performs the fetch, reports the value's expiry via
    /// [`FetchContext::set_expires_at_ms`] and returns the value. Concurrent
    /// calls for the same key share a single producer invocation.
    ///
    /// # Errors
    ///
    /// Yields the producer's failure (or the recorded failure while the
    /// retry gate is closed), or [`KeyError::KeyExpired`] when the fetched
    /// value's validity window has already elapsed.
    #[tracing::instrument(level = "debug", skip(self, producer), fields(key = %key))]
    pub async fn get<F, Fut>(&self, key: K, producer: F) -> Result<V>
    where
        F: FnOnce(FetchContext) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let attempt_future = {
            let mut inner = self.inner.lock();
            let now = self.clock.now_ms();

            let gate = match inner.entries.get_mut(&key) {
                Some(entry) => match &entry.state {
                    EntryState::Fresh { value, expires_at_ms } if now < *expires_at_ms => {
                        tracing::debug!("cache hit");
                        return Ok(value.clone());
                    },
                    EntryState::Failed { error, next_retry_at_ms } if now < *next_retry_at_ms => {
                        tracing::debug!(
                            next_retry_at_ms = *next_retry_at_ms,
                            "retry gate closed, yielding recorded failure"
                        );
                        return Err(error.clone());
                    },
                    EntryState::Pending { future, .. } => {
                        tracing::debug!("joining in-flight fetch");
                        Gate::Join(future.clone())
                    },
                    // Fresh past its TTL, or failed past its retry gate.
                    _ => Gate::Start { resolved_once: entry.resolved_once },
                },
                None => Gate::Start { resolved_once: false },
            };

            match gate {
                Gate::Join(future) => future,
                Gate::Start { resolved_once } => {
                    let attempt = inner.next_attempt;
                    inner.next_attempt += 1;

                    let cx = FetchContext::new(resolved_once);
                    let fetch = producer(cx.clone());
                    let state = Arc::clone(&self.inner);
                    let clock = Arc::clone(&self.clock);
                    let completion_key = key.clone();
                    let future: SharedAttempt<V> = async move {
                        let outcome = fetch.await;
                        let now = clock.now_ms();
                        let outcome = match outcome {
                            Ok(value) => match cx.expires_at_ms() {
                                Some(expires_at_ms) if expires_at_ms > now => {
                                    Ok((value, expires_at_ms))
                                },
                                _ => {
                                    tracing::warn!(
                                        key = %completion_key,
                                        "fetched value arrived already expired"
                                    );
                                    Err(KeyError::key_expired(completion_key.to_string()))
                                },
                            },
                            Err(error) => Err(error),
                        };
                        state.lock().complete(&completion_key, attempt, now, outcome)
                    }
                    .boxed()
                    .shared();

                    let pending = EntryState::Pending { attempt, future: future.clone() };
                    match inner.entries.get_mut(&key) {
                        // Existing entry: supersede its state in place, keeping
                        // the backoff memory and resolved-once flag.
                        Some(entry) => entry.state = pending,
                        None => {
                            let evicted = inner.entries.push(
                                key.clone(),
                                Entry { state: pending, retry_delay: None, resolved_once: false },
                            );
                            if let Some((evicted_key, _)) = evicted
                                && evicted_key != key
                            {
                                tracing::debug!(
                                    evicted = %evicted_key,
                                    "evicted least-recently-used entry"
                                );
                            }
                        },
                    }
                    future
                },
            }
        };

        attempt_future.await
    }
}
