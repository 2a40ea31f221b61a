//! Single-flight result cache for the fetch service.
//!
//! Any number of clients may poll for the same `kind:query` key; only the
//! first one dispatches a remote fetch. Everyone else gets "pending" until
//! the fetch lands, then the cached result until its TTL runs out.
//!
//! ```text
//! lookup(key) ──▶ pending? ──yes──▶ {complete: false}
//!                    │no
//!                    ▼
//!               live entry? ──yes──▶ stored result / error
//!                    │no
//!                    ▼
//!          mark pending, spawn fetch ──▶ {complete: false}
//!                    ┆
//!          (fetch done) unmark, store with TTL
//! ```
//!
//! One mutex guards both the pending set and the entries. It is held only
//! for the O(1) check-and-set, never across the remote call.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::models::{FetchKind, FetchResponse, Payload};

/// Performs the actual remote lookup for a key.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, kind: FetchKind, query: &str) -> Result<Payload>;
}

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub success_ttl: Duration,
    pub error_ttl: Duration,
    pub remote_timeout: Duration,
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            success_ttl: config.success_ttl(),
            error_ttl: config.error_ttl(),
            remote_timeout: config.remote_timeout(),
        }
    }
}

struct Entry {
    value: Result<Payload, String>,
    expires_at: Instant,
}

impl Entry {
    fn response(&self) -> FetchResponse {
        match &self.value {
            Ok(payload) => payload.clone().into(),
            Err(error) => FetchResponse::failed(error.clone()),
        }
    }
}

#[derive(Default)]
struct State {
    pending: HashSet<String>,
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub pending: usize,
}

#[derive(Clone)]
pub struct CoalescingCache {
    state: Arc<Mutex<State>>,
    fetcher: Arc<dyn Fetcher>,
    policy: CachePolicy,
}

impl CoalescingCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: CachePolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            fetcher,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns immediately with the cached result, or "pending" while a fetch
    /// for this key is in flight. Dispatches the fetch on a miss.
    ///
    /// Must be called from within a tokio runtime.
    pub fn lookup(&self, kind: FetchKind, query: &str) -> FetchResponse {
        let key = kind.key(query);

        {
            let mut state = self.lock();
            if state.pending.contains(&key) {
                return FetchResponse::pending();
            }
            if let Some(entry) = state.entries.get(&key) {
                if entry.expires_at > Instant::now() {
                    debug!(%key, "cache hit");
                    return entry.response();
                }
            }
            state.pending.insert(key.clone());
        }

        self.dispatch(kind, query.to_string(), key);
        FetchResponse::pending()
    }

    fn dispatch(&self, kind: FetchKind, query: String, key: String) {
        let cache = self.clone();
        info!(%key, "fetching");
        tokio::spawn(async move {
            // a panicking fetcher must still release the key
            let fetcher = cache.fetcher.clone();
            let mut remote = tokio::spawn(async move { fetcher.fetch(kind, &query).await });
            let value = match tokio::time::timeout(cache.policy.remote_timeout, &mut remote).await {
                Ok(Ok(Ok(payload))) => Ok(payload),
                Ok(Ok(Err(e))) => Err(format!("{:#}", e)),
                Ok(Err(e)) => Err(format!("GitHub fetch aborted: {}", e)),
                Err(_) => {
                    remote.abort();
                    Err(format!(
                        "GitHub request timed out after {}s",
                        cache.policy.remote_timeout.as_secs_f64()
                    ))
                }
            };
            if let Err(error) = &value {
                warn!(%key, %error, "fetch failed");
            }
            cache.store(key, value);
        });
    }

    fn store(&self, key: String, value: Result<Payload, String>) {
        let ttl = if value.is_ok() {
            self.policy.success_ttl
        } else {
            self.policy.error_ttl
        };
        let mut state = self.lock();
        state.pending.remove(&key);
        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drops expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.expires_at > now);
        before - state.entries.len()
    }

    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            pending: state.pending.len(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Repo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Fetcher that counts calls and optionally blocks until released.
    pub(crate) struct ScriptedFetcher {
        pub calls: AtomicUsize,
        pub gate: Option<Semaphore>,
        pub fail: bool,
        pub panics: bool,
        pub delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        pub fn immediate() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                gate: None,
                fail: false,
                panics: false,
                delay: None,
            }
        }

        pub fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::immediate()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::immediate()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _kind: FetchKind, query: &str) -> Result<Payload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.acquire().await?.forget();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panics {
                panic!("fetcher bug");
            }
            if self.fail {
                anyhow::bail!("upstream exploded");
            }
            Ok(Payload::Repo(Repo {
                name_with_owner: query.to_string(),
                description: format!("about {}", query),
            }))
        }
    }

    fn policy() -> CachePolicy {
        CachePolicy {
            success_ttl: Duration::from_secs(300),
            error_ttl: Duration::from_secs(10),
            remote_timeout: Duration::from_secs(5),
        }
    }

    fn cache_with(fetcher: &Arc<ScriptedFetcher>) -> CoalescingCache {
        CoalescingCache::new(fetcher.clone(), policy())
    }

    async fn wait_complete(cache: &CoalescingCache, kind: FetchKind, query: &str) -> FetchResponse {
        loop {
            let resp = cache.lookup(kind, query);
            if !resp.is_pending() {
                return resp;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn wait_for_calls(fetcher: &ScriptedFetcher, n: usize) {
        while fetcher.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_dispatch_one_fetch() {
        let fetcher = Arc::new(ScriptedFetcher::gated());
        let cache = cache_with(&fetcher);

        for _ in 0..8 {
            assert!(cache.lookup(FetchKind::Repo, "z/dotfiles").is_pending());
        }
        wait_for_calls(&fetcher, 1).await;
        assert_eq!(cache.stats().pending, 1);

        fetcher.release();
        let first = wait_complete(&cache, FetchKind::Repo, "z/dotfiles").await;
        assert_eq!(first.repo.as_ref().unwrap().description, "about z/dotfiles");

        for _ in 0..5 {
            assert_eq!(cache.lookup(FetchKind::Repo, "z/dotfiles"), first);
        }
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.stats(), CacheStats { entries: 1, pending: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_differ_by_kind() {
        let fetcher = Arc::new(ScriptedFetcher::immediate());
        let cache = cache_with(&fetcher);
        cache.lookup(FetchKind::Repo, "a/b");
        cache.lookup(FetchKind::Projects, "a/b");
        wait_complete(&cache, FetchKind::Repo, "a/b").await;
        wait_complete(&cache, FetchKind::Projects, "a/b").await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_key_does_not_block_others() {
        let slow = Arc::new(ScriptedFetcher::gated());
        let cache = cache_with(&slow);
        cache.lookup(FetchKind::Repo, "slow/one");
        wait_for_calls(&slow, 1).await;

        // the lock is free while the slow fetch is parked
        let fast = CoalescingCache {
            fetcher: Arc::new(ScriptedFetcher::immediate()),
            ..cache.clone()
        };
        let resp = wait_complete(&fast, FetchKind::Repo, "fast/two").await;
        assert!(resp.complete);
        assert!(cache.lookup(FetchKind::Repo, "slow/one").is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_expire_sooner_than_successes() {
        let fetcher = Arc::new(ScriptedFetcher::failing());
        let cache = cache_with(&fetcher);

        cache.lookup(FetchKind::Issue, "a/b#1");
        let resp = wait_complete(&cache, FetchKind::Issue, "a/b#1").await;
        assert_eq!(resp.error.as_deref(), Some("upstream exploded"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.lookup(FetchKind::Issue, "a/b#1"), resp);
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.lookup(FetchKind::Issue, "a/b#1").is_pending());
        wait_complete(&cache, FetchKind::Issue, "a/b#1").await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_refetched_after_ttl() {
        let fetcher = Arc::new(ScriptedFetcher::immediate());
        let cache = cache_with(&fetcher);
        cache.lookup(FetchKind::Repo, "a/b");
        wait_complete(&cache, FetchKind::Repo, "a/b").await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.lookup(FetchKind::Repo, "a/b").complete);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.lookup(FetchKind::Repo, "a/b").is_pending());
        wait_complete(&cache, FetchKind::Repo, "a/b").await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_timeout_is_cached_error() {
        let fetcher = Arc::new(ScriptedFetcher {
            delay: Some(Duration::from_secs(60)),
            ..ScriptedFetcher::immediate()
        });
        let cache = cache_with(&fetcher);
        cache.lookup(FetchKind::Repo, "a/b");
        let resp = wait_complete(&cache, FetchKind::Repo, "a/b").await;
        assert!(resp.error.unwrap().contains("timed out"));
        assert_eq!(cache.stats().pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_releases_key() {
        let fetcher = Arc::new(ScriptedFetcher {
            panics: true,
            ..ScriptedFetcher::immediate()
        });
        let cache = cache_with(&fetcher);

        assert!(cache.lookup(FetchKind::Repo, "a/b").is_pending());
        let resp = wait_complete(&cache, FetchKind::Repo, "a/b").await;
        assert!(resp.complete);
        assert!(resp.error.unwrap().contains("panicked"));
        assert_eq!(cache.stats(), CacheStats { entries: 1, pending: 0 });

        // cached like any other error, then retried
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.lookup(FetchKind::Repo, "a/b").is_pending());
        wait_complete(&cache, FetchKind::Repo, "a/b").await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_expired_entries() {
        let fetcher = Arc::new(ScriptedFetcher::immediate());
        let cache = cache_with(&fetcher);
        cache.lookup(FetchKind::Repo, "a/b");
        wait_complete(&cache, FetchKind::Repo, "a/b").await;
        assert_eq!(cache.sweep(), 0);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().entries, 0);
    }
}
