//! Runs the cache service on an ephemeral port with a scripted fetcher and
//! talks to it through the same blocking client the launcher uses.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use gh_shorthand::cache::{CachePolicy, CoalescingCache, Fetcher};
use gh_shorthand::completion::complete;
use gh_shorthand::config::parse_config;
use gh_shorthand::continuation::ContinuationState;
use gh_shorthand::models::{FetchKind, FetchResponse, Payload, Repo};
use gh_shorthand::rpc_client::{FetchClient, RpcClient};

struct GatedFetcher {
    calls: AtomicUsize,
    gate: Semaphore,
}

impl GatedFetcher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, _kind: FetchKind, query: &str) -> anyhow::Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await?.forget();
        if query.starts_with("missing/") {
            anyhow::bail!("Could not resolve to a Repository");
        }
        Ok(Payload::Repo(Repo {
            name_with_owner: query.to_string(),
            description: "Fetched description".to_string(),
        }))
    }
}

async fn start_service(fetcher: Arc<GatedFetcher>) -> String {
    let cache = CoalescingCache::new(
        fetcher,
        CachePolicy {
            success_ttl: Duration::from_secs(300),
            error_ttl: Duration::from_secs(10),
            remote_timeout: Duration::from_secs(5),
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gh_shorthand::server::serve(listener, cache));
    format!("http://{}", addr)
}

/// Blocking client calls must run off the async runtime threads.
async fn fetch(base: &str, kind: FetchKind, query: &str) -> anyhow::Result<FetchResponse> {
    let base = base.to_string();
    let query = query.to_string();
    tokio::task::spawn_blocking(move || {
        let client = RpcClient::new(base, Duration::from_secs(2))?;
        client.fetch(kind, &query)
    })
    .await?
}

async fn wait_for_calls(fetcher: &GatedFetcher, n: usize) {
    for _ in 0..200 {
        if fetcher.calls() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("fetcher never reached {} calls", n);
}

async fn wait_complete(base: &str, kind: FetchKind, query: &str) -> FetchResponse {
    for _ in 0..200 {
        let resp = fetch(base, kind, query).await.unwrap();
        if !resp.is_pending() {
            return resp;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} {} never completed", kind, query);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_pollers_share_one_fetch() {
    let fetcher = Arc::new(GatedFetcher::new());
    let base = start_service(fetcher.clone()).await;

    let pollers: Vec<_> = (0..6)
        .map(|_| {
            let base = base.clone();
            tokio::spawn(async move { fetch(&base, FetchKind::Repo, "z/dotfiles").await })
        })
        .collect();
    for poller in pollers {
        let resp = poller.await.unwrap().unwrap();
        assert!(resp.is_pending());
    }
    wait_for_calls(&fetcher, 1).await;

    fetcher.gate.add_permits(1);
    let resp = wait_complete(&base, FetchKind::Repo, "z/dotfiles").await;
    assert_eq!(resp.repo.unwrap().description, "Fetched description");

    let again = fetch(&base, FetchKind::Repo, "z/dotfiles").await.unwrap();
    assert!(again.complete);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upstream_error_is_replayed() {
    let fetcher = Arc::new(GatedFetcher::new());
    let base = start_service(fetcher.clone()).await;
    fetcher.gate.add_permits(10);

    fetch(&base, FetchKind::Repo, "missing/repo").await.unwrap();
    let resp = wait_complete(&base, FetchKind::Repo, "missing/repo").await;
    assert_eq!(resp.error.as_deref(), Some("Could not resolve to a Repository"));

    let replay = fetch(&base, FetchKind::Repo, "missing/repo").await.unwrap();
    assert_eq!(replay, resp);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_requests() {
    let fetcher = Arc::new(GatedFetcher::new());
    let base = start_service(fetcher.clone()).await;

    let err = fetch(&base, FetchKind::Repo, "  ").await.unwrap_err();
    assert!(err.to_string().contains("400"), "{}", err);

    let unknown = reqwest::get(format!("{}/pulls?q=a/b", base))
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);
    let body: serde_json::Value = unknown.json().await.unwrap();
    assert_eq!(body["rejected"]["code"], "unknown_kind");

    let missing = reqwest::get(format!("{}/repo", base)).await.unwrap();
    assert_eq!(missing.status(), 400);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["rejected"]["code"], "missing_query");
    assert!(body.get("error").is_none());

    let health: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cache"]["pending"], 0);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_completion_round_trip_against_service() {
    let fetcher = Arc::new(GatedFetcher::new());
    let base = start_service(fetcher.clone()).await;
    let bind = base.trim_start_matches("http://").to_string();

    let start: DateTime<Utc> = Utc::now() - TimeDelta::milliseconds(200);
    let previous = ContinuationState::new(" df", start);

    let run = {
        let bind = bind.clone();
        move |previous: ContinuationState| {
            let bind = bind.clone();
            tokio::task::spawn_blocking(move || {
                let cfg = parse_config(&format!(
                    "[repos]\ndf = \"z/dotfiles\"\n\n[server]\nbind = \"{}\"\n\n[client]\ntimeout_ms = 2000\n",
                    bind
                ))
                .unwrap();
                let client = RpcClient::from_config(&cfg).unwrap();
                complete(
                    &cfg,
                    " df",
                    Some(&client as &dyn FetchClient),
                    Some(&previous),
                    Utc::now(),
                )
            })
        }
    };

    // past the threshold: the fetch is dispatched and still running
    let first = run(previous.clone()).await.unwrap();
    assert!(first.items[0].subtitle.starts_with("Fetching repo"));
    assert_eq!(first.variables, previous.to_vars());
    assert_eq!(first.rerun, Some(0.1));

    fetcher.gate.add_permits(1);
    wait_complete(&base, FetchKind::Repo, "z/dotfiles").await;

    let second = run(previous.clone()).await.unwrap();
    assert_eq!(second.items[0].subtitle, "Fetched description");
    assert!(second.rerun.is_none());
    assert!(second.variables.is_empty());
    assert_eq!(fetcher.calls(), 1);
}
