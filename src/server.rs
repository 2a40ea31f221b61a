//! Cache & coalescing HTTP service.
//!
//! A long-running companion to the completion client. Every endpoint answers
//! immediately, either with a cached result or with "still working", and
//! performs the real GitHub request in the background at most once per key.
//!
//! # Endpoints
//!
//! | Method | Path | Query format |
//! |--------|------|--------------|
//! | `GET` | `/repo?q=` | `owner/name` |
//! | `GET` | `/issue?q=` | `owner/name#number` |
//! | `GET` | `/issues?q=` | GitHub issue search string |
//! | `GET` | `/project?q=` | `owner/name/number` or `owner/number` |
//! | `GET` | `/projects?q=` | `owner/name` or `owner` |
//! | `GET` | `/health` | (none) |
//!
//! # Response
//!
//! ```json
//! { "complete": true, "repo": { "name_with_owner": "a/b", "description": "..." } }
//! ```
//!
//! `{"complete": false}` means the fetch is in flight; ask again.
//!
//! # Rejections
//!
//! ```json
//! { "rejected": { "code": "missing_query", "message": "missing query parameter: q" } }
//! ```
//!
//! Codes: `unknown_kind` (404), `missing_query` (400). Upstream GitHub
//! failures are not rejections; they are reported in the fetch response's
//! `error` field with `complete: true`.

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::{CacheStats, CachePolicy, CoalescingCache};
use crate::config::Config;
use crate::github::GitHubClient;
use crate::models::{FetchKind, FetchResponse};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    cache: CoalescingCache,
}

/// Starts the service on `[server].bind` with the GitHub fetcher and runs
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let token = config.api_token();
    if token.is_none() {
        warn!("no GitHub API token configured (api_token or GITHUB_TOKEN); every fetch will fail");
    }
    let fetcher = Arc::new(GitHubClient::new(token, config.cache.remote_timeout())?);
    let cache = CoalescingCache::new(fetcher, CachePolicy::from(&config.cache));
    let _sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("cache service listening on http://{}", config.server.bind);

    serve(listener, cache).await
}

/// Serves `cache` on an already-bound listener.
pub async fn serve(listener: TcpListener, cache: CoalescingCache) -> anyhow::Result<()> {
    axum::serve(listener, router(cache)).await?;
    Ok(())
}

pub fn router(cache: CoalescingCache) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/{kind}", get(handle_fetch))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { cache })
}

/// Why a fetch request was refused before reaching the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    UnknownKind,
    MissingQuery,
}

impl Rejection {
    fn status(self) -> StatusCode {
        match self {
            Rejection::UnknownKind => StatusCode::NOT_FOUND,
            Rejection::MissingQuery => StatusCode::BAD_REQUEST,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Rejection::UnknownKind => "unknown_kind",
            Rejection::MissingQuery => "missing_query",
        }
    }
}

/// `{"rejected": {"code": ..., "message": ...}}`, kept apart from the
/// `error` field fetch responses use for upstream failures.
#[derive(Serialize)]
struct RejectionBody<'a> {
    rejected: RejectionDetail<'a>,
}

#[derive(Serialize)]
struct RejectionDetail<'a> {
    code: &'a str,
    message: String,
}

struct Rejected(Rejection, String);

impl IntoResponse for Rejected {
    fn into_response(self) -> Response {
        let Rejected(rejection, message) = self;
        let body = RejectionBody {
            rejected: RejectionDetail {
                code: rejection.code(),
                message,
            },
        };
        (rejection.status(), Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    cache: CacheStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: state.cache.stats(),
    })
}

#[derive(Deserialize)]
struct FetchParams {
    q: Option<String>,
}

/// Never waits on GitHub: returns the cached value or `complete: false`.
async fn handle_fetch(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<FetchParams>,
) -> Result<Json<FetchResponse>, Rejected> {
    let kind: FetchKind = kind
        .parse()
        .map_err(|e: anyhow::Error| Rejected(Rejection::UnknownKind, e.to_string()))?;
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| Rejected(Rejection::MissingQuery, "missing query parameter: q".into()))?;

    Ok(Json(state.cache.lookup(kind, &query)))
}
