//! # gh-shorthand
//!
//! Expands GitHub shorthand typed into a launcher (`df 12` →
//! `zerowidth/dotfiles#12`) and enriches the suggestions with live data from
//! the GitHub API, without ever blocking a keystroke.
//!
//! ## Architecture
//!
//! ```text
//!  keystroke ─▶ gh-shorthand complete ──(100ms HTTP)──▶ gh-shorthand serve
//!                 │ parse shorthand                        │ single-flight cache
//!                 │ recover start time                     │ TTL per result
//!                 │ fold cached data                       ▼
//!                 ▼                                     GitHub GraphQL
//!        items + {query, s, ns, rerun}
//!                 │
//!                 └──── host re-runs with the same variables until resolved
//! ```
//!
//! The completion process is fresh on every invocation. Elapsed time since
//! the user stopped typing is recovered from the variables the previous
//! invocation handed back ([`continuation`]), which lets the client debounce
//! fetches and animate a placeholder while the service works.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`parser`] | Shorthand grammar |
//! | [`continuation`] | Start-time recovery across invocations |
//! | [`enrich`] | Per-suggestion fetch decisions |
//! | [`completion`] | Launcher modes and items |
//! | [`alfred`] | Script-filter output |
//! | [`rpc_client`] | Client for the cache service |
//! | [`cache`] | Single-flight TTL cache |
//! | [`server`] | Cache service HTTP API |
//! | [`github`] | GitHub GraphQL fetcher |
//! | [`models`] | Fetch protocol types |

pub mod alfred;
pub mod cache;
pub mod completion;
pub mod config;
pub mod continuation;
pub mod enrich;
pub mod github;
pub mod models;
pub mod parser;
pub mod rpc_client;
pub mod server;
