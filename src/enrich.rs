//! Per-suggestion enrichment decisions for one completion invocation.
//!
//! Every enrichable suggestion asks the [`Enricher`] for an [`Attempt`]. The
//! enricher debounces against fast typing (nothing is fetched until the
//! suggestion's delay has elapsed), talks to the cache service, and remembers
//! whether anything is still outstanding so the response can ask the host to
//! re-run the completion.

use std::time::Duration;
use tracing::debug;

use crate::alfred::Response;
use crate::continuation::ContinuationState;
use crate::models::{FetchKind, FetchResponse};
use crate::rpc_client::FetchClient;

/// Delay before fetching a single repo, issue or project.
pub const SINGLE_DELAY: Duration = Duration::from_millis(100);
/// Delay before running an issue search.
pub const SEARCH_DELAY: Duration = Duration::from_millis(500);
/// Delay before fetching a bulk listing (recent issues, projects).
pub const LIST_DELAY: Duration = Duration::from_millis(1000);

/// Re-run hint, in seconds, sent to the host while anything is pending.
pub const RERUN_INTERVAL: f64 = 0.1;

const FRAME_PERIOD_MS: u128 = 250;
const FRAMES: u128 = 3;

/// Outcome of asking for enrichment data.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    /// Delay not yet reached; the service was not contacted.
    Waiting,
    /// The service is still fetching.
    Pending,
    /// The fetch failed; the message is terminal for this polling cycle.
    Failed(String),
    Complete(FetchResponse),
    /// No service available; show the suggestion without live data.
    Disabled,
}

pub struct Enricher<'a> {
    client: Option<&'a dyn FetchClient>,
    elapsed: Duration,
    pending: bool,
}

impl<'a> Enricher<'a> {
    pub fn new(client: Option<&'a dyn FetchClient>, elapsed: Duration) -> Self {
        Self {
            client,
            elapsed,
            pending: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn attempt(&mut self, kind: FetchKind, query: &str, delay: Duration) -> Attempt {
        // nothing to wait for without a service
        let Some(client) = self.client else {
            return Attempt::Disabled;
        };

        if self.elapsed < delay {
            self.pending = true;
            return Attempt::Waiting;
        }

        match client.fetch(kind, query) {
            Err(e) => {
                debug!(%kind, query, error = %e, "enrichment disabled");
                // one timeout per invocation is enough
                self.client = None;
                Attempt::Disabled
            }
            Ok(FetchResponse {
                error: Some(error), ..
            }) => Attempt::Failed(error),
            Ok(resp) if !resp.complete => {
                self.pending = true;
                Attempt::Pending
            }
            Ok(resp) => Attempt::Complete(resp),
        }
    }

    /// `label` followed by one to three dots, cycling with elapsed time.
    pub fn progress(&self, label: &str) -> String {
        let frame = (self.elapsed.as_millis() / FRAME_PERIOD_MS) % FRAMES;
        format!("{}{}", label, ".".repeat(frame as usize + 1))
    }

    /// Attaches the re-run hint and continuation variables when anything is
    /// still pending. Otherwise the response is left alone, ending the loop.
    pub fn finish(&self, response: &mut Response, state: &ContinuationState) {
        if self.pending {
            response.rerun = Some(RERUN_INTERVAL);
            response.variables = state.to_vars();
        }
    }
}
