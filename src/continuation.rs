//! Elapsed-time tracking across fresh process invocations.
//!
//! The completion client exits after every response. To make a fetch that
//! takes a few seconds look continuous, the client hands the host a
//! [`ContinuationState`] (the query being timed plus its start timestamp),
//! and the host passes it back as `query`, `s` and `ns` variables on the
//! next re-run. The state is honored only for the exact same query text.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Variable names used on the continuation channel.
pub const QUERY_VAR: &str = "query";
pub const SECONDS_VAR: &str = "s";
pub const NANOS_VAR: &str = "ns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationState {
    pub query: String,
    pub start: DateTime<Utc>,
}

impl ContinuationState {
    pub fn new(query: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            query: query.into(),
            start,
        }
    }

    /// Rebuilds state from the raw host variables. Any missing or malformed
    /// value yields `None`, which simply restarts the timer.
    pub fn from_vars(query: Option<&str>, secs: Option<&str>, nanos: Option<&str>) -> Option<Self> {
        let query = query?;
        let secs: i64 = secs?.trim().parse().ok()?;
        let nanos: u32 = match nanos {
            Some(n) if !n.trim().is_empty() => n.trim().parse().ok()?,
            _ => 0,
        };
        let start = DateTime::from_timestamp(secs, nanos)?;
        Some(Self::new(query, start))
    }

    /// The variables handed back to the host for the next invocation.
    pub fn to_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(QUERY_VAR.to_string(), self.query.clone());
        vars.insert(SECONDS_VAR.to_string(), self.start.timestamp().to_string());
        vars.insert(
            NANOS_VAR.to_string(),
            self.start.timestamp_subsec_nanos().to_string(),
        );
        vars
    }
}

/// Start of the timing session for `query`: the previous start when the
/// previous invocation timed exactly this text, otherwise `now`.
pub fn recover_start(
    query: &str,
    previous: Option<&ContinuationState>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match previous {
        Some(prev) if prev.query == query => prev.start,
        _ => now,
    }
}

/// `now - start`, clamped at zero for clocks that moved backwards.
pub fn elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - start).to_std().unwrap_or(Duration::ZERO)
}
