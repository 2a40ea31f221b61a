//! Data types shared by the completion client and the cache service.
//!
//! These are the records carried over the fetch protocol: what the service
//! fetched from GitHub, and the envelope telling the client whether the
//! fetch has finished.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of lookup the cache service performs. Each one is served on its
/// own path, `GET /{kind}?q=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    /// `owner/name`
    Repo,
    /// `owner/name#number`
    Issue,
    /// A GitHub issue search string.
    Issues,
    /// `owner/name/number` or `owner/number`
    Project,
    /// `owner/name` or `owner`
    Projects,
}

impl FetchKind {
    pub const ALL: [FetchKind; 5] = [
        FetchKind::Repo,
        FetchKind::Issue,
        FetchKind::Issues,
        FetchKind::Project,
        FetchKind::Projects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Repo => "repo",
            FetchKind::Issue => "issue",
            FetchKind::Issues => "issues",
            FetchKind::Project => "project",
            FetchKind::Projects => "projects",
        }
    }

    /// Cache key for a query of this kind.
    pub fn key(&self, query: &str) -> String {
        format!("{}:{}", self.as_str(), query)
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FetchKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown fetch kind: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub name_with_owner: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub repo: String,
    pub number: u64,
    pub title: String,
    /// `OPEN`, `CLOSED` or `MERGED`.
    pub state: String,
    /// `Issue` or `PullRequest`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Issue {
    pub fn reference(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }

    pub fn url(&self) -> String {
        let segment = if self.kind == "PullRequest" {
            "pull"
        } else {
            "issues"
        };
        format!("https://github.com/{}/{}/{}", self.repo, segment, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub number: u64,
    #[serde(default)]
    pub body: String,
    pub url: String,
    #[serde(default)]
    pub closed: bool,
}

/// A completed fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Repo(Repo),
    Issue(Issue),
    Issues(Vec<Issue>),
    Project(Project),
    Projects(Vec<Project>),
}

/// Response body of every fetch endpoint.
///
/// `complete == false` with no `error` means the fetch is still running and
/// the caller should ask again later.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<Repo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<Issue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FetchResponse {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            complete: true,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.complete && self.error.is_none()
    }
}

impl From<Payload> for FetchResponse {
    fn from(payload: Payload) -> Self {
        let mut resp = FetchResponse {
            complete: true,
            ..Self::default()
        };
        match payload {
            Payload::Repo(repo) => resp.repo = Some(repo),
            Payload::Issue(issue) => resp.issue = Some(issue),
            Payload::Issues(issues) => resp.issues = issues,
            Payload::Project(project) => resp.project = Some(project),
            Payload::Projects(projects) => resp.projects = projects,
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_path_segment() {
        for kind in FetchKind::ALL {
            assert_eq!(kind.as_str().parse::<FetchKind>().unwrap(), kind);
        }
        assert!("pulls".parse::<FetchKind>().is_err());
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(FetchKind::Issue.key("a/b#1"), "issue:a/b#1");
    }

    #[test]
    fn test_pending_response_serializes_minimal() {
        let json = serde_json::to_value(FetchResponse::pending()).unwrap();
        assert_eq!(json, serde_json::json!({ "complete": false }));
    }

    #[test]
    fn test_issue_url_for_pull_request() {
        let issue = Issue {
            repo: "a/b".to_string(),
            number: 3,
            title: "Fix".to_string(),
            state: "MERGED".to_string(),
            kind: "PullRequest".to_string(),
        };
        assert_eq!(issue.url(), "https://github.com/a/b/pull/3");
        assert_eq!(issue.reference(), "a/b#3");
    }

    #[test]
    fn test_error_response_is_not_pending() {
        let resp = FetchResponse::failed("boom");
        assert!(!resp.is_pending());
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }
}
