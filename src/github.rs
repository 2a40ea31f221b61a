//! GitHub GraphQL fetcher used by the cache service.
//!
//! Each [`FetchKind`] maps to one GraphQL query. Query strings arrive in the
//! formats documented on [`FetchKind`]; anything malformed is reported as a
//! fetch error and cached like any other failure.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::cache::Fetcher;
use crate::models::{FetchKind, Issue, Payload, Project, Repo};

const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const SEARCH_LIMIT: u64 = 10;
const PROJECT_LIMIT: u64 = 20;

const ISSUE_FIELDS: &str = "
    __typename
    ... on Issue { number title state repository { nameWithOwner } }
    ... on PullRequest { number title state repository { nameWithOwner } }";

const PROJECT_FIELDS: &str = "title number shortDescription url closed";

pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
    endpoint: String,
}

impl GitHubClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gh-shorthand/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            token,
            endpoint: GRAPHQL_URL.to_string(),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("no GitHub API token configured"))?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("GitHub request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error {}: {}", status, body);
        }

        let json: Value = response
            .json()
            .await
            .context("Invalid GitHub response")?;
        graphql_data(json)
    }

    async fn repo(&self, query: &str) -> Result<Payload> {
        let (owner, name) = split_repo(query)?;
        let data = self
            .graphql(
                "query($owner: String!, $name: String!) {
                    repository(owner: $owner, name: $name) { nameWithOwner description }
                }",
                json!({ "owner": owner, "name": name }),
            )
            .await?;
        let repo = data
            .get("repository")
            .filter(|r| !r.is_null())
            .ok_or_else(|| anyhow!("repository {} not found", query))?;
        Ok(Payload::Repo(Repo {
            name_with_owner: str_field(repo, "nameWithOwner")?,
            description: repo
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }))
    }

    async fn issue(&self, query: &str) -> Result<Payload> {
        let (repo, number) = query
            .split_once('#')
            .ok_or_else(|| anyhow!("invalid issue reference: {}", query))?;
        let (owner, name) = split_repo(repo)?;
        let number = parse_number(number)?;
        let data = self
            .graphql(
                &format!(
                    "query($owner: String!, $name: String!, $number: Int!) {{
                        repository(owner: $owner, name: $name) {{
                            issueOrPullRequest(number: $number) {{ {} }}
                        }}
                    }}",
                    ISSUE_FIELDS
                ),
                json!({ "owner": owner, "name": name, "number": number }),
            )
            .await?;
        let node = data
            .pointer("/repository/issueOrPullRequest")
            .filter(|n| !n.is_null())
            .ok_or_else(|| anyhow!("issue {} not found", query))?;
        Ok(Payload::Issue(parse_issue(node)?))
    }

    async fn issues(&self, query: &str) -> Result<Payload> {
        let data = self
            .graphql(
                &format!(
                    "query($query: String!, $first: Int!) {{
                        search(query: $query, type: ISSUE, first: $first) {{
                            nodes {{ {} }}
                        }}
                    }}",
                    ISSUE_FIELDS
                ),
                json!({ "query": query, "first": SEARCH_LIMIT }),
            )
            .await?;
        let nodes = data
            .pointer("/search/nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Invalid GitHub response: missing search results"))?;
        let issues = nodes.iter().map(parse_issue).collect::<Result<Vec<_>>>()?;
        Ok(Payload::Issues(issues))
    }

    async fn project(&self, query: &str) -> Result<Payload> {
        let (target, number) = query
            .rsplit_once('/')
            .ok_or_else(|| anyhow!("invalid project reference: {}", query))?;
        let number = parse_number(number)?;
        let selection = format!("projectV2(number: $number) {{ {} }}", PROJECT_FIELDS);
        let (data, pointer) = match target.split_once('/') {
            Some((owner, name)) => (
                self.graphql(
                    &format!(
                        "query($owner: String!, $name: String!, $number: Int!) {{
                            repository(owner: $owner, name: $name) {{ {} }}
                        }}",
                        selection
                    ),
                    json!({ "owner": owner, "name": name, "number": number }),
                )
                .await?,
                "/repository/projectV2",
            ),
            None => (
                self.graphql(
                    &format!(
                        "query($owner: String!, $number: Int!) {{
                            repositoryOwner(login: $owner) {{ ... on ProjectV2Owner {{ {} }} }}
                        }}",
                        selection
                    ),
                    json!({ "owner": target, "number": number }),
                )
                .await?,
                "/repositoryOwner/projectV2",
            ),
        };
        let node = data
            .pointer(pointer)
            .filter(|n| !n.is_null())
            .ok_or_else(|| anyhow!("project {} not found", query))?;
        Ok(Payload::Project(parse_project(node)?))
    }

    async fn projects(&self, query: &str) -> Result<Payload> {
        let selection = format!(
            "projectsV2(first: $first, orderBy: {{field: UPDATED_AT, direction: DESC}}) {{ nodes {{ {} }} }}",
            PROJECT_FIELDS
        );
        let (data, pointer) = match query.split_once('/') {
            Some(_) => {
                let (owner, name) = split_repo(query)?;
                (
                    self.graphql(
                        &format!(
                            "query($owner: String!, $name: String!, $first: Int!) {{
                                repository(owner: $owner, name: $name) {{ {} }}
                            }}",
                            selection
                        ),
                        json!({ "owner": owner, "name": name, "first": PROJECT_LIMIT }),
                    )
                    .await?,
                    "/repository/projectsV2/nodes",
                )
            }
            None => (
                self.graphql(
                    &format!(
                        "query($owner: String!, $first: Int!) {{
                            repositoryOwner(login: $owner) {{ ... on ProjectV2Owner {{ {} }} }}
                        }}",
                        selection
                    ),
                    json!({ "owner": query, "first": PROJECT_LIMIT }),
                )
                .await?,
                "/repositoryOwner/projectsV2/nodes",
            ),
        };
        let nodes = data
            .pointer(pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("no projects found for {}", query))?;
        let projects = nodes.iter().map(parse_project).collect::<Result<Vec<_>>>()?;
        Ok(Payload::Projects(projects))
    }
}

#[async_trait]
impl Fetcher for GitHubClient {
    async fn fetch(&self, kind: FetchKind, query: &str) -> Result<Payload> {
        match kind {
            FetchKind::Repo => self.repo(query).await,
            FetchKind::Issue => self.issue(query).await,
            FetchKind::Issues => self.issues(query).await,
            FetchKind::Project => self.project(query).await,
            FetchKind::Projects => self.projects(query).await,
        }
    }
}

/// Extracts `data` from a GraphQL response, surfacing the first error.
fn graphql_data(json: Value) -> Result<Value> {
    if let Some(message) = json.pointer("/errors/0/message").and_then(Value::as_str) {
        bail!("{}", message);
    }
    json.get("data")
        .filter(|d| !d.is_null())
        .cloned()
        .ok_or_else(|| anyhow!("Invalid GitHub response: missing data"))
}

fn split_repo(s: &str) -> Result<(&str, &str)> {
    match s.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => bail!("invalid repository: {}", s),
    }
}

fn parse_number(s: &str) -> Result<u64> {
    s.parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| anyhow!("invalid number: {}", s))
}

fn str_field(node: &Value, field: &str) -> Result<String> {
    node.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid GitHub response: missing {}", field))
}

fn parse_issue(node: &Value) -> Result<Issue> {
    Ok(Issue {
        repo: node
            .pointer("/repository/nameWithOwner")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Invalid GitHub response: missing repository"))?
            .to_string(),
        number: node
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("Invalid GitHub response: missing number"))?,
        title: str_field(node, "title")?,
        state: str_field(node, "state")?,
        kind: str_field(node, "__typename")?,
    })
}

fn parse_project(node: &Value) -> Result<Project> {
    Ok(Project {
        name: str_field(node, "title")?,
        number: node
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("Invalid GitHub response: missing number"))?,
        body: node
            .get("shortDescription")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        url: str_field(node, "url")?,
        closed: node.get("closed").and_then(Value::as_bool).unwrap_or(false),
    })
}
