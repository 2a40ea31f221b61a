//! Launcher completion: turns one line of input into script-filter items.
//!
//! The first character of the input selects a mode, the rest is parsed as
//! shorthand:
//!
//! | Mode | Example | Result |
//! |------|---------|--------|
//! | `' '` | ` df 12` | open a repo, issue, path or user |
//! | `i` | `idf crash` | list or search issues in a repo |
//! | `n` | `ndf Broken build` | open a new issue form |
//! | `p` | `pdf 3` | open or list projects |
//! | `s` | `s is:open label:bug` | search issues across GitHub |

use chrono::{DateTime, Utc};
use reqwest::Url;
use std::time::Duration;

use crate::alfred::{Item, Response};
use crate::config::Config;
use crate::continuation::{elapsed, recover_start, ContinuationState};
use crate::enrich::{Attempt, Enricher, LIST_DELAY, SEARCH_DELAY, SINGLE_DELAY};
use crate::models::{FetchKind, Issue, Project};
use crate::parser::{parse, ParseFlags, ParseResult};
use crate::rpc_client::FetchClient;

const GITHUB: &str = "https://github.com";

/// Builds the response for `input`.
///
/// `previous` is the continuation state handed back by the host, if any.
/// `client` is `None` when enrichment is unavailable.
pub fn complete(
    config: &Config,
    input: &str,
    client: Option<&dyn FetchClient>,
    previous: Option<&ContinuationState>,
    now: DateTime<Utc>,
) -> Response {
    let start = recover_start(input, previous, now);
    let mut enricher = Enricher::new(client, elapsed(start, now));

    let mut chars = input.chars();
    let mode = chars.next();
    let rest = chars.as_str();

    let mut session = Session {
        config,
        enricher: &mut enricher,
        items: Vec::new(),
    };

    match mode {
        Some(' ') => session.open(rest),
        Some('i') => session.issues(rest),
        Some('n') => session.new_issue(rest),
        Some('p') => session.projects(rest),
        Some('s') => session.search(rest),
        _ => session.items.push(Item::info(
            "GitHub shorthand",
            "' ' open · i issues · n new issue · p projects · s search",
        )),
    }

    let mut response = Response {
        items: session.items,
        ..Response::default()
    };
    enricher.finish(&mut response, &ContinuationState::new(input, start));
    response
}

struct Session<'c, 'e, 'a> {
    config: &'c Config,
    enricher: &'e mut Enricher<'a>,
    items: Vec<Item>,
}

impl Session<'_, '_, '_> {
    fn parse(&self, input: &str, flags: ParseFlags) -> ParseResult {
        parse(
            &self.config.repos,
            &self.config.users,
            self.config.default_repo.as_deref(),
            input,
            flags,
        )
    }

    fn open(&mut self, input: &str) {
        let result = self.parse(input, ParseFlags::new().repo().bare_user().issue().path());
        let annotation = result.annotation();

        if result.has_repo() {
            let repo = result.repo();
            if result.has_issue() {
                let reference = format!("{}#{}", repo, result.issue);
                let mut item = Item::open(
                    format!("gh:{}", reference),
                    format!("Open {}{}", reference, annotation),
                    format!("{}/{}/issues/{}", GITHUB, repo, result.issue),
                );
                match self
                    .enricher
                    .attempt(FetchKind::Issue, &reference, SINGLE_DELAY)
                {
                    Attempt::Complete(resp) => {
                        if let Some(issue) = resp.issue {
                            item.title =
                                format!("Open {}: {}{}", reference, issue.title, annotation);
                            item.subtitle = issue_summary(&issue);
                            item.arg = Some(issue.url());
                        }
                    }
                    Attempt::Pending => item.subtitle = self.enricher.progress("Fetching issue"),
                    Attempt::Failed(error) => item.subtitle = error,
                    Attempt::Waiting | Attempt::Disabled => {}
                }
                self.items.push(item);
            } else if result.has_path() {
                self.items.push(Item::open(
                    format!("gh:{}{}", repo, result.path),
                    format!("Open {}{}{}", repo, result.path, annotation),
                    format!("{}/{}{}", GITHUB, repo, result.path),
                ));
            } else {
                let mut item = Item::open(
                    format!("gh:{}", repo),
                    format!("Open {}{}", repo, annotation),
                    format!("{}/{}", GITHUB, repo),
                );
                match self.enricher.attempt(FetchKind::Repo, &repo, SINGLE_DELAY) {
                    Attempt::Complete(resp) => {
                        if let Some(info) = resp.repo {
                            item.subtitle = info.description;
                        }
                    }
                    Attempt::Pending => item.subtitle = self.enricher.progress("Fetching repo"),
                    Attempt::Failed(error) => item.subtitle = error,
                    Attempt::Waiting | Attempt::Disabled => {}
                }
                self.items.push(item);
            }
        } else if result.has_owner() && !result.has_issue() && !result.has_path() {
            self.items.push(Item::open(
                format!("gh:{}", result.owner),
                format!("Open {}{}", result.owner, annotation),
                format!("{}/{}", GITHUB, result.owner),
            ));
        }

        self.shorthand_items(input);

        if self.items.is_empty() {
            self.items.push(Item::info(
                "Open repositories, issues and users on GitHub",
                "Type a shorthand, owner/name, or #issue",
            ));
        }
    }

    /// Autocomplete entries for dictionary keys the typed word is a prefix of.
    fn shorthand_items(&mut self, input: &str) {
        let word = input.strip_prefix(' ').unwrap_or(input);
        if word.is_empty() || word.contains(char::is_whitespace) {
            return;
        }

        let mut repos: Vec<_> = self
            .config
            .repos
            .iter()
            .filter(|(key, _)| key.starts_with(word) && key.as_str() != word)
            .collect();
        repos.sort();
        for (key, repo) in repos {
            self.items.push(
                Item::open(
                    format!("gh:{}", repo),
                    format!("Open {} ({})", repo, key),
                    format!("{}/{}", GITHUB, repo),
                )
                .with_autocomplete(format!(" {}", key)),
            );
        }

        let mut users: Vec<_> = self
            .config
            .users
            .iter()
            .filter(|(key, _)| key.starts_with(word) && key.as_str() != word)
            .collect();
        users.sort();
        for (key, user) in users {
            self.items.push(
                Item::open(
                    format!("gh:{}", user),
                    format!("Open {} ({})", user, key),
                    format!("{}/{}", GITHUB, user),
                )
                .with_autocomplete(format!(" {}/", key)),
            );
        }
    }

    fn issues(&mut self, input: &str) {
        let result = self.parse(input, ParseFlags::new().require_repo().query());
        if !result.has_repo() {
            self.items.push(Item::info(
                "List or search issues in a repository",
                "Type a shorthand or owner/name, then an optional search",
            ));
            return;
        }

        let repo = result.repo();
        let annotation = result.annotation();

        if result.has_query() {
            let item = Item::open(
                format!("ghis:{}:{}", repo, result.query),
                format!("Search issues in {}{} for {}", repo, annotation, result.query),
                url_with_params(
                    &format!("{}/{}/issues", GITHUB, repo),
                    &[("q", &result.query)],
                ),
            );
            let query = format!("repo:{} {}", repo, result.query);
            self.issue_results(item, &query, SEARCH_DELAY, "Searching issues");
        } else {
            let item = Item::open(
                format!("ghi:{}", repo),
                format!("List issues for {}{}", repo, annotation),
                format!("{}/{}/issues", GITHUB, repo),
            );
            let query = format!("repo:{} sort:updated-desc", repo);
            self.issue_results(item, &query, LIST_DELAY, "Fetching recent issues");
        }
    }

    fn search(&mut self, input: &str) {
        let result = self.parse(input, ParseFlags::new().query());
        if !result.has_query() {
            self.items.push(Item::info(
                "Search issues across GitHub",
                "Type a GitHub search query",
            ));
            return;
        }

        let item = Item::open(
            format!("ghs:{}", result.query),
            format!("Search GitHub issues for {}", result.query),
            url_with_params(
                &format!("{}/search", GITHUB),
                &[("q", &result.query), ("type", "issues")],
            ),
        );
        self.issue_results(item, &result.query, SEARCH_DELAY, "Searching issues");
    }

    /// Pushes `head` followed by one item per fetched issue.
    fn issue_results(&mut self, mut head: Item, query: &str, delay: Duration, label: &str) {
        let mut issues = Vec::new();
        match self.enricher.attempt(FetchKind::Issues, query, delay) {
            Attempt::Complete(resp) => {
                if resp.issues.is_empty() {
                    head.subtitle = "No issues found".to_string();
                }
                issues = resp.issues;
            }
            Attempt::Pending => head.subtitle = self.enricher.progress(label),
            Attempt::Failed(error) => head.subtitle = error,
            Attempt::Waiting | Attempt::Disabled => {}
        }

        self.items.push(head);
        self.items.extend(issues.iter().map(issue_item));
    }

    fn new_issue(&mut self, input: &str) {
        let result = self.parse(input, ParseFlags::new().require_repo().query());
        if !result.has_repo() {
            self.items.push(Item::info(
                "Open a new issue",
                "Type a shorthand or owner/name, then an optional title",
            ));
            return;
        }

        let repo = result.repo();
        let base = format!("{}/{}/issues/new", GITHUB, repo);
        let mut item = Item::open(
            format!("ghn:{}", repo),
            format!("New issue in {}{}", repo, result.annotation()),
            base.clone(),
        );
        if result.has_query() {
            let url = url_with_params(&base, &[("title", &result.query)]);
            item.subtitle = format!("Title: {}", result.query);
            item.arg = Some(url);
        }
        self.items.push(item);
    }

    fn projects(&mut self, input: &str) {
        let result = self.parse(input, ParseFlags::new().repo().bare_user().issue());
        if !result.has_owner() {
            self.items.push(Item::info(
                "Open or list projects",
                "Type a shorthand, owner/name or owner, then an optional project number",
            ));
            return;
        }

        let target = result.repo();
        let annotation = result.annotation();
        // user and org projects live under /orgs/ or /users/; /orgs/ redirects for users
        let listing_url = if result.has_repo() {
            format!("{}/{}/projects", GITHUB, target)
        } else {
            format!("{}/orgs/{}/projects", GITHUB, target)
        };

        if result.has_issue() {
            let number = &result.issue;
            let mut item = Item::open(
                format!("ghp:{}/{}", target, number),
                format!("Open project #{} in {}{}", number, target, annotation),
                format!("{}/{}", listing_url, number),
            );
            let query = format!("{}/{}", target, number);
            match self
                .enricher
                .attempt(FetchKind::Project, &query, SINGLE_DELAY)
            {
                Attempt::Complete(resp) => {
                    if let Some(project) = resp.project {
                        item.title = format!("Open project: {}{}", project.name, annotation);
                        item.subtitle = project_summary(&project);
                        item.arg = Some(project.url);
                    }
                }
                Attempt::Pending => item.subtitle = self.enricher.progress("Fetching project"),
                Attempt::Failed(error) => item.subtitle = error,
                Attempt::Waiting | Attempt::Disabled => {}
            }
            self.items.push(item);
            return;
        }

        let mut head = Item::open(
            format!("ghp:{}", target),
            format!("List projects for {}{}", target, annotation),
            listing_url,
        );
        let mut projects = Vec::new();
        match self
            .enricher
            .attempt(FetchKind::Projects, &target, LIST_DELAY)
        {
            Attempt::Complete(resp) => {
                if resp.projects.is_empty() {
                    head.subtitle = "No projects found".to_string();
                }
                projects = resp.projects;
            }
            Attempt::Pending => head.subtitle = self.enricher.progress("Fetching projects"),
            Attempt::Failed(error) => head.subtitle = error,
            Attempt::Waiting | Attempt::Disabled => {}
        }
        self.items.push(head);
        self.items.extend(projects.iter().map(|project| {
            Item::open(
                format!("ghp:{}", project.url),
                project.name.clone(),
                project.url.clone(),
            )
            .with_subtitle(project_summary(project))
        }));
    }
}

fn issue_item(issue: &Issue) -> Item {
    Item::open(
        format!("gh:{}", issue.reference()),
        format!("{}: {}", issue.reference(), issue.title),
        issue.url(),
    )
    .with_subtitle(issue_summary(issue))
}

fn issue_summary(issue: &Issue) -> String {
    let kind = if issue.kind == "PullRequest" {
        "pull request"
    } else {
        "issue"
    };
    format!("{} {} {}", issue.state.to_lowercase(), kind, issue.reference())
}

fn project_summary(project: &Project) -> String {
    let body = project.body.lines().next().unwrap_or_default();
    if project.closed {
        format!("[closed] {}", body)
    } else {
        body.to_string()
    }
}

fn url_with_params(base: &str, params: &[(&str, &str)]) -> String {
    Url::parse_with_params(base, params)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| base.to_string())
}
