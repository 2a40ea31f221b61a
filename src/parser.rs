//! Shorthand grammar.
//!
//! Turns launcher text such as `df 123`, `z/dotfiles /blob/main/README.md`
//! or `zerowidth` into a [`ParseResult`], expanding abbreviations from the
//! repo and user dictionaries.
//!
//! Rules are tried in a fixed order:
//!
//! 1. `owner/name` (the owner may be a user shorthand)
//! 2. a bare word: repo shorthand, then user shorthand, then a literal owner
//! 3. the default repo, when nothing above established one
//! 4. issue number, path and free-text query over the remaining text
//!
//! Anything left over that no requested rule accounts for makes the whole
//! parse fail, and a failed parse is always the empty [`ParseResult`].

use serde::Serialize;
use std::collections::HashMap;

/// Which sub-grammars apply to a parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseFlags {
    pub match_repo: bool,
    pub require_repo: bool,
    pub bare_user: bool,
    pub match_issue: bool,
    pub match_path: bool,
    pub match_query: bool,
}

impl ParseFlags {
    pub const fn new() -> Self {
        Self {
            match_repo: false,
            require_repo: false,
            bare_user: false,
            match_issue: false,
            match_path: false,
            match_query: false,
        }
    }

    pub const fn repo(mut self) -> Self {
        self.match_repo = true;
        self
    }

    /// Implies [`repo`](Self::repo).
    pub const fn require_repo(mut self) -> Self {
        self.match_repo = true;
        self.require_repo = true;
        self
    }

    pub const fn bare_user(mut self) -> Self {
        self.bare_user = true;
        self
    }

    pub const fn issue(mut self) -> Self {
        self.match_issue = true;
        self
    }

    pub const fn path(mut self) -> Self {
        self.match_path = true;
        self
    }

    pub const fn query(mut self) -> Self {
        self.match_query = true;
        self
    }
}

/// Structured result of [`parse`]. Either fully consistent or entirely empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseResult {
    pub owner: String,
    pub name: String,
    /// Repo dictionary key that produced owner/name.
    pub repo_match: String,
    /// User dictionary key that produced the owner.
    pub user_match: String,
    pub issue: String,
    pub path: String,
    pub query: String,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn has_owner(&self) -> bool {
        !self.owner.is_empty()
    }

    pub fn has_repo(&self) -> bool {
        !self.owner.is_empty() && !self.name.is_empty()
    }

    pub fn has_issue(&self) -> bool {
        !self.issue.is_empty()
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn has_query(&self) -> bool {
        !self.query.is_empty()
    }

    /// `owner/name`, or just the owner when no name was parsed.
    pub fn repo(&self) -> String {
        if self.name.is_empty() {
            self.owner.clone()
        } else {
            format!("{}/{}", self.owner, self.name)
        }
    }

    /// Display suffix naming the shorthand that was expanded, e.g. ` (df)`.
    pub fn annotation(&self) -> String {
        if !self.repo_match.is_empty() {
            format!(" ({})", self.repo_match)
        } else if !self.user_match.is_empty() {
            format!(" ({})", self.user_match)
        } else {
            String::new()
        }
    }
}

/// Parse `input` against the shorthand dictionaries.
///
/// `default_repo` is an `owner/name` string. Never fails: input that does not
/// satisfy the requested grammar yields [`ParseResult::default`].
pub fn parse(
    repos: &HashMap<String, String>,
    users: &HashMap<String, String>,
    default_repo: Option<&str>,
    input: &str,
    flags: ParseFlags,
) -> ParseResult {
    let mut result = ParseResult::default();
    let mut rest = input;

    if flags.match_repo || flags.require_repo {
        rest = resolve_repo(&mut result, repos, users, default_repo, rest, flags);

        if let Some((owner, name)) = default_repo.and_then(|r| r.split_once('/')) {
            if result.owner.is_empty() && result.name.is_empty() {
                result.owner = owner.to_string();
                result.name = name.to_string();
            }
        }

        if flags.require_repo && !result.has_repo() {
            return ParseResult::default();
        }
    }

    if flags.match_issue {
        if let Some(issue) = match_issue(rest) {
            result.issue = issue.to_string();
            rest = "";
        }
    }

    if flags.match_path {
        if let Some(path) = match_path(rest) {
            result.path = path.to_string();
            rest = "";
        }
    }

    if flags.match_query {
        let query = rest.strip_prefix(' ').unwrap_or(rest);
        result.query = query.trim_end_matches(' ').to_string();
    } else if !rest.is_empty() {
        return ParseResult::default();
    }

    result
}

/// Applies the owner/name and bare-word rules, returning the unconsumed text.
fn resolve_repo<'a>(
    result: &mut ParseResult,
    repos: &HashMap<String, String>,
    users: &HashMap<String, String>,
    default_repo: Option<&str>,
    input: &'a str,
    flags: ParseFlags,
) -> &'a str {
    let text = input.strip_prefix(' ').unwrap_or(input);

    // user shorthand before a slash, e.g. `my_org/repo`
    let key_len = key_run(text);
    if let Some(expanded) = users.get(&text[..key_len]) {
        if let Some(end) = name_after(text, key_len) {
            result.owner = expanded.clone();
            result.user_match = text[..key_len].to_string();
            result.name = text[key_len + 1..end].to_string();
            return &text[end..];
        }
    }

    let owner_len = owner_run(text);
    if owner_len > 0 {
        if let Some(end) = name_after(text, owner_len) {
            result.owner = text[..owner_len].to_string();
            result.name = text[owner_len + 1..end].to_string();
            return &text[end..];
        }
    }

    if let Some(len) = shorthand_key(text) {
        let word = &text[..len];

        if let Some((owner, name)) = repos.get(word).and_then(|r| r.split_once('/')) {
            result.owner = owner.to_string();
            result.name = name.to_string();
            result.repo_match = word.to_string();
            return &text[len..];
        }

        if let Some(owner) = users.get(word) {
            result.owner = owner.clone();
            result.user_match = word.to_string();
            return &text[len..];
        }
    }

    if flags.bare_user {
        if let Some(len) = bare_owner(text) {
            let numeric_issue =
                default_repo.is_some() && flags.match_issue && match_issue(text).is_some();
            if !numeric_issue {
                result.owner = text[..len].to_string();
                return &text[len..];
            }
        }
    }

    input
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_owner_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

fn is_name_char(b: u8) -> bool {
    is_word(b) || b == b'.' || b == b'-'
}

/// True when a word character sits on exactly one side of `pos`.
fn at_word_boundary(bytes: &[u8], pos: usize) -> bool {
    let before = pos > 0 && is_word(bytes[pos - 1]);
    let after = pos < bytes.len() && is_word(bytes[pos]);
    before != after
}

/// Length of the run at the start of `s` that begins with an alphanumeric
/// and continues with `class`.
fn leading_run(s: &str, class: fn(u8) -> bool) -> usize {
    let bytes = s.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphanumeric() => bytes.iter().take_while(|b| class(**b)).count(),
        _ => 0,
    }
}

/// Owner run: an alphanumeric followed by alphanumerics and dashes.
fn owner_run(s: &str) -> usize {
    leading_run(s, is_owner_char)
}

/// Dictionary key run: an alphanumeric followed by word characters, dots
/// and dashes.
fn key_run(s: &str) -> usize {
    leading_run(s, is_name_char)
}

/// Longest run of `class` at the start of `s` that also ends on a word boundary.
fn bounded_run(s: &str, class: fn(u8) -> bool) -> Option<usize> {
    let bytes = s.as_bytes();
    let max = bytes.iter().take_while(|b| class(**b)).count();
    (1..=max).rev().find(|&end| at_word_boundary(bytes, end))
}

/// Matches `/name` right after the first `prefix_len` bytes of `s`,
/// returning the end of the name.
fn name_after(s: &str, prefix_len: usize) -> Option<usize> {
    if prefix_len == 0 || s.as_bytes().get(prefix_len) != Some(&b'/') {
        return None;
    }
    let name_start = prefix_len + 1;
    let name_len = bounded_run(&s[name_start..], is_name_char)?;
    Some(name_start + name_len)
}

/// Matches a dictionary key at the start of `s`, ending on a word boundary
/// so `df2` never yields `df`.
fn shorthand_key(s: &str) -> Option<usize> {
    if key_run(s) == 0 {
        return None;
    }
    bounded_run(s, is_name_char)
}

/// Matches a literal owner name at the start of `s`.
fn bare_owner(s: &str) -> Option<usize> {
    if owner_run(s) == 0 {
        return None;
    }
    bounded_run(s, is_owner_char)
}

/// Whether `key` can ever be matched as a shorthand: it must read as a
/// single bounded word to [`parse`].
pub fn is_shorthand_key(key: &str) -> bool {
    shorthand_key(key) == Some(key.len())
}

/// ` ?#?[1-9][0-9]*` over the whole of `s`; returns the digits.
fn match_issue(s: &str) -> Option<&str> {
    let s = s.strip_prefix(' ').unwrap_or(s);
    let digits = s.strip_prefix('#').unwrap_or(s);
    let bytes = digits.as_bytes();
    match bytes.first() {
        Some(b'1'..=b'9') if bytes.iter().all(u8::is_ascii_digit) => Some(digits),
        _ => None,
    }
}

/// ` ?/\S*` over the whole of `s`; returns the path.
fn match_path(s: &str) -> Option<&str> {
    let s = s.strip_prefix(' ').unwrap_or(s);
    if s.starts_with('/') && !s.chars().any(char::is_whitespace) {
        Some(s)
    } else {
        None
    }
}
