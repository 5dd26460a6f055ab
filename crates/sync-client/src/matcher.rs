//! Response patterns for the correlator.
//!
//! A pattern is either a literal substring or a compiled regular expression.
//! Both are tested through [`ResponsePattern::find`], which reports the
//! match and any capture groups.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What a pending response waits for.
#[derive(Debug, Clone)]
pub enum ResponsePattern {
    /// Matches when the text contains this substring.
    Exact(String),
    /// Matches when the expression matches anywhere in the text.
    Regex(Regex),
}

impl ResponsePattern {
    /// Create a literal substring pattern.
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        ResponsePattern::Exact(text.into())
    }

    /// Compile a regular expression pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression does not compile.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(ResponsePattern::Regex)
    }

    /// Test the pattern against `haystack`.
    ///
    /// For a regex, the captures come from the first match.
    #[must_use]
    pub fn find(&self, haystack: &str) -> Option<MatchResult> {
        match self {
            ResponsePattern::Exact(needle) => haystack.find(needle.as_str()).map(|start| MatchResult {
                groups: vec![Some(needle.clone())],
                end: start + needle.len(),
            }),
            ResponsePattern::Regex(regex) => regex.captures(haystack).map(|caps| MatchResult {
                groups: caps
                    .iter()
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect(),
                end: caps.get(0).map_or(0, |m| m.end()),
            }),
        }
    }

    /// Check whether the pattern matches `haystack`.
    #[must_use]
    pub fn matches(&self, haystack: &str) -> bool {
        match self {
            ResponsePattern::Exact(needle) => haystack.contains(needle.as_str()),
            ResponsePattern::Regex(regex) => regex.is_match(haystack),
        }
    }
}

impl From<&str> for ResponsePattern {
    fn from(text: &str) -> Self {
        ResponsePattern::exact(text)
    }
}

impl From<String> for ResponsePattern {
    fn from(text: String) -> Self {
        ResponsePattern::Exact(text)
    }
}

impl From<Regex> for ResponsePattern {
    fn from(regex: Regex) -> Self {
        ResponsePattern::Regex(regex)
    }
}

impl std::fmt::Display for ResponsePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponsePattern::Exact(text) => write!(f, "{text:?}"),
            ResponsePattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// A successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Group 0 is the whole match; the rest are capture groups, `None`
    /// when a group did not participate.
    groups: Vec<Option<String>>,
    /// Byte offset just past the match in the tested text.
    end: usize,
}

impl MatchResult {
    /// The text that matched.
    #[must_use]
    pub fn matched(&self) -> &str {
        self.group(0).unwrap_or_default()
    }

    /// Get a group by index. Index 0 is the whole match.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Capture groups, excluding the whole match.
    #[must_use]
    pub fn captures(&self) -> &[Option<String>] {
        self.groups.get(1..).unwrap_or_default()
    }

    /// Byte offset just past the match in the tested text.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }
}

/// How inbound data is presented to pending matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Each chunk is tested on its own. A response split across two chunks
    /// never matches.
    #[default]
    PerChunk,
    /// Chunks accumulate in a buffer, which is tested as a whole and
    /// trimmed through the end of the furthest match.
    Buffered,
}
