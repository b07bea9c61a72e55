use std::fmt;
use std::str::FromStr;

use regex::Regex;
use url::Url;

use crate::error::PatternError;

/// The pattern that matches every url.
pub const ALL_URLS: &str = "<all_urls>";

/// A compiled match pattern.
///
/// Every character of the pattern is matched literally and case sensitive,
/// except `*` which matches anything. The pattern has to match the whole url.
///
/// See <https://developer.chrome.com/extensions/match_patterns>
#[derive(Debug, Clone)]
pub enum MatchPattern {
    AllUrls,
    Glob { pattern: String, regex: Regex },
}

impl MatchPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern == ALL_URLS {
            return Ok(MatchPattern::AllUrls);
        }
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(MatchPattern::Glob {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether the already normalized `url` matches
    pub fn matches(&self, url: &str) -> bool {
        match self {
            MatchPattern::AllUrls => true,
            MatchPattern::Glob { regex, .. } => regex.is_match(url),
        }
    }

    /// Whether the document at `url` matches, ignoring query and fragment
    pub fn matches_url(&self, url: &Url) -> bool {
        self.matches(&document_url(url))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MatchPattern::AllUrls => ALL_URLS,
            MatchPattern::Glob { pattern, .. } => pattern,
        }
    }
}

impl FromStr for MatchPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MatchPattern::parse(s)
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The url patterns are matched against: `<protocol>//<host><pathname>`
///
/// The host includes a non default port, query and fragment are dropped.
pub fn document_url(url: &Url) -> String {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };
    format!("{}://{}{}", url.scheme(), host, url.path())
}
