//! Include/exclude regular-expression filters over source and destination paths.

use regex_automata::meta::Regex;

use crate::error::{Error, Result};

/// One compiled filter rule.
///
/// `want` records the polarity: an include rule wants its pattern to match, an exclude rule
/// wants it not to.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
    want: bool,
}

impl PathMatcher {
    fn new(pattern: &str, want: bool) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|err| Error::InvalidRegex {
            pattern: pattern.to_string(),
            err: Box::new(err),
        })?;
        Ok(PathMatcher { regex, want })
    }

    /// A rule that only admits paths matching `pattern`.
    pub fn include(pattern: &str) -> Result<Self> {
        Self::new(pattern, true)
    }

    /// A rule that rejects paths matching `pattern`.
    pub fn exclude(pattern: &str) -> Result<Self> {
        Self::new(pattern, false)
    }

    pub fn accepts(&self, path: &[u8]) -> bool {
        self.regex.is_match(path) == self.want
    }
}

/// An ordered set of rules.  A path is rejected as soon as any rule refuses it.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    matchers: Vec<PathMatcher>,
}

impl FilterSet {
    pub fn push(&mut self, matcher: PathMatcher) {
        self.matchers.push(matcher);
    }

    pub fn clear(&mut self) {
        self.matchers.clear();
    }

    pub fn rejects(&self, path: &[u8]) -> bool {
        self.matchers.iter().any(|m| !m.accepts(path))
    }
}
