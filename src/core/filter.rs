//! Comma-separated allow/deny filters.
//!
//! `"a,b,c"` passes only `a`, `b` and `c`; `"-a,b,c"` passes everything
//! except them. Matching is case-insensitive. An absent specification, or
//! one with no tokens left after normalization, produces a transparent
//! filter that passes everything.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// How a specification string is cut into tokens.
#[derive(Debug, Clone)]
pub enum Splitter {
    Literal(String),
    Pattern(Regex),
}

impl Splitter {
    fn split<'a>(&self, spec: &'a str) -> Vec<&'a str> {
        match self {
            // An empty separator cuts between characters
            Splitter::Literal(sep) if sep.is_empty() => spec
                .char_indices()
                .map(|(i, c)| &spec[i..i + c.len_utf8()])
                .collect(),
            Splitter::Literal(sep) => spec.split(sep.as_str()).collect(),
            Splitter::Pattern(re) => re.split(spec).collect(),
        }
    }
}

impl Default for Splitter {
    fn default() -> Self {
        Splitter::Literal(",".to_string())
    }
}

impl From<&str> for Splitter {
    fn from(sep: &str) -> Self {
        Splitter::Literal(sep.to_string())
    }
}

impl From<Regex> for Splitter {
    fn from(re: Regex) -> Self {
        Splitter::Pattern(re)
    }
}

#[derive(Debug, Clone)]
pub struct PatternFilter {
    transparent: bool,
    inverted: bool,
    values: Vec<String>,
    index: HashSet<String>,
}

impl PatternFilter {
    /// Build a filter splitting on commas.
    pub fn new(spec: Option<&str>) -> Self {
        Self::with_splitter(spec, Splitter::default())
    }

    pub fn with_splitter(spec: Option<&str>, splitter: impl Into<Splitter>) -> Self {
        let Some(spec) = spec else {
            return Self::transparent();
        };

        let (inverted, rest) = match spec.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let mut values = Vec::new();
        let mut index = HashSet::new();
        for token in splitter.into().split(rest) {
            let token = token.trim().to_lowercase();
            if token.is_empty() || index.contains(&token) {
                continue;
            }
            index.insert(token.clone());
            values.push(token);
        }

        if values.is_empty() {
            return Self::transparent();
        }

        Self {
            transparent: false,
            inverted,
            values,
            index,
        }
    }

    pub fn transparent() -> Self {
        Self {
            transparent: true,
            inverted: false,
            values: Vec::new(),
            index: HashSet::new(),
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.transparent
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Normalized tokens in first-seen order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn pass(&self, value: impl fmt::Display) -> bool {
        if self.transparent {
            return true;
        }
        let value = value.to_string().to_lowercase();
        self.inverted ^ self.index.contains(&value)
    }

    /// Like [`pass`](Self::pass), but an absent value is matched as `""`.
    pub fn pass_option<T: fmt::Display>(&self, value: Option<T>) -> bool {
        match value {
            Some(value) => self.pass(value),
            None => self.pass(""),
        }
    }

    /// Passes when any token satisfies `predicate` (negated for a deny-list).
    /// The predicate is never called on a transparent filter.
    pub fn custom_pass<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&str) -> bool,
    {
        if self.transparent {
            return true;
        }
        let mut predicate = predicate;
        self.inverted ^ self.values.iter().any(|v| predicate(v.as_str()))
    }
}

impl Default for PatternFilter {
    fn default() -> Self {
        Self::transparent()
    }
}
