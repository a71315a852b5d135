//! Folder query options and the search filter grammar.
//!
//! Listings can be shaped three ways: depth (shallow or recursive), a
//! user-typed search filter matched against item names, and a sort order.
//! The filter grammar is deliberately small: whitespace-separated tokens
//! (double quotes group), `*` and `?` wildcards, a leading dot marks an
//! extension search, and a bare token is a prefix search. All tokens must
//! match (AND semantics); the empty filter matches everything.

use crate::error::{Error, ErrorKind, Result};
use crate::item::ItemInfo;
use regex::Regex;

/// Whether a listing stops at the folder's children or walks the subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderDepth {
    #[default]
    Shallow,
    Deep,
}

/// Property a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    DateCreated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ordering clause; earlier clauses take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(key: SortKey) -> Self {
        Self { key, direction: SortDirection::Ascending }
    }

    pub fn descending(key: SortKey) -> Self {
        Self { key, direction: SortDirection::Descending }
    }
}

/// Options shaping a folder query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub depth: FolderDepth,
    pub filter: Option<Filter>,
    pub sort: Vec<SortSpec>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self) -> Self {
        self.depth = FolderDepth::Deep;
        self
    }

    /// Parse and attach a user search filter.
    pub fn with_filter(mut self, query: &str) -> Result<Self> {
        self.filter = Some(Filter::parse(query)?);
        Ok(self)
    }

    pub fn sorted_by(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    /// Whether `info` passes this query's filter.
    pub fn matches(&self, info: &ItemInfo) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(&info.name),
            None => true,
        }
    }

    /// Order `items` by the sort clauses, in place. Without clauses the
    /// backend's natural order is kept.
    pub fn sort_items(&self, items: &mut [ItemInfo]) {
        for spec in self.sort.iter().rev() {
            match (spec.key, spec.direction) {
                (SortKey::Name, SortDirection::Ascending) => {
                    items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                }
                (SortKey::Name, SortDirection::Descending) => {
                    items.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()));
                }
                (SortKey::DateCreated, SortDirection::Ascending) => {
                    items.sort_by_key(|i| i.date_created);
                }
                (SortKey::DateCreated, SortDirection::Descending) => {
                    items.sort_by_key(|i| std::cmp::Reverse(i.date_created));
                }
            }
        }
    }
}

/// A compiled search filter.
#[derive(Debug, Clone)]
pub struct Filter {
    patterns: Vec<Regex>,
}

impl Filter {
    /// Compile a user query string.
    ///
    /// Token shaping: `.ext` becomes `*.ext*`, a token without a trailing
    /// wildcard gets one appended (prefix search), explicit `*`/`?` pass
    /// through. Matching is case-insensitive and anchored.
    pub fn parse(query: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for token in tokenize(query) {
            let mask = if token.starts_with('.') {
                format!("*{token}*")
            } else if token.ends_with('*') {
                token
            } else {
                format!("{token}*")
            };
            patterns.push(compile_mask(&mask)?);
        }
        Ok(Self { patterns })
    }

    /// Whether `name` satisfies every token of the filter.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().all(|p| p.is_match(name))
    }
}

/// Split on whitespace, keeping double-quoted runs as one token.
fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in query.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Translate a `*`/`?` mask into an anchored case-insensitive regex.
fn compile_mask(mask: &str) -> Result<Regex> {
    let mut pattern = String::from("(?i)^");
    for c in mask.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| Error::from(ErrorKind::InvalidData(e.to_string())))
}
