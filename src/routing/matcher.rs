//! Path prefix matching.
//!
//! # Design Decisions
//! - Prefixes match on segment boundaries: `/api/auth` matches `/api/auth`
//!   and `/api/auth/login`, never `/api/authors`
//! - Matching is case-sensitive, as configured prefixes are canonical
//! - No regex to guarantee O(n) matching

/// A mount point such as `/api/orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefix {
    prefix: String,
}

impl PathPrefix {
    /// Create a new prefix. A trailing slash is dropped (except for `/`).
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Self { prefix }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    /// Length used to rank competing matches.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Returns true if `path` is the prefix itself or lies below it.
    pub fn matches(&self, path: &str) -> bool {
        self.remainder(path).is_some()
    }

    /// The part of `path` after the prefix, always starting with `/`.
    ///
    /// `/api/menu` → `/`, `/api/menu/12` → `/12`, `/api/menus` → `None`.
    pub fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.prefix == "/" {
            return path.starts_with('/').then_some(path);
        }
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}
