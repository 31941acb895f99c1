//! Allow/disallow pattern matching for file selection.
//!
//! Shell-style globs: `*` and `?` stay within one path segment, `**` spans
//! directories. Wildcards never match a leading `.`: a hidden file or
//! directory is only matched by a pattern segment that spells out the dot.
//! Disallow is authoritative over allow.

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};

use crate::error::SyncError;

/// A compiled list of glob patterns.
#[derive(Debug, Clone)]
pub struct PatternList {
    /// Compiled glob set for matching.
    glob_set: GlobSet,
    /// Per pattern, its segments that start with a literal `.`.
    dot_segments: Vec<Vec<GlobMatcher>>,
}

impl Default for PatternList {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternList {
    /// Create a new empty pattern list.
    pub fn new() -> Self {
        Self {
            glob_set: GlobSet::empty(),
            dot_segments: Vec::new(),
        }
    }

    /// Create from a list of patterns.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, SyncError> {
        let mut builder = GlobSetBuilder::new();
        let mut dot_segments = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let invalid = |e: globset::Error| SyncError::Pattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            };

            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(invalid)?;
            builder.add(glob);

            let dotted = pattern
                .split('/')
                .filter(|segment| segment.starts_with('.') && *segment != "." && *segment != "..")
                .map(|segment| Glob::new(segment).map(|glob| glob.compile_matcher()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(invalid)?;
            dot_segments.push(dotted);
        }

        let glob_set = builder.build().map_err(|e| SyncError::Pattern {
            pattern: patterns.iter().map(|p| p.as_ref()).collect::<Vec<&str>>().join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            glob_set,
            dot_segments,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.dot_segments.is_empty()
    }

    /// Check whether any pattern matches the path.
    pub fn is_match(&self, path: &Path) -> bool {
        if self.is_empty() {
            return false;
        }

        self.glob_set
            .matches(path)
            .into_iter()
            .any(|index| names_hidden_segments(&self.dot_segments[index], path))
    }
}

/// Every hidden segment of `path` must be matched by one of the pattern's
/// dotted segments.
fn names_hidden_segments(dotted: &[GlobMatcher], path: &Path) -> bool {
    path.components().all(|component| match component {
        Component::Normal(name) => {
            let hidden = name.to_str().map_or(false, |name| name.starts_with('.'));
            !hidden || dotted.iter().any(|segment| segment.is_match(name))
        }
        _ => true,
    })
}

/// Outcome of filtering one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Selected,
    Disallowed,
    NotAllowed,
}

/// Allow and disallow patterns evaluated per candidate path.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    allow: PatternList,
    disallow: PatternList,
}

impl FilterSet {
    pub fn new<A: AsRef<str>, D: AsRef<str>>(allow: &[A], disallow: &[D]) -> Result<Self, SyncError> {
        Ok(Self {
            allow: PatternList::from_patterns(allow)?,
            disallow: PatternList::from_patterns(disallow)?,
        })
    }

    /// Filter that selects every file.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Decide a candidate.
    ///
    /// `candidates` are equivalent spellings of the same file (root-relative
    /// and as walked); a pattern matching any of them counts.
    pub fn decide(&self, candidates: &[&Path]) -> FilterDecision {
        if candidates.iter().any(|path| self.disallow.is_match(path)) {
            return FilterDecision::Disallowed;
        }

        if !self.allow.is_empty() && !candidates.iter().any(|path| self.allow.is_match(path)) {
            return FilterDecision::NotAllowed;
        }

        FilterDecision::Selected
    }

    pub fn is_selected(&self, candidates: &[&Path]) -> bool {
        self.decide(candidates) == FilterDecision::Selected
    }
}
