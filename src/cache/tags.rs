//! Tag Index Module
//!
//! Key patterns that attach tags (and TTL/compression hints) to entries, plus
//! the reverse tag -> keys membership index kept alongside the store.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use glob::Pattern;

use crate::error::{CacheError, Result};

// == Tag Config ==
/// What a pattern applies to matching keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagConfig {
    /// Tags attached to every matching key
    pub tags: Vec<String>,
    /// TTL used when `set` is called without one
    pub ttl: Option<Duration>,
    /// Forces (`true`) or disables (`false`) compression
    pub compress: Option<bool>,
}

impl TagConfig {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ttl: None,
            compress: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }
}

/// Everything the pattern table says about one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagResolution {
    pub tags: BTreeSet<String>,
    pub ttl: Option<Duration>,
    pub compress: Option<bool>,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    matcher: Pattern,
    config: TagConfig,
}

// == Tag Patterns ==
/// Static pattern table. Globs are compiled once when registered.
#[derive(Debug, Default)]
pub struct TagPatterns {
    patterns: Vec<CompiledPattern>,
}

impl TagPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pattern, replacing the config of an identical one.
    pub fn add(&mut self, pattern: &str, config: TagConfig) -> Result<()> {
        let matcher = compile_glob(pattern)?;

        match self.patterns.iter_mut().find(|p| p.source == pattern) {
            Some(existing) => existing.config = config,
            None => self.patterns.push(CompiledPattern {
                source: pattern.to_string(),
                matcher,
                config,
            }),
        }
        Ok(())
    }

    /// Removes a pattern. Returns true if it was registered.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.source != pattern);
        self.patterns.len() != before
    }

    /// Unions the tags of every matching pattern. TTL and compression hints
    /// come from the first matching pattern that sets them, in registration
    /// order.
    pub fn resolve(&self, key: &str) -> TagResolution {
        let mut resolution = TagResolution::default();

        for pattern in self.patterns.iter().filter(|p| p.matcher.matches(key)) {
            resolution
                .tags
                .extend(pattern.config.tags.iter().cloned());
            if resolution.ttl.is_none() {
                resolution.ttl = pattern.config.ttl;
            }
            if resolution.compress.is_none() {
                resolution.compress = pattern.config.compress;
            }
        }
        resolution
    }

    /// Registered patterns in registration order.
    pub fn list(&self) -> Vec<(String, TagConfig)> {
        self.patterns
            .iter()
            .map(|p| (p.source.clone(), p.config.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Compiles a key pattern where `*` matches any run of characters and every
/// other character, `?` and brackets included, matches itself.
pub fn compile_glob(pattern: &str) -> Result<Pattern> {
    let mut glob = String::with_capacity(pattern.len());
    for (i, segment) in pattern.split('*').enumerate() {
        // Runs of `*` collapse to one; `**` has path semantics in glob
        if i > 0 && !glob.ends_with('*') {
            glob.push('*');
        }
        glob.push_str(&Pattern::escape(segment));
    }

    Pattern::new(&glob)
        .map_err(|e| CacheError::InvalidRequest(format!("invalid pattern '{}': {}", pattern, e)))
}

// == Tag Membership ==
/// Reverse index tag -> keys, maintained under the store lock.
#[derive(Debug, Default)]
pub struct TagMembership {
    members: HashMap<String, HashSet<String>>,
}

impl TagMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            self.members
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str, tags: &BTreeSet<String>) {
        for tag in tags {
            if let Some(keys) = self.members.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.members.remove(tag);
                }
            }
        }
    }

    /// Keys currently carrying `tag`, sorted.
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .members
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Number of distinct tags in use.
    pub fn tag_count(&self) -> usize {
        self.members.len()
    }
}
