//! Reference sources
//!
//! A reference source is what tokens are resolved against. Every config
//! node is one (its tokens default to resolving against itself), and the
//! types here cover the external cases: the process environment, a flat
//! in-memory store for secrets or values pulled from elsewhere, a fallback
//! chain, and a closure.

use std::env::{self, VarError};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// Trait for anything tokens can be resolved against
pub trait ReferenceSource: Send + Sync {
    /// Retrieve the value for `key`
    ///
    /// Must fail with a `NotFound` error when the key is absent, and with a
    /// container error when the lookup itself fails.
    fn get(&self, key: &str) -> Result<Value>;

    /// Check whether `key` exists; a missing key is `Ok(false)`, not an error
    fn has(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Process environment variables, optionally namespaced by a prefix
#[derive(Debug, Clone, Default)]
pub struct Environment {
    prefix: Option<String>,
}

impl Environment {
    /// Read variables by their exact name
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{prefix}{key}` for every key
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }
}

impl ReferenceSource for Environment {
    fn get(&self, key: &str) -> Result<Value> {
        let name = self.var_name(key);
        match env::var(&name) {
            Ok(value) => Ok(Value::String(value)),
            Err(VarError::NotPresent) => Err(Error::not_found(key, key)
                .with_help(format!("Set the {} environment variable", name))),
            Err(VarError::NotUnicode(_)) => Err(Error::container(format!(
                "environment variable '{}' is not valid unicode",
                name
            ))),
        }
    }
}

/// Flat in-memory key/value store
///
/// Keys are matched exactly, so a key such as `path/to/secret` is one entry
/// rather than a path.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    entries: IndexMap<String, Value>,
}

impl MapSource {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ReferenceSource for MapSource {
    fn get(&self, key: &str) -> Result<Value> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key, key))
    }

    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}

/// Ordered fallback over several sources: the first one holding the key wins
///
/// Only `NotFound` moves on to the next source; any other failure stops the
/// lookup.
#[derive(Clone, Default)]
pub struct SourceChain {
    sources: Vec<Arc<dyn ReferenceSource>>,
}

impl SourceChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower precedence than those already added
    pub fn then(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Number of sources in the chain
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ReferenceSource for SourceChain {
    fn get(&self, key: &str) -> Result<Value> {
        for source in &self.sources {
            match source.get(key) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::not_found(key, key))
    }

    fn has(&self, key: &str) -> Result<bool> {
        for source in &self.sources {
            if source.has(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A simple function-based source
pub struct FnSource<F>
where
    F: Fn(&str) -> Result<Value> + Send + Sync,
{
    func: F,
}

impl<F> FnSource<F>
where
    F: Fn(&str) -> Result<Value> + Send + Sync,
{
    /// Create a new function-based source
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ReferenceSource for FnSource<F>
where
    F: Fn(&str) -> Result<Value> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Value> {
        (self.func)(key)
    }
}
