//! Config nodes
//!
//! A node holds one level of configuration. String values are
//! de-referenced every time they are read: each token is looked up in the
//! node's reference source, which is the node itself unless another source
//! was supplied. Nested nodes are returned as-is and resolve their own
//! leaves with their own source.

use std::cell::RefCell;
use std::fmt;
use std::slice;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::path::{get_by_path, has_by_path, raw_by_path, Found, PathSpec};
use crate::source::ReferenceSource;
use crate::syntax::Syntax;
use crate::value::Value;

/// What kind of raw data a node was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    /// Keys are the mapping keys
    #[default]
    Mapping,
    /// Keys are the decimal indices `"0"`, `"1"`, ...
    Sequence,
}

thread_local! {
    /// (node address, segments, display path) being de-referenced on this thread
    static RESOLVING: RefCell<Vec<(usize, Vec<String>, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a path as being de-referenced until dropped
struct ResolutionGuard;

impl ResolutionGuard {
    /// Segments are compared as-is: `["a/b"]` and `["a", "b"]` are different paths
    fn enter(node: &ConfigNode, segments: &[String], path: &str) -> Result<Self> {
        let id = node as *const ConfigNode as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack
                .iter()
                .position(|(n, s, _)| *n == id && s.as_slice() == segments)
            {
                let mut chain: Vec<String> = stack[start..].iter().map(|(_, _, p)| p.clone()).collect();
                chain.push(path.to_string());
                return Err(Error::circular_reference(path, chain));
            }
            stack.push((id, segments.to_vec(), path.to_string()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// One level of a configuration tree
pub struct ConfigNode {
    entries: IndexMap<String, Value>,
    /// Where tokens are looked up; `None` means this node
    reference: Option<Arc<dyn ReferenceSource>>,
    syntax: Syntax,
    shape: Shape,
}

impl ConfigNode {
    /// Create a self-referencing node with the default syntax
    pub fn new(entries: IndexMap<String, Value>) -> Self {
        Self::from_parts(entries, None, Syntax::default(), Shape::Mapping)
    }

    pub(crate) fn from_parts(
        entries: IndexMap<String, Value>,
        reference: Option<Arc<dyn ReferenceSource>>,
        syntax: Syntax,
        shape: Shape,
    ) -> Self {
        Self {
            entries,
            reference,
            syntax,
            shape,
        }
    }

    /// Resolve tokens against `source` instead of this node
    pub fn with_reference(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.reference = Some(source);
        self
    }

    /// Use a non-default path and token syntax
    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Export as a sequence instead of a mapping
    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }

    /// The entries exactly as stored, tokens included
    pub fn raw_entries(&self) -> &IndexMap<String, Value> {
        &self.entries
    }

    /// The external reference source, if any
    pub fn reference(&self) -> Option<&Arc<dyn ReferenceSource>> {
        self.reference.as_ref()
    }

    /// The path and token syntax of this node
    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// What this node was built from
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of direct entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the node has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct entry keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Get the value at `path`, with tokens de-referenced
    ///
    /// Fails with `NotFound` when the path does not exist, and with a
    /// runtime error (carrying the cause) when it exists but one of its
    /// tokens could not be resolved.
    pub fn get<'p>(&self, path: impl Into<PathSpec<'p>>) -> Result<Value> {
        let segments = self.syntax.paths().normalize(path.into())?;
        match get_by_path(&self.entries, &segments, self.syntax.paths())? {
            Found::Resolved(value) => Ok(value),
            Found::Raw(value) => self.dereference(value, &segments),
        }
    }

    /// Get the value at `path` without de-referencing its tokens
    pub fn get_raw<'p>(&self, path: impl Into<PathSpec<'p>>) -> Result<Value> {
        let segments = self.syntax.paths().normalize(path.into())?;
        raw_by_path(&self.entries, &segments, self.syntax.paths())
    }

    /// Check whether `path` exists, without de-referencing anything
    pub fn has<'p>(&self, path: impl Into<PathSpec<'p>>) -> Result<bool> {
        let segments = self.syntax.paths().normalize(path.into())?;
        has_by_path(&self.entries, &segments, self.syntax.paths())
    }

    /// Get a value as a string; scalars are converted
    pub fn get_string(&self, path: &str) -> Result<String> {
        let value = self.get(path)?;
        value
            .to_token_string()
            .ok_or_else(|| Error::type_coercion(path, "string", value.type_name()))
    }

    /// Get a value as an integer; strings are parsed
    pub fn get_i64(&self, path: &str) -> Result<i64> {
        let value = self.get(path)?;
        match value {
            Value::Integer(i) => Ok(i),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::type_coercion(path, "integer", format!("string (\"{}\")", s))),
            _ => Err(Error::type_coercion(path, "integer", value.type_name())),
        }
    }

    /// Get a value as a float; integers are widened and strings parsed
    pub fn get_f64(&self, path: &str) -> Result<f64> {
        let value = self.get(path)?;
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::type_coercion(path, "float", format!("string (\"{}\")", s))),
            _ => Err(Error::type_coercion(path, "float", value.type_name())),
        }
    }

    /// Get a value as a boolean
    ///
    /// Only `"true"` and `"false"` (any case) convert from strings.
    pub fn get_bool(&self, path: &str) -> Result<bool> {
        let value = self.get(path)?;
        match value {
            Value::Bool(b) => Ok(b),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::type_coercion(
                    path,
                    "boolean",
                    format!("string (\"{}\") - only \"true\" or \"false\" allowed", s),
                )),
            },
            _ => Err(Error::type_coercion(path, "boolean", value.type_name())),
        }
    }

    /// Get the nested node at `path`
    pub fn get_node(&self, path: &str) -> Result<Arc<ConfigNode>> {
        match self.get(path)? {
            Value::Node(node) => Ok(node),
            other => Err(Error::type_coercion(path, "node", other.type_name())),
        }
    }

    /// Iterate direct entries in order, de-referencing each value
    ///
    /// Nothing is cached: every pass looks tokens up again.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            node: self,
            entries: self.entries.iter(),
        }
    }

    /// Export as plain data
    ///
    /// With `resolve`, every string is de-referenced; otherwise tokens are
    /// kept. Nested nodes become mappings or sequences by their shape.
    pub fn to_value(&self, resolve: bool) -> Result<Value> {
        let mut path = Vec::new();
        match self.shape {
            Shape::Mapping => self
                .entries
                .iter()
                .map(|(key, value)| -> Result<(String, Value)> {
                    path.push(key.clone());
                    let exported = self.export(value, &mut path, resolve);
                    path.pop();
                    Ok((key.clone(), exported?))
                })
                .collect::<Result<IndexMap<_, _>>>()
                .map(Value::Mapping),
            Shape::Sequence => self
                .entries
                .iter()
                .map(|(key, value)| {
                    path.push(key.clone());
                    let exported = self.export(value, &mut path, resolve);
                    path.pop();
                    exported
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
        }
    }

    /// Export as pretty-printed JSON
    pub fn to_json(&self, resolve: bool) -> Result<String> {
        let value = self.to_value(resolve)?;
        serde_json::to_string_pretty(&value).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Export as YAML
    pub fn to_yaml(&self, resolve: bool) -> Result<String> {
        let value = self.to_value(resolve)?;
        serde_yaml::to_string(&value).map_err(|e| Error::serialization(e.to_string()))
    }

    fn export(&self, value: &Value, path: &mut Vec<String>, resolve: bool) -> Result<Value> {
        match value {
            Value::Node(node) => node.to_value(resolve),
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    path.push(index.to_string());
                    let exported = self.export(item, path, resolve);
                    path.pop();
                    exported
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            Value::Mapping(map) => map
                .iter()
                .map(|(key, item)| -> Result<(String, Value)> {
                    path.push(key.clone());
                    let exported = self.export(item, path, resolve);
                    path.pop();
                    Ok((key.clone(), exported?))
                })
                .collect::<Result<IndexMap<_, _>>>()
                .map(Value::Mapping),
            Value::String(_) if resolve => self.dereference(value, path),
            other => Ok(other.clone()),
        }
    }

    /// Run a raw value read at `segments` through the token replacer
    fn dereference(&self, value: &Value, segments: &[String]) -> Result<Value> {
        let text = match value {
            Value::String(text) => text,
            other => return Ok(other.clone()),
        };

        let path = self.syntax.paths().join(segments);
        let _guard = ResolutionGuard::enter(self, segments, &path)?;

        let source: &dyn ReferenceSource = match &self.reference {
            Some(source) => source.as_ref(),
            None => self,
        };
        self.syntax
            .tokens()
            .replace_references(text, source, None)
            .map(Value::String)
            .map_err(|err| err.with_path(path))
    }
}

impl ReferenceSource for ConfigNode {
    fn get(&self, key: &str) -> Result<Value> {
        ConfigNode::get(self, key)
    }

    fn has(&self, key: &str) -> Result<bool> {
        ConfigNode::has(self, key)
    }
}

/// Iterator over a node's de-referenced entries
pub struct Iter<'a> {
    node: &'a ConfigNode,
    entries: indexmap::map::Iter<'a, String, Value>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(&'a str, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.entries.next()?;
        Some(
            self.node
                .dereference(value, slice::from_ref(key))
                .map(|value| (key.as_str(), value)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<'a> IntoIterator for &'a ConfigNode {
    type Item = Result<(&'a str, Value)>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("entries", &self.entries)
            .field(
                "reference",
                &if self.reference.is_some() {
                    "external"
                } else {
                    "self"
                },
            )
            .field("syntax", &self.syntax)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Nodes compare by their raw entries and shape
impl PartialEq for ConfigNode {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.entries == other.entries
    }
}

impl Serialize for ConfigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.shape {
            Shape::Mapping => serializer.collect_map(&self.entries),
            Shape::Sequence => serializer.collect_seq(self.entries.values()),
        }
    }
}
