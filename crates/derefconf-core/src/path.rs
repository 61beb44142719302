//! Path normalization and traversal
//!
//! A path addresses a value through any depth of nesting with a single
//! argument: either a string such as `"db/pool/size"`, split on the
//! separator, or a list of segments that is used as-is.

use std::borrow::Cow;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::node::ConfigNode;
use crate::value::Value;

/// Separator used when none is configured
pub const DEFAULT_SEPARATOR: &str = "/";

/// A normalized path: ordered segment keys
pub type Path = Vec<String>;

/// A path argument before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum PathSpec<'a> {
    /// A composite string, split on the separator
    Joined(&'a str),
    /// Segments that are already split and used unchanged
    Split(Cow<'a, [String]>),
}

impl<'a> From<&'a str> for PathSpec<'a> {
    fn from(path: &'a str) -> Self {
        PathSpec::Joined(path)
    }
}

impl<'a> From<&'a String> for PathSpec<'a> {
    fn from(path: &'a String) -> Self {
        PathSpec::Joined(path)
    }
}

impl<'a> From<&'a [String]> for PathSpec<'a> {
    fn from(segments: &'a [String]) -> Self {
        PathSpec::Split(Cow::Borrowed(segments))
    }
}

impl<'a> From<&'a Path> for PathSpec<'a> {
    fn from(segments: &'a Path) -> Self {
        PathSpec::Split(Cow::Borrowed(segments.as_slice()))
    }
}

impl From<Path> for PathSpec<'static> {
    fn from(segments: Path) -> Self {
        PathSpec::Split(Cow::Owned(segments))
    }
}

impl<const N: usize> From<[&str; N]> for PathSpec<'static> {
    fn from(segments: [&str; N]) -> Self {
        PathSpec::Split(Cow::Owned(segments.iter().map(|s| s.to_string()).collect()))
    }
}

impl<'a> TryFrom<&'a Value> for PathSpec<'a> {
    type Error = Error;

    /// Strings are split later; sequences of strings or integers are segments
    fn try_from(value: &'a Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(PathSpec::Joined(s)),
            Value::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Integer(i) => Ok(i.to_string()),
                    other => Err(Error::invalid_argument(format!(
                        "path segment must be a string or integer, got {}",
                        other.type_name()
                    ))),
                })
                .collect::<Result<Path>>()
                .map(|segments| PathSpec::Split(Cow::Owned(segments))),
            other => Err(Error::invalid_argument(format!(
                "path must be a string or a sequence of segments, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Turns path arguments into segments, and segments back into display paths
pub trait PathNormalizer: Send + Sync {
    /// Normalize a path argument into its segments
    fn normalize(&self, path: PathSpec<'_>) -> Result<Path>;

    /// Join segments for error messages and logs
    fn join(&self, segments: &[String]) -> String;
}

/// Splits string paths on a fixed separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorPaths {
    separator: String,
}

impl SeparatorPaths {
    /// Create a normalizer for `separator`, which must not be empty
    pub fn new(separator: impl Into<String>) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(Error::invalid_argument("path separator must not be empty"));
        }
        Ok(Self { separator })
    }

    /// The separator string paths are split on
    pub fn separator(&self) -> &str {
        &self.separator
    }
}

impl Default for SeparatorPaths {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl PathNormalizer for SeparatorPaths {
    fn normalize(&self, path: PathSpec<'_>) -> Result<Path> {
        normalize_path(path, &self.separator)
    }

    fn join(&self, segments: &[String]) -> String {
        segments.join(&self.separator)
    }
}

/// Normalize a path argument into segments
///
/// Pre-split segments are returned unchanged; strings are split on
/// `separator`. A path without any segment is rejected.
pub fn normalize_path(path: PathSpec<'_>, separator: &str) -> Result<Path> {
    let segments = match path {
        PathSpec::Split(segments) => segments.into_owned(),
        PathSpec::Joined(text) => {
            if separator.is_empty() {
                return Err(Error::invalid_argument("path separator must not be empty"));
            }
            text.split(separator).map(str::to_string).collect()
        }
    };

    if segments.is_empty() {
        return Err(Error::invalid_argument("path has no segments"));
    }
    Ok(segments)
}

/// Result of reading a path from a node's entries
#[derive(Debug)]
pub enum Found<'a> {
    /// A value stored in the walked entries, not yet dereferenced
    Raw(&'a Value),
    /// A value read through a nested node, already dereferenced by that node
    Resolved(Value),
}

/// Where a walk over raw entries stopped
enum Stop<'a, 'p> {
    /// Every segment was consumed
    Value(&'a Value),
    /// A nested node was reached with segments left; it handles the rest
    Node {
        node: &'a Arc<ConfigNode>,
        consumed: &'p [String],
        rest: &'p [String],
    },
}

/// Only canonical decimal indices, the same keys a built sequence node uses
fn sequence_index(segment: &str) -> Option<usize> {
    segment
        .parse::<usize>()
        .ok()
        .filter(|index| index.to_string() == segment)
}

fn walk<'a, 'p>(
    entries: &'a IndexMap<String, Value>,
    path: &'p [String],
    paths: &dyn PathNormalizer,
) -> Result<Stop<'a, 'p>> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| Error::invalid_argument("path has no segments"))?;

    let mut current = entries
        .get(first)
        .ok_or_else(|| Error::not_found(first, paths.join(&path[..1])))?;

    for (offset, segment) in rest.iter().enumerate() {
        let depth = offset + 1;
        current = match current {
            Value::Mapping(map) => map
                .get(segment)
                .ok_or_else(|| Error::not_found(segment, paths.join(&path[..=depth])))?,
            Value::Sequence(seq) => sequence_index(segment)
                .and_then(|index| seq.get(index))
                .ok_or_else(|| Error::not_found(segment, paths.join(&path[..=depth])))?,
            Value::Node(node) => {
                return Ok(Stop::Node {
                    node,
                    consumed: &path[..depth],
                    rest: &path[depth..],
                });
            }
            other => {
                let consumed = paths.join(&path[..depth]);
                return Err(Error::invalid_argument(format!(
                    "cannot descend into {} value at '{}'",
                    other.type_name(),
                    consumed
                ))
                .with_path(consumed));
            }
        };
    }

    Ok(Stop::Value(current))
}

/// Prefix an error raised by a nested node with the path consumed to reach it
fn rebase(mut err: Error, consumed: &[String], paths: &dyn PathNormalizer) -> Error {
    if let Some(inner) = err.path.take() {
        let mut segments = consumed.to_vec();
        segments.push(inner);
        err.path = Some(paths.join(&segments));
    }
    err
}

/// Read the value at `path`, descending through nested containers
///
/// Fails with `NotFound` naming the first missing segment, or with
/// `InvalidArgument` when a scalar is reached with segments remaining.
pub fn get_by_path<'a>(
    entries: &'a IndexMap<String, Value>,
    path: &[String],
    paths: &dyn PathNormalizer,
) -> Result<Found<'a>> {
    match walk(entries, path, paths)? {
        Stop::Value(value) => Ok(Found::Raw(value)),
        Stop::Node {
            node,
            consumed,
            rest,
        } => node
            .get(rest)
            .map(Found::Resolved)
            .map_err(|err| rebase(err, consumed, paths)),
    }
}

/// Read the value at `path` exactly as stored, tokens included
pub fn raw_by_path(
    entries: &IndexMap<String, Value>,
    path: &[String],
    paths: &dyn PathNormalizer,
) -> Result<Value> {
    match walk(entries, path, paths)? {
        Stop::Value(value) => Ok(value.clone()),
        Stop::Node {
            node,
            consumed,
            rest,
        } => node
            .get_raw(rest)
            .map_err(|err| rebase(err, consumed, paths)),
    }
}

/// Check whether `path` exists; only `NotFound` is turned into `false`
pub fn has_by_path(
    entries: &IndexMap<String, Value>,
    path: &[String],
    paths: &dyn PathNormalizer,
) -> Result<bool> {
    match walk(entries, path, paths) {
        Ok(Stop::Value(_)) => Ok(true),
        Ok(Stop::Node {
            node,
            consumed,
            rest,
        }) => node.has(rest).map_err(|err| rebase(err, consumed, paths)),
        Err(err) if err.is_not_found() => Ok(false),
        Err(err) => Err(err),
    }
}
