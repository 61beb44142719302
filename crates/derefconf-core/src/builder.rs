//! Building node trees from raw data
//!
//! Nested mappings and sequences become child nodes. Each child resolves
//! its tokens against the same source as its parent, unless its data
//! names another one under the reserved key (`$reference` by default):
//!
//! ```yaml
//! database:
//!   $reference: secrets
//!   password: ${db/password}
//! ```
//!
//! The name `self` makes a subtree resolve tokens against its own nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::node::{ConfigNode, Shape};
use crate::source::ReferenceSource;
use crate::syntax::Syntax;
use crate::value::Value;

/// Reserved key naming a subtree's reference source
pub const DEFAULT_REFERENCE_KEY: &str = "$reference";

/// Descriptor key holding the data to build
pub const DATA_KEY: &str = "data";

/// Descriptor key naming the reference source for the whole tree
pub const REFERENCE_CONTAINER_KEY: &str = "reference_container";

/// Source name meaning "the node itself"
pub const SELF_REFERENCE: &str = "self";

/// Builds [`ConfigNode`] trees
///
/// A builder holds no per-call state, so one instance can build any number
/// of trees, from any number of threads.
#[derive(Clone)]
pub struct TreeBuilder {
    syntax: Syntax,
    default_source: Option<Arc<dyn ReferenceSource>>,
    sources: HashMap<String, Arc<dyn ReferenceSource>>,
    reference_key: String,
}

impl TreeBuilder {
    /// A builder with the default syntax and no registered sources
    pub fn new() -> Self {
        Self {
            syntax: Syntax::default(),
            default_source: None,
            sources: HashMap::new(),
            reference_key: DEFAULT_REFERENCE_KEY.to_string(),
        }
    }

    /// Syntax given to every built node
    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Source used for the root when `build` gets none
    pub fn with_default_source(mut self, source: Arc<dyn ReferenceSource>) -> Self {
        self.default_source = Some(source);
        self
    }

    /// Register a source that data can select by name
    pub fn with_source(mut self, name: impl Into<String>, source: Arc<dyn ReferenceSource>) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Change the reserved override key
    pub fn with_reference_key(mut self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::invalid_argument("reference key must not be empty"));
        }
        self.reference_key = key;
        Ok(self)
    }

    /// The syntax given to built nodes
    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    /// The reserved override key
    pub fn reference_key(&self) -> &str {
        &self.reference_key
    }

    /// Names of the registered sources
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a tree from a mapping or sequence
    ///
    /// An already built node is rejected: its reference source is fixed.
    ///
    /// The root resolves tokens against `reference`, falling back to the
    /// builder's default source and then to the root node itself. An
    /// override key in the root data takes precedence over both.
    pub fn build(
        &self,
        data: Value,
        reference: Option<Arc<dyn ReferenceSource>>,
    ) -> Result<Arc<ConfigNode>> {
        let reference = reference.or_else(|| self.default_source.clone());
        self.build_node(data, reference, &mut Vec::new())
    }

    /// Build a tree from a descriptor
    ///
    /// The descriptor is a mapping holding the payload under `data` and,
    /// optionally, the name of a registered source (or `self`) under
    /// `reference_container`.
    pub fn make(&self, descriptor: Value) -> Result<Arc<ConfigNode>> {
        let mut descriptor = match descriptor {
            Value::Mapping(map) => map,
            other => {
                return Err(Error::invalid_argument(format!(
                    "descriptor must be a mapping, got {}",
                    other.type_name()
                )))
            }
        };

        let data = descriptor.shift_remove(DATA_KEY).ok_or_else(|| {
            Error::invalid_argument(format!("descriptor has no '{}' key", DATA_KEY))
        })?;
        let reference = match descriptor.get(REFERENCE_CONTAINER_KEY) {
            Some(name) => self.select_source(name, &[])?,
            None => self.default_source.clone(),
        };

        self.build_node(data, reference, &mut Vec::new())
    }

    fn build_node(
        &self,
        data: Value,
        inherited: Option<Arc<dyn ReferenceSource>>,
        path: &mut Vec<String>,
    ) -> Result<Arc<ConfigNode>> {
        let (mut entries, shape) = match data {
            Value::Mapping(map) => (map, Shape::Mapping),
            Value::Sequence(items) => (
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item))
                    .collect::<IndexMap<_, _>>(),
                Shape::Sequence,
            ),
            other => {
                return Err(Error::invalid_argument(format!(
                    "cannot build a node from a {} value",
                    other.type_name()
                ))
                .with_path(self.location(path)))
            }
        };

        let reference = match entries.shift_remove(&self.reference_key) {
            Some(name) => self.select_source(&name, path)?,
            None => inherited,
        };

        let mut built = IndexMap::with_capacity(entries.len());
        for (key, value) in entries {
            let value = match value {
                Value::Mapping(_) | Value::Sequence(_) => {
                    path.push(key.clone());
                    let child = self.build_node(value, reference.clone(), path);
                    path.pop();
                    Value::Node(child?)
                }
                other => other,
            };
            built.insert(key, value);
        }

        Ok(Arc::new(ConfigNode::from_parts(
            built,
            reference,
            self.syntax.clone(),
            shape,
        )))
    }

    /// Look up a source named in data; `None` means the node itself
    fn select_source(
        &self,
        name: &Value,
        path: &[String],
    ) -> Result<Option<Arc<dyn ReferenceSource>>> {
        let location = self.location(path);
        let name = name.as_str().ok_or_else(|| {
            Error::invalid_argument(format!(
                "reference source name must be a string, got {}",
                name.type_name()
            ))
            .with_path(location.clone())
        })?;

        if name == SELF_REFERENCE {
            log::debug!("Node {} resolves tokens against itself", location);
            return Ok(None);
        }

        match self.sources.get(name) {
            Some(source) => {
                log::debug!("Node {} resolves tokens against source '{}'", location, name);
                Ok(Some(Arc::clone(source)))
            }
            None => Err(
                Error::invalid_argument(format!("unknown reference source '{}'", name))
                    .with_path(location)
                    .with_help(format!(
                        "Register the source on the builder, or use '{}'",
                        SELF_REFERENCE
                    )),
            ),
        }
    }

    fn location(&self, path: &[String]) -> String {
        if path.is_empty() {
            "<root>".to_string()
        } else {
            self.syntax.paths().join(path)
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("syntax", &self.syntax)
            .field("default_source", &self.default_source.is_some())
            .field("sources", &self.source_names())
            .field("reference_key", &self.reference_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::source::{Environment, FnSource, MapSource};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_nested_mappings_become_nodes() {
        let tree = TreeBuilder::new().build(data("a:\n  b: X\n"), None).unwrap();

        let a = tree.get("a").unwrap();
        let a = a.as_node().unwrap();
        assert_eq!(a.raw_entries()["b"], Value::from("X"));
        assert_eq!(tree.get("a/b").unwrap(), Value::from("X"));
    }

    #[test]
    fn test_flat_data_round_trips() {
        let raw = data("name: app\nport: 8080\nratio: 0.5\nenabled: true\nnothing: null\n");
        let tree = TreeBuilder::new().build(raw.clone(), None).unwrap();

        for (key, value) in raw.as_mapping().unwrap() {
            assert_eq!(&tree.get(key.as_str()).unwrap(), value);
        }
        assert_eq!(tree.to_value(false).unwrap(), raw);
    }

    #[test]
    fn test_sequences_keyed_by_index() {
        let tree = TreeBuilder::new()
            .build(data("hosts:\n  - alpha\n  - beta\n"), None)
            .unwrap();

        let hosts = tree.get_node("hosts").unwrap();
        assert_eq!(hosts.shape(), Shape::Sequence);
        assert_eq!(hosts.keys().collect::<Vec<_>>(), vec!["0", "1"]);
        assert_eq!(tree.get("hosts/1").unwrap(), Value::from("beta"));
        assert_eq!(
            tree.to_value(false).unwrap(),
            data("hosts:\n  - alpha\n  - beta\n")
        );
    }

    #[test]
    fn test_root_must_be_a_container() {
        let err = TreeBuilder::new().build(Value::from(3), None).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));
        assert_eq!(err.path.as_deref(), Some("<root>"));
    }

    #[test]
    fn test_built_node_is_not_raw_data() {
        let builder = TreeBuilder::new();
        let tree = builder.build(data("k: ${x}\n"), None).unwrap();
        let source: Arc<dyn ReferenceSource> = Arc::new(MapSource::new().with("x", "X"));

        let err = builder.build(Value::Node(tree.clone()), Some(source)).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));

        assert_eq!(tree.get("k").unwrap(), Value::from("${x}"));
    }

    #[test]
    fn test_children_inherit_reference() {
        let source: Arc<dyn ReferenceSource> = Arc::new(MapSource::new().with("region", "eu"));
        let tree = TreeBuilder::new()
            .build(
                data("bucket: logs-${region}\nreplica:\n  bucket: backup-${region}\n"),
                Some(source),
            )
            .unwrap();

        assert_eq!(tree.get("bucket").unwrap(), Value::from("logs-eu"));
        assert_eq!(tree.get("replica/bucket").unwrap(), Value::from("backup-eu"));
    }

    #[test]
    fn test_self_scope_is_per_node() {
        let tree = TreeBuilder::new()
            .build(
                data("name: outer\nchild:\n  name: inner\n  label: ${name}\n"),
                None,
            )
            .unwrap();

        assert_eq!(tree.get("child/label").unwrap(), Value::from("inner"));
    }

    #[test]
    fn test_default_source_used_for_root() {
        let builder =
            TreeBuilder::new().with_default_source(Arc::new(MapSource::new().with("env", "prod")));
        let tree = builder.build(data("stage: ${env}\n"), None).unwrap();
        assert_eq!(tree.get("stage").unwrap(), Value::from("prod"));

        let explicit: Arc<dyn ReferenceSource> = Arc::new(MapSource::new().with("env", "dev"));
        let tree = builder.build(data("stage: ${env}\n"), Some(explicit)).unwrap();
        assert_eq!(tree.get("stage").unwrap(), Value::from("dev"));
    }

    #[test]
    fn test_reference_override_in_data() {
        let builder = TreeBuilder::new()
            .with_source("secrets", Arc::new(MapSource::new().with("db/password", "s3cret")));
        let tree = builder
            .build(
                data(
                    "user: admin\n\
                     db:\n  $reference: secrets\n  password: ${db/password}\n  \
                     nested:\n    password: again-${db/password}\n\
                     local:\n  $reference: self\n  a: x\n  b: ${a}\n",
                ),
                None,
            )
            .unwrap();

        assert_eq!(tree.get("db/password").unwrap(), Value::from("s3cret"));
        assert_eq!(
            tree.get("db/nested/password").unwrap(),
            Value::from("again-s3cret")
        );
        assert_eq!(tree.get("local/b").unwrap(), Value::from("x"));
        assert!(!tree.has("db/$reference").unwrap());
    }

    #[test]
    fn test_unknown_override_rejected() {
        let err = TreeBuilder::new()
            .build(data("db:\n  $reference: vault\n  password: x\n"), None)
            .unwrap_err();

        assert_eq!(
            err.kind,
            ErrorKind::InvalidArgument {
                message: "unknown reference source 'vault'".into()
            }
        );
        assert_eq!(err.path.as_deref(), Some("db"));
    }

    #[test]
    fn test_custom_reference_key() {
        let builder = TreeBuilder::new()
            .with_source("env", Arc::new(Environment::with_prefix("DEREFCONF_TEST_BUILDER_")))
            .with_reference_key("@source")
            .unwrap();
        std::env::set_var("DEREFCONF_TEST_BUILDER_HOME", "/srv/app");

        let tree = builder
            .build(data("paths:\n  '@source': env\n  root: ${HOME}/data\n"), None)
            .unwrap();
        assert_eq!(tree.get("paths/root").unwrap(), Value::from("/srv/app/data"));

        std::env::remove_var("DEREFCONF_TEST_BUILDER_HOME");
        assert!(TreeBuilder::new().with_reference_key("").is_err());
    }

    #[test]
    fn test_make_with_reference_container() {
        let other = TreeBuilder::new()
            .build(data("path:\n  to:\n    other: 12.5\n"), None)
            .unwrap();
        let builder = TreeBuilder::new().with_source("other", other);

        let descriptor = data(
            "reference_container: other\n\
             data:\n\
             \x20 - props:\n      balance: ${path/to/other}\n      owner: anton\n\
             \x20 - props:\n      balance: 100\n      owner: bob\n",
        );
        let tree = builder.make(descriptor).unwrap();

        assert_eq!(tree.shape(), Shape::Sequence);
        assert_eq!(tree.get("0/props/balance").unwrap(), Value::from("12.5"));
        assert_eq!(tree.get("0/props/owner").unwrap(), Value::from("anton"));
        assert_eq!(tree.get("1/props/balance").unwrap(), Value::from(100));
        assert_eq!(tree.get("1/props/owner").unwrap(), Value::from("bob"));
    }

    #[test]
    fn test_make_with_flat_reference_container() {
        let balances = MapSource::new()
            .with("balance/anton", 12.5)
            .with("balance/bob", 100);
        let builder = TreeBuilder::new().with_source("balances", Arc::new(balances));

        let descriptor = data(
            "reference_container: balances\n\
             data:\n\
             \x20 - props:\n      balance: ${balance/anton}\n\
             \x20 - props:\n      balance: ${balance/bob}\n      note: ${balance}\n",
        );
        let tree = builder.make(descriptor).unwrap();

        assert_eq!(tree.get("0/props/balance").unwrap(), Value::from("12.5"));
        assert_eq!(tree.get("1/props/balance").unwrap(), Value::from("100"));
        // Flat sources match whole keys, never a prefix
        assert_eq!(tree.get("1/props/note").unwrap(), Value::from("${balance}"));
    }

    #[test]
    fn test_make_defaults() {
        let tree = TreeBuilder::new()
            .make(data("data:\n  a: x\n  b: ${a}\n"))
            .unwrap();
        assert_eq!(tree.get("b").unwrap(), Value::from("x"));

        let err = TreeBuilder::new().make(data("payload: {}\n")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));

        let err = TreeBuilder::new().make(data("- data\n")).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_build_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let source = FnSource::new(move |_key| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from("v"))
        });
        let tree = TreeBuilder::new()
            .build(data("a: ${x}\nb:\n  c: ${y}\n"), Some(Arc::new(source)))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        tree.get("b/c").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_applies_syntax() {
        let builder = TreeBuilder::new().with_syntax(Syntax::new(".", "{{", "}}").unwrap());
        let tree = builder
            .build(data("server:\n  host: example.org\n  url: https://{{host}}/\n"), None)
            .unwrap();

        assert_eq!(
            tree.get("server.url").unwrap(),
            Value::from("https://example.org/")
        );
    }

    #[test]
    fn test_builder_shared_across_threads() {
        let builder = Arc::new(TreeBuilder::new());
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let builder = Arc::clone(&builder);
                std::thread::spawn(move || {
                    let tree = builder
                        .build(data(&format!("n: {}\ncopy: ${{n}}\n", i)), None)
                        .unwrap();
                    tree.get_i64("copy").unwrap()
                })
            })
            .collect();

        let results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results, vec![0, 1, 2]);
    }
}
