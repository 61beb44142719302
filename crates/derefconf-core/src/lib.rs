//! derefconf-core: Hierarchical configuration with lazy token de-referencing
//!
//! This crate builds a tree of configuration nodes from raw data. String
//! values may embed tokens such as `${db/host}` which are resolved every time
//! the value is read, against the node itself or an external reference
//! source (environment, secrets, another config).
//!
//! # Example
//!
//! ```rust
//! use derefconf_core::{TreeBuilder, Value};
//!
//! let yaml = r#"
//! database:
//!   host: localhost
//!   port: 5432
//!   url: postgres://${host}:${port}/app
//! "#;
//!
//! let data: Value = serde_yaml::from_str(yaml).unwrap();
//! let config = TreeBuilder::new().build(data, None).unwrap();
//! assert_eq!(
//!     config.get("database/url").unwrap().as_str(),
//!     Some("postgres://localhost:5432/app")
//! );
//! ```

pub mod builder;
pub mod error;
pub mod path;
pub mod source;
pub mod syntax;
pub mod token;
pub mod value;

mod node;

pub use builder::TreeBuilder;
pub use error::{Error, ErrorKind, Result};
pub use node::{ConfigNode, Iter, Shape};
pub use path::{normalize_path, PathNormalizer, PathSpec, SeparatorPaths};
pub use source::{Environment, FnSource, MapSource, ReferenceSource, SourceChain};
pub use syntax::Syntax;
pub use token::{replace_references, DelimitedTokens, Token, TokenScanner};
pub use value::Value;
