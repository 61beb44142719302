//! Path and token syntax shared by every node of a tree

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::path::{PathNormalizer, SeparatorPaths, DEFAULT_SEPARATOR};
use crate::token::{DelimitedTokens, TokenScanner, DEFAULT_TOKEN_END, DEFAULT_TOKEN_START};

/// How paths are split and how tokens are delimited
///
/// Cloning is cheap: both collaborators are shared.
#[derive(Clone)]
pub struct Syntax {
    paths: Arc<dyn PathNormalizer>,
    tokens: Arc<dyn TokenScanner>,
    description: String,
}

impl Syntax {
    /// Syntax with the given separator and token delimiters
    ///
    /// Empty strings are rejected with `InvalidArgument`.
    pub fn new(separator: &str, token_start: &str, token_end: &str) -> Result<Self> {
        let paths = SeparatorPaths::new(separator)?;
        let tokens = DelimitedTokens::new(token_start, token_end)?;
        Ok(Self {
            paths: Arc::new(paths),
            tokens: Arc::new(tokens),
            description: describe(separator, token_start, token_end),
        })
    }

    /// Syntax built from custom collaborators
    pub fn with_collaborators(
        paths: Arc<dyn PathNormalizer>,
        tokens: Arc<dyn TokenScanner>,
    ) -> Self {
        Self {
            paths,
            tokens,
            description: "custom".to_string(),
        }
    }

    /// The path normalizer
    pub fn paths(&self) -> &dyn PathNormalizer {
        self.paths.as_ref()
    }

    /// The token scanner
    pub fn tokens(&self) -> &dyn TokenScanner {
        self.tokens.as_ref()
    }
}

fn describe(separator: &str, token_start: &str, token_end: &str) -> String {
    format!(
        "separator {:?}, tokens {:?}..{:?}",
        separator, token_start, token_end
    )
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            paths: Arc::new(SeparatorPaths::default()),
            tokens: Arc::new(DelimitedTokens::default()),
            description: describe(DEFAULT_SEPARATOR, DEFAULT_TOKEN_START, DEFAULT_TOKEN_END),
        }
    }
}

impl fmt::Debug for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Syntax({})", self.description)
    }
}
