//! Token discovery and substitution
//!
//! Finds tokens such as `${db/host}` in a string and replaces each one with
//! the value its key resolves to in a reference source:
//! - `${key}` - replaced by the string form of the value at `key`
//! - missing keys keep the token text as-is, unless a default is given
//! - delimiters are configurable, e.g. `%{key}%` or `{{key}}`
//!
//! Tokens do not nest, and substituted text is never scanned again.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::source::ReferenceSource;

/// Token start delimiter used when none is configured
pub const DEFAULT_TOKEN_START: &str = "${";

/// Token end delimiter used when none is configured
pub const DEFAULT_TOKEN_END: &str = "}";

/// A token found in a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// The full token text, delimiters included
    pub text: &'a str,
    /// The key between the delimiters
    pub key: &'a str,
    /// Byte offset of the token start in the scanned string
    pub start: usize,
    /// Byte offset just past the token end
    pub end: usize,
}

/// Finds tokens in strings
pub trait TokenScanner: Send + Sync {
    /// All tokens in `input`, left to right
    fn scan<'a>(&self, input: &'a str) -> Vec<Token<'a>>;

    /// Replace every token in `input` with its value from `source`
    fn replace_references(
        &self,
        input: &str,
        source: &dyn ReferenceSource,
        default: Option<&str>,
    ) -> Result<String> {
        replace_with(self, input, source, default)
    }
}

/// Scanner for tokens wrapped in literal start/end delimiters
#[derive(Debug, Clone)]
pub struct DelimitedTokens {
    start: String,
    end: String,
    pattern: Regex,
}

impl DelimitedTokens {
    /// Create a scanner; both delimiters must be non-empty
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let start = start.into();
        let end = end.into();
        if start.is_empty() || end.is_empty() {
            return Err(Error::invalid_argument(
                "token delimiters must not be empty",
            ));
        }

        // Shortest run up to the first end delimiter: tokens never nest
        let pattern = format!(
            "(?s){}(.*?){}",
            regex::escape(&start),
            regex::escape(&end)
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| Error::invalid_argument(format!("bad token delimiters: {}", e)))?;

        Ok(Self {
            start,
            end,
            pattern,
        })
    }

    /// The start delimiter
    pub fn start(&self) -> &str {
        &self.start
    }

    /// The end delimiter
    pub fn end(&self) -> &str {
        &self.end
    }
}

impl Default for DelimitedTokens {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_START, DEFAULT_TOKEN_END)
            .expect("default token delimiters form a valid pattern")
    }
}

impl TokenScanner for DelimitedTokens {
    fn scan<'a>(&self, input: &'a str) -> Vec<Token<'a>> {
        self.pattern
            .captures_iter(input)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let key = caps.get(1)?;
                Some(Token {
                    text: whole.as_str(),
                    key: key.as_str(),
                    start: whole.start(),
                    end: whole.end(),
                })
            })
            .collect()
    }
}

/// Replace tokens delimited by `token_start`/`token_end` in `input`
///
/// Keys are looked up in `source`. A key that is not found is replaced by
/// `default` when one is given and otherwise left as literal token text.
/// Any other lookup failure is returned as a runtime error carrying the
/// cause.
pub fn replace_references(
    input: &str,
    source: &dyn ReferenceSource,
    default: Option<&str>,
    token_start: &str,
    token_end: &str,
) -> Result<String> {
    DelimitedTokens::new(token_start, token_end)?.replace_references(input, source, default)
}

/// Substitution shared by every scanner
pub fn replace_with<S: TokenScanner + ?Sized>(
    scanner: &S,
    input: &str,
    source: &dyn ReferenceSource,
    default: Option<&str>,
) -> Result<String> {
    let tokens = scanner.scan(input);
    if tokens.is_empty() {
        return Ok(input.to_string());
    }

    // One lookup per distinct token text; None keeps the token literal
    let mut resolved: HashMap<&str, Option<String>> = HashMap::new();
    let mut output = String::with_capacity(input.len());
    let mut last = 0;

    for token in &tokens {
        output.push_str(&input[last..token.start]);

        if !resolved.contains_key(token.text) {
            let replacement = resolve_token(token, source, default)?;
            resolved.insert(token.text, replacement);
        }
        output.push_str(resolved[token.text].as_deref().unwrap_or(token.text));

        last = token.end;
    }
    output.push_str(&input[last..]);

    Ok(output)
}

fn resolve_token(
    token: &Token<'_>,
    source: &dyn ReferenceSource,
    default: Option<&str>,
) -> Result<Option<String>> {
    log::trace!("De-referencing token {}", token.text);

    match source.get(token.key) {
        Ok(value) => match value.to_token_string() {
            Some(text) => Ok(Some(text)),
            None => Err(Error::runtime(Error::invalid_argument(format!(
                "token {} refers to a {} value, which cannot be inserted into a string",
                token.text,
                value.type_name()
            )))),
        },
        Err(err) if err.is_not_found() => match default {
            Some(default) => {
                log::debug!("Token {} not found, using default", token.text);
                Ok(Some(default.to_string()))
            }
            None => {
                log::debug!("Token {} not found, leaving it unresolved", token.text);
                Ok(None)
            }
        },
        Err(err) => Err(Error::runtime(err)),
    }
}
