//! Error types for derefconf
//!
//! Errors are structured: a kind, the config path involved, an optional
//! help message and the underlying cause, so that callers can tell a path
//! that does not exist apart from a path whose value could not be resolved.

use std::fmt;

/// Result type alias for derefconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for derefconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Path in the config where the error occurred (e.g., "database/port")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause
    pub cause: Option<Box<Error>>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// A path, separator or delimiter argument is not usable
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
    /// A key or path segment does not exist in the container being traversed
    #[error("Key not found: {segment}")]
    NotFound { segment: String },
    /// A reference source failed for a reason other than absence
    #[error("Container error: {message}")]
    Container { message: String },
    /// Tokens in a value could not be de-referenced
    #[error("Could not de-reference tokens")]
    Runtime,
    /// A value references itself, directly or through other values
    #[error("Circular reference detected")]
    CircularReference,
    /// A typed getter could not convert the value
    #[error("Type coercion failed")]
    TypeCoercion,
    /// Exporting to or loading from JSON/YAML failed
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::InvalidArgument {
            message: message.into(),
        })
    }

    /// Create a not found error for `segment`, reached after consuming `consumed`
    ///
    /// `consumed` is the joined path up to and including the missing segment.
    pub fn not_found(segment: impl Into<String>, consumed: impl Into<String>) -> Self {
        let consumed = consumed.into();
        Self {
            kind: ErrorKind::NotFound {
                segment: segment.into(),
            },
            help: Some(format!(
                "Check that '{}' exists in the configuration",
                consumed
            )),
            path: Some(consumed),
            cause: None,
        }
    }

    /// Create a container error (the reference source itself failed)
    pub fn container(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Container {
            message: message.into(),
        })
    }

    /// Wrap a failed token lookup
    pub fn runtime(cause: Error) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            path: None,
            help: None,
            cause: Some(Box::new(cause)),
        }
    }

    /// Create a circular reference error
    pub fn circular_reference(path: impl Into<String>, chain: Vec<String>) -> Self {
        Self {
            kind: ErrorKind::CircularReference,
            path: Some(path.into()),
            help: Some(format!(
                "Break the cycle {} by removing one of the references",
                chain.join(" → ")
            )),
            cause: None,
        }
    }

    /// Create a type coercion error
    pub fn type_coercion(
        path: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::TypeCoercion,
            path: Some(path.into()),
            help: Some(format!(
                "Ensure the value can be converted to {} (got {})",
                expected.into(),
                got.into()
            )),
            cause: None,
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Serialization {
            message: message.into(),
        })
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this is a plain "does not exist" error
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound { .. })
    }

    /// The innermost cause in the chain (the error itself when there is none)
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(cause) = &current.cause {
            current = cause;
        }
        current
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        // Causes are indented one level deeper than their parent
        if let Some(cause) = &self.cause {
            let nested = cause.to_string().replace('\n', "\n  ");
            write!(f, "\n  Caused by: {}", nested)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_error_display() {
        let err = Error::not_found("port", "database/port");
        let display = format!("{}", err);

        assert!(display.contains("Key not found: port"));
        assert!(display.contains("Path: database/port"));
        assert!(display.contains("Help:"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_runtime_error_keeps_cause() {
        let err = Error::runtime(Error::container("vault sealed")).with_path("db/password");
        let display = format!("{}", err);

        assert_eq!(err.kind, ErrorKind::Runtime);
        assert!(display.contains("Could not de-reference tokens"));
        assert!(display.contains("Path: db/password"));
        assert!(display.contains("Caused by: Container error: vault sealed"));
        assert!(!err.is_not_found());

        let source = err.source().expect("runtime error has a source");
        assert_eq!(source.to_string(), "Container error: vault sealed");
    }

    #[test]
    fn test_root_cause() {
        let inner = Error::container("boom");
        let err = Error::runtime(Error::runtime(inner));

        assert_eq!(
            err.root_cause().kind,
            ErrorKind::Container {
                message: "boom".into()
            }
        );

        let plain = Error::invalid_argument("x");
        assert_eq!(plain.root_cause().kind.to_string(), "Invalid argument: x");
    }

    #[test]
    fn test_circular_reference_error_display() {
        let err = Error::circular_reference("a", vec!["a".into(), "b".into(), "a".into()]);
        let display = format!("{}", err);

        assert!(display.contains("Circular reference detected"));
        assert!(display.contains("a → b → a"));
    }

    #[test]
    fn test_type_coercion_error() {
        let err = Error::type_coercion("server/port", "integer", "string");
        let display = format!("{}", err);

        assert_eq!(err.kind, ErrorKind::TypeCoercion);
        assert!(display.contains("Type coercion failed"));
        assert!(display.contains("Path: server/port"));
        assert!(display.contains("got string"));
    }

    #[test]
    fn test_with_help() {
        let err = Error::invalid_argument("empty separator").with_help("Use '/' or '.'");
        let display = format!("{}", err);

        assert!(display.contains("Help: Use '/' or '.'"));
    }

    #[test]
    fn test_nested_causes_are_indented() {
        let err = Error::runtime(Error::runtime(Error::not_found("x", "x")));
        let display = format!("{}", err);

        assert!(display.contains("\n  Caused by: Could not de-reference tokens"));
        assert!(display.contains("\n    Caused by: Key not found: x"));
    }
}
