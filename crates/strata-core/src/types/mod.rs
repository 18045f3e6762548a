//! # Core Type Definitions
//!
//! This module contains the value types every layer of a Strata chain shares:
//! - RDF terms (`Node`, `LiteralValue`)
//! - Quads and quad patterns (`Statement`)
//! - Error types (`StrataError`, `ErrorKind`)
//!
//! ## Value Semantics
//!
//! All types in this module:
//! - Are immutable once built; cloning is cheap (`Arc<str>` string storage)
//! - Compare structurally, by kind and value
//! - Implement `Ord` for deterministic ordering in `BTreeMap`/`BTreeSet`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// LITERAL VALUE
// =============================================================================

/// The value part of a literal node.
///
/// A literal is a lexical form with either a datatype URI, a language tag,
/// or neither (a plain literal). Never both.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LiteralValue {
    lexical: Arc<str>,
    datatype: Option<Arc<str>>,
    language: Option<Arc<str>>,
}

impl LiteralValue {
    /// Create a plain literal without datatype or language.
    #[must_use]
    pub fn plain(lexical: impl AsRef<str>) -> Self {
        Self {
            lexical: Arc::from(lexical.as_ref()),
            datatype: None,
            language: None,
        }
    }

    /// Create a typed literal.
    #[must_use]
    pub fn typed(lexical: impl AsRef<str>, datatype: impl AsRef<str>) -> Self {
        Self {
            lexical: Arc::from(lexical.as_ref()),
            datatype: Some(Arc::from(datatype.as_ref())),
            language: None,
        }
    }

    /// Create a language-tagged literal. Language tags compare lowercased.
    #[must_use]
    pub fn with_language(lexical: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Self {
            lexical: Arc::from(lexical.as_ref()),
            datatype: None,
            language: Some(Arc::from(language.as_ref().to_ascii_lowercase().as_str())),
        }
    }

    /// The lexical form.
    #[must_use]
    pub fn lexical(&self) -> &str {
        &self.lexical
    }

    /// The datatype URI, if any.
    #[must_use]
    pub fn datatype(&self) -> Option<&str> {
        self.datatype.as_deref()
    }

    /// The language tag, if any.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

// =============================================================================
// NODE
// =============================================================================

/// An RDF term, or the `Empty` wildcard.
///
/// `Empty` is declared first so that it sorts before every other node. The
/// in-memory store relies on that to start range scans at a bound subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Node {
    /// Wildcard in patterns; "default graph" in the context position.
    #[default]
    Empty,
    /// A URI resource.
    Resource(Arc<str>),
    /// A blank node with a store-local identifier.
    Blank(Arc<str>),
    /// A literal value.
    Literal(LiteralValue),
}

impl Node {
    /// Create a URI resource node.
    #[must_use]
    pub fn resource(uri: impl AsRef<str>) -> Self {
        Self::Resource(Arc::from(uri.as_ref()))
    }

    /// Create a blank node from its local identifier.
    #[must_use]
    pub fn blank(id: impl AsRef<str>) -> Self {
        Self::Blank(Arc::from(id.as_ref()))
    }

    /// Create a plain literal node.
    #[must_use]
    pub fn literal(lexical: impl AsRef<str>) -> Self {
        Self::Literal(LiteralValue::plain(lexical))
    }

    /// Create a typed literal node.
    #[must_use]
    pub fn typed_literal(lexical: impl AsRef<str>, datatype: impl AsRef<str>) -> Self {
        Self::Literal(LiteralValue::typed(lexical, datatype))
    }

    /// Create a language-tagged literal node.
    #[must_use]
    pub fn lang_literal(lexical: impl AsRef<str>, language: impl AsRef<str>) -> Self {
        Self::Literal(LiteralValue::with_language(lexical, language))
    }

    /// Check if this is the `Empty` wildcard.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Check if this node is anything but `Empty`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    #[must_use]
    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank(_))
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// The URI of a resource node.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Resource(uri) => Some(uri),
            _ => None,
        }
    }

    /// The identifier of a blank node.
    #[must_use]
    pub fn blank_id(&self) -> Option<&str> {
        match self {
            Self::Blank(id) => Some(id),
            _ => None,
        }
    }

    /// The literal value of a literal node.
    #[must_use]
    pub fn literal_value(&self) -> Option<&LiteralValue> {
        match self {
            Self::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// Check if `self`, used as a pattern field, accepts `other`.
    #[must_use]
    pub fn matches(&self, other: &Node) -> bool {
        self.is_empty() || self == other
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::term::node_to_string(self))
    }
}

impl From<&str> for Node {
    fn from(uri: &str) -> Self {
        Self::resource(uri)
    }
}

// =============================================================================
// STATEMENT
// =============================================================================

/// A quad: subject, predicate, object and context (named graph).
///
/// Field order matters: the derived `Ord` sorts by subject first, which the
/// stores use for subject-bound range scans.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,
    /// `Node::Empty` means the default graph.
    pub context: Node,
}

impl Statement {
    /// Create a statement in the default graph.
    #[must_use]
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: Node::Empty,
        }
    }

    /// Create a statement in a named graph.
    #[must_use]
    pub fn with_context(subject: Node, predicate: Node, object: Node, context: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    /// The all-wildcard pattern.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Return a copy of this statement moved into `context`.
    #[must_use]
    pub fn in_context(&self, context: Node) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }

    /// Subject, predicate and object are all set.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.subject.is_valid() && self.predicate.is_valid() && self.object.is_valid()
    }

    /// The statement is complete and each field has an RDF-legal kind:
    /// no literal subject, a resource predicate, no literal context.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_complete()
            && !self.subject.is_literal()
            && self.predicate.is_resource()
            && !self.context.is_literal()
    }

    /// Check if every non-Empty field of `pattern` equals ours.
    #[must_use]
    pub fn matches(&self, pattern: &Statement) -> bool {
        pattern.subject.matches(&self.subject)
            && pattern.predicate.matches(&self.predicate)
            && pattern.object.matches(&self.object)
            && pattern.context.matches(&self.context)
    }

    /// Reject anything that may not be written to a store.
    pub fn ensure_valid(&self) -> Result<(), StrataError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(StrataError::InvalidArgument(format!(
                "Invalid statement for mutation: {}",
                self
            )))
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::term::statement_to_string(self))
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse error classification shared by every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidOperation,
    PermissionDenied,
    BackendFailure,
    NotFound,
    Unsupported,
    Parsing,
}

/// Errors that can occur anywhere in a Strata chain.
///
/// - No silent failures
/// - Use `Result<T, StrataError>` for fallible operations
/// - `Clone` so that a model can keep its last error around
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrataError {
    /// A statement, pattern or argument is malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The call is not valid in the current state (e.g. finished transaction).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A decorator refused the call.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The storage backend reported a failure.
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// A referenced resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The active backend does not implement the operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A text input (term, rule, query) could not be parsed.
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StrataError {
    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::BackendFailure(_) => ErrorKind::BackendFailure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Parse { .. } | Self::SerializationError(_) => ErrorKind::Parsing,
        }
    }

    /// Shorthand for a `Parse` error.
    #[must_use]
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
