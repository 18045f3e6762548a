//! # Store Contract
//!
//! A store is the innermost layer of a chain: the only `Model` that owns data.
//!
//! This module defines:
//! - `Store`, the backend-facing extension of `Model`
//! - `Capabilities` / `Feature`, what a backend reports it can do
//! - `StoreConfig` / `BackendKind`, explicit backend selection
//! - `Backend`, the enum that dispatches to a built-in store

use crate::graph::MemoryStore;
use crate::model::{ErrorCache, Model, NodeIterator, Notifier, QueryResultIterator, StatementIterator};
use crate::primitives::BLANK_NODE_PREFIX;
use crate::query::QueryLanguage;
use crate::storage::RedbStore;
use crate::transaction::Transaction;
use crate::types::{Node, Statement, StrataError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

// =============================================================================
// CAPABILITIES
// =============================================================================

/// A feature a backend may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Named graphs are stored, not collapsed into the default graph.
    Contexts,
    Transactions,
    /// `execute_query` understands at least one language.
    Querying,
    /// Data survives the process.
    Persistence,
}

/// The feature set reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    features: BTreeSet<Feature>,
}

impl Capabilities {
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            features: features.into_iter().collect(),
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// The contract a backend implements on top of `Model`.
pub trait Store: Model {
    fn capabilities(&self) -> Capabilities;

    /// Destroy all stored data, notifying each removed statement.
    fn erase_all(&mut self) -> Result<(), StrataError>;

    /// Atomically remove `removed` and insert `added`.
    ///
    /// Either every change lands or none does. Emits per-statement
    /// notifications for actual changes, then at most one coalesced
    /// notification per kind. This is the commit path of `SimpleTransaction`.
    fn apply_changes(
        &mut self,
        added: &BTreeSet<Statement>,
        removed: &BTreeSet<Statement>,
    ) -> Result<(), StrataError>;
}

/// The smallest counter value that keeps minted blank ids clear of `statement`.
///
/// Both built-in stores mint `b<n>`; imported data may already use such ids.
pub(crate) fn blank_counter_floor(statement: &Statement) -> Option<u64> {
    [&statement.subject, &statement.object, &statement.context]
        .into_iter()
        .filter_map(|node| node.blank_id())
        .filter_map(|id| id.strip_prefix(BLANK_NODE_PREFIX))
        .filter_map(|digits| digits.parse::<u64>().ok())
        .map(|n| n.saturating_add(1))
        .max()
}

/// Emit the notifications for one applied change set.
pub(crate) fn notify_changes(notifier: &Notifier, added: &[Statement], removed: &[Statement]) {
    for statement in removed {
        notifier.emit_statement_removed(statement);
    }
    for statement in added {
        notifier.emit_statement_added(statement);
    }
    if !removed.is_empty() {
        notifier.emit_statements_removed();
    }
    if !added.is_empty() {
        notifier.emit_statements_added();
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Which built-in backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redb,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redb => f.write_str("redb"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => Err(StrataError::InvalidArgument(format!(
                "Unknown backend '{}'",
                other
            ))),
        }
    }
}

/// Explicit backend selection. There is no process-wide default backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Database file; required for `redb`.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn redb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Redb,
            path: Some(path.into()),
        }
    }

    /// Open the configured backend.
    pub fn open(&self) -> Result<Backend, StrataError> {
        match self.backend {
            BackendKind::Memory => Ok(Backend::Memory(MemoryStore::new())),
            BackendKind::Redb => {
                let path = self.path.as_ref().ok_or_else(|| {
                    StrataError::InvalidArgument("The redb backend requires a path".to_string())
                })?;
                Ok(Backend::Redb(RedbStore::open(path)?))
            }
        }
    }
}

// =============================================================================
// BACKEND DISPATCH
// =============================================================================

/// One of the built-in stores.
///
/// Cloning clones the handle: both clones see the same data.
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(MemoryStore),
    Redb(RedbStore),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory(_) => BackendKind::Memory,
            Self::Redb(_) => BackendKind::Redb,
        }
    }

    /// Check if this backend keeps data on disk.
    pub fn is_persistent(&self) -> bool {
        self.capabilities().supports(Feature::Persistence)
    }

    /// The in-memory store, if that is the active backend.
    pub fn as_memory(&self) -> Option<&MemoryStore> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Redb(_) => None,
        }
    }
}

impl Model for Backend {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.add_statement(statement),
            Self::Redb(store) => store.add_statement(statement),
        }
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.remove_statement(statement),
            Self::Redb(store) => store.remove_statement(statement),
        }
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.remove_all_statements(pattern),
            Self::Redb(store) => store.remove_all_statements(pattern),
        }
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        match self {
            Self::Memory(store) => store.list_statements(pattern),
            Self::Redb(store) => store.list_statements(pattern),
        }
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        match self {
            Self::Memory(store) => store.list_contexts(),
            Self::Redb(store) => store.list_contexts(),
        }
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        match self {
            Self::Memory(store) => store.contains_statement(statement),
            Self::Redb(store) => store.contains_statement(statement),
        }
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        match self {
            Self::Memory(store) => store.contains_any_statement(pattern),
            Self::Redb(store) => store.contains_any_statement(pattern),
        }
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        match self {
            Self::Memory(store) => store.execute_query(query, language),
            Self::Redb(store) => store.execute_query(query, language),
        }
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        match self {
            Self::Memory(store) => store.statement_count(),
            Self::Redb(store) => store.statement_count(),
        }
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        match self {
            Self::Memory(store) => store.is_empty(),
            Self::Redb(store) => store.is_empty(),
        }
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        match self {
            Self::Memory(store) => store.create_blank_node(),
            Self::Redb(store) => store.create_blank_node(),
        }
    }

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        match self {
            Self::Memory(store) => store.start_transaction(),
            Self::Redb(store) => store.start_transaction(),
        }
    }

    fn error_cache(&self) -> &ErrorCache {
        match self {
            Self::Memory(store) => store.error_cache(),
            Self::Redb(store) => store.error_cache(),
        }
    }

    fn notifier(&self) -> &Notifier {
        match self {
            Self::Memory(store) => store.notifier(),
            Self::Redb(store) => store.notifier(),
        }
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.add_statements(statements),
            Self::Redb(store) => store.add_statements(statements),
        }
    }
}

impl Store for Backend {
    fn capabilities(&self) -> Capabilities {
        match self {
            Self::Memory(store) => store.capabilities(),
            Self::Redb(store) => store.capabilities(),
        }
    }

    fn erase_all(&mut self) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.erase_all(),
            Self::Redb(store) => store.erase_all(),
        }
    }

    fn apply_changes(
        &mut self,
        added: &BTreeSet<Statement>,
        removed: &BTreeSet<Statement>,
    ) -> Result<(), StrataError> {
        match self {
            Self::Memory(store) => store.apply_changes(added, removed),
            Self::Redb(store) => store.apply_changes(added, removed),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
