//! # Transactions
//!
//! A transaction is a `Model` holding a bounded set of pending mutations.
//!
//! ## Lifecycle
//!
//! ```text
//! Active ──commit()──▶ Committed
//!    └────rollback()──▶ RolledBack
//! ```
//!
//! Both end states are terminal: a second `commit()` or `rollback()` fails
//! with `InvalidOperation`, and so does every mutation. A failed `do_commit`
//! leaves the transaction `Active`. Dropping an active transaction rolls it
//! back.
//!
//! ## Types
//!
//! - `SimpleTransaction`: buffers changes over any `Store` and applies them
//!   through `Store::apply_changes` on commit
//! - `FilterTransaction`: decorator over another transaction, the
//!   transaction-side counterpart of `FilterModel`

use crate::filter::{Relay, RelayMode};
use crate::model::{
    ErrorCache, Model, NodeIterator, Notifier, QueryResultIterator, StatementIterator,
};
use crate::query::{QueryLanguage, execute_builtin_query};
use crate::store::Store;
use crate::types::{Node, Statement, StrataError};
use std::collections::BTreeSet;
use std::sync::Arc;

// =============================================================================
// TRANSACTION TRAIT
// =============================================================================

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// A `Model` with a commit/rollback lifecycle.
///
/// Implementors provide the two hooks; `commit` and `rollback` enforce the
/// state machine around them.
pub trait Transaction: Model {
    fn state(&self) -> TransactionState;

    fn set_state(&mut self, state: TransactionState);

    /// Make the pending mutations durable.
    fn do_commit(&mut self) -> Result<(), StrataError>;

    /// Discard the pending mutations.
    fn do_rollback(&mut self) -> Result<(), StrataError>;

    fn is_active(&self) -> bool {
        self.state() == TransactionState::Active
    }

    fn commit(&mut self) -> Result<(), StrataError> {
        if !self.is_active() {
            return self.error_cache().record(Err(StrataError::InvalidOperation(
                "Cannot commit a finished transaction".to_string(),
            )));
        }
        let result = self.do_commit();
        if result.is_ok() {
            self.set_state(TransactionState::Committed);
        }
        self.error_cache().record(result)
    }

    fn rollback(&mut self) -> Result<(), StrataError> {
        if !self.is_active() {
            return self.error_cache().record(Err(StrataError::InvalidOperation(
                "Cannot rollback a finished transaction".to_string(),
            )));
        }
        let result = self.do_rollback();
        if result.is_ok() {
            self.set_state(TransactionState::RolledBack);
        }
        self.error_cache().record(result)
    }
}

fn finished_error() -> StrataError {
    StrataError::InvalidOperation("Transaction is no longer active".to_string())
}

// =============================================================================
// SIMPLE TRANSACTION
// =============================================================================

/// Buffered transaction over a store handle.
///
/// `added` and `removed` stay disjoint: `added` holds statements absent from
/// the store, `removed` holds statements present in it. Reads merge both
/// with the store, so the transaction sees its own writes while nothing is
/// visible through the store before commit.
pub struct SimpleTransaction<S: Store + Clone> {
    store: S,
    added: BTreeSet<Statement>,
    removed: BTreeSet<Statement>,
    state: TransactionState,
    errors: ErrorCache,
    notifier: Notifier,
}

impl<S: Store + Clone> std::fmt::Debug for SimpleTransaction<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleTransaction")
            .field("state", &self.state)
            .field("added", &self.added.len())
            .field("removed", &self.removed.len())
            .finish_non_exhaustive()
    }
}

impl<S: Store + Clone> SimpleTransaction<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            state: TransactionState::Active,
            errors: ErrorCache::new(),
            notifier: Notifier::new(),
        }
    }

    /// Number of staged additions and removals.
    pub fn pending(&self) -> (usize, usize) {
        (self.added.len(), self.removed.len())
    }

    fn ensure_active(&self) -> Result<(), StrataError> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(finished_error())
        }
    }

    fn stage_remove(&mut self, statement: &Statement) -> Result<bool, StrataError> {
        if self.added.remove(statement) {
            return Ok(true);
        }
        if self.removed.contains(statement) || !self.store.contains_statement(statement)? {
            return Ok(false);
        }
        self.removed.insert(statement.clone());
        Ok(true)
    }

    /// Stage a batch all or nothing: every statement is validated and
    /// looked up before the first one is staged.
    fn add_all(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        self.ensure_active()?;
        for statement in statements {
            statement.ensure_valid()?;
        }
        let mut planned: BTreeSet<&Statement> = BTreeSet::new();
        for statement in statements {
            if self.removed.contains(statement)
                || !(self.added.contains(statement) || self.store.contains_statement(statement)?)
            {
                planned.insert(statement);
            }
        }
        let mut any = false;
        for statement in statements {
            if planned.remove(statement) {
                if !self.removed.remove(statement) {
                    self.added.insert(statement.clone());
                }
                self.notifier.emit_statement_added(statement);
                any = true;
            }
        }
        if any {
            self.notifier.emit_statements_added();
        }
        Ok(())
    }

    fn remove_all(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let mut any = false;
        for statement in statements {
            if self.stage_remove(statement)? {
                self.notifier.emit_statement_removed(statement);
                any = true;
            }
        }
        if any {
            self.notifier.emit_statements_removed();
        }
        Ok(())
    }

    fn visible_matches(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        self.ensure_active()?;
        // Only the removals this pattern can see need to travel with the cursor.
        let removed: BTreeSet<Statement> = self
            .removed
            .iter()
            .filter(|s| s.matches(pattern))
            .cloned()
            .collect();
        let from_store = self
            .store
            .list_statements(pattern)?
            .filter(move |item| match item {
                Ok(statement) => !removed.contains(statement),
                Err(_) => true,
            });
        let staged: Vec<Statement> = self
            .added
            .iter()
            .filter(|s| s.matches(pattern))
            .cloned()
            .collect();
        Ok(StatementIterator::new(
            from_store.chain(staged.into_iter().map(Ok)),
        ))
    }

    fn visible_contains(&self, statement: &Statement) -> Result<bool, StrataError> {
        self.ensure_active()?;
        statement.ensure_valid()?;
        if self.added.contains(statement) {
            return Ok(true);
        }
        if self.removed.contains(statement) {
            return Ok(false);
        }
        self.store.contains_statement(statement)
    }

    fn visible_contexts(&self) -> Result<Vec<Node>, StrataError> {
        let mut candidates: BTreeSet<Node> = self.store.list_contexts()?.collect_all()?.into_iter().collect();
        candidates.extend(
            self.added
                .iter()
                .filter(|s| s.context.is_valid())
                .map(|s| s.context.clone()),
        );
        let mut visible = Vec::with_capacity(candidates.len());
        for context in candidates {
            let pattern = Statement::with_context(Node::Empty, Node::Empty, Node::Empty, context.clone());
            if self.visible_matches(&pattern)?.next().transpose()?.is_some() {
                visible.push(context);
            }
        }
        Ok(visible)
    }

    fn visible_count(&self) -> Result<i64, StrataError> {
        self.ensure_active()?;
        let base = self.store.statement_count()?;
        if base < 0 {
            return Ok(-1);
        }
        Ok(base + self.added.len() as i64 - self.removed.len() as i64)
    }
}

impl<S: Store + Clone> Model for SimpleTransaction<S> {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.add_all(std::slice::from_ref(statement));
        self.errors.record(result)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let result = self.add_all(statements);
        self.errors.record(result)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self
            .ensure_active()
            .and_then(|()| statement.ensure_valid())
            .and_then(|()| self.remove_all(std::slice::from_ref(statement)));
        self.errors.record(result)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let result = self
            .visible_matches(pattern)
            .and_then(|it| it.collect_all())
            .and_then(|matches| self.remove_all(&matches));
        self.errors.record(result)
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        let result = self.visible_matches(pattern);
        self.errors.record(result)
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        let result = self
            .ensure_active()
            .and_then(|()| self.visible_contexts())
            .map(NodeIterator::from_vec);
        self.errors.record(result)
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        let result = self.visible_contains(statement);
        self.errors.record(result)
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        let result = self
            .visible_matches(pattern)
            .and_then(|mut it| it.next().transpose())
            .map(|first| first.is_some());
        self.errors.record(result)
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        let result = self
            .ensure_active()
            .and_then(|()| execute_builtin_query(self, query, language));
        self.errors.record(result)
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        let result = self.visible_count();
        self.errors.record(result)
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        let result = self.visible_count().map(|n| n == 0);
        self.errors.record(result)
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        let result = self
            .ensure_active()
            .and_then(|()| self.store.create_blank_node());
        self.errors.record(result)
    }

    fn error_cache(&self) -> &ErrorCache {
        &self.errors
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl<S: Store + Clone> Transaction for SimpleTransaction<S> {
    fn state(&self) -> TransactionState {
        self.state
    }

    fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    fn do_commit(&mut self) -> Result<(), StrataError> {
        self.store.apply_changes(&self.added, &self.removed)?;
        tracing::debug!(
            added = self.added.len(),
            removed = self.removed.len(),
            "transaction committed"
        );
        self.added.clear();
        self.removed.clear();
        Ok(())
    }

    fn do_rollback(&mut self) -> Result<(), StrataError> {
        tracing::debug!(
            added = self.added.len(),
            removed = self.removed.len(),
            "transaction rolled back"
        );
        self.added.clear();
        self.removed.clear();
        Ok(())
    }
}

impl<S: Store + Clone> Drop for SimpleTransaction<S> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            tracing::debug!("rolling back transaction dropped while active");
            let _ = self.rollback();
        }
    }
}

// =============================================================================
// FILTER TRANSACTION
// =============================================================================

/// A transaction decorator forwarding to a parent transaction.
///
/// The default hooks commit or roll back the parent. Decorator transactions
/// embed a `FilterTransaction` and put their bookkeeping around those calls.
pub struct FilterTransaction {
    parent: Box<dyn Transaction>,
    state: TransactionState,
    errors: ErrorCache,
    notifier: Arc<Notifier>,
    /// Held so the parent's weak subscription stays alive.
    _relay: Arc<Relay>,
}

impl std::fmt::Debug for FilterTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterTransaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FilterTransaction {
    pub fn new(parent: Box<dyn Transaction>) -> Self {
        let notifier = Arc::new(Notifier::new());
        let relay = Arc::new(Relay::new(&notifier, RelayMode::Forward));
        parent.notifier().subscribe(&relay);
        Self {
            parent,
            state: TransactionState::Active,
            errors: ErrorCache::new(),
            notifier,
            _relay: relay,
        }
    }

    pub fn parent(&self) -> &dyn Transaction {
        self.parent.as_ref()
    }

    pub fn parent_mut(&mut self) -> &mut dyn Transaction {
        self.parent.as_mut()
    }

    fn forward<T>(&self, result: Result<T, StrataError>) -> Result<T, StrataError> {
        self.errors.record(result)
    }
}

impl Model for FilterTransaction {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.parent.add_statement(statement);
        self.forward(result)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let result = self.parent.add_statements(statements);
        self.forward(result)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.parent.remove_statement(statement);
        self.forward(result)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let result = self.parent.remove_all_statements(pattern);
        self.forward(result)
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        self.forward(self.parent.list_statements(pattern))
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        self.forward(self.parent.list_contexts())
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        self.forward(self.parent.contains_statement(statement))
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        self.forward(self.parent.contains_any_statement(pattern))
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        self.forward(self.parent.execute_query(query, language))
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        self.forward(self.parent.statement_count())
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        self.forward(self.parent.is_empty())
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        let result = self.parent.create_blank_node();
        self.forward(result)
    }

    fn error_cache(&self) -> &ErrorCache {
        &self.errors
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl Transaction for FilterTransaction {
    fn state(&self) -> TransactionState {
        self.state
    }

    fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    fn do_commit(&mut self) -> Result<(), StrataError> {
        self.parent.commit()
    }

    fn do_rollback(&mut self) -> Result<(), StrataError> {
        self.parent.rollback()
    }
}

// =============================================================================
// TESTS
// =============================================================================
