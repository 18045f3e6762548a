//! # Model Contract
//!
//! The operation set every layer of a Strata chain exposes, whether it owns
//! data (a store) or delegates to a parent (a decorator).
//!
//! This module also holds the plumbing every implementation shares:
//! - `ResultIterator`, the lazy, closeable result sequence
//! - `ErrorCache`, the per-model last-error record
//! - `Notifier` / `ModelObserver`, synchronous change notifications

use crate::pattern::BindingSet;
use crate::query::QueryLanguage;
use crate::transaction::Transaction;
use crate::types::{Node, Statement, StrataError};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

// =============================================================================
// RESULT ITERATORS
// =============================================================================

type BoxedIter<T> = Box<dyn Iterator<Item = Result<T, StrataError>> + Send>;

/// A lazy, forward-only, closeable sequence of fallible results.
///
/// Not restartable. Closing releases the backend resources held by the
/// underlying cursor; a closed iterator yields nothing.
pub struct ResultIterator<T> {
    inner: Option<BoxedIter<T>>,
}

/// Statements matching a pattern.
pub type StatementIterator = ResultIterator<Statement>;
/// Distinct nodes, e.g. contexts.
pub type NodeIterator = ResultIterator<Node>;
/// Binding sets produced by a query.
pub type QueryResultIterator = ResultIterator<BindingSet>;

impl<T: 'static> ResultIterator<T> {
    /// Wrap any fallible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<T, StrataError>> + Send + 'static,
    {
        Self {
            inner: Some(Box::new(iter)),
        }
    }

    /// Wrap an already materialized result set.
    pub fn from_vec(items: Vec<T>) -> Self
    where
        T: Send,
    {
        Self::new(items.into_iter().map(Ok))
    }

    /// An exhausted iterator.
    #[must_use]
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Release the underlying cursor.
    pub fn close(&mut self) {
        self.inner = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain the iterator into a vector, stopping at the first error.
    pub fn collect_all(self) -> Result<Vec<T>, StrataError> {
        self.collect()
    }
}

impl<T> Iterator for ResultIterator<T> {
    type Item = Result<T, StrataError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next();
        if item.is_none() {
            self.inner = None;
        }
        item
    }
}

impl<T> fmt::Debug for ResultIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultIterator")
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

// =============================================================================
// LAST ERROR
// =============================================================================

/// The last-error record of one model.
///
/// Diagnostic only: every operation also returns its error directly.
#[derive(Debug, Default)]
pub struct ErrorCache {
    last: RefCell<Option<StrataError>>,
}

impl ErrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The error of the most recent operation, if it failed.
    pub fn get(&self) -> Option<StrataError> {
        self.last.borrow().clone()
    }

    pub fn set(&self, error: StrataError) {
        *self.last.borrow_mut() = Some(error);
    }

    pub fn clear(&self) {
        *self.last.borrow_mut() = None;
    }

    /// Store the outcome of an operation and hand it back.
    pub fn record<T>(&self, result: Result<T, StrataError>) -> Result<T, StrataError> {
        match &result {
            Ok(_) => self.clear(),
            Err(e) => self.set(e.clone()),
        }
        result
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Receives change notifications from a model.
///
/// All methods default to no-ops. Observers are held weakly: dropping the
/// last `Arc` unsubscribes implicitly.
pub trait ModelObserver: Send + Sync {
    /// One or more statements were added by the last mutating call.
    fn statements_added(&self) {}

    /// One or more statements were removed by the last mutating call.
    fn statements_removed(&self) {}

    fn statement_added(&self, _statement: &Statement) {}

    fn statement_removed(&self, _statement: &Statement) {}
}

/// Handle returned by `Notifier::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous notification fan-out.
#[derive(Default)]
pub struct Notifier {
    observers: Mutex<Vec<(u64, Weak<dyn ModelObserver>)>>,
    next_id: AtomicU64,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. The notifier keeps only a weak reference.
    pub fn subscribe<O: ModelObserver + 'static>(&self, observer: &Arc<O>) -> SubscriptionId {
        let weak: Weak<O> = Arc::downgrade(observer);
        let weak: Weak<dyn ModelObserver> = weak;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, weak));
        SubscriptionId(id)
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.lock();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id.0);
        observers.len() != before
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Weak<dyn ModelObserver>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot the live observers, pruning dropped ones.
    ///
    /// Emission happens outside the lock so observers may subscribe or
    /// mutate other models from their callbacks.
    fn live(&self) -> Vec<Arc<dyn ModelObserver>> {
        let mut observers = self.lock();
        observers.retain(|(_, weak)| weak.strong_count() > 0);
        observers.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
    }

    pub fn emit_statements_added(&self) {
        for observer in self.live() {
            observer.statements_added();
        }
    }

    pub fn emit_statements_removed(&self) {
        for observer in self.live() {
            observer.statements_removed();
        }
    }

    pub fn emit_statement_added(&self, statement: &Statement) {
        for observer in self.live() {
            observer.statement_added(statement);
        }
    }

    pub fn emit_statement_removed(&self, statement: &Statement) {
        for observer in self.live() {
            observer.statement_removed(statement);
        }
    }
}

// =============================================================================
// MODEL TRAIT
// =============================================================================

/// The public operation set of every layer.
///
/// All operations are synchronous. Every call records its outcome in the
/// model's `ErrorCache`, so `last_error()` reflects the most recent call.
///
/// A chain is `Send` but not `Sync`; share it across threads behind a
/// `Mutex`.
pub trait Model: Send {
    /// Insert a complete statement. Adding a present statement is a no-op.
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError>;

    /// Delete exactly this statement. Removing an absent one is a no-op.
    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError>;

    /// Delete every statement matching `pattern`.
    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError>;

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError>;

    /// Distinct non-empty contexts.
    fn list_contexts(&self) -> Result<NodeIterator, StrataError>;

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError>;

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError>;

    /// Run a query in a language the backend understands.
    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError>;

    /// Number of stored statements, or -1 if the backend cannot tell.
    fn statement_count(&self) -> Result<i64, StrataError>;

    fn is_empty(&self) -> Result<bool, StrataError>;

    /// Mint a fresh, store-unique blank node.
    fn create_blank_node(&mut self) -> Result<Node, StrataError>;

    /// Open a transaction on the originating store.
    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        self.error_cache().record(Err(StrataError::Unsupported(
            "Transactions are not supported by this model".to_string(),
        )))
    }

    fn error_cache(&self) -> &ErrorCache;

    fn notifier(&self) -> &Notifier;

    /// The error of the most recent operation, or None if it succeeded.
    fn last_error(&self) -> Option<StrataError> {
        self.error_cache().get()
    }

    // -------------------------------------------------------------------------
    // Convenience operations
    // -------------------------------------------------------------------------

    /// Add several statements, stopping at the first failure.
    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        for statement in statements {
            self.add_statement(statement)?;
        }
        Ok(())
    }

    fn list_all_statements(&self) -> Result<StatementIterator, StrataError> {
        self.list_statements(&Statement::any())
    }

    fn list_statements_in_context(
        &self,
        context: &Node,
    ) -> Result<StatementIterator, StrataError> {
        let pattern = context_pattern(context);
        let pattern = self.error_cache().record(pattern)?;
        self.list_statements(&pattern)
    }

    fn contains_context(&self, context: &Node) -> Result<bool, StrataError> {
        let pattern = context_pattern(context);
        let pattern = self.error_cache().record(pattern)?;
        self.contains_any_statement(&pattern)
    }

    /// Delete a whole named graph.
    fn remove_context(&mut self, context: &Node) -> Result<(), StrataError> {
        let pattern = context_pattern(context);
        let pattern = self.error_cache().record(pattern)?;
        self.remove_all_statements(&pattern)
    }
}

fn context_pattern(context: &Node) -> Result<Statement, StrataError> {
    if context.is_empty() || context.is_literal() {
        return Err(StrataError::InvalidArgument(format!(
            "Not a named graph: {}",
            context
        )));
    }
    Ok(Statement::with_context(
        Node::Empty,
        Node::Empty,
        Node::Empty,
        context.clone(),
    ))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        added: AtomicUsize,
        removed: AtomicUsize,
        single: AtomicUsize,
    }

    impl ModelObserver for Counter {
        fn statements_added(&self) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn statements_removed(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
        fn statement_added(&self, _statement: &Statement) {
            self.single.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn notifier_delivers_to_live_observers() {
        let notifier = Notifier::new();
        let counter = Arc::new(Counter::default());
        notifier.subscribe(&counter);

        notifier.emit_statements_added();
        notifier.emit_statements_removed();
        notifier.emit_statement_added(&Statement::any());

        assert_eq!(counter.added.load(Ordering::SeqCst), 1);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
        assert_eq!(counter.single.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let notifier = Notifier::new();
        let counter = Arc::new(Counter::default());
        notifier.subscribe(&counter);
        assert_eq!(notifier.observer_count(), 1);

        drop(counter);
        notifier.emit_statements_added();
        assert_eq!(notifier.observer_count(), 0);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let counter = Arc::new(Counter::default());
        let id = notifier.subscribe(&counter);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.emit_statements_added();
        assert_eq!(counter.added.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_cache_records_outcomes() {
        let cache = ErrorCache::new();
        let failed: Result<(), StrataError> =
            cache.record(Err(StrataError::NotFound("x".to_string())));
        assert!(failed.is_err());
        assert_eq!(cache.get(), Some(StrataError::NotFound("x".to_string())));

        let ok = cache.record(Ok(5));
        assert_eq!(ok, Ok(5));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn iterator_close_releases_cursor() {
        let mut it = StatementIterator::from_vec(vec![Statement::any(), Statement::any()]);
        assert!(it.next().is_some());
        it.close();
        assert!(it.is_closed());
        assert!(it.next().is_none());
    }

    #[test]
    fn iterator_closes_itself_when_exhausted() {
        let mut it = NodeIterator::from_vec(vec![Node::resource("http://a")]);
        assert!(it.next().is_some());
        assert!(it.next().is_none());
        assert!(it.is_closed());
    }

    #[test]
    fn context_pattern_rejects_default_graph() {
        assert!(context_pattern(&Node::Empty).is_err());
        assert!(context_pattern(&Node::literal("g")).is_err());
        let pattern = context_pattern(&Node::resource("http://g")).expect("named graph");
        assert!(pattern.subject.is_empty());
    }
}
