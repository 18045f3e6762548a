//! # Decorator Chain
//!
//! `FilterModel` wraps exactly one parent `Model` and forwards every
//! operation to it, recording the parent's outcome as its own last error.
//! Decorators embed a `FilterModel` and override only what they intercept.
//!
//! ## Notification forwarding
//!
//! A `Relay` subscribes to the parent's notifier and re-emits upward. The
//! relay holds only a weak reference to the decorator's notifier and the
//! decorator owns the relay, so no reference cycle forms: dropping the
//! decorator silently unsubscribes it.
//!
//! - `RelayMode::Forward`: re-emit immediately (pass-through)
//! - `RelayMode::Coalesce`: per-statement notifications pass through,
//!   "statements added/removed" are held until the decorator flushes
//! - `RelayMode::Batch`: like `Forward`, except while a `RelayBatch` is
//!   open; held notifications go out when the last batch closes
//!
//! Built-in decorators:
//! - `ReadOnlyModel` rejects every mutation with `PermissionDenied`
//! - `SignalCacheModel` rate-limits coalesced notifications
//! - `MutexModel` serializes every call on a shared chain

use crate::model::{
    ErrorCache, Model, ModelObserver, NodeIterator, Notifier, QueryResultIterator,
    StatementIterator,
};
use crate::primitives::DEFAULT_SIGNAL_CACHE_MS;
use crate::query::QueryLanguage;
use crate::transaction::Transaction;
use crate::types::{Node, Statement, StrataError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

// =============================================================================
// RELAY
// =============================================================================

/// How a relay re-emits "statements added/removed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Forward,
    Coalesce,
    Batch,
}

/// Observer that carries a parent's notifications to a decorator.
#[derive(Debug)]
pub struct Relay {
    target: Weak<Notifier>,
    mode: RelayMode,
    pending_added: AtomicBool,
    pending_removed: AtomicBool,
    /// Open `RelayBatch` guards.
    batches: AtomicUsize,
}

impl Relay {
    pub fn new(target: &Arc<Notifier>, mode: RelayMode) -> Self {
        Self {
            target: Arc::downgrade(target),
            mode,
            pending_added: AtomicBool::new(false),
            pending_removed: AtomicBool::new(false),
            batches: AtomicUsize::new(0),
        }
    }

    /// Hold coalesced notifications until the returned guard is dropped.
    ///
    /// Batches nest; the outermost one flushes.
    pub fn batch(relay: &Arc<Relay>) -> RelayBatch {
        relay.batches.fetch_add(1, Ordering::SeqCst);
        RelayBatch {
            relay: Arc::clone(relay),
        }
    }

    fn holding(&self) -> bool {
        match self.mode {
            RelayMode::Forward => false,
            RelayMode::Coalesce => true,
            RelayMode::Batch => self.batches.load(Ordering::SeqCst) > 0,
        }
    }

    /// Take the held notifications, clearing them.
    pub fn take_pending(&self) -> (bool, bool) {
        (
            self.pending_added.swap(false, Ordering::SeqCst),
            self.pending_removed.swap(false, Ordering::SeqCst),
        )
    }

    pub fn has_pending(&self) -> bool {
        self.pending_added.load(Ordering::SeqCst) || self.pending_removed.load(Ordering::SeqCst)
    }

    /// Emit whatever is held.
    pub fn flush(&self) {
        let (added, removed) = self.take_pending();
        if let Some(target) = self.target.upgrade() {
            if removed {
                target.emit_statements_removed();
            }
            if added {
                target.emit_statements_added();
            }
        }
    }
}

impl ModelObserver for Relay {
    fn statements_added(&self) {
        if self.holding() {
            self.pending_added.store(true, Ordering::SeqCst);
        } else if let Some(target) = self.target.upgrade() {
            target.emit_statements_added();
        }
    }

    fn statements_removed(&self) {
        if self.holding() {
            self.pending_removed.store(true, Ordering::SeqCst);
        } else if let Some(target) = self.target.upgrade() {
            target.emit_statements_removed();
        }
    }

    fn statement_added(&self, statement: &Statement) {
        if let Some(target) = self.target.upgrade() {
            target.emit_statement_added(statement);
        }
    }

    fn statement_removed(&self, statement: &Statement) {
        if let Some(target) = self.target.upgrade() {
            target.emit_statement_removed(statement);
        }
    }
}

/// Guard returned by `Relay::batch`.
#[derive(Debug)]
pub struct RelayBatch {
    relay: Arc<Relay>,
}

impl Drop for RelayBatch {
    fn drop(&mut self) {
        if self.relay.batches.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.relay.flush();
        }
    }
}

// =============================================================================
// FILTER MODEL
// =============================================================================

/// Pass-through decorator over one parent model.
///
/// A stack of `FilterModel`s over a store is observationally identical to
/// the store: same results, same errors, same notifications.
pub struct FilterModel {
    parent: Box<dyn Model>,
    errors: ErrorCache,
    notifier: Arc<Notifier>,
    relay: Arc<Relay>,
}

impl std::fmt::Debug for FilterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterModel")
            .field("relay", &self.relay.mode)
            .finish_non_exhaustive()
    }
}

impl FilterModel {
    /// Wrap `parent`, forwarding its notifications immediately.
    pub fn new(parent: Box<dyn Model>) -> Self {
        Self::with_relay(parent, RelayMode::Forward)
    }

    /// Wrap `parent` with an explicit relay mode.
    pub fn with_relay(parent: Box<dyn Model>, mode: RelayMode) -> Self {
        let notifier = Arc::new(Notifier::new());
        let relay = Arc::new(Relay::new(&notifier, mode));
        parent.notifier().subscribe(&relay);
        Self {
            parent,
            errors: ErrorCache::new(),
            notifier,
            relay,
        }
    }

    pub fn parent(&self) -> &dyn Model {
        self.parent.as_ref()
    }

    pub fn parent_mut(&mut self) -> &mut dyn Model {
        self.parent.as_mut()
    }

    /// Unwrap the decorator. Its relay is dropped with it.
    pub fn into_parent(self) -> Box<dyn Model> {
        self.parent
    }

    /// Emit the notifications a coalescing relay is holding.
    pub fn flush_signals(&self) {
        self.relay.flush();
    }

    pub fn has_pending_signals(&self) -> bool {
        self.relay.has_pending()
    }

    /// The relay carrying the parent's notifications to this layer.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Hold this layer's coalesced notifications until the guard drops.
    pub fn batch(&self) -> RelayBatch {
        Relay::batch(&self.relay)
    }

    /// Record `result` as this layer's last error and hand it back.
    pub fn forward<T>(&self, result: Result<T, StrataError>) -> Result<T, StrataError> {
        self.errors.record(result)
    }
}

impl Model for FilterModel {
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

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        let result = self.parent.start_transaction();
        self.forward(result)
    }

    fn error_cache(&self) -> &ErrorCache {
        &self.errors
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

// =============================================================================
// READ-ONLY MODEL
// =============================================================================

/// Decorator that refuses every mutation without consulting the parent.
#[derive(Debug)]
pub struct ReadOnlyModel {
    base: FilterModel,
}

impl ReadOnlyModel {
    pub fn new(parent: Box<dyn Model>) -> Self {
        Self {
            base: FilterModel::new(parent),
        }
    }

    pub fn into_parent(self) -> Box<dyn Model> {
        self.base.into_parent()
    }

    fn deny<T>(&self, operation: &str) -> Result<T, StrataError> {
        self.base.forward(Err(StrataError::PermissionDenied(format!(
            "{}: model is read-only",
            operation
        ))))
    }
}

impl Model for ReadOnlyModel {
    fn add_statement(&mut self, _statement: &Statement) -> Result<(), StrataError> {
        self.deny("add_statement")
    }

    fn add_statements(&mut self, _statements: &[Statement]) -> Result<(), StrataError> {
        self.deny("add_statements")
    }

    fn remove_statement(&mut self, _statement: &Statement) -> Result<(), StrataError> {
        self.deny("remove_statement")
    }

    fn remove_all_statements(&mut self, _pattern: &Statement) -> Result<(), StrataError> {
        self.deny("remove_all_statements")
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        self.base.list_statements(pattern)
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        self.base.list_contexts()
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        self.base.contains_statement(statement)
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        self.base.contains_any_statement(pattern)
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        self.base.execute_query(query, language)
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        self.base.statement_count()
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        self.base.is_empty()
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        self.deny("create_blank_node")
    }

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        self.deny("start_transaction")
    }

    fn error_cache(&self) -> &ErrorCache {
        self.base.error_cache()
    }

    fn notifier(&self) -> &Notifier {
        self.base.notifier()
    }
}

// =============================================================================
// SIGNAL CACHE MODEL
// =============================================================================

/// Decorator that emits at most one "statements added" and one "statements
/// removed" notification per cache window.
///
/// There is no timer: held notifications go out with the first call after
/// the window has passed, on `flush()`, or when the decorator is dropped.
/// Per-statement notifications are never held.
#[derive(Debug)]
pub struct SignalCacheModel {
    base: FilterModel,
    cache_time: Duration,
    last_emit: Option<Instant>,
}

impl SignalCacheModel {
    pub fn new(parent: Box<dyn Model>) -> Self {
        Self::with_cache_time(parent, Duration::from_millis(DEFAULT_SIGNAL_CACHE_MS))
    }

    pub fn with_cache_time(parent: Box<dyn Model>, cache_time: Duration) -> Self {
        Self {
            base: FilterModel::with_relay(parent, RelayMode::Coalesce),
            cache_time,
            last_emit: None,
        }
    }

    pub fn cache_time(&self) -> Duration {
        self.cache_time
    }

    pub fn set_cache_time(&mut self, cache_time: Duration) {
        self.cache_time = cache_time;
    }

    /// Deliver held notifications now.
    pub fn flush(&mut self) {
        if self.base.has_pending_signals() {
            self.base.flush_signals();
            self.last_emit = Some(Instant::now());
        }
    }

    fn tick(&mut self) {
        let window_open = self
            .last_emit
            .is_none_or(|last| last.elapsed() >= self.cache_time);
        if window_open {
            self.flush();
        }
    }
}

impl Drop for SignalCacheModel {
    fn drop(&mut self) {
        self.flush();
    }
}

impl Model for SignalCacheModel {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.base.add_statement(statement);
        self.tick();
        result
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let result = self.base.add_statements(statements);
        self.tick();
        result
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.base.remove_statement(statement);
        self.tick();
        result
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let result = self.base.remove_all_statements(pattern);
        self.tick();
        result
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        self.base.list_statements(pattern)
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        self.base.list_contexts()
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        self.base.contains_statement(statement)
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        self.base.contains_any_statement(pattern)
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        self.base.execute_query(query, language)
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        self.base.statement_count()
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        self.base.is_empty()
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        self.base.create_blank_node()
    }

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        self.base.start_transaction()
    }

    fn error_cache(&self) -> &ErrorCache {
        self.base.error_cache()
    }

    fn notifier(&self) -> &Notifier {
        self.base.notifier()
    }
}

// =============================================================================
// MUTEX MODEL
// =============================================================================

/// Decorator that serializes every call on one shared chain.
///
/// A chain is `Send` but not `Sync`. Clones of a `MutexModel` share the
/// wrapped chain and its notifier, so each thread can own a clone. The lock
/// is held for the duration of one call; returned iterators outlive it.
///
/// Notifications are delivered while the lock is held, so an observer must
/// not call back into the same chain.
pub struct MutexModel {
    parent: Arc<Mutex<Box<dyn Model>>>,
    errors: ErrorCache,
    notifier: Arc<Notifier>,
    /// Held so the parent's weak subscription stays alive.
    _relay: Arc<Relay>,
}

impl std::fmt::Debug for MutexModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexModel")
            .field("handles", &Arc::strong_count(&self.parent))
            .finish_non_exhaustive()
    }
}

impl Clone for MutexModel {
    /// Another handle on the same chain, with its own last error.
    fn clone(&self) -> Self {
        Self {
            parent: Arc::clone(&self.parent),
            errors: ErrorCache::new(),
            notifier: Arc::clone(&self.notifier),
            _relay: Arc::clone(&self._relay),
        }
    }
}

impl MutexModel {
    pub fn new(parent: Box<dyn Model>) -> Self {
        let notifier = Arc::new(Notifier::new());
        let relay = Arc::new(Relay::new(&notifier, RelayMode::Forward));
        parent.notifier().subscribe(&relay);
        Self {
            parent: Arc::new(Mutex::new(parent)),
            errors: ErrorCache::new(),
            notifier,
            _relay: relay,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Model>> {
        self.parent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the wrapped chain under the lock.
    fn with_parent<T>(
        &self,
        f: impl FnOnce(&mut dyn Model) -> Result<T, StrataError>,
    ) -> Result<T, StrataError> {
        let mut parent = self.lock();
        let result = f(&mut **parent);
        drop(parent);
        self.errors.record(result)
    }
}

impl Model for MutexModel {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        self.with_parent(|parent| parent.add_statement(statement))
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        self.with_parent(|parent| parent.add_statements(statements))
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        self.with_parent(|parent| parent.remove_statement(statement))
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        self.with_parent(|parent| parent.remove_all_statements(pattern))
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        self.with_parent(|parent| parent.list_statements(pattern))
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        self.with_parent(|parent| parent.list_contexts())
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        self.with_parent(|parent| parent.contains_statement(statement))
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        self.with_parent(|parent| parent.contains_any_statement(pattern))
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        self.with_parent(|parent| parent.execute_query(query, language))
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        self.with_parent(|parent| parent.statement_count())
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        self.with_parent(|parent| parent.is_empty())
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        self.with_parent(|parent| parent.create_blank_node())
    }

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        self.with_parent(|parent| parent.start_transaction())
    }

    fn error_cache(&self) -> &ErrorCache {
        &self.errors
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryStore;
    use crate::types::ErrorKind;
    use std::sync::atomic::AtomicUsize;

    fn uri(s: &str) -> Node {
        Node::resource(format!("http://example.org/{}", s))
    }

    fn st(s: &str, p: &str, o: &str) -> Statement {
        Statement::new(uri(s), uri(p), uri(o))
    }

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
    fn filter_forwards_and_relays() {
        let store = MemoryStore::new();
        let mut model = FilterModel::new(Box::new(store.clone()));
        let counter = Arc::new(Counter::default());
        model.notifier().subscribe(&counter);

        model.add_statement(&st("a", "p", "b")).expect("add");
        assert_eq!(store.statement_count().expect("count"), 1);
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);
        assert_eq!(counter.single.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filter_copies_parent_error() {
        let mut model = FilterModel::new(Box::new(MemoryStore::new()));
        let err = model
            .add_statement(&Statement::new(uri("a"), Node::Empty, uri("b")))
            .expect_err("invalid");
        assert_eq!(model.last_error(), Some(err.clone()));
        assert_eq!(model.parent().last_error(), Some(err));

        model.add_statement(&st("a", "p", "b")).expect("add");
        assert_eq!(model.last_error(), None);
    }

    #[test]
    fn dropping_decorator_unsubscribes() {
        let store = MemoryStore::new();
        let model = FilterModel::new(Box::new(store.clone()));
        assert_eq!(store.notifier().observer_count(), 1);
        drop(model);
        assert_eq!(store.notifier().observer_count(), 0);
    }

    #[test]
    fn filter_starts_parent_transactions() {
        let store = MemoryStore::new();
        let mut model = FilterModel::new(Box::new(store.clone()));
        let mut tx = model.start_transaction().expect("tx");
        tx.add_statement(&st("a", "p", "b")).expect("add");
        tx.commit().expect("commit");
        assert_eq!(store.statement_count().expect("count"), 1);
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut store = MemoryStore::new();
        store.add_statement(&st("a", "p", "b")).expect("seed");
        let mut model = ReadOnlyModel::new(Box::new(store.clone()));

        let err = model.add_statement(&st("c", "p", "d")).expect_err("denied");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(model.last_error().map(|e| e.kind()), Some(ErrorKind::PermissionDenied));
        assert!(model.remove_all_statements(&Statement::any()).is_err());
        assert!(model.create_blank_node().is_err());
        assert!(model.start_transaction().is_err());

        assert!(model.contains_statement(&st("a", "p", "b")).expect("read"));
        assert_eq!(model.last_error(), None);
        assert_eq!(store.statement_count().expect("count"), 1);
    }

    #[test]
    fn signal_cache_holds_notifications_within_window() {
        let store = MemoryStore::new();
        let mut model =
            SignalCacheModel::with_cache_time(Box::new(store), Duration::from_secs(3600));
        let counter = Arc::new(Counter::default());
        model.notifier().subscribe(&counter);

        model.add_statement(&st("a", "p", "1")).expect("add");
        model.add_statement(&st("a", "p", "2")).expect("add");
        model.add_statement(&st("a", "p", "3")).expect("add");
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);
        assert_eq!(counter.single.load(Ordering::SeqCst), 3);

        model.flush();
        assert_eq!(counter.added.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_cache_flushes_on_drop() {
        let store = MemoryStore::new();
        let counter = Arc::new(Counter::default());
        {
            let mut model =
                SignalCacheModel::with_cache_time(Box::new(store), Duration::from_secs(3600));
            model.notifier().subscribe(&counter);
            model.add_statement(&st("a", "p", "1")).expect("add");
            model.remove_statement(&st("a", "p", "1")).expect("remove");
            assert_eq!(counter.removed.load(Ordering::SeqCst), 0);
        }
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_window_passes_everything_through() {
        let mut model =
            SignalCacheModel::with_cache_time(Box::new(MemoryStore::new()), Duration::ZERO);
        let counter = Arc::new(Counter::default());
        model.notifier().subscribe(&counter);
        model.add_statement(&st("a", "p", "1")).expect("add");
        model.add_statement(&st("a", "p", "2")).expect("add");
        assert_eq!(counter.added.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_relay_holds_only_while_a_batch_is_open() {
        let mut store = MemoryStore::new();
        let mut model = FilterModel::with_relay(Box::new(store.clone()), RelayMode::Batch);
        let counter = Arc::new(Counter::default());
        model.notifier().subscribe(&counter);

        store.add_statement(&st("a", "p", "1")).expect("outside writer");
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);

        let outer = model.batch();
        let inner = model.batch();
        model.add_statement(&st("a", "p", "2")).expect("add");
        model.add_statement(&st("a", "p", "3")).expect("add");
        drop(inner);
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);
        assert_eq!(counter.single.load(Ordering::SeqCst), 3);
        drop(outer);
        assert_eq!(counter.added.load(Ordering::SeqCst), 2);
        assert!(!model.has_pending_signals());
    }

    #[test]
    fn mutex_model_shares_one_chain_across_threads() {
        let store = MemoryStore::new();
        let model = MutexModel::new(Box::new(FilterModel::new(Box::new(store.clone()))));
        let counter = Arc::new(Counter::default());
        model.notifier().subscribe(&counter);

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let mut handle = model.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        handle
                            .add_statement(&st(&format!("w{}", worker), "p", &i.to_string()))
                            .expect("add");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker");
        }

        assert_eq!(model.statement_count().expect("count"), 100);
        assert_eq!(store.statement_count().expect("count"), 100);
        assert_eq!(counter.added.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn mutex_model_handles_keep_their_own_last_error() {
        let mut first = MutexModel::new(Box::new(MemoryStore::new()));
        let second = first.clone();
        let err = first
            .add_statement(&Statement::new(uri("a"), Node::Empty, uri("b")))
            .expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(first.last_error(), Some(err));
        assert_eq!(second.last_error(), None);

        let mut tx = first.start_transaction().expect("tx");
        tx.add_statement(&st("a", "p", "b")).expect("stage");
        tx.commit().expect("commit");
        assert!(second.contains_statement(&st("a", "p", "b")).expect("read"));
    }
}
