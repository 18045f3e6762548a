//! # In-Memory Store
//!
//! The volatile quad store for Strata.
//!
//! This module implements the `Store` trait over a `BTreeSet<Statement>`.
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.
//!
//! `MemoryStore` is a handle: clones share the same statements and the same
//! notifier, so a transaction or a decorator can hold its own clone.

use crate::model::{
    ErrorCache, Model, NodeIterator, Notifier, QueryResultIterator, StatementIterator,
};
use crate::primitives::BLANK_NODE_PREFIX;
use crate::query::{QueryLanguage, execute_builtin_query};
use crate::store::{Capabilities, Feature, Store, blank_counter_floor, notify_changes};
use crate::transaction::{SimpleTransaction, Transaction};
use crate::types::{Node, Statement, StrataError};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// =============================================================================
// STATE
// =============================================================================

/// The shared data behind every clone of a `MemoryStore`.
#[derive(Debug, Default)]
struct MemoryState {
    /// All statements, sorted subject first.
    statements: BTreeSet<Statement>,
    /// Named graph -> number of statements in it.
    contexts: BTreeMap<Node, usize>,
    /// Next blank node counter.
    next_blank: u64,
}

impl MemoryState {
    fn insert(&mut self, statement: &Statement) -> bool {
        if !self.statements.insert(statement.clone()) {
            return false;
        }
        if statement.context.is_valid() {
            *self.contexts.entry(statement.context.clone()).or_insert(0) += 1;
        }
        if let Some(floor) = blank_counter_floor(statement) {
            self.next_blank = self.next_blank.max(floor);
        }
        true
    }

    fn remove(&mut self, statement: &Statement) -> bool {
        if !self.statements.remove(statement) {
            return false;
        }
        if statement.context.is_valid()
            && let Some(count) = self.contexts.get_mut(&statement.context)
        {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.contexts.remove(&statement.context);
            }
        }
        true
    }

    /// The first statement at or after `from` matching `pattern`.
    ///
    /// A bound subject limits the scan to that subject's range.
    fn next_match(&self, pattern: &Statement, from: Bound<&Statement>) -> Option<Statement> {
        self.statements
            .range((from, Bound::Unbounded))
            .take_while(|s| pattern.subject.is_empty() || s.subject == pattern.subject)
            .find(|s| s.matches(pattern))
            .cloned()
    }

    fn matching(&self, pattern: &Statement) -> Vec<Statement> {
        let floor = subject_floor(pattern);
        self.statements
            .range((Bound::Included(&floor), Bound::Unbounded))
            .take_while(|s| pattern.subject.is_empty() || s.subject == pattern.subject)
            .filter(|s| s.matches(pattern))
            .cloned()
            .collect()
    }
}

/// The smallest statement with `pattern`'s subject, or the global minimum.
fn subject_floor(pattern: &Statement) -> Statement {
    Statement::new(pattern.subject.clone(), Node::Empty, Node::Empty)
}

// =============================================================================
// LAZY CURSOR
// =============================================================================

/// Resumes a range scan after the last returned statement.
///
/// The lock is taken per step, so the store stays usable while a cursor is
/// open; statements added behind the cursor are not revisited.
struct MemoryCursor {
    state: Arc<Mutex<MemoryState>>,
    pattern: Statement,
    last: Option<Statement>,
}

impl Iterator for MemoryCursor {
    type Item = Result<Statement, StrataError>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = lock(&self.state);
        let floor = subject_floor(&self.pattern);
        let from = match &self.last {
            Some(last) => Bound::Excluded(last),
            None => Bound::Included(&floor),
        };
        let found = state.next_match(&self.pattern, from)?;
        drop(state);
        self.last = Some(found.clone());
        Some(Ok(found))
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// A `BTreeSet`-backed store with shared-handle semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    notifier: Arc<Notifier>,
    errors: ErrorCache,
}

impl Clone for MemoryStore {
    /// Clones share data and observers; each handle keeps its own last error.
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            notifier: Arc::clone(&self.notifier),
            errors: ErrorCache::new(),
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `statements`.
    pub fn with_statements(statements: impl IntoIterator<Item = Statement>) -> Result<Self, StrataError> {
        let store = Self::new();
        {
            let mut state = lock(&store.state);
            for statement in statements {
                statement.ensure_valid()?;
                state.insert(&statement);
            }
        }
        Ok(store)
    }

    /// Snapshot every statement, in order.
    pub fn snapshot(&self) -> Vec<Statement> {
        lock(&self.state).statements.iter().cloned().collect()
    }

    fn insert_batch(&self, statements: &[Statement]) -> Result<(), StrataError> {
        for statement in statements {
            statement.ensure_valid()?;
        }
        let added: Vec<Statement> = {
            let mut state = lock(&self.state);
            statements
                .iter()
                .filter(|s| state.insert(s))
                .cloned()
                .collect()
        };
        notify_changes(&self.notifier, &added, &[]);
        Ok(())
    }

    fn remove_matching(&self, pattern: &Statement) -> Vec<Statement> {
        let mut state = lock(&self.state);
        let matches = if pattern.is_complete() && pattern.context.is_valid() {
            if state.statements.contains(pattern) {
                vec![pattern.clone()]
            } else {
                Vec::new()
            }
        } else {
            state.matching(pattern)
        };
        for statement in &matches {
            state.remove(statement);
        }
        matches
    }
}

impl Model for MemoryStore {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.insert_batch(std::slice::from_ref(statement));
        self.errors.record(result)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let result = self.insert_batch(statements);
        self.errors.record(result)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = statement.ensure_valid().map(|()| {
            let removed = lock(&self.state).remove(statement);
            if removed {
                notify_changes(&self.notifier, &[], std::slice::from_ref(statement));
            }
        });
        self.errors.record(result)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let removed = self.remove_matching(pattern);
        notify_changes(&self.notifier, &[], &removed);
        self.errors.record(Ok(()))
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        let cursor = MemoryCursor {
            state: Arc::clone(&self.state),
            pattern: pattern.clone(),
            last: None,
        };
        self.errors.record(Ok(StatementIterator::new(cursor)))
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        let contexts: Vec<Node> = lock(&self.state).contexts.keys().cloned().collect();
        self.errors.record(Ok(NodeIterator::from_vec(contexts)))
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        let result = statement
            .ensure_valid()
            .map(|()| lock(&self.state).statements.contains(statement));
        self.errors.record(result)
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        let floor = subject_floor(pattern);
        let found = lock(&self.state)
            .next_match(pattern, Bound::Included(&floor))
            .is_some();
        self.errors.record(Ok(found))
    }

    fn execute_query(
        &self,
        query: &str,
        language: &QueryLanguage,
    ) -> Result<QueryResultIterator, StrataError> {
        let result = execute_builtin_query(self, query, language);
        self.errors.record(result)
    }

    fn statement_count(&self) -> Result<i64, StrataError> {
        let count = lock(&self.state).statements.len() as i64;
        self.errors.record(Ok(count))
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        let empty = lock(&self.state).statements.is_empty();
        self.errors.record(Ok(empty))
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_blank;
            state.next_blank = state.next_blank.saturating_add(1);
            id
        };
        self.errors
            .record(Ok(Node::blank(format!("{}{}", BLANK_NODE_PREFIX, id))))
    }

    fn start_transaction(&mut self) -> Result<Box<dyn Transaction>, StrataError> {
        let transaction: Box<dyn Transaction> = Box::new(SimpleTransaction::new(self.clone()));
        self.errors.record(Ok(transaction))
    }

    fn error_cache(&self) -> &ErrorCache {
        &self.errors
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

impl Store for MemoryStore {
    fn capabilities(&self) -> Capabilities {
        Capabilities::new([Feature::Contexts, Feature::Transactions, Feature::Querying])
    }

    fn erase_all(&mut self) -> Result<(), StrataError> {
        let removed: Vec<Statement> = {
            let mut state = lock(&self.state);
            state.contexts.clear();
            std::mem::take(&mut state.statements).into_iter().collect()
        };
        notify_changes(&self.notifier, &[], &removed);
        tracing::debug!(erased = removed.len(), "memory store erased");
        self.errors.record(Ok(()))
    }

    fn apply_changes(
        &mut self,
        added: &BTreeSet<Statement>,
        removed: &BTreeSet<Statement>,
    ) -> Result<(), StrataError> {
        let validated = added.iter().try_for_each(Statement::ensure_valid);
        if let Err(e) = validated {
            return self.errors.record(Err(e));
        }

        let (applied_added, applied_removed) = {
            let mut state = lock(&self.state);
            let applied_removed: Vec<Statement> =
                removed.iter().filter(|s| state.remove(s)).cloned().collect();
            let applied_added: Vec<Statement> =
                added.iter().filter(|s| state.insert(s)).cloned().collect();
            (applied_added, applied_removed)
        };
        notify_changes(&self.notifier, &applied_added, &applied_removed);
        self.errors.record(Ok(()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelObserver;
    use crate::types::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

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
        single_added: AtomicUsize,
        single_removed: AtomicUsize,
    }

    impl ModelObserver for Counter {
        fn statements_added(&self) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }
        fn statements_removed(&self) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
        fn statement_added(&self, _statement: &Statement) {
            self.single_added.fetch_add(1, Ordering::SeqCst);
        }
        fn statement_removed(&self, _statement: &Statement) {
            self.single_removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn add_contains_remove() {
        let mut store = MemoryStore::new();
        let s = st("a", "p", "b");

        store.add_statement(&s).expect("add");
        assert!(store.contains_statement(&s).expect("contains"));
        assert_eq!(store.statement_count().expect("count"), 1);

        store.remove_statement(&s).expect("remove");
        assert!(!store.contains_statement(&s).expect("contains"));
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn add_is_idempotent() {
        let mut store = MemoryStore::new();
        let s = st("a", "p", "b");
        store.add_statement(&s).expect("add");
        store.add_statement(&s).expect("add again");
        assert_eq!(store.statement_count().expect("count"), 1);
        store.remove_statement(&st("x", "y", "z")).expect("remove absent");
    }

    #[test]
    fn invalid_statement_is_rejected_and_recorded() {
        let mut store = MemoryStore::new();
        let err = store
            .add_statement(&Statement::new(uri("a"), Node::Empty, uri("b")))
            .expect_err("pattern");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.last_error(), Some(err));

        store.add_statement(&st("a", "p", "b")).expect("add");
        assert_eq!(store.last_error(), None);
    }

    #[test]
    fn list_by_subject_and_wildcards() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[st("a", "p", "b"), st("a", "q", "c"), st("b", "p", "c")])
            .expect("add");

        let by_subject = store
            .list_statements(&Statement::new(uri("a"), Node::Empty, Node::Empty))
            .expect("list")
            .collect_all()
            .expect("collect");
        assert_eq!(by_subject.len(), 2);

        let by_predicate = store
            .list_statements(&Statement::new(Node::Empty, uri("p"), Node::Empty))
            .expect("list")
            .collect_all()
            .expect("collect");
        assert_eq!(by_predicate.len(), 2);
    }

    #[test]
    fn cursor_survives_concurrent_mutation() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[st("a", "p", "1"), st("a", "p", "2"), st("a", "p", "3")])
            .expect("add");

        let mut it = store.list_all_statements().expect("list");
        let first = it.next().expect("first").expect("ok");
        store.remove_statement(&first).expect("remove");
        let rest: Vec<Statement> = it.collect::<Result<_, _>>().expect("rest");
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn remove_all_clears_on_wildcard() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[st("a", "p", "b"), st("c", "p", "d")])
            .expect("add");
        store.remove_all_statements(&Statement::any()).expect("clear");
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn contexts_are_tracked() {
        let mut store = MemoryStore::new();
        let in_g1 = st("a", "p", "b").in_context(uri("g1"));
        store.add_statement(&in_g1).expect("add");
        store
            .add_statement(&st("a", "p", "c").in_context(uri("g2")))
            .expect("add");
        store.add_statement(&st("x", "p", "y")).expect("add");

        let contexts = store.list_contexts().expect("list").collect_all().expect("collect");
        assert_eq!(contexts, vec![uri("g1"), uri("g2")]);

        store.remove_context(&uri("g1")).expect("remove context");
        assert!(!store.contains_context(&uri("g1")).expect("contains"));
        assert_eq!(store.statement_count().expect("count"), 2);
    }

    #[test]
    fn notifications_are_coalesced_per_call() {
        let mut store = MemoryStore::new();
        let counter = Arc::new(Counter::default());
        store.notifier().subscribe(&counter);

        store
            .add_statements(&[st("a", "p", "1"), st("a", "p", "2")])
            .expect("add");
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);
        assert_eq!(counter.single_added.load(Ordering::SeqCst), 2);

        store.add_statement(&st("a", "p", "1")).expect("no-op add");
        assert_eq!(counter.added.load(Ordering::SeqCst), 1);

        store.remove_all_statements(&Statement::any()).expect("clear");
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blank_nodes_are_unique() {
        let mut store = MemoryStore::new();
        store
            .add_statement(&Statement::new(Node::blank("b0"), uri("p"), uri("o")))
            .expect("add");
        let fresh = store.create_blank_node().expect("blank");
        assert_ne!(fresh, Node::blank("b0"));
        assert_ne!(store.create_blank_node().expect("blank"), fresh);
    }

    #[test]
    fn clones_share_data() {
        let mut store = MemoryStore::new();
        let other = store.clone();
        store.add_statement(&st("a", "p", "b")).expect("add");
        assert_eq!(other.statement_count().expect("count"), 1);
    }

    #[test]
    fn apply_changes_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        let mut added = BTreeSet::new();
        added.insert(st("a", "p", "b"));
        added.insert(Statement::new(Node::literal("bad"), uri("p"), uri("o")));

        assert!(store.apply_changes(&added, &BTreeSet::new()).is_err());
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn erase_all_empties_store() {
        let mut store = MemoryStore::new();
        store.add_statement(&st("a", "p", "b")).expect("add");
        store.erase_all().expect("erase");
        assert!(store.is_empty().expect("empty"));
        assert!(store.list_contexts().expect("contexts").next().is_none());
    }

    #[test]
    fn erase_all_reports_each_statement() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[st("a", "p", "1"), st("a", "p", "2").in_context(uri("g"))])
            .expect("add");
        let counter = Arc::new(Counter::default());
        store.notifier().subscribe(&counter);

        store.erase_all().expect("erase");
        assert_eq!(counter.single_removed.load(Ordering::SeqCst), 2);
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);

        store.erase_all().expect("erase empty");
        assert_eq!(counter.removed.load(Ordering::SeqCst), 1);
    }
}
