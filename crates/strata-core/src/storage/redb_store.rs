//! # redb-backed Store
//!
//! A disk-backed quad store using the redb embedded database.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! ## Layout
//!
//! Statements are keyed by their postcard encoding. Postcard writes struct
//! fields back to back, so every key starts with the encoded subject and a
//! subject-bound lookup is a prefix range scan.

use crate::model::{
    ErrorCache, Model, NodeIterator, Notifier, QueryResultIterator, StatementIterator,
};
use crate::primitives::{BLANK_NODE_PREFIX, REDB_FETCH_CHUNK};
use crate::query::{QueryLanguage, execute_builtin_query};
use crate::store::{Capabilities, Feature, Store, blank_counter_floor, notify_changes};
use crate::transaction::{SimpleTransaction, Transaction};
use crate::types::{Node, Statement, StrataError};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table, TableDefinition,
    WriteTransaction,
};
use std::collections::{BTreeSet, VecDeque};
use std::fmt::Display;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Table for statements: postcard(Statement) -> ()
const STATEMENTS: TableDefinition<&[u8], ()> = TableDefinition::new("statements");

/// Table for named graphs: postcard(Node) -> statement count
const CONTEXTS: TableDefinition<&[u8], u64> = TableDefinition::new("contexts");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_BLANK_KEY: &str = "next_blank";

fn backend_err(e: impl Display) -> StrataError {
    StrataError::BackendFailure(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StrataError> {
    postcard::to_allocvec(value).map_err(|e| StrataError::SerializationError(e.to_string()))
}

fn decode_statement(bytes: &[u8]) -> Result<Statement, StrataError> {
    postcard::from_bytes(bytes).map_err(|e| StrataError::SerializationError(e.to_string()))
}

/// Key prefix shared by every statement matching `pattern`.
fn subject_prefix(pattern: &Statement) -> Result<Vec<u8>, StrataError> {
    if pattern.subject.is_empty() {
        Ok(Vec::new())
    } else {
        encode(&pattern.subject)
    }
}

// =============================================================================
// SCANNING
// =============================================================================

/// One bounded slice of a range scan.
struct ScanChunk {
    matches: Vec<Statement>,
    last_key: Option<Vec<u8>>,
    exhausted: bool,
}

/// Scan keys from `from` while they start with `prefix`, examining at most
/// `limit` keys.
fn scan<T>(
    table: &T,
    pattern: &Statement,
    prefix: &[u8],
    from: Bound<&[u8]>,
    limit: usize,
) -> Result<ScanChunk, StrataError>
where
    T: ReadableTable<&'static [u8], ()>,
{
    let mut chunk = ScanChunk {
        matches: Vec::new(),
        last_key: None,
        exhausted: true,
    };
    let range = table
        .range::<&[u8]>((from, Bound::Unbounded))
        .map_err(backend_err)?;

    let mut examined = 0usize;
    for entry in range {
        let (key, _) = entry.map_err(backend_err)?;
        let bytes = key.value();
        if !bytes.starts_with(prefix) {
            break;
        }
        if examined == limit {
            chunk.exhausted = false;
            break;
        }
        examined += 1;
        chunk.last_key = Some(bytes.to_vec());
        let statement = decode_statement(bytes)?;
        if statement.matches(pattern) {
            chunk.matches.push(statement);
        }
    }
    Ok(chunk)
}

/// Lazy cursor that reads `REDB_FETCH_CHUNK` keys per read transaction.
///
/// No read transaction is held between chunks, so writers are never blocked
/// by an open iterator.
struct RedbCursor {
    db: Arc<Database>,
    pattern: Statement,
    prefix: Vec<u8>,
    resume: Option<Vec<u8>>,
    buffer: VecDeque<Statement>,
    exhausted: bool,
}

impl RedbCursor {
    fn fill(&mut self) -> Result<(), StrataError> {
        let read_txn = self.db.begin_read().map_err(backend_err)?;
        let table = read_txn.open_table(STATEMENTS).map_err(backend_err)?;
        let from = match &self.resume {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Included(self.prefix.as_slice()),
        };
        let chunk = scan(&table, &self.pattern, &self.prefix, from, REDB_FETCH_CHUNK)?;

        self.exhausted = chunk.exhausted;
        if let Some(key) = chunk.last_key {
            self.resume = Some(key);
        }
        self.buffer.extend(chunk.matches);
        Ok(())
    }
}

impl Iterator for RedbCursor {
    type Item = Result<Statement, StrataError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(statement) = self.buffer.pop_front() {
                return Some(Ok(statement));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

// =============================================================================
// WRITE HELPERS
// =============================================================================

/// The tables of one write transaction.
struct WriteTables<'txn> {
    statements: Table<'txn, &'static [u8], ()>,
    contexts: Table<'txn, &'static [u8], u64>,
    metadata: Table<'txn, &'static str, u64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self, StrataError> {
        Ok(Self {
            statements: txn.open_table(STATEMENTS).map_err(backend_err)?,
            contexts: txn.open_table(CONTEXTS).map_err(backend_err)?,
            metadata: txn.open_table(METADATA).map_err(backend_err)?,
        })
    }

    fn insert(&mut self, statement: &Statement) -> Result<bool, StrataError> {
        let key = encode(statement)?;
        let existed = self
            .statements
            .insert(key.as_slice(), ())
            .map_err(backend_err)?
            .is_some();
        if existed {
            return Ok(false);
        }

        if statement.context.is_valid() {
            let ctx_key = encode(&statement.context)?;
            let count = self
                .contexts
                .get(ctx_key.as_slice())
                .map_err(backend_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            self.contexts
                .insert(ctx_key.as_slice(), count.saturating_add(1))
                .map_err(backend_err)?;
        }

        if let Some(floor) = blank_counter_floor(statement) {
            let next = self.next_blank()?;
            if floor > next {
                self.metadata
                    .insert(NEXT_BLANK_KEY, floor)
                    .map_err(backend_err)?;
            }
        }
        Ok(true)
    }

    fn remove(&mut self, statement: &Statement) -> Result<bool, StrataError> {
        let key = encode(statement)?;
        let removed = self
            .statements
            .remove(key.as_slice())
            .map_err(backend_err)?
            .is_some();
        if removed && statement.context.is_valid() {
            let ctx_key = encode(&statement.context)?;
            let count = self
                .contexts
                .get(ctx_key.as_slice())
                .map_err(backend_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            if count <= 1 {
                self.contexts
                    .remove(ctx_key.as_slice())
                    .map_err(backend_err)?;
            } else {
                self.contexts
                    .insert(ctx_key.as_slice(), count - 1)
                    .map_err(backend_err)?;
            }
        }
        Ok(removed)
    }

    fn next_blank(&self) -> Result<u64, StrataError> {
        Ok(self
            .metadata
            .get(NEXT_BLANK_KEY)
            .map_err(backend_err)?
            .map(|v| v.value())
            .unwrap_or(0))
    }
}

// =============================================================================
// REDB STORE
// =============================================================================

/// A persistent store backed by a redb database file.
///
/// A handle: clones share the database and the notifier.
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
    notifier: Arc<Notifier>,
    errors: ErrorCache,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Clone for RedbStore {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            path: self.path.clone(),
            notifier: Arc::clone(&self.notifier),
            errors: ErrorCache::new(),
        }
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        let db = Database::create(path.as_ref()).map_err(backend_err)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(backend_err)?;
        WriteTables::open(&write_txn)?;
        write_txn.commit().map_err(backend_err)?;

        tracing::debug!(path = %path.as_ref().display(), "redb store opened");
        Ok(Self {
            db: Arc::new(db),
            path: path.as_ref().to_path_buf(),
            notifier: Arc::new(Notifier::new()),
            errors: ErrorCache::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compact the database file.
    ///
    /// Fails if another handle to the same store is alive.
    pub fn compact(&mut self) -> Result<bool, StrataError> {
        let db = Arc::get_mut(&mut self.db).ok_or_else(|| {
            StrataError::InvalidOperation("Cannot compact a shared store".to_string())
        })?;
        db.compact().map_err(backend_err)
    }

    /// Run `f` inside one write transaction and commit if it succeeds.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut WriteTables<'_>) -> Result<T, StrataError>,
    ) -> Result<T, StrataError> {
        let write_txn = self.db.begin_write().map_err(backend_err)?;
        let value = {
            let mut tables = WriteTables::open(&write_txn)?;
            f(&mut tables)?
        };
        write_txn.commit().map_err(backend_err)?;
        Ok(value)
    }

    fn insert_batch(&self, statements: &[Statement]) -> Result<(), StrataError> {
        for statement in statements {
            statement.ensure_valid()?;
        }
        let added = self.write(|tables| {
            let mut added = Vec::new();
            for statement in statements {
                if tables.insert(statement)? {
                    added.push(statement.clone());
                }
            }
            Ok(added)
        })?;
        notify_changes(&self.notifier, &added, &[]);
        Ok(())
    }

    fn remove_matching(&self, pattern: &Statement) -> Result<Vec<Statement>, StrataError> {
        if pattern.is_complete() && pattern.context.is_valid() {
            return self.write(|tables| {
                Ok(if tables.remove(pattern)? {
                    vec![pattern.clone()]
                } else {
                    Vec::new()
                })
            });
        }

        let prefix = subject_prefix(pattern)?;
        self.write(|tables| {
            let chunk = scan(
                &tables.statements,
                pattern,
                &prefix,
                Bound::Included(prefix.as_slice()),
                usize::MAX,
            )?;
            let mut removed = Vec::with_capacity(chunk.matches.len());
            for statement in chunk.matches {
                if tables.remove(&statement)? {
                    removed.push(statement);
                }
            }
            Ok(removed)
        })
    }

    fn cursor(&self, pattern: &Statement) -> Result<RedbCursor, StrataError> {
        Ok(RedbCursor {
            db: Arc::clone(&self.db),
            pattern: pattern.clone(),
            prefix: subject_prefix(pattern)?,
            resume: None,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    fn read_contexts(&self) -> Result<Vec<Node>, StrataError> {
        let read_txn = self.db.begin_read().map_err(backend_err)?;
        let table = read_txn.open_table(CONTEXTS).map_err(backend_err)?;
        let mut contexts = Vec::new();
        for entry in table.iter().map_err(backend_err)? {
            let (key, _) = entry.map_err(backend_err)?;
            let node: Node = postcard::from_bytes(key.value())
                .map_err(|e| StrataError::SerializationError(e.to_string()))?;
            contexts.push(node);
        }
        Ok(contexts)
    }

    fn contains_key(&self, statement: &Statement) -> Result<bool, StrataError> {
        statement.ensure_valid()?;
        let key = encode(statement)?;
        let read_txn = self.db.begin_read().map_err(backend_err)?;
        let table = read_txn.open_table(STATEMENTS).map_err(backend_err)?;
        Ok(table.get(key.as_slice()).map_err(backend_err)?.is_some())
    }

    fn count(&self) -> Result<i64, StrataError> {
        let read_txn = self.db.begin_read().map_err(backend_err)?;
        let table = read_txn.open_table(STATEMENTS).map_err(backend_err)?;
        let count = table.len().map_err(backend_err)?;
        Ok(count as i64)
    }
}

impl Model for RedbStore {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = self.insert_batch(std::slice::from_ref(statement));
        self.errors.record(result)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let result = self.insert_batch(statements);
        self.errors.record(result)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let result = statement.ensure_valid().and_then(|()| {
            let removed = self.write(|tables| tables.remove(statement))?;
            if removed {
                notify_changes(&self.notifier, &[], std::slice::from_ref(statement));
            }
            Ok(())
        });
        self.errors.record(result)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let result = self.remove_matching(pattern).map(|removed| {
            notify_changes(&self.notifier, &[], &removed);
        });
        self.errors.record(result)
    }

    fn list_statements(&self, pattern: &Statement) -> Result<StatementIterator, StrataError> {
        let result = self.cursor(pattern).map(StatementIterator::new);
        self.errors.record(result)
    }

    fn list_contexts(&self) -> Result<NodeIterator, StrataError> {
        let result = self.read_contexts().map(NodeIterator::from_vec);
        self.errors.record(result)
    }

    fn contains_statement(&self, statement: &Statement) -> Result<bool, StrataError> {
        let result = self.contains_key(statement);
        self.errors.record(result)
    }

    fn contains_any_statement(&self, pattern: &Statement) -> Result<bool, StrataError> {
        let result = self
            .cursor(pattern)
            .and_then(|mut cursor| cursor.next().transpose())
            .map(|first| first.is_some());
        self.errors.record(result)
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
        let result = self.count();
        self.errors.record(result)
    }

    fn is_empty(&self) -> Result<bool, StrataError> {
        let result = self.count().map(|n| n == 0);
        self.errors.record(result)
    }

    fn create_blank_node(&mut self) -> Result<Node, StrataError> {
        let result = self.write(|tables| {
            let id = tables.next_blank()?;
            tables
                .metadata
                .insert(NEXT_BLANK_KEY, id.saturating_add(1))
                .map_err(backend_err)?;
            Ok(Node::blank(format!("{}{}", BLANK_NODE_PREFIX, id)))
        });
        self.errors.record(result)
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

impl Store for RedbStore {
    fn capabilities(&self) -> Capabilities {
        Capabilities::new([
            Feature::Contexts,
            Feature::Transactions,
            Feature::Querying,
            Feature::Persistence,
        ])
    }

    fn erase_all(&mut self) -> Result<(), StrataError> {
        let result = self
            .cursor(&Statement::any())
            .and_then(|cursor| cursor.collect::<Result<Vec<_>, _>>())
            .and_then(|removed| {
                let write_txn = self.db.begin_write().map_err(backend_err)?;
                write_txn.delete_table(STATEMENTS).map_err(backend_err)?;
                write_txn.delete_table(CONTEXTS).map_err(backend_err)?;
                WriteTables::open(&write_txn)?;
                write_txn.commit().map_err(backend_err)?;
                tracing::debug!(path = %self.path.display(), erased = removed.len(), "redb store erased");
                notify_changes(&self.notifier, &[], &removed);
                Ok(())
            });
        self.errors.record(result)
    }

    fn apply_changes(
        &mut self,
        added: &BTreeSet<Statement>,
        removed: &BTreeSet<Statement>,
    ) -> Result<(), StrataError> {
        let result = added
            .iter()
            .try_for_each(Statement::ensure_valid)
            .and_then(|()| {
                self.write(|tables| {
                    let mut applied_removed = Vec::new();
                    for statement in removed {
                        if tables.remove(statement)? {
                            applied_removed.push(statement.clone());
                        }
                    }
                    let mut applied_added = Vec::new();
                    for statement in added {
                        if tables.insert(statement)? {
                            applied_added.push(statement.clone());
                        }
                    }
                    Ok((applied_added, applied_removed))
                })
            })
            .map(|(applied_added, applied_removed)| {
                notify_changes(&self.notifier, &applied_added, &applied_removed);
            });
        self.errors.record(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn uri(s: &str) -> Node {
        Node::resource(format!("http://example.org/{}", s))
    }

    fn st(s: &str, p: &str, o: &str) -> Statement {
        Statement::new(uri(s), uri(p), uri(o))
    }

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");

        let s = st("a", "p", "b");
        store.add_statement(&s).expect("add");
        store.add_statement(&s).expect("add again");
        assert_eq!(store.statement_count().expect("count"), 1);
        assert!(store.contains_statement(&s).expect("contains"));

        store.remove_statement(&s).expect("remove");
        assert!(store.is_empty().expect("empty"));
    }

    #[test]
    fn subject_prefix_scan() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store
            .add_statements(&[st("a", "p", "1"), st("a", "q", "2"), st("ab", "p", "3")])
            .expect("add");

        let found = store
            .list_statements(&Statement::new(uri("a"), Node::Empty, Node::Empty))
            .expect("list")
            .collect_all()
            .expect("collect");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|s| s.subject == uri("a")));
    }

    #[test]
    fn cursor_reads_across_chunks() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let statements: Vec<Statement> = (0..(REDB_FETCH_CHUNK * 2 + 7))
            .map(|i| st("s", "p", &format!("o{}", i)))
            .collect();
        store.add_statements(&statements).expect("add");

        let listed = store.list_all_statements().expect("list").collect_all().expect("collect");
        assert_eq!(listed.len(), statements.len());
    }

    #[test]
    fn contexts_and_remove_context() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store
            .add_statements(&[
                st("a", "p", "b").in_context(uri("g")),
                st("c", "p", "d").in_context(uri("g")),
                st("e", "p", "f"),
            ])
            .expect("add");

        let contexts = store.list_contexts().expect("list").collect_all().expect("collect");
        assert_eq!(contexts, vec![uri("g")]);

        store.remove_context(&uri("g")).expect("remove");
        assert!(store.list_contexts().expect("list").next().is_none());
        assert_eq!(store.statement_count().expect("count"), 1);
    }

    #[test]
    fn persistence_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let blank = {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store
                .add_statement(&st("a", "p", "b").in_context(uri("g")))
                .expect("add");
            store.create_blank_node().expect("blank")
        };

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        assert_eq!(store.statement_count().expect("count"), 1);
        assert!(store.contains_context(&uri("g")).expect("context"));
        assert_ne!(store.create_blank_node().expect("blank"), blank);
    }

    #[test]
    fn erase_all_keeps_store_usable() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.add_statement(&st("a", "p", "b")).expect("add");
        store.erase_all().expect("erase");
        assert!(store.is_empty().expect("empty"));
        store.add_statement(&st("c", "p", "d")).expect("add after erase");
        assert_eq!(store.statement_count().expect("count"), 1);
    }

    #[derive(Default)]
    struct Removals {
        seen: std::sync::Mutex<Vec<Statement>>,
    }

    impl crate::model::ModelObserver for Removals {
        fn statement_removed(&self, statement: &Statement) {
            self.seen.lock().expect("lock").push(statement.clone());
        }
    }

    #[test]
    fn erase_all_reports_each_statement() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store
            .add_statements(&[st("a", "p", "b"), st("c", "p", "d").in_context(uri("g"))])
            .expect("add");
        let removals = Arc::new(Removals::default());
        store.notifier().subscribe(&removals);

        store.erase_all().expect("erase");
        let mut seen = removals.seen.lock().expect("lock").clone();
        seen.sort();
        assert_eq!(seen, vec![st("a", "p", "b"), st("c", "p", "d").in_context(uri("g"))]);
    }

    #[test]
    fn apply_changes_commits_atomically() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        store.add_statement(&st("old", "p", "x")).expect("add");

        let added: BTreeSet<Statement> = [st("new", "p", "x")].into_iter().collect();
        let removed: BTreeSet<Statement> = [st("old", "p", "x")].into_iter().collect();
        store.apply_changes(&added, &removed).expect("apply");

        assert!(store.contains_statement(&st("new", "p", "x")).expect("contains"));
        assert!(!store.contains_statement(&st("old", "p", "x")).expect("contains"));
    }

    #[test]
    fn compact_requires_exclusive_handle() {
        let temp = tempdir().expect("temp dir");
        let mut store = RedbStore::open(temp.path().join("test.redb")).expect("open db");
        let other = store.clone();
        assert!(store.compact().is_err());
        drop(other);
        store.compact().expect("compact");
    }
}
