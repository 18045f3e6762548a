//! # strata-core
//!
//! The layered quad store engine for Strata.
//!
//! A backend (`Store`) holds quads; decorators wrap it one at a time and add
//! behavior without the backend knowing about them. Every layer speaks the
//! same `Model` contract, so a caller cannot tell a bare store from a deep
//! chain except by what the chain adds.
//!
//! ```text
//! caller ─▶ InferenceModel ─▶ SignalCacheModel ─▶ MemoryStore | RedbStore
//!            mutations flow inward, notifications and results flow outward
//! ```
//!
//! ## Architectural Constraints
//!
//! - Synchronous: no async, no background threads, no network
//! - Deterministic: `BTreeMap`/`BTreeSet` for stored and derived data
//! - No global state: backends are selected explicitly via `StoreConfig`
//! - No silent failures: every operation returns `Result<_, StrataError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod filter;
pub mod formats;
pub mod graph;
pub mod inference;
pub mod model;
pub mod pattern;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod store;
pub mod term;
pub mod transaction;
pub mod types;
pub mod vocabulary;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ErrorKind, LiteralValue, Node, Statement, StrataError};

// =============================================================================
// RE-EXPORTS: Model Chain
// =============================================================================

pub use filter::{FilterModel, MutexModel, ReadOnlyModel, SignalCacheModel};
pub use model::{
    ErrorCache, Model, ModelObserver, NodeIterator, Notifier, QueryResultIterator,
    ResultIterator, StatementIterator, SubscriptionId,
};
pub use pattern::{BindingSet, JoinScope, NodePattern, StatementPattern, evaluate_join};
pub use query::{QueryLanguage, parse_pattern_query, render_pattern_query};
pub use transaction::{FilterTransaction, SimpleTransaction, Transaction, TransactionState};

// =============================================================================
// RE-EXPORTS: Backends
// =============================================================================

pub use graph::MemoryStore;
pub use storage::RedbStore;
pub use store::{Backend, BackendKind, Capabilities, Feature, Store, StoreConfig};

// =============================================================================
// RE-EXPORTS: Inference
// =============================================================================

pub use inference::{
    InferenceEngine, InferenceModel, InferenceTransaction, ProvenanceEncoding, Rule, RuleParser,
    RuleSet, StandardRuleSet,
};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    PersistenceHeader, dump_to_bytes, export_nquads, import_nquads, load_from_bytes,
    statements_to_bytes,
};
pub use term::{parse_node, statement_to_string};
