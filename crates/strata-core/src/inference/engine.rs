//! # Inference Engine
//!
//! Forward chaining with provenance kept in the store itself.
//!
//! ## Inference graphs
//!
//! Every derived statement lives alone in a fresh named graph
//! `inference://localhost#<uuid>`. The metadata graph
//! (`sil:InferenceMetaData`) types it as `sil:InferenceGraph` and links it
//! to each statement that justified it through `sil:sourceStatement`:
//!
//! ```text
//! compressed:    G sil:sourceStatement "<s> <p> <o> <c> ."
//! uncompressed:  G sil:sourceStatement _:r
//!                _:r rdf:type rdf:Statement ; rdf:subject <s> ;
//!                    rdf:predicate <p> ; rdf:object <o> ; sil:context <c>
//! ```
//!
//! Lookups understand both encodings, whichever one is active.
//!
//! ## Termination
//!
//! One operation is one pass: a worklist of triggers plus a visited set of
//! (rule, binding). A binding fires at most once per pass, and triggers
//! deeper than `MAX_INFERENCE_DEPTH` are dropped.

use crate::filter::{FilterModel, Relay, RelayMode};
use crate::inference::rule::Rule;
use crate::model::{
    ErrorCache, Model, ModelObserver, NodeIterator, Notifier, QueryResultIterator,
    StatementIterator,
};
use crate::pattern::{BindingSet, JoinScope, NodePattern, StatementPattern, evaluate_join};
use crate::primitives::{INFERENCE_GRAPH_PREFIX, MAX_INFERENCE_DEPTH};
use crate::query::{QueryLanguage, render_pattern_query};
use crate::term::{parse_nquads_line, statement_to_string};
use crate::transaction::{FilterTransaction, Transaction, TransactionState};
use crate::types::{ErrorKind, Node, Statement, StrataError};
use crate::vocabulary::{is_metadata_graph, rdf, sil};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// How source statements are written to the metadata graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvenanceEncoding {
    /// One N-Quads literal per source statement.
    #[default]
    Compressed,
    /// One reified resource per source statement.
    Uncompressed,
}

impl fmt::Display for ProvenanceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compressed => f.write_str("compressed"),
            Self::Uncompressed => f.write_str("uncompressed"),
        }
    }
}

impl std::str::FromStr for ProvenanceEncoding {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compressed" => Ok(Self::Compressed),
            "uncompressed" => Ok(Self::Uncompressed),
            other => Err(StrataError::InvalidArgument(format!(
                "Unknown provenance encoding '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Rules plus the settings that shape how they run.
///
/// The engine owns no data: every operation takes the model to work on,
/// which is a store, a decorator chain or an open transaction.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    rules: Vec<Rule>,
    encoding: ProvenanceEncoding,
    optimized_queries: bool,
    recursive: bool,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            encoding: ProvenanceEncoding::default(),
            optimized_queries: false,
            recursive: true,
        }
    }
}

/// State of one inference pass.
#[derive(Default)]
struct Pass {
    visited: BTreeSet<(usize, BindingSet)>,
    queue: VecDeque<(Statement, usize)>,
    inferred: usize,
}

impl InferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn set_rules(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.rules = rules.into_iter().collect();
    }

    pub fn provenance_encoding(&self) -> ProvenanceEncoding {
        self.encoding
    }

    /// Applies to provenance written from now on.
    pub fn set_provenance_encoding(&mut self, encoding: ProvenanceEncoding) {
        self.encoding = encoding;
    }

    pub fn optimized_queries_enabled(&self) -> bool {
        self.optimized_queries
    }

    /// Evaluate antecedents as one backend query instead of pattern lookups.
    pub fn set_optimized_queries_enabled(&mut self, enabled: bool) {
        self.optimized_queries = enabled;
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Whether derived statements trigger further inference.
    pub fn set_recursive(&mut self, recursive: bool) {
        self.recursive = recursive;
    }

    // -------------------------------------------------------------------------
    // Forward chaining
    // -------------------------------------------------------------------------

    /// Run the rules that `triggers` can take part in.
    ///
    /// Returns the number of statements inferred.
    pub fn infer_statements<M: Model + ?Sized>(
        &self,
        model: &mut M,
        triggers: &[Statement],
    ) -> Result<usize, StrataError> {
        let mut pass = Pass::default();
        pass.queue
            .extend(triggers.iter().map(|statement| (statement.clone(), 0)));
        self.drain(model, &mut pass)?;
        Ok(pass.inferred)
    }

    /// Evaluate every rule over the whole model.
    pub fn perform_inference<M: Model + ?Sized>(
        &self,
        model: &mut M,
    ) -> Result<usize, StrataError> {
        let mut pass = Pass::default();
        for (index, rule) in self.rules.iter().enumerate() {
            self.fire(model, &mut pass, index, rule, &BindingSet::new(), 0)?;
        }
        self.drain(model, &mut pass)?;
        tracing::debug!(inferred = pass.inferred, "full inference pass finished");
        Ok(pass.inferred)
    }

    fn drain<M: Model + ?Sized>(&self, model: &mut M, pass: &mut Pass) -> Result<(), StrataError> {
        while let Some((trigger, depth)) = pass.queue.pop_front() {
            if is_metadata_graph(&trigger.context) {
                continue;
            }
            if depth > MAX_INFERENCE_DEPTH {
                tracing::warn!(
                    statement = %trigger,
                    depth,
                    "inference depth bound reached, trigger dropped"
                );
                continue;
            }
            for (index, rule) in self.rules.iter().enumerate() {
                for seed in rule.seeds(&trigger) {
                    self.fire(model, pass, index, rule, &seed, depth)?;
                }
            }
        }
        Ok(())
    }

    fn fire<M: Model + ?Sized>(
        &self,
        model: &mut M,
        pass: &mut Pass,
        index: usize,
        rule: &Rule,
        seed: &BindingSet,
        depth: usize,
    ) -> Result<(), StrataError> {
        for bindings in self.evaluate(&*model, rule, seed)? {
            if !pass.visited.insert((index, bindings.clone())) {
                continue;
            }
            let Some(derived) = rule.bind_consequent(&bindings) else {
                continue;
            };
            if !derived.is_valid() {
                tracing::trace!(rule = rule.name(), statement = %derived, "skipping ill-formed consequent");
                continue;
            }
            // Derived statements are only added when absent from every context.
            if model.contains_any_statement(&derived)? {
                continue;
            }
            let Some(sources) = resolve_sources(&*model, rule, &bindings)? else {
                continue;
            };

            let graph = self.create_inference_graph(model, &derived, &sources)?;
            tracing::debug!(rule = rule.name(), graph = %graph, statement = %derived, "statement inferred");
            pass.inferred += 1;
            if self.recursive {
                pass.queue.push_back((derived.in_context(graph), depth + 1));
            }
        }
        Ok(())
    }

    /// All extensions of `seed` satisfying the rule's antecedent.
    fn evaluate<M: Model + ?Sized>(
        &self,
        model: &M,
        rule: &Rule,
        seed: &BindingSet,
    ) -> Result<Vec<BindingSet>, StrataError> {
        if self.optimized_queries {
            match evaluate_as_query(model, rule, seed) {
                Ok(bindings) => return Ok(bindings),
                Err(e) if matches!(e.kind(), ErrorKind::Unsupported | ErrorKind::Parsing) => {
                    tracing::debug!(rule = rule.name(), error = %e, "pattern query unavailable, joining instead");
                }
                Err(e) => return Err(e),
            }
        }
        let metadata = sil::inference_metadata();
        evaluate_join(
            model,
            rule.antecedent(),
            seed,
            JoinScope {
                exclude_context: Some(&metadata),
            },
        )
    }

    fn create_inference_graph<M: Model + ?Sized>(
        &self,
        model: &mut M,
        derived: &Statement,
        sources: &[Statement],
    ) -> Result<Node, StrataError> {
        let graph = Node::resource(format!("{}{}", INFERENCE_GRAPH_PREFIX, uuid::Uuid::new_v4()));
        let metadata = sil::inference_metadata();

        model.add_statement(&derived.in_context(graph.clone()))?;
        model.add_statement(&Statement::with_context(
            graph.clone(),
            rdf::type_(),
            sil::inference_graph(),
            metadata.clone(),
        ))?;
        for source in sources {
            let record = self.encode_source(model, source)?;
            model.add_statement(&Statement::with_context(
                graph.clone(),
                sil::source_statement(),
                record,
                metadata.clone(),
            ))?;
        }
        Ok(graph)
    }

    fn encode_source<M: Model + ?Sized>(
        &self,
        model: &mut M,
        source: &Statement,
    ) -> Result<Node, StrataError> {
        match self.encoding {
            ProvenanceEncoding::Compressed => Ok(compress(source)),
            ProvenanceEncoding::Uncompressed => {
                let metadata = sil::inference_metadata();
                let record = model.create_blank_node()?;
                let mut links = vec![
                    (rdf::type_(), rdf::statement()),
                    (rdf::subject(), source.subject.clone()),
                    (rdf::predicate(), source.predicate.clone()),
                    (rdf::object(), source.object.clone()),
                ];
                if source.context.is_valid() {
                    links.push((sil::context(), source.context.clone()));
                }
                for (predicate, object) in links {
                    model.add_statement(&Statement::with_context(
                        record.clone(),
                        predicate,
                        object,
                        metadata.clone(),
                    ))?;
                }
                Ok(record)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Provenance lookup
    // -------------------------------------------------------------------------

    /// Every inference graph recorded in the metadata graph.
    pub fn inference_graphs<M: Model + ?Sized>(&self, model: &M) -> Result<Vec<Node>, StrataError> {
        let pattern = Statement::with_context(
            Node::Empty,
            rdf::type_(),
            sil::inference_graph(),
            sil::inference_metadata(),
        );
        Ok(subjects(model, &pattern)?.into_iter().collect())
    }

    /// The inference graphs whose provenance lists `statement`.
    pub fn graphs_justified_by<M: Model + ?Sized>(
        &self,
        model: &M,
        statement: &Statement,
    ) -> Result<BTreeSet<Node>, StrataError> {
        let mut graphs = BTreeSet::new();
        if is_metadata_graph(&statement.context) {
            return Ok(graphs);
        }
        let mut records = vec![compress(statement)];
        records.extend(reified_records(model, statement)?);
        for record in records {
            let pattern = Statement::with_context(
                Node::Empty,
                sil::source_statement(),
                record,
                sil::inference_metadata(),
            );
            graphs.extend(subjects(model, &pattern)?);
        }
        Ok(graphs)
    }

    /// Decode the source statements recorded for `graph`.
    pub fn source_statements<M: Model + ?Sized>(
        &self,
        model: &M,
        graph: &Node,
    ) -> Result<Vec<Statement>, StrataError> {
        let metadata = sil::inference_metadata();
        let records = model
            .list_statements(&Statement::with_context(
                graph.clone(),
                sil::source_statement(),
                Node::Empty,
                metadata,
            ))?
            .collect_all()?;

        let mut sources = Vec::with_capacity(records.len());
        for record in records {
            let decoded = match record.object.literal_value() {
                Some(value) => parse_nquads_line(value.lexical(), 1)?,
                None => decode_reified(model, &record.object)?,
            };
            match decoded {
                Some(source) => sources.push(source),
                None => tracing::warn!(graph = %graph, "unreadable provenance record ignored"),
            }
        }
        sources.sort();
        Ok(sources)
    }

    // -------------------------------------------------------------------------
    // Retraction
    // -------------------------------------------------------------------------

    /// Retract every inference graph justified by `statements`, cascading to
    /// graphs justified by the retracted statements.
    ///
    /// Returns the number of graphs removed.
    pub fn retract_statements<M: Model + ?Sized>(
        &self,
        model: &mut M,
        statements: &[Statement],
    ) -> Result<usize, StrataError> {
        self.retract_cascade(model, statements).map_err(|e| match e {
            StrataError::BackendFailure(_) => e,
            other => StrataError::BackendFailure(format!("Retraction failed: {}", other)),
        })
    }

    fn retract_cascade<M: Model + ?Sized>(
        &self,
        model: &mut M,
        statements: &[Statement],
    ) -> Result<usize, StrataError> {
        let mut queue: VecDeque<Statement> = statements.iter().cloned().collect();
        let mut retracted = BTreeSet::new();
        while let Some(statement) = queue.pop_front() {
            for graph in self.graphs_justified_by(&*model, &statement)? {
                if !retracted.insert(graph.clone()) {
                    continue;
                }
                let derived = model.list_statements_in_context(&graph)?.collect_all()?;
                model.remove_context(&graph)?;
                remove_provenance(model, &graph)?;
                tracing::debug!(graph = %graph, "inference graph retracted");
                queue.extend(derived);
            }
        }
        Ok(retracted.len())
    }

    /// Delete every inference graph and all provenance.
    pub fn clear_inference<M: Model + ?Sized>(&self, model: &mut M) -> Result<(), StrataError> {
        let graphs = self.inference_graphs(&*model)?;
        for graph in &graphs {
            model.remove_context(graph)?;
        }
        model.remove_context(&sil::inference_metadata())?;
        tracing::debug!(graphs = graphs.len(), "inference cleared");
        Ok(())
    }
}

fn compress(statement: &Statement) -> Node {
    Node::literal(statement_to_string(statement))
}

/// Bind every variable `seed` knows, leaving the rest as variables.
fn substitute(pattern: &StatementPattern, seed: &BindingSet) -> StatementPattern {
    let bind = |position: &NodePattern| match position {
        NodePattern::Variable(name) => seed
            .get(name)
            .map(|node| NodePattern::Node(node.clone()))
            .unwrap_or_else(|| position.clone()),
        NodePattern::Node(_) => position.clone(),
    };
    StatementPattern::new(
        bind(&pattern.subject),
        bind(&pattern.predicate),
        bind(&pattern.object),
    )
}

fn evaluate_as_query<M: Model + ?Sized>(
    model: &M,
    rule: &Rule,
    seed: &BindingSet,
) -> Result<Vec<BindingSet>, StrataError> {
    let patterns: Vec<StatementPattern> = rule
        .antecedent()
        .iter()
        .map(|pattern| substitute(pattern, seed))
        .collect();
    let query = render_pattern_query(&patterns);
    let rows = model
        .execute_query(&query, &QueryLanguage::Patterns)?
        .collect_all()?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut bindings = seed.clone();
            for (name, value) in row.iter() {
                bindings.insert(name, value.clone());
            }
            bindings
        })
        .collect())
}

/// The stored statement each antecedent pattern matched, outside the
/// metadata graph. None if some pattern has no such match.
fn resolve_sources<M: Model + ?Sized>(
    model: &M,
    rule: &Rule,
    bindings: &BindingSet,
) -> Result<Option<Vec<Statement>>, StrataError> {
    let mut sources = Vec::new();
    for lookup in rule.bind_antecedent(bindings) {
        let mut found = None;
        for item in model.list_statements(&lookup)? {
            let statement = item?;
            if !is_metadata_graph(&statement.context) {
                found = Some(statement);
                break;
            }
        }
        match found {
            Some(statement) => sources.push(statement),
            None => return Ok(None),
        }
    }
    sources.sort();
    sources.dedup();
    Ok(Some(sources))
}

fn subjects<M: Model + ?Sized>(model: &M, pattern: &Statement) -> Result<BTreeSet<Node>, StrataError> {
    let mut out = BTreeSet::new();
    for item in model.list_statements(pattern)? {
        out.insert(item?.subject);
    }
    Ok(out)
}

fn first_object<M: Model + ?Sized>(
    model: &M,
    subject: &Node,
    predicate: Node,
) -> Result<Option<Node>, StrataError> {
    let pattern = Statement::with_context(
        subject.clone(),
        predicate,
        Node::Empty,
        sil::inference_metadata(),
    );
    Ok(model
        .list_statements(&pattern)?
        .next()
        .transpose()?
        .map(|s| s.object))
}

/// Reified records in the metadata graph describing exactly `statement`.
fn reified_records<M: Model + ?Sized>(
    model: &M,
    statement: &Statement,
) -> Result<BTreeSet<Node>, StrataError> {
    let metadata = sil::inference_metadata();
    let link = |predicate: Node, value: &Node| {
        Statement::with_context(Node::Empty, predicate, value.clone(), metadata.clone())
    };

    let mut candidates = subjects(model, &link(rdf::subject(), &statement.subject))?;
    candidates = candidates
        .intersection(&subjects(model, &link(rdf::predicate(), &statement.predicate))?)
        .cloned()
        .collect();
    candidates = candidates
        .intersection(&subjects(model, &link(rdf::object(), &statement.object))?)
        .cloned()
        .collect();

    let mut records = BTreeSet::new();
    for candidate in candidates {
        let recorded_context = first_object(model, &candidate, sil::context())?.unwrap_or_default();
        if recorded_context == statement.context {
            records.insert(candidate);
        }
    }
    Ok(records)
}

fn decode_reified<M: Model + ?Sized>(model: &M, record: &Node) -> Result<Option<Statement>, StrataError> {
    let subject = first_object(model, record, rdf::subject())?;
    let predicate = first_object(model, record, rdf::predicate())?;
    let object = first_object(model, record, rdf::object())?;
    let context = first_object(model, record, sil::context())?.unwrap_or_default();
    Ok(match (subject, predicate, object) {
        (Some(s), Some(p), Some(o)) => Some(Statement::with_context(s, p, o, context)),
        _ => None,
    })
}

fn remove_provenance<M: Model + ?Sized>(model: &mut M, graph: &Node) -> Result<(), StrataError> {
    let metadata = sil::inference_metadata();
    let records = model
        .list_statements(&Statement::with_context(
            graph.clone(),
            sil::source_statement(),
            Node::Empty,
            metadata.clone(),
        ))?
        .collect_all()?;
    for record in records.iter().filter(|r| !r.object.is_literal()) {
        model.remove_all_statements(&Statement::with_context(
            record.object.clone(),
            Node::Empty,
            Node::Empty,
            metadata.clone(),
        ))?;
    }
    model.remove_all_statements(&Statement::with_context(
        graph.clone(),
        Node::Empty,
        Node::Empty,
        metadata,
    ))
}

// =============================================================================
// INFERENCE MODEL
// =============================================================================

/// Decorator that keeps derived statements in step with the data.
///
/// Additions trigger inference, removals retract what they justified.
/// Coalesced notifications from the parent are held for the duration of
/// one call and emitted once at its end. Changes made through the parent
/// outside such a call pass straight through.
#[derive(Debug)]
pub struct InferenceModel {
    base: FilterModel,
    engine: InferenceEngine,
}

impl InferenceModel {
    pub fn new(parent: Box<dyn Model>) -> Self {
        Self::with_engine(parent, InferenceEngine::new())
    }

    pub fn with_engine(parent: Box<dyn Model>, engine: InferenceEngine) -> Self {
        Self {
            base: FilterModel::with_relay(parent, RelayMode::Batch),
            engine,
        }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn parent(&self) -> &dyn Model {
        self.base.parent()
    }

    /// Rules only affect statements added afterwards; call
    /// `perform_inference` to apply them to existing data.
    pub fn add_rule(&mut self, rule: Rule) {
        self.engine.add_rule(rule);
    }

    pub fn set_rules(&mut self, rules: impl IntoIterator<Item = Rule>) {
        self.engine.set_rules(rules);
    }

    pub fn set_provenance_encoding(&mut self, encoding: ProvenanceEncoding) {
        self.engine.set_provenance_encoding(encoding);
    }

    pub fn set_optimized_queries_enabled(&mut self, enabled: bool) {
        self.engine.set_optimized_queries_enabled(enabled);
    }

    pub fn set_recursive(&mut self, recursive: bool) {
        self.engine.set_recursive(recursive);
    }

    /// Re-evaluate every rule over the whole parent.
    pub fn perform_inference(&mut self) -> Result<usize, StrataError> {
        let batch = self.base.batch();
        let result = self.engine.perform_inference(self.base.parent_mut());
        drop(batch);
        self.base.forward(result)
    }

    /// Delete all inference graphs and provenance.
    pub fn clear_inference(&mut self) -> Result<(), StrataError> {
        let batch = self.base.batch();
        let result = self.engine.clear_inference(self.base.parent_mut());
        drop(batch);
        self.base.forward(result)
    }

    pub fn inference_graphs(&self) -> Result<Vec<Node>, StrataError> {
        self.base
            .forward(self.engine.inference_graphs(self.base.parent()))
    }

    pub fn source_statements(&self, graph: &Node) -> Result<Vec<Statement>, StrataError> {
        self.base
            .forward(self.engine.source_statements(self.base.parent(), graph))
    }

    fn add_and_infer(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        self.base.parent_mut().add_statements(statements)?;
        let inferred = self
            .engine
            .infer_statements(self.base.parent_mut(), statements)?;
        if inferred > 0 {
            tracing::debug!(inferred, "inference after add");
        }
        Ok(())
    }

    fn remove_and_retract(&mut self, statement: &Statement) -> Result<(), StrataError> {
        self.base.parent_mut().remove_statement(statement)?;
        self.engine
            .retract_statements(self.base.parent_mut(), std::slice::from_ref(statement))?;
        Ok(())
    }

    fn retract_and_remove(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let matches = self.base.parent().list_statements(pattern)?.collect_all()?;
        self.engine
            .retract_statements(self.base.parent_mut(), &matches)?;
        self.base.parent_mut().remove_all_statements(pattern)
    }
}

impl Model for InferenceModel {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let batch = self.base.batch();
        let result = self.add_and_infer(std::slice::from_ref(statement));
        drop(batch);
        self.base.forward(result)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        let batch = self.base.batch();
        let result = self.add_and_infer(statements);
        drop(batch);
        self.base.forward(result)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        let batch = self.base.batch();
        let result = self.remove_and_retract(statement);
        drop(batch);
        self.base.forward(result)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        let batch = self.base.batch();
        let result = self.retract_and_remove(pattern);
        drop(batch);
        self.base.forward(result)
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
        let engine = self.engine.clone();
        let relay = Arc::clone(self.base.relay());
        let result = self.base.parent_mut().start_transaction().map(|parent| {
            Box::new(InferenceTransaction::new(parent, engine).with_relay(relay))
                as Box<dyn Transaction>
        });
        self.base.forward(result)
    }

    fn error_cache(&self) -> &ErrorCache {
        self.base.error_cache()
    }

    fn notifier(&self) -> &Notifier {
        self.base.notifier()
    }
}

// =============================================================================
// INFERENCE TRANSACTION
// =============================================================================

#[derive(Debug, Default)]
struct Staged {
    added: BTreeSet<Statement>,
    removed: BTreeSet<Statement>,
}

/// Net additions and removals seen on the parent transaction.
#[derive(Debug, Default)]
struct StagingObserver {
    staged: Mutex<Staged>,
}

impl StagingObserver {
    fn lock(&self) -> std::sync::MutexGuard<'_, Staged> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Staged {
        std::mem::take(&mut *self.lock())
    }

    fn restore(&self, staged: Staged) {
        *self.lock() = staged;
    }

    fn counts(&self) -> (usize, usize) {
        let staged = self.lock();
        (staged.added.len(), staged.removed.len())
    }
}

impl ModelObserver for StagingObserver {
    fn statement_added(&self, statement: &Statement) {
        let mut staged = self.lock();
        if !staged.removed.remove(statement) {
            staged.added.insert(statement.clone());
        }
    }

    fn statement_removed(&self, statement: &Statement) {
        let mut staged = self.lock();
        if !staged.added.remove(statement) {
            staged.removed.insert(statement.clone());
        }
    }
}

/// Transaction returned by `InferenceModel::start_transaction`.
///
/// Mutations go straight to the parent transaction and are staged here.
/// On commit, retraction and inference for the staged changes run inside
/// the parent before it commits, so derived statements land atomically
/// with the data. Rollback discards the staged changes.
///
/// When attached to an `InferenceModel`'s relay, the store's notifications
/// for one commit reach the model's observers as a single coalesced pair.
pub struct InferenceTransaction {
    base: FilterTransaction,
    engine: InferenceEngine,
    staging: Arc<StagingObserver>,
    relay: Option<Arc<Relay>>,
}

impl fmt::Debug for InferenceTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceTransaction")
            .field("state", &self.base.state())
            .field("staged", &self.staging.counts())
            .finish_non_exhaustive()
    }
}

impl InferenceTransaction {
    pub fn new(parent: Box<dyn Transaction>, engine: InferenceEngine) -> Self {
        let staging = Arc::new(StagingObserver::default());
        parent.notifier().subscribe(&staging);
        Self {
            base: FilterTransaction::new(parent),
            engine,
            staging,
            relay: None,
        }
    }

    /// Batch `relay` around each commit.
    pub fn with_relay(mut self, relay: Arc<Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Number of staged additions and removals.
    pub fn staged(&self) -> (usize, usize) {
        self.staging.counts()
    }

    fn apply_staged(&mut self, staged: &Staged) -> Result<(), StrataError> {
        let removed: Vec<Statement> = staged.removed.iter().cloned().collect();
        let added: Vec<Statement> = staged.added.iter().cloned().collect();
        let retracted = self
            .engine
            .retract_statements(self.base.parent_mut(), &removed)?;
        let inferred = self
            .engine
            .infer_statements(self.base.parent_mut(), &added)?;
        tracing::debug!(retracted, inferred, "inference applied before commit");
        Ok(())
    }
}

impl Model for InferenceTransaction {
    fn add_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        self.base.add_statement(statement)
    }

    fn add_statements(&mut self, statements: &[Statement]) -> Result<(), StrataError> {
        self.base.add_statements(statements)
    }

    fn remove_statement(&mut self, statement: &Statement) -> Result<(), StrataError> {
        self.base.remove_statement(statement)
    }

    fn remove_all_statements(&mut self, pattern: &Statement) -> Result<(), StrataError> {
        self.base.remove_all_statements(pattern)
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

    fn error_cache(&self) -> &ErrorCache {
        self.base.error_cache()
    }

    fn notifier(&self) -> &Notifier {
        self.base.notifier()
    }
}

impl Transaction for InferenceTransaction {
    fn state(&self) -> TransactionState {
        self.base.state()
    }

    fn set_state(&mut self, state: TransactionState) {
        self.base.set_state(state);
    }

    fn do_commit(&mut self) -> Result<(), StrataError> {
        let _batch = self.relay.as_ref().map(Relay::batch);
        let staged = self.staging.take();
        let applied = self.apply_staged(&staged);
        // The engine's own writes are not user changes.
        self.staging.take();
        if let Err(e) = applied {
            self.staging.restore(staged);
            return Err(e);
        }
        self.base.do_commit()
    }

    fn do_rollback(&mut self) -> Result<(), StrataError> {
        self.staging.take();
        self.base.do_rollback()
    }
}

// =============================================================================
// TESTS
// =============================================================================
