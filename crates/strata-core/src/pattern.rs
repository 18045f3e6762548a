//! # Patterns and Joins
//!
//! Variable-carrying statement patterns, binding sets, and the nested-loop
//! join that evaluates a conjunction of patterns against any `Model`.
//!
//! The join is the reference evaluation path: the pattern query language and
//! the inference engine both reduce to it. Results are deduplicated and
//! returned in `BindingSet` order, so evaluation is deterministic for a given
//! store content.

use crate::model::Model;
use crate::primitives::MAX_JOIN_PATTERNS;
use crate::types::{Node, Statement, StrataError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// =============================================================================
// BINDING SET
// =============================================================================

/// Variable name to node assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingSet {
    values: BTreeMap<String, Node>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.values.get(name)
    }

    /// Bind `name`. Returns the previous value, if any.
    pub fn insert(&mut self, name: impl Into<String>, value: Node) -> Option<Node> {
        self.values.insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound variable names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the named variables.
    #[must_use]
    pub fn project(&self, names: &BTreeSet<String>) -> Self {
        Self {
            values: self
                .values
                .iter()
                .filter(|(k, _)| names.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(String, Node)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.values {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            write!(f, "?{}={}", name, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// NODE PATTERN
// =============================================================================

/// One position of a statement pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodePattern {
    Variable(String),
    /// A ground node; `Node::Empty` matches anything.
    Node(Node),
}

impl NodePattern {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Self::Variable(name) => Some(name),
            Self::Node(_) => None,
        }
    }

    /// The node this position stands for under `bindings`, `Empty` if unbound.
    pub fn resolve(&self, bindings: &BindingSet) -> Node {
        match self {
            Self::Variable(name) => bindings.get(name).cloned().unwrap_or_default(),
            Self::Node(node) => node.clone(),
        }
    }

    fn unify(&self, value: &Node, bindings: &mut BindingSet) -> bool {
        match self {
            Self::Node(node) => node.matches(value),
            Self::Variable(name) => match bindings.get(name) {
                Some(bound) => bound == value,
                None => {
                    bindings.insert(name.clone(), value.clone());
                    true
                }
            },
        }
    }
}

impl From<Node> for NodePattern {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "?{}", name),
            Self::Node(node) => write!(f, "{}", node),
        }
    }
}

// =============================================================================
// STATEMENT PATTERN
// =============================================================================

/// A triple pattern. It matches statements in any context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatementPattern {
    pub subject: NodePattern,
    pub predicate: NodePattern,
    pub object: NodePattern,
}

impl StatementPattern {
    pub fn new(
        subject: impl Into<NodePattern>,
        predicate: impl Into<NodePattern>,
        object: impl Into<NodePattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    fn positions(&self) -> [&NodePattern; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Variable names used by this pattern.
    pub fn variables(&self) -> BTreeSet<String> {
        self.positions()
            .iter()
            .filter_map(|p| p.variable_name().map(str::to_string))
            .collect()
    }

    /// The store lookup pattern under `bindings`: unbound variables become wildcards.
    pub fn to_lookup(&self, bindings: &BindingSet) -> Statement {
        Statement::new(
            self.subject.resolve(bindings),
            self.predicate.resolve(bindings),
            self.object.resolve(bindings),
        )
    }

    /// The ground statement under `bindings`, or None if a variable is unbound.
    pub fn instantiate(&self, bindings: &BindingSet) -> Option<Statement> {
        let statement = self.to_lookup(bindings);
        statement.is_complete().then_some(statement)
    }

    /// Extend `bindings` so that this pattern matches `statement`.
    pub fn unify(&self, statement: &Statement, bindings: &BindingSet) -> Option<BindingSet> {
        let mut extended = bindings.clone();
        let ok = self.subject.unify(&statement.subject, &mut extended)
            && self.predicate.unify(&statement.predicate, &mut extended)
            && self.object.unify(&statement.object, &mut extended);
        ok.then_some(extended)
    }

    /// Check if `statement` could match this pattern at all.
    pub fn could_match(&self, statement: &Statement) -> bool {
        self.unify(statement, &BindingSet::new()).is_some()
    }
}

impl fmt::Display for StatementPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

// =============================================================================
// JOIN
// =============================================================================

/// Statements a join may not see.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinScope<'a> {
    /// Ignore statements stored in this context.
    pub exclude_context: Option<&'a Node>,
}

impl JoinScope<'_> {
    pub fn admits(&self, statement: &Statement) -> bool {
        self.exclude_context
            .is_none_or(|excluded| &statement.context != excluded)
    }
}

/// Evaluate a conjunction of patterns with a nested-loop join.
///
/// `seed` pre-binds variables. The result holds every distinct extension of
/// `seed` that satisfies all patterns.
pub fn evaluate_join<M: Model + ?Sized>(
    model: &M,
    patterns: &[StatementPattern],
    seed: &BindingSet,
    scope: JoinScope<'_>,
) -> Result<Vec<BindingSet>, StrataError> {
    if patterns.len() > MAX_JOIN_PATTERNS {
        return Err(StrataError::InvalidArgument(format!(
            "Join of {} patterns exceeds the limit of {}",
            patterns.len(),
            MAX_JOIN_PATTERNS
        )));
    }

    let mut results = BTreeSet::new();
    join_step(model, patterns, seed.clone(), scope, &mut results)?;
    Ok(results.into_iter().collect())
}

fn join_step<M: Model + ?Sized>(
    model: &M,
    patterns: &[StatementPattern],
    bindings: BindingSet,
    scope: JoinScope<'_>,
    results: &mut BTreeSet<BindingSet>,
) -> Result<(), StrataError> {
    let Some((first, rest)) = patterns.split_first() else {
        results.insert(bindings);
        return Ok(());
    };

    let lookup = first.to_lookup(&bindings);
    // Materialize before recursing so no cursor stays open across lookups.
    let matches = model.list_statements(&lookup)?.collect_all()?;
    for statement in matches.iter().filter(|s| scope.admits(s)) {
        if let Some(extended) = first.unify(statement, &bindings) {
            join_step(model, rest, extended, scope, results)?;
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryStore;

    fn uri(s: &str) -> Node {
        Node::resource(format!("http://example.org/{}", s))
    }

    fn var(s: &str) -> NodePattern {
        NodePattern::variable(s)
    }

    #[test]
    fn unify_respects_repeated_variables() {
        let pattern = StatementPattern::new(var("x"), uri("p"), var("x"));
        assert!(pattern.could_match(&Statement::new(uri("a"), uri("p"), uri("a"))));
        assert!(!pattern.could_match(&Statement::new(uri("a"), uri("p"), uri("b"))));
    }

    #[test]
    fn unify_respects_existing_bindings() {
        let pattern = StatementPattern::new(var("x"), uri("p"), var("y"));
        let mut seed = BindingSet::new();
        seed.insert("x", uri("b"));
        assert!(
            pattern
                .unify(&Statement::new(uri("a"), uri("p"), uri("c")), &seed)
                .is_none()
        );
    }

    #[test]
    fn instantiate_requires_all_variables() {
        let pattern = StatementPattern::new(var("x"), uri("p"), var("y"));
        let mut b = BindingSet::new();
        b.insert("x", uri("a"));
        assert!(pattern.instantiate(&b).is_none());
        b.insert("y", uri("c"));
        assert_eq!(
            pattern.instantiate(&b),
            Some(Statement::new(uri("a"), uri("p"), uri("c")))
        );
    }

    #[test]
    fn join_finds_transitive_pairs() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[
                Statement::new(uri("a"), uri("sco"), uri("b")),
                Statement::new(uri("b"), uri("sco"), uri("c")),
                Statement::new(uri("c"), uri("sco"), uri("d")),
            ])
            .expect("add");

        let patterns = [
            StatementPattern::new(var("a"), uri("sco"), var("b")),
            StatementPattern::new(var("b"), uri("sco"), var("c")),
        ];
        let results =
            evaluate_join(&store, &patterns, &BindingSet::new(), JoinScope::default())
                .expect("join");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].get("a"), Some(&uri("a")));
        assert_eq!(results[0].get("c"), Some(&uri("c")));
    }

    #[test]
    fn join_deduplicates_across_contexts() {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[
                Statement::with_context(uri("a"), uri("p"), uri("b"), uri("g1")),
                Statement::with_context(uri("a"), uri("p"), uri("b"), uri("g2")),
            ])
            .expect("add");
        let patterns = [StatementPattern::new(var("s"), uri("p"), var("o"))];
        let results =
            evaluate_join(&store, &patterns, &BindingSet::new(), JoinScope::default())
                .expect("join");
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn join_scope_hides_excluded_context() {
        let mut store = MemoryStore::new();
        store
            .add_statement(&Statement::with_context(
                uri("a"),
                uri("p"),
                uri("b"),
                uri("hidden"),
            ))
            .expect("add");
        let hidden = uri("hidden");
        let scope = JoinScope {
            exclude_context: Some(&hidden),
        };
        let patterns = [StatementPattern::new(var("s"), uri("p"), var("o"))];
        let results =
            evaluate_join(&store, &patterns, &BindingSet::new(), scope).expect("join");
        assert!(results.is_empty());
    }

    #[test]
    fn join_rejects_oversized_conjunctions() {
        let store = MemoryStore::new();
        let patterns = vec![StatementPattern::new(var("s"), var("p"), var("o")); MAX_JOIN_PATTERNS + 1];
        assert!(
            evaluate_join(&store, &patterns, &BindingSet::new(), JoinScope::default()).is_err()
        );
    }
}
