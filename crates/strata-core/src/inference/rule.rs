//! # Rules
//!
//! A rule is a conjunction of statement patterns (the antecedent) and one
//! statement template (the consequent) over a subset of their variables.

use crate::inference::parser::RuleParser;
use crate::pattern::{BindingSet, StatementPattern};
use crate::primitives::MAX_JOIN_PATTERNS;
use crate::types::{Statement, StrataError};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// RULE
// =============================================================================

/// A named forward-chaining rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    name: String,
    antecedent: Vec<StatementPattern>,
    consequent: StatementPattern,
}

impl Rule {
    /// Build a rule, checking that it can ever fire.
    ///
    /// The antecedent must be non-empty and bounded, and every consequent
    /// variable must be bound by the antecedent.
    pub fn new(
        name: impl Into<String>,
        antecedent: Vec<StatementPattern>,
        consequent: StatementPattern,
    ) -> Result<Self, StrataError> {
        let name = name.into();
        if antecedent.is_empty() {
            return Err(StrataError::InvalidArgument(format!(
                "Rule '{}' has an empty antecedent",
                name
            )));
        }
        if antecedent.len() > MAX_JOIN_PATTERNS {
            return Err(StrataError::InvalidArgument(format!(
                "Rule '{}' has {} antecedent patterns, the limit is {}",
                name,
                antecedent.len(),
                MAX_JOIN_PATTERNS
            )));
        }
        let bound: std::collections::BTreeSet<String> = antecedent
            .iter()
            .flat_map(StatementPattern::variables)
            .collect();
        if let Some(unbound) = consequent.variables().difference(&bound).next() {
            return Err(StrataError::InvalidArgument(format!(
                "Rule '{}' uses ?{} in its consequent but never binds it",
                name, unbound
            )));
        }
        Ok(Self {
            name,
            antecedent,
            consequent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn antecedent(&self) -> &[StatementPattern] {
        &self.antecedent
    }

    pub fn consequent(&self) -> &StatementPattern {
        &self.consequent
    }

    /// Check if `statement` could unify with any antecedent pattern.
    pub fn could_match(&self, statement: &Statement) -> bool {
        self.antecedent.iter().any(|p| p.could_match(statement))
    }

    /// Seed bindings for every antecedent pattern `statement` unifies with.
    pub fn seeds(&self, statement: &Statement) -> Vec<BindingSet> {
        let mut seeds: Vec<BindingSet> = self
            .antecedent
            .iter()
            .filter_map(|p| p.unify(statement, &BindingSet::new()))
            .collect();
        seeds.sort();
        seeds.dedup();
        seeds
    }

    /// The derived statement under `bindings`, in the default graph.
    pub fn bind_consequent(&self, bindings: &BindingSet) -> Option<Statement> {
        self.consequent.instantiate(bindings)
    }

    /// The antecedent statements under `bindings`, context left open.
    pub fn bind_antecedent(&self, bindings: &BindingSet) -> Vec<Statement> {
        self.antecedent
            .iter()
            .map(|p| p.to_lookup(bindings))
            .collect()
    }
}

impl fmt::Display for Rule {
    /// Renders in the syntax `RuleParser` reads.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}: ", self.name)?;
        for (i, pattern) in self.antecedent.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", pattern)?;
        }
        write!(f, " -> {}]", self.consequent)
    }
}

// =============================================================================
// RULE SET
// =============================================================================

/// Built-in rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardRuleSet {
    /// The RDFS entailment rules that derive new triples from schema data.
    Rdfs,
}

const RDFS_RULES: &str = r"
# RDF Schema entailment (subset that only uses schema triples)
[rdfs2: (?a rdfs:domain ?x), (?u ?a ?y) -> (?u rdf:type ?x)]
[rdfs3: (?a rdfs:range ?x), (?u ?a ?v) -> (?v rdf:type ?x)]
[rdfs5: (?u rdfs:subPropertyOf ?v), (?v rdfs:subPropertyOf ?x) -> (?u rdfs:subPropertyOf ?x)]
[rdfs7: (?a rdfs:subPropertyOf ?b), (?u ?a ?y) -> (?u ?b ?y)]
[rdfs9: (?u rdfs:subClassOf ?x), (?v rdf:type ?u) -> (?v rdf:type ?x)]
[rdfs11: (?u rdfs:subClassOf ?v), (?v rdfs:subClassOf ?x) -> (?u rdfs:subClassOf ?x)]
";

/// Rules keyed by name. Inserting a rule under an existing name replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a built-in rule set.
    pub fn standard(set: StandardRuleSet) -> Result<Self, StrataError> {
        match set {
            StandardRuleSet::Rdfs => {
                let mut parser = RuleParser::new();
                parser.parse(RDFS_RULES)?;
                Ok(parser.into_rules())
            }
        }
    }

    /// Insert `rule` under its own name, returning the one it replaced.
    pub fn insert(&mut self, rule: Rule) -> Option<Rule> {
        self.rules.insert(rule.name().to_string(), rule)
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rule> {
        self.rules.remove(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// All rules, ordered by name.
    pub fn to_vec(&self) -> Vec<Rule> {
        self.rules.values().cloned().collect()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::collections::btree_map::IntoValues<String, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_values()
    }
}

// =============================================================================
// TESTS
// =============================================================================
