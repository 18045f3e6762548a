//! # Query Execution
//!
//! `execute_query` is a pass-through in every decorator; only stores answer
//! it. The built-in stores understand one language, `Patterns`: a
//! conjunction of triple patterns.
//!
//! ```text
//! PREFIX ex: <http://example.org/>
//! { (?a ex:knows ?b) . (?b ex:name ?n) }
//! ```
//!
//! Braces, parentheses and the separating dots are optional.

use crate::model::{Model, QueryResultIterator};
use crate::pattern::{BindingSet, JoinScope, NodePattern, StatementPattern, evaluate_join};
use crate::term::{PrefixMap, Token, TokenCursor, tokenize};
use crate::types::StrataError;
use std::fmt;

// =============================================================================
// QUERY LANGUAGE
// =============================================================================

/// Query languages a backend may be asked to run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryLanguage {
    /// Conjunctive triple patterns, understood by the built-in stores.
    Patterns,
    Sparql,
    /// A backend-specific language, by name.
    User(String),
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patterns => f.write_str("patterns"),
            Self::Sparql => f.write_str("sparql"),
            Self::User(name) => f.write_str(name),
        }
    }
}

impl std::str::FromStr for QueryLanguage {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patterns" => Ok(Self::Patterns),
            "sparql" => Ok(Self::Sparql),
            "" => Err(StrataError::InvalidArgument(
                "Empty query language name".to_string(),
            )),
            _ => Ok(Self::User(s.to_string())),
        }
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Turn a term token into a pattern position.
pub(crate) fn token_to_pattern(
    token: Token,
    prefixes: &PrefixMap,
    line: usize,
) -> Result<NodePattern, StrataError> {
    match token {
        Token::Variable(name) => Ok(NodePattern::Variable(name)),
        Token::Prefixed { prefix, local } => Ok(NodePattern::Node(
            prefixes.expand(&prefix, &local, line)?,
        )),
        other => other
            .as_node()
            .map(NodePattern::Node)
            .ok_or_else(|| StrataError::parse(line, format!("Expected a term, found {:?}", other))),
    }
}

/// Read one pattern, with or without surrounding parentheses.
pub(crate) fn read_pattern(
    cursor: &mut TokenCursor,
    prefixes: &PrefixMap,
) -> Result<StatementPattern, StrataError> {
    let parenthesized = cursor.eat(&Token::Punct('('));
    let mut positions = Vec::with_capacity(3);
    for _ in 0..3 {
        let line = cursor.line();
        let token = cursor
            .advance()
            .ok_or_else(|| cursor.error("Unexpected end of pattern"))?;
        positions.push(token_to_pattern(token, prefixes, line)?);
    }
    if parenthesized {
        cursor.expect(&Token::Punct(')'), "')'")?;
    }
    let mut positions = positions.into_iter();
    match (positions.next(), positions.next(), positions.next()) {
        (Some(s), Some(p), Some(o)) => Ok(StatementPattern::new(s, p, o)),
        _ => Err(cursor.error("Incomplete pattern")),
    }
}

/// Consume leading `PREFIX name: <uri>` declarations.
pub(crate) fn read_prefixes(
    cursor: &mut TokenCursor,
    prefixes: &mut PrefixMap,
) -> Result<(), StrataError> {
    while let Some(Token::Word(word)) = cursor.peek() {
        if !word.eq_ignore_ascii_case("prefix") {
            break;
        }
        cursor.advance();
        let name = match cursor.advance() {
            Some(Token::Prefixed { prefix, local }) if local.is_empty() => prefix,
            _ => return Err(cursor.error("Expected 'name:' after PREFIX")),
        };
        let namespace = match cursor.advance() {
            Some(Token::Iri(uri)) => uri,
            _ => return Err(cursor.error("Expected <namespace> after prefix name")),
        };
        prefixes.insert(name, namespace);
    }
    Ok(())
}

/// Parse a `Patterns` query.
pub fn parse_pattern_query(text: &str) -> Result<Vec<StatementPattern>, StrataError> {
    let mut cursor = TokenCursor::new(tokenize(text, 1)?);
    let mut prefixes = PrefixMap::with_well_known();
    read_prefixes(&mut cursor, &mut prefixes)?;

    let braced = cursor.eat(&Token::Punct('{'));
    let mut patterns = Vec::new();
    loop {
        if braced && cursor.eat(&Token::Punct('}')) {
            break;
        }
        if cursor.is_done() {
            if braced {
                return Err(cursor.error("Expected '}'"));
            }
            break;
        }
        patterns.push(read_pattern(&mut cursor, &prefixes)?);
        cursor.eat(&Token::Punct('.'));
    }

    if !cursor.is_done() {
        return Err(cursor.error(format!(
            "Trailing input after query: {}",
            cursor.describe_next()
        )));
    }
    if patterns.is_empty() {
        return Err(StrataError::parse(1, "Query has no patterns"));
    }
    Ok(patterns)
}

/// Render patterns as a `Patterns` query that `parse_pattern_query` accepts.
pub fn render_pattern_query(patterns: &[StatementPattern]) -> String {
    let body: Vec<String> = patterns.iter().map(ToString::to_string).collect();
    format!("{{ {} }}", body.join(" . "))
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Answer a query against `model` with the built-in join.
///
/// Used by the built-in stores; languages other than `Patterns` are
/// reported as `Unsupported`.
pub fn execute_builtin_query(
    model: &dyn Model,
    query: &str,
    language: &QueryLanguage,
) -> Result<QueryResultIterator, StrataError> {
    match language {
        QueryLanguage::Patterns => {
            let patterns = parse_pattern_query(query)?;
            let results = evaluate_join(model, &patterns, &BindingSet::new(), JoinScope::default())?;
            tracing::debug!(
                patterns = patterns.len(),
                results = results.len(),
                "pattern query evaluated"
            );
            Ok(QueryResultIterator::from_vec(results))
        }
        other => Err(StrataError::Unsupported(format!(
            "Query language '{}' is not supported by this backend",
            other
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
