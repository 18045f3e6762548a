//! # Rule Parser
//!
//! Reads rule files:
//!
//! ```text
//! # comment
//! PREFIX ex: <http://example.org/>
//! [typing: (?x rdf:type ex:A), (?x ex:prop1 ?y) -> (?y rdf:type ex:B)]
//! ```
//!
//! `rdf`, `rdfs`, `xsd` and `sil` are predeclared. Prefix declarations may
//! appear anywhere between rules and apply to the rules after them.

use crate::inference::rule::{Rule, RuleSet};
use crate::query::{read_pattern, read_prefixes};
use crate::term::{PrefixMap, Token, TokenCursor, tokenize};
use crate::types::StrataError;
use std::path::Path;

/// Stateful rule reader: prefixes and rules accumulate across calls.
#[derive(Debug, Clone)]
pub struct RuleParser {
    prefixes: PrefixMap,
    rules: RuleSet,
}

impl Default for RuleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleParser {
    pub fn new() -> Self {
        Self {
            prefixes: PrefixMap::with_well_known(),
            rules: RuleSet::new(),
        }
    }

    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix, namespace);
    }

    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn into_rules(self) -> RuleSet {
        self.rules
    }

    /// Forget all parsed rules and user prefixes.
    pub fn clear(&mut self) {
        self.prefixes = PrefixMap::with_well_known();
        self.rules.clear();
    }

    /// Parse rule text, adding every rule to the set.
    ///
    /// Returns the number of rules read. On error nothing is added.
    pub fn parse(&mut self, text: &str) -> Result<usize, StrataError> {
        let mut cursor = TokenCursor::new(tokenize(text, 1)?);
        let mut prefixes = self.prefixes.clone();
        let mut parsed = Vec::new();

        loop {
            read_prefixes(&mut cursor, &mut prefixes)?;
            if cursor.is_done() {
                break;
            }
            parsed.push(read_rule(&mut cursor, &prefixes)?);
        }

        let count = parsed.len();
        self.prefixes = prefixes;
        for rule in parsed {
            if self.rules.insert(rule).is_some() {
                tracing::debug!("rule redefined");
            }
        }
        Ok(count)
    }

    /// Parse exactly one rule without adding it.
    pub fn parse_rule(&self, text: &str) -> Result<Rule, StrataError> {
        let mut cursor = TokenCursor::new(tokenize(text, 1)?);
        let rule = read_rule(&mut cursor, &self.prefixes)?;
        if !cursor.is_done() {
            return Err(cursor.error(format!(
                "Trailing input after rule: {}",
                cursor.describe_next()
            )));
        }
        Ok(rule)
    }

    /// Parse a rule file.
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<usize, StrataError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                StrataError::NotFound(format!("Rule file {}", path.display()))
            }
            _ => StrataError::BackendFailure(format!(
                "Failed to read rule file {}: {}",
                path.display(),
                e
            )),
        })?;
        let count = self.parse(&text)?;
        tracing::debug!(path = %path.display(), rules = count, "rule file parsed");
        Ok(count)
    }
}

/// `[name: pattern, pattern, ... -> pattern]`
fn read_rule(cursor: &mut TokenCursor, prefixes: &PrefixMap) -> Result<Rule, StrataError> {
    let start = cursor.line();
    cursor.expect(&Token::Punct('['), "'['")?;
    let name = match cursor.advance() {
        Some(Token::Prefixed { prefix, local }) if local.is_empty() && !prefix.is_empty() => prefix,
        _ => return Err(cursor.error("Expected 'name:' after '['")),
    };

    let mut antecedent = vec![read_pattern(cursor, prefixes)?];
    while cursor.eat(&Token::Punct(',')) {
        antecedent.push(read_pattern(cursor, prefixes)?);
    }
    cursor.expect(&Token::Arrow, "'->'")?;
    let consequent = read_pattern(cursor, prefixes)?;
    cursor.expect(&Token::Punct(']'), "']'")?;

    Rule::new(name, antecedent, consequent).map_err(|e| StrataError::parse(start, e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::NodePattern;
    use crate::types::{ErrorKind, Node};
    use crate::vocabulary::rdf;

    const TYPING: &str = "PREFIX ex: <http://example.org/>\n\
        [typing: (?x rdf:type ex:A), (?x ex:prop1 ?y) -> (?y rdf:type ex:B)]";

    #[test]
    fn parses_prefixed_rule() {
        let mut parser = RuleParser::new();
        assert_eq!(parser.parse(TYPING).expect("parse"), 1);
        let rule = parser.rules().get("typing").expect("rule");
        assert_eq!(rule.antecedent().len(), 2);
        assert_eq!(
            rule.consequent().predicate,
            NodePattern::Node(rdf::type_())
        );
        assert_eq!(
            rule.consequent().object,
            NodePattern::Node(Node::resource("http://example.org/B"))
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# leading comment\n\n[r1: (?a <http://p> ?b) -> (?b <http://p> ?a)] # trailing\n";
        let mut parser = RuleParser::new();
        assert_eq!(parser.parse(text).expect("parse"), 1);
    }

    #[test]
    fn prefixes_persist_across_calls() {
        let mut parser = RuleParser::new();
        parser.parse("PREFIX ex: <http://example.org/>").expect("prefix only");
        let rule = parser
            .parse_rule("[r: (?a ex:p ?b) -> (?b ex:p ?a)]")
            .expect("uses ex");
        assert_eq!(rule.name(), "r");
        assert!(parser.rules().is_empty());
    }

    #[test]
    fn display_parses_back() {
        let mut parser = RuleParser::new();
        parser.parse(TYPING).expect("parse");
        let rule = parser.rules().get("typing").expect("rule").clone();
        let reparsed = RuleParser::new().parse_rule(&rule.to_string()).expect("reparse");
        assert_eq!(reparsed, rule);
    }

    #[test]
    fn reports_errors_with_line() {
        let mut parser = RuleParser::new();
        let err = parser
            .parse("\n\n[broken: (?a <http://p> ?b) (?b <http://p> ?a)]")
            .expect_err("missing arrow");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert!(matches!(err, StrataError::Parse { line: 3, .. }));
        assert!(parser.rules().is_empty());
    }

    #[test]
    fn invalid_rules_are_parse_errors() {
        let err = RuleParser::new()
            .parse_rule("[r: (?a <http://p> ?b) -> (?c <http://p> ?a)]")
            .expect_err("unbound");
        assert_eq!(err.kind(), ErrorKind::Parsing);
    }

    #[test]
    fn missing_rule_file_is_not_found() {
        let err = RuleParser::new()
            .parse_file("/nonexistent/strata/rules.txt")
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
