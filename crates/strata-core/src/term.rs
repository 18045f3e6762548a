//! # Term Syntax
//!
//! N-Triples style rendering and parsing of nodes, plus the N-Quads line codec.
//!
//! The same lexer feeds three front ends:
//! - `parse_node` / `parse_nquads_line` (this module)
//! - the pattern query language (`query`)
//! - the rule parser (`inference::parser`)
//!
//! ## Grammar
//!
//! ```text
//! <http://uri>          resource
//! _:id                  blank node
//! "lex"                 plain literal
//! "lex"@en              language-tagged literal
//! "lex"^^<http://dt>    typed literal
//! ?name                 variable (queries and rules only)
//! prefix:local          prefixed name (rules only)
//! # ...                 comment to end of line
//! ```
//!
//! IRIs and blank node labels carry `\uXXXX` / `\UXXXXXXXX` escapes for
//! characters their plain form cannot hold, so every node survives a
//! render and re-parse.

use crate::types::{LiteralValue, Node, Statement, StrataError};
use crate::vocabulary::WELL_KNOWN_PREFIXES;
use std::collections::BTreeMap;

// =============================================================================
// RENDERING
// =============================================================================

/// Render a node in N-Triples syntax. `Empty` renders as `*`.
#[must_use]
pub fn node_to_string(node: &Node) -> String {
    match node {
        Node::Empty => "*".to_string(),
        Node::Resource(uri) => {
            let mut out = String::with_capacity(uri.len() + 2);
            push_iri(&mut out, uri);
            out
        }
        Node::Blank(id) => {
            let mut out = String::with_capacity(id.len() + 2);
            out.push_str("_:");
            for c in id.chars() {
                if is_word_char(c) {
                    out.push(c);
                } else {
                    push_code_point(&mut out, c);
                }
            }
            out
        }
        Node::Literal(value) => literal_to_string(value),
    }
}

/// Characters an IRIREF cannot hold unescaped.
fn iri_needs_escape(c: char) -> bool {
    c.is_control()
        || c.is_whitespace()
        || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
}

fn push_code_point(out: &mut String, c: char) {
    let code = u32::from(c);
    if code <= 0xFFFF {
        out.push_str(&format!("\\u{:04X}", code));
    } else {
        out.push_str(&format!("\\U{:08X}", code));
    }
}

fn push_iri(out: &mut String, uri: &str) {
    out.push('<');
    for c in uri.chars() {
        if iri_needs_escape(c) {
            push_code_point(out, c);
        } else {
            out.push(c);
        }
    }
    out.push('>');
}

fn literal_to_string(value: &LiteralValue) -> String {
    let mut out = String::with_capacity(value.lexical().len() + 2);
    out.push('"');
    for c in value.lexical().chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    if let Some(lang) = value.language() {
        out.push('@');
        out.push_str(lang);
    } else if let Some(dt) = value.datatype() {
        out.push_str("^^");
        push_iri(&mut out, dt);
    }
    out
}

/// Render a statement as one N-Quads line (without trailing newline).
///
/// The context is omitted for the default graph.
#[must_use]
pub fn statement_to_string(statement: &Statement) -> String {
    let mut out = format!(
        "{} {} {}",
        node_to_string(&statement.subject),
        node_to_string(&statement.predicate),
        node_to_string(&statement.object)
    );
    if statement.context.is_valid() {
        out.push(' ');
        out.push_str(&node_to_string(&statement.context));
    }
    out.push_str(" .");
    out
}

// =============================================================================
// LEXER
// =============================================================================

/// A lexical token of the term syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Iri(String),
    Blank(String),
    Literal(LiteralValue),
    Variable(String),
    /// `prefix:local`; `local` may be empty.
    Prefixed { prefix: String, local: String },
    /// A bare word such as `PREFIX`.
    Word(String),
    /// One of `( ) [ ] { } , .`
    Punct(char),
    /// `->`
    Arrow,
}

impl Token {
    /// Convert a ground term token into a node.
    #[must_use]
    pub fn as_node(&self) -> Option<Node> {
        match self {
            Self::Iri(uri) => Some(Node::resource(uri)),
            Self::Blank(id) => Some(Node::blank(id)),
            Self::Literal(value) => Some(Node::Literal(value.clone())),
            _ => None,
        }
    }
}

/// A token with the 1-based line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
    pub line: usize,
    pub token: Token,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(src: &str, first_line: usize) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: first_line,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> StrataError {
        StrataError::parse(self.line, message)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !is_word_char(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn iri(&mut self) -> Result<String, StrataError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('>') => return Ok(out),
                Some('\\') => out.push(self.code_point_escape()?),
                Some(c) if c.is_whitespace() || c == '<' => {
                    return Err(self.error(format!("Illegal character {:?} in IRI", c)));
                }
                Some(c) => out.push(c),
                None => return Err(self.error("Unterminated IRI")),
            }
        }
    }

    fn unicode_escape(&mut self, digits: usize) -> Result<char, StrataError> {
        let mut code = 0u32;
        for _ in 0..digits {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("Invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| self.error("Invalid unicode code point"))
    }

    /// The rest of a `\u` or `\U` escape, after the backslash.
    fn code_point_escape(&mut self) -> Result<char, StrataError> {
        match self.bump() {
            Some('u') => self.unicode_escape(4),
            Some('U') => self.unicode_escape(8),
            other => Err(self.error(format!("Invalid escape sequence {:?}", other))),
        }
    }

    fn blank_label(&mut self) -> Result<String, StrataError> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(c) if is_word_char(c) => {
                    out.push(c);
                    self.bump();
                }
                Some('\\') => {
                    self.bump();
                    out.push(self.code_point_escape()?);
                }
                _ => return Ok(out),
            }
        }
    }

    fn literal(&mut self) -> Result<LiteralValue, StrataError> {
        self.bump();
        let mut lexical = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('"') => lexical.push('"'),
                    Some('\\') => lexical.push('\\'),
                    Some('n') => lexical.push('\n'),
                    Some('r') => lexical.push('\r'),
                    Some('t') => lexical.push('\t'),
                    Some('u') => lexical.push(self.unicode_escape(4)?),
                    Some('U') => lexical.push(self.unicode_escape(8)?),
                    other => {
                        return Err(self.error(format!("Invalid escape sequence {:?}", other)));
                    }
                },
                Some('\n') | None => return Err(self.error("Unterminated literal")),
                Some(c) => lexical.push(c),
            }
        }

        if self.peek() == Some('@') {
            self.bump();
            let lang = self.word();
            if lang.is_empty() {
                return Err(self.error("Empty language tag"));
            }
            Ok(LiteralValue::with_language(lexical, lang))
        } else if self.peek() == Some('^') && self.peek_at(1) == Some('^') {
            self.bump();
            self.bump();
            if self.peek() != Some('<') {
                return Err(self.error("Expected <datatype> after ^^"));
            }
            let datatype = self.iri()?;
            Ok(LiteralValue::typed(lexical, datatype))
        } else {
            Ok(LiteralValue::plain(lexical))
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, StrataError> {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '<' => Token::Iri(self.iri()?),
            '"' => Token::Literal(self.literal()?),
            '?' | '$' => {
                self.bump();
                let name = self.word();
                if name.is_empty() {
                    return Err(self.error("Empty variable name"));
                }
                Token::Variable(name)
            }
            '_' if self.peek_at(1) == Some(':') => {
                self.bump();
                self.bump();
                let id = self.blank_label()?;
                if id.is_empty() {
                    return Err(self.error("Empty blank node label"));
                }
                Token::Blank(id)
            }
            '-' if self.peek_at(1) == Some('>') => {
                self.bump();
                self.bump();
                Token::Arrow
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' => {
                self.bump();
                Token::Punct(c)
            }
            c if is_word_char(c) => {
                let word = self.word();
                if self.peek() == Some(':') {
                    self.bump();
                    let local = self.word();
                    Token::Prefixed {
                        prefix: word,
                        local,
                    }
                } else {
                    Token::Word(word)
                }
            }
            ':' => {
                self.bump();
                Token::Prefixed {
                    prefix: String::new(),
                    local: self.word(),
                }
            }
            other => return Err(self.error(format!("Unexpected character {:?}", other))),
        };

        Ok(Some(Spanned { line, token }))
    }
}

/// Split `src` into tokens. Line numbers start at `first_line`.
pub fn tokenize(src: &str, first_line: usize) -> Result<Vec<Spanned>, StrataError> {
    let mut lexer = Lexer::new(src, first_line);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Forward-only cursor over a token list, shared by the text front ends.
pub(crate) struct TokenCursor {
    tokens: Vec<Spanned>,
    pos: usize,
    last_line: usize,
}

impl TokenCursor {
    pub(crate) fn new(tokens: Vec<Spanned>) -> Self {
        let last_line = tokens.last().map(|t| t.line).unwrap_or(1);
        Self {
            tokens,
            pos: 0,
            last_line,
        }
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Line of the next token, or of the last one at end of input.
    pub(crate) fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.line)
            .unwrap_or(self.last_line)
    }

    pub(crate) fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|t| t.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn is_done(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the next token if it is `expected`.
    pub(crate) fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, expected: &Token, what: &str) -> Result<(), StrataError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {}, found {}", what, self.describe_next())))
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> StrataError {
        StrataError::parse(self.line(), message)
    }

    pub(crate) fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("{:?}", token),
            None => "end of input".to_string(),
        }
    }
}

// =============================================================================
// PREFIXES
// =============================================================================

/// Namespace prefixes for `prefix:local` names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixMap {
    prefixes: BTreeMap<String, String>,
}

impl PrefixMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map preloaded with `rdf`, `rdfs`, `xsd` and `sil`.
    pub fn with_well_known() -> Self {
        let mut map = Self::new();
        for (prefix, namespace) in WELL_KNOWN_PREFIXES {
            map.insert(*prefix, *namespace);
        }
        map
    }

    pub fn insert(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    /// Expand `prefix:local` into a resource node.
    pub fn expand(&self, prefix: &str, local: &str, line: usize) -> Result<Node, StrataError> {
        self.get(prefix)
            .map(|ns| Node::resource(format!("{}{}", ns, local)))
            .ok_or_else(|| StrataError::parse(line, format!("Unknown prefix '{}'", prefix)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a single ground node (`<uri>`, `_:id` or a literal).
pub fn parse_node(text: &str) -> Result<Node, StrataError> {
    let tokens = tokenize(text, 1)?;
    match tokens.as_slice() {
        [single] => single
            .token
            .as_node()
            .ok_or_else(|| StrataError::parse(single.line, format!("Not a node: {}", text))),
        [] => Err(StrataError::parse(1, "Empty node")),
        [_, extra, ..] => Err(StrataError::parse(
            extra.line,
            format!("Trailing input after node: {}", text),
        )),
    }
}

/// Parse one N-Quads line.
///
/// Returns `Ok(None)` for blank lines and comments.
pub fn parse_nquads_line(line: &str, line_no: usize) -> Result<Option<Statement>, StrataError> {
    let tokens = tokenize(line, line_no)?;
    if tokens.is_empty() {
        return Ok(None);
    }

    let Some((last, terms)) = tokens.split_last() else {
        return Ok(None);
    };
    if last.token != Token::Punct('.') {
        return Err(StrataError::parse(line_no, "Statement must end with '.'"));
    }

    let mut nodes = Vec::with_capacity(4);
    for term in terms {
        let node = term.token.as_node().ok_or_else(|| {
            StrataError::parse(line_no, format!("Unexpected token {:?}", term.token))
        })?;
        nodes.push(node);
    }

    let statement = match nodes.as_slice() {
        [s, p, o] => Statement::new(s.clone(), p.clone(), o.clone()),
        [s, p, o, g] => Statement::with_context(s.clone(), p.clone(), o.clone(), g.clone()),
        _ => {
            return Err(StrataError::parse(
                line_no,
                format!("Expected 3 or 4 terms, found {}", nodes.len()),
            ));
        }
    };

    if !statement.is_valid() {
        return Err(StrataError::parse(
            line_no,
            format!("Invalid statement: {}", statement),
        ));
    }
    Ok(Some(statement))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nodes() {
        assert_eq!(node_to_string(&Node::resource("http://a")), "<http://a>");
        assert_eq!(node_to_string(&Node::blank("b1")), "_:b1");
        assert_eq!(node_to_string(&Node::literal("x")), "\"x\"");
        assert_eq!(node_to_string(&Node::lang_literal("x", "en")), "\"x\"@en");
        assert_eq!(
            node_to_string(&Node::typed_literal("1", "http://dt")),
            "\"1\"^^<http://dt>"
        );
    }

    #[test]
    fn test_iri_escapes() {
        let node = Node::resource("http://ex/a b>c");
        assert_eq!(node_to_string(&node), "<http://ex/a\\u0020b\\u003Ec>");
        assert_eq!(parse_node(&node_to_string(&node)).expect("parse"), node);
        assert_eq!(
            parse_node("<http://ex/\\U0001F600>").expect("parse"),
            Node::resource("http://ex/\u{1F600}")
        );
        assert!(parse_node("<http://ex/\\n>").is_err());
    }

    #[test]
    fn test_blank_labels_escape_non_word_characters() {
        let node = Node::blank("a b.c");
        assert_eq!(node_to_string(&node), "_:a\\u0020b\\u002Ec");
        assert_eq!(parse_node(&node_to_string(&node)).expect("parse"), node);
    }

    #[test]
    fn test_escaped_terms_survive_nquads_lines() {
        let s = Statement::with_context(
            Node::resource("http://ex/a>b"),
            Node::resource("http://ex/p"),
            Node::typed_literal("1", "http://ex/dt type"),
            Node::blank("g 1"),
        );
        let line = statement_to_string(&s);
        assert_eq!(parse_nquads_line(&line, 1).expect("parse"), Some(s));
    }

    #[test]
    fn test_literal_escapes_survive_parsing() {
        let node = Node::literal("line \"one\"\n\tback\\slash");
        let text = node_to_string(&node);
        assert_eq!(parse_node(&text).expect("parse"), node);
    }

    #[test]
    fn test_unicode_escape() {
        let node = parse_node("\"caf\\u00E9\"").expect("parse");
        assert_eq!(node, Node::literal("café"));
    }

    #[test]
    fn test_parse_node_rejects_garbage() {
        assert!(parse_node("").is_err());
        assert!(parse_node("<http://a> <http://b>").is_err());
        assert!(parse_node("?x").is_err());
        assert!(parse_node("<http://a").is_err());
    }

    #[test]
    fn test_nquads_line_with_and_without_context() {
        let triple = parse_nquads_line("<http://s> <http://p> \"o\" .", 1)
            .expect("parse")
            .expect("statement");
        assert!(triple.context.is_empty());

        let quad = parse_nquads_line("<http://s> <http://p> _:o <http://g> . # trailing", 1)
            .expect("parse")
            .expect("statement");
        assert_eq!(quad.context, Node::resource("http://g"));
        assert_eq!(quad.object, Node::blank("o"));
    }

    #[test]
    fn test_nquads_skips_comments_and_blank_lines() {
        assert!(parse_nquads_line("   ", 1).expect("parse").is_none());
        assert!(parse_nquads_line("# comment", 1).expect("parse").is_none());
    }

    #[test]
    fn test_nquads_rejects_invalid_statement() {
        let err = parse_nquads_line("\"lit\" <http://p> <http://o> .", 7)
            .expect_err("literal subject");
        assert_eq!(
            err,
            StrataError::Parse {
                line: 7,
                message: "Invalid statement: \"lit\" <http://p> <http://o> .".to_string()
            }
        );
        assert!(parse_nquads_line("<http://s> <http://p> <http://o>", 1).is_err());
    }

    #[test]
    fn test_statement_line_round_trip() {
        let s = Statement::with_context(
            Node::resource("http://s"),
            Node::resource("http://p"),
            Node::lang_literal("hello", "en"),
            Node::blank("g"),
        );
        let line = statement_to_string(&s);
        assert_eq!(parse_nquads_line(&line, 1).expect("parse"), Some(s));
    }

    #[test]
    fn test_tokenize_rule_syntax() {
        let tokens = tokenize("[r1: (?a rdf:type ?b) -> (?b <http://x> ?a)]", 1).expect("lex");
        let kinds: Vec<&Token> = tokens.iter().map(|t| &t.token).collect();
        assert_eq!(kinds[0], &Token::Punct('['));
        assert_eq!(
            kinds[1],
            &Token::Prefixed {
                prefix: "r1".to_string(),
                local: String::new()
            }
        );
        assert!(kinds.contains(&&Token::Arrow));
        assert!(kinds.contains(&&Token::Variable("a".to_string())));
    }

    #[test]
    fn test_line_numbers_advance() {
        let tokens = tokenize("<http://a>\n# c\n<http://b>", 10).expect("lex");
        assert_eq!(tokens[0].line, 10);
        assert_eq!(tokens[1].line, 12);
    }
}
