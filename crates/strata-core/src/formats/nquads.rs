//! # N-Quads
//!
//! Line-based text interchange. One statement per line; the default graph
//! omits the fourth term.

use crate::model::Model;
use crate::term::{parse_nquads_line, statement_to_string};
use crate::types::{Statement, StrataError};
use std::io::{BufRead, Write};

fn io_error(e: std::io::Error) -> StrataError {
    StrataError::SerializationError(format!("I/O error: {}", e))
}

/// Write `statements` as N-Quads. Returns the number written.
pub fn write_nquads<W, I>(writer: &mut W, statements: I) -> Result<usize, StrataError>
where
    W: Write,
    I: IntoIterator<Item = Result<Statement, StrataError>>,
{
    let mut count = 0usize;
    for statement in statements {
        writeln!(writer, "{}", statement_to_string(&statement?)).map_err(io_error)?;
        count += 1;
    }
    writer.flush().map_err(io_error)?;
    Ok(count)
}

/// Parse N-Quads from `reader`. Stops at the first malformed line.
pub fn read_nquads<R: BufRead>(reader: R) -> Result<Vec<Statement>, StrataError> {
    let mut statements = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error)?;
        if let Some(statement) = parse_nquads_line(&line, index + 1)? {
            statements.push(statement);
        }
    }
    Ok(statements)
}

/// Write every statement of `model` as N-Quads.
pub fn export_nquads<M, W>(model: &M, writer: &mut W) -> Result<usize, StrataError>
where
    M: Model + ?Sized,
    W: Write,
{
    let count = write_nquads(writer, model.list_all_statements()?)?;
    tracing::debug!(statements = count, "n-quads exported");
    Ok(count)
}

/// Parse N-Quads and add them to `model`. Nothing is added on a parse error.
pub fn import_nquads<M, R>(model: &mut M, reader: R) -> Result<usize, StrataError>
where
    M: Model + ?Sized,
    R: BufRead,
{
    let statements = read_nquads(reader)?;
    model.add_statements(&statements)?;
    tracing::debug!(statements = statements.len(), "n-quads imported");
    Ok(statements.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryStore;
    use crate::types::{ErrorKind, Node};

    const DOC: &str = "# people\n\
        <http://ex/a> <http://ex/name> \"Ann \\\"A\\\"\"@en .\n\
        \n\
        _:b1 <http://ex/age> \"42\"^^<http://www.w3.org/2001/XMLSchema#integer> <http://ex/g> .\n";

    #[test]
    fn reads_statements_and_skips_comments() {
        let statements = read_nquads(DOC.as_bytes()).expect("parse");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].object, Node::lang_literal("Ann \"A\"", "en"));
        assert_eq!(statements[1].context, Node::resource("http://ex/g"));
    }

    #[test]
    fn export_then_import_preserves_store() {
        let mut source = MemoryStore::new();
        import_nquads(&mut source, DOC.as_bytes()).expect("import");

        let mut out = Vec::new();
        assert_eq!(export_nquads(&source, &mut out).expect("export"), 2);

        let mut target = MemoryStore::new();
        import_nquads(&mut target, out.as_slice()).expect("reimport");
        assert_eq!(target.snapshot(), source.snapshot());
    }

    #[test]
    fn reports_line_of_bad_input() {
        let text = "<http://a> <http://p> <http://b> .\n<http://a> <http://p> .\n";
        let err = read_nquads(text.as_bytes()).expect_err("bad line");
        assert_eq!(err.kind(), ErrorKind::Parsing);
        assert!(matches!(err, StrataError::Parse { line: 2, .. }));
    }
}
