//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Settings;
use serde_json::json;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use strata_core::{
    Backend, BackendKind, InferenceModel, Model, Node, QueryLanguage, Statement, StoreConfig,
    StrataError, dump_to_bytes, export_nquads, import_nquads, load_from_bytes, parse_node,
    statement_to_string, statements_to_bytes,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

fn io_error(what: &str, path: &Path, e: std::io::Error) -> StrataError {
    match e.kind() {
        std::io::ErrorKind::NotFound => {
            StrataError::NotFound(format!("{} '{}'", what, path.display()))
        }
        _ => StrataError::BackendFailure(format!("{} '{}': {}", what, path.display(), e)),
    }
}

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), StrataError> {
    let metadata = std::fs::metadata(path).map_err(|e| io_error("Cannot read metadata of", path, e))?;

    if metadata.len() > max_size {
        return Err(StrataError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path and make sure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, StrataError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| io_error("Invalid file path", path, e))?;

    if !canonical.is_file() {
        return Err(StrataError::InvalidArgument(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve the parent of an output path, keeping the file name.
fn validate_output_path(path: &Path) -> Result<PathBuf, StrataError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent
        .canonicalize()
        .map_err(|e| io_error("Invalid output directory", parent, e))?;

    if !canonical_parent.is_dir() {
        return Err(StrataError::InvalidArgument(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| StrataError::InvalidArgument("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), StrataError> {
    let path = &settings.database;
    if path.exists() {
        if !force {
            return Err(StrataError::InvalidOperation(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path).map_err(|e| io_error("Cannot remove", path, e))?;
    }

    let store = open_store(settings)?;
    save_store(&store, settings)?;
    tracing::info!(backend = %settings.backend, path = %path.display(), "database initialized");
    println!("Initialized new {} database at {:?}", settings.backend, path);

    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status.
pub fn cmd_status(settings: &Settings, json_mode: bool) -> Result<(), StrataError> {
    let store = open_store(settings)?;
    let engine = settings.inference.engine()?;

    let statements = store.statement_count()?;
    let contexts = store.list_contexts()?.collect_all()?.len();
    let inference_graphs = engine.inference_graphs(&store)?.len();

    if json_mode {
        let output = json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend.to_string(),
            "statements": statements,
            "contexts": contexts,
            "inference_graphs": inference_graphs,
            "rules": engine.rules().len(),
            "encoding": engine.provenance_encoding().to_string(),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Strata Store Status");
    println!("===================");
    println!("Database: {:?}", settings.database);
    println!("Backend:  {}", settings.backend);
    println!();
    println!("Statements:       {}", statements);
    println!("Named graphs:     {}", contexts);
    println!("Inference graphs: {}", inference_graphs);
    println!("Rules:            {}", engine.rules().len());
    println!("Encoding:         {}", engine.provenance_encoding());

    Ok(())
}

// =============================================================================
// ADD / REMOVE COMMANDS
// =============================================================================

/// Add one statement.
pub fn cmd_add(
    settings: &Settings,
    json_mode: bool,
    terms: [&str; 3],
    context: Option<&str>,
    infer: bool,
) -> Result<(), StrataError> {
    let [subject, predicate, object] = terms;
    let statement = Statement::with_context(
        parse_node(subject)?,
        parse_node(predicate)?,
        parse_node(object)?,
        context.map(parse_node).transpose()?.unwrap_or(Node::Empty),
    );
    statement.ensure_valid()?;

    let store = open_store(settings)?;
    let added = with_model(settings, &store, infer, |model| {
        let present = model.contains_statement(&statement)?;
        model.add_statement(&statement)?;
        Ok(!present)
    })?;
    save_store(&store, settings)?;

    if json_mode {
        print_json(&json!({ "added": added, "statement": statement_to_string(&statement) }));
    } else if added {
        println!("Added: {}", statement_to_string(&statement));
    } else {
        println!("Already present: {}", statement_to_string(&statement));
    }
    Ok(())
}

/// Remove every statement matching a pattern.
pub fn cmd_remove(
    settings: &Settings,
    json_mode: bool,
    terms: [&str; 3],
    context: Option<&str>,
    infer: bool,
) -> Result<(), StrataError> {
    let [subject, predicate, object] = terms;
    let pattern = Statement::with_context(
        parse_term(Some(subject))?,
        parse_term(Some(predicate))?,
        parse_term(Some(object))?,
        parse_term(context)?,
    );

    let store = open_store(settings)?;
    let removed = with_model(settings, &store, infer, |model| {
        let matches = model.list_statements(&pattern)?.collect_all()?.len();
        model.remove_all_statements(&pattern)?;
        Ok(matches)
    })?;
    save_store(&store, settings)?;

    if json_mode {
        print_json(&json!({ "removed": removed }));
    } else {
        println!("Removed {} statement(s)", removed);
    }
    Ok(())
}

// =============================================================================
// LIST / CONTEXTS COMMANDS
// =============================================================================

/// List statements matching a pattern.
pub fn cmd_list(
    settings: &Settings,
    json_mode: bool,
    terms: [Option<&str>; 3],
    context: Option<&str>,
    limit: Option<usize>,
) -> Result<(), StrataError> {
    let [subject, predicate, object] = terms;
    let pattern = Statement::with_context(
        parse_term(subject)?,
        parse_term(predicate)?,
        parse_term(object)?,
        parse_term(context)?,
    );

    let store = open_store(settings)?;
    let mut statements = Vec::new();
    for statement in store.list_statements(&pattern)? {
        if limit.is_some_and(|limit| statements.len() >= limit) {
            break;
        }
        statements.push(statement?);
    }

    if json_mode {
        let output: Vec<serde_json::Value> = statements.iter().map(statement_json).collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    for statement in &statements {
        println!("{}", statement_to_string(statement));
    }
    Ok(())
}

/// List named graphs.
pub fn cmd_contexts(settings: &Settings, json_mode: bool) -> Result<(), StrataError> {
    let store = open_store(settings)?;
    let contexts = store.list_contexts()?.collect_all()?;

    if json_mode {
        let output: Vec<String> = contexts.iter().map(ToString::to_string).collect();
        print_json(&json!(output));
        return Ok(());
    }

    for context in &contexts {
        println!("{}", context);
    }
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Execute a query.
pub fn cmd_query(
    settings: &Settings,
    json_mode: bool,
    query: &str,
    language: &str,
) -> Result<(), StrataError> {
    let language: QueryLanguage = language.parse()?;
    let store = open_store(settings)?;
    let rows = store.execute_query(query, &language)?.collect_all()?;

    if json_mode {
        let output: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let bindings: serde_json::Map<String, serde_json::Value> = row
                    .iter()
                    .map(|(name, value)| (name.to_string(), json!(value.to_string())))
                    .collect();
                serde_json::Value::Object(bindings)
            })
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    for row in &rows {
        println!("{}", row);
    }
    println!("{} result(s)", rows.len());
    Ok(())
}

// =============================================================================
// IMPORT / EXPORT COMMANDS
// =============================================================================

/// Import statements.
pub fn cmd_import(
    settings: &Settings,
    json_mode: bool,
    input: &Path,
    format: &str,
    infer: bool,
) -> Result<(), StrataError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let store = open_store(settings)?;
    let imported = match format {
        "nquads" => {
            let file = std::fs::File::open(&validated_path)
                .map_err(|e| io_error("Cannot open", &validated_path, e))?;
            with_model(settings, &store, infer, |model| {
                import_nquads(model, BufReader::new(file))
            })?
        }
        "dump" => {
            let data = std::fs::read(&validated_path)
                .map_err(|e| io_error("Cannot read", &validated_path, e))?;
            with_model(settings, &store, infer, |model| load_from_bytes(model, &data))?
        }
        _ => {
            return Err(StrataError::InvalidArgument(format!(
                "Unknown format: {}. Use: nquads, dump",
                format
            )));
        }
    };
    save_store(&store, settings)?;

    if json_mode {
        print_json(&json!({ "imported": imported }));
    } else {
        println!("Imported {} statement(s) from {:?}", imported, validated_path);
    }
    Ok(())
}

/// Write every statement of `store` to `output`. Returns the number written.
pub fn export_store(store: &Backend, output: &Path, format: &str) -> Result<usize, StrataError> {
    match format {
        "nquads" => {
            let file = std::fs::File::create(output)
                .map_err(|e| io_error("Cannot create", output, e))?;
            export_nquads(store, &mut BufWriter::new(file))
        }
        "dump" => {
            let statements = store.list_all_statements()?.collect_all()?;
            let written = statements.len();
            let data = statements_to_bytes(statements)?;
            std::fs::write(output, &data).map_err(|e| io_error("Cannot write", output, e))?;
            Ok(written)
        }
        _ => Err(StrataError::InvalidArgument(format!(
            "Unknown format: {}. Use: nquads, dump",
            format
        ))),
    }
}

/// Export all statements.
pub fn cmd_export(
    settings: &Settings,
    json_mode: bool,
    output: &Path,
    format: &str,
) -> Result<(), StrataError> {
    let validated_output = validate_output_path(output)?;
    let store = open_store(settings)?;
    let exported = export_store(&store, &validated_output, format)?;

    if json_mode {
        print_json(&json!({ "exported": exported, "path": validated_output.to_string_lossy() }));
    } else {
        println!("Exported {} statement(s) to {:?}", exported, validated_output);
    }
    Ok(())
}

// =============================================================================
// INFERENCE COMMANDS
// =============================================================================

/// Run full inference.
pub fn cmd_infer(settings: &Settings, json_mode: bool) -> Result<(), StrataError> {
    let store = open_store(settings)?;
    let derived = {
        let mut model =
            InferenceModel::with_engine(Box::new(store.clone()), settings.inference.engine()?);
        model.perform_inference()?
    };
    save_store(&store, settings)?;
    tracing::info!(derived, "inference complete");

    if json_mode {
        print_json(&json!({ "derived": derived }));
    } else {
        println!("Derived {} statement(s)", derived);
    }
    Ok(())
}

/// Remove derived statements and provenance.
pub fn cmd_clear_inference(settings: &Settings, json_mode: bool) -> Result<(), StrataError> {
    let store = open_store(settings)?;
    let before = store.statement_count()?;
    {
        let mut model =
            InferenceModel::with_engine(Box::new(store.clone()), settings.inference.engine()?);
        model.clear_inference()?;
    }
    save_store(&store, settings)?;
    let removed = before.saturating_sub(store.statement_count()?);

    if json_mode {
        print_json(&json!({ "removed": removed }));
    } else {
        println!("Removed {} inference statement(s)", removed);
    }
    Ok(())
}

/// Show the configured rules.
pub fn cmd_rules(settings: &Settings, json_mode: bool) -> Result<(), StrataError> {
    let rules = settings.inference.rule_set()?;

    if json_mode {
        let output: Vec<serde_json::Value> = rules
            .iter()
            .map(|rule| json!({ "name": rule.name(), "rule": rule.to_string() }))
            .collect();
        print_json(&serde_json::Value::Array(output));
        return Ok(());
    }

    for rule in rules.iter() {
        println!("{}", rule);
    }
    println!("{} rule(s)", rules.len());
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured store.
///
/// The memory backend is loaded from a binary dump at the database path,
/// if one exists.
pub fn open_store(settings: &Settings) -> Result<Backend, StrataError> {
    match settings.backend {
        BackendKind::Redb => StoreConfig::redb(&settings.database).open(),
        BackendKind::Memory => {
            let mut store = StoreConfig::memory().open()?;
            if settings.database.exists() {
                validate_file_size(&settings.database, MAX_IMPORT_FILE_SIZE)?;
                let data = std::fs::read(&settings.database)
                    .map_err(|e| io_error("Cannot read database", &settings.database, e))?;
                load_from_bytes(&mut store, &data)?;
            }
            Ok(store)
        }
    }
}

/// Persist the store. Redb commits on every write; the memory backend
/// writes its dump file.
pub fn save_store(store: &Backend, settings: &Settings) -> Result<(), StrataError> {
    if store.is_persistent() {
        return Ok(());
    }
    let data = dump_to_bytes(store)?;
    std::fs::write(&settings.database, &data)
        .map_err(|e| io_error("Cannot write database", &settings.database, e))
}

/// Run `f` against the store, through an inference layer if requested.
fn with_model<T>(
    settings: &Settings,
    store: &Backend,
    infer: bool,
    f: impl FnOnce(&mut dyn Model) -> Result<T, StrataError>,
) -> Result<T, StrataError> {
    if infer {
        let mut model =
            InferenceModel::with_engine(Box::new(store.clone()), settings.inference.engine()?);
        f(&mut model)
    } else {
        let mut model = store.clone();
        f(&mut model)
    }
}

/// A term argument; absent or `*` is a wildcard.
fn parse_term(text: Option<&str>) -> Result<Node, StrataError> {
    match text {
        None | Some("*") => Ok(Node::Empty),
        Some(text) => parse_node(text),
    }
}

fn statement_json(statement: &Statement) -> serde_json::Value {
    let context = if statement.context.is_empty() {
        serde_json::Value::Null
    } else {
        json!(statement.context.to_string())
    };
    json!({
        "subject": statement.subject.to_string(),
        "predicate": statement.predicate.to_string(),
        "object": statement.object.to_string(),
        "context": context,
    })
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
