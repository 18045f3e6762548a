//! Integration tests for the CLI commands and argument parsing.

use clap::Parser;
use std::path::Path;
use strata::cli::{
    Cli, Commands, cmd_add, cmd_clear_inference, cmd_export, cmd_import, cmd_infer, cmd_init,
    cmd_remove, export_store, open_store,
};
use strata::config::{InferenceSection, Settings};
use strata_core::{BackendKind, Model, Node, Statement, StrataError};
use tempfile::TempDir;

const TYPE: &str = "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>";
const SUB_CLASS_OF: &str = "<http://www.w3.org/2000/01/rdf-schema#subClassOf>";

fn settings(dir: &Path, backend: BackendKind) -> Settings {
    Settings {
        database: dir.join("store.db"),
        backend,
        inference: InferenceSection::default(),
    }
}

fn both(dir: &TempDir) -> [Settings; 2] {
    let redb = settings(dir.path(), BackendKind::Redb);
    let mut memory = settings(dir.path(), BackendKind::Memory);
    memory.database = dir.path().join("store.dump");
    [redb, memory]
}

fn count(settings: &Settings) -> i64 {
    open_store(settings)
        .expect("open")
        .statement_count()
        .expect("count")
}

fn has(settings: &Settings, s: &str, p: &str, o: &str) -> bool {
    let store = open_store(settings).expect("open");
    store
        .contains_any_statement(&Statement::new(
            Node::resource(s),
            Node::resource(p),
            Node::resource(o),
        ))
        .expect("contains")
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn parses_global_flags_and_subcommand() {
    let cli = Cli::try_parse_from([
        "strata",
        "--backend",
        "memory",
        "-D",
        "data.db",
        "--json-mode",
        "add",
        "<http://ex/a>",
        "<http://ex/p>",
        "\"v\"",
        "-g",
        "<http://ex/g>",
        "--infer",
    ])
    .expect("parse");

    assert_eq!(cli.backend.as_deref(), Some("memory"));
    assert!(cli.json_mode);
    match cli.command {
        Some(Commands::Add { object, context, infer, .. }) => {
            assert_eq!(object, "\"v\"");
            assert_eq!(context.as_deref(), Some("<http://ex/g>"));
            assert!(infer);
        }
        other => unreachable!("unexpected command {:?}", other),
    }
}

#[test]
fn no_subcommand_is_accepted() {
    let cli = Cli::try_parse_from(["strata", "-q"]).expect("parse");
    assert!(cli.command.is_none());
    assert!(cli.quiet);
}

// =============================================================================
// STORE COMMANDS
// =============================================================================

#[test]
fn add_and_remove_persist_across_invocations() {
    let dir = tempfile::tempdir().expect("temp dir");
    for settings in both(&dir) {
        cmd_init(&settings, false).expect("init");
        cmd_add(&settings, false, ["<http://ex/a>", "<http://ex/p>", "<http://ex/b>"], None, false)
            .expect("add");
        cmd_add(&settings, true, ["<http://ex/a>", "<http://ex/p>", "<http://ex/b>"], None, false)
            .expect("add twice");
        assert_eq!(count(&settings), 1, "{:?}", settings.backend);

        cmd_remove(&settings, false, ["<http://ex/a>", "*", "*"], None, false).expect("remove");
        assert_eq!(count(&settings), 0);
    }
}

#[test]
fn init_refuses_existing_database_without_force() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = settings(dir.path(), BackendKind::Memory);
    cmd_init(&settings, false).expect("init");
    cmd_add(&settings, false, ["<http://ex/a>", "<http://ex/p>", "<http://ex/b>"], None, false)
        .expect("add");

    let err = cmd_init(&settings, false).expect_err("exists");
    assert!(matches!(err, StrataError::InvalidOperation(_)));

    cmd_init(&settings, true).expect("force");
    assert_eq!(count(&settings), 0);
}

#[test]
fn invalid_terms_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = settings(dir.path(), BackendKind::Memory);
    let err = cmd_add(&settings, false, ["\"lit\"", "<http://ex/p>", "<http://ex/b>"], None, false)
        .expect_err("literal subject");
    assert!(matches!(err, StrataError::InvalidArgument(_)));

    let err = cmd_add(&settings, false, ["<http://ex/a>", "<http://ex/p>", "<oops"], None, false)
        .expect_err("unterminated iri");
    assert!(matches!(err, StrataError::Parse { .. }));
}

// =============================================================================
// INFERENCE COMMANDS
// =============================================================================

#[test]
fn add_with_inference_derives_and_remove_retracts() {
    let dir = tempfile::tempdir().expect("temp dir");
    for settings in both(&dir) {
        cmd_add(&settings, false, ["<http://ex/Cat>", SUB_CLASS_OF, "<http://ex/Animal>"], None, true)
            .expect("schema");
        cmd_add(&settings, false, ["<http://ex/tom>", TYPE, "<http://ex/Cat>"], None, true)
            .expect("instance");
        assert!(has(
            &settings,
            "http://ex/tom",
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#type",
            "http://ex/Animal"
        ));

        cmd_remove(&settings, false, ["<http://ex/tom>", TYPE, "<http://ex/Cat>"], None, true)
            .expect("remove");
        assert!(!has(
            &settings,
            "http://ex/tom",
            "http://www.w3.org/1999/02/22-rdf-syntax-ns#type",
            "http://ex/Animal"
        ));
        assert_eq!(count(&settings), 1);
    }
}

#[test]
fn infer_and_clear_inference_round_trip() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = settings(dir.path(), BackendKind::Redb);
    cmd_add(&settings, false, ["<http://ex/Cat>", SUB_CLASS_OF, "<http://ex/Animal>"], None, false)
        .expect("schema");
    cmd_add(&settings, false, ["<http://ex/tom>", TYPE, "<http://ex/Cat>"], None, false)
        .expect("instance");
    assert_eq!(count(&settings), 2);

    cmd_infer(&settings, false).expect("infer");
    assert!(count(&settings) > 2);

    cmd_clear_inference(&settings, true).expect("clear");
    assert_eq!(count(&settings), 2);
}

// =============================================================================
// IMPORT / EXPORT
// =============================================================================

#[test]
fn export_then_import_between_backends() {
    let dir = tempfile::tempdir().expect("temp dir");
    let [redb, memory] = both(&dir);
    cmd_add(&redb, false, ["<http://ex/a>", "<http://ex/name>", "\"Ann\"@en"], None, false)
        .expect("add");
    cmd_add(&redb, false, ["_:b1", "<http://ex/p>", "<http://ex/b>"], Some("<http://ex/g>"), false)
        .expect("add");

    for format in ["nquads", "dump"] {
        let file = dir.path().join(format!("export.{}", format));
        cmd_export(&redb, false, &file, format).expect("export");

        let target = Settings {
            database: dir.path().join(format!("target-{}.dump", format)),
            ..memory.clone()
        };
        cmd_import(&target, false, &file, format, false).expect("import");
        assert_eq!(count(&target), 2, "{}", format);
    }

    let err = cmd_export(&redb, false, &dir.path().join("x.ttl"), "turtle").expect_err("format");
    assert!(matches!(err, StrataError::InvalidArgument(_)));
}

#[test]
fn export_reports_statements_written() {
    let dir = tempfile::tempdir().expect("temp dir");
    for settings in both(&dir) {
        cmd_add(&settings, false, ["<http://ex/a>", "<http://ex/p>", "<http://ex/b>"], None, false)
            .expect("add");
        cmd_add(&settings, false, ["<http://ex/a>", "<http://ex/p>", "\"v\""], None, false)
            .expect("add");
        let store = open_store(&settings).expect("open");
        for format in ["dump", "nquads"] {
            let file = dir.path().join(format!("{:?}.{}", settings.backend, format));
            assert_eq!(export_store(&store, &file, format).expect("export"), 2, "{}", format);
        }
    }
}

#[test]
fn import_of_missing_file_is_not_found() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = settings(dir.path(), BackendKind::Memory);
    let err = cmd_import(&settings, false, &dir.path().join("missing.nq"), "nquads", false)
        .expect_err("missing");
    assert!(matches!(err, StrataError::NotFound(_)));
}
