//! # Property-Based Tests
//!
//! These tests ensure set semantics, determinism and chain transparency.

use proptest::collection::vec;
use proptest::prelude::*;
use strata_core::{
    FilterModel, MemoryStore, Model, Node, Statement, dump_to_bytes, export_nquads, import_nquads,
    parse_node,
};

/// Build a statement from small indices so that collisions are frequent.
fn quad(s: u8, p: u8, o: u8, g: u8, literal: bool) -> Statement {
    let object = if literal {
        Node::literal(format!("value \"{}\"\n", o))
    } else {
        Node::resource(format!("http://example.org/o{}", o))
    };
    let context = if g == 0 {
        Node::Empty
    } else {
        Node::resource(format!("http://example.org/g{}", g))
    };
    Statement::with_context(
        Node::resource(format!("http://example.org/s{}", s)),
        Node::resource(format!("http://example.org/p{}", p)),
        object,
        context,
    )
}

fn quads() -> impl Strategy<Value = Vec<Statement>> {
    vec(
        (0u8..6, 0u8..3, 0u8..6, 0u8..3, any::<bool>())
            .prop_map(|(s, p, o, g, literal)| quad(s, p, o, g, literal)),
        1..40,
    )
}

/// Any ground node, with arbitrary text in IRIs, labels and literals.
fn ground_node() -> impl Strategy<Value = Node> {
    prop_oneof![
        any::<String>().prop_map(|s| Node::resource(format!("http://example.org/{}", s))),
        any::<String>()
            .prop_filter("blank labels are non-empty", |s| !s.is_empty())
            .prop_map(Node::blank),
        any::<String>().prop_map(Node::literal),
        (any::<String>(), "[a-z]{2}(-[A-Z]{2})?")
            .prop_map(|(lexical, lang)| Node::lang_literal(lexical, lang)),
        (any::<String>(), any::<String>()).prop_map(|(lexical, dt)| {
            Node::typed_literal(lexical, format!("http://example.org/dt/{}", dt))
        }),
    ]
}

fn sorted(model: &dyn Model) -> Vec<Statement> {
    let mut all = model
        .list_all_statements()
        .expect("list")
        .collect_all()
        .expect("collect");
    all.sort();
    all
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Adding the same statements twice leaves the store unchanged.
    #[test]
    fn add_is_idempotent(statements in quads()) {
        let mut store = MemoryStore::new();
        store.add_statements(&statements).expect("add");
        let once = store.snapshot();
        store.add_statements(&statements).expect("add again");
        prop_assert_eq!(store.snapshot(), once);
    }

    /// Count equals the number of distinct statements.
    #[test]
    fn count_matches_distinct_statements(statements in quads()) {
        let mut store = MemoryStore::new();
        store.add_statements(&statements).expect("add");
        let distinct: std::collections::BTreeSet<_> = statements.iter().cloned().collect();
        prop_assert_eq!(store.statement_count().expect("count"), distinct.len() as i64);
    }

    /// Rendering a node and parsing the text gives the node back.
    #[test]
    fn rendered_nodes_parse_back(node in ground_node()) {
        let text = node.to_string();
        prop_assert_eq!(parse_node(&text).expect("parse rendered node"), node);
    }

    /// Insertion order does not change the dump.
    #[test]
    fn dump_is_order_independent(statements in quads()) {
        let mut forward = MemoryStore::new();
        let mut backward = MemoryStore::new();
        for s in &statements {
            forward.add_statement(s).expect("add");
        }
        for s in statements.iter().rev() {
            backward.add_statement(s).expect("add");
        }
        prop_assert_eq!(dump_to_bytes(&forward).expect("dump"), dump_to_bytes(&backward).expect("dump"));
    }

    /// N-Quads export followed by import reproduces the store.
    #[test]
    fn nquads_preserve_content(statements in quads()) {
        let mut source = MemoryStore::new();
        source.add_statements(&statements).expect("add");
        let mut text = Vec::new();
        export_nquads(&source, &mut text).expect("export");

        let mut target = MemoryStore::new();
        import_nquads(&mut target, text.as_slice()).expect("import");
        prop_assert_eq!(target.snapshot(), source.snapshot());
    }

    /// A chain of pass-through decorators is indistinguishable from the store.
    #[test]
    fn filter_chain_is_transparent(
        statements in quads(),
        removals in vec(0usize..40, 0..10),
        depth in 1usize..5,
    ) {
        let mut bare = MemoryStore::new();
        let mut chained: Box<dyn Model> = Box::new(MemoryStore::new());
        for _ in 0..depth {
            chained = Box::new(FilterModel::new(chained));
        }

        bare.add_statements(&statements).expect("add");
        chained.add_statements(&statements).expect("add");
        for index in removals {
            if let Some(s) = statements.get(index) {
                bare.remove_statement(s).expect("remove");
                chained.remove_statement(s).expect("remove");
            }
        }

        prop_assert_eq!(sorted(&bare), sorted(chained.as_ref()));
        prop_assert_eq!(bare.statement_count().expect("count"), chained.statement_count().expect("count"));
    }

    /// Removing by pattern leaves exactly the non-matching statements.
    #[test]
    fn pattern_removal_is_exact(statements in quads(), subject in 0u8..6) {
        let mut store = MemoryStore::new();
        store.add_statements(&statements).expect("add");
        let pattern = Statement::new(
            Node::resource(format!("http://example.org/s{}", subject)),
            Node::Empty,
            Node::Empty,
        );
        let expected: Vec<Statement> = store
            .snapshot()
            .into_iter()
            .filter(|s| !s.matches(&pattern))
            .collect();
        store.remove_all_statements(&pattern).expect("remove");
        prop_assert_eq!(store.snapshot(), expected);
    }
}
