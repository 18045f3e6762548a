//! # Vocabulary
//!
//! URIs the core writes into the store itself.
//!
//! The SIL namespace (`http://soprano.org/sil#`) is kept verbatim so that
//! provenance written by other implementations stays readable.

use crate::types::Node;

/// The RDF syntax namespace.
pub mod rdf {
    use crate::types::Node;

    pub const NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const STATEMENT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Statement";
    pub const SUBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#subject";
    pub const PREDICATE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#predicate";
    pub const OBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#object";
    pub const PROPERTY: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property";

    #[must_use]
    pub fn type_() -> Node {
        Node::resource(TYPE)
    }

    #[must_use]
    pub fn statement() -> Node {
        Node::resource(STATEMENT)
    }

    #[must_use]
    pub fn subject() -> Node {
        Node::resource(SUBJECT)
    }

    #[must_use]
    pub fn predicate() -> Node {
        Node::resource(PREDICATE)
    }

    #[must_use]
    pub fn object() -> Node {
        Node::resource(OBJECT)
    }
}

/// The RDF Schema namespace, used by the standard rule set.
pub mod rdfs {
    pub const NAMESPACE: &str = "http://www.w3.org/2000/01/rdf-schema#";

    pub const RESOURCE: &str = "http://www.w3.org/2000/01/rdf-schema#Resource";
    pub const CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
    pub const SUB_CLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
    pub const SUB_PROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
    pub const DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
    pub const RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
}

/// The XML Schema datatype namespace.
pub mod xsd {
    pub const NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
}

/// The inference provenance namespace.
pub mod sil {
    use crate::types::Node;

    pub const NAMESPACE: &str = "http://soprano.org/sil#";

    /// Named graph holding every provenance record.
    pub const INFERENCE_METADATA: &str = "http://soprano.org/sil#InferenceMetaData";
    /// Class of graphs created by the engine.
    pub const INFERENCE_GRAPH: &str = "http://soprano.org/sil#InferenceGraph";
    /// Links an inference graph to one of its justifying statements.
    pub const SOURCE_STATEMENT: &str = "http://soprano.org/sil#sourceStatement";
    /// Context of a reified source statement.
    pub const CONTEXT: &str = "http://soprano.org/sil#context";

    #[must_use]
    pub fn inference_metadata() -> Node {
        Node::resource(INFERENCE_METADATA)
    }

    #[must_use]
    pub fn inference_graph() -> Node {
        Node::resource(INFERENCE_GRAPH)
    }

    #[must_use]
    pub fn source_statement() -> Node {
        Node::resource(SOURCE_STATEMENT)
    }

    #[must_use]
    pub fn context() -> Node {
        Node::resource(CONTEXT)
    }
}

/// Well-known namespace prefixes, used by the rule parser and the CLI.
pub const WELL_KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("rdf", rdf::NAMESPACE),
    ("rdfs", rdfs::NAMESPACE),
    ("xsd", xsd::NAMESPACE),
    ("sil", sil::NAMESPACE),
];

/// Check if `node` is the provenance metadata graph.
#[must_use]
pub fn is_metadata_graph(node: &Node) -> bool {
    node.uri() == Some(sil::INFERENCE_METADATA)
}
