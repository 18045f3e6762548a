//! # Formats
//!
//! Whole-model serialization: the binary dump and N-Quads text.

mod nquads;
mod persistence;

pub use nquads::{export_nquads, import_nquads, read_nquads, write_nquads};
pub use persistence::{
    PersistenceHeader, dump_to_bytes, load_from_bytes, statements_from_bytes, statements_to_bytes,
};
