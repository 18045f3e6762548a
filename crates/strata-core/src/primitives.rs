//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Strata core.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Anything a caller may tune lives on the owning type as a setter instead.

/// Magic bytes for the Strata binary dump header.
///
/// - File Header = Magic Bytes ("STRA") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"STRA";

/// Current dump format version.
///
/// Increment this when making breaking changes to the dump format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum dump payload accepted by the decoder (500 MB).
pub const MAX_DUMP_SIZE: usize = 500 * 1024 * 1024;

/// Hard bound on forward-chaining depth.
///
/// A statement inferred from a trigger of depth `d` has depth `d + 1`.
/// Triggers deeper than this bound are dropped with a warning, so rule sets
/// that keep minting new terms still terminate.
pub const MAX_INFERENCE_DEPTH: usize = 64;

/// Maximum number of patterns in a rule antecedent or a pattern query.
///
/// Joins are nested loops; this keeps them computationally bounded.
pub const MAX_JOIN_PATTERNS: usize = 16;

/// Scheme and authority of generated inference graph URIs.
///
/// Each graph is this prefix followed by a random UUID.
pub const INFERENCE_GRAPH_PREFIX: &str = "inference://localhost#";

/// Number of statements fetched per read transaction by lazy redb cursors.
pub const REDB_FETCH_CHUNK: usize = 256;

/// Default coalescing window of the signal-cache decorator, in milliseconds.
pub const DEFAULT_SIGNAL_CACHE_MS: u64 = 50;

/// Prefix of blank node identifiers minted by the built-in stores.
pub const BLANK_NODE_PREFIX: &str = "b";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes() {
        assert_eq!(MAGIC_BYTES, b"STRA");
    }

    #[test]
    fn test_bounds_are_positive() {
        assert!(MAX_INFERENCE_DEPTH > 0);
        assert!(MAX_JOIN_PATTERNS > 1);
        assert!(REDB_FETCH_CHUNK > 0);
    }

    #[test]
    fn test_graph_prefix_is_uri() {
        assert!(INFERENCE_GRAPH_PREFIX.ends_with('#'));
    }
}
