//! # Inference
//!
//! Forward-chaining rules over any `Model`.
//!
//! - `rule`: `Rule`, `RuleSet` and the built-in RDFS rules
//! - `parser`: the textual rule syntax
//! - `engine`: `InferenceEngine`, the `InferenceModel` decorator and its
//!   transaction

mod engine;
mod parser;
mod rule;

pub use engine::{InferenceEngine, InferenceModel, InferenceTransaction, ProvenanceEncoding};
pub use parser::RuleParser;
pub use rule::{Rule, RuleSet, StandardRuleSet};
