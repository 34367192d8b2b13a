//! Parley Evidence - claim verification over attested records
//!
//! A free-text claim plus an agent's records go in; zero or more boolean
//! evidence expressions come out, each already evaluated against the
//! records.
//!
//! Expression text comes from the oracle and is untrusted. It is parsed
//! into a closed grammar ([`ast::Expr`]) and run by a small interpreter
//! ([`eval`]) that can only read record fields. Expressions that fail to
//! parse, reference a missing record or field, or fail to evaluate are
//! dropped one by one; the rest of the evidence set stays usable.

pub mod ast;
pub mod eval;
pub mod filter;
pub mod lexer;
pub mod parser;
pub mod prompt;
pub mod verifier;

pub use ast::Expr;
pub use eval::{evaluate, validate, Value};
pub use filter::{is_aspirational, verifiable_portion};
pub use parser::parse_expression;
pub use verifier::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    /// References an out-of-range record or an absent field
    #[error("Invalid evidence expression: {message}")]
    InvalidEvidenceExpression { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Evaluation error: {message}")]
    Eval { message: String },

    #[error("Oracle error: {0}")]
    Oracle(#[from] parley_llm::LLMError),
}

pub type Result<T> = std::result::Result<T, EvidenceError>;
