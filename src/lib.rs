//! Parens - embeddable LISP-style expression runtime
//!
//! This crate evaluates trees of parsed expressions against a chain of immutable
//! lexical scopes and produces host values. Scopes are persistent: binding a name
//! returns a new scope that shares all unaffected structure with the old one, so
//! every snapshot stays valid and can be read from any number of threads.
//!
//! ```scheme
//! ;; surface syntax
//! (+ 1 2.5)              ; ordinary call, arguments evaluated first
//! (let [x 5] (* x x))    ; macro call, receives unevaluated forms
//! '(1 2)                 ; quoted form, returned as data
//! sample.val             ; member access on a host value
//! :keyword "string" [1 2 3]
//! ```
//!
//! ## Evaluation model
//!
//! - A list whose head evaluates to a macro receives its tail as raw forms plus
//!   the current scope
//! - Any other list head is called with its evaluated arguments, arity and types
//!   are checked by the callee
//! - `name.member` resolves `name` in scope, then looks the member up on the host
//!   value (field before method)
//! - Evaluation is fail-fast: the first error aborts the whole form
//!
//! ## Modules
//!
//! - `pvector`: persistent 32-way trie vector with an append buffer
//! - `pscope`: persistent hash map whose bucket array is a `pvector`
//! - `scope`: the environment chain built on `pscope`
//! - `ast`: expression tree
//! - `value`: runtime values and the host object interface
//! - `evaluator`: evaluation rules and the builtin calling convention
//! - `reader`: S-expression text to expression tree (feature `reader`)
//! - `stdlib`: standard macros and functions

use std::fmt;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum evaluation depth to prevent stack overflow in recursive evaluation
/// Set higher than parse depth to allow for nested function applications
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed expressions)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the runtime
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),

    #[error("invalid member access symbol '{0}': must be of format <parent>.<member>")]
    InvalidMemberAccess(String),

    #[error("name '{0}' not found")]
    UnboundVariable(String),

    #[error("member '{member}' not found on '{target}'")]
    MemberNotFound { target: String, member: String },

    #[error("cannot apply non-function: {0}")]
    NotCallable(String),

    #[error("ArityError: function expected {expected} arguments but got {got}")]
    ArityError { expected: usize, got: usize },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("invalid number literal '{literal}': {source}")]
    InvalidNumber {
        literal: String,
        source: std::num::ParseFloatError,
    },

    #[error("EvaluationError: {0}")]
    EvalError(String),
}

impl Error {
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError { expected, got }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

pub mod ast;
pub mod evaluator;
pub mod pscope;
pub mod pvector;
pub mod scope;
pub mod stdlib;
pub mod value;

#[cfg(feature = "reader")]
pub mod reader;

pub use ast::Expr;
pub use evaluator::{eval, unquote_eval};
pub use scope::Scope;
pub use value::{HostObject, Value};
