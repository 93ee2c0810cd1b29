//! Expression tree produced by the reader and walked by the evaluator.
//!
//! The main enum, [`Expr`], is a closed set of forms. Trees are immutable once
//! built: evaluation never changes a node, so the same tree can be shared
//! between threads and evaluated any number of times. The only interior state
//! is the parsed value cached inside [`NumberExpr`], which is written at most
//! once. Ergonomic helper functions such as [`sym`], [`num`] and [`list`] are
//! provided for building trees in tests.

use crate::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Numeric literal: the source text plus the lazily parsed float.
///
/// The text is only parsed on first evaluation, so a malformed literal is
/// reported when it runs, not when it is built.
#[derive(Debug, Clone)]
pub struct NumberExpr {
    literal: String,
    parsed: OnceLock<f64>,
}

impl NumberExpr {
    pub fn new(literal: impl Into<String>) -> Self {
        NumberExpr {
            literal: literal.into(),
            parsed: OnceLock::new(),
        }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Parsed value; the first successful parse is cached and reused.
    pub fn value(&self) -> Result<f64, Error> {
        if let Some(n) = self.parsed.get() {
            return Ok(*n);
        }

        let n = self
            .literal
            .parse::<f64>()
            .map_err(|source| Error::InvalidNumber {
                literal: self.literal.clone(),
                source,
            })?;
        Ok(*self.parsed.get_or_init(|| n))
    }

    pub(crate) fn is_cached(&self) -> bool {
        self.parsed.get().is_some()
    }
}

impl PartialEq for NumberExpr {
    fn eq(&self, other: &Self) -> bool {
        self.literal == other.literal
    }
}

/// Core expression type
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Top-level forms of one source unit, evaluated in order
    Module { name: String, exprs: Vec<Expr> },
    Number(NumberExpr),
    /// String literal, escapes already resolved
    String(String),
    /// Keyword name without the leading colon
    Keyword(String),
    /// Name, optionally with one `.member` segment
    Symbol(String),
    /// Quoted form; evaluates to the wrapped form itself
    Quote(Arc<Expr>),
    Vector(Vec<Expr>),
    /// Call form: head decides between macro call and ordinary call
    List(Vec<Expr>),
    /// Comment text, trimmed
    Comment(String),
}

impl Expr {
    pub fn module(name: impl Into<String>, exprs: Vec<Expr>) -> Self {
        Expr::Module {
            name: name.into(),
            exprs,
        }
    }

    pub fn number(literal: impl Into<String>) -> Self {
        Expr::Number(NumberExpr::new(literal))
    }

    pub fn quote(expr: Expr) -> Self {
        Expr::Quote(Arc::new(expr))
    }

    /// Short name of the form kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Module { .. } => "module",
            Expr::Number(_) => "number",
            Expr::String(_) => "string",
            Expr::Keyword(_) => "keyword",
            Expr::Symbol(_) => "symbol",
            Expr::Quote(_) => "quote",
            Expr::Vector(_) => "vector",
            Expr::List(_) => "list",
            Expr::Comment(_) => "comment",
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, exprs: &[Expr], sep: &str) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{expr}")?;
    }
    Ok(())
}

/// Bracketed sequence. A comment runs to the end of its line, so the next
/// element (or the closing bracket) starts on a new one.
fn write_seq(f: &mut fmt::Formatter<'_>, open: char, items: &[Expr], close: char) -> fmt::Result {
    write!(f, "{open}")?;
    let mut after_comment = false;
    for (i, item) in items.iter().enumerate() {
        if i > 0 && !after_comment {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
        after_comment = matches!(item, Expr::Comment(_));
        if after_comment {
            writeln!(f)?;
        }
    }
    write!(f, "{close}")
}

/// Quoted string literal in reader syntax.
///
/// The reader has no escape for a backslash itself, so text holding a
/// backslash followed by `n`, `t`, `r` or `"` prints as that escape and
/// reads back as the escaped character.
pub(crate) fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Module { exprs, .. } => write_joined(f, exprs, "\n"),
            Expr::Number(n) => write!(f, "{}", n.literal),
            Expr::String(s) => write_escaped(f, s),
            Expr::Keyword(k) => write!(f, ":{k}"),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Quote(expr) => write!(f, "'{expr}"),
            Expr::Vector(items) => write_seq(f, '[', items, ']'),
            Expr::List(items) => write_seq(f, '(', items, ')'),
            Expr::Comment(text) => write!(f, "; {text}"),
        }
    }
}

/// Helper for creating symbols - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::Symbol(name.as_ref().to_owned())
}

/// Helper for creating number literals from their source text
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn num<S: AsRef<str>>(literal: S) -> Expr {
    Expr::number(literal.as_ref())
}

/// Helper for creating call forms
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn list<const N: usize>(items: [Expr; N]) -> Expr {
    Expr::List(items.into())
}
