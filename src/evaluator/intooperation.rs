//! Typed calling convention for builtins.
//!
//! The evaluator only knows the erased [`OperationFn`]: a function from the
//! evaluated argument vector to a result. The adapters here let a builtin be
//! written as a plain Rust function instead:
//!
//! ```ignore
//! fn halve(n: f64) -> f64 { n / 2.0 }
//! fn sum(nums: Rest<f64>) -> f64 { nums.sum() }
//!
//! Value::builtin::<(f64,), _>("halve", halve);
//! Value::variadic::<(Rest<f64>,), _>("+", Arity::Any, sum);
//! ```
//!
//! Arguments are converted by value, so a builtin owns what it receives.
//! Argument count is checked against an [`Arity`] before any conversion, and
//! the first argument of the wrong kind fails the whole call with
//! [`Error::TypeError`].

use super::Arity;
use crate::Error;
use crate::ast::Expr;
use crate::scope::Scope;
use crate::value::Value;
use std::sync::Arc;

/// Erased builtin: evaluated arguments in, value out.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

/// Erased macro: the raw argument forms, the calling scope and the depth
/// the call was made at.
pub type MacroFn = dyn Fn(&[Expr], &Scope, usize) -> Result<Value, Error> + Send + Sync;

/// A parameter type a builtin can declare.
pub trait FromArg: Sized {
    fn from_arg(value: Value) -> Result<Self, Error>;
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::TypeError(format!("expected {expected}, got {}", value.type_name()))
}

impl FromArg for Value {
    fn from_arg(value: Value) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromArg for f64 {
    fn from_arg(value: Value) -> Result<Self, Error> {
        f64::try_from(value)
    }
}

impl FromArg for bool {
    fn from_arg(value: Value) -> Result<Self, Error> {
        bool::try_from(value)
    }
}

impl FromArg for String {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

/// Quoted code, as produced by `'form`
impl FromArg for Arc<Expr> {
    fn from_arg(value: Value) -> Result<Self, Error> {
        match value {
            Value::Form(form) => Ok(form),
            other => Err(mismatch("form", &other)),
        }
    }
}

/// Trailing arguments of a variadic builtin, each converted to `T`.
///
/// Every element is converted before the builtin runs, so iterating never
/// fails.
pub struct Rest<T> {
    items: std::vec::IntoIter<T>,
}

impl<T: FromArg> Rest<T> {
    fn convert(values: impl Iterator<Item = Value>) -> Result<Self, Error> {
        let items = values.map(T::from_arg).collect::<Result<Vec<_>, _>>()?;
        Ok(Rest {
            items: items.into_iter(),
        })
    }
}

impl<T> Iterator for Rest<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> ExactSizeIterator for Rest<T> {}

/// Return types a builtin may use: any `Into<Value>`, or a `Result` of one.
#[doc(hidden)]
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T: Into<Value>> IntoValueResult for T {
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

impl<T: Into<Value>> IntoValueResult for Result<T, Error> {
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

/// Fixed-arity Rust function usable as a builtin. `Args` is the parameter
/// tuple: `()`, `(A,)` or `(A, B)`.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            Arity::Exact(0).validate(args.len())?;
            (self)().into_value_result()
        })
    }
}

impl<F, A, R> IntoOperation<(A,)> for F
where
    F: Fn(A) -> R + Send + Sync + 'static,
    A: FromArg,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            let [a] = exact::<1>(args)?;
            (self)(A::from_arg(a)?).into_value_result()
        })
    }
}

impl<F, A, B, R> IntoOperation<(A, B)> for F
where
    F: Fn(A, B) -> R + Send + Sync + 'static,
    A: FromArg,
    B: FromArg,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            let [a, b] = exact::<2>(args)?;
            (self)(A::from_arg(a)?, B::from_arg(b)?).into_value_result()
        })
    }
}

fn exact<const N: usize>(args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::arity_error(N, got))
}

/// Rust function ending in a [`Rest`] parameter, usable as a builtin.
/// `Args` is `(Rest<T>,)` or `(A, Rest<T>)`.
///
/// The caller supplies the accepted argument count; the fixed prefix is
/// required on top of it.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self, arity: Arity) -> Arc<OperationFn>;
}

impl<F, T, R> IntoVariadicOperation<(Rest<T>,)> for F
where
    F: Fn(Rest<T>) -> R + Send + Sync + 'static,
    T: FromArg,
    R: IntoValueResult,
{
    fn into_variadic_operation(self, arity: Arity) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            (self)(Rest::convert(args.into_iter())?).into_value_result()
        })
    }
}

impl<F, A, T, R> IntoVariadicOperation<(A, Rest<T>)> for F
where
    F: Fn(A, Rest<T>) -> R + Send + Sync + 'static,
    A: FromArg,
    T: FromArg,
    R: IntoValueResult,
{
    fn into_variadic_operation(self, arity: Arity) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            let got = args.len();
            let mut args = args.into_iter();
            let first = args.next().ok_or_else(|| Error::arity_error(1, got))?;
            (self)(A::from_arg(first)?, Rest::convert(args)?).into_value_result()
        })
    }
}
