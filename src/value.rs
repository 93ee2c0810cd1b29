//! Runtime values produced by evaluation.
//!
//! [`Value`] is a closed union of the kinds the runtime knows about, plus two
//! host variants that wrap an application object behind the [`HostObject`]
//! trait. Host objects publish their members by name, which is how
//! `name.member` symbols reach into them.

use crate::Error;
use crate::ast::{Expr, write_escaped};
use crate::evaluator::Arity;
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, MacroFn, OperationFn,
};
use crate::scope::Scope;
use std::fmt;
use std::sync::Arc;

/// Member accessor table of an application object bound into scope.
///
/// Lookups return `None` when the object has no member of that name; the
/// evaluator then tries the next kind of member.
pub trait HostObject: Send + Sync {
    /// Name shown when the object is printed
    fn type_name(&self) -> &str;

    /// Data member by name
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Method that only needs a view of the object's value
    fn method(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Method that updates the shared object, typically through interior
    /// mutability. Only reachable through [`Value::Ref`].
    fn ref_method(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Core runtime value
#[derive(Clone)]
pub enum Value {
    /// Absence of a value (empty module, `println`, `nil`)
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Keyword(String),
    Vector(Vec<Value>),
    /// Unevaluated code, produced by quoting
    Form(Arc<Expr>),
    /// Ordinary callable, receives evaluated arguments
    BuiltinFunction { id: String, func: Arc<OperationFn> },
    /// Callable that receives unevaluated forms and the calling scope
    Macro { id: String, func: Arc<MacroFn> },
    /// Closure created by `fn`: parameters, body forms and defining scope
    Lambda {
        params: Vec<String>,
        body: Arc<[Expr]>,
        scope: Scope,
    },
    /// Host object held by value
    Object(Arc<dyn HostObject>),
    /// Host object held by reference; exposes `ref_method` members too
    Ref(Arc<dyn HostObject>),
}

impl Value {
    /// Wrap a strongly-typed Rust function as a callable value.
    ///
    /// `Args` is the parameter tuple, e.g. `(f64, f64)`.
    pub fn builtin<Args, F>(id: impl Into<String>, func: F) -> Value
    where
        F: IntoOperation<Args>,
    {
        Value::BuiltinFunction {
            id: id.into(),
            func: func.into_operation(),
        }
    }

    /// Wrap a Rust function whose last parameter is a [`Rest`], accepting
    /// any argument count `arity` allows.
    ///
    /// `Args` lists the optional fixed parameter followed by the rest type,
    /// e.g. `(f64, Rest<f64>)`.
    ///
    /// [`Rest`]: crate::evaluator::Rest
    pub fn variadic<Args, F>(id: impl Into<String>, arity: Arity, func: F) -> Value
    where
        F: IntoVariadicOperation<Args>,
    {
        Value::BuiltinFunction {
            id: id.into(),
            func: func.into_variadic_operation(arity),
        }
    }

    /// Wrap a function over unevaluated forms as a macro value.
    pub fn macro_fn<F>(id: impl Into<String>, func: F) -> Value
    where
        F: Fn(&[Expr], &Scope, usize) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Value::Macro {
            id: id.into(),
            func: Arc::new(func),
        }
    }

    pub fn object<T: HostObject + 'static>(object: T) -> Value {
        Value::Object(Arc::new(object))
    }

    pub fn reference<T: HostObject + 'static>(object: T) -> Value {
        Value::Ref(Arc::new(object))
    }

    /// Short name of the value kind, as reported by `type`
    pub fn type_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Vector(_) => "vector",
            Value::Form(_) => "form",
            Value::BuiltinFunction { .. } | Value::Lambda { .. } => "function",
            Value::Macro { .. } => "macro",
            Value::Object(object) | Value::Ref(object) => object.type_name(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `false` and `nil` counts as true in conditions
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::Vector(items) => f.debug_tuple("Vector").field(items).finish(),
            Value::Form(expr) => write!(f, "Form({expr})"),
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Macro { id, .. } => write!(f, "Macro({id})"),
            Value::Lambda { params, body, .. } => {
                write!(f, "Lambda(params={params:?}, body={} forms)", body.len())
            }
            Value::Object(object) => write!(f, "Object({})", object.type_name()),
            Value::Ref(object) => write!(f, "Ref({})", object.type_name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_escaped(f, s),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Form(expr) => write!(f, "{expr}"),
            Value::BuiltinFunction { id, .. } => write!(f, "#<function:{id}>"),
            Value::Macro { id, .. } => write!(f, "#<macro:{id}>"),
            Value::Lambda { .. } => write!(f, "#<fn>"),
            Value::Object(object) => write!(f, "#<{}>", object.type_name()),
            Value::Ref(object) => write!(f, "#<&{}>", object.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Form(a), Value::Form(b)) => a == b,
            // Callables compare by id string, not function pointer
            (Value::BuiltinFunction { id: a, .. }, Value::BuiltinFunction { id: b, .. })
            | (Value::Macro { id: a, .. }, Value::Macro { id: b, .. }) => a == b,
            (Value::Lambda { body: a, .. }, Value::Lambda { body: b, .. }) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) | (Value::Ref(a), Value::Ref(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Nil
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(f64::from(n))
            }
        }
    };
}

// Integer types that convert to f64 without loss
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Vector(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Vector(arr.into_iter().map(Into::into).collect())
    }
}

impl From<Expr> for Value {
    fn from(expr: Expr) -> Self {
        Value::Form(Arc::new(expr))
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<f64, Error> {
        if let Value::Number(n) = value {
            Ok(n)
        } else {
            Err(Error::TypeError(format!(
                "expected number, got {}",
                value.type_name()
            )))
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        if let Value::Bool(b) = value {
            Ok(b)
        } else {
            Err(Error::TypeError(format!(
                "expected boolean, got {}",
                value.type_name()
            )))
        }
    }
}

/// Helper function for creating Values - works great in mixed vectors!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}
