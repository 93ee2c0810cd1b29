use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::Expr;
use crate::scope::Scope;
use crate::value::{HostObject, Value};
use std::sync::Arc;
use tracing::trace;

pub mod intooperation;

pub use intooperation::{FromArg, IntoOperation, IntoVariadicOperation, MacroFn, OperationFn, Rest};

/// Accepted argument counts of a callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn validate(self, got: usize) -> Result<(), Error> {
        match self {
            Arity::Exact(n) if got != n => Err(Error::arity_error(n, got)),
            Arity::AtLeast(n) if got < n => Err(Error::arity_error(n, got)),
            Arity::Range(min, _) if got < min => Err(Error::arity_error(min, got)),
            Arity::Range(_, max) if got > max => Err(Error::arity_error(max, got)),
            _ => Ok(()),
        }
    }
}

/// Evaluate an expression against `scope` (public API)
pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, Error> {
    eval_with_depth(expr, scope, 0)
}

/// Evaluate with depth tracking to prevent stack overflow.
///
/// Macros receive the depth they were called at and pass `depth + 1` when
/// they evaluate their sub-forms.
pub fn eval_with_depth(expr: &Expr, scope: &Scope, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        Expr::Module { exprs, .. } => eval_body(exprs, scope, depth),
        Expr::Number(n) => n.value().map(Value::Number),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Keyword(k) => Ok(Value::Keyword(k.clone())),
        Expr::Comment(text) => Ok(Value::String(text.clone())),
        Expr::Symbol(name) => resolve_symbol(name, scope),
        Expr::Quote(inner) => Ok(Value::Form(Arc::clone(inner))),
        Expr::Vector(items) => eval_args(items, scope, depth).map(Value::Vector),
        Expr::List(items) => {
            eval_list(items, scope, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Evaluate the form wrapped by a quote expression.
pub fn unquote_eval(expr: &Expr, scope: &Scope) -> Result<Value, Error> {
    match expr {
        Expr::Quote(inner) => eval(inner, scope),
        other => Err(Error::EvalError(format!(
            "unquote requires a quoted form, got {}",
            other.kind()
        ))),
    }
}

/// Call `func` with already evaluated arguments.
pub fn apply(func: &Value, args: Vec<Value>) -> Result<Value, Error> {
    apply_with_depth(func, args, 0)
}

/// Evaluate forms in order, yielding the last result (`nil` when empty).
pub(crate) fn eval_body(exprs: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    let mut last = Value::Nil;
    for expr in exprs {
        last = eval_with_depth(expr, scope, depth + 1)?;
    }
    Ok(last)
}

/// Helper function to add expression context to errors
fn add_context(error: Error, expr: &Expr) -> Error {
    let context = format!("while evaluating: {expr}");
    match error {
        Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  Context: {context}")),
        Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  Context: {context}")),
        // Lookup, arity and parse errors carry their own context
        other => other,
    }
}

/// Helper function to evaluate a list of argument expressions with depth tracking
fn eval_args(args: &[Expr], scope: &Scope, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth(arg, scope, depth + 1))
        .collect()
}

fn eval_list(elements: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    // The empty list is data, not a call
    let Some((head, arg_exprs)) = elements.split_first() else {
        return Ok(Value::Form(Arc::new(Expr::List(Vec::new()))));
    };

    let func = eval_with_depth(head, scope, depth + 1)?;

    if let Value::Macro { id, func } = &func {
        trace!(head = %id, argc = arg_exprs.len(), "macro call");
        return func(arg_exprs, scope, depth + 1);
    }

    let args = eval_args(arg_exprs, scope, depth)?;
    trace!(head = %head, argc = args.len(), "function call");
    apply_with_depth(&func, args, depth + 1)
}

fn apply_with_depth(func: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction { func, .. } => func(args),
        Value::Lambda {
            params,
            body,
            scope: closure_scope,
        } => {
            if params.len() != args.len() {
                return Err(Error::arity_error(params.len(), args.len()));
            }

            let call_scope = params
                .iter()
                .zip(args)
                .fold(Scope::with_parent(closure_scope), |scope, (param, arg)| {
                    scope.bind(param.as_str(), arg)
                });

            eval_body(body, &call_scope, depth).map_err(|err| match err {
                Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  In fn: {func}")),
                other => other,
            })
        }
        other => Err(Error::NotCallable(other.to_string())),
    }
}

/// Resolve a plain name or a single `name.member` access.
fn resolve_symbol(symbol: &str, scope: &Scope) -> Result<Value, Error> {
    let mut parts = symbol.split('.');
    let result = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, _) => scope.get(name),
        (Some(name), Some(member), None) => {
            let target = scope.get(name)?;
            resolve_member(&target, member).ok_or_else(|| Error::MemberNotFound {
                target: name.to_owned(),
                member: member.to_owned(),
            })
        }
        _ => Err(Error::InvalidMemberAccess(symbol.to_owned())),
    };
    trace!(symbol, found = result.is_ok(), "resolve symbol");
    result
}

/// First matching member of a host value. References try the pointee's
/// field, then methods on the reference, then methods on the pointee;
/// plain objects try field then method.
fn resolve_member(target: &Value, member: &str) -> Option<Value> {
    match target {
        Value::Ref(object) => ref_member(object.as_ref(), member),
        Value::Object(object) => object.field(member).or_else(|| object.method(member)),
        _ => None,
    }
}

fn ref_member(object: &dyn HostObject, member: &str) -> Option<Value> {
    object
        .field(member)
        .or_else(|| object.ref_method(member))
        .or_else(|| object.method(member))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, num, sym};
    use crate::value::val;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Host type with a field and a method sharing the name `val`
    struct Sample {
        val: Arc<Mutex<String>>,
    }

    impl Sample {
        fn new(initial: &str) -> Self {
            Sample {
                val: Arc::new(Mutex::new(initial.to_owned())),
            }
        }
    }

    impl HostObject for Sample {
        fn type_name(&self) -> &str {
            "sample"
        }

        fn field(&self, name: &str) -> Option<Value> {
            (name == "val").then(|| val(self.val.lock().as_str()))
        }

        fn method(&self, name: &str) -> Option<Value> {
            match name {
                "val" => Some(val("method")),
                "describe" => Some(val(format!("sample[val={}]", self.val.lock()))),
                _ => None,
            }
        }

        fn ref_method(&self, name: &str) -> Option<Value> {
            match name {
                "describe" => Some(val("by reference")),
                "set-val" => {
                    let slot = Arc::clone(&self.val);
                    Some(Value::builtin::<(String,), _>("set-val", move |new_val: String| {
                        slot.lock().clone_from(&new_val);
                        new_val
                    }))
                }
                _ => None,
            }
        }
    }

    fn add(a: f64, b: f64) -> f64 {
        a + b
    }

    fn test_scope() -> Scope {
        Scope::new()
            .bind("x", val(5))
            .bind("add", Value::builtin::<(f64, f64), _>("add", add))
            .bind("obj", Value::object(Sample::new("field")))
            .bind("ptr", Value::reference(Sample::new("pointee")))
            .bind(
                "forms",
                Value::macro_fn("forms", |args: &[Expr], _: &Scope, _: usize| {
                    Ok(Value::Vector(
                        args.iter().map(|arg| Value::Form(Arc::new(arg.clone()))).collect(),
                    ))
                }),
            )
    }

    #[test]
    fn test_literals_and_symbols() {
        let scope = test_scope();
        let test_cases = vec![
            (num("1.5"), Ok(val(1.5))),
            (Expr::String("s".into()), Ok(val("s"))),
            (Expr::Keyword("k".into()), Ok(Value::Keyword("k".into()))),
            (Expr::Comment("a note".into()), Ok(val("a note"))),
            (sym("x"), Ok(val(5))),
            (sym("nope"), Err(Error::UnboundVariable("nope".into()))),
            (Expr::Vector(vec![sym("x"), num("2")]), Ok(val([5, 2]))),
            (list([sym("add"), sym("x"), num("1")]), Ok(val(6))),
            (list([]), Ok(val(list([])))),
            (Expr::module("empty", vec![]), Ok(Value::Nil)),
            (
                Expr::module("m", vec![num("1"), list([sym("add"), num("2"), num("3")])]),
                Ok(val(5)),
            ),
        ];

        for (i, (expr, expected)) in test_cases.iter().enumerate() {
            assert_eq!(&eval(expr, &scope), expected, "eval case #{} ({expr})", i + 1);
        }
    }

    #[test]
    fn test_quote_returns_form() {
        let scope = test_scope();
        let quoted = list([num("1"), num("2")]);

        let result = eval(&Expr::quote(quoted.clone()), &scope).unwrap();
        assert_eq!(result, val(quoted.clone()));

        let expr = Expr::quote(list([sym("add"), num("1"), num("2")]));
        assert_eq!(unquote_eval(&expr, &scope).unwrap(), val(3));
        assert!(matches!(
            unquote_eval(&sym("x"), &scope),
            Err(Error::EvalError(_))
        ));
    }

    #[test]
    fn test_member_resolution_order() {
        let scope = test_scope();
        let test_cases = vec![
            // field wins over a same-named method
            ("obj.val", Ok(val("field"))),
            ("ptr.val", Ok(val("pointee"))),
            ("obj.describe", Ok(val("sample[val=field]"))),
            (
                "obj.set-val",
                Err(Error::MemberNotFound {
                    target: "obj".into(),
                    member: "set-val".into(),
                }),
            ),
            (
                "x.y",
                Err(Error::MemberNotFound {
                    target: "x".into(),
                    member: "y".into(),
                }),
            ),
            ("x.y.z", Err(Error::InvalidMemberAccess("x.y.z".into()))),
            ("missing.y", Err(Error::UnboundVariable("missing".into()))),
        ];

        for (symbol, expected) in test_cases {
            assert_eq!(eval(&sym(symbol), &scope), expected, "symbol {symbol}");
        }

        // reference methods come before pointee methods
        assert_eq!(eval(&sym("ptr.describe"), &scope).unwrap(), val("by reference"));

        let set = list([sym("ptr.set-val"), Expr::String("new".into())]);
        assert_eq!(eval(&set, &scope).unwrap(), val("new"));
        assert_eq!(eval(&sym("ptr.val"), &scope).unwrap(), val("new"));
    }

    #[test]
    fn test_macro_receives_unevaluated_forms() {
        let scope = test_scope();
        let expr = list([sym("forms"), sym("undefined"), list([sym("add"), num("1")])]);
        assert_eq!(
            eval(&expr, &scope).unwrap(),
            val(vec![
                val(sym("undefined")),
                val(list([sym("add"), num("1")])),
            ])
        );

        // the same arguments are evaluated for an ordinary function
        let expr = list([sym("add"), sym("undefined"), num("1")]);
        assert_eq!(
            eval(&expr, &scope),
            Err(Error::UnboundVariable("undefined".into()))
        );
    }

    #[test]
    fn test_evaluation_is_fail_fast() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn count(v: Value) -> Value {
            CALLS.fetch_add(1, Ordering::SeqCst);
            v
        }

        let scope = test_scope().bind("count", Value::builtin::<(Value,), _>("count", count));
        let expr = list([
            sym("add"),
            list([sym("count"), num("1")]),
            sym("missing"),
            list([sym("count"), num("2")]),
        ]);
        assert_eq!(
            eval(&expr, &scope),
            Err(Error::UnboundVariable("missing".into()))
        );
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_call_errors() {
        let scope = test_scope();
        let test_cases = vec![
            (
                list([num("1"), num("2")]),
                Error::NotCallable("1".into()),
            ),
            (
                list([sym("add"), num("1")]),
                Error::arity_error(2, 1),
            ),
            (
                Expr::module("m", vec![num("1"), num("1x")]),
                Error::InvalidNumber {
                    literal: "1x".into(),
                    source: "1x".parse::<f64>().unwrap_err(),
                },
            ),
        ];

        for (expr, expected) in test_cases {
            assert_eq!(eval(&expr, &scope).unwrap_err(), expected);
        }

        let type_err = eval(&list([sym("add"), num("1"), Expr::String("a".into())]), &scope);
        assert!(
            matches!(type_err, Err(Error::TypeError(ref msg)) if msg.starts_with("expected number, got string"))
        );
    }

    #[test]
    fn test_number_literal_cached_after_eval() {
        let scope = test_scope();
        let expr = num("42");
        let Expr::Number(n) = &expr else {
            unreachable!()
        };
        assert!(!n.is_cached());
        assert_eq!(eval(&expr, &scope).unwrap(), val(42));
        assert!(n.is_cached());
    }

    #[test]
    fn test_lambda_application() {
        let scope = test_scope();
        let lambda = Value::Lambda {
            params: vec!["a".into()],
            body: vec![list([sym("add"), sym("a"), sym("x")])].into(),
            scope: scope.clone(),
        };

        assert_eq!(apply(&lambda, vec![val(10)]).unwrap(), val(15));
        assert_eq!(apply(&lambda, vec![]), Err(Error::arity_error(1, 0)));
        assert_eq!(
            apply(&val("f"), vec![]),
            Err(Error::NotCallable("\"f\"".into()))
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut expr = num("1");
        for _ in 0..MAX_EVAL_DEPTH {
            expr = Expr::Vector(vec![expr]);
        }
        assert!(matches!(
            eval(&expr, &Scope::new()),
            Err(Error::EvalError(ref msg)) if msg.contains("depth limit")
        ));
    }

    #[test]
    fn test_arity_validate() {
        let test_cases = vec![
            (Arity::Exact(2), 2, Ok(())),
            (Arity::Exact(2), 3, Err(Error::arity_error(2, 3))),
            (Arity::AtLeast(1), 0, Err(Error::arity_error(1, 0))),
            (Arity::AtLeast(1), 9, Ok(())),
            (Arity::Range(2, 3), 1, Err(Error::arity_error(2, 1))),
            (Arity::Range(2, 3), 3, Ok(())),
            (Arity::Range(2, 3), 4, Err(Error::arity_error(3, 4))),
            (Arity::Any, 0, Ok(())),
        ];

        for (arity, got, expected) in test_cases {
            assert_eq!(arity.validate(got), expected, "{arity:?} with {got}");
        }
    }
}
