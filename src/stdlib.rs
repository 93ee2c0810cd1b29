//! Standard macros and functions.
//!
//! Bindings are grouped the way hosts usually want to pick them:
//!
//! ```scheme
//! ;; core
//! (let [x 2 y (* x 3)] (if (> y x) "bigger" "smaller"))
//! ((fn [a b] (+ a b)) 1 2)
//! (eval '(+ 1 2))
//! (doc let)
//! ;; math
//! (+ 1 2.5) (< 1 2 3)
//! ;; io
//! (println "total:" 42)
//! ```
//!
//! ## Macros vs functions
//!
//! - **Macros** (`quote`, `if`, `do`, `let`, `fn`, `eval`, `doc`, `load`) receive
//!   their argument forms unevaluated and decide what to evaluate
//! - **Functions** receive evaluated arguments; argument types are checked
//!   by the calling-convention adapters, so `(+ 1 "a")` is a type error
//!
//! Conditions use truthiness: only `false` and `nil` are false.

use crate::Error;
use crate::ast::Expr;
use crate::evaluator::{Arity, Rest, eval_body, eval_with_depth};
use crate::scope::Scope;
use crate::value::Value;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// One stdlib binding with its documentation lines
struct Entry {
    name: &'static str,
    value: Value,
    doc: &'static [&'static str],
}

fn entry(name: &'static str, value: Value, doc: &'static [&'static str]) -> Entry {
    Entry { name, value, doc }
}

/// Bind every core macro, function and constant into a new scope.
pub fn register_core(scope: &Scope) -> Scope {
    register_list(scope, &CORE)
}

/// Bind the arithmetic and comparison operators into a new scope.
pub fn register_math(scope: &Scope) -> Scope {
    register_list(scope, &MATH)
}

/// Bind the input/output functions into a new scope.
pub fn register_io(scope: &Scope) -> Scope {
    register_list(scope, &IO)
}

/// Core, math and io bindings together.
pub fn register_all(scope: &Scope) -> Scope {
    register_io(&register_math(&register_core(scope)))
}

fn register_list(scope: &Scope, entries: &[Entry]) -> Scope {
    debug!(count = entries.len(), "registering stdlib bindings");
    entries.iter().fold(scope.clone(), |scope, entry| {
        scope.bind_with_doc(entry.name, entry.value.clone(), entry.doc)
    })
}

//
// Macros
//

fn macro_quote(args: &[Expr], _scope: &Scope, _depth: usize) -> Result<Value, Error> {
    Arity::Exact(1).validate(args.len())?;
    Ok(Value::Form(Arc::new(args[0].clone())))
}

fn macro_if(args: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    Arity::Range(2, 3).validate(args.len())?;
    let condition = eval_with_depth(&args[0], scope, depth + 1)?;
    match (condition.is_truthy(), args.get(2)) {
        (true, _) => eval_with_depth(&args[1], scope, depth + 1),
        (false, Some(else_expr)) => eval_with_depth(else_expr, scope, depth + 1),
        (false, None) => Ok(Value::Nil),
    }
}

fn macro_do(args: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    eval_body(args, scope, depth)
}

fn macro_let(args: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    Arity::AtLeast(1).validate(args.len())?;
    let Expr::Vector(bindings) = &args[0] else {
        return Err(Error::TypeError(format!(
            "let bindings must be a vector, got {}",
            args[0].kind()
        )));
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::EvalError(
            "let bindings need an even number of forms".to_owned(),
        ));
    }

    // Each binding sees the ones before it
    let mut local = Scope::with_parent(scope);
    for pair in bindings.chunks_exact(2) {
        let [Expr::Symbol(name), value_expr] = pair else {
            return Err(Error::TypeError(format!(
                "let binding name must be a symbol, got {}",
                pair[0].kind()
            )));
        };
        let value = eval_with_depth(value_expr, &local, depth + 1)?;
        local = local.bind(name.as_str(), value);
    }

    eval_body(&args[1..], &local, depth)
}

fn macro_fn(args: &[Expr], scope: &Scope, _depth: usize) -> Result<Value, Error> {
    Arity::AtLeast(1).validate(args.len())?;
    let Expr::Vector(param_forms) = &args[0] else {
        return Err(Error::TypeError(
            "fn parameters must be a vector".to_owned(),
        ));
    };

    let mut params: Vec<String> = Vec::with_capacity(param_forms.len());
    for param in param_forms {
        match param {
            Expr::Symbol(name) if params.contains(name) => {
                return Err(Error::EvalError(format!(
                    "Duplicate parameter name: {name}"
                )));
            }
            Expr::Symbol(name) => params.push(name.clone()),
            other => {
                return Err(Error::TypeError(format!(
                    "fn parameters must be symbols, got {}",
                    other.kind()
                )));
            }
        }
    }

    Ok(Value::Lambda {
        params,
        body: args[1..].into(),
        scope: scope.clone(),
    })
}

fn macro_eval(args: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    Arity::Exact(1).validate(args.len())?;
    match eval_with_depth(&args[0], scope, depth + 1)? {
        Value::Form(form) => eval_with_depth(&form, scope, depth + 1),
        #[cfg(feature = "reader")]
        Value::String(source) => {
            let module = crate::reader::parse_module("eval", &source)?;
            eval_with_depth(&module, scope, depth + 1)
        }
        other => Ok(other),
    }
}

/// Reads a source file and evaluates its forms in the calling scope.
#[cfg(feature = "reader")]
fn macro_load(args: &[Expr], scope: &Scope, depth: usize) -> Result<Value, Error> {
    Arity::Exact(1).validate(args.len())?;
    let path = match eval_with_depth(&args[0], scope, depth + 1)? {
        Value::String(path) => path,
        other => {
            return Err(Error::TypeError(format!(
                "load expects a file path string, got {}",
                other.type_name()
            )));
        }
    };

    let source = std::fs::read_to_string(&path)
        .map_err(|err| Error::EvalError(format!("cannot load '{path}': {err}")))?;
    debug!(%path, bytes = source.len(), "loading file");
    let module = crate::reader::parse_module(&path, &source)?;
    eval_with_depth(&module, scope, depth + 1)
}

fn macro_doc(args: &[Expr], scope: &Scope, _depth: usize) -> Result<Value, Error> {
    Arity::Exact(1).validate(args.len())?;
    match &args[0] {
        Expr::Symbol(name) => Ok(Value::String(scope.doc(name))),
        other => Err(Error::TypeError(format!(
            "doc expects a symbol, got {}",
            other.kind()
        ))),
    }
}

//
// Functions
//

fn builtin_equal(first: Value, mut rest: Rest<Value>) -> bool {
    rest.all(|value| value == first)
}

fn builtin_not(value: Value) -> bool {
    !value.is_truthy()
}

/// Display form, except strings contribute their raw text
fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn builtin_str(args: Rest<Value>) -> String {
    args.map(|value| display_raw(&value)).collect()
}

fn builtin_vector(args: Rest<Value>) -> Value {
    Value::Vector(args.collect())
}

fn builtin_count(value: Value) -> Result<f64, Error> {
    let n = match &value {
        Value::Nil => 0,
        Value::Vector(items) => items.len(),
        Value::String(s) => s.chars().count(),
        Value::Form(form) => match form.as_ref() {
            Expr::List(items) | Expr::Vector(items) => items.len(),
            other => {
                return Err(Error::TypeError(format!(
                    "count not supported on {} form",
                    other.kind()
                )));
            }
        },
        other => {
            return Err(Error::TypeError(format!(
                "count not supported on {}",
                other.type_name()
            )));
        }
    };
    Ok(n as f64)
}

fn builtin_type(value: Value) -> Value {
    Value::Keyword(value.type_name().to_owned())
}

fn builtin_add(args: Rest<f64>) -> f64 {
    args.sum()
}

fn builtin_sub(first: f64, rest: Rest<f64>) -> f64 {
    let mut iter = rest.peekable();
    if iter.peek().is_none() {
        return -first;
    }
    iter.fold(first, |acc, n| acc - n)
}

fn builtin_mul(args: Rest<f64>) -> f64 {
    args.product()
}

fn builtin_div(first: f64, rest: Rest<f64>) -> Result<f64, Error> {
    let mut iter = rest.peekable();
    let (mut result, divisors): (f64, Vec<f64>) = if iter.peek().is_none() {
        (1.0, vec![first])
    } else {
        (first, iter.collect())
    };
    for divisor in divisors {
        if divisor == 0.0 {
            return Err(Error::EvalError("Division by zero".into()));
        }
        result /= divisor;
    }
    Ok(result)
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: f64, rest: Rest<f64>) -> bool {
            // All adjacent pairs must satisfy the comparison
            let mut prev = first;
            for current in rest {
                if !(prev $op current) {
                    return false;
                }
                prev = current;
            }

            true
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_println(args: Rest<Value>) -> Value {
    let line: Vec<String> = args.map(|value| display_raw(&value)).collect();
    println!("{}", line.join(" "));
    Value::Nil
}

//
// Registry tables
//

static CORE: LazyLock<Vec<Entry>> = LazyLock::new(|| {
    #[cfg_attr(not(feature = "reader"), expect(unused_mut))]
    let mut entries = vec![
        entry("true", Value::Bool(true), &[]),
        entry("false", Value::Bool(false), &[]),
        entry("nil", Value::Nil, &[]),
        entry(
            "quote",
            Value::macro_fn("quote", macro_quote),
            &["Returns the form without evaluating it", "Usage: (quote <form>)"],
        ),
        entry(
            "if",
            Value::macro_fn("if", macro_if),
            &[
                "Evaluates <then> when <test> is truthy, otherwise <else>",
                "Usage: (if <test> <then> [<else>])",
            ],
        ),
        entry(
            "do",
            Value::macro_fn("do", macro_do),
            &["Evaluates forms in order and returns the last result", "Usage: (do <form>*)"],
        ),
        entry(
            "let",
            Value::macro_fn("let", macro_let),
            &[
                "Binds names for the body forms; later bindings see earlier ones",
                "Usage: (let [<name> <expr>*] <body>*)",
            ],
        ),
        entry(
            "fn",
            Value::macro_fn("fn", macro_fn),
            &[
                "Creates a function closing over the current scope",
                "Usage: (fn [<param>*] <body>*)",
            ],
        ),
        entry(
            "eval",
            Value::macro_fn("eval", macro_eval),
            &[
                "Evaluates the argument; a resulting form or source string is evaluated again",
                "Usage: (eval <form>)",
            ],
        ),
        entry(
            "doc",
            Value::macro_fn("doc", macro_doc),
            &["Returns the documentation of a bound name", "Usage: (doc <symbol>)"],
        ),
        entry(
            "=",
            Value::variadic::<(Value, Rest<Value>), _>("=", Arity::AtLeast(2), builtin_equal),
            &["Structural equality of all arguments", "Usage: (= <a> <b> <more>*)"],
        ),
        entry(
            "not",
            Value::builtin::<(Value,), _>("not", builtin_not),
            &["Logical negation by truthiness", "Usage: (not <value>)"],
        ),
        entry(
            "str",
            Value::variadic::<(Rest<Value>,), _>("str", Arity::Any, builtin_str),
            &["Concatenates the display forms of the arguments", "Usage: (str <value>*)"],
        ),
        entry(
            "vector",
            Value::variadic::<(Rest<Value>,), _>("vector", Arity::Any, builtin_vector),
            &["Creates a vector of the arguments", "Usage: (vector <value>*)"],
        ),
        entry(
            "count",
            Value::builtin::<(Value,), _>("count", builtin_count),
            &["Number of items in a vector, string or form", "Usage: (count <coll>)"],
        ),
        entry(
            "type",
            Value::builtin::<(Value,), _>("type", builtin_type),
            &["Kind of the value as a keyword", "Usage: (type <value>)"],
        ),
    ];

    #[cfg(feature = "reader")]
    entries.push(entry(
        "load",
        Value::macro_fn("load", macro_load),
        &[
            "Reads and executes the file in the current scope",
            "Usage: (load \"sample.lisp\")",
        ],
    ));

    entries
});

static MATH: LazyLock<Vec<Entry>> = LazyLock::new(|| {
    vec![
        entry(
            "+",
            Value::variadic::<(Rest<f64>,), _>("+", Arity::Any, builtin_add),
            &["Sum of the arguments", "Usage: (+ <num>*)"],
        ),
        entry(
            "-",
            Value::variadic::<(f64, Rest<f64>), _>("-", Arity::AtLeast(1), builtin_sub),
            &["Subtracts the rest from the first; negates a single argument"],
        ),
        entry(
            "*",
            Value::variadic::<(Rest<f64>,), _>("*", Arity::Any, builtin_mul),
            &["Product of the arguments", "Usage: (* <num>*)"],
        ),
        entry(
            "/",
            Value::variadic::<(f64, Rest<f64>), _>("/", Arity::AtLeast(1), builtin_div),
            &["Divides the first by the rest; inverts a single argument"],
        ),
        entry(
            "<",
            Value::variadic::<(f64, Rest<f64>), _>("<", Arity::AtLeast(2), builtin_lt),
            &["True when the arguments are strictly increasing"],
        ),
        entry(
            ">",
            Value::variadic::<(f64, Rest<f64>), _>(">", Arity::AtLeast(2), builtin_gt),
            &["True when the arguments are strictly decreasing"],
        ),
        entry(
            "<=",
            Value::variadic::<(f64, Rest<f64>), _>("<=", Arity::AtLeast(2), builtin_le),
            &["True when the arguments are non-decreasing"],
        ),
        entry(
            ">=",
            Value::variadic::<(f64, Rest<f64>), _>(">=", Arity::AtLeast(2), builtin_ge),
            &["True when the arguments are non-increasing"],
        ),
    ]
});

static IO: LazyLock<Vec<Entry>> = LazyLock::new(|| {
    vec![entry(
        "println",
        Value::variadic::<(Rest<Value>,), _>("println", Arity::Any, builtin_println),
        &[
            "Prints the arguments separated by spaces, followed by a newline",
            "Usage: (println <value>*)",
        ],
    )]
});
