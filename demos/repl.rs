use parens::reader::parse_module;
use parens::{HostObject, Scope, Value, eval, stdlib};
use parking_lot::Mutex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP: &str = "
Welcome to Parens!

Type :quit or Ctrl+C to exit the REPL.

Use :scope to see the list of symbols available in
the current scope.

Use (doc <symbol>) to get help about symbols in scope.

Host values are reachable through member access:
  sample.val          field of the bound object
  (sample.set-val \"x\") method that updates it
";

/// Host object demonstrating member access from scripts
struct SampleType {
    val: Arc<Mutex<String>>,
}

impl HostObject for SampleType {
    fn type_name(&self) -> &str {
        "sampleType"
    }

    fn field(&self, name: &str) -> Option<Value> {
        (name == "val").then(|| Value::String(self.val.lock().clone()))
    }

    fn method(&self, name: &str) -> Option<Value> {
        (name == "describe").then(|| Value::String(format!("sampleType[val={}]", self.val.lock())))
    }

    fn ref_method(&self, name: &str) -> Option<Value> {
        if name != "set-val" {
            return None;
        }
        let slot = Arc::clone(&self.val);
        Some(Value::builtin::<(String,), _>("set-val", move |new_val: String| {
            slot.lock().clone_from(&new_val);
            new_val
        }))
    }
}

fn help() -> &'static str {
    HELP
}

fn make_global_scope() -> Scope {
    let sample = SampleType {
        val: Arc::new(Mutex::new("initial".to_owned())),
    };

    stdlib::register_all(&Scope::new())
        .bind_with_doc("parens-version", Value::from(VERSION), &["Version of this build"])
        .bind_with_doc(
            "?",
            Value::builtin::<(), _>("?", help),
            &["Shows the welcome text", "Usage: (?)"],
        )
        .bind_with_doc(
            "sample",
            Value::reference(sample),
            &["Sample host object; try sample.val and (sample.set-val \"x\")"],
        )
}

fn main() -> rustyline::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("Parens {VERSION}");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;
    let scope = make_global_scope();

    loop {
        match rl.readline("parens> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Err(err) = rl.add_history_entry(line) {
                    warn!(%err, "could not record history");
                }

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":scope" => {
                        print_scope(&scope);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let result = parse_module("repl", line).and_then(|module| {
                    debug!(%module, "evaluating");
                    eval(&module, &scope)
                });

                match result {
                    Ok(Value::Nil) => {}
                    Ok(Value::String(s)) => println!("{s}"),
                    Ok(value) => println!("{value}"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("{HELP}");
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :scope     - Show current scope bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Examples:");
    println!("  (let [x 5] (* x x))");
    println!("  ((fn [a b] (+ a b)) 1 2)");
    println!("  (eval '(str \"a\" :b))");
    println!("  sample.val");
    println!();
}

fn print_scope(scope: &Scope) {
    let bindings = scope.all_bindings();

    if bindings.is_empty() {
        println!("Scope is empty.");
        return;
    }

    println!("Scope bindings ({} total):", bindings.len());
    println!();

    // Separate callables from plain values
    let mut callables = Vec::new();
    let mut values = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::BuiltinFunction { .. } | Value::Macro { .. } | Value::Lambda { .. } => {
                callables.push(name);
            }
            _ => values.push((name, value)),
        }
    }

    if !callables.is_empty() {
        println!("Functions and macros ({}):", callables.len());
        // Print in columns for readability
        let mut col = 0;
        for name in callables {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}
