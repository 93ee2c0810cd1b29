//! Lexical environment chain.
//!
//! A [`Scope`] is an immutable map of names to values plus an optional parent.
//! Binding never changes an existing scope: it returns a new one whose map
//! shares every untouched bucket with the old map, so any snapshot a caller
//! holds keeps seeing exactly what it saw when it was taken.

use crate::Error;
use crate::pscope::ScopeMap;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Bound value plus its optional documentation
#[derive(Debug, Clone)]
struct ScopeEntry {
    value: Value,
    doc: String,
}

/// Immutable environment node
#[derive(Clone, Default)]
pub struct Scope {
    parent: Option<Arc<Scope>>,
    vals: ScopeMap<ScopeEntry>,
}

impl Scope {
    /// Empty root scope
    pub fn new() -> Self {
        Scope::default()
    }

    /// Empty scope whose lookups fall back to `parent`
    pub fn with_parent(parent: &Scope) -> Self {
        Scope {
            parent: Some(Arc::new(parent.clone())),
            vals: ScopeMap::new(),
        }
    }

    /// Returns a new scope with `name` bound to `value` in the local map.
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Scope {
        self.bind_entry(name.into(), value, String::new())
    }

    /// Like [`Scope::bind`], attaching documentation lines. The lines are
    /// joined with newlines and trimmed.
    pub fn bind_with_doc(&self, name: impl Into<String>, value: Value, doc: &[&str]) -> Scope {
        let doc = doc.join("\n").trim().to_owned();
        self.bind_entry(name.into(), value, doc)
    }

    fn bind_entry(&self, name: String, value: Value, doc: String) -> Scope {
        Scope {
            parent: self.parent.clone(),
            vals: self.vals.store(name, ScopeEntry { value, doc }),
        }
    }

    fn lookup(&self, name: &str) -> Option<&ScopeEntry> {
        let mut scope = self;
        loop {
            if let Some(entry) = scope.vals.load(name) {
                return Some(entry);
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Value bound to `name` here or in the nearest enclosing scope.
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.lookup(name)
            .map(|entry| entry.value.clone())
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    /// Documentation of `name`, or an empty string when the name is unbound
    /// or undocumented.
    pub fn doc(&self, name: &str) -> String {
        self.lookup(name)
            .map(|entry| entry.doc.clone())
            .unwrap_or_default()
    }

    /// Outermost scope of the chain
    pub fn root(&self) -> &Scope {
        let mut scope = self;
        while let Some(parent) = scope.parent.as_deref() {
            scope = parent;
        }
        scope
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.parent.as_deref()
    }

    /// Names bound locally, in map order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vals.iter().map(|(name, _)| name)
    }

    /// Every visible binding, inner scopes shadowing outer ones, sorted by
    /// name.
    pub fn all_bindings(&self) -> Vec<(String, Value)> {
        let mut chain = vec![self];
        while let Some(parent) = chain.last().and_then(|scope| scope.parent()) {
            chain.push(parent);
        }

        let mut bindings = BTreeMap::new();
        for scope in chain.into_iter().rev() {
            for (name, entry) in scope.vals.iter() {
                bindings.insert(name.to_owned(), entry.value.clone());
            }
        }
        bindings.into_iter().collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("names", &self.vals.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
