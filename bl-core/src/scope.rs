//! Symbol table and scope graph.
//!
//! Scopes form a tree owned top-down by the session: every scope only keeps
//! the id of its parent, lookups walk towards the root. Symbols are inserted
//! at first syntactic sight and resolved later, so a lookup may find a symbol
//! whose value is not known yet; the analyzer then waits for the task that
//! resolves it instead of recursing into it.

use std::collections::HashMap;

use crate::arena::{Arena, define_id};
use crate::ast::{AstId, Ident};
use crate::mir::{FnId, GlobalId, LocalId};
use crate::scheduler::TaskId;
use crate::span::Span;
use crate::types::TypeId;
use crate::value::ConstValue;

define_id!(ScopeId, "scope");
define_id!(SymbolId, "sym");
define_id!(
    /// Polymorphic function template, specialized per call signature.
    RecipeId,
    "recipe"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Primitive types; parent of every global scope.
    Builtin,
    Global,
    /// Named scope (`#scope name`), addressable with `name.member`.
    Module,
    /// Function signature and body root; locals of enclosing functions are
    /// not visible through it.
    Fn,
    Lexical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Global,
    Local,
    Argument,
}

/// What a resolved symbol stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolValue {
    /// Compile-time constant.
    Const { ty: TypeId, value: ConstValue },
    Type(TypeId),
    Fn(FnId),
    FnGroup(Vec<FnId>),
    PolyFn(RecipeId),
    /// Mutable global variable.
    Global(GlobalId),
    /// Local variable or argument of the function being analyzed.
    Local { local: LocalId, ty: TypeId },
    /// Named scope.
    Scope(ScopeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolState {
    /// Inserted but not analyzed; `task` resolves it.
    Unresolved { task: Option<TaskId> },
    Resolved(SymbolValue),
    Failed,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: Ident,
    pub storage: Storage,
    pub mutable: bool,
    pub scope: ScopeId,
    /// Declaring node, `None` for builtins.
    pub node: Option<AstId>,
    pub span: Span,
    pub state: SymbolState,
}

impl Symbol {
    pub fn value(&self) -> Option<&SymbolValue> {
        match &self.state {
            SymbolState::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    entries: HashMap<Ident, SymbolId>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    pub symbol: SymbolId,
    /// A function scope was left on the way up to the symbol's scope.
    pub crossed_fn: bool,
}

#[derive(Debug, Default)]
pub struct ScopeGraph {
    scopes: Arena<ScopeId, Scope>,
    symbols: Arena<SymbolId, Symbol>,
}

impl ScopeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            kind,
            parent,
            entries: HashMap::new(),
        })
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Insert `symbol` into its scope.
    ///
    /// Fails with the previously declared symbol when the name is already
    /// taken in that same scope; shadowing an outer scope is allowed.
    pub fn insert(&mut self, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope = symbol.scope;
        if let Some(&previous) = self.scopes[scope].entries.get(&symbol.name) {
            return Err(previous);
        }
        let name = symbol.name;
        let id = self.symbols.push(symbol);
        self.scopes[scope].entries.insert(name, id);
        Ok(id)
    }

    pub fn resolve(&mut self, id: SymbolId, value: SymbolValue) {
        self.symbols[id].state = SymbolState::Resolved(value);
    }

    pub fn fail(&mut self, id: SymbolId) {
        self.symbols[id].state = SymbolState::Failed;
    }

    /// Look `name` up starting at `scope`, walking parents unless
    /// `local_only` is set.
    pub fn lookup(&self, scope: ScopeId, name: Ident, local_only: bool) -> Option<Lookup> {
        let mut current = Some(scope);
        let mut crossed_fn = false;
        while let Some(id) = current {
            let entry = &self.scopes[id];
            if let Some(&symbol) = entry.entries.get(&name) {
                return Some(Lookup { symbol, crossed_fn });
            }
            if local_only {
                return None;
            }
            if entry.kind == ScopeKind::Fn {
                crossed_fn = true;
            }
            current = entry.parent;
        }
        None
    }
}
