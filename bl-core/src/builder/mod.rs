//! MIR builder.
//!
//! The builder analyzes one scheduler task at a time: the value of a global
//! declaration, the body of a function, or a comptime expression requested
//! through the session. Whenever analysis needs something that is not known
//! yet it stops with [`Halt::Postpone`] naming the blocking task. The session
//! parks the task and runs it again from its AST root once the blocker is
//! done; everything the aborted run produced is thrown away, except ids that
//! must stay stable across runs (declared functions, nominal types,
//! specializations), which are cached by AST node.

mod call;
mod expr;
mod stmt;

use std::collections::HashMap;

use crate::arena::Arena;
use crate::ast::{AstId, AstKind, Decl, FnLit, Ident};
use crate::compiler::SessionConfig;
use crate::diagnostic::{Diagnostic, Diagnostics, ErrorKind};
use crate::error::CoreError;
use crate::mir::{Block, BlockId, FnFlavor, FnId, FnState, Instr, InstrId, InstrKind, Mir, MirFn, MirGlobal};
use crate::native::NativeBridge;
use crate::scheduler::{Scheduler, TaskId, TaskKind};
use crate::scope::{RecipeId, ScopeGraph, ScopeId, ScopeKind, Storage, Symbol, SymbolId, SymbolState, SymbolValue};
use crate::span::Span;
use crate::types::{Layout, LayoutError, StructId, TypeId, TypeKind, TypeTable};
use crate::value::ConstValue;
use crate::vm::{Outcome, Trap, TrapKind, Vm};

/// Why a task run stopped early.
#[derive(Debug)]
pub(crate) enum Halt {
    /// Waiting for another task; the run is retried once it finishes.
    Postpone(TaskId),
    Error(Diagnostic),
    Trap(Trap),
    /// Failed because a dependency failed; already reported elsewhere.
    Silent,
    Fatal(CoreError),
}

impl From<Diagnostic> for Halt {
    fn from(diag: Diagnostic) -> Self {
        Halt::Error(diag)
    }
}

pub(crate) type BResult<T> = Result<T, Halt>;

/// Analyzed form of an expression.
#[derive(Debug, Clone)]
pub(crate) enum Val {
    Const(ConstValue),
    /// Result of an instruction.
    Instr(InstrId),
    /// Storage location; the instruction yields its address.
    Place(InstrId),
    Group(Vec<FnId>),
    Poly(RecipeId),
    Scope(ScopeId),
}

#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub val: Val,
    /// Value type; for places the type of the stored value.
    pub ty: TypeId,
    pub span: Span,
    /// Places only: may be assigned to.
    pub mutable: bool,
    /// Untyped numeric literal (possibly folded) that may adapt to the
    /// expected type.
    pub literal: bool,
}

impl Operand {
    pub fn constant(value: ConstValue, ty: TypeId, span: Span) -> Self {
        Operand { val: Val::Const(value), ty, span, mutable: false, literal: false }
    }

    pub fn instr(id: InstrId, ty: TypeId, span: Span) -> Self {
        Operand { val: Val::Instr(id), ty, span, mutable: false, literal: false }
    }

    pub fn place(ptr: InstrId, ty: TypeId, span: Span, mutable: bool) -> Self {
        Operand { val: Val::Place(ptr), ty, span, mutable, literal: false }
    }

    fn special(val: Val, span: Span) -> Self {
        Operand { val, ty: TypeId::VOID, span, mutable: false, literal: false }
    }

    pub fn as_const(&self) -> Option<&ConstValue> {
        match &self.val {
            Val::Const(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PolyRecipe {
    pub name: String,
    pub lit: AstId,
    pub scope: ScopeId,
}

/// Where a declared function's body comes from.
#[derive(Debug, Clone)]
struct FnSource {
    lit: AstId,
    scope: ScopeId,
    /// Polymorphic type names bound by a specialization.
    bindings: Vec<(Ident, TypeId)>,
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    continue_to: BlockId,
    break_to: BlockId,
    /// Defer frames open when the loop was entered.
    defer_depth: usize,
}

/// Statements deferred in one lexical block, in declaration order.
#[derive(Debug, Default)]
struct DeferFrame {
    stmts: Vec<(AstId, ScopeId)>,
}

/// Function under construction.
#[derive(Debug)]
pub(crate) struct FnCtx {
    pub func: MirFn,
    pub current: BlockId,
    reachable: Vec<bool>,
    loops: Vec<LoopTargets>,
    defers: Vec<DeferFrame>,
    /// Set while a deferred statement is lowered; it may not leave its block.
    in_defer: bool,
}

impl FnCtx {
    pub fn new(func: MirFn) -> Self {
        let mut ctx = FnCtx {
            func,
            current: BlockId(0),
            reachable: Vec::new(),
            loops: Vec::new(),
            defers: Vec::new(),
            in_defer: false,
        };
        ctx.current = ctx.add_block("entry");
        ctx.reachable[0] = true;
        ctx
    }

    /// Context whose instructions are never executed; used where only the
    /// type of an expression matters.
    pub fn scratch(span: Span) -> Self {
        let mut func = MirFn::new("<scratch>", TypeId::VOID, Vec::new(), TypeId::VOID, span);
        func.flavor = FnFlavor::ComptimeOnly;
        FnCtx::new(func)
    }

    pub fn add_block(&mut self, name: &'static str) -> BlockId {
        self.reachable.push(false);
        self.func.blocks.push(Block { name, instrs: Vec::new() })
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn is_terminated(&self) -> bool {
        self.func.blocks[self.current].terminator(&self.func.instrs).is_some()
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable[self.current.0 as usize]
    }

    pub fn emit(&mut self, kind: InstrKind, ty: TypeId, span: Span) -> InstrId {
        if self.is_terminated() {
            let dead = self.add_block("dead");
            self.current = dead;
        }
        let id = self.func.instrs.push(Instr {
            kind,
            ty,
            span,
            block: self.current,
        });
        self.func.blocks[self.current].instrs.push(id);
        id
    }

    fn mark_reachable(&mut self, target: BlockId) {
        if self.is_reachable() && !self.is_terminated() {
            self.reachable[target.0 as usize] = true;
        }
    }

    /// Jump to `target` unless the current block already ended.
    pub fn branch(&mut self, target: BlockId, span: Span) {
        if self.is_terminated() {
            return;
        }
        self.mark_reachable(target);
        self.emit(InstrKind::Br(target), TypeId::VOID, span);
    }

    pub fn switch_branch(&mut self, value: InstrId, cases: Vec<(u64, BlockId)>, default: BlockId, span: Span) {
        for &(_, target) in &cases {
            self.mark_reachable(target);
        }
        self.mark_reachable(default);
        self.emit(InstrKind::Switch { value, cases, default }, TypeId::VOID, span);
    }

    pub fn cond_branch(&mut self, cond: InstrId, then_block: BlockId, else_block: BlockId, span: Span) {
        self.mark_reachable(then_block);
        self.mark_reachable(else_block);
        self.emit(
            InstrKind::CondBr { cond, then_block, else_block },
            TypeId::VOID,
            span,
        );
    }
}

/// Analysis state of a session.
pub(crate) struct Builder {
    pub config: SessionConfig,
    pub ast: crate::ast::Ast,
    pub types: TypeTable,
    pub scopes: ScopeGraph,
    pub mir: Mir,
    pub scheduler: Scheduler,
    pub diagnostics: Diagnostics,
    pub natives: Box<dyn NativeBridge>,
    pub builtin_scope: ScopeId,
    pub global_scope: ScopeId,
    pub eval_results: HashMap<TaskId, ConstValue>,
    recipes: Arena<RecipeId, PolyRecipe>,
    specializations: HashMap<(RecipeId, Vec<TypeId>), FnId>,
    fn_sources: HashMap<FnId, FnSource>,
    fn_tasks: HashMap<FnId, TaskId>,
    /// Function literals already declared, keyed by node and enclosing function.
    lit_fns: HashMap<(AstId, Option<FnId>), FnId>,
    lit_recipes: HashMap<(AstId, Option<FnId>), RecipeId>,
    nominal: HashMap<(AstId, Option<FnId>), TypeId>,
    struct_tasks: HashMap<StructId, TaskId>,
    /// Task being run and the function whose body it builds, if any.
    task: Option<TaskId>,
    owner: Option<FnId>,
}

impl Builder {
    pub fn new(config: SessionConfig, ast: crate::ast::Ast, natives: Box<dyn NativeBridge>) -> Self {
        let mut builder = Builder {
            config,
            ast,
            types: TypeTable::new(),
            scopes: ScopeGraph::new(),
            mir: Mir::new(),
            scheduler: Scheduler::new(),
            diagnostics: Diagnostics::new(),
            natives,
            builtin_scope: ScopeId(0),
            global_scope: ScopeId(0),
            eval_results: HashMap::new(),
            recipes: Arena::new(),
            specializations: HashMap::new(),
            fn_sources: HashMap::new(),
            fn_tasks: HashMap::new(),
            lit_fns: HashMap::new(),
            lit_recipes: HashMap::new(),
            nominal: HashMap::new(),
            struct_tasks: HashMap::new(),
            task: None,
            owner: None,
        };
        builder.builtin_scope = builder.scopes.create_scope(ScopeKind::Builtin, None);
        for (name, ty) in TypeTable::builtin_names() {
            let name = builder.ast.intern(name);
            let inserted = builder.scopes.insert(Symbol {
                name,
                storage: Storage::Global,
                mutable: false,
                scope: builder.builtin_scope,
                node: None,
                span: Span::dummy(),
                state: SymbolState::Resolved(SymbolValue::Type(ty)),
            });
            debug_assert!(inserted.is_ok());
        }
        builder.global_scope = builder.scopes.create_scope(ScopeKind::Global, Some(builder.builtin_scope));
        builder
    }

    // -----------------------------------------------------------------
    // Diagnostics helpers
    // -----------------------------------------------------------------

    pub fn span(&self, node: AstId) -> Span {
        self.ast[node].span
    }

    pub fn ty_name(&self, ty: TypeId) -> String {
        self.types.display(ty)
    }

    pub fn type_error(&self, span: Span, message: impl Into<String>) -> Halt {
        Halt::Error(Diagnostic::error(ErrorKind::Type, message).with_span(span))
    }

    pub fn resolution_error(&self, span: Span, message: impl Into<String>) -> Halt {
        Halt::Error(Diagnostic::error(ErrorKind::Resolution, message).with_span(span))
    }

    pub fn malformed(&self, node: AstId, message: impl Into<String>) -> Halt {
        Halt::Fatal(CoreError::MalformedAst {
            node,
            message: message.into(),
        })
    }

    pub fn internal(&self, message: impl Into<String>) -> Halt {
        Halt::Fatal(CoreError::Internal(message.into()))
    }

    pub fn mismatch(&self, span: Span, expected: TypeId, found: TypeId) -> Halt {
        let message = format!("expected `{}`, found `{}`", self.ty_name(expected), self.ty_name(found));
        self.type_error(span, message)
    }

    /// Turn a layout failure into a postponement or a type error.
    pub fn layout_halt(&self, err: LayoutError, span: Span) -> Halt {
        match err {
            LayoutError::Incomplete(id) => match self.struct_tasks.get(&id) {
                Some(&task) => Halt::Postpone(task),
                None => self.internal(format!("struct `{}` has no declaring task", self.types.struct_def(id).name)),
            },
            LayoutError::Recursive(id) => self.type_error(
                span,
                format!("struct `{}` contains itself by value", self.types.struct_def(id).name),
            ),
            LayoutError::TooLarge(ty) => self.type_error(span, format!("type `{}` is too large", self.ty_name(ty))),
        }
    }

    fn trap_halt(&self, trap: Trap) -> Halt {
        match trap.kind {
            // The callee failed on its own and was reported already.
            TrapKind::IncompleteFunction(_) => Halt::Silent,
            _ => Halt::Trap(trap),
        }
    }

    /// Postpone on the body task of a function that is not analyzed yet.
    fn wait_for_fn(&self, func: FnId) -> Halt {
        match self.fn_tasks.get(&func) {
            Some(&task) => Halt::Postpone(task),
            None => self.internal(format!("function `{}` has no body task", self.mir.function(func).name)),
        }
    }

    // -----------------------------------------------------------------
    // Task driver
    // -----------------------------------------------------------------

    /// Register the top-level items of a unit in `scope`.
    pub fn register_items(&mut self, scope: ScopeId, items: &[AstId]) -> Result<(), CoreError> {
        for &item in items {
            let span = self.span(item);
            match self.ast[item].kind.clone() {
                AstKind::Decl(decl) => {
                    let Some(symbol) = self.declare(scope, decl.name, Storage::Global, decl.mutable, item, span) else {
                        continue;
                    };
                    let task = self.scheduler.submit(TaskKind::Global(symbol));
                    self.scopes.symbol_mut(symbol).state = SymbolState::Unresolved { task: Some(task) };
                }
                AstKind::Module { name, items } => {
                    let module = self.scopes.create_scope(ScopeKind::Module, Some(scope));
                    if let Some(symbol) = self.declare(scope, name, Storage::Global, false, item, span) {
                        self.scopes.resolve(symbol, SymbolValue::Scope(module));
                    }
                    self.register_items(module, &items)?;
                }
                _ => {
                    return Err(CoreError::MalformedAst {
                        node: item,
                        message: "expected a declaration or a module at top level".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Insert an unresolved symbol, reporting redeclarations.
    fn declare(
        &mut self,
        scope: ScopeId,
        name: Ident,
        storage: Storage,
        mutable: bool,
        node: AstId,
        span: Span,
    ) -> Option<SymbolId> {
        let symbol = Symbol {
            name,
            storage,
            mutable,
            scope,
            node: Some(node),
            span,
            state: SymbolState::Unresolved { task: None },
        };
        match self.scopes.insert(symbol) {
            Ok(id) => Some(id),
            Err(previous) => {
                self.diagnostics.emit(self.redeclaration(name, span, previous));
                None
            }
        }
    }

    fn redeclaration(&self, name: Ident, span: Span, previous: SymbolId) -> Diagnostic {
        let previous = self.scopes.symbol(previous);
        Diagnostic::error(
            ErrorKind::Resolution,
            format!("symbol `{}` is already declared in this scope", self.ast.name(name)),
        )
        .with_span(span)
        .with_note("previously declared here", Some(previous.span))
    }

    pub fn run_task(&mut self, task: TaskId) -> BResult<()> {
        self.task = Some(task);
        self.owner = None;
        let result = match self.scheduler.kind(task) {
            TaskKind::Global(symbol) => self.analyze_global(symbol),
            TaskKind::FnBody(func) => self.analyze_fn_body(func),
            TaskKind::Eval(node) => {
                let scope = self.global_scope;
                self.comptime_value(scope, node, None).map(|(value, _)| {
                    self.eval_results.insert(task, value);
                })
            }
        };
        self.task = None;
        self.owner = None;
        result
    }

    /// Undo per-run state of a postponed task.
    pub fn on_postpone(&mut self, task: TaskId) {
        if let TaskKind::FnBody(func) = self.scheduler.kind(task) {
            self.mir.fns[func].state = FnState::Pending;
        }
    }

    pub fn mark_failed(&mut self, task: TaskId) {
        match self.scheduler.kind(task) {
            TaskKind::Global(symbol) => self.scopes.fail(symbol),
            TaskKind::FnBody(func) => self.mir.fns[func].state = FnState::Failed,
            TaskKind::Eval(_) => {}
        }
    }

    /// Human-readable name of a task for cycle reports.
    pub fn task_label(&self, task: TaskId) -> (String, Span) {
        match self.scheduler.kind(task) {
            TaskKind::Global(symbol) => {
                let symbol = self.scopes.symbol(symbol);
                (format!("`{}`", self.ast.name(symbol.name)), symbol.span)
            }
            TaskKind::FnBody(func) => {
                let func = self.mir.function(func);
                (format!("body of `{}`", func.name), func.span)
            }
            TaskKind::Eval(node) => ("compile-time expression".to_string(), self.span(node)),
        }
    }

    // -----------------------------------------------------------------
    // Globals
    // -----------------------------------------------------------------

    fn analyze_global(&mut self, symbol: SymbolId) -> BResult<()> {
        let (node, scope) = {
            let sym = self.scopes.symbol(symbol);
            (sym.node, sym.scope)
        };
        let Some(node) = node else {
            return Err(self.internal("global task for a builtin symbol"));
        };
        let span = self.span(node);
        let AstKind::Decl(decl) = self.ast[node].kind.clone() else {
            return Err(self.malformed(node, "global task on a non-declaration"));
        };
        let name = self.ast.name(decl.name).to_string();
        log::debug!("analyzing global `{name}`");

        if let Some(value) = self.compile_time_binding(scope, &decl, &name, Some(symbol))? {
            if let (Some(ty), SymbolValue::Fn(func)) = (decl.ty, &value) {
                let declared = self.resolve_type(scope, ty)?;
                let actual = self.mir.function(*func).ty;
                if declared != actual {
                    return Err(self.mismatch(span, declared, actual));
                }
            }
            self.scopes.resolve(symbol, value);
            return Ok(());
        }

        let declared = match decl.ty {
            Some(ty) => Some(self.resolve_type(scope, ty)?),
            None => None,
        };
        let (value, ty) = match (decl.value, declared) {
            (Some(init), _) => self.comptime_value(scope, init, declared)?,
            (None, Some(ty)) => {
                let zero = self.zero_value(ty, span)?;
                (zero, ty)
            }
            (None, None) => return Err(self.malformed(node, "declaration without type or value")),
        };
        let value = match (value, decl.mutable) {
            (ConstValue::Type(t), false) => SymbolValue::Type(t),
            (ConstValue::Fn(f), false) => SymbolValue::Fn(f),
            (value, mutable) => {
                self.check_storage(ty, mutable, span)?;
                // Constants still get a global so the backend can emit them.
                let global = self.mir.globals.push(MirGlobal {
                    name,
                    ty,
                    value: value.clone(),
                    mutable,
                    span,
                });
                if mutable { SymbolValue::Global(global) } else { SymbolValue::Const { ty, value } }
            }
        };
        self.scopes.resolve(symbol, value);
        Ok(())
    }

    /// Symbol value of a declaration whose initializer is a function,
    /// function group or type definition; `None` for plain values.
    fn compile_time_binding(
        &mut self,
        scope: ScopeId,
        decl: &Decl,
        name: &str,
        symbol: Option<SymbolId>,
    ) -> BResult<Option<SymbolValue>> {
        let Some(init) = decl.value else {
            return Ok(None);
        };
        let span = self.span(init);
        let value = match self.ast[init].kind.clone() {
            AstKind::FnLit(_) => self.bind_fn_literal(scope, init, name)?,
            AstKind::FnGroup(members) => SymbolValue::FnGroup(self.fn_group(scope, init, name, &members)?),
            AstKind::StructType { .. } | AstKind::EnumType { .. } => {
                SymbolValue::Type(self.nominal_type(scope, init, name, symbol)?)
            }
            _ => return Ok(None),
        };
        if decl.mutable {
            return Err(self.type_error(span, format!("`{name}` must be immutable")));
        }
        Ok(Some(value))
    }

    /// Reject variables of types that have no storage.
    pub fn check_storage(&self, ty: TypeId, mutable: bool, span: Span) -> BResult<()> {
        if ty == TypeId::VOID || ty == TypeId::NULL {
            return Err(self.type_error(span, format!("cannot declare a variable of type `{}`", self.ty_name(ty))));
        }
        if mutable && ty == TypeId::TYPE {
            return Err(self.type_error(span, "types cannot be stored in mutable variables"));
        }
        self.value_layout(ty, span).map(drop)
    }

    /// Layout of a type whose values the builder materializes, bounded by
    /// [`SessionConfig::max_value_size`].
    pub fn value_layout(&self, ty: TypeId, span: Span) -> BResult<Layout> {
        let layout = self.types.layout(ty).map_err(|e| self.layout_halt(e, span))?;
        let limit = self.config.max_value_size;
        if layout.size > limit || self.types.scalar_count(ty) > limit {
            return Err(self.type_error(
                span,
                format!("type `{}` is too large for a compile-time value (limit {limit} bytes)", self.ty_name(ty)),
            ));
        }
        Ok(layout)
    }

    pub fn zero_value(&self, ty: TypeId, span: Span) -> BResult<ConstValue> {
        self.value_layout(ty, span)?;
        ConstValue::zero(&self.types, ty).map_err(|e| self.layout_halt(e, span))
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    fn fn_literal(&self, node: AstId) -> BResult<FnLit> {
        match &self.ast[node].kind {
            AstKind::FnLit(lit) => Ok(lit.clone()),
            _ => Err(self.malformed(node, "expected a function literal")),
        }
    }

    /// True if a type expression mentions a `?T` placeholder.
    fn mentions_poly(&self, node: AstId) -> bool {
        match &self.ast[node].kind {
            AstKind::PolyType(_) => true,
            AstKind::PtrType(inner) | AstKind::SliceType(inner) => self.mentions_poly(*inner),
            AstKind::ArrayType { elem, .. } => self.mentions_poly(*elem),
            AstKind::FnType(sig) => {
                sig.params.iter().any(|p| self.mentions_poly(p.ty)) || sig.ret.is_some_and(|r| self.mentions_poly(r))
            }
            _ => false,
        }
    }

    /// Function or recipe bound by a function literal.
    fn bind_fn_literal(&mut self, scope: ScopeId, node: AstId, name: &str) -> BResult<SymbolValue> {
        let key = (node, self.owner);
        let lit = self.fn_literal(node)?;
        if lit.sig.params.iter().any(|p| self.mentions_poly(p.ty)) {
            if lit.extern_name.is_some() {
                return Err(self.type_error(self.span(node), "external functions cannot be polymorphic"));
            }
            if let Some(&recipe) = self.lit_recipes.get(&key) {
                return Ok(SymbolValue::PolyFn(recipe));
            }
            let recipe = self.recipes.push(PolyRecipe {
                name: name.to_string(),
                lit: node,
                scope,
            });
            self.lit_recipes.insert(key, recipe);
            return Ok(SymbolValue::PolyFn(recipe));
        }
        if let Some(&func) = self.lit_fns.get(&key) {
            return Ok(SymbolValue::Fn(func));
        }
        let func = self.declare_fn(scope, node, name, Vec::new())?;
        self.lit_fns.insert(key, func);
        Ok(SymbolValue::Fn(func))
    }

    /// Scope holding the type bindings of a specialization.
    fn fn_scope(&mut self, parent: ScopeId, bindings: &[(Ident, TypeId)]) -> ScopeId {
        let scope = self.scopes.create_scope(ScopeKind::Fn, Some(parent));
        for &(name, ty) in bindings {
            let _ = self.scopes.insert(Symbol {
                name,
                storage: Storage::Local,
                mutable: false,
                scope,
                node: None,
                span: Span::dummy(),
                state: SymbolState::Resolved(SymbolValue::Type(ty)),
            });
        }
        scope
    }

    /// Resolve the signature of a function literal and create its MIR
    /// function; bodies are analyzed by a separate task.
    fn declare_fn(
        &mut self,
        scope: ScopeId,
        node: AstId,
        name: &str,
        bindings: Vec<(Ident, TypeId)>,
    ) -> BResult<FnId> {
        let lit = self.fn_literal(node)?;
        let span = self.span(node);
        let sig_scope = self.fn_scope(scope, &bindings);

        let mut params = Vec::with_capacity(lit.sig.params.len());
        for param in &lit.sig.params {
            let ty = self.resolve_type(sig_scope, param.ty)?;
            if ty == TypeId::VOID {
                return Err(self.type_error(param.span, "parameters cannot have type `void`"));
            }
            params.push(ty);
        }
        let ret = match lit.sig.ret {
            Some(ret) => self.resolve_type(sig_scope, ret)?,
            None => TypeId::VOID,
        };
        let fn_ty = self.types.function(params.clone(), ret);
        if lit.test && (!params.is_empty() || ret != TypeId::VOID || lit.body.is_none()) {
            return Err(self.type_error(span, format!("test case `{name}` must be a `fn()` with a body")));
        }
        let mut func = MirFn::new(name, fn_ty, params, ret, span);
        if lit.comptime {
            func.flavor = FnFlavor::ComptimeOnly;
        }
        func.test = lit.test;
        match (&lit.extern_name, lit.body) {
            (Some(linkage), None) => {
                func.native = Some(linkage.clone());
                func.state = FnState::Analyzed;
            }
            (None, Some(_)) => {}
            _ => return Err(self.malformed(node, "function needs either a body or an external name")),
        }
        let native = func.native.is_some();
        let id = self.mir.fns.push(func);
        self.fn_sources.insert(id, FnSource { lit: node, scope, bindings });
        if !native {
            let task = self.scheduler.submit(TaskKind::FnBody(id));
            self.fn_tasks.insert(id, task);
        }
        log::debug!("declared fn `{name}` as {id}");
        Ok(id)
    }

    fn analyze_fn_body(&mut self, id: FnId) -> BResult<()> {
        let Some(source) = self.fn_sources.get(&id).cloned() else {
            return Err(self.internal(format!("{id} has no source")));
        };
        let lit = self.fn_literal(source.lit)?;
        let Some(body) = lit.body else {
            return Err(self.malformed(source.lit, "function body task without a body"));
        };
        self.owner = Some(id);

        let header = {
            let func = &mut self.mir.fns[id];
            func.state = FnState::Analyzing;
            let mut header = MirFn::new(func.name.clone(), func.ty, func.params.clone(), func.ret, func.span);
            header.flavor = func.flavor;
            header
        };
        log::debug!("analyzing body of `{}`", header.name);
        let ret = header.ret;
        let span = header.span;
        let params = header.params.clone();
        let mut f = FnCtx::new(header);

        let scope = self.fn_scope(source.scope, &source.bindings);
        for (param, ty) in lit.sig.params.iter().zip(params) {
            let local = f.func.locals.push(crate::mir::Local {
                name: self.ast.name(param.name).to_string(),
                ty,
                offset: 0,
                span: param.span,
            });
            f.func.param_locals.push(local);
            let symbol = Symbol {
                name: param.name,
                storage: Storage::Argument,
                mutable: false,
                scope,
                node: None,
                span: param.span,
                state: SymbolState::Resolved(SymbolValue::Local { local, ty }),
            };
            if let Err(previous) = self.scopes.insert(symbol) {
                return Err(Halt::Error(self.redeclaration(param.name, param.span, previous)));
            }
        }

        match self.ast[body].kind.clone() {
            AstKind::Block(stmts) => self.block(&mut f, scope, &stmts)?,
            _ => self.stmt(&mut f, scope, body)?,
        }

        if !f.is_terminated() {
            if !f.is_reachable() {
                f.emit(InstrKind::Unreachable, TypeId::VOID, span);
            } else if ret == TypeId::VOID {
                f.emit(InstrKind::Ret(None), TypeId::VOID, span);
            } else {
                let message = format!("function `{}` must return a value of type `{}`", f.func.name, self.ty_name(ret));
                return Err(self.type_error(span, message));
            }
        }
        f.func.layout_frame(&self.types).map_err(|e| self.layout_halt(e, span))?;

        let func = &mut self.mir.fns[id];
        func.install_body(f.func);
        func.state = FnState::Analyzed;
        log::debug!("analyzed `{}` ({} instructions)", func.name, func.instrs.len());
        Ok(())
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    /// Evaluate a type expression.
    pub fn resolve_type(&mut self, scope: ScopeId, node: AstId) -> BResult<TypeId> {
        let span = self.span(node);
        match self.ast[node].kind.clone() {
            AstKind::PtrType(inner) => {
                let inner = self.resolve_type(scope, inner)?;
                Ok(self.types.ptr(inner))
            }
            AstKind::SliceType(inner) => {
                let inner = self.resolve_type(scope, inner)?;
                Ok(self.types.slice(inner))
            }
            AstKind::ArrayType { len, elem } => {
                let len = self.array_len(scope, len)?;
                let elem = self.resolve_type(scope, elem)?;
                Ok(self.types.array(elem, len))
            }
            AstKind::FnType(sig) => {
                let mut params = Vec::with_capacity(sig.params.len());
                for param in &sig.params {
                    params.push(self.resolve_type(scope, param.ty)?);
                }
                let ret = match sig.ret {
                    Some(ret) => self.resolve_type(scope, ret)?,
                    None => TypeId::VOID,
                };
                Ok(self.types.function(params, ret))
            }
            AstKind::StructType { .. } | AstKind::EnumType { .. } => self.nominal_type(scope, node, "<anonymous>", None),
            AstKind::PolyType(name) => {
                let bound = self.scopes.lookup(scope, name, false).and_then(|l| match self.scopes.symbol(l.symbol).value() {
                    Some(SymbolValue::Type(ty)) => Some(*ty),
                    _ => None,
                });
                bound.ok_or_else(|| {
                    self.type_error(span, format!("polymorphic type `?{}` is not bound here", self.ast.name(name)))
                })
            }
            _ => {
                let (value, ty) = self.comptime_value(scope, node, None)?;
                match value {
                    ConstValue::Type(t) if ty == TypeId::TYPE => Ok(t),
                    _ => Err(self.type_error(span, format!("expected a type, found a value of type `{}`", self.ty_name(ty)))),
                }
            }
        }
    }

    fn array_len(&mut self, scope: ScopeId, node: AstId) -> BResult<u64> {
        let (value, ty) = self.comptime_value(scope, node, None)?;
        let span = self.span(node);
        match (value, self.types.int_info(ty)) {
            (ConstValue::Int(raw), Some((_, signed))) if !(signed && (raw as i64) < 0) => Ok(raw),
            _ => Err(self.type_error(span, "array length must be a non-negative integer constant")),
        }
    }

    /// Struct or enum type defined by `node`, declared once per enclosing
    /// function. `bind` is resolved to the type before the members are
    /// analyzed so the type can refer to itself.
    fn nominal_type(&mut self, scope: ScopeId, node: AstId, name: &str, bind: Option<SymbolId>) -> BResult<TypeId> {
        let span = self.span(node);
        let key = (node, self.owner);
        let kind = self.ast[node].kind.clone();
        let cached = self.nominal.get(&key).copied();
        let ty = match (cached, &kind) {
            (Some(ty), _) => ty,
            (None, AstKind::StructType { .. }) => {
                let (id, ty) = self.types.declare_struct(name, span);
                if let Some(task) = self.task {
                    self.struct_tasks.insert(id, task);
                }
                self.nominal.insert(key, ty);
                ty
            }
            (None, AstKind::EnumType { base, .. }) => {
                let base = match base {
                    Some(base) => self.resolve_type(scope, *base)?,
                    None => TypeId::S32,
                };
                if !self.types.is_int(base) {
                    return Err(self.type_error(span, format!("enum base type must be an integer, found `{}`", self.ty_name(base))));
                }
                let (_, ty) = self.types.declare_enum(name, base, span);
                self.nominal.insert(key, ty);
                ty
            }
            _ => return Err(self.malformed(node, "expected a struct or enum type")),
        };
        // Enums are bound by the caller once their variants are known.
        if let (Some(symbol), TypeKind::Struct(_)) = (bind, self.types.kind(ty)) {
            self.scopes.resolve(symbol, SymbolValue::Type(ty));
        }

        match (self.types.kind(ty).clone(), kind) {
            (TypeKind::Struct(id), AstKind::StructType { members }) if self.types.struct_def(id).members.is_none() => {
                let mut resolved: Vec<crate::types::StructMember> = Vec::with_capacity(members.len());
                for member in &members {
                    if resolved.iter().any(|m| m.name == member.name) {
                        return Err(self.resolution_error(
                            member.span,
                            format!("duplicate member `{}`", self.ast.name(member.name)),
                        ));
                    }
                    let member_ty = self.resolve_type(scope, member.ty)?;
                    resolved.push(crate::types::StructMember { name: member.name, ty: member_ty });
                }
                self.types.complete_struct(id, resolved);
                if let Err(err @ (LayoutError::Recursive(_) | LayoutError::TooLarge(_))) = self.types.layout(ty) {
                    return Err(self.layout_halt(err, span));
                }
            }
            (TypeKind::Enum(id), AstKind::EnumType { variants, .. }) if self.types.enum_def(id).variants.is_none() => {
                let base = self.types.enum_def(id).base;
                let mut values: Vec<(Ident, u64)> = Vec::with_capacity(variants.len());
                let mut next = 0u64;
                for variant in &variants {
                    if values.iter().any(|(n, _)| *n == variant.name) {
                        return Err(self.resolution_error(
                            variant.span,
                            format!("duplicate variant `{}`", self.ast.name(variant.name)),
                        ));
                    }
                    let value = match variant.value {
                        Some(expr) => match self.comptime_value(scope, expr, Some(base))? {
                            (ConstValue::Int(raw), _) => raw,
                            _ => return Err(self.type_error(variant.span, "enum variant value must be an integer")),
                        },
                        None => next,
                    };
                    values.push((variant.name, value));
                    let (bits, signed) = self.types.int_info(base).unwrap_or((64, true));
                    next = crate::value::canonical_int(value.wrapping_add(1), bits, signed);
                }
                self.types.complete_enum(id, values);
            }
            _ => {}
        }
        Ok(ty)
    }

    // -----------------------------------------------------------------
    // Compile-time evaluation
    // -----------------------------------------------------------------

    /// Evaluate `node` at compile time, folding when possible and running
    /// the VM otherwise.
    pub fn comptime_value(
        &mut self,
        scope: ScopeId,
        node: AstId,
        expected: Option<TypeId>,
    ) -> BResult<(ConstValue, TypeId)> {
        let span = self.span(node);
        let mut func = MirFn::new("<comptime>", TypeId::VOID, Vec::new(), TypeId::VOID, span);
        func.flavor = FnFlavor::ComptimeOnly;
        let mut f = FnCtx::new(func);
        // A function scope keeps runtime locals of the surroundings out of reach.
        let eval_scope = self.scopes.create_scope(ScopeKind::Fn, Some(scope));

        let op = self.expr(&mut f, eval_scope, node)?;
        let op = match expected {
            Some(ty) => self.coerce(&mut f, op, ty)?,
            None => self.rvalue(&mut f, op)?,
        };
        match &op.val {
            Val::Const(value) => return Ok((value.clone(), op.ty)),
            Val::Instr(_) | Val::Place(_) => {}
            Val::Group(_) | Val::Poly(_) | Val::Scope(_) => {
                return Err(self.type_error(span, "expected a value"));
            }
        }

        let ty = op.ty;
        let result = self.materialize(&mut f, op)?;
        f.emit(InstrKind::Ret(Some(result)), TypeId::VOID, span);
        f.func.ret = ty;
        f.func.state = FnState::Analyzed;
        f.func.layout_frame(&self.types).map_err(|e| self.layout_halt(e, span))?;
        log::trace!("running comptime expression at {span} through the VM");

        let outcome = {
            let mut vm = Vm::new(self.config.vm.clone(), &self.mir, &self.types, self.natives.as_ref());
            vm.run_fn(&f.func, &[])
        };
        self.outcome(outcome).map(|value| (value, ty))
    }

    /// Call an analyzed function at compile time.
    pub fn comptime_call(&mut self, func: FnId, args: &[ConstValue]) -> BResult<ConstValue> {
        let outcome = {
            let mut vm = Vm::new(self.config.vm.clone(), &self.mir, &self.types, self.natives.as_ref());
            vm.run(func, args)
        };
        self.outcome(outcome)
    }

    fn outcome(&self, outcome: Outcome) -> BResult<ConstValue> {
        match outcome {
            Outcome::Returned(value) => Ok(value),
            Outcome::Trapped(trap) => Err(self.trap_halt(trap)),
            Outcome::Postponed(func) => Err(self.wait_for_fn(func)),
        }
    }
}
