//! Statements and local declarations.

use crate::ast::{AstId, AstKind, Decl, SwitchCase};
use crate::mir::{BlockId, InstrKind, Local};
use crate::scope::{ScopeId, ScopeKind, Storage, Symbol, SymbolState, SymbolValue};
use crate::span::Span;
use crate::types::TypeId;
use crate::value::ConstValue;
use crate::vm::{Trap, TrapKind};

use super::{BResult, Builder, DeferFrame, FnCtx, Halt, LoopTargets, Operand, Val};

impl Builder {
    pub(super) fn block(&mut self, f: &mut FnCtx, scope: ScopeId, stmts: &[AstId]) -> BResult<()> {
        let inner = self.scopes.create_scope(ScopeKind::Lexical, Some(scope));
        f.defers.push(DeferFrame::default());
        let result = stmts.iter().try_for_each(|&stmt| self.stmt(f, inner, stmt));
        let frame = f.defers.pop().unwrap_or_default();
        result?;
        // Exits through return, break or continue already ran the frame.
        if f.is_terminated() {
            return Ok(());
        }
        self.emit_deferred(f, frame.stmts.into_iter().rev().collect())
    }

    /// Lower deferred statements at one exit of their blocks.
    fn emit_deferred(&mut self, f: &mut FnCtx, stmts: Vec<(AstId, ScopeId)>) -> BResult<()> {
        let outer = std::mem::replace(&mut f.in_defer, true);
        let result = stmts.into_iter().try_for_each(|(stmt, scope)| self.stmt(f, scope, stmt));
        f.in_defer = outer;
        result
    }

    /// Deferred statements of the frames from `depth` inward, innermost
    /// and latest first.
    fn pending_defers(f: &FnCtx, depth: usize) -> Vec<(AstId, ScopeId)> {
        f.defers[depth.min(f.defers.len())..]
            .iter()
            .rev()
            .flat_map(|frame| frame.stmts.iter().rev().copied())
            .collect()
    }

    pub(super) fn stmt(&mut self, f: &mut FnCtx, scope: ScopeId, node: AstId) -> BResult<()> {
        let span = self.span(node);
        match self.ast[node].kind.clone() {
            AstKind::Decl(decl) => self.local_decl(f, scope, node, &decl),
            AstKind::Block(stmts) => self.block(f, scope, &stmts),
            AstKind::If { cond, then_branch, else_branch } => {
                let cond = self.condition(f, scope, cond)?;
                let then_block = f.add_block("if.then");
                let else_block = else_branch.map(|_| f.add_block("if.else"));
                let end = f.add_block("if.end");
                f.cond_branch(cond, then_block, else_block.unwrap_or(end), span);

                f.switch_to(then_block);
                self.stmt(f, scope, then_branch)?;
                f.branch(end, span);
                if let (Some(block), Some(branch)) = (else_block, else_branch) {
                    f.switch_to(block);
                    self.stmt(f, scope, branch)?;
                    f.branch(end, span);
                }
                f.switch_to(end);
                Ok(())
            }
            AstKind::Loop { cond, body } => {
                let cond_block = f.add_block("loop.cond");
                let body_block = f.add_block("loop.body");
                let end = f.add_block("loop.end");
                f.branch(cond_block, span);
                f.switch_to(cond_block);
                match cond {
                    Some(cond) => {
                        let cond = self.condition(f, scope, cond)?;
                        f.cond_branch(cond, body_block, end, span);
                    }
                    None => f.branch(body_block, span),
                }
                f.loops.push(LoopTargets {
                    continue_to: cond_block,
                    break_to: end,
                    defer_depth: f.defers.len(),
                });
                f.switch_to(body_block);
                let body = self.stmt(f, scope, body);
                f.loops.pop();
                body?;
                f.branch(cond_block, span);
                f.switch_to(end);
                Ok(())
            }
            AstKind::Break | AstKind::Continue => {
                let is_break = matches!(self.ast[node].kind, AstKind::Break);
                let word = if is_break { "break" } else { "continue" };
                if f.in_defer {
                    return Err(self.type_error(span, format!("`{word}` is not allowed in a deferred statement")));
                }
                let Some(targets) = f.loops.last().copied() else {
                    return Err(self.type_error(span, format!("`{word}` outside of a loop")));
                };
                let target = if is_break { targets.break_to } else { targets.continue_to };
                let pending = Self::pending_defers(f, targets.defer_depth);
                self.emit_deferred(f, pending)?;
                f.branch(target, span);
                Ok(())
            }
            AstKind::Return(value) => {
                if f.in_defer {
                    return Err(self.type_error(span, "`return` is not allowed in a deferred statement"));
                }
                self.return_stmt(f, scope, value, span)
            }
            AstKind::Switch { value, cases } => self.switch_stmt(f, scope, value, &cases, span),
            AstKind::Defer(inner) => {
                if f.in_defer {
                    return Err(self.type_error(span, "`defer` is not allowed in a deferred statement"));
                }
                if matches!(self.ast[inner].kind, AstKind::Decl(_)) {
                    return Err(self.type_error(span, "declarations cannot be deferred"));
                }
                let Some(frame) = f.defers.last_mut() else {
                    return Err(self.type_error(span, "`defer` outside of a block"));
                };
                frame.stmts.push((inner, scope));
                Ok(())
            }
            AstKind::Assign { op, target, value } => {
                let place = self.expr(f, scope, target)?;
                let Val::Place(ptr) = place.val else {
                    return Err(self.type_error(span, "left side of an assignment must be a variable"));
                };
                if !place.mutable {
                    return Err(self.type_error(span, "cannot assign to an immutable value"));
                }
                let ty = place.ty;
                let value = self.expr(f, scope, value)?;
                let value = match op {
                    Some(op) => {
                        let current = self.rvalue(f, place)?;
                        let rhs = self.rvalue(f, value)?;
                        self.binary(f, op, current, rhs, span)?
                    }
                    None => value,
                };
                let value = self.coerce(f, value, ty)?;
                let value = self.materialize(f, value)?;
                f.emit(InstrKind::Store { ptr, value }, TypeId::VOID, span);
                Ok(())
            }
            AstKind::Unreachable => {
                f.emit(InstrKind::Unreachable, TypeId::VOID, span);
                Ok(())
            }
            AstKind::Assert { cond, message } => {
                let cond = self.condition(f, scope, cond)?;
                f.emit(InstrKind::Assert { cond, message }, TypeId::VOID, span);
                Ok(())
            }
            AstKind::StaticAssert { cond, message } => {
                let (value, _) = self.comptime_value(scope, cond, Some(TypeId::BOOL))?;
                if value == ConstValue::Bool(false) {
                    return Err(Halt::Trap(Trap {
                        kind: TrapKind::AssertionFailed(message),
                        span,
                    }));
                }
                Ok(())
            }
            AstKind::Module { .. } => Err(self.malformed(node, "scopes can only be declared at top level")),
            _ => {
                // Expression statement; the value is discarded.
                let op = self.expr(f, scope, node)?;
                self.rvalue(f, op)?;
                Ok(())
            }
        }
    }

    fn condition(&mut self, f: &mut FnCtx, scope: ScopeId, node: AstId) -> BResult<crate::mir::InstrId> {
        let cond = self.expr(f, scope, node)?;
        let cond = self.coerce(f, cond, TypeId::BOOL)?;
        self.materialize(f, cond)
    }

    fn return_stmt(&mut self, f: &mut FnCtx, scope: ScopeId, value: Option<AstId>, span: Span) -> BResult<()> {
        let ret = f.func.ret;
        match value {
            Some(value) => {
                if ret == TypeId::VOID {
                    return Err(self.type_error(span, format!("function `{}` cannot return a value", f.func.name)));
                }
                let op = self.expr(f, scope, value)?;
                let op = self.coerce(f, op, ret)?;
                let id = self.materialize(f, op)?;
                // The value is computed before deferred statements run.
                let pending = Self::pending_defers(f, 0);
                self.emit_deferred(f, pending)?;
                f.emit(InstrKind::Ret(Some(id)), TypeId::VOID, span);
            }
            None => {
                if ret != TypeId::VOID {
                    return Err(self.type_error(
                        span,
                        format!("function `{}` must return a value of type `{}`", f.func.name, self.ty_name(ret)),
                    ));
                }
                let pending = Self::pending_defers(f, 0);
                self.emit_deferred(f, pending)?;
                f.emit(InstrKind::Ret(None), TypeId::VOID, span);
            }
        }
        Ok(())
    }

    /// `switch` over an integer or enum value. Case values are compile-time
    /// constants; control leaves the switch at the end of every case.
    fn switch_stmt(&mut self, f: &mut FnCtx, scope: ScopeId, value: AstId, cases: &[SwitchCase], span: Span) -> BResult<()> {
        let op = self.expr(f, scope, value)?;
        let op = self.rvalue(f, op)?;
        let ty = op.ty;
        if self.types.int_info(ty).is_none() {
            return Err(self.type_error(op.span, format!("cannot switch on a value of type `{}`", self.ty_name(ty))));
        }
        let value = self.materialize(f, op)?;

        let end = f.add_block("switch.end");
        let mut table: Vec<(u64, BlockId)> = Vec::new();
        let mut default = None;
        let mut arms = Vec::with_capacity(cases.len());
        for case in cases {
            let block = if case.is_default() {
                let block = f.add_block("switch.default");
                if default.replace(block).is_some() {
                    return Err(self.type_error(case.span, "switch has more than one default case"));
                }
                block
            } else {
                f.add_block("switch.case")
            };
            for &node in &case.values {
                let (constant, _) = self.comptime_value(scope, node, Some(ty))?;
                let Some(bits) = constant.as_bits() else {
                    return Err(self.type_error(self.span(node), "switch case must be an integer constant"));
                };
                if table.iter().any(|&(seen, _)| seen == bits) {
                    return Err(self.type_error(self.span(node), format!("duplicate switch case `{constant}`")));
                }
                table.push((bits, block));
            }
            arms.push((block, case.body));
        }
        log::trace!("switch with {} case value(s) in `{}`", table.len(), f.func.name);
        f.switch_branch(value, table, default.unwrap_or(end), span);

        for (block, body) in arms {
            f.switch_to(block);
            self.stmt(f, scope, body)?;
            f.branch(end, span);
        }
        f.switch_to(end);
        Ok(())
    }

    fn insert_local_symbol(&mut self, scope: ScopeId, decl: &Decl, span: Span, state: SymbolState) -> BResult<crate::scope::SymbolId> {
        let symbol = Symbol {
            name: decl.name,
            storage: Storage::Local,
            mutable: decl.mutable,
            scope,
            node: None,
            span,
            state,
        };
        self.scopes
            .insert(symbol)
            .map_err(|previous| Halt::Error(self.redeclaration(decl.name, span, previous)))
    }

    fn local_decl(&mut self, f: &mut FnCtx, scope: ScopeId, node: AstId, decl: &Decl) -> BResult<()> {
        let span = self.span(node);
        let name = self.ast.name(decl.name).to_string();

        let binds_directly = decl.value.is_some_and(|value| {
            matches!(
                self.ast[value].kind,
                AstKind::FnLit(_) | AstKind::FnGroup(_) | AstKind::StructType { .. } | AstKind::EnumType { .. }
            )
        });
        if binds_directly {
            // Inserted first so that nested types can refer to themselves.
            let symbol = self.insert_local_symbol(scope, decl, span, SymbolState::Unresolved { task: None })?;
            if let Some(value) = self.compile_time_binding(scope, decl, &name, Some(symbol))? {
                self.scopes.resolve(symbol, value);
            }
            return Ok(());
        }

        let declared = match decl.ty {
            Some(ty) => Some(self.resolve_type(scope, ty)?),
            None => None,
        };
        let init = match (decl.value, declared) {
            (Some(value), declared) => {
                let op = self.expr(f, scope, value)?;
                match declared {
                    Some(ty) => self.coerce(f, op, ty)?,
                    None => self.rvalue(f, op)?,
                }
            }
            (None, Some(ty)) => {
                let zero = self.zero_value(ty, span)?;
                Operand::constant(zero, ty, span)
            }
            (None, None) => return Err(self.malformed(node, "declaration without type or value")),
        };

        let value = match (&init.val, decl.mutable) {
            (Val::Const(ConstValue::Type(ty)), false) => Some(SymbolValue::Type(*ty)),
            (Val::Const(ConstValue::Fn(func)), false) => Some(SymbolValue::Fn(*func)),
            (Val::Const(value), false) => Some(SymbolValue::Const {
                ty: init.ty,
                value: value.clone(),
            }),
            (Val::Group(fns), false) => Some(SymbolValue::FnGroup(fns.clone())),
            (Val::Poly(recipe), false) => Some(SymbolValue::PolyFn(*recipe)),
            (Val::Scope(id), false) => Some(SymbolValue::Scope(*id)),
            (Val::Group(_) | Val::Poly(_) | Val::Scope(_), true) => {
                return Err(self.type_error(span, format!("`{name}` cannot be mutable")));
            }
            _ => None,
        };
        let value = match value {
            Some(value) => value,
            None => {
                let ty = init.ty;
                self.check_storage(ty, decl.mutable, span)?;
                let stored = self.materialize(f, init)?;
                let local = f.func.locals.push(Local {
                    name: name.clone(),
                    ty,
                    offset: 0,
                    span,
                });
                let ptr_ty = self.types.ptr(ty);
                let ptr = f.emit(InstrKind::VarPtr(local), ptr_ty, span);
                f.emit(InstrKind::Store { ptr, value: stored }, TypeId::VOID, span);
                SymbolValue::Local { local, ty }
            }
        };
        self.insert_local_symbol(scope, decl, span, SymbolState::Resolved(value))?;
        Ok(())
    }
}
