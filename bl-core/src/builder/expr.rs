//! Expression analysis and lowering.

use crate::ast::{AstId, AstKind, BinOp, Ident, UnOp};
use crate::fold;
use crate::mir::{Bound, InstrId, InstrKind, Local};
use crate::scope::{Lookup, ScopeId, SymbolState, SymbolValue};
use crate::span::Span;
use crate::types::{TypeId, TypeKind};
use crate::value::ConstValue;
use crate::vm::{Trap, TrapKind};

use super::{BResult, Builder, FnCtx, Halt, Operand, Val};

impl Builder {
    pub(super) fn expr(&mut self, f: &mut FnCtx, scope: ScopeId, node: AstId) -> BResult<Operand> {
        let span = self.span(node);
        match self.ast[node].kind.clone() {
            AstKind::LitInt(value) => {
                let ty = if value <= i32::MAX as u64 {
                    TypeId::S32
                } else if value <= i64::MAX as u64 {
                    TypeId::S64
                } else {
                    TypeId::U64
                };
                Ok(Operand {
                    literal: true,
                    ..Operand::constant(ConstValue::Int(value), ty, span)
                })
            }
            AstKind::LitFloat(value) => Ok(Operand {
                literal: true,
                ..Operand::constant(ConstValue::F64(value), TypeId::F64, span)
            }),
            AstKind::LitBool(value) => Ok(Operand::constant(ConstValue::Bool(value), TypeId::BOOL, span)),
            AstKind::LitNull => Ok(Operand::constant(ConstValue::Ptr(0), TypeId::NULL, span)),
            AstKind::Ident(name) => self.ident(f, scope, name, span),
            AstKind::Binop { op, lhs, rhs } if op.is_logic() => self.logic(f, scope, op, lhs, rhs, span),
            AstKind::Binop { op, lhs, rhs } => {
                let lhs = self.expr(f, scope, lhs)?;
                let lhs = self.rvalue(f, lhs)?;
                let rhs = self.expr(f, scope, rhs)?;
                let rhs = self.rvalue(f, rhs)?;
                self.binary(f, op, lhs, rhs, span)
            }
            AstKind::Unop { op, operand } => {
                let operand = self.expr(f, scope, operand)?;
                self.unary(f, op, operand, span)
            }
            AstKind::Cast { ty, expr } => {
                let target = self.resolve_type(scope, ty)?;
                let value = self.expr(f, scope, expr)?;
                self.explicit_cast(f, value, target, span)
            }
            AstKind::Call { callee, args } => self.call(f, scope, callee, &args, span),
            AstKind::Member { base, name } => self.member(f, scope, base, name, span),
            AstKind::Index { base, index } => self.index(f, scope, base, index, span),
            AstKind::AddrOf(inner) => {
                let op = self.expr(f, scope, inner)?;
                match op.val {
                    Val::Place(ptr) => {
                        let ty = self.types.ptr(op.ty);
                        Ok(Operand::instr(ptr, ty, span))
                    }
                    _ => Err(self.type_error(span, "cannot take the address of a temporary value")),
                }
            }
            AstKind::Deref(inner) => {
                let op = self.expr(f, scope, inner)?;
                let op = self.rvalue(f, op)?;
                let Some(pointee) = self.types.pointee(op.ty) else {
                    return Err(self.type_error(span, format!("cannot dereference a value of type `{}`", self.ty_name(op.ty))));
                };
                let ptr = self.materialize(f, op)?;
                Ok(Operand::place(ptr, pointee, span, true))
            }
            AstKind::Compound { ty, values } => self.compound(f, scope, ty, &values, span),
            AstKind::SizeOf(inner) | AstKind::AlignOf(inner) => {
                let sizeof = matches!(self.ast[node].kind, AstKind::SizeOf(_));
                let ty = self.type_of(scope, inner)?;
                let layout = self.types.layout(ty).map_err(|e| self.layout_halt(e, span))?;
                let value = if sizeof { layout.size } else { layout.align };
                Ok(Operand {
                    literal: true,
                    ..Operand::constant(ConstValue::Int(value), TypeId::USIZE, span)
                })
            }
            AstKind::FnLit(_) => match self.bind_fn_literal(scope, node, "<anonymous>")? {
                SymbolValue::Fn(func) => Ok(self.fn_operand(func, span)),
                SymbolValue::PolyFn(recipe) => Ok(Operand::special(Val::Poly(recipe), span)),
                _ => Err(self.internal("function literal bound to a non-function")),
            },
            AstKind::FnGroup(members) => {
                let fns = self.fn_group(scope, node, "<group>", &members)?;
                Ok(Operand::special(Val::Group(fns), span))
            }
            AstKind::Comptime(inner) => {
                let (value, ty) = self.comptime_value(scope, inner, None)?;
                Ok(Operand::constant(value, ty, span))
            }
            AstKind::PtrType(_)
            | AstKind::ArrayType { .. }
            | AstKind::SliceType(_)
            | AstKind::FnType(_)
            | AstKind::StructType { .. }
            | AstKind::EnumType { .. }
            | AstKind::PolyType(_) => {
                let ty = self.resolve_type(scope, node)?;
                Ok(Operand::constant(ConstValue::Type(ty), TypeId::TYPE, span))
            }
            _ => Err(self.malformed(node, "expected an expression")),
        }
    }

    pub(super) fn fn_operand(&self, func: crate::mir::FnId, span: Span) -> Operand {
        let ty = self.mir.function(func).ty;
        Operand::constant(ConstValue::Fn(func), ty, span)
    }

    /// Type denoted by `node`, or the type of the value it evaluates to.
    /// Nothing is emitted into the current function.
    fn type_of(&mut self, scope: ScopeId, node: AstId) -> BResult<TypeId> {
        let mut scratch = FnCtx::scratch(self.span(node));
        let op = self.expr(&mut scratch, scope, node)?;
        match op.val {
            Val::Const(ConstValue::Type(ty)) if op.ty == TypeId::TYPE => Ok(ty),
            _ => Ok(op.ty),
        }
    }

    // -----------------------------------------------------------------
    // Symbols
    // -----------------------------------------------------------------

    fn ident(&mut self, f: &mut FnCtx, scope: ScopeId, name: Ident, span: Span) -> BResult<Operand> {
        let Some(found) = self.scopes.lookup(scope, name, false) else {
            return Err(self.resolution_error(span, format!("unknown symbol `{}`", self.ast.name(name))));
        };
        self.symbol_operand(f, found, span)
    }

    pub(super) fn symbol_operand(&mut self, f: &mut FnCtx, found: Lookup, span: Span) -> BResult<Operand> {
        let symbol = self.scopes.symbol(found.symbol);
        let name = self.ast.name(symbol.name).to_string();
        let mutable = symbol.mutable;
        let value = match &symbol.state {
            SymbolState::Resolved(value) => value.clone(),
            SymbolState::Unresolved { task: Some(task) } => return Err(Halt::Postpone(*task)),
            SymbolState::Unresolved { task: None } => {
                return Err(self.resolution_error(span, format!("`{name}` is used before its declaration")));
            }
            SymbolState::Failed => return Err(Halt::Silent),
        };
        match value {
            SymbolValue::Const { ty, value } => Ok(Operand::constant(value, ty, span)),
            SymbolValue::Type(ty) => Ok(Operand::constant(ConstValue::Type(ty), TypeId::TYPE, span)),
            SymbolValue::Fn(func) => Ok(self.fn_operand(func, span)),
            SymbolValue::FnGroup(fns) => Ok(Operand::special(Val::Group(fns), span)),
            SymbolValue::PolyFn(recipe) => Ok(Operand::special(Val::Poly(recipe), span)),
            SymbolValue::Scope(id) => Ok(Operand::special(Val::Scope(id), span)),
            SymbolValue::Global(global) => {
                let (ty, mutable) = {
                    let data = self.mir.global(global);
                    (data.ty, data.mutable)
                };
                let ptr_ty = self.types.ptr(ty);
                let ptr = f.emit(InstrKind::GlobalPtr(global), ptr_ty, span);
                Ok(Operand::place(ptr, ty, span, mutable))
            }
            SymbolValue::Local { local, ty } => {
                if found.crossed_fn {
                    return Err(self.resolution_error(
                        span,
                        format!("`{name}` is a local of an enclosing function and cannot be used here"),
                    ));
                }
                let ptr_ty = self.types.ptr(ty);
                let ptr = f.emit(InstrKind::VarPtr(local), ptr_ty, span);
                Ok(Operand::place(ptr, ty, span, mutable))
            }
        }
    }

    // -----------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------

    /// Load places; every other operand is returned unchanged.
    pub(super) fn rvalue(&mut self, f: &mut FnCtx, op: Operand) -> BResult<Operand> {
        match op.val {
            Val::Place(ptr) => {
                let id = f.emit(InstrKind::Load(ptr), op.ty, op.span);
                Ok(Operand::instr(id, op.ty, op.span))
            }
            _ => Ok(op),
        }
    }

    /// Instruction producing the value of `op`.
    pub(super) fn materialize(&mut self, f: &mut FnCtx, op: Operand) -> BResult<InstrId> {
        let op = self.rvalue(f, op)?;
        match op.val {
            Val::Const(value) => Ok(f.emit(InstrKind::Const(value), op.ty, op.span)),
            Val::Instr(id) => Ok(id),
            Val::Place(_) => Err(self.internal("place survived rvalue conversion")),
            Val::Group(_) | Val::Poly(_) | Val::Scope(_) => Err(self.type_error(op.span, "expected a value")),
        }
    }

    /// Address of `op`, spilling temporaries into a fresh local.
    pub(super) fn ensure_place(&mut self, f: &mut FnCtx, op: Operand) -> BResult<(InstrId, bool)> {
        if let Val::Place(ptr) = op.val {
            return Ok((ptr, op.mutable));
        }
        let ty = op.ty;
        let span = op.span;
        self.types.layout(ty).map_err(|e| self.layout_halt(e, span))?;
        let value = self.materialize(f, op)?;
        let local = f.func.locals.push(Local {
            name: "tmp".into(),
            ty,
            offset: 0,
            span,
        });
        let ptr_ty = self.types.ptr(ty);
        let ptr = f.emit(InstrKind::VarPtr(local), ptr_ty, span);
        f.emit(InstrKind::Store { ptr, value }, TypeId::VOID, span);
        Ok((ptr, false))
    }

    fn fold_enabled(&self) -> bool {
        self.config.fold_constants
    }

    fn trap(&self, kind: TrapKind, span: Span) -> Halt {
        Halt::Trap(Trap { kind, span })
    }

    /// Retype an untyped numeric literal, checking that it fits.
    fn adapt_literal(&mut self, f: &mut FnCtx, op: &Operand, target: TypeId) -> Option<BResult<Operand>> {
        let source_int = self.types.is_int(op.ty);
        let target_int = self.types.int_info(target).filter(|_| self.types.is_int(target));
        let target_real = self.types.is_real(target);
        if !(target_int.is_some() || target_real) || (!source_int && target_int.is_some()) {
            return None;
        }
        let span = op.span;
        let value = match &op.val {
            Val::Const(value) => value,
            Val::Instr(id) => {
                let cast = self.types.cast_op(op.ty, target)?;
                let id = f.emit(InstrKind::Cast { op: cast, operand: *id }, target, span);
                return Some(Ok(Operand::instr(id, target, span)));
            }
            _ => return None,
        };
        let adapted = match (value, target_int) {
            (ConstValue::Int(raw), Some((bits, signed))) => {
                let exact = match self.types.int_info(op.ty) {
                    Some((_, true)) => i128::from(*raw as i64),
                    _ => i128::from(*raw),
                };
                let (min, max) = if signed {
                    (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
                } else {
                    (0, (1i128 << bits) - 1)
                };
                if exact < min || exact > max {
                    return Some(Err(self.type_error(
                        span,
                        format!("literal `{exact}` does not fit in `{}`", self.ty_name(target)),
                    )));
                }
                ConstValue::int(exact as u64, bits, signed)
            }
            (ConstValue::Int(_) | ConstValue::F32(_) | ConstValue::F64(_), None) => {
                let cast = self.types.cast_op(op.ty, target)?;
                match fold::cast(&self.types, cast, target, value) {
                    Ok(value) => value,
                    Err(kind) => return Some(Err(self.trap(kind, span))),
                }
            }
            _ => return None,
        };
        Some(Ok(Operand {
            literal: true,
            ..Operand::constant(adapted, target, span)
        }))
    }

    /// Implicitly convert `op` to `target`.
    pub(super) fn coerce(&mut self, f: &mut FnCtx, op: Operand, target: TypeId) -> BResult<Operand> {
        let op = self.rvalue(f, op)?;
        let span = op.span;
        match &op.val {
            Val::Group(fns) => {
                let picked = fns.iter().copied().find(|func| self.mir.function(*func).ty == target);
                return match picked {
                    Some(func) => Ok(self.fn_operand(func, span)),
                    None => Err(self.type_error(
                        span,
                        format!("no function of the group has type `{}`", self.ty_name(target)),
                    )),
                };
            }
            Val::Poly(_) => {
                return Err(self.type_error(span, "polymorphic functions cannot be used as values"));
            }
            Val::Scope(_) => return Err(self.type_error(span, "expected a value, found a scope")),
            _ => {}
        }
        if op.ty == target {
            return Ok(op);
        }
        if op.literal {
            if let Some(adapted) = self.adapt_literal(f, &op, target) {
                return adapted;
            }
        }
        if self.types.conversion_rank(op.ty, target).is_none() {
            return Err(self.mismatch(span, target, op.ty));
        }
        let cast = self
            .types
            .cast_op(op.ty, target)
            .ok_or_else(|| self.internal("implicit conversion without a machine cast"))?;
        self.convert(f, op, cast, target)
    }

    fn convert(&mut self, f: &mut FnCtx, op: Operand, cast: crate::types::CastOp, target: TypeId) -> BResult<Operand> {
        let span = op.span;
        if let (Val::Const(value), true) = (&op.val, self.fold_enabled()) {
            let value = fold::cast(&self.types, cast, target, value).map_err(|kind| self.trap(kind, span))?;
            return Ok(Operand::constant(value, target, span));
        }
        let operand = self.materialize(f, op)?;
        let id = f.emit(InstrKind::Cast { op: cast, operand }, target, span);
        Ok(Operand::instr(id, target, span))
    }

    fn explicit_cast(&mut self, f: &mut FnCtx, value: Operand, target: TypeId, span: Span) -> BResult<Operand> {
        let value = self.rvalue(f, value)?;
        let Some(cast) = self.types.cast_op(value.ty, target) else {
            return Err(self.type_error(
                span,
                format!("cannot cast `{}` to `{}`", self.ty_name(value.ty), self.ty_name(target)),
            ));
        };
        let mut result = self.convert(f, value, cast, target)?;
        result.span = span;
        Ok(result)
    }

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------

    fn operator_allowed(&self, op: BinOp, ty: TypeId) -> bool {
        let types = &self.types;
        let int = types.is_int(ty);
        let ordered = types.is_numeric(ty) || types.is_ptr(ty) || types.int_info(ty).is_some();
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => types.is_numeric(ty),
            BinOp::BitAnd | BinOp::BitOr | BinOp::Xor => int || ty == TypeId::BOOL,
            BinOp::Shl | BinOp::Shr => int,
            BinOp::Eq | BinOp::Neq => {
                ordered
                    || matches!(
                        types.kind(ty),
                        TypeKind::Bool | TypeKind::Null | TypeKind::Fn { .. } | TypeKind::Type
                    )
            }
            BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq => ordered,
            BinOp::LogicAnd | BinOp::LogicOr => ty == TypeId::BOOL,
        }
    }

    /// Type-check and lower `lhs op rhs` on already loaded operands.
    pub(super) fn binary(
        &mut self,
        f: &mut FnCtx,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
        span: Span,
    ) -> BResult<Operand> {
        let (lhs, rhs) = match (lhs.literal, rhs.literal) {
            (true, false) => {
                let lhs = self.coerce(f, lhs, rhs.ty)?;
                (lhs, rhs)
            }
            (false, true) => {
                let rhs = self.coerce(f, rhs, lhs.ty)?;
                (lhs, rhs)
            }
            _ => {
                let common = self.types.common_type(lhs.ty, rhs.ty).or_else(|| {
                    // An integer literal meeting a float literal becomes a float.
                    let real = |o: &Operand| self.types.is_real(o.ty);
                    (lhs.literal && rhs.literal && (real(&lhs) || real(&rhs))).then_some(TypeId::F64)
                });
                match common {
                    Some(common) => {
                        let lhs = self.coerce(f, lhs, common)?;
                        let rhs = self.coerce(f, rhs, common)?;
                        (lhs, rhs)
                    }
                    // Integer literals of unrelated types, e.g. `sizeof(T) == 8`:
                    // whichever fits the other side's type adapts to it.
                    None if lhs.literal && rhs.literal => match self.coerce(f, rhs.clone(), lhs.ty) {
                        Ok(rhs) => (lhs, rhs),
                        Err(_) => {
                            let lhs = self.coerce(f, lhs, rhs.ty)?;
                            (lhs, rhs)
                        }
                    },
                    None => {
                        return Err(self.type_error(
                            span,
                            format!(
                                "invalid operands `{}` and `{}` for `{op}`",
                                self.ty_name(lhs.ty),
                                self.ty_name(rhs.ty)
                            ),
                        ));
                    }
                }
            }
        };
        let ty = lhs.ty;
        if !self.operator_allowed(op, ty) {
            return Err(self.type_error(span, format!("operator `{op}` cannot be applied to `{}`", self.ty_name(ty))));
        }
        let result_ty = if op.is_comparison() { TypeId::BOOL } else { ty };
        let literal = lhs.literal && rhs.literal && !op.is_comparison();

        if let (Some(a), Some(b), true) = (lhs.as_const(), rhs.as_const(), self.fold_enabled()) {
            let value = fold::binop(&self.types, op, ty, a, b).map_err(|kind| self.trap(kind, span))?;
            return Ok(Operand {
                literal,
                ..Operand::constant(value, result_ty, span)
            });
        }
        let lhs = self.materialize(f, lhs)?;
        let rhs = self.materialize(f, rhs)?;
        let id = f.emit(InstrKind::Binop { op, lhs, rhs }, result_ty, span);
        Ok(Operand {
            literal,
            ..Operand::instr(id, result_ty, span)
        })
    }

    /// Short-circuiting `&&` and `||`.
    fn logic(&mut self, f: &mut FnCtx, scope: ScopeId, op: BinOp, lhs: AstId, rhs: AstId, span: Span) -> BResult<Operand> {
        let lhs = self.expr(f, scope, lhs)?;
        let lhs = self.coerce(f, lhs, TypeId::BOOL)?;
        let short_value = op == BinOp::LogicOr;

        if let (Some(ConstValue::Bool(value)), true) = (lhs.as_const(), self.fold_enabled()) {
            if *value == short_value {
                // The right operand is only checked, never evaluated.
                let mut scratch = FnCtx::scratch(span);
                let rhs = self.expr(&mut scratch, scope, rhs)?;
                self.coerce(&mut scratch, rhs, TypeId::BOOL)?;
                return Ok(Operand::constant(ConstValue::Bool(short_value), TypeId::BOOL, span));
            }
            let rhs = self.expr(f, scope, rhs)?;
            let mut rhs = self.coerce(f, rhs, TypeId::BOOL)?;
            rhs.span = span;
            return Ok(rhs);
        }

        let cond = self.materialize(f, lhs)?;
        let lhs_block = f.current;
        let rhs_block = f.add_block("logic.rhs");
        let end = f.add_block("logic.end");
        if short_value {
            f.cond_branch(cond, end, rhs_block, span);
        } else {
            f.cond_branch(cond, rhs_block, end, span);
        }
        f.switch_to(rhs_block);
        let rhs = self.expr(f, scope, rhs)?;
        let rhs = self.coerce(f, rhs, TypeId::BOOL)?;
        let rhs = self.materialize(f, rhs)?;
        let rhs_end = f.current;
        f.branch(end, span);
        f.switch_to(end);
        // Coming straight from the left operand means it decided the result.
        let id = f.emit(InstrKind::Phi(vec![(lhs_block, cond), (rhs_end, rhs)]), TypeId::BOOL, span);
        Ok(Operand::instr(id, TypeId::BOOL, span))
    }

    fn unary(&mut self, f: &mut FnCtx, op: UnOp, operand: Operand, span: Span) -> BResult<Operand> {
        let operand = self.rvalue(f, operand)?;
        let ty = operand.ty;
        let allowed = match op {
            UnOp::Neg | UnOp::Pos => self.types.is_numeric(ty),
            UnOp::Not => ty == TypeId::BOOL,
            UnOp::BitNot => self.types.is_int(ty),
        };
        if !allowed {
            return Err(self.type_error(span, format!("operator `{op}` cannot be applied to `{}`", self.ty_name(ty))));
        }
        let literal = operand.literal;
        if let (Some(value), true) = (operand.as_const(), self.fold_enabled()) {
            let value = fold::unop(&self.types, op, ty, value).map_err(|kind| self.trap(kind, span))?;
            return Ok(Operand {
                literal,
                ..Operand::constant(value, ty, span)
            });
        }
        let operand = self.materialize(f, operand)?;
        let id = f.emit(InstrKind::Unop { op, operand }, ty, span);
        Ok(Operand {
            literal,
            ..Operand::instr(id, ty, span)
        })
    }

    // -----------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------

    fn member(&mut self, f: &mut FnCtx, scope: ScopeId, base: AstId, name: Ident, span: Span) -> BResult<Operand> {
        let base = self.expr(f, scope, base)?;
        let member_name = self.ast.name(name).to_string();

        if let Val::Scope(id) = base.val {
            let Some(found) = self.scopes.lookup(id, name, true) else {
                return Err(self.resolution_error(span, format!("scope has no member `{member_name}`")));
            };
            return self.symbol_operand(f, found, span);
        }
        if let (Val::Const(ConstValue::Type(ty)), TypeId::TYPE) = (&base.val, base.ty) {
            return self.enum_variant(*ty, name, span);
        }

        // Pointers to aggregates are dereferenced implicitly.
        let base = match self.types.pointee(base.ty) {
            Some(inner)
                if matches!(
                    self.types.kind(inner),
                    TypeKind::Struct(_) | TypeKind::Slice(_) | TypeKind::Array { .. }
                ) =>
            {
                let ptr = self.materialize(f, base)?;
                Operand::place(ptr, inner, span, true)
            }
            _ => base,
        };

        match self.types.kind(base.ty).clone() {
            TypeKind::Struct(id) => {
                let Some(members) = self.types.struct_def(id).members.clone() else {
                    return Err(self.layout_halt(crate::types::LayoutError::Incomplete(id), span));
                };
                let Some(index) = members.iter().position(|m| m.name == name) else {
                    return Err(self.type_error(
                        span,
                        format!("struct `{}` has no member `{member_name}`", self.ty_name(base.ty)),
                    ));
                };
                self.project(f, base, index, members[index].ty, span)
            }
            TypeKind::Slice(elem) => {
                let (index, ty) = match member_name.as_str() {
                    "len" => (0, TypeId::S64),
                    "ptr" => (1, self.types.ptr(elem)),
                    _ => return Err(self.type_error(span, format!("slices have no member `{member_name}`"))),
                };
                self.project(f, base, index, ty, span)
            }
            TypeKind::Array { len, .. } if member_name == "len" => {
                Ok(Operand::constant(ConstValue::Int(len), TypeId::S64, span))
            }
            _ => Err(self.type_error(
                span,
                format!("type `{}` has no member `{member_name}`", self.ty_name(base.ty)),
            )),
        }
    }

    /// Member `index` (of type `ty`) of a struct or slice operand.
    fn project(&mut self, f: &mut FnCtx, base: Operand, index: usize, ty: TypeId, span: Span) -> BResult<Operand> {
        if let Val::Const(ConstValue::Aggregate(items)) = &base.val {
            let item = items
                .get(index)
                .cloned()
                .ok_or_else(|| self.internal("aggregate constant is missing a member"))?;
            return Ok(Operand::constant(item, ty, span));
        }
        let (ptr, mutable) = self.ensure_place(f, base)?;
        let ptr_ty = self.types.ptr(ty);
        let id = f.emit(
            InstrKind::MemberPtr {
                base: ptr,
                index: index as u32,
            },
            ptr_ty,
            span,
        );
        Ok(Operand::place(id, ty, span, mutable))
    }

    fn enum_variant(&self, ty: TypeId, name: Ident, span: Span) -> BResult<Operand> {
        let TypeKind::Enum(id) = self.types.kind(ty) else {
            return Err(self.type_error(span, format!("type `{}` has no members", self.ty_name(ty))));
        };
        let def = self.types.enum_def(*id);
        let Some(variants) = &def.variants else {
            return Err(self.internal(format!("enum `{}` used before completion", def.name)));
        };
        match variants.iter().find(|(variant, _)| *variant == name) {
            Some((_, value)) => Ok(Operand::constant(ConstValue::Int(*value), ty, span)),
            None => Err(self.type_error(
                span,
                format!("enum `{}` has no variant `{}`", def.name, self.ast.name(name)),
            )),
        }
    }

    fn index(&mut self, f: &mut FnCtx, scope: ScopeId, base: AstId, index: AstId, span: Span) -> BResult<Operand> {
        let base = self.expr(f, scope, base)?;
        let index = self.expr(f, scope, index)?;
        let index = self.rvalue(f, index)?;
        if !self.types.is_int(index.ty) {
            return Err(self.type_error(index.span, format!("index must be an integer, found `{}`", self.ty_name(index.ty))));
        }

        let base = match self.types.pointee(base.ty) {
            Some(inner) if matches!(self.types.kind(inner), TypeKind::Array { .. }) => {
                let ptr = self.materialize(f, base)?;
                Operand::place(ptr, inner, span, true)
            }
            _ => base,
        };

        let (elem, bound) = match self.types.kind(base.ty).clone() {
            TypeKind::Array { elem, len } => (elem, Bound::Array(len)),
            TypeKind::Slice(elem) => (elem, Bound::Slice),
            TypeKind::Ptr(elem) => (elem, Bound::Unchecked),
            _ => {
                return Err(self.type_error(span, format!("type `{}` cannot be indexed", self.ty_name(base.ty))));
            }
        };

        if let (Val::Const(ConstValue::Aggregate(items)), Some(i), Bound::Array(len), true) =
            (&base.val, index.as_const().and_then(ConstValue::as_i64), bound, self.fold_enabled())
        {
            if i < 0 || i as u64 >= len {
                return Err(self.trap(TrapKind::OutOfBounds { index: i, len }, span));
            }
            let item = items[i as usize].clone();
            return Ok(Operand::constant(item, elem, span));
        }

        let (ptr, mutable) = match bound {
            Bound::Unchecked => (self.materialize(f, base)?, true),
            Bound::Slice => (self.ensure_place(f, base)?.0, true),
            Bound::Array(_) => self.ensure_place(f, base)?,
        };
        let index = self.materialize(f, index)?;
        let ptr_ty = self.types.ptr(elem);
        let id = f.emit(InstrKind::ElemPtr { base: ptr, index, bound }, ptr_ty, span);
        Ok(Operand::place(id, elem, span, mutable))
    }

    fn compound(&mut self, f: &mut FnCtx, scope: ScopeId, ty: AstId, values: &[AstId], span: Span) -> BResult<Operand> {
        let ty = self.resolve_type(scope, ty)?;
        if values.is_empty() {
            let zero = self.zero_value(ty, span)?;
            return Ok(Operand::constant(zero, ty, span));
        }
        let (expected, targets): (u64, Vec<TypeId>) = match self.types.kind(ty).clone() {
            TypeKind::Struct(id) => match &self.types.struct_def(id).members {
                Some(members) => (members.len() as u64, members.iter().map(|m| m.ty).collect()),
                None => return Err(self.layout_halt(crate::types::LayoutError::Incomplete(id), span)),
            },
            TypeKind::Array { elem, len } => (len, vec![elem; values.len()]),
            TypeKind::Slice(elem) => (2, vec![TypeId::S64, self.types.ptr(elem)]),
            _ if values.len() == 1 => {
                let value = self.expr(f, scope, values[0])?;
                let mut value = self.coerce(f, value, ty)?;
                value.span = span;
                return Ok(value);
            }
            _ => {
                return Err(self.type_error(span, format!("type `{}` has no compound initializer", self.ty_name(ty))));
            }
        };
        if expected != values.len() as u64 {
            return Err(self.type_error(
                span,
                format!(
                    "`{}` expects {expected} initializer value(s), found {}",
                    self.ty_name(ty),
                    values.len()
                ),
            ));
        }
        self.value_layout(ty, span)?;

        let mut operands = Vec::with_capacity(values.len());
        for (&value, &target) in values.iter().zip(&targets) {
            let op = self.expr(f, scope, value)?;
            operands.push(self.coerce(f, op, target)?);
        }
        if operands.iter().all(|op| op.as_const().is_some()) {
            let items = operands.into_iter().filter_map(|op| op.as_const().cloned()).collect();
            return Ok(Operand::constant(ConstValue::Aggregate(items), ty, span));
        }
        let mut ids = Vec::with_capacity(operands.len());
        for op in operands {
            ids.push(self.materialize(f, op)?);
        }
        let id = f.emit(InstrKind::Compound(ids), ty, span);
        Ok(Operand::instr(id, ty, span))
    }
}
