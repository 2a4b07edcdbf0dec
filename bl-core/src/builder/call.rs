//! Calls, overload selection and polymorphic specialization.

use crate::ast::{AstId, AstKind, Ident};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::mir::{Callee, FnFlavor, FnId, InstrKind};
use crate::scope::{RecipeId, ScopeId, SymbolValue};
use crate::span::Span;
use crate::types::{ConversionRank, TypeId, TypeKind};
use crate::value::ConstValue;

use super::{BResult, Builder, FnCtx, Halt, Operand, Val};

impl Builder {
    pub(super) fn call(
        &mut self,
        f: &mut FnCtx,
        scope: ScopeId,
        callee: AstId,
        args: &[AstId],
        span: Span,
    ) -> BResult<Operand> {
        let callee = self.expr(f, scope, callee)?;
        let mut operands = Vec::with_capacity(args.len());
        for &arg in args {
            let op = self.expr(f, scope, arg)?;
            operands.push(self.rvalue(f, op)?);
        }

        match callee.val {
            Val::Group(fns) => {
                let func = self.select_overload(&fns, &operands, span)?;
                self.direct_call(f, func, operands, span)
            }
            Val::Poly(recipe) => {
                let func = self.specialize(recipe, &operands, span)?;
                self.direct_call(f, func, operands, span)
            }
            Val::Const(ConstValue::Fn(func)) => self.direct_call(f, func, operands, span),
            Val::Scope(_) => Err(self.type_error(span, "a scope cannot be called")),
            _ => {
                let callee = self.rvalue(f, callee)?;
                let Some((params, ret)) = self.types.fn_sig(callee.ty).map(|(p, r)| (p.to_vec(), r)) else {
                    return Err(self.type_error(span, format!("`{}` is not callable", self.ty_name(callee.ty))));
                };
                let target = self.materialize(f, callee)?;
                self.emit_call(f, Callee::Indirect(target), &params, ret, operands, span)
            }
        }
    }

    fn direct_call(&mut self, f: &mut FnCtx, func: FnId, args: Vec<Operand>, span: Span) -> BResult<Operand> {
        let (params, ret, flavor, name) = {
            let data = self.mir.function(func);
            (data.params.clone(), data.ret, data.flavor, data.name.clone())
        };
        if flavor != FnFlavor::ComptimeOnly {
            return self.emit_call(f, Callee::Direct(func), &params, ret, args, span);
        }

        // Compile-time functions are evaluated on the spot.
        let args = self.coerce_args(f, &params, args, span)?;
        let mut values = Vec::with_capacity(args.len());
        for arg in &args {
            match arg.as_const() {
                Some(value) => values.push(value.clone()),
                None => {
                    return Err(self.type_error(
                        arg.span,
                        format!("arguments of compile-time function `{name}` must be known at compile time"),
                    ));
                }
            }
        }
        log::debug!("evaluating compile-time call of `{name}`");
        let value = self.comptime_call(func, &values)?;
        Ok(Operand::constant(value, ret, span))
    }

    fn coerce_args(&mut self, f: &mut FnCtx, params: &[TypeId], args: Vec<Operand>, span: Span) -> BResult<Vec<Operand>> {
        if params.len() != args.len() {
            return Err(self.type_error(
                span,
                format!("expected {} argument(s), found {}", params.len(), args.len()),
            ));
        }
        let mut coerced = Vec::with_capacity(args.len());
        for (arg, &param) in args.into_iter().zip(params) {
            coerced.push(self.coerce(f, arg, param)?);
        }
        Ok(coerced)
    }

    fn emit_call(
        &mut self,
        f: &mut FnCtx,
        callee: Callee,
        params: &[TypeId],
        ret: TypeId,
        args: Vec<Operand>,
        span: Span,
    ) -> BResult<Operand> {
        let args = self.coerce_args(f, params, args, span)?;
        let mut ids = Vec::with_capacity(args.len());
        for arg in args {
            ids.push(self.materialize(f, arg)?);
        }
        let id = f.emit(InstrKind::Call { callee, args: ids }, ret, span);
        Ok(Operand::instr(id, ret, span))
    }

    // -----------------------------------------------------------------
    // Overloads
    // -----------------------------------------------------------------

    /// Members of a function group, declaring literal members on the way.
    pub(super) fn fn_group(&mut self, scope: ScopeId, node: AstId, name: &str, members: &[AstId]) -> BResult<Vec<FnId>> {
        let span = self.span(node);
        let mut fns: Vec<FnId> = Vec::with_capacity(members.len());
        for &member in members {
            let member_span = self.span(member);
            let is_literal = matches!(self.ast[member].kind, AstKind::FnLit(_));
            let found = if is_literal {
                match self.bind_fn_literal(scope, member, name)? {
                    SymbolValue::Fn(func) => vec![func],
                    _ => return Err(self.type_error(member_span, "polymorphic functions cannot be overloaded")),
                }
            } else {
                let mut scratch = FnCtx::scratch(member_span);
                let op = self.expr(&mut scratch, scope, member)?;
                match op.val {
                    Val::Const(ConstValue::Fn(func)) => vec![func],
                    Val::Group(inner) => inner,
                    _ => return Err(self.type_error(member_span, "function group members must be functions")),
                }
            };
            for func in found {
                let ty = self.mir.function(func).ty;
                if let Some(&other) = fns.iter().find(|&&other| self.mir.function(other).ty == ty) {
                    if other == func {
                        continue;
                    }
                    return Err(Halt::Error(
                        Diagnostic::error(
                            ErrorKind::Type,
                            format!("overloads of `{name}` share the signature `{}`", self.ty_name(ty)),
                        )
                        .with_span(member_span)
                        .with_note("other overload declared here", Some(self.mir.function(other).span)),
                    ));
                }
                fns.push(func);
            }
        }
        if fns.is_empty() {
            return Err(self.type_error(span, "function group is empty"));
        }
        Ok(fns)
    }

    /// Rank of passing `arg` to a parameter of type `param`.
    fn arg_rank(&self, arg: &Operand, param: TypeId) -> Option<ConversionRank> {
        match &arg.val {
            Val::Group(fns) => fns
                .iter()
                .any(|func| self.mir.function(*func).ty == param)
                .then_some(ConversionRank::Identity),
            Val::Poly(_) | Val::Scope(_) => None,
            _ if arg.ty == param => Some(ConversionRank::Identity),
            Val::Const(ConstValue::Int(raw)) if arg.literal => {
                if self.types.is_real(param) {
                    return Some(ConversionRank::Widening);
                }
                let (bits, signed) = self.types.int_info(param).filter(|_| self.types.is_int(param))?;
                let exact = match self.types.int_info(arg.ty) {
                    Some((_, true)) => i128::from(*raw as i64),
                    _ => i128::from(*raw),
                };
                let fits = if signed {
                    exact >= -(1i128 << (bits - 1)) && exact < (1i128 << (bits - 1))
                } else {
                    exact >= 0 && exact < (1i128 << bits)
                };
                fits.then_some(ConversionRank::Widening)
            }
            _ if arg.literal && self.types.is_real(arg.ty) && self.types.is_real(param) => Some(ConversionRank::Widening),
            _ => self.types.conversion_rank(arg.ty, param),
        }
    }

    /// Pick the overload with the cheapest argument conversions.
    pub(super) fn select_overload(&self, fns: &[FnId], args: &[Operand], span: Span) -> BResult<FnId> {
        let mut best: Vec<FnId> = Vec::new();
        let mut best_score = u32::MAX;
        for &func in fns {
            let params = &self.mir.function(func).params;
            if params.len() != args.len() {
                continue;
            }
            let score = args
                .iter()
                .zip(params)
                .map(|(arg, &param)| self.arg_rank(arg, param).map(|rank| rank as u32))
                .sum::<Option<u32>>();
            let Some(score) = score else {
                continue;
            };
            if score < best_score {
                best_score = score;
                best.clear();
            }
            if score == best_score {
                best.push(func);
            }
        }

        let arg_types: Vec<String> = args.iter().map(|a| self.ty_name(a.ty)).collect();
        let (message, candidates) = match best.as_slice() {
            [func] => {
                log::trace!("overload {} selected for ({})", self.mir.function(*func).name, arg_types.join(", "));
                return Ok(*func);
            }
            [] => (format!("no overload matches argument types ({})", arg_types.join(", ")), fns),
            _ => (format!("ambiguous call with argument types ({})", arg_types.join(", ")), best.as_slice()),
        };
        let mut diag = Diagnostic::error(ErrorKind::Resolution, message).with_span(span);
        for &candidate in candidates {
            let data = self.mir.function(candidate);
            diag = diag.with_note(format!("candidate: {}", self.ty_name(data.ty)), Some(data.span));
        }
        Err(Halt::Error(diag))
    }

    // -----------------------------------------------------------------
    // Polymorphism
    // -----------------------------------------------------------------

    /// Specialization of `recipe` for the given arguments, created once per
    /// distinct set of bound types.
    pub(super) fn specialize(&mut self, recipe: RecipeId, args: &[Operand], span: Span) -> BResult<FnId> {
        let data = self.recipes[recipe].clone();
        let lit = self.fn_literal(data.lit)?;
        if lit.sig.params.len() != args.len() {
            return Err(self.type_error(
                span,
                format!(
                    "`{}` expects {} argument(s), found {}",
                    data.name,
                    lit.sig.params.len(),
                    args.len()
                ),
            ));
        }

        let mut bindings: Vec<(Ident, TypeId)> = Vec::new();
        for (param, arg) in lit.sig.params.iter().zip(args) {
            if matches!(arg.val, Val::Group(_) | Val::Poly(_) | Val::Scope(_)) {
                if self.mentions_poly(param.ty) {
                    return Err(self.type_error(arg.span, "cannot infer a polymorphic type from this argument"));
                }
                continue;
            }
            self.unify(param.ty, arg.ty, &mut bindings, arg.span)?;
        }

        let key = (recipe, bindings.iter().map(|(_, ty)| *ty).collect::<Vec<_>>());
        if let Some(&func) = self.specializations.get(&key) {
            return Ok(func);
        }
        let rendered = bindings
            .iter()
            .map(|(name, ty)| format!("?{} = {}", self.ast.name(*name), self.ty_name(*ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let func = self.declare_fn(data.scope, data.lit, &data.name, bindings)?;
        log::debug!("specialized `{}` with {rendered}", data.name);
        self.mir.fns[func].specialization = Some(rendered);
        self.specializations.insert(key, func);
        Ok(func)
    }

    /// Match a signature type expression against a concrete type, binding
    /// every `?T` it mentions.
    fn unify(&mut self, pattern: AstId, actual: TypeId, bindings: &mut Vec<(Ident, TypeId)>, span: Span) -> BResult<()> {
        if !self.mentions_poly(pattern) {
            return Ok(());
        }
        let mismatch = |builder: &Self| {
            builder.type_error(
                span,
                format!("cannot infer polymorphic types from an argument of type `{}`", builder.ty_name(actual)),
            )
        };
        match (self.ast[pattern].kind.clone(), self.types.kind(actual).clone()) {
            (AstKind::PolyType(name), _) => {
                if actual == TypeId::NULL || actual == TypeId::VOID {
                    return Err(mismatch(self));
                }
                match bindings.iter().find(|(bound, _)| *bound == name) {
                    Some(&(_, existing)) if existing != actual => Err(self.type_error(
                        span,
                        format!(
                            "conflicting types for `?{}`: `{}` and `{}`",
                            self.ast.name(name),
                            self.ty_name(existing),
                            self.ty_name(actual)
                        ),
                    )),
                    Some(_) => Ok(()),
                    None => {
                        bindings.push((name, actual));
                        Ok(())
                    }
                }
            }
            (AstKind::PtrType(inner), TypeKind::Ptr(pointee)) => self.unify(inner, pointee, bindings, span),
            (AstKind::SliceType(inner), TypeKind::Slice(elem)) => self.unify(inner, elem, bindings, span),
            (AstKind::ArrayType { elem, .. }, TypeKind::Array { elem: actual_elem, .. }) => {
                self.unify(elem, actual_elem, bindings, span)
            }
            (AstKind::FnType(sig), TypeKind::Fn { params, ret }) if sig.params.len() == params.len() => {
                for (param, actual) in sig.params.iter().zip(params) {
                    self.unify(param.ty, actual, bindings, span)?;
                }
                match sig.ret {
                    Some(pattern) => self.unify(pattern, ret, bindings, span),
                    None => Ok(()),
                }
            }
            _ => Err(mismatch(self)),
        }
    }
}
