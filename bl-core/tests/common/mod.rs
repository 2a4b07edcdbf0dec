//! Shared helpers for the bl-core integration tests.
//!
//! There is no parser in this crate, so tests build their programs with
//! [`Src`], a small AST builder that hands out distinct spans so
//! diagnostics can be matched against the node that caused them.
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

pub use bl_core::ast::{Ast, AstId, AstKind, BinOp, EnumVariant, FnLit, FnSig, Param, StructMember, SwitchCase, UnOp, Unit};
pub use bl_core::span::{FileId, Span};
pub use bl_core::{ConstValue, CoreError, Diagnostic, ErrorKind, Session, SessionConfig, Severity, TrapKind, VmConfig};

/// Install the test logger once; `RUST_LOG=debug` shows analysis traces.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Program under construction.
pub struct Src {
    pub ast: Ast,
    pub items: Vec<AstId>,
    file: FileId,
    pos: u32,
}

impl Default for Src {
    fn default() -> Self {
        Self::new()
    }
}

impl Src {
    pub fn new() -> Self {
        Src {
            ast: Ast::new(),
            items: Vec::new(),
            file: FileId(0),
            pos: 0,
        }
    }

    fn span(&mut self) -> Span {
        let span = Span::new(self.file, self.pos, self.pos + 1);
        self.pos += 2;
        span
    }

    fn push(&mut self, kind: AstKind) -> AstId {
        let span = self.span();
        self.ast.push(kind, span)
    }

    pub fn span_of(&self, node: AstId) -> Span {
        self.ast[node].span
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    pub fn int(&mut self, value: u64) -> AstId {
        self.push(AstKind::LitInt(value))
    }

    pub fn float(&mut self, value: f64) -> AstId {
        self.push(AstKind::LitFloat(value))
    }

    pub fn boolean(&mut self, value: bool) -> AstId {
        self.push(AstKind::LitBool(value))
    }

    pub fn ident(&mut self, name: &str) -> AstId {
        let name = self.ast.intern(name);
        self.push(AstKind::Ident(name))
    }

    pub fn bin(&mut self, op: BinOp, lhs: AstId, rhs: AstId) -> AstId {
        self.push(AstKind::Binop { op, lhs, rhs })
    }

    pub fn un(&mut self, op: UnOp, operand: AstId) -> AstId {
        self.push(AstKind::Unop { op, operand })
    }

    pub fn cast(&mut self, ty: AstId, expr: AstId) -> AstId {
        self.push(AstKind::Cast { ty, expr })
    }

    /// Call of the function named `callee`.
    pub fn call(&mut self, callee: &str, args: Vec<AstId>) -> AstId {
        let callee = self.ident(callee);
        self.call_expr(callee, args)
    }

    pub fn call_expr(&mut self, callee: AstId, args: Vec<AstId>) -> AstId {
        self.push(AstKind::Call { callee, args })
    }

    pub fn member(&mut self, base: AstId, name: &str) -> AstId {
        let name = self.ast.intern(name);
        self.push(AstKind::Member { base, name })
    }

    /// `a.b.c` as nested member accesses.
    pub fn path(&mut self, path: &str) -> AstId {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut node = self.ident(first);
        for segment in segments {
            node = self.member(node, segment);
        }
        node
    }

    pub fn index(&mut self, base: AstId, index: AstId) -> AstId {
        self.push(AstKind::Index { base, index })
    }

    pub fn addr_of(&mut self, inner: AstId) -> AstId {
        self.push(AstKind::AddrOf(inner))
    }

    pub fn deref(&mut self, inner: AstId) -> AstId {
        self.push(AstKind::Deref(inner))
    }

    pub fn compound(&mut self, ty: AstId, values: Vec<AstId>) -> AstId {
        self.push(AstKind::Compound { ty, values })
    }

    pub fn size_of(&mut self, inner: AstId) -> AstId {
        self.push(AstKind::SizeOf(inner))
    }

    pub fn comptime(&mut self, inner: AstId) -> AstId {
        self.push(AstKind::Comptime(inner))
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    pub fn ptr_ty(&mut self, inner: AstId) -> AstId {
        self.push(AstKind::PtrType(inner))
    }

    pub fn array_ty(&mut self, len: u64, elem: AstId) -> AstId {
        let len = self.int(len);
        self.push(AstKind::ArrayType { len, elem })
    }

    pub fn slice_ty(&mut self, elem: AstId) -> AstId {
        self.push(AstKind::SliceType(elem))
    }

    pub fn poly(&mut self, name: &str) -> AstId {
        let name = self.ast.intern(name);
        self.push(AstKind::PolyType(name))
    }

    pub fn struct_ty(&mut self, members: &[(&str, AstId)]) -> AstId {
        let members = members
            .iter()
            .map(|&(name, ty)| StructMember {
                name: self.ast.intern(name),
                ty,
                span: self.span(),
            })
            .collect();
        self.push(AstKind::StructType { members })
    }

    pub fn enum_ty(&mut self, base: Option<AstId>, variants: &[(&str, Option<AstId>)]) -> AstId {
        let variants = variants
            .iter()
            .map(|&(name, value)| EnumVariant {
                name: self.ast.intern(name),
                value,
                span: self.span(),
            })
            .collect();
        self.push(AstKind::EnumType { base, variants })
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    fn params(&mut self, params: &[(&str, AstId)]) -> Vec<Param> {
        params
            .iter()
            .map(|&(name, ty)| Param {
                name: self.ast.intern(name),
                ty,
                span: self.span(),
            })
            .collect()
    }

    fn fn_node(&mut self, params: &[(&str, AstId)], ret: Option<AstId>, body: Vec<AstId>, comptime: bool, test: bool) -> AstId {
        let params = self.params(params);
        let body = self.push(AstKind::Block(body));
        self.push(AstKind::FnLit(FnLit {
            sig: FnSig { params, ret },
            body: Some(body),
            extern_name: None,
            comptime,
            test,
        }))
    }

    pub fn func(&mut self, params: &[(&str, AstId)], ret: Option<AstId>, body: Vec<AstId>) -> AstId {
        self.fn_node(params, ret, body, false, false)
    }

    /// Function whose calls are always evaluated at compile time.
    pub fn comptime_func(&mut self, params: &[(&str, AstId)], ret: Option<AstId>, body: Vec<AstId>) -> AstId {
        self.fn_node(params, ret, body, true, false)
    }

    /// Function literal marked `#test`.
    pub fn test_func(&mut self, params: &[(&str, AstId)], body: Vec<AstId>) -> AstId {
        self.fn_node(params, None, body, false, true)
    }

    /// `name :: fn() #test { body }` at top level.
    pub fn test_case(&mut self, name: &str, body: Vec<AstId>) -> AstId {
        let func = self.test_func(&[], body);
        self.constant(name, func)
    }

    pub fn extern_func(&mut self, params: &[(&str, AstId)], ret: Option<AstId>, linkage: &str) -> AstId {
        let params = self.params(params);
        self.push(AstKind::FnLit(FnLit {
            sig: FnSig { params, ret },
            body: None,
            extern_name: Some(linkage.to_string()),
            comptime: false,
            test: false,
        }))
    }

    pub fn group(&mut self, members: Vec<AstId>) -> AstId {
        self.push(AstKind::FnGroup(members))
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    pub fn ret(&mut self, value: Option<AstId>) -> AstId {
        self.push(AstKind::Return(value))
    }

    pub fn block(&mut self, stmts: Vec<AstId>) -> AstId {
        self.push(AstKind::Block(stmts))
    }

    pub fn assign(&mut self, target: AstId, value: AstId) -> AstId {
        self.push(AstKind::Assign { op: None, target, value })
    }

    pub fn assign_op(&mut self, op: BinOp, target: AstId, value: AstId) -> AstId {
        self.push(AstKind::Assign {
            op: Some(op),
            target,
            value,
        })
    }

    pub fn if_(&mut self, cond: AstId, then: Vec<AstId>, otherwise: Option<Vec<AstId>>) -> AstId {
        let then_branch = self.block(then);
        let else_branch = otherwise.map(|stmts| self.block(stmts));
        self.push(AstKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_(&mut self, cond: AstId, body: Vec<AstId>) -> AstId {
        let body = self.block(body);
        self.push(AstKind::Loop { cond: Some(cond), body })
    }

    /// `switch value { case values: body ... }`; a case without values is
    /// the `default` arm.
    pub fn switch(&mut self, value: AstId, cases: Vec<(Vec<AstId>, Vec<AstId>)>) -> AstId {
        let cases = cases
            .into_iter()
            .map(|(values, body)| SwitchCase {
                values,
                body: self.block(body),
                span: self.span(),
            })
            .collect();
        self.push(AstKind::Switch { value, cases })
    }

    pub fn defer(&mut self, stmt: AstId) -> AstId {
        self.push(AstKind::Defer(stmt))
    }

    pub fn break_(&mut self) -> AstId {
        self.push(AstKind::Break)
    }

    pub fn static_assert(&mut self, cond: AstId, message: &str) -> AstId {
        self.push(AstKind::StaticAssert {
            cond,
            message: message.to_string(),
        })
    }

    pub fn assert(&mut self, cond: AstId, message: &str) -> AstId {
        self.push(AstKind::Assert {
            cond,
            message: message.to_string(),
        })
    }

    // -----------------------------------------------------------------
    // Declarations
    // -----------------------------------------------------------------

    /// Declaration node that is not added to the unit.
    pub fn decl(&mut self, name: &str, ty: Option<AstId>, value: Option<AstId>, mutable: bool) -> AstId {
        let span = self.span();
        self.ast.decl(name, ty, value, mutable, span)
    }

    /// `name :: value` at top level.
    pub fn constant(&mut self, name: &str, value: AstId) -> AstId {
        let decl = self.decl(name, None, Some(value), false);
        self.items.push(decl);
        decl
    }

    /// `name : ty = value` at top level.
    pub fn global(&mut self, name: &str, ty: Option<AstId>, value: Option<AstId>, mutable: bool) -> AstId {
        let decl = self.decl(name, ty, value, mutable);
        self.items.push(decl);
        decl
    }

    /// `#scope name { items }` at top level.
    pub fn module(&mut self, name: &str, items: Vec<AstId>) -> AstId {
        let name = self.ast.intern(name);
        let module = self.push(AstKind::Module { name, items });
        self.items.push(module);
        module
    }

    // -----------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------

    pub fn session(self) -> Session {
        self.session_with(SessionConfig::default())
    }

    pub fn session_with(self, config: SessionConfig) -> Session {
        init_logger();
        let unit = Unit {
            file: self.file,
            items: self.items,
        };
        let mut session = Session::new(config, self.ast);
        session.add_unit(&unit).expect("unit registers");
        session
    }
}

/// Diagnostics of `kind` reported by a failed analysis.
pub fn errors_of(result: Result<(), CoreError>, kind: &ErrorKind) -> Vec<Diagnostic> {
    match result {
        Err(CoreError::CompilationFailed(diags)) => diags.into_iter().filter(|d| &d.kind == kind).collect(),
        Err(other) => panic!("expected diagnostics, got {other}"),
        Ok(()) => panic!("expected analysis to fail"),
    }
}

/// Signed integer as a canonical constant.
pub fn int(value: i64) -> ConstValue {
    ConstValue::Int(value as u64)
}
