//! Abstract syntax tree consumed by the analyzer.
//!
//! The tree is produced by the parser (which lives outside this crate) and
//! is immutable afterwards. All nodes are stored in one [`Ast`] arena and
//! refer to each other by [`AstId`]; MIR keeps ids and spans of the nodes it
//! was built from, never the nodes themselves.

use std::fmt;

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

use crate::arena::{Arena, define_id};
use crate::span::{FileId, Span};

define_id!(
    /// Index of a node in the [`Ast`] arena.
    AstId,
    "ast"
);

/// Interned identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ident(DefaultSymbol);

/// String interner for identifiers.
#[derive(Debug, Default)]
pub struct Interner {
    strings: StringInterner<DefaultBackend>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Ident {
        Ident(self.strings.get_or_intern(name))
    }

    /// Look up an identifier without interning it.
    pub fn get(&self, name: &str) -> Option<Ident> {
        self.strings.get(name).map(Ident)
    }

    pub fn resolve(&self, ident: Ident) -> &str {
        self.strings.resolve(ident.0).unwrap_or("<unknown>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Greater,
    Less,
    GreaterEq,
    LessEq,
    LogicAnd,
    LogicOr,
    BitAnd,
    BitOr,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Neq | BinOp::Greater | BinOp::Less | BinOp::GreaterEq | BinOp::LessEq
        )
    }

    pub fn is_logic(self) -> bool {
        matches!(self, BinOp::LogicAnd | BinOp::LogicOr)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Greater => ">",
            BinOp::Less => "<",
            BinOp::GreaterEq => ">=",
            BinOp::LessEq => "<=",
            BinOp::LogicAnd => "&&",
            BinOp::LogicOr => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnOp::Neg => "-",
            UnOp::Pos => "+",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
        };
        f.write_str(text)
    }
}

/// `name: T = value` / `name :: value`, global or local.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub name: Ident,
    pub ty: Option<AstId>,
    pub value: Option<AstId>,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: AstId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    pub params: Vec<Param>,
    /// `None` means `void`.
    pub ret: Option<AstId>,
}

/// Function literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FnLit {
    pub sig: FnSig,
    /// Absent for external (native) functions.
    pub body: Option<AstId>,
    /// Linkage name of a native function.
    pub extern_name: Option<String>,
    /// Calls to this function are always evaluated at compile time.
    pub comptime: bool,
    /// `#test` case collected by [`crate::compiler::Program::run_tests`].
    pub test: bool,
}

/// One arm of a `switch`; no values means the `default` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<AstId>,
    pub body: AstId,
    pub span: Span,
}

impl SwitchCase {
    pub fn is_default(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: Ident,
    pub ty: AstId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumVariant {
    pub name: Ident,
    pub value: Option<AstId>,
    pub span: Span,
}

/// Node payloads; each variant carries only the fields of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    // Items
    Decl(Decl),
    Module { name: Ident, items: Vec<AstId> },

    // Types
    PtrType(AstId),
    ArrayType { len: AstId, elem: AstId },
    SliceType(AstId),
    FnType(FnSig),
    StructType { members: Vec<StructMember> },
    EnumType { base: Option<AstId>, variants: Vec<EnumVariant> },
    /// `?T`: introduces a polymorphic type parameter in a signature.
    PolyType(Ident),

    // Expressions
    Ident(Ident),
    LitInt(u64),
    LitFloat(f64),
    LitBool(bool),
    LitNull,
    Binop { op: BinOp, lhs: AstId, rhs: AstId },
    Unop { op: UnOp, operand: AstId },
    Cast { ty: AstId, expr: AstId },
    Call { callee: AstId, args: Vec<AstId> },
    Member { base: AstId, name: Ident },
    Index { base: AstId, index: AstId },
    AddrOf(AstId),
    Deref(AstId),
    Compound { ty: AstId, values: Vec<AstId> },
    SizeOf(AstId),
    AlignOf(AstId),
    FnLit(FnLit),
    FnGroup(Vec<AstId>),
    Comptime(AstId),

    // Statements
    Block(Vec<AstId>),
    If {
        cond: AstId,
        then_branch: AstId,
        else_branch: Option<AstId>,
    },
    Loop { cond: Option<AstId>, body: AstId },
    Switch { value: AstId, cases: Vec<SwitchCase> },
    /// Statement run when the enclosing block is left.
    Defer(AstId),
    Break,
    Continue,
    Return(Option<AstId>),
    Assign {
        op: Option<BinOp>,
        target: AstId,
        value: AstId,
    },
    Unreachable,
    Assert { cond: AstId, message: String },
    StaticAssert { cond: AstId, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub kind: AstKind,
    pub span: Span,
}

/// One translation unit: the top-level items of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub file: FileId,
    pub items: Vec<AstId>,
}

/// Arena owning every node of a compilation, plus the identifier interner.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Arena<AstId, AstNode>,
    pub interner: Interner,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: AstKind, span: Span) -> AstId {
        self.nodes.push(AstNode { kind, span })
    }

    pub fn get(&self, id: AstId) -> Option<&AstNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn intern(&mut self, name: &str) -> Ident {
        self.interner.intern(name)
    }

    pub fn name(&self, ident: Ident) -> &str {
        self.interner.resolve(ident)
    }

    // -----------------------------------------------------------------
    // Constructors used by the parser and by tests
    // -----------------------------------------------------------------

    pub fn ident(&mut self, name: &str, span: Span) -> AstId {
        let ident = self.intern(name);
        self.push(AstKind::Ident(ident), span)
    }

    pub fn int(&mut self, value: u64, span: Span) -> AstId {
        self.push(AstKind::LitInt(value), span)
    }

    pub fn float(&mut self, value: f64, span: Span) -> AstId {
        self.push(AstKind::LitFloat(value), span)
    }

    pub fn boolean(&mut self, value: bool, span: Span) -> AstId {
        self.push(AstKind::LitBool(value), span)
    }

    pub fn null(&mut self, span: Span) -> AstId {
        self.push(AstKind::LitNull, span)
    }

    pub fn binop(&mut self, op: BinOp, lhs: AstId, rhs: AstId, span: Span) -> AstId {
        self.push(AstKind::Binop { op, lhs, rhs }, span)
    }

    pub fn unop(&mut self, op: UnOp, operand: AstId, span: Span) -> AstId {
        self.push(AstKind::Unop { op, operand }, span)
    }

    pub fn call(&mut self, callee: AstId, args: Vec<AstId>, span: Span) -> AstId {
        self.push(AstKind::Call { callee, args }, span)
    }

    pub fn member(&mut self, base: AstId, name: &str, span: Span) -> AstId {
        let name = self.intern(name);
        self.push(AstKind::Member { base, name }, span)
    }

    /// `name :: value` (immutable) or `name := value` (mutable).
    pub fn decl(&mut self, name: &str, ty: Option<AstId>, value: Option<AstId>, mutable: bool, span: Span) -> AstId {
        let name = self.intern(name);
        self.push(
            AstKind::Decl(Decl {
                name,
                ty,
                value,
                mutable,
            }),
            span,
        )
    }

    pub fn param(&mut self, name: &str, ty: AstId, span: Span) -> Param {
        Param {
            name: self.intern(name),
            ty,
            span,
        }
    }

    pub fn fn_lit(&mut self, params: Vec<Param>, ret: Option<AstId>, body: AstId, span: Span) -> AstId {
        self.push(
            AstKind::FnLit(FnLit {
                sig: FnSig { params, ret },
                body: Some(body),
                extern_name: None,
                comptime: false,
                test: false,
            }),
            span,
        )
    }

    pub fn extern_fn(&mut self, params: Vec<Param>, ret: Option<AstId>, linkage: &str, span: Span) -> AstId {
        self.push(
            AstKind::FnLit(FnLit {
                sig: FnSig { params, ret },
                body: None,
                extern_name: Some(linkage.to_string()),
                comptime: false,
                test: false,
            }),
            span,
        )
    }

    pub fn block(&mut self, stmts: Vec<AstId>, span: Span) -> AstId {
        self.push(AstKind::Block(stmts), span)
    }

    pub fn ret(&mut self, value: Option<AstId>, span: Span) -> AstId {
        self.push(AstKind::Return(value), span)
    }
}

impl std::ops::Index<AstId> for Ast {
    type Output = AstNode;

    fn index(&self, id: AstId) -> &AstNode {
        &self.nodes[id]
    }
}
