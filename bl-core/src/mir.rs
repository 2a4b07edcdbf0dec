//! Mid-level IR.
//!
//! A [`MirFn`] owns its blocks, instructions and locals in per-function
//! arenas. Instructions refer to their operands by [`InstrId`]; an operand is
//! always emitted before its user, back edges only exist as branch targets.

use std::fmt;

use crate::arena::{Arena, define_id};
use crate::ast::{BinOp, UnOp};
use crate::span::Span;
use crate::types::{CastOp, LayoutError, TypeId, TypeTable, checked_align_to};
use crate::value::ConstValue;

define_id!(FnId, "fn");
define_id!(GlobalId, "global");
define_id!(BlockId, "bb");
define_id!(InstrId, "instr");
define_id!(LocalId, "local");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnState {
    Pending,
    Analyzing,
    Analyzed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnFlavor {
    Runtime,
    /// Only ever executed by the VM; never handed to the backend.
    ComptimeOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Direct(FnId),
    /// Function value computed at run time.
    Indirect(InstrId),
}

/// Bounds information of an element access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Base points to an array of this length.
    Array(u64),
    /// Base points to a slice; the length is read at run time.
    Slice,
    /// Base is a raw pointer; no check.
    Unchecked,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Const(ConstValue),
    /// Address of a local variable.
    VarPtr(LocalId),
    GlobalPtr(GlobalId),
    Load(InstrId),
    Store { ptr: InstrId, value: InstrId },
    ElemPtr { base: InstrId, index: InstrId, bound: Bound },
    /// Address of member `index` of the struct (or slice) `base` points to.
    MemberPtr { base: InstrId, index: u32 },
    Binop { op: BinOp, lhs: InstrId, rhs: InstrId },
    Unop { op: UnOp, operand: InstrId },
    Cast { op: CastOp, operand: InstrId },
    Compound(Vec<InstrId>),
    Call { callee: Callee, args: Vec<InstrId> },
    Br(BlockId),
    CondBr { cond: InstrId, then_block: BlockId, else_block: BlockId },
    /// Jump to the first case whose canonical integer equals `value`.
    Switch { value: InstrId, cases: Vec<(u64, BlockId)>, default: BlockId },
    Phi(Vec<(BlockId, InstrId)>),
    Ret(Option<InstrId>),
    Unreachable,
    Assert { cond: InstrId, message: String },
}

impl InstrKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstrKind::Br(_)
                | InstrKind::CondBr { .. }
                | InstrKind::Switch { .. }
                | InstrKind::Ret(_)
                | InstrKind::Unreachable
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub kind: InstrKind,
    /// Result type; `void` for instructions producing nothing.
    pub ty: TypeId,
    pub span: Span,
    pub block: BlockId,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub name: &'static str,
    pub instrs: Vec<InstrId>,
}

impl Block {
    pub fn terminator<'a>(&self, instrs: &'a Arena<InstrId, Instr>) -> Option<&'a Instr> {
        let last = instrs.get(*self.instrs.last()?)?;
        last.kind.is_terminator().then_some(last)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub ty: TypeId,
    /// Byte offset in the frame, assigned by [`MirFn::layout_frame`].
    pub offset: u64,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MirFn {
    pub name: String,
    /// The function type.
    pub ty: TypeId,
    pub params: Vec<TypeId>,
    pub ret: TypeId,
    pub param_locals: Vec<LocalId>,
    pub locals: Arena<LocalId, Local>,
    pub blocks: Arena<BlockId, Block>,
    pub instrs: Arena<InstrId, Instr>,
    pub state: FnState,
    pub flavor: FnFlavor,
    /// Linkage name of an external function executed through the native bridge.
    pub native: Option<String>,
    /// Rendered argument types of a polymorphic specialization.
    pub specialization: Option<String>,
    /// Declared as a `#test` case.
    pub test: bool,
    pub frame_size: u64,
    pub span: Span,
}

impl MirFn {
    pub fn new(name: impl Into<String>, ty: TypeId, params: Vec<TypeId>, ret: TypeId, span: Span) -> Self {
        MirFn {
            name: name.into(),
            ty,
            params,
            ret,
            param_locals: Vec::new(),
            locals: Arena::new(),
            blocks: Arena::new(),
            instrs: Arena::new(),
            state: FnState::Pending,
            flavor: FnFlavor::Runtime,
            native: None,
            specialization: None,
            test: false,
            frame_size: 0,
            span,
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Assign frame offsets to every local.
    pub fn layout_frame(&mut self, types: &TypeTable) -> Result<(), LayoutError> {
        let mut offset = 0u64;
        let mut align = 1u64;
        for local in self.locals.ids() {
            let ty = self.locals[local].ty;
            let layout = types.layout(ty)?;
            offset = checked_align_to(offset, layout.align).ok_or(LayoutError::TooLarge(ty))?;
            self.locals[local].offset = offset;
            offset = offset.checked_add(layout.size).ok_or(LayoutError::TooLarge(ty))?;
            align = align.max(layout.align);
        }
        self.frame_size = checked_align_to(offset, align).ok_or(LayoutError::TooLarge(self.ty))?;
        Ok(())
    }

    /// Move body, locals and layout over from a finished builder function.
    pub fn install_body(&mut self, body: MirFn) {
        self.param_locals = body.param_locals;
        self.locals = body.locals;
        self.blocks = body.blocks;
        self.instrs = body.instrs;
        self.frame_size = body.frame_size;
    }
}

impl fmt::Display for MirFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fn {} ({:?}, {:?}) frame={}", self.name, self.state, self.flavor, self.frame_size)?;
        for (id, block) in self.blocks.iter_enumerated() {
            writeln!(f, "{id} {}:", block.name)?;
            for instr in &block.instrs {
                let data = &self.instrs[*instr];
                writeln!(f, "  {instr}: {} = {:?}", data.ty, data.kind)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirGlobal {
    pub name: String,
    pub ty: TypeId,
    /// Initial value, fully evaluated at compile time.
    pub value: ConstValue,
    pub mutable: bool,
    pub span: Span,
}

/// Every function and global produced by a session.
#[derive(Debug, Default)]
pub struct Mir {
    pub fns: Arena<FnId, MirFn>,
    pub globals: Arena<GlobalId, MirGlobal>,
}

impl Mir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, id: FnId) -> &MirFn {
        &self.fns[id]
    }

    pub fn global(&self, id: GlobalId) -> &MirGlobal {
        &self.globals[id]
    }

    pub fn find_fn(&self, name: &str) -> Option<FnId> {
        self.fns.iter_enumerated().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }
}
